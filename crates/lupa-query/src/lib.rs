// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use lupa_app::{DrillDownError, DrillDownResult, MAX_RESULT_ROWS};
use reqwest::StatusCode;
use reqwest::blocking::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use url::Url;

pub const BASE_URL_ENV: &str = "LUPA_DB_URL";
pub const TOKEN_ENV: &str = "LUPA_DB_TOKEN";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8790/v1";

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    columns: Vec<String>,
    rows: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    token: String,
    timeout: Duration,
    http: HttpClient,
}

impl Client {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            bail!("backend.base_url must not be empty");
        }
        Url::parse(&base_url).with_context(|| format!("invalid backend URL {base_url:?}"))?;
        if token.trim().is_empty() {
            bail!("backend token must not be empty");
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            token: token.to_owned(),
            timeout,
            http,
        })
    }

    pub fn from_env(base_url: &str, timeout: Duration) -> Result<Option<Self>> {
        let Some(token) = env::var_os(TOKEN_ENV) else {
            return Ok(None);
        };
        let token = token.to_string_lossy().into_owned();
        if token.trim().is_empty() {
            return Ok(None);
        }
        let base_url = env::var(BASE_URL_ENV).unwrap_or_else(|_| base_url.to_owned());
        Self::new(&base_url, &token, timeout).map(Some)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn execute(&self, query: &str) -> std::result::Result<DrillDownResult, DrillDownError> {
        let response = self
            .http
            .post(format!("{}/query", self.base_url))
            .bearer_auth(&self.token)
            .json(&QueryRequest { query })
            .send()
            .map_err(|error| connection_error(&self.base_url, &error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(clean_error_response(status, &body));
        }

        let parsed: QueryResponse = response
            .json()
            .map_err(|error| DrillDownError::BackendFailure(format!("decode result: {error}")))?;

        let total_count = parsed.rows.len();
        let mut rows = parsed.rows;
        rows.truncate(MAX_RESULT_ROWS);
        Ok(DrillDownResult {
            columns: parsed.columns,
            rows,
            total_count: Some(total_count),
        })
    }
}

fn connection_error(base_url: &str, error: &reqwest::Error) -> DrillDownError {
    if error.is_timeout() {
        return DrillDownError::BackendFailure(format!("query timed out against {base_url}"));
    }
    DrillDownError::BackendFailure(format!("cannot reach analytical backend at {base_url}: {error}"))
}

fn clean_error_response(status: StatusCode, body: &str) -> DrillDownError {
    let detail = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|parsed| parsed.error.or(parsed.message))
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_owned()
            } else {
                trimmed.to_owned()
            }
        });
    DrillDownError::BackendFailure(format!("backend returned {}: {detail}", status.as_u16()))
}

#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
