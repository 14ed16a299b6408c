// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

use crate::ids::HistoryEntryId;

pub const MAX_SNAPSHOT_ROWS: usize = 50;
pub const MIN_CHART_ROWS: usize = 2;
pub const MAX_RESULT_ROWS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartKind {
    Line,
    Bar,
    Scatter,
}

impl ChartKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::Bar => "bar",
            Self::Scatter => "scatter",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "line" => Some(Self::Line),
            "bar" => Some(Self::Bar),
            "scatter" => Some(Self::Scatter),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotStatus {
    Complete,
    Truncated { original_count: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrillDownSpec {
    pub description: String,
    pub query_template: String,
    pub param_mapping: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub title: String,
    pub query: String,
    pub x_field: String,
    pub y_field: String,
    pub database: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub chart_kind: ChartKind,
    pub status: SnapshotStatus,
    pub drill_down: Option<DrillDownSpec>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Snapshot {
    pub fn x_index(&self) -> usize {
        self.columns
            .iter()
            .position(|column| column == &self.x_field)
            .unwrap_or(0)
    }

    pub fn y_index(&self) -> usize {
        self.columns
            .iter()
            .position(|column| column == &self.y_field)
            .unwrap_or_else(|| 1.min(self.columns.len().saturating_sub(1)))
    }

    pub fn x_text(&self, row: &[serde_json::Value]) -> String {
        row.get(self.x_index()).map(cell_text).unwrap_or_default()
    }

    pub fn y_number(&self, row: &[serde_json::Value]) -> f64 {
        row.get(self.y_index()).map(cell_number).unwrap_or(0.0)
    }

    pub fn max_y(&self) -> f64 {
        self.rows
            .iter()
            .map(|row| self.y_number(row))
            .fold(0.0_f64, f64::max)
    }

    pub fn min_y(&self) -> f64 {
        self.rows
            .iter()
            .map(|row| self.y_number(row))
            .fold(f64::MAX, f64::min)
    }

    pub fn is_sparse(&self) -> bool {
        self.rows.len() < MIN_CHART_ROWS
    }
}

pub fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Number(number) => number.to_string(),
        serde_json::Value::Bool(flag) => flag.to_string(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn cell_number(value: &serde_json::Value) -> f64 {
    match value {
        serde_json::Value::Number(number) => number.as_f64().unwrap_or(0.0),
        serde_json::Value::String(text) => text.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrillDownResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub total_count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: HistoryEntryId,
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub archived_at: OffsetDateTime,
    pub row_count: usize,
    pub chart_kind: ChartKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    MalformedInput(String),
    ColumnMismatch {
        row: usize,
        expected: usize,
        got: usize,
    },
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedInput(detail) => write!(f, "malformed snapshot input: {detail}"),
            Self::ColumnMismatch { row, expected, got } => write!(
                f,
                "row {row} has {got} cells but the snapshot declares {expected} columns"
            ),
        }
    }
}

impl std::error::Error for SnapshotError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrillDownError {
    UnresolvedPlaceholder(String),
    BackendFailure(String),
    TemplateMissing,
    Disabled,
}

impl std::fmt::Display for DrillDownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnresolvedPlaceholder(name) => {
                write!(f, "unresolved placeholder {{{{{name}}}}} in drill-down template")
            }
            Self::BackendFailure(message) => write!(f, "drill-down query failed: {message}"),
            Self::TemplateMissing => {
                f.write_str("no drill-down template configured for this snapshot")
            }
            Self::Disabled => f.write_str("drill-down disabled (no backend credential)"),
        }
    }
}

impl std::error::Error for DrillDownError {}
