// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_VERSION: i64 = 1;
const DEFAULT_DATA_FILE: &str = "current.json";
const DEFAULT_BACKEND_TIMEOUT: &str = "30s";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub watch: Watch,
    #[serde(default)]
    pub history: History,
    #[serde(default)]
    pub backend: Backend,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            watch: Watch::default(),
            history: History::default(),
            backend: Backend::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Watch {
    pub data_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct History {
    pub dir: Option<String>,
    pub max_entries: Option<usize>,
}

impl Default for History {
    fn default() -> Self {
        Self {
            dir: None,
            max_entries: Some(lupa_store::DEFAULT_MAX_ENTRIES),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Backend {
    pub enabled: Option<bool>,
    pub base_url: Option<String>,
    pub timeout: Option<String>,
}

impl Default for Backend {
    fn default() -> Self {
        Self {
            enabled: Some(true),
            base_url: Some(lupa_query::DEFAULT_BASE_URL.to_owned()),
            timeout: Some(DEFAULT_BACKEND_TIMEOUT.to_owned()),
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("LUPA_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set LUPA_CONFIG_PATH to the config file")
        })?;

        let app_dir = config_root.join(lupa_store::APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} is not versioned. Add `version = 1` and move values under [watch], [history], and [backend]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(max_entries) = self.history.max_entries
            && max_entries == 0
        {
            bail!(
                "history.max_entries in {} must be positive",
                path.display()
            );
        }

        if let Some(timeout) = &self.backend.timeout {
            let parsed = parse_duration(timeout)?;
            if parsed <= Duration::ZERO {
                bail!(
                    "backend.timeout in {} must be positive, got {}",
                    path.display(),
                    timeout
                );
            }
        }

        Ok(())
    }

    pub fn data_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.watch.data_path {
            return Ok(PathBuf::from(path));
        }
        if let Some(path) = env::var_os("LUPA_DATA_PATH") {
            return Ok(PathBuf::from(path));
        }
        let data_root = dirs::data_dir()
            .ok_or_else(|| anyhow!("cannot resolve data directory; set LUPA_DATA_PATH"))?;
        Ok(data_root.join(lupa_store::APP_NAME).join(DEFAULT_DATA_FILE))
    }

    pub fn history_dir(&self) -> Result<PathBuf> {
        match &self.history.dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => lupa_store::default_history_dir(),
        }
    }

    pub fn history_max_entries(&self) -> usize {
        self.history
            .max_entries
            .unwrap_or(lupa_store::DEFAULT_MAX_ENTRIES)
    }

    pub fn backend_enabled(&self) -> bool {
        self.backend.enabled.unwrap_or(true)
    }

    pub fn backend_base_url(&self) -> &str {
        self.backend
            .base_url
            .as_deref()
            .unwrap_or(lupa_query::DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }

    pub fn backend_timeout(&self) -> Result<Duration> {
        parse_duration(self.backend.timeout.as_deref().unwrap_or(DEFAULT_BACKEND_TIMEOUT))
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# lupa config\n# Place this file at: {}\n\nversion = 1\n\n[watch]\n# Optional. Default is the platform data dir (for example ~/.local/share/lupa/current.json)\n# data_path = \"/absolute/path/to/current.json\"\n\n[history]\n# Optional. Default is the platform data dir (for example ~/.local/share/lupa/history)\n# dir = \"/absolute/path/to/history\"\nmax_entries = {}\n\n[backend]\nenabled = true\nbase_url = \"{}\"\ntimeout = \"{}\"\n# The credential is never read from this file; export {} instead.\n",
            path.display(),
            lupa_store::DEFAULT_MAX_ENTRIES,
            lupa_query::DEFAULT_BASE_URL,
            DEFAULT_BACKEND_TIMEOUT,
            lupa_query::TOKEN_ENV,
        )
    }
}

fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 30s)")
}
