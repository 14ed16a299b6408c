// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use lupa_app::{HistoryEntry, HistoryEntryId, Snapshot};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::warn;

pub const APP_NAME: &str = "lupa";
pub const DEFAULT_MAX_ENTRIES: usize = 100;

const ENTRY_SUFFIX: &str = ".json";
const ID_HEX_CHARS: usize = 12;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArchivedSnapshot {
    id: HistoryEntryId,
    #[serde(with = "time::serde::rfc3339")]
    archived_at: OffsetDateTime,
    snapshot: Snapshot,
}

#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
    max_entries: usize,
}

pub fn default_history_dir() -> Result<PathBuf> {
    if let Some(path) = env::var_os("LUPA_HISTORY_DIR") {
        return Ok(PathBuf::from(path));
    }
    let data_root = dirs::data_dir()
        .ok_or_else(|| anyhow::anyhow!("cannot resolve data directory; set LUPA_HISTORY_DIR"))?;
    Ok(data_root.join(APP_NAME).join("history"))
}

pub fn entry_id(snapshot: &Snapshot, archived_at: OffsetDateTime) -> HistoryEntryId {
    let mut hasher = Sha256::new();
    hasher.update(snapshot.title.as_bytes());
    hasher.update(b"|");
    hasher.update(archived_at.unix_timestamp_nanos().to_le_bytes());
    hasher.update(b"|");
    hasher.update(snapshot.created_at.unix_timestamp_nanos().to_le_bytes());
    let digest = hasher.finalize();
    let hex: String = digest
        .iter()
        .take(ID_HEX_CHARS / 2)
        .map(|byte| format!("{byte:02x}"))
        .collect();
    HistoryEntryId::new(hex)
}

impl Store {
    pub fn open(root: &Path, max_entries: usize) -> Result<Self> {
        if max_entries == 0 {
            bail!("history max_entries must be positive");
        }
        fs::create_dir_all(root)
            .with_context(|| format!("create history directory {}", root.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
            max_entries,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn append(&self, snapshot: &Snapshot, archived_at: OffsetDateTime) -> Result<HistoryEntry> {
        let id = entry_id(snapshot, archived_at);
        let archived = ArchivedSnapshot {
            id: id.clone(),
            archived_at,
            snapshot: snapshot.clone(),
        };
        let encoded = serde_json::to_vec_pretty(&archived).context("encode history entry")?;

        // Write-then-rename so a concurrent list() never sees a half-written
        // entry.
        let final_path = self.entry_path(&id)?;
        let temp_path = self.root.join(format!(".{id}.tmp"));
        fs::write(&temp_path, encoded)
            .with_context(|| format!("write history entry {}", temp_path.display()))?;
        fs::rename(&temp_path, &final_path)
            .with_context(|| format!("commit history entry {}", final_path.display()))?;

        Ok(summarize(&archived))
    }

    pub fn list(&self) -> Result<Vec<HistoryEntry>> {
        let mut entries = Vec::new();
        for archived in self.read_all()? {
            entries.push(summarize(&archived));
        }
        entries.sort_by(|left, right| {
            right
                .archived_at
                .cmp(&left.archived_at)
                .then_with(|| right.id.cmp(&left.id))
        });
        Ok(entries)
    }

    pub fn load(&self, id: &HistoryEntryId) -> Result<Option<Snapshot>> {
        let path = self.entry_path(id)?;
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("read history entry {}", path.display()));
            }
        };
        let archived: ArchivedSnapshot = serde_json::from_slice(&raw)
            .with_context(|| format!("decode history entry {}", path.display()))?;
        Ok(Some(archived.snapshot))
    }

    pub fn delete(&self, id: &HistoryEntryId) -> Result<bool> {
        let path = self.entry_path(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(error) => {
                Err(error).with_context(|| format!("delete history entry {}", path.display()))
            }
        }
    }

    pub fn prune(&self, keep: Option<&HistoryEntryId>) -> Result<usize> {
        let entries = self.list()?;
        if entries.len() <= self.max_entries {
            return Ok(0);
        }

        let mut removed = 0;
        let excess = entries.len() - self.max_entries;
        for entry in entries.iter().rev() {
            if removed == excess {
                break;
            }
            if keep == Some(&entry.id) {
                continue;
            }
            if self.delete(&entry.id)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn entry_path(&self, id: &HistoryEntryId) -> Result<PathBuf> {
        let raw = id.get();
        if raw.is_empty() || !raw.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            bail!("invalid history entry id {raw:?}");
        }
        Ok(self.root.join(format!("{raw}{ENTRY_SUFFIX}")))
    }

    fn read_all(&self) -> Result<Vec<ArchivedSnapshot>> {
        let mut archived = Vec::new();
        let dir = fs::read_dir(&self.root)
            .with_context(|| format!("read history directory {}", self.root.display()))?;
        for entry in dir {
            let entry = entry.context("read history directory entry")?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if !name.ends_with(ENTRY_SUFFIX) || name.starts_with('.') {
                continue;
            }
            let raw = match fs::read(&path) {
                Ok(raw) => raw,
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping unreadable history entry");
                    continue;
                }
            };
            match serde_json::from_slice::<ArchivedSnapshot>(&raw) {
                Ok(parsed) => archived.push(parsed),
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping corrupt history entry");
                }
            }
        }
        Ok(archived)
    }
}

fn summarize(archived: &ArchivedSnapshot) -> HistoryEntry {
    HistoryEntry {
        id: archived.id.clone(),
        title: archived.snapshot.title.clone(),
        archived_at: archived.archived_at,
        row_count: archived.snapshot.rows.len(),
        chart_kind: archived.snapshot.chart_kind,
    }
}
