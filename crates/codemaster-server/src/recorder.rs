//! Durable match records.
//!
//! One JSON document per finished match. Writes go to a temp file that is
//! renamed into place, so a crash leaves either the whole record or
//! nothing. Reading back skips anything malformed with a warning.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use codemaster_core::protocol::PlayerId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RecorderError>;

/// One finished match as written to stable storage.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MatchRecord {
    pub game_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub secret_code: String,
    #[serde(with = "winner_field")]
    pub winner: Option<PlayerId>,
    pub players: Vec<PlayerEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntry {
    pub id: PlayerId,
    pub attempts: u32,
}

/// The stored document spells an absent winner as the literal `"None"`.
mod winner_field {
    use super::PlayerId;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(winner: &Option<PlayerId>, ser: S) -> Result<S::Ok, S::Error> {
        match winner {
            Some(id) => ser.serialize_str(&id.to_string()),
            None => ser.serialize_str("None"),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<PlayerId>, D::Error> {
        let raw = String::deserialize(de)?;
        if raw == "None" {
            return Ok(None);
        }
        raw.parse().map(Some).map_err(serde::de::Error::custom)
    }
}

/// Durable sink for finished matches.
///
/// Kept as a trait so tests can swap in [`MemoryRecorder`]; persistence
/// failures are surfaced to the caller, which logs and carries on.
pub trait MatchRecorder {
    /// Persist one finished match; returns a locator for the stored record.
    fn record(&mut self, record: &MatchRecord) -> Result<String>;

    /// Up to `limit` records, newest first. Malformed records are skipped.
    fn recent(&self, limit: usize) -> Result<Vec<MatchRecord>>;
}

/// Records stored as `<game_id>.json` files under one directory.
pub struct JsonFileRecorder {
    dir: PathBuf,
}

impl JsonFileRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn read_record(path: &Path) -> Result<MatchRecord> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

impl MatchRecorder for JsonFileRecorder {
    fn record(&mut self, record: &MatchRecord) -> Result<String> {
        let path = self.dir.join(format!("{}.json", record.game_id));
        let tmp = self.dir.join(format!("{}.json.tmp", record.game_id));

        let mut file = File::create(&tmp)?;
        file.write_all(serde_json::to_string_pretty(record)?.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        fs::rename(&tmp, &path)?;

        Ok(path.display().to_string())
    }

    fn recent(&self, limit: usize) -> Result<Vec<MatchRecord>> {
        let mut files: Vec<(SystemTime, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            files.push((modified, path));
        }
        files.sort_by(|a, b| b.0.cmp(&a.0));

        let mut records = Vec::new();
        for (_, path) in files.into_iter().take(limit) {
            match Self::read_record(&path) {
                Ok(record) => records.push(record),
                Err(e) => warn!("skipping malformed record {}: {}", path.display(), e),
            }
        }
        Ok(records)
    }
}

/// In-memory recorder for tests; the handle stays readable after the
/// coordinator takes ownership of the recorder itself.
#[derive(Clone, Default)]
pub struct MemoryRecorder {
    records: Arc<Mutex<Vec<MatchRecord>>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> Arc<Mutex<Vec<MatchRecord>>> {
        self.records.clone()
    }
}

impl MatchRecorder for MemoryRecorder {
    fn record(&mut self, record: &MatchRecord) -> Result<String> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.push(record.clone());
        Ok(format!("memory:{}", record.game_id))
    }

    fn recent(&self, limit: usize) -> Result<Vec<MatchRecord>> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.iter().rev().take(limit).cloned().collect())
    }
}
