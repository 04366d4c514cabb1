// src/tracker.rs
//! Watermark store: the timestamp of the newest post fully accounted for,
//! persisted as a single RFC 3339 record and restored across restarts.
//!
//! The value only ever moves forward (monotonic max) and is written with a
//! temp-file-then-rename dance so a crash mid-write can never clobber the
//! previous good record.

use chrono::{DateTime, SecondsFormat, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatermarkError {
    /// Non-empty state that does not parse. Fatal at startup: guessing a
    /// substitute watermark risks reprocessing or silently skipping posts.
    #[error("watermark state at {path} is corrupt: {raw:?}")]
    Corrupt { path: PathBuf, raw: String },
    #[error("watermark state i/o: {0}")]
    Io(#[from] io::Error),
}

pub struct WatermarkStore {
    path: PathBuf,
    last_seen: RwLock<Option<DateTime<Utc>>>,
}

impl WatermarkStore {
    /// Open the store, restoring any persisted watermark. A missing file or
    /// an empty/whitespace-only record means "unset"; anything non-empty
    /// that fails to parse is `Corrupt`, never silently treated as unset.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, WatermarkError> {
        let path = path.into();
        let last_seen = match fs::read_to_string(&path) {
            Ok(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    let parsed = DateTime::parse_from_rfc3339(trimmed).map_err(|_| {
                        WatermarkError::Corrupt {
                            path: path.clone(),
                            raw: trimmed.to_string(),
                        }
                    })?;
                    Some(parsed.with_timezone(&Utc))
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            last_seen: RwLock::new(last_seen),
        })
    }

    /// Read-only accessor for observability and CLI reporting.
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        *self.last_seen.read().expect("watermark lock poisoned")
    }

    /// Monotonic-max update: the new value replaces the old one only if it
    /// is strictly later. Returns whether the stored value changed.
    pub fn advance(&self, ts: DateTime<Utc>) -> bool {
        let mut guard = self.last_seen.write().expect("watermark lock poisoned");
        match *guard {
            Some(current) if ts <= current => false,
            _ => {
                *guard = Some(ts);
                true
            }
        }
    }

    /// Persist the current watermark. A no-op while unset, so an empty state
    /// file is never created. Writes to a temp path and renames into place;
    /// the temp file is cleaned up if the rename fails.
    pub fn persist(&self) -> Result<(), WatermarkError> {
        let Some(ts) = self.last_seen() else {
            return Ok(());
        };
        let encoded = ts.to_rfc3339_opts(SecondsFormat::Nanos, true);
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, encoded.as_bytes())?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
