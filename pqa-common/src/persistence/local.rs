//! Local crash-recovery files
//!
//! One file per (annotator, session), rewritten wholesale on every change.
//! Writes go to a temporary sibling first and are renamed into place, so a
//! crash mid-write leaves the previous snapshot intact.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use super::{payload, StoreError};
use crate::identity::{AnnotatorId, SessionId};
use crate::record::SessionRecord;

const EXTENSION: &str = "json";

/// Entry of the admin listing
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RecoveryFileInfo {
    pub name: String,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct LocalRecoveryStore {
    dir: PathBuf,
}

impl LocalRecoveryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the recovery directory if needed
    pub async fn ensure_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))
    }

    pub fn file_name(annotator: &AnnotatorId, session: &SessionId) -> String {
        format!("{}_{}.{}", annotator, session, EXTENSION)
    }

    pub fn path_for(&self, annotator: &AnnotatorId, session: &SessionId) -> PathBuf {
        self.dir.join(Self::file_name(annotator, session))
    }

    /// Overwrite the session's file with `record` stamped at the current time
    ///
    /// Returns the stamp written; `record` itself is not modified.
    pub async fn save(
        &self,
        annotator: &AnnotatorId,
        session: &SessionId,
        record: &SessionRecord,
    ) -> Result<DateTime<Utc>, StoreError> {
        let saved_at = Utc::now();
        let mut snapshot = record.clone();
        snapshot.last_saved = Some(saved_at);
        let body = payload::encode(&snapshot)?;

        let path = self.path_for(annotator, session);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body.as_bytes())
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;

        debug!(file = %path.display(), bytes = body.len(), "Recovery file written");
        Ok(saved_at)
    }

    /// `Ok(None)` when no file exists for the pair
    pub async fn load(
        &self,
        annotator: &AnnotatorId,
        session: &SessionId,
    ) -> Result<Option<SessionRecord>, StoreError> {
        let path = self.path_for(annotator, session);
        match fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(payload::decode(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    /// Remove the session's file; a missing file is not an error
    ///
    /// Returns whether a file was removed.
    pub async fn delete(
        &self,
        annotator: &AnnotatorId,
        session: &SessionId,
    ) -> Result<bool, StoreError> {
        remove_if_present(&self.path_for(annotator, session)).await
    }

    /// Whether the session has a recovery file on disk
    pub async fn exists(
        &self,
        annotator: &AnnotatorId,
        session: &SessionId,
    ) -> Result<bool, StoreError> {
        let path = self.path_for(annotator, session);
        fs::try_exists(&path)
            .await
            .map_err(|e| StoreError::io(path, e))
    }

    /// All recovery files, sorted by name
    pub async fn list(&self) -> Result<Vec<RecoveryFileInfo>, StoreError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if validate_name(&name).is_err() {
                continue;
            }
            let meta = entry
                .metadata()
                .await
                .map_err(|e| StoreError::io(entry.path(), e))?;
            if !meta.is_file() {
                continue;
            }
            files.push(RecoveryFileInfo {
                name,
                size_bytes: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    /// Raw contents of a listed file, for download
    pub async fn read_named(&self, name: &str) -> Result<Option<String>, StoreError> {
        validate_name(name)?;
        let path = self.dir.join(name);
        match fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    pub async fn delete_named(&self, name: &str) -> Result<bool, StoreError> {
        validate_name(name)?;
        remove_if_present(&self.dir.join(name)).await
    }
}

async fn remove_if_present(path: &Path) -> Result<bool, StoreError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Plain `*.json` file names only; nothing that could leave the directory
fn validate_name(name: &str) -> Result<(), StoreError> {
    let stem_ok = name
        .strip_suffix(".json")
        .map(|stem| {
            !stem.is_empty()
                && stem
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        })
        .unwrap_or(false);
    if stem_ok {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}
