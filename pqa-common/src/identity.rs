//! Annotator and session identities
//!
//! An annotator is one of a small configured roster of numeric IDs. A session
//! is an opaque token generated once, prefixed with the annotator ID, and used
//! together with the annotator as the key for everything persisted.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Longest accepted session token
const MAX_SESSION_ID_LEN: usize = 64;

/// Identity validation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    /// Annotator ID is not part of the configured roster
    #[error("Annotator ID must be one of {valid} (got '{given}')")]
    UnknownAnnotator { given: String, valid: String },

    /// Annotator ID is not a positive integer
    #[error("Annotator ID must be a positive integer (got '{0}')")]
    MalformedAnnotator(String),

    /// Session token contains characters outside [A-Za-z0-9_-] or is too long
    #[error("Invalid session ID '{0}'")]
    InvalidSession(String),
}

/// One annotator's identity
///
/// Always holds a positive integer; the ordinal drives prompt assignment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AnnotatorId {
    ordinal: u32,
    raw: String,
}

impl AnnotatorId {
    /// Parse an annotator ID (surrounding whitespace ignored)
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        let trimmed = raw.trim();
        match trimmed.parse::<u32>() {
            Ok(ordinal) if ordinal > 0 => Ok(Self {
                ordinal,
                raw: trimmed.to_string(),
            }),
            _ => Err(IdentityError::MalformedAnnotator(raw.to_string())),
        }
    }

    /// 1-based position used by prompt assignment
    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for AnnotatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for AnnotatorId {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AnnotatorId> for String {
    fn from(value: AnnotatorId) -> Self {
        value.raw
    }
}

/// The closed set of annotators allowed to start a session
#[derive(Debug, Clone)]
pub struct AnnotatorRoster {
    ids: Vec<AnnotatorId>,
}

impl AnnotatorRoster {
    /// Build a roster; every entry must be a positive integer.
    /// Entries sharing an ordinal ("1" and "01") keep the first spelling.
    pub fn new<I, S>(ids: I) -> Result<Self, IdentityError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed: Vec<AnnotatorId> = Vec::new();
        for raw in ids {
            let id = AnnotatorId::parse(raw.as_ref())?;
            if !parsed.iter().any(|known| known.ordinal() == id.ordinal()) {
                parsed.push(id);
            }
        }
        Ok(Self { ids: parsed })
    }

    /// Resolve operator input against the roster
    pub fn resolve(&self, raw: &str) -> Result<AnnotatorId, IdentityError> {
        let trimmed = raw.trim();
        self.ids
            .iter()
            .find(|id| id.as_str() == trimmed)
            .cloned()
            .ok_or_else(|| IdentityError::UnknownAnnotator {
                given: raw.to_string(),
                valid: self.describe(),
            })
    }

    pub fn ids(&self) -> &[AnnotatorId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn describe(&self) -> String {
        self.ids
            .iter()
            .map(AnnotatorId::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Opaque per-session token
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// New random token of the form `{annotator}_{8 hex chars}`
    pub fn generate(annotator: &AnnotatorId) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{}_{}", annotator, &suffix[..8]))
    }

    /// Accept a client-supplied token
    ///
    /// The token names a local file, so only `[A-Za-z0-9_-]` is allowed.
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_SESSION_ID_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(IdentityError::InvalidSession(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionId {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(value: SessionId) -> Self {
        value.0
    }
}
