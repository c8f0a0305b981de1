//! # PQA Common Library
//!
//! Shared code for the Paragraph Quality Annotation service:
//! - Reference content loading and validation
//! - Deterministic prompt assignment
//! - Annotation record model (ratings, rankings, feedback)
//! - Persistence adapter (local recovery files, durable row store)
//! - Session/navigation controller
//! - Configuration loading

pub mod assignment;
pub mod config;
pub mod content;
pub mod error;
pub mod identity;
pub mod persistence;
pub mod record;
pub mod session;

pub use error::{Error, Result};
pub use identity::{AnnotatorId, AnnotatorRoster, SessionId};
pub use record::{Category, Dimension, ItemAnnotation, ItemKey, Rank, Score, SessionRecord, Slot};
