//! Reference content loading
//!
//! Two JSON files (fiction and nonfiction), each shaped
//! `{ "<prompt>": { "<passage id>": "<passage text>", ... }, ... }`.
//! File order is significant: prompt assignment slices the prompt list in
//! the order it appears on disk, so parsing must preserve it.

use indexmap::IndexMap;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::record::{Category, ItemKey, KEY_SEPARATOR, PASSAGES_PER_ITEM};

/// Startup-fatal content problems
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Failed to read {category} content from {path:?}: {source}")]
    Read {
        category: Category,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid {category} content JSON: {source}")]
    Parse {
        category: Category,
        source: serde_json::Error,
    },

    #[error("{category} prompt '{prompt}' has {found} passages (expected 4)")]
    PassageCount {
        category: Category,
        prompt: String,
        found: usize,
    },

    #[error("{category} content contains an empty prompt")]
    EmptyPrompt { category: Category },

    #[error("{category} prompt '{prompt}' contains the reserved separator '__'")]
    ReservedSeparator { category: Category, prompt: String },
}

/// One candidate passage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Passage {
    pub id: String,
    pub text: String,
}

/// One prompt with its four passages
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentItem {
    pub key: ItemKey,
    pub passages: Vec<Passage>,
}

/// Read-only reference content, loaded once at startup
#[derive(Debug, Clone, Default)]
pub struct ContentCatalog {
    fiction: Vec<ContentItem>,
    nonfiction: Vec<ContentItem>,
}

type RawCollection = IndexMap<String, IndexMap<String, String>>;

impl ContentCatalog {
    /// Load both collections from disk
    pub fn load(fiction_path: &Path, nonfiction_path: &Path) -> Result<Self, ContentError> {
        let fiction = read_collection(Category::Fiction, fiction_path)?;
        let nonfiction = read_collection(Category::Nonfiction, nonfiction_path)?;
        let catalog = Self::from_json(&fiction, &nonfiction)?;

        info!(
            fiction = catalog.fiction.len(),
            nonfiction = catalog.nonfiction.len(),
            "Loaded reference content"
        );
        Ok(catalog)
    }

    /// Parse both collections from JSON text
    pub fn from_json(fiction: &str, nonfiction: &str) -> Result<Self, ContentError> {
        Ok(Self {
            fiction: parse_collection(Category::Fiction, fiction)?,
            nonfiction: parse_collection(Category::Nonfiction, nonfiction)?,
        })
    }

    /// Items of one category in file order
    pub fn items(&self, category: Category) -> &[ContentItem] {
        match category {
            Category::Fiction => &self.fiction,
            Category::Nonfiction => &self.nonfiction,
        }
    }

    pub fn get(&self, key: &ItemKey) -> Option<&ContentItem> {
        self.items(key.category).iter().find(|item| item.key == *key)
    }
}

fn read_collection(category: Category, path: &Path) -> Result<String, ContentError> {
    std::fs::read_to_string(path).map_err(|source| ContentError::Read {
        category,
        path: path.to_path_buf(),
        source,
    })
}

fn parse_collection(category: Category, json: &str) -> Result<Vec<ContentItem>, ContentError> {
    let raw: RawCollection =
        serde_json::from_str(json).map_err(|source| ContentError::Parse { category, source })?;

    raw.into_iter()
        .map(|(prompt, passages)| {
            if prompt.trim().is_empty() {
                return Err(ContentError::EmptyPrompt { category });
            }
            if prompt.contains(KEY_SEPARATOR) {
                return Err(ContentError::ReservedSeparator { category, prompt });
            }
            if passages.len() != PASSAGES_PER_ITEM {
                return Err(ContentError::PassageCount {
                    category,
                    prompt,
                    found: passages.len(),
                });
            }
            Ok(ContentItem {
                key: ItemKey::new(category, prompt),
                passages: passages
                    .into_iter()
                    .map(|(id, text)| Passage { id, text })
                    .collect(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FICTION: &str = r#"{
        "Zebra at dawn": {"a": "z1", "b": "z2", "c": "z3", "d": "z4"},
        "Apple orchard": {"a": "a1", "b": "a2", "c": "a3", "d": "a4"}
    }"#;

    const NONFICTION: &str = r#"{
        "How tides work": {"p1": "t1", "p2": "t2", "p3": "t3", "p4": "t4"}
    }"#;

    #[test]
    fn test_preserves_file_order() {
        let catalog = ContentCatalog::from_json(FICTION, NONFICTION).unwrap();
        let prompts: Vec<&str> = catalog
            .items(Category::Fiction)
            .iter()
            .map(|item| item.key.prompt.as_str())
            .collect();
        assert_eq!(prompts, vec!["Zebra at dawn", "Apple orchard"]);

        let tides = &catalog.items(Category::Nonfiction)[0];
        assert_eq!(tides.passages[2].id, "p3");
        assert_eq!(tides.passages[2].text, "t3");
    }

    #[test]
    fn test_get_by_key() {
        let catalog = ContentCatalog::from_json(FICTION, NONFICTION).unwrap();
        let key = ItemKey::new(Category::Nonfiction, "How tides work");
        assert!(catalog.get(&key).is_some());
        assert!(catalog
            .get(&ItemKey::new(Category::Fiction, "How tides work"))
            .is_none());
    }

    #[test]
    fn test_rejects_wrong_arity() {
        let bad = r#"{"Short": {"a": "1", "b": "2", "c": "3"}}"#;
        let err = ContentCatalog::from_json(bad, NONFICTION).unwrap_err();
        assert!(matches!(err, ContentError::PassageCount { found: 3, .. }));
    }

    #[test]
    fn test_rejects_reserved_separator() {
        let bad = r#"{"Bad__prompt": {"a": "1", "b": "2", "c": "3", "d": "4"}}"#;
        let err = ContentCatalog::from_json(FICTION, bad).unwrap_err();
        assert!(matches!(err, ContentError::ReservedSeparator { .. }));
    }

    #[test]
    fn test_rejects_invalid_json() {
        let err = ContentCatalog::from_json("[1, 2]", NONFICTION).unwrap_err();
        assert!(matches!(
            err,
            ContentError::Parse {
                category: Category::Fiction,
                ..
            }
        ));
    }

    #[test]
    fn test_load_missing_file_is_fatal() {
        let mut non = NamedTempFile::new().unwrap();
        non.write_all(NONFICTION.as_bytes()).unwrap();

        let err = ContentCatalog::load(Path::new("/nonexistent/fiction.json"), non.path())
            .unwrap_err();
        assert!(matches!(err, ContentError::Read { .. }));
    }

    #[test]
    fn test_load_from_files() {
        let mut fic = NamedTempFile::new().unwrap();
        fic.write_all(FICTION.as_bytes()).unwrap();
        let mut non = NamedTempFile::new().unwrap();
        non.write_all(NONFICTION.as_bytes()).unwrap();

        let catalog = ContentCatalog::load(fic.path(), non.path()).unwrap();
        assert_eq!(catalog.items(Category::Fiction).len(), 2);
        assert_eq!(catalog.items(Category::Nonfiction).len(), 1);
    }
}
