//! Annotation record model
//!
//! Pure in-memory representation of one annotator's progress: per-item
//! ratings, rankings and feedback plus the session-level workflow feedback.
//! No I/O happens here; see [`crate::persistence`] for the sinks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Separator between category and prompt in a flattened item key
pub const KEY_SEPARATOR: &str = "__";

/// Number of candidate passages shown for every prompt
pub const PASSAGES_PER_ITEM: usize = 4;

/// Content category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Fiction,
    Nonfiction,
}

impl Category {
    /// Page order: fiction tasks come first
    pub const ALL: [Category; 2] = [Category::Fiction, Category::Nonfiction];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Fiction => "fiction",
            Category::Nonfiction => "nonfiction",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite key of one content item
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    pub category: Category,
    pub prompt: String,
}

impl ItemKey {
    pub fn new(category: Category, prompt: impl Into<String>) -> Self {
        Self {
            category,
            prompt: prompt.into(),
        }
    }

    /// Flatten to `{category}__{prompt}`
    pub fn encode(&self) -> String {
        format!("{}{}{}", self.category, KEY_SEPARATOR, self.prompt)
    }

    /// Inverse of [`ItemKey::encode`]; splits on the first separator
    pub fn decode(flat: &str) -> Option<Self> {
        let (category, prompt) = flat.split_once(KEY_SEPARATOR)?;
        Some(Self::new(Category::parse(category)?, prompt))
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.prompt)
    }
}

/// Quality dimensions rated for every passage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dimension {
    Originality,
    Elaboration,
    Clarity,
    Coherence,
    #[serde(rename = "Semantic Density")]
    SemanticDensity,
    #[serde(rename = "Not a Summary")]
    NotASummary,
    Engagement,
    Overall,
}

impl Dimension {
    /// Display order
    pub const ALL: [Dimension; 8] = [
        Dimension::Originality,
        Dimension::Elaboration,
        Dimension::Clarity,
        Dimension::Coherence,
        Dimension::SemanticDensity,
        Dimension::NotASummary,
        Dimension::Engagement,
        Dimension::Overall,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Dimension::Originality => "Originality",
            Dimension::Elaboration => "Elaboration",
            Dimension::Clarity => "Clarity",
            Dimension::Coherence => "Coherence",
            Dimension::SemanticDensity => "Semantic Density",
            Dimension::NotASummary => "Not a Summary",
            Dimension::Engagement => "Engagement",
            Dimension::Overall => "Overall",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.label() == label)
    }
}

/// Passage position within an item, 1..=4, serialized as `"Paragraph N"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slot(u8);

impl Slot {
    pub const ALL: [Slot; PASSAGES_PER_ITEM] = [Slot(1), Slot(2), Slot(3), Slot(4)];

    pub fn new(number: u8) -> Option<Self> {
        (1..=PASSAGES_PER_ITEM as u8).contains(&number).then_some(Self(number))
    }

    pub fn number(&self) -> u8 {
        self.0
    }

    pub fn label(&self) -> String {
        format!("Paragraph {}", self.0)
    }
}

impl TryFrom<String> for Slot {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value
            .strip_prefix("Paragraph ")
            .and_then(|n| n.parse::<u8>().ok())
            .and_then(Slot::new)
            .ok_or_else(|| format!("invalid passage slot '{}'", value))
    }
}

impl From<Slot> for String {
    fn from(value: Slot) -> Self {
        value.label()
    }
}

/// Likert score: 1 = very bad .. 4 = very good
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Score(u8);

impl Score {
    /// Value every cell starts with; indistinguishable from a real 1
    pub const DEFAULT: Score = Score(1);

    pub fn new(value: u8) -> Option<Self> {
        (1..=4).contains(&value).then_some(Self(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Score {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Score::new(value).ok_or_else(|| format!("score {} outside 1..=4", value))
    }
}

impl From<Score> for u8 {
    fn from(value: Score) -> Self {
        value.0
    }
}

/// Preference rank: 1 = best .. 4 = worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rank(u8);

impl Rank {
    pub fn new(value: u8) -> Option<Self> {
        (1..=PASSAGES_PER_ITEM as u8).contains(&value).then_some(Self(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Rank {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Rank::new(value).ok_or_else(|| format!("rank {} outside 1..=4", value))
    }
}

impl From<Rank> for u8 {
    fn from(value: Rank) -> Self {
        value.0
    }
}

/// Free-text fields attached to one item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemFeedbackField {
    RankingRationale,
    Comments,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFeedback {
    #[serde(default)]
    pub ranking_rationale: String,
    #[serde(default)]
    pub comments: String,
}

/// Why an item cannot be considered complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ItemDefect {
    #[error("Please assign a rank to every paragraph.")]
    MissingRank,
    #[error("Duplicate ranks detected.")]
    DuplicateRank,
}

/// Mutable unit of work for one content item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAnnotation {
    pub ranking: BTreeMap<Slot, Option<Rank>>,
    pub ratings: BTreeMap<Slot, BTreeMap<Dimension, Score>>,
    #[serde(default)]
    pub feedback: ItemFeedback,
}

impl Default for ItemAnnotation {
    fn default() -> Self {
        let ranking = Slot::ALL.into_iter().map(|slot| (slot, None)).collect();
        let ratings = Slot::ALL
            .into_iter()
            .map(|slot| {
                let cells = Dimension::ALL
                    .into_iter()
                    .map(|dim| (dim, Score::DEFAULT))
                    .collect();
                (slot, cells)
            })
            .collect();
        Self {
            ranking,
            ratings,
            feedback: ItemFeedback::default(),
        }
    }
}

impl ItemAnnotation {
    pub fn rating(&self, slot: Slot, dimension: Dimension) -> Score {
        self.ratings
            .get(&slot)
            .and_then(|cells| cells.get(&dimension))
            .copied()
            .unwrap_or(Score::DEFAULT)
    }

    pub fn rank(&self, slot: Slot) -> Option<Rank> {
        self.ranking.get(&slot).copied().flatten()
    }

    /// Check the permutation invariant
    ///
    /// A missing rank is reported before a duplicate.
    pub fn check(&self) -> Result<(), ItemDefect> {
        let mut seen = [false; PASSAGES_PER_ITEM];
        let mut duplicate = false;
        for slot in Slot::ALL {
            let rank = self.rank(slot).ok_or(ItemDefect::MissingRank)?;
            let idx = usize::from(rank.value() - 1);
            duplicate |= seen[idx];
            seen[idx] = true;
        }
        if duplicate {
            Err(ItemDefect::DuplicateRank)
        } else {
            Ok(())
        }
    }

    pub fn is_complete(&self) -> bool {
        self.check().is_ok()
    }

    /// Fill cells absent from an older or partial payload with defaults
    pub(crate) fn fill_defaults(&mut self) {
        for slot in Slot::ALL {
            self.ranking.entry(slot).or_insert(None);
            let cells = self.ratings.entry(slot).or_default();
            for dim in Dimension::ALL {
                cells.entry(dim).or_insert(Score::DEFAULT);
            }
        }
    }
}

/// Everything persisted for one (annotator, session) pair
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRecord {
    items: BTreeMap<ItemKey, ItemAnnotation>,
    pub workflow_feedback: String,
    pub last_saved: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ItemKey) -> Option<&ItemAnnotation> {
        self.items.get(key)
    }

    /// Annotation for `key`, created with defaults when absent
    pub fn get_or_create(&mut self, key: &ItemKey) -> &mut ItemAnnotation {
        self.items.entry(key.clone()).or_default()
    }

    pub fn insert(&mut self, key: ItemKey, annotation: ItemAnnotation) {
        self.items.insert(key, annotation);
    }

    pub fn items(&self) -> impl Iterator<Item = (&ItemKey, &ItemAnnotation)> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn set_rating(&mut self, key: &ItemKey, slot: Slot, dimension: Dimension, score: Score) {
        self.get_or_create(key)
            .ratings
            .entry(slot)
            .or_default()
            .insert(dimension, score);
    }

    /// Set or clear a rank; duplicates are accepted here and rejected at the gates
    pub fn set_rank(&mut self, key: &ItemKey, slot: Slot, rank: Option<Rank>) {
        self.get_or_create(key).ranking.insert(slot, rank);
    }

    pub fn set_item_feedback(&mut self, key: &ItemKey, field: ItemFeedbackField, text: String) {
        let feedback = &mut self.get_or_create(key).feedback;
        match field {
            ItemFeedbackField::RankingRationale => feedback.ranking_rationale = text,
            ItemFeedbackField::Comments => feedback.comments = text,
        }
    }

    pub fn set_workflow_feedback(&mut self, text: String) {
        self.workflow_feedback = text;
    }

    /// An item never visited has no ranks and is therefore incomplete
    pub fn check_item(&self, key: &ItemKey) -> Result<(), ItemDefect> {
        self.items
            .get(key)
            .ok_or(ItemDefect::MissingRank)
            .and_then(ItemAnnotation::check)
    }

    pub fn is_complete(&self, key: &ItemKey) -> bool {
        self.check_item(key).is_ok()
    }

    /// First defect across `keys`: any missing rank wins over any duplicate
    pub fn first_defect<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a ItemKey>,
    ) -> Option<(ItemKey, ItemDefect)> {
        let defects: Vec<(ItemKey, ItemDefect)> = keys
            .into_iter()
            .filter_map(|key| self.check_item(key).err().map(|d| (key.clone(), d)))
            .collect();
        defects
            .iter()
            .find(|(_, d)| *d == ItemDefect::MissingRank)
            .or_else(|| defects.first())
            .cloned()
    }

    pub fn is_session_complete<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a ItemKey>,
    ) -> bool {
        self.first_defect(keys).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(prompt: &str) -> ItemKey {
        ItemKey::new(Category::Fiction, prompt)
    }

    fn rank_all(record: &mut SessionRecord, key: &ItemKey, ranks: [Option<u8>; 4]) {
        for (slot, rank) in Slot::ALL.into_iter().zip(ranks) {
            record.set_rank(key, slot, rank.and_then(Rank::new));
        }
    }

    #[test]
    fn test_get_or_create_defaults() {
        let mut record = SessionRecord::new();
        let item = record.get_or_create(&key("A lighthouse keeper")).clone();

        for slot in Slot::ALL {
            assert_eq!(item.rank(slot), None);
            for dim in Dimension::ALL {
                assert_eq!(item.rating(slot, dim), Score::DEFAULT);
            }
        }
        assert_eq!(item.feedback, ItemFeedback::default());
    }

    #[test]
    fn test_completeness_truth_table() {
        let mut record = SessionRecord::new();
        let k = key("p");

        // Never visited
        assert_eq!(record.check_item(&k), Err(ItemDefect::MissingRank));

        rank_all(&mut record, &k, [Some(1), Some(2), Some(3), None]);
        assert_eq!(record.check_item(&k), Err(ItemDefect::MissingRank));

        rank_all(&mut record, &k, [Some(1), Some(1), Some(3), Some(4)]);
        assert_eq!(record.check_item(&k), Err(ItemDefect::DuplicateRank));

        rank_all(&mut record, &k, [Some(4), Some(2), Some(3), Some(1)]);
        assert!(record.is_complete(&k));

        // Missing rank wins over duplicate within one item
        rank_all(&mut record, &k, [Some(2), Some(2), None, Some(1)]);
        assert_eq!(record.check_item(&k), Err(ItemDefect::MissingRank));
    }

    #[test]
    fn test_first_defect_prefers_missing_rank_across_items() {
        let mut record = SessionRecord::new();
        let a = key("a");
        let b = key("b");
        rank_all(&mut record, &a, [Some(1), Some(1), Some(2), Some(3)]);
        rank_all(&mut record, &b, [Some(1), None, Some(2), Some(3)]);

        let keys = [a.clone(), b.clone()];
        assert_eq!(
            record.first_defect(keys.iter()),
            Some((b.clone(), ItemDefect::MissingRank))
        );

        rank_all(&mut record, &b, [Some(1), Some(4), Some(2), Some(3)]);
        assert_eq!(
            record.first_defect(keys.iter()),
            Some((a, ItemDefect::DuplicateRank))
        );
    }

    #[test]
    fn test_session_complete_with_no_items() {
        let record = SessionRecord::new();
        assert!(record.is_session_complete(std::iter::empty::<&ItemKey>()));
    }

    #[test]
    fn test_set_rating_and_feedback() {
        let mut record = SessionRecord::new();
        let k = key("p");
        let slot = Slot::new(2).unwrap();
        record.set_rating(&k, slot, Dimension::Clarity, Score::new(3).unwrap());
        record.set_item_feedback(&k, ItemFeedbackField::Comments, "too long".to_string());

        let item = record.get(&k).unwrap();
        assert_eq!(item.rating(slot, Dimension::Clarity).value(), 3);
        assert_eq!(item.rating(slot, Dimension::Overall).value(), 1);
        assert_eq!(item.feedback.comments, "too long");
    }

    #[test]
    fn test_item_key_encode_decode() {
        let k = ItemKey::new(Category::Nonfiction, "Why do cats purr?");
        assert_eq!(k.encode(), "nonfiction__Why do cats purr?");
        assert_eq!(ItemKey::decode(&k.encode()), Some(k));

        assert_eq!(ItemKey::decode("workflow_feedback"), None);
        assert_eq!(ItemKey::decode("poetry__x"), None);
    }

    #[test]
    fn test_bounded_values() {
        assert!(Score::new(0).is_none());
        assert!(Score::new(5).is_none());
        assert!(Rank::new(4).is_some());
        assert!(Slot::new(5).is_none());
        assert_eq!(Dimension::from_label("Not a Summary"), Some(Dimension::NotASummary));
        assert_eq!(Dimension::from_label("Overall Quality"), None);
    }

    #[test]
    fn test_annotation_json_shape() {
        let item = ItemAnnotation::default();
        let json = serde_json::to_value(&item).unwrap();
        assert!(json["ranking"]["Paragraph 1"].is_null());
        assert_eq!(json["ratings"]["Paragraph 4"]["Semantic Density"], 1);

        let back: ItemAnnotation = serde_json::from_value(json).unwrap();
        assert_eq!(back, item);
    }
}
