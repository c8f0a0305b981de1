//! Deterministic prompt assignment
//!
//! Annotator `n` receives the contiguous block `[(n-1)*K, (n-1)*K + K)` of
//! each category's prompt list. Blocks of distinct annotators never overlap,
//! and re-running the assignment after a crash yields the same task sequence.

use serde::Serialize;

use crate::content::ContentCatalog;
use crate::identity::{AnnotatorId, AnnotatorRoster};
use crate::record::{Category, ItemKey};

/// Prompts per category per annotator
pub const DEFAULT_PROMPTS_PER_ANNOTATOR: usize = 2;

/// Slice of `items` assigned to `annotator`
///
/// Short or empty when the collection runs out; never panics.
pub fn assign<'a, T>(annotator: &AnnotatorId, items: &'a [T], per_annotator: usize) -> &'a [T] {
    let block = (annotator.ordinal() as usize).saturating_sub(1);
    let start = block.saturating_mul(per_annotator).min(items.len());
    let end = start.saturating_add(per_annotator).min(items.len());
    &items[start..end]
}

/// Task pages for one session: fiction block, then nonfiction block
///
/// The trailing feedback page is implicit (see [`crate::session`]).
pub fn task_sequence(
    annotator: &AnnotatorId,
    catalog: &ContentCatalog,
    per_annotator: usize,
) -> Vec<ItemKey> {
    Category::ALL
        .into_iter()
        .flat_map(|category| {
            assign(annotator, catalog.items(category), per_annotator)
                .iter()
                .map(|item| item.key.clone())
        })
        .collect()
}

/// An annotator whose block in one category is shorter than configured
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapacityShortfall {
    pub annotator: AnnotatorId,
    pub category: Category,
    pub assigned: usize,
    pub expected: usize,
}

/// Startup check of `roster.len() * K <= items` per category
pub fn check_capacity(
    roster: &AnnotatorRoster,
    catalog: &ContentCatalog,
    per_annotator: usize,
) -> Vec<CapacityShortfall> {
    let mut shortfalls = Vec::new();
    for annotator in roster.ids() {
        for category in Category::ALL {
            let assigned = assign(annotator, catalog.items(category), per_annotator).len();
            if assigned < per_annotator {
                shortfalls.push(CapacityShortfall {
                    annotator: annotator.clone(),
                    category,
                    assigned,
                    expected: per_annotator,
                });
            }
        }
    }
    shortfalls
}
