//! Two-pass deduplication of a cycle's candidate items.
//!
//! The in-cycle pass collapses identical items, the persisted pass drops
//! anything whose link is already stored. Items that share a link but differ
//! elsewhere survive both passes; the store's unique link is the backstop.

use std::collections::HashSet;

use crate::error::StoreError;
use crate::fetcher::CandidateItem;
use crate::store::ArticleStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupOutcome {
    pub survivors: Vec<CandidateItem>,
    pub in_cycle_duplicates: usize,
    pub already_stored: usize,
}

/// Keep the first occurrence of each distinct item, preserving order.
pub fn dedup_in_cycle(items: Vec<CandidateItem>) -> (Vec<CandidateItem>, usize) {
    let mut seen = HashSet::with_capacity(items.len());
    let mut kept = Vec::with_capacity(items.len());
    let mut dropped = 0;

    for item in items {
        if seen.contains(&item) {
            dropped += 1;
            continue;
        }
        seen.insert(item.clone());
        kept.push(item);
    }

    (kept, dropped)
}

/// Drop items whose link the store already holds.
pub async fn filter_persisted(
    items: Vec<CandidateItem>,
    store: &dyn ArticleStore,
) -> Result<(Vec<CandidateItem>, usize), StoreError> {
    if items.is_empty() {
        return Ok((items, 0));
    }

    let links: Vec<&str> = items.iter().map(|i| i.link.as_str()).collect();
    let existing = store.existing_links(&links).await?;

    let before = items.len();
    let kept: Vec<_> = items
        .into_iter()
        .filter(|item| !existing.contains(&item.link))
        .collect();
    let dropped = before - kept.len();

    Ok((kept, dropped))
}

pub async fn deduplicate(
    items: Vec<CandidateItem>,
    store: &dyn ArticleStore,
) -> Result<DedupOutcome, StoreError> {
    let (unique, in_cycle_duplicates) = dedup_in_cycle(items);
    let (survivors, already_stored) = filter_persisted(unique, store).await?;

    Ok(DedupOutcome {
        survivors,
        in_cycle_duplicates,
        already_stored,
    })
}
