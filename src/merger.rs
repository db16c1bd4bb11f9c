use crate::models::{Item, Origin};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// What to do when an incoming item carries an identity that is already
/// present in the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Keep both copies.
    Append,
    /// Keep the first copy, drop the newcomer.
    #[default]
    DropIncoming,
    /// Overwrite the first copy in place.
    ReplaceExisting,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub appended: usize,
    pub dropped: usize,
    pub replaced: usize,
}

/// Rows of the current epoch in arrival order. Read-only outside the crate;
/// [`ResultMerger`] is the only writer.
#[derive(Debug, Default)]
pub struct ResultCollection {
    items: Vec<Item>,
    positions: HashMap<String, usize>,
}

impl ResultCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, row: usize) -> Option<&Item> {
        self.items.get(row)
    }

    pub fn find(&self, identity: &str) -> Option<&Item> {
        self.positions.get(identity).and_then(|row| self.items.get(*row))
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
        self.positions.clear();
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResultMerger {
    policy: DuplicatePolicy,
}

impl ResultMerger {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self { policy }
    }

    pub fn merge(
        &self,
        collection: &mut ResultCollection,
        incoming: Vec<Item>,
        origin: Origin,
    ) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        for item in incoming {
            let identity = item.identity().unwrap_or_default();
            let existing = collection.positions.get(&identity).copied();
            match (existing, self.policy) {
                (Some(_), DuplicatePolicy::DropIncoming) => {
                    outcome.dropped += 1;
                }
                (Some(row), DuplicatePolicy::ReplaceExisting) => {
                    collection.items[row] = item;
                    outcome.replaced += 1;
                }
                (Some(_), DuplicatePolicy::Append) => {
                    collection.items.push(item);
                    outcome.appended += 1;
                }
                (None, _) => {
                    collection.positions.insert(identity, collection.items.len());
                    collection.items.push(item);
                    outcome.appended += 1;
                }
            }
        }

        if outcome.dropped > 0 || outcome.replaced > 0 {
            tracing::debug!(
                origin = origin.as_str(),
                dropped = outcome.dropped,
                replaced = outcome.replaced,
                "merged batch contained known identities"
            );
        }
        outcome
    }

    /// Optimistic single-field write. Returns false when the identity is not
    /// loaded.
    pub fn patch_item(
        &self,
        collection: &mut ResultCollection,
        identity: &str,
        field: &str,
        value: Value,
    ) -> bool {
        let Some(row) = collection.positions.get(identity).copied() else {
            return false;
        };
        collection.items[row].set(field, value);
        true
    }
}
