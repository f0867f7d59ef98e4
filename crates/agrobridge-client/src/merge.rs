//! Identity-keyed merging of category pages into the two feed lists.

use std::collections::{HashMap, HashSet};

use agrobridge_core::{CategoryPage, ProductId};

use crate::identity::Identify;

/// An ordered collection that holds at most one item per identity.
///
/// Inserting an identity that is already present replaces the item in place,
/// so positions reflect first arrival.
#[derive(Debug, Clone)]
pub struct IdentityList<T> {
    items: Vec<T>,
    index: HashMap<ProductId, usize>,
}

impl<T> Default for IdentityList<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: Identify> IdentityList<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    #[must_use]
    pub fn contains(&self, id: &ProductId) -> bool {
        self.index.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &ProductId> {
        self.items.iter().map(Identify::product_id)
    }

    /// Inserts or replaces by identity. Returns `true` when the identity is new.
    pub fn upsert(&mut self, item: T) -> bool {
        if let Some(&pos) = self.index.get(item.product_id()) {
            self.items[pos] = item;
            false
        } else {
            self.index.insert(item.product_id().clone(), self.items.len());
            self.items.push(item);
            true
        }
    }

    /// Removes every item whose identity is in `ids`, keeping the rest in
    /// order. Returns how many were removed.
    pub fn remove_ids(&mut self, ids: &HashSet<ProductId>) -> usize {
        let before = self.items.len();
        self.items.retain(|item| !ids.contains(item.product_id()));
        let removed = before - self.items.len();
        if removed > 0 {
            self.reindex();
        }
        removed
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.index.clear();
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (pos, item) in self.items.iter().enumerate() {
            self.index.insert(item.product_id().clone(), pos);
        }
    }
}

impl<'a, T> IntoIterator for &'a IdentityList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// What one [`ProductLists::apply`] call changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub deliverable_added: usize,
    pub deliverable_updated: usize,
    pub non_deliverable_added: usize,
    pub non_deliverable_updated: usize,
    /// Incoming non-deliverable items dropped because they are deliverable.
    pub conflicts_dropped: usize,
    /// Existing non-deliverable items moved out because they became deliverable.
    pub reclassified: usize,
}

/// The deliverable and non-deliverable lists of a feed.
///
/// An identity is never in both lists; deliverable wins.
#[derive(Debug, Clone)]
pub struct ProductLists<T> {
    deliverable: IdentityList<T>,
    non_deliverable: IdentityList<T>,
}

impl<T> Default for ProductLists<T> {
    fn default() -> Self {
        Self {
            deliverable: IdentityList::default(),
            non_deliverable: IdentityList::default(),
        }
    }
}

impl<T: Identify> ProductLists<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn deliverable(&self) -> &IdentityList<T> {
        &self.deliverable
    }

    #[must_use]
    pub fn non_deliverable(&self) -> &IdentityList<T> {
        &self.non_deliverable
    }

    pub fn clear(&mut self) {
        self.deliverable.clear();
        self.non_deliverable.clear();
    }

    /// Merges one page into the lists.
    ///
    /// Incoming deliverable items are upserted first. Existing non-deliverable
    /// items that are now deliverable are removed, and incoming non-deliverable
    /// items whose identity is deliverable (from this page or an earlier one)
    /// are dropped before the rest are upserted. Applying the same page twice
    /// leaves the lists as after the first time.
    pub fn apply(&mut self, page: CategoryPage<T>) -> MergeReport {
        let mut report = MergeReport::default();

        for item in page.deliverable_products {
            if self.deliverable.upsert(item) {
                report.deliverable_added += 1;
            } else {
                report.deliverable_updated += 1;
            }
        }

        let deliverable_ids: HashSet<ProductId> = self.deliverable.ids().cloned().collect();
        report.reclassified = self.non_deliverable.remove_ids(&deliverable_ids);

        for item in page.non_deliverable_products {
            if deliverable_ids.contains(item.product_id()) {
                report.conflicts_dropped += 1;
                continue;
            }
            if self.non_deliverable.upsert(item) {
                report.non_deliverable_added += 1;
            } else {
                report.non_deliverable_updated += 1;
            }
        }

        report
    }

    /// Whether no identity appears in both lists.
    #[must_use]
    pub fn is_partitioned(&self) -> bool {
        self.non_deliverable
            .ids()
            .all(|id| !self.deliverable.contains(id))
    }
}

#[cfg(test)]
#[path = "merge_test.rs"]
mod tests;
