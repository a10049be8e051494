//! Selection store.
//!
//! Holds the ids the user has ticked in the current listing and derives the
//! toolbar and select-all button state from them.
//!
//! The selection is always a subset of the listing it was made in:
//!
//! - installing a listing with a different [`ListQuery`] (navigation, a new
//!   category or search) clears the selection;
//! - installing a fresh copy of the same listing (a refresh after a delete,
//!   rename or upload) drops ids that disappeared and keeps the rest.
//!
//! Ids outside the listing are ignored by every mutation, so [`count`]
//! never reports stale entries.
//!
//! [`count`]: SelectionStore::count

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::api::FileId;
use crate::listing::ListQuery;

/// Anything that can answer "is this id ticked?".
pub trait IsSelected {
    /// Whether `id` is selected.
    fn is_selected(&self, id: FileId) -> bool;
}

impl IsSelected for HashSet<FileId> {
    fn is_selected(&self, id: FileId) -> bool {
        self.contains(&id)
    }
}

impl IsSelected for [FileId] {
    fn is_selected(&self, id: FileId) -> bool {
        self.contains(&id)
    }
}

/// Label of the select-all button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "count")]
pub enum SelectAllState {
    /// Nothing selected
    SelectAll,
    /// Some but not all selected
    Partial(usize),
    /// Everything selected
    DeselectAll,
}

impl fmt::Display for SelectAllState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelectAll => f.write_str("select all"),
            Self::Partial(n) => write!(f, "{n} selected"),
            Self::DeselectAll => f.write_str("deselect all"),
        }
    }
}

/// Batch toolbar state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Toolbar {
    /// Shown only while something is selected
    pub visible: bool,
    /// Number of selected entries
    pub count: usize,
}

/// The selected ids of the active listing.
#[derive(Debug, Default)]
pub struct SelectionStore {
    listing_key: Option<ListQuery>,
    listing: Vec<FileId>,
    listed: HashSet<FileId>,
    selected: HashSet<FileId>,
    revision: u64,
}

impl SelectionStore {
    /// An empty store with no listing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the listing the selection operates over.
    ///
    /// Returns whether the selection changed.
    pub fn set_listing(&mut self, key: &ListQuery, ids: impl IntoIterator<Item = FileId>) -> bool {
        self.listing = ids.into_iter().collect();
        self.listed = self.listing.iter().copied().collect();

        let same_listing = self.listing_key.as_ref() == Some(key);
        if !same_listing {
            self.listing_key = Some(key.clone());
        }

        let before = self.selected.len();
        if same_listing {
            let listed = &self.listed;
            self.selected.retain(|id| listed.contains(id));
        } else {
            self.selected.clear();
        }

        let changed = self.selected.len() != before;
        if changed {
            tracing::debug!(
                kept = self.selected.len(),
                dropped = before - self.selected.len(),
                "selection pruned"
            );
        }
        self.bump(true);
        changed
    }

    /// Identity of the installed listing.
    pub const fn listing_key(&self) -> Option<&ListQuery> {
        self.listing_key.as_ref()
    }

    /// Flip membership of `id`. Returns whether it is now selected.
    pub fn toggle(&mut self, id: FileId) -> bool {
        let checked = !self.selected.contains(&id);
        self.set_checked(id, checked);
        self.selected.contains(&id)
    }

    /// Checkbox semantics: select or deselect `id`.
    pub fn set_checked(&mut self, id: FileId, checked: bool) {
        if !self.listed.contains(&id) {
            return;
        }
        let changed = if checked {
            self.selected.insert(id)
        } else {
            self.selected.remove(&id)
        };
        self.bump(changed);
    }

    /// Make the selection exactly `ids` (restricted to the listing).
    pub fn select_all(&mut self, ids: impl IntoIterator<Item = FileId>) {
        let next: HashSet<FileId> = ids
            .into_iter()
            .filter(|id| self.listed.contains(id))
            .collect();
        let changed = next != self.selected;
        self.selected = next;
        self.bump(changed);
    }

    /// Deselect everything.
    pub fn clear_all(&mut self) {
        let changed = !self.selected.is_empty();
        self.selected.clear();
        self.bump(changed);
    }

    /// The select-all button: selects everything unless everything is
    /// already selected, in which case it clears. Decided from live counts.
    pub fn toggle_all(&mut self) -> SelectAllState {
        if self.count() < self.total() {
            let all = self.listing.clone();
            self.select_all(all);
        } else {
            self.clear_all();
        }
        self.select_all_state()
    }

    /// Number of selected entries.
    pub fn count(&self) -> usize {
        self.selected.len()
    }

    /// Number of entries in the listing.
    pub fn total(&self) -> usize {
        self.listing.len()
    }

    /// Whether nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Selected ids in listing order.
    pub fn selected_ids(&self) -> Vec<FileId> {
        self.listing
            .iter()
            .copied()
            .filter(|id| self.selected.contains(id))
            .collect()
    }

    /// Current select-all label.
    pub fn select_all_state(&self) -> SelectAllState {
        match self.count() {
            0 => SelectAllState::SelectAll,
            n if n < self.total() => SelectAllState::Partial(n),
            _ => SelectAllState::DeselectAll,
        }
    }

    /// Current toolbar state.
    pub fn toolbar(&self) -> Toolbar {
        Toolbar {
            visible: self.count() > 0,
            count: self.count(),
        }
    }

    /// Incremented on every change; observers re-render when it moves.
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    fn bump(&mut self, changed: bool) {
        if changed {
            self.revision += 1;
        }
    }
}

impl IsSelected for SelectionStore {
    fn is_selected(&self, id: FileId) -> bool {
        self.selected.contains(&id)
    }
}
