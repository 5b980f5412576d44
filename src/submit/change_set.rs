//! ChangeSet
//!
//! Ordered, append-only collection of entries submitted together.
//! Entries are addressed by `EntryId`, which is their insertion index,
//! so hooks can append while the orchestrator walks the set by cursor.

use std::fmt;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use super::entry::Entry;
use super::request::EntryRequest;

/// Position of an entry within its changeset
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(usize);

impl EntryId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Batch of pending entries
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ChangeSet {
    entries: Vec<Entry>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a changeset from request-form entries, preserving order
    pub fn from_requests(requests: impl IntoIterator<Item = EntryRequest>) -> Self {
        let mut change_set = Self::new();
        for request in requests {
            change_set.push(request.into());
        }
        change_set
    }

    /// Append an entry, returning its id
    pub fn push(&mut self, mut entry: Entry) -> EntryId {
        let id = EntryId(self.entries.len());
        entry.assign_id(id);
        self.entries.push(entry);
        id
    }

    pub fn get(&self, id: EntryId) -> Option<&Entry> {
        self.entries.get(id.0)
    }

    pub fn get_mut(&mut self, id: EntryId) -> Option<&mut Entry> {
        self.entries.get_mut(id.0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Entry> {
        self.entries.iter_mut()
    }

    /// Ids of every entry currently in the set
    pub fn ids(&self) -> impl Iterator<Item = EntryId> {
        (0..self.entries.len()).map(EntryId)
    }

    /// Empty the live set, handing the entries back by value
    pub fn clear(&mut self) -> Vec<Entry> {
        std::mem::take(&mut self.entries)
    }
}

impl Index<EntryId> for ChangeSet {
    type Output = Entry;

    fn index(&self, id: EntryId) -> &Entry {
        &self.entries[id.0]
    }
}

impl IndexMut<EntryId> for ChangeSet {
    fn index_mut(&mut self, id: EntryId) -> &mut Entry {
        &mut self.entries[id.0]
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<Entry> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = Entry>>(iter: I) -> Self {
        let mut change_set = Self::new();
        for entry in iter {
            change_set.push(entry);
        }
        change_set
    }
}
