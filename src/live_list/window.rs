use crate::core::{Cursor, ListEntity};
use im::Vector;
use std::collections::HashSet;

/// Result of appending a fetched batch to a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Batch applied; the count excludes items already present.
    Appended(usize),
    /// The window was replaced after the fetch started; batch discarded.
    Stale,
}

/// Locally cached, newest-first slice of a collection.
///
/// `generation` advances on every wholesale replacement so that a fetch
/// issued against an older window can be recognized and dropped.
#[derive(Debug, Clone)]
pub struct EntityWindow<T: Clone> {
    items: Vector<T>,
    cursor: Option<Cursor>,
    exhausted: bool,
    generation: u64,
}

impl<T: ListEntity + Clone> EntityWindow<T> {
    pub fn new() -> Self {
        Self {
            items: Vector::new(),
            cursor: None,
            exhausted: false,
            generation: 0,
        }
    }

    /// Replaces the window with a live snapshot fetched with `limit`.
    pub fn replace(&mut self, snapshot: Vec<T>, limit: usize) -> u64 {
        self.generation += 1;
        self.exhausted = snapshot.len() < limit;
        self.cursor = snapshot.last().map(ListEntity::cursor);

        let mut seen = HashSet::new();
        self.items = snapshot
            .into_iter()
            .filter(|item| seen.insert(item.id().to_string()))
            .collect();
        self.generation
    }

    /// Appends an older batch fetched with `limit` while the window was at
    /// `generation`.
    pub fn append(&mut self, generation: u64, batch: Vec<T>, limit: usize) -> AppendOutcome {
        if generation != self.generation {
            return AppendOutcome::Stale;
        }

        self.exhausted = batch.len() < limit;
        if let Some(last) = batch.last() {
            self.cursor = Some(last.cursor());
        }

        let mut seen: HashSet<String> = self.items.iter().map(|i| i.id().to_string()).collect();
        let mut added = 0;
        for item in batch {
            if seen.insert(item.id().to_string()) {
                self.items.push_back(item);
                added += 1;
            }
        }
        AppendOutcome::Appended(added)
    }

    /// Drops everything; the next snapshot starts a fresh window.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.items.clear();
        self.cursor = None;
        self.exhausted = false;
    }

    /// Empty window with nothing left to fetch.
    pub fn close_empty(&mut self) {
        self.reset();
        self.exhausted = true;
    }

    pub fn items(&self) -> &Vector<T> {
        &self.items
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: ListEntity + Clone> Default for EntityWindow<T> {
    fn default() -> Self {
        Self::new()
    }
}
