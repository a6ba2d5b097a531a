//! Bounded undo/redo history, one instance per image.
//!
//! History is a sequence of immutable before/after snapshots rather than a
//! chain of mutable callbacks: undo applies the `before` side of every
//! change in an entry, redo the `after` side. A new commit always clears
//! the redo stack.

use std::collections::VecDeque;

use crate::model::Annotation;

/// One annotation's state on both sides of a mutation.
///
/// `before == None` means the annotation was created, `after == None` that
/// it was deleted; both present means it was modified in place.
#[derive(Clone, Debug, PartialEq)]
pub struct AnnChange {
    pub before: Option<Annotation>,
    pub after: Option<Annotation>,
    /// Sequence position a deleted annotation held, so undo reinserts it
    /// there instead of appending. The sequence order is the stacking order.
    pub index: Option<usize>,
}

impl AnnChange {
    pub fn created(after: Annotation) -> Self {
        Self {
            before: None,
            after: Some(after),
            index: None,
        }
    }

    pub fn deleted(before: Annotation, index: usize) -> Self {
        Self {
            before: Some(before),
            after: None,
            index: Some(index),
        }
    }

    pub fn modified(before: Annotation, after: Annotation) -> Self {
        Self {
            before: Some(before),
            after: Some(after),
            index: None,
        }
    }
}

/// A reversible mutation: every annotation touched by one commit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UndoEntry {
    pub changes: Vec<AnnChange>,
}

impl UndoEntry {
    pub fn single(change: AnnChange) -> Self {
        Self {
            changes: vec![change],
        }
    }
}

/// Per-image undo/redo stacks with a bounded depth.
#[derive(Clone, Debug)]
pub struct History {
    undo: VecDeque<UndoEntry>,
    redo: Vec<UndoEntry>,
    depth: usize,
}

impl History {
    pub fn new(depth: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            depth,
        }
    }

    /// Records a fresh commit. Discards the oldest entry beyond the depth
    /// bound and invalidates any redo tail.
    pub fn record(&mut self, entry: UndoEntry) {
        self.redo.clear();
        self.undo.push_back(entry);
        while self.undo.len() > self.depth {
            self.undo.pop_front();
        }
    }

    /// Moves the most recent entry onto the redo stack and returns a copy
    /// for the store to apply in reverse.
    pub fn pop_undo(&mut self) -> Option<UndoEntry> {
        let entry = self.undo.pop_back()?;
        self.redo.push(entry.clone());
        Some(entry)
    }

    /// Moves the most recently undone entry back and returns a copy for the
    /// store to reapply.
    pub fn pop_redo(&mut self) -> Option<UndoEntry> {
        let entry = self.redo.pop()?;
        self.undo.push_back(entry.clone());
        Some(entry)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }
}
