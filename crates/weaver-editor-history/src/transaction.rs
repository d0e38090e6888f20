//! In-progress edits against a document.
//!
//! A [`Transaction`] starts from a document and selection, applies changes
//! one at a time and remembers, for each, the change that undoes it. Once
//! finished it is handed to the history (see [`crate::HistoryEditor`]), which
//! records it as an undoable group or as untracked drift.

use smol_str::SmolStr;

use crate::change::{Change, ChangeSet};
use crate::error::ChangeError;
use crate::text::TextBuffer;
use crate::types::{Selection, UserEvent};

#[derive(Clone, Debug)]
pub struct Transaction<T> {
    doc: T,
    changes: ChangeSet<Change>,
    /// `inverses[i]` undoes `changes[i]`.
    inverses: Vec<Change>,
    start_selection: Selection,
    selection: Selection,
    selection_set: bool,
    user_event: Option<UserEvent>,
    tracked: bool,
}

impl<T: TextBuffer> Transaction<T> {
    pub fn new(doc: T, selection: Selection) -> Self {
        Self {
            doc,
            changes: ChangeSet::new(),
            inverses: Vec::new(),
            start_selection: selection.clone(),
            selection,
            selection_set: false,
            user_event: None,
            tracked: true,
        }
    }

    /// Apply a change to the current document.
    ///
    /// The selection is mapped through the change unless it was set
    /// explicitly afterwards.
    pub fn change(&mut self, change: Change) -> Result<&mut Self, ChangeError> {
        let inverse = change.invert(&self.doc)?;
        change.apply(&mut self.doc)?;
        self.selection = self.selection.map(&change);
        self.changes.push(change);
        self.inverses.push(inverse);
        Ok(self)
    }

    /// Apply every change of `changes` in order.
    pub fn apply(&mut self, changes: &ChangeSet<Change>) -> Result<&mut Self, ChangeError> {
        for change in changes {
            self.change(change.clone())?;
        }
        Ok(self)
    }

    pub fn insert(&mut self, pos: usize, text: impl Into<SmolStr>) -> Result<&mut Self, ChangeError> {
        self.change(Change::insert(pos, text))
    }

    pub fn delete(&mut self, from: usize, to: usize) -> Result<&mut Self, ChangeError> {
        self.replace(from, to, "")
    }

    pub fn replace(
        &mut self,
        from: usize,
        to: usize,
        text: impl Into<SmolStr>,
    ) -> Result<&mut Self, ChangeError> {
        self.change(Change::try_new(from, to, text)?)
    }

    /// Replace the selection. Fails if it reaches past the current document.
    pub fn set_selection(&mut self, selection: Selection) -> Result<&mut Self, ChangeError> {
        selection.check(self.doc.len_chars())?;
        self.selection = selection;
        self.selection_set = true;
        Ok(self)
    }

    /// Tag the transaction with the user action that produced it.
    pub fn user_event(&mut self, event: UserEvent) -> &mut Self {
        self.user_event = Some(event);
        self
    }

    /// Keep the transaction out of the undo history. Its changes are still
    /// recorded as drift so older history entries map across them.
    pub fn untracked(&mut self) -> &mut Self {
        self.tracked = false;
        self
    }

    pub fn doc(&self) -> &T {
        &self.doc
    }

    pub fn changes(&self) -> &ChangeSet<Change> {
        &self.changes
    }

    /// Per-change inverses, indexed like [`Transaction::changes`].
    pub fn inverses(&self) -> &[Change] {
        &self.inverses
    }

    /// The changes that undo the whole transaction, in application order.
    pub fn inverted(&self) -> ChangeSet<Change> {
        self.inverses.iter().rev().cloned().collect()
    }

    pub fn start_selection(&self) -> &Selection {
        &self.start_selection
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Whether [`Transaction::set_selection`] was called.
    pub fn selection_set(&self) -> bool {
        self.selection_set
    }

    pub fn event(&self) -> Option<&UserEvent> {
        self.user_event.as_ref()
    }

    pub fn is_tracked(&self) -> bool {
        self.tracked
    }

    pub fn doc_changed(&self) -> bool {
        self.changes.iter().any(|change| !change.is_noop())
    }

    /// Finish the transaction, yielding the new document and selection.
    pub fn into_parts(self) -> (T, Selection) {
        (self.doc, self.selection)
    }
}
