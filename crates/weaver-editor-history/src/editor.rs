//! Editor state with undo history.
//!
//! `HistoryEditor<T>` owns a document, its selection and a [`HistoryState`].
//! Edits go through [`Transaction`]s which are dispatched back into the
//! editor; dispatching records them in the history. Undo and redo pop the
//! history and apply the result the same way.

use tracing::{debug, warn};
use web_time::Instant;

use crate::branch::PopFilter;
use crate::change::{Change, ChangeSet};
use crate::error::ChangeError;
use crate::history::{HistoryConfig, HistoryState, PopTarget};
use crate::text::TextBuffer;
use crate::transaction::Transaction;
use crate::types::Selection;
use crate::undo::UndoManager;

/// A document plus selection plus undo history.
#[derive(Clone, Debug)]
pub struct HistoryEditor<T> {
    doc: T,
    selection: Selection,
    history: HistoryState,
    config: HistoryConfig,
    /// Reference point for transaction timestamps.
    epoch: Instant,
}

impl<T: TextBuffer + Clone + Default> Default for HistoryEditor<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: TextBuffer + Clone> HistoryEditor<T> {
    /// Create a new editor with the default history settings.
    pub fn new(doc: T) -> Self {
        Self::with_config(doc, HistoryConfig::default())
    }

    pub fn with_config(doc: T, config: HistoryConfig) -> Self {
        Self {
            doc,
            selection: Selection::default(),
            history: HistoryState::new(&config),
            config,
            epoch: Instant::now(),
        }
    }

    pub fn doc(&self) -> &T {
        &self.doc
    }

    /// Get the full content as a String.
    pub fn content_string(&self) -> String {
        self.doc.to_string()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn history(&self) -> &HistoryState {
        &self.history
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Start a transaction on the current document and selection.
    pub fn transaction(&self) -> Transaction<T> {
        Transaction::new(self.doc.clone(), self.selection.clone())
    }

    /// Milliseconds since the editor was created.
    fn now(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Commit a transaction, timestamped now.
    pub fn dispatch(&mut self, tr: Transaction<T>) {
        let time = self.now();
        self.dispatch_at(tr, time);
    }

    /// Commit a transaction with an explicit timestamp in milliseconds.
    ///
    /// Tracked transactions that change the document become undo steps,
    /// tracked transactions that only move the selection become selection
    /// steps, and untracked ones are recorded as drift.
    pub fn dispatch_at(&mut self, tr: Transaction<T>, time: u64) {
        self.history = if !tr.is_tracked() {
            self.history.add_mapping(&tr.changes().desc())
        } else if tr.doc_changed() {
            self.history.add_changes(
                tr.changes(),
                Some(&tr.inverted()),
                tr.start_selection(),
                time,
                tr.event(),
                &self.config,
            )
        } else if tr.selection_set() && tr.selection() != tr.start_selection() {
            let empty = ChangeSet::new();
            self.history.add_changes(
                &empty,
                Some(&empty),
                tr.start_selection(),
                time,
                tr.event(),
                &self.config,
            )
        } else {
            self.history.clone()
        };
        self.commit(tr);
    }

    fn commit(&mut self, tr: Transaction<T>) {
        let (doc, selection) = tr.into_parts();
        self.doc = doc;
        self.selection = selection;
    }

    /// Apply changes made elsewhere. They are kept out of the undo history
    /// but local history maps across them.
    pub fn apply_remote(&mut self, changes: &ChangeSet<Change>) -> Result<(), ChangeError> {
        let mut tr = self.transaction();
        tr.untracked().apply(changes)?;
        debug!(target: "weaver::history", changes = changes.len(), "applied remote changes");
        self.dispatch(tr);
        Ok(())
    }

    /// Pop one step from `target`. Returns `Ok(false)` when there is
    /// nothing to pop, including when every remaining step was deleted by
    /// later edits.
    pub fn pop_history(&mut self, target: PopTarget, filter: PopFilter) -> Result<bool, ChangeError> {
        if !self.history.can_pop(target, filter) {
            return Ok(false);
        }
        let result = self
            .history
            .pop(target, filter, self.transaction(), &self.config)?;
        self.history = result.state;
        self.commit(result.transaction);
        Ok(result.popped)
    }

    /// Undo the newest step, including selection-only steps.
    pub fn undo_selection(&mut self) -> Result<bool, ChangeError> {
        self.pop_history(PopTarget::Done, PopFilter::Any)
    }

    /// Redo the newest undone step, including selection-only steps.
    pub fn redo_selection(&mut self) -> Result<bool, ChangeError> {
        self.pop_history(PopTarget::Undone, PopFilter::Any)
    }

    /// Number of undoable document changes.
    pub fn undo_depth(&self) -> usize {
        self.history.event_count(PopTarget::Done, PopFilter::OnlyChanges)
    }

    /// Number of redoable document changes.
    pub fn redo_depth(&self) -> usize {
        self.history.event_count(PopTarget::Undone, PopFilter::OnlyChanges)
    }

    /// Replace the newest `rebased_count` undo steps with their rebased
    /// versions and apply `changes` to the document.
    ///
    /// `changes` first undoes the local changes of those steps, newest
    /// first, then applies the confirmed remote changes, then re-applies
    /// the surviving local changes mirrored to their undo.
    pub fn rebase(&mut self, changes: &ChangeSet<Change>, rebased_count: usize) -> Result<(), ChangeError> {
        let history = self.history.rebase(changes, rebased_count, &self.doc)?;
        let mut tr = self.transaction();
        tr.apply(changes)?;
        self.history = history;
        self.commit(tr);
        Ok(())
    }

    fn pop_or_warn(&mut self, target: PopTarget) -> bool {
        match self.pop_history(target, PopFilter::OnlyChanges) {
            Ok(popped) => popped,
            Err(err) => {
                warn!(target: "weaver::history", ?target, %err, "history does not match the document");
                false
            }
        }
    }
}

impl<T: TextBuffer + Clone> UndoManager for HistoryEditor<T> {
    fn can_undo(&self) -> bool {
        self.history.can_pop(PopTarget::Done, PopFilter::OnlyChanges)
    }

    fn can_redo(&self) -> bool {
        self.history.can_pop(PopTarget::Undone, PopFilter::OnlyChanges)
    }

    fn undo(&mut self) -> bool {
        self.pop_or_warn(PopTarget::Done)
    }

    fn redo(&mut self) -> bool {
        self.pop_or_warn(PopTarget::Undone)
    }

    fn clear_history(&mut self) {
        self.history = HistoryState::new(&self.config);
    }
}
