//! Undo/redo history state.
//!
//! [`HistoryState`] pairs a *done* and an *undone* [`Branch`]. It is an
//! immutable value: every operation returns a new state, and untouched
//! parts are shared with the old one.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::branch::{Branch, MergePolicy, PopFilter};
use crate::change::{Change, ChangeDesc, ChangeSet};
use crate::error::ChangeError;
use crate::text::TextBuffer;
use crate::transaction::Transaction;
use crate::types::{Selection, UserEvent};

/// History settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Minimum number of items each branch keeps.
    pub min_depth: usize,
    /// Changes closer together than this many milliseconds may share an
    /// undo step.
    pub new_group_delay: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            min_depth: 100,
            new_group_delay: 500,
        }
    }
}

impl HistoryConfig {
    pub fn with_min_depth(mut self, min_depth: usize) -> Self {
        self.min_depth = min_depth;
        self
    }

    pub fn with_new_group_delay(mut self, new_group_delay: u64) -> Self {
        self.new_group_delay = new_group_delay;
        self
    }
}

/// Which branch to pop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PopTarget {
    /// Undo.
    Done,
    /// Redo.
    Undone,
}

/// Outcome of [`HistoryState::pop`].
#[derive(Clone, Debug)]
pub struct PopResult<T> {
    /// The transaction with the popped changes applied.
    pub transaction: Transaction<T>,
    pub state: HistoryState,
    /// False when every remaining step had been deleted by later edits. The
    /// transaction is then returned untouched.
    pub popped: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HistoryState {
    done: Branch,
    undone: Branch,
    prev_time: Option<u64>,
    prev_user_event: Option<UserEvent>,
}

impl Default for HistoryState {
    fn default() -> Self {
        Self::new(&HistoryConfig::default())
    }
}

impl HistoryState {
    pub fn new(config: &HistoryConfig) -> Self {
        Self {
            done: Branch::empty(config.min_depth),
            undone: Branch::empty(config.min_depth),
            prev_time: None,
            prev_user_event: None,
        }
    }

    pub fn done(&self) -> &Branch {
        &self.done
    }

    pub fn undone(&self) -> &Branch {
        &self.undone
    }

    /// Time of the last recorded tracked change, in milliseconds.
    pub fn prev_time(&self) -> Option<u64> {
        self.prev_time
    }

    pub fn prev_user_event(&self) -> Option<&UserEvent> {
        self.prev_user_event.as_ref()
    }

    /// Whether both states share all their storage, i.e. one was derived
    /// from the other without modification.
    pub fn ptr_eq(&self, other: &HistoryState) -> bool {
        self.done.ptr_eq(&other.done)
            && self.undone.ptr_eq(&other.undone)
            && self.prev_time == other.prev_time
            && self.prev_user_event == other.prev_user_event
    }

    fn branch(&self, target: PopTarget) -> &Branch {
        match target {
            PopTarget::Done => &self.done,
            PopTarget::Undone => &self.undone,
        }
    }

    /// Record a change.
    ///
    /// With `inverted == None` the changes are untracked and only recorded as
    /// drift. Empty `changes` with `Some` inverted record a selection-only
    /// event.
    pub fn add_changes(
        &self,
        changes: &ChangeSet<Change>,
        inverted: Option<&ChangeSet<Change>>,
        selection_before: &Selection,
        time: u64,
        user_event: Option<&UserEvent>,
        config: &HistoryConfig,
    ) -> HistoryState {
        let Some(inverted) = inverted else {
            if changes.is_empty() {
                return self.clone();
            }
            return self.add_mapping(&changes.desc());
        };

        let within_delay = self
            .prev_time
            .is_some_and(|prev| time.saturating_sub(prev) < config.new_group_delay);
        let policy = if !within_delay {
            MergePolicy::Never
        } else if changes.is_empty() {
            let keyboard = matches!(user_event, Some(UserEvent::Keyboard))
                && matches!(self.prev_user_event, Some(UserEvent::Keyboard));
            if keyboard {
                MergePolicy::SelectionShape
            } else {
                MergePolicy::Never
            }
        } else {
            MergePolicy::Adjacent
        };

        trace!(
            target: "weaver::history",
            time,
            within_delay,
            ?policy,
            "adding changes to history"
        );

        let done = self.done.add_changes(
            changes,
            inverted,
            selection_before,
            policy,
            config.min_depth,
        );
        let undone = if changes.is_empty() {
            self.undone.clone()
        } else {
            Branch::empty(config.min_depth)
        };
        HistoryState {
            done,
            undone,
            prev_time: Some(time),
            prev_user_event: user_event.cloned(),
        }
    }

    /// Record untracked drift on both branches.
    pub fn add_mapping(&self, map: &ChangeSet<ChangeDesc>) -> HistoryState {
        if map.is_empty() {
            return self.clone();
        }
        HistoryState {
            done: self.done.add_mapping(map.clone()),
            undone: self.undone.add_mapping(map.clone()),
            prev_time: self.prev_time,
            prev_user_event: self.prev_user_event.clone(),
        }
    }

    pub fn can_pop(&self, target: PopTarget, filter: PopFilter) -> bool {
        self.branch(target).can_pop(filter)
    }

    /// Number of undo (or redo) steps available.
    pub fn event_count(&self, target: PopTarget, filter: PopFilter) -> usize {
        self.branch(target).event_count(filter)
    }

    /// Undo or redo one step onto `transaction`.
    ///
    /// The popped changes are applied to the transaction and its selection
    /// is set to the recorded one. What was applied is recorded on the
    /// opposite branch so the step can be reversed again.
    ///
    /// Steps whose changes were all deleted by later edits are skipped. If
    /// nothing is left, [`PopResult::popped`] is false and the transaction
    /// comes back unchanged.
    ///
    /// Fails only when the transaction's document does not match the
    /// history.
    ///
    /// # Panics
    ///
    /// If [`HistoryState::can_pop`] is false for `target` and `filter`.
    pub fn pop<T: TextBuffer>(
        &self,
        target: PopTarget,
        filter: PopFilter,
        mut transaction: Transaction<T>,
        config: &HistoryConfig,
    ) -> Result<PopResult<T>, ChangeError> {
        assert!(
            self.can_pop(target, filter),
            "nothing to pop from {target:?} with filter {filter:?}"
        );
        let popped = self.branch(target).pop_changes(filter);
        let Some(selection) = popped.selection else {
            debug!(
                target: "weaver::history",
                ?target,
                "every remaining step was deleted by later edits"
            );
            let (done, undone) = match target {
                PopTarget::Done => (popped.remaining, self.undone.clone()),
                PopTarget::Undone => (self.done.clone(), popped.remaining),
            };
            return Ok(PopResult {
                transaction,
                state: HistoryState {
                    done,
                    undone,
                    prev_time: self.prev_time,
                    prev_user_event: self.prev_user_event.clone(),
                },
                popped: false,
            });
        };

        let selection_before = transaction.selection().clone();
        let start = transaction.changes().len();

        for change in popped.changes {
            transaction.change(change)?;
        }
        transaction.set_selection(selection)?;

        let applied = transaction.changes().sub_set(start, transaction.changes().len());
        let inverted: ChangeSet<Change> =
            transaction.inverses()[start..].iter().rev().cloned().collect();

        debug!(
            target: "weaver::history",
            ?target,
            applied = applied.len(),
            "popped history"
        );

        let (done, undone) = match target {
            PopTarget::Done => {
                let undone = self.undone.add_changes(
                    &applied,
                    &inverted,
                    &selection_before,
                    MergePolicy::Never,
                    config.min_depth,
                );
                (popped.remaining, undone)
            }
            PopTarget::Undone => {
                let done = self.done.add_changes(
                    &applied,
                    &inverted,
                    &selection_before,
                    MergePolicy::Never,
                    config.min_depth,
                );
                (done, popped.remaining)
            }
        };

        Ok(PopResult {
            transaction,
            state: HistoryState {
                done,
                undone,
                prev_time: None,
                prev_user_event: None,
            },
            popped: true,
        })
    }

    /// Replace the newest `rebased_count` done items with their rebased
    /// versions. `changes` applies to `doc`, see [`Branch::rebase`] for its
    /// layout.
    pub fn rebase<T: TextBuffer + Clone>(
        &self,
        changes: &ChangeSet<Change>,
        rebased_count: usize,
        doc: &T,
    ) -> Result<HistoryState, ChangeError> {
        let inverses = changes.invert_each(doc)?;
        Ok(HistoryState {
            done: self.done.rebase(changes, &inverses, rebased_count),
            undone: self.undone.add_mapping(changes.desc()),
            prev_time: self.prev_time,
            prev_user_event: self.prev_user_event.clone(),
        })
    }
}
