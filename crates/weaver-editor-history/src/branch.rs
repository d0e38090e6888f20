//! One side of the undo history.
//!
//! A [`Branch`] is a bounded stack of [`Item`]s, oldest first. Change items
//! carry what is needed to undo an edit group; mapping-only items record
//! edits that are not undoable themselves (remote or untracked changes) but
//! that older items must be mapped across before they can be replayed.

use tracing::{debug, trace};

use crate::change::{Change, ChangeDesc, ChangeLike, ChangeSet, Mapping};
use crate::stack::TruncatingStack;
use crate::types::Selection;

/// Rebasing compresses the branch once it holds more mapping-only items than this.
pub const MAX_EMPTY_ITEMS: usize = 500;

/// Undo data carried by change items.
#[derive(Clone, Debug, PartialEq)]
pub struct UndoEntry {
    /// Changes that undo the item, in the order they must be applied.
    pub inverted: ChangeSet<Change>,
    /// Selection to restore when the item is undone.
    pub selection_before: Selection,
}

/// A history entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Item {
    /// Forward mapping of the edits this item stands for.
    pub map: ChangeSet<ChangeDesc>,
    /// Present exactly for change items.
    pub undo: Option<UndoEntry>,
}

impl Item {
    /// A mapping-only item.
    pub fn mapping(map: ChangeSet<ChangeDesc>) -> Self {
        Self { map, undo: None }
    }

    /// An undoable item.
    pub fn change(
        map: ChangeSet<ChangeDesc>,
        inverted: ChangeSet<Change>,
        selection_before: Selection,
    ) -> Self {
        Self {
            map,
            undo: Some(UndoEntry {
                inverted,
                selection_before,
            }),
        }
    }

    pub fn is_change(&self) -> bool {
        self.undo.is_some()
    }

    /// A change item that only restores a selection.
    pub fn is_selection_only(&self) -> bool {
        self.undo
            .as_ref()
            .is_some_and(|entry| entry.inverted.is_empty())
    }

    pub fn matches(&self, filter: PopFilter) -> bool {
        match (&self.undo, filter) {
            (None, _) => false,
            (Some(undo), PopFilter::OnlyChanges) => !undo.inverted.is_empty(),
            (Some(_), PopFilter::Any) => true,
        }
    }
}

/// Which items count as undo steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PopFilter {
    /// Items that change the document.
    #[default]
    OnlyChanges,
    /// Document changes and selection-only items.
    Any,
}

/// Whether new changes may be folded into the newest item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergePolicy {
    /// Always start a new item.
    Never,
    /// Merge when the new changes touch the range the newest item last edited.
    Adjacent,
    /// Merge a selection-only update into a newest selection-only item whose
    /// selection has the same shape.
    SelectionShape,
}

impl MergePolicy {
    fn allows(
        self,
        top: &Item,
        changes: &ChangeSet<Change>,
        selection_before: &Selection,
    ) -> bool {
        let Some(undo) = &top.undo else {
            return false;
        };
        match self {
            MergePolicy::Never => false,
            MergePolicy::Adjacent => is_adjacent(&top.map, changes),
            MergePolicy::SelectionShape => {
                changes.is_empty()
                    && top.is_selection_only()
                    && undo.selection_before.same_shape(selection_before)
            }
        }
    }
}

/// Whether the first of `next` touches the range written by the last of `prev`.
pub fn is_adjacent(prev: &ChangeSet<ChangeDesc>, next: &ChangeSet<Change>) -> bool {
    let (Some(last), Some(first)) = (prev.last(), next.first()) else {
        return false;
    };
    let start = last.from;
    let end = last.from + last.length;
    first.from() <= end && first.to() >= start
}

/// Changes produced by popping an item.
#[derive(Clone, Debug)]
pub struct PoppedChanges {
    /// Changes to apply, in order, to the current document.
    pub changes: Vec<Change>,
    /// Selection to restore, mapped to the document after `changes`. `None`
    /// when every matching item had been deleted by later edits.
    pub selection: Option<Selection>,
    /// The branch without the popped item.
    pub remaining: Branch,
}

/// A bounded stack of history items.
#[derive(Clone, Debug, PartialEq)]
pub struct Branch {
    items: TruncatingStack<Item>,
}

impl Branch {
    pub fn empty(max_len: usize) -> Self {
        Self {
            items: TruncatingStack::empty(max_len),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &TruncatingStack<Item> {
        &self.items
    }

    /// Whether `other` is an unmodified clone of this branch.
    pub fn ptr_eq(&self, other: &Branch) -> bool {
        self.items.ptr_eq(&other.items)
    }

    /// Number of items matching `filter`.
    pub fn event_count(&self, filter: PopFilter) -> usize {
        self.items.iter().filter(|item| item.matches(filter)).count()
    }

    pub fn can_pop(&self, filter: PopFilter) -> bool {
        self.items.iter().rev().any(|item| item.matches(filter))
    }

    /// Number of mapping-only items.
    pub fn empty_item_count(&self) -> usize {
        self.items.iter().filter(|item| !item.is_change()).count()
    }

    /// Record an undoable edit group, merging it into the newest item when
    /// `policy` allows.
    pub fn add_changes(
        &self,
        changes: &ChangeSet<Change>,
        inverted: &ChangeSet<Change>,
        selection_before: &Selection,
        policy: MergePolicy,
        max_len: usize,
    ) -> Branch {
        debug_assert_eq!(changes.len(), inverted.len());
        let mut items = self.items.resized(max_len);

        let merged = match items.last() {
            Some(top) if policy.allows(top, changes, selection_before) => {
                let map = top.map.compose(&changes.desc());
                let undo = top.undo.as_ref().map(|entry| UndoEntry {
                    inverted: inverted.compose(&entry.inverted),
                    selection_before: entry.selection_before.clone(),
                });
                Some(Item { map, undo })
            }
            _ => None,
        };

        trace!(
            target: "weaver::history",
            merged = merged.is_some(),
            changes = changes.len(),
            ?policy,
            "recording changes"
        );

        match merged {
            Some(item) => {
                let top = items.len() - 1;
                items.replace_from(top, [item]);
            }
            None => items.push(Item::change(
                changes.desc(),
                inverted.clone(),
                selection_before.clone(),
            )),
        }
        Branch { items }
    }

    /// Record drift that older items have to be mapped across. Does nothing
    /// on an empty branch.
    pub fn add_mapping(&self, map: ChangeSet<ChangeDesc>) -> Branch {
        if self.items.is_empty() || map.is_empty() {
            return self.clone();
        }
        let mut items = self.items.clone();
        items.push(Item::mapping(map));
        Branch { items }
    }

    /// Pop the newest item matching `filter`.
    ///
    /// An item whose inverted changes were all deleted by later edits cannot
    /// be undone. It is dissolved into a mapping-only item and the next
    /// matching item is tried. When none is left, `selection` is `None`,
    /// `changes` is empty and `remaining` holds the dissolved items.
    ///
    /// # Panics
    ///
    /// If no item matches; check [`Branch::can_pop`] first.
    pub fn pop_changes(&self, filter: PopFilter) -> PoppedChanges {
        if !self.can_pop(filter) {
            panic!("pop_changes({filter:?}) on a branch with no matching item");
        }

        let mut items = self.items.clone();
        while let Some(target) = (0..items.len()).rev().find(|&i| items[i].matches(filter)) {
            let Item { map, undo } = items[target].clone();
            let Some(undo) = undo else {
                unreachable!("matching items always carry undo data");
            };

            let mut above = ChangeSet::new();
            for i in target + 1..items.len() {
                above.extend(&items[i].map);
            }

            if above.is_empty() {
                items.replace_from(target, []);
                return PoppedChanges {
                    changes: undo.inverted.iter().cloned().collect(),
                    selection: Some(undo.selection_before),
                    remaining: Branch { items },
                };
            }

            // The remapping runs from the state before the item's own edits:
            // its forward changes, everything recorded above it, then each
            // inverted change once applied, mirrored to the change it undoes.
            let count = map.len();
            let mut remap = map;
            remap.extend(&above);

            let mut changes = Vec::with_capacity(undo.inverted.len());
            for (k, inverse) in undo.inverted.iter().enumerate() {
                let start = count.saturating_sub(k);
                let mapped = remap.partial_mapping(start).map_change(inverse);
                match mapped {
                    Some(mapped) if !mapped.is_noop() => {
                        remap.push_mirrored(mapped.desc(), start.saturating_sub(1));
                        changes.push(mapped);
                    }
                    _ => debug!(
                        target: "weaver::history",
                        from = inverse.from(),
                        to = inverse.to(),
                        "inverted change was deleted by later edits, dropping it"
                    ),
                }
            }

            let dissolved = changes.is_empty() && !undo.inverted.is_empty();
            let selection = (!dissolved).then(|| undo.selection_before.map(&remap));
            let rest = if target > 0 {
                vec![Item::mapping(remap)]
            } else {
                Vec::new()
            };
            items.replace_from(target, rest);

            let Some(selection) = selection else {
                debug!(
                    target: "weaver::history",
                    index = target,
                    "nothing left to undo in item, dissolving it into a mapping"
                );
                continue;
            };

            debug!(
                target: "weaver::history",
                index = target,
                mapped_over = above.len(),
                replayed = changes.len(),
                "popped item across later edits"
            );
            return PoppedChanges {
                changes,
                selection: Some(selection),
                remaining: Branch { items },
            };
        }

        PoppedChanges {
            changes: Vec::new(),
            selection: None,
            remaining: Branch { items },
        }
    }

    /// Rewrite the newest `rebased_count` items against `changes`.
    ///
    /// `changes` must start by undoing every change of those items, newest
    /// first, then carry the confirmed remote changes, then re-apply the
    /// local changes that survived, each mirrored to its undo. `inverses[i]`
    /// undoes `changes[i]`.
    pub fn rebase(
        &self,
        changes: &ChangeSet<Change>,
        inverses: &[Change],
        rebased_count: usize,
    ) -> Branch {
        if self.items.is_empty() {
            return self.clone();
        }
        let len = self.items.len();
        let start = len.saturating_sub(rebased_count);
        let tail = self.items.slice(start, len);
        let undo_count: usize = tail.iter().map(|item| item.map.len()).sum();
        debug_assert!(changes.len() >= undo_count);

        let mut new_until = changes.len();
        let mut flat = 0;
        let mut rebased = Vec::with_capacity(tail.len());
        for item in &tail {
            let mut positions = Vec::with_capacity(item.map.len());
            let mut first = None;
            for _ in 0..item.map.len() {
                let undo_index = undo_count - 1 - flat;
                flat += 1;
                if let Some(pos) = changes.get_mirror(undo_index) {
                    new_until = new_until.min(pos);
                    positions.push(pos);
                    first.get_or_insert((undo_index, pos));
                }
            }
            let Some((undo_index, pos)) = first else {
                trace!(target: "weaver::history", "dropping item without rebased changes");
                continue;
            };

            let map: ChangeSet<ChangeDesc> = positions
                .iter()
                .filter_map(|&p| changes.get(p))
                .map(ChangeLike::desc)
                .collect();
            let undo = item.undo.as_ref().map(|entry| UndoEntry {
                inverted: positions
                    .iter()
                    .rev()
                    .filter_map(|&p| inverses.get(p).cloned())
                    .collect(),
                selection_before: entry
                    .selection_before
                    .map(&changes.slice(undo_index + 1, pos)),
            });
            rebased.push(Item { map, undo });
        }

        let remote = changes.sub_set(undo_count, new_until).desc();
        let mut replacement = Vec::with_capacity(rebased.len() + 1);
        if !remote.is_empty() {
            replacement.push(Item::mapping(remote));
        }
        let rebased_len = rebased.len();
        replacement.extend(rebased);

        let mut items = self.items.clone();
        items.replace_from(start, replacement);
        let branch = Branch { items };

        debug!(
            target: "weaver::history",
            rebased_count,
            kept = rebased_len,
            "rebased branch tail"
        );

        if branch.empty_item_count() > MAX_EMPTY_ITEMS {
            let upto = branch.len().saturating_sub(rebased_len);
            branch.compress(upto)
        } else {
            branch
        }
    }

    /// Fold runs of consecutive mapping-only items before `upto` into single
    /// items.
    pub fn compress(&self, upto: usize) -> Branch {
        let upto = upto.min(self.items.len());
        let mut compressed: Vec<Item> = Vec::with_capacity(upto);
        for item in self.items.iter().take(upto) {
            match compressed.last_mut() {
                Some(last) if !last.is_change() && !item.is_change() => last.map.extend(&item.map),
                _ => compressed.push(item.clone()),
            }
        }
        debug!(
            target: "weaver::history",
            before = upto,
            after = compressed.len(),
            "compressed mapping items"
        );
        let mut items = self.items.clone();
        items.replace_before(upto, compressed);
        Branch { items }
    }
}
