//! Document changes and position mapping.
//!
//! A [`ChangeSet`] is a sequence of single-range changes where every change
//! applies to the document produced by the one before it. Besides the
//! changes themselves it keeps a mirror table: pairs of changes where the
//! later one exactly undoes the earlier one. Mapping a position through such
//! a pair restores the position even when it sat inside the deleted text.

use smol_str::SmolStr;

use crate::error::ChangeError;
use crate::text::TextBuffer;
use crate::types::Assoc;

/// Common shape of [`Change`] and [`ChangeDesc`].
pub trait ChangeLike: Clone + std::fmt::Debug + PartialEq {
    /// Start of the replaced range in the document before the change.
    fn from(&self) -> usize;

    /// End of the replaced range in the document before the change.
    fn to(&self) -> usize;

    /// Length in chars of the inserted content.
    fn inserted_len(&self) -> usize;

    /// The same change moved to a different range.
    fn with_range(&self, from: usize, to: usize) -> Self;

    /// Strip inserted content, keeping only its length.
    fn desc(&self) -> ChangeDesc {
        ChangeDesc {
            from: self.from(),
            to: self.to(),
            length: self.inserted_len(),
        }
    }

    /// Length difference this change introduces.
    fn length_delta(&self) -> isize {
        self.inserted_len() as isize - (self.to() - self.from()) as isize
    }
}

/// A single edit: replace `[from, to)` with `text`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change {
    from: usize,
    to: usize,
    text: SmolStr,
    len: usize,
}

impl Change {
    /// Replace `[from, to)` with `text`.
    ///
    /// # Panics
    ///
    /// If `to < from`.
    pub fn new(from: usize, to: usize, text: impl Into<SmolStr>) -> Self {
        assert!(from <= to, "change range {from}..{to} is inverted");
        let text = text.into();
        let len = text.chars().count();
        Self { from, to, text, len }
    }

    /// Replace `[from, to)` with `text`, rejecting an inverted range.
    pub fn try_new(from: usize, to: usize, text: impl Into<SmolStr>) -> Result<Self, ChangeError> {
        if to < from {
            return Err(ChangeError::InvertedRange { from, to });
        }
        Ok(Self::new(from, to, text))
    }

    /// Insert `text` at `pos`.
    pub fn insert(pos: usize, text: impl Into<SmolStr>) -> Self {
        Self::new(pos, pos, text)
    }

    /// Delete `[from, to)`.
    pub fn delete(from: usize, to: usize) -> Self {
        Self::new(from, to, "")
    }

    /// The inserted content.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the change leaves the document untouched.
    pub fn is_noop(&self) -> bool {
        self.from == self.to && self.len == 0
    }

    fn check(&self, doc_len: usize) -> Result<(), ChangeError> {
        if self.to > doc_len {
            return Err(ChangeError::OutOfBounds {
                from: self.from,
                to: self.to,
                len: doc_len,
            });
        }
        Ok(())
    }

    /// Apply the change to `doc`.
    pub fn apply<T: TextBuffer>(&self, doc: &mut T) -> Result<(), ChangeError> {
        self.check(doc.len_chars())?;
        doc.replace(self.from..self.to, &self.text);
        Ok(())
    }

    /// The change that undoes this one, given the document before it.
    pub fn invert<T: TextBuffer>(&self, doc: &T) -> Result<Change, ChangeError> {
        self.check(doc.len_chars())?;
        let removed = doc
            .slice(self.from..self.to)
            .ok_or(ChangeError::OutOfBounds {
                from: self.from,
                to: self.to,
                len: doc.len_chars(),
            })?;
        Ok(Change::new(self.from, self.from + self.len, removed))
    }
}

impl ChangeLike for Change {
    fn from(&self) -> usize {
        self.from
    }

    fn to(&self) -> usize {
        self.to
    }

    fn inserted_len(&self) -> usize {
        self.len
    }

    fn with_range(&self, from: usize, to: usize) -> Self {
        Self {
            from,
            to,
            text: self.text.clone(),
            len: self.len,
        }
    }
}

/// A change without its inserted content.
///
/// History keeps these for position mapping; they cannot be replayed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangeDesc {
    pub from: usize,
    pub to: usize,
    pub length: usize,
}

impl ChangeDesc {
    pub fn new(from: usize, to: usize, length: usize) -> Self {
        Self { from, to, length }
    }
}

impl ChangeLike for ChangeDesc {
    fn from(&self) -> usize {
        self.from
    }

    fn to(&self) -> usize {
        self.to
    }

    fn inserted_len(&self) -> usize {
        self.length
    }

    fn with_range(&self, from: usize, to: usize) -> Self {
        Self {
            from,
            to,
            length: self.length,
        }
    }
}

/// How [`Mapping::map_pos`] treats positions whose surroundings were deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MapMode {
    /// Always map, clamping deleted positions to the edge of the deletion.
    #[default]
    Simple,
    /// `None` when a deletion spans the position.
    TrackDel,
    /// `None` when the character before the position was deleted.
    TrackBefore,
    /// `None` when the character after the position was deleted.
    TrackAfter,
}

const DEL_BEFORE: u8 = 1;
const DEL_AFTER: u8 = 2;
const DEL_ACROSS: u8 = 4;
const DEL_SIDE: u8 = 8;

/// Result of mapping a position, with information about deletions around it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MapResult {
    pub pos: usize,
    del_info: u8,
    recover: Option<usize>,
}

impl MapResult {
    fn unchanged(pos: usize) -> Self {
        Self {
            pos,
            del_info: 0,
            recover: None,
        }
    }

    /// The content on the side the position was associated with was deleted.
    pub fn deleted(&self) -> bool {
        self.del_info & DEL_SIDE != 0
    }

    /// The character before the position was deleted.
    pub fn deleted_before(&self) -> bool {
        self.del_info & (DEL_BEFORE | DEL_ACROSS) != 0
    }

    /// The character after the position was deleted.
    pub fn deleted_after(&self) -> bool {
        self.del_info & (DEL_AFTER | DEL_ACROSS) != 0
    }

    /// A deletion spanned the position.
    pub fn deleted_across(&self) -> bool {
        self.del_info & DEL_ACROSS != 0
    }
}

/// Map a position through a single change.
fn map_through<C: ChangeLike>(change: &C, pos: usize, assoc: Assoc) -> MapResult {
    let (from, to) = (change.from(), change.to());
    let inserted = change.inserted_len();
    if pos < from {
        return MapResult::unchanged(pos);
    }
    if pos > to {
        return MapResult::unchanged(pos + inserted - (to - from));
    }
    if from == to {
        let pos = match assoc {
            Assoc::Before => from,
            Assoc::After => from + inserted,
        };
        return MapResult::unchanged(pos);
    }

    let side = if pos == from {
        Assoc::Before
    } else if pos == to {
        Assoc::After
    } else {
        assoc
    };
    let mapped = match side {
        Assoc::Before => from,
        Assoc::After => from + inserted,
    };
    let edge = match assoc {
        Assoc::Before => from,
        Assoc::After => to,
    };
    let recover = (pos != edge).then_some(pos - from);
    let mut del_info = if pos == from {
        DEL_AFTER
    } else if pos == to {
        DEL_BEFORE
    } else {
        DEL_ACROSS
    };
    if pos != edge {
        del_info |= DEL_SIDE;
    }
    MapResult {
        pos: mapped,
        del_info,
        recover,
    }
}

/// Something positions can be mapped through.
pub trait Mapping {
    /// Map `pos`, reporting deletions around it.
    fn map_result(&self, pos: usize, assoc: Assoc) -> MapResult;

    /// Map `pos`, clamping positions inside deletions.
    fn map(&self, pos: usize, assoc: Assoc) -> usize {
        self.map_result(pos, assoc).pos
    }

    /// Map `pos` honoring `mode`. Returns `None` when the mode asks to
    /// track a deletion that happened.
    fn map_pos(&self, pos: usize, assoc: Assoc, mode: MapMode) -> Option<usize> {
        let result = self.map_result(pos, assoc);
        let gone = match mode {
            MapMode::Simple => false,
            MapMode::TrackDel => result.deleted_across(),
            MapMode::TrackBefore => result.deleted_before(),
            MapMode::TrackAfter => result.deleted_after(),
        };
        (!gone).then_some(result.pos)
    }

    /// Move a change to the document after this mapping. `None` when the
    /// mapping deleted the change's whole context.
    fn map_change<C: ChangeLike>(&self, change: &C) -> Option<C>
    where
        Self: Sized,
    {
        let from = self.map_result(change.from(), Assoc::After);
        let to = self.map_result(change.to(), Assoc::Before);
        if from.deleted_across() && to.deleted_across() {
            return None;
        }
        Some(change.with_range(from.pos, from.pos.max(to.pos)))
    }

    /// Whether this mapping deletes `change` entirely.
    fn deletes<C: ChangeLike>(&self, change: &C) -> bool
    where
        Self: Sized,
    {
        self.map_change(change).is_none()
    }
}

impl Mapping for Change {
    fn map_result(&self, pos: usize, assoc: Assoc) -> MapResult {
        map_through(self, pos, assoc)
    }
}

impl Mapping for ChangeDesc {
    fn map_result(&self, pos: usize, assoc: Assoc) -> MapResult {
        map_through(self, pos, assoc)
    }
}

/// An ordered sequence of changes, each applying to the result of the last.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeSet<C> {
    changes: Vec<C>,
    /// Pairs of indices whose changes undo each other.
    mirror: Vec<(usize, usize)>,
}

impl<C> Default for ChangeSet<C> {
    fn default() -> Self {
        Self {
            changes: Vec::new(),
            mirror: Vec::new(),
        }
    }
}

impl<C: ChangeLike> ChangeSet<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(change: C) -> Self {
        Self {
            changes: vec![change],
            mirror: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&C> {
        self.changes.get(index)
    }

    pub fn first(&self) -> Option<&C> {
        self.changes.first()
    }

    pub fn last(&self) -> Option<&C> {
        self.changes.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, C> {
        self.changes.iter()
    }

    /// Append a change.
    pub fn push(&mut self, change: C) {
        self.changes.push(change);
    }

    /// Append a change that undoes the change at `mirror_of`.
    pub fn push_mirrored(&mut self, change: C, mirror_of: usize) {
        let index = self.changes.len();
        self.changes.push(change);
        self.set_mirror(mirror_of, index);
    }

    /// Record that the changes at `a` and `b` undo each other.
    pub fn set_mirror(&mut self, a: usize, b: usize) {
        self.mirror.push((a, b));
    }

    /// The index mirrored with `index`, if any.
    pub fn get_mirror(&self, index: usize) -> Option<usize> {
        self.mirror.iter().find_map(|&(a, b)| {
            if a == index {
                Some(b)
            } else if b == index {
                Some(a)
            } else {
                None
            }
        })
    }

    /// Append all of `other`'s changes in place, keeping its mirror pairs.
    pub fn extend(&mut self, other: &ChangeSet<C>) {
        let offset = self.changes.len();
        self.changes.extend(other.changes.iter().cloned());
        self.mirror
            .extend(other.mirror.iter().map(|&(a, b)| (a + offset, b + offset)));
    }

    /// Sequential composition: this set followed by `other`.
    pub fn compose(&self, other: &ChangeSet<C>) -> ChangeSet<C> {
        let mut composed = self.clone();
        composed.extend(other);
        composed
    }

    /// The same sequence with inserted content reduced to lengths.
    pub fn desc(&self) -> ChangeSet<ChangeDesc> {
        ChangeSet {
            changes: self.changes.iter().map(ChangeLike::desc).collect(),
            mirror: self.mirror.clone(),
        }
    }

    /// A mapping over the changes from `from` to the end.
    pub fn partial_mapping(&self, from: usize) -> PartialMapping<'_, C> {
        self.slice(from, self.changes.len())
    }

    /// A mapping over the changes in `[from, to)`.
    pub fn slice(&self, from: usize, to: usize) -> PartialMapping<'_, C> {
        let to = to.min(self.changes.len());
        PartialMapping {
            set: self,
            from: from.min(to),
            to,
        }
    }

    /// Copy out the changes in `[from, to)` with the mirror pairs that lie
    /// entirely inside that range.
    pub fn sub_set(&self, from: usize, to: usize) -> ChangeSet<C> {
        let to = to.min(self.changes.len());
        let from = from.min(to);
        ChangeSet {
            changes: self.changes[from..to].to_vec(),
            mirror: self
                .mirror
                .iter()
                .filter(|&&(a, b)| (from..to).contains(&a) && (from..to).contains(&b))
                .map(|&(a, b)| (a - from, b - from))
                .collect(),
        }
    }

    /// Total length difference of the whole sequence.
    pub fn length_delta(&self) -> isize {
        self.changes.iter().map(ChangeLike::length_delta).sum()
    }
}

impl ChangeSet<Change> {
    /// Apply every change in order.
    pub fn apply<T: TextBuffer>(&self, doc: &mut T) -> Result<(), ChangeError> {
        for change in &self.changes {
            change.apply(doc)?;
        }
        Ok(())
    }

    /// Inverse of each change, indexed like the changes themselves. The
    /// inverse at `i` applies to the document right after change `i`.
    pub fn invert_each<T: TextBuffer + Clone>(&self, doc: &T) -> Result<Vec<Change>, ChangeError> {
        let mut doc = doc.clone();
        let mut inverses = Vec::with_capacity(self.changes.len());
        for change in &self.changes {
            inverses.push(change.invert(&doc)?);
            change.apply(&mut doc)?;
        }
        Ok(inverses)
    }

    /// The change set that undoes this one, given the document before it.
    pub fn invert<T: TextBuffer + Clone>(&self, doc: &T) -> Result<ChangeSet<Change>, ChangeError> {
        let mut inverses = self.invert_each(doc)?;
        inverses.reverse();
        Ok(ChangeSet {
            changes: inverses,
            mirror: Vec::new(),
        })
    }
}

impl<C: ChangeLike> Mapping for ChangeSet<C> {
    fn map_result(&self, pos: usize, assoc: Assoc) -> MapResult {
        self.partial_mapping(0).map_result(pos, assoc)
    }
}

impl<C: ChangeLike> FromIterator<C> for ChangeSet<C> {
    fn from_iter<I: IntoIterator<Item = C>>(iter: I) -> Self {
        Self {
            changes: iter.into_iter().collect(),
            mirror: Vec::new(),
        }
    }
}

impl<'a, C> IntoIterator for &'a ChangeSet<C> {
    type Item = &'a C;
    type IntoIter = std::slice::Iter<'a, C>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

/// A view over a contiguous range of a [`ChangeSet`]. Mirror pairs are only
/// followed when both ends fall inside the view.
#[derive(Clone, Copy, Debug)]
pub struct PartialMapping<'a, C> {
    set: &'a ChangeSet<C>,
    from: usize,
    to: usize,
}

impl<C: ChangeLike> PartialMapping<'_, C> {
    pub fn len(&self) -> usize {
        self.to - self.from
    }

    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }
}

impl<C: ChangeLike> Mapping for PartialMapping<'_, C> {
    fn map_result(&self, pos: usize, assoc: Assoc) -> MapResult {
        let mut pos = pos;
        let mut del_info = 0;
        let mut i = self.from;
        while i < self.to {
            let change = &self.set.changes[i];
            let result = map_through(change, pos, assoc);
            if let Some(offset) = result.recover {
                if let Some(mirror) = self.set.get_mirror(i) {
                    if mirror > i && mirror < self.to {
                        pos = self.set.changes[mirror].from() + offset;
                        i = mirror + 1;
                        continue;
                    }
                }
            }
            del_info |= result.del_info;
            pos = result.pos;
            i += 1;
        }
        MapResult {
            pos,
            del_info,
            recover: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::EditorRope;

    fn desc(from: usize, to: usize, length: usize) -> ChangeDesc {
        ChangeDesc::new(from, to, length)
    }

    #[test]
    fn test_change_lengths() {
        let change = Change::new(2, 5, "héllo");
        assert_eq!(change.inserted_len(), 5);
        assert_eq!(change.length_delta(), 2);
        assert_eq!(change.desc(), desc(2, 5, 5));
        assert!(Change::insert(3, "").is_noop());
    }

    #[test]
    #[should_panic(expected = "inverted")]
    fn test_inverted_range_panics() {
        let _ = Change::new(4, 2, "x");
    }

    #[test]
    fn test_try_new_rejects_inverted_range() {
        assert_eq!(
            Change::try_new(4, 2, "x"),
            Err(ChangeError::InvertedRange { from: 4, to: 2 })
        );
        assert_eq!(Change::try_new(2, 4, "x"), Ok(Change::new(2, 4, "x")));
    }

    #[test]
    fn test_apply_and_invert() {
        let doc = EditorRope::from_str("hello world");
        let change = Change::new(6, 11, "rust");
        let inverse = change.invert(&doc).unwrap();
        assert_eq!(inverse, Change::new(6, 10, "world"));

        let mut edited = doc.clone();
        change.apply(&mut edited).unwrap();
        assert_eq!(edited.to_string(), "hello rust");
        inverse.apply(&mut edited).unwrap();
        assert_eq!(edited, doc);
    }

    #[test]
    fn test_apply_out_of_bounds() {
        let mut doc = EditorRope::from_str("abc");
        let err = Change::delete(1, 9).apply(&mut doc).unwrap_err();
        assert_eq!(
            err,
            ChangeError::OutOfBounds {
                from: 1,
                to: 9,
                len: 3
            }
        );
        assert_eq!(doc.to_string(), "abc");
    }

    #[test]
    fn test_changeset_invert_is_noop() {
        let doc = EditorRope::from_str("abcdef");
        let set: ChangeSet<Change> = [
            Change::new(0, 2, "XY Z"),
            Change::delete(4, 6),
            Change::insert(1, "!"),
        ]
        .into_iter()
        .collect();
        let inverted = set.invert(&doc).unwrap();
        assert_eq!(inverted.len(), 3);

        let mut edited = doc.clone();
        set.apply(&mut edited).unwrap();
        assert_eq!(edited.to_string(), "X!Y Zef");
        inverted.apply(&mut edited).unwrap();
        assert_eq!(edited, doc);

        let mut round_trip = doc.clone();
        set.compose(&inverted).apply(&mut round_trip).unwrap();
        assert_eq!(round_trip, doc);
    }

    #[test]
    fn test_map_insertion_assoc() {
        let insert = desc(3, 3, 2);
        assert_eq!(insert.map(3, Assoc::Before), 3);
        assert_eq!(insert.map(3, Assoc::After), 5);
        assert_eq!(insert.map(1, Assoc::After), 1);
        assert_eq!(insert.map(4, Assoc::Before), 6);
    }

    #[test]
    fn test_map_deletion_edges() {
        let delete = desc(2, 6, 0);
        assert_eq!(delete.map(2, Assoc::After), 2);
        assert_eq!(delete.map(6, Assoc::Before), 2);
        assert_eq!(delete.map(4, Assoc::After), 2);
        assert_eq!(delete.map(8, Assoc::Before), 4);

        let replace = desc(2, 6, 3);
        assert_eq!(replace.map(4, Assoc::Before), 2);
        assert_eq!(replace.map(4, Assoc::After), 5);
        assert_eq!(replace.map(2, Assoc::After), 2);
        assert_eq!(replace.map(6, Assoc::Before), 5);
    }

    #[test]
    fn test_map_modes() {
        let delete = desc(2, 6, 0);
        assert_eq!(delete.map_pos(4, Assoc::Before, MapMode::Simple), Some(2));
        assert_eq!(delete.map_pos(4, Assoc::Before, MapMode::TrackDel), None);
        assert_eq!(delete.map_pos(2, Assoc::Before, MapMode::TrackDel), Some(2));
        assert_eq!(delete.map_pos(2, Assoc::Before, MapMode::TrackAfter), None);
        assert_eq!(delete.map_pos(2, Assoc::Before, MapMode::TrackBefore), Some(2));
        assert_eq!(delete.map_pos(6, Assoc::Before, MapMode::TrackBefore), None);
        assert_eq!(delete.map_pos(6, Assoc::Before, MapMode::TrackAfter), Some(2));
        assert_eq!(delete.map_pos(1, Assoc::Before, MapMode::TrackDel), Some(1));
    }

    #[test]
    fn test_map_total_over_document() {
        let set: ChangeSet<ChangeDesc> = [desc(0, 0, 4), desc(2, 5, 1), desc(7, 7, 3)]
            .into_iter()
            .collect();
        // document of length 6 grows to 6 + 4 - 2 + 3 = 11
        for pos in 0..=6 {
            for assoc in [Assoc::Before, Assoc::After] {
                assert!(set.map(pos, assoc) <= 11);
            }
        }
        assert_eq!(set.map(6, Assoc::After), 11);
        assert_eq!(set.length_delta(), 5);
    }

    #[test]
    fn test_mirror_recovers_deleted_positions() {
        // delete "cde" from "abcdefg", then insert it back
        let mut set = ChangeSet::single(desc(2, 5, 0));
        set.push_mirrored(desc(2, 2, 3), 0);

        assert_eq!(set.map(3, Assoc::Before), 3);
        assert_eq!(set.map(4, Assoc::After), 4);
        assert_eq!(set.map(6, Assoc::Before), 6);

        // without the mirror the position collapses
        let plain: ChangeSet<ChangeDesc> = [desc(2, 5, 0), desc(2, 2, 3)].into_iter().collect();
        assert_eq!(plain.map(3, Assoc::Before), 2);
    }

    #[test]
    fn test_mirror_outside_view_is_ignored() {
        let mut set = ChangeSet::single(desc(2, 5, 0));
        set.push_mirrored(desc(2, 2, 3), 0);
        assert_eq!(set.slice(0, 1).map(3, Assoc::Before), 2);
        assert_eq!(set.partial_mapping(1).map(2, Assoc::Before), 2);
    }

    #[test]
    fn test_map_change_and_deletes() {
        let remote: ChangeSet<ChangeDesc> = [desc(0, 0, 4), desc(9, 9, 1)].into_iter().collect();
        let undo = Change::delete(0, 5);
        assert_eq!(remote.map_change(&undo), Some(Change::delete(4, 9)));

        // an insertion inside a deleted range loses its context
        let wipe = ChangeSet::single(desc(0, 10, 0));
        let reinsert = Change::insert(4, "x");
        assert!(wipe.deletes(&reinsert));
        assert!(!wipe.deletes(&Change::insert(0, "x")));
    }

    #[test]
    fn test_compose_offsets_mirrors() {
        let mut tail = ChangeSet::single(desc(1, 3, 0));
        tail.push_mirrored(desc(1, 1, 2), 0);
        let head = ChangeSet::single(desc(0, 0, 1));

        let composed = head.compose(&tail);
        assert_eq!(composed.len(), 3);
        assert_eq!(composed.get_mirror(1), Some(2));
        assert_eq!(composed.get_mirror(2), Some(1));
        assert_eq!(composed.get_mirror(0), None);

        let sub = composed.sub_set(1, 3);
        assert_eq!(sub.get_mirror(0), Some(1));
        assert_eq!(composed.sub_set(2, 3).get_mirror(0), None);
    }

    #[test]
    fn test_desc_keeps_mirrors() {
        let mut set = ChangeSet::single(Change::delete(0, 2));
        set.push_mirrored(Change::insert(0, "ab"), 0);
        let desc = set.desc();
        assert_eq!(desc.get(1), Some(&ChangeDesc::new(0, 0, 2)));
        assert_eq!(desc.get_mirror(0), Some(1));
    }
}
