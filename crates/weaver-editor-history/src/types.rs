//! Core editor types: selections, association and user-event tags.
//!
//! These types are framework-agnostic and can be used with any text buffer implementation.

use smol_str::SmolStr;

use crate::change::Mapping;
use crate::error::ChangeError;

/// Which side a position sticks to when text is inserted exactly at it.
///
/// `Before` keeps the position in front of the inserted text, `After` moves
/// it past the inserted text.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Default)]
pub enum Assoc {
    #[default]
    Before,
    After,
}

/// A single selection range with anchor and head positions.
///
/// The anchor is where the selection started, the head is where the cursor is now.
/// They may be in any order - use `start()` and `end()` for ordered bounds.
#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub struct SelectionRange {
    /// Where selection started
    pub anchor: usize,
    /// Where cursor is now
    pub head: usize,
}

impl SelectionRange {
    /// Create a new selection range.
    pub fn new(anchor: usize, head: usize) -> Self {
        Self { anchor, head }
    }

    /// Create a collapsed range (cursor position).
    pub fn collapsed(offset: usize) -> Self {
        Self {
            anchor: offset,
            head: offset,
        }
    }

    /// Get the start (lower bound) of the range.
    pub fn start(&self) -> usize {
        self.anchor.min(self.head)
    }

    /// Get the end (upper bound) of the range.
    pub fn end(&self) -> usize {
        self.anchor.max(self.head)
    }

    /// Check if the range is collapsed (empty, cursor only).
    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.head
    }

    /// Map both ends through a mapping.
    pub fn map<M: Mapping + ?Sized>(&self, mapping: &M, assoc: Assoc) -> Self {
        Self {
            anchor: mapping.map(self.anchor, assoc),
            head: mapping.map(self.head, assoc),
        }
    }
}

/// A set of selection ranges with one of them marked primary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    ranges: Vec<SelectionRange>,
    primary: usize,
}

impl Default for Selection {
    fn default() -> Self {
        Self::cursor(0)
    }
}

impl Selection {
    /// Create a selection from ranges.
    ///
    /// # Panics
    ///
    /// If `ranges` is empty or `primary` is out of range.
    pub fn new(ranges: Vec<SelectionRange>, primary: usize) -> Self {
        assert!(!ranges.is_empty(), "a selection needs at least one range");
        assert!(primary < ranges.len(), "primary range {primary} out of range");
        Self { ranges, primary }
    }

    /// A single range.
    pub fn single(anchor: usize, head: usize) -> Self {
        Self {
            ranges: vec![SelectionRange::new(anchor, head)],
            primary: 0,
        }
    }

    /// A single collapsed cursor.
    pub fn cursor(offset: usize) -> Self {
        Self::single(offset, offset)
    }

    pub fn ranges(&self) -> &[SelectionRange] {
        &self.ranges
    }

    pub fn primary(&self) -> SelectionRange {
        self.ranges[self.primary]
    }

    pub fn primary_index(&self) -> usize {
        self.primary
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// A selection always has at least one range.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Same number of ranges, with the same collapsed/extended pattern.
    pub fn same_shape(&self, other: &Selection) -> bool {
        self.ranges.len() == other.ranges.len()
            && self
                .ranges
                .iter()
                .zip(&other.ranges)
                .all(|(a, b)| a.is_collapsed() == b.is_collapsed())
    }

    /// Map every range through a mapping.
    pub fn map<M: Mapping + ?Sized>(&self, mapping: &M) -> Selection {
        Selection {
            ranges: self
                .ranges
                .iter()
                .map(|range| range.map(mapping, Assoc::Before))
                .collect(),
            primary: self.primary,
        }
    }

    /// Ensure every range fits in a document of `doc_len` chars.
    pub fn check(&self, doc_len: usize) -> Result<(), ChangeError> {
        match self.ranges.iter().map(SelectionRange::end).find(|&end| end > doc_len) {
            Some(pos) => Err(ChangeError::SelectionOutOfBounds { pos, len: doc_len }),
            None => Ok(()),
        }
    }
}

/// Coarse tag describing what kind of user action produced a transaction.
///
/// History uses it as a merge hint: selection-only updates coalesce only
/// when both they and the previous update came from the keyboard.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum UserEvent {
    Keyboard,
    Pointer,
    Paste,
    Other(SmolStr),
}
