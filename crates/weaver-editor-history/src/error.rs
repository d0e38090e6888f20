//! Error types for applying changes and selections.

use thiserror::Error;

/// Errors raised when a change or selection does not fit the document it is
/// applied to.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ChangeError {
    /// The change ends before it starts.
    #[error("change range {from}..{to} is inverted")]
    InvertedRange { from: usize, to: usize },

    /// The change reaches past the end of the document.
    #[error("change range {from}..{to} is out of bounds for document of length {len}")]
    OutOfBounds { from: usize, to: usize, len: usize },

    /// A selection endpoint lies past the end of the document.
    #[error("selection position {pos} is out of bounds for document of length {len}")]
    SelectionOutOfBounds { pos: usize, len: usize },
}
