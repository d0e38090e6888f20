//! weaver-editor-history: Document changes and branching undo/redo history.
//!
//! This crate provides:
//! - `Change` / `ChangeDesc` / `ChangeSet` - composable, invertible edits with position mapping
//! - `TruncatingStack` - bounded persistent sequence with segment-wise eviction
//! - `Branch` - one side of the history, with merging, remapped pops and rebasing
//! - `HistoryState` - done/undone branches with grouping by time and adjacency
//! - `Transaction` and `HistoryEditor<T>` - editing surface generic over `TextBuffer`

pub mod branch;
pub mod change;
pub mod editor;
pub mod error;
pub mod history;
pub mod stack;
pub mod text;
pub mod transaction;
pub mod types;
pub mod undo;

pub use branch::{Branch, Item, MergePolicy, PopFilter, PoppedChanges, UndoEntry};
pub use change::{
    Change, ChangeDesc, ChangeLike, ChangeSet, MapMode, MapResult, Mapping, PartialMapping,
};
pub use editor::HistoryEditor;
pub use error::ChangeError;
pub use history::{HistoryConfig, HistoryState, PopResult, PopTarget};
pub use smol_str::SmolStr;
pub use stack::TruncatingStack;
pub use text::{EditorRope, TextBuffer};
pub use transaction::Transaction;
pub use types::{Assoc, Selection, SelectionRange, UserEvent};
pub use undo::UndoManager;
