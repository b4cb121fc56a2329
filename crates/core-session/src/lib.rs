//! Contracts for the document/session collaborator.
//!
//! The dispatch core never touches outline data directly: command bodies see
//! the session only through the traits in this crate. The concrete document
//! model, persistence, and undo log live in the host application; everything
//! here is an interface plus the small value types those interfaces exchange.
//!
//! Mutation methods return boxed futures ([`SessionFuture`]) because a real
//! host may suspend inside them (storage round trips, layout queries). The
//! engine awaits each one to completion before admitting the next key token,
//! so implementations never observe interleaved commands.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

pub type SessionFuture<'a, T = ()> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + 'a>>;

/// Address of a block within the outline tree.
pub type BlockPath = Vec<u64>;

/// Named input contexts, each with its own key-mapping table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Normal,
    Insert,
    Visual,
    Search,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Normal, Mode::Insert, Mode::Visual, Mode::Search];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Normal => "normal",
            Mode::Insert => "insert",
            Mode::Visual => "visual",
            Mode::Search => "search",
        }
    }
}

/// Options accepted by every cursor movement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CursorOptions {
    /// Allow the cursor to rest past the last column (insert-mode semantics).
    pub past_end: bool,
    /// Treat a word end as the cell after its last letter.
    pub past_end_word: bool,
    /// Preserve formatting properties across the motion.
    pub keep_properties: bool,
}

impl CursorOptions {
    pub const fn past_end() -> Self {
        Self {
            past_end: true,
            past_end_word: false,
            keep_properties: false,
        }
    }
}

/// Cursor-like object owned by the session. Motions receive `&mut dyn
/// OutlineCursor` and move it in place; operators move a clone and act on the
/// span between origin and clone.
pub trait OutlineCursor {
    fn clone_cursor(&self) -> Box<dyn OutlineCursor>;

    fn path(&self) -> BlockPath;
    fn position(&self) -> usize;

    fn left(&mut self, opts: &CursorOptions);
    fn right(&mut self, opts: &CursorOptions);
    fn up(&mut self, opts: &CursorOptions);
    fn down(&mut self, opts: &CursorOptions);
    fn home(&mut self, opts: &CursorOptions);
    fn end(&mut self, opts: &CursorOptions);
    /// Move to the parent block of the current one.
    fn parent(&mut self, opts: &CursorOptions);
    fn word_forward(&mut self, opts: &CursorOptions);
    fn word_backward(&mut self, opts: &CursorOptions);
    /// Jump to the next clone of the current block elsewhere in the tree.
    fn next_clone(&mut self, opts: &CursorOptions);

    fn set_path(&mut self, path: BlockPath);
    fn set_position(&mut self, col: usize);
    /// Toggle a formatting property at the cursor (bold, strikethrough, ...).
    fn toggle_property(&mut self, property: &str);
}

/// One matching line from a document search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineHit {
    pub path: BlockPath,
    /// Character indices of matched spans, for highlighting.
    pub matches: Vec<usize>,
}

/// The editing session: block/line mutation, undo bookkeeping, mode state,
/// and document queries. Every operation may suspend.
pub trait Session {
    fn cursor(&mut self) -> &mut dyn OutlineCursor;
    fn mode(&self) -> Mode;
    fn set_mode(&mut self, mode: Mode) -> SessionFuture<'_>;

    fn delete_blocks(&mut self, count: u32) -> SessionFuture<'_>;
    fn delete_span(&mut self, path: BlockPath, start: usize, end: usize) -> SessionFuture<'_>;
    fn yank_blocks(&mut self, count: u32) -> SessionFuture<'_>;
    fn yank_span(&mut self, path: BlockPath, start: usize, end: usize) -> SessionFuture<'_>;
    fn paste(&mut self, after: bool) -> SessionFuture<'_>;
    fn indent(&mut self, count: u32) -> SessionFuture<'_>;
    fn outdent(&mut self, count: u32) -> SessionFuture<'_>;
    fn join(&mut self, count: u32) -> SessionFuture<'_>;
    fn split_line(&mut self) -> SessionFuture<'_>;

    fn undo(&mut self, count: u32) -> SessionFuture<'_>;
    fn redo(&mut self, count: u32) -> SessionFuture<'_>;
    /// Commit everything since the previous checkpoint as one undo step.
    fn checkpoint(&mut self) -> SessionFuture<'_>;

    fn search<'a>(&'a mut self, query: &'a str) -> SessionFuture<'a, Vec<LineHit>>;
    fn get_line(&mut self, path: BlockPath) -> SessionFuture<'_, String>;
    fn get_child_range(&mut self, path: BlockPath) -> SessionFuture<'_, Vec<BlockPath>>;
}
