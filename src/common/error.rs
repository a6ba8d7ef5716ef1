//! Error types for the buffer pool.

use thiserror::Error;

use crate::common::{FileId, FrameId, PageId};

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors raised by the buffer pool and its file collaborators.
///
/// `NotFound` is routinely produced by the page directory and absorbed by
/// cleanup paths. `DuplicateKey` and `BadBuffer` mean an internal invariant
/// broke and should never be seen by a correct caller.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from a disk-backed file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file collaborator has no page with this identifier.
    #[error("{page_id} not found in {file}")]
    PageNotFound { file: FileId, page_id: PageId },

    /// The page directory has no entry for this page.
    #[error("no directory entry for {page_id} of {file}")]
    NotFound { file: FileId, page_id: PageId },

    /// The page directory already maps this page to a frame.
    #[error("{page_id} of {file} is already mapped to {frame_id}")]
    DuplicateKey {
        file: FileId,
        page_id: PageId,
        frame_id: FrameId,
    },

    /// Every frame in the pool is pinned; nothing can be evicted.
    ///
    /// Recoverable: callers may retry after releasing pins.
    #[error("buffer pool exceeded: all {pool_size} frames are pinned")]
    BufferExceeded { pool_size: usize },

    /// Unpin was called on a page whose pin count is already zero.
    #[error("{page_id} of {file} is not pinned")]
    PageNotPinned { file: FileId, page_id: PageId },

    /// Unpin by key was refused: every pin on the page belongs to a live
    /// page handle, which releases its own pin.
    #[error("{page_id} of {file} is pinned only by live handles (pin count {pin_count})")]
    HandlePinned {
        file: FileId,
        page_id: PageId,
        pin_count: u32,
    },

    /// A flush was blocked because a page of the file is still pinned.
    #[error("{page_id} of {file} is pinned (pin count {pin_count})")]
    PagePinned {
        file: FileId,
        page_id: PageId,
        pin_count: u32,
    },

    /// A frame claimed by a file is not valid.
    #[error("{frame_id} is inconsistent (valid: {valid}, dirty: {dirty}, ref: {ref_bit})")]
    BadBuffer {
        frame_id: FrameId,
        valid: bool,
        dirty: bool,
        ref_bit: bool,
    },

    /// A dirty frame's owning file was dropped before the page was written.
    #[error("{file} was closed while {page_id} was still dirty in the pool")]
    FileClosed { file: FileId, page_id: PageId },
}

impl Error {
    /// Whether this error is a page directory miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
