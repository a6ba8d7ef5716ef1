//! Pinned page handles.
//!
//! A [`PinnedPage`] is proof that a page is pinned in the buffer pool. Page
//! bytes are only reachable through borrows of the handle, so they cannot
//! outlive the pin:
//! - [`PinnedPage::read`] - shared access to the frame contents
//! - [`PinnedPage::write`] - exclusive access; marks the page dirty
//!
//! The pin is released by [`PinnedPage::unpin`] or when the handle drops.
//! While a handle lives its frame is never given to another page, even if
//! the page itself is disposed.

use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

use super::buffer_pool_manager::BufferPoolManager;
use crate::common::{FileId, FrameId, PageId, Result};
use crate::storage::page::Page;
use crate::storage::PageFile;

/// A pinned page in the buffer pool.
///
/// Several handles may pin the same page at once; they share the frame.
/// A handle keeps the file it was obtained through alive, and dirty pages
/// it releases are written back through that file if the frame's original
/// owner is gone.
/// Holding a `write()` guard while asking for another guard on the same
/// page from the same thread deadlocks, as with any `RwLock`.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use clockpool::{BufferPoolManager, PageFile};
/// use clockpool::storage::MemoryFile;
///
/// let file: Arc<dyn PageFile> = Arc::new(MemoryFile::new("doc"));
/// let bpm = BufferPoolManager::new(4);
///
/// let mut page = bpm.allocate_page(&file).unwrap();
/// page.write().as_mut_slice()[0] = 0xAB;
/// let page_id = page.page_id();
/// page.unpin(false).unwrap(); // still dirty: write() marked it
///
/// let page = bpm.fetch_page(&file, page_id).unwrap();
/// assert_eq!(page.read().as_slice()[0], 0xAB);
/// ```
pub struct PinnedPage<'a> {
    bpm: &'a BufferPoolManager,
    frame_id: FrameId,
    file: Arc<dyn PageFile>,
    file_id: FileId,
    page_id: PageId,
    dirty: bool,
    released: bool,
}

impl std::fmt::Debug for PinnedPage<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinnedPage")
            .field("frame_id", &self.frame_id)
            .field("file_id", &self.file_id)
            .field("page_id", &self.page_id)
            .field("dirty", &self.dirty)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl<'a> PinnedPage<'a> {
    pub(crate) fn new(
        bpm: &'a BufferPoolManager,
        frame_id: FrameId,
        file: Arc<dyn PageFile>,
        file_id: FileId,
        page_id: PageId,
    ) -> Self {
        Self {
            bpm,
            frame_id,
            file,
            file_id,
            page_id,
            dirty: false,
            released: false,
        }
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    #[inline]
    pub fn file_id(&self) -> &FileId {
        &self.file_id
    }

    /// Frame backing this page.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Shared access to the page contents.
    pub fn read(&self) -> RwLockReadGuard<'_, Page> {
        self.bpm.frame_page(self.frame_id).read()
    }

    /// Exclusive access to the page contents. The page will be unpinned
    /// dirty.
    pub fn write(&mut self) -> RwLockWriteGuard<'_, Page> {
        self.dirty = true;
        self.bpm.frame_page(self.frame_id).write()
    }

    /// Mark the page dirty without touching it.
    #[inline]
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Whether this handle will unpin the page dirty.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Release the pin. `is_dirty` is combined with any earlier `write()`.
    ///
    /// If the page was disposed while pinned, the pin simply goes away.
    ///
    /// # Errors
    /// `Error::BadBuffer` if the frame has no pin to release, which only a
    /// broken pool invariant can cause.
    pub fn unpin(mut self, is_dirty: bool) -> Result<()> {
        self.released = true;
        self.bpm
            .release_pin(self.frame_id, &self.file, self.dirty || is_dirty)
    }

    /// Keep the pin but drop the handle.
    ///
    /// The caller takes over the pin and must release it with
    /// [`BufferPoolManager::unpin_page`]. Pending dirtiness from `write()`
    /// is recorded on the frame now. Detaching from a disposed page just
    /// releases the pin.
    pub fn detach(mut self) -> (FileId, PageId) {
        self.released = true;
        self.bpm.detach_pin(self.frame_id, &self.file, self.dirty);
        (self.file_id.clone(), self.page_id)
    }
}

impl Drop for PinnedPage<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self
            .bpm
            .release_pin(self.frame_id, &self.file, self.dirty)
        {
            warn!(
                file = %self.file_id,
                page = self.page_id.0,
                error = %err,
                "pinned_page.drop.unpin_failed"
            );
        }
    }
}
