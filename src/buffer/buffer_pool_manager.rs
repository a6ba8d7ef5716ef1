//! Buffer Pool Manager - the page caching layer.
//!
//! The [`BufferPoolManager`] provides:
//! - Page caching between paged files and memory
//! - Pin-based reference counting through [`PinnedPage`] handles
//! - CLOCK eviction with dirty page write-back
//! - Per-file flush and page disposal

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, trace, warn};

use crate::buffer::replacer::ClockReplacer;
use crate::buffer::{BufferPoolStats, FrameDescriptor, FrameInfo, FrameOwner, PageDirectory, PinnedPage};
use crate::common::{Error, FileId, FrameId, PageId, Result};
use crate::storage::page::Page;
use crate::storage::PageFile;

/// Manages a fixed pool of frames caching pages of any number of files.
///
/// # Architecture
/// ```text
/// ┌──────────────────────────────────────────────────────────────┐
/// │                      BufferPoolManager                       │
/// │  state: Mutex<PoolState>                                     │
/// │  ┌───────────────┐ ┌──────────────────────┐ ┌─────────────┐  │
/// │  │ directory     │ │ descriptors          │ │ clock       │  │
/// │  │(File,Page)→Fid│─▶ [Desc0][Desc1] ...   │◀┤ hand        │  │
/// │  └───────────────┘ └──────────────────────┘ └─────────────┘  │
/// │  pages: Vec<RwLock<Page>>                                    │
/// │  [Page0] [Page1] [Page2] ...                                 │
/// └──────────────────────────────────────────────────────────────┘
/// ```
///
/// # Thread Safety
/// - `state`: one `Mutex` around descriptors, directory and clock hand.
///   Lookup-then-pin and the clock sweep are atomic under it. File I/O for
///   misses, write-backs and flushes also runs under it.
/// - `pages`: one `RwLock` per frame, taken through [`PinnedPage`] guards.
///   The pool only locks the bytes of unpinned frames while holding `state`,
///   so a thread holding a page guard can always call back into the pool.
/// - `stats`: atomic counters.
///
/// # Files
/// Files are passed in on every call and never owned. Frames keep a `Weak`
/// reference to write back dirty pages on eviction. Any live `Arc` of a file
/// with the same identity can take over that reference: hits and dirty
/// unpins re-point frames whose owner was dropped. Flush a file with
/// [`flush_file`](Self::flush_file) before dropping its last instance.
///
/// # Pins
/// [`PinnedPage`] handles own their pins. [`unpin_page`](Self::unpin_page)
/// only releases pins handed over by [`PinnedPage::detach`], so a frame is
/// never reused while a handle can still reach its bytes.
///
/// # Usage
/// ```
/// use std::sync::Arc;
/// use clockpool::{BufferPoolManager, PageFile};
/// use clockpool::storage::MemoryFile;
///
/// let file: Arc<dyn PageFile> = Arc::new(MemoryFile::new("users"));
/// let bpm = BufferPoolManager::new(8);
///
/// let mut page = bpm.allocate_page(&file).unwrap();
/// page.write().as_mut_slice()[..5].copy_from_slice(b"hello");
/// let page_id = page.page_id();
/// drop(page);
///
/// bpm.flush_file(&file).unwrap();
/// assert!(!bpm.is_resident(&file, page_id));
/// ```
pub struct BufferPoolManager {
    /// Page bytes, indexed by `FrameId`.
    pages: Vec<RwLock<Page>>,

    state: Mutex<PoolState>,

    stats: BufferPoolStats,

    pool_size: usize,
}

struct PoolState {
    descriptors: Vec<FrameDescriptor>,
    directory: PageDirectory,
    clock: ClockReplacer,
}

impl BufferPoolManager {
    /// Create a buffer pool with `pool_size` frames.
    ///
    /// # Panics
    /// Panics if `pool_size` is 0.
    pub fn new(pool_size: usize) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");

        Self {
            pages: (0..pool_size).map(|_| RwLock::new(Page::new())).collect(),
            state: Mutex::new(PoolState {
                descriptors: (0..pool_size).map(|_| FrameDescriptor::new()).collect(),
                directory: PageDirectory::for_pool(pool_size),
                clock: ClockReplacer::new(pool_size),
            }),
            stats: BufferPoolStats::new(),
            pool_size,
        }
    }

    // ========================================================================
    // Public API: Fetch and allocate
    // ========================================================================

    /// Pin a page, reading it through `file` if it is not resident.
    ///
    /// A miss may evict another page, writing it back first if dirty.
    ///
    /// # Errors
    /// - `Error::BufferExceeded` if every frame is pinned
    /// - `Error::PageNotFound` (or I/O errors) from the file read
    /// - Write-back errors from the evicted page's file
    pub fn fetch_page(&self, file: &Arc<dyn PageFile>, page_id: PageId) -> Result<PinnedPage<'_>> {
        let file_id = file.identity();
        let mut state = self.state.lock();

        if let Ok(frame_id) = state.directory.lookup(&file_id, page_id) {
            let desc = &mut state.descriptors[frame_id.0];
            desc.set_owner(FrameOwner::new(file));
            desc.set_ref_bit();
            desc.pin();

            BufferPoolStats::bump(&self.stats.cache_hits);
            trace!(file = %file_id, page = page_id.0, frame = frame_id.0, "buffer_pool.fetch.hit");
            return Ok(PinnedPage::new(self, frame_id, Arc::clone(file), file_id, page_id));
        }

        BufferPoolStats::bump(&self.stats.cache_misses);
        let frame_id = self.acquire_frame(&mut state)?;

        // On a failed read the frame simply stays unused.
        let page = file.read_page(page_id)?;
        BufferPoolStats::bump(&self.stats.pages_read);
        self.pages[frame_id.0].write().copy_from(&page);

        Self::install(&mut state, frame_id, file, &file_id, page_id)?;
        trace!(file = %file_id, page = page_id.0, frame = frame_id.0, "buffer_pool.fetch.miss");
        Ok(PinnedPage::new(self, frame_id, Arc::clone(file), file_id, page_id))
    }

    /// Allocate a new page in `file` and pin it.
    ///
    /// The new page id is available from [`PinnedPage::page_id`].
    ///
    /// # Errors
    /// - Errors from the file allocation
    /// - `Error::BufferExceeded` if every frame is pinned; the freshly
    ///   allocated page is deleted again before the error is returned
    pub fn allocate_page(&self, file: &Arc<dyn PageFile>) -> Result<PinnedPage<'_>> {
        let file_id = file.identity();
        let mut state = self.state.lock();

        let (page_id, page) = file.allocate_page()?;
        BufferPoolStats::bump(&self.stats.pages_allocated);

        let frame_id = match self.acquire_frame(&mut state) {
            Ok(frame_id) => frame_id,
            Err(err) => {
                debug!(file = %file_id, page = page_id.0, error = %err, "buffer_pool.allocate.rollback");
                if let Err(rollback) = self.dispose_locked(&mut state, file.as_ref(), &file_id, page_id) {
                    warn!(
                        file = %file_id,
                        page = page_id.0,
                        error = %rollback,
                        "buffer_pool.allocate.rollback_failed"
                    );
                }
                return Err(err);
            }
        };

        self.pages[frame_id.0].write().copy_from(&page);
        Self::install(&mut state, frame_id, file, &file_id, page_id)?;
        debug!(file = %file_id, page = page_id.0, frame = frame_id.0, "buffer_pool.allocate");
        Ok(PinnedPage::new(self, frame_id, Arc::clone(file), file_id, page_id))
    }

    // ========================================================================
    // Public API: Unpin
    // ========================================================================

    /// Release one pin on a page.
    ///
    /// Pair this with [`PinnedPage::detach`]; handles unpin themselves.
    /// `is_dirty` only ever sets the dirty flag. Unpinning a page that is
    /// not resident is a no-op.
    ///
    /// # Errors
    /// On both errors the frame is left untouched.
    /// - `Error::PageNotPinned` if the page's pin count is already zero
    /// - `Error::HandlePinned` if every remaining pin belongs to a live
    ///   [`PinnedPage`]
    pub fn unpin_page(&self, file: &Arc<dyn PageFile>, page_id: PageId, is_dirty: bool) -> Result<()> {
        let file_id = file.identity();
        let mut state = self.state.lock();

        let Ok(frame_id) = state.directory.lookup(&file_id, page_id) else {
            trace!(file = %file_id, page = page_id.0, "buffer_pool.unpin.not_resident");
            return Ok(());
        };

        let desc = &mut state.descriptors[frame_id.0];
        if desc.detached_pins() == 0 {
            return Err(if desc.is_pinned() {
                Error::HandlePinned {
                    file: file_id,
                    page_id,
                    pin_count: desc.pin_count(),
                }
            } else {
                Error::PageNotPinned {
                    file: file_id,
                    page_id,
                }
            });
        }

        if is_dirty {
            desc.mark_dirty();
            desc.refresh_owner(file);
        }
        if desc.release_detached() == Some(0) {
            desc.set_ref_bit();
        }
        Ok(())
    }

    // ========================================================================
    // Public API: Flush and dispose
    // ========================================================================

    /// Write back and drop every resident page of `file`.
    ///
    /// All-or-nothing: if any page of the file is pinned, nothing is written
    /// and nothing leaves the pool. Every dirty page is written before any
    /// page is dropped, so a failed write leaves all of the file's pages
    /// resident (those already written are now clean).
    ///
    /// # Errors
    /// - `Error::PagePinned` if a page of the file is pinned
    /// - `Error::BadBuffer` if a frame claimed by the file is not valid
    /// - Errors from the file writes
    pub fn flush_file(&self, file: &Arc<dyn PageFile>) -> Result<()> {
        let file_id = file.identity();
        let mut state = self.state.lock();

        let owned: Vec<FrameId> = state
            .descriptors
            .iter()
            .enumerate()
            .filter(|(_, desc)| desc.belongs_to(&file_id))
            .map(|(i, _)| FrameId::new(i))
            .collect();

        if let Some(desc) = owned
            .iter()
            .map(|frame_id| &state.descriptors[frame_id.0])
            .find(|desc| desc.is_pinned())
        {
            return Err(Error::PagePinned {
                file: file_id,
                page_id: desc.page_id(),
                pin_count: desc.pin_count(),
            });
        }

        for &frame_id in &owned {
            let desc = &state.descriptors[frame_id.0];
            if !desc.is_valid() {
                error!(frame = frame_id.0, file = %file_id, "buffer_pool.flush_file.bad_buffer");
                return Err(Error::BadBuffer {
                    frame_id,
                    valid: desc.is_valid(),
                    dirty: desc.is_dirty(),
                    ref_bit: desc.ref_bit(),
                });
            }
        }

        let mut written = 0;
        for &frame_id in &owned {
            let desc = &mut state.descriptors[frame_id.0];
            if !desc.is_dirty() {
                continue;
            }
            file.write_page(desc.page_id(), &self.pages[frame_id.0].read())?;
            desc.clear_dirty();
            BufferPoolStats::bump(&self.stats.pages_written);
            written += 1;
        }

        for frame_id in owned {
            let page_id = state.descriptors[frame_id.0].page_id();
            // Directory miss is harmless here.
            let _ = state.directory.remove(&file_id, page_id);
            state.descriptors[frame_id.0].clear();
        }

        debug!(file = %file_id, written, "buffer_pool.flush_file");
        Ok(())
    }

    /// Delete a page from `file`, dropping it from the pool first if
    /// resident.
    ///
    /// Disposal does not wait for pins: a pinned page is dropped anyway.
    /// Its frame stays out of circulation until the outstanding handles are
    /// released, and their writes go nowhere. Detached pins on the page
    /// are dropped with it.
    ///
    /// # Errors
    /// Errors from the file delete.
    pub fn dispose_page(&self, file: &Arc<dyn PageFile>, page_id: PageId) -> Result<()> {
        let file_id = file.identity();
        let mut state = self.state.lock();
        self.dispose_locked(&mut state, file.as_ref(), &file_id, page_id)
    }

    /// Write back every dirty, unpinned page, keeping it resident.
    ///
    /// Pinned pages stay dirty; they are written when evicted, flushed or at
    /// shutdown.
    ///
    /// # Errors
    /// The first write-back error; later frames are still attempted.
    pub fn flush_all_pages(&self) -> Result<()> {
        let mut state = self.state.lock();
        let mut first_err = None;

        for (i, desc) in state.descriptors.iter_mut().enumerate() {
            if !desc.is_valid() || !desc.is_dirty() || desc.is_pinned() {
                continue;
            }
            match Self::write_back(FrameId::new(i), desc, &self.pages[i].read()) {
                Ok(()) => {
                    desc.clear_dirty();
                    BufferPoolStats::bump(&self.stats.pages_written);
                }
                Err(err) => {
                    first_err.get_or_insert(err);
                }
            }
        }

        first_err.map_or(Ok(()), Err)
    }

    /// Write back every dirty page and release the pool.
    ///
    /// Dropping the pool does the same but can only log failures.
    ///
    /// # Errors
    /// The first write-back error; later frames are still attempted.
    pub fn shutdown(mut self) -> Result<()> {
        self.write_back_all()
    }

    // ========================================================================
    // Public API: Introspection
    // ========================================================================

    /// Get buffer pool statistics.
    pub fn stats(&self) -> &BufferPoolStats {
        &self.stats
    }

    /// Get the pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Number of resident pages (directory entries).
    pub fn page_count(&self) -> usize {
        self.state.lock().directory.len()
    }

    /// Number of frames free to take a page without eviction.
    pub fn free_frame_count(&self) -> usize {
        self.state
            .lock()
            .descriptors
            .iter()
            .filter(|desc| !desc.is_valid() && !desc.is_pinned())
            .count()
    }

    /// Whether a page is resident.
    pub fn is_resident(&self, file: &Arc<dyn PageFile>, page_id: PageId) -> bool {
        self.state
            .lock()
            .directory
            .lookup(&file.identity(), page_id)
            .is_ok()
    }

    /// Pin count of a resident page, or `None` if it is not resident.
    pub fn pin_count(&self, file: &Arc<dyn PageFile>, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        let frame_id = state.directory.lookup(&file.identity(), page_id).ok()?;
        Some(state.descriptors[frame_id.0].pin_count())
    }

    /// Snapshot of every frame descriptor, in frame order.
    pub fn frame_infos(&self) -> Vec<FrameInfo> {
        self.state
            .lock()
            .descriptors
            .iter()
            .enumerate()
            .map(|(i, desc)| desc.info(FrameId::new(i)))
            .collect()
    }

    // ========================================================================
    // Internal: used by PinnedPage
    // ========================================================================

    pub(crate) fn frame_page(&self, frame_id: FrameId) -> &RwLock<Page> {
        &self.pages[frame_id.0]
    }

    /// Release a handle's pin. On a retired frame (page disposed while
    /// pinned) the pin just goes away.
    pub(crate) fn release_pin(
        &self,
        frame_id: FrameId,
        file: &Arc<dyn PageFile>,
        is_dirty: bool,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let desc = &mut state.descriptors[frame_id.0];

        let Some(remaining) = desc.unpin() else {
            error!(frame = frame_id.0, "buffer_pool.release.not_pinned");
            return Err(Error::BadBuffer {
                frame_id,
                valid: desc.is_valid(),
                dirty: desc.is_dirty(),
                ref_bit: desc.ref_bit(),
            });
        };
        if !desc.is_valid() {
            trace!(frame = frame_id.0, pins = remaining, "buffer_pool.release.retired");
            return Ok(());
        }

        if is_dirty {
            desc.mark_dirty();
            desc.refresh_owner(file);
        }
        if remaining == 0 {
            desc.set_ref_bit();
        }
        Ok(())
    }

    /// Turn a handle's pin into a detached pin.
    pub(crate) fn detach_pin(&self, frame_id: FrameId, file: &Arc<dyn PageFile>, is_dirty: bool) {
        let mut state = self.state.lock();
        let desc = &mut state.descriptors[frame_id.0];

        if !desc.is_valid() {
            // No key can reach a retired frame, so keep nothing.
            let _ = desc.unpin();
            return;
        }
        if is_dirty {
            desc.mark_dirty();
            desc.refresh_owner(file);
        }
        desc.detach_pin();
    }

    // ========================================================================
    // Internal: frame bookkeeping
    // ========================================================================

    /// Map a freshly filled frame into the directory and pin it.
    fn install(
        state: &mut PoolState,
        frame_id: FrameId,
        file: &Arc<dyn PageFile>,
        file_id: &FileId,
        page_id: PageId,
    ) -> Result<()> {
        state.directory.insert(file_id, page_id, frame_id)?;
        state.descriptors[frame_id.0].set(FrameOwner::new(file), page_id);
        Ok(())
    }

    /// Get an unused frame, evicting the clock's victim if necessary.
    ///
    /// A dirty victim is written back before it loses its page. If the
    /// write-back fails the victim stays resident and dirty.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        let frame_id = state
            .clock
            .victim(&mut state.descriptors)
            .ok_or(Error::BufferExceeded {
                pool_size: self.pool_size,
            })?;

        let desc = &mut state.descriptors[frame_id.0];
        if !desc.is_valid() {
            return Ok(frame_id);
        }

        let page_id = desc.page_id();
        if desc.is_dirty() {
            Self::write_back(frame_id, desc, &self.pages[frame_id.0].read())?;
            desc.clear_dirty();
            BufferPoolStats::bump(&self.stats.pages_written);
        }

        if let Some(file_id) = desc.file_id().cloned() {
            // Directory miss is harmless here.
            let _ = state.directory.remove(&file_id, page_id);
            debug!(frame = frame_id.0, file = %file_id, page = page_id.0, "buffer_pool.evict");
        }
        state.descriptors[frame_id.0].clear();
        BufferPoolStats::bump(&self.stats.evictions);

        Ok(frame_id)
    }

    fn dispose_locked(
        &self,
        state: &mut PoolState,
        file: &dyn PageFile,
        file_id: &FileId,
        page_id: PageId,
    ) -> Result<()> {
        if let Ok(frame_id) = state.directory.remove(file_id, page_id) {
            let desc = &mut state.descriptors[frame_id.0];
            desc.retire();
            if desc.is_pinned() {
                debug!(
                    frame = frame_id.0,
                    file = %file_id,
                    page = page_id.0,
                    handles = desc.pin_count(),
                    "buffer_pool.dispose.retired"
                );
            }
        }

        file.delete_page(page_id)?;
        BufferPoolStats::bump(&self.stats.pages_disposed);
        debug!(file = %file_id, page = page_id.0, "buffer_pool.dispose");
        Ok(())
    }

    /// Write a dirty frame to its owning file.
    fn write_back(frame_id: FrameId, desc: &FrameDescriptor, page: &Page) -> Result<()> {
        let owner = desc.owner().ok_or(Error::BadBuffer {
            frame_id,
            valid: desc.is_valid(),
            dirty: desc.is_dirty(),
            ref_bit: desc.ref_bit(),
        })?;
        let file = owner.upgrade().ok_or_else(|| Error::FileClosed {
            file: owner.id().clone(),
            page_id: desc.page_id(),
        })?;

        file.write_page(desc.page_id(), page)?;
        trace!(file = %owner.id(), page = desc.page_id().0, "buffer_pool.write_back");
        Ok(())
    }

    /// Write back every valid dirty frame, pinned or not.
    fn write_back_all(&mut self) -> Result<()> {
        let state = self.state.get_mut();
        let mut first_err = None;

        for (i, (desc, page)) in state
            .descriptors
            .iter_mut()
            .zip(self.pages.iter_mut())
            .enumerate()
        {
            if !desc.is_valid() || !desc.is_dirty() {
                continue;
            }
            match Self::write_back(FrameId::new(i), desc, page.get_mut()) {
                Ok(()) => {
                    desc.clear_dirty();
                    BufferPoolStats::bump(&self.stats.pages_written);
                }
                Err(err) => {
                    warn!(page = desc.page_id().0, error = %err, "buffer_pool.shutdown.write_back_failed");
                    first_err.get_or_insert(err);
                }
            }
        }

        first_err.map_or(Ok(()), Err)
    }
}

impl Drop for BufferPoolManager {
    fn drop(&mut self) {
        // Failures are already logged per frame.
        let _ = self.write_back_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DiskFile, MemoryFile};
    use tempfile::tempdir;

    /// A pool plus one in-memory file, kept both as itself (for I/O
    /// counters) and as a trait object (for the pool).
    fn setup(pool_size: usize) -> (Arc<MemoryFile>, Arc<dyn PageFile>, BufferPoolManager) {
        let mem = Arc::new(MemoryFile::new("test"));
        let file: Arc<dyn PageFile> = mem.clone();
        (mem, file, BufferPoolManager::new(pool_size))
    }

    /// Allocate `n` pages directly in the file, bypassing the pool.
    fn preallocate(file: &Arc<dyn PageFile>, n: u32) -> Vec<PageId> {
        (0..n).map(|_| file.allocate_page().unwrap().0).collect()
    }

    #[test]
    fn test_allocate_page() {
        let (_mem, file, bpm) = setup(10);

        let page = bpm.allocate_page(&file).unwrap();
        assert_eq!(page.page_id(), PageId::new(0));
        assert_eq!(bpm.pin_count(&file, PageId::new(0)), Some(1));
        drop(page);

        let page = bpm.allocate_page(&file).unwrap();
        assert_eq!(page.page_id(), PageId::new(1));
        assert_eq!(bpm.page_count(), 2);
    }

    #[test]
    fn test_fetch_hit_shares_frame() {
        let (_mem, file, bpm) = setup(10);
        let pid = preallocate(&file, 1)[0];

        let a = bpm.fetch_page(&file, pid).unwrap();
        let b = bpm.fetch_page(&file, pid).unwrap();
        assert_eq!(a.frame_id(), b.frame_id());
        assert_eq!(bpm.pin_count(&file, pid), Some(2));

        drop(a);
        assert_eq!(bpm.pin_count(&file, pid), Some(1));
        drop(b);
        assert_eq!(bpm.pin_count(&file, pid), Some(0));

        let snapshot = bpm.stats().snapshot();
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 1);
    }

    #[test]
    fn test_fetch_missing_page_leaves_frame_unused() {
        let (_mem, file, bpm) = setup(2);

        let err = bpm.fetch_page(&file, PageId::new(99)).unwrap_err();
        assert!(matches!(err, Error::PageNotFound { .. }));
        assert_eq!(bpm.page_count(), 0);
        assert_eq!(bpm.free_frame_count(), 2);
    }

    #[test]
    fn test_unpin_sets_ref_bit_and_dirty() {
        let (_mem, file, bpm) = setup(2);
        let pid = preallocate(&file, 1)[0];

        bpm.fetch_page(&file, pid).unwrap().detach();
        bpm.unpin_page(&file, pid, true).unwrap();

        let info = &bpm.frame_infos()[0];
        assert_eq!(info.pin_count, 0);
        assert!(info.dirty);
        assert!(info.ref_bit);
    }

    #[test]
    fn test_unpin_unpinned_page_fails_without_change() {
        let (_mem, file, bpm) = setup(2);
        let pid = preallocate(&file, 1)[0];

        bpm.fetch_page(&file, pid).unwrap().unpin(false).unwrap();
        let before = bpm.frame_infos();

        let err = bpm.unpin_page(&file, pid, true).unwrap_err();
        assert!(matches!(err, Error::PageNotPinned { .. }));
        assert_eq!(bpm.frame_infos(), before);
    }

    #[test]
    fn test_unpin_not_resident_is_noop() {
        let (_mem, file, bpm) = setup(2);
        assert!(bpm.unpin_page(&file, PageId::new(5), true).is_ok());
    }

    #[test]
    fn test_clock_evicts_first_unpinned() {
        let (_mem, file, bpm) = setup(3);
        let pids = preallocate(&file, 4);

        let a = bpm.fetch_page(&file, pids[0]).unwrap();
        let b = bpm.fetch_page(&file, pids[1]).unwrap();
        let _c = bpm.fetch_page(&file, pids[2]).unwrap();
        a.unpin(false).unwrap();
        b.unpin(false).unwrap();

        let d = bpm.fetch_page(&file, pids[3]).unwrap();
        assert_eq!(d.frame_id(), FrameId::new(0));
        assert!(!bpm.is_resident(&file, pids[0]));
        assert!(bpm.is_resident(&file, pids[1]));
        assert_eq!(bpm.pin_count(&file, pids[3]), Some(1));
        assert_eq!(bpm.stats().snapshot().evictions, 1);
    }

    #[test]
    fn test_all_pinned_buffer_exceeded() {
        let (_mem, file, bpm) = setup(2);
        let pids = preallocate(&file, 3);

        let _a = bpm.fetch_page(&file, pids[0]).unwrap();
        let _b = bpm.fetch_page(&file, pids[1]).unwrap();
        let before = bpm.frame_infos();

        let err = bpm.fetch_page(&file, pids[2]).unwrap_err();
        assert!(matches!(err, Error::BufferExceeded { pool_size: 2 }));
        assert_eq!(bpm.frame_infos(), before);
    }

    #[test]
    fn test_allocate_rolls_back_when_exceeded() {
        let (mem, file, bpm) = setup(1);

        let _held = bpm.allocate_page(&file).unwrap();
        assert_eq!(mem.page_count(), 1);

        let err = bpm.allocate_page(&file).unwrap_err();
        assert!(matches!(err, Error::BufferExceeded { .. }));
        assert_eq!(mem.page_count(), 1);
        assert_eq!(mem.io().deletions, 1);
    }

    #[test]
    fn test_dirty_victim_written_once() {
        let (mem, file, bpm) = setup(1);
        let pids = preallocate(&file, 2);

        {
            let mut page = bpm.fetch_page(&file, pids[0]).unwrap();
            page.write().as_mut_slice()[0] = 0x42;
        }
        assert_eq!(mem.writes_of(pids[0]), 0);

        drop(bpm.fetch_page(&file, pids[1]).unwrap());
        assert_eq!(mem.writes_of(pids[0]), 1);
        assert_eq!(mem.stored_bytes(pids[0]).unwrap()[0], 0x42);

        // Clean on reload: evicting again costs no write.
        drop(bpm.fetch_page(&file, pids[0]).unwrap());
        drop(bpm.fetch_page(&file, pids[1]).unwrap());
        assert_eq!(mem.writes_of(pids[0]), 1);
    }

    #[test]
    fn test_flush_file_all_or_nothing() {
        let (mem, file, bpm) = setup(4);
        let pids = preallocate(&file, 2);

        bpm.fetch_page(&file, pids[0]).unwrap().unpin(true).unwrap();
        let pinned = bpm.fetch_page(&file, pids[1]).unwrap();

        let err = bpm.flush_file(&file).unwrap_err();
        assert!(matches!(err, Error::PagePinned { page_id, .. } if page_id == pids[1]));
        assert_eq!(mem.io().writes, 0);
        assert_eq!(bpm.page_count(), 2);

        pinned.unpin(false).unwrap();
        bpm.flush_file(&file).unwrap();
        assert_eq!(mem.writes_of(pids[0]), 1);
        assert_eq!(mem.writes_of(pids[1]), 0);
        assert_eq!(bpm.page_count(), 0);
        assert_eq!(bpm.free_frame_count(), 4);
    }

    #[test]
    fn test_flush_file_leaves_other_files() {
        let (_mem, file, bpm) = setup(4);
        let other: Arc<dyn PageFile> = Arc::new(MemoryFile::new("other"));
        let pid = preallocate(&file, 1)[0];
        let other_pid = preallocate(&other, 1)[0];

        drop(bpm.fetch_page(&file, pid).unwrap());
        let _held = bpm.fetch_page(&other, other_pid).unwrap();

        bpm.flush_file(&file).unwrap();
        assert!(!bpm.is_resident(&file, pid));
        assert!(bpm.is_resident(&other, other_pid));
    }

    #[test]
    fn test_dispose_pinned_page() {
        let (mem, file, bpm) = setup(2);
        let page = bpm.allocate_page(&file).unwrap();
        let pid = page.page_id();

        bpm.dispose_page(&file, pid).unwrap();
        assert!(!bpm.is_resident(&file, pid));
        assert!(!mem.contains(pid));
        // Frame held back until the handle goes.
        assert_eq!(bpm.free_frame_count(), 1);

        page.unpin(true).unwrap();
        assert_eq!(bpm.free_frame_count(), 2);
        assert!(bpm.frame_infos().iter().all(|info| !info.valid && !info.dirty));
        assert_eq!(mem.io().writes, 0);
    }

    #[test]
    fn test_disposed_frame_not_reused_while_handle_lives() {
        let (_mem, file, bpm) = setup(1);
        let other = preallocate(&file, 1)[0];

        let mut stale = bpm.allocate_page(&file).unwrap();
        let frame = stale.frame_id();
        bpm.dispose_page(&file, stale.page_id()).unwrap();

        let err = bpm.fetch_page(&file, other).unwrap_err();
        assert!(matches!(err, Error::BufferExceeded { pool_size: 1 }));

        // Writes through the old handle stay in its own frame.
        stale.write().as_mut_slice()[0] = 0xEE;
        drop(stale);

        let page = bpm.fetch_page(&file, other).unwrap();
        assert_eq!(page.frame_id(), frame);
        assert_eq!(page.read().as_slice()[0], 0);
    }

    #[test]
    fn test_detached_pins_dropped_with_disposed_page() {
        let (_mem, file, bpm) = setup(1);
        let pids = preallocate(&file, 2);

        let (_, pid) = bpm.fetch_page(&file, pids[0]).unwrap().detach();
        bpm.dispose_page(&file, pid).unwrap();

        // Nothing can name the page anymore, so the frame is free.
        assert!(bpm.unpin_page(&file, pid, false).is_ok());
        assert_eq!(bpm.free_frame_count(), 1);
        assert!(bpm.fetch_page(&file, pids[1]).is_ok());
    }

    #[test]
    fn test_unpin_page_cannot_release_handle_pin() {
        let (_mem, file, bpm) = setup(1);
        let pids = preallocate(&file, 2);

        let page = bpm.fetch_page(&file, pids[0]).unwrap();
        let before = bpm.frame_infos();

        let err = bpm.unpin_page(&file, pids[0], true).unwrap_err();
        assert!(matches!(err, Error::HandlePinned { pin_count: 1, .. }));
        assert_eq!(bpm.frame_infos(), before);

        // The frame stays with the handle.
        assert!(bpm.fetch_page(&file, pids[1]).is_err());
        drop(page);
        assert!(bpm.fetch_page(&file, pids[1]).is_ok());
    }

    #[test]
    fn test_dispose_uncached_page_still_deletes() {
        let (mem, file, bpm) = setup(2);
        let pid = preallocate(&file, 1)[0];

        bpm.dispose_page(&file, pid).unwrap();
        assert!(!mem.contains(pid));
        assert!(bpm.dispose_page(&file, pid).is_err());
    }

    #[test]
    fn test_flush_all_pages_keeps_pages_resident() {
        let (mem, file, bpm) = setup(4);
        let pids = preallocate(&file, 2);

        bpm.fetch_page(&file, pids[0]).unwrap().unpin(true).unwrap();
        let mut pinned = bpm.fetch_page(&file, pids[1]).unwrap();
        pinned.mark_dirty();
        pinned.detach();
        bpm.unpin_page(&file, pids[1], false).unwrap();
        let _held = bpm.fetch_page(&file, pids[1]).unwrap();

        bpm.flush_all_pages().unwrap();
        assert_eq!(mem.writes_of(pids[0]), 1);
        // Pinned page is left for later.
        assert_eq!(mem.writes_of(pids[1]), 0);
        assert_eq!(bpm.page_count(), 2);
        assert!(!bpm.frame_infos()[0].dirty);
    }

    #[test]
    fn test_shutdown_writes_dirty_pages() {
        let (mem, file, bpm) = setup(4);
        let pid = preallocate(&file, 1)[0];

        bpm.fetch_page(&file, pid).unwrap().detach();
        bpm.unpin_page(&file, pid, true).unwrap();
        bpm.shutdown().unwrap();

        assert_eq!(mem.writes_of(pid), 1);
    }

    #[test]
    fn test_evicting_dirty_page_of_closed_file() {
        let (mem, file, bpm) = setup(1);
        let other: Arc<dyn PageFile> = Arc::new(MemoryFile::new("other"));
        let pid = preallocate(&file, 1)[0];
        let other_pid = preallocate(&other, 1)[0];

        bpm.fetch_page(&file, pid).unwrap().unpin(true).unwrap();
        drop(mem);
        drop(file);

        let err = bpm.fetch_page(&other, other_pid).unwrap_err();
        assert!(matches!(err, Error::FileClosed { page_id, .. } if page_id == pid));
        assert_eq!(bpm.page_count(), 1);
    }

    #[test]
    fn test_dirty_page_written_through_reopened_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.db");
        let first: Arc<dyn PageFile> = Arc::new(DiskFile::create(&path).unwrap());
        let bpm = BufferPoolManager::new(1);

        let pid = bpm.allocate_page(&first).unwrap().page_id();
        let second: Arc<dyn PageFile> = Arc::new(DiskFile::open(&path).unwrap());
        drop(first);

        {
            let mut page = bpm.fetch_page(&second, pid).unwrap();
            page.write().as_mut_slice()[0] = 0x7A;
        }

        // Evicting the dirty page writes it through the live instance.
        drop(bpm.allocate_page(&second).unwrap());
        assert_eq!(second.read_page(pid).unwrap().as_slice()[0], 0x7A);
        bpm.shutdown().unwrap();
    }

    #[test]
    fn test_dirty_unpin_adopts_reopened_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.db");
        let first: Arc<dyn PageFile> = Arc::new(DiskFile::create(&path).unwrap());
        let bpm = BufferPoolManager::new(2);

        let mut page = bpm.allocate_page(&first).unwrap();
        page.write().as_mut_slice()[0] = 0x5C;
        let (_, pid) = page.detach();

        let second: Arc<dyn PageFile> = Arc::new(DiskFile::open(&path).unwrap());
        drop(first);

        bpm.unpin_page(&second, pid, true).unwrap();
        bpm.shutdown().unwrap();
        assert_eq!(second.read_page(pid).unwrap().as_slice()[0], 0x5C);
    }

    /// A file whose writes to one page always fail.
    struct FailingWrites {
        inner: MemoryFile,
        fail_on: PageId,
    }

    impl PageFile for FailingWrites {
        fn identity(&self) -> FileId {
            self.inner.identity()
        }

        fn read_page(&self, page_id: PageId) -> Result<Page> {
            self.inner.read_page(page_id)
        }

        fn write_page(&self, page_id: PageId, page: &Page) -> Result<()> {
            if page_id == self.fail_on {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into());
            }
            self.inner.write_page(page_id, page)
        }

        fn allocate_page(&self) -> Result<(PageId, Page)> {
            self.inner.allocate_page()
        }

        fn delete_page(&self, page_id: PageId) -> Result<()> {
            self.inner.delete_page(page_id)
        }
    }

    #[test]
    fn test_flush_file_write_failure_keeps_pages_resident() {
        let file: Arc<dyn PageFile> = Arc::new(FailingWrites {
            inner: MemoryFile::new("failing"),
            fail_on: PageId::new(1),
        });
        let pids = preallocate(&file, 2);
        let bpm = BufferPoolManager::new(2);

        for &pid in &pids {
            let mut page = bpm.fetch_page(&file, pid).unwrap();
            page.write().as_mut_slice()[0] = 1;
        }

        let err = bpm.flush_file(&file).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(bpm.page_count(), 2);
        for info in bpm.frame_infos() {
            assert!(info.valid);
            assert_eq!(info.dirty, info.page_id == PageId::new(1));
        }
    }

    #[test]
    fn test_disk_file_round_trip_through_eviction() {
        let dir = tempdir().unwrap();
        let file: Arc<dyn PageFile> = Arc::new(DiskFile::create(dir.path().join("t.db")).unwrap());
        let bpm = BufferPoolManager::new(1);

        let mut page = bpm.allocate_page(&file).unwrap();
        page.write().as_mut_slice()[0] = 0x5A;
        let pid = page.page_id();
        drop(page);

        drop(bpm.allocate_page(&file).unwrap());
        let page = bpm.fetch_page(&file, pid).unwrap();
        assert_eq!(page.read().as_slice()[0], 0x5A);
    }

    #[test]
    fn test_concurrent_fetches() {
        use std::thread;

        let (_mem, file, bpm) = setup(4);
        let pids = preallocate(&file, 8);
        let bpm = Arc::new(bpm);

        let mut handles = vec![];
        for t in 0..4 {
            let bpm = Arc::clone(&bpm);
            let file = Arc::clone(&file);
            let pids = pids.clone();
            handles.push(thread::spawn(move || {
                for round in 0..50 {
                    let pid = pids[(t + round) % pids.len()];
                    // Four threads, one pin each, four frames: never exceeded.
                    let mut page = bpm.fetch_page(&file, pid).unwrap();
                    page.write().as_mut_slice()[0] = pid.0 as u8;
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(bpm.page_count() <= 4);
        assert!(bpm.frame_infos().iter().all(|info| info.pin_count == 0));
        for &pid in &pids {
            let page = bpm.fetch_page(&file, pid).unwrap();
            assert_eq!(page.read().as_slice()[0], pid.0 as u8);
        }
    }
}
