//! In-memory paged file.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use parking_lot::Mutex;

use crate::common::{Error, FileId, PageId, Result};
use crate::storage::page::Page;
use crate::storage::PageFile;

/// Counters of the I/O a [`MemoryFile`] has served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileIoSnapshot {
    pub reads: u64,
    pub writes: u64,
    pub allocations: u64,
    pub deletions: u64,
}

/// A [`PageFile`] held entirely in memory.
///
/// Same contract as [`DiskFile`](crate::storage::DiskFile), no durability.
/// Every call is counted, so upper layers (and tests) can check exactly
/// which pages the buffer pool wrote back.
///
/// # Example
/// ```
/// use clockpool::storage::{MemoryFile, PageFile};
///
/// let file = MemoryFile::new("scratch");
/// let (page_id, _) = file.allocate_page().unwrap();
/// assert!(file.contains(page_id));
/// assert_eq!(file.io().allocations, 1);
/// ```
pub struct MemoryFile {
    id: FileId,
    inner: Mutex<MemoryFileInner>,
}

#[derive(Default)]
struct MemoryFileInner {
    pages: BTreeMap<PageId, Box<Page>>,
    next_page_id: u32,
    free: BTreeSet<PageId>,
    io: FileIoSnapshot,
    writes_per_page: HashMap<PageId, u64>,
}

impl MemoryFile {
    /// Create an empty file with the given identity.
    pub fn new<P: AsRef<std::path::Path>>(name: P) -> Self {
        Self {
            id: FileId::new(name),
            inner: Mutex::new(MemoryFileInner::default()),
        }
    }

    /// Whether a page is currently allocated.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.inner.lock().pages.contains_key(&page_id)
    }

    /// Number of allocated pages.
    pub fn page_count(&self) -> usize {
        self.inner.lock().pages.len()
    }

    /// I/O served so far.
    pub fn io(&self) -> FileIoSnapshot {
        self.inner.lock().io
    }

    /// Number of `write_page` calls for one page.
    pub fn writes_of(&self, page_id: PageId) -> u64 {
        self.inner
            .lock()
            .writes_per_page
            .get(&page_id)
            .copied()
            .unwrap_or(0)
    }

    /// Copy of a page's stored bytes, bypassing the I/O counters.
    pub fn stored_bytes(&self, page_id: PageId) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .pages
            .get(&page_id)
            .map(|page| page.as_slice().to_vec())
    }

    fn not_found(&self, page_id: PageId) -> Error {
        Error::PageNotFound {
            file: self.id.clone(),
            page_id,
        }
    }
}

impl PageFile for MemoryFile {
    fn identity(&self) -> FileId {
        self.id.clone()
    }

    fn read_page(&self, page_id: PageId) -> Result<Page> {
        let mut inner = self.inner.lock();
        let stored = inner
            .pages
            .get(&page_id)
            .ok_or_else(|| self.not_found(page_id))?;

        let mut page = Page::new();
        page.copy_from(stored);
        inner.io.reads += 1;
        Ok(page)
    }

    fn write_page(&self, page_id: PageId, page: &Page) -> Result<()> {
        let mut inner = self.inner.lock();
        let stored = inner
            .pages
            .get_mut(&page_id)
            .ok_or_else(|| self.not_found(page_id))?;

        stored.copy_from(page);
        inner.io.writes += 1;
        *inner.writes_per_page.entry(page_id).or_insert(0) += 1;
        Ok(())
    }

    fn allocate_page(&self) -> Result<(PageId, Page)> {
        let mut inner = self.inner.lock();
        let page_id = match inner.free.pop_first() {
            Some(page_id) => page_id,
            None => {
                let page_id = PageId::new(inner.next_page_id);
                inner.next_page_id += 1;
                page_id
            }
        };

        inner.pages.insert(page_id, Box::default());
        inner.io.allocations += 1;
        Ok((page_id, Page::new()))
    }

    fn delete_page(&self, page_id: PageId) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.pages.remove(&page_id).is_none() {
            return Err(self.not_found(page_id));
        }

        inner.free.insert(page_id);
        inner.io.deletions += 1;
        Ok(())
    }
}
