//! Disk-backed paged file.
//!
//! [`DiskFile`] implements [`PageFile`] over a single OS file:
//! - Reading and writing pages
//! - Allocating pages (reusing deleted ones first)
//! - Deleting pages

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;
use tracing::debug;

use crate::common::config::PAGE_SIZE;
use crate::common::{Error, FileId, PageId, Result};
use crate::storage::page::Page;
use crate::storage::PageFile;

/// A paged file on disk.
///
/// # File Layout
/// Pages are laid out sequentially:
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┬─────────┐
/// │ Page 0  │ Page 1  │ Page 2  │  ...    │ Page N  │
/// │ (4KB)   │ (4KB)   │ (4KB)   │         │ (4KB)   │
/// └─────────┴─────────┴─────────┴─────────┴─────────┘
/// Offset:  0      4096     8192    ...    N×4096
/// ```
///
/// # Deleted pages
/// Deleted page ids are kept in an in-memory free set and handed out again by
/// `allocate_page` (lowest first). The set is not persisted: reopening a file
/// treats every page below the file length as allocated.
///
/// # Durability
/// Every write and allocation is followed by `fsync()`.
pub struct DiskFile {
    id: FileId,
    inner: Mutex<DiskFileInner>,
}

struct DiskFileInner {
    file: File,
    /// Number of page slots in the file, including deleted ones.
    page_count: u32,
    free: BTreeSet<PageId>,
}

impl DiskFile {
    /// Create a new paged file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;

        Ok(Self::from_parts(FileId::canonical(&path)?, file, 0))
    }

    /// Open an existing paged file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let file_size = file.metadata()?.len();
        let page_count = (file_size / PAGE_SIZE as u64) as u32;

        Ok(Self::from_parts(FileId::canonical(&path)?, file, page_count))
    }

    /// Open an existing paged file, or create it if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    fn from_parts(id: FileId, file: File, page_count: u32) -> Self {
        Self {
            id,
            inner: Mutex::new(DiskFileInner {
                file,
                page_count,
                free: BTreeSet::new(),
            }),
        }
    }

    /// Number of live (allocated, not deleted) pages.
    pub fn page_count(&self) -> u32 {
        let inner = self.inner.lock();
        inner.page_count - inner.free.len() as u32
    }

    /// Size of the file in bytes.
    pub fn file_size(&self) -> u64 {
        self.inner.lock().page_count as u64 * PAGE_SIZE as u64
    }

    fn not_found(&self, page_id: PageId) -> Error {
        Error::PageNotFound {
            file: self.id.clone(),
            page_id,
        }
    }
}

impl DiskFileInner {
    fn is_live(&self, page_id: PageId) -> bool {
        page_id.0 < self.page_count && !self.free.contains(&page_id)
    }

    fn write_at(&mut self, page_id: PageId, bytes: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(page_id.offset(PAGE_SIZE)))?;
        self.file.write_all(bytes)?;
        self.file.sync_all()?;
        Ok(())
    }
}

impl PageFile for DiskFile {
    fn identity(&self) -> FileId {
        self.id.clone()
    }

    fn read_page(&self, page_id: PageId) -> Result<Page> {
        let mut inner = self.inner.lock();
        if !inner.is_live(page_id) {
            return Err(self.not_found(page_id));
        }

        inner.file.seek(SeekFrom::Start(page_id.offset(PAGE_SIZE)))?;
        let mut page = Page::new();
        inner.file.read_exact(page.as_mut_slice())?;

        Ok(page)
    }

    fn write_page(&self, page_id: PageId, page: &Page) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.is_live(page_id) {
            return Err(self.not_found(page_id));
        }
        inner.write_at(page_id, page.as_slice())
    }

    fn allocate_page(&self) -> Result<(PageId, Page)> {
        let mut inner = self.inner.lock();
        let page = Page::new();

        if let Some(page_id) = inner.free.pop_first() {
            // Deleted slot: zero it so stale bytes never resurface.
            if let Err(err) = inner.write_at(page_id, page.as_slice()) {
                inner.free.insert(page_id);
                return Err(err);
            }
            debug!(file = %self.id, page = page_id.0, "disk_file.allocate.reused");
            return Ok((page_id, page));
        }

        let page_id = PageId::new(inner.page_count);
        inner.write_at(page_id, page.as_slice())?;
        inner.page_count += 1;
        Ok((page_id, page))
    }

    fn delete_page(&self, page_id: PageId) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.is_live(page_id) {
            return Err(self.not_found(page_id));
        }
        inner.free.insert(page_id);
        Ok(())
    }
}
