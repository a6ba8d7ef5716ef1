//! The paged-file contract the buffer pool delegates I/O to.

use crate::common::{FileId, PageId, Result};
use crate::storage::page::Page;

/// A file of fixed-size pages.
///
/// The buffer pool never owns a `PageFile`: callers keep it alive in an
/// `Arc` and frames hold a `Weak` back-reference for write-back. Methods take
/// `&self`, so implementations synchronize internally.
///
/// # Contract
/// - `read_page` fails with [`Error::PageNotFound`](crate::Error::PageNotFound)
///   if the page was never allocated or has been deleted.
/// - `allocate_page` assigns a fresh identifier and returns the page's
///   initial contents.
/// - `delete_page` must tolerate pages the buffer pool never cached.
/// - `identity` is stable for the life of the file, and equal for two
///   collaborators over the same physical file.
pub trait PageFile: Send + Sync {
    /// Identity used as part of page directory keys.
    fn identity(&self) -> FileId;

    /// Read a page.
    fn read_page(&self, page_id: PageId) -> Result<Page>;

    /// Write a page durably.
    fn write_page(&self, page_id: PageId, page: &Page) -> Result<()>;

    /// Allocate a new page, returning its identifier and initial contents.
    fn allocate_page(&self) -> Result<(PageId, Page)>;

    /// Delete a page.
    fn delete_page(&self, page_id: PageId) -> Result<()>;
}
