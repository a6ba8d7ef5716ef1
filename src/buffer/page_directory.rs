//! Page directory - maps (file, page) to the frame caching it.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::common::config::directory_capacity;
use crate::common::{Error, FileId, FrameId, PageId, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PageKey {
    file: FileId,
    page_id: PageId,
}

impl PageKey {
    fn new(file: &FileId, page_id: PageId) -> Self {
        Self {
            file: file.clone(),
            page_id,
        }
    }
}

/// Hash index from `(FileId, PageId)` to [`FrameId`].
///
/// Holds exactly one entry per valid frame. Misses are reported as
/// [`Error::NotFound`], which most callers treat as a normal outcome.
#[derive(Debug)]
pub struct PageDirectory {
    entries: HashMap<PageKey, FrameId>,
}

impl PageDirectory {
    /// Create a directory sized for a pool of `pool_size` frames.
    pub fn for_pool(pool_size: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(directory_capacity(pool_size)),
        }
    }

    /// Find the frame holding a page.
    ///
    /// # Errors
    /// `Error::NotFound` if the page is not cached.
    pub fn lookup(&self, file: &FileId, page_id: PageId) -> Result<FrameId> {
        self.entries
            .get(&PageKey::new(file, page_id))
            .copied()
            .ok_or_else(|| Error::NotFound {
                file: file.clone(),
                page_id,
            })
    }

    /// Map a page to a frame.
    ///
    /// # Errors
    /// `Error::DuplicateKey` if the page is already mapped; the existing
    /// mapping is left in place.
    pub fn insert(&mut self, file: &FileId, page_id: PageId, frame_id: FrameId) -> Result<()> {
        match self.entries.entry(PageKey::new(file, page_id)) {
            Entry::Occupied(existing) => Err(Error::DuplicateKey {
                file: file.clone(),
                page_id,
                frame_id: *existing.get(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(frame_id);
                Ok(())
            }
        }
    }

    /// Remove a page's mapping, returning the frame it pointed to.
    ///
    /// # Errors
    /// `Error::NotFound` if the page is not mapped.
    pub fn remove(&mut self, file: &FileId, page_id: PageId) -> Result<FrameId> {
        self.entries
            .remove(&PageKey::new(file, page_id))
            .ok_or_else(|| Error::NotFound {
                file: file.clone(),
                page_id,
            })
    }

    /// Number of mapped pages.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
