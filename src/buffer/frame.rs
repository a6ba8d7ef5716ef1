//! Frame descriptors - per-slot bookkeeping for the buffer pool.
//!
//! A [`FrameDescriptor`] records which page a frame holds and how it may be
//! used:
//! - Owning file (non-owning back-reference) and page id
//! - Valid / dirty flags
//! - Clock reference bit
//! - Pin count, and how many pins were detached from their handles
//!
//! Descriptors are plain data. The [`BufferPoolManager`](super::BufferPoolManager)
//! keeps all of them behind one lock, together with the page directory and
//! the clock hand, so a descriptor is only ever touched by one thread.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::common::{FileId, FrameId, PageId};
use crate::storage::PageFile;

/// Non-owning reference from a frame to the file its page belongs to.
///
/// The identity is kept alongside the `Weak` so the directory entry can
/// still be found after the file itself has been dropped.
#[derive(Clone)]
pub struct FrameOwner {
    id: FileId,
    file: Weak<dyn PageFile>,
}

impl FrameOwner {
    /// Build an owner reference without extending the file's lifetime.
    pub fn new(file: &Arc<dyn PageFile>) -> Self {
        Self {
            id: file.identity(),
            file: Arc::downgrade(file),
        }
    }

    /// Identity of the owning file.
    #[inline]
    pub fn id(&self) -> &FileId {
        &self.id
    }

    /// The owning file, if it is still alive.
    #[inline]
    pub fn upgrade(&self) -> Option<Arc<dyn PageFile>> {
        self.file.upgrade()
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.file.strong_count() > 0
    }
}

impl fmt::Debug for FrameOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameOwner")
            .field("id", &self.id)
            .field("alive", &(self.file.strong_count() > 0))
            .finish()
    }
}

/// Metadata for one buffer frame.
///
/// # State machine
/// ```text
/// Unused ──set()──▶ Pinned ──unpin to 0──▶ Evictable(ref) ──clock──▶ Evictable
///   ▲                  ▲ │                      │                       │
///   │                  └─┼──────pin()───────────┴───────────────────────┤
///   │                    └──retire()──▶ Retired ──last handle unpins──┐ │
///   └──────────────────────────────────────clear()────────────────────┴─┘
/// ```
///
/// A retired frame has lost its page but is still pinned by live handles.
/// It is not valid, yet the clock skips it until the last pin goes, so a
/// handle's bytes are never handed to another page.
///
/// `detached_pins` counts the pins whose handle was given up through
/// [`PinnedPage::detach`](super::PinnedPage::detach); only those can be
/// released by `(file, page)` key.
#[derive(Debug)]
pub struct FrameDescriptor {
    owner: Option<FrameOwner>,
    page_id: PageId,
    valid: bool,
    dirty: bool,
    ref_bit: bool,
    pin_count: u32,
    detached_pins: u32,
}

impl FrameDescriptor {
    /// Create an unused descriptor.
    pub fn new() -> Self {
        Self {
            owner: None,
            page_id: PageId::INVALID,
            valid: false,
            dirty: false,
            ref_bit: false,
            pin_count: 0,
            detached_pins: 0,
        }
    }

    /// Claim the frame for a freshly loaded page: valid, clean, referenced,
    /// pinned once.
    pub fn set(&mut self, owner: FrameOwner, page_id: PageId) {
        self.owner = Some(owner);
        self.page_id = page_id;
        self.valid = true;
        self.dirty = false;
        self.ref_bit = true;
        self.pin_count = 1;
        self.detached_pins = 0;
    }

    /// Return the frame to the unused state.
    pub fn clear(&mut self) {
        self.retire();
        self.pin_count = 0;
    }

    /// Drop the page but keep the pins held by live handles. Detached pins
    /// go with the page, since nothing can name it anymore.
    ///
    /// An unpinned frame ends up unused, as after [`clear`](Self::clear).
    pub fn retire(&mut self) {
        self.owner = None;
        self.page_id = PageId::INVALID;
        self.valid = false;
        self.dirty = false;
        self.ref_bit = false;
        self.pin_count -= self.detached_pins;
        self.detached_pins = 0;
    }

    #[inline]
    pub fn owner(&self) -> Option<&FrameOwner> {
        self.owner.as_ref()
    }

    /// Replace the owner reference.
    #[inline]
    pub fn set_owner(&mut self, owner: FrameOwner) {
        self.owner = Some(owner);
    }

    /// Point a valid frame at `file` if its current owner has been dropped.
    pub fn refresh_owner(&mut self, file: &Arc<dyn PageFile>) {
        if self.valid && !self.owner.as_ref().is_some_and(FrameOwner::is_alive) {
            self.owner = Some(FrameOwner::new(file));
        }
    }

    #[inline]
    pub fn file_id(&self) -> Option<&FileId> {
        self.owner.as_ref().map(FrameOwner::id)
    }

    /// Whether this frame is claimed by `file`.
    #[inline]
    pub fn belongs_to(&self, file: &FileId) -> bool {
        self.file_id() == Some(file)
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    // ========================================================================
    // Pin count
    // ========================================================================

    /// Increment the pin count. Returns the new pin count.
    #[inline]
    pub fn pin(&mut self) -> u32 {
        self.pin_count += 1;
        self.pin_count
    }

    /// Decrement the pin count. Returns the new pin count, or `None` if the
    /// frame was not pinned (the count is left at zero).
    #[inline]
    pub fn unpin(&mut self) -> Option<u32> {
        self.pin_count = self.pin_count.checked_sub(1)?;
        Some(self.pin_count)
    }

    /// Hand one handle pin over to key-based release.
    #[inline]
    pub fn detach_pin(&mut self) {
        debug_assert!(self.detached_pins < self.pin_count);
        self.detached_pins += 1;
    }

    /// Release one detached pin. Returns the new pin count, or `None` if no
    /// detached pin is outstanding (nothing changes).
    #[inline]
    pub fn release_detached(&mut self) -> Option<u32> {
        self.detached_pins = self.detached_pins.checked_sub(1)?;
        self.pin_count -= 1;
        Some(self.pin_count)
    }

    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count
    }

    #[inline]
    pub fn detached_pins(&self) -> u32 {
        self.detached_pins
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count > 0
    }

    // ========================================================================
    // Dirty flag
    // ========================================================================

    #[inline]
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    #[inline]
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    // ========================================================================
    // Clock reference bit
    // ========================================================================

    #[inline]
    pub fn set_ref_bit(&mut self) {
        self.ref_bit = true;
    }

    #[inline]
    pub fn clear_ref_bit(&mut self) {
        self.ref_bit = false;
    }

    #[inline]
    pub fn ref_bit(&self) -> bool {
        self.ref_bit
    }

    /// Point-in-time copy for diagnostics.
    pub fn info(&self, frame_id: FrameId) -> FrameInfo {
        FrameInfo {
            frame_id,
            file: self.file_id().cloned(),
            page_id: self.page_id,
            valid: self.valid,
            dirty: self.dirty,
            ref_bit: self.ref_bit,
            pin_count: self.pin_count,
        }
    }
}

impl Default for FrameDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of a frame descriptor, as returned by
/// [`BufferPoolManager::frame_infos`](super::BufferPoolManager::frame_infos).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    pub frame_id: FrameId,
    pub file: Option<FileId>,
    pub page_id: PageId,
    pub valid: bool,
    pub dirty: bool,
    pub ref_bit: bool,
    pub pin_count: u32,
}

impl fmt::Display for FrameInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{} {} {}", self.frame_id, file, self.page_id)?,
            None => write!(f, "{} unused", self.frame_id)?,
        }
        write!(
            f,
            " valid={} dirty={} ref={} pins={}",
            self.valid, self.dirty, self.ref_bit, self.pin_count
        )
    }
}
