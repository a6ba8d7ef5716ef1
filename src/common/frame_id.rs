//! Frame identifier type.

use std::fmt;

/// Index of a frame in the buffer pool's frame arena.
///
/// Frames live in fixed `Vec`s sized at construction, so a `FrameId` is
/// used directly as an index: `frames[frame_id.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub usize);

impl FrameId {
    /// Create a new FrameId.
    #[inline]
    pub fn new(id: usize) -> Self {
        FrameId(id)
    }

    /// The next frame on a clock of `pool_size` slots.
    #[inline]
    pub fn next(self, pool_size: usize) -> Self {
        FrameId((self.0 + 1) % pool_size)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({})", self.0)
    }
}
