//! CLOCK (second-chance) replacement policy.

use crate::buffer::FrameDescriptor;
use crate::common::FrameId;

/// Clock sweep over the frame descriptors.
///
/// The hand starts on the last frame, so the first sweep inspects frame 0.
/// Each step advances the hand and looks at one frame:
///
/// | frame                    | action                                   |
/// |--------------------------|------------------------------------------|
/// | pinned                   | skip, count one consecutive pinned frame |
/// | not valid                | choose it                                |
/// | ref bit set              | clear the bit, reset the pinned count    |
/// | unpinned, ref bit clear  | choose it (the caller evicts it)         |
///
/// # Termination
/// The sweep gives up only after `pool_size` consecutive pinned frames,
/// i.e. after seeing every frame pinned. A ref-bit clear is progress, so it
/// never pushes the sweep towards giving up. Pinned frames keep their ref
/// bit, and with every frame pinned the hand ends where it started, so a
/// failed sweep leaves no trace.
///
/// A frame whose page was disposed under live handles is not valid but
/// still pinned; it is skipped like any pinned frame.
#[derive(Debug)]
pub struct ClockReplacer {
    hand: FrameId,
    pool_size: usize,
}

impl ClockReplacer {
    /// Create a clock over `pool_size` frames.
    ///
    /// # Panics
    /// Panics if `pool_size` is 0.
    pub fn new(pool_size: usize) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");
        Self {
            hand: FrameId::new(pool_size - 1),
            pool_size,
        }
    }

    /// The frame the hand last stopped on.
    #[inline]
    pub fn hand(&self) -> FrameId {
        self.hand
    }

    /// Pick a frame to host new content.
    ///
    /// The returned frame is either unused or an unpinned victim; a victim
    /// keeps its page, dirty flag and directory entry until the caller
    /// evicts it. Returns `None` when every frame is pinned.
    pub fn victim(&mut self, frames: &mut [FrameDescriptor]) -> Option<FrameId> {
        debug_assert_eq!(frames.len(), self.pool_size);

        let mut consecutive_pinned = 0;
        while consecutive_pinned < self.pool_size {
            self.hand = self.hand.next(self.pool_size);
            let frame = &mut frames[self.hand.0];

            if frame.is_pinned() {
                consecutive_pinned += 1;
                continue;
            }
            if !frame.is_valid() {
                return Some(self.hand);
            }
            consecutive_pinned = 0;
            if frame.ref_bit() {
                // Second chance.
                frame.clear_ref_bit();
                continue;
            }
            return Some(self.hand);
        }
        None
    }
}
