//! Eviction policy.
//!
//! - [`ClockReplacer`] - CLOCK (second chance) over the frame descriptors

mod clock;

pub use clock::ClockReplacer;
