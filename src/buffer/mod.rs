//! Buffer pool management.
//!
//! The buffer pool is the in-memory cache between upper storage layers
//! (record and index managers) and paged files. It manages a fixed pool of
//! frames, each holding one page.
//!
//! # Components
//! - [`BufferPoolManager`] - The page cache and its public API
//! - [`FrameDescriptor`] - Per-frame bookkeeping (pins, dirty, ref bit)
//! - [`PageDirectory`] - (file, page) → frame index
//! - [`replacer`] - CLOCK victim selection
//! - [`PinnedPage`] - Handle to a pinned page
//! - [`BufferPoolStats`] - Performance statistics

mod buffer_pool_manager;
mod frame;
mod page_directory;
mod page_guard;
pub mod replacer;
mod stats;

pub use buffer_pool_manager::BufferPoolManager;
pub use frame::{FrameDescriptor, FrameInfo, FrameOwner};
pub use page_directory::PageDirectory;
pub use page_guard::PinnedPage;
pub use stats::{BufferPoolStats, StatsSnapshot};
