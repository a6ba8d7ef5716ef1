//! Storage layer - paged files and the page container.
//!
//! - [`PageFile`] - The file contract the buffer pool delegates I/O to
//! - [`DiskFile`] - Paged file on disk
//! - [`MemoryFile`] - Paged file in memory, with I/O counters
//! - [`page`] - The raw page type

mod disk_file;
mod memory_file;
pub mod page;
mod page_file;

pub use disk_file::DiskFile;
pub use memory_file::{FileIoSnapshot, MemoryFile};
pub use page_file::PageFile;
