//! clockpool - a buffer pool manager with CLOCK eviction.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │           Record / index managers (callers)                     │
//! └─────────────────────────────────────────────────────────────────┘
//!                               ↓ fetch / allocate / unpin
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Buffer Pool (buffer/)                           │
//! │   BufferPoolManager ── PageDirectory ── ClockReplacer           │
//! │          │                                                      │
//! │   FrameDescriptor[N] + Page[N]          PinnedPage handles      │
//! └─────────────────────────────────────────────────────────────────┘
//!                               ↓ read / write / allocate / delete
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Storage (storage/)                              │
//! │        PageFile trait: DiskFile | MemoryFile                    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, FrameId, FileId, Error, config)
//! - [`buffer`] - Buffer pool management and the clock replacer
//! - [`storage`] - Paged files and the page container
//!
//! # Quick Start
//! ```no_run
//! use std::sync::Arc;
//! use clockpool::{BufferPoolManager, DiskFile, PageFile};
//!
//! let file: Arc<dyn PageFile> = Arc::new(DiskFile::open_or_create("my_table.db").unwrap());
//! let bpm = BufferPoolManager::new(64);
//!
//! let mut page = bpm.allocate_page(&file).unwrap();
//! page.write().as_mut_slice()[0] = 0xFF;
//! drop(page);
//!
//! bpm.flush_file(&file).unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod storage;

pub use common::config::PAGE_SIZE;
pub use common::{Error, FileId, FrameId, PageId, Result};

pub use buffer::{BufferPoolManager, BufferPoolStats, FrameInfo, PinnedPage, StatsSnapshot};
pub use storage::page::Page;
pub use storage::{DiskFile, MemoryFile, PageFile};
