//! Configuration constants for the buffer pool.

/// Size of a page in bytes (4KB).
///
/// Matches the OS page size on most systems, so a frame maps onto exactly
/// one page of memory and one aligned block on disk.
pub const PAGE_SIZE: usize = 4096;

/// Ratio of page directory slots to buffer frames.
///
/// Keeps the directory's load factor well below one even when every frame
/// is valid.
pub const DIRECTORY_LOAD_FACTOR: f64 = 1.2;

/// Number of slots to reserve in the page directory for a pool of
/// `pool_size` frames.
///
/// # Example
/// ```
/// use clockpool::common::config::directory_capacity;
///
/// assert_eq!(directory_capacity(10), 13);
/// ```
pub fn directory_capacity(pool_size: usize) -> usize {
    (pool_size as f64 * DIRECTORY_LOAD_FACTOR) as usize + 1
}
