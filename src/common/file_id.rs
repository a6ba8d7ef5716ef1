//! File identity type.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Stable identity of a paged file.
///
/// Half of every page directory key. Two collaborators that refer to the
/// same physical file must produce equal `FileId`s, so disk-backed files
/// build theirs from a canonical path.
///
/// Cloning is cheap (one reference count bump).
///
/// # Example
/// ```
/// use clockpool::FileId;
///
/// let a = FileId::new("orders.db");
/// let b = FileId::new("orders.db");
/// assert_eq!(a, b);
/// assert_ne!(a, FileId::new("users.db"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(Arc<Path>);

impl FileId {
    /// Create a FileId from a path or name, taken as-is.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileId(Arc::from(path.as_ref()))
    }

    /// Create a FileId from an existing file's canonical path.
    pub fn canonical<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path: PathBuf = path.as_ref().canonicalize()?;
        Ok(FileId(Arc::from(path.as_path())))
    }

    /// The path this identity was built from.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "File({})", self.0.display())
    }
}
