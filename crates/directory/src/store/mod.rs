//! Directory persistence trait and implementations (memory, file).

mod file;
mod memory;

use auto_impl::auto_impl;
use parley_primitives::DirectoryKey;
use thiserror::Error;

pub use file::FileDirectoryStore;
pub use memory::MemoryDirectoryStore;

#[derive(Debug, Error)]
pub enum DirectoryStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Directory storage with auto-impl for &, Box, Arc.
///
/// Each call is atomic with respect to other calls on the same store.
#[auto_impl(&, Box, Arc)]
pub trait DirectoryStore: Send + Sync {
    fn get(&self, key: &DirectoryKey) -> Result<Option<String>, DirectoryStoreError>;

    /// Insert or overwrite, returning the previous value.
    fn put(&self, key: DirectoryKey, value: String) -> Result<Option<String>, DirectoryStoreError>;

    fn len(&self) -> Result<usize, DirectoryStoreError>;

    fn is_empty(&self) -> Result<bool, DirectoryStoreError> {
        Ok(self.len()? == 0)
    }
}
