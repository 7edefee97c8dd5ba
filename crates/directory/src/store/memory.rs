use std::collections::HashMap;

use parking_lot::RwLock;
use parley_primitives::DirectoryKey;

use super::{DirectoryStore, DirectoryStoreError};

/// In-memory directory. Entries live as long as the process.
#[derive(Debug, Default)]
pub struct MemoryDirectoryStore {
    entries: RwLock<HashMap<DirectoryKey, String>>,
}

impl MemoryDirectoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DirectoryStore for MemoryDirectoryStore {
    fn get(&self, key: &DirectoryKey) -> Result<Option<String>, DirectoryStoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(
        &self,
        key: DirectoryKey,
        value: String,
    ) -> Result<Option<String>, DirectoryStoreError> {
        Ok(self.entries.write().insert(key, value))
    }

    fn len(&self) -> Result<usize, DirectoryStoreError> {
        Ok(self.entries.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";

    #[test]
    fn test_last_write_wins() {
        let store = MemoryDirectoryStore::new();
        let key = DirectoryKey::parse(KEY).unwrap();
        assert!(store.is_empty().unwrap());

        assert_eq!(store.put(key.clone(), "old".into()).unwrap(), None);
        assert_eq!(
            store.put(key.clone(), "new".into()).unwrap(),
            Some("old".to_string())
        );
        assert_eq!(store.get(&key).unwrap(), Some("new".to_string()));
        assert_eq!(store.len().unwrap(), 1);
    }
}
