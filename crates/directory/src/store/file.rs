//! JSON file-based directory store with atomic writes.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use parley_primitives::DirectoryKey;

use super::{DirectoryStore, DirectoryStoreError};

/// JSON file store. Loaded to memory on startup, rewritten after every put.
#[derive(Debug)]
pub struct FileDirectoryStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<DirectoryKey, String>>,
}

impl FileDirectoryStore {
    /// Load existing file or create empty store, making parent directories if needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DirectoryStoreError> {
        let path = path.into();
        let entries = if path.exists() {
            Self::load_from_file(&path)?
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            BTreeMap::new()
        };

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    fn load_from_file(
        path: &Path,
    ) -> Result<BTreeMap<DirectoryKey, String>, DirectoryStoreError> {
        let reader = BufReader::new(File::open(path)?);
        serde_json::from_reader(reader)
            .map_err(|e| DirectoryStoreError::Serialization(e.to_string()))
    }

    fn save_to_file(
        &self,
        entries: &BTreeMap<DirectoryKey, String>,
    ) -> Result<(), DirectoryStoreError> {
        // Write to temp file first, then rename (atomic)
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let writer = BufWriter::new(File::create(&tmp_path)?);
            serde_json::to_writer_pretty(writer, entries)
                .map_err(|e| DirectoryStoreError::Serialization(e.to_string()))?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DirectoryStore for FileDirectoryStore {
    fn get(&self, key: &DirectoryKey) -> Result<Option<String>, DirectoryStoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(
        &self,
        key: DirectoryKey,
        value: String,
    ) -> Result<Option<String>, DirectoryStoreError> {
        let mut entries = self.entries.write();
        let previous = entries.insert(key.clone(), value);
        if let Err(e) = self.save_to_file(&entries) {
            // Keep memory and disk in agreement.
            match previous.clone() {
                Some(old) => entries.insert(key, old),
                None => entries.remove(&key),
            };
            return Err(e);
        }
        Ok(previous)
    }

    fn len(&self) -> Result<usize, DirectoryStoreError> {
        Ok(self.entries.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const ALICE: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
    const BOB: &str = "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty";

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("directory.json");

        {
            let store = FileDirectoryStore::open(&path).unwrap();
            store
                .put(DirectoryKey::parse(ALICE).unwrap(), "/ip4/1.1.1.1/tcp/1".into())
                .unwrap();
            store
                .put(DirectoryKey::parse(BOB).unwrap(), "/ip4/2.2.2.2/tcp/2".into())
                .unwrap();
            store
                .put(DirectoryKey::parse(ALICE).unwrap(), "/ip4/3.3.3.3/tcp/3".into())
                .unwrap();
        }

        let reopened = FileDirectoryStore::open(&path).unwrap();
        assert_eq!(reopened.len().unwrap(), 2);
        assert_eq!(
            reopened.get(&DirectoryKey::parse(ALICE).unwrap()).unwrap(),
            Some("/ip4/3.3.3.3/tcp/3".to_string())
        );
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("directory.json");
        fs::write(&path, "{ nope").unwrap();
        assert_matches!(
            FileDirectoryStore::open(&path),
            Err(DirectoryStoreError::Serialization(_))
        );
    }

    #[test]
    fn test_invalid_key_in_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("directory.json");
        fs::write(&path, r#"{"not-an-ss58": "/ip4/1.1.1.1/tcp/1"}"#).unwrap();
        assert!(FileDirectoryStore::open(&path).is_err());
    }
}
