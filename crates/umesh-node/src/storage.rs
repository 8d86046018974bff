//! File-backed key-value storage for mesh state.
//!
//! Each key lives in its own file under the storage directory, holding the
//! value as a hex string. Writes are atomic (write to `.tmp`, then rename) so
//! a crash never leaves a torn value behind.

use std::path::{Path, PathBuf};

use umesh_mesh::{KvError, KvStore};

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid key '{0}'")]
    InvalidKey(String),

    #[error("corrupt value for '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    #[error("failed to determine storage directory: {0}")]
    Directory(String),
}

impl From<StorageError> for KvError {
    fn from(e: StorageError) -> Self {
        KvError::Backend(e.to_string())
    }
}

/// Persistent [`KvStore`] rooted at a directory.
#[derive(Debug)]
pub struct FileKv {
    base_dir: PathBuf,
}

impl FileKv {
    /// Open storage at `base_dir`, creating the directory if needed.
    ///
    /// # Note
    /// This performs blocking I/O. Call at startup, before the scheduler runs.
    pub fn new(base_dir: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    /// Open storage at the default path (`~/.umesh/kv`).
    pub fn default_path() -> Result<Self, StorageError> {
        let home = dirs::home_dir()
            .ok_or_else(|| StorageError::Directory("could not determine home directory".into()))?;
        Self::new(home.join(".umesh").join("kv"))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_owned()));
        }
        Ok(self.base_dir.join(key))
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(text) => hex::decode(text.trim())
                .map(Some)
                .map_err(|e| StorageError::Corrupt {
                    key: key.to_owned(),
                    reason: e.to_string(),
                }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, hex::encode(value))?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

impl KvStore for FileKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.read(key)?)
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), KvError> {
        self.write(key, value)?;
        tracing::trace!(key, len = value.len(), "storage: value written");
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), KvError> {
        Ok(self.delete(key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut kv = FileKv::new(dir.path().to_path_buf()).unwrap();

        assert_eq!(kv.get("main_version").unwrap(), None);
        kv.set("main_version", &[5]).unwrap();
        assert_eq!(kv.get("main_version").unwrap(), Some(vec![5]));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("main_version")).unwrap(),
            "05"
        );

        kv.remove("main_version").unwrap();
        assert_eq!(kv.get("main_version").unwrap(), None);
        // removing twice is fine
        kv.remove("main_version").unwrap();
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut kv = FileKv::new(dir.path().to_path_buf()).unwrap();
            kv.set("main_version", &[2]).unwrap();
        }
        let kv = FileKv::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(kv.get("main_version").unwrap(), Some(vec![2]));
    }

    #[test]
    fn no_tmp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let mut kv = FileKv::new(dir.path().to_path_buf()).unwrap();
        kv.set("a", &[1, 2, 3]).unwrap();
        assert!(!dir.path().join("a.tmp").exists());
    }

    #[test]
    fn creates_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("x").join("y");
        let kv = FileKv::new(nested.clone()).unwrap();
        assert_eq!(kv.base_dir(), nested.as_path());
        assert!(nested.is_dir());
    }

    #[test]
    fn rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut kv = FileKv::new(dir.path().to_path_buf()).unwrap();
        assert!(kv.set("../escape", &[1]).is_err());
        assert!(kv.get("").is_err());
        assert!(kv.remove("a/b").is_err());
    }

    #[test]
    fn corrupt_value_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main_version"), "zz").unwrap();
        let kv = FileKv::new(dir.path().to_path_buf()).unwrap();
        let err = kv.get("main_version").unwrap_err();
        assert!(matches!(err, KvError::Backend(_)));
    }
}
