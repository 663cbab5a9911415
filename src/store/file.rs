use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use uuid::Uuid;

use super::{validate_key, StoreBackend, StoreError};

const RECORD_EXTENSION: &str = "json";

/// One JSON document per key inside a data directory.
///
/// Writes go to a temporary file first and are then renamed into place, so a
/// reader never observes a half-written record. Create-if-absent uses a hard
/// link, which fails atomically when the target already exists.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        tracing::info!(path = %root.display(), "file store opened");
        Ok(Self { root })
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.{RECORD_EXTENSION}"))
    }

    async fn write_temp(&self, key: &str, value: &str) -> Result<PathBuf, StoreError> {
        let tmp = self.root.join(format!(".{key}.{}.tmp", Uuid::new_v4().simple()));
        fs::write(&tmp, value.as_bytes()).await?;
        Ok(tmp)
    }
}

#[async_trait::async_trait]
impl StoreBackend for FileBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        validate_key(key)?;
        match fs::read_to_string(self.record_path(key)).await {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        let tmp = self.write_temp(key, value).await?;
        if let Err(err) = fs::rename(&tmp, self.record_path(key)).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        Ok(())
    }

    async fn insert_if_absent(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        validate_key(key)?;
        let tmp = self.write_temp(key, value).await?;
        let linked = fs::hard_link(&tmp, self.record_path(key)).await;
        let _ = fs::remove_file(&tmp).await;
        match linked {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if stem.starts_with(prefix) {
                    keys.push(stem.to_string());
                }
            }
        }
        Ok(keys)
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let backend = FileBackend::open(dir.path()).await.unwrap();
            backend.set("order-OYI1", r#"{"a":1}"#).await.unwrap();
            backend.set("order-OYI1", r#"{"a":2}"#).await.unwrap();
        }
        let backend = FileBackend::open(dir.path()).await.unwrap();
        assert_eq!(
            backend.get("order-OYI1").await.unwrap().as_deref(),
            Some(r#"{"a":2}"#)
        );
        assert_eq!(backend.get("order-nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn insert_if_absent_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();
        assert!(backend.insert_if_absent("review-OYI1", "first").await.unwrap());
        assert!(!backend.insert_if_absent("review-OYI1", "second").await.unwrap());
        assert_eq!(
            backend.get("review-OYI1").await.unwrap().as_deref(),
            Some("first")
        );
    }

    #[tokio::test]
    async fn list_ignores_temp_files_and_other_prefixes() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();
        backend.set("review-A", "{}").await.unwrap();
        backend.set("order-A", "{}").await.unwrap();
        std::fs::write(dir.path().join(".review-B.123.tmp"), "{}").unwrap();

        assert_eq!(backend.list("review-").await.unwrap(), vec!["review-A"]);
    }

    #[tokio::test]
    async fn rejects_keys_that_escape_the_directory() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();
        assert!(matches!(
            backend.get("../secret").await,
            Err(StoreError::InvalidKey(_))
        ));
    }
}
