//! Token Storage
//!
//! Durable token record persistence with crash-consistent replacement.

use async_trait::async_trait;
use chrono::Utc;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{OAuth2Error, StorageError};
use crate::types::{TokenFile, TokenRecord};

/// Token store interface.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Load the persisted record.
    async fn load(&self) -> Result<TokenRecord, OAuth2Error>;

    /// Persist `record`, replacing the previous copy atomically.
    async fn save(&self, record: &TokenRecord) -> Result<(), OAuth2Error>;

    /// Human-readable location for diagnostics.
    fn location(&self) -> String;
}

/// JSON file token store.
///
/// Saves go through a temporary file in the same directory that is flushed
/// and renamed over the destination, so a crash mid-write leaves the old
/// file intact. The temporary file is created with owner-only permissions.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Create new file token store.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn malformed(&self, message: impl Into<String>) -> OAuth2Error {
        OAuth2Error::Storage(StorageError::Malformed {
            path: self.path.clone(),
            message: message.into(),
        })
    }

    fn write_failed(&self, message: impl Into<String>) -> OAuth2Error {
        OAuth2Error::Storage(StorageError::WriteFailed {
            path: self.path.clone(),
            message: message.into(),
        })
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<TokenRecord, OAuth2Error> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                OAuth2Error::Storage(StorageError::NotFound {
                    path: self.path.clone(),
                })
            } else {
                OAuth2Error::Storage(StorageError::ReadFailed {
                    path: self.path.clone(),
                    message: e.to_string(),
                })
            }
        })?;

        let file: TokenFile =
            serde_json::from_str(&contents).map_err(|e| self.malformed(e.to_string()))?;
        file.into_record().map_err(|message| self.malformed(message))
    }

    async fn save(&self, record: &TokenRecord) -> Result<(), OAuth2Error> {
        let file = TokenFile::from_record(record, Utc::now());
        let json =
            serde_json::to_vec_pretty(&file).map_err(|e| self.write_failed(e.to_string()))?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, &json))
            .await
            .map_err(|e| self.write_failed(e.to_string()))?
            .map_err(|e| self.write_failed(e.to_string()))
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

fn write_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(contents)?;
    temp.write_all(b"\n")?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Mock token store for testing.
#[derive(Default)]
pub struct MockTokenStore {
    record: Mutex<Option<TokenRecord>>,
    saved: Mutex<Vec<TokenRecord>>,
    load_count: Mutex<usize>,
    next_load_error: Mutex<Option<StorageError>>,
    next_save_error: Mutex<Option<StorageError>>,
}

impl MockTokenStore {
    /// Empty store; `load` reports not found.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `record`.
    pub fn with_record(record: TokenRecord) -> Self {
        let store = Self::new();
        *store.record.lock().unwrap() = Some(record);
        store
    }

    pub fn set_next_load_error(&self, error: StorageError) -> &Self {
        *self.next_load_error.lock().unwrap() = Some(error);
        self
    }

    pub fn set_next_save_error(&self, error: StorageError) -> &Self {
        *self.next_save_error.lock().unwrap() = Some(error);
        self
    }

    /// Records passed to successful saves, oldest first.
    pub fn get_saved(&self) -> Vec<TokenRecord> {
        self.saved.lock().unwrap().clone()
    }

    pub fn load_count(&self) -> usize {
        *self.load_count.lock().unwrap()
    }
}

#[async_trait]
impl TokenStore for MockTokenStore {
    async fn load(&self) -> Result<TokenRecord, OAuth2Error> {
        *self.load_count.lock().unwrap() += 1;
        if let Some(error) = self.next_load_error.lock().unwrap().take() {
            return Err(OAuth2Error::Storage(error));
        }
        self.record.lock().unwrap().clone().ok_or_else(|| {
            OAuth2Error::Storage(StorageError::NotFound {
                path: PathBuf::from("mock"),
            })
        })
    }

    async fn save(&self, record: &TokenRecord) -> Result<(), OAuth2Error> {
        if let Some(error) = self.next_save_error.lock().unwrap().take() {
            return Err(OAuth2Error::Storage(error));
        }
        *self.record.lock().unwrap() = Some(record.clone());
        self.saved.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "mock".to_string()
    }
}

/// Create file token store.
pub fn create_file_token_store(path: impl Into<PathBuf>) -> FileTokenStore {
    FileTokenStore::new(path)
}

/// Create mock token store for testing.
pub fn create_mock_token_store() -> MockTokenStore {
    MockTokenStore::new()
}
