//! File-based storage backend.
//!
//! Each key is stored as one JSON file holding the original key, an
//! optional expiry and the hex-encoded value. Writes go to a temp file that
//! is renamed into place.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::warn;
use velox_types::now_secs;

#[derive(Debug, Serialize, Deserialize)]
struct FileRecord {
	key: String,
	expires_at: Option<u64>,
	data: String,
}

impl FileRecord {
	fn is_expired(&self, now: u64) -> bool {
		self.expires_at.is_some_and(|at| at <= now)
	}

	fn bytes(&self) -> Result<Vec<u8>, StorageError> {
		hex::decode(&self.data).map_err(|e| StorageError::Serialization(e.to_string()))
	}
}

/// File-based storage implementation.
pub struct FileStorage {
	/// Base directory path for storing files.
	base_path: PathBuf,
	/// Serializes compare-and-set within this process.
	write_lock: Mutex<()>,
}

fn backend_err(e: impl std::fmt::Display) -> StorageError {
	StorageError::Backend(e.to_string())
}

impl FileStorage {
	pub fn new(base_path: PathBuf) -> Self {
		Self {
			base_path,
			write_lock: Mutex::new(()),
		}
	}

	/// Converts a storage key to a filesystem-safe file path.
	fn get_file_path(&self, key: &str) -> PathBuf {
		let safe_key: String = key
			.chars()
			.map(|c| match c {
				'/' | '\\' | ':' | '.' => '_',
				c => c,
			})
			.collect();
		self.base_path.join(format!("{}.json", safe_key))
	}

	async fn read_record(&self, key: &str) -> Result<Option<FileRecord>, StorageError> {
		let path = self.get_file_path(key);
		let content = match fs::read(&path).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(backend_err(e)),
		};
		let record: FileRecord = serde_json::from_slice(&content)
			.map_err(|e| StorageError::Serialization(e.to_string()))?;
		if record.is_expired(now_secs()) {
			return Ok(None);
		}
		Ok(Some(record))
	}

	async fn write_record(
		&self,
		key: &str,
		value: &[u8],
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let path = self.get_file_path(key);
		fs::create_dir_all(&self.base_path)
			.await
			.map_err(backend_err)?;

		let record = FileRecord {
			key: key.to_string(),
			expires_at: ttl.map(|ttl| now_secs() + ttl.as_secs()),
			data: hex::encode(value),
		};
		let bytes =
			serde_json::to_vec(&record).map_err(|e| StorageError::Serialization(e.to_string()))?;

		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, bytes).await.map_err(backend_err)?;
		fs::rename(&temp_path, &path).await.map_err(backend_err)?;
		Ok(())
	}

	/// Reads every record file, skipping the ones that cannot be parsed.
	async fn all_records(&self) -> Result<Vec<(PathBuf, FileRecord)>, StorageError> {
		let mut dir = match fs::read_dir(&self.base_path).await {
			Ok(dir) => dir,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(backend_err(e)),
		};

		let mut records = Vec::new();
		while let Some(entry) = dir.next_entry().await.map_err(backend_err)? {
			let path = entry.path();
			if path.extension().and_then(|e| e.to_str()) != Some("json") {
				continue;
			}
			let content = match fs::read(&path).await {
				Ok(content) => content,
				Err(e) => {
					warn!("Skipping unreadable storage file {:?}: {}", path, e);
					continue;
				}
			};
			match serde_json::from_slice::<FileRecord>(&content) {
				Ok(record) => records.push((path, record)),
				Err(e) => warn!("Skipping corrupt storage file {:?}: {}", path, e),
			}
		}
		Ok(records)
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.read_record(key)
			.await?
			.ok_or(StorageError::NotFound)?
			.bytes()
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let _guard = self.write_lock.lock().await;
		self.write_record(key, &value, ttl).await
	}

	async fn compare_and_set(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError> {
		let _guard = self.write_lock.lock().await;

		let current = match self.read_record(key).await? {
			Some(record) => Some(record.bytes()?),
			None => None,
		};
		if current.as_deref() != expected {
			return Ok(false);
		}

		self.write_record(key, &value, ttl).await?;
		Ok(true)
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let path = self.get_file_path(key);

		match fs::remove_file(&path).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(backend_err(e)),
		}
	}

	async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool, StorageError> {
		let _guard = self.write_lock.lock().await;

		let matches = match self.read_record(key).await? {
			Some(record) => record.bytes()? == expected,
			None => false,
		};
		if !matches {
			return Ok(false);
		}

		self.delete(key).await?;
		Ok(true)
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(self.read_record(key).await?.is_some())
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let now = now_secs();
		Ok(self
			.all_records()
			.await?
			.into_iter()
			.filter(|(_, record)| record.key.starts_with(prefix) && !record.is_expired(now))
			.map(|(_, record)| record.key)
			.collect())
	}

	async fn purge_expired(&self) -> Result<usize, StorageError> {
		let _guard = self.write_lock.lock().await;
		let now = now_secs();
		let mut removed = 0;
		for (path, record) in self.all_records().await? {
			if record.is_expired(now) {
				fs::remove_file(&path).await.map_err(backend_err)?;
				removed += 1;
			}
		}
		Ok(removed)
	}
}

/// Factory function to create a file backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for file storage (default: "./data/storage")
pub fn create_storage(config: &toml::Value) -> Box<dyn StorageInterface> {
	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage")
		.to_string();

	Box::new(FileStorage::new(PathBuf::from(storage_path)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[tokio::test]
	async fn test_file_storage_persists_across_instances() {
		let temp_dir = TempDir::new().unwrap();
		let storage = FileStorage::new(temp_dir.path().to_path_buf());

		storage
			.set_bytes("velox_auction_intents:42", b"hello".to_vec(), None)
			.await
			.unwrap();
		assert!(storage.exists("velox_auction_intents:42").await.unwrap());

		let reopened = FileStorage::new(temp_dir.path().to_path_buf());
		assert_eq!(
			reopened.get_bytes("velox_auction_intents:42").await.unwrap(),
			b"hello".to_vec()
		);
		assert_eq!(
			reopened.list_keys("velox_auction_intents:").await.unwrap(),
			vec!["velox_auction_intents:42".to_string()]
		);

		reopened.delete("velox_auction_intents:42").await.unwrap();
		assert!(matches!(
			reopened.get_bytes("velox_auction_intents:42").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_file_storage_ttl_and_purge() {
		let temp_dir = TempDir::new().unwrap();
		let storage = FileStorage::new(temp_dir.path().to_path_buf());

		storage
			.set_bytes("a", b"1".to_vec(), Some(Duration::ZERO))
			.await
			.unwrap();
		storage.set_bytes("b", b"2".to_vec(), None).await.unwrap();

		assert!(!storage.exists("a").await.unwrap());
		assert_eq!(storage.purge_expired().await.unwrap(), 1);
		assert_eq!(storage.list_keys("").await.unwrap(), vec!["b".to_string()]);
	}

	#[tokio::test]
	async fn test_file_compare_and_set() {
		let temp_dir = TempDir::new().unwrap();
		let storage = FileStorage::new(temp_dir.path().to_path_buf());

		assert!(storage
			.compare_and_set("k", None, b"v1".to_vec(), None)
			.await
			.unwrap());
		assert!(!storage
			.compare_and_set("k", None, b"v2".to_vec(), None)
			.await
			.unwrap());
		assert!(storage
			.compare_and_set("k", Some(b"v1".as_slice()), b"v2".to_vec(), None)
			.await
			.unwrap());
		assert_eq!(storage.get_bytes("k").await.unwrap(), b"v2".to_vec());

		assert!(!storage.compare_and_delete("k", b"v1").await.unwrap());
		assert!(storage.compare_and_delete("k", b"v2").await.unwrap());
		assert!(!storage.exists("k").await.unwrap());
	}
}
