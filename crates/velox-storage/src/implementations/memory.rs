//! In-memory storage backend, used for tests and short-lived sessions.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use velox_types::now_secs;

#[derive(Debug, Clone)]
struct MemoryEntry {
	data: Vec<u8>,
	expires_at: Option<u64>,
}

impl MemoryEntry {
	fn new(data: Vec<u8>, ttl: Option<Duration>) -> Self {
		Self {
			data,
			expires_at: ttl.map(|ttl| now_secs() + ttl.as_secs()),
		}
	}

	fn is_expired(&self, now: u64) -> bool {
		self.expires_at.is_some_and(|at| at <= now)
	}
}

/// Process-local storage backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryStorage {
	entries: DashMap<String, MemoryEntry>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let now = now_secs();
		match self.entries.get(key) {
			Some(entry) if !entry.is_expired(now) => Ok(entry.data.clone()),
			_ => Err(StorageError::NotFound),
		}
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		self.entries
			.insert(key.to_string(), MemoryEntry::new(value, ttl));
		Ok(())
	}

	async fn compare_and_set(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError> {
		let now = now_secs();
		match self.entries.entry(key.to_string()) {
			Entry::Occupied(mut occupied) => {
				let current = occupied.get();
				let current = (!current.is_expired(now)).then_some(current.data.as_slice());
				if current != expected {
					return Ok(false);
				}
				occupied.insert(MemoryEntry::new(value, ttl));
				Ok(true)
			}
			Entry::Vacant(vacant) => {
				if expected.is_some() {
					return Ok(false);
				}
				vacant.insert(MemoryEntry::new(value, ttl));
				Ok(true)
			}
		}
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.entries.remove(key);
		Ok(())
	}

	async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool, StorageError> {
		let now = now_secs();
		Ok(self
			.entries
			.remove_if(key, |_, entry| !entry.is_expired(now) && entry.data == expected)
			.is_some())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let now = now_secs();
		Ok(self
			.entries
			.get(key)
			.is_some_and(|entry| !entry.is_expired(now)))
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let now = now_secs();
		Ok(self
			.entries
			.iter()
			.filter(|entry| entry.key().starts_with(prefix) && !entry.value().is_expired(now))
			.map(|entry| entry.key().clone())
			.collect())
	}

	async fn purge_expired(&self) -> Result<usize, StorageError> {
		let now = now_secs();
		let mut removed = 0;
		self.entries.retain(|_, entry| {
			let expired = entry.is_expired(now);
			if expired {
				removed += 1;
			}
			!expired
		});
		Ok(removed)
	}
}

/// Factory function for the memory backend.
pub fn create_storage(_config: &toml::Value) -> Box<dyn StorageInterface> {
	Box::new(MemoryStorage::new())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_compare_and_set() {
		let storage = MemoryStorage::new();

		assert!(storage
			.compare_and_set("k", None, b"one".to_vec(), None)
			.await
			.unwrap());
		// Key now exists, so an insert-if-absent must fail.
		assert!(!storage
			.compare_and_set("k", None, b"two".to_vec(), None)
			.await
			.unwrap());
		assert!(!storage
			.compare_and_set("k", Some(b"stale".as_slice()), b"two".to_vec(), None)
			.await
			.unwrap());
		assert!(storage
			.compare_and_set("k", Some(b"one".as_slice()), b"two".to_vec(), None)
			.await
			.unwrap());
		assert_eq!(storage.get_bytes("k").await.unwrap(), b"two".to_vec());
	}

	#[tokio::test]
	async fn test_expired_entries_are_invisible() {
		let storage = MemoryStorage::new();
		storage
			.set_bytes("gone", b"x".to_vec(), Some(Duration::ZERO))
			.await
			.unwrap();
		storage.set_bytes("kept", b"y".to_vec(), None).await.unwrap();

		assert!(matches!(
			storage.get_bytes("gone").await,
			Err(StorageError::NotFound)
		));
		assert!(!storage.exists("gone").await.unwrap());
		assert_eq!(storage.list_keys("").await.unwrap(), vec!["kept".to_string()]);
		assert_eq!(storage.purge_expired().await.unwrap(), 1);
	}

	#[tokio::test]
	async fn test_compare_and_delete() {
		let storage = MemoryStorage::new();
		storage.set_bytes("k", b"one".to_vec(), None).await.unwrap();

		assert!(!storage.compare_and_delete("k", b"two").await.unwrap());
		assert!(storage.exists("k").await.unwrap());
		assert!(storage.compare_and_delete("k", b"one").await.unwrap());
		assert!(!storage.compare_and_delete("k", b"one").await.unwrap());
		assert!(!storage.exists("k").await.unwrap());
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_purge_counts_only_expired_while_inserting() {
		let storage = std::sync::Arc::new(MemoryStorage::new());
		for i in 0..50 {
			storage
				.set_bytes(&format!("old:{}", i), b"x".to_vec(), Some(Duration::ZERO))
				.await
				.unwrap();
		}

		let writer = {
			let storage = storage.clone();
			tokio::spawn(async move {
				for i in 0..500 {
					storage
						.set_bytes(&format!("new:{}", i), b"y".to_vec(), None)
						.await
						.unwrap();
					tokio::task::yield_now().await;
				}
			})
		};

		let removed = storage.purge_expired().await.unwrap();
		writer.await.unwrap();

		assert_eq!(removed, 50);
		assert_eq!(storage.list_keys("new:").await.unwrap().len(), 500);
		assert!(storage.list_keys("old:").await.unwrap().is_empty());
	}
}
