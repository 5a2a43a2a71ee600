//! Storage module for the Velox client.
//!
//! This module provides a small key-value abstraction used to remember
//! client-side metadata the chain cannot cheaply give back: auction
//! parameters, pending submission hashes and solver profiles. Backends
//! support per-key time-to-live and compare-and-set so that concurrent
//! writers (several processes sharing a file store) cannot silently
//! overwrite each other.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use velox_types::{now_secs, ConfigSchema, Field, FieldType, Schema, ValidationError};

pub mod implementations {
	pub mod file;
	pub mod memory;
}

pub mod stores;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Another writer kept changing the key while an update was attempted.
	#[error("Conflicting concurrent update of '{0}'")]
	Conflict(String),
	/// Error that occurs when the storage configuration is invalid.
	#[error("Invalid configuration: {0}")]
	Configuration(String),
}

/// Low-level interface implemented by storage backends.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key. Expired keys are not found.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes with optional time-to-live.
	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError>;

	/// Replaces the value only if the current value equals `expected`
	/// (`None` meaning absent). Returns whether the write happened.
	async fn compare_and_set(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Deletes the key only if its live value equals `expected`. Returns
	/// whether the delete happened.
	async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool, StorageError>;

	/// Checks if a live key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Lists live keys starting with `prefix`.
	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

	/// Removes expired entries, returning how many were dropped.
	async fn purge_expired(&self) -> Result<usize, StorageError>;
}

/// Stored form of every typed value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Versioned<T> {
	/// Incremented on every write through [`StorageService`].
	pub version: u64,
	/// Unix seconds of the last write.
	pub updated_at: u64,
	pub value: T,
}

/// Attempts made by [`StorageService::update`] before giving up.
const MAX_UPDATE_ATTEMPTS: usize = 5;

/// High-level storage service that provides typed, namespaced operations.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

fn make_key(namespace: &str, id: &str) -> String {
	format!("{}:{}", namespace, id)
}

fn encode<T: Serialize>(value: &Versioned<T>) -> Result<Vec<u8>, StorageError> {
	serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<Versioned<T>, StorageError> {
	serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	/// Stores a value with optional time-to-live, replacing any previous value.
	pub async fn store_with_ttl<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let key = make_key(namespace, id);
		let version = match self.backend.get_bytes(&key).await {
			Ok(bytes) => decode::<serde_json::Value>(&bytes)
				.map(|v| v.version + 1)
				.unwrap_or(1),
			Err(StorageError::NotFound) => 1,
			Err(e) => return Err(e),
		};
		let bytes = encode(&Versioned {
			version,
			updated_at: now_secs(),
			value: data,
		})?;
		self.backend.set_bytes(&key, bytes, ttl).await
	}

	/// Stores a value without time-to-live.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.store_with_ttl(namespace, id, data, None).await
	}

	/// Retrieves a value together with its version metadata.
	pub async fn retrieve_versioned<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Versioned<T>, StorageError> {
		let bytes = self.backend.get_bytes(&make_key(namespace, id)).await?;
		decode(&bytes)
	}

	/// Retrieves and deserializes a value.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		Ok(self.retrieve_versioned(namespace, id).await?.value)
	}

	/// Retrieves a value, mapping absence to `None`.
	pub async fn find<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Option<T>, StorageError> {
		match self.retrieve(namespace, id).await {
			Ok(value) => Ok(Some(value)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Read-modify-write of a single value.
	///
	/// `f` receives the current value (if any) and returns the new value,
	/// or `None` to leave storage untouched. The write only lands if nobody
	/// else wrote the key in between; otherwise `f` is re-run on the fresh
	/// value, up to a fixed number of attempts.
	pub async fn update<T, F>(
		&self,
		namespace: &str,
		id: &str,
		ttl: Option<Duration>,
		mut f: F,
	) -> Result<Option<T>, StorageError>
	where
		T: Serialize + DeserializeOwned,
		F: FnMut(Option<T>) -> Option<T> + Send,
	{
		let key = make_key(namespace, id);

		for attempt in 1..=MAX_UPDATE_ATTEMPTS {
			let current_bytes = match self.backend.get_bytes(&key).await {
				Ok(bytes) => Some(bytes),
				Err(StorageError::NotFound) => None,
				Err(e) => return Err(e),
			};
			let current = current_bytes
				.as_deref()
				.map(decode::<T>)
				.transpose()?;
			let next_version = current.as_ref().map(|v| v.version + 1).unwrap_or(1);

			let Some(value) = f(current.map(|v| v.value)) else {
				return Ok(None);
			};

			let bytes = encode(&Versioned {
				version: next_version,
				updated_at: now_secs(),
				value: &value,
			})?;

			if self
				.backend
				.compare_and_set(&key, current_bytes.as_deref(), bytes, ttl)
				.await?
			{
				return Ok(Some(value));
			}

			debug!("Concurrent write to {} detected (attempt {})", key, attempt);
		}

		Err(StorageError::Conflict(key))
	}

	/// Removes a value if `claim` accepts it, handing it to the caller.
	///
	/// Of several concurrent callers at most one gets `Some`: the delete
	/// only lands if the stored bytes are still the ones `claim` saw.
	pub async fn take_if<T, F>(
		&self,
		namespace: &str,
		id: &str,
		claim: F,
	) -> Result<Option<T>, StorageError>
	where
		T: DeserializeOwned,
		F: FnOnce(&T) -> bool,
	{
		let key = make_key(namespace, id);
		let bytes = match self.backend.get_bytes(&key).await {
			Ok(bytes) => bytes,
			Err(StorageError::NotFound) => return Ok(None),
			Err(e) => return Err(e),
		};
		let entry = decode::<T>(&bytes)?;
		if !claim(&entry.value) {
			return Ok(None);
		}

		if self.backend.compare_and_delete(&key, &bytes).await? {
			Ok(Some(entry.value))
		} else {
			debug!("{} changed before it could be taken", key);
			Ok(None)
		}
	}

	/// Removes a value from storage.
	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&make_key(namespace, id)).await
	}

	/// Lists the ids stored under a namespace.
	pub async fn list_ids(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
		let prefix = format!("{}:", namespace);
		let keys = self.backend.list_keys(&prefix).await?;
		Ok(keys
			.into_iter()
			.filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
			.collect())
	}

	/// Removes entries of `namespace` last written more than `max_age` ago.
	///
	/// Entries that cannot be decoded are removed as well.
	pub async fn remove_older_than(
		&self,
		namespace: &str,
		max_age: Duration,
	) -> Result<usize, StorageError> {
		let cutoff = now_secs().saturating_sub(max_age.as_secs());
		let mut removed = 0;

		for id in self.list_ids(namespace).await? {
			let stale = match self
				.retrieve_versioned::<serde_json::Value>(namespace, &id)
				.await
			{
				Ok(entry) => entry.updated_at < cutoff,
				Err(StorageError::NotFound) => continue,
				Err(StorageError::Serialization(_)) => true,
				Err(e) => return Err(e),
			};
			if stale {
				self.remove(namespace, &id).await?;
				removed += 1;
			}
		}

		Ok(removed)
	}

	/// Drops expired entries in the backend.
	pub async fn purge_expired(&self) -> Result<usize, StorageError> {
		self.backend.purge_expired().await
	}
}

/// Configuration schema shared by the storage backends.
pub struct StorageSchema;

impl ConfigSchema for StorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("backend", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some("file") | Some("memory") => Ok(()),
					other => Err(format!("Unknown storage backend: {:?}", other)),
				}
			})],
			vec![Field::new("storage_path", FieldType::String)],
		);
		schema.validate(config)
	}
}

/// Creates the storage backend selected by `config.backend`.
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	StorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	match config.get("backend").and_then(|v| v.as_str()) {
		Some("memory") => Ok(implementations::memory::create_storage(config)),
		Some("file") => Ok(implementations::file::create_storage(config)),
		other => Err(StorageError::Configuration(format!(
			"Unknown storage backend: {:?}",
			other
		))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::memory::MemoryStorage;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Arc;

	#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
	struct Counter {
		count: u32,
	}

	fn service() -> StorageService {
		StorageService::new(Box::new(MemoryStorage::new()))
	}

	/// Backend on which every compare-and-set loses to another writer.
	struct ContendedStorage {
		inner: MemoryStorage,
		attempts: Arc<AtomicUsize>,
	}

	#[async_trait]
	impl StorageInterface for ContendedStorage {
		async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
			self.inner.get_bytes(key).await
		}

		async fn set_bytes(
			&self,
			key: &str,
			value: Vec<u8>,
			ttl: Option<Duration>,
		) -> Result<(), StorageError> {
			self.inner.set_bytes(key, value, ttl).await
		}

		async fn compare_and_set(
			&self,
			_key: &str,
			_expected: Option<&[u8]>,
			_value: Vec<u8>,
			_ttl: Option<Duration>,
		) -> Result<bool, StorageError> {
			self.attempts.fetch_add(1, Ordering::SeqCst);
			Ok(false)
		}

		async fn delete(&self, key: &str) -> Result<(), StorageError> {
			self.inner.delete(key).await
		}

		async fn compare_and_delete(
			&self,
			key: &str,
			expected: &[u8],
		) -> Result<bool, StorageError> {
			self.inner.compare_and_delete(key, expected).await
		}

		async fn exists(&self, key: &str) -> Result<bool, StorageError> {
			self.inner.exists(key).await
		}

		async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
			self.inner.list_keys(prefix).await
		}

		async fn purge_expired(&self) -> Result<usize, StorageError> {
			self.inner.purge_expired().await
		}
	}

	#[tokio::test]
	async fn test_store_and_retrieve_bumps_version() {
		let storage = service();
		storage.store("ns", "a", &Counter { count: 1 }).await.unwrap();
		storage.store("ns", "a", &Counter { count: 2 }).await.unwrap();

		let entry = storage
			.retrieve_versioned::<Counter>("ns", "a")
			.await
			.unwrap();
		assert_eq!(entry.version, 2);
		assert_eq!(entry.value, Counter { count: 2 });
		assert!(storage.find::<Counter>("ns", "missing").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_update_read_modify_write() {
		let storage = service();
		for _ in 0..3 {
			storage
				.update::<Counter, _>("ns", "c", None, |current| {
					let count = current.map(|c| c.count).unwrap_or(0);
					Some(Counter { count: count + 1 })
				})
				.await
				.unwrap();
		}
		let value: Counter = storage.retrieve("ns", "c").await.unwrap();
		assert_eq!(value.count, 3);

		let untouched = storage
			.update::<Counter, _>("ns", "c", None, |_| None)
			.await
			.unwrap();
		assert!(untouched.is_none());
	}

	#[tokio::test]
	async fn test_concurrent_updates_do_not_lose_writes() {
		let storage = Arc::new(service());
		let mut handles = Vec::new();
		for _ in 0..4 {
			let storage = storage.clone();
			handles.push(tokio::spawn(async move {
				storage
					.update::<Counter, _>("ns", "shared", None, |current| {
						Some(Counter {
							count: current.map(|c| c.count).unwrap_or(0) + 1,
						})
					})
					.await
			}));
		}

		let mut succeeded = 0;
		for handle in handles {
			if handle.await.unwrap().is_ok() {
				succeeded += 1;
			}
		}
		let value: Counter = storage.retrieve("ns", "shared").await.unwrap();
		assert_eq!(value.count, succeeded);
	}

	#[tokio::test]
	async fn test_update_gives_up_under_constant_contention() {
		let attempts = Arc::new(AtomicUsize::new(0));
		let storage = StorageService::new(Box::new(ContendedStorage {
			inner: MemoryStorage::new(),
			attempts: attempts.clone(),
		}));
		storage.store("ns", "hot", &Counter { count: 1 }).await.unwrap();

		let mut calls = 0;
		let result = storage
			.update::<Counter, _>("ns", "hot", None, |current| {
				calls += 1;
				current.map(|c| Counter { count: c.count + 1 })
			})
			.await;

		assert!(matches!(result, Err(StorageError::Conflict(key)) if key == "ns:hot"));
		assert_eq!(calls, MAX_UPDATE_ATTEMPTS);
		assert_eq!(attempts.load(Ordering::SeqCst), MAX_UPDATE_ATTEMPTS);
		let value: Counter = storage.retrieve("ns", "hot").await.unwrap();
		assert_eq!(value.count, 1);
	}

	#[tokio::test]
	async fn test_take_if_hands_value_to_one_caller() {
		let storage = service();
		storage.store("ns", "t", &Counter { count: 7 }).await.unwrap();

		let refused = storage
			.take_if::<Counter, _>("ns", "t", |c| c.count > 10)
			.await
			.unwrap();
		assert!(refused.is_none());
		assert!(storage.find::<Counter>("ns", "t").await.unwrap().is_some());

		let (a, b) = tokio::join!(
			storage.take_if::<Counter, _>("ns", "t", |_| true),
			storage.take_if::<Counter, _>("ns", "t", |_| true),
		);
		let taken: Vec<Counter> = [a.unwrap(), b.unwrap()].into_iter().flatten().collect();
		assert_eq!(taken, vec![Counter { count: 7 }]);
		assert!(storage.find::<Counter>("ns", "t").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_list_and_remove_older_than() {
		let storage = service();
		storage.store("ns", "1", &Counter { count: 1 }).await.unwrap();
		storage.store("ns", "2", &Counter { count: 2 }).await.unwrap();
		storage.store("other", "3", &Counter { count: 3 }).await.unwrap();

		let mut ids = storage.list_ids("ns").await.unwrap();
		ids.sort();
		assert_eq!(ids, vec!["1", "2"]);

		// Nothing is older than an hour yet.
		assert_eq!(
			storage
				.remove_older_than("ns", Duration::from_secs(3600))
				.await
				.unwrap(),
			0
		);
	}

	#[test]
	fn test_create_storage_validates_backend() {
		let config: toml::Value = toml::from_str("backend = \"redis\"").unwrap();
		assert!(matches!(
			create_storage(&config),
			Err(StorageError::Configuration(_))
		));
		let config: toml::Value = toml::from_str("backend = \"fiel\"").unwrap();
		assert!(matches!(
			create_storage(&config),
			Err(StorageError::Configuration(_))
		));
		let config: toml::Value = toml::from_str("backend = \"memory\"").unwrap();
		assert!(create_storage(&config).is_ok());
		let config: toml::Value = toml::from_str("backend = \"file\"").unwrap();
		assert!(create_storage(&config).is_ok());
	}
}
