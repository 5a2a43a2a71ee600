//! Display metadata solvers attach when registering.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use velox_types::{now_secs, Address};

use crate::{StorageError, StorageService};

pub const SOLVER_METADATA_NAMESPACE: &str = "velox_solver_metadata";
pub const SOLVER_METADATA_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverMetadata {
	pub address: Address,
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub website: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub logo_url: Option<String>,
	pub updated_at: u64,
}

impl SolverMetadata {
	pub fn new(address: Address, name: impl Into<String>) -> Self {
		Self {
			address,
			name: name.into(),
			description: None,
			website: None,
			logo_url: None,
			updated_at: now_secs(),
		}
	}
}

pub struct SolverMetadataStore {
	storage: Arc<StorageService>,
}

impl SolverMetadataStore {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	pub async fn save(&self, metadata: SolverMetadata) -> Result<(), StorageError> {
		let key = metadata.address.to_hex_literal();
		self.storage
			.update::<SolverMetadata, _>(
				SOLVER_METADATA_NAMESPACE,
				&key,
				Some(SOLVER_METADATA_MAX_AGE),
				move |_| {
					Some(SolverMetadata {
						updated_at: now_secs(),
						..metadata.clone()
					})
				},
			)
			.await?;
		Ok(())
	}

	pub async fn get(&self, address: &Address) -> Result<Option<SolverMetadata>, StorageError> {
		self.storage
			.find(SOLVER_METADATA_NAMESPACE, &address.to_hex_literal())
			.await
	}

	pub async fn remove(&self, address: &Address) -> Result<(), StorageError> {
		self.storage
			.remove(SOLVER_METADATA_NAMESPACE, &address.to_hex_literal())
			.await
	}

	pub async fn cleanup(&self) -> Result<usize, StorageError> {
		self.storage
			.remove_older_than(SOLVER_METADATA_NAMESPACE, SOLVER_METADATA_MAX_AGE)
			.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::memory::MemoryStorage;

	#[tokio::test]
	async fn test_save_get_remove() {
		let store = SolverMetadataStore::new(Arc::new(StorageService::new(Box::new(
			MemoryStorage::new(),
		))));
		let address = Address::from_u8(0x5);

		let mut metadata = SolverMetadata::new(address, "Fast Solver");
		metadata.website = Some("https://solver.example".to_string());
		store.save(metadata).await.unwrap();

		let loaded = store.get(&address).await.unwrap().unwrap();
		assert_eq!(loaded.name, "Fast Solver");
		assert_eq!(loaded.website.as_deref(), Some("https://solver.example"));

		store.remove(&address).await.unwrap();
		assert!(store.get(&address).await.unwrap().is_none());
	}
}
