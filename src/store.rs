//! Key-value storage capability backing the credential store.
//!
//! Backends only need three operations. Writes arrive as a batch that must land atomically
//! so the credential pair is never observed half-written.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::_prelude::*;

/// Entries written together by [`KeyValueStore::set`].
pub type StoreBatch = Vec<(String, String)>;

/// Durable string key-value storage.
pub trait KeyValueStore
where
	Self: Send + Sync,
{
	/// Reads the value stored under `key`.
	fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

	/// Writes every entry in `entries` as one atomic unit.
	fn set(&self, entries: StoreBatch) -> Result<(), StoreError>;

	/// Removes `keys`. Missing keys are not an error.
	fn remove(&self, keys: &[&str]) -> Result<(), StoreError>;
}
impl<S> KeyValueStore for Arc<S>
where
	S: ?Sized + KeyValueStore,
{
	fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		(**self).get(key)
	}

	fn set(&self, entries: StoreBatch) -> Result<(), StoreError> {
		(**self).set(entries)
	}

	fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
		(**self).remove(keys)
	}
}

/// Error type produced by [`KeyValueStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Snapshot could not be encoded or decoded.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
