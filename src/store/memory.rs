//! Thread-safe in-memory [`KeyValueStore`] for tests, demos, and ephemeral sessions.

// self
use crate::{
	_prelude::*,
	store::{KeyValueStore, StoreBatch, StoreError},
};

/// Process-local storage; clones share the same map.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<HashMap<String, String>>>);
impl MemoryStore {
	/// Number of stored keys.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl KeyValueStore for MemoryStore {
	fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		Ok(self.0.read().get(key).cloned())
	}

	fn set(&self, entries: StoreBatch) -> Result<(), StoreError> {
		self.0.write().extend(entries);

		Ok(())
	}

	fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
		let mut guard = self.0.write();

		for key in keys {
			guard.remove(*key);
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn remove_ignores_missing_keys() {
		let store = MemoryStore::default();

		store
			.set(vec![("a".into(), "1".into()), ("b".into(), "2".into())])
			.expect("Batch write should succeed.");
		store.remove(&["a", "missing"]).expect("Removing absent keys should succeed.");

		assert_eq!(store.len(), 1);
		assert_eq!(store.get("b").expect("Read should succeed."), Some("2".into()));
	}
}
