//! Thread-safe in-memory [`TokenCache`] implementation.

// self
use crate::{
	_prelude::*,
	cache::{CacheError, CacheFuture, CacheKey, CacheRecord, TokenCache},
};

type CacheMap = Arc<RwLock<HashMap<CacheKey, CacheRecord>>>;

/// Token cache that keeps records in-process for the lifetime of the value.
#[derive(Clone, Debug, Default)]
pub struct MemoryTokenCache(CacheMap);
impl MemoryTokenCache {
	/// Number of cached records.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing is cached.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn save_now(map: CacheMap, record: CacheRecord) -> Result<(), CacheError> {
		map.write().insert(record.key.clone(), record);

		Ok(())
	}
}
impl TokenCache for MemoryTokenCache {
	fn save(&self, record: CacheRecord) -> CacheFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move { Self::save_now(map, record) })
	}

	fn load<'a>(&'a self, key: &'a CacheKey) -> CacheFuture<'a, Option<CacheRecord>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(key).cloned()) })
	}

	fn remove<'a>(&'a self, key: &'a CacheKey) -> CacheFuture<'a, Option<CacheRecord>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.write().remove(key)) })
	}
}
