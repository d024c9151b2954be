//! Process-level cache of OpenID discovery documents.

// self
use crate::{_prelude::*, discovery::OpenIdProviderConfiguration};

type DocumentMap = RwLock<HashMap<Url, Arc<OpenIdProviderConfiguration>>>;

/// Discovery documents keyed by the exact resolved well-known URL.
///
/// Entries never expire; call [`DiscoveryCache::clear`] to force reloads. Concurrent first loads
/// of the same URL serialize on a per-URL guard so only one GET goes out.
#[derive(Debug, Default)]
pub struct DiscoveryCache {
	documents: DocumentMap,
	guards: Mutex<HashMap<Url, Arc<AsyncMutex<()>>>>,
}
impl DiscoveryCache {
	/// Returns the cached document for `url`.
	pub fn get(&self, url: &Url) -> Option<Arc<OpenIdProviderConfiguration>> {
		self.documents.read().get(url).cloned()
	}

	/// Stores `document` under `url`, replacing any previous entry.
	pub fn insert(&self, url: Url, document: Arc<OpenIdProviderConfiguration>) {
		self.documents.write().insert(url, document);
	}

	/// Drops every cached document.
	pub fn clear(&self) {
		self.documents.write().clear();
		self.guards.lock().clear();
	}

	/// Number of cached documents.
	pub fn len(&self) -> usize {
		self.documents.read().len()
	}

	/// Returns `true` when nothing is cached.
	pub fn is_empty(&self) -> bool {
		self.documents.read().is_empty()
	}

	pub(crate) fn guard(&self, url: &Url) -> Arc<AsyncMutex<()>> {
		let mut guards = self.guards.lock();

		guards.entry(url.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}
}
