//! Client/server clock skew tracking.
//!
//! The skew is a single signed millisecond value, `client - reference`, overwritten whenever the
//! token endpoint answers with a usable `Date` header. The latest observation wins; there is no
//! smoothing.

// std
use std::sync::atomic::{AtomicI64, Ordering};
// self
use crate::_prelude::*;

/// Persistence contract for the skew value.
pub trait SkewStorage
where
	Self: Send + Sync,
{
	/// Returns the stored skew in milliseconds (zero when nothing was stored).
	fn load(&self) -> i64;

	/// Replaces the stored skew.
	fn store(&self, skew_millis: i64);
}

/// Lock-free in-process [`SkewStorage`].
#[derive(Debug, Default)]
pub struct MemorySkewStorage(AtomicI64);
impl SkewStorage for MemorySkewStorage {
	fn load(&self) -> i64 {
		self.0.load(Ordering::Relaxed)
	}

	fn store(&self, skew_millis: i64) {
		self.0.store(skew_millis, Ordering::Relaxed);
	}
}

/// Applies and records the skew between the local clock and the identity service.
#[derive(Clone)]
pub struct ClockSkewManager {
	storage: Arc<dyn SkewStorage>,
}
impl ClockSkewManager {
	/// Creates a manager on top of `storage`.
	pub fn new(storage: Arc<dyn SkewStorage>) -> Self {
		Self { storage }
	}

	/// Records `client_now - reference` using the current wall clock as `client_now`.
	pub fn on_timestamp_received(&self, reference: OffsetDateTime) {
		self.on_timestamp_received_at(reference, OffsetDateTime::now_utc());
	}

	/// Records `client_now - reference`.
	pub fn on_timestamp_received_at(&self, reference: OffsetDateTime, client_now: OffsetDateTime) {
		self.storage.store(to_millis(client_now) - to_millis(reference));
	}

	/// Stored skew in milliseconds.
	pub fn skew_millis(&self) -> i64 {
		self.storage.load()
	}

	/// Stored skew as a duration.
	pub fn skew(&self) -> Duration {
		Duration::milliseconds(self.skew_millis())
	}

	/// Converts a reference (server) instant into local clock time.
	pub fn to_client_time(&self, reference: OffsetDateTime) -> OffsetDateTime {
		reference + self.skew()
	}

	/// Converts a local clock instant into reference (server) time.
	pub fn to_reference_time(&self, client: OffsetDateTime) -> OffsetDateTime {
		client - self.skew()
	}

	/// Current instant as the server would see it.
	pub fn adjusted_reference_time(&self) -> OffsetDateTime {
		self.to_reference_time(OffsetDateTime::now_utc())
	}
}
impl Default for ClockSkewManager {
	fn default() -> Self {
		Self::new(Arc::new(MemorySkewStorage::default()))
	}
}
impl Debug for ClockSkewManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClockSkewManager").field("skew_millis", &self.skew_millis()).finish()
	}
}

fn to_millis(instant: OffsetDateTime) -> i64 {
	(instant.unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;

	#[test]
	fn skew_is_client_minus_reference() {
		let manager = ClockSkewManager::default();

		manager.on_timestamp_received_at(
			datetime!(2024-01-01 00:00:00 UTC),
			datetime!(2024-01-01 00:00:05 UTC),
		);

		assert_eq!(manager.skew_millis(), 5_000);
		assert_eq!(
			manager.to_client_time(datetime!(2024-01-01 00:00:00 UTC)),
			datetime!(2024-01-01 00:00:05 UTC)
		);
	}

	#[test]
	fn latest_observation_wins() {
		let manager = ClockSkewManager::default();
		let now = datetime!(2024-06-01 12:00:00 UTC);

		manager.on_timestamp_received_at(now - Duration::seconds(30), now);
		manager.on_timestamp_received_at(now + Duration::seconds(2), now);

		assert_eq!(manager.skew_millis(), -2_000);
	}

	#[test]
	fn conversions_are_symmetric() {
		let manager = ClockSkewManager::default();

		manager.on_timestamp_received_at(
			datetime!(2024-01-01 00:00:00.250 UTC),
			datetime!(2023-12-31 23:59:17 UTC),
		);

		for instant in [
			datetime!(1999-12-31 23:59:59 UTC),
			datetime!(2024-02-29 12:00:00.001 UTC),
			OffsetDateTime::UNIX_EPOCH,
		] {
			assert_eq!(manager.to_reference_time(manager.to_client_time(instant)), instant);
			assert_eq!(manager.to_client_time(manager.to_reference_time(instant)), instant);
		}
	}
}
