//! Query-string editing that never inserts a parameter twice.

// self
use crate::_prelude::*;

/// Wraps a [`Url`] and appends query parameters only when their name is not already present.
#[derive(Clone, Debug)]
pub struct QueryBuilder {
	url: Url,
}
impl QueryBuilder {
	/// Starts from `url`, keeping its existing query.
	pub fn new(url: Url) -> Self {
		Self { url }
	}

	/// Returns `true` when a parameter named `name` exists.
	pub fn contains(&self, name: &str) -> bool {
		self.url.query_pairs().any(|(k, _)| k == name)
	}

	/// Appends `name=value` unless `name` already exists. Returns whether it was added.
	pub fn add_if_absent(&mut self, name: &str, value: &str) -> bool {
		if self.contains(name) {
			return false;
		}

		self.url.query_pairs_mut().append_pair(name, value);

		true
	}

	/// Appends every pair whose name is not present yet, in iteration order.
	pub fn add_all_if_absent<'a, I>(&mut self, pairs: I)
	where
		I: IntoIterator<Item = (&'a str, &'a str)>,
	{
		for (name, value) in pairs {
			self.add_if_absent(name, value);
		}
	}

	/// Finishes editing.
	pub fn build(self) -> Url {
		self.url
	}
}

/// Collects the query parameters of `url`; later duplicates overwrite earlier ones.
pub fn query_parameters(url: &Url) -> BTreeMap<String, String> {
	url.query_pairs().into_owned().collect()
}
