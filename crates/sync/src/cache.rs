//! Last-known-good records of one resource collection.
//!
//! The cache is replaced wholesale by a snapshot and patched by incremental
//! events. Every mutation returns the [`Delta`] it caused, so views can patch
//! rows instead of redrawing.

use std::collections::HashSet;

use indexmap::IndexMap;
use switchboard_proto::{Identified, Push};

/// Changes produced by one cache mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Delta<R> {
	/// Records whose id was not present before.
	pub added: Vec<R>,
	/// Ids no longer present.
	pub removed: Vec<String>,
	/// Records present before and after whose contents differ.
	pub changed: Vec<R>,
}

impl<R> Default for Delta<R> {
	fn default() -> Self {
		Self {
			added: Vec::new(),
			removed: Vec::new(),
			changed: Vec::new(),
		}
	}
}

impl<R> Delta<R> {
	/// Whether nothing changed.
	pub fn is_empty(&self) -> bool {
		self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
	}

	/// Total number of affected ids.
	pub fn len(&self) -> usize {
		self.added.len() + self.removed.len() + self.changed.len()
	}
}

/// Id-keyed map of the records of one channel.
///
/// Iteration follows snapshot order, with later additions appended.
#[derive(Debug, Clone)]
pub struct ResourceCache<R> {
	records: IndexMap<String, R>,
}

impl<R> Default for ResourceCache<R> {
	fn default() -> Self {
		Self { records: IndexMap::new() }
	}
}

impl<R> ResourceCache<R>
where
	R: Identified + Clone + PartialEq,
{
	/// Creates an empty cache.
	pub fn new() -> Self {
		Self::default()
	}

	/// Replaces the cache with `records` and returns the difference.
	///
	/// Linear in the size of both collections: removed = old - new,
	/// added = new - old, changed = structural inequality on the intersection.
	/// Duplicate ids in the snapshot collapse to the last occurrence.
	pub fn apply_snapshot(&mut self, records: Vec<R>) -> Delta<R> {
		let mut next = IndexMap::with_capacity(records.len());
		for record in records {
			next.insert(record.id().to_owned(), record);
		}

		let mut delta = Delta::default();
		for (id, old) in &self.records {
			match next.get(id) {
				None => delta.removed.push(id.clone()),
				Some(new) if new != old => delta.changed.push(new.clone()),
				Some(_) => {}
			}
		}
		let known: HashSet<&str> = self.records.keys().map(String::as_str).collect();
		delta.added = next
			.iter()
			.filter(|(id, _)| !known.contains(id.as_str()))
			.map(|(_, r)| r.clone())
			.collect();

		self.records = next;
		delta
	}

	/// Inserts or replaces one record.
	pub fn apply_added(&mut self, record: R) -> Delta<R> {
		self.upsert(record)
	}

	/// Inserts or replaces one record.
	///
	/// An update for an unknown id is treated as an addition.
	pub fn apply_updated(&mut self, record: R) -> Delta<R> {
		self.upsert(record)
	}

	/// Deletes one record by id. Unknown ids are a no-op.
	pub fn apply_removed(&mut self, id: &str) -> Delta<R> {
		let mut delta = Delta::default();
		if self.records.shift_remove(id).is_some() {
			delta.removed.push(id.to_owned());
		}
		delta
	}

	/// Applies any push.
	pub fn apply(&mut self, push: Push<R>) -> Delta<R> {
		match push {
			Push::Snapshot(records) => self.apply_snapshot(records),
			Push::Added(record) => self.apply_added(record),
			Push::Updated(record) => self.apply_updated(record),
			Push::Removed(id) => self.apply_removed(&id),
		}
	}

	fn upsert(&mut self, record: R) -> Delta<R> {
		let mut delta = Delta::default();
		match self.records.get_mut(record.id()) {
			Some(existing) if *existing == record => {}
			Some(existing) => {
				*existing = record.clone();
				delta.changed.push(record);
			}
			None => {
				self.records.insert(record.id().to_owned(), record.clone());
				delta.added.push(record);
			}
		}
		delta
	}

	/// Drops every record; used on channel teardown.
	pub fn clear(&mut self) {
		self.records.clear();
	}

	/// Looks up a record.
	pub fn get(&self, id: &str) -> Option<&R> {
		self.records.get(id)
	}

	/// Number of records.
	pub fn len(&self) -> usize {
		self.records.len()
	}

	/// Whether the cache is empty.
	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}

	/// Records in cache order.
	pub fn iter(&self) -> impl Iterator<Item = &R> {
		self.records.values()
	}

	/// Owned copy of the records in cache order.
	pub fn to_vec(&self) -> Vec<R> {
		self.records.values().cloned().collect()
	}
}

#[cfg(test)]
mod tests;
