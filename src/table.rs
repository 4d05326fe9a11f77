/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry as DashEntry;

use crate::entry::Entry;

/// The concurrent key -> entry table. `dashmap`'s per-shard locking is
/// the practical stand-in, in safe Rust, for a per-entry critical
/// section: obtaining a shard's entry guard serializes every mutation
/// touching that key, at shard rather than single-key granularity.
pub struct EntryTable<K, V, S> {
	map: DashMap<K, Arc<Entry<K, V>>, S>,
}

impl<K, V, S> EntryTable<K, V, S>
where
	K: Eq + Hash + Clone,
	S: BuildHasher + Clone,
{
	pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
		EntryTable {
			map: DashMap::with_capacity_and_hasher(capacity, hasher),
		}
	}

	#[must_use]
	pub fn get(&self, key: &K) -> Option<Arc<Entry<K, V>>> {
		self.map.get(key).map(|guard| guard.value().clone())
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.map.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.map.is_empty()
	}

	/// Inserts a freshly created entry iff no live mapping exists for the
	/// key, returning the entry now resident in the table (which may be
	/// the caller's `new_entry` or a concurrently-inserted one).
	pub fn get_or_insert_with(
		&self,
		key: K,
		new_entry: impl FnOnce() -> Arc<Entry<K, V>>,
	) -> (Arc<Entry<K, V>>, bool) {
		match self.map.entry(key) {
			DashEntry::Occupied(occupied) => (occupied.get().clone(), false),
			DashEntry::Vacant(vacant) => {
				let entry = new_entry();
				vacant.insert(entry.clone());
				(entry, true)
			},
		}
	}

	/// Replaces the entry for `key` unconditionally, returning the entry
	/// that was previously resident, if any.
	pub fn insert(&self, key: K, entry: Arc<Entry<K, V>>) -> Option<Arc<Entry<K, V>>> {
		self.map.insert(key, entry)
	}

	/// Removes `key` iff its resident entry is `expected` (by pointer
	/// identity), returning the removed entry on success.
	pub fn remove_if_same(&self, key: &K, expected: &Arc<Entry<K, V>>) -> Option<Arc<Entry<K, V>>> {
		let mut removed = None;

		self.map.remove_if_mut(key, |_, current| {
			let matches = Arc::ptr_eq(current, expected);

			if matches {
				removed = Some(current.clone());
			}

			matches
		});

		removed
	}

	pub fn remove(&self, key: &K) -> Option<Arc<Entry<K, V>>> {
		self.map.remove(key).map(|(_, entry)| entry)
	}

	pub fn clear(&self) {
		self.map.clear();
	}

	pub fn iter(&self) -> impl Iterator<Item = Arc<Entry<K, V>>> + '_ {
		self.map.iter().map(|guard| guard.value().clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::hash::RandomState;

	fn table() -> EntryTable<u64, u64, RandomState> {
		EntryTable::with_capacity_and_hasher(16, RandomState::default())
	}

	#[test]
	fn get_or_insert_with_only_inserts_once() {
		let table = table();

		let (first, inserted_first) = table.get_or_insert_with(1, || Arc::new(Entry::new(1, 10, 1, 0)));
		assert!(inserted_first);

		let (second, inserted_second) = table.get_or_insert_with(1, || Arc::new(Entry::new(1, 20, 1, 0)));
		assert!(!inserted_second);
		assert!(Arc::ptr_eq(&first, &second));
	}

	#[test]
	fn remove_if_same_rejects_stale_handle() {
		let table = table();

		let stale = Arc::new(Entry::new(1, 10, 1, 0));
		let (current, _) = table.get_or_insert_with(1, || Arc::new(Entry::new(1, 20, 1, 0)));

		assert!(table.remove_if_same(&1, &stale).is_none());
		assert!(table.remove_if_same(&1, &current).is_some());
		assert!(table.get(&1).is_none());
	}
}
