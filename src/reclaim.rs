/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use crate::entry::Entry;
use crate::table::EntryTable;

/// Rust's `Weak` has no drop notification, unlike a `ReferenceQueue`, so
/// weak/soft value reclamation is modeled as best-effort polling: every
/// maintenance cycle walks entries known to hold a weak value and checks
/// whether the referent has been dropped.
pub fn collect_cleared<K, V, S>(table: &EntryTable<K, V, S>) -> Vec<Arc<Entry<K, V>>>
where
	K: Eq + Hash + Clone,
	S: BuildHasher + Clone,
{
	table
		.iter()
		.filter(|entry| entry.value.lock().is_collected())
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::hash::RandomState;

	#[test]
	fn collect_cleared_finds_dropped_weak_values() {
		let table: EntryTable<u64, u64, RandomState> =
			EntryTable::with_capacity_and_hasher(16, RandomState::default());

		let value = Arc::new(5u64);
		let entry = Arc::new(Entry::new(1, 5, 1, 0));

		*entry.value.lock() = crate::entry::ValueRef::Weak(Arc::downgrade(&value));
		table.insert(1, entry);

		assert!(collect_cleared(&table).is_empty());

		drop(value);

		assert_eq!(collect_cleared(&table).len(), 1);
	}
}
