/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::hash::{Hash, Hasher};
use std::collections::hash_map::DefaultHasher;

const COUNTERS_PER_WORD: u64 = 16;
const SEEDS: [u64; 4] = [
	0xff51_afd7_ed55_8ccd,
	0xc4ce_b9fe_1a85_ec53,
	0x2545_f491_4f6c_dd1d,
	0x9e37_79b9_7f4a_7c15,
];

/// A 4-bit count-min sketch used to estimate access frequency for
/// admission decisions, with periodic halving to track recency.
pub struct FrequencySketch {
	table: Vec<u64>,
	table_mask: u64,
	size: u64,
	sample_size: u64,
}

impl FrequencySketch {
	#[must_use]
	pub fn new(maximum: u64) -> Self {
		let mut sketch = FrequencySketch {
			table: Vec::new(),
			table_mask: 0,
			size: 0,
			sample_size: 0,
		};

		sketch.ensure_capacity(maximum);
		sketch
	}

	/// Grows the sketch's table to accommodate `maximum` entries, provided
	/// it hasn't yet recorded any increments against a smaller capacity.
	pub fn ensure_capacity(&mut self, maximum: u64) {
		let maximum = maximum.max(1);
		let table_size = maximum.next_power_of_two().max(8);

		if self.table.len() as u64 >= table_size {
			return;
		}

		self.table = vec![0u64; table_size as usize];
		self.table_mask = table_size - 1;
		self.sample_size = 10 * maximum;
		self.size = 0;
	}

	#[must_use]
	pub fn frequency(&self, key: &impl Hash) -> u8 {
		if self.table.is_empty() {
			return 0;
		}

		let hash = spread(key);
		let mut min = u8::MAX;

		for i in 0..4 {
			let count = self.count_at(hash, i);
			min = min.min(count);
		}

		min
	}

	pub fn increment(&mut self, key: &impl Hash) {
		if self.table.is_empty() {
			return;
		}

		let hash = spread(key);
		let mut changed = false;

		for i in 0..4 {
			changed |= self.increment_at(hash, i);
		}

		if changed {
			self.size += 1;

			if self.size >= self.sample_size {
				self.reset();
			}
		}
	}

	fn index_and_offset(&self, hash: u64, counter: usize) -> (usize, u32) {
		let counter_hash = hash.wrapping_mul(SEEDS[counter]).rotate_left(17);
		let slot = counter_hash & self.table_mask;
		let word_index = (slot / COUNTERS_PER_WORD) as usize;
		let within_word = (slot % COUNTERS_PER_WORD) as u32;

		(word_index, within_word * 4)
	}

	fn count_at(&self, hash: u64, counter: usize) -> u8 {
		let (word_index, shift) = self.index_and_offset(hash, counter);
		((self.table[word_index] >> shift) & 0xf) as u8
	}

	fn increment_at(&mut self, hash: u64, counter: usize) -> bool {
		let (word_index, shift) = self.index_and_offset(hash, counter);
		let word = self.table[word_index];
		let count = (word >> shift) & 0xf;

		if count >= 15 {
			return false;
		}

		self.table[word_index] = word + (1 << shift);
		true
	}

	fn reset(&mut self) {
		for word in &mut self.table {
			*word = (*word >> 1) & 0x7777_7777_7777_7777;
		}

		self.size /= 2;
	}
}

fn spread(key: &impl Hash) -> u64 {
	let mut hasher = DefaultHasher::new();
	key.hash(&mut hasher);

	let h = hasher.finish();
	let h = h ^ (h >> 33);

	h.wrapping_mul(0xff51_afd7_ed55_8ccd)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn frequency_increases_with_increment() {
		let mut sketch = FrequencySketch::new(64);

		assert_eq!(sketch.frequency(&1u64), 0);

		sketch.increment(&1u64);
		sketch.increment(&1u64);
		sketch.increment(&1u64);

		assert_eq!(sketch.frequency(&1u64), 3);
	}

	#[test]
	fn frequency_saturates_at_fifteen() {
		let mut sketch = FrequencySketch::new(64);

		for _ in 0..100 {
			sketch.increment(&1u64);
		}

		assert_eq!(sketch.frequency(&1u64), 15);
	}

	#[test]
	fn aging_halves_counters() {
		let mut sketch = FrequencySketch::new(8);

		for _ in 0..4 {
			sketch.increment(&1u64);
		}

		let before = sketch.frequency(&1u64);
		assert!(before > 0);

		for i in 0..200 {
			sketch.increment(&(100 + i));
		}

		assert!(sketch.frequency(&1u64) <= before);
	}

	#[test]
	fn distinct_keys_are_usually_distinguished() {
		let mut sketch = FrequencySketch::new(1024);

		sketch.increment(&1u64);
		sketch.increment(&1u64);
		sketch.increment(&1u64);

		assert!(sketch.frequency(&1u64) >= sketch.frequency(&2u64));
	}
}
