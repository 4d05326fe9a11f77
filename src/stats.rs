/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::sync::atomic::{AtomicU64, Ordering};

/// A point-in-time snapshot of a cache's hit/miss/load/eviction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
	pub hit_count: u64,
	pub miss_count: u64,
	pub load_success_count: u64,
	pub load_failure_count: u64,
	pub eviction_count: u64,
	pub eviction_weight: u64,
}

impl CacheStats {
	#[must_use]
	pub fn request_count(&self) -> u64 {
		self.hit_count + self.miss_count
	}

	#[must_use]
	pub fn hit_rate(&self) -> f64 {
		if self.request_count() == 0 {
			return 1.0;
		}

		self.hit_count as f64 / self.request_count() as f64
	}

	#[must_use]
	pub fn miss_rate(&self) -> f64 {
		1.0 - self.hit_rate()
	}
}

/// Lock-free counters mutated on the hot path and snapshotted into
/// `CacheStats` on demand, mirroring this crate's split between a mutable
/// snapshot type and an always-live atomic counterpart.
#[derive(Default)]
pub struct AtomicStats {
	enabled: bool,

	hit_count: AtomicU64,
	miss_count: AtomicU64,
	load_success_count: AtomicU64,
	load_failure_count: AtomicU64,
	eviction_count: AtomicU64,
	eviction_weight: AtomicU64,
}

impl AtomicStats {
	#[must_use]
	pub fn new(enabled: bool) -> Self {
		AtomicStats {
			enabled,
			..Default::default()
		}
	}

	pub fn record_hit(&self) {
		if self.enabled {
			self.hit_count.fetch_add(1, Ordering::Relaxed);
		}
	}

	pub fn record_miss(&self) {
		if self.enabled {
			self.miss_count.fetch_add(1, Ordering::Relaxed);
		}
	}

	pub fn record_load_success(&self) {
		if self.enabled {
			self.load_success_count.fetch_add(1, Ordering::Relaxed);
		}
	}

	pub fn record_load_failure(&self) {
		if self.enabled {
			self.load_failure_count.fetch_add(1, Ordering::Relaxed);
		}
	}

	pub fn record_eviction(&self, weight: u64) {
		if self.enabled {
			self.eviction_count.fetch_add(1, Ordering::Relaxed);
			self.eviction_weight.fetch_add(weight, Ordering::Relaxed);
		}
	}

	pub fn clear(&self) {
		self.hit_count.store(0, Ordering::Relaxed);
		self.miss_count.store(0, Ordering::Relaxed);
		self.load_success_count.store(0, Ordering::Relaxed);
		self.load_failure_count.store(0, Ordering::Relaxed);
		self.eviction_count.store(0, Ordering::Relaxed);
		self.eviction_weight.store(0, Ordering::Relaxed);
	}

	#[must_use]
	pub fn snapshot(&self) -> CacheStats {
		CacheStats {
			hit_count: self.hit_count.load(Ordering::Relaxed),
			miss_count: self.miss_count.load(Ordering::Relaxed),
			load_success_count: self.load_success_count.load(Ordering::Relaxed),
			load_failure_count: self.load_failure_count.load(Ordering::Relaxed),
			eviction_count: self.eviction_count.load(Ordering::Relaxed),
			eviction_weight: self.eviction_weight.load(Ordering::Relaxed),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn disabled_stats_do_not_accumulate() {
		let stats = AtomicStats::new(false);

		stats.record_hit();
		stats.record_miss();

		assert_eq!(stats.snapshot(), CacheStats::default());
	}

	#[test]
	fn enabled_stats_accumulate_and_clear() {
		let stats = AtomicStats::new(true);

		stats.record_hit();
		stats.record_hit();
		stats.record_miss();
		stats.record_eviction(4);

		let snapshot = stats.snapshot();

		assert_eq!(snapshot.hit_count, 2);
		assert_eq!(snapshot.miss_count, 1);
		assert_eq!(snapshot.eviction_count, 1);
		assert_eq!(snapshot.eviction_weight, 4);
		assert!((snapshot.hit_rate() - (2.0 / 3.0)).abs() < 1e-9);

		stats.clear();
		assert_eq!(stats.snapshot(), CacheStats::default());
	}
}
