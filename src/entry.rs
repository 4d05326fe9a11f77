/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};

use dlv_list::Index;
use parking_lot::Mutex;

use crate::timer_wheel::WheelHandle;

/// Which segment of the Window-TinyLFU policy an entry currently lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueTag {
	Eden,
	MainProbation,
	MainProtected,
}

/// Why an entry was removed, surfaced to the removal listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemovalCause {
	Explicit,
	Replaced,
	Expired,
	Size,
	Collected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Lifecycle {
	Alive = 0,
	Retired = 1,
	Dead = 2,
}

impl From<u8> for Lifecycle {
	fn from(value: u8) -> Self {
		match value {
			0 => Lifecycle::Alive,
			1 => Lifecycle::Retired,
			_ => Lifecycle::Dead,
		}
	}
}

/// A strong, weak, or soft-approximated reference to a cached value.
///
/// Rust has no GC-integrated soft reference, so `Soft` is represented as a
/// plain strong handle with an eligible-for-reclamation-under-pressure
/// flag rather than a true collectible reference.
pub enum ValueRef<V> {
	Strong(Arc<V>),
	Weak(Weak<V>),
	Soft(Arc<V>),
}

impl<V> ValueRef<V> {
	#[must_use]
	pub fn upgrade(&self) -> Option<Arc<V>> {
		match self {
			ValueRef::Strong(v) | ValueRef::Soft(v) => Some(v.clone()),
			ValueRef::Weak(v) => v.upgrade(),
		}
	}

	#[must_use]
	pub fn is_collected(&self) -> bool {
		matches!(self, ValueRef::Weak(w) if w.strong_count() == 0)
	}
}

/// Link handles into the policy's arena-backed queues. Kept behind a
/// mutex because the links change together as a unit whenever an entry
/// moves between queues, and must never be observed half-updated.
#[derive(Default)]
pub struct Links<T> {
	pub access_order: Option<Index<T>>,
	pub write_order: Option<Index<T>>,
	pub variable_expiry: Option<WheelHandle<T>>,
}

pub struct Entry<K, V> {
	pub key: K,
	pub value: Mutex<ValueRef<V>>,

	pub weight: AtomicU32,

	queue_tag: AtomicU8,
	lifecycle: AtomicU8,

	pub access_time_ns: AtomicU64,
	pub write_time_ns: AtomicU64,
	pub variable_expire_time_ns: AtomicU64,

	pub links: Mutex<Links<Arc<Entry<K, V>>>>,
}

impl<K, V> Entry<K, V> {
	pub fn new(key: K, value: V, weight: u32, now_ns: u64) -> Self {
		Self::with_value_ref(key, ValueRef::Strong(Arc::new(value)), weight, now_ns)
	}

	pub fn with_value_ref(key: K, value: ValueRef<V>, weight: u32, now_ns: u64) -> Self {
		Entry {
			key,
			value: Mutex::new(value),

			weight: AtomicU32::new(weight),

			queue_tag: AtomicU8::new(QueueTag::Eden as u8),
			lifecycle: AtomicU8::new(Lifecycle::Alive as u8),

			access_time_ns: AtomicU64::new(now_ns),
			write_time_ns: AtomicU64::new(now_ns),
			variable_expire_time_ns: AtomicU64::new(u64::MAX),

			links: Mutex::new(Links::default()),
		}
	}

	#[must_use]
	pub fn queue_tag(&self) -> QueueTag {
		match self.queue_tag.load(Ordering::Acquire) {
			0 => QueueTag::Eden,
			1 => QueueTag::MainProbation,
			_ => QueueTag::MainProtected,
		}
	}

	pub fn set_queue_tag(&self, tag: QueueTag) {
		self.queue_tag.store(tag as u8, Ordering::Release);
	}

	#[must_use]
	pub fn lifecycle(&self) -> Lifecycle {
		self.lifecycle.load(Ordering::Acquire).into()
	}

	pub fn set_lifecycle(&self, lifecycle: Lifecycle) {
		self.lifecycle.store(lifecycle as u8, Ordering::Release);
	}

	/// Atomically transitions Alive -> Retired, returning `true` only for
	/// the caller that won the race, so removal notification fires once.
	pub fn retire(&self) -> bool {
		self.lifecycle
			.compare_exchange(
				Lifecycle::Alive as u8,
				Lifecycle::Retired as u8,
				Ordering::AcqRel,
				Ordering::Acquire,
			)
			.is_ok()
	}

	/// Atomically transitions Retired -> Dead, returning `true` only for
	/// the caller that won the race, so the weight is debited once.
	pub fn kill(&self) -> bool {
		self.lifecycle
			.compare_exchange(
				Lifecycle::Retired as u8,
				Lifecycle::Dead as u8,
				Ordering::AcqRel,
				Ordering::Acquire,
			)
			.is_ok()
	}

	pub fn touch_access(&self, now_ns: u64) {
		self.access_time_ns.store(now_ns, Ordering::Release);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lifecycle_transitions_exactly_once() {
		let entry: Entry<u64, u64> = Entry::new(1, 10, 1, 0);

		assert_eq!(entry.lifecycle(), Lifecycle::Alive);
		assert!(entry.retire());
		assert!(!entry.retire());

		assert_eq!(entry.lifecycle(), Lifecycle::Retired);
		assert!(entry.kill());
		assert!(!entry.kill());

		assert_eq!(entry.lifecycle(), Lifecycle::Dead);
	}

	#[test]
	fn weak_value_reports_collected_after_drop() {
		let strong = Arc::new(42u64);
		let weak = ValueRef::<u64>::Weak(Arc::downgrade(&strong));

		assert!(!weak.is_collected());
		assert_eq!(*weak.upgrade().unwrap(), 42);

		drop(strong);

		assert!(weak.is_collected());
		assert!(weak.upgrade().is_none());
	}
}
