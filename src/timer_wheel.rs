/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use dlv_list::Index;
use crate::deque::OrderedDeque;

const LEVELS: usize = 5;
const BUCKETS_PER_LEVEL: u64 = 64;

/// Bucket span in nanoseconds for each level: ~1.07s, ~1.14m, ~1.22h,
/// ~1.30d, ~6.5d, each the previous level's full span.
const LEVEL_SHIFT: [u32; LEVELS] = [0, 6, 12, 18, 24];
const SPAN_SHIFT_NS: u32 = 30; // 2^30 ns ~= 1.07s, the level-0 bucket span

/// A handle identifying a scheduled node's position in the wheel, stored
/// alongside the node's owning entry so it can be descheduled in O(1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WheelHandle<T> {
	level: usize,
	bucket: usize,
	index: Index<(T, u64)>,
}

/// A hierarchical timer wheel for variable per-entry expiry. Nodes carry
/// an arbitrary cloneable payload (typically a strong entry handle)
/// alongside their absolute deadline in nanoseconds.
pub struct TimerWheel<T> {
	buckets: Vec<Vec<OrderedDeque<(T, u64)>>>,
	last_advance_ns: u64,
}

impl<T> Default for TimerWheel<T> {
	fn default() -> Self {
		let buckets = (0..LEVELS)
			.map(|_| (0..BUCKETS_PER_LEVEL).map(|_| OrderedDeque::default()).collect())
			.collect();

		TimerWheel {
			buckets,
			last_advance_ns: 0,
		}
	}
}

impl<T: Clone> TimerWheel<T> {
	pub fn schedule(&mut self, node: T, deadline_ns: u64) -> WheelHandle<T> {
		let (level, bucket) = self.locate(deadline_ns);
		let index = self.buckets[level][bucket].push_back((node, deadline_ns));

		WheelHandle { level, bucket, index }
	}

	pub fn deschedule(&mut self, handle: WheelHandle<T>) {
		self.buckets[handle.level][handle.bucket].remove(handle.index);
	}

	pub fn reschedule(&mut self, handle: WheelHandle<T>, node: T, deadline_ns: u64) -> WheelHandle<T> {
		self.deschedule(handle);
		self.schedule(node, deadline_ns)
	}

	fn locate(&self, deadline_ns: u64) -> (usize, usize) {
		let delay = deadline_ns.saturating_sub(self.last_advance_ns);

		for level in 0..LEVELS {
			let level_span = 1u64 << (SPAN_SHIFT_NS + LEVEL_SHIFT[level]);

			if delay < level_span * BUCKETS_PER_LEVEL || level == LEVELS - 1 {
				let bucket = ((deadline_ns >> (SPAN_SHIFT_NS + LEVEL_SHIFT[level])) % BUCKETS_PER_LEVEL) as usize;
				return (level, bucket);
			}
		}

		(LEVELS - 1, 0)
	}

	/// Advances the wheel to `now_ns`, returning every node whose deadline
	/// has passed. Nodes whose cascade bucket still lies in the future are
	/// rescheduled at a finer level rather than expired; `on_cascade` is
	/// invoked with each such node and its new handle so the caller can
	/// update whatever external bookkeeping (an entry's `links`, say)
	/// still points at the handle's old bucket position.
	pub fn advance(&mut self, now_ns: u64, mut on_cascade: impl FnMut(&T, WheelHandle<T>)) -> Vec<T> {
		let mut expired = Vec::new();

		if now_ns <= self.last_advance_ns {
			return expired;
		}

		for level in (0..LEVELS).rev() {
			let span = 1u64 << (SPAN_SHIFT_NS + LEVEL_SHIFT[level]);
			let prev_tick = self.last_advance_ns / span;
			let next_tick = now_ns / span;

			if next_tick <= prev_tick {
				continue;
			}

			let ticks_to_process = (next_tick - prev_tick).min(BUCKETS_PER_LEVEL);

			for i in 0..ticks_to_process {
				let tick = prev_tick + 1 + i;
				let bucket = (tick % BUCKETS_PER_LEVEL) as usize;
				let drained: Vec<(T, u64)> = self.buckets[level][bucket].iter().cloned().collect();

				self.buckets[level][bucket].clear();

				for (node, deadline_ns) in drained {
					if deadline_ns <= now_ns {
						expired.push(node);
					} else {
						let (new_level, new_bucket) = self.locate(deadline_ns);
						let index = self.buckets[new_level][new_bucket].push_back((node.clone(), deadline_ns));
						let handle = WheelHandle { level: new_level, bucket: new_bucket, index };

						on_cascade(&node, handle);
					}
				}
			}
		}

		self.last_advance_ns = now_ns;
		expired
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.buckets.iter().flatten().map(OrderedDeque::len).sum()
	}

	/// Every scheduled node paired with its deadline, sorted soonest
	/// first. Used only by the policy views (oldest/youngest by variable
	/// expiry), never on the hot path.
	#[must_use]
	pub fn entries_by_deadline(&self) -> Vec<(T, u64)> {
		let mut entries: Vec<(T, u64)> = self.buckets.iter()
			.flatten()
			.flat_map(|bucket| bucket.iter().cloned())
			.collect();

		entries.sort_by_key(|(_, deadline)| *deadline);
		entries
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const SECOND_NS: u64 = 1 << SPAN_SHIFT_NS;

	#[test]
	fn schedule_and_advance_expires_in_order() {
		let mut wheel: TimerWheel<u64> = TimerWheel::default();

		wheel.schedule(1, SECOND_NS);
		wheel.schedule(2, 2 * SECOND_NS);
		wheel.schedule(3, 61 * SECOND_NS);

		let expired = wheel.advance(SECOND_NS + SECOND_NS / 10, |_, _| {});
		assert_eq!(expired, vec![1]);

		let expired = wheel.advance(2 * SECOND_NS + SECOND_NS / 10, |_, _| {});
		assert_eq!(expired, vec![2]);

		let expired = wheel.advance(61 * SECOND_NS + SECOND_NS / 10, |_, _| {});
		assert_eq!(expired, vec![3]);
	}

	#[test]
	fn deschedule_prevents_expiry() {
		let mut wheel: TimerWheel<u64> = TimerWheel::default();
		let handle = wheel.schedule(1, SECOND_NS);

		wheel.deschedule(handle);

		let expired = wheel.advance(2 * SECOND_NS, |_, _| {});
		assert!(expired.is_empty());
	}

	#[test]
	fn cascade_updates_the_handle_passed_to_on_cascade() {
		let mut wheel: TimerWheel<u64> = TimerWheel::default();

		// Scheduled far enough out to land above level 0 (level 1's span is
		// 64 seconds), so a level-1 tick touches it well before its own
		// deadline and forces a cascade re-link rather than an expiry.
		let far_deadline = 100 * SECOND_NS;
		wheel.schedule(1, far_deadline);

		let mut last_handle = None;
		let expired = wheel.advance(64 * SECOND_NS, |node, handle| {
			assert_eq!(*node, 1);
			last_handle = Some(handle);
		});

		assert!(expired.is_empty());
		let handle = last_handle.expect("cascade should have fired for the pending node");

		// The handle returned by the cascade must be the node's real,
		// current position: descheduling it must remove it so a later
		// advance past its deadline does not still report it expired.
		wheel.deschedule(handle);
		let expired = wheel.advance(far_deadline + SECOND_NS, |_, _| {});
		assert!(expired.is_empty());
	}

	#[test]
	fn len_tracks_scheduled_nodes() {
		let mut wheel: TimerWheel<u64> = TimerWheel::default();

		assert!(wheel.is_empty());

		wheel.schedule(1, SECOND_NS);
		wheel.schedule(2, SECOND_NS * 10);

		assert_eq!(wheel.len(), 2);
	}
}
