/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::cell::Cell;
use std::hash::{Hash, Hasher};
use std::collections::hash_map::DefaultHasher;

use crossbeam_channel::{bounded, Sender, Receiver, TrySendError};

const STRIPE_CAPACITY: usize = 16;

thread_local! {
	static STRIPE_PROBE: Cell<usize> = Cell::new(0);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OfferOutcome {
	Success,
	Failed,
	Full,
}

/// A lossy, striped ring buffer recording reads so that policy reordering
/// can be batched under the maintenance lock instead of contended on
/// every lookup. Each stripe is a small bounded channel; dropping a
/// reentry on `Full` is acceptable, since read-order reordering is
/// best-effort only.
pub struct StripedReadBuffer<T> {
	stripes: Vec<(Sender<T>, Receiver<T>)>,
	mask: usize,
}

impl<T> StripedReadBuffer<T> {
	#[must_use]
	pub fn new(concurrency_hint: usize) -> Self {
		let stripe_count = concurrency_hint.max(1).next_power_of_two();

		let stripes = (0..stripe_count)
			.map(|_| bounded(STRIPE_CAPACITY))
			.collect();

		StripedReadBuffer {
			stripes,
			mask: stripe_count - 1,
		}
	}

	fn probe(&self) -> usize {
		STRIPE_PROBE.with(|cell| {
			let mut value = cell.get();

			if value == 0 {
				let mut hasher = DefaultHasher::new();
				std::thread::current().id().hash(&mut hasher);
				value = (hasher.finish() as usize) | 1;
				cell.set(value);
			}

			value
		}) & self.mask
	}

	pub fn offer(&self, value: T) -> OfferOutcome {
		let stripe = self.probe();
		let (sender, _) = &self.stripes[stripe];

		match sender.try_send(value) {
			Ok(()) => OfferOutcome::Success,
			Err(TrySendError::Full(_)) => OfferOutcome::Full,
			Err(TrySendError::Disconnected(_)) => OfferOutcome::Failed,
		}
	}

	/// Drains every stripe, invoking `consumer` for each recorded read.
	/// Must be called under the policy lock.
	pub fn drain_to(&self, mut consumer: impl FnMut(T)) {
		for (_, receiver) in &self.stripes {
			while let Ok(value) = receiver.try_recv() {
				consumer(value);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn offer_and_drain_round_trips_values() {
		let buffer: StripedReadBuffer<u64> = StripedReadBuffer::new(4);

		for i in 0..10 {
			buffer.offer(i);
		}

		let mut seen = Vec::new();
		buffer.drain_to(|v| seen.push(v));

		seen.sort_unstable();
		assert_eq!(seen, (0..10).collect::<Vec<_>>());
	}

	#[test]
	fn full_stripe_reports_full_without_panicking() {
		let buffer: StripedReadBuffer<u64> = StripedReadBuffer::new(1);

		for i in 0..STRIPE_CAPACITY as u64 {
			assert_eq!(buffer.offer(i), OfferOutcome::Success);
		}

		assert_eq!(buffer.offer(999), OfferOutcome::Full);
	}
}
