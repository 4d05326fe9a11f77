/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use crossbeam_channel::{unbounded, Sender, Receiver};

/// A write-side task recorded for the maintenance drain. Unlike the read
/// buffer, this queue is lossless: every insert, update and removal must
/// eventually reach the policy structures exactly once.
pub enum WriteTask<T> {
	Add(T),
	Update(T),
	Remove(T),
}

/// An unbounded, lossless MPSC queue of write-side tasks. Backed by
/// `crossbeam_channel`'s unbounded variant rather than a hand-rolled
/// growable ring, matching this crate's existing channel-based pipeline.
///
/// Producers that observe sustained growth (see `len_hint`) are expected
/// to volunteer a synchronous maintenance pass rather than keep enqueuing
/// unboundedly; the queue itself never rejects a task.
pub struct WriteBuffer<T> {
	sender: Sender<WriteTask<T>>,
	receiver: Receiver<WriteTask<T>>,
}

impl<T> Default for WriteBuffer<T> {
	fn default() -> Self {
		let (sender, receiver) = unbounded();
		WriteBuffer { sender, receiver }
	}
}

impl<T> WriteBuffer<T> {
	pub fn push(&self, task: WriteTask<T>) {
		// An unbounded channel's sender never fails unless every receiver
		// has been dropped, which cannot happen while `self` is alive.
		let _ = self.sender.send(task);
	}

	#[must_use]
	pub fn len_hint(&self) -> usize {
		self.receiver.len()
	}

	/// Drains every pending task, invoking `consumer` for each. Must be
	/// called under the policy lock.
	pub fn drain_to(&self, mut consumer: impl FnMut(WriteTask<T>)) {
		while let Ok(task) = self.receiver.try_recv() {
			consumer(task);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tasks_drain_in_fifo_order() {
		let buffer: WriteBuffer<u64> = WriteBuffer::default();

		buffer.push(WriteTask::Add(1));
		buffer.push(WriteTask::Update(2));
		buffer.push(WriteTask::Remove(3));

		let mut seen = Vec::new();

		buffer.drain_to(|task| {
			seen.push(match task {
				WriteTask::Add(v) => ('A', v),
				WriteTask::Update(v) => ('U', v),
				WriteTask::Remove(v) => ('R', v),
			});
		});

		assert_eq!(seen, vec![('A', 1), ('U', 2), ('R', 3)]);
		assert_eq!(buffer.len_hint(), 0);
	}
}
