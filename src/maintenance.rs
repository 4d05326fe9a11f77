/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::CacheError;

/// Dispatches a maintenance or refresh task. The default `InlineExecutor`
/// runs the task synchronously under the caller's `try_lock`, matching
/// this crate's channel-driven worker pipeline rather than always
/// spawning a dedicated background thread for every task.
pub trait Executor: Send + Sync + 'static {
	fn execute(&self, task: Box<dyn FnOnce() + Send>) -> Result<(), CacheError>;
}

#[derive(Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
	fn execute(&self, task: Box<dyn FnOnce() + Send>) -> Result<(), CacheError> {
		task();
		Ok(())
	}
}

const IDLE: u8 = 0;
const REQUIRED: u8 = 1;
const PROCESSING_TO_IDLE: u8 = 2;
const PROCESSING_TO_REQUIRED: u8 = 3;

/// The four-state drain coordination flag described for the maintenance
/// scheduler: writes request a drain, a single winner runs it, and any
/// writes observed mid-drain force a second pass rather than being lost.
#[derive(Default)]
pub struct DrainStatus {
	state: AtomicU8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainDecision {
	/// No drain is necessary right now.
	Skip,
	/// The caller won the race and must run a drain.
	Run,
}

impl DrainStatus {
	pub fn request(&self) {
		loop {
			let current = self.state.load(Ordering::Acquire);

			let next = match current {
				IDLE => REQUIRED,
				PROCESSING_TO_IDLE => PROCESSING_TO_REQUIRED,
				_ => return,
			};

			if self.state.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire).is_ok() {
				return;
			}
		}
	}

	/// Attempts to claim the right to run a drain. Only one thread at a
	/// time may be `Run`; concurrent callers receive `Skip`.
	pub fn try_start(&self) -> DrainDecision {
		match self.state.compare_exchange(
			REQUIRED,
			PROCESSING_TO_IDLE,
			Ordering::AcqRel,
			Ordering::Acquire,
		) {
			Ok(_) => DrainDecision::Run,
			Err(_) => DrainDecision::Skip,
		}
	}

	/// Called after a drain pass completes. If another write arrived
	/// mid-drain, returns `true` to signal that another pass is required.
	pub fn finish(&self) -> bool {
		match self.state.compare_exchange(
			PROCESSING_TO_IDLE,
			IDLE,
			Ordering::AcqRel,
			Ordering::Acquire,
		) {
			Ok(_) => false,
			Err(_) => {
				self.state.store(REQUIRED, Ordering::Release);
				true
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn single_request_runs_once() {
		let status = DrainStatus::default();

		status.request();
		assert_eq!(status.try_start(), DrainDecision::Run);
		assert_eq!(status.try_start(), DrainDecision::Skip);
		assert!(!status.finish());
	}

	#[test]
	fn request_during_drain_forces_another_pass() {
		let status = DrainStatus::default();

		status.request();
		assert_eq!(status.try_start(), DrainDecision::Run);

		status.request();
		assert!(status.finish());

		assert_eq!(status.try_start(), DrainDecision::Run);
		assert!(!status.finish());
	}

	#[test]
	fn inline_executor_runs_synchronously() {
		use std::sync::atomic::AtomicBool;
		use std::sync::Arc;

		let ran = Arc::new(AtomicBool::new(false));
		let ran_clone = ran.clone();

		let executor = InlineExecutor;
		executor.execute(Box::new(move || ran_clone.store(true, Ordering::SeqCst))).unwrap();

		assert!(ran.load(Ordering::SeqCst));
	}
}
