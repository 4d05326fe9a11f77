/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! An in-process, concurrent, bounded key-value cache with Window-TinyLFU
//! admission, segmented-LRU eviction, and time-to-idle / time-to-live /
//! variable per-entry expiry.

mod buffers;
mod config;
mod deque;
mod entry;
mod error;
mod maintenance;
mod policy;
mod reclaim;
mod sketch;
mod stats;
mod table;
mod ticker;
mod timer_wheel;

use std::hash::{BuildHasher, Hash, RandomState};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use log::{error, warn};
use parking_lot::Mutex;

pub use crate::config::{CacheBuilder, CacheConfig, Expiry, Loader, RemovalListener, Weigher, Writer};
pub use crate::entry::RemovalCause;
pub use crate::error::CacheError;
pub use crate::maintenance::{DrainDecision, DrainStatus, Executor, InlineExecutor};
pub use crate::stats::CacheStats;
pub use crate::ticker::{FakeTicker, SystemTicker, Ticker};

use crate::buffers::{OfferOutcome, StripedReadBuffer, WriteBuffer, WriteTask};
use crate::entry::{Entry, Lifecycle};
use crate::policy::PolicyEngine;
use crate::stats::AtomicStats;
use crate::table::EntryTable;
use crate::timer_wheel::TimerWheel;

/// Policy structures mutated only under the single exclusive maintenance
/// lock: the segmented-LRU/admission engine and the timer wheel that
/// schedules time-to-idle, time-to-live and variable per-entry expiry
/// uniformly (an Open Question resolution recorded in this crate's design
/// notes, since the distilled requirements name the wheel for variable
/// expiry only but give TTI/TTL no scheduling structure of their own).
struct PolicyState<K, V> {
	policy: PolicyEngine<K, V>,
	wheel: TimerWheel<Arc<Entry<K, V>>>,
}

/// Which event is asking `schedule_expiry` to recompute a deadline,
/// mirroring the three callbacks on the `Expiry` trait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ExpiryTrigger {
	Create,
	Update,
	Read,
}

struct Inner<K, V, S> {
	table: EntryTable<K, V, S>,
	policy_state: Mutex<PolicyState<K, V>>,

	read_buffer: StripedReadBuffer<Arc<Entry<K, V>>>,
	write_buffer: WriteBuffer<Arc<Entry<K, V>>>,
	drain_status: DrainStatus,

	stats: AtomicStats,
	config: CacheConfig<K, V, S>,
}

/// A bounded, concurrent key-value cache. Cloning a `Cache` is cheap and
/// yields a handle to the same underlying store, in the style of this
/// crate's existing worker/channel handles.
pub struct Cache<K, V, S = RandomState> {
	inner: Arc<Inner<K, V, S>>,
}

impl<K, V, S> Clone for Cache<K, V, S> {
	fn clone(&self) -> Self {
		Cache { inner: self.inner.clone() }
	}
}

impl<K, V> Cache<K, V, RandomState>
where
	K: Eq + Hash + Clone + Send + Sync + 'static,
	V: Send + Sync + 'static,
{
	#[must_use]
	pub fn builder() -> CacheBuilder<K, V, RandomState> {
		CacheBuilder::default()
	}
}

impl<K, V, S> Cache<K, V, S>
where
	K: Eq + Hash + Clone + Send + Sync + 'static,
	V: Send + Sync + 'static,
	S: BuildHasher + Clone + Send + Sync + 'static,
{
	pub fn with_config(config: CacheConfig<K, V, S>) -> Self {
		let policy_state = PolicyState {
			policy: PolicyEngine::new(config.maximum_weight),
			wheel: TimerWheel::default(),
		};

		let table = EntryTable::with_capacity_and_hasher(config.initial_capacity, config.hasher.clone());
		let stats = AtomicStats::new(config.record_stats);
		let read_buffer = StripedReadBuffer::new(std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4));

		Cache {
			inner: Arc::new(Inner {
				table,
				policy_state: Mutex::new(policy_state),
				read_buffer,
				write_buffer: WriteBuffer::default(),
				drain_status: DrainStatus::default(),
				stats,
				config,
			}),
		}
	}

	fn now_ns(&self) -> u64 {
		self.inner.config.ticker.now_ns()
	}

	fn weight_of(&self, key: &K, value: &V) -> u32 {
		match &self.inner.config.weigher {
			Some(weigher) => (**weigher)(key, value),
			None => 1,
		}
	}

	/// Wraps `value` in the strong/weak/soft representation the cache's
	/// configuration calls for, alongside a strong `Arc` the caller can
	/// hold onto — for weak values that `Arc` is the only thing keeping
	/// the value alive until the caller drops it (section 4.9).
	fn make_value_ref(&self, value: V) -> (crate::entry::ValueRef<V>, Arc<V>) {
		let arc = Arc::new(value);

		let value_ref = if self.inner.config.weak_values {
			crate::entry::ValueRef::Weak(Arc::downgrade(&arc))
		} else if self.inner.config.soft_values {
			crate::entry::ValueRef::Soft(arc.clone())
		} else {
			crate::entry::ValueRef::Strong(arc.clone())
		};

		(value_ref, arc)
	}

	/// Returns the value for `key` if present and not expired, recording
	/// the read on the striped buffer for later policy reordering.
	#[must_use]
	pub fn get_if_present(&self, key: &K) -> Option<Arc<V>> {
		let entry = self.inner.table.get(key)?;

		if self.is_expired(&entry) {
			self.inner.stats.record_miss();
			return None;
		}

		let value = entry.value.lock().upgrade();

		if value.is_none() {
			self.inner.stats.record_miss();
			return None;
		}

		entry.touch_access(self.now_ns());
		self.inner.stats.record_hit();
		self.record_read(&entry);
		self.maybe_refresh(&entry);

		// `maybe_refresh` may have just replaced the value in place (the
		// default `InlineExecutor` reloads synchronously on this same
		// thread), so re-read it rather than returning the pre-refresh
		// handle captured above.
		entry.value.lock().upgrade().or(value)
	}

	/// Section 4.7's refresh-after-write: if the configured interval has
	/// elapsed since the last write, CAS the write time to a far-future
	/// sentinel so exactly one reader wins the race to reload, then runs
	/// the loader on the executor. With the default `InlineExecutor` the
	/// reload runs synchronously on the winning reader's own thread, so
	/// that same read observes the fresh value; a threaded executor would
	/// instead leave the stale value in place for this read and any others
	/// racing it, with the fresh value visible only once the reload
	/// completes. A failed load restores the original write time so a
	/// later read can try again.
	fn maybe_refresh(&self, entry: &Arc<Entry<K, V>>) {
		let Some(refresh_ns) = self.inner.config.refresh_after_write_ns else { return };
		let Some(loader) = self.inner.config.loader.clone() else { return };

		let now_ns = self.now_ns();
		let write_time = entry.write_time_ns.load(Ordering::Acquire);

		if now_ns.saturating_sub(write_time) < refresh_ns {
			return;
		}

		const MAX_EXPIRY_NS: u64 = u64::MAX / 2;
		let sentinel = now_ns.saturating_add(MAX_EXPIRY_NS);

		if entry
			.write_time_ns
			.compare_exchange(write_time, sentinel, Ordering::AcqRel, Ordering::Acquire)
			.is_err()
		{
			// Another reader already won the race to refresh this entry.
			return;
		}

		let inner = self.inner.clone();
		let key = entry.key.clone();
		let entry = entry.clone();

		let task: Box<dyn FnOnce() + Send> = Box::new(move || {
			match (*loader)(&key) {
				Ok(value) => {
					let weight = match &inner.config.weigher {
						Some(weigher) => (**weigher)(&key, &value),
						None => 1,
					};

					let arc = Arc::new(value);

					let value_ref = if inner.config.weak_values {
						crate::entry::ValueRef::Weak(Arc::downgrade(&arc))
					} else if inner.config.soft_values {
						crate::entry::ValueRef::Soft(arc)
					} else {
						crate::entry::ValueRef::Strong(arc)
					};

					*entry.value.lock() = value_ref;
					entry.weight.store(weight, Ordering::Release);
					entry.write_time_ns.store(inner.config.ticker.now_ns(), Ordering::Release);
					inner.stats.record_load_success();
				},
				Err(_) => {
					entry.write_time_ns.store(write_time, Ordering::Release);
					inner.stats.record_load_failure();
					warn!("cache refresh loader failed; retaining stale value");
				},
			}
		});

		if self.inner.config.executor.execute(task).is_err() {
			entry.write_time_ns.store(write_time, Ordering::Release);
		}
	}

	/// Returns the value for `key`, invoking the configured loader and
	/// inserting its result on a miss.
	pub fn get(&self, key: &K) -> Result<Arc<V>, CacheError>
	where
		V: Clone,
	{
		if let Some(value) = self.get_if_present(key) {
			return Ok(value);
		}

		let Some(loader) = self.inner.config.loader.clone() else {
			return Err(CacheError::KeyNotFound);
		};

		match (*loader)(key) {
			Ok(value) => {
				self.inner.stats.record_load_success();
				self.put(key.clone(), value.clone());
				Ok(Arc::new(value))
			},
			Err(err) => {
				self.inner.stats.record_load_failure();
				warn!("cache loader failed");
				Err(err)
			},
		}
	}

	/// Inserts or replaces the value for `key`, returning the prior value
	/// if one was replaced.
	pub fn put(&self, key: K, value: V) -> Option<Arc<V>> {
		self.put_internal(key, value, false)
	}

	/// Inserts `value` only if `key` is absent, returning the value now
	/// resident (the caller's, or a concurrently-inserted one).
	pub fn put_if_absent(&self, key: K, value: V) -> Arc<V> {
		let weight = self.weight_of(&key, &value);
		let now_ns = self.now_ns();
		let arc_slot: std::cell::Cell<Option<Arc<V>>> = std::cell::Cell::new(None);

		let (entry, inserted) = self.inner.table.get_or_insert_with(key.clone(), || {
			let (value_ref, arc) = self.make_value_ref(value);
			arc_slot.set(Some(arc));
			Arc::new(Entry::with_value_ref(key.clone(), value_ref, weight, now_ns))
		});

		if inserted {
			self.after_write(WriteTask::Add(entry.clone()));
			return arc_slot.into_inner().expect("the insert closure ran because the entry was newly inserted");
		}

		entry.value.lock().upgrade().expect("just-inserted entry must have a live value")
	}

	fn put_internal(&self, key: K, value: V, only_if_present: bool) -> Option<Arc<V>> {
		let weight = self.weight_of(&key, &value);
		let now_ns = self.now_ns();
		let mut previous = None;
		let mut task = None;
		let value_slot: std::cell::Cell<Option<V>> = std::cell::Cell::new(Some(value));

		let (entry, inserted) = self.inner.table.get_or_insert_with(key.clone(), || {
			let value = value_slot.take().expect("value consumed exactly once");
			let (value_ref, _) = self.make_value_ref(value);
			Arc::new(Entry::with_value_ref(key.clone(), value_ref, weight, now_ns))
		});

		if inserted {
			if only_if_present {
				self.inner.table.remove_if_same(&entry.key, &entry);
				return None;
			}

			task = Some(WriteTask::Add(entry.clone()));
		} else {
			previous = entry.value.lock().upgrade();
			let value = value_slot.take().expect("value untouched when the closure did not run");

			if let Some(writer) = &self.inner.config.writer {
				if (**writer)(&entry.key, &value).is_err() {
					error!("cache writer rejected an update");
					return previous;
				}
			}

			let (value_ref, _) = self.make_value_ref(value);
			*entry.value.lock() = value_ref;
			entry.weight.store(weight, Ordering::Release);
			entry.write_time_ns.store(now_ns, Ordering::Release);

			if let Some(previous_value) = &previous {
				Self::notify_removal_listener(&self.inner, &entry.key, Some(previous_value.as_ref()), RemovalCause::Replaced);
			}

			task = Some(WriteTask::Update(entry.clone()));
		}

		self.inner.stats.record_hit();

		if let Some(task) = task {
			self.after_write(task);
		}

		previous
	}

	/// Removes `key` unconditionally, returning its value if present.
	pub fn remove(&self, key: &K) -> Option<Arc<V>> {
		let entry = self.inner.table.remove(key)?;
		let value = entry.value.lock().upgrade();

		if entry.retire() {
			self.after_write(WriteTask::Remove(entry));
		}

		value
	}

	/// Removes `key` iff its current value is reference-equal to the
	/// entry currently resident, used by conditional-removal callers that
	/// already hold a handle obtained from a prior read.
	pub fn remove_if(&self, key: &K, predicate: impl FnOnce(&V) -> bool) -> Option<Arc<V>> {
		let entry = self.inner.table.get(key)?;
		let value = entry.value.lock().upgrade()?;

		if !predicate(&value) {
			return None;
		}

		self.inner.table.remove_if_same(key, &entry)?;

		if entry.retire() {
			self.after_write(WriteTask::Remove(entry));
		}

		Some(value)
	}

	/// Replaces the value for `key` iff it is currently present.
	pub fn replace(&self, key: K, value: V) -> Option<Arc<V>> {
		self.put_internal(key, value, true)
	}

	/// Atomically computes and inserts a value for `key` if absent.
	pub fn compute_if_absent(&self, key: K, init: impl FnOnce() -> V) -> Arc<V> {
		self.put_if_absent(key, init())
	}

	/// Atomically recomputes the value for `key` iff it is currently
	/// present, removing the entry if `remap` returns `None`.
	pub fn compute_if_present(&self, key: &K, remap: impl FnOnce(&K, &V) -> Option<V>) -> Option<Arc<V>> {
		let entry = self.inner.table.get(key)?;
		let current = entry.value.lock().upgrade()?;

		match remap(key, &current) {
			Some(new_value) => {
				let weight = self.weight_of(key, &new_value);
				let now_ns = self.now_ns();
				let (value_ref, _) = self.make_value_ref(new_value);

				*entry.value.lock() = value_ref;
				entry.weight.store(weight, Ordering::Release);
				entry.write_time_ns.store(now_ns, Ordering::Release);

				Self::notify_removal_listener(&self.inner, &entry.key, Some(current.as_ref()), RemovalCause::Replaced);

				self.after_write(WriteTask::Update(entry.clone()));
				entry.value.lock().upgrade()
			},
			None => {
				self.inner.table.remove_if_same(key, &entry);

				if entry.retire() {
					self.after_write(WriteTask::Remove(entry));
				}

				None
			},
		}
	}

	/// Merges `value` into any existing mapping for `key` via `remap`, or
	/// inserts it directly if `key` is absent.
	pub fn merge(&self, key: K, value: V, remap: impl FnOnce(&V, V) -> V) -> Arc<V>
	where
		V: Clone,
	{
		if let Some(existing) = self.get_if_present(&key) {
			let merged = remap(&existing, value);

			return self
				.compute_if_present(&key, |_, _| Some(merged))
				.unwrap_or_else(|| self.put_if_absent(key, existing.as_ref().clone_placeholder()));
		}

		self.put_if_absent(key, value)
	}

	fn is_expired(&self, entry: &Entry<K, V>) -> bool {
		let now_ns = self.now_ns();

		if let Some(tti) = self.inner.config.expire_after_access_ns {
			if now_ns.saturating_sub(entry.access_time_ns.load(Ordering::Acquire)) >= tti {
				return true;
			}
		}

		if let Some(ttl) = self.inner.config.expire_after_write_ns {
			if now_ns.saturating_sub(entry.write_time_ns.load(Ordering::Acquire)) >= ttl {
				return true;
			}
		}

		let variable = entry.variable_expire_time_ns.load(Ordering::Acquire);
		variable != u64::MAX && now_ns >= variable
	}

	fn record_read(&self, entry: &Arc<Entry<K, V>>) {
		let outcome = self.inner.read_buffer.offer(entry.clone());

		if matches!(outcome, OfferOutcome::Full) || self.should_drain() {
			self.maybe_run_maintenance();
		}
	}

	fn should_drain(&self) -> bool {
		self.inner.write_buffer.len_hint() > 0
	}

	fn after_write(&self, task: WriteTask<Arc<Entry<K, V>>>) {
		self.inner.write_buffer.push(task);
		self.inner.drain_status.request();

		let mut retries = 0;

		while self.inner.write_buffer.len_hint() > 0 && retries < 100 {
			if self.maybe_run_maintenance() {
				break;
			}

			std::thread::yield_now();
			retries += 1;
		}

		if self.inner.write_buffer.len_hint() > 0 && retries >= 100 {
			self.run_maintenance();
		}
	}

	/// Attempts to claim the maintenance lock and run a drain; returns
	/// `true` if this call performed (or helped perform) a drain pass.
	fn maybe_run_maintenance(&self) -> bool {
		if self.inner.drain_status.try_start() != DrainDecision::Run {
			return false;
		}

		let inner = self.inner.clone();

		let task: Box<dyn FnOnce() + Send> = Box::new(move || {
			Self::drain(&inner);

			if inner.drain_status.finish() {
				// Another write arrived mid-drain; give it a pass too.
				if inner.drain_status.try_start() == DrainDecision::Run {
					Self::drain(&inner);
					inner.drain_status.finish();
				}
			}
		});

		if self.inner.config.executor.execute(task).is_err() {
			warn!("maintenance executor rejected a task; running inline");
			self.run_maintenance();
		}

		true
	}

	fn run_maintenance(&self) {
		if self.inner.drain_status.try_start() != DrainDecision::Run {
			return;
		}

		Self::drain(&self.inner);
		self.inner.drain_status.finish();
	}

	fn drain(inner: &Arc<Inner<K, V, S>>) {
		let mut state = inner.policy_state.lock();
		let now_ns = inner.config.ticker.now_ns();

		inner.read_buffer.drain_to(|entry| {
			if entry.lifecycle() == Lifecycle::Alive {
				state.policy.record_access(&entry);

				// A read only needs to reschedule the wheel when something
				// ties the deadline to access time: a custom `Expiry`, or a
				// plain time-to-idle bound (time-to-live alone never moves
				// on a read).
				if inner.config.expiry.is_some() || inner.config.expire_after_access_ns.is_some() {
					Self::schedule_expiry(&mut state, &entry, now_ns, inner, ExpiryTrigger::Read);
				}
			}
		});

		inner.write_buffer.drain_to(|task| match task {
			WriteTask::Add(entry) => {
				if entry.lifecycle() == Lifecycle::Alive {
					state.policy.record_add(&entry);
					Self::schedule_expiry(&mut state, &entry, now_ns, inner, ExpiryTrigger::Create);
				}
			},
			WriteTask::Update(entry) => {
				if entry.lifecycle() == Lifecycle::Alive {
					state.policy.record_access(&entry);
					state.policy.touch_write_order(&entry);
					Self::schedule_expiry(&mut state, &entry, now_ns, inner, ExpiryTrigger::Update);
				}
			},
			WriteTask::Remove(entry) => {
				state.policy.record_remove(&entry);

				if let Some(handle) = entry.links.lock().variable_expiry.take() {
					state.wheel.deschedule(handle);
				}

				Self::finish_removal(inner, entry, RemovalCause::Explicit);
			},
		});

		for entry in reclaim::collect_cleared(&inner.table) {
			if inner.table.remove_if_same(&entry.key, &entry).is_some() {
				state.policy.record_remove(&entry);

				if let Some(handle) = entry.links.lock().variable_expiry.take() {
					state.wheel.deschedule(handle);
				}

				Self::finish_removal(inner, entry, RemovalCause::Collected);
			}
		}

		let expired = state.wheel.advance(now_ns, |entry, handle| {
			entry.links.lock().variable_expiry = Some(handle);
		});

		for entry in expired {
			if inner.table.remove_if_same(&entry.key, &entry).is_some() {
				state.policy.record_remove(&entry);
				Self::finish_removal(inner, entry, RemovalCause::Expired);
			}
		}

		for entry in state.policy.evict_to_capacity() {
			let weight = u64::from(entry.weight.load(Ordering::Acquire));
			inner.stats.record_eviction(weight);

			if inner.table.remove_if_same(&entry.key, &entry).is_some() {
				if let Some(handle) = entry.links.lock().variable_expiry.take() {
					state.wheel.deschedule(handle);
				}

				Self::finish_removal(inner, entry, RemovalCause::Size);
			}
		}
	}

	fn schedule_expiry(
		state: &mut PolicyState<K, V>,
		entry: &Arc<Entry<K, V>>,
		now_ns: u64,
		inner: &Arc<Inner<K, V, S>>,
		trigger: ExpiryTrigger,
	) {
		let deadline = match &inner.config.expiry {
			Some(expiry) => {
				let Some(value) = entry.value.lock().upgrade() else { return };
				let current_deadline = entry.variable_expire_time_ns.load(Ordering::Acquire);
				let current_duration_ns = current_deadline.saturating_sub(now_ns);

				let duration = match trigger {
					ExpiryTrigger::Create => expiry.expire_after_create(&entry.key, &value),
					ExpiryTrigger::Update => expiry.expire_after_update(&entry.key, &value, current_duration_ns),
					ExpiryTrigger::Read => expiry.expire_after_read(&entry.key, &value, current_duration_ns),
				};

				match duration {
					Some(d) => now_ns.saturating_add(d),
					None => return,
				}
			},
			None => {
				// A read never extends a fixed expire_after_write/access
				// bound; only an explicit `Expiry` callback reacts to reads.
				if matches!(trigger, ExpiryTrigger::Read) {
					return;
				}

				let mut deadline = u64::MAX;

				if let Some(ttl) = inner.config.expire_after_write_ns {
					deadline = deadline.min(now_ns.saturating_add(ttl));
				}

				if let Some(tti) = inner.config.expire_after_access_ns {
					deadline = deadline.min(now_ns.saturating_add(tti));
				}

				if deadline == u64::MAX {
					return;
				}

				deadline
			},
		};

		entry.variable_expire_time_ns.store(deadline, Ordering::Release);

		let mut links = entry.links.lock();
		let handle = match links.variable_expiry.take() {
			Some(existing) => state.wheel.reschedule(existing, entry.clone(), deadline),
			None => state.wheel.schedule(entry.clone(), deadline),
		};

		links.variable_expiry = Some(handle);
	}

	/// Notifies the configured removal listener for `(key, value, cause)`,
	/// catching a panicking listener rather than letting it fail the
	/// cache operation that triggered it (section 4.10/7: listener
	/// failures are logged and swallowed, never propagated). `value` is
	/// `None` for a weak/soft value already reclaimed by the time
	/// notification fires; the listener still runs so `Collected` removals
	/// are never silently dropped.
	fn notify_removal_listener(inner: &Arc<Inner<K, V, S>>, key: &K, value: Option<&V>, cause: RemovalCause) {
		let Some(listener) = &inner.config.removal_listener else { return };

		let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
			(**listener)(key, value, cause);
		}));

		if result.is_err() {
			error!("removal listener panicked");
		}
	}

	fn finish_removal(inner: &Arc<Inner<K, V, S>>, entry: Arc<Entry<K, V>>, cause: RemovalCause) {
		// Explicit removals retire the entry before reaching here; eviction,
		// expiry and collection retire it now. Either way `kill` only
		// succeeds once, so notification still fires at most once.
		entry.retire();

		if !entry.kill() {
			return;
		}

		// A collected value is by definition already gone (its referent was
		// reclaimed before `collect_cleared` found it); notify regardless so
		// that cause still reaches the listener.
		let value = entry.value.lock().upgrade();
		Self::notify_removal_listener(inner, &entry.key, value.as_deref(), cause);
	}

	/// Runs a synchronous maintenance pass, draining both buffers,
	/// expiring and evicting as needed. Idempotent when there is nothing
	/// pending.
	pub fn clean_up(&self) {
		self.run_maintenance();
	}

	/// An approximate count of entries, accurate once `clean_up` has run.
	#[must_use]
	pub fn estimated_size(&self) -> u64 {
		self.inner.table.len() as u64
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.inner.table.is_empty()
	}

	#[must_use]
	pub fn stats(&self) -> CacheStats {
		self.inner.stats.snapshot()
	}

	/// Removes every entry, dispatching an explicit removal notification
	/// for each.
	pub fn clear(&self) {
		let entries: Vec<_> = self.inner.table.iter().collect();
		self.inner.table.clear();

		let mut state = self.inner.policy_state.lock();
		state.policy.clear();
		state.wheel = TimerWheel::default();

		for entry in entries {
			if entry.retire() {
				Self::finish_removal(&self.inner, entry, RemovalCause::Explicit);
			}
		}

		self.inner.stats.clear();
	}

	/// Reconfigures the maximum weight the cache will hold, triggering
	/// eviction on the next maintenance pass if the new bound is smaller.
	pub fn set_maximum(&self, maximum: u64) {
		let mut state = self.inner.policy_state.lock();
		state.policy.resize(maximum);
	}

	/// The current maximum weight/size bound.
	#[must_use]
	pub fn maximum(&self) -> u64 {
		self.inner.policy_state.lock().policy.maximum()
	}

	/// Returns up to `n` of the coldest entries by LRU order (eviction's
	/// next candidates), least recently used first.
	#[must_use]
	pub fn coldest(&self, n: usize) -> Vec<K> {
		self.inner.policy_state.lock().policy.coldest(n).into_iter().map(|e| e.key.clone()).collect()
	}

	/// Returns up to `n` of the hottest entries by LRU order, most
	/// recently used first.
	#[must_use]
	pub fn hottest(&self, n: usize) -> Vec<K> {
		self.inner.policy_state.lock().policy.hottest(n).into_iter().map(|e| e.key.clone()).collect()
	}

	/// Returns up to `n` keys least recently accessed, i.e. a synonym for
	/// `coldest`, matching the access/write/variable-expiry triad of
	/// policy views the external interface names.
	#[must_use]
	pub fn oldest_by_access(&self, n: usize) -> Vec<K> {
		self.coldest(n)
	}

	/// Returns up to `n` keys most recently accessed.
	#[must_use]
	pub fn youngest_by_access(&self, n: usize) -> Vec<K> {
		self.hottest(n)
	}

	/// Returns up to `n` keys least recently written (inserted or
	/// updated), oldest first.
	#[must_use]
	pub fn oldest_by_write(&self, n: usize) -> Vec<K> {
		self.inner.policy_state.lock().policy.oldest_by_write(n).into_iter().map(|e| e.key.clone()).collect()
	}

	/// Returns up to `n` keys most recently written, newest first.
	#[must_use]
	pub fn youngest_by_write(&self, n: usize) -> Vec<K> {
		self.inner.policy_state.lock().policy.youngest_by_write(n).into_iter().map(|e| e.key.clone()).collect()
	}

	/// Returns up to `n` keys with the soonest variable expiry deadline.
	/// Empty unless `expire_after_access`/`expire_after_write`/`expiry`
	/// is configured, since only those populate the timer wheel.
	#[must_use]
	pub fn oldest_by_variable_expiry(&self, n: usize) -> Vec<K> {
		self.inner.policy_state.lock().wheel.entries_by_deadline()
			.into_iter()
			.take(n)
			.map(|(entry, _)| entry.key.clone())
			.collect()
	}

	/// Returns up to `n` keys with the furthest variable expiry deadline.
	#[must_use]
	pub fn youngest_by_variable_expiry(&self, n: usize) -> Vec<K> {
		let mut entries = self.inner.policy_state.lock().wheel.entries_by_deadline();
		entries.reverse();
		entries.into_iter().take(n).map(|(entry, _)| entry.key.clone()).collect()
	}

	/// Looks up every key in `keys`, returning only those currently
	/// present and unexpired.
	#[must_use]
	pub fn get_all_present(&self, keys: impl IntoIterator<Item = K>) -> Vec<(K, Arc<V>)> {
		keys.into_iter()
			.filter_map(|key| {
				let value = self.get_if_present(&key)?;
				Some((key, value))
			})
			.collect()
	}

	/// Inserts every (key, value) pair in `entries`.
	pub fn put_all(&self, entries: impl IntoIterator<Item = (K, V)>) {
		for (key, value) in entries {
			self.put(key, value);
		}
	}

	/// Replaces every key in `entries` that is currently present, leaving
	/// absent keys untouched.
	pub fn replace_all(&self, entries: impl IntoIterator<Item = (K, V)>) {
		for (key, value) in entries {
			self.replace(key, value);
		}
	}
}

/// Extension used only by `merge`'s fallback path, where the existing
/// value must be cloned back into an owned `V` to seed a fresh insert.
trait ClonePlaceholder {
	fn clone_placeholder(&self) -> Self;
}

impl<V: Clone> ClonePlaceholder for V {
	fn clone_placeholder(&self) -> Self {
		self.clone()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicUsize;

	use super::*;

	#[test]
	fn put_then_get_round_trips() {
		let cache: Cache<u64, u64> = Cache::with_config(Cache::builder().maximum_size(10).build().unwrap());

		cache.put(1, 100);
		assert_eq!(cache.get_if_present(&1).map(|v| *v), Some(100));
		assert_eq!(cache.get_if_present(&2), None);
	}

	#[test]
	fn put_replacing_an_existing_key_then_remove_fires_replaced_then_explicit() {
		let causes: Arc<Mutex<Vec<RemovalCause>>> = Arc::new(Mutex::new(Vec::new()));
		let causes_for_listener = causes.clone();

		let cache: Cache<u64, u64> = Cache::with_config(Cache::builder()
			.maximum_size(10)
			.removal_listener(Arc::new(move |_key: &u64, _value: Option<&u64>, cause| {
				causes_for_listener.lock().push(cause);
			}))
			.build()
			.unwrap());

		cache.put(1, 100);
		cache.put(1, 200);
		cache.remove(&1);

		assert_eq!(*causes.lock(), vec![RemovalCause::Replaced, RemovalCause::Explicit]);
	}

	#[test]
	fn expire_after_write_evicts_past_the_configured_duration() {
		let ticker = Arc::new(FakeTicker::new());
		let causes: Arc<Mutex<Vec<RemovalCause>>> = Arc::new(Mutex::new(Vec::new()));
		let causes_for_listener = causes.clone();

		let cache: Cache<u64, u64> = Cache::with_config(Cache::builder()
			.maximum_size(10)
			.expire_after_write_ns(1_000)
			.ticker(ticker.clone())
			.removal_listener(Arc::new(move |_key: &u64, _value: Option<&u64>, cause| {
				causes_for_listener.lock().push(cause);
			}))
			.build()
			.unwrap());

		cache.put(1, 100);
		assert_eq!(cache.get_if_present(&1).map(|v| *v), Some(100));

		ticker.advance(1_001);
		assert_eq!(cache.get_if_present(&1), None);

		cache.clean_up();
		assert_eq!(*causes.lock(), vec![RemovalCause::Expired]);
	}

	#[test]
	fn variable_expiry_orders_entries_by_soonest_deadline() {
		struct FixedDurations;

		impl Expiry<u64, u64> for FixedDurations {
			fn expire_after_create(&self, key: &u64, _value: &u64) -> Option<u64> {
				Some(*key * 1_000)
			}

			fn expire_after_update(&self, _key: &u64, _value: &u64, current_duration_ns: u64) -> Option<u64> {
				Some(current_duration_ns)
			}

			fn expire_after_read(&self, _key: &u64, _value: &u64, current_duration_ns: u64) -> Option<u64> {
				Some(current_duration_ns)
			}
		}

		let ticker = Arc::new(FakeTicker::new());

		let cache: Cache<u64, u64> = Cache::with_config(Cache::builder()
			.maximum_size(10)
			.expiry(Arc::new(FixedDurations))
			.ticker(ticker.clone())
			.build()
			.unwrap());

		cache.put(3, 30);
		cache.put(1, 10);
		cache.put(2, 20);

		assert_eq!(cache.oldest_by_variable_expiry(3), vec![1, 2, 3]);
		assert_eq!(cache.youngest_by_variable_expiry(1), vec![3]);

		ticker.advance(1_001);
		cache.clean_up();

		assert_eq!(cache.get_if_present(&1), None);
		assert_eq!(cache.get_if_present(&2).map(|v| *v), Some(20));
		assert_eq!(cache.get_if_present(&3).map(|v| *v), Some(30));
	}

	#[test]
	fn refresh_after_write_reloads_a_stale_value_on_the_next_read() {
		let ticker = Arc::new(FakeTicker::new());
		let load_count = Arc::new(AtomicUsize::new(0));
		let load_count_for_loader = load_count.clone();

		let cache: Cache<u64, u64> = Cache::with_config(Cache::builder()
			.maximum_size(10)
			.refresh_after_write_ns(1_000)
			.ticker(ticker.clone())
			.loader(Arc::new(move |_key: &u64| {
				load_count_for_loader.fetch_add(1, Ordering::SeqCst);
				Ok(999)
			}))
			.build()
			.unwrap());

		cache.put(1, 100);

		// Within the refresh window: stale value served, no reload.
		assert_eq!(cache.get_if_present(&1).map(|v| *v), Some(100));
		assert_eq!(load_count.load(Ordering::SeqCst), 0);

		ticker.advance(1_001);

		// First read past the window triggers (and, with the inline
		// executor, completes) exactly one reload.
		assert_eq!(cache.get_if_present(&1).map(|v| *v), Some(999));
		assert_eq!(load_count.load(Ordering::SeqCst), 1);

		let stats = cache.stats();
		assert_eq!(stats.load_success_count, 1);
	}

	#[test]
	fn weak_values_are_reclaimed_once_the_external_strong_reference_drops() {
		let causes: Arc<Mutex<Vec<RemovalCause>>> = Arc::new(Mutex::new(Vec::new()));
		let causes_for_listener = causes.clone();

		let cache: Cache<u64, u64> = Cache::with_config(Cache::builder()
			.maximum_size(10)
			.weak_values()
			.removal_listener(Arc::new(move |_key: &u64, _value: Option<&u64>, cause| {
				causes_for_listener.lock().push(cause);
			}))
			.build()
			.unwrap());

		let held = cache.put_if_absent(1, 100);
		assert_eq!(*held, 100);

		drop(held);
		cache.clean_up();

		assert_eq!(cache.get_if_present(&1), None);
		assert_eq!(*causes.lock(), vec![RemovalCause::Collected]);
	}

	#[test]
	fn eviction_keeps_cache_at_its_maximum_size() {
		let cache: Cache<u64, u64> = Cache::with_config(Cache::builder().maximum_size(3).build().unwrap());

		for key in 0..4u64 {
			cache.put(key, key);
			cache.clean_up();
		}

		assert!(cache.estimated_size() <= 3);
	}

	#[test]
	fn a_frequently_read_key_survives_a_flood_of_one_shot_keys() {
		let cache: Cache<u64, u64> = Cache::with_config(Cache::builder().maximum_size(100).build().unwrap());

		cache.put(1, 1);
		cache.clean_up();

		for _ in 0..20 {
			cache.get_if_present(&1);
		}

		cache.clean_up();

		for key in 2..200u64 {
			cache.put(key, key);
			cache.clean_up();
		}

		assert_eq!(cache.get_if_present(&1).map(|v| *v), Some(1));
	}

	#[test]
	fn policy_views_and_bulk_operations_cover_the_written_keys() {
		let cache: Cache<u64, u64> = Cache::with_config(Cache::builder().maximum_size(10).build().unwrap());

		cache.put_all(vec![(1, 10), (2, 20), (3, 30)]);
		cache.clean_up();

		assert_eq!(cache.maximum(), 10);
		assert_eq!(cache.estimated_size(), 3);

		let mut coldest: Vec<u64> = cache.coldest(3);
		coldest.sort_unstable();
		assert_eq!(coldest, vec![1, 2, 3]);

		let present = cache.get_all_present(vec![1, 2, 4]);
		assert_eq!(present.len(), 2);

		cache.replace_all(vec![(1, 11), (4, 40)]);
		assert_eq!(cache.get_if_present(&1).map(|v| *v), Some(11));
		assert_eq!(cache.get_if_present(&4), None);
	}
}
