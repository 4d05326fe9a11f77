/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::sync::Arc;
use std::marker::PhantomData;
use std::hash::{BuildHasher, RandomState};

use crate::entry::RemovalCause;
use crate::error::CacheError;
use crate::maintenance::{Executor, InlineExecutor};
use crate::ticker::{Ticker, SystemTicker};

pub type Weigher<K, V> = Arc<dyn Fn(&K, &V) -> u32 + Send + Sync>;
/// `value` is `None` when the entry's value had already been reclaimed by
/// the time notification fired — the only case today is a weak/soft value
/// collected before maintenance could observe it (`RemovalCause::Collected`).
pub type RemovalListener<K, V> = Arc<dyn Fn(&K, Option<&V>, RemovalCause) + Send + Sync>;
pub type Writer<K, V> = Arc<dyn Fn(&K, &V) -> Result<(), CacheError> + Send + Sync>;
pub type Loader<K, V> = Arc<dyn Fn(&K) -> Result<V, CacheError> + Send + Sync>;

/// Per-entry expiry callbacks, evaluated relative to the event that
/// triggers them. Returning `None` leaves the entry's current deadline
/// untouched.
pub trait Expiry<K, V>: Send + Sync + 'static {
	fn expire_after_create(&self, key: &K, value: &V) -> Option<u64>;
	fn expire_after_update(&self, key: &K, value: &V, current_duration_ns: u64) -> Option<u64>;
	fn expire_after_read(&self, key: &K, value: &V, current_duration_ns: u64) -> Option<u64>;
}

pub struct CacheConfig<K, V, S = RandomState> {
	pub maximum_weight: u64,
	pub initial_capacity: usize,
	pub hasher: S,

	pub weigher: Option<Weigher<K, V>>,
	pub expire_after_access_ns: Option<u64>,
	pub expire_after_write_ns: Option<u64>,
	pub refresh_after_write_ns: Option<u64>,
	pub expiry: Option<Arc<dyn Expiry<K, V>>>,

	pub weak_keys: bool,
	pub weak_values: bool,
	pub soft_values: bool,

	pub record_stats: bool,
	pub removal_listener: Option<RemovalListener<K, V>>,
	pub writer: Option<Writer<K, V>>,
	pub loader: Option<Loader<K, V>>,

	pub executor: Arc<dyn Executor>,
	pub ticker: Arc<dyn Ticker>,
}

/// Consumed once at construction to resolve the capability flags a cache
/// instance carries for its lifetime.
pub struct CacheBuilder<K, V, S = RandomState> {
	maximum_weight: Option<u64>,
	initial_capacity: usize,
	hasher: S,

	weigher: Option<Weigher<K, V>>,
	expire_after_access_ns: Option<u64>,
	expire_after_write_ns: Option<u64>,
	refresh_after_write_ns: Option<u64>,
	expiry: Option<Arc<dyn Expiry<K, V>>>,

	weak_keys: bool,
	weak_values: bool,
	soft_values: bool,

	record_stats: bool,
	removal_listener: Option<RemovalListener<K, V>>,
	writer: Option<Writer<K, V>>,
	loader: Option<Loader<K, V>>,

	executor: Arc<dyn Executor>,
	ticker: Arc<dyn Ticker>,

	_marker: PhantomData<(K, V)>,
}

impl<K, V> Default for CacheBuilder<K, V, RandomState> {
	fn default() -> Self {
		CacheBuilder {
			maximum_weight: None,
			initial_capacity: 16,
			hasher: RandomState::default(),

			weigher: None,
			expire_after_access_ns: None,
			expire_after_write_ns: None,
			refresh_after_write_ns: None,
			expiry: None,

			weak_keys: false,
			weak_values: false,
			soft_values: false,

			record_stats: false,
			removal_listener: None,
			writer: None,
			loader: None,

			executor: Arc::new(InlineExecutor),
			ticker: Arc::new(SystemTicker),

			_marker: PhantomData,
		}
	}
}

impl<K, V, S> CacheBuilder<K, V, S>
where
	S: BuildHasher,
{
	#[must_use]
	pub fn maximum_size(mut self, size: u64) -> Self {
		self.maximum_weight = Some(size);
		self
	}

	#[must_use]
	pub fn maximum_weight(mut self, weight: u64, weigher: Weigher<K, V>) -> Self {
		self.maximum_weight = Some(weight);
		self.weigher = Some(weigher);
		self
	}

	#[must_use]
	pub fn initial_capacity(mut self, capacity: usize) -> Self {
		self.initial_capacity = capacity;
		self
	}

	#[must_use]
	pub fn hasher<S2: BuildHasher>(self, hasher: S2) -> CacheBuilder<K, V, S2> {
		CacheBuilder {
			maximum_weight: self.maximum_weight,
			initial_capacity: self.initial_capacity,
			hasher,

			weigher: self.weigher,
			expire_after_access_ns: self.expire_after_access_ns,
			expire_after_write_ns: self.expire_after_write_ns,
			refresh_after_write_ns: self.refresh_after_write_ns,
			expiry: self.expiry,

			weak_keys: self.weak_keys,
			weak_values: self.weak_values,
			soft_values: self.soft_values,

			record_stats: self.record_stats,
			removal_listener: self.removal_listener,
			writer: self.writer,
			loader: self.loader,

			executor: self.executor,
			ticker: self.ticker,

			_marker: PhantomData,
		}
	}

	#[must_use]
	pub fn expire_after_access_ns(mut self, duration_ns: u64) -> Self {
		self.expire_after_access_ns = Some(duration_ns);
		self
	}

	#[must_use]
	pub fn expire_after_write_ns(mut self, duration_ns: u64) -> Self {
		self.expire_after_write_ns = Some(duration_ns);
		self
	}

	#[must_use]
	pub fn refresh_after_write_ns(mut self, duration_ns: u64) -> Self {
		self.refresh_after_write_ns = Some(duration_ns);
		self
	}

	#[must_use]
	pub fn expiry(mut self, expiry: Arc<dyn Expiry<K, V>>) -> Self {
		self.expiry = Some(expiry);
		self
	}

	#[must_use]
	pub fn weak_keys(mut self) -> Self {
		self.weak_keys = true;
		self
	}

	#[must_use]
	pub fn weak_values(mut self) -> Self {
		self.weak_values = true;
		self
	}

	#[must_use]
	pub fn soft_values(mut self) -> Self {
		self.soft_values = true;
		self
	}

	#[must_use]
	pub fn record_stats(mut self) -> Self {
		self.record_stats = true;
		self
	}

	#[must_use]
	pub fn removal_listener(mut self, listener: RemovalListener<K, V>) -> Self {
		self.removal_listener = Some(listener);
		self
	}

	#[must_use]
	pub fn writer(mut self, writer: Writer<K, V>) -> Self {
		self.writer = Some(writer);
		self
	}

	#[must_use]
	pub fn loader(mut self, loader: Loader<K, V>) -> Self {
		self.loader = Some(loader);
		self
	}

	#[must_use]
	pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
		self.executor = executor;
		self
	}

	#[must_use]
	pub fn ticker(mut self, ticker: Arc<dyn Ticker>) -> Self {
		self.ticker = ticker;
		self
	}

	pub fn build(self) -> Result<CacheConfig<K, V, S>, CacheError> {
		let Some(maximum_weight) = self.maximum_weight else {
			return Err(CacheError::InvalidConfiguration("maximum size or weight must be configured"));
		};

		if maximum_weight == 0 {
			return Err(CacheError::InvalidConfiguration("maximum size cannot be zero"));
		}

		if self.expiry.is_some() && (self.expire_after_access_ns.is_some() || self.expire_after_write_ns.is_some()) {
			return Err(CacheError::InvalidConfiguration(
				"a custom expiry policy cannot be combined with expire_after_access/expire_after_write",
			));
		}

		if self.soft_values && self.weak_values {
			return Err(CacheError::InvalidConfiguration(
				"values cannot be configured as both weak and soft",
			));
		}

		Ok(CacheConfig {
			maximum_weight,
			initial_capacity: self.initial_capacity,
			hasher: self.hasher,

			weigher: self.weigher,
			expire_after_access_ns: self.expire_after_access_ns,
			expire_after_write_ns: self.expire_after_write_ns,
			refresh_after_write_ns: self.refresh_after_write_ns,
			expiry: self.expiry,

			weak_keys: self.weak_keys,
			weak_values: self.weak_values,
			soft_values: self.soft_values,

			record_stats: self.record_stats,
			removal_listener: self.removal_listener,
			writer: self.writer,
			loader: self.loader,

			executor: self.executor,
			ticker: self.ticker,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn build_fails_without_a_maximum() {
		let result = CacheBuilder::<u64, u64>::default().build();
		assert_eq!(result.unwrap_err(), CacheError::InvalidConfiguration("maximum size or weight must be configured"));
	}

	#[test]
	fn build_fails_on_zero_maximum() {
		let result = CacheBuilder::<u64, u64>::default().maximum_size(0).build();
		assert!(result.is_err());
	}

	#[test]
	fn build_fails_when_expiry_and_expire_after_write_combine() {
		struct NeverExpire;

		impl Expiry<u64, u64> for NeverExpire {
			fn expire_after_create(&self, _: &u64, _: &u64) -> Option<u64> {
				None
			}

			fn expire_after_update(&self, _: &u64, _: &u64, _: u64) -> Option<u64> {
				None
			}

			fn expire_after_read(&self, _: &u64, _: &u64, _: u64) -> Option<u64> {
				None
			}
		}

		let result = CacheBuilder::<u64, u64>::default()
			.maximum_size(100)
			.expire_after_write_ns(1_000)
			.expiry(Arc::new(NeverExpire))
			.build();

		assert!(result.is_err());
	}

	#[test]
	fn build_succeeds_with_a_maximum() {
		let config = CacheBuilder::<u64, u64>::default()
			.maximum_size(100)
			.record_stats()
			.build()
			.unwrap();

		assert_eq!(config.maximum_weight, 100);
		assert!(config.record_stats);
	}
}
