/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use thiserror::Error;

#[derive(Debug, PartialEq, Error)]
pub enum CacheError {
	#[error("internal error")]
	Internal,

	#[error("the key was not found in the cache")]
	KeyNotFound,

	#[error("invalid cache configuration: {0}")]
	InvalidConfiguration(&'static str),

	#[error("the loader failed while computing a value")]
	LoaderFailure,

	#[error("the writer rejected a mutation")]
	WriterFailure,

	#[error("the removal listener failed")]
	ListenerFailure,

	#[error("the executor rejected a task")]
	ExecutorRejection,

	#[error("the weigher returned a weight that violates the configured maximum")]
	WeightViolation,
}
