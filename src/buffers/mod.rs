/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

mod read_buffer;
mod write_buffer;

pub use read_buffer::{StripedReadBuffer, OfferOutcome};
pub use write_buffer::{WriteBuffer, WriteTask};
