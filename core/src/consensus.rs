// Copyright 2018 The Krypton Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Network-wide constants the wallet must agree on with every node it talks
//! to. Anything tunable per deployment goes through `Currency` instead.

/// Total money supply, ever
pub const MONEY_SUPPLY: u64 = u64::max_value();

/// Base block rewards halve (shift right) against the remaining supply by
/// this factor
pub const EMISSION_SPEED_FACTOR: u32 = 18;

/// Number of decimal points of one coin
pub const DISPLAY_DECIMAL_POINT: usize = 8;

/// One coin, in atomic units
pub const COIN: u64 = 100_000_000;

/// Blocks before a mined (coinbase) output may be spent
pub const MINED_MONEY_UNLOCK_WINDOW: u64 = 10;

/// Unlock times below this bound are block heights, above it unix
/// timestamps
pub const MAX_BLOCK_NUMBER: u64 = 1 << 31;

/// Block size over which miners start forfeiting part of the reward
pub const BLOCK_GRANTED_FULL_REWARD_ZONE: usize = 100_000;

/// Bytes reserved in a block for the miner transaction
pub const COINBASE_BLOB_RESERVED_SIZE: usize = 600;

/// Minimum fee of any relayed non-fusion transaction
pub const MINIMUM_FEE: u64 = 1_000_000;

/// Outputs below this value are dust: unmixable and skipped by selection
pub const DEFAULT_DUST_THRESHOLD: u64 = 1_000_000;

/// The largest ring size any node accepts
pub const MAX_MIXIN: u64 = 16;

/// Lower bound on inputs consumed by a fusion transaction
pub const FUSION_TX_MIN_INPUT_COUNT: usize = 12;

/// A fusion transaction must consume at least this many times more inputs
/// than it produces outputs
pub const FUSION_TX_MIN_IN_OUT_COUNT_RATIO: usize = 4;

/// Upper bound on the serialized size of a fusion transaction
pub const FUSION_TX_MAX_SIZE: usize = 30_000;

/// Seconds a transaction may live in the pool
pub const MEMPOOL_TX_LIVE_TIME: u64 = 60 * 60 * 24;

/// How many pool lifetimes a wallet remembers deleted pool transactions
pub const NUMBER_OF_PERIODS_TO_FORGET_TX_DELETED_FROM_POOL: u64 = 7;
