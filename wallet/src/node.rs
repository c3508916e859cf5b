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

//! The capability trait through which the wallet talks to a full node.
//! Methods block on the transport and are only invoked from the
//! synchronizer worker or from engine paths that hold no wallet lock.

use krypton_core::core::hash::Hash;
use krypton_core::core::transaction::Transaction;
use krypton_keychain::PublicKey;

use crate::error::Error;

/// A block as delivered by `query_blocks`: identity plus the transactions
/// the wallet may care about (base transaction included).
#[derive(Clone, Debug)]
pub struct BlockShortEntry {
	/// Block hash
	pub block_hash: Hash,
	/// Height of the block
	pub height: u64,
	/// Block timestamp
	pub timestamp: u64,
	/// Transactions in block order, base transaction first
	pub transactions: Vec<Transaction>,
}

/// One candidate ring member for a given amount
#[derive(Copy, Clone, Debug)]
pub struct RandomOutEntry {
	/// Chain-wide ordinal of the output for its amount
	pub global_index: u64,
	/// The output's one-time key
	pub output_key: PublicKey,
}

/// Decoy candidates for one amount
#[derive(Clone, Debug)]
pub struct RandomAmountOuts {
	/// The amount the candidates were drawn for
	pub amount: u64,
	/// Candidates, in no particular order
	pub outs: Vec<RandomOutEntry>,
}

/// The node's answer to a pool difference query
#[derive(Clone, Debug)]
pub struct PoolDifference {
	/// Whether the `known_block_id` the caller passed is still the node's
	/// chain tip; pool state is only meaningful when it is
	pub is_blockchain_actual: bool,
	/// Pool transactions the caller does not know yet
	pub added: Vec<Transaction>,
	/// Known pool transaction hashes no longer in the pool
	pub deleted: Vec<Hash>,
}

/// Everything the wallet consumes from a full node
pub trait NodeClient: Send + Sync {
	/// Height of the node's local chain tip
	fn get_last_local_block_height(&self) -> Result<u64, Error>;

	/// Best chain height known to the node's peers
	fn get_last_known_block_height(&self) -> Result<u64, Error>;

	/// Timestamp of the node's local chain tip
	fn get_last_local_block_timestamp(&self) -> Result<u64, Error>;

	/// Number of connected peers
	fn get_peer_count(&self) -> Result<usize, Error>;

	/// Whether the node believes itself synchronized
	fn is_synchronized(&self) -> Result<bool, Error>;

	/// Sparse-chain resumable fetch. `known_block_ids` is newest-first with
	/// exponentially spaced ancestors; the node answers with the height of
	/// the first returned block (the fork point) and the blocks above it.
	/// Blocks older than `min_timestamp` may omit transaction bodies.
	fn query_blocks(
		&self,
		known_block_ids: &[Hash],
		min_timestamp: u64,
	) -> Result<(u64, Vec<BlockShortEntry>), Error>;

	/// Symmetric difference between the caller's pool view and the node's
	fn get_pool_symmetric_difference(
		&self,
		known_pool_tx_ids: &[Hash],
		known_block_id: Hash,
	) -> Result<PoolDifference, Error>;

	/// Canonical global indices of every output of a mined transaction
	fn get_transaction_outs_global_indices(&self, tx_hash: Hash) -> Result<Vec<u64>, Error>;

	/// Draws up to `count` decoy outputs for each amount
	fn get_random_outs_by_amounts(
		&self,
		amounts: &[u64],
		count: u64,
	) -> Result<Vec<RandomAmountOuts>, Error>;

	/// Submits a signed transaction to the network
	fn relay_transaction(&self, tx: &Transaction) -> Result<(), Error>;
}
