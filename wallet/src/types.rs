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

//! Types shared between the transfers bookkeeping and the wallet engine

use std::time::Duration;

use krypton_core::core::hash::Hash;
use krypton_keychain::{AccountKeys, KeyImage, PublicKey};

/// Block height marking a transaction as not (yet) on chain
pub const WALLET_UNCONFIRMED_TRANSACTION_HEIGHT: u64 = u64::max_value();

/// Global output index of an output whose transaction is still in the pool
pub const UNCONFIRMED_TRANSACTION_GLOBAL_OUTPUT_INDEX: u64 = u64::max_value();

/// Where (and whether) a transaction sits in the chain
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TransactionBlockInfo {
	/// Block height, or `WALLET_UNCONFIRMED_TRANSACTION_HEIGHT`
	pub height: u64,
	/// Block timestamp (seconds)
	pub timestamp: u64,
	/// Position of the transaction within its block
	pub transaction_index: u32,
}

impl TransactionBlockInfo {
	/// Block info of a pool transaction
	pub fn unconfirmed() -> TransactionBlockInfo {
		TransactionBlockInfo {
			height: WALLET_UNCONFIRMED_TRANSACTION_HEIGHT,
			timestamp: 0,
			transaction_index: 0,
		}
	}

	/// Block info of a confirmed transaction
	pub fn confirmed(height: u64, timestamp: u64, transaction_index: u32) -> TransactionBlockInfo {
		TransactionBlockInfo {
			height,
			timestamp,
			transaction_index,
		}
	}

	/// Whether the transaction is on chain
	pub fn is_confirmed(&self) -> bool {
		self.height != WALLET_UNCONFIRMED_TRANSACTION_HEIGHT
	}
}

/// Output flavors the container distinguishes
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OutputType {
	/// One-time key output
	Key,
	/// Multisignature output
	Multisignature,
}

/// An owned output, both as handed to the container on detection and as
/// returned from its queries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferOutput {
	/// Output flavor
	pub output_type: OutputType,
	/// Value
	pub amount: u64,
	/// Chain-wide ordinal for this amount, or the unconfirmed sentinel
	pub global_output_index: u64,
	/// Index of the output within its transaction
	pub output_in_transaction: u32,
	/// The transaction's ephemeral public key
	pub transaction_public_key: PublicKey,
	/// Hash of the transaction that created the output
	pub transaction_hash: Hash,
	/// The one-time output key (key outputs)
	pub output_key: Option<PublicKey>,
	/// Signatures required to spend (multisignature outputs)
	pub required_signatures: u32,
	/// Key image, derived when the owning account can sign
	pub key_image: Option<KeyImage>,
}

/// An owned output consumed by a spending transaction, for "where did my
/// money go" displays
#[derive(Clone, Debug)]
pub struct SpentTransferOutput {
	/// The consumed output
	pub transfer: TransferOutput,
	/// Hash of the transaction that spent it
	pub spending_transaction_hash: Hash,
	/// Where the spending transaction sits
	pub spending_block: TransactionBlockInfo,
	/// Index of the consuming input within the spending transaction
	pub input_in_transaction: u32,
}

/// Per-transaction metadata kept by the container
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionInformation {
	/// Transaction hash
	pub transaction_hash: Hash,
	/// Block height or `WALLET_UNCONFIRMED_TRANSACTION_HEIGHT`
	pub block_height: u64,
	/// Block timestamp, zero while unconfirmed
	pub timestamp: u64,
	/// Position within the block
	pub transaction_index: u32,
	/// Unlock time carried by the prefix
	pub unlock_time: u64,
	/// Sum of this wallet's outputs consumed by the transaction
	pub total_amount_in: u64,
	/// Sum of this wallet's outputs created by the transaction
	pub total_amount_out: u64,
	/// Fee paid (zero for base transactions)
	pub fee: u64,
	/// Raw extra field
	pub extra: Vec<u8>,
	/// Payment id carried in extra, if any
	pub payment_id: Option<Hash>,
	/// The transaction's ephemeral public key
	pub public_key: PublicKey,
	/// Whether this is a coinbase transaction
	pub is_base: bool,
}

/// The point an account's history scan starts from
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStart {
	/// First block height of interest
	pub height: u64,
	/// First timestamp of interest
	pub timestamp: u64,
}

impl Default for SyncStart {
	fn default() -> SyncStart {
		SyncStart {
			height: 0,
			timestamp: 0,
		}
	}
}

/// Everything needed to subscribe one account to the consumer
#[derive(Clone, Debug)]
pub struct SubscriptionRequest {
	/// Account keys; the view pair must match the consumer's
	pub keys: AccountKeys,
	/// Where scanning starts
	pub sync_start: SyncStart,
	/// Confirmations before a received output becomes spendable
	pub transaction_spendable_age: u64,
}

/// Tunables of the synchronizer and consumer
#[derive(Clone, Debug)]
pub struct SyncConfig {
	/// Idle wait between pull rounds
	pub poll_interval: Duration,
	/// Blocks at or below this height whose timestamp precedes every
	/// subscription's sync start are scanned for spends only. Keeps
	/// date-based restores from deriving keys over ancient history.
	pub startup_scan_height_cutoff: u64,
	/// Confirmations before a received output becomes spendable, applied
	/// to every address the engine creates
	pub transaction_spendable_age: u64,
}

impl Default for SyncConfig {
	fn default() -> SyncConfig {
		SyncConfig {
			poll_interval: Duration::from_secs(5),
			startup_scan_height_cutoff: 1_000,
			transaction_spendable_age: 6,
		}
	}
}

pub use self::flags::*;

/// Include-flags for balance and output queries: a bit-or of state bits and
/// type bits. A query matches outputs whose type bit and state bit are both
/// set.
pub mod flags {
	/// Key outputs
	pub const INCLUDE_TYPE_KEY: u32 = 0x01;
	/// Multisignature outputs
	pub const INCLUDE_TYPE_MULTISIGNATURE: u32 = 0x02;
	/// Any output type
	pub const INCLUDE_TYPE_ALL: u32 = 0x0f;

	/// Unconfirmed outputs
	pub const INCLUDE_STATE_LOCKED: u32 = 0x10;
	/// Confirmed outputs not yet aged or time-unlocked
	pub const INCLUDE_STATE_SOFT_LOCKED: u32 = 0x20;
	/// Spendable outputs
	pub const INCLUDE_STATE_UNLOCKED: u32 = 0x40;
	/// Any unspent state
	pub const INCLUDE_STATE_ALL: u32 = 0xf0;

	/// Every locked output of any type
	pub const INCLUDE_ALL_LOCKED: u32 =
		INCLUDE_TYPE_ALL | INCLUDE_STATE_LOCKED | INCLUDE_STATE_SOFT_LOCKED;
	/// Every spendable output of any type
	pub const INCLUDE_ALL_UNLOCKED: u32 = INCLUDE_TYPE_ALL | INCLUDE_STATE_UNLOCKED;
	/// Every unspent output of any type
	pub const INCLUDE_ALL: u32 = INCLUDE_TYPE_ALL | INCLUDE_STATE_ALL;
}
