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

//! Engine-level types: the transaction history records, transfer entries,
//! events, and the parameter bundles of `transfer` and fusion calls.

use krypton_core::core::hash::Hash;
use krypton_core::ser::{read_elems, write_elems, Readable, Reader, Writeable, Writer};

/// Identifier of a transaction within the engine's history. Stable for the
/// lifetime of the process; renumbered contiguously across save/load.
pub type TransactionId = usize;

/// The lifecycle of an engine-tracked transaction
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WalletTransactionState {
	/// On chain or relayed and accepted
	Succeeded,
	/// Relay failed permanently
	Failed,
	/// Built and input-locked, not yet relayed
	Created,
	/// Rolled back, or evicted from the pool
	Cancelled,
}

/// One entry of the wallet history
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletTransaction {
	/// Lifecycle state
	pub state: WalletTransactionState,
	/// Block timestamp, or zero while unconfirmed
	pub timestamp: u64,
	/// Block height, or `WALLET_UNCONFIRMED_TRANSACTION_HEIGHT`
	pub block_height: u64,
	/// Transaction hash
	pub hash: Hash,
	/// Net effect on this wallet (negative when sending)
	pub total_amount: i64,
	/// Fee paid
	pub fee: u64,
	/// Wall-clock time the engine learned of the transaction
	pub creation_time: u64,
	/// Unlock time carried by the prefix
	pub unlock_time: u64,
	/// Raw extra field
	pub extra: Vec<u8>,
	/// Whether this is a coinbase transaction
	pub is_base: bool,
}

impl WalletTransaction {
	/// Whether the recorded height proves chain inclusion
	pub fn in_blockchain(&self) -> bool {
		self.block_height != crate::types::WALLET_UNCONFIRMED_TRANSACTION_HEIGHT
	}
}

/// Why a transfer line exists within a transaction
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WalletTransferType {
	/// A payment to or from a counterparty
	Usual,
	/// Change returning to the wallet
	Change,
	/// A donation carved out of change
	Donation,
}

/// One movement of value within a transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletTransfer {
	/// Why the transfer exists
	pub transfer_type: WalletTransferType,
	/// Base58 address of the receiving party
	pub address: String,
	/// Amount moved (negative when leaving the wallet)
	pub amount: i64,
}

/// Events surfaced through `get_event`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalletEvent {
	/// A transaction entered the history
	TransactionCreated(TransactionId),
	/// An existing transaction changed (state, height, transfers)
	TransactionUpdated(TransactionId),
	/// Spendable balance changed
	BalanceChanged,
	/// Locked/pending balance changed
	PendingBalanceChanged,
	/// Synchronization advanced
	SyncProgressUpdated(u64, u64),
	/// A synchronization round completed
	SyncCompleted,
}

/// One destination of a transfer
#[derive(Clone, Debug)]
pub struct WalletOrder {
	/// Receiving address (base58)
	pub address: String,
	/// Amount to send
	pub amount: u64,
}

/// Donation carving settings
#[derive(Clone, Debug)]
pub struct DonationSettings {
	/// Receiving address of the donation
	pub address: String,
	/// Carving granularity; the donation is the largest multiple of this
	/// not exceeding the change
	pub threshold: u64,
}

/// Everything `transfer` and `make_transaction` accept
#[derive(Clone, Debug, Default)]
pub struct TransactionParameters {
	/// Addresses to draw inputs from; empty means the whole wallet
	pub source_addresses: Vec<String>,
	/// Recipients
	pub destinations: Vec<WalletOrder>,
	/// Fee to attach
	pub fee: u64,
	/// Ring size (decoys per input)
	pub mixin: u64,
	/// Payment id to advertise
	pub payment_id: Option<Hash>,
	/// Free-form extra nonce
	pub extra: Vec<u8>,
	/// Unlock time for the created outputs
	pub unlock_timestamp: u64,
	/// Optional donation carved from change
	pub donation: Option<DonationSettings>,
	/// Where change goes when it cannot be inferred
	pub change_destination: Option<String>,
}

impl Default for WalletOrder {
	fn default() -> WalletOrder {
		WalletOrder {
			address: String::new(),
			amount: 0,
		}
	}
}

/// What `estimate_fusion` reports
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FusionEstimate {
	/// Outputs that a fusion with the given threshold could consume
	pub fusion_ready_count: usize,
	/// All outputs considered
	pub total_output_count: usize,
}

/// Transactions grouped under the block that contains them
#[derive(Clone, Debug)]
pub struct TransactionsInBlock {
	/// The containing block
	pub block_hash: Hash,
	/// History entries confirmed in that block
	pub transactions: Vec<WalletTransaction>,
}

impl Writeable for WalletTransaction {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), krypton_core::ser::Error> {
		writer.write_u8(match self.state {
			WalletTransactionState::Succeeded => 0,
			WalletTransactionState::Failed => 1,
			WalletTransactionState::Created => 2,
			WalletTransactionState::Cancelled => 3,
		})?;
		writer.write_u64(self.timestamp)?;
		writer.write_u64(self.block_height)?;
		self.hash.write(writer)?;
		writer.write_i64(self.total_amount)?;
		writer.write_u64(self.fee)?;
		writer.write_u64(self.creation_time)?;
		writer.write_u64(self.unlock_time)?;
		writer.write_vec(&self.extra)?;
		writer.write_u8(if self.is_base { 1 } else { 0 })
	}
}

impl Readable for WalletTransaction {
	fn read<R: Reader>(reader: &mut R) -> Result<WalletTransaction, krypton_core::ser::Error> {
		let state = match reader.read_u8()? {
			0 => WalletTransactionState::Succeeded,
			1 => WalletTransactionState::Failed,
			2 => WalletTransactionState::Created,
			3 => WalletTransactionState::Cancelled,
			_ => return Err(krypton_core::ser::Error::CorruptedData),
		};
		Ok(WalletTransaction {
			state,
			timestamp: reader.read_u64()?,
			block_height: reader.read_u64()?,
			hash: Hash::read(reader)?,
			total_amount: reader.read_i64()?,
			fee: reader.read_u64()?,
			creation_time: reader.read_u64()?,
			unlock_time: reader.read_u64()?,
			extra: reader.read_vec()?,
			is_base: reader.read_u8()? != 0,
		})
	}
}

impl Writeable for WalletTransfer {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), krypton_core::ser::Error> {
		writer.write_u8(match self.transfer_type {
			WalletTransferType::Usual => 0,
			WalletTransferType::Change => 1,
			WalletTransferType::Donation => 2,
		})?;
		writer.write_vec(self.address.as_bytes())?;
		writer.write_i64(self.amount)
	}
}

impl Readable for WalletTransfer {
	fn read<R: Reader>(reader: &mut R) -> Result<WalletTransfer, krypton_core::ser::Error> {
		let transfer_type = match reader.read_u8()? {
			0 => WalletTransferType::Usual,
			1 => WalletTransferType::Change,
			2 => WalletTransferType::Donation,
			_ => return Err(krypton_core::ser::Error::CorruptedData),
		};
		let address_bytes = reader.read_vec()?;
		let address = String::from_utf8(address_bytes)
			.map_err(|_| krypton_core::ser::Error::CorruptedData)?;
		Ok(WalletTransfer {
			transfer_type,
			address,
			amount: reader.read_i64()?,
		})
	}
}

// keep the collection helpers linked in for history serialization
pub(crate) fn write_transfer_lists<W: Writer>(
	writer: &mut W,
	lists: &[Vec<WalletTransfer>],
) -> Result<(), krypton_core::ser::Error> {
	writer.write_u64(lists.len() as u64)?;
	for list in lists {
		write_elems(writer, list)?;
	}
	Ok(())
}

pub(crate) fn read_transfer_lists<R: Reader>(
	reader: &mut R,
) -> Result<Vec<Vec<WalletTransfer>>, krypton_core::ser::Error> {
	let count = reader.read_u64()?;
	if count > krypton_core::ser::MAX_COLLECTION_LEN {
		return Err(krypton_core::ser::Error::TooLargeReadErr(format!(
			"{} transfer lists",
			count
		)));
	}
	let mut lists = Vec::with_capacity(count as usize);
	for _ in 0..count {
		lists.push(read_elems(reader)?);
	}
	Ok(lists)
}
