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

//! The per-account ledger of owned outputs. Tracks every output through
//! unconfirmed -> soft-locked -> unlocked -> spent, resolves key-image
//! collisions through a visible/hidden sibling scheme, and rewinds cleanly
//! on reorgs. All admission failures leave the container untouched.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use log::warn;

use krypton_core::core::hash::Hash;
use krypton_core::core::transaction::{Transaction, TransactionInput};
use krypton_core::consensus;
use krypton_core::ser::{Readable, Reader, Writeable, Writer};
use krypton_keychain::KeyImage;

use crate::error::{Error, ErrorKind};
use crate::types::*;

const CONTAINER_VERSION: u8 = 1;

/// The lifecycle position of a single owned output
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransferState {
	/// Created by a pool transaction
	Unconfirmed,
	/// Confirmed but not yet spendable (age or unlock time)
	SoftLocked,
	/// Spendable
	Unlocked,
	/// Consumed by a confirmed transaction
	Spent,
	/// Consumed by a pool transaction
	SpentUnconfirmed,
}

#[derive(Clone, Debug)]
struct SpendInfo {
	tx_hash: Hash,
	block: TransactionBlockInfo,
	input_index: u32,
}

#[derive(Clone, Debug)]
struct TransferRecord {
	block: TransactionBlockInfo,
	transfer: TransferOutput,
	unlock_time: u64,
	visible: bool,
	spent_by: Option<SpendInfo>,
}

#[derive(Clone, Debug)]
struct ContainerTransaction {
	block: TransactionBlockInfo,
	unlock_time: u64,
	extra: Vec<u8>,
	payment_id: Option<Hash>,
	public_key: krypton_keychain::PublicKey,
	is_base: bool,
	fee: u64,
}

/// Admission cursor: the last confirmed position accepted, or a floor left
/// behind by a detach under which any index is acceptable again.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum OrderCursor {
	/// Nothing confirmed yet
	None,
	/// Last accepted `(height, transaction_index)`
	After(u64, u32),
	/// Detached; accept any position at or above this height
	Floor(u64),
}

/// Per-account outputs ledger
pub struct TransfersContainer {
	spendable_age: u64,
	current_height: u64,
	cursor: OrderCursor,
	transactions: HashMap<Hash, ContainerTransaction>,
	records: BTreeMap<u64, TransferRecord>,
	next_id: u64,
	by_tx: HashMap<Hash, Vec<u64>>,
	by_key_image: HashMap<KeyImage, Vec<u64>>,
	multisig_index: HashMap<(u64, u64), u64>,
}

impl TransfersContainer {
	/// A fresh container for one account
	pub fn new(spendable_age: u64) -> TransfersContainer {
		TransfersContainer {
			spendable_age,
			current_height: 0,
			cursor: OrderCursor::None,
			transactions: HashMap::new(),
			records: BTreeMap::new(),
			next_id: 0,
			by_tx: HashMap::new(),
			by_key_image: HashMap::new(),
			multisig_index: HashMap::new(),
		}
	}

	/// Admits a transaction along with the outputs of it that belong to
	/// this account. Inputs are checked for spends of owned outputs.
	/// Returns false (without mutating) when the transaction touches this
	/// account in no way.
	pub fn add_transaction(
		&mut self,
		block: &TransactionBlockInfo,
		tx: &Transaction,
		outputs: &[TransferOutput],
	) -> Result<bool, Error> {
		let tx_hash = tx.hash();
		if self.transactions.contains_key(&tx_hash) {
			return Err(Error::internal(format!(
				"transaction {} added twice",
				tx_hash
			)));
		}
		if block.is_confirmed() {
			self.check_order(block)?;
		}

		// outputs must agree with the block on confirmation status, and a
		// key image may only ever map to one amount
		for out in outputs {
			let out_unconfirmed =
				out.global_output_index == UNCONFIRMED_TRANSACTION_GLOBAL_OUTPUT_INDEX;
			if block.is_confirmed() && out_unconfirmed {
				return Err(Error::internal(
					"confirmed transaction with unconfirmed output index",
				));
			}
			if !block.is_confirmed() && !out_unconfirmed {
				return Err(Error::internal(
					"unconfirmed transaction with confirmed output index",
				));
			}
			if let Some(ref ki) = out.key_image {
				if let Some(group) = self.by_key_image.get(ki) {
					for id in group {
						if self.records[id].transfer.amount != out.amount {
							return Err(Error::internal(format!(
								"key image {} seen with amounts {} and {}",
								ki, self.records[id].transfer.amount, out.amount
							)));
						}
					}
				}
			}
		}

		let spends = self.find_spends(tx)?;
		if outputs.is_empty() && spends.is_empty() {
			return Ok(false);
		}

		// validation done, apply
		let mut touched_images: HashSet<KeyImage> = HashSet::new();

		self.transactions.insert(
			tx_hash,
			ContainerTransaction {
				block: *block,
				unlock_time: tx.prefix.unlock_time,
				extra: tx.prefix.extra.clone(),
				payment_id: tx.prefix.payment_id(),
				public_key: tx
					.prefix
					.public_key()
					.unwrap_or_else(|| krypton_keychain::PublicKey::from_bytes([0u8; 32])),
				is_base: tx.prefix.is_base(),
				fee: tx.fee(),
			},
		);

		for out in outputs {
			let id = self.next_id;
			self.next_id += 1;
			let mut transfer = out.clone();
			transfer.transaction_hash = tx_hash;
			if let Some(ref ki) = transfer.key_image {
				self.by_key_image.entry(*ki).or_default().push(id);
				touched_images.insert(*ki);
			}
			if transfer.output_type == OutputType::Multisignature && block.is_confirmed() {
				self.multisig_index
					.insert((transfer.amount, transfer.global_output_index), id);
			}
			self.by_tx.entry(tx_hash).or_default().push(id);
			self.records.insert(
				id,
				TransferRecord {
					block: *block,
					transfer,
					unlock_time: tx.prefix.unlock_time,
					visible: true,
					spent_by: None,
				},
			);
		}

		for (record_id, input_index) in spends {
			let record = self.records.get_mut(&record_id).unwrap();
			record.spent_by = Some(SpendInfo {
				tx_hash,
				block: *block,
				input_index,
			});
			if let Some(ref ki) = record.transfer.key_image {
				touched_images.insert(*ki);
			}
		}

		for ki in touched_images {
			self.update_visibility(&ki);
		}

		if block.is_confirmed() {
			self.cursor = OrderCursor::After(block.height, block.transaction_index);
			self.current_height = self.current_height.max(block.height);
		}

		Ok(true)
	}

	/// Promotes a previously unconfirmed transaction into a block,
	/// assigning the canonical global indices to its outputs. Returns
	/// false for unknown or already confirmed transactions.
	pub fn mark_transaction_confirmed(
		&mut self,
		block: &TransactionBlockInfo,
		tx_hash: &Hash,
		global_indices: &[u64],
	) -> Result<bool, Error> {
		if !block.is_confirmed() {
			return Err(Error::internal(
				"confirmation requires a confirmed block height",
			));
		}
		match self.transactions.get(tx_hash) {
			Some(ctx) if !ctx.block.is_confirmed() => {}
			_ => return Ok(false),
		}
		self.check_order(block)?;

		let record_ids: Vec<u64> = self.by_tx.get(tx_hash).cloned().unwrap_or_default();
		for id in &record_ids {
			let position = self.records[id].transfer.output_in_transaction as usize;
			if position >= global_indices.len() {
				return Err(Error::internal(format!(
					"{} global indices supplied, output {} needs more",
					global_indices.len(),
					position
				)));
			}
		}

		let mut touched_images: HashSet<KeyImage> = HashSet::new();

		self.transactions.get_mut(tx_hash).unwrap().block = *block;

		for id in &record_ids {
			let record = self.records.get_mut(id).unwrap();
			record.block = *block;
			record.transfer.global_output_index =
				global_indices[record.transfer.output_in_transaction as usize];
			if let Some(ref ki) = record.transfer.key_image {
				touched_images.insert(*ki);
			}
			if record.transfer.output_type == OutputType::Multisignature {
				self.multisig_index.insert(
					(record.transfer.amount, record.transfer.global_output_index),
					*id,
				);
			}
		}

		// spends performed by this transaction are now confirmed spends
		for record in self.records.values_mut() {
			if let Some(ref mut spend) = record.spent_by {
				if spend.tx_hash == *tx_hash {
					spend.block = *block;
				}
			}
		}

		for ki in touched_images {
			self.update_visibility(&ki);
		}

		self.cursor = OrderCursor::After(block.height, block.transaction_index);
		self.current_height = self.current_height.max(block.height);
		Ok(true)
	}

	/// Forgets an unconfirmed transaction: its outputs disappear and any
	/// outputs it spent return to their previous state. Confirmed
	/// transactions are never deleted through this path.
	pub fn delete_unconfirmed_transaction(&mut self, tx_hash: &Hash) -> bool {
		match self.transactions.get(tx_hash) {
			Some(ctx) if !ctx.block.is_confirmed() => {}
			_ => return false,
		}
		self.remove_transaction(tx_hash);
		true
	}

	/// Rewinds the container below `height`: every transaction confirmed at
	/// or above it is removed, along with unconfirmed transactions that
	/// spent a removed output. Returns the removed hashes.
	pub fn detach(&mut self, height: u64) -> Vec<Hash> {
		let mut to_remove: Vec<Hash> = self
			.transactions
			.iter()
			.filter(|(_, ctx)| ctx.block.is_confirmed() && ctx.block.height >= height)
			.map(|(hash, _)| *hash)
			.collect();

		// cascade into spenders of removed outputs
		let mut removed: HashSet<Hash> = to_remove.iter().cloned().collect();
		let mut queue = to_remove.clone();
		while let Some(hash) = queue.pop() {
			let spenders: Vec<Hash> = self
				.by_tx
				.get(&hash)
				.map(|ids| {
					ids.iter()
						.filter_map(|id| self.records[id].spent_by.as_ref())
						.map(|s| s.tx_hash)
						.collect()
				})
				.unwrap_or_default();
			for spender in spenders {
				if removed.insert(spender) {
					to_remove.push(spender);
					queue.push(spender);
				}
			}
		}

		for hash in &to_remove {
			self.remove_transaction(hash);
		}

		let floor = height.saturating_sub(1);
		self.cursor = OrderCursor::Floor(floor);
		self.current_height = self.current_height.min(floor);

		to_remove
	}

	/// Moves the unlock clock forward. Refuses to move backwards.
	pub fn advance_height(&mut self, height: u64) -> bool {
		if height < self.current_height {
			warn!(
				"refusing to advance container height backwards: {} -> {}",
				self.current_height, height
			);
			return false;
		}
		self.current_height = height;
		true
	}

	/// Sum of visible unspent outputs matching the include flags
	pub fn balance(&self, flags: u32) -> u64 {
		self.records
			.values()
			.filter(|r| r.visible && r.spent_by.is_none())
			.filter(|r| self.matches_flags(r, flags))
			.map(|r| r.transfer.amount)
			.sum()
	}

	/// Visible unspent outputs matching the include flags
	pub fn get_outputs(&self, flags: u32) -> Vec<TransferOutput> {
		self.records
			.values()
			.filter(|r| r.visible && r.spent_by.is_none())
			.filter(|r| self.matches_flags(r, flags))
			.map(|r| r.transfer.clone())
			.collect()
	}

	/// Outputs created by one transaction, matching the include flags.
	/// Hidden siblings are included; their state is computed as usual.
	pub fn get_transaction_outputs(&self, tx_hash: &Hash, flags: u32) -> Vec<TransferOutput> {
		self.by_tx
			.get(tx_hash)
			.map(|ids| {
				ids.iter()
					.map(|id| &self.records[id])
					.filter(|r| r.spent_by.is_none() && self.matches_flags(r, flags))
					.map(|r| r.transfer.clone())
					.collect()
			})
			.unwrap_or_default()
	}

	/// Metadata for one transaction, if known
	pub fn get_transaction_information(&self, tx_hash: &Hash) -> Option<TransactionInformation> {
		self.transactions.get(tx_hash).map(|ctx| {
			let total_amount_out: u64 = self
				.by_tx
				.get(tx_hash)
				.map(|ids| ids.iter().map(|id| self.records[id].transfer.amount).sum())
				.unwrap_or(0);
			let total_amount_in: u64 = self
				.records
				.values()
				.filter(|r| {
					r.spent_by
						.as_ref()
						.map(|s| s.tx_hash == *tx_hash)
						.unwrap_or(false)
				})
				.map(|r| r.transfer.amount)
				.sum();
			TransactionInformation {
				transaction_hash: *tx_hash,
				block_height: ctx.block.height,
				timestamp: if ctx.block.is_confirmed() {
					ctx.block.timestamp
				} else {
					0
				},
				transaction_index: ctx.block.transaction_index,
				unlock_time: ctx.unlock_time,
				total_amount_in,
				total_amount_out,
				fee: ctx.fee,
				extra: ctx.extra.clone(),
				payment_id: ctx.payment_id,
				public_key: ctx.public_key,
				is_base: ctx.is_base,
			}
		})
	}

	/// Whether a key image has been consumed, optionally only counting
	/// spends confirmed at or below `at_height`
	pub fn check_if_spent(&self, key_image: &KeyImage, at_height: Option<u64>) -> bool {
		self.by_key_image
			.get(key_image)
			.map(|ids| {
				ids.iter().any(|id| match self.records[id].spent_by {
					Some(ref spend) => match at_height {
						Some(height) => {
							spend.block.is_confirmed() && spend.block.height <= height
						}
						None => true,
					},
					None => false,
				})
			})
			.unwrap_or(false)
	}

	/// Hashes of transactions still waiting for a block
	pub fn get_unconfirmed_transactions(&self) -> Vec<Hash> {
		self.transactions
			.iter()
			.filter(|(_, ctx)| !ctx.block.is_confirmed())
			.map(|(hash, _)| *hash)
			.collect()
	}

	/// Every owned output that has been consumed, with its consumer
	pub fn get_spent_outputs(&self) -> Vec<SpentTransferOutput> {
		self.records
			.values()
			.filter_map(|r| {
				r.spent_by.as_ref().map(|spend| SpentTransferOutput {
					transfer: r.transfer.clone(),
					spending_transaction_hash: spend.tx_hash,
					spending_block: spend.block,
					input_in_transaction: spend.input_index,
				})
			})
			.collect()
	}

	/// Number of transactions known to the container
	pub fn transactions_count(&self) -> usize {
		self.transactions.len()
	}

	/// Number of output records, hidden siblings included
	pub fn transfers_count(&self) -> usize {
		self.records.len()
	}

	/// The height the unlock clock sits at
	pub fn current_height(&self) -> u64 {
		self.current_height
	}

	/// The lifecycle state of an output record
	fn state_of(&self, record: &TransferRecord) -> TransferState {
		if let Some(ref spend) = record.spent_by {
			return if spend.block.is_confirmed() {
				TransferState::Spent
			} else {
				TransferState::SpentUnconfirmed
			};
		}
		if !record.block.is_confirmed() {
			return TransferState::Unconfirmed;
		}
		let aged = record.block.height + self.spendable_age <= self.current_height;
		let unlock_passed = if record.unlock_time < consensus::MAX_BLOCK_NUMBER {
			self.current_height >= record.unlock_time
		} else {
			Utc::now().timestamp() as u64 >= record.unlock_time
		};
		if aged && unlock_passed {
			TransferState::Unlocked
		} else {
			TransferState::SoftLocked
		}
	}

	fn matches_flags(&self, record: &TransferRecord, flags: u32) -> bool {
		let type_bit = match record.transfer.output_type {
			OutputType::Key => INCLUDE_TYPE_KEY,
			OutputType::Multisignature => INCLUDE_TYPE_MULTISIGNATURE,
		};
		let state_bit = match self.state_of(record) {
			TransferState::Unconfirmed => INCLUDE_STATE_LOCKED,
			TransferState::SoftLocked => INCLUDE_STATE_SOFT_LOCKED,
			TransferState::Unlocked => INCLUDE_STATE_UNLOCKED,
			// spent outputs are only reachable through get_spent_outputs
			TransferState::Spent | TransferState::SpentUnconfirmed => 0,
		};
		flags & type_bit != 0 && flags & state_bit != 0
	}

	fn check_order(&self, block: &TransactionBlockInfo) -> Result<(), Error> {
		let ordered = match self.cursor {
			OrderCursor::None => true,
			OrderCursor::After(height, index) => {
				block.height > height
					|| (block.height == height && block.transaction_index > index)
			}
			OrderCursor::Floor(height) => block.height >= height,
		};
		if ordered {
			Ok(())
		} else {
			Err(Error::internal(format!(
				"out of order admission at height {} index {} (cursor {:?})",
				block.height, block.transaction_index, self.cursor
			)))
		}
	}

	/// Resolves which owned outputs a transaction's inputs consume.
	/// Violations (spending unconfirmed, amount mismatch, double spend)
	/// are consistency errors.
	fn find_spends(&self, tx: &Transaction) -> Result<Vec<(u64, u32)>, Error> {
		let mut spends = vec![];
		for (input_index, input) in tx.prefix.inputs.iter().enumerate() {
			match input {
				TransactionInput::Key(key_input) => {
					let group = match self.by_key_image.get(&key_input.key_image) {
						Some(group) => group,
						None => continue,
					};
					if group
						.iter()
						.any(|id| self.records[id].spent_by.is_some())
					{
						return Err(Error::internal(format!(
							"double spend of key image {}",
							key_input.key_image
						)));
					}
					let best = self.best_confirmed_of(group).ok_or_else(|| {
						Error::internal(format!(
							"input spends unconfirmed key image {}",
							key_input.key_image
						))
					})?;
					let amount = self.records[&best].transfer.amount;
					if amount != key_input.amount {
						return Err(Error::internal(format!(
							"input amount {} does not match owned output amount {}",
							key_input.amount, amount
						)));
					}
					spends.push((best, input_index as u32));
				}
				TransactionInput::Multisignature(ms_input) => {
					if let Some(&id) = self
						.multisig_index
						.get(&(ms_input.amount, ms_input.output_index))
					{
						if self.records[&id].spent_by.is_some() {
							return Err(Error::internal(
								"double spend of multisignature output",
							));
						}
						spends.push((id, input_index as u32));
					}
				}
				TransactionInput::Base { .. } => {}
			}
		}
		Ok(spends)
	}

	/// The sibling a spend resolves to and the one balance counts: the
	/// earliest confirmed record of the group
	fn best_confirmed_of(&self, group: &[u64]) -> Option<u64> {
		group
			.iter()
			.copied()
			.filter(|id| self.records[id].block.is_confirmed())
			.min_by_key(|id| {
				let r = &self.records[id];
				(
					r.block.height,
					r.block.transaction_index,
					r.transfer.transaction_hash,
				)
			})
	}

	/// Re-resolves visibility inside one key-image group: a spent record
	/// keeps representing the group; otherwise the earliest confirmed
	/// record wins; a lone unconfirmed record is visible, competing
	/// unconfirmed records are all hidden.
	fn update_visibility(&mut self, key_image: &KeyImage) {
		let ids = match self.by_key_image.get(key_image) {
			Some(ids) if !ids.is_empty() => ids.clone(),
			_ => return,
		};
		let spent: Option<u64> = ids
			.iter()
			.copied()
			.find(|id| self.records[id].spent_by.is_some());
		let winner = if let Some(spent_id) = spent {
			Some(spent_id)
		} else if let Some(best) = self.best_confirmed_of(&ids) {
			Some(best)
		} else if ids.len() == 1 {
			Some(ids[0])
		} else {
			None
		};
		for id in ids {
			let visible = Some(id) == winner;
			self.records.get_mut(&id).unwrap().visible = visible;
		}
	}

	fn remove_transaction(&mut self, tx_hash: &Hash) {
		let mut touched_images: HashSet<KeyImage> = HashSet::new();

		// outputs created by the transaction disappear
		if let Some(ids) = self.by_tx.remove(tx_hash) {
			for id in ids {
				let record = self.records.remove(&id).unwrap();
				if let Some(ref ki) = record.transfer.key_image {
					touched_images.insert(*ki);
					if let Some(group) = self.by_key_image.get_mut(ki) {
						group.retain(|g| *g != id);
						if group.is_empty() {
							self.by_key_image.remove(ki);
						}
					}
				}
				if record.transfer.output_type == OutputType::Multisignature {
					self.multisig_index
						.remove(&(record.transfer.amount, record.transfer.global_output_index));
				}
			}
		}

		// outputs it spent come back
		for record in self.records.values_mut() {
			let spent_here = record
				.spent_by
				.as_ref()
				.map(|s| s.tx_hash == *tx_hash)
				.unwrap_or(false);
			if spent_here {
				record.spent_by = None;
				if let Some(ref ki) = record.transfer.key_image {
					touched_images.insert(*ki);
				}
			}
		}

		self.transactions.remove(tx_hash);

		for ki in touched_images {
			self.update_visibility(&ki);
		}
	}
}

// ---------------------------------------------------------------------
// snapshot serialization
// ---------------------------------------------------------------------

fn write_opt_hash<W: Writer>(writer: &mut W, value: &Option<Hash>) -> Result<(), krypton_core::ser::Error> {
	match value {
		Some(hash) => {
			writer.write_u8(1)?;
			hash.write(writer)
		}
		None => writer.write_u8(0),
	}
}

fn read_opt_hash<R: Reader>(reader: &mut R) -> Result<Option<Hash>, krypton_core::ser::Error> {
	match reader.read_u8()? {
		0 => Ok(None),
		_ => Ok(Some(Hash::read(reader)?)),
	}
}

impl Writeable for TransactionBlockInfo {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), krypton_core::ser::Error> {
		writer.write_u64(self.height)?;
		writer.write_u64(self.timestamp)?;
		writer.write_u32(self.transaction_index)
	}
}

impl Readable for TransactionBlockInfo {
	fn read<R: Reader>(reader: &mut R) -> Result<TransactionBlockInfo, krypton_core::ser::Error> {
		Ok(TransactionBlockInfo {
			height: reader.read_u64()?,
			timestamp: reader.read_u64()?,
			transaction_index: reader.read_u32()?,
		})
	}
}

impl Writeable for TransferOutput {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), krypton_core::ser::Error> {
		writer.write_u8(match self.output_type {
			OutputType::Key => 0,
			OutputType::Multisignature => 1,
		})?;
		writer.write_u64(self.amount)?;
		writer.write_u64(self.global_output_index)?;
		writer.write_u32(self.output_in_transaction)?;
		self.transaction_public_key.write(writer)?;
		self.transaction_hash.write(writer)?;
		match self.output_key {
			Some(ref key) => {
				writer.write_u8(1)?;
				key.write(writer)?;
			}
			None => writer.write_u8(0)?,
		}
		writer.write_u32(self.required_signatures)?;
		match self.key_image {
			Some(ref ki) => {
				writer.write_u8(1)?;
				ki.write(writer)
			}
			None => writer.write_u8(0),
		}
	}
}

impl Readable for TransferOutput {
	fn read<R: Reader>(reader: &mut R) -> Result<TransferOutput, krypton_core::ser::Error> {
		let output_type = match reader.read_u8()? {
			0 => OutputType::Key,
			1 => OutputType::Multisignature,
			_ => return Err(krypton_core::ser::Error::CorruptedData),
		};
		let amount = reader.read_u64()?;
		let global_output_index = reader.read_u64()?;
		let output_in_transaction = reader.read_u32()?;
		let transaction_public_key = krypton_keychain::PublicKey::read(reader)?;
		let transaction_hash = Hash::read(reader)?;
		let output_key = match reader.read_u8()? {
			0 => None,
			_ => Some(krypton_keychain::PublicKey::read(reader)?),
		};
		let required_signatures = reader.read_u32()?;
		let key_image = match reader.read_u8()? {
			0 => None,
			_ => Some(KeyImage::read(reader)?),
		};
		Ok(TransferOutput {
			output_type,
			amount,
			global_output_index,
			output_in_transaction,
			transaction_public_key,
			transaction_hash,
			output_key,
			required_signatures,
			key_image,
		})
	}
}

impl Writeable for TransferRecord {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), krypton_core::ser::Error> {
		self.block.write(writer)?;
		self.transfer.write(writer)?;
		writer.write_u64(self.unlock_time)?;
		writer.write_u8(if self.visible { 1 } else { 0 })?;
		match self.spent_by {
			Some(ref spend) => {
				writer.write_u8(1)?;
				spend.tx_hash.write(writer)?;
				spend.block.write(writer)?;
				writer.write_u32(spend.input_index)
			}
			None => writer.write_u8(0),
		}
	}
}

impl Readable for TransferRecord {
	fn read<R: Reader>(reader: &mut R) -> Result<TransferRecord, krypton_core::ser::Error> {
		let block = TransactionBlockInfo::read(reader)?;
		let transfer = TransferOutput::read(reader)?;
		let unlock_time = reader.read_u64()?;
		let visible = reader.read_u8()? != 0;
		let spent_by = match reader.read_u8()? {
			0 => None,
			_ => Some(SpendInfo {
				tx_hash: Hash::read(reader)?,
				block: TransactionBlockInfo::read(reader)?,
				input_index: reader.read_u32()?,
			}),
		};
		Ok(TransferRecord {
			block,
			transfer,
			unlock_time,
			visible,
			spent_by,
		})
	}
}

impl Writeable for ContainerTransaction {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), krypton_core::ser::Error> {
		self.block.write(writer)?;
		writer.write_u64(self.unlock_time)?;
		writer.write_vec(&self.extra)?;
		write_opt_hash(writer, &self.payment_id)?;
		self.public_key.write(writer)?;
		writer.write_u8(if self.is_base { 1 } else { 0 })?;
		writer.write_u64(self.fee)
	}
}

impl Readable for ContainerTransaction {
	fn read<R: Reader>(reader: &mut R) -> Result<ContainerTransaction, krypton_core::ser::Error> {
		Ok(ContainerTransaction {
			block: TransactionBlockInfo::read(reader)?,
			unlock_time: reader.read_u64()?,
			extra: reader.read_vec()?,
			payment_id: read_opt_hash(reader)?,
			public_key: krypton_keychain::PublicKey::read(reader)?,
			is_base: reader.read_u8()? != 0,
			fee: reader.read_u64()?,
		})
	}
}

impl TransfersContainer {
	/// Writes a complete snapshot of the ledger
	pub fn save<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		writer.write_u8(CONTAINER_VERSION)?;
		writer.write_u64(self.current_height)?;
		match self.cursor {
			OrderCursor::None => writer.write_u8(0)?,
			OrderCursor::After(height, index) => {
				writer.write_u8(1)?;
				writer.write_u64(height)?;
				writer.write_u32(index)?;
			}
			OrderCursor::Floor(height) => {
				writer.write_u8(2)?;
				writer.write_u64(height)?;
			}
		}
		writer.write_u64(self.transactions.len() as u64)?;
		for (hash, ctx) in &self.transactions {
			hash.write(writer)?;
			ctx.write(writer)?;
		}
		writer.write_u64(self.records.len() as u64)?;
		for (id, record) in &self.records {
			writer.write_u64(*id)?;
			record.write(writer)?;
		}
		writer.write_u64(self.next_id)?;
		Ok(())
	}

	/// Restores a snapshot written by `save` into this (fresh) container,
	/// rebuilding the derived indexes.
	pub fn load<R: Reader>(&mut self, reader: &mut R) -> Result<(), Error> {
		let version = reader.read_u8()?;
		if version != CONTAINER_VERSION {
			return Err(ErrorKind::Format(format!(
				"unsupported container snapshot version {}",
				version
			))
			.into());
		}
		self.current_height = reader.read_u64()?;
		self.cursor = match reader.read_u8()? {
			0 => OrderCursor::None,
			1 => OrderCursor::After(reader.read_u64()?, reader.read_u32()?),
			2 => OrderCursor::Floor(reader.read_u64()?),
			_ => return Err(ErrorKind::Format("bad cursor tag".to_owned()).into()),
		};

		self.transactions.clear();
		let tx_count = reader.read_u64()?;
		for _ in 0..tx_count {
			let hash = Hash::read(reader)?;
			let ctx = ContainerTransaction::read(reader)?;
			self.transactions.insert(hash, ctx);
		}

		self.records.clear();
		self.by_tx.clear();
		self.by_key_image.clear();
		self.multisig_index.clear();
		let record_count = reader.read_u64()?;
		for _ in 0..record_count {
			let id = reader.read_u64()?;
			let record = TransferRecord::read(reader)?;
			self.by_tx
				.entry(record.transfer.transaction_hash)
				.or_default()
				.push(id);
			if let Some(ref ki) = record.transfer.key_image {
				self.by_key_image.entry(*ki).or_default().push(id);
			}
			if record.transfer.output_type == OutputType::Multisignature
				&& record.block.is_confirmed()
			{
				self.multisig_index
					.insert((record.transfer.amount, record.transfer.global_output_index), id);
			}
			self.records.insert(id, record);
		}
		self.next_id = reader.read_u64()?;
		Ok(())
	}
}
