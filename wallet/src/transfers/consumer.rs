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

//! The consumer side of synchronization: holds every subscription sharing
//! one view key, recognizes owned outputs in blocks and pool transactions,
//! derives key images, and feeds the per-account containers. Containers are
//! always taken in spend-key order so cross-account blocks cannot deadlock.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, error, info};

use krypton_core::core::hash::Hash;
use krypton_core::core::transaction::{OutputTarget, Transaction};
use krypton_core::Currency;
use krypton_keychain::{crypto, AccountKeys, KeyPair, PublicKey};
use krypton_util::{Mutex, RwLock};

use crate::error::{Error, ErrorKind};
use crate::node::{BlockShortEntry, NodeClient};
use crate::transfers::container::TransfersContainer;
use crate::transfers::synchronizer::BlockchainConsumer;
use crate::types::*;

/// One account's subscription: its keys and its outputs ledger
pub struct Subscription {
	keys: AccountKeys,
	sync_start: SyncStart,
	container: Mutex<TransfersContainer>,
}

impl Subscription {
	/// The subscribed account's keys
	pub fn keys(&self) -> &AccountKeys {
		&self.keys
	}

	/// Where this account's scan starts
	pub fn sync_start(&self) -> SyncStart {
		self.sync_start
	}

	/// The account's outputs ledger
	pub fn container(&self) -> &Mutex<TransfersContainer> {
		&self.container
	}
}

/// Listener for per-account ledger changes, dispatched by the consumer
pub trait TransfersObserver: Send + Sync {
	/// A transaction touching the account was admitted or changed state
	fn on_transaction_updated(&self, _spend_public: &PublicKey, _tx_hash: &Hash) {}

	/// A transaction previously visible to the account was removed
	fn on_transaction_deleted(&self, _spend_public: &PublicKey, _tx_hash: &Hash) {}

	/// A batch of blocks was fully applied
	fn on_blocks_added(&self, _start_height: u64, _block_hashes: &[Hash]) {}

	/// The chain was rewound below `height`
	fn on_blockchain_detached(&self, _height: u64) {}
}

/// Detects owned outputs for a family of accounts sharing a view key
pub struct TransfersConsumer<N: NodeClient> {
	currency: Currency,
	config: SyncConfig,
	node: Arc<N>,
	view: KeyPair,
	subscriptions: RwLock<BTreeMap<PublicKey, Arc<Subscription>>>,
	observers: RwLock<Vec<Arc<dyn TransfersObserver>>>,
}

/// Everything detected for one transaction before containers are touched
struct PreprocessedTransaction {
	block: TransactionBlockInfo,
	outputs: BTreeMap<PublicKey, Vec<TransferOutput>>,
	global_indices: Vec<u64>,
}

impl<N: NodeClient> TransfersConsumer<N> {
	/// A consumer with no subscriptions yet
	pub fn new(
		currency: Currency,
		config: SyncConfig,
		node: Arc<N>,
		view: KeyPair,
	) -> TransfersConsumer<N> {
		TransfersConsumer {
			currency,
			config,
			node,
			view,
			subscriptions: RwLock::new(BTreeMap::new()),
			observers: RwLock::new(Vec::new()),
		}
	}

	/// The network parameters this consumer scans under
	pub fn currency(&self) -> &Currency {
		&self.currency
	}

	/// Subscribes an account. The account's view keys must match this
	/// consumer's; resubscribing a known spend key returns the existing
	/// subscription untouched.
	pub fn add_subscription(
		&self,
		request: SubscriptionRequest,
	) -> Result<Arc<Subscription>, Error> {
		if request.keys.view.public != self.view.public {
			return Err(Error::internal(
				"subscription view key does not match consumer",
			));
		}
		let mut subscriptions = self.subscriptions.write();
		if let Some(existing) = subscriptions.get(&request.keys.spend_public) {
			return Ok(existing.clone());
		}
		info!(
			"subscribing account {} from height {}",
			request.keys.spend_public, request.sync_start.height
		);
		let subscription = Arc::new(Subscription {
			container: Mutex::new(TransfersContainer::new(request.transaction_spendable_age)),
			keys: request.keys,
			sync_start: request.sync_start,
		});
		subscriptions.insert(subscription.keys.spend_public, subscription.clone());
		Ok(subscription)
	}

	/// Drops an account's subscription and its ledger. Returns whether any
	/// subscriptions remain.
	pub fn remove_subscription(&self, spend_public: &PublicKey) -> bool {
		let mut subscriptions = self.subscriptions.write();
		subscriptions.remove(spend_public);
		!subscriptions.is_empty()
	}

	/// The subscription for a spend key, if present
	pub fn get_subscription(&self, spend_public: &PublicKey) -> Option<Arc<Subscription>> {
		self.subscriptions.read().get(spend_public).cloned()
	}

	/// Spend keys of every subscribed account, in address-key order
	pub fn get_subscriptions(&self) -> Vec<PublicKey> {
		self.subscriptions.read().keys().cloned().collect()
	}

	/// Registers a ledger-change listener
	pub fn add_observer(&self, observer: Arc<dyn TransfersObserver>) {
		self.observers.write().push(observer);
	}

	fn notify<F: Fn(&dyn TransfersObserver)>(&self, f: F) {
		for observer in self.observers.read().iter() {
			f(observer.as_ref());
		}
	}

	/// Recognizes this consumer's outputs in one transaction. Returns one
	/// output list per owning account.
	fn find_outputs(
		&self,
		tx: &Transaction,
	) -> BTreeMap<PublicKey, Vec<TransferOutput>> {
		let mut found: BTreeMap<PublicKey, Vec<TransferOutput>> = BTreeMap::new();
		let tx_public_key = match tx.prefix.public_key() {
			Some(key) => key,
			None => return found,
		};
		let derivation = match crypto::generate_key_derivation(&tx_public_key, &self.view.secret)
		{
			Ok(derivation) => derivation,
			Err(_) => {
				debug!("undecodable transaction key in {}", tx.hash());
				return found;
			}
		};

		let tx_hash = tx.hash();
		let subscriptions = self.subscriptions.read();
		for (index, output) in tx.prefix.outputs.iter().enumerate() {
			for (spend_public, subscription) in subscriptions.iter() {
				let expected =
					match crypto::derive_public_key(&derivation, index as u32, spend_public) {
						Ok(key) => key,
						Err(_) => continue,
					};
				let transfer = match &output.target {
					OutputTarget::Key { key } => {
						if *key != expected {
							continue;
						}
						let key_image = subscription.keys.spend_secret.as_ref().map(|secret| {
							let onetime_secret =
								crypto::derive_secret_key(&derivation, index as u32, secret);
							crypto::generate_key_image(key, &onetime_secret)
						});
						TransferOutput {
							output_type: OutputType::Key,
							amount: output.amount,
							global_output_index: UNCONFIRMED_TRANSACTION_GLOBAL_OUTPUT_INDEX,
							output_in_transaction: index as u32,
							transaction_public_key: tx_public_key,
							transaction_hash: tx_hash,
							output_key: Some(*key),
							required_signatures: 0,
							key_image,
						}
					}
					OutputTarget::Multisignature {
						keys,
						required_signatures,
					} => {
						if !keys.contains(&expected) {
							continue;
						}
						TransferOutput {
							output_type: OutputType::Multisignature,
							amount: output.amount,
							global_output_index: UNCONFIRMED_TRANSACTION_GLOBAL_OUTPUT_INDEX,
							output_in_transaction: index as u32,
							transaction_public_key: tx_public_key,
							transaction_hash: tx_hash,
							output_key: None,
							required_signatures: *required_signatures,
							key_image: None,
						}
					}
				};
				found.entry(*spend_public).or_default().push(transfer);
			}
		}
		found
	}

	/// Applies one preprocessed transaction to every container, confirming
	/// instead of re-adding when the container already tracks it from the
	/// pool.
	fn apply_transaction(
		&self,
		tx: &Transaction,
		pre: &PreprocessedTransaction,
	) -> Result<bool, Error> {
		let tx_hash = tx.hash();
		let mut updated_accounts: Vec<PublicKey> = Vec::new();
		{
			let subscriptions = self.subscriptions.read();
			for (spend_public, subscription) in subscriptions.iter() {
				let empty = Vec::new();
				let outputs = pre.outputs.get(spend_public).unwrap_or(&empty);
				let mut container = subscription.container().lock();

				let known = container.get_transaction_information(&tx_hash);
				let updated = match known {
					Some(ref info)
						if info.block_height == WALLET_UNCONFIRMED_TRANSACTION_HEIGHT =>
					{
						container.mark_transaction_confirmed(
							&pre.block,
							&tx_hash,
							&pre.global_indices,
						)?
					}
					Some(_) => false,
					None => {
						let mut outputs = outputs.clone();
						if pre.block.is_confirmed() {
							for out in outputs.iter_mut() {
								let position = out.output_in_transaction as usize;
								if position >= pre.global_indices.len() {
									return Err(Error::internal(format!(
										"node returned {} global indices for {}",
										pre.global_indices.len(),
										tx_hash
									)));
								}
								out.global_output_index = pre.global_indices[position];
							}
						}
						container.add_transaction(&pre.block, tx, &outputs)?
					}
				};
				if updated {
					updated_accounts.push(*spend_public);
				}
			}
		}

		let touched = !updated_accounts.is_empty();
		for spend_public in updated_accounts {
			self.notify(|observer| observer.on_transaction_updated(&spend_public, &tx_hash));
		}
		Ok(touched)
	}

	/// Runs output detection for every transaction of a block and fetches
	/// global indices where needed. No container is touched yet.
	fn preprocess_block(
		&self,
		entry: &BlockShortEntry,
		height: u64,
		min_sync_timestamp: u64,
	) -> Result<Vec<PreprocessedTransaction>, Error> {
		let scan_outputs = entry.timestamp >= min_sync_timestamp
			|| height > self.config.startup_scan_height_cutoff;

		let mut preprocessed = Vec::with_capacity(entry.transactions.len());
		for (tx_index, tx) in entry.transactions.iter().enumerate() {
			let block = TransactionBlockInfo::confirmed(height, entry.timestamp, tx_index as u32);
			let outputs = if scan_outputs {
				self.find_outputs(tx)
			} else {
				BTreeMap::new()
			};

			// canonical indices are only needed when we own something
			let global_indices = if outputs.values().any(|outs| !outs.is_empty()) {
				self.node
					.get_transaction_outs_global_indices(tx.hash())
					.map_err(|e| {
						error!("global output indices for {} failed: {}", tx.hash(), e);
						Error::from(ErrorKind::NodeError)
					})?
			} else {
				Vec::new()
			};

			preprocessed.push(PreprocessedTransaction {
				block,
				outputs,
				global_indices,
			});
		}
		Ok(preprocessed)
	}
}

impl<N: NodeClient> BlockchainConsumer for TransfersConsumer<N> {
	fn id(&self) -> PublicKey {
		self.view.public
	}

	fn get_sync_start(&self) -> SyncStart {
		let subscriptions = self.subscriptions.read();
		let mut sync_start = SyncStart {
			height: u64::max_value(),
			timestamp: u64::max_value(),
		};
		for subscription in subscriptions.values() {
			let s = subscription.sync_start();
			sync_start.height = sync_start.height.min(s.height);
			sync_start.timestamp = sync_start.timestamp.min(s.timestamp);
		}
		if subscriptions.is_empty() {
			SyncStart::default()
		} else {
			sync_start
		}
	}

	fn on_blockchain_detach(&self, height: u64) {
		let mut deleted: Vec<(PublicKey, Hash)> = Vec::new();
		{
			let subscriptions = self.subscriptions.read();
			for (spend_public, subscription) in subscriptions.iter() {
				let removed = subscription.container().lock().detach(height);
				deleted.extend(removed.into_iter().map(|tx_hash| (*spend_public, tx_hash)));
			}
		}
		for (spend_public, tx_hash) in deleted {
			self.notify(|observer| observer.on_transaction_deleted(&spend_public, &tx_hash));
		}
		self.notify(|observer| observer.on_blockchain_detached(height));
	}

	fn on_new_blocks(&self, blocks: &[BlockShortEntry], start_height: u64) -> Result<(), Error> {
		let min_sync_timestamp = self.get_sync_start().timestamp;

		for (offset, entry) in blocks.iter().enumerate() {
			let height = start_height + offset as u64;

			// all node traffic for the block happens before any container
			// mutation, so a failure leaves every ledger at the previous
			// block
			let preprocessed = self.preprocess_block(entry, height, min_sync_timestamp)?;

			for (tx, pre) in entry.transactions.iter().zip(preprocessed.iter()) {
				self.apply_transaction(tx, pre)?;
			}

			// even an empty block advances the unlock clock
			let subscriptions = self.subscriptions.read();
			for subscription in subscriptions.values() {
				let mut container = subscription.container().lock();
				if container.current_height() < height {
					container.advance_height(height);
				}
			}
		}

		let hashes: Vec<Hash> = blocks.iter().map(|b| b.block_hash).collect();
		self.notify(|observer| observer.on_blocks_added(start_height, &hashes));
		Ok(())
	}

	fn on_pool_updated(&self, added: &[Transaction], deleted: &[Hash]) -> Result<(), Error> {
		let block = TransactionBlockInfo::unconfirmed();
		let mut updated: Vec<(PublicKey, Hash)> = Vec::new();
		let mut removed: Vec<(PublicKey, Hash)> = Vec::new();
		{
			let subscriptions = self.subscriptions.read();
			for tx in added {
				let found = self.find_outputs(tx);
				let tx_hash = tx.hash();
				for (spend_public, subscription) in subscriptions.iter() {
					let empty = Vec::new();
					let outputs = found.get(spend_public).unwrap_or(&empty);
					let result = subscription
						.container()
						.lock()
						.add_transaction(&block, tx, outputs);
					match result {
						Ok(true) => updated.push((*spend_public, tx_hash)),
						Ok(false) => {}
						// a pool echo of something we already track
						Err(e) => debug!("pool tx {} not admitted: {}", tx_hash, e),
					}
				}
			}

			for tx_hash in deleted {
				for (spend_public, subscription) in subscriptions.iter() {
					if subscription
						.container()
						.lock()
						.delete_unconfirmed_transaction(tx_hash)
					{
						removed.push((*spend_public, *tx_hash));
					}
				}
			}
		}

		for (spend_public, tx_hash) in updated {
			self.notify(|observer| observer.on_transaction_updated(&spend_public, &tx_hash));
		}
		for (spend_public, tx_hash) in removed {
			self.notify(|observer| observer.on_transaction_deleted(&spend_public, &tx_hash));
		}
		Ok(())
	}

	fn get_known_pool_tx_ids(&self) -> Vec<Hash> {
		let mut known = Vec::new();
		let subscriptions = self.subscriptions.read();
		for subscription in subscriptions.values() {
			for tx_hash in subscription.container().lock().get_unconfirmed_transactions() {
				if !known.contains(&tx_hash) {
					known.push(tx_hash);
				}
			}
		}
		known
	}
}
