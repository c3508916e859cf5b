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

//! The wallet engine: account lifecycle, balances, transaction assembly
//! and submission, fusion, history with stable indices, events, and the
//! encrypted wallet file. One view key serves every address; a single
//! consumer and synchronizer drive all of them.

pub mod events;
pub mod selection;
pub mod storage;
pub mod types;

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use log::{debug, info, warn};
use rand::thread_rng;

use krypton_core::core::hash::Hash;
use krypton_core::core::transaction::{Transaction, TransactionBuilder};
use krypton_core::ser::{read_elems, write_elems, BinReader, BinWriter, Reader, Writer};
use krypton_core::Currency;
use krypton_keychain::{AccountKeys, KeyPair, PublicKey, SecretKey, WalletAddress};
use krypton_util::{Mutex, RwLock, ZeroingString};

use crate::error::{Error, ErrorKind};
use crate::node::NodeClient;
use crate::transfers::consumer::{TransfersConsumer, TransfersObserver};
use crate::transfers::synchronizer::{BlockchainSynchronizer, SyncObserver};
use crate::types::*;

use self::events::EventQueue;
use self::selection::{carve_donation, select_inputs, Candidate};
use self::storage::{decrypt_payload, encrypt_payload, WalletEnvelope};
use self::types::*;

const WALLET_PAYLOAD_VERSION: u8 = 1;
const PAYLOAD_FLAG_DETAILS: u8 = 0x01;
const PAYLOAD_FLAG_CACHE: u8 = 0x02;

struct History {
	transactions: Vec<WalletTransaction>,
	transfers: Vec<Vec<WalletTransfer>>,
	by_hash: HashMap<Hash, TransactionId>,
	block_hashes: Vec<Hash>,
}

impl History {
	fn new(genesis_hash: Hash) -> History {
		History {
			transactions: Vec::new(),
			transfers: Vec::new(),
			by_hash: HashMap::new(),
			block_hashes: vec![genesis_hash],
		}
	}

	fn push(&mut self, transaction: WalletTransaction, transfers: Vec<WalletTransfer>) -> TransactionId {
		let id = self.transactions.len();
		self.by_hash.insert(transaction.hash, id);
		self.transactions.push(transaction);
		self.transfers.push(transfers);
		id
	}
}

struct PendingState {
	/// Outputs consumed by created-but-unconfirmed transactions, keyed by
	/// (source tx hash, output index); value is the locked amount and the
	/// owning account
	locked: HashMap<(Hash, u32), (u64, PublicKey)>,
	/// Which locks belong to which created transaction
	tx_locks: HashMap<Hash, Vec<(Hash, u32)>>,
	/// Built transactions not yet relayed
	uncommitted: HashMap<TransactionId, Transaction>,
	/// Every transaction this engine built, kept for fusion inspection
	built: HashMap<TransactionId, Transaction>,
}

impl PendingState {
	fn new() -> PendingState {
		PendingState {
			locked: HashMap::new(),
			tx_locks: HashMap::new(),
			uncommitted: HashMap::new(),
			built: HashMap::new(),
		}
	}

	fn unlock_for(&mut self, tx_hash: &Hash) {
		if let Some(keys) = self.tx_locks.remove(tx_hash) {
			for key in keys {
				self.locked.remove(&key);
			}
		}
	}
}

struct EngineShared {
	history: Mutex<History>,
	pending: Mutex<PendingState>,
	events: Arc<EventQueue>,
	view_public: PublicKey,
}

struct EngineObserver<N: NodeClient + 'static> {
	shared: Arc<EngineShared>,
	consumer: Weak<TransfersConsumer<N>>,
}

impl<N: NodeClient + 'static> EngineObserver<N> {
	fn address_of(&self, spend_public: &PublicKey) -> String {
		WalletAddress {
			spend_public: *spend_public,
			view_public: self.shared.view_public,
		}
		.to_string()
	}
}

impl<N: NodeClient + 'static> TransfersObserver for EngineObserver<N> {
	fn on_transaction_updated(&self, _spend_public: &PublicKey, tx_hash: &Hash) {
		let consumer = match self.consumer.upgrade() {
			Some(consumer) => consumer,
			None => return,
		};

		// aggregate the transaction's effect across every account
		let mut total: i64 = 0;
		let mut meta: Option<TransactionInformation> = None;
		let mut incoming: Vec<(PublicKey, u64)> = Vec::new();
		for spend_public in consumer.get_subscriptions() {
			if let Some(subscription) = consumer.get_subscription(&spend_public) {
				let info = subscription
					.container()
					.lock()
					.get_transaction_information(tx_hash);
				if let Some(info) = info {
					total += info.total_amount_out as i64 - info.total_amount_in as i64;
					if info.total_amount_out > 0 {
						incoming.push((spend_public, info.total_amount_out));
					}
					meta = Some(info);
				}
			}
		}
		let meta = match meta {
			Some(meta) => meta,
			None => return,
		};

		let mut created_event: Option<WalletEvent> = None;
		let mut updated_event: Option<WalletEvent> = None;
		{
			let mut history = self.shared.history.lock();
			match history.by_hash.get(tx_hash).cloned() {
				Some(id) => {
					let entry = &mut history.transactions[id];
					entry.block_height = meta.block_height;
					entry.timestamp = meta.timestamp;
					if entry.state != WalletTransactionState::Failed {
						entry.state = WalletTransactionState::Succeeded;
					}
					updated_event = Some(WalletEvent::TransactionUpdated(id));
				}
				None => {
					let transfers: Vec<WalletTransfer> = incoming
						.iter()
						.map(|(spend_public, amount)| WalletTransfer {
							transfer_type: WalletTransferType::Usual,
							address: self.address_of(spend_public),
							amount: *amount as i64,
						})
						.collect();
					let id = history.push(
						WalletTransaction {
							state: WalletTransactionState::Succeeded,
							timestamp: meta.timestamp,
							block_height: meta.block_height,
							hash: *tx_hash,
							total_amount: total,
							fee: meta.fee,
							creation_time: Utc::now().timestamp() as u64,
							unlock_time: meta.unlock_time,
							extra: meta.extra.clone(),
							is_base: meta.is_base,
						},
						transfers,
					);
					created_event = Some(WalletEvent::TransactionCreated(id));
				}
			}
		}

		// a relayed transaction of ours has been observed; its inputs no
		// longer need the engine-side lock
		self.shared.pending.lock().unlock_for(tx_hash);

		if let Some(event) = created_event {
			self.shared.events.push(event);
		}
		if let Some(event) = updated_event {
			self.shared.events.push(event);
		}
		self.shared.events.push(WalletEvent::BalanceChanged);
		self.shared.events.push(WalletEvent::PendingBalanceChanged);
	}

	fn on_transaction_deleted(&self, _spend_public: &PublicKey, tx_hash: &Hash) {
		let mut event = None;
		{
			let mut history = self.shared.history.lock();
			if let Some(id) = history.by_hash.get(tx_hash).cloned() {
				let entry = &mut history.transactions[id];
				if entry.state == WalletTransactionState::Succeeded {
					entry.state = WalletTransactionState::Cancelled;
					event = Some(WalletEvent::TransactionUpdated(id));
				}
			}
		}
		if let Some(event) = event {
			self.shared.events.push(event);
			self.shared.events.push(WalletEvent::BalanceChanged);
			self.shared.events.push(WalletEvent::PendingBalanceChanged);
		}
	}

	fn on_blocks_added(&self, start_height: u64, block_hashes: &[Hash]) {
		let mut history = self.shared.history.lock();
		history.block_hashes.truncate(start_height as usize);
		history.block_hashes.extend_from_slice(block_hashes);
	}

	fn on_blockchain_detached(&self, height: u64) {
		let mut history = self.shared.history.lock();
		history.block_hashes.truncate((height.max(1)) as usize);
	}
}

impl<N: NodeClient + 'static> SyncObserver for EngineObserver<N> {
	fn synchronization_progress_updated(&self, processed: u64, total: u64) {
		self.shared
			.events
			.push(WalletEvent::SyncProgressUpdated(processed, total));
	}

	fn synchronization_completed(&self, error: Option<ErrorKind>) {
		if let Some(kind) = error {
			warn!("synchronization round failed: {}", kind);
		}
		self.shared.events.push(WalletEvent::SyncCompleted);
	}
}

struct WalletInner<N: NodeClient + 'static> {
	password: ZeroingString,
	view: KeyPair,
	consumer: Arc<TransfersConsumer<N>>,
	synchronizer: Arc<BlockchainSynchronizer<N>>,
	addresses: Vec<PublicKey>,
	shared: Arc<EngineShared>,
}

/// The wallet engine
pub struct Wallet<N: NodeClient + 'static> {
	currency: Currency,
	sync_config: SyncConfig,
	node: Arc<N>,
	genesis_hash: Hash,
	events: Arc<EventQueue>,
	stopped: AtomicBool,
	inner: RwLock<Option<WalletInner<N>>>,
}

impl<N: NodeClient + 'static> Wallet<N> {
	/// An uninitialized wallet bound to a node
	pub fn new(
		node: Arc<N>,
		currency: Currency,
		sync_config: SyncConfig,
		genesis_hash: Hash,
	) -> Wallet<N> {
		Wallet {
			currency,
			sync_config,
			node,
			genesis_hash,
			events: Arc::new(EventQueue::new()),
			stopped: AtomicBool::new(false),
			inner: RwLock::new(None),
		}
	}

	// -----------------------------------------------------------------
	// lifecycle
	// -----------------------------------------------------------------

	/// Initializes a fresh wallet with a random view key
	pub fn initialize(&self, password: &str) -> Result<(), Error> {
		self.check_running()?;
		let view = KeyPair::generate(&mut thread_rng());
		self.init_with(view, password)
	}

	/// Initializes a wallet from an existing view secret
	pub fn initialize_with_view_key(
		&self,
		view_secret: SecretKey,
		password: &str,
	) -> Result<(), Error> {
		self.check_running()?;
		self.init_with(KeyPair::from_secret(view_secret), password)
	}

	fn init_with(&self, view: KeyPair, password: &str) -> Result<(), Error> {
		let mut guard = self.inner.write();
		if guard.is_some() {
			return Err(ErrorKind::AlreadyInitialized.into());
		}
		let inner = self.build_inner(view, password)?;
		inner.synchronizer.start()?;
		*guard = Some(inner);
		info!("wallet initialized");
		Ok(())
	}

	fn build_inner(&self, view: KeyPair, password: &str) -> Result<WalletInner<N>, Error> {
		let consumer = Arc::new(TransfersConsumer::new(
			self.currency.clone(),
			self.sync_config.clone(),
			self.node.clone(),
			view.clone(),
		));
		let synchronizer = Arc::new(BlockchainSynchronizer::new(
			self.node.clone(),
			self.genesis_hash,
			self.sync_config.clone(),
			std::time::Duration::from_secs(self.currency.forget_deleted_pool_tx_after()),
		));
		let shared = Arc::new(EngineShared {
			history: Mutex::new(History::new(self.genesis_hash)),
			pending: Mutex::new(PendingState::new()),
			events: self.events.clone(),
			view_public: view.public,
		});
		let observer = Arc::new(EngineObserver {
			shared: shared.clone(),
			consumer: Arc::downgrade(&consumer),
		});
		let transfers_observer: Arc<dyn TransfersObserver> = observer.clone();
		consumer.add_observer(transfers_observer);
		let sync_observer: Arc<dyn SyncObserver> = observer;
		synchronizer.add_observer(sync_observer);
		synchronizer.add_consumer(consumer.clone())?;

		Ok(WalletInner {
			password: ZeroingString::from(password),
			view,
			consumer,
			synchronizer,
			addresses: Vec::new(),
			shared,
		})
	}

	/// Tears the wallet down to the uninitialized state
	pub fn shutdown(&self) -> Result<(), Error> {
		let mut guard = self.inner.write();
		let inner = guard.take().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;
		inner.synchronizer.stop();
		self.events.shutdown();
		self.events.reopen();
		Ok(())
	}

	/// Halts synchronization and wakes every blocked caller with
	/// `OperationStopped`
	pub fn stop(&self) {
		if self.stopped.swap(true, Ordering::SeqCst) {
			return;
		}
		if let Some(inner) = self.inner.read().as_ref() {
			inner.synchronizer.stop();
		}
		self.events.shutdown();
	}

	/// Resumes after `stop`, from the persisted cursor
	pub fn start(&self) {
		if !self.stopped.swap(false, Ordering::SeqCst) {
			return;
		}
		self.events.reopen();
		if let Some(inner) = self.inner.read().as_ref() {
			if let Err(e) = inner.synchronizer.start() {
				warn!("synchronizer restart failed: {}", e);
			}
		}
	}

	/// Re-encrypts the wallet under a new password
	pub fn change_password(&self, old_password: &str, new_password: &str) -> Result<(), Error> {
		self.check_running()?;
		let mut guard = self.inner.write();
		let inner = guard.as_mut().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;
		if &*inner.password != old_password {
			return Err(ErrorKind::WrongPassword.into());
		}
		inner.password = ZeroingString::from(new_password);
		Ok(())
	}

	fn check_running(&self) -> Result<(), Error> {
		if self.stopped.load(Ordering::SeqCst) {
			return Err(ErrorKind::Stopped.into());
		}
		Ok(())
	}

	// -----------------------------------------------------------------
	// keys and addresses
	// -----------------------------------------------------------------

	/// The wallet's view key pair
	pub fn get_view_key(&self) -> Result<KeyPair, Error> {
		self.check_running()?;
		let guard = self.inner.read();
		let inner = guard.as_ref().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;
		Ok(inner.view.clone())
	}

	/// Number of addresses in the wallet
	pub fn get_address_count(&self) -> Result<usize, Error> {
		let guard = self.inner.read();
		let inner = guard.as_ref().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;
		Ok(inner.addresses.len())
	}

	/// The address at the given creation index
	pub fn get_address(&self, index: usize) -> Result<String, Error> {
		let guard = self.inner.read();
		let inner = guard.as_ref().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;
		let spend_public = inner
			.addresses
			.get(index)
			.ok_or_else(|| Error::from(ErrorKind::IndexOutOfRange))?;
		Ok(WalletAddress {
			spend_public: *spend_public,
			view_public: inner.view.public,
		}
		.to_string())
	}

	/// The spend keys behind an address; tracking addresses yield no
	/// secret
	pub fn get_address_spend_key(
		&self,
		index: usize,
	) -> Result<(PublicKey, Option<SecretKey>), Error> {
		self.check_running()?;
		let guard = self.inner.read();
		let inner = guard.as_ref().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;
		let spend_public = inner
			.addresses
			.get(index)
			.ok_or_else(|| Error::from(ErrorKind::IndexOutOfRange))?;
		let subscription = inner
			.consumer
			.get_subscription(spend_public)
			.ok_or_else(|| Error::from(ErrorKind::AddressNotFound))?;
		Ok((
			*spend_public,
			subscription.keys().spend_secret.clone(),
		))
	}

	/// Creates a fresh spendable address
	pub fn create_address(&self) -> Result<String, Error> {
		self.check_running()?;
		let guard = self.inner.read();
		let inner = guard.as_ref().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;
		let keys = AccountKeys::generate(inner.view.clone(), &mut thread_rng());
		drop(guard);
		self.add_account(keys)
	}

	/// Recreates an address from its spend secret
	pub fn create_address_from_secret(&self, spend_secret: SecretKey) -> Result<String, Error> {
		self.check_running()?;
		let guard = self.inner.read();
		let inner = guard.as_ref().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;
		let keys = AccountKeys::from_spend_secret(inner.view.clone(), spend_secret);
		drop(guard);
		self.add_account(keys)
	}

	/// Creates a tracking address from a spend public key alone
	pub fn create_tracking_address(&self, spend_public: PublicKey) -> Result<String, Error> {
		self.check_running()?;
		let guard = self.inner.read();
		let inner = guard.as_ref().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;
		let keys = AccountKeys::tracking(inner.view.clone(), spend_public);
		drop(guard);
		self.add_account(keys)
	}

	fn add_account(&self, keys: AccountKeys) -> Result<String, Error> {
		let mut guard = self.inner.write();
		let inner = guard.as_mut().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;
		if inner.addresses.contains(&keys.spend_public) {
			return Err(Error::internal("address already exists in this wallet"));
		}
		let address = keys.address().to_string();
		let spend_public = keys.spend_public;
		inner.consumer.add_subscription(SubscriptionRequest {
			keys,
			sync_start: SyncStart::default(),
			transaction_spendable_age: self.sync_config.transaction_spendable_age,
		})?;
		inner.addresses.push(spend_public);
		debug!("created address {}", address);
		Ok(address)
	}

	/// Removes an address and its outputs ledger
	pub fn delete_address(&self, address: &str) -> Result<(), Error> {
		self.check_running()?;
		let mut guard = self.inner.write();
		let inner = guard.as_mut().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;
		let spend_public = parse_own_address(inner, address)?;
		inner.consumer.remove_subscription(&spend_public);
		inner.addresses.retain(|key| *key != spend_public);
		Ok(())
	}

	// -----------------------------------------------------------------
	// balances
	// -----------------------------------------------------------------

	/// Spendable balance over the whole wallet
	pub fn get_actual_balance(&self) -> Result<u64, Error> {
		self.balance_impl(None, true)
	}

	/// Spendable balance of one address
	pub fn get_actual_balance_for(&self, address: &str) -> Result<u64, Error> {
		self.balance_impl(Some(address), true)
	}

	/// Balance still locked (unconfirmed or soft-locked) over the whole
	/// wallet
	pub fn get_pending_balance(&self) -> Result<u64, Error> {
		self.balance_impl(None, false)
	}

	/// Locked balance of one address
	pub fn get_pending_balance_for(&self, address: &str) -> Result<u64, Error> {
		self.balance_impl(Some(address), false)
	}

	fn balance_impl(&self, address: Option<&str>, actual: bool) -> Result<u64, Error> {
		self.check_running()?;
		let guard = self.inner.read();
		let inner = guard.as_ref().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;
		let accounts: Vec<PublicKey> = match address {
			Some(address) => vec![parse_own_address(inner, address)?],
			None => inner.addresses.clone(),
		};

		let mut total: u64 = 0;
		for account in &accounts {
			let subscription = inner
				.consumer
				.get_subscription(account)
				.ok_or_else(|| Error::from(ErrorKind::AddressNotFound))?;
			let container = subscription.container().lock();
			if actual {
				total += container.balance(INCLUDE_ALL_UNLOCKED);
			} else {
				total += container.balance(INCLUDE_ALL_LOCKED);
			}
		}

		if actual {
			// outputs reserved by created transactions are not spendable
			let pending = inner.shared.pending.lock();
			for ((_, _), (amount, account)) in pending.locked.iter() {
				if accounts.contains(account) {
					total = total.saturating_sub(*amount);
				}
			}
		}
		Ok(total)
	}

	// -----------------------------------------------------------------
	// transaction assembly
	// -----------------------------------------------------------------

	/// Builds, signs and relays a transaction in one call. A relay failure
	/// marks the transaction `Failed` and releases its inputs.
	pub fn transfer(&self, parameters: TransactionParameters) -> Result<TransactionId, Error> {
		let id = self.make_transaction(parameters)?;
		match self.commit_transaction(id) {
			Ok(()) => Ok(id),
			Err(e) => {
				self.abandon_created(id, WalletTransactionState::Failed);
				Err(e)
			}
		}
	}

	/// Builds and signs a transaction, locks its inputs, and parks it in
	/// the `Created` state awaiting `commit_transaction`
	pub fn make_transaction(
		&self,
		parameters: TransactionParameters,
	) -> Result<TransactionId, Error> {
		self.check_running()?;
		let guard = self.inner.read();
		let inner = guard.as_ref().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;

		// ---- preflight validation, nothing mutated past this block ----
		if parameters.destinations.is_empty() {
			return Err(ErrorKind::ZeroDestination.into());
		}
		let mut destination_total: u64 = 0;
		for destination in &parameters.destinations {
			if destination.amount == 0 {
				return Err(ErrorKind::ZeroDestination.into());
			}
			if destination.amount > i64::max_value() as u64 {
				return Err(ErrorKind::WrongAmount.into());
			}
			destination_total = destination_total
				.checked_add(destination.amount)
				.ok_or_else(|| Error::from(ErrorKind::WrongAmount))?;
		}
		if destination_total > i64::max_value() as u64 {
			return Err(ErrorKind::WrongAmount.into());
		}
		let destination_addresses: Vec<WalletAddress> = parameters
			.destinations
			.iter()
			.map(|destination| {
				WalletAddress::parse(&destination.address)
					.map_err(|_| Error::from(ErrorKind::BadAddress))
			})
			.collect::<Result<_, _>>()?;
		if parameters.fee < self.currency.minimum_fee() {
			return Err(ErrorKind::FeeTooSmall.into());
		}
		if parameters.mixin > self.currency.max_mixin() {
			return Err(ErrorKind::MixinCountTooBig.into());
		}

		let sources = resolve_sources(inner, &parameters.source_addresses)?;
		let change_account = resolve_change_account(inner, &parameters)?;

		let donation = match parameters.donation {
			Some(ref donation) => {
				let address = WalletAddress::parse(&donation.address)
					.map_err(|_| Error::from(ErrorKind::BadAddress))?;
				if donation.threshold == 0 {
					return Err(ErrorKind::WrongAmount.into());
				}
				Some((address, donation.threshold))
			}
			None => None,
		};

		// ---- source selection ----
		let needed = destination_total
			.checked_add(parameters.fee)
			.ok_or_else(|| Error::from(ErrorKind::WrongAmount))?;
		let candidates = gather_candidates(inner, &sources)?;
		let selected = select_inputs(candidates, needed, self.currency.default_dust_threshold())?;
		let input_total: u64 = selected.iter().map(|c| c.output.amount).sum();

		// ---- output composition ----
		let mut change = input_total - destination_total - parameters.fee;
		let mut donation_cut: Option<(WalletAddress, u64)> = None;
		if let Some((address, threshold)) = donation {
			if change >= threshold {
				let (donated, rest) = carve_donation(change, threshold);
				if donated > 0 {
					donation_cut = Some((address, donated));
					change = rest;
				}
			}
		}

		let change_address = WalletAddress {
			spend_public: change_account,
			view_public: inner.view.public,
		};

		// ---- build and sign ----
		let mut rng = thread_rng();
		let mut builder = TransactionBuilder::new(&mut rng);
		builder.set_unlock_time(parameters.unlock_timestamp);
		if let Some(payment_id) = parameters.payment_id {
			builder.set_payment_id(payment_id);
		}
		if !parameters.extra.is_empty() {
			builder.append_extra_nonce(parameters.extra.clone());
		}

		self.add_ring_inputs(inner, &mut builder, &selected, parameters.mixin)?;

		for (destination, address) in parameters
			.destinations
			.iter()
			.zip(destination_addresses.iter())
		{
			for chunk in self.currency.decompose_amount(destination.amount) {
				builder.add_key_output(chunk, address)?;
			}
		}
		if let Some((ref address, amount)) = donation_cut {
			for chunk in self.currency.decompose_amount(amount) {
				builder.add_key_output(chunk, address)?;
			}
		}
		if change > 0 {
			for chunk in self.currency.decompose_amount(change) {
				builder.add_key_output(chunk, &change_address)?;
			}
		}

		let tx = builder.build(&mut rng)?;
		if tx.size() > self.currency.max_transaction_size() {
			return Err(ErrorKind::TransactionSizeTooBig.into());
		}

		// ---- record, lock inputs ----
		let tx_hash = tx.hash();
		let mut transfers: Vec<WalletTransfer> = parameters
			.destinations
			.iter()
			.map(|destination| WalletTransfer {
				transfer_type: WalletTransferType::Usual,
				address: destination.address.clone(),
				amount: destination.amount as i64,
			})
			.collect();
		if let Some((ref address, amount)) = donation_cut {
			transfers.push(WalletTransfer {
				transfer_type: WalletTransferType::Donation,
				address: address.to_string(),
				amount: amount as i64,
			});
		}
		if change > 0 {
			transfers.push(WalletTransfer {
				transfer_type: WalletTransferType::Change,
				address: change_address.to_string(),
				amount: change as i64,
			});
		}

		let donated: u64 = donation_cut.map(|(_, amount)| amount).unwrap_or(0);
		let entry = WalletTransaction {
			state: WalletTransactionState::Created,
			timestamp: 0,
			block_height: WALLET_UNCONFIRMED_TRANSACTION_HEIGHT,
			hash: tx_hash,
			total_amount: -((destination_total + donated + parameters.fee) as i64),
			fee: parameters.fee,
			creation_time: Utc::now().timestamp() as u64,
			unlock_time: parameters.unlock_timestamp,
			extra: tx.prefix.extra.clone(),
			is_base: false,
		};

		let id = {
			let mut history = inner.shared.history.lock();
			history.push(entry, transfers)
		};
		{
			let mut pending = inner.shared.pending.lock();
			let mut lock_keys = Vec::with_capacity(selected.len());
			for candidate in &selected {
				let key = candidate.lock_key();
				pending
					.locked
					.insert(key, (candidate.output.amount, candidate.account));
				lock_keys.push(key);
			}
			pending.tx_locks.insert(tx_hash, lock_keys);
			pending.uncommitted.insert(id, tx.clone());
			pending.built.insert(id, tx);
		}

		self.events.push(WalletEvent::TransactionCreated(id));
		self.events.push(WalletEvent::BalanceChanged);
		Ok(id)
	}

	/// Relays a created transaction. Success moves it to `Succeeded`; a
	/// failure leaves it `Created` so the caller may retry or roll back.
	pub fn commit_transaction(&self, id: TransactionId) -> Result<(), Error> {
		self.check_running()?;
		let tx = {
			let guard = self.inner.read();
			let inner = guard.as_ref().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;
			let history = inner.shared.history.lock();
			let entry = history
				.transactions
				.get(id)
				.ok_or_else(|| Error::from(ErrorKind::IndexOutOfRange))?;
			if entry.state != WalletTransactionState::Created {
				return Err(ErrorKind::TxTransferImpossible.into());
			}
			let pending = inner.shared.pending.lock();
			pending
				.uncommitted
				.get(&id)
				.cloned()
				.ok_or_else(|| Error::from(ErrorKind::TxTransferImpossible))?
		};

		// no wallet lock across the relay
		self.node
			.relay_transaction(&tx)
			.map_err(|e| {
				warn!("transaction relay failed: {}", e);
				e
			})?;

		let guard = self.inner.read();
		let inner = guard.as_ref().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;
		{
			let mut history = inner.shared.history.lock();
			history.transactions[id].state = WalletTransactionState::Succeeded;
		}
		inner.shared.pending.lock().uncommitted.remove(&id);
		self.events.push(WalletEvent::TransactionUpdated(id));
		self.events.push(WalletEvent::PendingBalanceChanged);
		Ok(())
	}

	/// Cancels a created transaction and releases its inputs. Legal only
	/// from the `Created` state.
	pub fn rollback_uncommitted_transaction(&self, id: TransactionId) -> Result<(), Error> {
		self.check_running()?;
		let guard = self.inner.read();
		let inner = guard.as_ref().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;
		{
			let history = inner.shared.history.lock();
			let entry = history
				.transactions
				.get(id)
				.ok_or_else(|| Error::from(ErrorKind::IndexOutOfRange))?;
			if entry.state != WalletTransactionState::Created {
				return Err(ErrorKind::TxCancelImpossible.into());
			}
		}
		drop(guard);
		self.abandon_created(id, WalletTransactionState::Cancelled);
		Ok(())
	}

	/// Shared teardown of a created transaction (rollback or failed
	/// transfer)
	fn abandon_created(&self, id: TransactionId, state: WalletTransactionState) {
		let guard = self.inner.read();
		let inner = match guard.as_ref() {
			Some(inner) => inner,
			None => return,
		};
		let tx_hash = {
			let mut history = inner.shared.history.lock();
			match history.transactions.get_mut(id) {
				Some(entry) => {
					entry.state = state;
					entry.hash
				}
				None => return,
			}
		};
		let mut pending = inner.shared.pending.lock();
		pending.unlock_for(&tx_hash);
		pending.uncommitted.remove(&id);
		drop(pending);
		self.events.push(WalletEvent::TransactionUpdated(id));
		self.events.push(WalletEvent::BalanceChanged);
	}

	fn add_ring_inputs(
		&self,
		inner: &WalletInner<N>,
		builder: &mut TransactionBuilder,
		selected: &[Candidate],
		mixin: u64,
	) -> Result<(), Error> {
		// one decoy draw covers every input amount
		let decoys_by_amount: HashMap<u64, Vec<crate::node::RandomOutEntry>> = if mixin > 0 {
			let amounts: Vec<u64> = selected.iter().map(|c| c.output.amount).collect();
			let drawn = self
				.node
				.get_random_outs_by_amounts(&amounts, mixin + 1)
				.map_err(|_| Error::from(ErrorKind::NodeError))?;
			drawn
				.into_iter()
				.map(|entry| (entry.amount, entry.outs))
				.collect()
		} else {
			HashMap::new()
		};

		let mut rng = thread_rng();
		for candidate in selected {
			let subscription = inner
				.consumer
				.get_subscription(&candidate.account)
				.ok_or_else(|| Error::from(ErrorKind::AddressNotFound))?;
			let spend_secret = subscription
				.keys()
				.spend_secret
				.as_ref()
				.ok_or_else(|| Error::from(ErrorKind::TxTransferImpossible))?;

			let output_key = candidate
				.output
				.output_key
				.ok_or_else(|| Error::internal("key output without a one-time key"))?;
			let derivation = krypton_keychain::crypto::generate_key_derivation(
				&candidate.output.transaction_public_key,
				&inner.view.secret,
			)?;
			let onetime_secret = krypton_keychain::crypto::derive_secret_key(
				&derivation,
				candidate.output.output_in_transaction,
				spend_secret,
			);

			let mut ring: Vec<(u64, PublicKey)> = Vec::new();
			if mixin > 0 {
				let decoys = decoys_by_amount
					.get(&candidate.output.amount)
					.map(|outs| outs.as_slice())
					.unwrap_or(&[]);
				for decoy in decoys {
					if decoy.global_index != candidate.output.global_output_index {
						ring.push((decoy.global_index, decoy.output_key));
					}
					if ring.len() as u64 == mixin {
						break;
					}
				}
				if (ring.len() as u64) < mixin {
					return Err(ErrorKind::MixinCountTooBig.into());
				}
			}
			let real_index = if ring.is_empty() {
				0
			} else {
				use rand::Rng;
				rng.gen_range(0, ring.len() + 1)
			};
			ring.insert(
				real_index,
				(candidate.output.global_output_index, output_key),
			);

			builder.add_key_input(
				candidate.output.amount,
				&ring,
				real_index,
				onetime_secret,
			)?;
		}
		Ok(())
	}

	// -----------------------------------------------------------------
	// fusion
	// -----------------------------------------------------------------

	/// Builds and relays a fusion transaction consolidating small outputs
	/// below `threshold`. Returns `None` when there is not enough to fuse.
	pub fn create_fusion_transaction(
		&self,
		threshold: u64,
		mixin: u64,
		source_addresses: Vec<String>,
		destination: Option<String>,
	) -> Result<Option<TransactionId>, Error> {
		self.check_running()?;
		let guard = self.inner.read();
		let inner = guard.as_ref().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;

		if threshold <= self.currency.default_dust_threshold() {
			return Err(ErrorKind::WrongAmount.into());
		}
		if mixin > self.currency.max_mixin() {
			return Err(ErrorKind::MixinCountTooBig.into());
		}
		let sources = resolve_sources(inner, &source_addresses)?;
		let destination_account = match destination {
			Some(ref address) => {
				let parsed = WalletAddress::parse(address)
					.map_err(|_| Error::from(ErrorKind::BadAddress))?;
				find_own_account(inner, &parsed)?
			}
			None => {
				if source_addresses.len() == 1 {
					sources[0]
				} else if inner.addresses.len() == 1 {
					inner.addresses[0]
				} else {
					return Err(ErrorKind::DestinationAddressRequired.into());
				}
			}
		};
		let destination_address = WalletAddress {
			spend_public: destination_account,
			view_public: inner.view.public,
		};

		// fusion-ready inputs, smallest first
		let mut candidates: Vec<Candidate> = gather_candidates(inner, &sources)?
			.into_iter()
			.filter(|c| {
				self.currency
					.is_applicable_in_fusion_input(c.output.amount, threshold)
			})
			.collect();
		candidates.sort_by_key(|c| c.output.amount);

		if candidates.len() < self.currency.fusion_tx_min_input_count() {
			return Ok(None);
		}

		// cap by an estimate of per-input size, then shrink until the
		// result satisfies the fusion shape and size rules
		let ring_size = (mixin + 1) as usize;
		let estimated_input_size = 17 + ring_size * 8 + 32 + ring_size * 64 + 16;
		let max_inputs = (self.currency.fusion_tx_max_size() / estimated_input_size)
			.max(self.currency.fusion_tx_min_input_count());
		candidates.truncate(max_inputs);

		loop {
			if candidates.len() < self.currency.fusion_tx_min_input_count() {
				return Ok(None);
			}
			let input_total: u64 = candidates.iter().map(|c| c.output.amount).sum();
			let outputs = self.currency.decompose_amount(input_total);
			if candidates.len() < outputs.len() * self.currency.fusion_tx_min_in_out_count_ratio()
			{
				// dropping the largest input trims the digit count fastest
				candidates.pop();
				continue;
			}

			let mut rng = thread_rng();
			let mut builder = TransactionBuilder::new(&mut rng);
			self.add_ring_inputs(inner, &mut builder, &candidates, mixin)?;
			for chunk in &outputs {
				builder.add_key_output(*chunk, &destination_address)?;
			}
			let tx = builder.build(&mut rng)?;

			if tx.size() > self.currency.fusion_tx_max_size() {
				candidates.pop();
				continue;
			}

			// record + relay
			let tx_hash = tx.hash();
			let entry = WalletTransaction {
				state: WalletTransactionState::Created,
				timestamp: 0,
				block_height: WALLET_UNCONFIRMED_TRANSACTION_HEIGHT,
				hash: tx_hash,
				total_amount: 0,
				fee: 0,
				creation_time: Utc::now().timestamp() as u64,
				unlock_time: 0,
				extra: tx.prefix.extra.clone(),
				is_base: false,
			};
			let id = {
				let mut history = inner.shared.history.lock();
				history.push(entry, Vec::new())
			};
			{
				let mut pending = inner.shared.pending.lock();
				let mut lock_keys = Vec::with_capacity(candidates.len());
				for candidate in &candidates {
					let key = candidate.lock_key();
					pending
						.locked
						.insert(key, (candidate.output.amount, candidate.account));
					lock_keys.push(key);
				}
				pending.tx_locks.insert(tx_hash, lock_keys);
				pending.uncommitted.insert(id, tx.clone());
				pending.built.insert(id, tx);
			}
			self.events.push(WalletEvent::TransactionCreated(id));
			drop(guard);

			return match self.commit_transaction(id) {
				Ok(()) => Ok(Some(id)),
				Err(e) => {
					self.abandon_created(id, WalletTransactionState::Failed);
					Err(e)
				}
			};
		}
	}

	/// Whether an engine-built transaction satisfies the node-side fusion
	/// predicate
	pub fn is_fusion_transaction(&self, id: TransactionId) -> Result<bool, Error> {
		self.check_running()?;
		let guard = self.inner.read();
		let inner = guard.as_ref().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;
		{
			let history = inner.shared.history.lock();
			if id >= history.transactions.len() {
				return Err(ErrorKind::IndexOutOfRange.into());
			}
		}
		let pending = inner.shared.pending.lock();
		Ok(pending
			.built
			.get(&id)
			.map(|tx| self.currency.is_fusion_transaction(tx))
			.unwrap_or(false))
	}

	/// Counts what a fusion with the given threshold could consume without
	/// acting on it
	pub fn estimate_fusion(
		&self,
		threshold: u64,
		source_addresses: Vec<String>,
	) -> Result<FusionEstimate, Error> {
		self.check_running()?;
		let guard = self.inner.read();
		let inner = guard.as_ref().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;
		let sources = resolve_sources(inner, &source_addresses)?;

		let mut estimate = FusionEstimate::default();
		for account in &sources {
			let subscription = inner
				.consumer
				.get_subscription(account)
				.ok_or_else(|| Error::from(ErrorKind::AddressNotFound))?;
			let container = subscription.container().lock();
			estimate.total_output_count += container.get_outputs(INCLUDE_ALL).len();
			estimate.fusion_ready_count += container
				.get_outputs(INCLUDE_ALL_UNLOCKED)
				.iter()
				.filter(|out| {
					self.currency
						.is_applicable_in_fusion_input(out.amount, threshold)
				})
				.count();
		}
		Ok(estimate)
	}

	// -----------------------------------------------------------------
	// history
	// -----------------------------------------------------------------

	/// Number of history entries
	pub fn get_transaction_count(&self) -> Result<usize, Error> {
		let guard = self.inner.read();
		let inner = guard.as_ref().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;
		let history = inner.shared.history.lock();
		Ok(history.transactions.len())
	}

	/// One history entry by stable id
	pub fn get_transaction(&self, id: TransactionId) -> Result<WalletTransaction, Error> {
		let guard = self.inner.read();
		let inner = guard.as_ref().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;
		let history = inner.shared.history.lock();
		history
			.transactions
			.get(id)
			.cloned()
			.ok_or_else(|| Error::from(ErrorKind::IndexOutOfRange))
	}

	/// Looks an entry up by hash
	pub fn get_transaction_by_hash(&self, hash: &Hash) -> Result<WalletTransaction, Error> {
		let guard = self.inner.read();
		let inner = guard.as_ref().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;
		let history = inner.shared.history.lock();
		history
			.by_hash
			.get(hash)
			.and_then(|id| history.transactions.get(*id))
			.cloned()
			.ok_or_else(|| Error::from(ErrorKind::IndexOutOfRange))
	}

	/// Number of transfer lines within a transaction
	pub fn get_transaction_transfer_count(&self, id: TransactionId) -> Result<usize, Error> {
		let guard = self.inner.read();
		let inner = guard.as_ref().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;
		let history = inner.shared.history.lock();
		history
			.transfers
			.get(id)
			.map(|transfers| transfers.len())
			.ok_or_else(|| Error::from(ErrorKind::IndexOutOfRange))
	}

	/// One transfer line of a transaction
	pub fn get_transaction_transfer(
		&self,
		id: TransactionId,
		transfer_index: usize,
	) -> Result<WalletTransfer, Error> {
		let guard = self.inner.read();
		let inner = guard.as_ref().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;
		let history = inner.shared.history.lock();
		history
			.transfers
			.get(id)
			.and_then(|transfers| transfers.get(transfer_index))
			.cloned()
			.ok_or_else(|| Error::from(ErrorKind::IndexOutOfRange))
	}

	/// Confirmed transactions grouped per block for `count` blocks
	/// starting at `block_index`
	pub fn get_transactions(
		&self,
		block_index: u64,
		count: usize,
	) -> Result<Vec<TransactionsInBlock>, Error> {
		let guard = self.inner.read();
		let inner = guard.as_ref().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;
		let history = inner.shared.history.lock();
		let mut result = Vec::new();
		for offset in 0..count {
			let height = block_index + offset as u64;
			let block_hash = match history.block_hashes.get(height as usize) {
				Some(hash) => *hash,
				None => break,
			};
			let transactions: Vec<WalletTransaction> = history
				.transactions
				.iter()
				.filter(|tx| tx.block_height == height)
				.cloned()
				.collect();
			result.push(TransactionsInBlock {
				block_hash,
				transactions,
			});
		}
		Ok(result)
	}

	/// As `get_transactions`, anchored at a block hash
	pub fn get_transactions_by_block_hash(
		&self,
		block_hash: &Hash,
		count: usize,
	) -> Result<Vec<TransactionsInBlock>, Error> {
		let start = {
			let guard = self.inner.read();
			let inner = guard.as_ref().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;
			let history = inner.shared.history.lock();
			history
				.block_hashes
				.iter()
				.position(|hash| hash == block_hash)
		};
		match start {
			Some(index) => self.get_transactions(index as u64, count),
			None => Ok(Vec::new()),
		}
	}

	/// Hashes of `count` blocks starting at `block_index`
	pub fn get_block_hashes(&self, block_index: u64, count: usize) -> Result<Vec<Hash>, Error> {
		let guard = self.inner.read();
		let inner = guard.as_ref().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;
		let history = inner.shared.history.lock();
		Ok(history
			.block_hashes
			.iter()
			.skip(block_index as usize)
			.take(count)
			.cloned()
			.collect())
	}

	/// Number of blocks the wallet has seen (genesis included)
	pub fn get_block_count(&self) -> Result<usize, Error> {
		let guard = self.inner.read();
		let inner = guard.as_ref().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;
		let history = inner.shared.history.lock();
		Ok(history.block_hashes.len())
	}

	/// Successful transactions not yet in a block
	pub fn get_unconfirmed_transactions(&self) -> Result<Vec<WalletTransaction>, Error> {
		let guard = self.inner.read();
		let inner = guard.as_ref().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;
		let history = inner.shared.history.lock();
		Ok(history
			.transactions
			.iter()
			.filter(|tx| tx.state == WalletTransactionState::Succeeded && !tx.in_blockchain())
			.cloned()
			.collect())
	}

	/// Ids of transactions parked in the `Created` state
	pub fn get_delayed_transaction_ids(&self) -> Result<Vec<TransactionId>, Error> {
		let guard = self.inner.read();
		let inner = guard.as_ref().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;
		let history = inner.shared.history.lock();
		Ok(history
			.transactions
			.iter()
			.enumerate()
			.filter(|(_, tx)| tx.state == WalletTransactionState::Created)
			.map(|(id, _)| id)
			.collect())
	}

	// -----------------------------------------------------------------
	// events
	// -----------------------------------------------------------------

	/// Blocks until the next wallet event, or until `stop`
	pub fn get_event(&self) -> Result<WalletEvent, Error> {
		if self.stopped.load(Ordering::SeqCst) {
			return Err(ErrorKind::Stopped.into());
		}
		self.events.wait()
	}

	// -----------------------------------------------------------------
	// persistence
	// -----------------------------------------------------------------

	/// Writes the password-encrypted wallet file. `details` persists the
	/// transaction history, `cache` the container snapshots; both can be
	/// resynced from the chain when omitted.
	pub fn save(&self, dest: &mut dyn Write, details: bool, cache: bool) -> Result<(), Error> {
		self.check_running()?;
		let guard = self.inner.read();
		let inner = guard.as_ref().ok_or_else(|| Error::from(ErrorKind::NotInitialized))?;

		// the synchronizer only exposes its cursor while stopped
		let was_running = inner.synchronizer.is_running();
		if was_running {
			inner.synchronizer.stop();
		}

		let result = self.write_payload(inner, details, cache);

		if was_running {
			if let Err(e) = inner.synchronizer.start() {
				warn!("synchronizer restart after save failed: {}", e);
			}
		}
		let payload = result?;

		let envelope = encrypt_payload(&payload, &inner.password)?;
		serde_json::to_writer(dest, &envelope)
			.map_err(|e| Error::from(ErrorKind::Format(format!("{}", e))))?;
		Ok(())
	}

	fn write_payload(
		&self,
		inner: &WalletInner<N>,
		details: bool,
		cache: bool,
	) -> Result<Vec<u8>, Error> {
		let mut payload = Vec::new();
		{
			let mut writer = BinWriter::new(&mut payload);
			writer.write_u8(WALLET_PAYLOAD_VERSION)?;
			let mut flags = 0u8;
			if details {
				flags |= PAYLOAD_FLAG_DETAILS;
			}
			if cache {
				flags |= PAYLOAD_FLAG_CACHE;
			}
			writer.write_u8(flags)?;

			use krypton_core::ser::Writeable;
			inner.view.secret.write(&mut writer)?;
			inner.view.public.write(&mut writer)?;

			writer.write_u64(inner.addresses.len() as u64)?;
			for spend_public in &inner.addresses {
				let subscription = inner
					.consumer
					.get_subscription(spend_public)
					.ok_or_else(|| Error::internal("address without subscription"))?;
				spend_public.write(&mut writer)?;
				match subscription.keys().spend_secret {
					Some(ref secret) => {
						writer.write_u8(1)?;
						secret.write(&mut writer)?;
					}
					None => writer.write_u8(0)?,
				}
				let sync_start = subscription.sync_start();
				writer.write_u64(sync_start.height)?;
				writer.write_u64(sync_start.timestamp)?;
			}

			// the sync cursor only makes sense alongside the ledgers it
			// describes; without the cache a loader starts a fresh scan
			if cache {
				inner.synchronizer.save(&mut writer)?;
				for spend_public in &inner.addresses {
					let subscription = inner
						.consumer
						.get_subscription(spend_public)
						.ok_or_else(|| Error::internal("address without subscription"))?;
					subscription.container().lock().save(&mut writer)?;
				}
			}

			if details {
				let history = inner.shared.history.lock();
				write_elems(&mut writer, &history.transactions)?;
				types::write_transfer_lists(&mut writer, &history.transfers)?;
				history.block_hashes.write(&mut writer)?;
			}
		}
		Ok(payload)
	}

	/// Initializes this wallet from a file written by `save`. Fails on an
	/// already initialized wallet and on a wrong password.
	pub fn load(&self, src: &mut dyn Read, password: &str) -> Result<(), Error> {
		self.check_running()?;
		let mut guard = self.inner.write();
		if guard.is_some() {
			return Err(ErrorKind::AlreadyInitialized.into());
		}

		let envelope: WalletEnvelope = serde_json::from_reader(src)
			.map_err(|e| Error::from(ErrorKind::Format(format!("{}", e))))?;
		let payload = decrypt_payload(&envelope, password)?;

		let mut cursor = &payload[..];
		let mut reader = BinReader::new(&mut cursor);

		let version = reader.read_u8()?;
		if version != WALLET_PAYLOAD_VERSION {
			return Err(ErrorKind::Format(format!(
				"unsupported wallet payload version {}",
				version
			))
			.into());
		}
		let flags = reader.read_u8()?;

		use krypton_core::ser::Readable;
		let view_secret = SecretKey::read(&mut reader)?;
		let _view_public = PublicKey::read(&mut reader)?;
		let view = KeyPair::from_secret(view_secret);

		let mut inner = self.build_inner(view.clone(), password)?;

		let address_count = reader.read_u64()?;
		for _ in 0..address_count {
			let spend_public = PublicKey::read(&mut reader)?;
			let spend_secret = match reader.read_u8()? {
				0 => None,
				_ => Some(SecretKey::read(&mut reader)?),
			};
			let sync_start = SyncStart {
				height: reader.read_u64()?,
				timestamp: reader.read_u64()?,
			};
			let keys = match spend_secret {
				Some(secret) => AccountKeys::from_spend_secret(view.clone(), secret),
				None => AccountKeys::tracking(view.clone(), spend_public),
			};
			inner.consumer.add_subscription(SubscriptionRequest {
				keys,
				sync_start,
				transaction_spendable_age: self.sync_config.transaction_spendable_age,
			})?;
			inner.addresses.push(spend_public);
		}

		if flags & PAYLOAD_FLAG_CACHE != 0 {
			inner.synchronizer.load(&mut reader)?;
			for spend_public in &inner.addresses {
				let subscription = inner
					.consumer
					.get_subscription(spend_public)
					.ok_or_else(|| Error::internal("address without subscription"))?;
				subscription.container().lock().load(&mut reader)?;
			}
		}

		if flags & PAYLOAD_FLAG_DETAILS != 0 {
			let transactions: Vec<WalletTransaction> = read_elems(&mut reader)?;
			let transfers = types::read_transfer_lists(&mut reader)?;
			let block_hashes: Vec<Hash> = Vec::read(&mut reader)?;
			let mut history = inner.shared.history.lock();
			history.by_hash = transactions
				.iter()
				.enumerate()
				.map(|(id, tx)| (tx.hash, id))
				.collect();
			history.transactions = transactions;
			history.transfers = transfers;
			if !block_hashes.is_empty() {
				history.block_hashes = block_hashes;
			}
		}

		inner.synchronizer.start()?;
		*guard = Some(inner);
		info!("wallet loaded");
		Ok(())
	}
}

impl<N: NodeClient + 'static> Drop for Wallet<N> {
	fn drop(&mut self) {
		self.stop();
	}
}

// ---------------------------------------------------------------------
// free helpers over the inner state
// ---------------------------------------------------------------------

fn parse_own_address<N: NodeClient + 'static>(
	inner: &WalletInner<N>,
	address: &str,
) -> Result<PublicKey, Error> {
	let parsed =
		WalletAddress::parse(address).map_err(|_| Error::from(ErrorKind::BadAddress))?;
	find_own_account(inner, &parsed)
}

fn find_own_account<N: NodeClient + 'static>(
	inner: &WalletInner<N>,
	address: &WalletAddress,
) -> Result<PublicKey, Error> {
	if address.view_public != inner.view.public
		|| !inner.addresses.contains(&address.spend_public)
	{
		return Err(ErrorKind::AddressNotFound.into());
	}
	Ok(address.spend_public)
}

/// Resolves the source set of a transfer: explicit addresses must belong
/// to the wallet; an empty list means every signable address. Tracking-only
/// source sets cannot sign.
fn resolve_sources<N: NodeClient + 'static>(
	inner: &WalletInner<N>,
	source_addresses: &[String],
) -> Result<Vec<PublicKey>, Error> {
	let explicit = !source_addresses.is_empty();
	let accounts: Vec<PublicKey> = if explicit {
		source_addresses
			.iter()
			.map(|address| parse_own_address(inner, address))
			.collect::<Result<_, _>>()?
	} else {
		inner.addresses.clone()
	};

	let signable: Vec<PublicKey> = accounts
		.iter()
		.filter(|account| {
			inner
				.consumer
				.get_subscription(account)
				.map(|subscription| !subscription.keys().is_tracking())
				.unwrap_or(false)
		})
		.cloned()
		.collect();

	if signable.is_empty() {
		return Err(ErrorKind::TxTransferImpossible.into());
	}
	Ok(signable)
}

/// Picks the account change returns to: an explicit change destination,
/// else the sole source, else the wallet's only address
fn resolve_change_account<N: NodeClient + 'static>(
	inner: &WalletInner<N>,
	parameters: &TransactionParameters,
) -> Result<PublicKey, Error> {
	if let Some(ref address) = parameters.change_destination {
		let parsed =
			WalletAddress::parse(address).map_err(|_| Error::from(ErrorKind::BadAddress))?;
		return find_own_account(inner, &parsed);
	}
	if parameters.source_addresses.len() == 1 {
		return parse_own_address(inner, &parameters.source_addresses[0]);
	}
	if parameters.source_addresses.is_empty() && inner.addresses.len() == 1 {
		return Ok(inner.addresses[0]);
	}
	if !parameters.source_addresses.is_empty() {
		// several explicit sources still need a change destination
		return Err(ErrorKind::DestinationAddressRequired.into());
	}
	Err(ErrorKind::DestinationAddressRequired.into())
}

/// Unlocked, signable, unreserved key outputs across the source accounts
fn gather_candidates<N: NodeClient + 'static>(
	inner: &WalletInner<N>,
	sources: &[PublicKey],
) -> Result<Vec<Candidate>, Error> {
	let pending = inner.shared.pending.lock();
	let mut candidates = Vec::new();
	for account in sources {
		let subscription = inner
			.consumer
			.get_subscription(account)
			.ok_or_else(|| Error::from(ErrorKind::AddressNotFound))?;
		let container = subscription.container().lock();
		for output in container.get_outputs(INCLUDE_TYPE_KEY | INCLUDE_STATE_UNLOCKED) {
			if output.key_image.is_none() || output.output_key.is_none() {
				continue;
			}
			let key = (output.transaction_hash, output.output_in_transaction);
			if pending.locked.contains_key(&key) {
				continue;
			}
			candidates.push(Candidate {
				account: *account,
				output,
			});
		}
	}
	Ok(candidates)
}
