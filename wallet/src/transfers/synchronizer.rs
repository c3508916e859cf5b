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

//! The pull loop against the node. One dedicated worker alternates a block
//! phase (sparse-chain fetch, fork detach, ordered dispatch to consumers)
//! and a pool phase (symmetric difference dispatch), publishes progress,
//! and persists a resumable cursor per consumer. Consumers are only ever
//! called from the worker, never reentrantly.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};

use krypton_core::core::hash::Hash;
use krypton_core::core::transaction::Transaction;
use krypton_core::ser::{Readable, Reader, Writeable, Writer};
use krypton_keychain::PublicKey;
use krypton_util::{Condvar, Mutex, RwLock};

use crate::error::{Error, ErrorKind};
use crate::node::{BlockShortEntry, NodeClient};
use crate::transfers::state::SynchronizationState;
use crate::types::{SyncConfig, SyncStart};

const CURSOR_VERSION: u8 = 1;

/// What the synchronizer drives: per-consumer detection over blocks and
/// pool updates. `TransfersConsumer` is the production implementor; tests
/// plug in their own.
pub trait BlockchainConsumer: Send + Sync {
	/// Stable identity of the consumer (its view public key)
	fn id(&self) -> PublicKey;

	/// The lowest (height, timestamp) any of its accounts needs
	fn get_sync_start(&self) -> SyncStart;

	/// The chain was rewound below `height`
	fn on_blockchain_detach(&self, height: u64);

	/// A contiguous run of blocks starting at `start_height`
	fn on_new_blocks(&self, blocks: &[BlockShortEntry], start_height: u64) -> Result<(), Error>;

	/// Pool delta; implementors filter to their own subscriptions
	fn on_pool_updated(&self, added: &[Transaction], deleted: &[Hash]) -> Result<(), Error>;

	/// Pool transactions the consumer currently tracks
	fn get_known_pool_tx_ids(&self) -> Vec<Hash>;
}

/// Synchronization lifecycle notifications
pub trait SyncObserver: Send + Sync {
	/// Another batch of blocks was dispatched
	fn synchronization_progress_updated(&self, _processed: u64, _total: u64) {}

	/// A full round finished; `error` is the first failure, if any
	fn synchronization_completed(&self, _error: Option<ErrorKind>) {}
}

struct ConsumerEntry {
	consumer: Arc<dyn BlockchainConsumer>,
	state: SynchronizationState,
}

struct Inner<N: NodeClient> {
	node: Arc<N>,
	genesis_hash: Hash,
	config: SyncConfig,
	deleted_tx_ttl: Duration,
	consumers: Mutex<BTreeMap<PublicKey, ConsumerEntry>>,
	observers: RwLock<Vec<Arc<dyn SyncObserver>>>,
	running: AtomicBool,
	stop: AtomicBool,
	wake_flag: Mutex<bool>,
	wake_cond: Condvar,
	/// Recently deleted pool transactions and when to forget them, so a
	/// node re-announcing one does not resurrect it
	deleted_pool_memory: Mutex<HashMap<Hash, u64>>,
}

/// Pull-loop driver over a set of blockchain consumers
pub struct BlockchainSynchronizer<N: NodeClient + 'static> {
	inner: Arc<Inner<N>>,
	worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl<N: NodeClient + 'static> BlockchainSynchronizer<N> {
	/// A stopped synchronizer with no consumers
	pub fn new(
		node: Arc<N>,
		genesis_hash: Hash,
		config: SyncConfig,
		deleted_tx_ttl: Duration,
	) -> BlockchainSynchronizer<N> {
		BlockchainSynchronizer {
			inner: Arc::new(Inner {
				node,
				genesis_hash,
				config,
				deleted_tx_ttl,
				consumers: Mutex::new(BTreeMap::new()),
				observers: RwLock::new(Vec::new()),
				running: AtomicBool::new(false),
				stop: AtomicBool::new(false),
				wake_flag: Mutex::new(false),
				wake_cond: Condvar::new(),
				deleted_pool_memory: Mutex::new(HashMap::new()),
			}),
			worker: Mutex::new(None),
		}
	}

	/// Registers a sync observer
	pub fn add_observer(&self, observer: Arc<dyn SyncObserver>) {
		self.inner.observers.write().push(observer);
	}

	/// Registers a consumer. Illegal while running.
	pub fn add_consumer(&self, consumer: Arc<dyn BlockchainConsumer>) -> Result<(), Error> {
		self.check_stopped()?;
		let mut consumers = self.inner.consumers.lock();
		let id = consumer.id();
		if consumers.contains_key(&id) {
			return Err(Error::internal(format!("consumer {} already added", id)));
		}
		consumers.insert(
			id,
			ConsumerEntry {
				consumer,
				state: SynchronizationState::new(self.inner.genesis_hash),
			},
		);
		Ok(())
	}

	/// Unregisters a consumer. Illegal while running.
	pub fn remove_consumer(&self, id: &PublicKey) -> Result<bool, Error> {
		self.check_stopped()?;
		Ok(self.inner.consumers.lock().remove(id).is_some())
	}

	/// The consumer's current cursor. Illegal while running.
	pub fn get_consumer_state(&self, id: &PublicKey) -> Result<Option<SynchronizationState>, Error> {
		self.check_stopped()?;
		Ok(self
			.inner
			.consumers
			.lock()
			.get(id)
			.map(|entry| entry.state.clone()))
	}

	/// Starts the worker. Illegal while running or with no consumers.
	pub fn start(&self) -> Result<(), Error> {
		if self.inner.consumers.lock().is_empty() {
			return Err(Error::internal(
				"synchronizer cannot start without consumers",
			));
		}
		if self.inner.running.swap(true, Ordering::SeqCst) {
			return Err(Error::internal("synchronizer already started"));
		}
		self.inner.stop.store(false, Ordering::SeqCst);

		let inner = self.inner.clone();
		let handle = thread::Builder::new()
			.name("sync".to_string())
			.spawn(move || {
				sync_loop(inner);
			})
			.map_err(|_| Error::from(ErrorKind::IO))?;
		*self.worker.lock() = Some(handle);
		info!("blockchain synchronizer started");
		Ok(())
	}

	/// Stops the worker and waits for the in-flight phase to wind down.
	/// Safe to call repeatedly or while already stopped.
	pub fn stop(&self) {
		self.inner.stop.store(true, Ordering::SeqCst);
		self.wake();
		if let Some(handle) = self.worker.lock().take() {
			let _ = handle.join();
		}
		self.inner.running.store(false, Ordering::SeqCst);
	}

	/// Nudges the worker out of its idle wait (node observers funnel their
	/// pool/height notifications here)
	pub fn wake(&self) {
		let mut flag = self.inner.wake_flag.lock();
		*flag = true;
		self.inner.wake_cond.notify_all();
	}

	/// Whether the worker is running
	pub fn is_running(&self) -> bool {
		self.inner.running.load(Ordering::SeqCst)
	}

	/// Persists every consumer's cursor plus the deleted-pool memory.
	/// Illegal while running.
	pub fn save<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		self.check_stopped()?;
		writer.write_u8(CURSOR_VERSION)?;
		let consumers = self.inner.consumers.lock();
		writer.write_u64(consumers.len() as u64)?;
		for (id, entry) in consumers.iter() {
			id.write(writer)?;
			entry.state.write(writer)?;
		}
		let memory = self.inner.deleted_pool_memory.lock();
		writer.write_u64(memory.len() as u64)?;
		for (hash, expiry) in memory.iter() {
			hash.write(writer)?;
			writer.write_u64(*expiry)?;
		}
		Ok(())
	}

	/// Restores cursors written by `save`. Cursors for consumers that are
	/// not registered are skipped; registered consumers missing from the
	/// stream keep their initial state. Illegal while running.
	pub fn load<R: Reader>(&self, reader: &mut R) -> Result<(), Error> {
		self.check_stopped()?;
		let version = reader.read_u8()?;
		if version != CURSOR_VERSION {
			return Err(ErrorKind::Format(format!(
				"unsupported synchronizer cursor version {}",
				version
			))
			.into());
		}
		let count = reader.read_u64()?;
		let mut consumers = self.inner.consumers.lock();
		for _ in 0..count {
			let id = PublicKey::read(reader)?;
			let state = SynchronizationState::read(reader)?;
			match consumers.get_mut(&id) {
				Some(entry) => entry.state = state,
				None => debug!("ignoring saved cursor for unknown consumer {}", id),
			}
		}
		let memory_count = reader.read_u64()?;
		let mut memory = self.inner.deleted_pool_memory.lock();
		memory.clear();
		for _ in 0..memory_count {
			let hash = Hash::read(reader)?;
			let expiry = reader.read_u64()?;
			memory.insert(hash, expiry);
		}
		Ok(())
	}

	fn check_stopped(&self) -> Result<(), Error> {
		if self.inner.running.load(Ordering::SeqCst) {
			return Err(Error::internal(
				"operation is illegal while the synchronizer is running",
			));
		}
		Ok(())
	}
}

impl<N: NodeClient + 'static> Drop for BlockchainSynchronizer<N> {
	fn drop(&mut self) {
		self.stop();
	}
}

fn sync_loop<N: NodeClient>(inner: Arc<Inner<N>>) {
	debug!("sync worker entering loop");
	while !inner.stop.load(Ordering::SeqCst) {
		match block_phase(&inner) {
			Ok(true) => continue,
			Ok(false) => match pool_phase(&inner) {
				Ok(true) => {
					notify_completed(&inner, None);
					idle_wait(&inner);
				}
				Ok(false) => continue,
				Err(e) => {
					if e.kind() == ErrorKind::Interrupted {
						break;
					}
					warn!("pool synchronization failed: {}", e);
					notify_completed(&inner, Some(e.kind()));
					idle_wait(&inner);
				}
			},
			Err(e) => {
				if e.kind() == ErrorKind::Interrupted {
					break;
				}
				warn!("block synchronization failed: {}", e);
				notify_completed(&inner, Some(e.kind()));
				idle_wait(&inner);
			}
		}
	}
	debug!("sync worker exiting");
}

fn idle_wait<N: NodeClient>(inner: &Inner<N>) {
	let mut flag = inner.wake_flag.lock();
	if !*flag {
		let _ = inner
			.wake_cond
			.wait_for(&mut flag, inner.config.poll_interval);
	}
	*flag = false;
}

fn check_interrupted<N: NodeClient>(inner: &Inner<N>) -> Result<(), Error> {
	if inner.stop.load(Ordering::SeqCst) {
		Err(ErrorKind::Interrupted.into())
	} else {
		Ok(())
	}
}

/// One block round: fetch from the common sparse history, rewind consumers
/// sitting on a dead fork, dispatch in order. Returns whether anything new
/// was dispatched.
fn block_phase<N: NodeClient>(inner: &Inner<N>) -> Result<bool, Error> {
	let (known_hashes, min_timestamp) = {
		let consumers = inner.consumers.lock();
		let mut chains = consumers
			.values()
			.map(|entry| entry.state.known_block_hashes());
		let first = match chains.next() {
			Some(chain) => chain,
			None => return Ok(false),
		};
		let rest: Vec<Vec<Hash>> = chains.collect();
		let common: Vec<Hash> = first
			.into_iter()
			.filter(|hash| rest.iter().all(|chain| chain.contains(hash)))
			.collect();
		let min_timestamp = consumers
			.values()
			.map(|entry| entry.consumer.get_sync_start().timestamp)
			.min()
			.unwrap_or(0);
		(common, min_timestamp)
	};

	let (start_height, entries) = inner.node.query_blocks(&known_hashes, min_timestamp)?;
	check_interrupted(inner)?;

	if entries.is_empty() {
		return Ok(false);
	}

	let hashes: Vec<Hash> = entries.iter().map(|entry| entry.block_hash).collect();
	let new_height = start_height + entries.len() as u64 - 1;

	{
		let mut consumers = inner.consumers.lock();
		for entry in consumers.values_mut() {
			if entry.state.height() > start_height {
				debug!(
					"consumer {} rewinding from {} to fork point {}",
					entry.consumer.id(),
					entry.state.height(),
					start_height
				);
				entry.consumer.on_blockchain_detach(start_height);
				entry.state.detach(start_height);
			}
			entry.consumer.on_new_blocks(&entries, start_height)?;
			entry.state.add_blocks(&hashes, start_height)?;
			check_interrupted(inner)?;
		}
	}

	let total = inner
		.node
		.get_last_known_block_height()
		.unwrap_or(new_height);
	for observer in inner.observers.read().iter() {
		observer.synchronization_progress_updated(new_height, total.max(new_height));
	}

	Ok(true)
}

/// One pool round. Returns false when the node's chain moved under us and
/// the block phase has to run again first.
fn pool_phase<N: NodeClient>(inner: &Inner<N>) -> Result<bool, Error> {
	let (known_ids, tip) = {
		let consumers = inner.consumers.lock();
		let mut known: Vec<Hash> = Vec::new();
		for entry in consumers.values() {
			for id in entry.consumer.get_known_pool_tx_ids() {
				if !known.contains(&id) {
					known.push(id);
				}
			}
		}
		let tip = consumers
			.values()
			.next()
			.map(|entry| entry.state.tip())
			.unwrap_or(inner.genesis_hash);
		(known, tip)
	};

	let diff = inner.node.get_pool_symmetric_difference(&known_ids, tip)?;
	check_interrupted(inner)?;

	if !diff.is_blockchain_actual {
		return Ok(false);
	}

	// remember deletions and drop re-announcements of recently deleted txs
	let now = Utc::now().timestamp() as u64;
	let added: Vec<Transaction> = {
		let mut memory = inner.deleted_pool_memory.lock();
		memory.retain(|_, expiry| *expiry > now);
		for hash in &diff.deleted {
			memory.insert(*hash, now + inner.deleted_tx_ttl.as_secs());
		}
		diff.added
			.into_iter()
			.filter(|tx| !memory.contains_key(&tx.hash()))
			.collect()
	};

	let mut first_error: Option<Error> = None;
	{
		let consumers = inner.consumers.lock();
		for entry in consumers.values() {
			if let Err(e) = entry.consumer.on_pool_updated(&added, &diff.deleted) {
				warn!("consumer {} pool update failed: {}", entry.consumer.id(), e);
				if first_error.is_none() {
					first_error = Some(e);
				}
			}
		}
	}

	match first_error {
		Some(e) => Err(e),
		None => Ok(true),
	}
}

fn notify_completed<N: NodeClient>(inner: &Inner<N>, error: Option<ErrorKind>) {
	for observer in inner.observers.read().iter() {
		observer.synchronization_completed(error.clone());
	}
}
