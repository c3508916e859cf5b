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

//! Test support: an in-memory node with a deterministic chain generator,
//! plus helpers for fabricating accounts and transactions. Lives in the
//! crate so both unit and integration tests share it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;

use krypton_core::core::hash::{hash_bytes, Hash};
use krypton_core::core::transaction::{Transaction, TransactionBuilder};
use krypton_keychain::{crypto, AccountKeys, KeyPair, PublicKey, SecretKey, WalletAddress};
use krypton_util::Mutex;

use crate::error::{Error, ErrorKind};
use crate::node::{
	BlockShortEntry, NodeClient, PoolDifference, RandomAmountOuts, RandomOutEntry,
};
use crate::types::{OutputType, SyncConfig, TransferOutput};

/// A deterministic seeded RNG for tests
pub fn rng(seed: u64) -> StdRng {
	StdRng::seed_from_u64(seed)
}

/// Fresh account keys under a fresh view pair
pub fn generate_account(seed: u64) -> AccountKeys {
	let mut rng = rng(seed);
	let view = KeyPair::generate(&mut rng);
	AccountKeys::generate(view, &mut rng)
}

/// Sync configuration tuned for fast test turnaround
pub fn test_sync_config() -> SyncConfig {
	SyncConfig {
		poll_interval: Duration::from_millis(25),
		startup_scan_height_cutoff: 0,
		transaction_spendable_age: 1,
	}
}

/// Spins until `predicate` holds or the timeout passes
pub fn wait_until<F: Fn() -> bool>(timeout: Duration, predicate: F) -> bool {
	let deadline = Instant::now() + timeout;
	while Instant::now() < deadline {
		if predicate() {
			return true;
		}
		std::thread::sleep(Duration::from_millis(10));
	}
	predicate()
}

struct MockBlock {
	hash: Hash,
	timestamp: u64,
	transactions: Vec<Transaction>,
}

struct MockNodeState {
	blocks: Vec<MockBlock>,
	pool: HashMap<Hash, Transaction>,
	outputs_by_amount: HashMap<u64, Vec<(u64, PublicKey)>>,
	tx_global_indices: HashMap<Hash, Vec<u64>>,
	relayed: Vec<Transaction>,
	relay_to_pool: bool,
	fail_relay: bool,
	fail_query: bool,
	fail_global_indices: bool,
	fail_pool_diff: bool,
}

/// An in-memory node: a linear chain, a pool, and failure injection
pub struct MockNode {
	state: Mutex<MockNodeState>,
}

impl MockNode {
	/// A node holding only its genesis block
	pub fn new() -> MockNode {
		let genesis = MockBlock {
			hash: hash_bytes(b"genesis"),
			timestamp: 1_000_000,
			transactions: vec![],
		};
		MockNode {
			state: Mutex::new(MockNodeState {
				blocks: vec![genesis],
				pool: HashMap::new(),
				outputs_by_amount: HashMap::new(),
				tx_global_indices: HashMap::new(),
				relayed: Vec::new(),
				relay_to_pool: true,
				fail_relay: false,
				fail_query: false,
				fail_global_indices: false,
				fail_pool_diff: false,
			}),
		}
	}

	/// Hash of the genesis block
	pub fn genesis_hash(&self) -> Hash {
		self.state.lock().blocks[0].hash
	}

	/// Hash of the chain tip
	pub fn tip_hash(&self) -> Hash {
		self.state.lock().blocks.last().unwrap().hash
	}

	/// Current chain height (genesis = 0)
	pub fn height(&self) -> u64 {
		self.state.lock().blocks.len() as u64 - 1
	}

	/// Mines one block containing the given transactions, assigning global
	/// output indices and evicting them from the pool
	pub fn mine_block(&self, transactions: Vec<Transaction>) -> Hash {
		let mut state = self.state.lock();
		let height = state.blocks.len() as u64;
		let parent = state.blocks.last().unwrap().hash;
		let timestamp = state.blocks.last().unwrap().timestamp + 120;

		for tx in &transactions {
			let tx_hash = tx.hash();
			state.pool.remove(&tx_hash);
			let mut indices = Vec::with_capacity(tx.prefix.outputs.len());
			for output in &tx.prefix.outputs {
				let registry = state.outputs_by_amount.entry(output.amount).or_default();
				let global = registry.len() as u64;
				let key = match &output.target {
					krypton_core::core::transaction::OutputTarget::Key { key } => *key,
					_ => PublicKey::from_bytes([0u8; 32]),
				};
				registry.push((global, key));
				indices.push(global);
			}
			state.tx_global_indices.insert(tx_hash, indices);
		}

		let mut hash_input = parent.to_vec();
		hash_input.extend_from_slice(&height.to_be_bytes());
		let hash = hash_bytes(&hash_input);
		state.blocks.push(MockBlock {
			hash,
			timestamp,
			transactions,
		});
		hash
	}

	/// Mines `count` empty blocks
	pub fn mine_empty_blocks(&self, count: usize) {
		for _ in 0..count {
			self.mine_block(vec![]);
		}
	}

	/// Rewinds the chain so that `height` becomes the first missing block,
	/// then mines `new_blocks` empty replacement blocks on the new branch
	pub fn reorganize(&self, height: u64, new_blocks: usize) {
		{
			let mut state = self.state.lock();
			state.blocks.truncate(height as usize);
		}
		for i in 0..new_blocks {
			// salt the hashes so the branch differs from the old one
			let salt = self.mine_block(vec![]);
			let mut state = self.state.lock();
			let last = state.blocks.last_mut().unwrap();
			let mut input = salt.to_vec();
			input.extend_from_slice(&(i as u64 + 7_777).to_be_bytes());
			last.hash = hash_bytes(&input);
		}
	}

	/// Drops a transaction into the pool
	pub fn put_tx_to_pool(&self, tx: Transaction) {
		let mut state = self.state.lock();
		state.pool.insert(tx.hash(), tx);
	}

	/// Evicts a transaction from the pool
	pub fn remove_tx_from_pool(&self, tx_hash: &Hash) {
		self.state.lock().pool.remove(tx_hash);
	}

	/// Everything relayed through this node so far
	pub fn relayed_transactions(&self) -> Vec<Transaction> {
		self.state.lock().relayed.clone()
	}

	/// Whether relayed transactions should appear in the pool
	pub fn set_relay_to_pool(&self, on: bool) {
		self.state.lock().relay_to_pool = on;
	}

	/// Makes `relay_transaction` fail
	pub fn set_fail_relay(&self, on: bool) {
		self.state.lock().fail_relay = on;
	}

	/// Makes `query_blocks` fail
	pub fn set_fail_query(&self, on: bool) {
		self.state.lock().fail_query = on;
	}

	/// Makes `get_transaction_outs_global_indices` fail
	pub fn set_fail_global_indices(&self, on: bool) {
		self.state.lock().fail_global_indices = on;
	}

	/// Makes `get_pool_symmetric_difference` fail
	pub fn set_fail_pool_diff(&self, on: bool) {
		self.state.lock().fail_pool_diff = on;
	}

	/// Registers decoy outputs so ring construction has material to draw
	/// from
	pub fn seed_decoys(&self, amount: u64, count: usize, seed: u64) {
		let mut rng = rng(seed);
		let mut state = self.state.lock();
		let registry = state.outputs_by_amount.entry(amount).or_default();
		for _ in 0..count {
			let global = registry.len() as u64;
			registry.push((global, crypto::generate_keys(&mut rng).1));
		}
	}
}

impl NodeClient for MockNode {
	fn get_last_local_block_height(&self) -> Result<u64, Error> {
		Ok(self.height())
	}

	fn get_last_known_block_height(&self) -> Result<u64, Error> {
		Ok(self.height())
	}

	fn get_last_local_block_timestamp(&self) -> Result<u64, Error> {
		Ok(self.state.lock().blocks.last().unwrap().timestamp)
	}

	fn get_peer_count(&self) -> Result<usize, Error> {
		Ok(1)
	}

	fn is_synchronized(&self) -> Result<bool, Error> {
		Ok(true)
	}

	fn query_blocks(
		&self,
		known_block_ids: &[Hash],
		_min_timestamp: u64,
	) -> Result<(u64, Vec<BlockShortEntry>), Error> {
		let state = self.state.lock();
		if state.fail_query {
			return Err(ErrorKind::NodeError.into());
		}

		// the first known id we can find marks the fork point
		let mut start: Option<u64> = None;
		for id in known_block_ids {
			if let Some(position) = state.blocks.iter().position(|b| b.hash == *id) {
				start = Some(position as u64 + 1);
				break;
			}
		}
		let start = start.ok_or_else(|| Error::from(ErrorKind::NodeError))?;

		let entries: Vec<BlockShortEntry> = state
			.blocks
			.iter()
			.enumerate()
			.skip(start as usize)
			.map(|(height, block)| BlockShortEntry {
				block_hash: block.hash,
				height: height as u64,
				timestamp: block.timestamp,
				transactions: block.transactions.clone(),
			})
			.collect();
		Ok((start, entries))
	}

	fn get_pool_symmetric_difference(
		&self,
		known_pool_tx_ids: &[Hash],
		known_block_id: Hash,
	) -> Result<PoolDifference, Error> {
		let state = self.state.lock();
		if state.fail_pool_diff {
			return Err(ErrorKind::NodeError.into());
		}
		let is_blockchain_actual = state.blocks.last().unwrap().hash == known_block_id;
		let added: Vec<Transaction> = state
			.pool
			.iter()
			.filter(|(hash, _)| !known_pool_tx_ids.contains(hash))
			.map(|(_, tx)| tx.clone())
			.collect();
		let deleted: Vec<Hash> = known_pool_tx_ids
			.iter()
			.filter(|hash| !state.pool.contains_key(hash))
			.cloned()
			.collect();
		Ok(PoolDifference {
			is_blockchain_actual,
			added,
			deleted,
		})
	}

	fn get_transaction_outs_global_indices(&self, tx_hash: Hash) -> Result<Vec<u64>, Error> {
		let state = self.state.lock();
		if state.fail_global_indices {
			return Err(ErrorKind::NodeError.into());
		}
		state
			.tx_global_indices
			.get(&tx_hash)
			.cloned()
			.ok_or_else(|| Error::from(ErrorKind::NodeError))
	}

	fn get_random_outs_by_amounts(
		&self,
		amounts: &[u64],
		count: u64,
	) -> Result<Vec<RandomAmountOuts>, Error> {
		let state = self.state.lock();
		Ok(amounts
			.iter()
			.map(|amount| {
				let outs = state
					.outputs_by_amount
					.get(amount)
					.map(|registry| {
						registry
							.iter()
							.take(count as usize)
							.map(|(global_index, output_key)| RandomOutEntry {
								global_index: *global_index,
								output_key: *output_key,
							})
							.collect()
					})
					.unwrap_or_default();
				RandomAmountOuts {
					amount: *amount,
					outs,
				}
			})
			.collect())
	}

	fn relay_transaction(&self, tx: &Transaction) -> Result<(), Error> {
		let mut state = self.state.lock();
		if state.fail_relay {
			return Err(ErrorKind::NodeError.into());
		}
		state.relayed.push(tx.clone());
		if state.relay_to_pool {
			state.pool.insert(tx.hash(), tx.clone());
		}
		Ok(())
	}
}

/// Fabricates transactions for container and consumer tests, mirroring how
/// a counterparty wallet would build them
pub struct TestTransactionBuilder {
	builder: TransactionBuilder,
	rng: StdRng,
	outputs_added: u32,
}

impl TestTransactionBuilder {
	/// A builder with a fresh ephemeral transaction key
	pub fn new(seed: u64) -> TestTransactionBuilder {
		let mut rng = rng(seed);
		let builder = TransactionBuilder::new(&mut rng);
		TestTransactionBuilder {
			builder,
			rng,
			outputs_added: 0,
		}
	}

	/// A builder reusing a known transaction secret; two builders seeded
	/// with the same secret derive identical one-time keys
	pub fn with_tx_secret(seed: u64, secret: SecretKey) -> TestTransactionBuilder {
		let mut test_builder = TestTransactionBuilder::new(seed);
		test_builder
			.builder
			.set_tx_secret_key(secret)
			.expect("fresh builder accepts a transaction key");
		test_builder
	}

	/// The transaction's ephemeral secret key
	pub fn tx_secret_key(&self) -> SecretKey {
		self.builder.tx_secret_key()
	}

	/// Sets the prefix unlock time
	pub fn set_unlock_time(&mut self, unlock_time: u64) {
		self.builder.set_unlock_time(unlock_time);
	}

	/// Adds an input spending some unrelated party's output
	pub fn add_test_input(&mut self, amount: u64) {
		let (secret, public) = crypto::generate_keys(&mut self.rng);
		let ring = vec![(0u64, public)];
		self.builder
			.add_key_input(amount, &ring, 0, secret)
			.expect("test ring is well formed");
	}

	/// Adds an input spending an owned output previously returned by
	/// `add_test_key_output` (or a container query), deriving the matching
	/// key image from the account's keys
	pub fn add_input_from(&mut self, account: &AccountKeys, output: &TransferOutput) {
		let spend_secret = account
			.spend_secret
			.as_ref()
			.expect("spending requires a signable account");
		let derivation =
			crypto::generate_key_derivation(&output.transaction_public_key, &account.view.secret)
				.expect("test transaction keys decode");
		let onetime_secret =
			crypto::derive_secret_key(&derivation, output.output_in_transaction, spend_secret);
		let output_key = output.output_key.expect("key output carries its key");
		let ring = vec![(output.global_output_index, output_key)];
		self.builder
			.add_key_input(output.amount, &ring, 0, onetime_secret)
			.expect("test ring is well formed");
	}

	/// Adds an output addressed to `account` (or to a throwaway account
	/// when `None`), returning the record a consumer would hand to the
	/// container
	pub fn add_test_key_output(
		&mut self,
		amount: u64,
		global_index: u64,
		account: Option<&AccountKeys>,
	) -> TransferOutput {
		let throwaway;
		let account = match account {
			Some(account) => account,
			None => {
				let view = KeyPair::generate(&mut self.rng);
				throwaway = AccountKeys::generate(view, &mut self.rng);
				&throwaway
			}
		};

		let index = self.outputs_added;
		self.outputs_added += 1;
		let address = account.address();
		let output_key = self
			.builder
			.add_key_output(amount, &address)
			.expect("test addresses encode valid keys");

		let derivation = crypto::generate_key_derivation(
			&self.builder.tx_public_key(),
			&account.view.secret,
		)
		.expect("test transaction keys decode");
		let key_image = account.spend_secret.as_ref().map(|secret| {
			let onetime_secret = crypto::derive_secret_key(&derivation, index, secret);
			crypto::generate_key_image(&output_key, &onetime_secret)
		});

		let transfer = TransferOutput {
			output_type: OutputType::Key,
			amount,
			global_output_index: global_index,
			output_in_transaction: index,
			transaction_public_key: self.builder.tx_public_key(),
			transaction_hash: Hash::default(),
			output_key: Some(output_key),
			required_signatures: 0,
			key_image,
		};
		transfer
	}

	/// Signs and seals the transaction
	pub fn build(self) -> Transaction {
		let TestTransactionBuilder {
			builder, mut rng, ..
		} = self;
		builder.build(&mut rng).expect("test transactions always sign")
	}
}

/// A coinbase transaction paying `amount` to `address`, locked for the
/// usual mined-money window
pub fn coinbase_to(address: &WalletAddress, amount: u64, height: u64, seed: u64) -> Transaction {
	let mut rng = rng(seed);
	let mut builder = TransactionBuilder::new(&mut rng);
	builder.add_base_input(height);
	builder.set_unlock_time(height + krypton_core::consensus::MINED_MONEY_UNLOCK_WINDOW);
	builder
		.add_key_output(amount, address)
		.expect("coinbase output derives");
	builder.build(&mut rng).expect("coinbase builds")
}

/// An ordinary transaction funding `address` out of thin air (the input
/// belongs to a throwaway party)
pub fn transfer_to(address: &WalletAddress, amount: u64, fee: u64, seed: u64) -> Transaction {
	multi_transfer_to(address, &[amount], fee, seed)
}

/// As `transfer_to`, with one output per requested amount
pub fn multi_transfer_to(
	address: &WalletAddress,
	amounts: &[u64],
	fee: u64,
	seed: u64,
) -> Transaction {
	let mut rng = rng(seed);
	let mut builder = TransactionBuilder::new(&mut rng);
	let (secret, public) = crypto::generate_keys(&mut rng);
	let total: u64 = amounts.iter().sum();
	builder
		.add_key_input(total + fee, &[(0, public)], 0, secret)
		.expect("funding ring is well formed");
	for amount in amounts {
		builder
			.add_key_output(*amount, address)
			.expect("funding output derives");
	}
	builder.build(&mut rng).expect("funding tx builds")
}
