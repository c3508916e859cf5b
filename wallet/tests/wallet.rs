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

//! Wallet engine tests: balances, transfers, fusion, donation, events,
//! persistence

use std::sync::Arc;
use std::time::Duration;

use krypton_core::{Currency, CurrencyBuilder};
use krypton_keychain::{crypto, WalletAddress};
use krypton_util::Mutex;
use krypton_wallet::test_framework::{
	generate_account, multi_transfer_to, rng, test_sync_config, transfer_to, wait_until, MockNode,
};
use krypton_wallet::{
	DonationSettings, ErrorKind, TransactionParameters, Wallet, WalletEvent, WalletOrder,
	WalletTransactionState, WalletTransferType,
};

const FEE: u64 = 1_000_000;
const PASSWORD: &str = "pass";

struct Env {
	node: Arc<MockNode>,
	wallet: Arc<Wallet<MockNode>>,
}

fn env_with_currency(currency: Currency) -> Env {
	let node = Arc::new(MockNode::new());
	let wallet = Arc::new(Wallet::new(
		node.clone(),
		currency,
		test_sync_config(),
		node.genesis_hash(),
	));
	Env { node, wallet }
}

fn env() -> Env {
	env_with_currency(Currency::default())
}

impl Env {
	fn actual(&self) -> u64 {
		self.wallet.get_actual_balance().unwrap_or(0)
	}

	fn pending(&self) -> u64 {
		self.wallet.get_pending_balance().unwrap_or(0)
	}

	/// Mines a funding transaction for `address` plus the extra block that
	/// satisfies the spendable age, then waits for the balance to land
	fn fund(&self, address: &str, amount: u64, seed: u64) {
		let parsed = WalletAddress::parse(address).unwrap();
		self.node.mine_block(vec![transfer_to(&parsed, amount, FEE, seed)]);
		self.node.mine_empty_blocks(1);
		assert!(
			wait_until(Duration::from_secs(5), || self.actual() >= amount),
			"funding of {} never unlocked",
			amount
		);
	}

	fn external_address(&self, seed: u64) -> String {
		generate_account(seed).address().to_string()
	}

	fn simple_params(&self, to: &str, amount: u64) -> TransactionParameters {
		TransactionParameters {
			destinations: vec![WalletOrder {
				address: to.to_string(),
				amount,
			}],
			fee: FEE,
			..Default::default()
		}
	}
}

fn initialized_env() -> (Env, String) {
	let env = env();
	env.wallet.initialize(PASSWORD).unwrap();
	let address = env.wallet.create_address().unwrap();
	(env, address)
}

// ---------------------------------------------------------------------
// lifecycle
// ---------------------------------------------------------------------

#[test]
fn uninitialized_wallet_refuses_calls() {
	let env = env();
	assert_eq!(
		env.wallet.get_actual_balance().unwrap_err().kind(),
		ErrorKind::NotInitialized
	);
	assert_eq!(
		env.wallet.create_address().unwrap_err().kind(),
		ErrorKind::NotInitialized
	);
}

#[test]
fn double_initialize_fails() {
	let env = env();
	env.wallet.initialize(PASSWORD).unwrap();
	assert_eq!(
		env.wallet.initialize(PASSWORD).unwrap_err().kind(),
		ErrorKind::AlreadyInitialized
	);
}

#[test]
fn stopped_wallet_refuses_calls_and_wakes_event_waiters() {
	let (env, _) = initialized_env();
	env.wallet.stop();
	assert_eq!(
		env.wallet.get_actual_balance().unwrap_err().kind(),
		ErrorKind::Stopped
	);
	assert_eq!(
		env.wallet.get_event().unwrap_err().kind(),
		ErrorKind::Stopped
	);
	env.wallet.start();
	assert!(env.wallet.get_actual_balance().is_ok());
}

#[test]
fn change_password_validates_the_old_one() {
	let (env, _) = initialized_env();
	assert_eq!(
		env.wallet
			.change_password("wrong", "other")
			.unwrap_err()
			.kind(),
		ErrorKind::WrongPassword
	);
	env.wallet.change_password(PASSWORD, "other").unwrap();
}

#[test]
fn shutdown_returns_to_uninitialized() {
	let (env, _) = initialized_env();
	env.wallet.shutdown().unwrap();
	assert_eq!(
		env.wallet.get_actual_balance().unwrap_err().kind(),
		ErrorKind::NotInitialized
	);
	env.wallet.initialize(PASSWORD).unwrap();
}

#[test]
fn addresses_are_indexed_in_creation_order() {
	let (env, first) = initialized_env();
	let second = env.wallet.create_address().unwrap();
	assert_eq!(env.wallet.get_address_count().unwrap(), 2);
	assert_eq!(env.wallet.get_address(0).unwrap(), first);
	assert_eq!(env.wallet.get_address(1).unwrap(), second);
	assert_eq!(
		env.wallet.get_address(2).unwrap_err().kind(),
		ErrorKind::IndexOutOfRange
	);

	env.wallet.delete_address(&first).unwrap();
	assert_eq!(env.wallet.get_address_count().unwrap(), 1);
	assert_eq!(env.wallet.get_address(0).unwrap(), second);
}

// ---------------------------------------------------------------------
// balances
// ---------------------------------------------------------------------

#[test]
fn fresh_wallet_has_empty_balance() {
	let (env, _) = initialized_env();
	assert_eq!(env.actual(), 0);
	assert_eq!(env.pending(), 0);
}

#[test]
fn received_money_unlocks_after_the_spendable_age() {
	let (env, address) = initialized_env();
	let amount = 500 * FEE;
	let parsed = WalletAddress::parse(&address).unwrap();
	env.node.mine_block(vec![transfer_to(&parsed, amount, FEE, 7)]);

	// one confirmation: present but soft-locked
	assert!(wait_until(Duration::from_secs(5), || env.pending() == amount));
	assert_eq!(env.actual(), 0);

	// the next block satisfies the age
	env.node.mine_empty_blocks(1);
	assert!(wait_until(Duration::from_secs(5), || env.actual() == amount));
	assert_eq!(env.pending(), 0);
}

#[test]
fn mined_money_unlocks_after_the_unlock_window() {
	// spendable age 1, mined money window 10: the reward stays pending
	// through height H+9 and unlocks at H+10
	let (env, address) = initialized_env();
	let reward = 70_368_744_177_663;
	let parsed = WalletAddress::parse(&address).unwrap();
	env.node
		.mine_block(vec![krypton_wallet::test_framework::coinbase_to(
			&parsed, reward, 1, 7,
		)]);

	env.node.mine_empty_blocks(8); // height 9 < 11
	assert!(wait_until(Duration::from_secs(5), || env.pending() == reward));
	assert_eq!(env.actual(), 0);

	env.node.mine_empty_blocks(2); // height 11 = unlock
	assert!(wait_until(Duration::from_secs(5), || env.actual() == reward));
	assert_eq!(env.pending(), 0);
}

#[test]
fn per_address_balances_are_separate() {
	let (env, first) = initialized_env();
	let second = env.wallet.create_address().unwrap();
	env.fund(&first, 300 * FEE, 7);

	assert_eq!(env.wallet.get_actual_balance_for(&first).unwrap(), 300 * FEE);
	assert_eq!(env.wallet.get_actual_balance_for(&second).unwrap(), 0);
	assert_eq!(
		env.wallet
			.get_actual_balance_for(&env.external_address(50))
			.unwrap_err()
			.kind(),
		ErrorKind::AddressNotFound
	);
}

// ---------------------------------------------------------------------
// transfer validation
// ---------------------------------------------------------------------

#[test]
fn transfer_rejects_bad_parameters() {
	let (env, address) = initialized_env();
	env.fund(&address, 500 * FEE, 7);
	let to = env.external_address(50);

	// no destinations
	let mut params = env.simple_params(&to, 100 * FEE);
	params.destinations.clear();
	assert_eq!(
		env.wallet.transfer(params).unwrap_err().kind(),
		ErrorKind::ZeroDestination
	);

	// zero amount
	let params = env.simple_params(&to, 0);
	assert_eq!(
		env.wallet.transfer(params).unwrap_err().kind(),
		ErrorKind::ZeroDestination
	);

	// unparsable destination
	let params = env.simple_params("klaatu barada nikto", 100 * FEE);
	assert_eq!(
		env.wallet.transfer(params).unwrap_err().kind(),
		ErrorKind::BadAddress
	);

	// fee below minimum
	let mut params = env.simple_params(&to, 100 * FEE);
	params.fee = FEE - 1;
	assert_eq!(
		env.wallet.transfer(params).unwrap_err().kind(),
		ErrorKind::FeeTooSmall
	);

	// oversized mixin
	let mut params = env.simple_params(&to, 100 * FEE);
	params.mixin = Currency::default().max_mixin() + 1;
	assert_eq!(
		env.wallet.transfer(params).unwrap_err().kind(),
		ErrorKind::MixinCountTooBig
	);

	// more than the wallet holds
	let params = env.simple_params(&to, 10_000 * FEE);
	assert_eq!(
		env.wallet.transfer(params).unwrap_err().kind(),
		ErrorKind::WrongAmount
	);
}

#[test]
fn transfer_needs_decoys_for_the_requested_mixin() {
	let (env, address) = initialized_env();
	env.fund(&address, 500 * FEE, 7);

	let mut params = env.simple_params(&env.external_address(50), 100 * FEE);
	params.mixin = 3;
	// no decoy outputs exist for the funded amount
	assert_eq!(
		env.wallet.transfer(params).unwrap_err().kind(),
		ErrorKind::MixinCountTooBig
	);

	// once the chain offers decoys the same call goes through
	env.node.seed_decoys(500 * FEE, 8, 90);
	let mut params = env.simple_params(&env.external_address(50), 100 * FEE);
	params.mixin = 3;
	env.wallet.transfer(params).unwrap();
}

#[test]
fn multi_address_wallet_requires_a_change_destination() {
	let (env, first) = initialized_env();
	let _second = env.wallet.create_address().unwrap();
	env.fund(&first, 500 * FEE, 7);

	let params = env.simple_params(&env.external_address(50), 100 * FEE);
	assert_eq!(
		env.wallet.transfer(params).unwrap_err().kind(),
		ErrorKind::DestinationAddressRequired
	);

	let mut params = env.simple_params(&env.external_address(50), 100 * FEE);
	params.change_destination = Some(first.clone());
	env.wallet.transfer(params).unwrap();
}

#[test]
fn donation_settings_are_validated() {
	let (env, address) = initialized_env();
	env.fund(&address, 500 * FEE, 7);
	let to = env.external_address(50);

	let mut params = env.simple_params(&to, 100 * FEE);
	params.donation = Some(DonationSettings {
		address: "not valid".to_string(),
		threshold: FEE,
	});
	assert_eq!(
		env.wallet.transfer(params).unwrap_err().kind(),
		ErrorKind::BadAddress
	);

	let mut params = env.simple_params(&to, 100 * FEE);
	params.donation = Some(DonationSettings {
		address: env.external_address(51),
		threshold: 0,
	});
	assert_eq!(
		env.wallet.transfer(params).unwrap_err().kind(),
		ErrorKind::WrongAmount
	);
}

// ---------------------------------------------------------------------
// transfer flow
// ---------------------------------------------------------------------

#[test]
fn transfer_relays_and_spends_after_inclusion() {
	let (env, address) = initialized_env();
	let funds = 500 * FEE;
	let sent = 100 * FEE;
	env.fund(&address, funds, 7);

	let id = env
		.wallet
		.transfer(env.simple_params(&env.external_address(50), sent))
		.unwrap();

	let tx = env.wallet.get_transaction(id).unwrap();
	assert_eq!(tx.state, WalletTransactionState::Succeeded);
	assert_eq!(tx.fee, FEE);
	assert_eq!(tx.total_amount, -((sent + FEE) as i64));
	assert_eq!(env.node.relayed_transactions().len(), 1);

	// transfers carry the destination and the change line
	let transfer_count = env.wallet.get_transaction_transfer_count(id).unwrap();
	assert_eq!(transfer_count, 2);
	let usual = env.wallet.get_transaction_transfer(id, 0).unwrap();
	assert_eq!(usual.transfer_type, WalletTransferType::Usual);
	assert_eq!(usual.amount, sent as i64);
	let change = env.wallet.get_transaction_transfer(id, 1).unwrap();
	assert_eq!(change.transfer_type, WalletTransferType::Change);
	assert_eq!(change.amount, (funds - sent - FEE) as i64);

	// mine the relayed transaction; the change returns to the wallet
	let relayed = env.node.relayed_transactions().remove(0);
	env.node.mine_block(vec![relayed]);
	env.node.mine_empty_blocks(1);
	assert!(wait_until(Duration::from_secs(5), || {
		env.actual() == funds - sent - FEE
	}));
}

#[test]
fn two_phase_submit_locks_inputs_until_commit_or_rollback() {
	let (env, address) = initialized_env();
	let funds = 500 * FEE;
	env.fund(&address, funds, 7);
	let to = env.external_address(50);

	let id = env
		.wallet
		.make_transaction(env.simple_params(&to, 100 * FEE))
		.unwrap();
	assert_eq!(
		env.wallet.get_transaction(id).unwrap().state,
		WalletTransactionState::Created
	);
	assert_eq!(env.wallet.get_delayed_transaction_ids().unwrap(), vec![id]);
	assert!(env.node.relayed_transactions().is_empty());

	// the single funding output is reserved now
	assert_eq!(env.actual(), 0);
	assert_eq!(
		env.wallet
			.make_transaction(env.simple_params(&to, 100 * FEE))
			.unwrap_err()
			.kind(),
		ErrorKind::WrongAmount
	);

	env.wallet.commit_transaction(id).unwrap();
	assert_eq!(
		env.wallet.get_transaction(id).unwrap().state,
		WalletTransactionState::Succeeded
	);
	assert_eq!(env.node.relayed_transactions().len(), 1);
	assert!(env.wallet.get_delayed_transaction_ids().unwrap().is_empty());
}

#[test]
fn rollback_releases_inputs() {
	let (env, address) = initialized_env();
	let funds = 500 * FEE;
	env.fund(&address, funds, 7);
	let to = env.external_address(50);

	let id = env
		.wallet
		.make_transaction(env.simple_params(&to, 100 * FEE))
		.unwrap();
	env.wallet.rollback_uncommitted_transaction(id).unwrap();
	assert_eq!(
		env.wallet.get_transaction(id).unwrap().state,
		WalletTransactionState::Cancelled
	);
	assert_eq!(env.actual(), funds);

	// only created transactions can be rolled back
	assert_eq!(
		env.wallet
			.rollback_uncommitted_transaction(id)
			.unwrap_err()
			.kind(),
		ErrorKind::TxCancelImpossible
	);

	// and the released inputs fund the next attempt
	env.wallet
		.transfer(env.simple_params(&to, 100 * FEE))
		.unwrap();
}

#[test]
fn failed_relay_marks_the_transaction_and_frees_inputs() {
	let (env, address) = initialized_env();
	env.fund(&address, 500 * FEE, 7);
	let to = env.external_address(50);

	env.node.set_fail_relay(true);
	let err = env
		.wallet
		.transfer(env.simple_params(&to, 100 * FEE))
		.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::NodeError);
	let count = env.wallet.get_transaction_count().unwrap();
	let failed = env.wallet.get_transaction(count - 1).unwrap();
	assert_eq!(failed.state, WalletTransactionState::Failed);

	env.node.set_fail_relay(false);
	env.wallet
		.transfer(env.simple_params(&to, 100 * FEE))
		.unwrap();
}

#[test]
fn double_spend_of_just_sent_outputs_is_refused() {
	let (env, address) = initialized_env();
	let sent = 100 * FEE;
	env.fund(&address, sent + FEE, 7);
	let to = env.external_address(50);

	env.wallet.transfer(env.simple_params(&to, sent)).unwrap();

	// immediately again: the only output is reserved
	assert_eq!(
		env.wallet
			.transfer(env.simple_params(&env.external_address(51), sent))
			.unwrap_err()
			.kind(),
		ErrorKind::WrongAmount
	);

	// mining the first spend does not change that (the wallet now holds 0)
	let relayed = env.node.relayed_transactions().remove(0);
	env.node.mine_block(vec![relayed]);
	env.node.mine_empty_blocks(1);
	assert!(wait_until(Duration::from_secs(5), || {
		env.wallet.get_transaction(1).unwrap().in_blockchain()
	}));
	assert_eq!(
		env.wallet
			.transfer(env.simple_params(&env.external_address(51), sent))
			.unwrap_err()
			.kind(),
		ErrorKind::WrongAmount
	);
}

#[test]
fn reorg_restores_an_unseated_spend() {
	let (env, address) = initialized_env();
	let funds = 500 * FEE;
	let sent = 100 * FEE;
	env.fund(&address, funds, 7);

	env.wallet
		.transfer(env.simple_params(&env.external_address(50), sent))
		.unwrap();
	let relayed = env.node.relayed_transactions().remove(0);
	let spend_height = env.node.height() + 1;
	env.node.mine_block(vec![relayed]);
	env.node.mine_empty_blocks(1);
	assert!(wait_until(Duration::from_secs(5), || {
		env.actual() == funds - sent - FEE
	}));

	// deep reorg below the spending block
	env.node.reorganize(spend_height, 4);
	assert!(wait_until(Duration::from_secs(5), || env.actual() == funds));
}

#[test]
fn self_transfer_conserves_balance_up_to_the_fee() {
	let (env, address) = initialized_env();
	let funds = 500 * FEE;
	let sent = 100 * FEE;
	env.fund(&address, funds, 7);
	let before = env.actual() + env.pending();

	env.wallet.transfer(env.simple_params(&address, sent)).unwrap();

	// once the pool sees the spend, outputs move to pending as change +
	// self-payment
	assert!(wait_until(Duration::from_secs(5), || {
		env.actual() + env.pending() == before - FEE
	}));
}

// ---------------------------------------------------------------------
// donation
// ---------------------------------------------------------------------

#[test]
fn donation_is_carved_from_change() {
	let (env, address) = initialized_env();
	let sent = 100 * FEE;
	let threshold = 30 * FEE;
	env.fund(&address, sent + FEE + threshold, 7);

	let mut params = env.simple_params(&env.external_address(50), sent);
	params.donation = Some(DonationSettings {
		address: env.external_address(51),
		threshold,
	});
	let id = env.wallet.transfer(params).unwrap();

	let transfer_count = env.wallet.get_transaction_transfer_count(id).unwrap();
	let mut donation = None;
	let mut change = None;
	for i in 0..transfer_count {
		let transfer = env.wallet.get_transaction_transfer(id, i).unwrap();
		match transfer.transfer_type {
			WalletTransferType::Donation => donation = Some(transfer.amount),
			WalletTransferType::Change => change = Some(transfer.amount),
			WalletTransferType::Usual => {}
		}
	}
	assert_eq!(donation, Some(threshold as i64));
	assert_eq!(change, None);
}

#[test]
fn donation_is_skipped_when_change_is_short() {
	let (env, address) = initialized_env();
	let sent = 100 * FEE;
	env.fund(&address, sent + FEE, 7);

	let mut params = env.simple_params(&env.external_address(50), sent);
	params.donation = Some(DonationSettings {
		address: env.external_address(51),
		threshold: 30 * FEE,
	});
	let id = env.wallet.transfer(params).unwrap();

	let transfer_count = env.wallet.get_transaction_transfer_count(id).unwrap();
	for i in 0..transfer_count {
		let transfer = env.wallet.get_transaction_transfer(id, i).unwrap();
		assert_ne!(transfer.transfer_type, WalletTransferType::Donation);
	}
}

// ---------------------------------------------------------------------
// tracking accounts
// ---------------------------------------------------------------------

#[test]
fn tracking_address_observes_but_cannot_spend() {
	let env = env();
	env.wallet.initialize(PASSWORD).unwrap();
	let spend_public = crypto::generate_keys(&mut rng(42)).1;
	let address = env.wallet.create_tracking_address(spend_public).unwrap();

	let amount = 300 * FEE;
	env.fund(&address, amount, 7);
	assert_eq!(env.actual(), amount);

	assert_eq!(
		env.wallet
			.transfer(env.simple_params(&env.external_address(50), 100 * FEE))
			.unwrap_err()
			.kind(),
		ErrorKind::TxTransferImpossible
	);
}

// ---------------------------------------------------------------------
// fusion
// ---------------------------------------------------------------------

fn fusion_currency() -> Currency {
	CurrencyBuilder::new()
		.fusion_tx_min_input_count(6)
		.fusion_tx_min_in_out_count_ratio(3)
		.currency()
}

#[test]
fn fusion_consolidates_small_outputs() {
	let env = env_with_currency(fusion_currency());
	env.wallet.initialize(PASSWORD).unwrap();
	let address = env.wallet.create_address().unwrap();
	let parsed = WalletAddress::parse(&address).unwrap();

	let amounts = vec![2 * FEE; 12];
	env.node
		.mine_block(vec![multi_transfer_to(&parsed, &amounts, FEE, 7)]);
	env.node.mine_empty_blocks(1);
	let total = 24 * FEE;
	assert!(wait_until(Duration::from_secs(5), || env.actual() == total));

	let threshold = 100 * FEE;
	let estimate = env.wallet.estimate_fusion(threshold, vec![]).unwrap();
	assert_eq!(estimate.fusion_ready_count, 12);
	assert_eq!(estimate.total_output_count, 12);

	let id = env
		.wallet
		.create_fusion_transaction(threshold, 0, vec![], None)
		.unwrap()
		.expect("plenty of fusion-ready outputs");
	assert!(env.wallet.is_fusion_transaction(id).unwrap());
	let tx = env.wallet.get_transaction(id).unwrap();
	assert_eq!(tx.fee, 0);
	assert_eq!(tx.total_amount, 0);

	// mining the fusion leaves the overall balance untouched
	let relayed = env.node.relayed_transactions().remove(0);
	env.node.mine_block(vec![relayed]);
	env.node.mine_empty_blocks(1);
	assert!(wait_until(Duration::from_secs(5), || env.actual() == total));
}

#[test]
fn fusion_returns_nothing_without_enough_inputs() {
	let env = env_with_currency(fusion_currency());
	env.wallet.initialize(PASSWORD).unwrap();
	let address = env.wallet.create_address().unwrap();
	env.fund(&address, 2 * FEE, 7);

	assert!(env
		.wallet
		.create_fusion_transaction(100 * FEE, 0, vec![], None)
		.unwrap()
		.is_none());
}

#[test]
fn fusion_threshold_must_exceed_dust() {
	let env = env_with_currency(fusion_currency());
	env.wallet.initialize(PASSWORD).unwrap();
	env.wallet.create_address().unwrap();
	assert_eq!(
		env.wallet
			.create_fusion_transaction(FEE, 0, vec![], None)
			.unwrap_err()
			.kind(),
		ErrorKind::WrongAmount
	);
}

#[test]
fn fusion_send_failure_surfaces() {
	let env = env_with_currency(fusion_currency());
	env.wallet.initialize(PASSWORD).unwrap();
	let address = env.wallet.create_address().unwrap();
	let parsed = WalletAddress::parse(&address).unwrap();
	env.node
		.mine_block(vec![multi_transfer_to(&parsed, &vec![2 * FEE; 12], FEE, 7)]);
	env.node.mine_empty_blocks(1);
	assert!(wait_until(Duration::from_secs(5), || env.actual() == 24 * FEE));

	env.node.set_fail_relay(true);
	assert_eq!(
		env.wallet
			.create_fusion_transaction(100 * FEE, 0, vec![], None)
			.unwrap_err()
			.kind(),
		ErrorKind::NodeError
	);
}

// ---------------------------------------------------------------------
// history and events
// ---------------------------------------------------------------------

#[test]
fn incoming_transactions_enter_the_history() {
	let (env, address) = initialized_env();
	let amount = 300 * FEE;
	env.fund(&address, amount, 7);

	assert_eq!(env.wallet.get_transaction_count().unwrap(), 1);
	let tx = env.wallet.get_transaction(0).unwrap();
	assert_eq!(tx.state, WalletTransactionState::Succeeded);
	assert_eq!(tx.total_amount, amount as i64);
	assert!(tx.in_blockchain());
	assert_eq!(env.wallet.get_transaction_by_hash(&tx.hash).unwrap(), tx);

	// one funding transfer line pointing at our own address
	assert_eq!(env.wallet.get_transaction_transfer_count(0).unwrap(), 1);
	let line = env.wallet.get_transaction_transfer(0, 0).unwrap();
	assert_eq!(line.transfer_type, WalletTransferType::Usual);
	assert_eq!(line.address, address);
	assert_eq!(line.amount, amount as i64);
}

#[test]
fn block_queries_follow_the_chain() {
	let (env, address) = initialized_env();
	env.fund(&address, 300 * FEE, 7);

	let count = env.wallet.get_block_count().unwrap();
	assert_eq!(count, env.node.height() as usize + 1);
	let hashes = env.wallet.get_block_hashes(0, count).unwrap();
	assert_eq!(hashes[0], env.node.genesis_hash());
	assert_eq!(*hashes.last().unwrap(), env.node.tip_hash());

	// the funding block carries our transaction
	let grouped = env.wallet.get_transactions(1, 1).unwrap();
	assert_eq!(grouped.len(), 1);
	assert_eq!(grouped[0].transactions.len(), 1);

	let by_hash = env
		.wallet
		.get_transactions_by_block_hash(&grouped[0].block_hash, 1)
		.unwrap();
	assert_eq!(by_hash[0].transactions.len(), 1);
}

#[test]
fn events_report_incoming_transactions() {
	let (env, address) = initialized_env();
	let events = Arc::new(Mutex::new(Vec::new()));
	let wallet_events = events.clone();

	let amount = 300 * FEE;
	env.fund(&address, amount, 7);

	// drain the queue from a helper thread; stop() ends it
	let collector = {
		let events = wallet_events;
		let wallet = env.wallet.clone();
		std::thread::spawn(move || {
			while let Ok(event) = wallet.get_event() {
				events.lock().push(event);
			}
		})
	};

	assert!(wait_until(Duration::from_secs(5), || {
		let seen = events.lock();
		seen.iter().any(|e| matches!(e, WalletEvent::TransactionCreated(_)))
			&& seen.iter().any(|e| *e == WalletEvent::BalanceChanged)
			&& seen.iter().any(|e| *e == WalletEvent::SyncCompleted)
	}));

	env.wallet.stop();
	collector.join().unwrap();
}

// ---------------------------------------------------------------------
// persistence
// ---------------------------------------------------------------------

#[test]
fn save_and_load_roundtrip() {
	let (env, address) = initialized_env();
	let amount = 300 * FEE;
	env.fund(&address, amount, 7);
	let history_len = env.wallet.get_transaction_count().unwrap();

	let mut blob = Vec::new();
	env.wallet.save(&mut blob, true, true).unwrap();

	let restored = Wallet::new(
		env.node.clone(),
		Currency::default(),
		test_sync_config(),
		env.node.genesis_hash(),
	);
	restored.load(&mut &blob[..], PASSWORD).unwrap();

	assert_eq!(restored.get_address_count().unwrap(), 1);
	assert_eq!(restored.get_address(0).unwrap(), address);
	assert_eq!(restored.get_transaction_count().unwrap(), history_len);
	assert!(wait_until(Duration::from_secs(5), || {
		restored.get_actual_balance().unwrap_or(0) == amount
	}));
}

#[test]
fn load_without_cache_resyncs() {
	let (env, address) = initialized_env();
	let amount = 300 * FEE;
	env.fund(&address, amount, 7);

	let mut blob = Vec::new();
	env.wallet.save(&mut blob, false, false).unwrap();
	// make sure the old synchronizer no longer races the restored one
	env.wallet.stop();

	let restored = Wallet::new(
		env.node.clone(),
		Currency::default(),
		test_sync_config(),
		env.node.genesis_hash(),
	);
	restored.load(&mut &blob[..], PASSWORD).unwrap();
	assert!(wait_until(Duration::from_secs(10), || {
		restored.get_actual_balance().unwrap_or(0) == amount
	}));
}

#[test]
fn load_rejects_wrong_password_and_double_init() {
	let (env, address) = initialized_env();
	env.fund(&address, 300 * FEE, 7);
	let mut blob = Vec::new();
	env.wallet.save(&mut blob, false, false).unwrap();

	let restored = Wallet::new(
		env.node.clone(),
		Currency::default(),
		test_sync_config(),
		env.node.genesis_hash(),
	);
	assert_eq!(
		restored.load(&mut &blob[..], "nope").unwrap_err().kind(),
		ErrorKind::WrongPassword
	);

	restored.load(&mut &blob[..], PASSWORD).unwrap();
	assert_eq!(
		restored.load(&mut &blob[..], PASSWORD).unwrap_err().kind(),
		ErrorKind::AlreadyInitialized
	);
}
