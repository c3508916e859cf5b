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

//! Transfers container state machine tests

use krypton_core::core::transaction::Transaction;
use krypton_core::ser::{BinReader, BinWriter};
use krypton_keychain::AccountKeys;
use krypton_wallet::test_framework::{generate_account, TestTransactionBuilder};
use krypton_wallet::transfers::TransfersContainer;
use krypton_wallet::types::{
	INCLUDE_ALL, INCLUDE_ALL_LOCKED, INCLUDE_ALL_UNLOCKED, INCLUDE_STATE_LOCKED,
	INCLUDE_STATE_SOFT_LOCKED, INCLUDE_STATE_UNLOCKED, INCLUDE_TYPE_ALL,
};
use krypton_wallet::{TransactionBlockInfo, TransferOutput};
use krypton_wallet::UNCONFIRMED_TRANSACTION_GLOBAL_OUTPUT_INDEX;

const SPENDABLE_AGE: u64 = 1;
const AMOUNT: u64 = 100;
const HEIGHT: u64 = 99;
const GLOBAL_INDEX: u64 = 113;
const TIMESTAMP: u64 = 1_000_000;

fn block(height: u64, tx_index: u32) -> TransactionBlockInfo {
	TransactionBlockInfo::confirmed(height, TIMESTAMP, tx_index)
}

fn container() -> TransfersContainer {
	TransfersContainer::new(SPENDABLE_AGE)
}

/// Adds a transaction with one owned output. `height == None` keeps it in
/// the pool.
fn add_tx(
	container: &mut TransfersContainer,
	account: &AccountKeys,
	height: Option<(u64, u32)>,
	amount: u64,
	seed: u64,
) -> (Transaction, TransferOutput) {
	let mut builder = TestTransactionBuilder::new(seed);
	builder.add_test_input(amount + 1);
	let global = match height {
		Some(_) => GLOBAL_INDEX,
		None => UNCONFIRMED_TRANSACTION_GLOBAL_OUTPUT_INDEX,
	};
	let out = builder.add_test_key_output(amount, global, Some(account));
	let tx = builder.build();
	let info = match height {
		Some((h, i)) => block(h, i),
		None => TransactionBlockInfo::unconfirmed(),
	};
	assert!(container.add_transaction(&info, &tx, &[out.clone()]).unwrap());
	(tx, out)
}

/// Spends every spendable output of `source` in a new transaction paying a
/// stranger; change (if any) returns to the account.
fn spend_tx(
	container: &mut TransfersContainer,
	account: &AccountKeys,
	source: &Transaction,
	height: Option<(u64, u32)>,
	amount: u64,
	seed: u64,
) -> Transaction {
	let outputs = container.get_transaction_outputs(
		&source.hash(),
		INCLUDE_TYPE_ALL | INCLUDE_STATE_UNLOCKED | INCLUDE_STATE_SOFT_LOCKED,
	);
	assert!(!outputs.is_empty());

	let mut builder = TestTransactionBuilder::new(seed);
	let mut input_total = 0;
	for output in &outputs {
		input_total += output.amount;
		builder.add_input_from(account, output);
	}
	assert!(input_total >= amount);

	builder.add_test_key_output(amount, GLOBAL_INDEX + 40, None);
	let mut transfers = vec![];
	if input_total > amount {
		let global = match height {
			Some(_) => GLOBAL_INDEX + 41,
			None => UNCONFIRMED_TRANSACTION_GLOBAL_OUTPUT_INDEX,
		};
		transfers.push(builder.add_test_key_output(input_total - amount, global, Some(account)));
	}

	let tx = builder.build();
	let info = match height {
		Some((h, i)) => block(h, i),
		None => TransactionBlockInfo::unconfirmed(),
	};
	assert!(container.add_transaction(&info, &tx, &transfers).unwrap());
	tx
}

// ---------------------------------------------------------------------
// admission ordering
// ---------------------------------------------------------------------

#[test]
fn order_same_height_needs_increasing_tx_index() {
	let account = generate_account(1);
	let mut container = container();
	add_tx(&mut container, &account, Some((HEIGHT, 0)), AMOUNT, 10);
	add_tx(&mut container, &account, Some((HEIGHT, 1)), AMOUNT, 11);

	let mut builder = TestTransactionBuilder::new(12);
	builder.add_test_input(AMOUNT + 1);
	let out = builder.add_test_key_output(AMOUNT, GLOBAL_INDEX, Some(&account));
	let tx = builder.build();
	assert!(container
		.add_transaction(&block(HEIGHT, 1), &tx, &[out])
		.is_err());
}

#[test]
fn order_height_must_not_go_backwards() {
	let account = generate_account(1);
	let mut container = container();
	add_tx(&mut container, &account, Some((HEIGHT, 0)), AMOUNT, 10);
	add_tx(&mut container, &account, Some((HEIGHT + 1, 0)), AMOUNT, 11);

	let mut builder = TestTransactionBuilder::new(12);
	builder.add_test_input(AMOUNT + 1);
	let out = builder.add_test_key_output(AMOUNT, GLOBAL_INDEX, Some(&account));
	let tx = builder.build();
	assert!(container
		.add_transaction(&block(HEIGHT, 5), &tx, &[out])
		.is_err());
}

#[test]
fn unconfirmed_admissions_interleave_freely() {
	let account = generate_account(1);
	let mut container = container();
	add_tx(&mut container, &account, None, AMOUNT, 10);
	add_tx(&mut container, &account, Some((HEIGHT, 0)), AMOUNT, 11);
	add_tx(&mut container, &account, None, AMOUNT, 12);
	add_tx(&mut container, &account, Some((HEIGHT + 1, 0)), AMOUNT, 13);
	add_tx(&mut container, &account, None, AMOUNT, 14);
}

#[test]
fn order_resets_after_detach() {
	let account = generate_account(1);
	let mut container = container();
	add_tx(&mut container, &account, Some((HEIGHT, 0)), AMOUNT, 10);
	add_tx(&mut container, &account, Some((HEIGHT + 1, 0)), AMOUNT, 11);
	container.detach(HEIGHT + 1);
	add_tx(&mut container, &account, Some((HEIGHT, 0)), AMOUNT, 12);
}

#[test]
fn adding_same_transaction_twice_fails() {
	let account = generate_account(1);
	let mut container = container();
	let mut builder = TestTransactionBuilder::new(10);
	builder.add_test_input(AMOUNT + 1);
	let out = builder.add_test_key_output(AMOUNT, GLOBAL_INDEX, Some(&account));
	let tx = builder.build();

	assert!(container
		.add_transaction(&block(HEIGHT, 0), &tx, &[out.clone()])
		.unwrap());
	assert!(container
		.add_transaction(&block(HEIGHT + 1, 0), &tx, &[out])
		.is_err());
}

#[test]
fn confirmed_block_rejects_unconfirmed_output_index() {
	let account = generate_account(1);
	let mut container = container();
	let mut builder = TestTransactionBuilder::new(10);
	builder.add_test_input(AMOUNT + 1);
	let out = builder.add_test_key_output(
		AMOUNT,
		UNCONFIRMED_TRANSACTION_GLOBAL_OUTPUT_INDEX,
		Some(&account),
	);
	let tx = builder.build();
	assert!(container
		.add_transaction(&block(HEIGHT, 0), &tx, &[out])
		.is_err());
}

#[test]
fn unconfirmed_block_rejects_confirmed_output_index() {
	let account = generate_account(1);
	let mut container = container();
	let mut builder = TestTransactionBuilder::new(10);
	builder.add_test_input(AMOUNT + 1);
	let out = builder.add_test_key_output(AMOUNT, GLOBAL_INDEX, Some(&account));
	let tx = builder.build();
	assert!(container
		.add_transaction(&TransactionBlockInfo::unconfirmed(), &tx, &[out])
		.is_err());
}

// ---------------------------------------------------------------------
// admission effects
// ---------------------------------------------------------------------

#[test]
fn unconfirmed_output_is_locked() {
	let account = generate_account(1);
	let mut container = container();
	let (tx, _) = add_tx(&mut container, &account, None, AMOUNT, 10);

	assert_eq!(container.transfers_count(), 1);
	assert_eq!(container.transactions_count(), 1);
	assert_eq!(container.balance(INCLUDE_ALL_LOCKED), AMOUNT);
	assert_eq!(container.balance(INCLUDE_ALL_UNLOCKED), 0);
	assert_eq!(container.get_outputs(INCLUDE_ALL_LOCKED).len(), 1);
	assert!(container.get_outputs(INCLUDE_ALL_UNLOCKED).is_empty());

	let info = container.get_transaction_information(&tx.hash()).unwrap();
	assert_eq!(info.block_height, krypton_wallet::WALLET_UNCONFIRMED_TRANSACTION_HEIGHT);
	assert_eq!(info.total_amount_in, 0);
	assert_eq!(info.total_amount_out, AMOUNT);

	assert_eq!(container.get_unconfirmed_transactions(), vec![tx.hash()]);
}

#[test]
fn confirmed_output_unlocks_after_age() {
	let account = generate_account(1);
	let mut container = container();
	let (tx, _) = add_tx(&mut container, &account, Some((HEIGHT, 0)), AMOUNT, 10);

	assert_eq!(container.balance(INCLUDE_ALL_UNLOCKED), 0);
	container.advance_height(HEIGHT + SPENDABLE_AGE);
	assert_eq!(container.balance(INCLUDE_ALL_UNLOCKED), AMOUNT);
	assert_eq!(container.balance(INCLUDE_ALL_LOCKED), 0);
	assert!(container.get_unconfirmed_transactions().is_empty());
	assert_eq!(
		container
			.get_transaction_outputs(&tx.hash(), INCLUDE_ALL_UNLOCKED)
			.len(),
		1
	);
}

#[test]
fn empty_outputs_and_no_spend_changes_nothing() {
	let mut container = container();
	let mut builder = TestTransactionBuilder::new(10);
	builder.add_test_input(AMOUNT + 1);
	builder.add_test_key_output(AMOUNT, GLOBAL_INDEX, None);
	let tx = builder.build();

	assert!(!container
		.add_transaction(&block(HEIGHT, 0), &tx, &[])
		.unwrap());
	assert_eq!(container.transactions_count(), 0);
	assert_eq!(container.transfers_count(), 0);
	assert!(container.get_transaction_information(&tx.hash()).is_none());
}

#[test]
fn unrelated_key_input_is_ignored() {
	let mut container = container();
	let mut builder = TestTransactionBuilder::new(10);
	builder.add_test_input(AMOUNT);
	let tx = builder.build();
	assert!(!container
		.add_transaction(&block(HEIGHT, 0), &tx, &[])
		.unwrap());
}

#[test]
fn spending_an_unconfirmed_output_fails() {
	let account = generate_account(1);
	let mut container = container();
	let (tx, _) = add_tx(&mut container, &account, None, AMOUNT, 10);

	let outputs = container.get_transaction_outputs(&tx.hash(), INCLUDE_ALL);
	assert_eq!(outputs.len(), 1);

	let mut spender = TestTransactionBuilder::new(11);
	spender.add_input_from(&account, &outputs[0]);
	let spend = spender.build();
	assert!(container
		.add_transaction(&TransactionBlockInfo::unconfirmed(), &spend, &[])
		.is_err());
}

#[test]
fn unconfirmed_spend_of_confirmed_output() {
	let account = generate_account(1);
	let mut container = container();
	let (tx, _) = add_tx(&mut container, &account, Some((HEIGHT, 0)), AMOUNT, 10);
	container.advance_height(HEIGHT + SPENDABLE_AGE);
	assert_eq!(container.balance(INCLUDE_ALL_UNLOCKED), AMOUNT);

	let spend = spend_tx(&mut container, &account, &tx, None, AMOUNT, 11);

	assert_eq!(container.transactions_count(), 2);
	assert_eq!(container.transfers_count(), 1);
	assert_eq!(container.balance(INCLUDE_ALL), 0);

	// rolling the spender back releases the output
	assert!(container.delete_unconfirmed_transaction(&spend.hash()));
	assert_eq!(container.transactions_count(), 1);
	assert_eq!(container.balance(INCLUDE_ALL_UNLOCKED), AMOUNT);
}

#[test]
fn spent_outputs_query_names_the_consumed_output() {
	let account = generate_account(1);
	let mut container = container();
	let (tx, _) = add_tx(&mut container, &account, Some((HEIGHT, 0)), AMOUNT, 10);
	container.advance_height(HEIGHT + SPENDABLE_AGE);
	let spend = spend_tx(
		&mut container,
		&account,
		&tx,
		Some((HEIGHT + SPENDABLE_AGE, 0)),
		AMOUNT,
		11,
	);

	let spent = container.get_spent_outputs();
	assert_eq!(spent.len(), 1);
	assert_eq!(spent[0].transfer.amount, AMOUNT);
	assert_eq!(spent[0].transfer.transaction_hash, tx.hash());
	assert_eq!(spent[0].spending_transaction_hash, spend.hash());
}

#[test]
fn check_if_spent_tracks_height() {
	let account = generate_account(1);
	let mut container = container();
	let (tx, out) = add_tx(&mut container, &account, Some((HEIGHT, 0)), AMOUNT, 10);
	container.advance_height(HEIGHT + SPENDABLE_AGE);
	let key_image = out.key_image.unwrap();
	assert!(!container.check_if_spent(&key_image, None));

	spend_tx(
		&mut container,
		&account,
		&tx,
		Some((HEIGHT + SPENDABLE_AGE, 0)),
		AMOUNT,
		11,
	);
	assert!(container.check_if_spent(&key_image, None));
	assert!(container.check_if_spent(&key_image, Some(HEIGHT + SPENDABLE_AGE)));
	assert!(!container.check_if_spent(&key_image, Some(HEIGHT)));
}

// ---------------------------------------------------------------------
// delete_unconfirmed_transaction
// ---------------------------------------------------------------------

#[test]
fn delete_unknown_or_confirmed_transactions_is_refused() {
	let account = generate_account(1);
	let mut container = container();
	let (confirmed, _) = add_tx(&mut container, &account, Some((HEIGHT, 0)), AMOUNT, 10);
	let (unconfirmed, _) = add_tx(&mut container, &account, None, AMOUNT, 11);

	assert!(!container.delete_unconfirmed_transaction(&krypton_core::core::hash::hash_bytes(b"nope")));
	assert!(!container.delete_unconfirmed_transaction(&confirmed.hash()));
	assert_eq!(container.transactions_count(), 2);

	assert!(container.delete_unconfirmed_transaction(&unconfirmed.hash()));
	assert_eq!(container.transactions_count(), 1);
}

// ---------------------------------------------------------------------
// mark_transaction_confirmed
// ---------------------------------------------------------------------

#[test]
fn confirmation_promotes_a_pool_transaction() {
	let account = generate_account(1);
	let mut container = container();
	let (tx, _) = add_tx(&mut container, &account, None, AMOUNT, 10);
	assert_eq!(container.balance(INCLUDE_ALL_LOCKED), AMOUNT);

	assert!(container
		.mark_transaction_confirmed(&block(HEIGHT, 0), &tx.hash(), &[GLOBAL_INDEX])
		.unwrap());
	container.advance_height(HEIGHT + SPENDABLE_AGE);
	assert_eq!(container.balance(INCLUDE_ALL_UNLOCKED), AMOUNT);
	// the global index was adopted from the node
	let outputs = container.get_transaction_outputs(&tx.hash(), INCLUDE_ALL);
	assert_eq!(outputs[0].global_output_index, GLOBAL_INDEX);
}

#[test]
fn confirmation_rejects_unconfirmed_block_info() {
	let account = generate_account(1);
	let mut container = container();
	let (tx, _) = add_tx(&mut container, &account, None, AMOUNT, 10);
	assert!(container
		.mark_transaction_confirmed(
			&TransactionBlockInfo::unconfirmed(),
			&tx.hash(),
			&[GLOBAL_INDEX]
		)
		.is_err());
}

#[test]
fn confirmation_of_unknown_or_confirmed_returns_false() {
	let account = generate_account(1);
	let mut container = container();
	let (tx, _) = add_tx(&mut container, &account, Some((HEIGHT, 0)), AMOUNT, 10);

	assert!(!container
		.mark_transaction_confirmed(
			&block(HEIGHT + 1, 0),
			&krypton_core::core::hash::hash_bytes(b"unknown"),
			&[GLOBAL_INDEX]
		)
		.unwrap());
	assert!(!container
		.mark_transaction_confirmed(&block(HEIGHT + 1, 0), &tx.hash(), &[GLOBAL_INDEX])
		.unwrap());
}

#[test]
fn confirmation_needs_enough_global_indices() {
	let account = generate_account(1);
	let mut container = container();
	let mut builder = TestTransactionBuilder::new(10);
	builder.add_test_input(AMOUNT + 1);
	let out1 = builder.add_test_key_output(
		AMOUNT / 2,
		UNCONFIRMED_TRANSACTION_GLOBAL_OUTPUT_INDEX,
		Some(&account),
	);
	let out2 = builder.add_test_key_output(
		AMOUNT / 2,
		UNCONFIRMED_TRANSACTION_GLOBAL_OUTPUT_INDEX,
		Some(&account),
	);
	let tx = builder.build();
	assert!(container
		.add_transaction(&TransactionBlockInfo::unconfirmed(), &tx, &[out1, out2])
		.unwrap());
	assert_eq!(container.transfers_count(), 2);

	assert!(container
		.mark_transaction_confirmed(&block(HEIGHT, 0), &tx.hash(), &[GLOBAL_INDEX])
		.is_err());
}

#[test]
fn confirmation_of_a_spending_transaction() {
	let account = generate_account(1);
	let mut container = container();
	let (tx, _) = add_tx(&mut container, &account, Some((HEIGHT, 0)), AMOUNT, 10);
	container.advance_height(HEIGHT + SPENDABLE_AGE);

	let spend = spend_tx(&mut container, &account, &tx, None, AMOUNT, 11);
	assert_eq!(container.balance(INCLUDE_ALL), 0);

	assert!(container
		.mark_transaction_confirmed(&block(HEIGHT + SPENDABLE_AGE, 0), &spend.hash(), &[])
		.unwrap());
	assert_eq!(container.balance(INCLUDE_ALL), 0);
	// the spend is final now; deleting the spender is refused
	assert!(!container.delete_unconfirmed_transaction(&spend.hash()));
}

// ---------------------------------------------------------------------
// detach
// ---------------------------------------------------------------------

#[test]
fn detach_removes_everything_at_or_above_height() {
	let account = generate_account(1);
	let mut container = container();
	add_tx(&mut container, &account, Some((HEIGHT, 0)), AMOUNT, 10);
	container.advance_height(HEIGHT + SPENDABLE_AGE);

	let removed = container.detach(HEIGHT);
	assert_eq!(removed.len(), 1);
	assert_eq!(container.transfers_count(), 0);
	assert_eq!(container.transactions_count(), 0);
}

#[test]
fn detach_is_idempotent() {
	let account = generate_account(1);
	let mut container = container();
	add_tx(&mut container, &account, Some((HEIGHT, 0)), AMOUNT, 10);
	add_tx(&mut container, &account, Some((HEIGHT + 1, 0)), AMOUNT, 11);

	let removed = container.detach(HEIGHT + 1);
	assert_eq!(removed.len(), 1);
	let balance = container.balance(INCLUDE_ALL);
	let removed_again = container.detach(HEIGHT + 1);
	assert!(removed_again.is_empty());
	assert_eq!(container.balance(INCLUDE_ALL), balance);
}

#[test]
fn detach_unseats_a_confirmed_spend() {
	let account = generate_account(1);
	let mut container = container();
	let (tx, _) = add_tx(&mut container, &account, Some((HEIGHT, 0)), AMOUNT, 10);
	container.advance_height(HEIGHT + SPENDABLE_AGE);
	let spend = spend_tx(
		&mut container,
		&account,
		&tx,
		Some((HEIGHT + SPENDABLE_AGE, 0)),
		AMOUNT,
		11,
	);
	container.advance_height(HEIGHT + 2 * SPENDABLE_AGE);
	assert_eq!(container.balance(INCLUDE_ALL), 0);

	let removed = container.detach(HEIGHT + 1);
	assert!(removed.contains(&spend.hash()));
	assert_eq!(container.transactions_count(), 1);
	assert_eq!(container.transfers_count(), 1);
	assert_eq!(container.balance(INCLUDE_ALL), AMOUNT);
}

#[test]
fn detach_keeps_unrelated_unconfirmed_transactions() {
	let account = generate_account(1);
	let mut container = container();
	add_tx(&mut container, &account, Some((HEIGHT, 0)), AMOUNT, 10);
	add_tx(&mut container, &account, None, AMOUNT, 11);
	container.advance_height(HEIGHT + SPENDABLE_AGE);
	assert_eq!(container.balance(INCLUDE_ALL), AMOUNT * 2);

	container.detach(HEIGHT);
	assert_eq!(container.transactions_count(), 1);
	assert_eq!(container.balance(INCLUDE_ALL_LOCKED), AMOUNT);
	assert_eq!(container.balance(INCLUDE_ALL), AMOUNT);
}

#[test]
fn detach_above_source_keeps_unconfirmed_spender() {
	let account = generate_account(1);
	let mut container = container();
	let (tx, _) = add_tx(&mut container, &account, Some((HEIGHT, 0)), AMOUNT, 10);
	container.advance_height(HEIGHT + SPENDABLE_AGE);
	spend_tx(&mut container, &account, &tx, None, AMOUNT, 11);
	assert_eq!(container.balance(INCLUDE_ALL), 0);

	container.detach(HEIGHT + 1);
	assert_eq!(container.transactions_count(), 2);
	assert_eq!(container.transfers_count(), 1);
	assert_eq!(container.balance(INCLUDE_ALL), 0);
}

#[test]
fn detach_of_source_cascades_into_unconfirmed_spender() {
	let account = generate_account(1);
	let mut container = container();
	let (tx, _) = add_tx(&mut container, &account, Some((HEIGHT, 0)), AMOUNT, 10);
	container.advance_height(HEIGHT + SPENDABLE_AGE);
	spend_tx(&mut container, &account, &tx, None, AMOUNT, 11);

	container.detach(HEIGHT);
	assert_eq!(container.transactions_count(), 0);
	assert_eq!(container.transfers_count(), 0);
	assert_eq!(container.balance(INCLUDE_ALL), 0);
}

#[test]
fn detach_then_advance_restores_unlock_clock() {
	let account = generate_account(1);
	let mut container = container();
	container.detach(HEIGHT);
	add_tx(&mut container, &account, Some((HEIGHT, 0)), AMOUNT, 10);
	assert_eq!(container.balance(INCLUDE_ALL_UNLOCKED), 0);
	container.advance_height(HEIGHT + SPENDABLE_AGE);
	assert_eq!(container.balance(INCLUDE_ALL_UNLOCKED), AMOUNT);
	container.detach(HEIGHT);
	assert_eq!(container.balance(INCLUDE_ALL_UNLOCKED), 0);
}

// ---------------------------------------------------------------------
// advance_height
// ---------------------------------------------------------------------

#[test]
fn advance_refuses_to_go_backwards() {
	let mut container = container();
	assert!(container.advance_height(1000));
	assert!(!container.advance_height(999));
	assert!(container.advance_height(1000));
	assert!(container.advance_height(1001));
}

#[test]
fn advance_does_not_unlock_fresh_admissions() {
	let account = generate_account(1);
	let mut container = container();
	add_tx(&mut container, &account, Some((HEIGHT, 0)), AMOUNT, 10);
	container.advance_height(HEIGHT + SPENDABLE_AGE);
	add_tx(
		&mut container,
		&account,
		Some((HEIGHT + SPENDABLE_AGE, 0)),
		AMOUNT,
		11,
	);
	assert_eq!(container.transactions_count(), 2);
	assert_eq!(container.balance(INCLUDE_ALL_UNLOCKED), AMOUNT);
}

// ---------------------------------------------------------------------
// balance flags
// ---------------------------------------------------------------------

#[test]
fn balance_distinguishes_locked_states() {
	let account = generate_account(1);
	let mut container = container();
	const A1: u64 = 13;
	const A2: u64 = 17;

	// A2 old enough to unlock, A1 fresh
	add_tx(&mut container, &account, Some((999, 0)), A2, 10);
	add_tx(&mut container, &account, Some((1000, 0)), A1, 11);

	assert_eq!(
		container.balance(INCLUDE_STATE_SOFT_LOCKED | INCLUDE_TYPE_ALL),
		A1
	);
	assert_eq!(
		container.balance(INCLUDE_STATE_UNLOCKED | INCLUDE_TYPE_ALL),
		A2
	);
	assert_eq!(container.balance(INCLUDE_STATE_LOCKED | INCLUDE_TYPE_ALL), 0);
}

#[test]
fn unconfirmed_balance_sits_under_the_locked_flag() {
	let account = generate_account(1);
	let mut container = container();
	const A1: u64 = 13;
	const A2: u64 = 17;
	add_tx(&mut container, &account, None, A1, 10);
	add_tx(&mut container, &account, Some((HEIGHT, 0)), A2, 11);

	assert_eq!(container.balance(INCLUDE_STATE_LOCKED | INCLUDE_TYPE_ALL), A1);
}

#[test]
fn height_locked_output_stays_soft_locked() {
	let account = generate_account(1);
	let mut container = container();
	const A1: u64 = 13;

	let mut builder = TestTransactionBuilder::new(10);
	builder.set_unlock_time(HEIGHT + 500);
	builder.add_test_input(A1 + 1);
	let out = builder.add_test_key_output(A1, GLOBAL_INDEX, Some(&account));
	let tx = builder.build();
	assert!(container
		.add_transaction(&block(HEIGHT, 0), &tx, &[out])
		.unwrap());

	// aged, but the unlock time is still in the future
	container.advance_height(HEIGHT + 100);
	assert_eq!(
		container.balance(INCLUDE_STATE_SOFT_LOCKED | INCLUDE_TYPE_ALL),
		A1
	);
	assert_eq!(container.balance(INCLUDE_ALL_UNLOCKED), 0);

	// past the unlock height it spends like anything else
	container.advance_height(HEIGHT + 500);
	assert_eq!(container.balance(INCLUDE_ALL_UNLOCKED), A1);
}

#[test]
fn time_locked_output_stays_soft_locked() {
	let account = generate_account(1);
	let mut container = container();
	const A1: u64 = 13;
	let far_future = 4_000_000_000u64; // unix timestamp, not a height

	let mut builder = TestTransactionBuilder::new(10);
	builder.set_unlock_time(far_future);
	builder.add_test_input(A1 + 1);
	let out = builder.add_test_key_output(A1, GLOBAL_INDEX, Some(&account));
	let tx = builder.build();
	assert!(container
		.add_transaction(&block(HEIGHT, 0), &tx, &[out])
		.unwrap());

	container.advance_height(HEIGHT + 100);
	assert_eq!(
		container.balance(INCLUDE_STATE_SOFT_LOCKED | INCLUDE_TYPE_ALL),
		A1
	);
	assert_eq!(container.balance(INCLUDE_ALL_UNLOCKED), 0);
}

#[test]
fn balance_is_monotone_in_flags() {
	let account = generate_account(1);
	let mut container = container();
	add_tx(&mut container, &account, Some((HEIGHT, 0)), 13, 10);
	add_tx(&mut container, &account, Some((HEIGHT + 1, 0)), 17, 11);
	add_tx(&mut container, &account, None, 19, 12);
	container.advance_height(HEIGHT + SPENDABLE_AGE);

	let partials = [
		INCLUDE_STATE_LOCKED | INCLUDE_TYPE_ALL,
		INCLUDE_STATE_SOFT_LOCKED | INCLUDE_TYPE_ALL,
		INCLUDE_STATE_UNLOCKED | INCLUDE_TYPE_ALL,
	];
	let total = container.balance(INCLUDE_ALL);
	let mut sum = 0;
	for flags in partials.iter() {
		let partial = container.balance(*flags);
		assert!(partial <= total);
		sum += partial;
	}
	assert_eq!(sum, total);
}

// ---------------------------------------------------------------------
// key image collisions
// ---------------------------------------------------------------------

/// Two transactions sharing a transaction key produce the same one-time
/// key (and key image) for the same output slot and account.
fn twin_tx(
	account: &AccountKeys,
	secret: Option<krypton_keychain::SecretKey>,
	inputs: usize,
	amount: u64,
	global: u64,
	seed: u64,
) -> (Transaction, TransferOutput, krypton_keychain::SecretKey) {
	let mut builder = match secret {
		Some(secret) => TestTransactionBuilder::with_tx_secret(seed, secret),
		None => TestTransactionBuilder::new(seed),
	};
	let tx_secret = builder.tx_secret_key();
	for _ in 0..inputs {
		builder.add_test_input(amount + 1);
	}
	let out = builder.add_test_key_output(amount, global, Some(account));
	let tx = builder.build();
	(tx, out, tx_secret)
}

#[test]
fn second_unconfirmed_twin_hides_both() {
	let account = generate_account(1);
	let mut container = container();
	let (tx1, out1, secret) = twin_tx(
		&account,
		None,
		1,
		AMOUNT,
		UNCONFIRMED_TRANSACTION_GLOBAL_OUTPUT_INDEX,
		10,
	);
	let (tx2, out2, _) = twin_tx(
		&account,
		Some(secret),
		2,
		AMOUNT,
		UNCONFIRMED_TRANSACTION_GLOBAL_OUTPUT_INDEX,
		11,
	);
	assert_eq!(out1.key_image, out2.key_image);
	assert_ne!(tx1.hash(), tx2.hash());

	assert!(container
		.add_transaction(&TransactionBlockInfo::unconfirmed(), &tx1, &[out1])
		.unwrap());
	assert_eq!(container.balance(INCLUDE_ALL_LOCKED), AMOUNT);

	assert!(container
		.add_transaction(&TransactionBlockInfo::unconfirmed(), &tx2, &[out2])
		.unwrap());
	assert_eq!(container.transactions_count(), 2);
	assert_eq!(container.balance(INCLUDE_ALL_LOCKED), 0);
	assert!(container.get_outputs(INCLUDE_ALL_LOCKED).is_empty());
}

#[test]
fn confirmed_twin_shadows_unconfirmed() {
	let account = generate_account(1);
	let mut container = container();
	let (tx1, out1, secret) = twin_tx(
		&account,
		None,
		1,
		AMOUNT,
		UNCONFIRMED_TRANSACTION_GLOBAL_OUTPUT_INDEX,
		10,
	);
	assert!(container
		.add_transaction(&TransactionBlockInfo::unconfirmed(), &tx1, &[out1])
		.unwrap());
	assert_eq!(container.balance(INCLUDE_ALL_LOCKED), AMOUNT);

	let (tx2, out2, _) = twin_tx(&account, Some(secret), 2, AMOUNT, GLOBAL_INDEX, 11);
	assert!(container
		.add_transaction(&block(HEIGHT, 0), &tx2, &[out2])
		.unwrap());
	container.advance_height(HEIGHT + SPENDABLE_AGE);

	assert_eq!(container.balance(INCLUDE_ALL_UNLOCKED), AMOUNT);
	assert_eq!(container.balance(INCLUDE_ALL_LOCKED), 0);
}

#[test]
fn earlier_confirmed_twin_stays_visible() {
	let account = generate_account(1);
	let mut container = container();
	let (tx1, out1, secret) = twin_tx(&account, None, 1, AMOUNT, GLOBAL_INDEX, 10);
	assert!(container
		.add_transaction(&block(HEIGHT, 1), &tx1, &[out1])
		.unwrap());

	// same block, later index
	let (tx2, out2, _) = twin_tx(&account, Some(secret.clone()), 2, AMOUNT, GLOBAL_INDEX + 1, 11);
	assert!(container
		.add_transaction(&block(HEIGHT, 2), &tx2, &[out2])
		.unwrap());
	container.advance_height(HEIGHT + SPENDABLE_AGE);
	assert_eq!(container.transactions_count(), 2);
	assert_eq!(container.transfers_count(), 2);
	assert_eq!(container.balance(INCLUDE_ALL_UNLOCKED), AMOUNT);

	// a third twin in a later block also hides
	let (tx3, out3, _) = twin_tx(&account, Some(secret), 3, AMOUNT, GLOBAL_INDEX + 2, 12);
	assert!(container
		.add_transaction(&block(HEIGHT + 1, 0), &tx3, &[out3])
		.unwrap());
	assert_eq!(container.balance(INCLUDE_ALL), AMOUNT);
}

#[test]
fn twin_amount_mismatch_is_rejected_on_admission() {
	let account = generate_account(1);
	let mut container = container();
	let (tx1, out1, secret) = twin_tx(&account, None, 1, AMOUNT, GLOBAL_INDEX, 10);
	assert!(container
		.add_transaction(&block(HEIGHT, 0), &tx1, &[out1])
		.unwrap());

	let (tx2, out2, _) = twin_tx(&account, Some(secret), 2, AMOUNT * 2, GLOBAL_INDEX + 1, 11);
	let err = container
		.add_transaction(&block(HEIGHT + 1, 0), &tx2, &[out2])
		.unwrap_err();
	assert_eq!(
		std::mem::discriminant(&err.kind()),
		std::mem::discriminant(&krypton_wallet::ErrorKind::InternalWalletError(String::new()))
	);
	assert_eq!(container.transactions_count(), 1);
}

#[test]
fn spend_resolves_to_the_visible_twin() {
	let account = generate_account(1);
	let mut container = container();
	let (tx1, out1, secret) = twin_tx(&account, None, 1, AMOUNT, GLOBAL_INDEX, 10);
	assert!(container
		.add_transaction(&block(HEIGHT, 1), &tx1, &[out1])
		.unwrap());
	let (tx2, out2, _) = twin_tx(&account, Some(secret), 2, AMOUNT, GLOBAL_INDEX + 1, 11);
	assert!(container
		.add_transaction(&block(HEIGHT, 2), &tx2, &[out2.clone()])
		.unwrap());
	container.advance_height(HEIGHT + SPENDABLE_AGE);

	// the spender references the hidden twin's output; the ledger charges
	// the visible one
	let mut spender = TestTransactionBuilder::new(12);
	spender.add_input_from(&account, &out2);
	spender.add_test_key_output(AMOUNT, GLOBAL_INDEX + 10, None);
	let spend = spender.build();
	assert!(container
		.add_transaction(&block(HEIGHT + SPENDABLE_AGE, 0), &spend, &[])
		.unwrap());

	assert_eq!(container.balance(INCLUDE_ALL), 0);
	let spent = container.get_spent_outputs();
	assert_eq!(spent.len(), 1);
	assert_eq!(spent[0].transfer.transaction_hash, tx1.hash());
	assert_ne!(spent[0].transfer.transaction_hash, tx2.hash());
}

#[test]
fn spending_a_spent_group_is_a_double_spend() {
	let account = generate_account(1);
	let mut container = container();
	let (tx1, out1, _) = twin_tx(&account, None, 1, AMOUNT, GLOBAL_INDEX, 10);
	assert!(container
		.add_transaction(&block(HEIGHT, 0), &tx1, &[out1.clone()])
		.unwrap());
	container.advance_height(HEIGHT + SPENDABLE_AGE);

	let mut spender = TestTransactionBuilder::new(11);
	spender.add_input_from(&account, &out1);
	spender.add_test_key_output(AMOUNT, GLOBAL_INDEX + 10, None);
	let spend = spender.build();
	assert!(container
		.add_transaction(&block(HEIGHT + SPENDABLE_AGE, 0), &spend, &[])
		.unwrap());

	let mut second = TestTransactionBuilder::new(12);
	second.add_input_from(&account, &out1);
	second.add_test_key_output(AMOUNT, GLOBAL_INDEX + 11, None);
	let double = second.build();
	assert!(container
		.add_transaction(&block(HEIGHT + SPENDABLE_AGE + 1, 0), &double, &[])
		.is_err());
}

#[test]
fn deleting_one_of_two_unconfirmed_twins_reveals_the_other() {
	let account = generate_account(1);
	let mut container = container();
	let (tx1, out1, secret) = twin_tx(
		&account,
		None,
		1,
		AMOUNT,
		UNCONFIRMED_TRANSACTION_GLOBAL_OUTPUT_INDEX,
		10,
	);
	let (tx2, out2, _) = twin_tx(
		&account,
		Some(secret),
		2,
		AMOUNT,
		UNCONFIRMED_TRANSACTION_GLOBAL_OUTPUT_INDEX,
		11,
	);
	assert!(container
		.add_transaction(&TransactionBlockInfo::unconfirmed(), &tx1, &[out1])
		.unwrap());
	assert!(container
		.add_transaction(&TransactionBlockInfo::unconfirmed(), &tx2, &[out2])
		.unwrap());
	assert_eq!(container.balance(INCLUDE_ALL), 0);

	assert!(container.delete_unconfirmed_transaction(&tx2.hash()));
	assert_eq!(container.balance(INCLUDE_ALL), AMOUNT);
}

#[test]
fn deleting_one_of_three_unconfirmed_twins_reveals_nothing() {
	let account = generate_account(1);
	let mut container = container();
	let (tx1, out1, secret) = twin_tx(
		&account,
		None,
		1,
		AMOUNT,
		UNCONFIRMED_TRANSACTION_GLOBAL_OUTPUT_INDEX,
		10,
	);
	let (tx2, out2, _) = twin_tx(
		&account,
		Some(secret.clone()),
		2,
		AMOUNT,
		UNCONFIRMED_TRANSACTION_GLOBAL_OUTPUT_INDEX,
		11,
	);
	let (tx3, out3, _) = twin_tx(
		&account,
		Some(secret),
		3,
		AMOUNT,
		UNCONFIRMED_TRANSACTION_GLOBAL_OUTPUT_INDEX,
		12,
	);
	for (tx, out) in [(&tx1, out1), (&tx2, out2), (&tx3, out3)].iter() {
		assert!(container
			.add_transaction(&TransactionBlockInfo::unconfirmed(), tx, &[out.clone()])
			.unwrap());
	}
	assert_eq!(container.balance(INCLUDE_ALL), 0);

	assert!(container.delete_unconfirmed_transaction(&tx2.hash()));
	assert_eq!(container.balance(INCLUDE_ALL), 0);
}

#[test]
fn detaching_the_visible_twin_promotes_the_unconfirmed_one() {
	let account = generate_account(1);
	let mut container = container();
	let (tx1, out1, secret) = twin_tx(&account, None, 1, AMOUNT, GLOBAL_INDEX, 10);
	assert!(container
		.add_transaction(&block(HEIGHT, 0), &tx1, &[out1])
		.unwrap());
	let (tx2, out2, _) = twin_tx(
		&account,
		Some(secret),
		2,
		AMOUNT,
		UNCONFIRMED_TRANSACTION_GLOBAL_OUTPUT_INDEX,
		11,
	);
	assert!(container
		.add_transaction(&TransactionBlockInfo::unconfirmed(), &tx2, &[out2])
		.unwrap());
	assert_eq!(container.balance(INCLUDE_ALL), AMOUNT);

	assert_eq!(container.detach(HEIGHT).len(), 1);
	assert_eq!(container.balance(INCLUDE_ALL), AMOUNT);
	assert_eq!(container.balance(INCLUDE_ALL_LOCKED), AMOUNT);
}

// ---------------------------------------------------------------------
// add/detach inversion and serialization
// ---------------------------------------------------------------------

#[test]
fn detach_inverts_admission_for_every_flag_combination() {
	let account = generate_account(1);
	let mut container = container();
	add_tx(&mut container, &account, Some((HEIGHT - 1, 0)), 50, 9);
	container.advance_height(HEIGHT);

	let flag_sets = [
		INCLUDE_ALL,
		INCLUDE_ALL_LOCKED,
		INCLUDE_ALL_UNLOCKED,
		INCLUDE_STATE_SOFT_LOCKED | INCLUDE_TYPE_ALL,
	];
	let before: Vec<u64> = flag_sets.iter().map(|f| container.balance(*f)).collect();

	add_tx(&mut container, &account, Some((HEIGHT, 0)), AMOUNT, 10);
	container.detach(HEIGHT);
	container.advance_height(HEIGHT);

	let after: Vec<u64> = flag_sets.iter().map(|f| container.balance(*f)).collect();
	assert_eq!(before, after);
}

#[test]
fn snapshot_roundtrip_preserves_the_ledger() {
	let account = generate_account(1);
	let mut container = container();
	let (tx, _) = add_tx(&mut container, &account, Some((HEIGHT, 0)), AMOUNT, 10);
	add_tx(&mut container, &account, None, 42, 11);
	container.advance_height(HEIGHT + SPENDABLE_AGE);

	let mut snapshot = Vec::new();
	{
		let mut writer = BinWriter::new(&mut snapshot);
		container.save(&mut writer).unwrap();
	}

	let mut restored = TransfersContainer::new(SPENDABLE_AGE);
	{
		let mut slice = &snapshot[..];
		let mut reader = BinReader::new(&mut slice);
		restored.load(&mut reader).unwrap();
	}

	assert_eq!(restored.transactions_count(), container.transactions_count());
	assert_eq!(restored.transfers_count(), container.transfers_count());
	assert_eq!(
		restored.balance(INCLUDE_ALL_UNLOCKED),
		container.balance(INCLUDE_ALL_UNLOCKED)
	);
	assert_eq!(
		restored.balance(INCLUDE_ALL_LOCKED),
		container.balance(INCLUDE_ALL_LOCKED)
	);
	assert_eq!(
		restored.get_transaction_information(&tx.hash()),
		container.get_transaction_information(&tx.hash())
	);
}
