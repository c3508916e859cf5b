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

//! The `Currency` value object bundles every parameter the wallet needs to
//! agree on with the network: fees, dust, fusion shape rules, emission.
//! Tests override individual parameters through `CurrencyBuilder`.

use crate::consensus;
use crate::core::transaction::Transaction;

/// Currency parameters. Defaults mirror `consensus`; construct through
/// `CurrencyBuilder`.
#[derive(Debug, Clone)]
pub struct Currency {
	money_supply: u64,
	emission_speed_factor: u32,
	mined_money_unlock_window: u64,
	block_granted_full_reward_zone: usize,
	coinbase_blob_reserved_size: usize,
	minimum_fee: u64,
	default_dust_threshold: u64,
	max_mixin: u64,
	fusion_tx_max_size: usize,
	fusion_tx_min_input_count: usize,
	fusion_tx_min_in_out_count_ratio: usize,
	mempool_tx_live_time: u64,
	number_of_periods_to_forget_tx_deleted_from_pool: u64,
}

impl Default for Currency {
	fn default() -> Currency {
		Currency {
			money_supply: consensus::MONEY_SUPPLY,
			emission_speed_factor: consensus::EMISSION_SPEED_FACTOR,
			mined_money_unlock_window: consensus::MINED_MONEY_UNLOCK_WINDOW,
			block_granted_full_reward_zone: consensus::BLOCK_GRANTED_FULL_REWARD_ZONE,
			coinbase_blob_reserved_size: consensus::COINBASE_BLOB_RESERVED_SIZE,
			minimum_fee: consensus::MINIMUM_FEE,
			default_dust_threshold: consensus::DEFAULT_DUST_THRESHOLD,
			max_mixin: consensus::MAX_MIXIN,
			fusion_tx_max_size: consensus::FUSION_TX_MAX_SIZE,
			fusion_tx_min_input_count: consensus::FUSION_TX_MIN_INPUT_COUNT,
			fusion_tx_min_in_out_count_ratio: consensus::FUSION_TX_MIN_IN_OUT_COUNT_RATIO,
			mempool_tx_live_time: consensus::MEMPOOL_TX_LIVE_TIME,
			number_of_periods_to_forget_tx_deleted_from_pool:
				consensus::NUMBER_OF_PERIODS_TO_FORGET_TX_DELETED_FROM_POOL,
		}
	}
}

impl Currency {
	/// Blocks before a coinbase output unlocks
	pub fn mined_money_unlock_window(&self) -> u64 {
		self.mined_money_unlock_window
	}

	/// Minimum fee of a relayed (non-fusion) transaction
	pub fn minimum_fee(&self) -> u64 {
		self.minimum_fee
	}

	/// Dust bound; outputs below it are unmixable
	pub fn default_dust_threshold(&self) -> u64 {
		self.default_dust_threshold
	}

	/// Largest ring size nodes accept
	pub fn max_mixin(&self) -> u64 {
		self.max_mixin
	}

	/// Upper bound on the serialized size of a fusion transaction
	pub fn fusion_tx_max_size(&self) -> usize {
		self.fusion_tx_max_size
	}

	/// Lower bound on inputs consumed by a fusion transaction
	pub fn fusion_tx_min_input_count(&self) -> usize {
		self.fusion_tx_min_input_count
	}

	/// Required input:output ratio of a fusion transaction
	pub fn fusion_tx_min_in_out_count_ratio(&self) -> usize {
		self.fusion_tx_min_in_out_count_ratio
	}

	/// Seconds a deleted pool transaction stays on the wallet's blocklist
	pub fn forget_deleted_pool_tx_after(&self) -> u64 {
		self.mempool_tx_live_time * self.number_of_periods_to_forget_tx_deleted_from_pool
	}

	/// The largest transaction the wallet will build: a full reward zone
	/// block minus the space reserved for the miner transaction.
	pub fn max_transaction_size(&self) -> usize {
		self.block_granted_full_reward_zone - self.coinbase_blob_reserved_size
	}

	/// Base block reward against the supply already emitted
	pub fn base_reward(&self, already_generated: u64) -> u64 {
		(self.money_supply - already_generated) >> self.emission_speed_factor
	}

	/// Breaks an amount into its decimal digit chunks (`d * 10^k`), lumping
	/// everything at or below the dust threshold into a single trailing
	/// dust amount. Returned smallest-first; the dust amount, if any, comes
	/// first.
	pub fn decompose_amount(&self, amount: u64) -> Vec<u64> {
		let (chunks, dust) = decompose_amount_into_digits(amount, self.default_dust_threshold);
		let mut out = Vec::with_capacity(chunks.len() + 1);
		if dust > 0 {
			out.push(dust);
		}
		out.extend(chunks);
		out
	}

	/// Whether an owned unlocked output can feed a fusion transaction with
	/// the given threshold
	pub fn is_applicable_in_fusion_input(&self, amount: u64, threshold: u64) -> bool {
		amount < threshold && amount >= self.default_dust_threshold
	}

	/// The node-side fusion predicate: enough inputs, enough consolidation,
	/// no fee, outputs exactly the canonical decomposition of the inputs,
	/// bounded size.
	pub fn is_fusion_transaction(&self, tx: &Transaction) -> bool {
		let inputs: Vec<u64> = tx.prefix.inputs.iter().map(|i| i.amount()).collect();
		let outputs: Vec<u64> = tx.prefix.outputs.iter().map(|o| o.amount).collect();
		self.is_fusion_amounts(&inputs, &outputs, tx.size())
	}

	/// `is_fusion_transaction` on raw amount lists
	pub fn is_fusion_amounts(&self, inputs: &[u64], outputs: &[u64], size: usize) -> bool {
		if size > self.fusion_tx_max_size {
			return false;
		}
		if inputs.len() < self.fusion_tx_min_input_count {
			return false;
		}
		if inputs.len() < outputs.len() * self.fusion_tx_min_in_out_count_ratio {
			return false;
		}

		let mut input_amount: u64 = 0;
		for amount in inputs {
			if *amount < self.default_dust_threshold {
				return false;
			}
			input_amount = match input_amount.checked_add(*amount) {
				Some(total) => total,
				None => return false,
			};
		}

		let mut expected = self.decompose_amount(input_amount);
		let mut actual = outputs.to_vec();
		expected.sort_unstable();
		actual.sort_unstable();
		expected == actual
	}

	/// Renders an atomic amount as a decimal coin value
	pub fn format_amount(&self, amount: u64) -> String {
		format!(
			"{}.{:08}",
			amount / consensus::COIN,
			amount % consensus::COIN
		)
	}
}

/// Incremental `Currency` construction, used mostly by tests to shrink
/// fusion or fee parameters.
#[derive(Default)]
pub struct CurrencyBuilder {
	currency: Currency,
}

impl CurrencyBuilder {
	/// Starts from the consensus defaults
	pub fn new() -> CurrencyBuilder {
		CurrencyBuilder::default()
	}

	/// Overrides the dust threshold
	pub fn default_dust_threshold(mut self, val: u64) -> CurrencyBuilder {
		self.currency.default_dust_threshold = val;
		self
	}

	/// Overrides the minimum fee
	pub fn minimum_fee(mut self, val: u64) -> CurrencyBuilder {
		self.currency.minimum_fee = val;
		self
	}

	/// Overrides the mined money unlock window
	pub fn mined_money_unlock_window(mut self, val: u64) -> CurrencyBuilder {
		self.currency.mined_money_unlock_window = val;
		self
	}

	/// Overrides the maximum fusion transaction size
	pub fn fusion_tx_max_size(mut self, val: usize) -> CurrencyBuilder {
		self.currency.fusion_tx_max_size = val;
		self
	}

	/// Overrides the minimum fusion input count
	pub fn fusion_tx_min_input_count(mut self, val: usize) -> CurrencyBuilder {
		self.currency.fusion_tx_min_input_count = val;
		self
	}

	/// Overrides the fusion input:output ratio
	pub fn fusion_tx_min_in_out_count_ratio(mut self, val: usize) -> CurrencyBuilder {
		self.currency.fusion_tx_min_in_out_count_ratio = val;
		self
	}

	/// Overrides the maximum mixin
	pub fn max_mixin(mut self, val: u64) -> CurrencyBuilder {
		self.currency.max_mixin = val;
		self
	}

	/// Finalizes the currency
	pub fn currency(self) -> Currency {
		self.currency
	}
}

/// Splits `amount` into decimal digit chunks, accumulating the low digits
/// into a dust remainder for as long as it stays at or below
/// `dust_threshold`. Chunks come back smallest-first.
pub fn decompose_amount_into_digits(amount: u64, dust_threshold: u64) -> (Vec<u64>, u64) {
	let mut chunks = vec![];
	let mut dust: u64 = 0;
	let mut dust_handled = false;

	let mut rest = amount;
	let mut order: u64 = 1;
	while rest > 0 {
		let chunk = (rest % 10) * order;
		rest /= 10;
		order *= 10;

		if chunk == 0 {
			continue;
		}
		if !dust_handled && dust + chunk <= dust_threshold {
			dust += chunk;
		} else {
			dust_handled = true;
			chunks.push(chunk);
		}
	}

	(chunks, dust)
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn decompose_basic() {
		let (chunks, dust) = decompose_amount_into_digits(12_345_678, 1_000_000);
		assert_eq!(dust, 345_678);
		assert_eq!(chunks, vec![2_000_000, 10_000_000]);

		let (chunks, dust) = decompose_amount_into_digits(11_000_000, 1_000_000);
		assert_eq!(dust, 1_000_000);
		assert_eq!(chunks, vec![10_000_000]);

		let (chunks, dust) = decompose_amount_into_digits(0, 1_000_000);
		assert!(chunks.is_empty());
		assert_eq!(dust, 0);
	}

	#[test]
	fn decompose_covers_amount() {
		let amounts = [1u64, 9, 10, 99, 1_234_567, 70_368_744_177_663];
		for amount in amounts.iter() {
			let (chunks, dust) = decompose_amount_into_digits(*amount, 1_000_000);
			let total: u64 = chunks.iter().sum::<u64>() + dust;
			assert_eq!(total, *amount);
		}
	}

	#[test]
	fn fusion_amounts_predicate() {
		let currency = CurrencyBuilder::new()
			.fusion_tx_min_input_count(6)
			.fusion_tx_min_in_out_count_ratio(3)
			.currency();
		let dust = currency.default_dust_threshold();

		// 12 inputs summing to 31 * dust -> expected outputs [dust, 3*10*dust]
		let mut inputs = vec![2 * dust; 11];
		inputs.push(9 * dust);
		let outputs = currency.decompose_amount(31 * dust);
		assert!(currency.is_fusion_amounts(&inputs, &outputs, 1000));

		// implicit fee breaks it
		let mut short = outputs.clone();
		short[0] -= 1;
		assert!(!currency.is_fusion_amounts(&inputs, &short, 1000));

		// too few inputs
		assert!(!currency.is_fusion_amounts(&inputs[..5], &outputs, 1000));

		// ratio violation
		let wide: Vec<u64> = vec![dust; 7];
		assert!(!currency.is_fusion_amounts(&inputs, &wide, 1000));

		// oversized
		assert!(!currency.is_fusion_amounts(
			&inputs,
			&outputs,
			currency.fusion_tx_max_size() + 1
		));

		// sub-dust input
		let mut dusty = inputs.clone();
		dusty[0] = dust - 1;
		assert!(!currency.is_fusion_amounts(&dusty, &outputs, 1000));
	}

	#[test]
	fn emission_first_reward() {
		let currency = Currency::default();
		assert_eq!(currency.base_reward(0), 70_368_744_177_663);
	}

	#[test]
	fn amount_formatting() {
		let currency = Currency::default();
		assert_eq!(currency.format_amount(100_000_000), "1.00000000");
		assert_eq!(currency.format_amount(123), "0.00000123");
	}
}
