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

//! Selection of inputs for building transactions

use krypton_keychain::PublicKey;

use crate::error::{Error, ErrorKind};
use crate::types::TransferOutput;

/// A spendable output together with the account that owns it
#[derive(Clone, Debug)]
pub struct Candidate {
	/// Spend public key of the owning account
	pub account: PublicKey,
	/// The output itself
	pub output: TransferOutput,
}

impl Candidate {
	/// Identity of the output inside the engine's pending-lock set
	pub fn lock_key(&self) -> (krypton_core::core::hash::Hash, u32) {
		(
			self.output.transaction_hash,
			self.output.output_in_transaction,
		)
	}
}

/// Greedily selects inputs, largest first, until they cover `needed`.
/// When the selection leaves a sliver of change below the dust threshold,
/// one more input is pulled in so the change stays representable.
pub fn select_inputs(
	mut candidates: Vec<Candidate>,
	needed: u64,
	dust_threshold: u64,
) -> Result<Vec<Candidate>, Error> {
	candidates.sort_by(|a, b| b.output.amount.cmp(&a.output.amount));

	let mut selected: Vec<Candidate> = Vec::new();
	let mut total: u64 = 0;
	let mut rest = candidates.into_iter();

	for candidate in &mut rest {
		total = total.saturating_add(candidate.output.amount);
		selected.push(candidate);
		if total >= needed {
			break;
		}
	}

	if total < needed {
		return Err(ErrorKind::WrongAmount.into());
	}

	let change = total - needed;
	if change > 0 && change < dust_threshold {
		if let Some(extra) = rest.next() {
			selected.push(extra);
		}
	}

	Ok(selected)
}

/// Splits change into the donation and what stays as change: the donation
/// is the largest multiple of `threshold` not exceeding the change.
pub fn carve_donation(change: u64, threshold: u64) -> (u64, u64) {
	debug_assert!(threshold > 0);
	let donation = change - change % threshold;
	(donation, change - donation)
}
