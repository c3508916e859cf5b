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

//! Per-consumer synchronization cursor: the chain of block hashes the
//! consumer has processed, and the sparse history used to resume a fetch
//! against the node.

use krypton_core::core::hash::Hash;
use krypton_core::ser::{Readable, Reader, Writeable, Writer};

use crate::error::Error;

/// The block hashes a consumer has seen, genesis first. Height `h` sits at
/// index `h`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SynchronizationState {
	blockchain: Vec<Hash>,
}

impl SynchronizationState {
	/// A state that has seen only the genesis block
	pub fn new(genesis_hash: Hash) -> SynchronizationState {
		SynchronizationState {
			blockchain: vec![genesis_hash],
		}
	}

	/// Height of the next block this state expects
	pub fn height(&self) -> u64 {
		self.blockchain.len() as u64
	}

	/// Hash of the highest block seen
	pub fn tip(&self) -> Hash {
		*self.blockchain.last().expect("state always holds genesis")
	}

	/// The hash recorded at a given height, if within view
	pub fn hash_at(&self, height: u64) -> Option<Hash> {
		self.blockchain.get(height as usize).copied()
	}

	/// A compact resume history: the most recent hashes, then exponentially
	/// spaced ancestors, always ending at genesis.
	pub fn known_block_hashes(&self) -> Vec<Hash> {
		let size = self.blockchain.len();
		let mut history = Vec::new();
		let mut multiplier: usize = 1;
		let mut back_offset: usize = 1;
		while back_offset < size {
			history.push(self.blockchain[size - back_offset]);
			if history.len() >= 10 {
				multiplier *= 2;
			}
			back_offset += multiplier;
		}
		history.push(self.blockchain[0]);
		history
	}

	/// Appends block hashes starting at `start_height`. The state must
	/// already reach exactly that height (detach first on reorgs).
	pub fn add_blocks(&mut self, hashes: &[Hash], start_height: u64) -> Result<(), Error> {
		if self.height() != start_height {
			return Err(Error::internal(format!(
				"sync state at height {} cannot accept blocks from {}",
				self.height(),
				start_height
			)));
		}
		self.blockchain.extend_from_slice(hashes);
		Ok(())
	}

	/// Drops every hash at or above `height`. Genesis always stays.
	pub fn detach(&mut self, height: u64) {
		let keep = (height.max(1)) as usize;
		if keep < self.blockchain.len() {
			self.blockchain.truncate(keep);
		}
	}
}

impl Writeable for SynchronizationState {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), krypton_core::ser::Error> {
		self.blockchain.write(writer)
	}
}

impl Readable for SynchronizationState {
	fn read<R: Reader>(reader: &mut R) -> Result<SynchronizationState, krypton_core::ser::Error> {
		let blockchain: Vec<Hash> = Vec::read(reader)?;
		if blockchain.is_empty() {
			return Err(krypton_core::ser::Error::CorruptedData);
		}
		Ok(SynchronizationState { blockchain })
	}
}
