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

//! Wallet addresses: the pair of spend and view public keys, rendered as
//! base58 with a version prefix and a 4-byte checksum.

use std::fmt;
use std::str::FromStr;

use crate::base58::{from_base58, to_base58};
use crate::crypto::checksum;
use crate::types::{Error, PublicKey};
use crate::KEY_SIZE;

/// Version prefix of every krypton address
pub const ADDRESS_PREFIX: u8 = 0x4b;

const CHECKSUM_SIZE: usize = 4;
const ADDRESS_RAW_SIZE: usize = 1 + 2 * KEY_SIZE + CHECKSUM_SIZE;

/// A public wallet address. Two addresses are equal iff both of their keys
/// are byte-equal.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WalletAddress {
	/// Spend public key, unique per account
	pub spend_public: PublicKey,
	/// View public key, shared by all of a wallet's accounts
	pub view_public: PublicKey,
}

impl WalletAddress {
	/// Parses an address from its base58 form, validating prefix and
	/// checksum.
	pub fn parse(encoded: &str) -> Result<WalletAddress, Error> {
		let raw = from_base58(encoded)?;
		if raw.len() != ADDRESS_RAW_SIZE {
			return Err(Error::InvalidAddress(format!(
				"wrong length {}",
				raw.len()
			)));
		}
		if raw[0] != ADDRESS_PREFIX {
			return Err(Error::InvalidAddress(format!(
				"wrong prefix {:#04x}",
				raw[0]
			)));
		}
		let body_len = ADDRESS_RAW_SIZE - CHECKSUM_SIZE;
		if checksum(&raw[..body_len])[..] != raw[body_len..] {
			return Err(Error::InvalidAddress("bad checksum".to_owned()));
		}

		let mut spend = [0u8; KEY_SIZE];
		let mut view = [0u8; KEY_SIZE];
		spend.copy_from_slice(&raw[1..1 + KEY_SIZE]);
		view.copy_from_slice(&raw[1 + KEY_SIZE..1 + 2 * KEY_SIZE]);
		Ok(WalletAddress {
			spend_public: PublicKey::from_bytes(spend),
			view_public: PublicKey::from_bytes(view),
		})
	}
}

impl fmt::Display for WalletAddress {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut raw = Vec::with_capacity(ADDRESS_RAW_SIZE);
		raw.push(ADDRESS_PREFIX);
		raw.extend_from_slice(self.spend_public.as_ref());
		raw.extend_from_slice(self.view_public.as_ref());
		let check = checksum(&raw);
		raw.extend_from_slice(&check);
		write!(f, "{}", to_base58(&raw))
	}
}

impl fmt::Debug for WalletAddress {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self)
	}
}

impl FromStr for WalletAddress {
	type Err = Error;

	fn from_str(s: &str) -> Result<WalletAddress, Error> {
		WalletAddress::parse(s)
	}
}
