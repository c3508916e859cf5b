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

//! Account key material. Every account in a wallet shares one view key
//! pair; each address carries its own spend keys. An account without a
//! spend secret is a tracking account: it observes receipts but cannot
//! sign inputs.

use rand::{CryptoRng, RngCore};

use crate::address::WalletAddress;
use crate::crypto::generate_keys;
use crate::types::{PublicKey, SecretKey};

/// A secret/public key pair
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyPair {
	/// The secret half
	pub secret: SecretKey,
	/// The public half
	pub public: PublicKey,
}

impl KeyPair {
	/// Generates a fresh random key pair
	pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> KeyPair {
		let (secret, public) = generate_keys(rng);
		KeyPair { secret, public }
	}

	/// Rebuilds the pair from its secret half
	pub fn from_secret(secret: SecretKey) -> KeyPair {
		let public = secret.public_key();
		KeyPair { secret, public }
	}
}

/// Full key material of a single account
#[derive(Clone, Debug)]
pub struct AccountKeys {
	/// View key pair, shared across every account of a wallet
	pub view: KeyPair,
	/// Spend public key, which identifies the account
	pub spend_public: PublicKey,
	/// Spend secret key; `None` for tracking accounts
	pub spend_secret: Option<SecretKey>,
}

impl AccountKeys {
	/// Generates a spendable account under the given view pair
	pub fn generate<R: RngCore + CryptoRng>(view: KeyPair, rng: &mut R) -> AccountKeys {
		let (spend_secret, spend_public) = generate_keys(rng);
		AccountKeys {
			view,
			spend_public,
			spend_secret: Some(spend_secret),
		}
	}

	/// Rebuilds a spendable account from an existing spend secret
	pub fn from_spend_secret(view: KeyPair, spend_secret: SecretKey) -> AccountKeys {
		let spend_public = spend_secret.public_key();
		AccountKeys {
			view,
			spend_public,
			spend_secret: Some(spend_secret),
		}
	}

	/// Builds a tracking account from a spend public key alone
	pub fn tracking(view: KeyPair, spend_public: PublicKey) -> AccountKeys {
		AccountKeys {
			view,
			spend_public,
			spend_secret: None,
		}
	}

	/// Whether this account can observe but not spend
	pub fn is_tracking(&self) -> bool {
		self.spend_secret.is_none()
	}

	/// The public address of this account
	pub fn address(&self) -> WalletAddress {
		WalletAddress {
			spend_public: self.spend_public,
			view_public: self.view.public,
		}
	}
}
