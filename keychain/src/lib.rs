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

//! Key material for krypton accounts: view/spend key pairs, the one-time
//! output key derivation scheme, key images and ring signatures, and the
//! base58 wallet address encoding.

#[macro_use]
extern crate serde_derive;

mod account;
mod address;
pub mod base58;
pub mod crypto;
mod types;

pub use crate::account::{AccountKeys, KeyPair};
pub use crate::address::{WalletAddress, ADDRESS_PREFIX};
pub use crate::types::{Error, KeyDerivation, KeyImage, PublicKey, SecretKey, Signature};

/// Size in bytes of every key and key image handled by the keychain
pub const KEY_SIZE: usize = 32;
/// Size in bytes of a single ring signature element
pub const SIGNATURE_SIZE: usize = 64;
