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

//! The encrypted wallet file envelope: a small JSON wrapper carrying salt,
//! nonce and the ChaCha20-Poly1305 sealed binary payload, keyed through
//! PBKDF2-SHA512 from the wallet password.

use rand::{thread_rng, Rng};
use ring::{aead, digest, pbkdf2};

use krypton_util::{from_hex, to_hex};

use crate::error::{Error, ErrorKind};

/// Envelope format version
pub const ENVELOPE_VERSION: u32 = 1;

const PBKDF2_ITERATIONS: u32 = 100;

/// The on-disk JSON wrapper of a wallet file
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WalletEnvelope {
	/// Format version
	pub version: u32,
	/// PBKDF2 salt (hex)
	pub salt: String,
	/// AEAD nonce (hex)
	pub nonce: String,
	/// Sealed payload (hex)
	pub payload: String,
}

fn derive_key(password: &str, salt: &[u8]) -> [u8; 32] {
	let mut key = [0u8; 32];
	pbkdf2::derive(
		&digest::SHA512,
		PBKDF2_ITERATIONS,
		salt,
		password.as_bytes(),
		&mut key,
	);
	key
}

/// Seals a serialized wallet payload under the given password
pub fn encrypt_payload(payload: &[u8], password: &str) -> Result<WalletEnvelope, Error> {
	let salt: [u8; 8] = thread_rng().gen();
	let nonce: [u8; 12] = thread_rng().gen();
	let key = derive_key(password, &salt);

	let mut sealed = payload.to_vec();
	let suffix_len = aead::CHACHA20_POLY1305.tag_len();
	sealed.resize(payload.len() + suffix_len, 0);

	let sealing_key = aead::SealingKey::new(&aead::CHACHA20_POLY1305, &key)
		.map_err(|_| Error::from(ErrorKind::Format("sealing key".to_owned())))?;
	aead::seal_in_place(&sealing_key, &nonce, &[], &mut sealed, suffix_len)
		.map_err(|_| Error::from(ErrorKind::Format("seal failed".to_owned())))?;

	Ok(WalletEnvelope {
		version: ENVELOPE_VERSION,
		salt: to_hex(salt.to_vec()),
		nonce: to_hex(nonce.to_vec()),
		payload: to_hex(sealed),
	})
}

/// Opens a wallet envelope. A password mismatch surfaces as
/// `WrongPassword` without touching any state.
pub fn decrypt_payload(envelope: &WalletEnvelope, password: &str) -> Result<Vec<u8>, Error> {
	if envelope.version != ENVELOPE_VERSION {
		return Err(ErrorKind::Format(format!(
			"unsupported wallet file version {}",
			envelope.version
		))
		.into());
	}
	let salt = from_hex(envelope.salt.clone())
		.map_err(|e| Error::from(ErrorKind::Format(e)))?;
	let nonce = from_hex(envelope.nonce.clone())
		.map_err(|e| Error::from(ErrorKind::Format(e)))?;
	let mut sealed = from_hex(envelope.payload.clone())
		.map_err(|e| Error::from(ErrorKind::Format(e)))?;

	let key = derive_key(password, &salt);
	let opening_key = aead::OpeningKey::new(&aead::CHACHA20_POLY1305, &key)
		.map_err(|_| Error::from(ErrorKind::Format("opening key".to_owned())))?;
	let opened = aead::open_in_place(&opening_key, &nonce, &[], 0, &mut sealed)
		.map_err(|_| Error::from(ErrorKind::WrongPassword))?;
	Ok(opened.to_vec())
}
