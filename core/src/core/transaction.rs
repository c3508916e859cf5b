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

//! Transactions: the prefix (inputs, outputs, extra field) plus one ring
//! signature group per input. A built transaction is immutable; all
//! construction goes through `TransactionBuilder`, which owns the ephemeral
//! transaction key and the per-input signing contexts.

use std::fmt;

use failure::Fail;
use rand::{CryptoRng, RngCore};

use krypton_keychain::{
	crypto, KeyImage, KeyPair, PublicKey, SecretKey, Signature, WalletAddress,
};

use crate::core::hash::{Hash, Hashed};
use crate::ser::{self, read_elems, write_elems, Readable, Reader, Writeable, Writer};

/// The only transaction format version this codebase produces or accepts
pub const TRANSACTION_VERSION: u8 = 1;

const INPUT_TAG_BASE: u8 = 0xff;
const INPUT_TAG_KEY: u8 = 0x02;
const INPUT_TAG_MULTISIGNATURE: u8 = 0x03;

const OUTPUT_TAG_KEY: u8 = 0x02;
const OUTPUT_TAG_MULTISIGNATURE: u8 = 0x03;

/// Errors thrown by transaction construction
#[derive(Debug, Fail)]
pub enum Error {
	/// Key algebra failed (bad ring, bad key bytes)
	#[fail(display = "keychain error: {}", _0)]
	Keychain(krypton_keychain::Error),
	/// Input referenced by a signing context is malformed
	#[fail(display = "invalid input: {}", _0)]
	InvalidInput(String),
	/// The extra field would overflow its encoding
	#[fail(display = "extra field overflow")]
	ExtraTooLarge,
}

impl From<krypton_keychain::Error> for Error {
	fn from(e: krypton_keychain::Error) -> Error {
		Error::Keychain(e)
	}
}

/// The extra field is a sequence of tagged records: an ephemeral public key
/// and an optional free-form nonce, whose first byte may mark a payment id.
pub mod extra {
	use super::*;

	/// Zero padding, skipped on parse
	pub const TAG_PADDING: u8 = 0x00;
	/// The transaction's ephemeral public key
	pub const TAG_PUBLIC_KEY: u8 = 0x01;
	/// Free-form nonce, length-prefixed
	pub const TAG_NONCE: u8 = 0x02;
	/// Nonce payload marker for a payment id
	pub const NONCE_PAYMENT_ID: u8 = 0x00;
	/// Maximum nonce payload size
	pub const MAX_NONCE_SIZE: usize = 255;

	/// Appends the ephemeral public key record
	pub fn add_tx_public_key(extra: &mut Vec<u8>, key: &PublicKey) {
		extra.push(TAG_PUBLIC_KEY);
		extra.extend_from_slice(key.as_ref());
	}

	/// Appends a free-form nonce record
	pub fn add_nonce(extra: &mut Vec<u8>, nonce: &[u8]) -> Result<(), Error> {
		if nonce.len() > MAX_NONCE_SIZE {
			return Err(Error::ExtraTooLarge);
		}
		extra.push(TAG_NONCE);
		extra.push(nonce.len() as u8);
		extra.extend_from_slice(nonce);
		Ok(())
	}

	/// Appends a payment id wrapped in a nonce record
	pub fn add_payment_id(extra: &mut Vec<u8>, id: &Hash) -> Result<(), Error> {
		let mut nonce = Vec::with_capacity(1 + Hash::LEN);
		nonce.push(NONCE_PAYMENT_ID);
		nonce.extend_from_slice(id.as_bytes());
		add_nonce(extra, &nonce)
	}

	/// The first ephemeral public key record, if any
	pub fn tx_public_key(extra: &[u8]) -> Option<PublicKey> {
		parse(extra).find_map(|record| match record {
			Record::PublicKey(key) => Some(key),
			_ => None,
		})
	}

	/// The payment id carried in a nonce record, if any
	pub fn payment_id(extra: &[u8]) -> Option<Hash> {
		parse(extra).find_map(|record| match record {
			Record::Nonce(nonce) => {
				if nonce.len() == 1 + Hash::LEN && nonce[0] == NONCE_PAYMENT_ID {
					Some(Hash::from_vec(&nonce[1..]))
				} else {
					None
				}
			}
			_ => None,
		})
	}

	enum Record {
		PublicKey(PublicKey),
		Nonce(Vec<u8>),
	}

	fn parse(extra: &[u8]) -> impl Iterator<Item = Record> + '_ {
		let mut pos = 0usize;
		std::iter::from_fn(move || loop {
			if pos >= extra.len() {
				return None;
			}
			match extra[pos] {
				TAG_PADDING => {
					pos += 1;
				}
				TAG_PUBLIC_KEY => {
					if pos + 1 + 32 > extra.len() {
						return None;
					}
					let mut key = [0u8; 32];
					key.copy_from_slice(&extra[pos + 1..pos + 33]);
					pos += 33;
					return Some(Record::PublicKey(PublicKey::from_bytes(key)));
				}
				TAG_NONCE => {
					if pos + 2 > extra.len() {
						return None;
					}
					let len = extra[pos + 1] as usize;
					if pos + 2 + len > extra.len() {
						return None;
					}
					let nonce = extra[pos + 2..pos + 2 + len].to_vec();
					pos += 2 + len;
					return Some(Record::Nonce(nonce));
				}
				// unknown tag, nothing sensible left to parse
				_ => return None,
			}
		})
	}
}

/// A key input spending a one-time output through a ring of decoys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInput {
	/// Amount of every ring member
	pub amount: u64,
	/// Global output indexes of the ring members, for the given amount
	pub output_indexes: Vec<u64>,
	/// The key image of the real spend
	pub key_image: KeyImage,
}

/// An input spending a multisignature output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisignatureInput {
	/// Amount of the referenced output
	pub amount: u64,
	/// Number of signatures that will follow
	pub signature_count: u8,
	/// Global index of the referenced output
	pub output_index: u64,
}

/// Transaction input variants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionInput {
	/// Coinbase input, present only in a block's base transaction
	Base {
		/// Height of the block this base transaction rewards
		block_height: u64,
	},
	/// Ring-signed spend of a one-time key output
	Key(KeyInput),
	/// Spend of a multisignature output
	Multisignature(MultisignatureInput),
}

impl TransactionInput {
	/// The amount consumed by this input (zero for base inputs, whose value
	/// materializes in the outputs)
	pub fn amount(&self) -> u64 {
		match self {
			TransactionInput::Base { .. } => 0,
			TransactionInput::Key(input) => input.amount,
			TransactionInput::Multisignature(input) => input.amount,
		}
	}
}

/// Where an output's value is locked to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputTarget {
	/// A one-time public key
	Key {
		/// The one-time key
		key: PublicKey,
	},
	/// A set of keys, `required_signatures` of which must sign to spend
	Multisignature {
		/// Participant one-time keys
		keys: Vec<PublicKey>,
		/// How many of `keys` must sign
		required_signatures: u32,
	},
}

/// A single transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
	/// Value of the output
	pub amount: u64,
	/// Locking target
	pub target: OutputTarget,
}

/// Everything of a transaction except the signatures; this is what ring
/// signatures commit to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPrefix {
	/// Format version
	pub version: u8,
	/// Height (< 2^31) or unix timestamp after which outputs unlock
	pub unlock_time: u64,
	/// Inputs
	pub inputs: Vec<TransactionInput>,
	/// Outputs
	pub outputs: Vec<TransactionOutput>,
	/// Tagged extra field
	pub extra: Vec<u8>,
}

impl TransactionPrefix {
	/// The ephemeral public key advertised in the extra field
	pub fn public_key(&self) -> Option<PublicKey> {
		extra::tx_public_key(&self.extra)
	}

	/// The payment id advertised in the extra field
	pub fn payment_id(&self) -> Option<Hash> {
		extra::payment_id(&self.extra)
	}

	/// Sum over all input amounts
	pub fn total_inputs(&self) -> u64 {
		self.inputs.iter().map(|i| i.amount()).sum()
	}

	/// Sum over all output amounts
	pub fn total_outputs(&self) -> u64 {
		self.outputs.iter().map(|o| o.amount).sum()
	}

	/// Whether this is a block's base (coinbase) transaction
	pub fn is_base(&self) -> bool {
		self.inputs.len() == 1
			&& match self.inputs[0] {
				TransactionInput::Base { .. } => true,
				_ => false,
			}
	}
}

/// A full, immutable transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
	/// The signed part
	pub prefix: TransactionPrefix,
	/// One signature group per input; empty group for base and
	/// multisignature inputs signed elsewhere
	pub signatures: Vec<Vec<Signature>>,
}

impl Transaction {
	/// Hash identifying the transaction, commits to prefix and signatures
	pub fn hash(&self) -> Hash {
		Hashed::hash(self)
	}

	/// Hash of the prefix alone, the message ring signatures sign
	pub fn prefix_hash(&self) -> Hash {
		self.prefix.hash()
	}

	/// Fee, i.e. the surplus of inputs over outputs. Base transactions mint
	/// money and carry no fee.
	pub fn fee(&self) -> u64 {
		if self.prefix.is_base() {
			0
		} else {
			self.prefix
				.total_inputs()
				.saturating_sub(self.prefix.total_outputs())
		}
	}

	/// Serialized size in bytes
	pub fn size(&self) -> usize {
		ser::ser_vec(self).map(|v| v.len()).unwrap_or(0)
	}
}

impl fmt::Display for Transaction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"tx {} ({} in, {} out)",
			self.hash(),
			self.prefix.inputs.len(),
			self.prefix.outputs.len()
		)
	}
}

impl Writeable for TransactionInput {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		match self {
			TransactionInput::Base { block_height } => {
				writer.write_u8(INPUT_TAG_BASE)?;
				writer.write_u64(*block_height)
			}
			TransactionInput::Key(input) => {
				writer.write_u8(INPUT_TAG_KEY)?;
				writer.write_u64(input.amount)?;
				write_elems(writer, &input.output_indexes)?;
				input.key_image.write(writer)
			}
			TransactionInput::Multisignature(input) => {
				writer.write_u8(INPUT_TAG_MULTISIGNATURE)?;
				writer.write_u64(input.amount)?;
				writer.write_u8(input.signature_count)?;
				writer.write_u64(input.output_index)
			}
		}
	}
}

impl Readable for TransactionInput {
	fn read<R: Reader>(reader: &mut R) -> Result<TransactionInput, ser::Error> {
		match reader.read_u8()? {
			INPUT_TAG_BASE => Ok(TransactionInput::Base {
				block_height: reader.read_u64()?,
			}),
			INPUT_TAG_KEY => Ok(TransactionInput::Key(KeyInput {
				amount: reader.read_u64()?,
				output_indexes: read_elems(reader)?,
				key_image: KeyImage::read(reader)?,
			})),
			INPUT_TAG_MULTISIGNATURE => Ok(TransactionInput::Multisignature(MultisignatureInput {
				amount: reader.read_u64()?,
				signature_count: reader.read_u8()?,
				output_index: reader.read_u64()?,
			})),
			_ => Err(ser::Error::CorruptedData),
		}
	}
}

impl Writeable for TransactionOutput {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u64(self.amount)?;
		match &self.target {
			OutputTarget::Key { key } => {
				writer.write_u8(OUTPUT_TAG_KEY)?;
				key.write(writer)
			}
			OutputTarget::Multisignature {
				keys,
				required_signatures,
			} => {
				writer.write_u8(OUTPUT_TAG_MULTISIGNATURE)?;
				write_elems(writer, keys)?;
				writer.write_u32(*required_signatures)
			}
		}
	}
}

impl Readable for TransactionOutput {
	fn read<R: Reader>(reader: &mut R) -> Result<TransactionOutput, ser::Error> {
		let amount = reader.read_u64()?;
		let target = match reader.read_u8()? {
			OUTPUT_TAG_KEY => OutputTarget::Key {
				key: PublicKey::read(reader)?,
			},
			OUTPUT_TAG_MULTISIGNATURE => OutputTarget::Multisignature {
				keys: read_elems(reader)?,
				required_signatures: reader.read_u32()?,
			},
			_ => return Err(ser::Error::CorruptedData),
		};
		Ok(TransactionOutput { amount, target })
	}
}

impl Writeable for TransactionPrefix {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u8(self.version)?;
		writer.write_u64(self.unlock_time)?;
		write_elems(writer, &self.inputs)?;
		write_elems(writer, &self.outputs)?;
		writer.write_vec(&self.extra)
	}
}

impl Readable for TransactionPrefix {
	fn read<R: Reader>(reader: &mut R) -> Result<TransactionPrefix, ser::Error> {
		Ok(TransactionPrefix {
			version: reader.read_u8()?,
			unlock_time: reader.read_u64()?,
			inputs: read_elems(reader)?,
			outputs: read_elems(reader)?,
			extra: reader.read_vec()?,
		})
	}
}

impl Writeable for Transaction {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.prefix.write(writer)?;
		writer.write_u64(self.signatures.len() as u64)?;
		for group in &self.signatures {
			write_elems(writer, group)?;
		}
		Ok(())
	}
}

impl Readable for Transaction {
	fn read<R: Reader>(reader: &mut R) -> Result<Transaction, ser::Error> {
		let prefix = TransactionPrefix::read(reader)?;
		let group_count = reader.read_u64()?;
		if group_count > ser::MAX_COLLECTION_LEN {
			return Err(ser::Error::TooLargeReadErr(format!(
				"{} signature groups",
				group_count
			)));
		}
		let mut signatures = Vec::with_capacity(group_count as usize);
		for _ in 0..group_count {
			signatures.push(read_elems(reader)?);
		}
		Ok(Transaction { prefix, signatures })
	}
}

struct SigningContext {
	onetime_secret: SecretKey,
	ring: Vec<PublicKey>,
	real_index: usize,
}

/// Assembles and signs a transaction. Building consumes the builder; the
/// resulting `Transaction` cannot be mutated further.
pub struct TransactionBuilder {
	unlock_time: u64,
	inputs: Vec<TransactionInput>,
	outputs: Vec<TransactionOutput>,
	extra_nonces: Vec<Vec<u8>>,
	payment_id: Option<Hash>,
	tx_keys: KeyPair,
	contexts: Vec<Option<SigningContext>>,
	multisig_signatures: Vec<Vec<Signature>>,
}

impl TransactionBuilder {
	/// Starts a transaction with a fresh ephemeral key
	pub fn new<R: RngCore + CryptoRng>(rng: &mut R) -> TransactionBuilder {
		TransactionBuilder {
			unlock_time: 0,
			inputs: vec![],
			outputs: vec![],
			extra_nonces: vec![],
			payment_id: None,
			tx_keys: KeyPair::generate(rng),
			contexts: vec![],
			multisig_signatures: vec![],
		}
	}

	/// Replaces the ephemeral transaction key. Outputs derived before this
	/// call would not be recognizable, so it is only legal before any
	/// output is added.
	pub fn set_tx_secret_key(&mut self, secret: SecretKey) -> Result<(), Error> {
		if !self.outputs.is_empty() {
			return Err(Error::InvalidInput(
				"transaction key must be set before outputs are derived".to_owned(),
			));
		}
		self.tx_keys = KeyPair::from_secret(secret);
		Ok(())
	}

	/// The ephemeral public key that will be advertised in extra
	pub fn tx_public_key(&self) -> PublicKey {
		self.tx_keys.public
	}

	/// The ephemeral secret key; callers may keep it for payment proofs
	pub fn tx_secret_key(&self) -> SecretKey {
		self.tx_keys.secret.clone()
	}

	/// Sets the unlock time carried by the prefix
	pub fn set_unlock_time(&mut self, unlock_time: u64) {
		self.unlock_time = unlock_time;
	}

	/// Sets the payment id advertised in extra
	pub fn set_payment_id(&mut self, id: Hash) {
		self.payment_id = Some(id);
	}

	/// Appends a free-form extra nonce
	pub fn append_extra_nonce(&mut self, nonce: Vec<u8>) {
		self.extra_nonces.push(nonce);
	}

	/// Adds the base input of a coinbase transaction
	pub fn add_base_input(&mut self, block_height: u64) {
		self.inputs.push(TransactionInput::Base { block_height });
		self.contexts.push(None);
	}

	/// Adds a ring-signed key input. `ring` pairs each decoy's global
	/// output index with its one-time key; `real_index` points at the entry
	/// being spent, whose one-time secret must be supplied.
	pub fn add_key_input(
		&mut self,
		amount: u64,
		ring: &[(u64, PublicKey)],
		real_index: usize,
		onetime_secret: SecretKey,
	) -> Result<KeyImage, Error> {
		if ring.is_empty() || real_index >= ring.len() {
			return Err(Error::InvalidInput(format!(
				"real index {} outside ring of {}",
				real_index,
				ring.len()
			)));
		}
		let onetime_public = ring[real_index].1;
		let key_image = crypto::generate_key_image(&onetime_public, &onetime_secret);
		self.inputs.push(TransactionInput::Key(KeyInput {
			amount,
			output_indexes: ring.iter().map(|(idx, _)| *idx).collect(),
			key_image,
		}));
		self.contexts.push(Some(SigningContext {
			onetime_secret,
			ring: ring.iter().map(|(_, key)| *key).collect(),
			real_index,
		}));
		Ok(key_image)
	}

	/// Adds a multisignature input; its signatures are collected through
	/// `sign_input_multisignature`.
	pub fn add_multisignature_input(&mut self, input: MultisignatureInput) {
		self.inputs.push(TransactionInput::Multisignature(input));
		self.contexts.push(None);
		self.multisig_signatures.push(Vec::new());
	}

	/// Attaches one participant signature to a previously added
	/// multisignature input. `input_index` counts multisignature inputs
	/// only, in addition order.
	pub fn sign_input_multisignature(
		&mut self,
		input_index: usize,
		signature: Signature,
	) -> Result<(), Error> {
		match self.multisig_signatures.get_mut(input_index) {
			Some(group) => {
				group.push(signature);
				Ok(())
			}
			None => Err(Error::InvalidInput(format!(
				"no multisignature input at {}",
				input_index
			))),
		}
	}

	/// Adds an output addressed to `address`, deriving the one-time key
	/// from this transaction's ephemeral key.
	pub fn add_key_output(
		&mut self,
		amount: u64,
		address: &WalletAddress,
	) -> Result<PublicKey, Error> {
		let derivation =
			crypto::generate_key_derivation(&address.view_public, &self.tx_keys.secret)?;
		let key = crypto::derive_public_key(
			&derivation,
			self.outputs.len() as u32,
			&address.spend_public,
		)?;
		self.outputs.push(TransactionOutput {
			amount,
			target: OutputTarget::Key { key },
		});
		Ok(key)
	}

	/// Adds a multisignature output locked to `required` of the given
	/// addresses.
	pub fn add_multisignature_output(
		&mut self,
		amount: u64,
		addresses: &[WalletAddress],
		required_signatures: u32,
	) -> Result<(), Error> {
		let index = self.outputs.len() as u32;
		let mut keys = Vec::with_capacity(addresses.len());
		for address in addresses {
			let derivation =
				crypto::generate_key_derivation(&address.view_public, &self.tx_keys.secret)?;
			keys.push(crypto::derive_public_key(
				&derivation,
				index,
				&address.spend_public,
			)?);
		}
		self.outputs.push(TransactionOutput {
			amount,
			target: OutputTarget::Multisignature {
				keys,
				required_signatures,
			},
		});
		Ok(())
	}

	/// Signs every key input and seals the transaction
	pub fn build<R: RngCore + CryptoRng>(self, rng: &mut R) -> Result<Transaction, Error> {
		let mut extra = vec![];
		extra::add_tx_public_key(&mut extra, &self.tx_keys.public);
		if let Some(id) = self.payment_id {
			extra::add_payment_id(&mut extra, &id)?;
		}
		for nonce in &self.extra_nonces {
			extra::add_nonce(&mut extra, nonce)?;
		}

		let prefix = TransactionPrefix {
			version: TRANSACTION_VERSION,
			unlock_time: self.unlock_time,
			inputs: self.inputs,
			outputs: self.outputs,
			extra,
		};
		let prefix_hash = prefix.hash();

		let mut multisig_groups = self.multisig_signatures.into_iter();
		let mut signatures = Vec::with_capacity(prefix.inputs.len());
		for (input, context) in prefix.inputs.iter().zip(self.contexts.into_iter()) {
			match (input, context) {
				(TransactionInput::Key(key_input), Some(ctx)) => {
					signatures.push(crypto::generate_ring_signature(
						rng,
						&prefix_hash.0,
						&key_input.key_image,
						&ctx.ring,
						&ctx.onetime_secret,
						ctx.real_index,
					)?);
				}
				(TransactionInput::Multisignature(_), _) => {
					signatures.push(multisig_groups.next().unwrap_or_default());
				}
				_ => signatures.push(vec![]),
			}
		}

		Ok(Transaction { prefix, signatures })
	}
}
