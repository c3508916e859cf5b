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

//! Hash Function
//!
//! Primary hash function used in the protocol

use blake2_rfc::blake2b::Blake2b;
use serde::de;
use std::convert::AsRef;
use std::fmt;

use krypton_util::{from_hex, to_hex};

use crate::ser::{self, Error, Readable, Reader, Writeable, Writer};

/// A hash consisting of all zeroes, used as a sentinel. No known preimage.
pub const ZERO_HASH: Hash = Hash([0; 32]);

/// A hash to uniquely (or close enough) identify one of the main blockchain
/// constructs. Used pervasively for blocks and transactions.
#[derive(Copy, Clone, PartialEq, PartialOrd, Eq, Ord, Hash, Default)]
pub struct Hash(pub [u8; 32]);

impl fmt::Debug for Hash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let hash_hex = self.to_hex();
		const NUM_SHOW: usize = 12;

		write!(f, "{}", &hash_hex[..NUM_SHOW])
	}
}

impl fmt::Display for Hash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

impl Hash {
	/// Size of a hash in bytes.
	pub const LEN: usize = 32;

	/// Builds a Hash from a byte vector. If the vector is too short, it will
	/// be completed by zeroes. If it's too long, it will be truncated.
	pub fn from_vec(v: &[u8]) -> Hash {
		let mut h = [0; Hash::LEN];
		let copy_size = v.len().min(Hash::LEN);
		h[..copy_size].copy_from_slice(&v[..copy_size]);
		Hash(h)
	}

	/// Converts the hash to a byte vector
	pub fn to_vec(&self) -> Vec<u8> {
		self.0.to_vec()
	}

	/// Returns a byte slice of the hash contents.
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	/// Convert a hash to hex string format.
	pub fn to_hex(&self) -> String {
		to_hex(self.to_vec())
	}

	/// Convert hex string back to hash.
	pub fn from_hex(hex: &str) -> Result<Hash, Error> {
		let bytes = from_hex(hex.to_string()).map_err(|_| Error::CorruptedData)?;
		if bytes.len() != Hash::LEN {
			return Err(Error::CorruptedData);
		}
		Ok(Hash::from_vec(&bytes))
	}
}

impl AsRef<[u8]> for Hash {
	fn as_ref(&self) -> &[u8] {
		&self.0
	}
}

impl Readable for Hash {
	fn read<R: Reader>(reader: &mut R) -> Result<Hash, Error> {
		let v = reader.read_fixed_bytes(32)?;
		let mut a = [0; 32];
		a.copy_from_slice(&v[..]);
		Ok(Hash(a))
	}
}

impl Writeable for Hash {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		writer.write_fixed_bytes(&self.0)
	}
}

impl ser::Writer for HashWriter {
	fn write_u8(&mut self, n: u8) -> Result<(), Error> {
		self.state.update(&[n]);
		Ok(())
	}
	fn write_u16(&mut self, n: u16) -> Result<(), Error> {
		self.state.update(&n.to_be_bytes());
		Ok(())
	}
	fn write_u32(&mut self, n: u32) -> Result<(), Error> {
		self.state.update(&n.to_be_bytes());
		Ok(())
	}
	fn write_u64(&mut self, n: u64) -> Result<(), Error> {
		self.state.update(&n.to_be_bytes());
		Ok(())
	}
	fn write_i64(&mut self, n: i64) -> Result<(), Error> {
		self.state.update(&n.to_be_bytes());
		Ok(())
	}
	fn write_fixed_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
		self.state.update(bytes);
		Ok(())
	}
}

/// Serializer that outputs a hash of the serialized object
pub struct HashWriter {
	state: Blake2b,
}

impl HashWriter {
	/// Consume the `HashWriter`, outputting its current hash into a 32-byte
	/// array
	pub fn finalize(self, output: &mut [u8]) {
		output.copy_from_slice(self.state.finalize().as_bytes());
	}

	/// Consume the `HashWriter`, outputting a `Hash` corresponding to its
	/// current state
	pub fn into_hash(self) -> Hash {
		let mut res = [0; 32];
		res.copy_from_slice(self.state.finalize().as_bytes());
		Hash(res)
	}
}

impl Default for HashWriter {
	fn default() -> HashWriter {
		HashWriter {
			state: Blake2b::new(32),
		}
	}
}

/// A trait for any object that has a canonical hash
pub trait Hashed {
	/// Obtain the hash of the object
	fn hash(&self) -> Hash;
}

impl<W: Writeable> Hashed for W {
	fn hash(&self) -> Hash {
		let mut hasher = HashWriter::default();
		Writeable::write(self, &mut hasher).unwrap();
		hasher.into_hash()
	}
}

impl serde::ser::Serialize for Hash {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::ser::Serializer,
	{
		serializer.serialize_str(&self.to_hex())
	}
}

impl<'de> de::Deserialize<'de> for Hash {
	fn deserialize<D>(deserializer: D) -> Result<Hash, D::Error>
	where
		D: de::Deserializer<'de>,
	{
		deserializer.deserialize_str(HashVisitor)
	}
}

struct HashVisitor;

impl<'de> de::Visitor<'de> for HashVisitor {
	type Value = Hash;

	fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
		formatter.write_str("a hash")
	}

	fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
	where
		E: de::Error,
	{
		Hash::from_hex(s).map_err(|e| de::Error::custom(format!("{}", e)))
	}
}

/// Hash arbitrary bytes directly
pub fn hash_bytes(data: &[u8]) -> Hash {
	let mut hasher = HashWriter::default();
	hasher.write_fixed_bytes(data).unwrap();
	hasher.into_hash()
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn hash_hex_roundtrip() {
		let h = hash_bytes(b"some data");
		let hex = h.to_hex();
		assert_eq!(Hash::from_hex(&hex).unwrap(), h);
	}

	#[test]
	fn writeable_types_hash() {
		let a: u64 = 17;
		let b: u64 = 17;
		assert_eq!(a.hash(), b.hash());
		let c: u64 = 18;
		assert_ne!(a.hash(), c.hash());
	}

	#[test]
	fn short_debug_form() {
		let h = hash_bytes(b"abc");
		assert_eq!(format!("{}", h).len(), 12);
	}
}
