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

//! Fixed-size key types. All of them are thin wrappers over 32 (or 64)
//! bytes; the algebra lives in the `crypto` module.

use std::cmp::Ordering;
use std::fmt;
use std::{error, ops::Deref};

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use serde::{de, ser};
use zeroize::Zeroize;

use krypton_util::{from_hex, to_hex};

use crate::KEY_SIZE;

/// Keychain errors
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum Error {
	/// 32 bytes that are not a canonical scalar
	InvalidSecretKey,
	/// 32 bytes that do not decompress to a group point
	InvalidPublicKey,
	/// Signature element out of range
	InvalidSignature,
	/// Ring signature inputs disagree (ring size, signer index)
	InvalidRing(String),
	/// Address parsing error
	InvalidAddress(String),
	/// Base58 decoding error
	Base58(String),
}

impl error::Error for Error {}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match *self {
			Error::InvalidSecretKey => write!(f, "invalid secret key"),
			Error::InvalidPublicKey => write!(f, "invalid public key"),
			Error::InvalidSignature => write!(f, "invalid signature"),
			Error::InvalidRing(ref s) => write!(f, "invalid ring: {}", s),
			Error::InvalidAddress(ref s) => write!(f, "invalid address: {}", s),
			Error::Base58(ref s) => write!(f, "base58 error: {}", s),
		}
	}
}

/// A secret scalar. Zeroed on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(pub(crate) Scalar);

impl SecretKey {
	/// Builds a secret key from its canonical byte representation.
	pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Result<SecretKey, Error> {
		match Scalar::from_canonical_bytes(bytes) {
			Some(s) => Ok(SecretKey(s)),
			None => Err(Error::InvalidSecretKey),
		}
	}

	/// Canonical byte representation
	pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
		self.0.to_bytes()
	}

	/// The public key this secret key is the discrete log of
	pub fn public_key(&self) -> PublicKey {
		PublicKey::from_point(&crate::crypto::basepoint_mul(&self.0))
	}

	pub(crate) fn scalar(&self) -> &Scalar {
		&self.0
	}
}

impl Drop for SecretKey {
	fn drop(&mut self) {
		self.0.zeroize();
	}
}

impl fmt::Debug for SecretKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "SecretKey(...)")
	}
}

/// A compressed group element identifying an account key, a transaction key
/// or a one-time output key.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; KEY_SIZE]);

impl PublicKey {
	/// Wraps raw bytes without validating them; validation happens on
	/// `decompress`.
	pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> PublicKey {
		PublicKey(bytes)
	}

	pub(crate) fn from_point(point: &RistrettoPoint) -> PublicKey {
		PublicKey(point.compress().to_bytes())
	}

	/// Raw byte representation
	pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
		self.0
	}

	pub(crate) fn decompress(&self) -> Result<RistrettoPoint, Error> {
		CompressedRistretto(self.0)
			.decompress()
			.ok_or(Error::InvalidPublicKey)
	}
}

impl AsRef<[u8]> for PublicKey {
	fn as_ref(&self) -> &[u8] {
		&self.0
	}
}

impl fmt::Debug for PublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self)
	}
}

impl fmt::Display for PublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", to_hex(self.0.to_vec()))
	}
}

/// The image of a one-time output key under the hash-to-point map, scaled by
/// the output's secret key. Equal images mean the same spendable output.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyImage([u8; KEY_SIZE]);

impl KeyImage {
	/// Wraps raw bytes
	pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> KeyImage {
		KeyImage(bytes)
	}

	/// Raw byte representation
	pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
		self.0
	}

	pub(crate) fn from_point(point: &RistrettoPoint) -> KeyImage {
		KeyImage(point.compress().to_bytes())
	}

	pub(crate) fn decompress(&self) -> Result<RistrettoPoint, Error> {
		CompressedRistretto(self.0)
			.decompress()
			.ok_or(Error::InvalidSignature)
	}
}

impl AsRef<[u8]> for KeyImage {
	fn as_ref(&self) -> &[u8] {
		&self.0
	}
}

impl fmt::Debug for KeyImage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", to_hex(self.0.to_vec()))
	}
}

impl fmt::Display for KeyImage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", to_hex(self.0.to_vec()))
	}
}

/// The shared secret between a transaction key and a view key. Both sides of
/// a transfer can compute it: `r * V == v * R`.
#[derive(Clone)]
pub struct KeyDerivation(pub(crate) RistrettoPoint);

impl KeyDerivation {
	/// Compressed byte representation, used as hashing input
	pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
		self.0.compress().to_bytes()
	}
}

/// One ring signature element: the pair of challenge and response scalars.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Signature {
	pub(crate) c: [u8; KEY_SIZE],
	pub(crate) r: [u8; KEY_SIZE],
}

impl Signature {
	/// Builds a signature from its 64-byte representation
	pub fn from_bytes(bytes: [u8; crate::SIGNATURE_SIZE]) -> Signature {
		let mut c = [0u8; KEY_SIZE];
		let mut r = [0u8; KEY_SIZE];
		c.copy_from_slice(&bytes[..KEY_SIZE]);
		r.copy_from_slice(&bytes[KEY_SIZE..]);
		Signature { c, r }
	}

	/// 64-byte representation
	pub fn to_bytes(&self) -> [u8; crate::SIGNATURE_SIZE] {
		let mut out = [0u8; crate::SIGNATURE_SIZE];
		out[..KEY_SIZE].copy_from_slice(&self.c);
		out[KEY_SIZE..].copy_from_slice(&self.r);
		out
	}

	pub(crate) fn scalars(&self) -> Result<(Scalar, Scalar), Error> {
		let c = Scalar::from_canonical_bytes(self.c).ok_or(Error::InvalidSignature)?;
		let r = Scalar::from_canonical_bytes(self.r).ok_or(Error::InvalidSignature)?;
		Ok((c, r))
	}
}

impl fmt::Debug for Signature {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Signature({})", to_hex(self.to_bytes().to_vec()))
	}
}

impl PartialOrd for Signature {
	fn partial_cmp(&self, other: &Signature) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Signature {
	fn cmp(&self, other: &Signature) -> Ordering {
		self.to_bytes().cmp(&other.to_bytes())
	}
}

// Serde as hex strings, which keeps keys readable in json envelopes.
macro_rules! impl_key_serde {
	($name:ident, $size:expr, $ctor:expr) => {
		impl ser::Serialize for $name {
			fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
			where
				S: ser::Serializer,
			{
				serializer.serialize_str(&to_hex(self.to_bytes().to_vec()))
			}
		}

		impl<'de> de::Deserialize<'de> for $name {
			fn deserialize<D>(deserializer: D) -> Result<$name, D::Error>
			where
				D: de::Deserializer<'de>,
			{
				struct KeyVisitor;

				impl<'de> de::Visitor<'de> for KeyVisitor {
					type Value = $name;

					fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
						formatter.write_str("a hex encoded key")
					}

					fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
					where
						E: de::Error,
					{
						let bytes = from_hex(s.to_owned())
							.map_err(|e| de::Error::custom(format!("{:?}", e)))?;
						if bytes.len() != $size {
							return Err(de::Error::custom("wrong key length"));
						}
						let mut b = [0u8; $size];
						b.copy_from_slice(&bytes);
						$ctor(b).map_err(|e| de::Error::custom(format!("{}", e)))
					}
				}

				deserializer.deserialize_str(KeyVisitor)
			}
		}
	};
}

impl_key_serde!(PublicKey, KEY_SIZE, |b| -> Result<PublicKey, Error> {
	Ok(PublicKey::from_bytes(b))
});
impl_key_serde!(KeyImage, KEY_SIZE, |b| -> Result<KeyImage, Error> {
	Ok(KeyImage::from_bytes(b))
});
impl_key_serde!(SecretKey, KEY_SIZE, SecretKey::from_bytes);
impl_key_serde!(
	Signature,
	crate::SIGNATURE_SIZE,
	|b| -> Result<Signature, Error> { Ok(Signature::from_bytes(b)) }
);

impl Deref for KeyDerivation {
	type Target = RistrettoPoint;

	fn deref(&self) -> &RistrettoPoint {
		&self.0
	}
}
