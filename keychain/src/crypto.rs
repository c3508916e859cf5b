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

//! The key algebra behind transfers. A transaction carries an ephemeral
//! public key `R = r*G`; the receiver recognizes an output by recomputing
//! the one-time key `P = Hs(v*R, i)*G + B` from its view secret `v` and
//! spend public `B`. The spender derives `x = Hs(v*R, i) + b` with
//! `x*G == P`, and the key image `I = x*Hp(P)` ties every spend of `P`
//! together without revealing which ring member signed.

use blake2_rfc::blake2b::blake2b;
use byteorder::{BigEndian, ByteOrder};
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_TABLE;
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, RngCore};

use crate::types::{Error, KeyDerivation, KeyImage, PublicKey, SecretKey, Signature};
use crate::KEY_SIZE;

const DOMAIN_SCALAR: &[u8] = b"krypton.hash_to_scalar";
const DOMAIN_POINT: &[u8] = b"krypton.hash_to_point";
const DOMAIN_RING: &[u8] = b"krypton.ring_signature";

pub(crate) fn basepoint_mul(s: &Scalar) -> RistrettoPoint {
	s * &RISTRETTO_BASEPOINT_TABLE
}

fn wide_hash(domain: &[u8], data: &[&[u8]]) -> [u8; 64] {
	let mut hasher = blake2_rfc::blake2b::Blake2b::new(64);
	hasher.update(domain);
	for d in data {
		hasher.update(d);
	}
	let mut out = [0u8; 64];
	out.copy_from_slice(hasher.finalize().as_bytes());
	out
}

/// Maps arbitrary bytes onto a scalar
pub fn hash_to_scalar(data: &[&[u8]]) -> Scalar {
	Scalar::from_bytes_mod_order_wide(&wide_hash(DOMAIN_SCALAR, data))
}

/// Maps arbitrary bytes onto a group element of unknown discrete log
pub fn hash_to_point(data: &[u8]) -> RistrettoPoint {
	RistrettoPoint::from_uniform_bytes(&wide_hash(DOMAIN_POINT, &[data]))
}

/// Generates a fresh random key pair
pub fn generate_keys<R: RngCore + CryptoRng>(rng: &mut R) -> (SecretKey, PublicKey) {
	let mut wide = [0u8; 64];
	rng.fill_bytes(&mut wide);
	let secret = Scalar::from_bytes_mod_order_wide(&wide);
	let public = PublicKey::from_point(&basepoint_mul(&secret));
	(SecretKey(secret), public)
}

/// The shared secret of a transfer: `secret * public`, commutative between
/// `(r, V)` on the sender side and `(v, R)` on the receiver side.
pub fn generate_key_derivation(
	public: &PublicKey,
	secret: &SecretKey,
) -> Result<KeyDerivation, Error> {
	Ok(KeyDerivation(secret.scalar() * public.decompress()?))
}

fn derivation_to_scalar(derivation: &KeyDerivation, output_index: u32) -> Scalar {
	let mut idx = [0u8; 8];
	BigEndian::write_u64(&mut idx, u64::from(output_index));
	hash_to_scalar(&[&derivation.to_bytes(), &idx])
}

/// The one-time public key of output `output_index` addressed to
/// `spend_public`: `Hs(derivation, i)*G + B`.
pub fn derive_public_key(
	derivation: &KeyDerivation,
	output_index: u32,
	spend_public: &PublicKey,
) -> Result<PublicKey, Error> {
	let hs = derivation_to_scalar(derivation, output_index);
	let point = basepoint_mul(&hs) + spend_public.decompress()?;
	Ok(PublicKey::from_point(&point))
}

/// The one-time secret key matching `derive_public_key`:
/// `Hs(derivation, i) + b`. Requires the account's spend secret.
pub fn derive_secret_key(
	derivation: &KeyDerivation,
	output_index: u32,
	spend_secret: &SecretKey,
) -> SecretKey {
	let hs = derivation_to_scalar(derivation, output_index);
	SecretKey(hs + spend_secret.scalar())
}

/// The key image of a one-time key pair: `x * Hp(P)`
pub fn generate_key_image(
	onetime_public: &PublicKey,
	onetime_secret: &SecretKey,
) -> KeyImage {
	let hp = hash_to_point(onetime_public.as_ref());
	KeyImage::from_point(&(onetime_secret.scalar() * hp))
}

/// Produces a ring signature over `prefix_hash` for the ring `ring`, where
/// `ring[secret_index]` is the one-time key owned by `onetime_secret` and
/// `image` is its key image. One `Signature` element is produced per ring
/// member.
pub fn generate_ring_signature<R: RngCore + CryptoRng>(
	rng: &mut R,
	prefix_hash: &[u8; 32],
	image: &KeyImage,
	ring: &[PublicKey],
	onetime_secret: &SecretKey,
	secret_index: usize,
) -> Result<Vec<Signature>, Error> {
	if ring.is_empty() {
		return Err(Error::InvalidRing("empty ring".to_owned()));
	}
	if secret_index >= ring.len() {
		return Err(Error::InvalidRing(format!(
			"signer index {} outside ring of {}",
			secret_index,
			ring.len()
		)));
	}

	let image_point = image.decompress()?;

	let mut challenges = vec![Scalar::zero(); ring.len()];
	let mut responses = vec![Scalar::zero(); ring.len()];
	let mut challenge_sum = Scalar::zero();

	// transcript accumulates L_i and R_i for every ring member in order
	let mut transcript: Vec<Vec<u8>> = Vec::with_capacity(2 * ring.len());

	let mut nonce_wide = [0u8; 64];
	rng.fill_bytes(&mut nonce_wide);
	let nonce = Scalar::from_bytes_mod_order_wide(&nonce_wide);

	for (i, member) in ring.iter().enumerate() {
		let member_point = member.decompress()?;
		let (l, r) = if i == secret_index {
			(
				basepoint_mul(&nonce),
				nonce * hash_to_point(member.as_ref()),
			)
		} else {
			let mut wide = [0u8; 64];
			rng.fill_bytes(&mut wide);
			responses[i] = Scalar::from_bytes_mod_order_wide(&wide);
			rng.fill_bytes(&mut wide);
			challenges[i] = Scalar::from_bytes_mod_order_wide(&wide);
			challenge_sum += challenges[i];
			(
				basepoint_mul(&responses[i]) + challenges[i] * member_point,
				responses[i] * hash_to_point(member.as_ref()) + challenges[i] * image_point,
			)
		};
		transcript.push(l.compress().to_bytes().to_vec());
		transcript.push(r.compress().to_bytes().to_vec());
	}

	let challenge = ring_challenge(prefix_hash, &transcript);
	challenges[secret_index] = challenge - challenge_sum;
	responses[secret_index] = nonce - challenges[secret_index] * onetime_secret.scalar();

	Ok(challenges
		.iter()
		.zip(responses.iter())
		.map(|(c, r)| Signature {
			c: c.to_bytes(),
			r: r.to_bytes(),
		})
		.collect())
}

/// Verifies a ring signature produced by `generate_ring_signature`
pub fn check_ring_signature(
	prefix_hash: &[u8; 32],
	image: &KeyImage,
	ring: &[PublicKey],
	signatures: &[Signature],
) -> bool {
	if ring.is_empty() || ring.len() != signatures.len() {
		return false;
	}
	let image_point = match image.decompress() {
		Ok(p) => p,
		Err(_) => return false,
	};

	let mut challenge_sum = Scalar::zero();
	let mut transcript: Vec<Vec<u8>> = Vec::with_capacity(2 * ring.len());

	for (member, sig) in ring.iter().zip(signatures.iter()) {
		let member_point = match member.decompress() {
			Ok(p) => p,
			Err(_) => return false,
		};
		let (c, r) = match sig.scalars() {
			Ok(cr) => cr,
			Err(_) => return false,
		};
		challenge_sum += c;
		let l = basepoint_mul(&r) + c * member_point;
		let rr = r * hash_to_point(member.as_ref()) + c * image_point;
		transcript.push(l.compress().to_bytes().to_vec());
		transcript.push(rr.compress().to_bytes().to_vec());
	}

	ring_challenge(prefix_hash, &transcript) == challenge_sum
}

fn ring_challenge(prefix_hash: &[u8; 32], transcript: &[Vec<u8>]) -> Scalar {
	let mut data: Vec<&[u8]> = Vec::with_capacity(transcript.len() + 1);
	data.push(&prefix_hash[..]);
	for t in transcript {
		data.push(t);
	}
	let mut hasher = blake2_rfc::blake2b::Blake2b::new(64);
	hasher.update(DOMAIN_RING);
	for d in data {
		hasher.update(d);
	}
	let mut out = [0u8; 64];
	out.copy_from_slice(hasher.finalize().as_bytes());
	Scalar::from_bytes_mod_order_wide(&out)
}

/// Short hash (4 bytes) used by the address checksum
pub fn checksum(data: &[u8]) -> [u8; 4] {
	let mut out = [0u8; 4];
	out.copy_from_slice(&blake2b(4, &[], data).as_bytes()[..4]);
	out
}

/// 32-byte blake2b, the workhorse hash of the keychain
pub fn hash256(data: &[u8]) -> [u8; KEY_SIZE] {
	let mut out = [0u8; KEY_SIZE];
	out.copy_from_slice(blake2b(KEY_SIZE, &[], data).as_bytes());
	out
}
