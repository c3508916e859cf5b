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

//! Serialization and deserialization layer specialized for binary encoding.
//! Ensures consistency and safety. Basically a minimal subset of
//! rustc_serialize customized for our need.
//!
//! To use it simply implement `Writeable` or `Readable` and then use the
//! `serialize` or `deserialize` functions on them as appropriate.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{self, Read, Write};

use krypton_keychain::{KeyImage, PublicKey, SecretKey, Signature, KEY_SIZE, SIGNATURE_SIZE};

/// The maximum number of elements a single length-prefixed collection may
/// declare. Only for DoS protection when reading untrusted bytes.
pub const MAX_COLLECTION_LEN: u64 = 1_000_000;

/// Possible errors deriving from serializing or deserializing.
#[derive(Debug)]
pub enum Error {
	/// Wraps an io error produced when reading or writing
	IOErr(io::Error),
	/// Expected a given value that wasn't found
	UnexpectedData {
		/// What was expected
		expected: Vec<u8>,
		/// What was received
		received: Vec<u8>,
	},
	/// Data wasn't in a consumable format
	CorruptedData,
	/// When asked to read too much data
	TooLargeReadErr(String),
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error::IOErr(e)
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match *self {
			Error::IOErr(ref e) => write!(f, "io error: {}", e),
			Error::UnexpectedData {
				ref expected,
				ref received,
			} => write!(f, "expected {:?}, got {:?}", expected, received),
			Error::CorruptedData => write!(f, "corrupted data"),
			Error::TooLargeReadErr(ref s) => write!(f, "too large read: {}", s),
		}
	}
}

impl std::error::Error for Error {}

/// Implementations defined how different numbers and binary structures are
/// written to an underlying stream or container.
pub trait Writer {
	/// Writes a u8 as bytes
	fn write_u8(&mut self, n: u8) -> Result<(), Error>;
	/// Writes a u16 as bytes
	fn write_u16(&mut self, n: u16) -> Result<(), Error>;
	/// Writes a u32 as bytes
	fn write_u32(&mut self, n: u32) -> Result<(), Error>;
	/// Writes a u64 as bytes
	fn write_u64(&mut self, n: u64) -> Result<(), Error>;
	/// Writes a i64 as bytes
	fn write_i64(&mut self, n: i64) -> Result<(), Error>;
	/// Writes a fixed number of bytes. The reader is expected to know the
	/// actual length on read.
	fn write_fixed_bytes(&mut self, bytes: &[u8]) -> Result<(), Error>;

	/// Writes a variable length byte vec, the length encoded as a u64 prefix
	fn write_vec(&mut self, vec: &[u8]) -> Result<(), Error> {
		self.write_u64(vec.len() as u64)?;
		self.write_fixed_bytes(vec)
	}
}

/// Implementations defined how different numbers and binary structures are
/// read from an underlying stream or container.
pub trait Reader {
	/// Read a u8 from the underlying Read
	fn read_u8(&mut self) -> Result<u8, Error>;
	/// Read a u16 from the underlying Read
	fn read_u16(&mut self) -> Result<u16, Error>;
	/// Read a u32 from the underlying Read
	fn read_u32(&mut self) -> Result<u32, Error>;
	/// Read a u64 from the underlying Read
	fn read_u64(&mut self) -> Result<u64, Error>;
	/// Read a i64 from the underlying Read
	fn read_i64(&mut self) -> Result<i64, Error>;
	/// Read a fixed number of bytes from the underlying reader.
	fn read_fixed_bytes(&mut self, length: usize) -> Result<Vec<u8>, Error>;

	/// Read a variable size byte vec (u64 length prefix)
	fn read_vec(&mut self) -> Result<Vec<u8>, Error> {
		let len = self.read_u64()?;
		if len > MAX_COLLECTION_LEN * 64 {
			return Err(Error::TooLargeReadErr(format!("vec of {} bytes", len)));
		}
		self.read_fixed_bytes(len as usize)
	}

	/// Consumes a byte from the reader, producing an error if it doesn't
	/// have the expected value
	fn expect_u8(&mut self, val: u8) -> Result<u8, Error> {
		let b = self.read_u8()?;
		if b == val {
			Ok(b)
		} else {
			Err(Error::UnexpectedData {
				expected: vec![val],
				received: vec![b],
			})
		}
	}
}

/// Trait that every type that can be serialized as binary must implement.
/// Writes directly to a Writer, a utility type thinly wrapping an
/// underlying Write implementation.
pub trait Writeable {
	/// Write the data held by this Writeable to the provided writer
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error>;
}

/// Trait that every type that can be deserialized from binary must
/// implement.
pub trait Readable: Sized {
	/// Reads the data necessary to this Readable from the provided reader
	fn read<R: Reader>(reader: &mut R) -> Result<Self, Error>;
}

/// Deserializes a Readable from any std::io::Read implementation.
pub fn deserialize<T: Readable>(source: &mut dyn Read) -> Result<T, Error> {
	let mut reader = BinReader { source };
	T::read(&mut reader)
}

/// Serializes a Writeable into any std::io::Write implementation.
pub fn serialize<W: Writeable>(sink: &mut dyn Write, thing: &W) -> Result<(), Error> {
	let mut writer = BinWriter { sink };
	thing.write(&mut writer)
}

/// Utility function to serialize a writeable directly in memory using a
/// Vec<u8>.
pub fn ser_vec<W: Writeable>(thing: &W) -> Result<Vec<u8>, Error> {
	let mut vec = Vec::new();
	serialize(&mut vec, thing)?;
	Ok(vec)
}

/// Utility to read a full collection written by `write_elems`
pub fn read_elems<T: Readable, R: Reader>(reader: &mut R) -> Result<Vec<T>, Error> {
	let count = reader.read_u64()?;
	if count > MAX_COLLECTION_LEN {
		return Err(Error::TooLargeReadErr(format!("{} elements", count)));
	}
	let mut elems = Vec::with_capacity(count as usize);
	for _ in 0..count {
		elems.push(T::read(reader)?);
	}
	Ok(elems)
}

/// Utility to write a collection with its u64 count prefix
pub fn write_elems<T: Writeable, W: Writer>(writer: &mut W, elems: &[T]) -> Result<(), Error> {
	writer.write_u64(elems.len() as u64)?;
	for e in elems {
		e.write(writer)?;
	}
	Ok(())
}

/// Utility wrapper for an underlying byte Reader. Defines higher level
/// methods to read numbers, byte vectors, hashes, etc.
pub struct BinReader<'a> {
	source: &'a mut dyn Read,
}

impl<'a> BinReader<'a> {
	/// Wraps a standard Read
	pub fn new(source: &'a mut dyn Read) -> BinReader<'a> {
		BinReader { source }
	}
}

impl<'a> Reader for BinReader<'a> {
	fn read_u8(&mut self) -> Result<u8, Error> {
		self.source.read_u8().map_err(Error::IOErr)
	}
	fn read_u16(&mut self) -> Result<u16, Error> {
		self.source.read_u16::<BigEndian>().map_err(Error::IOErr)
	}
	fn read_u32(&mut self) -> Result<u32, Error> {
		self.source.read_u32::<BigEndian>().map_err(Error::IOErr)
	}
	fn read_u64(&mut self) -> Result<u64, Error> {
		self.source.read_u64::<BigEndian>().map_err(Error::IOErr)
	}
	fn read_i64(&mut self) -> Result<i64, Error> {
		self.source.read_i64::<BigEndian>().map_err(Error::IOErr)
	}
	fn read_fixed_bytes(&mut self, length: usize) -> Result<Vec<u8>, Error> {
		// not reading more than 100k in a single read
		if length > 100_000 {
			return Err(Error::TooLargeReadErr(format!(
				"fixed bytes length too large: {}",
				length
			)));
		}
		let mut buf = vec![0; length];
		self.source
			.read_exact(&mut buf)
			.map(move |_| buf)
			.map_err(Error::IOErr)
	}
}

/// Utility wrapper for an underlying byte Writer. Defines higher level
/// methods to write numbers, byte vectors, hashes, etc.
pub struct BinWriter<'a> {
	sink: &'a mut dyn Write,
}

impl<'a> BinWriter<'a> {
	/// Wraps a standard Write
	pub fn new(sink: &'a mut dyn Write) -> BinWriter<'a> {
		BinWriter { sink }
	}
}

impl<'a> Writer for BinWriter<'a> {
	fn write_u8(&mut self, n: u8) -> Result<(), Error> {
		self.sink.write_u8(n).map_err(Error::IOErr)
	}
	fn write_u16(&mut self, n: u16) -> Result<(), Error> {
		self.sink.write_u16::<BigEndian>(n).map_err(Error::IOErr)
	}
	fn write_u32(&mut self, n: u32) -> Result<(), Error> {
		self.sink.write_u32::<BigEndian>(n).map_err(Error::IOErr)
	}
	fn write_u64(&mut self, n: u64) -> Result<(), Error> {
		self.sink.write_u64::<BigEndian>(n).map_err(Error::IOErr)
	}
	fn write_i64(&mut self, n: i64) -> Result<(), Error> {
		self.sink.write_i64::<BigEndian>(n).map_err(Error::IOErr)
	}
	fn write_fixed_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
		self.sink.write_all(bytes).map_err(Error::IOErr)
	}
}

macro_rules! impl_int {
	($int:ty, $w_fn:ident, $r_fn:ident) => {
		impl Writeable for $int {
			fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
				writer.$w_fn(*self)
			}
		}

		impl Readable for $int {
			fn read<R: Reader>(reader: &mut R) -> Result<$int, Error> {
				reader.$r_fn()
			}
		}
	};
}

impl_int!(u8, write_u8, read_u8);
impl_int!(u16, write_u16, read_u16);
impl_int!(u32, write_u32, read_u32);
impl_int!(u64, write_u64, read_u64);
impl_int!(i64, write_i64, read_i64);

impl<T: Writeable> Writeable for Vec<T> {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		write_elems(writer, self)
	}
}

impl<T: Readable> Readable for Vec<T> {
	fn read<R: Reader>(reader: &mut R) -> Result<Vec<T>, Error> {
		read_elems(reader)
	}
}

// Keychain types serialize as their raw bytes; they live downstream of this
// crate so the impls have to live here with the traits.

impl Writeable for PublicKey {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		writer.write_fixed_bytes(self.as_ref())
	}
}

impl Readable for PublicKey {
	fn read<R: Reader>(reader: &mut R) -> Result<PublicKey, Error> {
		let bytes = reader.read_fixed_bytes(KEY_SIZE)?;
		let mut b = [0u8; KEY_SIZE];
		b.copy_from_slice(&bytes);
		Ok(PublicKey::from_bytes(b))
	}
}

impl Writeable for KeyImage {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		writer.write_fixed_bytes(self.as_ref())
	}
}

impl Readable for KeyImage {
	fn read<R: Reader>(reader: &mut R) -> Result<KeyImage, Error> {
		let bytes = reader.read_fixed_bytes(KEY_SIZE)?;
		let mut b = [0u8; KEY_SIZE];
		b.copy_from_slice(&bytes);
		Ok(KeyImage::from_bytes(b))
	}
}

impl Writeable for SecretKey {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		writer.write_fixed_bytes(&self.to_bytes())
	}
}

impl Readable for SecretKey {
	fn read<R: Reader>(reader: &mut R) -> Result<SecretKey, Error> {
		let bytes = reader.read_fixed_bytes(KEY_SIZE)?;
		let mut b = [0u8; KEY_SIZE];
		b.copy_from_slice(&bytes);
		SecretKey::from_bytes(b).map_err(|_| Error::CorruptedData)
	}
}

impl Writeable for Signature {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error> {
		writer.write_fixed_bytes(&self.to_bytes())
	}
}

impl Readable for Signature {
	fn read<R: Reader>(reader: &mut R) -> Result<Signature, Error> {
		let bytes = reader.read_fixed_bytes(SIGNATURE_SIZE)?;
		let mut b = [0u8; SIGNATURE_SIZE];
		b.copy_from_slice(&bytes);
		Ok(Signature::from_bytes(b))
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn ints_roundtrip() {
		let mut buf = Vec::new();
		{
			let mut writer = BinWriter::new(&mut buf);
			writer.write_u8(7).unwrap();
			writer.write_u64(0xdead_beef).unwrap();
			writer.write_i64(-42).unwrap();
			writer.write_vec(b"payload").unwrap();
		}
		let mut slice = &buf[..];
		let mut reader = BinReader { source: &mut slice };
		assert_eq!(reader.read_u8().unwrap(), 7);
		assert_eq!(reader.read_u64().unwrap(), 0xdead_beef);
		assert_eq!(reader.read_i64().unwrap(), -42);
		assert_eq!(reader.read_vec().unwrap(), b"payload".to_vec());
	}

	#[test]
	fn oversized_collection_is_rejected() {
		let mut buf = Vec::new();
		{
			let mut writer = BinWriter::new(&mut buf);
			writer.write_u64(MAX_COLLECTION_LEN + 1).unwrap();
		}
		let mut slice = &buf[..];
		let res: Result<Vec<u64>, Error> = deserialize(&mut slice);
		assert!(res.is_err());
	}
}
