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

//! Implements hex-encoding from bytes to string and decoding of strings
//! to bytes. Simple enough that we can just have our own.

use std::fmt::Write;

/// Encode the provided bytes into a hex string
pub fn to_hex(bytes: Vec<u8>) -> String {
	let mut s = String::new();
	for byte in bytes {
		write!(&mut s, "{:02x}", byte).expect("Unable to write");
	}
	s
}

/// Decode a hex string into bytes.
pub fn from_hex(hex_str: String) -> Result<Vec<u8>, String> {
	let hex_trim = if hex_str.starts_with("0x") {
		hex_str[2..].to_owned()
	} else {
		hex_str
	};
	let hex_trim = hex_trim.trim();
	if hex_trim.len() % 2 != 0 {
		return Err(format!("invalid hex length: {}", hex_trim.len()));
	}
	(0..hex_trim.len())
		.step_by(2)
		.map(|i| {
			u8::from_str_radix(&hex_trim[i..i + 2], 16)
				.map_err(|e| format!("invalid hex at {}: {}", i, e))
		})
		.collect()
}
