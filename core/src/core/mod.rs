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

//! Core types: hashes and transactions

pub mod hash;
pub mod transaction;

pub use self::hash::{Hash, Hashed, ZERO_HASH};
pub use self::transaction::{
	KeyInput, MultisignatureInput, OutputTarget, Transaction, TransactionBuilder,
	TransactionInput, TransactionOutput, TransactionPrefix,
};
