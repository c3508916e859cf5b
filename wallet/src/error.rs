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

//! Error types for the wallet crate

use failure::{Backtrace, Context, Fail};
use std::fmt::{self, Display};
use std::io;

/// Error definition
#[derive(Debug)]
pub struct Error {
	inner: Context<ErrorKind>,
}

/// Wallet errors. Validation and state-machine violations never mutate
/// state; transport errors are retriable; `InternalWalletError` marks a
/// consistency violation whose operation has been fully rolled back.
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorKind {
	/// Password does not decrypt the wallet file
	#[fail(display = "wrong password")]
	WrongPassword,

	/// Operation requires an initialized wallet
	#[fail(display = "wallet is not initialized")]
	NotInitialized,

	/// The wallet is already initialized
	#[fail(display = "wallet is already initialized")]
	AlreadyInitialized,

	/// The wallet is stopped
	#[fail(display = "wallet is stopped")]
	Stopped,

	/// A blocking call was woken by wallet shutdown
	#[fail(display = "operation stopped by wallet shutdown")]
	OperationStopped,

	/// Transaction or transfer index outside the recorded range
	#[fail(display = "index out of range")]
	IndexOutOfRange,

	/// The address is valid but does not belong to this wallet
	#[fail(display = "address not found in this wallet")]
	AddressNotFound,

	/// The address failed to parse
	#[fail(display = "bad address")]
	BadAddress,

	/// Destination or source amounts are unpayable
	#[fail(display = "wrong amount")]
	WrongAmount,

	/// Requested mixin exceeds what the network can supply
	#[fail(display = "mixin count too big")]
	MixinCountTooBig,

	/// Fee below the network minimum
	#[fail(display = "fee is too small")]
	FeeTooSmall,

	/// A destination carries a zero amount, or there are no destinations
	#[fail(display = "destination amount is zero")]
	ZeroDestination,

	/// Serialized transaction exceeds the network limit
	#[fail(display = "transaction size is too big")]
	TransactionSizeTooBig,

	/// Change has nowhere to go and a change destination was not supplied
	#[fail(display = "destination address required")]
	DestinationAddressRequired,

	/// The source account cannot sign (tracking account)
	#[fail(display = "transfer is impossible for this account")]
	TxTransferImpossible,

	/// Only transactions in the created state can be rolled back
	#[fail(display = "transaction cannot be cancelled")]
	TxCancelImpossible,

	/// Consistency violation; the offending operation was rolled back
	#[fail(display = "internal wallet error: {}", _0)]
	InternalWalletError(String),

	/// The node reported or caused a failure
	#[fail(display = "node error")]
	NodeError,

	/// An in-flight node call was interrupted by stop
	#[fail(display = "interrupted")]
	Interrupted,

	/// Keychain error carrier
	#[fail(display = "keychain error: {}", _0)]
	Keychain(String),

	/// Binary serialization error carrier
	#[fail(display = "serialization error: {}", _0)]
	Ser(String),

	/// Wallet file envelope error carrier
	#[fail(display = "format error: {}", _0)]
	Format(String),

	/// I/O error carrier
	#[fail(display = "I/O error")]
	IO,
}

impl Fail for Error {
	fn cause(&self) -> Option<&dyn Fail> {
		self.inner.cause()
	}

	fn backtrace(&self) -> Option<&Backtrace> {
		self.inner.backtrace()
	}
}

impl Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		Display::fmt(&self.inner, f)
	}
}

impl Error {
	/// Get the error kind
	pub fn kind(&self) -> ErrorKind {
		self.inner.get_context().clone()
	}

	/// Shorthand for internal consistency failures
	pub fn internal<S: Into<String>>(msg: S) -> Error {
		Error::from(ErrorKind::InternalWalletError(msg.into()))
	}
}

impl From<ErrorKind> for Error {
	fn from(kind: ErrorKind) -> Error {
		Error {
			inner: Context::new(kind),
		}
	}
}

impl From<Context<ErrorKind>> for Error {
	fn from(inner: Context<ErrorKind>) -> Error {
		Error { inner }
	}
}

impl From<io::Error> for Error {
	fn from(_error: io::Error) -> Error {
		Error {
			inner: Context::new(ErrorKind::IO),
		}
	}
}

impl From<krypton_keychain::Error> for Error {
	fn from(error: krypton_keychain::Error) -> Error {
		Error {
			inner: Context::new(ErrorKind::Keychain(format!("{}", error))),
		}
	}
}

impl From<krypton_core::ser::Error> for Error {
	fn from(error: krypton_core::ser::Error) -> Error {
		Error {
			inner: Context::new(ErrorKind::Ser(format!("{}", error))),
		}
	}
}

impl From<krypton_core::core::transaction::Error> for Error {
	fn from(error: krypton_core::core::transaction::Error) -> Error {
		Error {
			inner: Context::new(ErrorKind::InternalWalletError(format!("{}", error))),
		}
	}
}
