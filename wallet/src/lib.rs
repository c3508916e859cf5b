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

//! The krypton wallet core: per-account transfers bookkeeping, blockchain
//! synchronization against a remote node, and the wallet engine that
//! builds, signs and relays transactions.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]

#[macro_use]
extern crate serde_derive;

pub mod error;
pub mod node;
pub mod test_framework;
pub mod transfers;
pub mod types;
pub mod wallet;

pub use crate::error::{Error, ErrorKind};
pub use crate::node::{BlockShortEntry, NodeClient, PoolDifference, RandomAmountOuts, RandomOutEntry};
pub use crate::transfers::{
	BlockchainConsumer, BlockchainSynchronizer, SyncObserver, TransferState, TransfersConsumer,
	TransfersContainer, TransfersObserver,
};
pub use crate::types::{
	SubscriptionRequest, SyncConfig, SyncStart, TransactionBlockInfo, TransactionInformation,
	TransferOutput, UNCONFIRMED_TRANSACTION_GLOBAL_OUTPUT_INDEX,
	WALLET_UNCONFIRMED_TRANSACTION_HEIGHT,
};
pub use crate::wallet::types::{
	DonationSettings, FusionEstimate, TransactionId, TransactionParameters, WalletEvent,
	WalletOrder, WalletTransaction, WalletTransactionState, WalletTransfer, WalletTransferType,
};
pub use crate::wallet::Wallet;
