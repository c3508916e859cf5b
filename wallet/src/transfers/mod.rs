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

//! Transfers bookkeeping: the per-account container, the consumer that
//! feeds it from blocks and pool updates, and the synchronizer that drives
//! the pull loop against the node.

pub mod container;
pub mod consumer;
pub mod state;
pub mod synchronizer;

pub use self::container::{TransferState, TransfersContainer};
pub use self::consumer::{Subscription, TransfersConsumer, TransfersObserver};
pub use self::state::SynchronizationState;
pub use self::synchronizer::{BlockchainConsumer, BlockchainSynchronizer, SyncObserver};
