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

//! The wallet's outbound event queue. `get_event` callers block here until
//! an event arrives or the wallet stops. Progress events coalesce past a
//! soft cap; transaction events are never dropped.

use std::collections::VecDeque;

use krypton_util::{Condvar, Mutex};

use crate::error::{Error, ErrorKind};
use crate::wallet::types::WalletEvent;

/// Progress events beyond this backlog collapse into the newest one
const PROGRESS_COALESCE_CAP: usize = 64;

struct QueueState {
	events: VecDeque<WalletEvent>,
	shutdown: bool,
}

/// Blocking multi-producer event queue
pub struct EventQueue {
	state: Mutex<QueueState>,
	cond: Condvar,
}

impl EventQueue {
	/// An empty, open queue
	pub fn new() -> EventQueue {
		EventQueue {
			state: Mutex::new(QueueState {
				events: VecDeque::new(),
				shutdown: false,
			}),
			cond: Condvar::new(),
		}
	}

	/// Enqueues an event and wakes one waiter. Progress events replace the
	/// previous pending progress event once the queue backs up.
	pub fn push(&self, event: WalletEvent) {
		let mut state = self.state.lock();
		if state.shutdown {
			return;
		}
		if let WalletEvent::SyncProgressUpdated(_, _) = event {
			if state.events.len() >= PROGRESS_COALESCE_CAP {
				if let Some(position) = state
					.events
					.iter()
					.rposition(|e| match e {
						WalletEvent::SyncProgressUpdated(_, _) => true,
						_ => false,
					}) {
					state.events[position] = event;
					drop(state);
					self.cond.notify_one();
					return;
				}
			}
		}
		state.events.push_back(event);
		drop(state);
		self.cond.notify_one();
	}

	/// Blocks until an event is available. Resolves with
	/// `OperationStopped` once the wallet shuts the queue down.
	pub fn wait(&self) -> Result<WalletEvent, Error> {
		let mut state = self.state.lock();
		loop {
			if let Some(event) = state.events.pop_front() {
				return Ok(event);
			}
			if state.shutdown {
				return Err(ErrorKind::OperationStopped.into());
			}
			self.cond.wait(&mut state);
		}
	}

	/// Drains the queue and wakes every waiter with `OperationStopped`
	pub fn shutdown(&self) {
		let mut state = self.state.lock();
		state.shutdown = true;
		state.events.clear();
		drop(state);
		self.cond.notify_all();
	}

	/// Reopens a queue closed by `shutdown`
	pub fn reopen(&self) {
		self.state.lock().shutdown = false;
	}
}
