// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! FIFO correlation queue for in-flight PING requests.

use std::{collections::VecDeque, sync::Mutex};

use crate::{reply::Reply, types::ReplyHandler};

/// Synthetic error reply delivered to pending ping handlers when the connection drops.
pub const NETWORK_FAILURE: &str = "network failure";

/// Correlates PING requests to PONG replies by arrival order.
///
/// The server answers pings strictly in order, so the oldest queued entry always matches the
/// next PONG. Entries without a handler still occupy a slot to keep later handlers aligned.
///
/// The lock is a `std::sync::Mutex` and is never held across an await point; handler invocation
/// always happens off the lock-holding path.
#[derive(Default)]
pub struct PingQueue {
    inner: Mutex<VecDeque<Option<ReplyHandler>>>,
}

impl std::fmt::Debug for PingQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(PingQueue))
            .field("pending", &self.len())
            .finish()
    }
}

impl PingQueue {
    /// Creates a new empty [`PingQueue`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pending ping slot.
    pub fn enqueue(&self, handler: Option<ReplyHandler>) {
        self.lock().push_back(handler);
    }

    /// Runs `send` and, if it succeeds, appends a pending ping slot, all under the queue lock.
    ///
    /// Holding the lock over the send keeps the queue order identical to the wire order even
    /// when two tasks ping concurrently.
    ///
    /// # Errors
    ///
    /// Returns the error from `send` (no slot is enqueued in that case).
    pub(crate) fn enqueue_with<E>(
        &self,
        handler: Option<ReplyHandler>,
        send: impl FnOnce() -> Result<(), E>,
    ) -> Result<(), E> {
        let mut guard = self.lock();
        send()?;
        guard.push_back(handler);
        Ok(())
    }

    /// Removes and returns the oldest pending ping slot, or `None` if the queue is empty.
    pub fn dequeue(&self) -> Option<Option<ReplyHandler>> {
        self.lock().pop_front()
    }

    /// Returns the number of in-flight pings.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if no pings are in flight.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Empties the queue and fails every pending handler with a synthetic
    /// [`Reply::Error`] (`"network failure"`), in FIFO order.
    ///
    /// The queue is emptied atomically under the lock; the handlers run on a detached task so a
    /// handler can ping again without deadlocking.
    pub fn drain_and_fail(&self) {
        let pending: Vec<Option<ReplyHandler>> = self.lock().drain(..).collect();
        if pending.is_empty() {
            return;
        }

        tracing::debug!("Failing {} pending ping(s)", pending.len());
        tokio::task::spawn(async move {
            let reply = Reply::Error(NETWORK_FAILURE.to_string());
            for handler in pending.into_iter().flatten() {
                handler(&reply);
            }
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Option<ReplyHandler>>> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
