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

//! Transport seam for the pub/sub session.

use async_trait::async_trait;

use crate::{
    error::SessionError,
    types::{DisconnectCallback, ReplyCallback},
};

/// The byte-stream transport and wire codec behind a pub/sub session.
///
/// The session owns exactly one transport and drives its whole lifecycle through this trait.
/// Implementations must uphold the following contract:
///
/// - `on_reply` is invoked once per decoded inbound reply, in receive order, from the
///   transport's read path.
/// - `on_disconnect` is invoked exactly once per *unsolicited* connection drop. An explicit
///   [`disconnect`](Self::disconnect) call must NOT trigger it.
/// - A successful [`connect`](Self::connect) replaces any callbacks registered by a previous
///   connect on the same transport.
/// - Both callbacks are invoked from within the tokio runtime (the session spawns tasks from
///   them).
/// - [`send`](Self::send) buffers; nothing reaches the wire until [`commit`](Self::commit).
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Establishes the physical connection to `host:port`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established within `timeout_ms`
    /// (0 = transport default).
    async fn connect(
        &self,
        host: &str,
        port: u16,
        on_disconnect: DisconnectCallback,
        on_reply: ReplyCallback,
        timeout_ms: u64,
        use_tls: bool,
    ) -> Result<(), SessionError>;

    /// Buffers an outbound command for the next [`commit`](Self::commit).
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is not connected.
    fn send(&self, command: Vec<String>) -> Result<(), SessionError>;

    /// Flushes all buffered commands to the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails at the transport level.
    async fn commit(&self) -> Result<(), SessionError>;

    /// Tears the connection down without signaling `on_disconnect`.
    ///
    /// When `wait_for_drain` is `true`, buffered outbound commands are flushed before the
    /// teardown.
    async fn disconnect(&self, wait_for_drain: bool);

    /// Returns `true` if the transport is currently connected.
    fn is_connected(&self) -> bool;
}
