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

//! Callback type aliases and connection lifecycle events.

use std::sync::Arc;

use strum::{AsRefStr, Display, EnumString};

use crate::reply::Reply;

/// Function type invoked once per published message delivered for a subscribed channel or a
/// pattern match, with the (matched) channel name and the message payload.
pub type MessageHandler = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Function type invoked at most once when the server acknowledges a (p)subscription, with the
/// resulting subscriber count.
pub type AckHandler = Arc<dyn Fn(i64) + Send + Sync>;

/// Function type invoked with a single reply value (AUTH, CLIENT SETNAME and PING correlation).
pub type ReplyHandler = Arc<dyn Fn(&Reply) + Send + Sync>;

/// Function type invoked with `(host, port, event)` on connection lifecycle transitions.
pub type ConnectHandler = Arc<dyn Fn(&str, u16, ConnectEvent) + Send + Sync>;

/// Function type the transport invokes exactly once per unsolicited connection drop.
pub type DisconnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Function type the transport invokes once per decoded inbound reply, in receive order.
pub type ReplyCallback = Arc<dyn Fn(Reply) + Send + Sync>;

/// Connection lifecycle event delivered to the application's [`ConnectHandler`].
#[derive(Clone, Copy, Debug, Display, Hash, PartialEq, Eq, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectEvent {
    /// An initial connection attempt is starting.
    Start,
    /// The connection (or a reconnection attempt) succeeded.
    Ok,
    /// The connection dropped; a reconnection episode is starting.
    Dropped,
    /// The reconnection controller is sleeping before its next attempt.
    Sleeping,
    /// Master-address resolution failed for this attempt.
    LookupFailed,
    /// A reconnection attempt failed at the transport level.
    Failed,
    /// The reconnection episode ended without re-establishing the connection.
    Stopped,
}

/// Creates a channel-based reply callback.
///
/// Returns a tuple containing the callback and a receiver for replies. The callback is cheap and
/// sync so the transport can invoke it from its read path; a single consumer draining the
/// receiver preserves receive order.
#[must_use]
pub fn channel_reply_callback() -> (ReplyCallback, tokio::sync::mpsc::UnboundedReceiver<Reply>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let callback: ReplyCallback = Arc::new(move |reply: Reply| {
        if let Err(e) = tx.send(reply) {
            tracing::debug!("Failed to send reply to channel: {e}");
        }
    });
    (callback, rx)
}

/// Creates a channel-based connect handler.
///
/// Returns a tuple containing the handler and a receiver for `(host, port, event)` tuples.
#[must_use]
pub fn channel_connect_handler() -> (
    ConnectHandler,
    tokio::sync::mpsc::UnboundedReceiver<(String, u16, ConnectEvent)>,
) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let handler: ConnectHandler = Arc::new(move |host: &str, port: u16, event: ConnectEvent| {
        if let Err(e) = tx.send((host.to_string(), port, event)) {
            tracing::debug!("Failed to send connect event to channel: {e}");
        }
    });
    (handler, rx)
}
