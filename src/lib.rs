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

//! A resilient pub/sub session layer for key-value servers speaking a Redis-style protocol.
//!
//! The crate sits between an application and a pluggable transport ([`connection::Connection`])
//! and keeps the logical subscription state alive across physical disconnections:
//!
//! - **Subscription registries** ([`registry`]) hold channel and pattern subscriptions with
//!   their message and acknowledgement handlers.
//! - **Reply dispatch** ([`dispatcher`]) classifies unframed inbound replies by array shape and
//!   routes them to subscriptions, pending pings, or pending AUTH/SETNAME slots; unknown shapes
//!   are discarded, never errors.
//! - **Ping correlation** ([`ping`]) matches PING requests to PONG replies strictly FIFO, and
//!   fails all in-flight pings with a synthetic error reply when the connection drops.
//! - **Reconnection** ([`session`]) reacts to unsolicited drops with a retry episode that
//!   re-resolves the master address (when configured with a [`locator::MasterLocator`]),
//!   reconnects, and replays `AUTH`, `CLIENT SETNAME` and every `SUBSCRIBE`/`PSUBSCRIBE`, in
//!   that order.
//!
//! The entry point is [`session::PubSubClient`].

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(rust_2018_idioms)]
#![deny(clippy::missing_errors_doc)]

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod locator;
pub mod mode;
pub mod ping;
pub mod registry;
pub mod reply;
pub mod session;
pub mod types;
