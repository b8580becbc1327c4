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

//! Session configuration.

/// Addressing mode for the pub/sub server.
///
/// The two modes are mutually exclusive. When addressed by logical master name, every
/// (re)connect re-resolves the current host/port via the configured
/// [`MasterLocator`](crate::locator::MasterLocator); the resolved address is cached only for
/// diagnostics and connect events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectTarget {
    /// A direct host/port address.
    Address {
        /// The server host.
        host: String,
        /// The server port.
        port: u16,
    },
    /// A logical master name resolved through the master locator on every connection attempt.
    Master {
        /// The logical service name.
        name: String,
    },
}

impl ConnectTarget {
    /// Creates a direct host/port target.
    #[must_use]
    pub fn address(host: impl Into<String>, port: u16) -> Self {
        Self::Address {
            host: host.into(),
            port,
        }
    }

    /// Creates a named-master target.
    #[must_use]
    pub fn master(name: impl Into<String>) -> Self {
        Self::Master { name: name.into() }
    }
}

impl Default for ConnectTarget {
    fn default() -> Self {
        Self::Address {
            host: "127.0.0.1".to_string(),
            port: 6379,
        }
    }
}

/// Configuration for a pub/sub session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// The server address (direct, or by logical master name).
    pub target: ConnectTarget,
    /// The timeout (milliseconds) for each transport connection attempt (0 = transport default).
    pub connect_timeout_ms: u64,
    /// Maximum reconnection attempts per disconnection episode (-1 = unlimited, 0 = disabled).
    pub max_reconnects: i32,
    /// The delay (milliseconds) between two reconnection attempts (0 = retry immediately).
    pub reconnect_interval_ms: u64,
    /// Enables TLS on the transport.
    pub use_tls: bool,
}

impl SessionConfig {
    /// Creates a new [`SessionConfig`] for the given `target` with reconnection disabled.
    #[must_use]
    pub fn new(target: ConnectTarget) -> Self {
        Self {
            target,
            ..Default::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target: ConnectTarget::default(),
            connect_timeout_ms: 0,
            max_reconnects: 0,
            reconnect_interval_ms: 0,
            use_tls: false,
        }
    }
}
