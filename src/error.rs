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

//! Error types for the pub/sub session layer.

use thiserror::Error;

/// Errors returned by the session façade and the transport seam.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The operation requires an established connection.
    #[error("Not connected")]
    NotConnected,

    /// Establishing the transport connection failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Sending or flushing on an established connection failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Resolving a logical master name to a host/port failed.
    #[error("Master lookup failed for '{name}': {reason}")]
    MasterLookup {
        /// The logical service name that failed to resolve.
        name: String,
        /// The underlying resolution failure.
        reason: String,
    },
}
