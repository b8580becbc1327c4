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

//! Master-address discovery seam.

use async_trait::async_trait;

/// Resolves a logical master name to the currently authoritative host/port.
///
/// When a session is configured with [`ConnectTarget::Master`](crate::config::ConnectTarget),
/// the resolver is consulted on the initial connect and again before every reconnection attempt,
/// so a failover that promotes a different host is picked up mid-episode.
#[async_trait]
pub trait MasterLocator: Send + Sync + 'static {
    /// Resolves `name` to a `(host, port)` address.
    ///
    /// # Errors
    ///
    /// Returns an error if the name cannot currently be resolved; during a reconnection episode
    /// the failure ends only that attempt, not the episode.
    async fn resolve(&self, name: &str) -> anyhow::Result<(String, u16)>;
}
