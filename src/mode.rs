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

//! Atomic session state for the reconnection controller.

use std::sync::atomic::{AtomicU8, Ordering};

use strum::{AsRefStr, Display, EnumString};

/// Session state for the reconnection controller (managed via an atomic flag).
///
/// Entering [`SessionState::Reconnecting`] is a compare-and-swap so a second disconnect signal
/// delivered during an episode is a no-op; the state spans the whole episode, from disconnect
/// detection to either successful resume or exhaustion.
#[derive(Clone, Copy, Debug, Default, Display, Hash, PartialEq, Eq, AsRefStr, EnumString)]
#[repr(u8)]
#[strum(serialize_all = "UPPERCASE")]
pub enum SessionState {
    #[default]
    /// No reconnection episode is in progress; the session is either connected or terminally
    /// disconnected.
    Idle = 0,
    /// The connection dropped and the reconnection controller is driving retry attempts.
    Reconnecting = 1,
}

impl SessionState {
    /// Convert a u8 to [`SessionState`], useful when loading from an `AtomicU8`.
    ///
    /// # Panics
    ///
    /// Panics if `value` is not a valid state discriminant.
    #[inline]
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Reconnecting,
            _ => panic!("Invalid `SessionState` value: {value}"),
        }
    }

    /// Load a [`SessionState`] from an `AtomicU8`.
    #[inline]
    pub fn from_atomic(value: &AtomicU8) -> Self {
        Self::from_u8(value.load(Ordering::SeqCst))
    }

    /// Convert a [`SessionState`] to a u8, useful when storing to an `AtomicU8`.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns `true` if no reconnection episode is in progress.
    #[inline]
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Returns `true` if a reconnection episode is in progress.
    #[inline]
    #[must_use]
    pub const fn is_reconnecting(&self) -> bool {
        matches!(self, Self::Reconnecting)
    }

    /// Attempts the `Idle -> Reconnecting` transition.
    ///
    /// Returns `true` if this call started the episode, `false` if one was already in progress
    /// (the caller must then treat the disconnect signal as a duplicate and ignore it).
    #[inline]
    pub fn begin_reconnect(state: &AtomicU8) -> bool {
        state
            .compare_exchange(
                Self::Idle.as_u8(),
                Self::Reconnecting.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Ends the episode, returning the state to `Idle`.
    #[inline]
    pub fn end_reconnect(state: &AtomicU8) {
        state.store(Self::Idle.as_u8(), Ordering::SeqCst);
    }
}
