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

//! Subscription registries for channels and patterns.

use ahash::AHashMap;
use tokio::sync::{Mutex, MutexGuard};

use crate::types::{AckHandler, MessageHandler};

/// A registered subscription: the per-message handler plus an optional one-shot acknowledgement
/// handler invoked with the server's subscriber count.
#[derive(Clone)]
pub struct Subscription {
    /// Handler invoked once per message delivered for this subscription.
    pub message: MessageHandler,
    /// Handler invoked at most once when the server acknowledges the subscription.
    pub ack: Option<AckHandler>,
}

impl Subscription {
    /// Creates a new [`Subscription`].
    #[must_use]
    pub fn new(message: MessageHandler, ack: Option<AckHandler>) -> Self {
        Self { message, ack }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(Subscription))
            .field("has_ack", &self.ack.is_some())
            .finish()
    }
}

pub(crate) type RegistryMap = AHashMap<String, Subscription>;

/// A keyed set of subscriptions behind a single async lock.
///
/// One registry holds channels, a second (disjoint) registry holds patterns; pattern messages
/// arrive tagged with the pattern that matched them, so both registries route by exact key.
/// The lock is a `tokio::sync::Mutex` so the reconnection controller can hold the guard across
/// its sleeps and connect attempts: subscribe/unsubscribe calls issued during an episode block
/// until the episode releases the guard, which is what keeps the post-replay wire state
/// consistent with the registry.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    inner: Mutex<RegistryMap>,
}

impl SubscriptionRegistry {
    /// Creates a new empty [`SubscriptionRegistry`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts (or overwrites) the subscription for `key`.
    pub async fn insert(&self, key: impl Into<String>, subscription: Subscription) {
        self.inner.lock().await.insert(key.into(), subscription);
    }

    /// Removes the subscription for `key`, returning `true` if one was present.
    pub async fn remove(&self, key: &str) -> bool {
        self.inner.lock().await.remove(key).is_some()
    }

    /// Returns `true` if a subscription for `key` is present.
    pub async fn contains(&self, key: &str) -> bool {
        self.inner.lock().await.contains_key(key)
    }

    /// Returns the number of registered subscriptions.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Returns `true` if no subscriptions are registered.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Removes all subscriptions without invoking any handler.
    pub async fn clear(&self) {
        self.inner.lock().await.clear();
    }

    /// Runs `f` against the subscription for `key`, returning `true` if one was present.
    ///
    /// The registry lock is held for the duration of `f`, so a handler looked up here cannot be
    /// unregistered mid-dispatch.
    pub async fn with_entry(&self, key: &str, f: impl FnOnce(&Subscription)) -> bool {
        match self.inner.lock().await.get(key) {
            Some(subscription) => {
                f(subscription);
                true
            }
            None => false,
        }
    }

    /// Takes the one-shot acknowledgement handler for `key`, if any remains.
    pub async fn take_ack(&self, key: &str) -> Option<AckHandler> {
        self.inner
            .lock()
            .await
            .get_mut(key)
            .and_then(|s| s.ack.take())
    }

    /// Locks the registry, exposing the raw map to the reconnection controller for the duration
    /// of an episode.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, RegistryMap> {
        self.inner.lock().await
    }
}
