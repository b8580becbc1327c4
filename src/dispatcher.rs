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

//! Shape-based classification of inbound replies.

use std::sync::{Arc, Mutex};

use crate::{ping::PingQueue, registry::SubscriptionRegistry, reply::Reply, types::ReplyHandler};

/// Classifies each inbound reply by its array shape and routes it to the matching consumer.
///
/// In subscriber mode the server sends no request/response framing, so the reply's shape is the
/// only routing information available. Classification fails open: a reply that matches no rule
/// is logged and discarded, and dispatch never panics and never returns an error.
pub struct ReplyDispatcher {
    channels: Arc<SubscriptionRegistry>,
    patterns: Arc<SubscriptionRegistry>,
    pings: Arc<PingQueue>,
    auth_reply: Mutex<Option<ReplyHandler>>,
    setname_reply: Mutex<Option<ReplyHandler>>,
}

impl ReplyDispatcher {
    /// Creates a new [`ReplyDispatcher`] over the given registries and ping queue.
    #[must_use]
    pub fn new(
        channels: Arc<SubscriptionRegistry>,
        patterns: Arc<SubscriptionRegistry>,
        pings: Arc<PingQueue>,
    ) -> Self {
        Self {
            channels,
            patterns,
            pings,
            auth_reply: Mutex::new(None),
            setname_reply: Mutex::new(None),
        }
    }

    /// Arms (or overwrites) the pending AUTH reply slot.
    pub(crate) fn set_auth_reply(&self, handler: Option<ReplyHandler>) {
        *lock(&self.auth_reply) = handler;
    }

    /// Arms (or overwrites) the pending CLIENT SETNAME reply slot.
    pub(crate) fn set_setname_reply(&self, handler: Option<ReplyHandler>) {
        *lock(&self.setname_reply) = handler;
    }

    /// Classifies and routes one inbound reply.
    ///
    /// Rules are checked in priority order:
    /// 1. non-array replies consume the pending AUTH slot, else the SETNAME slot;
    /// 2. `[tag, key, integer]` is a (p)subscribe acknowledgement;
    /// 3. `["message", channel, payload]` routes to the channel registry;
    /// 4. `["pmessage", pattern, channel, payload]` routes to the pattern registry;
    /// 5. `["pong", payload]` completes the oldest pending ping;
    /// 6. everything else is discarded.
    pub async fn on_reply(&self, reply: Reply) {
        let Some(items) = reply.as_array() else {
            self.on_scalar_reply(&reply);
            return;
        };

        match items {
            [tag, key, Reply::Integer(count)] => self.on_acknowledgement(tag, key, *count).await,
            [tag, channel, payload @ Reply::String(_)] => {
                self.on_message(tag, channel, payload).await;
            }
            [tag, pattern, channel, payload] => {
                self.on_pattern_message(tag, pattern, channel, payload).await;
            }
            [tag, _payload] if tag.as_str() == Some("pong") => self.on_pong(&reply),
            _ => tracing::debug!("Discarding unclassifiable reply: {reply}"),
        }
    }

    /// Routes a non-array reply to the pending AUTH slot, else the SETNAME slot.
    ///
    /// AUTH is checked first: the session always issues AUTH before CLIENT SETNAME, so when
    /// both slots are armed the earlier reply belongs to AUTH.
    fn on_scalar_reply(&self, reply: &Reply) {
        if let Some(handler) = lock(&self.auth_reply).take() {
            handler(reply);
        } else if let Some(handler) = lock(&self.setname_reply).take() {
            handler(reply);
        } else {
            tracing::debug!("Discarding unsolicited scalar reply: {reply}");
        }
    }

    async fn on_acknowledgement(&self, tag: &Reply, key: &Reply, count: i64) {
        let (Some(tag), Some(key)) = (tag.as_str(), key.as_str()) else {
            return;
        };
        let registry = match tag {
            "subscribe" => &self.channels,
            "psubscribe" => &self.patterns,
            // Unsubscribe confirmations carry a count too; nothing is registered for them
            _ => return,
        };
        if let Some(ack) = registry.take_ack(key).await {
            ack(count);
        }
    }

    async fn on_message(&self, tag: &Reply, channel: &Reply, payload: &Reply) {
        if tag.as_str() != Some("message") {
            tracing::debug!("Discarding non-message three-element reply");
            return;
        }
        let (Some(channel), Some(payload)) = (channel.as_str(), payload.as_str()) else {
            return;
        };
        let routed = self
            .channels
            .with_entry(channel, |s| (s.message)(channel, payload))
            .await;
        if !routed {
            tracing::debug!("No subscription for channel '{channel}'");
        }
    }

    async fn on_pattern_message(&self, tag: &Reply, pattern: &Reply, channel: &Reply, payload: &Reply) {
        if tag.as_str() != Some("pmessage") {
            tracing::debug!("Discarding non-pmessage four-element reply");
            return;
        }
        let (Some(pattern), Some(channel), Some(payload)) =
            (pattern.as_str(), channel.as_str(), payload.as_str())
        else {
            return;
        };
        // The handler receives the concrete channel the message arrived on, not the pattern
        let routed = self
            .patterns
            .with_entry(pattern, |s| (s.message)(channel, payload))
            .await;
        if !routed {
            tracing::debug!("No subscription for pattern '{pattern}'");
        }
    }

    fn on_pong(&self, reply: &Reply) {
        match self.pings.dequeue() {
            Some(Some(handler)) => handler(reply),
            Some(None) => {} // fire-and-forget ping
            None => tracing::debug!("Discarding pong with no pending ping"),
        }
    }
}

impl std::fmt::Debug for ReplyDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(ReplyDispatcher))
            .field("pending_pings", &self.pings.len())
            .finish()
    }
}

fn lock(slot: &Mutex<Option<ReplyHandler>>) -> std::sync::MutexGuard<'_, Option<ReplyHandler>> {
    slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
