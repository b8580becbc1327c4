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

//! Pub/sub session façade and reconnection controller.

use std::{
    sync::{
        Arc, Mutex as StdMutex,
        atomic::{AtomicBool, AtomicU8, Ordering},
    },
    time::Duration,
};

use crate::{
    config::{ConnectTarget, SessionConfig},
    connection::Connection,
    dispatcher::ReplyDispatcher,
    error::SessionError,
    locator::MasterLocator,
    mode::SessionState,
    ping::PingQueue,
    registry::{RegistryMap, Subscription, SubscriptionRegistry},
    reply::Reply,
    types::{
        AckHandler, ConnectEvent, ConnectHandler, DisconnectCallback, MessageHandler, ReplyHandler,
        channel_reply_callback,
    },
};

/// A resilient pub/sub session over a single transport connection.
///
/// The client maintains a logical subscription set (channels and patterns) that outlives the
/// physical connection: when the transport signals an unsolicited drop, a reconnection episode
/// re-establishes the connection and replays authentication, the connection name, and every
/// registered subscription, so the application's handlers keep firing without re-subscribing.
///
/// All methods are callable from any task. Subscribe/unsubscribe calls issued while a
/// reconnection episode is in progress block until the episode completes, so their effect is
/// never lost between the registry and the wire.
pub struct PubSubClient<C: Connection> {
    inner: Arc<SessionInner<C>>,
}

#[derive(Default)]
struct ServerAddr {
    host: String,
    port: u16,
}

#[derive(Default)]
struct Credentials {
    password: Option<String>,
    client_name: Option<String>,
}

struct SessionInner<C: Connection> {
    connection: C,
    locator: Option<Arc<dyn MasterLocator>>,
    channels: Arc<SubscriptionRegistry>,
    patterns: Arc<SubscriptionRegistry>,
    pings: Arc<PingQueue>,
    dispatcher: Arc<ReplyDispatcher>,
    state: AtomicU8,
    cancel: AtomicBool,
    server: StdMutex<ServerAddr>,
    config: StdMutex<SessionConfig>,
    credentials: StdMutex<Credentials>,
    connect_handler: StdMutex<Option<ConnectHandler>>,
}

impl<C: Connection> PubSubClient<C> {
    /// Creates a new [`PubSubClient`] over the given transport, without master-name resolution.
    #[must_use]
    pub fn new(connection: C) -> Self {
        Self::build(connection, None)
    }

    /// Creates a new [`PubSubClient`] that resolves [`ConnectTarget::Master`] names through the
    /// given locator.
    #[must_use]
    pub fn with_locator(connection: C, locator: Arc<dyn MasterLocator>) -> Self {
        Self::build(connection, Some(locator))
    }

    fn build(connection: C, locator: Option<Arc<dyn MasterLocator>>) -> Self {
        let channels = Arc::new(SubscriptionRegistry::new());
        let patterns = Arc::new(SubscriptionRegistry::new());
        let pings = Arc::new(PingQueue::new());
        let dispatcher = Arc::new(ReplyDispatcher::new(
            channels.clone(),
            patterns.clone(),
            pings.clone(),
        ));
        Self {
            inner: Arc::new(SessionInner {
                connection,
                locator,
                channels,
                patterns,
                pings,
                dispatcher,
                state: AtomicU8::new(SessionState::Idle.as_u8()),
                cancel: AtomicBool::new(false),
                server: StdMutex::new(ServerAddr::default()),
                config: StdMutex::new(SessionConfig::default()),
                credentials: StdMutex::new(Credentials::default()),
                connect_handler: StdMutex::new(None),
            }),
        }
    }

    /// Connects to the configured server and wires up reply dispatch.
    ///
    /// Emits [`ConnectEvent::Start`] before the attempt and [`ConnectEvent::Ok`] on success.
    ///
    /// # Errors
    ///
    /// Returns an error if master-name resolution fails or the transport connection cannot be
    /// established.
    pub async fn connect(
        &self,
        config: SessionConfig,
        handler: Option<ConnectHandler>,
    ) -> Result<(), SessionError> {
        let (host, port) = self.inner.resolve_target(&config.target).await?;
        *lock(&self.inner.config) = config;
        *lock(&self.inner.connect_handler) = handler;
        self.inner.set_server(host.clone(), port);

        self.inner.emit(ConnectEvent::Start);
        SessionInner::connect_transport(&self.inner, &host, port).await?;
        self.inner.emit(ConnectEvent::Ok);
        Ok(())
    }

    /// Registers `message` for `channel` and buffers a `SUBSCRIBE` command.
    ///
    /// `ack` fires at most once, with the server's subscriber count, when the subscription is
    /// acknowledged. Subscribing again to the same channel overwrites the handlers.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport rejects the command (the registration is kept and
    /// replayed on the next successful reconnect).
    pub async fn subscribe(
        &self,
        channel: &str,
        message: MessageHandler,
        ack: Option<AckHandler>,
    ) -> Result<&Self, SessionError> {
        let mut guard = self.inner.channels.lock().await;
        guard.insert(channel.to_string(), Subscription::new(message, ack));
        self.inner
            .connection
            .send(vec!["SUBSCRIBE".to_string(), channel.to_string()])?;
        Ok(self)
    }

    /// Registers `message` for the glob `pattern` and buffers a `PSUBSCRIBE` command.
    ///
    /// The handler receives the concrete channel each message arrived on, not the pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport rejects the command (the registration is kept and
    /// replayed on the next successful reconnect).
    pub async fn psubscribe(
        &self,
        pattern: &str,
        message: MessageHandler,
        ack: Option<AckHandler>,
    ) -> Result<&Self, SessionError> {
        let mut guard = self.inner.patterns.lock().await;
        guard.insert(pattern.to_string(), Subscription::new(message, ack));
        self.inner
            .connection
            .send(vec!["PSUBSCRIBE".to_string(), pattern.to_string()])?;
        Ok(self)
    }

    /// Unregisters `channel` and buffers an `UNSUBSCRIBE` command.
    ///
    /// Unsubscribing from an unregistered channel is a logged no-op and sends nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport rejects the command.
    pub async fn unsubscribe(&self, channel: &str) -> Result<&Self, SessionError> {
        let mut guard = self.inner.channels.lock().await;
        if !guard.contains_key(channel) {
            tracing::debug!("Not subscribed to channel '{channel}', nothing to do");
            return Ok(self);
        }
        self.inner
            .connection
            .send(vec!["UNSUBSCRIBE".to_string(), channel.to_string()])?;
        guard.remove(channel);
        Ok(self)
    }

    /// Unregisters `pattern` and buffers a `PUNSUBSCRIBE` command.
    ///
    /// Unsubscribing from an unregistered pattern is a logged no-op and sends nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport rejects the command.
    pub async fn punsubscribe(&self, pattern: &str) -> Result<&Self, SessionError> {
        let mut guard = self.inner.patterns.lock().await;
        if !guard.contains_key(pattern) {
            tracing::debug!("Not subscribed to pattern '{pattern}', nothing to do");
            return Ok(self);
        }
        self.inner
            .connection
            .send(vec!["PUNSUBSCRIBE".to_string(), pattern.to_string()])?;
        guard.remove(pattern);
        Ok(self)
    }

    /// Buffers an `AUTH` command and arms the pending-reply slot with `handler`.
    ///
    /// The password is retained in memory for the lifetime of the client so it can be replayed
    /// after a reconnect. A single reply slot is kept: calling `auth` again before the previous
    /// reply arrives overwrites it.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport rejects the command.
    pub fn auth(
        &self,
        password: &str,
        handler: Option<ReplyHandler>,
    ) -> Result<&Self, SessionError> {
        lock(&self.inner.credentials).password = Some(password.to_string());
        // Arm even without a user handler so the reply cannot fall through to the setname slot
        let handler = handler.unwrap_or_else(|| Arc::new(|_: &Reply| {}));
        self.inner.dispatcher.set_auth_reply(Some(handler));
        if let Err(e) = self
            .inner
            .connection
            .send(vec!["AUTH".to_string(), password.to_string()])
        {
            self.inner.dispatcher.set_auth_reply(None);
            return Err(e);
        }
        Ok(self)
    }

    /// Buffers a `CLIENT SETNAME` command and arms the pending-reply slot with `handler`.
    ///
    /// The server only accepts this between authentication and the first subscription, so call
    /// it right after [`auth`](Self::auth) (or right after [`connect`](Self::connect) when no
    /// authentication is needed). The name is retained and replayed after a reconnect, in that
    /// same window. A single reply slot is kept, as for `auth`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport rejects the command.
    pub fn client_setname(
        &self,
        name: &str,
        handler: Option<ReplyHandler>,
    ) -> Result<&Self, SessionError> {
        lock(&self.inner.credentials).client_name = Some(name.to_string());
        let handler = handler.unwrap_or_else(|| Arc::new(|_: &Reply| {}));
        self.inner.dispatcher.set_setname_reply(Some(handler));
        if let Err(e) = self.inner.connection.send(vec![
            "CLIENT".to_string(),
            "SETNAME".to_string(),
            name.to_string(),
        ]) {
            self.inner.dispatcher.set_setname_reply(None);
            return Err(e);
        }
        Ok(self)
    }

    /// Buffers a `PING` and queues `handler` for the matching `PONG`.
    ///
    /// The send and the queue insertion happen atomically with respect to reply correlation, so
    /// concurrent pings from multiple tasks stay aligned with their replies. A `None` handler
    /// still occupies a correlation slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport rejects the command (no slot is queued).
    pub fn ping(
        &self,
        message: Option<&str>,
        handler: Option<ReplyHandler>,
    ) -> Result<&Self, SessionError> {
        let mut command = vec!["PING".to_string()];
        if let Some(message) = message {
            command.push(message.to_string());
        }
        self.inner
            .pings
            .enqueue_with(handler, || self.inner.connection.send(command))?;
        Ok(self)
    }

    /// Flushes all buffered commands to the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails at the transport level.
    pub async fn commit(&self) -> Result<&Self, SessionError> {
        self.inner.connection.commit().await?;
        Ok(self)
    }

    /// Disconnects the transport and fails all pending pings.
    ///
    /// An explicit disconnect never starts a reconnection episode. When `wait_for_drain` is
    /// `true`, buffered commands are flushed before the teardown.
    pub async fn disconnect(&self, wait_for_drain: bool) {
        self.inner.connection.disconnect(wait_for_drain).await;
        self.inner.pings.drain_and_fail();
    }

    /// Permanently stops reconnection: any in-progress episode ends at its next loop boundary
    /// and no future episode will run.
    pub fn cancel_reconnect(&self) {
        self.inner.cancel.store(true, Ordering::SeqCst);
    }

    /// Returns `true` if a reconnection episode is in progress.
    #[must_use]
    pub fn is_reconnecting(&self) -> bool {
        SessionState::from_atomic(&self.inner.state).is_reconnecting()
    }

    /// Returns `true` if the transport is currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connection.is_connected()
    }
}

impl<C: Connection> SessionInner<C> {
    fn set_server(&self, host: String, port: u16) {
        *lock(&self.server) = ServerAddr { host, port };
    }

    fn server(&self) -> (String, u16) {
        let guard = lock(&self.server);
        (guard.host.clone(), guard.port)
    }

    fn emit(&self, event: ConnectEvent) {
        let handler = lock(&self.connect_handler).clone();
        if let Some(handler) = handler {
            let (host, port) = self.server();
            handler(&host, port, event);
        }
    }

    async fn resolve_target(&self, target: &ConnectTarget) -> Result<(String, u16), SessionError> {
        match target {
            ConnectTarget::Address { host, port } => Ok((host.clone(), *port)),
            ConnectTarget::Master { name } => self.resolve_master(name).await,
        }
    }

    async fn resolve_master(&self, name: &str) -> Result<(String, u16), SessionError> {
        let Some(locator) = &self.locator else {
            return Err(SessionError::MasterLookup {
                name: name.to_string(),
                reason: "no master locator configured".to_string(),
            });
        };
        locator
            .resolve(name)
            .await
            .map_err(|e| SessionError::MasterLookup {
                name: name.to_string(),
                reason: e.to_string(),
            })
    }

    /// Connects the transport and wires the disconnect signal and the reply dispatch pump.
    ///
    /// The disconnect callback holds only a weak reference so a dropped client is not kept
    /// alive by its own transport. The pump task exits once the transport drops its reply
    /// callback (a later connect replaces it).
    async fn connect_transport(inner: &Arc<Self>, host: &str, port: u16) -> Result<(), SessionError> {
        let weak = Arc::downgrade(inner);
        let on_disconnect: DisconnectCallback = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                Self::handle_disconnect(&inner);
            }
        });

        let (on_reply, mut reply_rx) = channel_reply_callback();
        let dispatcher = inner.dispatcher.clone();
        tokio::task::spawn(async move {
            while let Some(reply) = reply_rx.recv().await {
                dispatcher.on_reply(reply).await;
            }
        });

        let (timeout_ms, use_tls) = {
            let config = lock(&inner.config);
            (config.connect_timeout_ms, config.use_tls)
        };
        inner
            .connection
            .connect(host, port, on_disconnect, on_reply, timeout_ms, use_tls)
            .await
    }

    /// Handles the transport's unsolicited-drop signal.
    ///
    /// The `Idle -> Reconnecting` transition is a compare-and-swap, so a duplicate signal while
    /// an episode is running is ignored.
    fn handle_disconnect(inner: &Arc<Self>) {
        if !SessionState::begin_reconnect(&inner.state) {
            tracing::debug!("Disconnect signal ignored, episode already in progress");
            return;
        }
        let inner = inner.clone();
        tokio::task::spawn(async move {
            Self::run_reconnect_episode(&inner).await;
            SessionState::end_reconnect(&inner.state);
        });
    }

    /// Drives one reconnection episode to completion.
    ///
    /// Both registry guards are held for the entire episode: subscribe/unsubscribe calls from
    /// other tasks block until the episode ends, so the replayed wire state always matches the
    /// registry contents.
    async fn run_reconnect_episode(inner: &Arc<Self>) {
        let (host, port) = inner.server();
        tracing::debug!("Connection to {host}:{port} dropped, starting reconnection");
        inner.emit(ConnectEvent::Dropped);
        inner.pings.drain_and_fail();

        let config = lock(&inner.config).clone();
        let mut channels = inner.channels.lock().await;
        let mut patterns = inner.patterns.lock().await;

        let mut attempts: i32 = 0;
        while inner.should_reconnect(attempts, config.max_reconnects) {
            if config.reconnect_interval_ms > 0 {
                inner.emit(ConnectEvent::Sleeping);
                tokio::time::sleep(Duration::from_millis(config.reconnect_interval_ms)).await;
            }
            attempts += 1;
            Self::try_reconnect(inner, &config, &mut channels, &mut patterns).await;
        }

        if !inner.connection.is_connected() {
            tracing::warn!("Reconnection given up after {attempts} attempt(s)");
            channels.clear();
            patterns.clear();
            inner.emit(ConnectEvent::Stopped);
        }
    }

    fn should_reconnect(&self, attempts: i32, max_reconnects: i32) -> bool {
        !self.connection.is_connected()
            && !self.cancel.load(Ordering::SeqCst)
            && (max_reconnects == -1 || attempts < max_reconnects)
    }

    /// Runs a single reconnection attempt; all failures are swallowed so the loop can retry.
    async fn try_reconnect(
        inner: &Arc<Self>,
        config: &SessionConfig,
        channels: &mut RegistryMap,
        patterns: &mut RegistryMap,
    ) {
        if let ConnectTarget::Master { name } = &config.target {
            match inner.resolve_master(name).await {
                Ok((host, port)) => inner.set_server(host, port),
                Err(e) => {
                    tracing::warn!("Master lookup failed during reconnect: {e}");
                    inner.emit(ConnectEvent::LookupFailed);
                    return;
                }
            }
        }

        let (host, port) = inner.server();
        if let Err(e) = Self::connect_transport(inner, &host, port).await {
            tracing::warn!("Reconnect attempt to {host}:{port} failed: {e}");
            inner.emit(ConnectEvent::Failed);
            return;
        }
        tracing::debug!("Reconnected to {host}:{port}, replaying session state");
        inner.emit(ConnectEvent::Ok);

        inner.replay_auth();
        inner.replay_setname();
        inner.replay_subscriptions(channels, patterns);
        if let Err(e) = inner.connection.commit().await {
            tracing::warn!("Failed to flush replayed commands: {e}");
        }
    }

    fn replay_auth(&self) {
        let Some(password) = lock(&self.credentials).password.clone() else {
            return;
        };
        let handler: ReplyHandler = Arc::new(|reply: &Reply| {
            if reply.is_error() {
                tracing::warn!("Re-authentication failed: {reply}");
            } else {
                tracing::debug!("Re-authentication succeeded");
            }
        });
        self.dispatcher.set_auth_reply(Some(handler));
        if let Err(e) = self.connection.send(vec!["AUTH".to_string(), password]) {
            tracing::warn!("Failed to replay AUTH: {e}");
            self.dispatcher.set_auth_reply(None);
        }
    }

    // Must run between AUTH and the subscription replay, the server rejects SETNAME afterwards
    fn replay_setname(&self) {
        let Some(name) = lock(&self.credentials).client_name.clone() else {
            return;
        };
        let handler: ReplyHandler = Arc::new(|reply: &Reply| {
            if reply.is_error() {
                tracing::warn!("Failed to restore connection name: {reply}");
            } else {
                tracing::debug!("Connection name restored");
            }
        });
        self.dispatcher.set_setname_reply(Some(handler));
        if let Err(e) = self.connection.send(vec![
            "CLIENT".to_string(),
            "SETNAME".to_string(),
            name,
        ]) {
            tracing::warn!("Failed to replay CLIENT SETNAME: {e}");
            self.dispatcher.set_setname_reply(None);
        }
    }

    /// Re-issues every registered subscription, keeping the original handlers.
    fn replay_subscriptions(
        &self,
        channels: &mut RegistryMap,
        patterns: &mut RegistryMap,
    ) {
        for (command, map) in [("SUBSCRIBE", channels), ("PSUBSCRIBE", patterns)] {
            for (key, subscription) in std::mem::take(map) {
                if let Err(e) = self
                    .connection
                    .send(vec![command.to_string(), key.clone()])
                {
                    tracing::warn!("Failed to replay {command} '{key}': {e}");
                }
                map.insert(key, subscription);
            }
        }
    }
}

impl<C: Connection> std::fmt::Debug for PubSubClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(PubSubClient))
            .field("state", &SessionState::from_atomic(&self.inner.state))
            .field("connected", &self.inner.connection.is_connected())
            .finish()
    }
}

impl<C: Connection> Drop for PubSubClient<C> {
    fn drop(&mut self) {
        self.inner.cancel.store(true, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::atomic::AtomicUsize};

    use async_trait::async_trait;
    use rstest::rstest;

    use super::*;
    use crate::types::ReplyCallback;

    #[derive(Default)]
    struct MockConnection {
        connected: AtomicBool,
        fail_connects: AtomicUsize,
        connects: StdMutex<Vec<(String, u16)>>,
        sent: StdMutex<Vec<Vec<String>>>,
        commits: AtomicUsize,
        on_disconnect: StdMutex<Option<DisconnectCallback>>,
        on_reply: StdMutex<Option<ReplyCallback>>,
    }

    impl MockConnection {
        fn connect_count(&self) -> usize {
            self.connects.lock().unwrap().len()
        }

        fn last_connect(&self) -> (String, u16) {
            self.connects.lock().unwrap().last().cloned().unwrap()
        }

        fn sent_commands(&self) -> Vec<Vec<String>> {
            self.sent.lock().unwrap().clone()
        }

        fn clear_sent(&self) {
            self.sent.lock().unwrap().clear();
        }

        fn deliver(&self, reply: Reply) {
            let callback = self.on_reply.lock().unwrap().clone().expect("no reply callback");
            callback(reply);
        }

        fn drop_connection(&self) {
            self.connected.store(false, Ordering::SeqCst);
            let callback = self
                .on_disconnect
                .lock()
                .unwrap()
                .clone()
                .expect("no disconnect callback");
            callback();
        }
    }

    #[async_trait]
    impl Connection for Arc<MockConnection> {
        async fn connect(
            &self,
            host: &str,
            port: u16,
            on_disconnect: DisconnectCallback,
            on_reply: ReplyCallback,
            _timeout_ms: u64,
            _use_tls: bool,
        ) -> Result<(), SessionError> {
            if self.fail_connects.load(Ordering::SeqCst) > 0 {
                self.fail_connects.fetch_sub(1, Ordering::SeqCst);
                return Err(SessionError::Connection("refused".to_string()));
            }
            *self.on_disconnect.lock().unwrap() = Some(on_disconnect);
            *self.on_reply.lock().unwrap() = Some(on_reply);
            self.connects.lock().unwrap().push((host.to_string(), port));
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn send(&self, command: Vec<String>) -> Result<(), SessionError> {
            if !self.connected.load(Ordering::SeqCst) {
                return Err(SessionError::NotConnected);
            }
            self.sent.lock().unwrap().push(command);
            Ok(())
        }

        async fn commit(&self) -> Result<(), SessionError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn disconnect(&self, _wait_for_drain: bool) {
            self.connected.store(false, Ordering::SeqCst);
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
    }

    struct MockLocator {
        addresses: StdMutex<VecDeque<(String, u16)>>,
        calls: AtomicUsize,
    }

    impl MockLocator {
        fn new(addresses: Vec<(&str, u16)>) -> Self {
            Self {
                addresses: StdMutex::new(
                    addresses
                        .into_iter()
                        .map(|(h, p)| (h.to_string(), p))
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MasterLocator for MockLocator {
        async fn resolve(&self, name: &str) -> anyhow::Result<(String, u16)> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut addresses = self.addresses.lock().unwrap();
            if addresses.len() > 1 {
                Ok(addresses.pop_front().unwrap())
            } else {
                addresses
                    .front()
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("no master known for '{name}'"))
            }
        }
    }

    fn event_recorder() -> (ConnectHandler, Arc<StdMutex<Vec<ConnectEvent>>>) {
        let events = Arc::new(StdMutex::new(Vec::new()));
        let events_clone = events.clone();
        let handler: ConnectHandler = Arc::new(move |_host, _port, event| {
            events_clone.lock().unwrap().push(event);
        });
        (handler, events)
    }

    fn events_of(events: &Arc<StdMutex<Vec<ConnectEvent>>>) -> Vec<ConnectEvent> {
        events.lock().unwrap().clone()
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    async fn connected_client(
        config: SessionConfig,
    ) -> (
        PubSubClient<Arc<MockConnection>>,
        Arc<MockConnection>,
        Arc<StdMutex<Vec<ConnectEvent>>>,
    ) {
        let mock = Arc::new(MockConnection::default());
        let client = PubSubClient::new(mock.clone());
        let (handler, events) = event_recorder();
        client
            .connect(config, Some(handler))
            .await
            .expect("connect");
        (client, mock, events)
    }

    #[rstest]
    #[tokio::test]
    async fn test_connect_emits_start_then_ok() {
        let (client, mock, events) = connected_client(SessionConfig::default()).await;

        assert!(client.is_connected());
        assert_eq!(mock.last_connect(), ("127.0.0.1".to_string(), 6379));
        assert_eq!(events_of(&events), vec![ConnectEvent::Start, ConnectEvent::Ok]);
    }

    #[rstest]
    #[tokio::test]
    async fn test_message_routed_through_facade() {
        let (client, mock, _events) = connected_client(SessionConfig::default()).await;

        let received = Arc::new(StdMutex::new(Vec::new()));
        let received_clone = received.clone();
        client
            .subscribe(
                "news",
                Arc::new(move |channel: &str, payload: &str| {
                    received_clone
                        .lock()
                        .unwrap()
                        .push((channel.to_string(), payload.to_string()));
                }),
                None,
            )
            .await
            .expect("subscribe");
        client.commit().await.expect("commit");

        assert_eq!(
            mock.sent_commands(),
            vec![vec!["SUBSCRIBE".to_string(), "news".to_string()]],
        );

        mock.deliver(Reply::Array(vec![
            Reply::String("message".to_string()),
            Reply::String("news".to_string()),
            Reply::String("hello".to_string()),
        ]));

        wait_until(|| !received.lock().unwrap().is_empty()).await;
        assert_eq!(
            *received.lock().unwrap(),
            vec![("news".to_string(), "hello".to_string())],
        );
    }

    #[rstest]
    #[tokio::test]
    async fn test_unsubscribe_unknown_key_sends_nothing() {
        let (client, mock, _events) = connected_client(SessionConfig::default()).await;

        client.unsubscribe("ghost").await.expect("unsubscribe");
        client.punsubscribe("ghost.*").await.expect("punsubscribe");
        assert!(mock.sent_commands().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn test_ping_correlates_fifo_including_null_slot() {
        let (client, mock, _events) = connected_client(SessionConfig::default()).await;

        let order = Arc::new(StdMutex::new(Vec::new()));
        for tag in ["first", "last"] {
            let order = order.clone();
            let handler: ReplyHandler = Arc::new(move |reply: &Reply| {
                order.lock().unwrap().push((tag, reply.is_error()));
            });
            client.ping(None, Some(handler)).expect("ping");
            if tag == "first" {
                client.ping(Some("probe"), None).expect("ping");
            }
        }

        assert_eq!(
            mock.sent_commands(),
            vec![
                vec!["PING".to_string()],
                vec!["PING".to_string(), "probe".to_string()],
                vec!["PING".to_string()],
            ],
        );

        let pong = Reply::Array(vec![
            Reply::String("pong".to_string()),
            Reply::String(String::new()),
        ]);
        for _ in 0..3 {
            mock.deliver(pong.clone());
        }

        wait_until(|| order.lock().unwrap().len() == 2).await;
        assert_eq!(*order.lock().unwrap(), vec![("first", false), ("last", false)]);
    }

    #[rstest]
    #[tokio::test]
    async fn test_disconnect_fails_pending_pings_without_reconnecting() {
        let config = SessionConfig {
            max_reconnects: -1,
            ..Default::default()
        };
        let (client, _mock, events) = connected_client(config).await;

        let failed = Arc::new(AtomicBool::new(false));
        let failed_clone = failed.clone();
        client
            .ping(
                None,
                Some(Arc::new(move |reply: &Reply| {
                    failed_clone.store(reply.is_error(), Ordering::SeqCst);
                })),
            )
            .expect("ping");

        client.disconnect(false).await;
        wait_until(|| failed.load(Ordering::SeqCst)).await;

        assert!(!client.is_connected());
        assert!(!client.is_reconnecting());
        // No Dropped event: explicit disconnects never start an episode
        assert_eq!(events_of(&events), vec![ConnectEvent::Start, ConnectEvent::Ok]);
    }

    #[rstest]
    #[tokio::test]
    async fn test_reconnect_replays_auth_setname_then_subscriptions() {
        let config = SessionConfig {
            max_reconnects: -1,
            ..Default::default()
        };
        let (client, mock, events) = connected_client(config).await;

        client.auth("hunter2", None).expect("auth");
        client.client_setname("listener", None).expect("setname");
        client
            .subscribe("news", Arc::new(|_: &str, _: &str| {}), None)
            .await
            .expect("subscribe");
        client
            .psubscribe("news.*", Arc::new(|_: &str, _: &str| {}), None)
            .await
            .expect("psubscribe");
        client.commit().await.expect("commit");

        mock.clear_sent();
        mock.drop_connection();
        wait_until(|| mock.connect_count() == 2 && !client.is_reconnecting()).await;

        assert_eq!(
            mock.sent_commands(),
            vec![
                vec!["AUTH".to_string(), "hunter2".to_string()],
                vec![
                    "CLIENT".to_string(),
                    "SETNAME".to_string(),
                    "listener".to_string(),
                ],
                vec!["SUBSCRIBE".to_string(), "news".to_string()],
                vec!["PSUBSCRIBE".to_string(), "news.*".to_string()],
            ],
        );
        assert_eq!(
            events_of(&events),
            vec![
                ConnectEvent::Start,
                ConnectEvent::Ok,
                ConnectEvent::Dropped,
                ConnectEvent::Ok,
            ],
        );
        assert!(client.is_connected());
    }

    #[rstest]
    #[tokio::test]
    async fn test_exhausted_episode_clears_registries_and_stops() {
        let config = SessionConfig {
            max_reconnects: 2,
            ..Default::default()
        };
        let (client, mock, events) = connected_client(config).await;
        client
            .subscribe("news", Arc::new(|_: &str, _: &str| {}), None)
            .await
            .expect("subscribe");

        mock.fail_connects.store(usize::MAX, Ordering::SeqCst);
        mock.drop_connection();
        wait_until(|| !client.is_reconnecting()).await;

        assert!(!client.is_connected());
        assert!(client.inner.channels.is_empty().await);
        assert_eq!(
            events_of(&events),
            vec![
                ConnectEvent::Start,
                ConnectEvent::Ok,
                ConnectEvent::Dropped,
                ConnectEvent::Failed,
                ConnectEvent::Failed,
                ConnectEvent::Stopped,
            ],
        );
    }

    #[rstest]
    #[tokio::test]
    async fn test_zero_max_reconnects_stops_immediately() {
        let (client, mock, events) = connected_client(SessionConfig::default()).await;
        client
            .subscribe("news", Arc::new(|_: &str, _: &str| {}), None)
            .await
            .expect("subscribe");

        mock.drop_connection();
        wait_until(|| !client.is_reconnecting()).await;

        assert_eq!(mock.connect_count(), 1);
        assert!(client.inner.channels.is_empty().await);
        assert_eq!(
            events_of(&events),
            vec![
                ConnectEvent::Start,
                ConnectEvent::Ok,
                ConnectEvent::Dropped,
                ConnectEvent::Stopped,
            ],
        );
    }

    #[rstest]
    #[tokio::test]
    async fn test_duplicate_disconnect_signal_is_noop() {
        let config = SessionConfig {
            max_reconnects: -1,
            reconnect_interval_ms: 50,
            ..Default::default()
        };
        let (client, mock, events) = connected_client(config).await;

        mock.fail_connects.store(usize::MAX, Ordering::SeqCst);
        mock.drop_connection();
        wait_until(|| client.is_reconnecting()).await;
        mock.drop_connection(); // second signal during the episode

        let sleeping = || {
            events_of(&events)
                .iter()
                .filter(|e| **e == ConnectEvent::Sleeping)
                .count()
        };
        wait_until(|| sleeping() >= 2).await;
        client.cancel_reconnect();
        wait_until(|| !client.is_reconnecting()).await;

        let dropped = events_of(&events)
            .iter()
            .filter(|e| **e == ConnectEvent::Dropped)
            .count();
        assert_eq!(dropped, 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_cancel_reconnect_ends_episode() {
        let config = SessionConfig {
            max_reconnects: -1,
            reconnect_interval_ms: 20,
            ..Default::default()
        };
        let (client, mock, events) = connected_client(config).await;

        mock.fail_connects.store(usize::MAX, Ordering::SeqCst);
        mock.drop_connection();
        wait_until(|| {
            events_of(&events).contains(&ConnectEvent::Failed)
        })
        .await;

        client.cancel_reconnect();
        wait_until(|| !client.is_reconnecting()).await;

        assert!(!client.is_connected());
        assert_eq!(events_of(&events).last(), Some(&ConnectEvent::Stopped));
    }

    #[rstest]
    #[tokio::test]
    async fn test_initial_master_lookup_failure_is_synchronous_error() {
        let mock = Arc::new(MockConnection::default());
        let locator = Arc::new(MockLocator::new(vec![]));
        let client = PubSubClient::with_locator(mock, locator);

        let config = SessionConfig::new(ConnectTarget::master("primary"));
        let result = client.connect(config, None).await;
        assert!(matches!(
            result,
            Err(SessionError::MasterLookup { name, .. }) if name == "primary"
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn test_master_target_without_locator_is_an_error() {
        let mock = Arc::new(MockConnection::default());
        let client = PubSubClient::new(mock);

        let config = SessionConfig::new(ConnectTarget::master("primary"));
        assert!(matches!(
            client.connect(config, None).await,
            Err(SessionError::MasterLookup { .. }),
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn test_reconnect_re_resolves_master_address() {
        let mock = Arc::new(MockConnection::default());
        let locator = Arc::new(MockLocator::new(vec![
            ("10.0.0.1", 6379),
            ("10.0.0.2", 6380),
        ]));
        let client = PubSubClient::with_locator(mock.clone(), locator.clone());

        let config = SessionConfig {
            target: ConnectTarget::master("primary"),
            max_reconnects: -1,
            ..Default::default()
        };
        client.connect(config, None).await.expect("connect");
        assert_eq!(mock.last_connect(), ("10.0.0.1".to_string(), 6379));

        mock.drop_connection();
        wait_until(|| !client.is_reconnecting()).await;

        // The failover promoted a different host; the episode picked it up
        assert_eq!(mock.last_connect(), ("10.0.0.2".to_string(), 6380));
        assert_eq!(locator.calls.load(Ordering::SeqCst), 2);
        assert!(client.is_connected());
    }
}
