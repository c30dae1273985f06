//! Connection supervisor.
//!
//! A [`Gateway`] owns at most one live connection at a time. Opening one
//! dials the websocket, runs the Hello / Identify-or-Resume / READY-or-RESUMED
//! handshake and then starts two workers: the pacemaker and the dispatch
//! loop. When the dispatch loop fails it hands the failure to a fresh task
//! that closes the connection and keeps reopening it until it succeeds or
//! the user closes the gateway.
//!
//! All lifecycle transitions (open, close, reconnect) are serialized by one
//! async lock, so a close always waits for an in-flight open and the other
//! way around.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tether_proto::{
    Codec, Event, Frame, Hello, IdentifyProperties, Intents, JsonCodec, OpCode, ProtoError, ShardInfo, events,
};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::bootstrap::{self, Bootstrap};
use crate::config::GatewayConfig;
use crate::dispatch::{Dispatcher, Flow, Wire};
use crate::error::GatewayError;
use crate::identity::{Handshake, Identifier};
use crate::pacemaker::{Pacemaker, PacemakerHandle};
use crate::reconnect::retry_with_backoff;
use crate::state::{AtomicConnectionState, ConnectionState};
use crate::transport::{self, WsReceiver, WsSender};

/// Receives errors that happen on background tasks.
pub type ErrorLog = Arc<dyn Fn(&GatewayError) + Send + Sync>;

/// Fires after every close with the error that caused it, if any.
pub type AfterClose = Arc<dyn Fn(Option<&GatewayError>) + Send + Sync>;

/// Builds a [`Gateway`].
pub struct GatewayBuilder<C: Codec = JsonCodec> {
    url: String,
    identifier: Identifier,
    config: GatewayConfig,
    codec: C,
    error_log: Option<ErrorLog>,
    after_close: Option<AfterClose>,
    frame_tap: Option<mpsc::Sender<Frame>>,
}

impl GatewayBuilder<JsonCodec> {
    /// Start building a gateway that connects to `url` verbatim.
    #[must_use]
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            identifier: Identifier::new(token),
            config: GatewayConfig::default(),
            codec: JsonCodec,
            error_log: None,
            after_close: None,
            frame_tap: None,
        }
    }

    /// Look up the websocket URL over REST and start building from it.
    ///
    /// The configured version and encoding are appended to the URL.
    pub async fn from_bootstrap(
        token: impl Into<String>,
        config: GatewayConfig,
    ) -> Result<Self, GatewayError> {
        config.validate()?;
        let url = Bootstrap::new(&config.api_base)?.gateway_url().await?;
        let url = bootstrap::with_query(&url, config.version, &config.encoding)?;
        Ok(Self::new(url, token).with_config(config))
    }
}

impl<C: Codec> GatewayBuilder<C> {
    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Claim a shard.
    #[must_use]
    pub fn with_shard(mut self, shard: ShardInfo) -> Self {
        self.identifier = self.identifier.with_shard(shard);
        self
    }

    /// Subscribe to a set of intents.
    #[must_use]
    pub fn with_intents(mut self, intents: Intents) -> Self {
        self.identifier = self.identifier.with_intents(intents);
        self
    }

    /// Override the connection properties sent on Identify.
    #[must_use]
    pub fn with_properties(mut self, properties: IdentifyProperties) -> Self {
        self.identifier = self.identifier.with_properties(properties);
        self
    }

    /// Route background errors to `log` instead of the default `tracing` error.
    #[must_use]
    pub fn with_error_log(mut self, log: impl Fn(&GatewayError) + Send + Sync + 'static) -> Self {
        self.error_log = Some(Arc::new(log));
        self
    }

    /// Run `hook` after every close.
    #[must_use]
    pub fn with_after_close(
        mut self,
        hook: impl Fn(Option<&GatewayError>) + Send + Sync + 'static,
    ) -> Self {
        self.after_close = Some(Arc::new(hook));
        self
    }

    /// Copy every received frame to `tap`. Frames are dropped when it is full.
    #[must_use]
    pub fn with_frame_tap(mut self, tap: mpsc::Sender<Frame>) -> Self {
        self.frame_tap = Some(tap);
        self
    }

    /// Swap the payload codec.
    #[must_use]
    pub fn with_codec<D: Codec>(self, codec: D) -> GatewayBuilder<D> {
        GatewayBuilder {
            url: self.url,
            identifier: self.identifier,
            config: self.config,
            codec,
            error_log: self.error_log,
            after_close: self.after_close,
            frame_tap: self.frame_tap,
        }
    }

    /// Finish building. Returns the gateway and the receiving end of its
    /// event queue.
    pub fn build(self) -> Result<(Gateway<C>, mpsc::Receiver<Event>), GatewayError> {
        self.config.validate()?;

        let mut identifier = self.identifier;
        if let Some(threshold) = self.config.large_threshold {
            identifier = identifier.with_large_threshold(threshold);
        }

        let error_log: ErrorLog = match self.error_log {
            Some(log) => log,
            None => Arc::new(|err: &GatewayError| error!(error = %err, "gateway error")),
        };
        let after_close: AfterClose = match self.after_close {
            Some(hook) => hook,
            None => Arc::new(|err: Option<&GatewayError>| match err {
                Some(err) => debug!(error = %err, "gateway closed after error"),
                None => debug!("gateway closed"),
            }),
        };

        let (events_tx, events_rx) = mpsc::channel(self.config.event_buffer);
        let dispatcher = Dispatcher::new(
            self.codec,
            identifier,
            events_tx,
            self.frame_tap,
            self.config.timeout(),
            Arc::clone(&error_log),
        );

        let shared = Shared {
            url: self.url,
            config: self.config,
            dispatcher,
            error_log,
            after_close,
            state: AtomicConnectionState::default(),
            epochs: AtomicU64::new(0),
            closes: AtomicU64::new(0),
            link: Mutex::new(None),
        };

        Ok((
            Gateway {
                shared: Arc::new(shared),
            },
            events_rx,
        ))
    }
}

/// Handle to a supervised gateway connection. Cheap to clone.
pub struct Gateway<C: Codec = JsonCodec> {
    shared: Arc<Shared<C>>,
}

impl<C: Codec> Clone for Gateway<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Codec> Gateway<C> {
    /// Connect and complete the handshake.
    ///
    /// Returns immediately if a connection is already open. On failure the
    /// half-open connection is closed and the after-close hook fires with
    /// the cause.
    pub async fn open(&self) -> Result<(), GatewayError> {
        let mut slot = self.shared.link.lock().await;
        if slot.is_some() {
            debug!("gateway already open");
            return Ok(());
        }
        self.shared.open_link(&mut slot).await
    }

    /// Stop the workers, wait for them, and close the websocket.
    ///
    /// Closing an already closed gateway is not an error; the after-close
    /// hook still fires.
    pub async fn close(&self) -> Result<(), GatewayError> {
        let mut slot = self.shared.link.lock().await;
        // Any reconnect loop started before this point gives up.
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
        self.shared.teardown(&mut slot, None).await
    }

    /// Close, then reopen until it works, the retry policy gives up, or
    /// [`Gateway::close`] is called.
    ///
    /// Failures are reported through the error log.
    pub async fn reconnect(&self) {
        let generation = {
            let mut slot = self.shared.link.lock().await;
            if let Err(e) = self.shared.teardown(&mut slot, None).await {
                debug!(error = %e, "close before reconnect failed");
            }
            self.shared.closes.load(Ordering::SeqCst)
        };
        self.shared.reopen(generation).await;
    }

    /// Send a frame with `op` and an optional payload.
    pub async fn send<T: Serialize + ?Sized>(
        &self,
        op: OpCode,
        payload: Option<&T>,
    ) -> Result<(), GatewayError> {
        let sender = {
            let slot = self.shared.link.lock().await;
            slot.as_ref()
                .map(|link| Arc::clone(&link.sender))
                .ok_or(GatewayError::NotConnected)?
        };
        self.shared.dispatcher.send(&sender, op, payload).await
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state.load()
    }

    /// Session ID remembered from the last READY.
    pub fn session_id(&self) -> Option<String> {
        self.shared.dispatcher.identifier().session_id()
    }

    /// Last received sequence number, zero before any.
    pub fn sequence(&self) -> u64 {
        self.shared.dispatcher.sequence().get()
    }

    /// The websocket URL.
    pub fn url(&self) -> &str {
        &self.shared.url
    }
}

/// One live connection and its workers.
struct Link {
    epoch: u64,
    sender: Arc<WsSender>,
    pacemaker: Option<PacemakerHandle>,
    event_loop: Option<JoinHandle<()>>,
}

struct Shared<C: Codec> {
    url: String,
    config: GatewayConfig,
    dispatcher: Dispatcher<C>,
    error_log: ErrorLog,
    after_close: AfterClose,
    state: AtomicConnectionState,
    epochs: AtomicU64,
    /// Bumped by every user close.
    closes: AtomicU64,
    link: Mutex<Option<Link>>,
}

impl<C: Codec> Shared<C> {
    async fn open_link(self: &Arc<Self>, slot: &mut Option<Link>) -> Result<(), GatewayError> {
        let limit = self.config.timeout();

        self.state.store(ConnectionState::Dialing);
        let (sender, mut receiver) = match transport::dial(&self.url, limit).await {
            Ok(halves) => halves,
            Err(e) => {
                self.state.store(ConnectionState::Idle);
                return Err(e);
            }
        };

        let sender = Arc::new(sender);
        let epoch = self.epochs.fetch_add(1, Ordering::SeqCst) + 1;
        *slot = Some(Link {
            epoch,
            sender: Arc::clone(&sender),
            pacemaker: None,
            event_loop: None,
        });

        let hello = match timeout(limit, self.handshake(&sender, &mut receiver)).await {
            Ok(Ok(hello)) => hello,
            Ok(Err(e)) => return Err(self.abort_open(slot, e).await),
            Err(_) => {
                let e = GatewayError::Timeout {
                    stage: "handshake",
                    after: limit,
                };
                return Err(self.abort_open(slot, e).await);
            }
        };

        let pacemaker = Arc::new(Pacemaker::new(hello.heartbeat_interval.as_duration()));
        let (pacer, death) = pacemaker.start({
            let shared = Arc::clone(self);
            let sender = Arc::clone(&sender);
            move || {
                let shared = Arc::clone(&shared);
                let sender = Arc::clone(&sender);
                async move { shared.dispatcher.heartbeat(&sender).await }
            }
        });
        let event_loop = self.spawn_event_loop(epoch, receiver, sender, pacemaker, death);

        if let Some(link) = slot.as_mut() {
            link.pacemaker = Some(pacer);
            link.event_loop = Some(event_loop);
        }
        self.state.store(ConnectionState::Connected);
        info!(
            url = %self.url,
            epoch,
            heartbeat_ms = hello.heartbeat_interval.get(),
            "gateway connected"
        );
        Ok(())
    }

    async fn abort_open(&self, slot: &mut Option<Link>, cause: GatewayError) -> GatewayError {
        debug!(error = %cause, "gateway handshake failed");
        if let Err(e) = self.teardown(slot, Some(&cause)).await {
            debug!(error = %e, "close after failed handshake also failed");
        }
        cause
    }

    async fn handshake(&self, sender: &WsSender, receiver: &mut WsReceiver) -> Result<Hello, GatewayError> {
        let wire = Wire {
            sender,
            pacemaker: None,
        };

        self.state.store(ConnectionState::AwaitingHello);
        let first = self.dispatcher.next_frame(receiver).await?;
        let hello: Hello = self.dispatcher.assert_event(&first, OpCode::Hello)?;
        if hello.heartbeat_interval.get() == 0 {
            return Err(ProtoError::Validation("zero heartbeat interval".to_string()).into());
        }

        self.state.store(ConnectionState::Authenticating);
        let identifier = self.dispatcher.identifier();
        match identifier.next_handshake(self.dispatcher.sequence().last()) {
            Ok(Handshake::Identify(identify)) => {
                debug!("identifying a new session");
                self.dispatcher.sequence().reset();
                self.dispatcher
                    .send(sender, OpCode::Identify, Some(&identify))
                    .await?;
            }
            Ok(Handshake::Resume(resume)) => {
                debug!(session_id = %resume.session_id, seq = resume.seq, "resuming session");
                self.dispatcher
                    .send(sender, OpCode::Resume, Some(&resume))
                    .await?;
            }
            Err(e) => {
                // Identify next time instead of failing the same way forever.
                identifier.clear_session();
                return Err(e);
            }
        }

        self.state.store(ConnectionState::AwaitingConfirm);
        self.dispatcher
            .wait_for_event(receiver, &wire, |frame| {
                frame.is_dispatch_of(events::names::READY) || frame.is_dispatch_of(events::names::RESUMED)
            })
            .await?;

        Ok(hello)
    }

    fn spawn_event_loop(
        self: &Arc<Self>,
        epoch: u64,
        mut receiver: WsReceiver,
        sender: Arc<WsSender>,
        pacemaker: Arc<Pacemaker>,
        mut death: oneshot::Receiver<Result<(), GatewayError>>,
    ) -> JoinHandle<()> {
        let shared = Arc::clone(self);
        let read_limit = self.config.read_limit(pacemaker.heartrate());
        tokio::spawn(async move {
            let wire = Wire {
                sender: &sender,
                pacemaker: Some(pacemaker.as_ref()),
            };

            let Err(err) = shared
                .event_loop(&mut receiver, &wire, &mut death, read_limit)
                .await
            else {
                debug!(epoch, "event loop stopped");
                return;
            };

            if err.is_remote_request() {
                info!(epoch, reason = %err, "gateway asked to reconnect");
            } else {
                warn!(epoch, error = %err, "gateway connection lost");
            }
            (shared.error_log)(&err);
            // Closing joins this task, so recovery must run on another one.
            tokio::spawn(shared.recover(epoch, err));
        })
    }

    async fn event_loop(
        &self,
        receiver: &mut WsReceiver,
        wire: &Wire<'_>,
        death: &mut oneshot::Receiver<Result<(), GatewayError>>,
        read_limit: Option<Duration>,
    ) -> Result<(), GatewayError> {
        loop {
            let frame = tokio::select! {
                died = &mut *death => {
                    // A dropped sender means the pacemaker task itself went away.
                    return died.unwrap_or(Ok(()));
                }
                frame = self.read_frame(receiver, read_limit) => frame,
            };

            let frame = match frame {
                Ok(frame) => frame,
                Err(GatewayError::Protocol(e)) => {
                    (self.error_log)(&GatewayError::Protocol(e));
                    continue;
                }
                Err(e) => return Err(e),
            };

            match self.dispatcher.handle_event(frame, wire).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Reconnect(err)) => return Err(err),
                Err(e) => (self.error_log)(&e),
            }
        }
    }

    async fn read_frame(
        &self,
        receiver: &mut WsReceiver,
        limit: Option<Duration>,
    ) -> Result<Frame, GatewayError> {
        let Some(limit) = limit else {
            return self.dispatcher.next_frame(receiver).await;
        };
        timeout(limit, self.dispatcher.next_frame(receiver))
            .await
            .map_err(|_| GatewayError::Timeout {
                stage: "read",
                after: limit,
            })?
    }

    /// Replace the connection numbered `epoch` after it failed with `cause`.
    ///
    /// Does nothing if that connection was already closed or replaced.
    async fn recover(self: Arc<Self>, epoch: u64, cause: GatewayError) {
        let generation = {
            let mut slot = self.link.lock().await;
            if slot.as_ref().map(|link| link.epoch) != Some(epoch) {
                debug!(epoch, "connection already closed or replaced, not reconnecting");
                return;
            }
            if let Err(e) = self.teardown(&mut slot, Some(&cause)).await {
                debug!(error = %e, "close before reconnect failed");
            }
            self.closes.load(Ordering::SeqCst)
        };
        self.reopen(generation).await;
    }

    /// Retry opening until it works, the policy gives up, or a user close
    /// moves `closes` past `generation`.
    async fn reopen(self: &Arc<Self>, generation: u64) {
        let result = retry_with_backoff(
            &self.config.reconnect,
            || self.open_if_closed(generation),
            |attempt, err| {
                warn!(attempt, error = %err, "failed to open gateway");
                (self.error_log)(err);
            },
        )
        .await;

        match result {
            Ok(true) => info!("gateway reconnected"),
            Ok(false) => debug!("gateway closed while reconnecting, giving up"),
            Err((attempts, _)) => (self.error_log)(&GatewayError::MaxAttempts(attempts)),
        }
    }

    /// Returns `false` without dialing once the gateway was closed by the user.
    async fn open_if_closed(self: &Arc<Self>, generation: u64) -> Result<bool, GatewayError> {
        let mut slot = self.link.lock().await;
        if self.closes.load(Ordering::SeqCst) != generation {
            return Ok(false);
        }
        if slot.is_some() {
            return Ok(true);
        }
        self.open_link(&mut slot).await.map(|()| true)
    }

    async fn teardown(
        &self,
        slot: &mut Option<Link>,
        cause: Option<&GatewayError>,
    ) -> Result<(), GatewayError> {
        let Some(link) = slot.take() else {
            debug!("gateway already closed");
            (self.after_close)(cause);
            return Ok(());
        };

        let Link {
            epoch,
            sender,
            pacemaker,
            event_loop,
        } = link;
        self.state.store(ConnectionState::Closing);
        debug!(epoch, "closing gateway");

        if let Some(pacer) = &pacemaker {
            pacer.stop();
        }
        let (_, loop_result) = tokio::join!(
            async move {
                if let Some(pacer) = pacemaker {
                    pacer.join().await;
                }
            },
            async move {
                match event_loop {
                    Some(handle) => handle.await,
                    None => Ok(()),
                }
            },
        );
        if let Err(e) = loop_result {
            warn!(epoch, error = %e, "event loop task failed");
        }

        let closed = sender.close().await;
        self.state.store(ConnectionState::Idle);

        match (cause, &closed) {
            (Some(cause), _) => (self.after_close)(Some(cause)),
            (None, Err(e)) => (self.after_close)(Some(e)),
            (None, Ok(())) => (self.after_close)(None),
        }
        info!(epoch, "gateway closed");
        closed
    }
}
