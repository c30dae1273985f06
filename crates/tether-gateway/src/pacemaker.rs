//! Heartbeat scheduling and liveness detection.
//!
//! The pacemaker sends a heartbeat once per heartrate and remembers when it
//! last sent one and when the server last acknowledged one. If the gap
//! between the two grows past two heartrates the connection is declared
//! dead and the run loop ends with [`GatewayError::Dead`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::GatewayError;

/// Whether a connection with these stamps has stopped answering heartbeats.
///
/// Both stamps must exist; a pacemaker that has never sent cannot be dead.
#[must_use]
pub fn flatlined(sent: Option<Instant>, echo: Option<Instant>, heartrate: Duration) -> bool {
    match (sent, echo) {
        (Some(sent), Some(echo)) => sent.saturating_duration_since(echo) > heartrate * 2,
        _ => false,
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Stamps {
    sent: Option<Instant>,
    echo: Option<Instant>,
}

/// Heartbeat timer with liveness tracking.
#[derive(Debug)]
pub struct Pacemaker {
    heartrate: Duration,
    stamps: Mutex<Stamps>,
}

impl Pacemaker {
    /// Create a pacemaker beating every `heartrate`.
    #[must_use]
    pub fn new(heartrate: Duration) -> Self {
        Self {
            heartrate,
            stamps: Mutex::new(Stamps::default()),
        }
    }

    /// The configured interval.
    #[must_use]
    pub const fn heartrate(&self) -> Duration {
        self.heartrate
    }

    /// Record that the server acknowledged a heartbeat.
    pub fn echo(&self) {
        self.stamps.lock().echo = Some(Instant::now());
    }

    fn mark_sent(&self) {
        self.stamps.lock().sent = Some(Instant::now());
    }

    /// Whether the connection is considered dead right now.
    #[must_use]
    pub fn dead(&self) -> bool {
        let stamps = *self.stamps.lock();
        flatlined(stamps.sent, stamps.echo, self.heartrate)
    }

    /// Beat until `stop` fires, `pace` fails, or the server stops answering.
    ///
    /// The first heartbeat goes out immediately. An echo is stamped before
    /// the loop so the first liveness check has a baseline.
    pub async fn run<F, Fut>(&self, mut pace: F, stop: CancellationToken) -> Result<(), GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), GatewayError>>,
    {
        self.echo();

        let mut tick = interval_at(Instant::now() + self.heartrate, self.heartrate);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            pace().await?;
            self.mark_sent();

            if self.dead() {
                return Err(GatewayError::Dead);
            }

            tokio::select! {
                () = stop.cancelled() => return Ok(()),
                _ = tick.tick() => {}
            }
        }
    }

    /// Spawn [`Self::run`] on its own task.
    ///
    /// The returned receiver resolves with the run result once the loop
    /// ends, whether from death, a pace error, or [`PacemakerHandle::stop`].
    pub fn start<F, Fut>(
        self: &Arc<Self>,
        pace: F,
    ) -> (PacemakerHandle, oneshot::Receiver<Result<(), GatewayError>>)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), GatewayError>> + Send + 'static,
    {
        let stop = CancellationToken::new();
        let (death_tx, death_rx) = oneshot::channel();

        let pacemaker = Arc::clone(self);
        let token = stop.clone();
        let task = tokio::spawn(async move {
            let result = pacemaker.run(pace, token).await;
            debug!(?result, "pacemaker returned");
            // Nobody is listening once the dispatch loop has already exited.
            let _ = death_tx.send(result);
        });

        (PacemakerHandle { stop, task }, death_rx)
    }
}

/// Control over a spawned pacemaker task.
#[derive(Debug)]
pub struct PacemakerHandle {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl PacemakerHandle {
    /// Ask the loop to stop. Safe to call more than once.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Wait for the task to finish.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "pacemaker task failed");
        }
    }
}
