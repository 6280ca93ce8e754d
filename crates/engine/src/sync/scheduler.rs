//! Debounced, single-flight sync scheduler.
//!
//! The scheduler runs as its own tokio task and owns the baseline, the
//! pending local snapshot and the debounce deadline. [`SyncHandle`] is the
//! cloneable front end; it only enqueues commands.
//!
//! ```text
//! Idle -> PendingSync -> Syncing -> Idle
//!                        Syncing -> SyncFailed -> PendingSync   (transient)
//!                        Syncing -> SyncFailed                  (permanent)
//! ```
//!
//! Passes execute inline in the task loop, so a second pass cannot start
//! until the first returns. Each accepted change bumps `generation`; a pass
//! records the generation it pushed, and once it finishes the queued
//! commands are drained so changes made during the pass re-arm the timer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cart_sync_core::{Cart, SyncStatus};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, instrument, warn};

use super::{Baseline, PassReport, SyncSnapshot, plan_pass};
use crate::auth::AuthSession;
use crate::client::CartService;
use crate::config::SyncConfig;
use crate::error::{SyncError, capture};
use crate::store::CartListener;

enum Command {
    /// Local cart changed.
    Signal(Cart),
    /// Replace the baseline and open the gate; optionally push `local`
    /// right away.
    Rebase { baseline: Cart, local: Option<Cart> },
    /// Open the gate with an unknown baseline and push `local`.
    Resume(Cart),
    /// Session ended: drop baseline and pending work, close the gate.
    Reset,
    /// Run a pass now if anything is pending.
    Flush(oneshot::Sender<Result<PassReport, SyncError>>),
    Shutdown,
}

// =============================================================================
// SyncHandle
// =============================================================================

/// Front end of a running scheduler.
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<SyncSnapshot>,
    sent: Arc<AtomicU64>,
}

impl SyncHandle {
    fn send(&self, command: Command) -> Result<u64, SyncError> {
        // Count before sending so the task can never report a command as seen
        // before it has been counted here.
        let seq = self.sent.fetch_add(1, Ordering::SeqCst) + 1;
        self.tx
            .send(command)
            .map_err(|_| SyncError::SchedulerStopped)?;
        Ok(seq)
    }

    /// Report a local cart change. Ignored while anonymous, held until the
    /// gate opens.
    pub fn notify(&self, cart: Cart) {
        if self.send(Command::Signal(cart)).is_err() {
            warn!("Sync scheduler stopped, dropping cart change");
        }
    }

    /// Replace the baseline and start syncing. With `Some(local)`, push it
    /// immediately.
    pub fn rebase(&self, baseline: Cart, local: Option<Cart>) {
        if self.send(Command::Rebase { baseline, local }).is_err() {
            warn!("Sync scheduler stopped, dropping rebase");
        }
    }

    /// Start syncing a session reconciled by an earlier process. The first
    /// pass fetches the server cart and pushes `local` over it.
    pub fn resume(&self, local: Cart) {
        if self.send(Command::Resume(local)).is_err() {
            warn!("Sync scheduler stopped, dropping resume");
        }
    }

    /// Forget the baseline and pending work (sign-out).
    pub fn reset(&self) {
        if self.send(Command::Reset).is_err() {
            warn!("Sync scheduler stopped, dropping reset");
        }
    }

    /// Run a pass now if changes are pending, and wait for its outcome.
    ///
    /// # Errors
    ///
    /// Returns the pass error, or `SchedulerStopped` if the task has exited.
    pub async fn flush(&self) -> Result<PassReport, SyncError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Flush(reply))?;
        response.await.map_err(|_| SyncError::SchedulerStopped)?
    }

    /// Latest published state.
    #[must_use]
    pub fn snapshot(&self) -> SyncSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Current scheduling state.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.snapshot.borrow().status
    }

    /// Wait until every command sent so far is processed and the scheduler
    /// is idle. While the service keeps failing this does not return.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerStopped` if the task exits first.
    pub async fn wait_idle(&self) -> Result<SyncSnapshot, SyncError> {
        let target = self.sent.load(Ordering::SeqCst);
        let mut rx = self.snapshot.clone();
        let snapshot = rx
            .wait_for(|s| s.commands_seen >= target && s.status == SyncStatus::Idle)
            .await
            .map_err(|_| SyncError::SchedulerStopped)?;
        Ok(snapshot.clone())
    }

    /// Stop the task after it finishes any running pass.
    pub fn shutdown(&self) {
        let _ = self.send(Command::Shutdown);
    }
}

impl CartListener for SyncHandle {
    fn cart_changed(&self, cart: &Cart) {
        self.notify(cart.clone());
    }
}

// =============================================================================
// SyncScheduler
// =============================================================================

/// The scheduler task's state.
pub struct SyncScheduler<S: CartService> {
    service: Arc<S>,
    auth: Arc<dyn AuthSession>,
    config: SyncConfig,
    baseline: Baseline,
    pending: Option<Cart>,
    generation: u64,
    synced_generation: u64,
    deadline: Option<Instant>,
    passes: u64,
    failures: u64,
    last_error: Option<String>,
    reconciled: bool,
    commands_seen: u64,
    status: SyncStatus,
    publisher: watch::Sender<SyncSnapshot>,
}

impl<S: CartService + 'static> SyncScheduler<S> {
    /// Spawn the scheduler on the current tokio runtime.
    #[must_use]
    pub fn spawn(service: Arc<S>, auth: Arc<dyn AuthSession>, config: SyncConfig) -> SyncHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (publisher, snapshot) = watch::channel(SyncSnapshot::default());

        let scheduler = Self {
            service,
            auth,
            config,
            baseline: Baseline::Stale,
            pending: None,
            generation: 0,
            synced_generation: 0,
            deadline: None,
            passes: 0,
            failures: 0,
            last_error: None,
            reconciled: false,
            commands_seen: 0,
            status: SyncStatus::Idle,
            publisher,
        };
        tokio::spawn(scheduler.run(rx));

        SyncHandle {
            tx,
            snapshot,
            sent: Arc::new(AtomicU64::new(0)),
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        debug!(debounce_ms = self.config.debounce.as_millis(), "Sync scheduler started");
        loop {
            let command = match self.deadline {
                Some(deadline) => {
                    tokio::select! {
                        command = rx.recv() => command,
                        () = sleep_until(deadline) => {
                            self.deadline = None;
                            let _ = self.run_pass().await;
                            if !self.drain(&mut rx).await {
                                break;
                            }
                            continue;
                        }
                    }
                }
                None => rx.recv().await,
            };

            let Some(command) = command else { break };
            if !self.handle(command).await {
                break;
            }
            if !self.drain(&mut rx).await {
                break;
            }
        }
        debug!("Sync scheduler stopped");
    }

    /// Process commands queued while the task was busy. Returns `false` on
    /// shutdown.
    async fn drain(&mut self, rx: &mut mpsc::UnboundedReceiver<Command>) -> bool {
        while let Ok(command) = rx.try_recv() {
            if !self.handle(command).await {
                return false;
            }
        }
        // Changes newer than the last push must be pushed
        if self.reconciled
            && self.generation > self.synced_generation
            && self.pending.is_some()
            && self.deadline.is_none()
            && self.status != SyncStatus::SyncFailed
        {
            self.arm(self.config.debounce);
        }
        true
    }

    /// Apply one command. Returns `false` on shutdown.
    async fn handle(&mut self, command: Command) -> bool {
        self.commands_seen += 1;
        match command {
            Command::Signal(cart) => {
                if !self.auth.is_authenticated() {
                    debug!("Anonymous session, local change not synced");
                } else {
                    self.generation += 1;
                    self.pending = Some(cart);
                    if self.reconciled {
                        self.arm(self.config.debounce);
                    } else {
                        debug!("Awaiting sign-in reconciliation, holding local change");
                    }
                }
            }
            Command::Rebase { baseline, local } => {
                self.reconciled = true;
                self.baseline = Baseline::Known(baseline);
                match local {
                    Some(cart) => {
                        self.generation += 1;
                        self.pending = Some(cart);
                        self.arm(Duration::ZERO);
                    }
                    None => {
                        self.pending = None;
                        self.deadline = None;
                        self.synced_generation = self.generation;
                        self.status = SyncStatus::Idle;
                    }
                }
            }
            Command::Resume(cart) => {
                self.reconciled = true;
                self.baseline = Baseline::Stale;
                self.generation += 1;
                self.pending = Some(cart);
                self.arm(Duration::ZERO);
            }
            Command::Reset => {
                self.reconciled = false;
                self.baseline = Baseline::Stale;
                self.pending = None;
                self.deadline = None;
                self.synced_generation = self.generation;
                self.last_error = None;
                self.status = SyncStatus::Idle;
            }
            Command::Flush(reply) => {
                self.deadline = None;
                let result = self.run_pass().await;
                let _ = reply.send(result);
            }
            Command::Shutdown => {
                self.publish();
                return false;
            }
        }
        self.publish();
        true
    }

    /// (Re)start the timer: `PendingSync` until it fires.
    fn arm(&mut self, delay: Duration) {
        self.deadline = Some(Instant::now() + delay);
        self.status = SyncStatus::PendingSync;
    }

    /// Run one pass over the pending snapshot.
    #[instrument(skip(self), fields(generation = self.generation))]
    async fn run_pass(&mut self) -> Result<PassReport, SyncError> {
        let Some(local) = self.pending.clone() else {
            self.status = SyncStatus::Idle;
            self.publish();
            return Ok(PassReport::default());
        };
        if !self.auth.is_authenticated() {
            debug!("Session ended before pass, dropping pending changes");
            self.pending = None;
            self.status = SyncStatus::Idle;
            self.publish();
            return Ok(PassReport::default());
        }
        if !self.reconciled {
            debug!("Sign-in reconciliation has not run, holding pass");
            self.status = SyncStatus::Idle;
            self.publish();
            return Ok(PassReport::default());
        }

        let generation = self.generation;
        self.status = SyncStatus::Syncing;
        self.publish();

        let result = self.push(&local).await;
        self.passes += 1;

        match &result {
            Ok(report) => {
                info!(calls = report.calls, "Sync pass complete");
                self.baseline = Baseline::Known(local);
                self.synced_generation = generation;
                if self.generation == generation {
                    self.pending = None;
                }
                self.last_error = None;
                self.status = SyncStatus::Idle;
                self.publish();
            }
            Err(err) => {
                capture(err, "Sync pass failed");
                self.baseline = Baseline::Stale;
                self.failures += 1;
                self.last_error = Some(err.to_string());
                self.status = SyncStatus::SyncFailed;
                self.publish();
                if err.is_transient() {
                    let delay = err
                        .retry_after()
                        .map_or(self.config.retry_delay, |wait| wait.max(self.config.retry_delay));
                    debug!(retry_ms = delay.as_millis(), "Retrying sync pass");
                    self.arm(delay);
                    self.publish();
                } else {
                    warn!(error = %err, "Sync pass failed permanently, waiting for next change");
                }
            }
        }
        result
    }

    /// Bring the server from the baseline to `local`.
    async fn push(&mut self, local: &Cart) -> Result<PassReport, SyncError> {
        let refreshed_baseline = matches!(self.baseline, Baseline::Stale);
        if refreshed_baseline {
            debug!("Baseline stale, fetching server cart");
            let server = self.service.view().await?;
            self.baseline = Baseline::Known(server);
        }
        let baseline = self.baseline.known().cloned().unwrap_or_default();

        let ops = plan_pass(local, &baseline);
        debug!(calls = ops.len(), "Planned sync pass");

        for (applied, op) in ops.iter().enumerate() {
            if let Err(source) = op.apply(self.service.as_ref()).await {
                warn!(op = %op, error = %source, "Remote cart call failed");
                return Err(if applied == 0 {
                    SyncError::Client(source)
                } else {
                    SyncError::PartialPass {
                        applied,
                        planned: ops.len(),
                        source,
                    }
                });
            }
        }

        Ok(PassReport {
            calls: ops.len(),
            refreshed_baseline,
        })
    }

    fn publish(&self) {
        let snapshot = SyncSnapshot {
            status: self.status,
            baseline: self.baseline.clone(),
            generation: self.generation,
            synced_generation: self.synced_generation,
            passes: self.passes,
            failures: self.failures,
            last_error: self.last_error.clone(),
            reconciled: self.reconciled,
            commands_seen: self.commands_seen,
        };
        self.publisher.send_replace(snapshot);
    }
}
