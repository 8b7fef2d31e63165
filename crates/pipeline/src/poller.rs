//! Per-job status polling.
//!
//! [`JobPoller`] owns at most one polling loop.  Starting a poll for a new
//! job cancels the previous loop first, and dropping the poller cancels
//! whatever is running.  Each loop fetches the job status on a fixed
//! interval, publishes the result on a [`broadcast`] channel, and exits on
//! its own once the job is terminal (or, for character jobs, once the
//! image artifact shows up).
//!
//! A failed or hung fetch is a missed tick: it is logged and reported as
//! [`PollEvent::FetchFailed`], and the next tick fires on schedule.

use std::sync::Arc;
use std::time::Duration;

use cartoon_client::JobService;
use cartoon_core::{JobId, JobKind, JobSnapshot};
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::PollIntervals;
use crate::events::{PollEvent, StopReason};

/// Broadcast channel capacity for poll events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long [`JobPoller::shutdown`] waits for the loop to exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of the poller.
///
/// `Stopped` is absorbing until [`JobPoller::start`] begins a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Polling,
    Stopped,
}

/// Owner of the single active polling loop.
pub struct JobPoller {
    service: Arc<dyn JobService>,
    intervals: PollIntervals,
    event_tx: broadcast::Sender<PollEvent>,
    next_session: u64,
    active: Option<ActivePoll>,
}

/// Bookkeeping for the current (or most recent) loop.
struct ActivePoll {
    session: u64,
    job_id: JobId,
    kind: JobKind,
    cancel: CancellationToken,
    state: watch::Receiver<PollerState>,
    task: tokio::task::JoinHandle<()>,
}

impl JobPoller {
    pub fn new(service: Arc<dyn JobService>, intervals: PollIntervals) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            service,
            intervals,
            event_tx,
            next_session: 1,
            active: None,
        }
    }

    /// Subscribe to events from every loop this poller runs.
    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
        self.event_tx.subscribe()
    }

    pub fn intervals(&self) -> PollIntervals {
        self.intervals
    }

    /// Begin polling `job_id`, tearing down any previous loop first.
    ///
    /// Returns the new session number.  Must be called from within a
    /// Tokio runtime.
    pub fn start(&mut self, job_id: JobId, kind: JobKind) -> u64 {
        self.stop();

        let session = self.next_session;
        self.next_session += 1;

        let interval = self.intervals.for_kind(kind);
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(PollerState::Polling);

        let poll_loop = PollLoop {
            service: Arc::clone(&self.service),
            job_id: job_id.clone(),
            kind,
            session,
            interval,
            event_tx: self.event_tx.clone(),
            state_tx,
            cancel: cancel.clone(),
        };

        tracing::info!(
            job_id = %job_id,
            %kind,
            session,
            interval_ms = interval.as_millis() as u64,
            "Starting job poller",
        );

        let task = tokio::spawn(poll_loop.run());

        self.active = Some(ActivePoll {
            session,
            job_id,
            kind,
            cancel,
            state: state_rx,
            task,
        });

        session
    }

    /// Tear down the current loop, if any.
    ///
    /// A response that arrives after this call is dropped by the loop and
    /// never published.
    pub fn stop(&mut self) {
        if let Some(active) = &self.active {
            if !active.cancel.is_cancelled() && *active.state.borrow() == PollerState::Polling {
                tracing::info!(
                    job_id = %active.job_id,
                    kind = %active.kind,
                    session = active.session,
                    "Tearing down job poller",
                );
            }
            active.cancel.cancel();
        }
    }

    /// Cancel the current loop and wait (bounded) for it to exit.
    pub async fn shutdown(&mut self) {
        self.stop();
        if let Some(active) = self.active.as_mut() {
            if active.task.is_finished() {
                return;
            }
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut active.task)
                .await
                .is_err()
            {
                tracing::warn!(job_id = %active.job_id, "Poller did not exit in time");
                active.task.abort();
            }
        }
    }

    pub fn state(&self) -> PollerState {
        match &self.active {
            None => PollerState::Idle,
            Some(active) if active.cancel.is_cancelled() => PollerState::Stopped,
            Some(active) => *active.state.borrow(),
        }
    }

    pub fn is_polling(&self) -> bool {
        self.state() == PollerState::Polling
    }

    /// Session number of the current loop.
    pub fn session(&self) -> Option<u64> {
        self.active.as_ref().map(|a| a.session)
    }

    /// Job id of the current loop while it is polling.
    pub fn active_job(&self) -> Option<&JobId> {
        self.active
            .as_ref()
            .filter(|_| self.is_polling())
            .map(|a| &a.job_id)
    }

    /// Wait until the current loop has stopped on its own or been torn
    /// down.  Returns immediately when idle.
    pub async fn stopped(&self) {
        let Some(active) = &self.active else {
            return;
        };
        let mut state = active.state.clone();
        tokio::select! {
            _ = active.cancel.cancelled() => {}
            _ = state.wait_for(|s| *s == PollerState::Stopped) => {}
        }
    }
}

impl Drop for JobPoller {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            active.cancel.cancel();
        }
    }
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

struct PollLoop {
    service: Arc<dyn JobService>,
    job_id: JobId,
    kind: JobKind,
    session: u64,
    interval: Duration,
    event_tx: broadcast::Sender<PollEvent>,
    state_tx: watch::Sender<PollerState>,
    cancel: CancellationToken,
}

impl PollLoop {
    async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tick = 0u64;

        let reason = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break StopReason::Cancelled,
                _ = ticker.tick() => {}
            }
            tick += 1;

            // A fetch that outlives the interval counts as a missed tick.
            let fetched = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break StopReason::Cancelled,
                result = tokio::time::timeout(self.interval, self.service.fetch_status(&self.job_id)) => result,
            };

            match fetched {
                Ok(Ok(snapshot)) => {
                    if let Some(reason) = self.publish_snapshot(tick, snapshot) {
                        break reason;
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!(
                        job_id = %self.job_id,
                        tick,
                        error = %e,
                        "Status fetch failed, retrying next tick",
                    );
                    self.publish_failure(tick, e.to_string());
                }
                Err(_) => {
                    tracing::warn!(
                        job_id = %self.job_id,
                        tick,
                        timeout_ms = self.interval.as_millis() as u64,
                        "Status fetch timed out, retrying next tick",
                    );
                    self.publish_failure(
                        tick,
                        format!("status fetch timed out after {:?}", self.interval),
                    );
                }
            }
        };

        let _ = self.event_tx.send(PollEvent::Stopped {
            session: self.session,
            job_id: self.job_id.clone(),
            kind: self.kind,
            reason,
        });
        self.state_tx.send_replace(PollerState::Stopped);

        tracing::info!(
            job_id = %self.job_id,
            session = self.session,
            ticks = tick,
            ?reason,
            "Job poller stopped",
        );
    }

    /// Publish a snapshot; returns the stop reason when it ends polling.
    fn publish_snapshot(&self, tick: u64, snapshot: JobSnapshot) -> Option<StopReason> {
        tracing::debug!(
            job_id = %self.job_id,
            tick,
            status = %snapshot.status_label,
            progress = snapshot.progress_current,
            "Status snapshot",
        );

        let reason = if snapshot.is_terminal() {
            Some(StopReason::Terminal(snapshot.status))
        } else if snapshot.ends_polling(self.kind) {
            Some(StopReason::CharacterReady)
        } else {
            None
        };

        // Ignore the SendError; it only means there are zero receivers.
        let _ = self.event_tx.send(PollEvent::Snapshot {
            session: self.session,
            job_id: self.job_id.clone(),
            kind: self.kind,
            tick,
            snapshot,
            received_at: chrono::Utc::now(),
        });

        reason
    }

    fn publish_failure(&self, tick: u64, error: String) {
        let _ = self.event_tx.send(PollEvent::FetchFailed {
            session: self.session,
            job_id: self.job_id.clone(),
            kind: self.kind,
            tick,
            error,
        });
    }
}
