//! Single clock for every outbound device request
//!
//! One task ticks every polling interval. A tick polls (when polling is
//! enabled) and, every Nth tick, renews the broadcast lease. The first failure
//! stops the task and is kept for the consumer to re-raise.

use crate::{BroadcastTarget, ErrorSlot, IngestError, IngestResult, PollTarget};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, warn};
use wll_core::format_timestamp;

pub const POLL_INTERVAL_MIN: Duration = Duration::from_secs(10);
pub const POLL_INTERVAL_MAX: Duration = Duration::from_secs(300);

/// How often the broadcast lease is renewed
pub const RENEWAL_PERIOD: Duration = Duration::from_secs(1200);

/// Lease duration requested on each renewal; outlives the renewal period
pub const LEASE_DURATION: Duration = Duration::from_secs(1200 + 300);

pub const CANCEL_TIMEOUT: Duration = Duration::from_secs(30);

/// Tick counting for lease renewal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickState {
    renewal_every: u64,
    ticks_since_renewal: u64,
}

impl TickState {
    pub fn new(polling_interval: Duration) -> Self {
        let every = (RENEWAL_PERIOD.as_secs_f64() / polling_interval.as_secs_f64()).floor() as u64;
        let renewal_every = every.max(1);
        Self {
            renewal_every,
            // first tick renews
            ticks_since_renewal: renewal_every,
        }
    }

    /// Advance by one tick; true if this tick renews the lease
    pub fn tick(&mut self) -> bool {
        let renew = self.ticks_since_renewal >= self.renewal_every;
        if renew {
            self.ticks_since_renewal = 0;
        }
        self.ticks_since_renewal += 1;
        renew
    }

    pub fn renewal_every(&self) -> u64 {
        self.renewal_every
    }
}

pub struct Scheduler {
    polling_interval: Duration,
    error: ErrorSlot,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn validate_interval(polling_interval: Duration) -> IngestResult<()> {
        if polling_interval < POLL_INTERVAL_MIN || polling_interval > POLL_INTERVAL_MAX {
            return Err(IngestError::ConfigurationError(format!(
                "polling interval must be between {}s and {}s, got {:?}",
                POLL_INTERVAL_MIN.as_secs(),
                POLL_INTERVAL_MAX.as_secs(),
                polling_interval
            )));
        }
        Ok(())
    }

    /// Start ticking; the first tick runs immediately
    ///
    /// Without a poll target the scheduler only renews the lease and ticks
    /// once per renewal period.
    pub fn start(
        polling_interval: Duration,
        poll: Option<Arc<dyn PollTarget>>,
        broadcast: Arc<dyn BroadcastTarget>,
        data_event: Arc<Notify>,
    ) -> IngestResult<Self> {
        Self::validate_interval(polling_interval)?;
        let polling_interval = if poll.is_some() {
            polling_interval
        } else {
            RENEWAL_PERIOD
        };

        let state = TickState::new(polling_interval);
        debug!(
            "Scheduler ticks every {:?}, broadcast renewal every {} ticks",
            polling_interval,
            state.renewal_every()
        );

        let error = ErrorSlot::new();
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run(
            polling_interval,
            state,
            poll,
            broadcast,
            error.clone(),
            data_event,
            stop_rx,
        ));

        Ok(Self {
            polling_interval,
            error,
            stop: Some(stop_tx),
            task: Some(task),
        })
    }

    pub fn polling_interval(&self) -> Duration {
        self.polling_interval
    }

    pub fn error_slot(&self) -> ErrorSlot {
        self.error.clone()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_set()
    }

    pub fn raise_error(&self) -> IngestResult<()> {
        self.error.raise()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop ticking; safe to call more than once
    pub async fn cancel(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let Some(mut task) = self.task.take() else {
            return;
        };

        if timeout(CANCEL_TIMEOUT, &mut task).await.is_err() {
            warn!("Scheduler did not stop within {:?}, aborting", CANCEL_TIMEOUT);
            task.abort();
        }
        debug!("Scheduler cancelled");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(
    polling_interval: Duration,
    mut state: TickState,
    poll: Option<Arc<dyn PollTarget>>,
    broadcast: Arc<dyn BroadcastTarget>,
    error: ErrorSlot,
    data_event: Arc<Notify>,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        let result = tokio::select! {
            _ = &mut stop => break,
            r = tick(&mut state, poll.as_deref(), broadcast.as_ref()) => r,
        };

        if let Err(e) = result {
            error!("Error in scheduler tick, not rescheduling: {}", e);
            error.set(e);
            data_event.notify_one();
            break;
        }

        let next = SystemTime::now() + polling_interval;
        if let Ok(next) = next.duration_since(UNIX_EPOCH) {
            debug!("Next scheduler tick at {}", format_timestamp(next.as_secs() as i64));
        }

        tokio::select! {
            _ = &mut stop => break,
            _ = sleep(polling_interval) => {}
        }
    }
    debug!("Scheduler stopped");
}

async fn tick(
    state: &mut TickState,
    poll: Option<&dyn PollTarget>,
    broadcast: &dyn BroadcastTarget,
) -> IngestResult<()> {
    if let Some(poll) = poll {
        poll.poll().await?;
    }
    if state.tick() {
        debug!("Renewing broadcast lease for {:?}", LEASE_DURATION);
        broadcast.refresh_broadcast(LEASE_DURATION).await?;
    }
    Ok(())
}
