//! Fixed-interval snapshot publishing.
//!
//! A ticker thread fires every interval. If no publish is in flight the tick
//! hands work to the publisher thread, which snapshots the configured
//! variables and passes the snapshot to a [`PublishBridge`]. Ticks that fire
//! while a publish is still running are dropped, never queued.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use strum::Display;
use tracing::{debug, info, warn};

use crate::Builder;
use crate::error::{Error, Result, TransportError};
use crate::snapshot::PublishSnapshot;
use crate::space::AddressSpace;

pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::from_millis(1000);

/// Hands snapshots to a pub/sub transport.
pub trait PublishBridge: Send + Sync + 'static {
    fn publish(&self, snapshot: &PublishSnapshot) -> std::result::Result<(), TransportError>;
}

impl<F> PublishBridge for F
where
    F: Fn(&PublishSnapshot) -> std::result::Result<(), TransportError> + Send + Sync + 'static,
{
    fn publish(&self, snapshot: &PublishSnapshot) -> std::result::Result<(), TransportError> {
        self(snapshot)
    }
}

/// Bridge delivering snapshots to an in-process `flume` receiver.
pub struct ChannelBridge {
    tx: flume::Sender<PublishSnapshot>,
}

impl ChannelBridge {
    pub fn unbounded() -> (Self, flume::Receiver<PublishSnapshot>) {
        let (tx, rx) = flume::unbounded();
        (Self { tx }, rx)
    }

    /// A full channel is reported as an unavailable transport.
    pub fn bounded(capacity: usize) -> (Self, flume::Receiver<PublishSnapshot>) {
        let (tx, rx) = flume::bounded(capacity);
        (Self { tx }, rx)
    }
}

impl PublishBridge for ChannelBridge {
    fn publish(&self, snapshot: &PublishSnapshot) -> std::result::Result<(), TransportError> {
        self.tx.try_send(snapshot.clone()).map_err(|e| match e {
            flume::TrySendError::Full(_) => TransportError::Unavailable("channel full".into()),
            flume::TrySendError::Disconnected(_) => {
                TransportError::Unavailable("receiver dropped".into())
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[repr(u8)]
pub enum PublishState {
    Idle = 0,
    Publishing = 1,
}

impl PublishState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => PublishState::Publishing,
            _ => PublishState::Idle,
        }
    }
}

/// Counters since the scheduler started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishStats {
    pub ticks: u64,
    pub published: u64,
    /// Ticks skipped because a publish was in flight.
    pub dropped: u64,
    /// Publishes the bridge rejected.
    pub failed: u64,
}

struct Shared {
    space: Arc<AddressSpace>,
    variables: Vec<String>,
    bridge: Box<dyn PublishBridge>,
    state: AtomicU8,
    ticks: AtomicU64,
    published: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

impl Shared {
    fn tick(&self, work_tx: &flume::Sender<()>) -> bool {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        let claimed = self
            .state
            .compare_exchange(
                PublishState::Idle as u8,
                PublishState::Publishing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if !claimed {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!("[PUBLISH] Tick dropped: publish in flight");
            return true;
        }
        work_tx.send(()).is_ok()
    }

    #[tracing::instrument(name = "publish_cycle", skip(self), fields(variables = self.variables.len()))]
    fn publish_cycle(&self) {
        match self.space.variables().snapshot(self.variables.as_slice()) {
            Ok(snapshot) => {
                let outcome =
                    panic::catch_unwind(AssertUnwindSafe(|| self.bridge.publish(&snapshot)));
                match outcome {
                    Ok(Ok(())) => {
                        self.published.fetch_add(1, Ordering::Relaxed);
                        debug!("[PUBLISH] Published snapshot seq={}", snapshot.sequence());
                    }
                    Ok(Err(e)) => {
                        self.failed.fetch_add(1, Ordering::Relaxed);
                        warn!("[PUBLISH] Bridge rejected snapshot: {}", e);
                    }
                    Err(payload) => {
                        self.failed.fetch_add(1, Ordering::Relaxed);
                        warn!("[PUBLISH] Bridge panicked: {}", panic_message(payload.as_ref()));
                    }
                }
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!("[PUBLISH] Snapshot failed: {}", e);
            }
        }
        self.state
            .store(PublishState::Idle as u8, Ordering::Release);
    }

    fn stats(&self) -> PublishStats {
        PublishStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Deadline of the tick after the one due at `due`. Ticks missed while the
/// ticker was stalled are skipped, not replayed.
fn next_deadline(due: Instant, interval: Duration, now: Instant) -> Instant {
    let next = due + interval;
    if next <= now { now + interval } else { next }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

/// Running publish loop. Stops on [`PublishScheduler::stop`] or drop.
pub struct PublishScheduler {
    shared: Arc<Shared>,
    interval: Duration,
    stop_tx: Option<flume::Sender<()>>,
    ticker: Option<JoinHandle<()>>,
    publisher: Option<JoinHandle<()>>,
}

impl PublishScheduler {
    pub fn builder<B: PublishBridge>(space: Arc<AddressSpace>, bridge: B) -> PublishSchedulerBuilder {
        PublishSchedulerBuilder {
            space,
            bridge: Box::new(bridge),
            interval: DEFAULT_PUBLISH_INTERVAL,
            variables: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn variables(&self) -> &[String] {
        &self.shared.variables
    }

    pub fn state(&self) -> PublishState {
        PublishState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn stats(&self) -> PublishStats {
        self.shared.stats()
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Stop ticking and wait for an in-flight publish to finish.
    pub fn stop(mut self) -> PublishStats {
        self.shutdown();
        self.shared.stats()
    }

    fn shutdown(&mut self) {
        // Disconnecting the stop channel wakes the ticker immediately.
        self.stop_tx.take();
        if let Some(ticker) = self.ticker.take() {
            let _ = ticker.join();
        }
        if let Some(publisher) = self.publisher.take() {
            if publisher.join().is_err() {
                warn!("[PUBLISH] Publisher thread panicked");
            }
            let stats = self.shared.stats();
            info!(
                "[PUBLISH] Scheduler stopped: ticks={}, published={}, dropped={}, failed={}",
                stats.ticks, stats.published, stats.dropped, stats.failed
            );
        }
    }
}

impl Drop for PublishScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub struct PublishSchedulerBuilder {
    space: Arc<AddressSpace>,
    bridge: Box<dyn PublishBridge>,
    interval: Duration,
    variables: Option<Vec<String>>,
}

impl PublishSchedulerBuilder {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Variables to snapshot, in publish order. Defaults to every registered
    /// variable.
    pub fn with_variables<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables = Some(names.into_iter().map(Into::into).collect());
        self
    }
}

impl Builder for PublishSchedulerBuilder {
    type Output = PublishScheduler;

    #[tracing::instrument(name = "publish_build", skip(self), fields(interval_ms = self.interval.as_millis() as u64))]
    fn build(self) -> Result<PublishScheduler> {
        if self.interval.is_zero() {
            return Err(Error::Config("publish interval must be positive".into()));
        }
        let variables = match self.variables {
            Some(names) => {
                if let Some(missing) = names
                    .iter()
                    .find(|name| !self.space.variables().contains(name))
                {
                    return Err(Error::NotFound(missing.clone()));
                }
                names
            }
            None => self.space.variables().names(),
        };

        let shared = Arc::new(Shared {
            space: self.space,
            variables,
            bridge: self.bridge,
            state: AtomicU8::new(PublishState::Idle as u8),
            ticks: AtomicU64::new(0),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        });

        let (work_tx, work_rx) = flume::bounded::<()>(1);
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);

        let publisher = {
            let shared = shared.clone();
            thread::Builder::new()
                .name("amr-ua-publisher".into())
                .spawn(move || {
                    for () in work_rx.iter() {
                        shared.publish_cycle();
                    }
                })
                .map_err(|e| Error::Spawn(format!("publisher thread: {e}")))?
        };

        let interval = self.interval;
        let ticker = {
            let shared = shared.clone();
            thread::Builder::new()
                .name("amr-ua-ticker".into())
                .spawn(move || {
                    let mut next = Instant::now() + interval;
                    loop {
                        let wait = next.saturating_duration_since(Instant::now());
                        match stop_rx.recv_timeout(wait) {
                            Err(flume::RecvTimeoutError::Timeout) => {
                                if !shared.tick(&work_tx) {
                                    break;
                                }
                                next = next_deadline(next, interval, Instant::now());
                            }
                            Ok(()) | Err(flume::RecvTimeoutError::Disconnected) => break,
                        }
                    }
                })
                .map_err(|e| Error::Spawn(format!("ticker thread: {e}")))?
        };

        info!(
            "[PUBLISH] Scheduler started: interval={:?}, variables={}",
            interval,
            shared.variables.len()
        );

        Ok(PublishScheduler {
            shared,
            interval,
            stop_tx: Some(stop_tx),
            ticker: Some(ticker),
            publisher: Some(publisher),
        })
    }
}
