//! Cancellable repeating request with strict non-overlap

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shortest period a poller runs at; tokio intervals reject zero
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Poller options
#[derive(Debug, Clone)]
pub struct Options {
    /// Name used in logs
    pub name: &'static str,

    /// Polling interval
    pub interval: Duration,

    /// Invoke the action right away instead of after the first interval
    pub run_immediately: bool,
}

impl Options {
    pub fn new(name: &'static str, interval: Duration) -> Self {
        Self {
            name,
            interval,
            run_immediately: true,
        }
    }

    pub fn deferred(mut self) -> Self {
        self.run_immediately = false;
        self
    }
}

/// Handle to a running poller.
///
/// Dropping the handle cancels the poller.
pub struct PollerHandle {
    name: &'static str,
    cancel: CancellationToken,
    gate: Arc<Mutex<()>>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Stop the poller.
    ///
    /// Idempotent. Once this returns the action is never invoked again and
    /// no result, including one from a request already in flight, reaches
    /// the sink. Must not be called from inside the sink.
    pub fn cancel(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        {
            let _gate = lock(&self.gate);
            self.cancel.cancel();
        }
        self.task.abort();
        debug!("Poller {} cancelled", self.name);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn lock(gate: &Mutex<()>) -> MutexGuard<'_, ()> {
    gate.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Start polling.
///
/// `action` is invoked at most once at a time. Ticks that come due while
/// the previous invocation is outstanding collapse into a single invocation
/// right after it settles, and the schedule restarts from there. Every
/// settled result is handed to `sink` in completion order.
pub fn start<A, Fut, T, S>(options: Options, mut action: A, mut sink: S) -> PollerHandle
where
    A: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
    S: FnMut(T) + Send + 'static,
{
    let cancel = CancellationToken::new();
    let gate = Arc::new(Mutex::new(()));
    let name = options.name;
    let period = if options.interval < MIN_INTERVAL {
        warn!(
            "Poller {} interval {:?} too short, using {:?}",
            name, options.interval, MIN_INTERVAL
        );
        MIN_INTERVAL
    } else {
        options.interval
    };

    let task_cancel = cancel.clone();
    let task_gate = gate.clone();
    let task = tokio::spawn(async move {
        info!("Poller {} starting (every {:?})", options.name, period);

        let first_tick = if options.run_immediately {
            Instant::now()
        } else {
            Instant::now() + period
        };
        let mut ticker = tokio::time::interval_at(first_tick, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = task_cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let request = {
                let _gate = lock(&task_gate);
                if task_cancel.is_cancelled() {
                    break;
                }
                action()
            };

            let output = tokio::select! {
                _ = task_cancel.cancelled() => break,
                output = request => output,
            };

            {
                let _gate = lock(&task_gate);
                if task_cancel.is_cancelled() {
                    break;
                }
                sink(output);
            }
        }

        debug!("Poller {} stopped", options.name);
    });

    PollerHandle {
        name,
        cancel,
        gate,
        task,
    }
}
