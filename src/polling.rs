// src/polling.rs
//! Fixed-cadence refresh that only runs while someone is watching.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::contained;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PollState {
    pub active: bool,
    pub last_fetched_at: Option<DateTime<Utc>>,
    /// Completed ticks of the current activation. Panicked ticks are not counted.
    pub ticks: u64,
}

struct Schedule {
    stop: oneshot::Sender<()>,
    _handle: JoinHandle<()>,
    generation: u64,
}

struct Inner {
    state: PollState,
    /// Present iff `state.active`.
    schedule: Option<Schedule>,
    generation: u64,
}

/// `activate` / `deactivate` are idempotent and synchronous. A tick in flight when
/// deactivated runs to completion; no further tick is scheduled. A tick that panics is
/// logged and the schedule carries on.
#[derive(Clone)]
pub struct PollingRefresher {
    name: &'static str,
    inner: Arc<Mutex<Inner>>,
}

impl PollingRefresher {
    pub fn new(name: &'static str) -> Self {
        crate::metrics::ensure_described();
        Self {
            name,
            inner: Arc::new(Mutex::new(Inner {
                state: PollState::default(),
                schedule: None,
                generation: 0,
            })),
        }
    }

    /// Run `op` now and then every `interval`. Returns `false` when already active
    /// (nothing changes in that case).
    pub fn activate<F, Fut>(&self, op: F, interval: Duration) -> bool
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut inner = self.inner.lock().expect("poll state poisoned");
        if inner.schedule.is_some() {
            return false;
        }
        inner.generation += 1;
        let generation = inner.generation;
        let interval = interval.max(Duration::from_millis(1));
        let (stop, mut stop_rx) = oneshot::channel::<()>();
        let shared = Arc::clone(&self.inner);
        let name = self.name;

        let op = Arc::new(op);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The immediate tick runs even if deactivated right away; its state write is
            // then dropped by the generation check.
            loop {
                let op = Arc::clone(&op);
                match contained(async move {
                    op().await;
                    Ok(())
                })
                .await
                {
                    Ok(()) => {
                        counter!("poll_ticks_total", "refresher" => name).increment(1);
                        let mut inner = shared.lock().expect("poll state poisoned");
                        if inner.generation == generation {
                            inner.state.last_fetched_at = Some(Utc::now());
                            inner.state.ticks += 1;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(refresher = name, detail = %e.detail, "poll tick aborted");
                    }
                }
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {}
                }
            }
            tracing::debug!(refresher = name, "poll loop stopped");
        });

        inner.schedule = Some(Schedule {
            stop,
            _handle: handle,
            generation,
        });
        inner.state.active = true;
        inner.state.ticks = 0;
        tracing::info!(refresher = name, interval_ms = interval.as_millis() as u64, "polling activated");
        true
    }

    /// Stop scheduling ticks. Returns `false` when already inactive.
    pub fn deactivate(&self) -> bool {
        let mut inner = self.inner.lock().expect("poll state poisoned");
        let Some(schedule) = inner.schedule.take() else {
            return false;
        };
        let _ = schedule.stop.send(());
        // A tick still in flight must not write into a later activation.
        inner.generation = inner.generation.max(schedule.generation) + 1;
        inner.state.active = false;
        tracing::info!(refresher = self.name, "polling deactivated");
        true
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().expect("poll state poisoned").state.active
    }

    pub fn state(&self) -> PollState {
        self.inner.lock().expect("poll state poisoned").state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn deactivate_twice_is_a_noop() {
        let r = PollingRefresher::new("test");
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        assert!(r.activate(
            move || {
                let h = h.clone();
                async move {
                    h.fetch_add(1, Ordering::SeqCst);
                }
            },
            Duration::from_secs(1)
        ));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(r.deactivate());
        assert!(!r.deactivate());
        assert!(!r.is_active());
        assert_eq!(r.state().ticks, 1);
        assert!(r.state().last_fetched_at.is_some());
    }
}
