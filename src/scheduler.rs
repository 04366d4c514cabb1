// src/scheduler.rs
//! Timer-driven loop around the poll engine. Two states, Running and
//! Stopped; one background task drives cycles strictly sequentially, so
//! cycles can never overlap. A tick that lands while a cycle is still in
//! flight is skipped, not queued.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::PollEngine;

enum State {
    Stopped,
    Running {
        shutdown: watch::Sender<bool>,
        task: JoinHandle<()>,
    },
}

pub struct Scheduler {
    engine: Arc<PollEngine>,
    interval: Duration,
    state: Mutex<State>,
}

impl Scheduler {
    pub fn new(engine: Arc<PollEngine>, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            state: Mutex::new(State::Stopped),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(
            *self.state.lock().expect("scheduler lock poisoned"),
            State::Running { .. }
        )
    }

    /// Start the polling loop: one immediate cycle, then one cycle per tick.
    /// No-op returning `false` if already running. Must be called from
    /// within a tokio runtime.
    pub fn start(&self) -> bool {
        let mut state = self.state.lock().expect("scheduler lock poisoned");
        if matches!(*state, State::Running { .. }) {
            tracing::warn!("scheduler already running, start ignored");
            return false;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let engine = Arc::clone(&self.engine);
        let period = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The interval's first tick completes immediately; consume it so
            // the first cycle below is the "immediate" one.
            ticker.tick().await;
            loop {
                engine.run_cycle().await;
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("scheduler loop exited");
        });

        *state = State::Running { shutdown, task };
        tracing::info!(interval_secs = period.as_secs(), "scheduler started");
        true
    }

    /// Stop the loop. The shutdown signal is observed at the next tick
    /// boundary: a cycle already in flight finishes first and is never
    /// interrupted. No-op returning `false` if not running (double-stop and
    /// stop-before-start included).
    pub async fn stop(&self) -> bool {
        let previous = {
            let mut state = self.state.lock().expect("scheduler lock poisoned");
            std::mem::replace(&mut *state, State::Stopped)
        };
        match previous {
            State::Stopped => {
                tracing::debug!("stop ignored, scheduler not running");
                false
            }
            State::Running { shutdown, task } => {
                tracing::info!("stopping scheduler");
                let _ = shutdown.send(true);
                if let Err(e) = task.await {
                    if e.is_panic() {
                        tracing::error!("scheduler task panicked during shutdown");
                    }
                }
                tracing::info!("scheduler stopped");
                true
            }
        }
    }
}
