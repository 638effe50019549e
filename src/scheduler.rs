//! Timer-driven execution of automation cycles.
//!
//! A single "cycle active" flag serializes every cycle in the process, scheduled or manual.
//! Attempts to start a cycle while one is active fail immediately instead of queuing.

use crate::automation::{AutomationError, CycleResult, CycleRunner};
use crate::server::metrics;
use crate::settings_store::{validate_interval_hours, ConfigError, ScheduleConfig, SettingsStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("an automation cycle is already in progress")]
    CycleInProgress,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("persistence error: {0}")]
    Persistence(anyhow::Error),

    #[error("cycle failed: {0}")]
    CycleFailed(#[from] AutomationError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub is_cycle_active: bool,
    pub next_run_time: Option<DateTime<Utc>>,
    pub config: ScheduleConfig,
}

struct Timer {
    cancel: CancellationToken,
    #[allow(dead_code)] // Kept so the task is owned by the scheduler
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct TimerState {
    running: bool,
    timer: Option<Timer>,
    next_run_time: Option<DateTime<Utc>>,
}

struct Inner {
    runner: Arc<dyn CycleRunner>,
    settings: Arc<dyn SettingsStore>,
    cycle_active: AtomicBool,
    /// Woken whenever a cycle releases the flag.
    cycle_finished: Notify,
    state: Mutex<TimerState>,
    shutdown_token: CancellationToken,
}

fn next_run_after(interval: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(interval).unwrap_or_default()
}

/// Holds the cycle flag; releases it when dropped.
struct CycleGuard {
    inner: Arc<Inner>,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.inner.cycle_active.store(false, Ordering::SeqCst);
        metrics::set_cycle_active(false);
        self.inner.cycle_finished.notify_waiters();
    }
}

impl Inner {
    fn try_acquire(self: &Arc<Self>) -> Option<CycleGuard> {
        self.cycle_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        metrics::set_cycle_active(true);
        Some(CycleGuard {
            inner: Arc::clone(self),
        })
    }

    /// Resolves once no cycle holds the flag.
    async fn wait_for_idle(&self) {
        loop {
            let finished = self.cycle_finished.notified();
            tokio::pin!(finished);
            // Register before checking the flag so a release in between is not missed
            finished.as_mut().enable();
            if !self.cycle_active.load(Ordering::SeqCst) {
                return;
            }
            finished.await;
        }
    }

    async fn execute(
        &self,
        guard: CycleGuard,
        is_manual: bool,
    ) -> Result<CycleResult, SchedulerError> {
        let result = self.runner.run_cycle(is_manual).await;
        drop(guard);
        match result {
            Ok(result) => Ok(result),
            Err(e) => {
                error!("Automation cycle aborted: {}", e);
                Err(SchedulerError::CycleFailed(e))
            }
        }
    }

    fn run_scheduled_tick(self: &Arc<Self>) {
        match self.try_acquire() {
            Some(guard) => {
                let inner = Arc::clone(self);
                tokio::spawn(async move {
                    let _ = inner.execute(guard, false).await;
                });
            }
            None => warn!("Skipping scheduled cycle: another cycle is still active"),
        }
    }

    fn spawn_timer(self: &Arc<Self>, interval: Duration) -> Timer {
        let cancel = self.shutdown_token.child_token();
        let task_cancel = cancel.clone();
        let inner = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        debug!("Automation timer cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        // Spawned under the lock: no scheduled cycle starts once stop() returns
                        let mut state = inner.state.lock().await;
                        if task_cancel.is_cancelled() {
                            break;
                        }
                        state.next_run_time = Some(next_run_after(interval));
                        inner.run_scheduled_tick();
                    }
                }
            }
        });

        Timer { cancel, handle }
    }
}

/// Cheap to clone; all clones share one scheduler.
#[derive(Clone)]
pub struct AutomationScheduler {
    inner: Arc<Inner>,
}

impl AutomationScheduler {
    pub fn new(
        runner: Arc<dyn CycleRunner>,
        settings: Arc<dyn SettingsStore>,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                runner,
                settings,
                cycle_active: AtomicBool::new(false),
                cycle_finished: Notify::new(),
                state: Mutex::new(TimerState::default()),
                shutdown_token,
            }),
        }
    }

    fn schedule_config(&self) -> Result<ScheduleConfig, SchedulerError> {
        self.inner
            .settings
            .get_schedule_config()
            .map_err(SchedulerError::Persistence)
    }

    /// Start the timer. The first cycle runs immediately.
    ///
    /// Does nothing if automation is disabled or the scheduler is already running.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        let config = self.schedule_config()?;
        if !config.enabled {
            info!("Automation is disabled, scheduler not started");
            return Ok(());
        }

        let mut state = self.inner.state.lock().await;
        if state.running {
            debug!("Scheduler already running");
            return Ok(());
        }
        state.running = true;
        state.timer = Some(self.inner.spawn_timer(config.interval()));
        state.next_run_time = Some(next_run_after(config.interval()));
        info!(
            "Automation scheduler started, running every {} hours",
            config.interval_hours
        );
        Ok(())
    }

    /// Cancel the timer. A cycle already in progress runs to completion.
    pub async fn stop(&self) {
        let mut state = self.inner.state.lock().await;
        if !state.running {
            return;
        }
        if let Some(timer) = state.timer.take() {
            timer.cancel.cancel();
        }
        state.running = false;
        state.next_run_time = None;
        info!("Automation scheduler stopped");
    }

    /// Run a manual cycle and wait for it to finish.
    pub async fn trigger_manual(&self) -> Result<CycleResult, SchedulerError> {
        let guard = self
            .inner
            .try_acquire()
            .ok_or(SchedulerError::CycleInProgress)?;
        info!("Manual automation cycle requested");
        self.inner.execute(guard, true).await
    }

    /// Claim the cycle flag now and run a manual cycle in the background.
    pub fn spawn_manual(&self) -> Result<(), SchedulerError> {
        let guard = self
            .inner
            .try_acquire()
            .ok_or(SchedulerError::CycleInProgress)?;
        info!("Manual automation cycle requested");
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let _ = inner.execute(guard, true).await;
        });
        Ok(())
    }

    /// Persist schedule changes and apply them to the running scheduler.
    ///
    /// Changing the interval while running recreates the timer, which runs one cycle
    /// immediately.
    pub async fn reconfigure(
        &self,
        interval_hours: Option<u32>,
        enabled: Option<bool>,
    ) -> Result<SchedulerStatus, SchedulerError> {
        if let Some(hours) = interval_hours {
            validate_interval_hours(hours)?;
        }

        let current = self.schedule_config()?;
        let updated = ScheduleConfig {
            interval_hours: interval_hours.unwrap_or(current.interval_hours),
            enabled: enabled.unwrap_or(current.enabled),
        };
        self.inner
            .settings
            .set_schedule_config(&updated)
            .map_err(SchedulerError::Persistence)?;

        let running = self.is_running().await;
        if updated.enabled && !running {
            if !current.enabled {
                self.start().await?;
            }
        } else if !updated.enabled && running {
            self.stop().await;
        } else if running && updated.interval_hours != current.interval_hours {
            let mut state = self.inner.state.lock().await;
            if let Some(timer) = state.timer.take() {
                timer.cancel.cancel();
            }
            state.timer = Some(self.inner.spawn_timer(updated.interval()));
            state.next_run_time = Some(next_run_after(updated.interval()));
            info!(
                "Automation interval changed from {} to {} hours",
                current.interval_hours, updated.interval_hours
            );
        }

        self.get_status().await
    }

    pub async fn is_running(&self) -> bool {
        self.inner.state.lock().await.running
    }

    pub fn is_cycle_active(&self) -> bool {
        self.inner.cycle_active.load(Ordering::SeqCst)
    }

    pub async fn get_status(&self) -> Result<SchedulerStatus, SchedulerError> {
        let config = self.schedule_config()?;
        let state = self.inner.state.lock().await;
        Ok(SchedulerStatus {
            is_running: state.running,
            is_cycle_active: self.is_cycle_active(),
            next_run_time: state.next_run_time,
            config,
        })
    }

    /// Stop the timer, wait for an active cycle to finish, then cancel the root token.
    pub async fn shutdown(&self) {
        self.stop().await;
        if self.is_cycle_active() {
            info!("Waiting for the active automation cycle to finish");
        }
        self.inner.wait_for_idle().await;
        self.inner.shutdown_token.cancel();
    }
}
