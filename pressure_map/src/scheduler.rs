// THEORY:
// The `Scheduler` is the single background driver of the dashboard. It owns the
// `DashboardPipeline` outright and fires it on a fixed wall-clock period. Because
// only this task ever touches channel state, no locks are needed on the write
// side; everything readers see goes through the `SnapshotBus`.
//
// Timing rules:
// - Ticks never overlap. If a tick runs long, the next one is delayed rather than
//   doubled up (`MissedTickBehavior::Delay`).
// - A tick runs on the blocking pool, since acquisition sources wait on a socket.
//   The pipeline is moved in and handed back, so ownership stays linear.
// - Pausing keeps the timer running but skips the work; resuming continues from
//   the same channel state.

use crate::pipeline::{DashboardPipeline, SnapshotBus};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("pipeline task panicked or was cancelled: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    /// Stop after this many executed ticks. `None` runs until shutdown.
    pub max_ticks: Option<u64>,
    /// Whether ticking starts immediately or waits for `ControlHandle::play`.
    pub start_playing: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(50),
            max_ticks: None,
            start_playing: true,
        }
    }
}

/// Totals reported when the scheduler stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerSummary {
    pub ticks_run: u64,
    pub ticks_paused: u64,
    pub channel_failures: u64,
}

/// Play/pause and shutdown switches for a running scheduler.
#[derive(Clone)]
pub struct ControlHandle {
    pub play_tx: watch::Sender<bool>,
    pub shutdown_tx: watch::Sender<bool>,
}

impl ControlHandle {
    pub fn play(&self) {
        self.play_tx.send_replace(true);
    }

    pub fn pause(&self) {
        self.play_tx.send_replace(false);
    }

    pub fn is_playing(&self) -> bool {
        *self.play_tx.borrow()
    }

    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

pub struct Scheduler {
    bus: SnapshotBus,
    control: ControlHandle,
    task: JoinHandle<Result<SchedulerSummary, SchedulerError>>,
}

impl Scheduler {
    /// Moves the pipeline onto a background task and starts the timer.
    pub fn spawn(pipeline: DashboardPipeline, config: SchedulerConfig) -> Self {
        let bus = pipeline.bus();
        let (play_tx, play_rx) = watch::channel(config.start_playing);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let control = ControlHandle { play_tx, shutdown_tx };

        info!(
            interval_ms = config.tick_interval.as_millis() as u64,
            channels = pipeline.channels().len(),
            "starting scheduler"
        );
        let task = tokio::spawn(run(pipeline, config, play_rx, shutdown_rx));

        Self { bus, control, task }
    }

    pub fn bus(&self) -> SnapshotBus {
        self.bus.clone()
    }

    pub fn control(&self) -> ControlHandle {
        self.control.clone()
    }

    /// Waits for the scheduler to stop on its own (tick limit reached).
    pub async fn join(self) -> Result<SchedulerSummary, SchedulerError> {
        Ok(self.task.await??)
    }

    /// Signals shutdown and waits for the current tick to finish.
    pub async fn shutdown(self) -> Result<SchedulerSummary, SchedulerError> {
        self.control.shutdown();
        self.join().await
    }
}

async fn run(
    mut pipeline: DashboardPipeline,
    config: SchedulerConfig,
    play_rx: watch::Receiver<bool>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<SchedulerSummary, SchedulerError> {
    let mut summary = SchedulerSummary::default();
    let mut interval = tokio::time::interval(config.tick_interval.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if config.max_ticks.is_some_and(|max| summary.ticks_run >= max) {
            break;
        }

        tokio::select! {
            _ = interval.tick() => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
                continue;
            }
        }
        if *shutdown_rx.borrow() {
            break;
        }

        if !*play_rx.borrow() {
            summary.ticks_paused += 1;
            continue;
        }

        let (returned, report) = tokio::task::spawn_blocking(move || {
            let report = pipeline.tick();
            (pipeline, report)
        })
        .await?;
        pipeline = returned;

        summary.ticks_run += 1;
        summary.channel_failures += report.failures.len() as u64;
        debug!(
            tick = report.tick,
            published = report.published.len(),
            failed = report.failures.len(),
            "tick complete"
        );
    }

    info!(
        ticks = summary.ticks_run,
        paused = summary.ticks_paused,
        failures = summary.channel_failures,
        "scheduler stopped"
    );
    Ok(summary)
}
