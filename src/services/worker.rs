use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::constants::{self, stats};
use crate::events::CuratorEvent;

use super::ingestion::IngestionEngine;
use super::watchlist::Watchlist;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Stopped,
    Running,
    Stopping,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Stopped => "stopped",
            WorkerState::Running => "running",
            WorkerState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Per-tick knobs. The interval is passed to `start`.
#[derive(Clone, Copy, Debug)]
pub struct WorkerSettings {
    pub max_concurrency: usize,
    pub news_limit: usize,
    /// 0 disables the news sweep
    pub news_every_ticks: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

impl From<&WorkerConfig> for WorkerSettings {
    fn from(c: &WorkerConfig) -> Self {
        Self {
            max_concurrency: c.max_concurrency.max(1),
            news_limit: c.news_limit,
            news_every_ticks: c.news_every_ticks,
        }
    }
}

#[derive(Default)]
struct RunHandle {
    cancel: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

/// Fixed-rate loop that keeps the watchlist fresh.
///
/// `Stopped -> Running -> Stopping -> Stopped`. Cancellation is cooperative:
/// it is observed between ticker groups and while waiting for the next tick,
/// so an in-flight fetch always finishes on its own terms.
pub struct BackgroundWorker {
    ticker: TickRunner,
    state: Arc<Mutex<WorkerState>>,
    run: Mutex<RunHandle>,
}

impl BackgroundWorker {
    pub fn new(engine: Arc<IngestionEngine>, watchlist: Watchlist, settings: WorkerSettings) -> Self {
        Self {
            ticker: TickRunner {
                engine,
                watchlist,
                settings,
            },
            state: Arc::new(Mutex::new(WorkerState::Stopped)),
            run: Mutex::new(RunHandle::default()),
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.state() == WorkerState::Running
    }

    /// Returns false (and does nothing) unless the worker is stopped.
    pub fn start(&self, interval: Duration) -> bool {
        let interval = interval.max(constants::worker::MIN_INTERVAL);
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state != WorkerState::Stopped {
                debug!("[WORKER] start ignored, worker is {}", *state);
                return false;
            }
            *state = WorkerState::Running;
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let runner = self.ticker.clone();
        let task = tokio::spawn(async move {
            runner.run(interval, cancel_rx).await;
        });

        let mut run = self.run.lock().unwrap_or_else(|e| e.into_inner());
        run.cancel = Some(cancel_tx);
        run.task = Some(task);
        drop(run);

        info!("▶️ [WORKER] Started, ticking every {:?}", interval);
        self.ticker.emit_state(WorkerState::Running);
        true
    }

    /// Signals cancellation and waits for the loop to exit. No timeout.
    /// Returns false when the worker was not running.
    pub async fn stop(&self) -> bool {
        let (cancel, task) = {
            let mut run = self.run.lock().unwrap_or_else(|e| e.into_inner());
            (run.cancel.take(), run.task.take())
        };
        let Some(task) = task else {
            return false;
        };

        self.set_state(WorkerState::Stopping);
        info!("⏹️ [WORKER] Stopping, waiting for the current tick");
        if let Some(cancel) = cancel {
            let _ = cancel.send(true);
        }
        if let Err(e) = task.await {
            error!("❌ [WORKER] Loop ended abnormally: {}", e);
        }

        self.set_state(WorkerState::Stopped);
        info!("⏹️ [WORKER] Stopped");
        true
    }

    fn set_state(&self, next: WorkerState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
        self.ticker.emit_state(next);
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        let run = self.run.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(cancel) = run.cancel.take() {
            let _ = cancel.send(true);
        }
    }
}

#[derive(Clone)]
struct TickRunner {
    engine: Arc<IngestionEngine>,
    watchlist: Watchlist,
    settings: WorkerSettings,
}

impl TickRunner {
    fn emit_state(&self, state: WorkerState) {
        self.engine.bus().emit(CuratorEvent::WorkerStateChanged(state));
    }

    async fn run(&self, interval: Duration, mut cancel: watch::Receiver<bool>) {
        let mut next_tick = Instant::now();
        let mut tick: u64 = 0;
        let mut overrun_streak: u32 = 0;

        loop {
            if *cancel.borrow() {
                break;
            }
            tokio::select! {
                _ = sleep_until(next_tick) => {}
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                    continue;
                }
            }

            tick += 1;
            self.tick(tick, &cancel).await;

            // Fixed rate: an overrun starts the next tick now and re-anchors there
            next_tick += interval;
            let now = Instant::now();
            if now > next_tick {
                overrun_streak += 1;
                self.engine.stats().increment(stats::WORKER_OVERRUNS);
                if overrun_streak >= constants::worker::OVERRUN_WARN_STREAK {
                    warn!(
                        "⚠️ [WORKER] Tick {} overran the {:?} interval ({} in a row)",
                        tick, interval, overrun_streak
                    );
                } else {
                    debug!("[WORKER] Tick {} overran by {:?}", tick, now - next_tick);
                }
                next_tick = now;
            } else {
                overrun_streak = 0;
            }
        }
        debug!("[WORKER] Loop exited after {} ticks", tick);
    }

    async fn tick(&self, tick: u64, cancel: &watch::Receiver<bool>) {
        let engine = &self.engine;
        engine.stats().increment(stats::WORKER_TICKS);

        if !engine.store().health_check().await {
            engine.stats().increment(stats::WORKER_SKIPPED_TICKS);
            warn!("⚠️ [WORKER] Store unreachable, skipping tick {}", tick);
            return;
        }

        let tickers = self.watchlist.list();
        let mut ok = 0usize;
        for group in tickers.chunks(self.settings.max_concurrency.max(1)) {
            if *cancel.borrow() {
                info!("[WORKER] Cancelled mid-tick {} after {} tickers", tick, ok);
                return;
            }
            let results = join_all(group.iter().map(|t| engine.refresh_and_persist(t))).await;
            for (ticker, result) in group.iter().zip(results) {
                match result {
                    Ok(_) => ok += 1,
                    Err(e) => warn!("⚠️ [WORKER] {} not refreshed: {}", ticker, e),
                }
            }
        }
        debug!("[WORKER] Tick {}: {}/{} tickers refreshed", tick, ok, tickers.len());

        let every = self.settings.news_every_ticks;
        if every == 0 || tick % every != 0 || tickers.is_empty() || !engine.has_news_source() {
            return;
        }
        if *cancel.borrow() {
            return;
        }
        if let Err(e) = engine.fetch_news(None, self.settings.news_limit).await {
            warn!("⚠️ [WORKER] News sweep failed: {}", e);
        }
    }
}
