//! Sweep threads with graceful shutdown.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

/// One periodic maintenance task.
pub trait Sweep: Send {
    /// Name for logging and stats.
    fn name(&self) -> &str;

    /// How often the sweep fires.
    fn interval(&self) -> Duration;

    /// Run one pass. Returns the number of items acted on.
    fn run(&self, now: DateTime<Utc>) -> Result<u64, String>;
}

/// Runtime counters for one sweep.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SweepStats {
    pub runs: u64,
    pub items_swept: u64,
    pub failures: u64,
    pub last_run_at: Option<DateTime<Utc>>,
}

/// Handle to one running sweep thread.
#[derive(Debug)]
pub struct SweepHandle {
    name: String,
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<SweepStats>>,
}

impl SweepHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> SweepStats {
        self.stats.lock().unwrap().clone()
    }

    /// Request shutdown and wait for the thread to finish.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Collects sweeps, then starts one thread per sweep.
#[derive(Default)]
pub struct SweepScheduler {
    sweeps: Vec<Box<dyn Sweep + 'static>>,
}

impl SweepScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, sweep: impl Sweep + 'static) {
        self.sweeps.push(Box::new(sweep));
    }

    /// Spawn every registered sweep. The first pass happens after one
    /// interval, not immediately.
    pub fn start(self) -> SchedulerHandle {
        let handles = self.sweeps.into_iter().map(spawn_sweep).collect();
        SchedulerHandle { handles }
    }
}

/// Handle over all running sweeps.
#[derive(Debug)]
pub struct SchedulerHandle {
    handles: Vec<SweepHandle>,
}

impl SchedulerHandle {
    pub fn stats(&self) -> Vec<(String, SweepStats)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.stats()))
            .collect()
    }

    pub fn shutdown(self) {
        for handle in self.handles {
            handle.shutdown();
        }
    }
}

fn spawn_sweep(sweep: Box<dyn Sweep + 'static>) -> SweepHandle {
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
    let stats = Arc::new(Mutex::new(SweepStats::default()));
    let stats_clone = stats.clone();
    let name = sweep.name().to_string();
    let thread_name = name.clone();

    let join = thread::Builder::new()
        .name(thread_name)
        .spawn(move || sweep_loop(sweep, shutdown_rx, stats_clone))
        .expect("failed to spawn sweep thread");

    SweepHandle {
        name,
        shutdown: shutdown_tx,
        join: Some(join),
        stats,
    }
}

fn sweep_loop(sweep: Box<dyn Sweep>, shutdown_rx: mpsc::Receiver<()>, stats: Arc<Mutex<SweepStats>>) {
    info!(sweep = sweep.name(), interval = ?sweep.interval(), "sweep started");

    loop {
        match shutdown_rx.recv_timeout(sweep.interval()) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let now = Utc::now();
        match sweep.run(now) {
            Ok(count) => {
                let mut s = stats.lock().unwrap();
                s.runs += 1;
                s.items_swept += count;
                s.last_run_at = Some(now);
                if count > 0 {
                    debug!(sweep = sweep.name(), count, "sweep pass finished");
                }
            }
            Err(err) => {
                let mut s = stats.lock().unwrap();
                s.runs += 1;
                s.failures += 1;
                s.last_run_at = Some(now);
                error!(sweep = sweep.name(), error = %err, "sweep pass failed");
            }
        }
    }

    info!(sweep = sweep.name(), "sweep stopped");
}
