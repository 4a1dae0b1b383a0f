//! Fixed-size worker pool for decode tasks.
//!
//! Tasks are independent closures run on a rayon pool. Completion is tracked
//! with atomic counters that the caller polls through
//! [`TaskHandler::await_completion`]. Pausing is cooperative: a paused pool
//! holds queued tasks at their start, while tasks already running finish
//! normally.

use anyhow::{Context, Result};
use rayon::ThreadPool;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Shared pause flag. Workers block in [`PauseGate::wait`] while it is set.
#[derive(Debug, Default)]
pub struct PauseGate {
    paused: Mutex<bool>,
    resumed: Condvar,
}

impl PauseGate {
    pub fn pause(&self) {
        *self.lock() = true;
    }

    pub fn resume(&self) {
        *self.lock() = false;
        self.resumed.notify_all();
    }

    /// Flips the flag and returns the new paused state.
    pub fn toggle(&self) -> bool {
        let mut paused = self.lock();
        *paused = !*paused;
        if !*paused {
            self.resumed.notify_all();
        }
        *paused
    }

    pub fn is_paused(&self) -> bool {
        *self.lock()
    }

    fn wait(&self) {
        let mut paused = self.lock();
        while *paused {
            paused = self
                .resumed
                .wait(paused)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, bool> {
        self.paused
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicUsize,
    completed: AtomicUsize,
}

pub struct TaskHandler {
    pool: ThreadPool,
    gate: Arc<PauseGate>,
    pause_support: bool,
    counters: Arc<Counters>,
}

impl TaskHandler {
    pub fn new(threads: usize, pause_support: bool) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("decode-worker-{i}"))
            .build()
            .context("Failed to build worker pool")?;
        Ok(Self {
            pool,
            gate: Arc::new(PauseGate::default()),
            pause_support,
            counters: Arc::new(Counters::default()),
        })
    }

    pub fn dispatch(&self, task: impl FnOnce() + Send + 'static) {
        self.counters.dispatched.fetch_add(1, Ordering::SeqCst);
        let gate = self.pause_support.then(|| self.gate.clone());
        let counters = self.counters.clone();
        self.pool.spawn(move || {
            if let Some(gate) = gate {
                gate.wait();
            }
            if catch_unwind(AssertUnwindSafe(task)).is_err() {
                tracing::error!("decode task panicked");
            }
            counters.completed.fetch_add(1, Ordering::SeqCst);
        });
    }

    /// True when tasks were dispatched since the last completed wait.
    pub fn has_pending_task(&self) -> bool {
        self.counters.dispatched.load(Ordering::SeqCst) > 0
    }

    /// Blocks until every dispatched task has finished, calling
    /// `on_progress(completed, total)` once per poll. Counters are reset
    /// afterwards so the handler can run another batch.
    pub fn await_completion(&self, poll_interval: Duration, mut on_progress: impl FnMut(usize, usize)) {
        loop {
            let total = self.counters.dispatched.load(Ordering::SeqCst);
            let completed = self.counters.completed.load(Ordering::SeqCst);
            on_progress(completed, total);
            if completed >= total {
                break;
            }
            std::thread::sleep(poll_interval);
        }
        self.counters.dispatched.store(0, Ordering::SeqCst);
        self.counters.completed.store(0, Ordering::SeqCst);
    }

    pub fn pause(&self) {
        if self.pause_support {
            self.gate.pause();
        } else {
            tracing::warn!("pause requested on a pool without pause support");
        }
    }

    pub fn resume(&self) {
        self.gate.resume();
    }

    /// Handle for toggling the pause state from another thread.
    pub fn pause_gate(&self) -> Arc<PauseGate> {
        self.gate.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_every_task_and_reports_progress() -> Result<()> {
        let handler = TaskHandler::new(4, false)?;
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..32 {
            let done = done.clone();
            handler.dispatch(move || {
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(handler.has_pending_task());

        let mut last = (0, 0);
        handler.await_completion(Duration::from_millis(5), |c, t| last = (c, t));
        assert_eq!(last, (32, 32));
        assert_eq!(done.load(Ordering::SeqCst), 32);
        assert!(!handler.has_pending_task());
        Ok(())
    }

    #[test]
    fn paused_pool_holds_tasks_until_resumed() -> Result<()> {
        let handler = TaskHandler::new(2, true)?;
        handler.pause();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let done = done.clone();
            handler.dispatch(move || {
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(done.load(Ordering::SeqCst), 0);

        handler.resume();
        handler.await_completion(Duration::from_millis(5), |_, _| {});
        assert_eq!(done.load(Ordering::SeqCst), 4);
        Ok(())
    }

    #[test]
    fn panicking_task_still_completes_the_batch() -> Result<()> {
        let handler = TaskHandler::new(2, false)?;
        handler.dispatch(|| panic!("boom"));
        handler.dispatch(|| {});
        let mut last = (0, 0);
        handler.await_completion(Duration::from_millis(5), |c, t| last = (c, t));
        assert_eq!(last, (2, 2));
        Ok(())
    }

    #[test]
    fn toggle_flips_state() {
        let gate = PauseGate::default();
        assert!(gate.toggle());
        assert!(gate.is_paused());
        assert!(!gate.toggle());
        assert!(!gate.is_paused());
    }
}
