//! Refresh scheduling.
//!
//! One scheduler thread watches the trigger cell. Each taken trigger kills
//! the running compile pass (cooperatively; per-file commits already made
//! are durable) and starts a fresh pass stamped with the current clock.
//! Bursts of edits coalesce into one pass and only the newest non-null
//! priority URI survives.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::services::worker::pipeline::CompilePass;
use crate::services::worker::worker::{WorkerShared, spawn_named};

/// Cooperative cancellation signal for one compile pass.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn mark_finished(&self) {
        self.finished.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

pub(crate) fn refresh_loop(shared: Arc<WorkerShared>) {
    let mut pass_seq: u64 = 0;
    loop {
        let (base_clock, priority, token) = {
            let mut state = shared.state.lock();
            while state.refresh_cell.is_none() && !state.shutdown {
                shared.refresh_cv.wait(&mut state);
            }
            if state.shutdown {
                return;
            }
            let priority = state.refresh_cell.take().flatten();

            // Kill the previous pass before its successor exists. Cancelling
            // under the state lock closes the commit race: a cancelled pass
            // re-checks its token inside every commit critical section.
            if let Some(previous) = state.current_pass.take() {
                previous.cancel();
                if !previous.is_finished() {
                    state.stats.passes_cancelled += 1;
                }
            }

            let token = CancelToken::new();
            state.current_pass = Some(token.clone());
            state.active_passes += 1;
            state.stats.passes_started += 1;
            (state.clock, priority, token)
        };

        pass_seq += 1;
        debug!(%base_clock, seq = pass_seq, "starting compile pass");
        let pass = CompilePass::new(shared.clone(), base_clock, priority, token);
        let label = format!("lumen-pass-{pass_seq}");
        if spawn_named(&label, move || pass.run()).is_none() {
            let mut state = shared.state.lock();
            state.active_passes -= 1;
            shared.idle_cv.notify_all();
        }
    }
}
