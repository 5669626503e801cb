//! Generation coordination.
//!
//! Bridges the host's "generation finished" signal to the request/retry
//! pipeline: validates that the detected reply is genuinely new, repairs
//! stray annotation blocks the primary model emitted despite the
//! restriction directive, then hands the narrative text off for dispatch.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::{
    annotation,
    pipeline::{snapshot, RequestPipeline, SharedConfig},
    stats::FailureStat,
    transcript::{Transcript, TranscriptView},
    validator,
};

/// Observable coordinator state, one run at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
pub enum RunState {
    #[default]
    Idle,
    Validating,
    Dispatching,
}

pub struct GenerationCoordinator {
    transcript: Arc<Transcript>,
    stats: Arc<FailureStat>,
    enabled: Arc<AtomicBool>,
    config: SharedConfig,
    request: RequestPipeline,
    // Held for the whole run; an overlapping signal fails try_lock and is
    // dropped (the host fires once per turn, so queued processing would
    // only ever replay stale state).
    run_guard: AsyncMutex<()>,
    state: Mutex<RunState>,
}

impl GenerationCoordinator {
    pub fn new(
        transcript: Arc<Transcript>,
        stats: Arc<FailureStat>,
        enabled: Arc<AtomicBool>,
        config: SharedConfig,
        request: RequestPipeline,
    ) -> Self {
        Self {
            transcript,
            stats,
            enabled,
            config,
            request,
            run_guard: AsyncMutex::new(()),
            state: Mutex::new(RunState::Idle),
        }
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: RunState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Entry point for the host's "generation finished" signal.
    pub async fn handle_generation_end(&self) {
        let _guard = match self.run_guard.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("generation signal dropped: a run is already active");
                return;
            }
        };

        self.set_state(RunState::Validating);
        if let Some(narrative) = self.validate() {
            self.set_state(RunState::Dispatching);
            self.request.run(&narrative).await;
        }
        self.set_state(RunState::Idle);
    }

    /// Runs the validating phase; returns the (possibly repaired) narrative
    /// text to dispatch, or None when this signal should be ignored.
    fn validate(&self) -> Option<String> {
        // The pipeline may be logically off while a teardown is racing us.
        if !self.enabled.load(Ordering::SeqCst) {
            debug!("generation signal ignored: pipeline disabled");
            return None;
        }
        if !snapshot(&self.config).provider.enabled {
            debug!("generation signal ignored: provider disabled in settings");
            return None;
        }

        let entry = self.transcript.last_model_entry()?;

        if !validator::is_new(&*self.transcript, &entry) {
            self.stats.record("stale reply");
            debug!(index = entry.index, "reply is stale, skipping");
            return None;
        }

        let mut narrative = entry.raw_text.clone();
        if annotation::contains_block(&narrative) {
            // Correctness repair, not a failure: the primary model emitted a
            // block despite the restriction directive.
            narrative = annotation::strip_blocks(&narrative);
            if let Err(e) = self.transcript.set_raw_text(entry.index, &narrative) {
                warn!("failed to repair stray annotation block: {}", e);
                return None;
            }
            self.transcript.save();
            debug!(index = entry.index, "stripped stray annotation block");
        }

        Some(narrative)
    }
}
