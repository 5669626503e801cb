//! Result merging.
//!
//! Appends the secondary model's raw structured output to the latest
//! transcript entry and re-signals the rest of the system. The result text
//! is one opaque payload; whatever internal structure the secondary model
//! chose to emit is preserved verbatim.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracing::{debug, warn};

use crate::{
    annotation,
    event_bus::{Event, EventBus},
    transcript::{Transcript, TranscriptView},
};

pub struct ResultMerger {
    transcript: Arc<Transcript>,
    bus: Arc<EventBus>,
    enabled: Arc<AtomicBool>,
}

impl ResultMerger {
    pub fn new(transcript: Arc<Transcript>, bus: Arc<EventBus>, enabled: Arc<AtomicBool>) -> Self {
        Self {
            transcript,
            bus,
            enabled,
        }
    }

    /// Merges `result_text` into the latest transcript entry.
    ///
    /// Any existing annotation block is replaced rather than duplicated, so
    /// an entry carries at most one live block. Returns false without
    /// touching the transcript when there is nothing to merge into, when
    /// the latest entry is a user entry, or when the pipeline was disabled
    /// while the dispatch was in flight (the visibility filter may already
    /// be torn down by then).
    pub fn merge(&self, result_text: &str) -> bool {
        if !self.enabled.load(Ordering::SeqCst) {
            debug!("merge skipped: pipeline disabled mid-flight");
            return false;
        }

        let entry = match self.transcript.last() {
            Some(entry) => entry,
            None => {
                warn!("merge skipped: transcript is empty");
                return false;
            }
        };
        if entry.is_from_user {
            warn!("merge skipped: latest entry is a user entry");
            return false;
        }

        let narrative = annotation::strip_blocks(&entry.raw_text);
        let merged = if narrative.is_empty() {
            result_text.trim().to_string()
        } else {
            format!("{}\n\n{}", narrative, result_text.trim())
        };

        if let Err(e) = self.transcript.set_raw_text(entry.index, &merged) {
            warn!("merge failed: {}", e);
            return false;
        }
        self.transcript.save();

        if let Err(e) = self.bus.sync_publish(Event::message_available(entry.index)) {
            warn!("message available signal not delivered: {}", e);
        }
        debug!(index = entry.index, "merged secondary result into transcript");
        true
    }
}
