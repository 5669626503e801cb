//! Freshness validation.
//!
//! A "generation finished" signal can race a failed host generation: the
//! transcript tail may still be a reply from an earlier turn. A reply is
//! fresh only if it sits strictly after the most recent user entry.

use tracing::trace;

use crate::transcript::{TranscriptEntry, TranscriptView};

/// Returns true if `candidate` was produced after the most recent user
/// entry.
///
/// The candidate is located by identity, not by its recorded index; an
/// unlocatable candidate is treated as stale since it indicates the tail of
/// the transcript was replaced under us.
pub fn is_new(view: &dyn TranscriptView, candidate: &TranscriptEntry) -> bool {
    let candidate_idx = match view.position_of(candidate.id) {
        Some(idx) => idx,
        None => {
            trace!("freshness: candidate not found in transcript");
            return false;
        }
    };

    let mut last_user_idx = None;
    for i in (0..view.len()).rev() {
        if view.get(i).is_some_and(|e| e.is_from_user) {
            last_user_idx = Some(i);
            break;
        }
    }

    match last_user_idx {
        // Very first reply, nothing to be stale against.
        None => true,
        Some(user_idx) => candidate_idx > user_idx,
    }
}
