//! Host transcript store and the content visibility decorator.
//!
//! The pipeline never creates transcript entries; it reads the latest one
//! and mutates `raw_text` of the latest model entry. While the pipeline is
//! enabled, primary-model consumers read through
//! [`FilteredTranscriptView`], which strips annotation blocks per read so
//! previously merged structured data never re-enters the primary model's
//! context. Writes always go to the raw store.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use thiserror::Error;
use uuid::Uuid;

use crate::{annotation, timestamp::Timestamp};

/// One turn in the host transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    /// Stable identity, used by the freshness validator to locate the entry
    /// even after the tail of the transcript has been replaced.
    pub id: Uuid,
    pub index: usize,
    pub is_from_user: bool,
    pub raw_text: String,
    pub created_at: Timestamp,
}

/// Read contract shared by the raw store and the filtered decorator.
///
/// `get` returns a cloned snapshot, never a reference into the store, so
/// the decorator can rewrite `raw_text` without touching the original.
pub trait TranscriptView: Send + Sync {
    fn len(&self) -> usize;

    fn get(&self, index: usize) -> Option<TranscriptEntry>;

    /// Identity-based lookup.
    fn position_of(&self, id: Uuid) -> Option<usize>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn last(&self) -> Option<TranscriptEntry> {
        self.len().checked_sub(1).and_then(|i| self.get(i))
    }

    /// Latest entry not authored by the user, scanning backward.
    fn last_model_entry(&self) -> Option<TranscriptEntry> {
        for i in (0..self.len()).rev() {
            match self.get(i) {
                Some(entry) if !entry.is_from_user => return Some(entry),
                _ => {}
            }
        }
        None
    }
}

#[derive(Error, Debug)]
pub enum TranscriptError {
    #[error("transcript index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

pub type TranscriptResult<T> = Result<T, TranscriptError>;

/// In-memory ordered transcript store.
///
/// Persistence is the host's concern; `save` bumps a generation counter the
/// host's debounced writer (and tests) can observe.
#[derive(Default)]
pub struct Transcript {
    entries: RwLock<Vec<TranscriptEntry>>,
    save_generation: AtomicU64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<TranscriptEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<TranscriptEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push_user(&self, text: &str) -> TranscriptEntry {
        self.push(text, true)
    }

    pub fn push_model(&self, text: &str) -> TranscriptEntry {
        self.push(text, false)
    }

    fn push(&self, text: &str, is_from_user: bool) -> TranscriptEntry {
        let mut entries = self.write();
        let entry = TranscriptEntry {
            id: Uuid::new_v4(),
            index: entries.len(),
            is_from_user,
            raw_text: text.to_string(),
            created_at: Timestamp::now(),
        };
        entries.push(entry.clone());
        entry
    }

    pub fn set_raw_text(&self, index: usize, text: &str) -> TranscriptResult<()> {
        let mut entries = self.write();
        let len = entries.len();
        let entry = entries
            .get_mut(index)
            .ok_or(TranscriptError::IndexOutOfRange { index, len })?;
        entry.raw_text = text.to_string();
        Ok(())
    }

    /// Marks the transcript persisted. The actual write is the host's
    /// debounced save; this only records that one was requested.
    pub fn save(&self) {
        self.save_generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn save_generation(&self) -> u64 {
        self.save_generation.load(Ordering::SeqCst)
    }
}

impl TranscriptView for Transcript {
    fn len(&self) -> usize {
        self.read().len()
    }

    fn get(&self, index: usize) -> Option<TranscriptEntry> {
        self.read().get(index).cloned()
    }

    fn position_of(&self, id: Uuid) -> Option<usize> {
        self.read().iter().position(|e| e.id == id)
    }
}

/// Read-through decorator that strips annotation blocks from model entries.
///
/// Filtering is computed per read, never cached, so a merger write is
/// immediately visible in both the raw store and the filtered view; the
/// only difference is the live stripping for primary-model consumers. User
/// entries pass through unmodified.
pub struct FilteredTranscriptView {
    inner: Arc<Transcript>,
}

impl FilteredTranscriptView {
    pub fn new(inner: Arc<Transcript>) -> Self {
        Self { inner }
    }
}

impl TranscriptView for FilteredTranscriptView {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn get(&self, index: usize) -> Option<TranscriptEntry> {
        self.inner.get(index).map(|mut entry| {
            if !entry.is_from_user {
                entry.raw_text = annotation::strip_blocks(&entry.raw_text);
            }
            entry
        })
    }

    fn position_of(&self, id: Uuid) -> Option<usize> {
        self.inner.position_of(id)
    }
}
