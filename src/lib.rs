//! # Sideband: Dual-Model Generation Coordination
//!
//! Sideband augments a chat host driven by a primary, narrative-generating
//! language model with a secondary, independently configured model that
//! produces structured annotations from the narrative text. The host is
//! modeled through three abstractions the pipeline consumes: an event bus,
//! a transcript store, and a prompt assembler.
//!
//! ## Components
//!
//! - Event bus ([`event_bus`]): broadcast hub carrying the host's
//!   "generation finished" signal in and the "message available" signal
//!   back out.
//! - Transcript ([`transcript`]): the host's ordered entry store plus the
//!   read-through decorator that hides merged annotation blocks from
//!   primary-model consumers while the pipeline is enabled.
//! - Annotation handling ([`annotation`]): the fixed delimiter pair and the
//!   block matcher shared by the filter, the repair step, and the merger.
//! - Restriction directive ([`directive`]): the standing instruction
//!   registered with the prompt assembler that tells the primary model not
//!   to emit annotation blocks itself.
//! - Provider adapter ([`provider`]): translates a normalized system/user
//!   request into the native or OpenAI-compatible wire format and folds
//!   every transport failure into a result object.
//! - Freshness validation ([`validator`]): guards against reprocessing a
//!   reply left over from a failed host generation.
//! - Coordination ([`coordinator`], [`pipeline`]): the per-signal state
//!   machine, the fixed-delay retry loop, and the enable/disable toggle
//!   that installs and removes both hooks as one transition.
//! - Observability ([`status`], [`stats`]): transient user-visible status
//!   and a process-wide failure counter, neither of which drives control
//!   flow.
//!
//! ## Control flow
//!
//! ```text
//! enable -> directive + filter installed
//!        -> GenerationEnded -> freshness check -> repair stray block
//!        -> dispatch (retry on empty) -> merge -> MessageAvailable
//! disable -> filter + directive torn down in reverse order
//! ```

pub mod annotation;
pub mod config;
pub mod coordinator;
pub mod directive;
pub mod error;
pub mod event_bus;
pub mod merger;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod stats;
pub mod status;
pub mod timestamp;
pub mod transcript;
pub mod validator;

pub use config::{PipelineConfig, ProviderConfig, WireFormat};
pub use error::{Error, InternalResult};
pub use event_bus::{Event, EventBus, EventType};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineError, PipelineResult};
pub use status::Status;
pub use transcript::{Transcript, TranscriptEntry, TranscriptView};
