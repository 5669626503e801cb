use thiserror::Error;

use crate::event_bus::EventError;
use crate::pipeline::PipelineError;
use crate::provider::ProviderError;
use crate::transcript::TranscriptError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Event error: {0}")]
    Event(#[from] EventError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Transcript error: {0}")]
    Transcript(#[from] TranscriptError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}
