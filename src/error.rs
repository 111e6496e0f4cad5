//! Error taxonomy for the extraction pipeline.
//!
//! Only [`PipelineError::NotFound`] and [`PipelineError::QueueFull`] ever reach
//! a caller of the queue. Decode and recognition failures are absorbed per role,
//! transport failures are absorbed into a semantic `NoResult`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bytes are not a decodable image.
    #[error("image could not be decoded: {0}")]
    Decode(String),

    /// The recognition engine ran but failed.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// Semantic extraction service unreachable, timed out or returned non-success.
    #[error("semantic service transport error: {0}")]
    Transport(String),

    /// Referenced book record missing at job start.
    #[error("book {0} not found")]
    NotFound(Uuid),

    /// Submission rejected because the queue is at capacity.
    #[error("processing queue is full ({capacity} jobs pending), try again later")]
    QueueFull { capacity: usize },

    /// Processing queue worker is gone.
    #[error("processing queue is closed")]
    QueueClosed,

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<image::ImageError> for PipelineError {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::Decoding(_)
            | image::ImageError::Unsupported(_)
            | image::ImageError::IoError(_) => {
                PipelineError::Decode(e.to_string())
            }
            other => PipelineError::Recognition(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        PipelineError::Transport(e.to_string())
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
