//! Book Extractor - turns photographed book pages into bibliographic records.
//!
//! Captures are rectified, recognized per role, then resolved by the semantic
//! extractor with the pattern parser as fallback. All per-book work is
//! serialized through a single-worker [`queue::ProcessingQueue`].

pub mod config;
pub mod error;
pub mod extractor;
pub mod ocr;
pub mod pattern;
pub mod pipeline;
pub mod queue;
pub mod rectify;
pub mod schema;
pub mod semantic;
pub mod store;

pub use error::{PipelineError, PipelineResult};
pub use extractor::{merge_into, Orchestrator};
pub use pipeline::{BookJob, BookPipeline};
pub use queue::ProcessingQueue;
pub use schema::{BookRecord, CandidateRecord, Provenance, RawCapture, Role};
