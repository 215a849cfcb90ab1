//! Stand-in for the frame analysis backend.
//!
//! The [`Worker`] pulls frames off the relay's pipeline endpoint, runs them
//! through an [`Analyzer`] and pushes one JSON result per frame back to the
//! session that sent it.

#![deny(unsafe_code)]

pub mod analyzer;
pub mod errors;
pub mod format;
pub mod worker;

pub use analyzer::{encode_result, Analysis, Analyzer, PlaceholderAnalyzer};
pub use errors::PipelineError;
pub use format::ImageFormat;
pub use worker::{Worker, WorkerConfig, WorkerStats};
