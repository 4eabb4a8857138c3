//! Merge pipeline orchestration.
//!
//! - [`MergeEngineBuilder`]: Fluent builder wiring sources and configuration
//! - [`MergeEngine`]: Runs one merge per [`MergeRequest`]
//! - [`MergeReport`]: Degraded questions and warnings of a finished merge
//!
//! # Example
//!
//! ```ignore
//! use quire::{MergeEngineBuilder, MergeRequest};
//!
//! let engine = MergeEngineBuilder::new()
//!     .with_fragment_dir("questions")
//!     .with_template_dir("templates")
//!     .build()?;
//!
//! let output = engine.merge(&MergeRequest::new("midterm.hml", ["q3", "q1", "q2"]))?;
//! std::fs::write("exam.hml", &output.bytes)?;
//! ```

pub mod api;
mod builder;
pub mod config;
mod engine;

pub use api::{DegradedQuestion, MergeOutput, MergeReport, MergeRequest, QuestionWarning};
pub use builder::MergeEngineBuilder;
pub use config::load_config;
pub use engine::MergeEngine;
