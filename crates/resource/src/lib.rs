//! Filesystem sources for the quire merge engine.
//!
//! This crate provides directory-backed implementations of the
//! `FragmentSource` and `TemplateSource` traits from quire-traits.
//!
//! ## Available Sources
//!
//! - [`FilesystemFragmentSource`]: one directory (or file) per question
//! - [`FilesystemTemplateSource`]: one file per named template
//!
//! ## Re-exports
//!
//! For convenience, we also re-export the in-memory sources from quire-traits.

mod fragments;
mod root;
mod templates;

pub use fragments::FilesystemFragmentSource;
pub use templates::FilesystemTemplateSource;

pub use quire_traits::{InMemoryFragmentSource, InMemoryTemplateSource};
