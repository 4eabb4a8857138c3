//! HWPX packages: zip containers of OWPML parts.
//!
//! The same merge as for HML documents, on the package's parts:
//!
//! 1. [`fragment::prepare`] parses and cleans each question's paragraphs
//! 2. [`HwpxSession`] rewrites them onto the template's header ids
//! 3. [`HwpxTemplate::compose`] numbers them into the first section and
//!    merges header entries and image items
//! 4. [`HwpxDraft::validate`] and [`HwpxDraft::package`] check and write
//!    the package, copying untouched entries from the template

pub mod assemble;
pub mod container;
pub mod fragment;
pub mod owpml;
pub mod package;
pub mod session;

pub use container::{HwpxContainer, is_package};
pub use fragment::{HwpxFragment, prepare};
pub use package::{HwpxDraft, HwpxTemplate};
pub use session::{HwpxSession, HwpxSessionOutput};
