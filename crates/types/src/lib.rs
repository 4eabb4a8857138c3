//! Foundation types shared by every quire crate.
//!
//! - [`ids`]: newtypes for question ids, fragment-local ids and global ids
//! - [`category`]: the definition categories of the document header
//! - [`binary`]: embedded binary formats and transport encodings

pub mod binary;
pub mod category;
pub mod ids;

pub use binary::{BinaryFormat, PayloadEncoding};
pub use category::{DefinitionCategory, FontLang};
pub use ids::{GlobalId, LocalId, QuestionId};
