pub mod error;
pub mod fragment;
pub mod template;

pub use error::SourceError;
pub use fragment::{BinaryPayload, FragmentRecord, FragmentSource, InMemoryFragmentSource};
pub use template::{InMemoryTemplateSource, SharedTemplateData, TemplateSource};
