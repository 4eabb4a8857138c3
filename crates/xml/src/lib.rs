//! An owned, mutable XML tree for document surgery.
//!
//! - [`tree`]: `Element`/`Node` with byte spans into the parsed source
//! - [`parser`]: strict and lenient parsing on top of quick-xml events
//! - [`writer`]: serialisation back to markup
//! - [`repair`]: best-effort text repairs for markup that fails to parse

pub mod error;
pub mod parser;
pub mod repair;
pub mod tree;
pub mod writer;

pub use error::XmlError;
pub use parser::{ParseOptions, parse_document, parse_fragment};
pub use tree::{Attribute, Element, Node, NodePath, Span};
pub use writer::{write_element, write_nodes};
