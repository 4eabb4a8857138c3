use quick_xml::events::attributes::AttrError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum XmlError {
    #[error("XML syntax error at byte {position}: {source}")]
    Syntax {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("Attribute error: {0}")]
    Attribute(#[from] AttrError),

    #[error("Escape error: {0}")]
    Escape(#[from] quick_xml::escape::EscapeError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Unknown entity reference '&{0};'")]
    UnknownEntity(String),

    #[error("Element <{0}> is never closed")]
    Unclosed(String),

    #[error("Document has no root element")]
    MissingRoot,

    #[error("Document has more than one root element (second is <{0}>)")]
    MultipleRoots(String),

    #[error("Text outside the root element")]
    StrayText,

    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Invalid UTF-8: {0}")]
    FromUtf8(#[from] std::string::FromUtf8Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
