//! Embedded binary formats and the encodings they travel in.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared format of an embedded binary, as written to `BINITEM@Format`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BinaryFormat {
    Png,
    Jpg,
    Gif,
    Bmp,
    Svg,
    Wmf,
    Emf,
    Tiff,
    Other(String),
}

impl BinaryFormat {
    /// Maps a file extension or format tag, case-insensitively.
    pub fn from_tag(tag: &str) -> Self {
        let tag = tag.trim().trim_start_matches('.').to_ascii_lowercase();
        match tag.as_str() {
            "png" => BinaryFormat::Png,
            "jpg" | "jpeg" => BinaryFormat::Jpg,
            "gif" => BinaryFormat::Gif,
            "bmp" => BinaryFormat::Bmp,
            "svg" => BinaryFormat::Svg,
            "wmf" => BinaryFormat::Wmf,
            "emf" => BinaryFormat::Emf,
            "tif" | "tiff" => BinaryFormat::Tiff,
            _ => BinaryFormat::Other(tag),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            BinaryFormat::Png => "png",
            BinaryFormat::Jpg => "jpg",
            BinaryFormat::Gif => "gif",
            BinaryFormat::Bmp => "bmp",
            BinaryFormat::Svg => "svg",
            BinaryFormat::Wmf => "wmf",
            BinaryFormat::Emf => "emf",
            BinaryFormat::Tiff => "tif",
            BinaryFormat::Other(tag) => tag,
        }
    }

    /// MIME type used in package manifests.
    pub fn media_type(&self) -> &'static str {
        match self {
            BinaryFormat::Png => "image/png",
            BinaryFormat::Jpg => "image/jpeg",
            BinaryFormat::Gif => "image/gif",
            BinaryFormat::Bmp => "image/bmp",
            BinaryFormat::Svg => "image/svg+xml",
            BinaryFormat::Wmf => "image/x-wmf",
            BinaryFormat::Emf => "image/x-emf",
            BinaryFormat::Tiff => "image/tiff",
            BinaryFormat::Other(_) => "application/octet-stream",
        }
    }
}

impl From<String> for BinaryFormat {
    fn from(s: String) -> Self {
        BinaryFormat::from_tag(&s)
    }
}

impl From<BinaryFormat> for String {
    fn from(f: BinaryFormat) -> Self {
        f.as_str().to_owned()
    }
}

impl fmt::Display for BinaryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a payload's bytes are encoded on the way in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayloadEncoding {
    /// The bytes are the binary itself.
    #[default]
    Raw,
    /// The bytes are base64 text, possibly with line breaks or a data-uri prefix.
    Base64,
    /// Base64 text of a raw deflate stream.
    Base64Deflate,
}
