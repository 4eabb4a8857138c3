//! Binary storage: encoding payloads for the tail section and building
//! the binary index entries that point at them.

use crate::config::BinaryConfig;
use crate::dedup::BinaryResource;
use crate::error::StorageError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use quire_types::GlobalId;
use quire_xml::{Element, Node};
use std::collections::BTreeSet;
use std::io::{Read, Write};

/// Decodes base64 text, ignoring whitespace and a `data:` URI prefix.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let text = match text.trim_start().strip_prefix("data:") {
        Some(uri) => uri.split_once(',').map_or(uri, |(_, data)| data),
        None => text,
    };
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD.decode(compact)
}

pub fn deflate_raw(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

pub fn inflate_raw(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    DeflateDecoder::new(bytes).read_to_end(&mut out)?;
    Ok(out)
}

/// A payload ready for the storage section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    /// Base64 text, possibly wrapped.
    pub text: String,
    /// Length of the stored stream (after compression, before base64).
    pub size: usize,
    pub compressed: bool,
}

/// Encodes `bytes`, deflating first when asked and when it helps.
pub fn encode_payload(
    bytes: &[u8],
    try_compress: bool,
    line_width: usize,
) -> Result<EncodedPayload, StorageError> {
    let mut stored = None;
    if try_compress {
        let deflated = deflate_raw(bytes)?;
        if deflated.len() < bytes.len() {
            stored = Some(deflated);
        }
    }
    let compressed = stored.is_some();
    let stream = stored.as_deref().unwrap_or(bytes);
    Ok(EncodedPayload {
        text: wrap_lines(&STANDARD.encode(stream), line_width),
        size: stream.len(),
        compressed,
    })
}

/// Reverses `encode_payload`.
pub fn decode_payload(text: &str, compressed: bool) -> Result<Vec<u8>, StorageError> {
    let stream = decode_base64(text)?;
    if compressed {
        Ok(inflate_raw(&stream)?)
    } else {
        Ok(stream)
    }
}

fn wrap_lines(encoded: &str, width: usize) -> String {
    if width == 0 || encoded.len() <= width {
        return encoded.to_string();
    }
    // base64 output is ASCII, so byte chunks are char boundaries.
    encoded
        .as_bytes()
        .chunks(width)
        .map(String::from_utf8_lossy)
        .collect::<Vec<_>>()
        .join("\r\n")
}

/// New binary index entries and storage blobs, in item order.
#[derive(Debug, Clone, Default)]
pub struct BinaryStorage {
    pub items: Vec<Element>,
    pub blobs: Vec<Element>,
}

pub struct BinaryWriter<'a> {
    config: &'a BinaryConfig,
    compress: BTreeSet<String>,
}

impl<'a> BinaryWriter<'a> {
    pub fn new(config: &'a BinaryConfig) -> Self {
        let compress = config
            .compress_formats
            .iter()
            .map(|f| f.to_ascii_lowercase())
            .collect();
        Self { config, compress }
    }

    /// Encodes every resource and verifies each blob decodes back to the
    /// original bytes. `first_item` is the position the first new item
    /// takes in the binary index.
    pub fn write(
        &self,
        resources: &[BinaryResource],
        first_item: GlobalId,
    ) -> Result<BinaryStorage, StorageError> {
        let mut storage = BinaryStorage::default();
        let mut expected = first_item;

        for resource in resources {
            if resource.item_id != expected {
                return Err(StorageError::ItemOrder {
                    expected,
                    found: resource.item_id,
                });
            }
            expected = expected.next();

            let try_compress = self.compress.contains(resource.format.as_str());
            let payload = encode_payload(&resource.bytes, try_compress, self.config.line_width)?;
            verify(resource, &payload)?;

            storage.items.push(
                Element::new("BINITEM")
                    .with_attr("Type", "Embedding")
                    .with_attr("BinData", resource.data_id)
                    .with_attr("Format", resource.format.as_str()),
            );
            storage.blobs.push(
                Element::new("BINDATA")
                    .with_attr("Id", resource.data_id)
                    .with_attr("Size", payload.size)
                    .with_attr("Encoding", "Base64")
                    .with_attr("Compress", payload.compressed)
                    .with_text(payload.text),
            );
            log::debug!(
                "stored binary {} ({} bytes as {}{})",
                resource.data_id,
                resource.bytes.len(),
                payload.size,
                if payload.compressed { ", deflated" } else { "" }
            );
        }

        if storage.items.len() != storage.blobs.len() {
            return Err(StorageError::Cardinality {
                items: storage.items.len(),
                blobs: storage.blobs.len(),
            });
        }
        Ok(storage)
    }
}

fn verify(resource: &BinaryResource, payload: &EncodedPayload) -> Result<(), StorageError> {
    let stream = decode_base64(&payload.text)?;
    if stream.len() != payload.size {
        return Err(StorageError::SizeMismatch {
            id: resource.data_id,
            declared: payload.size,
            actual: stream.len(),
        });
    }
    let restored = if payload.compressed {
        inflate_raw(&stream)?
    } else {
        stream
    };
    if restored != resource.bytes {
        return Err(StorageError::RoundTrip {
            id: resource.data_id,
        });
    }
    Ok(())
}

/// Template storage followed by the new blobs, with `Count` corrected.
pub fn merge_storage(template: Option<&Element>, blobs: &[Element]) -> Element {
    let mut storage = template
        .cloned()
        .unwrap_or_else(|| Element::new("BINDATASTORAGE"));
    storage.clear_spans();
    storage
        .children
        .extend(blobs.iter().cloned().map(Node::Element));
    let count = storage.elements().filter(|el| el.name == "BINDATA").count();
    storage.set_attr("Count", count);
    storage
}

/// Checks every index entry that embeds data has exactly one blob.
pub fn check_cardinality(
    mapping: Option<&Element>,
    storage: Option<&Element>,
) -> Result<(), StorageError> {
    let referenced: BTreeSet<&str> = mapping
        .and_then(|m| m.child("BINDATALIST"))
        .into_iter()
        .flat_map(|list| list.elements())
        .filter(|item| item.attr("Type") != Some("Link"))
        .filter_map(|item| item.attr("BinData"))
        .collect();
    let stored: BTreeSet<&str> = storage
        .into_iter()
        .flat_map(|s| s.elements())
        .filter(|blob| blob.name == "BINDATA")
        .filter_map(|blob| blob.attr("Id"))
        .collect();
    if referenced.is_subset(&stored) {
        Ok(())
    } else {
        Err(StorageError::Cardinality {
            items: referenced.len(),
            blobs: stored.len(),
        })
    }
}
