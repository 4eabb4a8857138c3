//! Reading and repacking the zip container of an HWPX document.
//!
//! Parts the merge does not touch are copied entry by entry without being
//! decompressed, so they stay byte-identical to the template's.

use crate::error::PackageError;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const HEADER_PART: &str = "Contents/header.xml";
pub const SECTION_PART: &str = "Contents/section0.xml";
pub const MANIFEST_PART: &str = "Contents/content.hpf";
pub const MIMETYPE_PART: &str = "mimetype";
pub const BIN_DATA_DIR: &str = "BinData";

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// True when `bytes` look like a zip container rather than a bare XML file.
pub fn is_package(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_MAGIC)
}

/// A template package held in memory.
#[derive(Debug, Clone)]
pub struct HwpxContainer {
    bytes: Vec<u8>,
    names: Vec<String>,
}

impl HwpxContainer {
    pub fn open(bytes: Vec<u8>) -> Result<Self, PackageError> {
        let names = {
            let archive = ZipArchive::new(Cursor::new(bytes.as_slice()))?;
            archive.file_names().map(str::to_string).collect()
        };
        Ok(Self { bytes, names })
    }

    /// Entry names in archive order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn read(&self, name: &str) -> Result<Vec<u8>, PackageError> {
        let mut archive = ZipArchive::new(Cursor::new(self.bytes.as_slice()))?;
        let mut file = match archive.by_name(name) {
            Ok(file) => file,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(PackageError::MissingPart(name.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    pub fn read_text(&self, name: &str) -> Result<String, PackageError> {
        String::from_utf8(self.read(name)?).map_err(|_| PackageError::PartEncoding {
            name: name.to_string(),
        })
    }

    /// Writes a new package: `replaced` parts take the place of the
    /// template's entries of the same name, `added` parts follow the
    /// template's entries, and everything else is copied raw.
    pub fn repack(
        &self,
        replaced: &BTreeMap<String, Vec<u8>>,
        added: &[(String, Vec<u8>)],
    ) -> Result<Vec<u8>, PackageError> {
        let mut archive = ZipArchive::new(Cursor::new(self.bytes.as_slice()))?;
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let mut written = 0usize;

        for index in 0..archive.len() {
            let file = archive.by_index_raw(index)?;
            let name = file.name().to_string();
            match replaced.get(&name) {
                Some(data) => {
                    drop(file);
                    writer.start_file(name.as_str(), options_for(&name))?;
                    writer.write_all(data)?;
                    written += 1;
                }
                None => writer.raw_copy_file(file)?,
            }
        }
        for (name, data) in replaced {
            if !self.contains(name) {
                writer.start_file(name.as_str(), options_for(name))?;
                writer.write_all(data)?;
                written += 1;
            }
        }
        for (name, data) in added {
            writer.start_file(name.as_str(), options_for(name))?;
            writer.write_all(data)?;
        }

        let out = writer.finish()?.into_inner();
        log::debug!(
            "repacked {} entries ({} rewritten, {} added) into {} bytes",
            self.names.len(),
            written,
            added.len(),
            out.len()
        );
        Ok(out)
    }
}

fn options_for(name: &str) -> SimpleFileOptions {
    let method = if name == MIMETYPE_PART {
        CompressionMethod::Stored
    } else {
        CompressionMethod::Deflated
    };
    SimpleFileOptions::default().compression_method(method)
}
