//! `csi` file header: magic, metadata block and optional property block.
//!
//! ```text
//! "csi\0"  u32 block_count  { u16 tag  u64 len  payload[len] }*
//! ```
//!
//! Both known blocks hold `u32 pair_count` followed by length-prefixed
//! key/value strings. Blocks with unknown tags are skipped by length.

use std::io::{Read, Write};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, FormatError};
use crate::io::{BinaryReader, BinaryWriter};
use crate::schema::{API_VERSION, BINARY_VERSION, SCHEMA_NAME};

pub const MAGIC: [u8; 4] = *b"csi\0";

pub const TAG_METADATA: u16 = 1;
pub const TAG_PROPERTIES: u16 = 2;

pub const KEY_SCHEMA: &str = "schema";
pub const KEY_API_VERSION: &str = "api_version";
pub const KEY_BINARY_VERSION: &str = "binary_version";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Schema identity and versions. Checked on load.
    pub metadata: IndexMap<String, String>,
    /// Free-form properties such as the producing tool.
    pub properties: IndexMap<String, String>,
}

impl Header {
    /// Header carrying the running schema's identity and no properties.
    pub fn new() -> Self {
        let mut metadata = IndexMap::new();
        metadata.insert(KEY_SCHEMA.to_string(), SCHEMA_NAME.to_string());
        metadata.insert(KEY_API_VERSION.to_string(), API_VERSION.to_string());
        metadata.insert(KEY_BINARY_VERSION.to_string(), BINARY_VERSION.to_string());
        Header {
            metadata,
            properties: IndexMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Checks the metadata against the running schema.
    pub fn validate(&self) -> Result<(), FormatError> {
        for (field, expected) in [
            (KEY_SCHEMA, SCHEMA_NAME),
            (KEY_API_VERSION, API_VERSION),
            (KEY_BINARY_VERSION, BINARY_VERSION),
        ] {
            let found = self
                .metadata
                .get(field)
                .ok_or_else(|| FormatError::MissingMetadata {
                    what: field.to_string(),
                })?;
            if found != expected {
                return Err(FormatError::VersionMismatch {
                    field: field.to_string(),
                    expected: expected.to_string(),
                    found: found.clone(),
                });
            }
        }
        Ok(())
    }

    /// Writes the block count and blocks. The magic is written by the caller.
    pub(crate) fn write<W: Write>(&self, w: &mut BinaryWriter<W>) -> Result<(), CoreError> {
        let mut blocks = vec![(TAG_METADATA, encode_pairs(&self.metadata)?)];
        if !self.properties.is_empty() {
            blocks.push((TAG_PROPERTIES, encode_pairs(&self.properties)?));
        }
        w.write_u32(blocks.len() as u32)?;
        for (tag, payload) in blocks {
            w.write_u16(tag)?;
            w.write_u64(payload.len() as u64)?;
            w.write_bytes(&payload)?;
        }
        Ok(())
    }

    /// Reads the block count and blocks following the magic.
    pub(crate) fn read<R: Read>(r: &mut BinaryReader<R>) -> Result<Header, CoreError> {
        let count = r.read_u32()?;
        let mut header = Header::default();
        let mut saw_metadata = false;
        for _ in 0..count {
            let tag = r.read_u16()?;
            let len = r.read_u64()?;
            match tag {
                TAG_METADATA => {
                    header.metadata = decode_pairs(&r.read_bytes(len)?)?;
                    saw_metadata = true;
                }
                TAG_PROPERTIES => header.properties = decode_pairs(&r.read_bytes(len)?)?,
                _ => r.skip(len)?,
            }
        }
        if !saw_metadata {
            return Err(FormatError::MissingMetadata {
                what: "metadata block".to_string(),
            }
            .into());
        }
        Ok(header)
    }
}

fn encode_pairs(pairs: &IndexMap<String, String>) -> Result<Vec<u8>, CoreError> {
    let mut w = BinaryWriter::new(Vec::new());
    w.write_u32(pairs.len() as u32)?;
    for (key, value) in pairs {
        w.write_str(key)?;
        w.write_str(value)?;
    }
    Ok(w.into_inner())
}

fn decode_pairs(payload: &[u8]) -> Result<IndexMap<String, String>, CoreError> {
    let mut r = BinaryReader::new(payload);
    let count = r.read_u32()?;
    let mut pairs = IndexMap::new();
    for _ in 0..count {
        let key = r.read_string()?;
        let value = r.read_string()?;
        pairs.insert(key, value);
    }
    if r.bytes_read() != payload.len() as u64 {
        return Err(CoreError::malformed("trailing bytes in header block"));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(header: &Header) -> Vec<u8> {
        let mut w = BinaryWriter::new(Vec::new());
        header.write(&mut w).unwrap();
        w.into_inner()
    }

    #[test]
    fn header_roundtrip_keeps_order() {
        let header = Header::new()
            .with_property("tool", "csasg-test")
            .with_property("source_root", "/src");
        let bytes = encoded(&header);
        let back = Header::read(&mut BinaryReader::new(&bytes[..])).unwrap();
        assert_eq!(back, header);
        assert_eq!(back.property("tool"), Some("csasg-test"));
        let keys: Vec<_> = back.properties.keys().cloned().collect();
        assert_eq!(keys, vec!["tool", "source_root"]);
        back.validate().unwrap();
    }

    #[test]
    fn unknown_blocks_are_skipped() {
        let mut w = BinaryWriter::new(Vec::new());
        w.write_u32(2).unwrap();
        w.write_u16(77).unwrap();
        w.write_u64(3).unwrap();
        w.write_bytes(&[9, 9, 9]).unwrap();
        let meta = encode_pairs(&Header::new().metadata).unwrap();
        w.write_u16(TAG_METADATA).unwrap();
        w.write_u64(meta.len() as u64).unwrap();
        w.write_bytes(&meta).unwrap();
        let bytes = w.into_inner();

        let header = Header::read(&mut BinaryReader::new(&bytes[..])).unwrap();
        assert_eq!(header.metadata, Header::new().metadata);
        assert!(header.properties.is_empty());
    }

    #[test]
    fn missing_block_or_key() {
        let mut w = BinaryWriter::new(Vec::new());
        w.write_u32(0).unwrap();
        let bytes = w.into_inner();
        assert!(matches!(
            Header::read(&mut BinaryReader::new(&bytes[..])),
            Err(CoreError::Format(FormatError::MissingMetadata { .. }))
        ));

        let mut header = Header::new();
        header.metadata.shift_remove(KEY_BINARY_VERSION);
        assert_eq!(
            header.validate(),
            Err(FormatError::MissingMetadata {
                what: KEY_BINARY_VERSION.to_string()
            })
        );
    }

    #[test]
    fn version_mismatch_names_field() {
        let mut header = Header::new();
        header
            .metadata
            .insert(KEY_API_VERSION.to_string(), "0.9.0".to_string());
        assert_eq!(
            header.validate(),
            Err(FormatError::VersionMismatch {
                field: KEY_API_VERSION.to_string(),
                expected: API_VERSION.to_string(),
                found: "0.9.0".to_string(),
            })
        );
    }
}
