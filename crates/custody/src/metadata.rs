//! Per-asset metadata records
//!
//! A [`FileMetadata`] is an ordered string-keyed map of scalar, byte and
//! nested values. It serializes to a JSON object or a CBOR map; byte values
//! become CBOR byte strings.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;

/// Well-known metadata keys.
pub mod keys {
    pub const MEDIA_TYPE: &str = "media_type";
    pub const FILE_NAME: &str = "file_name";
    pub const FILE_SIZE: &str = "file_size";
    pub const LAST_MODIFIED: &str = "last_modified";
    pub const TIME_CREATED: &str = "time_created";
    pub const ASSET_ORIGIN: &str = "asset_origin";
    pub const ASSET_SIGNATURE: &str = "asset_signature";
    pub const SHA256: &str = "sha256";
    pub const MD5: &str = "md5";
    pub const BLAKE3: &str = "blake3";
    pub const PROJECT_ID: &str = "project_id";
    pub const PROJECT_PATH: &str = "project_path";
    pub const AUTHOR: &str = "author";
    pub const PROOFMODE: &str = "proofmode";
    pub const WACZ: &str = "wacz";
}

/// A single metadata value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataValue {
    Text(String),
    Integer(i64),
    Bytes(Vec<u8>),
    Map(BTreeMap<String, MetadataValue>),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, MetadataValue>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl Serialize for MetadataValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(s) => serializer.serialize_str(s),
            Self::Integer(n) => serializer.serialize_i64(*n),
            Self::Bytes(b) => serializer.serialize_bytes(b),
            Self::Map(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (k, v) in m {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<u64> for MetadataValue {
    fn from(v: u64) -> Self {
        Self::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<Vec<u8>> for MetadataValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<BTreeMap<String, MetadataValue>> for MetadataValue {
    fn from(v: BTreeMap<String, MetadataValue>) -> Self {
        Self::Map(v)
    }
}

/// Metadata for one uploaded asset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMetadata {
    entries: BTreeMap<String, MetadataValue>,
}

impl FileMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Set a key only if it is not present yet. Returns whether it was set.
    pub fn insert_if_absent(
        &mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> bool {
        match self.entries.entry(key.into()) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(value.into());
                true
            }
        }
    }

    /// Overlay every entry of `other`, replacing values already present.
    pub fn merge_from(&mut self, other: FileMetadata) {
        self.entries.extend(other.entries);
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.entries.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(MetadataValue::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetadataValue)> {
        self.entries.iter()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>, ciborium::ser::Error<std::io::Error>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)?;
        Ok(buf)
    }
}

impl Serialize for FileMetadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
