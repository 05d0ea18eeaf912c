//! Object identifiers and descriptors
//!
//! An `ObjectDescriptor` is the caller's claim about an object before it is
//! stored: its content hash and its size in bytes. Descriptors are created by
//! the metadata layer; the store only consumes them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::key::transform_key;

/// Hex-encoded content digest (SHA-256 for LFS objects)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    /// Parse an identifier, accepting only non-empty ASCII hex strings
    ///
    /// Length is not checked: short ids take the unsharded
    /// branch of `transform_key`.
    pub fn parse(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(StoreError::InvalidIdentifier(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Sharded storage key for this identifier
    pub fn storage_key(&self) -> String {
        transform_key(&self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// `{oid, size}` pair handed in by the metadata layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    pub oid: ObjectId,
    pub size: u64,
}

impl ObjectDescriptor {
    pub fn new(oid: ObjectId, size: u64) -> Self {
        Self { oid, size }
    }

    /// Parse the oid and build a descriptor in one step
    pub fn parse(oid: &str, size: u64) -> Result<Self> {
        Ok(Self::new(ObjectId::parse(oid)?, size))
    }

    pub fn storage_key(&self) -> String {
        self.oid.storage_key()
    }
}
