//! Stream identity
//!
//! A `StreamId` names one logical log stream: the host and file the lines come
//! from, the declared log type, and the shard/schema coordinates the collector
//! files them under. Frames are keyed by full value equality of this type.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of one logical log stream.
///
/// Two writes carrying value-equal identities land in the same open frame.
/// The identity is immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId {
    host_name: String,
    file_path: String,
    log_type: String,
    shard: u32,
    schema_version: u32,
}

impl StreamId {
    /// Create a new stream identity
    pub fn new(
        host_name: impl Into<String>,
        file_path: impl Into<String>,
        log_type: impl Into<String>,
        shard: u32,
        schema_version: u32,
    ) -> Self {
        Self {
            host_name: host_name.into(),
            file_path: file_path.into(),
            log_type: log_type.into(),
            shard,
            schema_version,
        }
    }

    /// Host the stream originates from
    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    /// File path of the stream; the capacity and routing selector key
    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    /// Declared log type
    pub fn log_type(&self) -> &str {
        &self.log_type
    }

    /// Shard coordinate carried in the frame header
    pub fn shard(&self) -> u32 {
        self.shard
    }

    /// Declared schema version
    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Number of header bytes the identity occupies in a closed frame:
    /// three length-prefixed strings plus the shard and version words
    pub fn encoded_len(&self) -> usize {
        2 + self.host_name.len() + 2 + self.file_path.len() + 2 + self.log_type.len() + 4 + 4
    }

    /// Whether every string field fits a 16-bit length prefix
    pub fn is_encodable(&self) -> bool {
        self.host_name.len() <= u16::MAX as usize
            && self.file_path.len() <= u16::MAX as usize
            && self.log_type.len() <= u16::MAX as usize
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}[{}]", self.host_name, self.file_path, self.log_type)
    }
}
