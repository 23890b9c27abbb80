use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Surrogate key of a registered tool.
///
/// Per-tool table names are formatted from this value, so it is only ever
/// built from an integer or from [`ToolId::parse`], never from free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolId(pub u64);

impl ToolId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Parse a tool id from user input. Accepts plain ASCII decimal digits only
    /// (no sign, whitespace or separators).
    pub fn parse(input: &str) -> Option<Self> {
        if input.is_empty() || !input.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        input.parse().ok().map(Self)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ToolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered tool (one row of the `tools` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub id: ToolId,
    pub name: String,
    pub description: String,
    /// Absolute, resolved path as of the last write
    pub source_directory: PathBuf,
    pub is_active: bool,
    pub app_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A source document indexed for a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: u64,
    pub tool_id: ToolId,
    pub file_path: String,
    /// SHA-256 of `content`, hex encoded
    pub content_hash: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn hash_content(content: &str) -> String {
        use sha2::{Digest, Sha256};
        let hash = Sha256::digest(content.as_bytes());
        hex::encode(hash)
    }
}

/// An embedded span of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorChunk {
    pub id: u64,
    pub tool_id: ToolId,
    pub document_id: u64,
    pub chunk_text: String,
    pub start_position: u64,
    pub end_position: u64,
    pub embedding: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Input for a new vector chunk
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub document_id: u64,
    pub chunk_text: String,
    pub start_position: u64,
    pub end_position: u64,
    pub embedding: Vec<u8>,
}

/// Outcome of writing a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentWrite {
    /// First version of this path
    Created(u64),
    /// New content for a path that already had a version; the old rows are gone
    Replaced { id: u64, previous: u64 },
    /// Same path and hash already stored
    Unchanged(u64),
}

impl DocumentWrite {
    pub fn id(&self) -> u64 {
        match self {
            Self::Created(id) | Self::Unchanged(id) => *id,
            Self::Replaced { id, .. } => *id,
        }
    }
}
