//! Core domain types for chatloom
//!
//! Threads and thread items are stored as JSON documents. Both carry a
//! `#[serde(flatten)]` map so that fields the store does not know about
//! survive a save/load round-trip unchanged; the record schema can evolve
//! without touching the storage layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::PathBuf;

// ============================================
// Threads and items
// ============================================

/// A conversation container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    /// Unique identifier
    pub id: String,
    /// When the thread was created
    pub created_at: DateTime<Utc>,
    /// Display title (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Fields beyond the ones the store indexes; round-trips untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Thread {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
            title: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// One message or event within a thread.
///
/// The per-thread ordering counter (`position`) is assigned by the store on
/// append and lives in an indexed column, not in the document itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadItem {
    /// Unique identifier, unique across the whole store
    pub id: String,
    /// When the item was created
    pub created_at: DateTime<Utc>,
    /// Fields beyond the ones the store indexes; round-trips untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ThreadItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
            extra: serde_json::Map::new(),
        }
    }
}

// ============================================
// Pagination
// ============================================

/// One page of a keyset-paginated listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// Records in this page, in the requested order
    pub data: Vec<T>,
    /// Whether more records exist past this page
    pub has_more: bool,
    /// Cursor for the next page (id of the last record returned)
    pub after: Option<String>,
}

/// Listing direction.
///
/// Unrecognized input normalizes to descending rather than erroring; listing
/// callers pass this through from untrusted request parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// Parse an order string, defaulting to descending for anything unknown.
    pub fn parse_lenient(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "asc" => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }

    /// SQL direction keyword
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    /// Keyset comparison operator: rows strictly past the anchor
    pub fn comparator(&self) -> &'static str {
        match self {
            SortOrder::Asc => ">",
            SortOrder::Desc => "<",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================
// Attachments
// ============================================

/// A reference to an uploaded file.
///
/// Discriminated by MIME type at creation: `image/*` payloads become the
/// image variant and carry a preview URL, everything else is a plain file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Attachment {
    File(FileAttachment),
    Image(ImageAttachment),
}

/// A non-image attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAttachment {
    pub id: String,
    /// Declared display name
    pub name: String,
    pub mime_type: String,
    /// Payload size in bytes
    pub size: u64,
    /// Reserved for direct-upload flows; always `None` for this store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_url: Option<String>,
}

/// An image attachment with a browsable preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAttachment {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_url: Option<String>,
    /// Public URL or local `file://` reference to the stored bytes
    pub preview_url: String,
}

impl Attachment {
    pub fn id(&self) -> &str {
        match self {
            Attachment::File(a) => &a.id,
            Attachment::Image(a) => &a.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Attachment::File(a) => &a.name,
            Attachment::Image(a) => &a.name,
        }
    }

    pub fn mime_type(&self) -> &str {
        match self {
            Attachment::File(a) => &a.mime_type,
            Attachment::Image(a) => &a.mime_type,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            Attachment::File(a) => a.size,
            Attachment::Image(a) => a.size,
        }
    }

    /// Preview URL, present only for the image variant
    pub fn preview_url(&self) -> Option<&str> {
        match self {
            Attachment::File(_) => None,
            Attachment::Image(a) => Some(&a.preview_url),
        }
    }
}

/// Caller-declared attributes of a new attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentCreateParams {
    /// Declared display name (its base name becomes the stored filename)
    pub name: String,
    pub mime_type: String,
}

/// Where the bytes of a new attachment come from.
///
/// An explicit, typed source: a buffer the caller already holds, a path to an
/// existing file, or a readable handle drained to end-of-stream.
pub enum AttachmentPayload {
    Bytes(Vec<u8>),
    FilePath(PathBuf),
    Reader(Box<dyn Read + Send>),
}

impl fmt::Debug for AttachmentPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentPayload::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            AttachmentPayload::FilePath(p) => f.debug_tuple("FilePath").field(p).finish(),
            AttachmentPayload::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

impl From<Vec<u8>> for AttachmentPayload {
    fn from(bytes: Vec<u8>) -> Self {
        AttachmentPayload::Bytes(bytes)
    }
}

impl From<&[u8]> for AttachmentPayload {
    fn from(bytes: &[u8]) -> Self {
        AttachmentPayload::Bytes(bytes.to_vec())
    }
}

impl From<PathBuf> for AttachmentPayload {
    fn from(path: PathBuf) -> Self {
        AttachmentPayload::FilePath(path)
    }
}
