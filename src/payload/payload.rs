use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

/// Content carried by a [`Payload`].
#[derive(Debug, Clone)]
pub enum Content {
    /// An opaque byte buffer.
    Bytes(Arc<[u8]>),
    /// A composite of sub-payloads published together.
    Batch(Vec<Arc<Payload>>),
}

/// Classification derived from the first serialized byte of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Anomaly,
    Normal,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Anomaly => "Anomaly",
            Classification::Normal => "Normal",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit of data moved through the broker.
///
/// A payload gets a fresh UUID and a millisecond timestamp at construction.
/// Correlation id and timestamp may be adjusted with the `with_*` builders
/// before the payload is shared; once wrapped in an `Arc` it is immutable.
#[derive(Debug, Clone)]
pub struct Payload {
    id: String,
    correlation_id: String,
    timestamp: i64,
    content: Content,
}

#[derive(Serialize)]
struct ManifestEntry<'a> {
    id: &'a str,
    correlation_id: &'a str,
    timestamp: i64,
    size: usize,
}

#[derive(Serialize)]
struct Manifest<'a> {
    id: &'a str,
    items: Vec<ManifestEntry<'a>>,
}

impl Payload {
    fn with_content(content: Content) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            correlation_id: String::new(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            content,
        }
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::with_content(Content::Bytes(Arc::from(bytes.into())))
    }

    pub fn from_string(text: impl Into<String>) -> Self {
        Self::from_bytes(text.into().into_bytes())
    }

    pub fn batch(items: Vec<Arc<Payload>>) -> Self {
        Self::with_content(Content::Batch(items))
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn is_batch(&self) -> bool {
        matches!(self.content, Content::Batch(_))
    }

    /// Sub-payloads of a batch, or an empty slice for byte content.
    pub fn items(&self) -> &[Arc<Payload>] {
        match &self.content {
            Content::Batch(items) => items,
            Content::Bytes(_) => &[],
        }
    }

    /// Byte view of the content.
    ///
    /// Byte content is borrowed as-is. A batch serializes to a JSON manifest
    /// describing its members.
    pub fn serialize(&self) -> Cow<'_, [u8]> {
        match &self.content {
            Content::Bytes(bytes) => Cow::Borrowed(bytes),
            Content::Batch(items) => {
                let manifest = Manifest {
                    id: &self.id,
                    items: items
                        .iter()
                        .map(|p| ManifestEntry {
                            id: &p.id,
                            correlation_id: &p.correlation_id,
                            timestamp: p.timestamp,
                            size: p.serialize().len(),
                        })
                        .collect(),
                };
                // a struct of strings and integers always serializes
                Cow::Owned(serde_json::to_vec(&manifest).unwrap_or_default())
            }
        }
    }

    pub fn classification(&self) -> Classification {
        match self.serialize().first() {
            Some(1) => Classification::Anomaly,
            _ => Classification::Normal,
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::from_string(text)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::from_bytes(bytes)
    }
}
