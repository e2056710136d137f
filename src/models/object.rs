//! Head metadata for a stored object.

use serde::Serialize;

/// Content type used when the catalogue has none recorded for an object.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Size/type information readable without downloading the object body.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectHead {
    /// MIME type as recorded at upload time.
    pub content_type: String,

    /// Size in bytes.
    pub size: i64,
}
