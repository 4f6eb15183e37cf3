//! Content blocks carried in the `session/prompt` payload.

use serde::{Deserialize, Serialize};

/// Default MIME type for document resources.
pub const MIME_MARKDOWN: &str = "text/markdown";
/// Default MIME type for image attachments.
pub const MIME_PNG: &str = "image/png";
/// Default MIME type for file attachments.
pub const MIME_PLAIN: &str = "text/plain";

/// One block of a prompt, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text { text: String },
    /// Base64-encoded image.
    #[serde(rename_all = "camelCase")]
    Image { data: String, mime_type: String },
    /// An embedded resource (document or file attachment).
    Resource { resource: ResourceContents },
}

/// Inner payload of a `resource` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub uri: String,
    pub text: String,
    pub mime_type: String,
}

impl ContentBlock {
    /// Text block constructor.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Resource block constructor.
    #[must_use]
    pub fn resource(
        uri: impl Into<String>,
        text: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self::Resource {
            resource: ResourceContents {
                uri: uri.into(),
                text: text.into(),
                mime_type: mime_type.into(),
            },
        }
    }
}
