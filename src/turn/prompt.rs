//! Deterministic prompt assembly.
//!
//! One turn's prompt is a single text block followed by optional resource
//! and image blocks, in a fixed order: text, document resource, images,
//! file attachments. The same inputs always produce byte-identical
//! content-block arrays.

use serde::Deserialize;

use crate::models::content::{ContentBlock, MIME_MARKDOWN, MIME_PLAIN, MIME_PNG};

/// Author of one prior message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One prior conversation message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// The document the conversation is about, embedded as a resource block.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResource {
    pub uri: String,
    pub text: String,
    /// Defaults to `text/markdown`.
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// A pasted or referenced image, base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAttachment {
    pub data: String,
    /// Defaults to `image/png`.
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// An attached text file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
    pub name: String,
    pub text: String,
    /// Defaults to `text/plain`.
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Everything one turn is prompted with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageAttachment>,
    #[serde(default)]
    pub document: Option<DocumentResource>,
    #[serde(default)]
    pub attachments: Vec<FileAttachment>,
}

/// Assemble the content-block array for `session/prompt`.
///
/// The text block is one paragraph per input — `[System] …` first when a
/// system prompt is present, then `User:` / `Assistant:` per message —
/// separated by blank lines.
#[must_use]
pub fn assemble_prompt(request: &ChatRequest) -> Vec<ContentBlock> {
    let mut paragraphs: Vec<String> = Vec::new();

    if let Some(ref system) = request.system_prompt {
        paragraphs.push(format!("[System] {system}"));
    }
    for message in &request.messages {
        let prefix = match message.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        paragraphs.push(format!("{prefix}: {}", message.content));
    }

    let mut blocks = vec![ContentBlock::text(paragraphs.join("\n\n"))];

    if let Some(ref document) = request.document {
        blocks.push(ContentBlock::resource(
            &document.uri,
            &document.text,
            document.mime_type.as_deref().unwrap_or(MIME_MARKDOWN),
        ));
    }

    for image in &request.images {
        blocks.push(ContentBlock::Image {
            data: image.data.clone(),
            mime_type: image
                .mime_type
                .clone()
                .unwrap_or_else(|| MIME_PNG.to_owned()),
        });
    }

    for file in &request.attachments {
        blocks.push(ContentBlock::resource(
            format!("file://attachment/{}", file.name),
            &file.text,
            file.mime_type.as_deref().unwrap_or(MIME_PLAIN),
        ));
    }

    blocks
}
