//! Unit tests for deterministic prompt assembly.

use kiro_bridge::models::content::ContentBlock;
use kiro_bridge::turn::prompt::{
    assemble_prompt, ChatMessage, ChatRequest, DocumentResource, FileAttachment, ImageAttachment,
    Role,
};

fn message(role: Role, content: &str) -> ChatMessage {
    ChatMessage {
        role,
        content: content.to_owned(),
    }
}

/// The text block is one paragraph per input, `[System]` first, separated
/// by blank lines.
#[test]
fn text_block_composition() {
    let request = ChatRequest {
        messages: vec![
            message(Role::User, "Shorten the intro."),
            message(Role::Assistant, "Done, anything else?"),
            message(Role::User, "Tighten the outro too."),
        ],
        system_prompt: Some("You edit markdown documents.".to_owned()),
        ..ChatRequest::default()
    };

    let blocks = assemble_prompt(&request);
    let ContentBlock::Text { text } = &blocks[0] else {
        panic!("first block must be text, got: {:?}", blocks[0]);
    };

    assert_eq!(
        text,
        "[System] You edit markdown documents.\n\n\
         User: Shorten the intro.\n\n\
         Assistant: Done, anything else?\n\n\
         User: Tighten the outro too."
    );
}

/// Blocks appear in fixed order: text, document resource, images, file
/// attachments.
#[test]
fn block_order_is_fixed() {
    let request = ChatRequest {
        messages: vec![message(Role::User, "hi")],
        document: Some(DocumentResource {
            uri: "file:///doc.md".to_owned(),
            text: "# Title".to_owned(),
            mime_type: None,
        }),
        images: vec![ImageAttachment {
            data: "aGk=".to_owned(),
            mime_type: None,
        }],
        attachments: vec![FileAttachment {
            name: "notes.txt".to_owned(),
            text: "notes".to_owned(),
            mime_type: None,
        }],
        ..ChatRequest::default()
    };

    let blocks = assemble_prompt(&request);
    assert_eq!(blocks.len(), 4);
    assert!(matches!(blocks[0], ContentBlock::Text { .. }));
    assert!(matches!(blocks[1], ContentBlock::Resource { .. }));
    assert!(matches!(blocks[2], ContentBlock::Image { .. }));
    assert!(matches!(blocks[3], ContentBlock::Resource { .. }));
}

/// Missing MIME types take the documented defaults.
#[test]
fn mime_type_defaults() {
    let request = ChatRequest {
        document: Some(DocumentResource {
            uri: "file:///doc.md".to_owned(),
            text: String::new(),
            mime_type: None,
        }),
        images: vec![ImageAttachment {
            data: String::new(),
            mime_type: None,
        }],
        attachments: vec![FileAttachment {
            name: "a".to_owned(),
            text: String::new(),
            mime_type: None,
        }],
        ..ChatRequest::default()
    };

    let blocks = assemble_prompt(&request);

    let ContentBlock::Resource { resource } = &blocks[1] else {
        panic!("document block expected");
    };
    assert_eq!(resource.mime_type, "text/markdown");

    let ContentBlock::Image { mime_type, .. } = &blocks[2] else {
        panic!("image block expected");
    };
    assert_eq!(mime_type, "image/png");

    let ContentBlock::Resource { resource } = &blocks[3] else {
        panic!("attachment block expected");
    };
    assert_eq!(resource.mime_type, "text/plain");
}

/// Declared MIME types are honoured over the defaults.
#[test]
fn declared_mime_types_are_kept() {
    let request = ChatRequest {
        images: vec![ImageAttachment {
            data: String::new(),
            mime_type: Some("image/jpeg".to_owned()),
        }],
        ..ChatRequest::default()
    };

    let blocks = assemble_prompt(&request);
    let ContentBlock::Image { mime_type, .. } = &blocks[1] else {
        panic!("image block expected");
    };
    assert_eq!(mime_type, "image/jpeg");
}

/// File attachments get a `file://attachment/<name>` URI.
#[test]
fn attachment_uri_scheme() {
    let request = ChatRequest {
        attachments: vec![FileAttachment {
            name: "outline.md".to_owned(),
            text: "…".to_owned(),
            mime_type: None,
        }],
        ..ChatRequest::default()
    };

    let blocks = assemble_prompt(&request);
    let ContentBlock::Resource { resource } = &blocks[1] else {
        panic!("attachment block expected");
    };
    assert_eq!(resource.uri, "file://attachment/outline.md");
}

/// Assembly is deterministic: the same inputs produce identical arrays.
#[test]
fn assembly_is_deterministic() {
    let request = ChatRequest {
        messages: vec![message(Role::User, "hello")],
        system_prompt: Some("sys".to_owned()),
        images: vec![ImageAttachment {
            data: "YQ==".to_owned(),
            mime_type: Some("image/webp".to_owned()),
        }],
        document: Some(DocumentResource {
            uri: "file:///d.md".to_owned(),
            text: "body".to_owned(),
            mime_type: Some("text/markdown".to_owned()),
        }),
        attachments: vec![],
    };

    assert_eq!(assemble_prompt(&request), assemble_prompt(&request));
}

/// An empty request still yields the (empty) text block.
#[test]
fn empty_request_yields_empty_text_block() {
    let blocks = assemble_prompt(&ChatRequest::default());
    assert_eq!(blocks, vec![ContentBlock::text("")]);
}
