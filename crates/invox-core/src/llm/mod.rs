//! Chat-completions capability shared by vision transcription and
//! structuring.

mod client;

pub use client::OpenAiClient;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::LlmError;

/// A chat-completions backend. Implementations must be cheap to share.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send one request and return the text of the first choice.
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

/// OpenAI-compatible chat request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Concatenated text parts of every user message.
    pub fn user_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .flat_map(|m| m.content.text_parts())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Number of image parts across all messages.
    pub fn image_count(&self) -> usize {
        self.messages
            .iter()
            .map(|m| match &m.content {
                MessageContent::Text(_) => 0,
                MessageContent::Parts(parts) => parts
                    .iter()
                    .filter(|p| matches!(p, ContentPart::ImageUrl { .. }))
                    .count(),
            })
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(parts),
        }
    }
}

/// Plain text, or a list of text and image parts for multimodal models.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    fn text_parts(&self) -> Vec<&str> {
        match self {
            MessageContent::Text(text) => vec![text.as_str()],
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    /// An inline `data:` URL image.
    pub fn data_url(media_type: &str, base64: &str) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:{};base64,{}", media_type, base64),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let request = ChatRequest::new(
            "gpt-4o",
            vec![
                ChatMessage::system("be terse"),
                ChatMessage::user_parts(vec![
                    ContentPart::text("read this"),
                    ContentPart::data_url("image/png", "AAAA"),
                ]),
            ],
        )
        .with_max_tokens(1000);

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "system", "content": "be terse"},
                    {"role": "user", "content": [
                        {"type": "text", "text": "read this"},
                        {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}}
                    ]}
                ],
                "max_tokens": 1000
            })
        );
    }

    #[test]
    fn test_user_text_and_image_count() {
        let request = ChatRequest::new(
            "m",
            vec![
                ChatMessage::system("sys"),
                ChatMessage::user("hello"),
                ChatMessage::user_parts(vec![
                    ContentPart::text("world"),
                    ContentPart::data_url("image/jpeg", "x"),
                    ContentPart::data_url("image/jpeg", "y"),
                ]),
            ],
        );
        assert_eq!(request.user_text(), "hello\nworld");
        assert_eq!(request.image_count(), 2);
    }
}
