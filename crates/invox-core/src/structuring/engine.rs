//! Structuring engine: raw text in, typed invoice out.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use super::parser::parse_reply;
use super::prompt::build_request;
use crate::error::StructuringError;
use crate::llm::ChatModel;
use crate::models::config::InvoxConfig;
use crate::models::invoice::StructuredInvoice;

/// Sends raw text to a language model under a fixed schema contract.
#[derive(Clone)]
pub struct StructuringEngine {
    model: Arc<dyn ChatModel>,
    model_name: String,
    temperature: f32,
}

impl StructuringEngine {
    pub fn new(model: Arc<dyn ChatModel>, model_name: impl Into<String>) -> Self {
        Self {
            model,
            model_name: model_name.into(),
            temperature: 0.1,
        }
    }

    pub fn from_config(model: Arc<dyn ChatModel>, config: &InvoxConfig) -> Self {
        Self::new(model, config.structuring.model.clone())
            .with_temperature(config.structuring.temperature)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Structure `raw_text`. Single attempt; every failure is returned.
    pub async fn structure(&self, raw_text: &str) -> Result<StructuredInvoice, StructuringError> {
        let start = Instant::now();
        let request = build_request(&self.model_name, self.temperature, raw_text);

        let reply = self.model.complete(&request).await?;

        let invoice = parse_reply(&reply, raw_text).inspect_err(|e| {
            warn!("Structuring reply rejected: {}", e);
        })?;

        for flag in &invoice.flags {
            warn!("Structuring flag: {}", flag);
        }

        info!(
            "Structured {} chars in {} ms ({} line items, {} flags)",
            raw_text.chars().count(),
            start.elapsed().as_millis(),
            invoice.line_items.len(),
            invoice.flags.len()
        );

        Ok(invoice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{ChatRequest, Role};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedModel {
        reply: Result<String, LlmError>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
            self.requests.lock().unwrap().push(request.clone());
            self.reply.clone()
        }
    }

    fn engine(reply: Result<&str, LlmError>) -> (StructuringEngine, Arc<ScriptedModel>) {
        let model = Arc::new(ScriptedModel {
            reply: reply.map(str::to_string),
            requests: Mutex::new(Vec::new()),
        });
        (StructuringEngine::new(model.clone(), "gpt-4"), model)
    }

    #[tokio::test]
    async fn test_structure_sends_prompt_and_parses_reply() {
        let (engine, model) = engine(Ok(r#"{"vendor_name": "Acme", "total_amount": "42.00"}"#));

        let invoice = engine.structure("ACME\nTotal 42.00").await.unwrap();
        assert_eq!(invoice.vendor_name.as_deref(), Some("Acme"));
        assert_eq!(invoice.raw_text, "ACME\nTotal 42.00");

        let requests = model.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "gpt-4");
        assert_eq!(requests[0].temperature, Some(0.1));
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert!(requests[0].user_text().contains("ACME\nTotal 42.00"));
    }

    #[tokio::test]
    async fn test_malformed_reply_surfaces_raw_text() {
        let (engine, _) = engine(Ok("Sorry, I can't process that."));
        let err = engine.structure("text").await.unwrap_err();
        assert_eq!(err.raw_response(), Some("Sorry, I can't process that."));
    }

    #[tokio::test]
    async fn test_capability_error_is_single_attempt() {
        let (engine, model) = engine(Err(LlmError::Connection("refused".to_string())));
        let err = engine.structure("text").await.unwrap_err();
        assert!(matches!(err, StructuringError::Capability(LlmError::Connection(_))));
        assert_eq!(model.requests.lock().unwrap().len(), 1);
    }
}
