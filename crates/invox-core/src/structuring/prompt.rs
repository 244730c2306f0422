//! Prompt contract for the structuring capability.

use crate::llm::{ChatMessage, ChatRequest};

pub const SYSTEM_PROMPT: &str =
    "You are an expert invoice-structuring assistant. Always respond with valid JSON only, \
     no additional text.";

/// Target schema embedded in every request.
pub const SCHEMA: &str = r#"{
    "vendor_name": "string",
    "invoice_number": "string",
    "invoice_date": "YYYY-MM-DD",
    "due_date": "YYYY-MM-DD",
    "total_amount": number,
    "tax_amount": number,
    "currency": "string (ISO 4217 code)",
    "line_items": [
        {
            "description": "string",
            "quantity": number,
            "unit_price": number,
            "total_price": number,
            "tax_rate": number
        }
    ],
    "confidence_score": number between 0 and 1,
    "validation_notes": "string"
}"#;

pub const NULL_INSTRUCTION: &str =
    "If any information is unclear or missing, set the value to null rather than guessing.";

/// User message embedding the raw text and the schema.
pub fn user_prompt(raw_text: &str) -> String {
    format!(
        "Analyze the following invoice text and extract structured information.\n\
         Return ONLY a valid JSON object with these exact fields:\n\n\
         {}\n\n\
         Invoice text:\n\
         {}\n\n\
         Important: Return ONLY the JSON object, no other text or explanation.\n\
         {}",
        SCHEMA, raw_text, NULL_INSTRUCTION
    )
}

/// Full request for one structuring call.
pub fn build_request(model: &str, temperature: f32, raw_text: &str) -> ChatRequest {
    ChatRequest::new(
        model,
        vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(user_prompt(raw_text)),
        ],
    )
    .with_temperature(temperature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    #[test]
    fn test_request_carries_text_schema_and_null_rule() {
        let request = build_request("gpt-4", 0.1, "ACME Corp\nInvoice #77");

        assert_eq!(request.model, "gpt-4");
        assert_eq!(request.temperature, Some(0.1));
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        assert!(SYSTEM_PROMPT.contains("JSON only"));

        let user = request.user_text();
        assert!(user.contains("ACME Corp\nInvoice #77"));
        assert!(user.contains("\"tax_amount\": number"));
        assert!(user.contains("\"line_items\""));
        assert!(user.contains(NULL_INSTRUCTION));
    }
}
