use serde_json::Value;

use super::FeatureError;

/// Structured-extraction collaborator: a text LLM constrained by a JSON schema.
pub trait LlmClient: Send + Sync {
    fn generate_structured(
        &self,
        model: &str,
        prompt: &str,
        system: &str,
        schema: &Value,
    ) -> Result<String, FeatureError>;
}

/// Vision-capable chat, used by the vision OCR backend.
pub trait VisionClient: Send + Sync {
    /// `images` are base64-encoded PNG/JPEG bytes.
    fn chat_with_images(
        &self,
        model: &str,
        user_prompt: &str,
        images: &[String],
        system: Option<&str>,
    ) -> Result<String, FeatureError>;
}

/// Output of structured extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFeatures {
    /// The object the model returned, forwarded unchanged to the scoring service.
    pub payload: Value,
    /// Coerced numbers, positionally aligned with the catalog; may be shorter.
    pub vector: Vec<f64>,
}

impl ExtractedFeatures {
    /// Stand-in for an unusable model reply: `{ "features": [] }`.
    pub fn empty() -> Self {
        Self {
            payload: serde_json::json!({ "features": [] }),
            vector: Vec::new(),
        }
    }
}
