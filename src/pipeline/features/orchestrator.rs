use std::sync::Arc;

use super::parser::parse_feature_response;
use super::prompt::{build_feature_prompt, feature_schema, FEATURE_SYSTEM_PROMPT};
use super::types::{ExtractedFeatures, LlmClient};
use super::FeatureError;
use crate::catalog::FieldCatalog;

/// Turns combined OCR text into the ordered feature vector.
pub struct FeatureExtractionStage {
    client: Arc<dyn LlmClient>,
    model: String,
    catalog: Arc<FieldCatalog>,
}

impl FeatureExtractionStage {
    pub fn new(client: Arc<dyn LlmClient>, model: &str, catalog: Arc<FieldCatalog>) -> Self {
        Self {
            client,
            model: model.to_string(),
            catalog,
        }
    }

    /// Call the model once and parse its reply.
    ///
    /// Transport failures propagate. An unparsable reply yields an empty
    /// vector and `{"features": []}` so the run can still complete.
    pub fn extract(&self, raw_text: &str) -> Result<ExtractedFeatures, FeatureError> {
        let _span = tracing::info_span!(
            "feature_extraction",
            model = %self.model,
            text_len = raw_text.len(),
        )
        .entered();
        let start = std::time::Instant::now();

        let prompt = build_feature_prompt(raw_text, &self.catalog);
        let schema = feature_schema(self.catalog.len());

        let response = self.client.generate_structured(
            &self.model,
            &prompt,
            FEATURE_SYSTEM_PROMPT,
            &schema,
        )?;

        let features = parse_feature_response(&response, self.catalog.len()).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Unparsable feature response, continuing with no values");
            ExtractedFeatures::empty()
        });

        tracing::info!(
            values = features.vector.len(),
            elapsed_ms = %start.elapsed().as_millis(),
            "Feature extraction complete"
        );
        Ok(features)
    }
}
