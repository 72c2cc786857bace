//! Shared state for the API layer.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::pipeline::processor::LabPipeline;
use crate::pipeline::scoring::ScoringRelay;

/// Shared context for all API routes. Cheap to clone.
#[derive(Clone)]
pub struct AppContext {
    pub pipeline: Arc<LabPipeline>,
    pub relay: Arc<ScoringRelay>,
    pub config: Arc<AppConfig>,
}

impl AppContext {
    pub fn new(pipeline: LabPipeline, relay: ScoringRelay, config: AppConfig) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            relay: Arc::new(relay),
            config: Arc::new(config),
        }
    }

    /// Whether internal error chains may be returned to clients.
    pub fn expose_stack(&self) -> bool {
        !self.config.environment.is_production()
    }
}

/// Context wired to mock collaborators, for router and server tests.
#[cfg(test)]
pub(crate) fn mock_context(
    upload_dir: &std::path::Path,
    recognizer: crate::pipeline::extraction::MockTextRecognizer,
    llm: crate::pipeline::features::MockLlmClient,
) -> AppContext {
    use crate::catalog::FieldCatalog;
    use crate::pipeline::extraction::{MockRasterizer, TextExtractionStage};
    use crate::pipeline::features::FeatureExtractionStage;

    let mut config = AppConfig::from_lookup(|_| None).unwrap();
    config.upload_dir = upload_dir.to_path_buf();

    let catalog = Arc::new(FieldCatalog::standard());
    let pipeline = LabPipeline::new(
        catalog.clone(),
        TextExtractionStage::new(Arc::new(MockRasterizer::new()), Arc::new(recognizer), "eng"),
        FeatureExtractionStage::new(Arc::new(llm), "medgemma:4b", catalog),
    );
    AppContext::new(pipeline, ScoringRelay::disabled(), config)
}
