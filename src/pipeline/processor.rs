//! Lab report pipeline orchestrator.
//!
//! Single entry point for one request's batch:
//! validate → extract text → extract features → analyze → assemble.
//!
//! Synchronous by design; the HTTP layer runs it under `spawn_blocking`.
//! Every file of the batch (and every rasterized page) is owned by a
//! `CleanupCoordinator` for the whole run.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::catalog::FieldCatalog;
use crate::pipeline::analysis::{analyze, AnalysisItem};
use crate::pipeline::cleanup::CleanupCoordinator;
use crate::pipeline::extraction::{ExtractionError, TextExtractionStage};
use crate::pipeline::features::{FeatureError, FeatureExtractionStage};
use crate::pipeline::upload::{discard_files, FileSummary, UploadedFile};
use crate::pipeline::validation::{validate_batch, ValidationError};

pub const SUCCESS_MESSAGE: &str = "Files processed successfully";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("No text could be extracted from the uploaded files")]
    NoTextExtracted,

    #[error("Text extraction failed: {0}")]
    Extraction(ExtractionError),

    #[error("Feature extraction failed: {0}")]
    Feature(#[from] FeatureError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ExtractionError> for PipelineError {
    fn from(e: ExtractionError) -> Self {
        match e {
            ExtractionError::NoTextExtracted => PipelineError::NoTextExtracted,
            other => PipelineError::Extraction(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Response payload of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub message: String,
    pub files: Vec<FileSummary>,
    pub items: Vec<AnalysisItem>,
    #[serde(rename = "isLifeThreatening")]
    pub is_life_threatening: bool,
}

pub struct PipelineOutput {
    pub result: AnalysisResult,
    /// `{"features": [...]}`, for the scoring relay.
    pub scoring_payload: Value,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct LabPipeline {
    catalog: Arc<FieldCatalog>,
    text_stage: TextExtractionStage,
    feature_stage: FeatureExtractionStage,
}

impl LabPipeline {
    pub fn new(
        catalog: Arc<FieldCatalog>,
        text_stage: TextExtractionStage,
        feature_stage: FeatureExtractionStage,
    ) -> Self {
        Self {
            catalog,
            text_stage,
            feature_stage,
        }
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    /// Run the full pipeline over an already-staged batch.
    ///
    /// Takes ownership of the files: on every return (and on unwinding) they
    /// no longer exist on disk.
    pub fn run(&self, files: Vec<UploadedFile>) -> Result<PipelineOutput, PipelineError> {
        let _span = tracing::info_span!("lab_pipeline", files = files.len()).entered();
        let start = std::time::Instant::now();

        let shape = match validate_batch(&files) {
            Ok(shape) => shape,
            Err(e) => {
                tracing::info!(reason = %e, "Batch rejected");
                discard_files(&files);
                return Err(e.into());
            }
        };

        let mut cleanup = CleanupCoordinator::new();
        for file in &files {
            cleanup.register(&file.path);
        }

        tracing::info!(images = shape.images, pdfs = shape.pdfs, "Batch accepted");

        let combined = self.text_stage.extract(&files, &mut cleanup)?;
        let features = self.feature_stage.extract(&combined.text)?;
        let analysis = analyze(&features.vector, &self.catalog);

        let result = AnalysisResult {
            message: SUCCESS_MESSAGE.to_string(),
            files: files.iter().map(UploadedFile::summary).collect(),
            items: analysis.items,
            is_life_threatening: analysis.is_life_threatening,
        };

        let report = cleanup.release();
        tracing::info!(
            items = result.items.len(),
            life_threatening = result.is_life_threatening,
            deleted = report.deleted,
            elapsed_ms = %start.elapsed().as_millis(),
            "Pipeline complete"
        );

        Ok(PipelineOutput {
            result,
            scoring_payload: features.payload,
        })
    }
}
