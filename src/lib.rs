pub mod api;
pub mod catalog;
pub mod config;
pub mod pipeline;

use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::api::AppContext;
use crate::catalog::{CatalogError, FieldCatalog};
use crate::config::{AppConfig, ConfigError, OcrBackend};
#[cfg(feature = "ocr")]
use crate::pipeline::extraction::LinkedTesseract;
#[cfg(not(feature = "ocr"))]
use crate::pipeline::extraction::TesseractCli;
use crate::pipeline::extraction::{
    ExtractionError, OllamaVisionOcr, PdfiumRasterizer, TextExtractionStage, TextRecognizer,
};
use crate::pipeline::features::{FeatureError, FeatureExtractionStage, OllamaClient};
use crate::pipeline::processor::LabPipeline;
use crate::pipeline::scoring::{ScoringError, ScoringRelay};

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("OCR setup error: {0}")]
    Ocr(#[from] ExtractionError),

    #[error("LLM client error: {0}")]
    Llm(#[from] FeatureError),

    #[error("Scoring relay error: {0}")]
    Scoring(#[from] ScoringError),

    #[error("Server error: {0}")]
    Server(#[from] api::ServerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Startup task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}

/// Wire production collaborators into a pipeline.
///
/// Blocking: performs startup probes (PDFium, OCR binary, Ollama models) and
/// builds blocking HTTP clients, so call it outside the async runtime.
pub fn build_pipeline(
    config: &AppConfig,
    catalog: Arc<FieldCatalog>,
) -> Result<LabPipeline, StartupError> {
    let ollama = Arc::new(OllamaClient::new(&config.ollama_url, config.llm_timeout_secs)?);
    tracing::info!(url = ollama.base_url(), "Ollama client configured");

    if let Err(e) = PdfiumRasterizer::probe() {
        tracing::warn!(error = %e, "PDFium unavailable, PDF uploads will be skipped");
    }

    let recognizer: Arc<dyn TextRecognizer> = match &config.ocr_backend {
        OcrBackend::Tesseract {
            binary,
            tessdata_dir,
        } => tesseract_recognizer(binary, tessdata_dir.as_deref(), &config.ocr_language)?,
        OcrBackend::Vision => {
            tracing::info!(model = %config.vision_model, "Using vision model OCR");
            Arc::new(OllamaVisionOcr::new(ollama.clone(), &config.vision_model))
        }
    };

    match ollama.is_model_available(&config.extraction_model) {
        Ok(true) => tracing::info!(model = %config.extraction_model, "Extraction model available"),
        Ok(false) => tracing::warn!(
            model = %config.extraction_model,
            "Extraction model not pulled, analysis requests will fail until it is"
        ),
        Err(e) => tracing::warn!(error = %e, "Could not query Ollama models"),
    }

    let text_stage = TextExtractionStage::new(
        Arc::new(PdfiumRasterizer::new()),
        recognizer,
        &config.ocr_language,
    );
    let feature_stage =
        FeatureExtractionStage::new(ollama, &config.extraction_model, catalog.clone());

    Ok(LabPipeline::new(catalog, text_stage, feature_stage))
}

#[cfg(feature = "ocr")]
fn tesseract_recognizer(
    _binary: &std::path::Path,
    tessdata_dir: Option<&std::path::Path>,
    language: &str,
) -> Result<Arc<dyn TextRecognizer>, StartupError> {
    let tesseract = LinkedTesseract::new(tessdata_dir)?;
    match tesseract.probe(language) {
        Ok(()) => tracing::info!(language, "Linked Tesseract OCR ready"),
        Err(e) => tracing::warn!(error = %e, "Tesseract unavailable, images will be skipped"),
    }
    Ok(Arc::new(tesseract))
}

#[cfg(not(feature = "ocr"))]
fn tesseract_recognizer(
    binary: &std::path::Path,
    _tessdata_dir: Option<&std::path::Path>,
    _language: &str,
) -> Result<Arc<dyn TextRecognizer>, StartupError> {
    let tesseract = TesseractCli::new(binary);
    match tesseract.probe() {
        Ok(version) => tracing::info!(%version, "Tesseract OCR ready"),
        Err(e) => tracing::warn!(error = %e, "Tesseract unavailable, images will be skipped"),
    }
    Ok(Arc::new(tesseract))
}

fn load_catalog(config: &AppConfig) -> Result<FieldCatalog, CatalogError> {
    match &config.catalog_path {
        Some(path) => {
            let catalog = FieldCatalog::load(path)?;
            tracing::info!(path = %path.display(), fields = catalog.len(), "Loaded field catalog");
            Ok(catalog)
        }
        None => Ok(FieldCatalog::standard()),
    }
}

/// Start the service and run until Ctrl-C.
pub async fn run() -> Result<(), StartupError> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        "{} starting v{} ({:?})",
        config::APP_NAME,
        config::APP_VERSION,
        config.environment
    );

    std::fs::create_dir_all(&config.upload_dir)?;
    pipeline::upload::cleanup_orphaned_uploads(&config.upload_dir);

    let catalog = Arc::new(load_catalog(&config)?);

    let pipeline = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || build_pipeline(&config, catalog)).await??
    };

    let relay = ScoringRelay::new(config.scoring_url.clone(), config.scoring_timeout_secs)?;
    if !relay.is_enabled() {
        tracing::info!("No scoring URL configured, relay disabled");
    }

    let bind_addr = config.bind_addr;
    let ctx = AppContext::new(pipeline, relay, config);
    let mut server = api::serve(ctx.clone(), bind_addr).await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {e}");
    }
    server.shutdown();
    server.stopped().await;

    // Blocking HTTP clients must not be dropped on a runtime worker.
    tokio::task::spawn_blocking(move || drop(ctx)).await?;

    tracing::info!("{} stopped", config::APP_NAME);
    Ok(())
}
