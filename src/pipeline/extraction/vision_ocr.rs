//! Vision OCR backend: reads lab report images through an Ollama vision model.
//!
//! Alternative to Tesseract for deployments that already run Ollama. The
//! `language` hint is passed into the prompt rather than to a model parameter.

use std::path::Path;
use std::sync::Arc;

use base64::Engine as _;

use super::types::{RecognizedText, TextRecognizer};
use super::ExtractionError;
use crate::pipeline::features::VisionClient;

const VISION_SYSTEM_PROMPT: &str = "\
You are a medical document text extractor. Your task is to transcribe ALL visible text \
from the provided lab report image. Keep each test name on the same line as its value, \
unit and reference range. Do not interpret or summarize.";

pub struct OllamaVisionOcr {
    vision_client: Arc<dyn VisionClient>,
    model_name: String,
}

impl OllamaVisionOcr {
    pub fn new(vision_client: Arc<dyn VisionClient>, model_name: &str) -> Self {
        Self {
            vision_client,
            model_name: model_name.to_string(),
        }
    }
}

fn user_prompt(language: &str) -> String {
    format!(
        "Transcribe all text from this lab report image as plain text. \
         The document language code is '{language}'. Output only the transcription."
    )
}

impl TextRecognizer for OllamaVisionOcr {
    fn recognize(
        &self,
        image_path: &Path,
        language: &str,
    ) -> Result<RecognizedText, ExtractionError> {
        let image_bytes = std::fs::read(image_path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ExtractionError::ImageNotFound(image_path.to_path_buf()),
            _ => ExtractionError::Io(e),
        })?;

        let _span = tracing::info_span!(
            "vision_ocr_recognize",
            model = %self.model_name,
            image_size = image_bytes.len(),
        )
        .entered();
        let start = std::time::Instant::now();

        let images = vec![base64::engine::general_purpose::STANDARD.encode(&image_bytes)];
        let text = self
            .vision_client
            .chat_with_images(
                &self.model_name,
                &user_prompt(language),
                &images,
                Some(VISION_SYSTEM_PROMPT),
            )
            .map_err(|e| ExtractionError::OcrProcessing(format!("Vision OCR failed: {e}")))?;

        tracing::info!(
            elapsed_ms = %start.elapsed().as_millis(),
            text_len = text.len(),
            "Vision OCR complete"
        );

        Ok(RecognizedText { text })
    }
}
