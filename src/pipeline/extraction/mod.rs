pub mod types;
pub mod ocr;
pub mod pdfium;
pub mod vision_ocr;
pub mod orchestrator;

pub use types::*;
pub use ocr::*;
pub use pdfium::*;
pub use vision_ocr::*;
pub use orchestrator::*;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF rendering failed for page {page}: {reason}")]
    PdfRendering { page: usize, reason: String },

    #[error("PDF is encrypted or password-protected")]
    PdfEncrypted,

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Tesseract language data not found at {0}")]
    TessdataNotFound(PathBuf),

    #[error("OCR engine not available: {0}")]
    OcrUnavailable(String),

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),

    #[error("Image not found: {0}")]
    ImageNotFound(PathBuf),

    #[error("No text could be extracted from the uploaded files")]
    NoTextExtracted,
}
