use std::path::{Path, PathBuf};

use super::ExtractionError;

/// Rendering DPI for PDF pages handed to OCR.
pub const HIGH_RENDER_DPI: u32 = 300;

/// How a PDF page is turned into an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterOptions {
    /// 1-based page number.
    pub page: usize,
    pub dpi: u32,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            page: 1,
            dpi: HIGH_RENDER_DPI,
        }
    }
}

/// PDF-to-image collaborator.
///
/// Writes the rendered page as PNG to `output_path`. The caller owns the
/// output path (and its cleanup) whether or not rendering succeeds.
pub trait PdfRasterizer: Send + Sync {
    fn convert(
        &self,
        pdf_path: &Path,
        output_path: &Path,
        options: RasterOptions,
    ) -> Result<(), ExtractionError>;
}

/// Text recognized from one image.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedText {
    pub text: String,
}

/// OCR collaborator (allows mocking for tests).
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image_path: &Path, language: &str)
        -> Result<RecognizedText, ExtractionError>;
}

/// What happened to one file of the batch.
#[derive(Debug)]
pub enum FileOutcome {
    Extracted { text: String },
    Skipped { reason: String },
}

/// Combined text of a batch, with per-source delimiters.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedText {
    pub text: String,
    pub extracted: usize,
    pub skipped: usize,
}

/// Where the rasterized first page of `pdf_path` is written.
pub fn rasterized_image_path(pdf_path: &Path) -> PathBuf {
    let mut name = pdf_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".page1.png");
    pdf_path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rasterized_path_sits_next_to_pdf() {
        let path = rasterized_image_path(Path::new("/uploads/20240101-ab12-report.pdf"));
        assert_eq!(
            path,
            PathBuf::from("/uploads/20240101-ab12-report.pdf.page1.png")
        );
    }

    #[test]
    fn default_options_render_first_page_high_dpi() {
        let options = RasterOptions::default();
        assert_eq!(options.page, 1);
        assert_eq!(options.dpi, 300);
    }
}
