use std::sync::Arc;

use super::types::{
    rasterized_image_path, CombinedText, FileOutcome, PdfRasterizer, RasterOptions, TextRecognizer,
};
use super::ExtractionError;
use crate::pipeline::cleanup::CleanupCoordinator;
use crate::pipeline::upload::{FileKind, UploadedFile};

/// Per-file rasterize + OCR, folding the batch into one delimited text.
pub struct TextExtractionStage {
    rasterizer: Arc<dyn PdfRasterizer>,
    recognizer: Arc<dyn TextRecognizer>,
    language: String,
}

impl TextExtractionStage {
    pub fn new(
        rasterizer: Arc<dyn PdfRasterizer>,
        recognizer: Arc<dyn TextRecognizer>,
        language: &str,
    ) -> Self {
        Self {
            rasterizer,
            recognizer,
            language: language.to_string(),
        }
    }

    /// Obtain text from one file. Never fails: problems become `Skipped`.
    ///
    /// For PDFs the rasterized image path is registered with `cleanup`
    /// before rendering starts, so a partial output is also removed.
    pub fn process_file(&self, file: &UploadedFile, cleanup: &mut CleanupCoordinator) -> FileOutcome {
        let image_path = match file.kind() {
            FileKind::Image => file.path.clone(),
            FileKind::Pdf => {
                let target = rasterized_image_path(&file.path);
                cleanup.register(&target);
                if let Err(e) = self
                    .rasterizer
                    .convert(&file.path, &target, RasterOptions::default())
                {
                    tracing::warn!(file = %file.original_name, error = %e, "PDF rasterization failed, skipping file");
                    return FileOutcome::Skipped {
                        reason: e.to_string(),
                    };
                }
                target
            }
            FileKind::Unsupported => {
                return FileOutcome::Skipped {
                    reason: format!("unsupported type {}", file.mime_type),
                };
            }
        };

        match self.recognizer.recognize(&image_path, &self.language) {
            Ok(recognized) => FileOutcome::Extracted {
                text: recognized.text,
            },
            Err(e) => {
                tracing::warn!(file = %file.original_name, error = %e, "Text recognition failed, skipping file");
                FileOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Process the batch in order and combine the results.
    pub fn extract(
        &self,
        files: &[UploadedFile],
        cleanup: &mut CleanupCoordinator,
    ) -> Result<CombinedText, ExtractionError> {
        let _span = tracing::info_span!("text_extraction", files = files.len()).entered();

        let mut combined = CombinedText {
            text: String::new(),
            extracted: 0,
            skipped: 0,
        };

        let mut any_text = false;
        for file in files {
            match self.process_file(file, cleanup) {
                FileOutcome::Extracted { text } => {
                    any_text |= !text.trim().is_empty();
                    combined.text.push_str(&format!(
                        "--- BEGIN {name} ---\n{text}\n--- END {name} ---\n",
                        name = file.original_name,
                        text = text.trim_end(),
                    ));
                    combined.extracted += 1;
                }
                FileOutcome::Skipped { reason } => {
                    tracing::debug!(file = %file.original_name, reason = %reason, "File skipped");
                    combined.skipped += 1;
                }
            }
        }

        tracing::info!(
            extracted = combined.extracted,
            skipped = combined.skipped,
            text_len = combined.text.len(),
            "Text extraction complete"
        );

        if !any_text {
            return Err(ExtractionError::NoTextExtracted);
        }
        Ok(combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::{MockRasterizer, MockTextRecognizer};
    use std::path::Path;

    fn stage_file(dir: &Path, name: &str, mime: &str) -> UploadedFile {
        let path = dir.join(format!("staged-{name}"));
        std::fs::write(&path, b"content").unwrap();
        UploadedFile {
            path,
            mime_type: mime.to_string(),
            original_name: name.to_string(),
            size_bytes: 7,
        }
    }

    fn stage(recognizer: MockTextRecognizer, rasterizer: MockRasterizer) -> TextExtractionStage {
        TextExtractionStage::new(Arc::new(rasterizer), Arc::new(recognizer), "eng")
    }

    #[test]
    fn unreadable_image_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            stage_file(dir.path(), "a.png", "image/png"),
            stage_file(dir.path(), "b.png", "image/png"),
            stage_file(dir.path(), "c.png", "image/png"),
        ];
        let recognizer = MockTextRecognizer::new()
            .with_text("a.png", "Hemoglobin 13.5")
            .with_text("c.png", "Sodium 140");

        let mut cleanup = CleanupCoordinator::new();
        let combined = stage(recognizer, MockRasterizer::new())
            .extract(&files, &mut cleanup)
            .unwrap();

        assert_eq!(combined.extracted, 2);
        assert_eq!(combined.skipped, 1);
        assert!(combined.text.contains("--- BEGIN a.png ---\nHemoglobin 13.5\n--- END a.png ---"));
        assert!(combined.text.contains("--- BEGIN c.png ---\nSodium 140\n--- END c.png ---"));
        assert!(!combined.text.contains("b.png"));
        let a = combined.text.find("a.png").unwrap();
        let c = combined.text.find("c.png").unwrap();
        assert!(a < c);
    }

    #[test]
    fn pdf_is_rasterized_and_image_registered() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = stage_file(dir.path(), "report.pdf", "application/pdf");
        let target = rasterized_image_path(&pdf.path);
        let recognizer = MockTextRecognizer::new().with_text(".page1.png", "Potassium 4.1");

        let mut cleanup = CleanupCoordinator::new();
        let combined = stage(recognizer, MockRasterizer::new())
            .extract(std::slice::from_ref(&pdf), &mut cleanup)
            .unwrap();

        assert!(combined.text.contains("--- BEGIN report.pdf ---\nPotassium 4.1\n"));
        assert!(target.exists());
        assert!(cleanup.is_registered(&target));

        cleanup.release();
        assert!(!target.exists());
    }

    #[test]
    fn rasterization_failure_still_registers_target() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = stage_file(dir.path(), "broken.pdf", "application/pdf");

        let mut cleanup = CleanupCoordinator::new();
        let outcome = stage(
            MockTextRecognizer::always("never used"),
            MockRasterizer::new().failing_on("broken"),
        )
        .process_file(&pdf, &mut cleanup);

        assert!(matches!(outcome, FileOutcome::Skipped { .. }));
        assert!(cleanup.is_registered(&rasterized_image_path(&pdf.path)));
    }

    #[test]
    fn all_files_failing_is_no_text() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![stage_file(dir.path(), "a.jpg", "image/jpeg")];

        let mut cleanup = CleanupCoordinator::new();
        let result = stage(MockTextRecognizer::new(), MockRasterizer::new()).extract(&files, &mut cleanup);
        assert!(matches!(result, Err(ExtractionError::NoTextExtracted)));
    }

    #[test]
    fn whitespace_only_text_is_no_text() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![stage_file(dir.path(), "a.jpg", "image/jpeg")];

        let mut cleanup = CleanupCoordinator::new();
        let result = stage(MockTextRecognizer::always("  \n\t "), MockRasterizer::new())
            .extract(&files, &mut cleanup);
        assert!(matches!(result, Err(ExtractionError::NoTextExtracted)));
    }
}
