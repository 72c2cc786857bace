use std::path::{Path, PathBuf};
use std::process::Command;

use super::types::{RecognizedText, TextRecognizer};
use super::ExtractionError;

/// Tesseract OCR linked through libtesseract.
/// Only available when compiled with the `ocr` feature flag.
#[cfg(feature = "ocr")]
pub struct LinkedTesseract {
    tessdata_dir: Option<PathBuf>,
}

#[cfg(feature = "ocr")]
impl LinkedTesseract {
    /// `tessdata_dir` must hold at least `eng.traineddata`. `None` lets
    /// libtesseract use its compiled-in search path.
    pub fn new(tessdata_dir: Option<&Path>) -> Result<Self, ExtractionError> {
        if let Some(dir) = tessdata_dir {
            if !dir.join("eng.traineddata").exists() {
                return Err(ExtractionError::TessdataNotFound(dir.to_path_buf()));
            }
        }
        Ok(Self {
            tessdata_dir: tessdata_dir.map(Path::to_path_buf),
        })
    }

    fn tessdata_str(&self) -> Result<Option<&str>, ExtractionError> {
        self.tessdata_dir
            .as_deref()
            .map(|dir| {
                dir.to_str()
                    .ok_or_else(|| ExtractionError::OcrUnavailable("Invalid tessdata path".into()))
            })
            .transpose()
    }

    /// Check that the engine initializes for `language`.
    pub fn probe(&self, language: &str) -> Result<(), ExtractionError> {
        tesseract::Tesseract::new(self.tessdata_str()?, Some(language))
            .map(|_| ())
            .map_err(|e| ExtractionError::OcrUnavailable(format!("{e:?}")))
    }
}

#[cfg(feature = "ocr")]
impl TextRecognizer for LinkedTesseract {
    fn recognize(
        &self,
        image_path: &Path,
        language: &str,
    ) -> Result<RecognizedText, ExtractionError> {
        if !image_path.exists() {
            return Err(ExtractionError::ImageNotFound(image_path.to_path_buf()));
        }
        let image_str = image_path.to_str().ok_or_else(|| {
            ExtractionError::OcrProcessing(format!("Non UTF-8 path: {}", image_path.display()))
        })?;

        let _span = tracing::debug_span!(
            "tesseract_recognize",
            image = %image_path.display(),
            language,
        )
        .entered();
        let start = std::time::Instant::now();

        let tess = tesseract::Tesseract::new(self.tessdata_str()?, Some(language))
            .map_err(|e| ExtractionError::OcrUnavailable(format!("{e:?}")))?;

        let mut tess = tess
            .set_image(image_str)
            .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;

        let text = tess
            .get_text()
            .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;

        tracing::debug!(
            elapsed_ms = %start.elapsed().as_millis(),
            text_len = text.len(),
            confidence = tess.mean_text_conf(),
            "Tesseract recognition complete"
        );

        Ok(RecognizedText { text })
    }
}

/// Tesseract OCR via its command-line binary, for builds without the `ocr` feature.
///
/// Runs `tesseract <image> stdout -l <lang>` and returns stdout verbatim.
pub struct TesseractCli {
    binary: PathBuf,
}

impl TesseractCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Check that the binary runs (`tesseract --version`).
    pub fn probe(&self) -> Result<String, ExtractionError> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .map_err(|e| {
                ExtractionError::OcrUnavailable(format!("{}: {e}", self.binary.display()))
            })?;
        let version = String::from_utf8_lossy(&output.stdout);
        Ok(version.lines().next().unwrap_or_default().trim().to_string())
    }
}

impl TextRecognizer for TesseractCli {
    fn recognize(
        &self,
        image_path: &Path,
        language: &str,
    ) -> Result<RecognizedText, ExtractionError> {
        if !image_path.exists() {
            return Err(ExtractionError::ImageNotFound(image_path.to_path_buf()));
        }

        let _span = tracing::debug_span!(
            "tesseract_recognize",
            image = %image_path.display(),
            language,
        )
        .entered();
        let start = std::time::Instant::now();

        let output = Command::new(&self.binary)
            .arg(image_path)
            .arg("stdout")
            .arg("-l")
            .arg(language)
            .output()
            .map_err(|e| {
                ExtractionError::OcrUnavailable(format!("{}: {e}", self.binary.display()))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::OcrProcessing(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();

        tracing::debug!(
            elapsed_ms = %start.elapsed().as_millis(),
            text_len = text.len(),
            "Tesseract recognition complete"
        );

        Ok(RecognizedText { text })
    }
}

/// Mock OCR engine for unit testing without Tesseract.
///
/// Returns text keyed by image file name suffix; unknown images fail recognition.
/// When several suffixes match, the longest one wins.
#[derive(Default)]
pub struct MockTextRecognizer {
    texts: Vec<(String, String)>,
    fallback: Option<String>,
    panics: bool,
}

impl MockTextRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text returned for any image without a specific entry.
    pub fn always(text: &str) -> Self {
        Self {
            fallback: Some(text.to_string()),
            ..Self::default()
        }
    }

    /// Panics on every call, like a native engine crashing mid-run.
    pub fn panicking() -> Self {
        Self {
            panics: true,
            ..Self::default()
        }
    }

    /// Return `text` for images whose file name ends with `file_suffix`.
    pub fn with_text(mut self, file_suffix: &str, text: &str) -> Self {
        self.texts.retain(|(suffix, _)| suffix != file_suffix);
        self.texts.push((file_suffix.to_string(), text.to_string()));
        self
    }
}

impl TextRecognizer for MockTextRecognizer {
    fn recognize(
        &self,
        image_path: &Path,
        _language: &str,
    ) -> Result<RecognizedText, ExtractionError> {
        let name = image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if self.panics {
            panic!("mock OCR engine crashed on {name}");
        }

        self.texts
            .iter()
            .filter(|(suffix, _)| name.ends_with(suffix.as_str()))
            .max_by_key(|(suffix, _)| suffix.len())
            .map(|(_, text)| text.clone())
            .or_else(|| self.fallback.clone())
            .map(|text| RecognizedText { text })
            .ok_or_else(|| ExtractionError::OcrProcessing(format!("mock cannot read {name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_matches_by_suffix() {
        let mock = MockTextRecognizer::new().with_text("scan1.png", "Hemoglobin: 13.5");
        let result = mock
            .recognize(Path::new("/uploads/20240101-ab-scan1.png"), "eng")
            .unwrap();
        assert_eq!(result.text, "Hemoglobin: 13.5");
    }

    #[test]
    fn mock_prefers_longest_matching_suffix() {
        let mock = MockTextRecognizer::new()
            .with_text("a.png", "short")
            .with_text("ba.png", "long");
        let path = Path::new("/uploads/20240101-ab-ba.png");
        for _ in 0..8 {
            assert_eq!(mock.recognize(path, "eng").unwrap().text, "long");
        }
        assert_eq!(
            mock.recognize(Path::new("/uploads/x-a.png"), "eng").unwrap().text,
            "short"
        );
    }

    #[test]
    fn mock_fails_for_unknown_image() {
        let mock = MockTextRecognizer::new().with_text("scan1.png", "x");
        assert!(matches!(
            mock.recognize(Path::new("/uploads/other.png"), "eng"),
            Err(ExtractionError::OcrProcessing(_))
        ));
    }

    #[test]
    fn mock_fallback_applies_to_any_image() {
        let mock = MockTextRecognizer::always("Sodium 140");
        assert_eq!(
            mock.recognize(Path::new("anything.jpg"), "eng").unwrap().text,
            "Sodium 140"
        );
    }

    #[test]
    fn tesseract_missing_image_is_reported() {
        let ocr = TesseractCli::new("tesseract");
        let result = ocr.recognize(Path::new("/nonexistent/labtriage/scan.png"), "eng");
        assert!(matches!(result, Err(ExtractionError::ImageNotFound(_))));
    }

    #[cfg(feature = "ocr")]
    #[test]
    fn linked_tesseract_requires_english_traineddata() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            LinkedTesseract::new(Some(dir.path())),
            Err(ExtractionError::TessdataNotFound(_))
        ));
    }

    #[cfg(feature = "ocr")]
    #[test]
    fn linked_tesseract_missing_image_is_reported() {
        let ocr = LinkedTesseract::new(None).unwrap();
        let result = ocr.recognize(Path::new("/nonexistent/labtriage/scan.png"), "eng");
        assert!(matches!(result, Err(ExtractionError::ImageNotFound(_))));
    }

    #[test]
    fn tesseract_missing_binary_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("scan.png");
        std::fs::write(&image, b"not really a png").unwrap();

        let ocr = TesseractCli::new(dir.path().join("no-such-tesseract"));
        assert!(matches!(
            ocr.recognize(&image, "eng"),
            Err(ExtractionError::OcrUnavailable(_))
        ));
    }
}
