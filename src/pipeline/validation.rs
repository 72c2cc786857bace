//! Batch admission policy: up to three images, or exactly one PDF, never both.

use thiserror::Error;

use super::upload::{FileKind, UploadedFile};

pub const MAX_IMAGES_PER_BATCH: usize = 3;
pub const MAX_PDFS_PER_BATCH: usize = 1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No files were uploaded")]
    EmptyBatch,

    #[error("Only one PDF may be uploaded at a time ({count} received)")]
    TooManyPdfs { count: usize },

    #[error("At most 3 images may be uploaded at a time ({count} received)")]
    TooManyImages { count: usize },

    #[error("Images and PDFs cannot be uploaded together")]
    MixedBatch,

    #[error("Unsupported file type for {filename}: {mime_type}")]
    UnsupportedType { filename: String, mime_type: String },
}

/// Composition of an accepted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchShape {
    pub images: usize,
    pub pdfs: usize,
}

/// Check a batch against the admission rules, in order, stopping at the first violation.
pub fn validate_batch(files: &[UploadedFile]) -> Result<BatchShape, ValidationError> {
    if files.is_empty() {
        return Err(ValidationError::EmptyBatch);
    }

    let images = files.iter().filter(|f| f.kind() == FileKind::Image).count();
    let pdfs = files.iter().filter(|f| f.kind() == FileKind::Pdf).count();

    if pdfs > MAX_PDFS_PER_BATCH {
        return Err(ValidationError::TooManyPdfs { count: pdfs });
    }
    if images > MAX_IMAGES_PER_BATCH {
        return Err(ValidationError::TooManyImages { count: images });
    }
    if pdfs > 0 && images > 0 {
        return Err(ValidationError::MixedBatch);
    }
    if let Some(other) = files.iter().find(|f| f.kind() == FileKind::Unsupported) {
        return Err(ValidationError::UnsupportedType {
            filename: other.original_name.clone(),
            mime_type: other.mime_type.clone(),
        });
    }

    Ok(BatchShape { images, pdfs })
}
