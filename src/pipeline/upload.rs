//! Uploaded files as the pipeline sees them, plus staging helpers used by the
//! transport layer to put multipart bodies on disk.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

pub const MIME_PDF: &str = "application/pdf";
const MIME_OCTET_STREAM: &str = "application/octet-stream";

/// A file admitted from a request, already written to the upload directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub path: PathBuf,
    pub mime_type: String,
    pub original_name: String,
    pub size_bytes: u64,
}

/// Coarse input type, which decides how text is obtained from a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Image,
    Pdf,
    Unsupported,
}

impl UploadedFile {
    pub fn kind(&self) -> FileKind {
        kind_of_mime(&self.mime_type)
    }

    pub fn summary(&self) -> FileSummary {
        FileSummary {
            filename: self.original_name.clone(),
            size: self.size_bytes,
        }
    }
}

/// Per-file entry of the response payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub filename: String,
    pub size: u64,
}

pub fn kind_of_mime(mime: &str) -> FileKind {
    let essence = mime
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if essence == MIME_PDF {
        FileKind::Pdf
    } else if essence.starts_with("image/") {
        FileKind::Image
    } else {
        FileKind::Unsupported
    }
}

/// Detect MIME type from file magic bytes (not extension or Content-Type header).
pub fn detect_mime_from_bytes(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() < 4 {
        return None;
    }

    // JPEG: FF D8 FF
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    // PNG: 89 50 4E 47
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        return Some("image/png");
    }
    if bytes.starts_with(b"%PDF") {
        return Some(MIME_PDF);
    }
    // TIFF: little- or big-endian byte order mark
    if bytes.starts_with(&[0x49, 0x49, 0x2A, 0x00]) || bytes.starts_with(&[0x4D, 0x4D, 0x00, 0x2A]) {
        return Some("image/tiff");
    }
    // WebP: RIFF....WEBP
    if bytes.len() >= 12 && bytes[..4] == *b"RIFF" && bytes[8..12] == *b"WEBP" {
        return Some("image/webp");
    }
    None
}

/// Resolve the MIME type of an upload.
///
/// The declared multipart content type wins unless it is missing or generic;
/// then magic bytes, then the file extension.
pub fn resolve_mime(declared: Option<&str>, filename: &str, bytes: &[u8]) -> String {
    if let Some(declared) = declared.map(str::trim).filter(|d| !d.is_empty()) {
        if !declared.eq_ignore_ascii_case(MIME_OCTET_STREAM) {
            return declared.to_ascii_lowercase();
        }
    }
    if let Some(detected) = detect_mime_from_bytes(bytes) {
        return detected.to_string();
    }
    mime_guess::from_path(filename)
        .first_raw()
        .unwrap_or(MIME_OCTET_STREAM)
        .to_string()
}

/// Strip anything from a client-supplied filename that could escape the upload dir.
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .filter(|&c| c != '/' && c != '\\' && c != '\0')
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    // Remove consecutive dots (path traversal prevention)
    let sanitized = sanitized.replace("..", "");

    let sanitized: String = sanitized.chars().take(100).collect();

    if sanitized.is_empty() {
        "upload".into()
    } else {
        sanitized
    }
}

/// Timestamp-qualified name, unique across concurrent requests.
pub fn staged_file_name(original_name: &str) -> String {
    let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S%3f");
    let nonce = Uuid::new_v4().simple().to_string();
    format!("{stamp}-{}-{}", &nonce[..8], sanitize_filename(original_name))
}

/// Write one upload into `upload_dir` and describe it.
pub fn stage_upload(
    upload_dir: &Path,
    original_name: &str,
    declared_mime: Option<&str>,
    bytes: &[u8],
) -> std::io::Result<UploadedFile> {
    fs::create_dir_all(upload_dir)?;
    let path = upload_dir.join(staged_file_name(original_name));
    fs::write(&path, bytes)?;

    Ok(UploadedFile {
        path,
        mime_type: resolve_mime(declared_mime, original_name, bytes),
        original_name: original_name.to_string(),
        size_bytes: bytes.len() as u64,
    })
}

/// Delete every file now. Used for early rejection paths.
pub fn discard_files(files: &[UploadedFile]) {
    for file in files {
        match fs::remove_file(&file.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %file.path.display(), "Failed to delete rejected upload: {e}");
            }
        }
    }
}

/// Uploads staged for one request that no pipeline run owns yet.
///
/// Dropping the batch deletes its files, which covers a client that goes
/// away while later parts are still streaming. `into_files` hands them on.
#[derive(Debug, Default)]
pub struct StagedUploads {
    files: Vec<UploadedFile>,
}

impl StagedUploads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, file: UploadedFile) {
        self.files.push(file);
    }

    /// Transfer ownership of the files; the batch no longer deletes them.
    pub fn into_files(mut self) -> Vec<UploadedFile> {
        std::mem::take(&mut self.files)
    }
}

impl Drop for StagedUploads {
    fn drop(&mut self) {
        if !self.files.is_empty() {
            tracing::debug!(files = self.files.len(), "Discarding unclaimed uploads");
            discard_files(&self.files);
        }
    }
}

/// Remove files left in the upload directory by a previous crash.
///
/// Called once at startup, before the server accepts requests.
pub fn cleanup_orphaned_uploads(upload_dir: &Path) -> usize {
    let entries = match fs::read_dir(upload_dir) {
        Ok(e) => e,
        Err(_) => return 0, // Upload dir may not exist yet
    };

    let mut cleaned = 0usize;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => cleaned += 1,
            Err(e) => tracing::warn!(path = %path.display(), "Failed to remove orphaned upload: {e}"),
        }
    }

    if cleaned > 0 {
        tracing::info!(
            files_cleaned = cleaned,
            "Cleaned orphaned uploads from previous run"
        );
    }
    cleaned
}
