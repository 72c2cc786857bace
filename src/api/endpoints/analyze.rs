//! Lab report upload and analysis endpoint.

use std::path::Path;

use axum::extract::{Multipart, State};
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::AppContext;
use crate::pipeline::processor::{AnalysisResult, PipelineError};
use crate::pipeline::upload::{stage_upload, StagedUploads};

/// `POST /api/analyze`: multipart batch of lab report files.
///
/// Every part carrying a filename is treated as a file, whatever its field
/// name. Parts without a filename are ignored.
pub async fn analyze(
    State(ctx): State<AppContext>,
    mut multipart: Multipart,
) -> Result<Json<AnalysisResult>, ApiError> {
    let expose_stack = ctx.expose_stack();
    let staged = receive_files(&ctx.config.upload_dir, &mut multipart, expose_stack).await?;

    // The pipeline owns the files from here on and deletes them on every path,
    // including when the client goes away before the run completes.
    let files = staged.into_files();
    tracing::info!(files = files.len(), "Upload received");

    let pipeline = ctx.pipeline.clone();
    let output = tokio::task::spawn_blocking(move || pipeline.run(files))
        .await
        .unwrap_or_else(|e| Err(PipelineError::Internal(format!("Pipeline task failed: {e}"))))
        .map_err(|e| ApiError::from_pipeline(e, expose_stack))?;

    ctx.relay.dispatch(output.scoring_payload);

    Ok(Json(output.result))
}

/// Stage every file part to disk.
///
/// Already-staged files are removed when this returns an error or when the
/// request future is dropped mid-stream.
async fn receive_files(
    upload_dir: &Path,
    multipart: &mut Multipart,
    expose_stack: bool,
) -> Result<StagedUploads, ApiError> {
    let mut staged = StagedUploads::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return Err(ApiError::BadRequest(format!("Malformed multipart body: {e}")));
            }
        };

        let Some(original_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let declared = field.content_type().map(str::to_string);

        let bytes = match field.bytes().await {
            Ok(b) => b,
            Err(e) => {
                return Err(ApiError::BadRequest(format!(
                    "Failed to read upload {original_name}: {e}"
                )));
            }
        };

        match stage_upload(upload_dir, &original_name, declared.as_deref(), &bytes) {
            Ok(file) => {
                tracing::debug!(
                    file = %file.original_name,
                    mime = %file.mime_type,
                    size = file.size_bytes,
                    "Upload staged"
                );
                staged.push(file);
            }
            Err(e) => return Err(ApiError::internal(&e, expose_stack)),
        }
    }

    Ok(staged)
}
