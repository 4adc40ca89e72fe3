// API handlers for the web server

use super::{
    AppState,
    error::ApiError,
    image_codec::{
        detect_image_format, is_heic_filename, sniff_signature, transcode_to_jpeg,
        transcoded_path,
    },
    models::*,
    upload::{extract_upload, sanitize_filename},
};
use crate::models::{JobRecord, JobStatus, NewJob};
use axum::{
    Json,
    extract::{Path, Request, State},
};
use std::path::{Path as FsPath, PathBuf};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

// --- POST /api/upload ---
// Validates an image, stores it under the upload directory and opens a job
pub async fn upload_image(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<UploadResponse>, ApiError> {
    let upload = extract_upload(request).await?;
    info!(
        "Received file: {:?}, content_type: {:?}, size: {}",
        upload.filename,
        upload.content_type,
        upload.data.len()
    );

    if upload.data.is_empty() {
        return Err(ApiError::BadRequest("Empty file received.".to_string()));
    }

    let data = upload.data;
    let (data, kind) = tokio::task::spawn_blocking(move || {
        let kind = detect_image_format(&data);
        (data, kind)
    })
    .await
    .map_err(upload_failed)?;

    let kind = kind.ok_or_else(|| {
        ApiError::BadRequest(
            "Invalid image format. Only JPG, PNG, GIF, WEBP, HEIC are supported.".to_string(),
        )
    })?;
    debug!("Upload recognized as {}", kind.name());

    let job_id = Uuid::new_v4().to_string();
    let filename = sanitize_filename(upload.filename.as_deref())
        .unwrap_or_else(|| format!("image_{}", job_id));
    let file_path = state.upload_dir.join(format!("{}_{}", job_id, filename));

    tokio::fs::write(&file_path, &data)
        .await
        .map_err(upload_failed)?;

    let record = state
        .jobs
        .create(NewJob {
            job_id,
            filename,
            file_path,
            size: data.len(),
        })
        .await;

    info!("Successfully uploaded: {}", record.job_id);

    Ok(Json(UploadResponse {
        success: true,
        job_id: record.job_id,
        filename: record.filename,
        size: record.size,
    }))
}

fn upload_failed(err: impl std::fmt::Display) -> ApiError {
    error!("Upload error: {}", err);
    ApiError::InternalServerError(format!("Upload failed: {}", err))
}

// --- POST /api/print/{job_id} ---
// Sends the stored image to the printer API and records the outcome
pub async fn print_image(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<PrintResponse>, ApiError> {
    let job = state
        .jobs
        .get(&job_id)
        .await
        .ok_or_else(ApiError::job_not_found)?;

    if job.status.is_terminal() {
        return Err(ApiError::Conflict(format!(
            "Job {} is already {}",
            job_id, job.status
        )));
    }

    let original = match tokio::fs::read(&job.file_path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(
                "Image file for job {} is missing: {}",
                job_id,
                job.file_path.display()
            );
            return Err(ApiError::NotFound("Image file not found".to_string()));
        }
        Err(e) => {
            mark_failed(&state, &job_id).await;
            return Err(ApiError::InternalServerError(format!(
                "Print job failed: {}",
                e
            )));
        }
    };

    let payload = prepare_payload(&job, original).await;
    let outcome = state
        .printer
        .forward(&payload.filename, payload.data, payload.mime)
        .await;

    if let Some(path) = payload.cleanup {
        if let Err(e) = tokio::fs::remove_file(&path).await {
            debug!("Could not remove {}: {}", path.display(), e);
        }
    }

    match outcome {
        Ok(()) => {
            state
                .jobs
                .update_status(&job_id, JobStatus::Completed)
                .await?;
            info!("Print job {} completed", job_id);

            Ok(Json(PrintResponse {
                success: true,
                message: "Print job completed successfully".to_string(),
                job_id,
            }))
        }
        Err(err) => {
            error!("Print job {} failed: {}", job_id, err);
            mark_failed(&state, &job_id).await;
            Err(err.into())
        }
    }
}

async fn mark_failed(state: &AppState, job_id: &str) {
    if let Err(e) = state.jobs.update_status(job_id, JobStatus::Failed).await {
        warn!("Could not mark job {} as failed: {}", job_id, e);
    }
}

/// The bytes actually sent to the printer.
struct PrintPayload {
    filename: String,
    data: Vec<u8>,
    mime: &'static str,
    // Transcoder output to delete once forwarding is over.
    cleanup: Option<PathBuf>,
}

async fn prepare_payload(job: &JobRecord, original: Vec<u8>) -> PrintPayload {
    let mut cleanup = None;

    if is_heic_filename(&job.filename) {
        let src = job.file_path.clone();
        let dst = transcoded_path(&src);
        cleanup = Some(dst.clone());

        let transcoded = {
            let dst = dst.clone();
            tokio::task::spawn_blocking(move || transcode_to_jpeg(&src, &dst)).await
        };

        match transcoded {
            Ok(Ok(())) => match tokio::fs::read(&dst).await {
                Ok(data) => {
                    info!("Transcoded job {} to JPEG", job.job_id);
                    return PrintPayload {
                        filename: jpeg_filename(&job.filename),
                        data,
                        mime: "image/jpeg",
                        cleanup,
                    };
                }
                Err(e) => warn!("Could not read transcoded {}: {}", dst.display(), e),
            },
            Ok(Err(e)) if e.is_unsupported_format() => warn!(
                "No decoder available for {} (job {}), forwarding original file",
                job.filename, job.job_id
            ),
            Ok(Err(e)) => warn!(
                "HEIC conversion failed for job {}, forwarding original file: {}",
                job.job_id, e
            ),
            Err(e) => warn!("HEIC conversion task for job {} failed: {}", job.job_id, e),
        }
    }

    PrintPayload {
        filename: job.filename.clone(),
        mime: sniff_signature(&original)
            .map(|kind| kind.mime())
            .unwrap_or("image/*"),
        data: original,
        cleanup,
    }
}

fn jpeg_filename(filename: &str) -> String {
    FsPath::new(filename)
        .with_extension("jpg")
        .to_string_lossy()
        .into_owned()
}

// --- GET /api/status/{job_id} ---
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let job = state
        .jobs
        .get(&job_id)
        .await
        .ok_or_else(ApiError::job_not_found)?;

    Ok(Json(JobStatusResponse::from(job)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_filename() {
        assert_eq!(jpeg_filename("IMG_0001.HEIC"), "IMG_0001.jpg");
        assert_eq!(jpeg_filename("scan.heif"), "scan.jpg");
    }
}
