use axum::extract::{FromRequest, Multipart, Request};
use tracing::{debug, warn};

use super::{MAX_UPLOAD_BYTES, error::ApiError};

/// Multipart field the front-end sends the picture in.
pub const UPLOAD_FIELD_NAME: &str = "image";

#[derive(Debug)]
pub struct UploadedImage {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Pulls the `image` field out of a multipart request.
///
/// The declared content type is checked before the body is read, and reading
/// stops as soon as the field grows past [`MAX_UPLOAD_BYTES`].
pub async fn extract_upload(request: Request) -> Result<UploadedImage, ApiError> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to process multipart request: {}", e)))?;

    let mut upload: Option<UploadedImage> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to process multipart field: {}", e)))?
    {
        if field.name() != Some(UPLOAD_FIELD_NAME) {
            debug!(
                "Ignoring multipart field: {}",
                field.name().unwrap_or("unnamed")
            );
            continue;
        }

        if upload.is_some() {
            warn!("Multiple 'image' fields found in multipart request, using the last one");
        }

        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        debug!(
            "Received file: {:?}, content_type: {:?}",
            filename, content_type
        );

        if let Some(content_type) = content_type.as_deref() {
            if !is_image_content_type(content_type) {
                debug!("Invalid content type: {}", content_type);
                return Err(ApiError::BadRequest(
                    "Invalid file type. Only images are allowed.".to_string(),
                ));
            }
        }

        let mut data = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read file data: {}", e)))?
        {
            if data.len() + chunk.len() > MAX_UPLOAD_BYTES {
                return Err(file_too_large());
            }
            data.extend_from_slice(&chunk);
        }

        upload = Some(UploadedImage {
            filename,
            content_type,
            data,
        });
    }

    upload.ok_or_else(|| {
        ApiError::BadRequest(format!(
            "Missing '{}' field in multipart request.",
            UPLOAD_FIELD_NAME
        ))
    })
}

fn file_too_large() -> ApiError {
    ApiError::BadRequest("File too large. Maximum size is 10MB.".to_string())
}

fn is_image_content_type(content_type: &str) -> bool {
    match content_type.parse::<mime::Mime>() {
        Ok(parsed) => parsed.type_() == mime::IMAGE,
        Err(_) => content_type.starts_with("image/"),
    }
}

/// Final path component of a client-supplied filename, so it cannot escape
/// the upload directory.
pub fn sanitize_filename(filename: Option<&str>) -> Option<String> {
    let name = filename?.rsplit(['/', '\\']).next()?.trim();
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}
