use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use estate_types::api::UploadResponse;
use estate_types::events::RealtimeEvent;

use crate::convert;
use crate::error::{ApiError, blocking};
use crate::middleware::AuthUser;
use crate::properties::{ensure_manager, load_visible};
use crate::state::AppState;

/// 10 MB upload limit per image
pub const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;

/// POST /properties/{id}/images: raw image bytes. Saved to the upload dir
/// under a fresh id and appended to the listing's gallery.
pub async fn upload_image(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
    Extension(caller): Extension<AuthUser>,
    bytes: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    if bytes.is_empty() {
        return Err(ApiError::bad_request("empty upload"));
    }
    if bytes.len() > MAX_IMAGE_SIZE {
        return Err(ApiError::PayloadTooLarge(format!(
            "images are limited to {} MB",
            MAX_IMAGE_SIZE / (1024 * 1024)
        )));
    }
    if sniff_content_type(&bytes).is_none() {
        return Err(ApiError::bad_request(
            "unsupported image format (jpeg, png, gif, webp)",
        ));
    }

    let row = load_visible(&state, property_id, Some(&caller)).await?;
    ensure_manager(&caller, &row)?;

    let image_id = Uuid::new_v4().to_string();
    let size = bytes.len() as i64;

    tokio::fs::create_dir_all(&state.config.upload_dir)
        .await
        .map_err(|e| anyhow::anyhow!("failed to create upload dir: {}", e))?;

    let path = state.config.upload_dir.join(&image_id);
    let db = state.db.clone();
    let iid = image_id.clone();
    let pid = row.id.clone();
    let updated = persist(&path, &bytes, async move {
        blocking(move || {
            db.add_property_image(&iid, &pid, size)?;
            db.get_property(&pid)
        })
        .await
    })
    .await?;

    if let Some(updated) = updated {
        state.dispatcher.publish(RealtimeEvent::PropertyUpdate {
            property: convert::property(&state, updated),
        });
    }

    info!("{} uploaded image {} to listing {}", caller.email, image_id, property_id);
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            url: state.image_url(&image_id),
            image_id,
            size: size as u64,
        }),
    ))
}

/// GET /files/{id}: serves a stored listing image.
pub async fn serve_file(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    // Only ids we issued; rules out path traversal
    let image_id = image_id
        .parse::<Uuid>()
        .map_err(|_| ApiError::bad_request("invalid file id"))?
        .to_string();

    let db = state.db.clone();
    let iid = image_id.clone();
    blocking(move || db.get_image(&iid))
        .await?
        .ok_or_else(|| ApiError::not_found("file"))?;

    let path = state.config.upload_dir.join(&image_id);
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        warn!("Image {} is in the DB but unreadable: {}", image_id, e);
        ApiError::not_found("file")
    })?;

    let content_type = sniff_content_type(&bytes).unwrap_or("application/octet-stream");
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
        ],
        bytes,
    ))
}

/// Best-effort removal of image files whose rows are already gone.
/// Write `bytes` to `path`, then run `register`. The file is removed again
/// if either step fails, so no upload is left without a database row.
async fn persist<T, Fut>(path: &std::path::Path, bytes: &[u8], register: Fut) -> Result<T, ApiError>
where
    Fut: Future<Output = Result<T, ApiError>>,
{
    let written = async {
        let mut file = tokio::fs::File::create(path).await?;
        file.write_all(bytes).await?;
        file.flush().await
    }
    .await;

    let result = match written {
        Ok(()) => register.await,
        Err(e) => Err(ApiError::Internal(anyhow::anyhow!(
            "failed to write {}: {}",
            path.display(),
            e
        ))),
    };

    if result.is_err() {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove orphaned upload {}: {}", path.display(), e);
            }
        }
    }
    result
}

pub async fn remove_files(state: &AppState, image_ids: &[String]) {
    for id in image_ids {
        let path = state.config.upload_dir.join(id);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

/// Identify an image by its magic bytes.
pub fn sniff_content_type(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some("image/png"),
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some("image/gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        _ => None,
    }
}
