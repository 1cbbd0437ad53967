use super::{DeleteRequest, PhotoError, PhotoResponse, UploadResponse};
use crate::AppState;
use crate::login::AuthError;
use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, State, multipart::MultipartRejection},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use tracing::{debug, warn};

/// Multipart form field carrying the image.
const PHOTO_FIELD: &str = "photo";

pub async fn upload_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, PhotoError> {
    let username = app_state.authenticator.authenticate(&headers)?;

    let mut multipart = multipart.map_err(|e| {
        warn!("Rejected upload body: {}", e);
        PhotoError::Validation("Could not get file".to_string())
    })?;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Error reading multipart form: {}", e);
                return Err(PhotoError::Validation("Invalid multipart data".to_string()));
            }
        };

        if field.name() != Some(PHOTO_FIELD) {
            debug!("Skipping form field {:?}", field.name());
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| PhotoError::Validation("Could not get file".to_string()))?;

        let data = field.bytes().await.map_err(|e| {
            warn!("Error reading file data: {}", e);
            PhotoError::Validation("Error reading file".to_string())
        })?;

        let outcome = app_state
            .photos
            .upload(&username, &file_name, &data[..])
            .await?;

        return Ok((
            StatusCode::CREATED,
            Json(UploadResponse {
                id: outcome.id.to_string(),
                name: outcome.unique_name,
            }),
        ));
    }

    Err(PhotoError::Validation("Could not get file".to_string()))
}

pub async fn delete_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, PhotoError> {
    let username = app_state.authenticator.authenticate(&headers)?;

    let request: DeleteRequest = serde_json::from_slice(&body)
        .map_err(|_| PhotoError::Validation("Invalid photo".to_string()))?;

    // The name is only checked for presence; ownership comes from the session
    if !request.has_id() || !request.has_name() {
        return Err(PhotoError::Validation(
            "Name or ID not provided".to_string(),
        ));
    }

    let photo_id = request
        .photo_id()
        .ok_or_else(|| PhotoError::Validation("Invalid photo id".to_string()))?;

    app_state.photos.delete(&username, photo_id).await?;

    Ok((StatusCode::OK, "Successfully deleted image"))
}

pub async fn photos_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<PhotoResponse>>, PhotoError> {
    let photos = match app_state.authenticator.authenticate(&headers) {
        Ok(username) => app_state.photos.list(Some(&username)).await?,
        Err(AuthError::MissingSession) if app_state.config.storage.public_listing => {
            app_state.photos.list(None).await?
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Json(photos))
}
