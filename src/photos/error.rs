use crate::database::StoreError;
use crate::login::AuthError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::path::PathBuf;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum PhotoError {
    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Storage error while {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Index error: {0}")]
    Persistence(#[from] StoreError),

    #[error("Photo not found")]
    NotFound,

    /// A compensating delete failed; the file at `orphan` has no index row.
    #[error("Orphaned file {}: {cause}", .orphan.display())]
    Consistency { orphan: PathBuf, cause: String },

    #[error("Photo {id} is stored outside the storage root: {}", .path.display())]
    CorruptRecord { id: i64, path: PathBuf },
}

impl PhotoError {
    pub(crate) fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
        PhotoError::Storage {
            context: context.into(),
            source,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PhotoError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            PhotoError::Validation(_) => StatusCode::BAD_REQUEST,
            PhotoError::NotFound => StatusCode::NOT_FOUND,
            PhotoError::Storage { .. }
            | PhotoError::Persistence(_)
            | PhotoError::Consistency { .. }
            | PhotoError::CorruptRecord { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PhotoError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        match self {
            PhotoError::Unauthorized(e) => e.into_response(),
            PhotoError::Validation(message) => (status, message).into_response(),
            PhotoError::NotFound => (
                status,
                "Photo not found in db or incorrect information given",
            )
                .into_response(),
            PhotoError::Storage { .. } => (status, "Internal storage error").into_response(),
            PhotoError::Persistence(_) => (status, "Database error").into_response(),
            PhotoError::Consistency { .. } => {
                (status, "Storage and database are out of sync").into_response()
            }
            PhotoError::CorruptRecord { .. } => (status, "Corrupt photo record").into_response(),
        }
    }
}
