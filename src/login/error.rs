use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

/// Why a request could not be tied to a user. Every variant renders the same
/// response so callers cannot probe which usernames exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    MissingSession,
    InvalidSession,
    UnknownUser,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingSession => write!(f, "No session cookie presented"),
            AuthError::InvalidSession => write!(f, "Session cookie failed verification"),
            AuthError::UnknownUser => write!(f, "Session names a user that does not exist"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, "Unauthorized: Please login").into_response()
    }
}
