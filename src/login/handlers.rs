use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::AppState;

use super::AuthError;

#[derive(Debug, Serialize)]
pub struct CheckAuthResponse {
    pub username: String,
}

pub async fn check_auth_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CheckAuthResponse>, AuthError> {
    let username = app_state.authenticator.authenticate(&headers).map_err(|e| {
        debug!("Session check failed: {}", e);
        e
    })?;

    Ok(Json(CheckAuthResponse { username }))
}

pub async fn logout_handler(State(app_state): State<AppState>) -> impl IntoResponse {
    let cookie = format!(
        "{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax",
        app_state.authenticator.cookie_name()
    );

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        headers.insert(SET_COOKIE, value);
    }

    info!("Session cleared");
    (StatusCode::OK, headers, "Logged out successfully")
}

/// `Set-Cookie` value for a freshly issued session.
pub fn session_cookie_header(
    cookie_name: &str,
    signed_value: &str,
    max_age_secs: u64,
) -> String {
    format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        cookie_name, signed_value, max_age_secs
    )
}
