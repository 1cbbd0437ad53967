use crate::api::{get_cookie_value, verify_signed_cookie};
use axum::http::HeaderMap;

use super::AuthError;

/// Turns request headers into a verified username.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, headers: &HeaderMap) -> Result<String, AuthError>;

    fn cookie_name(&self) -> &str;
}

/// Session cookie of the form `username:signature`, signed with HMAC-SHA256.
pub struct SignedCookieAuthenticator {
    secret: String,
    cookie_name: String,
}

impl SignedCookieAuthenticator {
    pub fn new(secret: String, cookie_name: String) -> Self {
        Self {
            secret,
            cookie_name,
        }
    }
}

impl Authenticator for SignedCookieAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> Result<String, AuthError> {
        let signed_value =
            get_cookie_value(headers, &self.cookie_name).ok_or(AuthError::MissingSession)?;
        let username =
            verify_signed_cookie(&self.secret, &signed_value).ok_or(AuthError::InvalidSession)?;
        if username.is_empty() {
            return Err(AuthError::InvalidSession);
        }
        Ok(username)
    }

    fn cookie_name(&self) -> &str {
        &self.cookie_name
    }
}
