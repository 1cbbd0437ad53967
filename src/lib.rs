use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod api;
pub mod database;
pub mod login;
pub mod photos;
pub mod startup_checks;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub app: AppConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub name: String,
    pub log_level: String,
    pub session_secret: String,
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
    #[serde(default = "default_session_max_age")]
    pub session_max_age_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub root_directory: PathBuf,
    #[serde(default = "default_media_prefix")]
    pub media_prefix: String,
    #[serde(default = "default_extension")]
    pub default_extension: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default)]
    pub public_listing: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

pub const DEFAULT_SESSION_SECRET: &str = "change-me-in-production";

fn default_session_cookie() -> String {
    "auth_user_session".to_string()
}

fn default_session_max_age() -> u64 {
    3600
}

fn default_media_prefix() -> String {
    "/media".to_string()
}

fn default_extension() -> String {
    "jpg".to_string()
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            app: AppConfig {
                name: "Hearth".to_string(),
                log_level: "info".to_string(),
                session_secret: DEFAULT_SESSION_SECRET.to_string(),
                session_cookie: default_session_cookie(),
                session_max_age_secs: default_session_max_age(),
            },
            storage: StorageConfig {
                root_directory: PathBuf::from("root"),
                media_prefix: default_media_prefix(),
                default_extension: default_extension(),
                max_upload_bytes: default_max_upload_bytes(),
                public_listing: false,
            },
            database: DatabaseConfig {
                path: PathBuf::from("family_server.db"),
            },
        }
    }
}

use axum::{Router, extract::DefaultBodyLimit};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub authenticator: Arc<dyn login::Authenticator>,
    pub photos: photos::SharedPhotoManager,
    pub config: Config,
}

/// Builds the router on top of an already opened database.
pub fn create_app_with_database(config: Config, db: database::Database) -> Router {
    let authenticator: Arc<dyn login::Authenticator> = Arc::new(
        login::SignedCookieAuthenticator::new(
            config.app.session_secret.clone(),
            config.app.session_cookie.clone(),
        ),
    );

    let photos = Arc::new(photos::PhotoManager::new(
        &config.storage,
        Arc::new(db),
        Arc::new(photos::ExifExtractor),
        Arc::new(photos::SystemClock),
    ));

    let app_state = AppState {
        authenticator,
        photos,
        config: config.clone(),
    };

    Router::new()
        .route("/ping", axum::routing::get(api::ping_handler))
        .route(
            "/upload",
            axum::routing::post(photos::upload_handler)
                .layer(DefaultBodyLimit::max(config.storage.max_upload_bytes)),
        )
        .route("/delete", axum::routing::delete(photos::delete_handler))
        .route("/photos", axum::routing::get(photos::photos_handler))
        .route("/check-auth", axum::routing::get(login::check_auth_handler))
        .route("/logout", axum::routing::post(login::logout_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    let method = request.method();
                    let uri = request.uri();
                    let matched_path = request
                        .extensions()
                        .get::<axum::extract::MatchedPath>()
                        .map(|matched_path| matched_path.as_str());

                    tracing::info_span!(
                        "http_request",
                        method = %method,
                        uri = %uri,
                        matched_path,
                    )
                })
                .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                    let user_agent = request
                        .headers()
                        .get("user-agent")
                        .and_then(|h| h.to_str().ok())
                        .unwrap_or("-");

                    tracing::info!(
                        target: "access_log",
                        method = %request.method(),
                        path = %request.uri().path(),
                        user_agent = %user_agent,
                        "request"
                    );
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        tracing::info!(
                            target: "access_log",
                            status = %response.status(),
                            latency_ms = %latency.as_millis(),
                            "response"
                        );
                    },
                ),
        )
        .with_state(app_state)
}

pub async fn create_app(config: Config) -> Result<Router, database::StoreError> {
    let db = database::Database::open(&config.database.path).await?;
    Ok(create_app_with_database(config, db))
}
