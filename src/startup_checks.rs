use crate::{Config, DEFAULT_SESSION_SECRET};
use std::path::Path;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum StartupCheckError {
    #[error("Failed to create storage root: {0}")]
    StorageRootCreationFailed(std::io::Error),

    #[error("Storage root is not a directory: {0}")]
    StorageRootNotDirectory(String),

    #[error("Failed to create database directory: {0}")]
    DatabaseDirectoryCreationFailed(std::io::Error),

    #[error("Session secret is the built-in default")]
    DefaultSessionSecret,
}

impl StartupCheckError {
    pub fn is_critical(&self) -> bool {
        !matches!(self, StartupCheckError::DefaultSessionSecret)
    }
}

pub async fn perform_startup_checks(config: &Config) -> Result<(), Vec<StartupCheckError>> {
    let mut errors = Vec::new();

    info!("Performing startup checks...");

    let root = Path::new(&config.storage.root_directory);
    if !root.exists() {
        info!("Storage root does not exist, creating: {:?}", root);
        if let Err(e) = tokio::fs::create_dir_all(root).await {
            error!("Failed to create storage root: {}", e);
            errors.push(StartupCheckError::StorageRootCreationFailed(e));
        } else {
            info!("Storage root created successfully");
        }
    } else if !root.is_dir() {
        error!("Storage root is not a directory: {:?}", root);
        errors.push(StartupCheckError::StorageRootNotDirectory(
            root.display().to_string(),
        ));
    } else {
        info!("Storage root exists: {:?}", root);
    }

    if let Some(parent) = config.database.path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        info!("Database directory does not exist, creating: {:?}", parent);
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            error!("Failed to create database directory: {}", e);
            errors.push(StartupCheckError::DatabaseDirectoryCreationFailed(e));
        }
    }

    if config.app.session_secret == DEFAULT_SESSION_SECRET {
        warn!("Session secret is still the default; anyone can forge sessions");
        errors.push(StartupCheckError::DefaultSessionSecret);
    }

    if errors.is_empty() {
        info!("All startup checks passed");
        Ok(())
    } else {
        error!("Startup checks failed with {} errors", errors.len());
        Err(errors)
    }
}
