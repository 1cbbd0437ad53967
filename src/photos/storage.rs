use super::PhotoError;
use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Reduces an identity to a single safe path segment.
///
/// Separators split the input into segments; empty, `.` and `..` segments are
/// dropped and the last remaining one is kept. Returns `None` when nothing
/// usable is left.
pub fn sanitize_identity(identity: &str) -> Option<String> {
    if identity.contains('\0') {
        return None;
    }

    identity
        .split(['/', '\\'])
        .map(str::trim)
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .last()
        .map(str::to_string)
}

/// Maps users to their storage directory under a fixed root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    media_prefix: String,
}

impl PathResolver {
    pub fn new(root: PathBuf, media_prefix: &str) -> Self {
        let media_prefix = format!("/{}", media_prefix.trim_matches('/'));
        Self { root, media_prefix }
    }

    pub fn user_directory(&self, identity: &str) -> Result<PathBuf, PhotoError> {
        let segment = sanitize_identity(identity)
            .ok_or_else(|| PhotoError::Validation("Invalid user identity".to_string()))?;
        let dir = self.root.join(segment);

        if !dir.starts_with(&self.root) {
            return Err(PhotoError::Validation("Invalid user identity".to_string()));
        }

        Ok(dir)
    }

    /// Resolves the user's directory and creates it if needed. Safe to race
    /// with other requests creating the same directory.
    pub async fn ensure_user_directory(&self, identity: &str) -> Result<PathBuf, PhotoError> {
        let dir = self.user_directory(identity)?;

        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            // Someone else may have won the race; only fail if it's still not a directory
            let exists = tokio::fs::metadata(&dir)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);
            if !exists {
                return Err(PhotoError::storage(
                    format!("creating directory {}", dir.display()),
                    e,
                ));
            }
        }

        match tokio::fs::metadata(&dir).await {
            Ok(metadata) if metadata.is_dir() => {
                debug!("User directory ready: {}", dir.display());
                Ok(dir)
            }
            Ok(_) => Err(PhotoError::storage(
                format!("creating directory {}", dir.display()),
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "not a directory"),
            )),
            Err(e) => Err(PhotoError::storage(
                format!("inspecting directory {}", dir.display()),
                e,
            )),
        }
    }

    /// Public URL path for a stored file, or `None` if the file is not under
    /// the storage root.
    pub fn public_path(&self, stored: &Path) -> Option<String> {
        let relative = stored.strip_prefix(&self.root).ok()?;

        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(segment) => segments.push(segment.to_str()?),
                _ => return None,
            }
        }

        if segments.is_empty() {
            return None;
        }

        if self.media_prefix == "/" {
            Some(format!("/{}", segments.join("/")))
        } else {
            Some(format!("{}/{}", self.media_prefix, segments.join("/")))
        }
    }
}

/// Client file name split at its last dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitName {
    pub base: String,
    pub ext: String,
}

#[derive(Debug, Clone)]
pub struct FilenameAllocator {
    default_extension: String,
}

impl FilenameAllocator {
    pub fn new(default_extension: &str) -> Self {
        let default_extension = default_extension.trim_start_matches('.');
        Self {
            default_extension: if default_extension.is_empty() {
                "jpg".to_string()
            } else {
                default_extension.to_string()
            },
        }
    }

    pub fn split_name(&self, original: &str) -> Result<SplitName, PhotoError> {
        // Browsers on some platforms send the full client path
        let file_name = original
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .trim();

        if file_name.is_empty() || file_name == "." || file_name == ".." || file_name.contains('\0')
        {
            return Err(PhotoError::Validation("Invalid file name".to_string()));
        }

        let split = match file_name.rfind('.') {
            Some(dot) => {
                let ext = &file_name[dot + 1..];
                SplitName {
                    base: file_name[..dot].to_string(),
                    ext: if ext.is_empty() {
                        self.default_extension.clone()
                    } else {
                        ext.to_string()
                    },
                }
            }
            None => SplitName {
                base: file_name.to_string(),
                ext: self.default_extension.clone(),
            },
        };

        Ok(split)
    }

    /// `<unix-seconds>_<base>.<ext>`; retries after a collision append `_<attempt>`
    /// to the base.
    pub fn allocate(&self, split: &SplitName, now: DateTime<Utc>, attempt: u32) -> String {
        let timestamp = now.timestamp();
        let name = if attempt == 0 {
            format!("{}_{}.{}", timestamp, split.base, split.ext)
        } else {
            format!("{}_{}_{}.{}", timestamp, split.base, attempt, split.ext)
        };

        if attempt > 0 {
            info!("Name collision, trying {}", name);
        }
        name
    }
}
