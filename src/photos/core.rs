use super::{
    DATE_FORMAT, FilenameAllocator, MetadataExtractor, NewPhoto, PathResolver, Photo, PhotoError,
    PhotoResponse, PhotoStore, SplitName, TIME_FORMAT, UploadOutcome, parse_capture_datetime,
};
use crate::StorageConfig;
use crate::login::AuthError;
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, error, info, warn};

/// Upper bound on `_<n>` suffixes tried when a name is already taken.
const MAX_NAME_ATTEMPTS: u32 = 32;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub type SharedPhotoManager = Arc<PhotoManager>;

/// Sole writer of photo files and photo rows. Keeps the two in step with
/// forward steps and compensating undos, since they share no transaction.
pub struct PhotoManager {
    resolver: PathResolver,
    allocator: FilenameAllocator,
    store: Arc<dyn PhotoStore>,
    extractor: Arc<dyn MetadataExtractor>,
    clock: Arc<dyn Clock>,
}

impl PhotoManager {
    pub fn new(
        config: &StorageConfig,
        store: Arc<dyn PhotoStore>,
        extractor: Arc<dyn MetadataExtractor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            resolver: PathResolver::new(config.root_directory.clone(), &config.media_prefix),
            allocator: FilenameAllocator::new(&config.default_extension),
            store,
            extractor,
            clock,
        }
    }

    async fn owner_key(&self, username: &str) -> Result<i64, PhotoError> {
        self.store
            .owner_key(username)
            .await?
            .ok_or(PhotoError::Unauthorized(AuthError::UnknownUser))
    }

    pub async fn upload<R>(
        &self,
        username: &str,
        original_name: &str,
        mut reader: R,
    ) -> Result<UploadOutcome, PhotoError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let owner = self.owner_key(username).await?;
        let split = self.allocator.split_name(original_name)?;
        let dir = self.resolver.ensure_user_directory(username).await?;
        let now = self.clock.now();

        let (path, unique_name, size) = self.write_new_file(&dir, &split, now, &mut reader).await?;
        debug!("Wrote {} bytes to {}", size, path.display());

        let captured = self.capture_datetime(&path, now).await;

        let new_photo = NewPhoto {
            user_id: owner,
            date: captured.date(),
            time: captured.time(),
            path: path.clone(),
            name: split.base.clone(),
            ext: split.ext.clone(),
        };

        match self.store.insert_photo(new_photo).await {
            Ok(id) => {
                info!(
                    user = %username,
                    photo_id = id,
                    file = %unique_name,
                    "Photo uploaded"
                );
                Ok(UploadOutcome {
                    id,
                    unique_name,
                    date: captured.date(),
                    time: captured.time(),
                })
            }
            Err(insert_error) => Err(self.undo_write(&path, insert_error.into()).await),
        }
    }

    /// Creates the target file without clobbering anything, retrying with a
    /// suffixed name on collision, and streams the upload into it.
    async fn write_new_file<R>(
        &self,
        dir: &Path,
        split: &SplitName,
        now: DateTime<Utc>,
        reader: &mut R,
    ) -> Result<(PathBuf, String, u64), PhotoError>
    where
        R: AsyncRead + Unpin + Send,
    {
        for attempt in 0..=MAX_NAME_ATTEMPTS {
            let unique_name = self.allocator.allocate(split, now, attempt);
            let path = dir.join(&unique_name);

            // Listing relies on every stored path translating to a public one
            if self.resolver.public_path(&path).is_none() {
                return Err(PhotoError::Validation("Invalid file name".to_string()));
            }

            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(PhotoError::storage(
                        format!("creating {}", path.display()),
                        e,
                    ));
                }
            };

            let written = async {
                let size = tokio::io::copy(&mut *reader, &mut file).await?;
                file.flush().await?;
                file.sync_all().await?;
                Ok::<_, std::io::Error>(size)
            }
            .await;

            return match written {
                Ok(size) => Ok((path, unique_name, size)),
                Err(e) => {
                    drop(file);
                    if let Err(remove_error) = tokio::fs::remove_file(&path).await {
                        warn!(
                            "Could not remove partial upload {}: {}",
                            path.display(),
                            remove_error
                        );
                    }
                    Err(PhotoError::storage(format!("writing {}", path.display()), e))
                }
            };
        }

        Err(PhotoError::storage(
            format!("allocating a name in {}", dir.display()),
            std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "every candidate name is taken",
            ),
        ))
    }

    /// Embedded capture time if usable, otherwise the upload instant.
    async fn capture_datetime(&self, path: &Path, now: DateTime<Utc>) -> NaiveDateTime {
        let extractor = self.extractor.clone();
        let image_path = path.to_path_buf();
        let raw = tokio::task::spawn_blocking(move || extractor.capture_datetime(&image_path))
            .await
            .unwrap_or_else(|e| {
                warn!("Metadata extraction task failed: {}", e);
                None
            });

        match raw.as_deref().and_then(parse_capture_datetime) {
            Some(captured) => captured,
            None => {
                if let Some(raw) = raw {
                    debug!("Unparseable capture time '{}', using upload time", raw);
                }
                now.trunc_subsecs(0).naive_utc()
            }
        }
    }

    /// Removes a file whose index insert failed. If that fails too, the file is
    /// orphaned and the caller gets a consistency error instead.
    async fn undo_write(&self, path: &Path, cause: PhotoError) -> PhotoError {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                warn!(
                    "Removed {} after failed index insert: {}",
                    path.display(),
                    cause
                );
                cause
            }
            Err(remove_error) => {
                error!(
                    orphan = %path.display(),
                    insert_error = %cause,
                    remove_error = %remove_error,
                    "Compensating delete failed, file has no index row"
                );
                PhotoError::Consistency {
                    orphan: path.to_path_buf(),
                    cause: format!("{}; cleanup failed: {}", cause, remove_error),
                }
            }
        }
    }

    /// Deletes one of `username`'s photos: the row first, then the file.
    pub async fn delete(&self, username: &str, photo_id: i64) -> Result<Photo, PhotoError> {
        let owner = self.owner_key(username).await?;

        let photo = self
            .store
            .take_photo(photo_id, owner)
            .await?
            .ok_or(PhotoError::NotFound)?;

        if self.resolver.public_path(&photo.path).is_none() {
            error!(
                photo_id = photo.id,
                path = %photo.path.display(),
                "Deleted row pointed outside the storage root, file left untouched"
            );
            return Err(PhotoError::CorruptRecord {
                id: photo.id,
                path: photo.path,
            });
        }

        match tokio::fs::remove_file(&photo.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "File for photo {} was already gone: {}",
                    photo.id,
                    photo.path.display()
                );
            }
            Err(e) => {
                // Row is gone already; the file stays behind
                error!(
                    orphan = %photo.path.display(),
                    photo_id = photo.id,
                    error = %e,
                    "Index row deleted but file removal failed"
                );
                return Err(PhotoError::storage(
                    format!("removing {}", photo.path.display()),
                    e,
                ));
            }
        }

        info!(user = %username, photo_id = photo.id, "Photo deleted");
        Ok(photo)
    }

    /// Photos newest first. `Some(username)` restricts to that user's photos.
    pub async fn list(&self, scope: Option<&str>) -> Result<Vec<PhotoResponse>, PhotoError> {
        let owner = match scope {
            Some(username) => Some(self.owner_key(username).await?),
            None => None,
        };

        let mut photos = self.store.list_photos(owner).await?;
        photos.sort_by(|a, b| (b.date, b.time).cmp(&(a.date, a.time)));

        photos
            .into_iter()
            .map(|photo| -> Result<PhotoResponse, PhotoError> {
                let public_path = self.resolver.public_path(&photo.path).ok_or_else(|| {
                    PhotoError::CorruptRecord {
                        id: photo.id,
                        path: photo.path.clone(),
                    }
                })?;

                Ok(PhotoResponse {
                    id: photo.id.to_string(),
                    name: photo.name,
                    path: public_path,
                    date: photo.date.format(DATE_FORMAT).to_string(),
                    time: photo.time.format(TIME_FORMAT).to_string(),
                })
            })
            .collect()
    }
}
