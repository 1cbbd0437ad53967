// Photos module - upload, delete and listing of per-user photos
mod core;
mod error;
mod handlers;
mod metadata;
mod storage;
mod store;
mod types;

// Re-export public items
pub use self::core::{Clock, PhotoManager, SharedPhotoManager, SystemClock};
pub use error::PhotoError;
pub use handlers::{delete_handler, photos_handler, upload_handler};
pub use metadata::{ExifExtractor, MetadataExtractor, parse_capture_datetime};
pub use storage::{FilenameAllocator, PathResolver, SplitName, sanitize_identity};
pub use store::PhotoStore;
pub use types::*;

#[cfg(test)]
mod tests;
