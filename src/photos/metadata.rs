use chrono::NaiveDateTime;
use std::path::Path;
use tracing::{debug, trace};

/// Source of a raw capture timestamp for a stored image.
pub trait MetadataExtractor: Send + Sync {
    /// The raw timestamp string, or `None` if the image has none or cannot be read.
    fn capture_datetime(&self, path: &Path) -> Option<String>;
}

/// Reads EXIF date tags from the file on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifExtractor;

impl MetadataExtractor for ExifExtractor {
    fn capture_datetime(&self, path: &Path) -> Option<String> {
        let exif_data = match rexif::parse_file(path) {
            Ok(exif_data) => exif_data,
            Err(e) => {
                trace!("No EXIF data for {}: {}", path.display(), e);
                return None;
            }
        };

        // Try different date fields in order of preference
        let date_fields = [
            rexif::ExifTag::DateTimeOriginal,
            rexif::ExifTag::DateTimeDigitized,
            rexif::ExifTag::DateTime,
        ];

        for field in &date_fields {
            if let Some(entry) = exif_data.entries.iter().find(|e| e.tag == *field) {
                let value = entry.value_more_readable.trim().to_string();
                if !value.is_empty() {
                    debug!("Found capture date in {:?}: {}", field, value);
                    return Some(value);
                }
            }
        }

        None
    }
}

/// Parses the timestamp formats seen in EXIF data. Both a date and a
/// time-of-day are required.
pub fn parse_capture_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim().trim_end_matches('\0');

    // EXIF datetime format: "2005:07:30 07:22:46"
    let formats = [
        "%Y:%m:%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y/%m/%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d_%H:%M:%S",
    ];

    formats
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}
