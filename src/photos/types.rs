use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// A row of the photo index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Photo {
    pub id: i64,
    pub user_id: i64,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub path: PathBuf,
    pub name: String,
    pub ext: String,
}

/// Everything needed to insert a row; the id is assigned by the index.
#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub user_id: i64,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub path: PathBuf,
    pub name: String,
    pub ext: String,
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub id: i64,
    pub unique_name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub id: String,
    pub name: String,
}

/// Listing entry. `path` is the public media path, never the on-disk one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoResponse {
    pub id: String,
    pub name: String,
    pub path: String,
    pub date: String,
    pub time: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PhotoIdField {
    Text(String),
    Number(i64),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub id: Option<PhotoIdField>,
    #[serde(default)]
    pub name: Option<String>,
}

impl DeleteRequest {
    /// The numeric id, or `None` when it is absent, blank or not a number.
    pub fn photo_id(&self) -> Option<i64> {
        match self.id.as_ref()? {
            PhotoIdField::Number(id) => Some(*id),
            PhotoIdField::Text(text) => text.trim().parse().ok(),
        }
    }

    pub fn has_id(&self) -> bool {
        match &self.id {
            Some(PhotoIdField::Text(text)) => !text.trim().is_empty(),
            Some(PhotoIdField::Number(_)) => true,
            None => false,
        }
    }

    pub fn has_name(&self) -> bool {
        self.name.as_deref().is_some_and(|name| !name.trim().is_empty())
    }
}
