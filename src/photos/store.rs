use super::{DATE_FORMAT, NewPhoto, Photo, TIME_FORMAT};
use crate::database::{Database, StoreError};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use rusqlite::{OptionalExtension, Row, params};
use std::path::PathBuf;

/// The relational index of photos. Every mutation is a single statement.
#[async_trait]
pub trait PhotoStore: Send + Sync {
    /// Index key of the user with this username.
    async fn owner_key(&self, username: &str) -> Result<Option<i64>, StoreError>;

    async fn insert_photo(&self, photo: NewPhoto) -> Result<i64, StoreError>;

    /// Deletes the photo only if `id` belongs to `owner`, returning the removed row.
    async fn take_photo(&self, id: i64, owner: i64) -> Result<Option<Photo>, StoreError>;

    /// Photos newest first; all owners when `owner` is `None`.
    async fn list_photos(&self, owner: Option<i64>) -> Result<Vec<Photo>, StoreError>;
}

const PHOTO_COLUMNS: &str = "id, user_id, date, time, path, name, ext";

/// Columns as stored; dates and times are parsed outside the connection lock.
type RawPhoto = (i64, i64, String, String, String, String, String);

fn raw_photo(row: &Row<'_>) -> rusqlite::Result<RawPhoto> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn into_photo((id, user_id, date, time, path, name, ext): RawPhoto) -> Result<Photo, StoreError> {
    let date = NaiveDate::parse_from_str(&date, DATE_FORMAT)
        .map_err(|e| StoreError::CorruptRow(format!("photo {} date '{}': {}", id, date, e)))?;
    let time = NaiveTime::parse_from_str(&time, TIME_FORMAT)
        .map_err(|e| StoreError::CorruptRow(format!("photo {} time '{}': {}", id, time, e)))?;

    Ok(Photo {
        id,
        user_id,
        date,
        time,
        path: PathBuf::from(path),
        name,
        ext,
    })
}

#[async_trait]
impl PhotoStore for Database {
    async fn owner_key(&self, username: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.get_user(username).await?.map(|user| user.id))
    }

    async fn insert_photo(&self, photo: NewPhoto) -> Result<i64, StoreError> {
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO photo (user_id, date, time, path, name, ext) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    photo.user_id,
                    photo.date.format(DATE_FORMAT).to_string(),
                    photo.time.format(TIME_FORMAT).to_string(),
                    photo.path.to_string_lossy(),
                    photo.name,
                    photo.ext,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn take_photo(&self, id: i64, owner: i64) -> Result<Option<Photo>, StoreError> {
        let raw = self
            .call(move |conn| {
                let sql = format!(
                    "DELETE FROM photo WHERE id = ?1 AND user_id = ?2 RETURNING {}",
                    PHOTO_COLUMNS
                );
                Ok(conn
                    .query_row(&sql, params![id, owner], raw_photo)
                    .optional()?)
            })
            .await?;

        raw.map(into_photo).transpose()
    }

    async fn list_photos(&self, owner: Option<i64>) -> Result<Vec<Photo>, StoreError> {
        let rows = self
            .call(move |conn| {
                let rows = match owner {
                    Some(owner) => {
                        let sql = format!(
                            "SELECT {} FROM photo WHERE user_id = ?1 ORDER BY date DESC, time DESC",
                            PHOTO_COLUMNS
                        );
                        let mut stmt = conn.prepare(&sql)?;
                        let rows = stmt
                            .query_map([owner], raw_photo)?
                            .collect::<Result<Vec<_>, _>>()?;
                        rows
                    }
                    None => {
                        let sql = format!(
                            "SELECT {} FROM photo ORDER BY date DESC, time DESC",
                            PHOTO_COLUMNS
                        );
                        let mut stmt = conn.prepare(&sql)?;
                        let rows = stmt
                            .query_map([], raw_photo)?
                            .collect::<Result<Vec<_>, _>>()?;
                        rows
                    }
                };
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(into_photo).collect()
    }
}
