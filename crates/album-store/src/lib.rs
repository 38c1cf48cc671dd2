//! Album persistence layer.
//!
//! Album rows live in a single SQLite table accessed through sqlx. The image
//! bytes themselves never touch the database: they are written through a
//! [`storage::BlobStore`] and only the resulting reference (URL or path) is
//! recorded next to the artist/title/year metadata.

pub mod storage;

use std::{str::FromStr, time::Duration};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Row, SqlitePool,
};
use tracing::info;

/// Default SQLite busy timeout in milliseconds when the DB is under load.
const SQLITE_BUSY_TIMEOUT_MS: u64 = 5_000;

const MAX_POOL_CONNECTIONS: u32 = 8;

/// Columns the `albums` table must carry for each metadata layout.
const SERIALIZED_COLUMNS: &[&str] = &["id", "image_url", "metadata"];
const DISCRETE_COLUMNS: &[&str] = &["id", "image_url", "artist", "title", "year"];

/// Free-form descriptive fields attached to an uploaded image.
///
/// No validation is applied; empty strings are valid values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumMetadata {
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: String,
}

/// How [`AlbumMetadata`] is laid out in the `albums` table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MetadataLayout {
    /// One `metadata` column holding the JSON encoded record.
    #[default]
    Serialized,
    /// Separate `artist`, `title` and `year` columns.
    Discrete,
}

impl MetadataLayout {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataLayout::Serialized => "json",
            MetadataLayout::Discrete => "columns",
        }
    }

    fn create_table_sql(&self) -> &'static str {
        match self {
            MetadataLayout::Serialized => {
                r#"
                CREATE TABLE IF NOT EXISTS albums (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    image_url TEXT NOT NULL,
                    metadata TEXT NOT NULL
                )
                "#
            }
            MetadataLayout::Discrete => {
                r#"
                CREATE TABLE IF NOT EXISTS albums (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    image_url TEXT NOT NULL,
                    artist TEXT NOT NULL DEFAULT '',
                    title TEXT NOT NULL DEFAULT '',
                    year TEXT NOT NULL DEFAULT ''
                )
                "#
            }
        }
    }

    fn required_columns(&self) -> &'static [&'static str] {
        match self {
            MetadataLayout::Serialized => SERIALIZED_COLUMNS,
            MetadataLayout::Discrete => DISCRETE_COLUMNS,
        }
    }
}

impl FromStr for MetadataLayout {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "serialized" => Ok(MetadataLayout::Serialized),
            "columns" | "discrete" => Ok(MetadataLayout::Discrete),
            other => Err(anyhow!("unknown metadata layout: {}", other)),
        }
    }
}

/// Input payload for album creation.
#[derive(Debug, Clone, Copy)]
pub struct NewAlbum<'a> {
    pub image_url: &'a str,
    pub metadata: &'a AlbumMetadata,
}

/// Metadata exactly as it came out of the table.
///
/// The serialized layout is handed back undecoded so callers decide how a
/// corrupt payload is reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredMetadata {
    Discrete(AlbumMetadata),
    Serialized(String),
}

impl StoredMetadata {
    pub fn decode(self) -> Result<AlbumMetadata, serde_json::Error> {
        match self {
            StoredMetadata::Discrete(metadata) => Ok(metadata),
            StoredMetadata::Serialized(raw) => serde_json::from_str(&raw),
        }
    }
}

/// Persisted album row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAlbum {
    pub id: i64,
    pub image_url: String,
    pub metadata: StoredMetadata,
}

/// Narrow contract the album service needs from the relational store.
#[async_trait]
pub trait AlbumRepository: Send + Sync + 'static {
    /// Inserts a new row and returns the database-assigned identifier.
    async fn create(&self, album: NewAlbum<'_>) -> Result<i64>;

    /// Single-row lookup by primary key. `Ok(None)` when no row matches.
    async fn get_by_id(&self, id: i64) -> Result<Option<StoredAlbum>>;
}

/// Primary entry point to the persistence layer.
#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
    layout: MetadataLayout,
}

impl Database {
    /// Opens (or creates) the SQLite database at `database_url`
    /// (e.g. `sqlite:///var/lib/albums/albums.db`) and provisions the
    /// `albums` table for the requested layout if it does not exist yet.
    pub async fn connect(database_url: &str, layout: MetadataLayout) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid database url '{database_url}'"))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_millis(SQLITE_BUSY_TIMEOUT_MS));

        // Each connection to an in-memory database sees its own private copy.
        let pool_options = if is_in_memory(database_url) {
            SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(MAX_POOL_CONNECTIONS)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .context("failed to connect to database")?;

        let db = Self { pool, layout };
        db.ensure_schema().await?;
        info!(layout = layout.as_str(), "album table ready");
        Ok(db)
    }

    /// Exposes the underlying pool for ad-hoc queries (reporting, tests).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn layout(&self) -> MetadataLayout {
        self.layout
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(self.layout.create_table_sql())
            .execute(&self.pool)
            .await
            .context("failed to create albums table")?;

        let columns: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info('albums')")
                .fetch_all(&self.pool)
                .await
                .context("failed to inspect albums table")?;

        let missing: Vec<&str> = self
            .layout
            .required_columns()
            .iter()
            .copied()
            .filter(|required| !columns.iter().any(|column| column == required))
            .collect();

        if !missing.is_empty() {
            return Err(anyhow!(
                "albums table does not match the '{}' metadata layout (missing columns: {})",
                self.layout.as_str(),
                missing.join(", ")
            ));
        }
        Ok(())
    }

    /// Inserts an album row and returns its identifier.
    pub async fn insert_album(&self, album: NewAlbum<'_>) -> Result<i64> {
        let result = match self.layout {
            MetadataLayout::Serialized => {
                let encoded = serde_json::to_string(album.metadata)
                    .context("failed to encode album metadata")?;
                sqlx::query("INSERT INTO albums (image_url, metadata) VALUES (?, ?)")
                    .bind(album.image_url)
                    .bind(encoded)
                    .execute(&self.pool)
                    .await?
            }
            MetadataLayout::Discrete => {
                sqlx::query(
                    r#"
                    INSERT INTO albums (image_url, artist, title, year)
                    VALUES (?, ?, ?, ?)
                    "#,
                )
                .bind(album.image_url)
                .bind(&album.metadata.artist)
                .bind(&album.metadata.title)
                .bind(&album.metadata.year)
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.last_insert_rowid())
    }

    /// Retrieves an album by its identifier.
    pub async fn fetch_album(&self, id: i64) -> Result<Option<StoredAlbum>> {
        let row = sqlx::query("SELECT * FROM albums WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| map_album(row, self.layout)).transpose()
    }

    pub async fn count_albums(&self) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM albums")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl AlbumRepository for Database {
    async fn create(&self, album: NewAlbum<'_>) -> Result<i64> {
        self.insert_album(album).await
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<StoredAlbum>> {
        self.fetch_album(id).await
    }
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

fn map_album(row: SqliteRow, layout: MetadataLayout) -> Result<StoredAlbum> {
    let metadata = match layout {
        MetadataLayout::Serialized => StoredMetadata::Serialized(row.try_get("metadata")?),
        MetadataLayout::Discrete => StoredMetadata::Discrete(AlbumMetadata {
            artist: row.try_get("artist")?,
            title: row.try_get("title")?,
            year: row.try_get("year")?,
        }),
    };

    Ok(StoredAlbum {
        id: row.try_get("id")?,
        image_url: row.try_get("image_url")?,
        metadata,
    })
}
