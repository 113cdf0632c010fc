//! Catalog adapters: an in-memory map and the SQLite catalog file.

use crate::domain::asset::{Asset, AssetId};
use crate::domain::probe::ProbeReport;
use crate::error::StreamError;
use crate::ports::catalog::AssetCatalog;
use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

#[derive(Debug, Default, Clone)]
pub struct InMemoryCatalog {
    assets: Arc<RwLock<HashMap<AssetId, Asset>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, asset: Asset) {
        self.assets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(asset.id, asset);
    }

    /// Adds an asset described by a probe tool report.
    pub fn insert_probed(&self, id: AssetId, path: &Path, report: ProbeReport) -> Asset {
        let asset = report.into_asset(id, path);
        self.insert(asset.clone());
        asset
    }
}

#[async_trait]
impl AssetCatalog for InMemoryCatalog {
    async fn find(&self, id: AssetId) -> Result<Option<Asset>, StreamError> {
        Ok(self
            .assets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Asset>, StreamError> {
        let mut assets: Vec<_> = self
            .assets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        assets.sort_by_key(|a| a.id);
        Ok(assets)
    }
}

const SELECT_MOVIE: &str =
    "SELECT id, path, title, duration, codec_v, codec_a, width, height FROM movies";

/// Read-only access to the `movies` table written by the library scanner.
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StreamError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(catalog_error)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StreamError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&conn)
        })
        .await
        .map_err(|e| StreamError::Catalog(e.to_string()))?
        .map_err(catalog_error)
    }
}

fn catalog_error(e: rusqlite::Error) -> StreamError {
    StreamError::Catalog(e.to_string())
}

fn asset_from_row(row: &Row<'_>) -> rusqlite::Result<Asset> {
    let id: i64 = row.get(0)?;
    let path: String = row.get(1)?;
    Ok(Asset {
        id: id as AssetId,
        path: PathBuf::from(path),
        title: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        duration: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
        video_codec: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        audio_codec: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        width: row.get::<_, Option<i64>>(6)?.unwrap_or(0).max(0) as u32,
        height: row.get::<_, Option<i64>>(7)?.unwrap_or(0).max(0) as u32,
    })
}

#[async_trait]
impl AssetCatalog for SqliteCatalog {
    async fn find(&self, id: AssetId) -> Result<Option<Asset>, StreamError> {
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("{} WHERE id = ?1", SELECT_MOVIE),
                [id as i64],
                asset_from_row,
            )
            .optional()
        })
        .await
    }

    async fn list(&self) -> Result<Vec<Asset>, StreamError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{} ORDER BY id", SELECT_MOVIE))?;
            let rows = stmt.query_map([], asset_from_row)?;
            rows.collect()
        })
        .await
    }
}
