//! `.sqlitedb` tile store.
//!
//! The store holds two tables:
//! - `tiles (x, y, z, s, image)` keyed by `(x, y, z, s)`, where `s` is the
//!   style/scale variant and is always `0` for downloaded tiles;
//! - `info (maxzoom, minzoom)` with exactly one row.
//!
//! Writes are grouped into an implicit transaction that stays open until
//! [`TileStore::commit`] is called, so the caller decides the flush points.

use log::debug;
use rusqlite::{params, Connection, OpenFlags};
use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;

use crate::error::{Error, Result};

/// Highest zoom level that can be stored with [`ZoomConvention::Inverted`].
pub const MAX_INVERTED_ZOOM: u8 = 17;

const SCHEMA: &str = "CREATE TABLE tiles (x INT, y INT, z INT, s INT, image BLOB, PRIMARY KEY (x, y, z, s));
    CREATE TABLE info (maxzoom INT, minzoom INT);";

/// How the source zoom of a tile maps onto the stored `z` column.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ZoomConvention {
    /// `z` is the zoom level the tile was fetched at.
    #[default]
    Source,
    /// `z = 17 - zoom`, as read by OsmAnd-style `.sqlitedb` viewers.
    Inverted,
}

impl ZoomConvention {
    pub fn stored_zoom(self, zoom: u8) -> u32 {
        match self {
            ZoomConvention::Source => u32::from(zoom),
            ZoomConvention::Inverted => u32::from(MAX_INVERTED_ZOOM.saturating_sub(zoom)),
        }
    }

    /// Stored zoom bounds for the source range `min_zoom..=max_zoom`.
    pub fn stored_bounds(self, min_zoom: u8, max_zoom: u8) -> ZoomBounds {
        let (a, b) = (self.stored_zoom(min_zoom), self.stored_zoom(max_zoom));
        ZoomBounds {
            min_zoom: a.min(b),
            max_zoom: a.max(b),
        }
    }
}

/// What happens when a tile with the same key is already stored.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WritePolicy {
    Overwrite,
    InsertIfAbsent,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ZoomBounds {
    pub min_zoom: u32,
    pub max_zoom: u32,
}

/// A row of the `tiles` table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoredTile {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub image: Vec<u8>,
}

pub struct TileStore {
    conn: Connection,
}

impl TileStore {
    /// Creates a new, empty store at `path`.
    ///
    /// Fails with [`Error::OutputAlreadyExists`] if anything exists at `path`;
    /// removing a previous store is up to the caller.
    pub fn create(path: &Path) -> Result<Self> {
        if path.exists() {
            return Err(Error::OutputAlreadyExists(path.to_path_buf()));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;

        if let Err(e) = conn.execute_batch(SCHEMA) {
            drop(conn);
            let _ = fs::remove_file(path);
            return Err(e.into());
        }

        debug!("created tile store {}", path.display());
        Ok(Self { conn })
    }

    /// Opens an existing store.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_WRITE)?;
        Ok(Self { conn })
    }

    fn begin(&self) -> Result<()> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    pub fn put_tile(
        &mut self,
        x: u32,
        y: u32,
        z: u32,
        variant: u32,
        image: &[u8],
        policy: WritePolicy,
    ) -> Result<()> {
        self.begin()?;

        let sql = match policy {
            WritePolicy::Overwrite => {
                "INSERT OR REPLACE INTO tiles (x, y, z, s, image) VALUES (?1, ?2, ?3, ?4, ?5)"
            }
            WritePolicy::InsertIfAbsent => {
                "INSERT OR IGNORE INTO tiles (x, y, z, s, image) VALUES (?1, ?2, ?3, ?4, ?5)"
            }
        };
        self.conn
            .prepare_cached(sql)?
            .execute(params![x, y, z, variant, image])?;

        Ok(())
    }

    /// Tiles at stored zoom `z` whose indices fall into both ranges, ordered by `x`, `y`.
    pub fn query_tiles(
        &self,
        z: u32,
        x_range: RangeInclusive<u32>,
        y_range: RangeInclusive<u32>,
    ) -> Result<Vec<StoredTile>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT x, y, z, image FROM tiles
             WHERE z = ?1 AND ?2 <= x AND x <= ?3 AND ?4 <= y AND y <= ?5
             ORDER BY x, y",
        )?;

        let rows = stmt.query_map(
            params![
                z,
                x_range.start(),
                x_range.end(),
                y_range.start(),
                y_range.end()
            ],
            |row| {
                Ok(StoredTile {
                    x: row.get(0)?,
                    y: row.get(1)?,
                    z: row.get(2)?,
                    image: row.get(3)?,
                })
            },
        )?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn tile_count(&self) -> Result<u64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM tiles", [], |row| row.get(0))?)
    }

    /// `MIN(z)`/`MAX(z)` over the stored tiles, `None` for an empty store.
    pub fn stored_zoom_range(&self) -> Result<Option<ZoomBounds>> {
        let (min, max): (Option<u32>, Option<u32>) =
            self.conn
                .query_row("SELECT MIN(z), MAX(z) FROM tiles", [], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?;

        Ok(min.zip(max).map(|(min_zoom, max_zoom)| ZoomBounds { min_zoom, max_zoom }))
    }

    /// Replaces the single `info` row.
    pub fn set_zoom_bounds(&mut self, bounds: ZoomBounds) -> Result<()> {
        self.begin()?;
        self.conn.execute("DELETE FROM info", [])?;
        self.conn.execute(
            "INSERT INTO info (maxzoom, minzoom) VALUES (?1, ?2)",
            params![bounds.max_zoom, bounds.min_zoom],
        )?;
        Ok(())
    }

    pub fn zoom_bounds(&self) -> Result<Option<ZoomBounds>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT minzoom, maxzoom FROM info LIMIT 1")?;
        let mut rows = stmt.query([])?;

        let bounds = match rows.next()? {
            Some(row) => Some(ZoomBounds {
                min_zoom: row.get(0)?,
                max_zoom: row.get(1)?,
            }),
            None => None,
        };
        Ok(bounds)
    }

    /// Makes every write since the last commit durable.
    pub fn commit(&mut self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    /// Commits pending writes and closes the database.
    pub fn close(mut self) -> Result<()> {
        self.commit()?;
        self.conn.close().map_err(|(_, e)| Error::Store(e))
    }
}
