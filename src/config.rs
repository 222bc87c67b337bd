use std::{path::PathBuf, time::Duration};

use crate::bounding_box::{BoundingBox, TileRange};
use crate::encoding::TileEncoding;
use crate::error::{Error, Result};
use crate::store::{ZoomConvention, MAX_INVERTED_ZOOM};
use crate::url::UrlFormat;

/// Deepest zoom level the tile math supports without overflowing `u32` indices.
pub const MAX_ZOOM: u8 = 31;

/// Tile download configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// The `.sqlitedb` file to create.
    pub output_file: PathBuf,

    /// Whether to replace `output_file` if it already exists.
    pub overwrite: bool,

    /// The URL to download individual tiles from including the replacement
    /// specifiers `{x}`, `{y}` and `{z}`.
    pub url: UrlFormat,

    pub bounding_box: BoundingBox,

    /// The minimum zoom level to download.
    pub min_zoom: u8,

    /// The maximum zoom level to download.
    pub max_zoom: u8,

    /// Cap on simultaneously outstanding requests. `0` means only
    /// `chunk_size` limits concurrency.
    pub max_requests_per_second: u32,

    /// Timeout for fetching a single tile.
    ///
    /// Pass the zero duration to disable the timeout.
    pub timeout: Duration,

    /// How many additional attempts a failed request gets.
    pub max_retry_count: u32,

    /// Pause between two attempts of the same tile.
    pub retry_delay: Duration,

    /// Number of tiles requested concurrently and held in memory before
    /// they are written to the store.
    pub chunk_size: usize,

    pub encoding: TileEncoding,

    pub zoom_convention: ZoomConvention,

    /// Draw a progress bar on stdout while downloading.
    pub show_progress: bool,
}

impl Config {
    /// A configuration with the command line defaults.
    pub fn new(output_file: impl Into<PathBuf>, url: UrlFormat, bounding_box: BoundingBox) -> Self {
        Self {
            output_file: output_file.into(),
            overwrite: false,
            url,
            bounding_box,
            min_zoom: 0,
            max_zoom: 18,
            max_requests_per_second: 0,
            timeout: Duration::from_secs(300),
            max_retry_count: 10,
            retry_delay: Duration::ZERO,
            chunk_size: 2048,
            encoding: TileEncoding::default(),
            zoom_convention: ZoomConvention::default(),
            show_progress: true,
        }
    }

    /// Checks everything that can be rejected before touching the network.
    pub fn validate(&self) -> Result<()> {
        let zoom_error = |reason| Error::InvalidZoomRange {
            min: self.min_zoom,
            max: self.max_zoom,
            reason,
        };

        if self.min_zoom > self.max_zoom {
            return Err(zoom_error("minimum zoom is larger than maximum zoom"));
        }
        if self.max_zoom > MAX_ZOOM {
            return Err(zoom_error("maximum zoom is too deep"));
        }
        if self.zoom_convention == ZoomConvention::Inverted && self.max_zoom > MAX_INVERTED_ZOOM {
            return Err(zoom_error("inverted zoom levels only go up to 17"));
        }
        if self.chunk_size == 0 {
            return Err(Error::InvalidChunkSize);
        }

        Ok(())
    }

    /// The tile range of every zoom level to download, lowest zoom first.
    pub fn tile_ranges(&self) -> Vec<TileRange> {
        self.bounding_box.tile_ranges(self.min_zoom, self.max_zoom)
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            chunk_size: self.chunk_size,
            max_retry_count: self.max_retry_count,
            max_concurrent_requests: self.max_requests_per_second as usize,
            timeout: self.timeout,
            retry_delay: self.retry_delay,
            encoding: self.encoding,
        }
    }
}

/// Settings of the fetch pool.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FetchOptions {
    pub chunk_size: usize,
    pub max_retry_count: u32,
    /// `0` for no limit beyond `chunk_size`.
    pub max_concurrent_requests: usize,
    /// `Duration::ZERO` for no timeout.
    pub timeout: Duration,
    pub retry_delay: Duration,
    pub encoding: TileEncoding,
}
