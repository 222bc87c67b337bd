//! Download raster map tiles from a tile server into a `.sqlitedb` tile store
//! for offline map viewers.
//!
//! **Use with caution.** Downloading tiles en-masse can hog down a tile
//! server easily. Respect the usage policy of the server you download from
//! and limit the request rate with `--max-rps`.
//!
//! # Usage
//!
//! The `download-raster-map` binary features a CLI you can access via
//! `-h` / `--help`. The crate is also available as a library.
//!
//! # CLI Example
//!
//! ```bash
//! download-raster-map aachen.sqlitedb \
//!   --url-mask "https://tile.openstreetmap.org/{z}/{x}/{y}.png" \
//!   --upper-left 50.811 6.031 \
//!   --bottom-right 50.7492 6.1649 \
//!   --min-zoom 8 \
//!   --max-zoom 14 \
//!   --max-rps 10
//! ```
//!
//! # Library Example
//! ```rust,no_run
//! use raster_map_downloader::{download, BoundingBox, Config, LatLon, UrlFormat};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut config = Config::new(
//!     "aachen.sqlitedb",
//!     UrlFormat::parse("https://tile.openstreetmap.org/{z}/{x}/{y}.png").unwrap(),
//!     BoundingBox::new(LatLon::new(50.811, 6.031), LatLon::new(50.7492, 6.1649)).unwrap(),
//! );
//! config.min_zoom = 8;
//! config.max_zoom = 14;
//! config.max_requests_per_second = 10;
//!
//! let summary = download(config).await.expect("failed downloading tiles");
//! println!("{} tiles stored", summary.stored);
//! # }
//! ```

mod bounding_box;
mod config;
mod download;
mod encoding;
mod error;
mod fetch;
mod store;
mod tile;
mod url;

pub use bounding_box::{BoundingBox, LatLon, TileRange};
pub use config::{Config, FetchOptions, MAX_ZOOM};
pub use download::{download, download_with, format_duration, Plan, Summary};
pub use encoding::TileEncoding;
pub use error::{Error, Result};
pub use fetch::{Attempt, FetchOutcome, FetchPool, ReqwestClient, TileClient};
pub use store::{
    StoredTile, TileStore, WritePolicy, ZoomBounds, ZoomConvention, MAX_INVERTED_ZOOM,
};
pub use tile::{lat_lon_to_tile, tile_to_lat_lon, Tile};
pub use url::UrlFormat;
