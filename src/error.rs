use std::path::PathBuf;

use thiserror::Error;

use crate::bounding_box::LatLon;

/// Errors raised while planning, fetching or persisting tiles.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid bounding box {upper_left} - {bottom_right}: {reason}")]
    InvalidBoundingBox {
        upper_left: LatLon,
        bottom_right: LatLon,
        reason: &'static str,
    },

    #[error("invalid zoom range {min}..={max}: {reason}")]
    InvalidZoomRange { min: u8, max: u8, reason: &'static str },

    #[error("chunk size must be at least 1")]
    InvalidChunkSize,

    #[error("invalid URL template '{template}': {reason}")]
    InvalidUrlTemplate { template: String, reason: String },

    #[error("output file {} already exists, pass -f to overwrite it", .0.display())]
    OutputAlreadyExists(PathBuf),

    #[error("too many retries for {url} ({attempts} attempts, last failure: {reason})")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("tile at {url} is not a decodable image")]
    InvalidImage {
        url: String,
        #[source]
        source: image::ImageError,
    },

    #[error("tile store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed creating HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
