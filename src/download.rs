use anyhow::{Context, Result};
use futures::prelude::*;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info};
use std::{
    fmt, fs,
    path::Path,
    pin::pin,
    time::{Duration, Instant},
};

use crate::bounding_box::TileRange;
use crate::config::Config;
use crate::error::Error;
use crate::fetch::{FetchOutcome, FetchPool, ReqwestClient, TileClient};
use crate::store::{TileStore, WritePolicy, ZoomConvention};
use crate::tile::Tile;

/// Rough size of a raster tile, used for the planning estimate.
const BYTES_PER_TILE: f64 = 10_000_f64;

/// Variant written for every downloaded tile.
const DEFAULT_VARIANT: u32 = 0;

/// What a download is going to fetch, computed before any request is sent.
#[derive(Clone, Debug, PartialEq)]
pub struct Plan {
    pub ranges: Vec<TileRange>,
    pub max_requests_per_second: u32,
}

impl Plan {
    pub fn new(cfg: &Config) -> Result<Self, Error> {
        cfg.validate()?;

        Ok(Self {
            ranges: cfg.tile_ranges(),
            max_requests_per_second: cfg.max_requests_per_second,
        })
    }

    pub fn total_tiles(&self) -> u64 {
        self.ranges.iter().map(TileRange::count).sum()
    }

    /// Lower bound on the download time of `tiles` under the configured rate limit.
    pub fn min_duration(&self, tiles: u64) -> Option<Duration> {
        match self.max_requests_per_second {
            0 => None,
            rps => Some(Duration::from_secs_f64(tiles as f64 / f64::from(rps))),
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tiles to download:")?;
        for range in &self.ranges {
            write!(f, "    Zoom {}: {} tiles", range.zoom, range.count())?;
            if let Some(duration) = self.min_duration(range.count()) {
                write!(f, " ({})", format_duration(duration))?;
            }
            writeln!(f)?;
        }

        let total = self.total_tiles();
        write!(
            f,
            "Total tiles count: {} (approx {}, assuming 10 kB per tile)",
            total,
            pretty_bytes::converter::convert(total as f64 * BYTES_PER_TILE)
        )?;
        if let Some(duration) = self.min_duration(total) {
            write!(
                f,
                "\nMinimal time to download tiles: {} (max RPS is {})",
                format_duration(duration),
                self.max_requests_per_second
            )?;
        }

        Ok(())
    }
}

/// Counters of a finished download.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Summary {
    /// Coordinates that reached a terminal outcome.
    pub attempted: u64,
    /// Tiles written to the store.
    pub stored: u64,
    /// Coordinates the server has no tile for.
    pub absent: u64,
    pub elapsed: Duration,
}

impl Summary {
    pub fn requests_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0_f64 {
            self.attempted as f64 / secs
        } else {
            0_f64
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tiles downloaded in {} ({} stored, {} absent). Average RPS: {:.2}",
            self.attempted,
            format_duration(self.elapsed),
            self.stored,
            self.absent,
            self.requests_per_second()
        )
    }
}

/// Downloads the tiles specified in `cfg` into a new `.sqlitedb` store.
///
/// Tiles are committed once per zoom level. If a tile cannot be fetched
/// within `max_retry_count` retries the download is aborted; zoom levels
/// committed up to that point stay in the store.
///
/// # Example
/// ```rust,no_run
/// use raster_map_downloader::{download, BoundingBox, Config, LatLon, UrlFormat};
///
/// # #[tokio::main]
/// # async fn main() {
/// let mut config = Config::new(
///     "aachen.sqlitedb",
///     UrlFormat::parse("https://tile.openstreetmap.org/{z}/{x}/{y}.png").unwrap(),
///     BoundingBox::new(LatLon::new(50.811, 6.031), LatLon::new(50.7492, 6.1649)).unwrap(),
/// );
/// config.max_zoom = 12;
/// config.max_requests_per_second = 10;
///
/// download(config).await.expect("failed downloading tiles");
/// # }
/// ```
pub async fn download(cfg: Config) -> Result<Summary> {
    let client = ReqwestClient::new()?;
    download_with(cfg, client).await
}

/// Like [`download`], fetching through the given client.
pub async fn download_with<C: TileClient>(cfg: Config, client: C) -> Result<Summary> {
    debug!("validating {:?}", cfg);
    let plan = Plan::new(&cfg)?;
    prepare_output(&cfg.output_file, cfg.overwrite)?;

    println!("{}", plan);

    let mut store = TileStore::create(&cfg.output_file)
        .with_context(|| format!("failed creating {}", cfg.output_file.display()))?;
    let pool = FetchPool::new(client, cfg.url.clone(), cfg.fetch_options())?;

    let started = Instant::now();
    let mut summary = Summary::default();

    for range in &plan.ranges {
        debug!("downloading zoom {}: {:?}", range.zoom, range);
        download_zoom(&pool, &mut store, range, &cfg, &mut summary).await?;

        store
            .commit()
            .with_context(|| format!("failed committing zoom level {}", range.zoom))?;
        info!("committed zoom level {}", range.zoom);
    }

    // zoom levels where every tile was absent don't count
    let bounds = match store.stored_zoom_range()? {
        Some(bounds) => bounds,
        None => cfg.zoom_convention.stored_bounds(cfg.min_zoom, cfg.max_zoom),
    };
    store.set_zoom_bounds(bounds)?;
    store
        .close()
        .with_context(|| format!("failed closing {}", cfg.output_file.display()))?;

    summary.elapsed = started.elapsed();
    println!("{}", summary);

    Ok(summary)
}

/// Removes an existing output file if overwriting was requested.
fn prepare_output(path: &Path, overwrite: bool) -> Result<(), Error> {
    if !path.exists() {
        return Ok(());
    }
    if !overwrite {
        return Err(Error::OutputAlreadyExists(path.to_path_buf()));
    }

    debug!("removing existing output file {}", path.display());
    fs::remove_file(path)?;
    Ok(())
}

async fn download_zoom<C: TileClient>(
    pool: &FetchPool<C>,
    store: &mut TileStore,
    range: &TileRange,
    cfg: &Config,
    summary: &mut Summary,
) -> Result<()> {
    let pb = progress_bar(cfg.show_progress, range.count(), range.zoom)?;

    let mut chunks = pin!(pool.fetch(range.tiles()));
    let mut chunk_index = 0;

    while let Some(outcomes) = chunks.next().await {
        let offset = chunk_index * pool.chunk_size() as u64;

        for (position, outcome) in outcomes.into_iter().enumerate() {
            let index = offset + position as u64;
            let tile = range
                .tile_at(index)
                .with_context(|| format!("outcome {} is outside of {:?}", index, range))?;

            match outcome {
                FetchOutcome::Success(image) => {
                    store
                        .put_tile(
                            tile.x,
                            tile.y,
                            stored_zoom(cfg.zoom_convention, &tile),
                            DEFAULT_VARIANT,
                            &image,
                            WritePolicy::Overwrite,
                        )
                        .with_context(|| format!("failed storing tile {}", tile))?;
                    summary.stored += 1;
                }
                FetchOutcome::Absent => summary.absent += 1,
                FetchOutcome::Failed(e) => {
                    pb.abandon();
                    return Err(e).with_context(|| format!("failed fetching tile {}", tile));
                }
            }

            summary.attempted += 1;
            pb.inc(1);
        }

        chunk_index += 1;
    }

    pb.finish();
    Ok(())
}

fn stored_zoom(convention: ZoomConvention, tile: &Tile) -> u32 {
    convention.stored_zoom(tile.z)
}

fn progress_bar(visible: bool, len: u64, zoom: u8) -> Result<ProgressBar> {
    if !visible {
        return Ok(ProgressBar::hidden());
    }

    let pb = ProgressBar::with_draw_target(Some(len), ProgressDrawTarget::stdout());
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:60.cyan/blue} {pos:>7}/{len:7} ETA: {eta} {msg}")
            .context("invalid progress bar template")?
            .progress_chars("##-"),
    );
    pb.set_message(format!("zoom {}", zoom));

    Ok(pb)
}

/// Formats a duration as `HH:MM:SS`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, secs % 3600 / 60, secs % 60)
}
