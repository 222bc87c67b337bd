use anyhow::{Context, Result};
use clap::{crate_description, crate_version, value_parser, Arg, ArgAction, ArgMatches, Command};
use std::{path::PathBuf, time::Duration};

use crate::validators::*;
use raster_map_downloader::{BoundingBox, Config, LatLon, TileEncoding, UrlFormat, ZoomConvention};

const OUTPUT_FILE_ARG: &str = "output_file";
const FORCE_ARG: &str = "force";
const URL_MASK_ARG: &str = "url_mask";
const UPPER_LEFT_ARG: &str = "upper_left";
const BOTTOM_RIGHT_ARG: &str = "bottom_right";
const MIN_ZOOM_ARG: &str = "min_zoom";
const MAX_ZOOM_ARG: &str = "max_zoom";
const MAX_RPS_ARG: &str = "max_requests_per_second";
const TIMEOUT_ARG: &str = "timeout";
const MAX_RETRY_COUNT_ARG: &str = "max_retry_count";
const RETRY_DELAY_ARG: &str = "retry_delay";
const CHUNK_SIZE_ARG: &str = "chunk_size";
const KEEP_FORMAT_ARG: &str = "keep_format";
const JPEG_QUALITY_ARG: &str = "jpeg_quality";
const INVERT_ZOOM_ARG: &str = "invert_zoom";
const NO_PROGRESS_ARG: &str = "no_progress";
const DRY_RUN_ARG: &str = "dry_run";
const VERBOSE_ARG: &str = "verbose";

#[derive(Debug)]
pub struct Args {
    pub output_file: PathBuf,
    pub force: bool,
    pub url_mask: String,
    pub upper_left: LatLon,
    pub bottom_right: LatLon,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub max_requests_per_second: u32,
    pub timeout: Duration,
    pub max_retry_count: u32,
    pub retry_delay: Duration,
    pub chunk_size: usize,
    pub keep_format: bool,
    pub jpeg_quality: u8,
    pub invert_zoom: bool,
    pub show_progress: bool,
    pub dry_run: bool,
    pub verbosity: u8,
}

impl std::convert::TryFrom<Args> for Config {
    type Error = anyhow::Error;

    fn try_from(args: Args) -> Result<Self> {
        let url = UrlFormat::parse(args.url_mask).context("invalid --url-mask")?;
        let bounding_box = BoundingBox::new(args.upper_left, args.bottom_right)
            .context("enter the coordinates of the upper-left and bottom-right corners correctly")?;

        let mut config = Config::new(args.output_file, url, bounding_box);
        config.overwrite = args.force;
        config.min_zoom = args.min_zoom;
        config.max_zoom = args.max_zoom;
        config.max_requests_per_second = args.max_requests_per_second;
        config.timeout = args.timeout;
        config.max_retry_count = args.max_retry_count;
        config.retry_delay = args.retry_delay;
        config.chunk_size = args.chunk_size;
        config.show_progress = args.show_progress;
        config.encoding = if args.keep_format {
            TileEncoding::Original
        } else {
            TileEncoding::Jpeg {
                quality: args.jpeg_quality,
            }
        };
        config.zoom_convention = if args.invert_zoom {
            ZoomConvention::Inverted
        } else {
            ZoomConvention::Source
        };

        Ok(config)
    }
}

impl Args {
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    #[cfg(test)]
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        command()
            .try_get_matches_from(args)
            .map(|matches| Self::from_matches(&matches))
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            output_file: value(matches, OUTPUT_FILE_ARG),
            force: matches.get_flag(FORCE_ARG),
            url_mask: value(matches, URL_MASK_ARG),
            upper_left: corner(matches, UPPER_LEFT_ARG),
            bottom_right: corner(matches, BOTTOM_RIGHT_ARG),
            min_zoom: value(matches, MIN_ZOOM_ARG),
            max_zoom: value(matches, MAX_ZOOM_ARG),
            max_requests_per_second: value(matches, MAX_RPS_ARG),
            timeout: Duration::from_secs(value(matches, TIMEOUT_ARG)),
            max_retry_count: value(matches, MAX_RETRY_COUNT_ARG),
            retry_delay: Duration::from_secs(value(matches, RETRY_DELAY_ARG)),
            chunk_size: value(matches, CHUNK_SIZE_ARG),
            keep_format: matches.get_flag(KEEP_FORMAT_ARG),
            jpeg_quality: value(matches, JPEG_QUALITY_ARG),
            invert_zoom: matches.get_flag(INVERT_ZOOM_ARG),
            show_progress: !matches.get_flag(NO_PROGRESS_ARG),
            dry_run: matches.get_flag(DRY_RUN_ARG),
            verbosity: matches.get_count(VERBOSE_ARG),
        }
    }
}

// clap guarantees a value for required arguments and arguments with a default
fn value<T: Clone + Send + Sync + 'static>(matches: &ArgMatches, id: &str) -> T {
    matches
        .get_one::<T>(id)
        .cloned()
        .unwrap_or_else(|| panic!("argument {} has no value", id))
}

fn corner(matches: &ArgMatches, id: &str) -> LatLon {
    let coords: Vec<f64> = matches
        .get_many::<f64>(id)
        .map(|values| values.copied().collect())
        .unwrap_or_default();

    match coords.as_slice() {
        [lat, lon] => LatLon::new(*lat, *lon),
        _ => panic!("argument {} needs exactly two values", id),
    }
}

fn command() -> Command {
    Command::new("download-raster-map")
        .version(crate_version!())
        .about(crate_description!())
        .arg(
            Arg::new(OUTPUT_FILE_ARG)
                .help("The .sqlitedb file to write the tiles to")
                .value_name("OUTPUT_FILE")
                .value_parser(value_parser!(PathBuf))
                .required(true),
        )
        .arg(
            Arg::new(FORCE_ARG)
                .help("Override the output file if it exists")
                .action(ArgAction::SetTrue)
                .short('f')
                .long("force"),
        )
        .arg(
            Arg::new(URL_MASK_ARG)
                .help("The URL with format specifiers `{x}`, `{y}`, `{z}` to fetch the tiles from, e.g. https://tile.openstreetmap.org/{z}/{x}/{y}.png")
                .value_name("URL_MASK")
                .required(true)
                .short('u')
                .long("url-mask"),
        )
        .arg(
            Arg::new(UPPER_LEFT_ARG)
                .help("Latitude (-90° to 90°) and longitude of the upper-left corner (in degrees)")
                .value_names(["LAT", "LON"])
                .num_args(2)
                .value_parser(is_geo_coord)
                .allow_negative_numbers(true)
                .required(true)
                .short('l')
                .long("upper-left"),
        )
        .arg(
            Arg::new(BOTTOM_RIGHT_ARG)
                .help("Latitude (-90° to 90°) and longitude of the bottom-right corner (in degrees)")
                .value_names(["LAT", "LON"])
                .num_args(2)
                .value_parser(is_geo_coord)
                .allow_negative_numbers(true)
                .required(true)
                .short('r')
                .long("bottom-right"),
        )
        .arg(
            Arg::new(MIN_ZOOM_ARG)
                .help("The minimum zoom level to fetch")
                .value_parser(is_numeric_min(0u8))
                .default_value("0")
                .long("min-zoom"),
        )
        .arg(
            Arg::new(MAX_ZOOM_ARG)
                .help("The maximum zoom level to fetch")
                .value_parser(is_numeric_min(0u8))
                .default_value("18")
                .long("max-zoom"),
        )
        .arg(
            Arg::new(MAX_RPS_ARG)
                .help("Maximum number of requests in flight at once. Pass 0 for no limit besides the chunk size.")
                .value_parser(is_numeric_min(0u32))
                .default_value("0")
                .long("max-rps")
                .visible_alias("max-requests-per-second"),
        )
        .arg(
            Arg::new(TIMEOUT_ARG)
                .help("The timeout (in seconds) for fetching a single tile. Pass 0 for no timeout.")
                .value_parser(is_numeric_min(0u64))
                .default_value("300")
                .short('t')
                .long("timeout"),
        )
        .arg(
            Arg::new(MAX_RETRY_COUNT_ARG)
                .help("The amount of times to retry a failed HTTP request before giving up")
                .value_parser(is_numeric_min(0u32))
                .default_value("10")
                .long("max-retry-count"),
        )
        .arg(
            Arg::new(RETRY_DELAY_ARG)
                .help("Seconds to wait before retrying a failed HTTP request")
                .value_parser(is_numeric_min(0u64))
                .default_value("0")
                .long("retry-delay"),
        )
        .arg(
            Arg::new(CHUNK_SIZE_ARG)
                .help("The amount of tiles fetched in parallel and held in memory before they are saved to the output file")
                .value_parser(is_numeric_min(1usize))
                .default_value("2048")
                .short('c')
                .long("chunk-size"),
        )
        .arg(
            Arg::new(KEEP_FORMAT_ARG)
                .help("Store tiles as served instead of re-encoding them as JPEG")
                .action(ArgAction::SetTrue)
                .long("keep-format"),
        )
        .arg(
            Arg::new(JPEG_QUALITY_ARG)
                .help("JPEG quality of re-encoded tiles")
                .value_parser(is_jpeg_quality)
                .default_value("100")
                .long("jpeg-quality"),
        )
        .arg(
            Arg::new(INVERT_ZOOM_ARG)
                .help("Store zoom levels as 17 - zoom, as expected by OsmAnd")
                .action(ArgAction::SetTrue)
                .long("invert-zoom"),
        )
        .arg(
            Arg::new(NO_PROGRESS_ARG)
                .help("Don't draw a progress bar")
                .action(ArgAction::SetTrue)
                .long("no-progress"),
        )
        .arg(
            Arg::new(DRY_RUN_ARG)
                .help("Don't actually fetch anything, just determine how many tiles would be fetched.")
                .action(ArgAction::SetTrue)
                .long("dry-run"),
        )
        .arg(
            Arg::new(VERBOSE_ARG)
                .help("Log more details, repeat for even more")
                .action(ArgAction::Count)
                .short('v')
                .long("verbose"),
        )
}
