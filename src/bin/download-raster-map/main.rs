mod args;
mod validators;

use anyhow::Result;
use args::Args;
use log::LevelFilter;
use raster_map_downloader::{download, Config, Plan};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(args.verbosity);

    let dry_run = args.dry_run;
    let config = Config::try_from(args)?;

    if dry_run {
        let plan = Plan::new(&config)?;
        println!("{}", plan);

        Ok(())
    } else {
        download(config).await.map(|_| ())
    }
}

fn init_logger(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}
