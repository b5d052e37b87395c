use anyhow::Result;
use chrono::Local;
use log::info;
use std::io::BufWriter;
use tokio::io::BufReader;

use nonprofit_geo::batching;
use nonprofit_geo::config::GeocoderConfig;
use nonprofit_geo::env_loader;
use nonprofit_geo::geocoder::CensusGeocoder;

/// Reads tab-delimited nonprofit rows on stdin and writes batch geocoder
/// results to stdout.
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    env_loader::load_env();

    let started = Local::now();
    info!("Starting batch geocoding run at {}", started.format("%Y-%m-%d %H:%M:%S"));

    let config = GeocoderConfig::from_env();
    let geocoder = CensusGeocoder::new(&config)?;

    let input = BufReader::new(tokio::io::stdin());
    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let stats = batching::run_resolver(input, &mut out, &geocoder, config.batch_size, config.no_match).await?;

    let elapsed = Local::now() - started;
    info!(
        "Geocoded {} addresses in {} batches ({} matched, {} unmatched, {} ties, {} lines written) in {}s",
        stats.rows,
        stats.batches,
        stats.matched,
        stats.unmatched,
        stats.ties,
        stats.written,
        elapsed.num_seconds()
    );
    eprintln!("Finished");
    Ok(())
}
