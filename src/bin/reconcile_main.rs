use anyhow::{bail, Result};
use chrono::Local;
use log::info;
use std::env;
use std::path::PathBuf;

use nonprofit_geo::config::ReconcileConfig;
use nonprofit_geo::env_loader;
use nonprofit_geo::gazetteer;
use nonprofit_geo::reconcile;

const USAGE: &str = "usage: reconcile [split-gazetteer <national_gazetteer.txt>]";

fn main() -> Result<()> {
    env_logger::init();
    env_loader::load_env();

    let config = ReconcileConfig::from_env();
    let args: Vec<String> = env::args().skip(1).collect();
    let started = Local::now();

    match args.as_slice() {
        [] => {
            info!("Starting city name reconciliation...");
            let summary = reconcile::run_reconciliation(&config)?;
            info!(
                "Reconciled {} states ({} without gazetteer, {} failed): {} city names, {} corrected in {}s",
                summary.states_reconciled,
                summary.states_skipped,
                summary.states_failed,
                summary.names,
                summary.corrections,
                (Local::now() - started).num_seconds()
            );
            println!("Mappings written to {:?}", config.mapping_dir);
        }
        [command, national] if command == "split-gazetteer" => {
            let counts = gazetteer::split_national_gazetteer(&PathBuf::from(national), &config.gazetteer_dir)?;
            let places: usize = counts.values().sum();
            println!("Wrote {} places for {} states to {:?}", places, counts.len(), config.gazetteer_dir);
        }
        _ => bail!(USAGE),
    }
    Ok(())
}
