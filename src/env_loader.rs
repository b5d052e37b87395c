use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::path::Path;

const ENV_PATHS: [&str; 3] = [".env", ".env.local", "../.env"];

/// Loads the first `.env` file found into the process environment.
/// Variables already set in the environment always win over the file.
pub fn load_env() -> Option<&'static str> {
    for path in ENV_PATHS.iter() {
        if !Path::new(path).exists() {
            continue;
        }
        match load_env_from_file(path) {
            Ok(count) => {
                info!("Loaded {} environment variables from {}", count, path);
                return Some(path);
            }
            Err(e) => warn!("Failed to load environment from {}: {}", path, e),
        }
    }
    info!("No .env file found, using environment variables from system");
    None
}

fn load_env_from_file(file_path: &str) -> Result<usize> {
    let contents = std::fs::read_to_string(file_path)
        .with_context(|| format!("Could not read env file '{}'", file_path))?;
    let mut applied = 0;
    for (key, value) in parse_env_lines(&contents) {
        if std::env::var(key).is_err() {
            std::env::set_var(key, value);
            debug!("Set env var from file: {} = {}", key, value);
            applied += 1;
        }
    }
    Ok(applied)
}

/// Splits `KEY=value` lines, skipping comments and blanks. Surrounding quotes
/// on the value are dropped.
fn parse_env_lines(contents: &str) -> Vec<(&str, &str)> {
    contents
        .lines()
        .filter(|line| !line.starts_with('#') && !line.trim().is_empty())
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim().trim_matches('"')))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}
