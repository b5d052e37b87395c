// gazetteer.rs
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::models::GazetteerCity;

const STATE_FILE_HEADER: [&str; 3] = ["city", "lon", "lat"];

/// Canonical city names keyed by their lowercased form.
///
/// Built once per state and never modified afterwards. When two places
/// collapse to the same key, the one appearing later in the gazetteer wins.
#[derive(Debug, Clone, Default)]
pub struct CityLookup {
    entries: HashMap<String, String>,
}

impl CityLookup {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Drops the trailing place-type word: "Chicago city" -> "Chicago".
/// Single-word names are returned unchanged.
pub fn strip_place_suffix(full_name: &str) -> &str {
    let trimmed = full_name.trim();
    match trimmed.rsplit_once(' ') {
        Some((name, _suffix)) => name.trim_end(),
        None => trimmed,
    }
}

pub fn build_city_lookup(cities: &[GazetteerCity]) -> CityLookup {
    let mut entries = HashMap::with_capacity(cities.len());
    for city in cities {
        let name = strip_place_suffix(&city.name);
        if name.is_empty() {
            continue;
        }
        if let Some(previous) = entries.insert(name.to_lowercase(), name.to_string()) {
            debug!("Gazetteer key '{}' seen again, replacing '{}'", name.to_lowercase(), previous);
        }
    }
    CityLookup { entries }
}

fn tsv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_reader(reader)
}

/// Reads a per-state gazetteer (`city\tlon\tlat` with a header row).
///
/// A row that does not split on the tab stops the read; the rows before it
/// are kept. A row with a name but unusable coordinates keeps its name, with
/// NaN coordinates.
pub fn parse_state_gazetteer<R: Read>(state: &str, reader: R) -> Result<Vec<GazetteerCity>> {
    let mut cities = Vec::new();
    for record in tsv_reader(reader).records() {
        let record = match record {
            Ok(record) => record,
            Err(e) if e.is_io_error() => {
                return Err(e).with_context(|| format!("Failed to read gazetteer for {}", state));
            }
            Err(e) => {
                warn!("Gazetteer row that failed for {}: {}", state, e);
                break;
            }
        };
        if record.len() < 2 {
            warn!("Gazetteer row that failed for {}: {:?}", state, record);
            break;
        }
        let coordinate = |i: usize| record.get(i).and_then(|v| v.trim().parse::<f64>().ok());
        let (lon, lat) = match (coordinate(1), coordinate(2)) {
            (Some(lon), Some(lat)) => (lon, lat),
            _ => {
                warn!("No usable coordinates for {} place {:?}, keeping the name", state, &record[0]);
                (f64::NAN, f64::NAN)
            }
        };
        cities.push(GazetteerCity {
            state: state.to_string(),
            name: record[0].trim().to_string(),
            lon,
            lat,
        });
    }
    Ok(cities)
}

pub fn state_gazetteer_path(dir: &Path, state: &str) -> Option<PathBuf> {
    let path = dir.join(format!("{}.txt", state));
    path.is_file().then_some(path)
}

pub fn load_state_gazetteer(path: &Path, state: &str) -> Result<Vec<GazetteerCity>> {
    let file = File::open(path).with_context(|| format!("Failed to open gazetteer {:?}", path))?;
    let cities = parse_state_gazetteer(state, file)?;
    debug!("Loaded {} gazetteer places for {} from {:?}", cities.len(), state, path);
    Ok(cities)
}

fn decode_latin1(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => e.into_bytes().into_iter().map(char::from).collect(),
    }
}

/// Groups national gazetteer rows by state. Columns: state abbreviation first,
/// full place name fourth, latitude and longitude last.
pub fn group_national_gazetteer(text: &str) -> BTreeMap<String, Vec<GazetteerCity>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .quoting(false)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut by_state: BTreeMap<String, Vec<GazetteerCity>> = BTreeMap::new();
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping national gazetteer row: {}", e);
                continue;
            }
        };
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let n = record.len();
        if n < 6 || record[0].is_empty() {
            warn!("Skipping national gazetteer line {}: {:?}", line, record);
            continue;
        }
        let (Ok(lat), Ok(lon)) = (record[n - 2].parse::<f64>(), record[n - 1].parse::<f64>()) else {
            warn!("Skipping national gazetteer line {} with bad coordinates", line);
            continue;
        };
        by_state.entry(record[0].to_string()).or_default().push(GazetteerCity {
            state: record[0].to_string(),
            name: record[3].to_string(),
            lon,
            lat,
        });
    }
    by_state
}

/// Splits the national place gazetteer into one `<STATE>.txt` file per state
/// under `out_dir`. Returns the number of places written per state.
pub fn split_national_gazetteer(national: &Path, out_dir: &Path) -> Result<BTreeMap<String, usize>> {
    let bytes = std::fs::read(national).with_context(|| format!("Failed to read {:?}", national))?;
    let by_state = group_national_gazetteer(&decode_latin1(bytes));

    std::fs::create_dir_all(out_dir).with_context(|| format!("Failed to create {:?}", out_dir))?;
    let mut counts = BTreeMap::new();
    for (state, cities) in &by_state {
        let path = out_dir.join(format!("{}.txt", state));
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .terminator(csv::Terminator::Any(b'\n'))
            .from_path(&path)
            .with_context(|| format!("Failed to create {:?}", path))?;
        writer.write_record(STATE_FILE_HEADER)?;
        for city in cities {
            writer.write_record([city.name.clone(), city.lon.to_string(), city.lat.to_string()])?;
        }
        writer.flush().with_context(|| format!("Failed to write {:?}", path))?;
        counts.insert(state.clone(), cities.len());
    }
    info!("Split national gazetteer into {} state files under {:?}", counts.len(), out_dir);
    Ok(counts)
}
