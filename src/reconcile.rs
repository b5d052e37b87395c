// reconcile.rs
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info};
use std::collections::BTreeSet;
use std::path::Path;

use crate::config::ReconcileConfig;
use crate::gazetteer::{build_city_lookup, load_state_gazetteer, state_gazetteer_path, CityLookup};
use crate::models::CityNameMapping;
use crate::similarity;

/// Lowest similarity at which a gazetteer spelling replaces the raw name.
pub const MIN_SIMILARITY: f64 = 0.79;

/// Matched keys starting with this prefix may differ from the raw name in
/// their first character.
pub const FIRST_LETTER_EXEMPT_PREFIX: &str = "new";

const MAPPING_HEADER: [&str; 2] = ["pub78_name", "mapped_name"];

const DIRECTIONS: [(&str, &str); 4] = [("n", "north"), ("s", "south"), ("w", "west"), ("e", "east")];

/// Expands a leading one-letter compass abbreviation, with or without its
/// period: "N. Chicago" -> "north Chicago". The token match ignores case.
pub fn expand_direction(name: &str) -> String {
    if let Some((first, rest)) = name.split_once(' ') {
        if first.chars().count() < 3 {
            let token = first.to_lowercase();
            let token = token.strip_suffix('.').unwrap_or(&token);
            if let Some((_, direction)) = DIRECTIONS.iter().find(|(abbr, _)| *abbr == token) {
                return format!("{} {}", direction, rest);
            }
        }
    }
    name.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    FirstLetter,
    LowSimilarity,
    NoCandidate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Accepted,
    Rejected(Rejection),
}

/// Accept/reject policy for a lowercased raw name and its closest key.
pub fn decide(test: &str, key: &str, score: f64) -> Decision {
    let same_first_letter = match key.chars().next() {
        Some(first) => test.starts_with(first),
        None => false,
    };
    if !same_first_letter && !key.starts_with(FIRST_LETTER_EXEMPT_PREFIX) {
        Decision::Rejected(Rejection::FirstLetter)
    } else if score < MIN_SIMILARITY {
        Decision::Rejected(Rejection::LowSimilarity)
    } else {
        Decision::Accepted
    }
}

/// Full outcome of matching one raw city name.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub raw_name: String,
    pub matched_key: Option<String>,
    pub score: f64,
    pub decision: Decision,
    pub resolved_name: String,
}

pub fn reconcile_detailed(raw_city: &str, lookup: &CityLookup) -> Reconciliation {
    let test = expand_direction(&raw_city.to_lowercase());
    let unresolved = |matched_key: Option<String>, score: f64, reason: Rejection| Reconciliation {
        raw_name: raw_city.to_string(),
        matched_key,
        score,
        decision: Decision::Rejected(reason),
        resolved_name: raw_city.to_string(),
    };

    if test.trim().is_empty() {
        return unresolved(None, 0.0, Rejection::NoCandidate);
    }
    let Some((key, _)) = similarity::closest(&test, lookup.keys()) else {
        return unresolved(None, 0.0, Rejection::NoCandidate);
    };
    let score = similarity::ratio(&test, key);

    match (decide(&test, key, score), lookup.get(key)) {
        (Decision::Accepted, Some(canonical)) => Reconciliation {
            raw_name: raw_city.to_string(),
            matched_key: Some(key.to_string()),
            score,
            decision: Decision::Accepted,
            resolved_name: canonical.to_string(),
        },
        (Decision::Rejected(reason), _) => unresolved(Some(key.to_string()), score, reason),
        (Decision::Accepted, None) => unresolved(Some(key.to_string()), score, Rejection::NoCandidate),
    }
}

/// Best canonical spelling of `raw_city`, or `raw_city` itself when no
/// confident match exists.
pub fn reconcile(raw_city: &str, lookup: &CityLookup) -> String {
    reconcile_detailed(raw_city, lookup).resolved_name
}

/// City name encoded in a filing-extract file name: "North_Chicago.txt" -> "North Chicago".
pub fn filing_city_name(path: &Path) -> Option<String> {
    if path.extension()? != "txt" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    Some(stem.replace('_', " "))
}

/// Distinct city names found in one state's filing-extract directory, sorted.
pub fn filing_city_names(state_dir: &Path) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    for entry in std::fs::read_dir(state_dir).with_context(|| format!("Failed to list {:?}", state_dir))? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        match filing_city_name(&path) {
            Some(name) => {
                names.insert(name);
            }
            None => debug!("Ignoring non-extract file {:?}", path),
        }
    }
    Ok(names)
}

pub fn reconcile_state<'a, I>(state: &str, raw_names: I, lookup: &CityLookup) -> Vec<CityNameMapping>
where
    I: IntoIterator<Item = &'a String>,
{
    raw_names
        .into_iter()
        .map(|raw| {
            let outcome = reconcile_detailed(raw, lookup);
            debug!(
                "{}: '{}' -> '{}' (closest {:?}, score {:.3}, {:?})",
                state, raw, outcome.resolved_name, outcome.matched_key, outcome.score, outcome.decision
            );
            CityNameMapping {
                state: state.to_string(),
                raw_name: outcome.raw_name,
                canonical_name: outcome.resolved_name,
            }
        })
        .collect()
}

pub fn write_mappings(path: &Path, mappings: &[CityNameMapping]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(path)
        .with_context(|| format!("Failed to create {:?}", path))?;
    writer.write_record(MAPPING_HEADER)?;
    for mapping in mappings {
        writer.write_record([&mapping.raw_name, &mapping.canonical_name])?;
    }
    writer.flush().with_context(|| format!("Failed to write {:?}", path))
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub states_reconciled: usize,
    pub states_skipped: usize,
    pub states_failed: usize,
    pub names: usize,
    pub corrections: usize,
}

fn run_state(config: &ReconcileConfig, state: &str, state_dir: &Path, gazetteer: &Path) -> Result<Vec<CityNameMapping>> {
    let lookup = build_city_lookup(&load_state_gazetteer(gazetteer, state)?);
    let raw_names = filing_city_names(state_dir)?;
    let mappings = reconcile_state(state, &raw_names, &lookup);
    write_mappings(&config.mapping_dir.join(format!("{}.txt", state)), &mappings)?;
    Ok(mappings)
}

/// Reconciles every state directory under `pub78_dir` that has a gazetteer,
/// writing one mapping file per state. A failing state is logged and skipped.
pub fn run_reconciliation(config: &ReconcileConfig) -> Result<ReconcileSummary> {
    std::fs::create_dir_all(&config.mapping_dir)
        .with_context(|| format!("Failed to create {:?}", config.mapping_dir))?;

    let mut state_dirs = Vec::new();
    for entry in std::fs::read_dir(&config.pub78_dir)
        .with_context(|| format!("Failed to list {:?}", config.pub78_dir))?
    {
        let path = entry?.path();
        if let Some(state) = path.file_name().and_then(|n| n.to_str()) {
            if path.is_dir() {
                state_dirs.push((state.to_string(), path.clone()));
            }
        }
    }
    state_dirs.sort();

    let pb = ProgressBar::new(state_dirs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let mut summary = ReconcileSummary::default();
    for (state, state_dir) in &state_dirs {
        pb.set_message(state.clone());
        pb.inc(1);
        let Some(gazetteer) = state_gazetteer_path(&config.gazetteer_dir, state) else {
            debug!("No gazetteer for {}, skipping", state);
            summary.states_skipped += 1;
            continue;
        };
        match run_state(config, state, state_dir, &gazetteer) {
            Ok(mappings) => {
                let corrections = mappings.iter().filter(|m| m.is_correction()).count();
                info!("{}: {} city names, {} corrected", state, mappings.len(), corrections);
                summary.states_reconciled += 1;
                summary.names += mappings.len();
                summary.corrections += corrections;
            }
            Err(e) => {
                error!("Reconciliation failed for {}: {:#}", state, e);
                summary.states_failed += 1;
            }
        }
    }
    pb.finish_and_clear();
    Ok(summary)
}
