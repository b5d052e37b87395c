//! Parsing of the batch geocoder's text response.
//!
//! Every line is one quoted-CSV row. Unmatched rows carry only the leading
//! id/address/status columns; matched rows carry all twelve:
//!
//! ```text
//! "208970676","po box 439465, chicago, IL, 60643","No_Match"
//! "363157630","8606 S Blackstone Ave, chicago, IL, 60619","Match","Exact","8606 S BLACKSTONE AVE, CHICAGO, IL, 60619","-87.58789,41.738476","605550571","R","17","031","834300","4009"
//! ```

use anyhow::{anyhow, bail, Context, Result};
use csv::StringRecord;

use crate::models::{Exactness, GeocodeResult, MatchStatus};

/// Column names written once at the top of the resolver's output.
pub const OUTPUT_COLUMNS: [&str; 12] = [
    "id",
    "orig_address",
    "match_or_not",
    "exact_or_not",
    "matched_address",
    "lat_lon",
    "tiger_line_id",
    "side_of_street",
    "state_fips",
    "county_fips",
    "census_tract",
    "census_block",
];

pub fn header_line() -> String {
    OUTPUT_COLUMNS.join(",")
}

/// Reads one response line as a CSV record. Rows have 3, 8 or 12 columns
/// depending on the match outcome, so the reader is flexible.
pub fn read_record(line: &str) -> Result<StringRecord> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());
    match reader.records().next() {
        Some(record) => record.with_context(|| format!("Unparseable geocoder response line: {}", line)),
        None => Ok(StringRecord::new()),
    }
}

impl MatchStatus {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "Match" => Some(MatchStatus::Match),
            "No_Match" => Some(MatchStatus::NoMatch),
            "Tie" => Some(MatchStatus::Tie),
            _ => None,
        }
    }
}

impl GeocodeResult {
    /// Parses one response line.
    pub fn parse(line: &str) -> Result<Self> {
        let fields = read_record(line.trim_end_matches(['\r', '\n']))?;
        if fields.len() < 3 {
            bail!("Unparseable geocoder response line ({} columns): {}", fields.len(), line);
        }
        let match_status = MatchStatus::parse(fields[2].trim())
            .ok_or_else(|| anyhow!("Unknown match status '{}' in response line: {}", &fields[2], line))?;

        let column = |i: usize| {
            fields
                .get(i)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let exactness = match match_status {
            MatchStatus::Match => column(3).map(|v| {
                if v == "Exact" {
                    Exactness::Exact
                } else {
                    Exactness::NonExact
                }
            }),
            _ => None,
        };

        Ok(GeocodeResult {
            id: fields[0].to_string(),
            original_address: fields[1].to_string(),
            match_status,
            exactness,
            matched_address: column(4),
            lon_lat: column(5),
            tiger_line_id: column(6),
            side_of_street: column(7),
            state_fips: column(8),
            county_fips: column(9),
            tract: column(10),
            block: column(11),
        })
    }

    pub fn is_match(&self) -> bool {
        self.match_status == MatchStatus::Match
    }

    /// Coordinates as `(lon, lat)`, when the service returned a usable pair.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let (lon, lat) = self.lon_lat.as_deref()?.split_once(',')?;
        Some((lon.trim().parse().ok()?, lat.trim().parse().ok()?))
    }
}
