// Row and record types shared by the resolver and the reconciler.

/// One nonprofit mailing address, extracted from a tab-delimited input row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    pub id: String,
    pub addr_line1: String,
    pub addr_line2: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

impl AddressRecord {
    /// Street lines joined by a single space, empty lines left out.
    pub fn street(&self) -> String {
        [self.addr_line1.as_str(), self.addr_line2.as_str()]
            .iter()
            .filter(|line| !line.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The five upload columns: id, street, city, state, zip.
    pub fn upload_fields(&self) -> [String; 5] {
        [
            self.id.clone(),
            self.street(),
            self.city.clone(),
            self.state.clone(),
            self.zip.clone(),
        ]
    }
}

/// Which column set of the input row holds the effective address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressLayout {
    Primary,
    AlternatePOBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    Match,
    NoMatch,
    Tie,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exactness {
    Exact,
    NonExact,
}

/// One row of the batch service response.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeResult {
    pub id: String,
    pub original_address: String,
    pub match_status: MatchStatus,
    pub exactness: Option<Exactness>,
    pub matched_address: Option<String>,
    pub lon_lat: Option<String>,
    pub tiger_line_id: Option<String>,
    pub side_of_street: Option<String>,
    pub state_fips: Option<String>,
    pub county_fips: Option<String>,
    pub tract: Option<String>,
    pub block: Option<String>,
}

/// A canonical place from the gazetteer. `name` is the full place name,
/// including its place-type suffix (e.g. "Chicago city").
#[derive(Debug, Clone, PartialEq)]
pub struct GazetteerCity {
    pub state: String,
    pub name: String,
    pub lon: f64,
    pub lat: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CityNameMapping {
    pub state: String,
    pub raw_name: String,
    pub canonical_name: String,
}

impl CityNameMapping {
    pub fn is_correction(&self) -> bool {
        self.raw_name != self.canonical_name
    }
}
