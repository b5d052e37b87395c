// address.rs
use anyhow::{bail, Result};
use regex::Regex;
use std::sync::OnceLock;

use crate::models::{AddressLayout, AddressRecord};

/// Positions of the id and the five address fields in one tab-delimited row.
#[derive(Debug, Clone, Copy)]
struct ColumnSet {
    id: usize,
    line1: usize,
    line2: usize,
    city: usize,
    state: usize,
    zip: usize,
}

impl ColumnSet {
    fn max_index(&self) -> usize {
        [self.id, self.line1, self.line2, self.city, self.state, self.zip]
            .into_iter()
            .max()
            .unwrap_or(0)
    }
}

// EIN, street line 1, street line 2, city, state, zip
const PRIMARY_COLUMNS: ColumnSet = ColumnSet { id: 0, line1: 16, line2: 17, city: 18, state: 19, zip: 20 };
const PO_BOX_COLUMNS: ColumnSet = ColumnSet { id: 0, line1: 10, line2: 9, city: 11, state: 13, zip: 14 };

/// Minimum number of tab-separated fields an input row must carry.
pub const MIN_FIELDS: usize = 21;

impl AddressLayout {
    fn columns(self) -> ColumnSet {
        match self {
            AddressLayout::Primary => PRIMARY_COLUMNS,
            AddressLayout::AlternatePOBox => PO_BOX_COLUMNS,
        }
    }
}

fn po_box_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // "po box", "p o box", "p.o. box", "p. o. box"
    PATTERN.get_or_init(|| Regex::new(r"(?i)p(?:o| o|\.o\.|\. o\.) box").expect("valid PO box regex"))
}

pub fn is_po_box(address: &str) -> bool {
    po_box_pattern().is_match(address)
}

/// Picks the column layout for a row by looking at its primary street lines.
pub fn classify_layout(fields: &[&str]) -> AddressLayout {
    let primary = read_columns(fields, PRIMARY_COLUMNS);
    if is_po_box(&format!("{} {}", primary.addr_line1, primary.addr_line2)) {
        AddressLayout::AlternatePOBox
    } else {
        AddressLayout::Primary
    }
}

fn read_columns(fields: &[&str], columns: ColumnSet) -> AddressRecord {
    let field = |i: usize| fields.get(i).map(|f| f.trim().to_string()).unwrap_or_default();
    AddressRecord {
        id: field(columns.id),
        addr_line1: field(columns.line1),
        addr_line2: field(columns.line2),
        city: field(columns.city),
        state: field(columns.state),
        zip: field(columns.zip),
    }
}

/// Extracts the effective mailing address from one tab-delimited row.
///
/// Rows whose primary street lines look like a PO box are read from the
/// alternate column set instead. A row shorter than [`MIN_FIELDS`] is an error.
pub fn extract_address(row: &str) -> Result<AddressRecord> {
    let fields: Vec<&str> = row.split('\t').collect();
    if fields.len() < MIN_FIELDS {
        bail!(
            "Malformed address row: expected at least {} tab-separated fields, found {}",
            MIN_FIELDS,
            fields.len()
        );
    }
    let layout = classify_layout(&fields);
    debug_assert!(layout.columns().max_index() < fields.len());
    Ok(read_columns(&fields, layout.columns()))
}
