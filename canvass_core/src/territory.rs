//! The territory reference data: department → municipality → polling
//! station → address.
//!
//! The listing is a delimited text file, one row per polling station, with
//! the columns `department, municipality, station, <unused>, address, ...`.
//! Loading never fails: rows that cannot be understood are skipped.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};

use crate::builder::TerritoryBuilder;
use crate::normalize::{comparable, fold, normalize};

const DEPARTMENT_COL: usize = 0;
const MUNICIPALITY_COL: usize = 1;
const STATION_COL: usize = 2;
const ADDRESS_COL: usize = 4;
const MIN_FIELDS: usize = 5;

/// One row of the reference listing, after trimming and repair.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct TerritoryRow {
    pub department: String,
    pub municipality: String,
    pub station: String,
    pub address: String,
}

impl TerritoryRow {
    pub fn new(department: &str, municipality: &str, station: &str, address: &str) -> TerritoryRow {
        TerritoryRow {
            department: department.to_string(),
            municipality: municipality.to_string(),
            station: station.to_string(),
            address: address.to_string(),
        }
    }
}

/// How the reference listing is laid out.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ListingFormat {
    pub delimiter: char,
    pub quote: char,
    /// The first record is a header and is dropped.
    pub has_header: bool,
    /// Department values that are header echoes rather than data.
    pub header_labels: Vec<String>,
}

impl Default for ListingFormat {
    fn default() -> Self {
        ListingFormat {
            delimiter: ',',
            quote: '"',
            has_header: true,
            header_labels: vec!["DEPARTAMENTO".to_string(), "DEPARTMENT".to_string()],
        }
    }
}

/// The cascading lookup tables. Immutable once built.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct TerritoryIndex {
    pub(crate) departments: Vec<String>,
    pub(crate) municipalities: HashMap<String, Vec<String>>,
    pub(crate) stations: HashMap<(String, String), Vec<String>>,
    pub(crate) addresses: HashMap<(String, String, String), Vec<String>>,
    pub(crate) rows_indexed: usize,
}

impl TerritoryIndex {
    pub fn departments(&self) -> &[String] {
        &self.departments
    }

    pub fn municipalities(&self, department: &str) -> &[String] {
        self.municipalities
            .get(department)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn stations(&self, department: &str, municipality: &str) -> &[String] {
        self.stations
            .get(&(department.to_string(), municipality.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn addresses(&self, department: &str, municipality: &str, station: &str) -> &[String] {
        self.addresses
            .get(&(
                department.to_string(),
                municipality.to_string(),
                station.to_string(),
            ))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.departments.is_empty()
    }

    /// Number of listing rows that made it into the index.
    pub fn rows_indexed(&self) -> usize {
        self.rows_indexed
    }

    /// The stored spelling of a department, matched case-insensitively.
    pub fn canonical_department(&self, name: &str) -> Option<&str> {
        find_exact(&self.departments, name)
    }

    pub fn canonical_municipality(&self, department: &str, name: &str) -> Option<&str> {
        find_exact(self.municipalities(department), name)
    }

    pub fn canonical_station(&self, department: &str, municipality: &str, name: &str) -> Option<&str> {
        find_exact(self.stations(department, municipality), name)
    }

    pub fn canonical_address(
        &self,
        department: &str,
        municipality: &str,
        station: &str,
        name: &str,
    ) -> Option<&str> {
        find_exact(self.addresses(department, municipality, station), name)
    }
}

fn find_exact<'a>(candidates: &'a [String], name: &str) -> Option<&'a str> {
    let wanted = comparable(name);
    if wanted.is_empty() {
        return None;
    }
    candidates
        .iter()
        .find(|c| comparable(c) == wanted)
        .map(String::as_str)
}

/// Sort key putting accented letters next to their plain counterparts.
pub(crate) fn collation_key(s: &str) -> (String, String) {
    (fold(s), s.to_string())
}

/// Human ordering of territory names: accents and case are ignored first,
/// then used to break ties.
pub fn collate(a: &str, b: &str) -> Ordering {
    collation_key(a).cmp(&collation_key(b))
}

/// Splits the raw listing into records of fields.
///
/// A field may be wrapped in `quote`. Inside a quoted field a doubled quote is
/// one literal quote, and delimiters and line breaks are part of the value.
pub fn parse_records(raw: &str, delimiter: char, quote: char) -> Vec<Vec<String>> {
    let mut records: Vec<Vec<String>> = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == quote {
                if chars.peek() == Some(&quote) {
                    chars.next();
                    field.push(quote);
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
        } else if c == quote && field.trim().is_empty() {
            field.clear();
            in_quotes = true;
        } else if c == delimiter {
            record.push(std::mem::take(&mut field));
        } else if c == '\n' || c == '\r' {
            if c == '\r' && chars.peek() == Some(&'\n') {
                chars.next();
            }
            record.push(std::mem::take(&mut field));
            records.push(std::mem::take(&mut record));
        } else {
            field.push(c);
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}

fn clean_field(raw: &str, quote: char) -> String {
    let trimmed = raw.trim().trim_matches(quote).trim();
    normalize(trimmed)
}

/// Turns one parsed record into a row. `None` for records too short to hold
/// the address column.
pub fn read_row(fields: &[String], quote: char) -> Option<TerritoryRow> {
    if fields.len() < MIN_FIELDS {
        return None;
    }
    Some(TerritoryRow {
        department: clean_field(&fields[DEPARTMENT_COL], quote),
        municipality: clean_field(&fields[MUNICIPALITY_COL], quote),
        station: clean_field(&fields[STATION_COL], quote),
        address: clean_field(&fields[ADDRESS_COL], quote),
    })
}

/// Loads the listing with the default format.
pub fn load(raw: &str) -> TerritoryIndex {
    load_with(raw, &ListingFormat::default())
}

pub fn load_with(raw: &str, format: &ListingFormat) -> TerritoryIndex {
    let records = parse_records(raw, format.delimiter, format.quote);
    let mut builder = TerritoryBuilder::new();
    let mut skipped_short = 0;
    let mut skipped_department = 0;

    let mut iter = records.iter();
    if format.has_header {
        if let Some(header) = iter.next() {
            debug!("load_with: header: {:?}", header);
        }
    }

    for (idx, fields) in iter.enumerate() {
        let row = match read_row(fields, format.quote) {
            Some(row) => row,
            None => {
                debug!("load_with: record {}: too few fields: {:?}", idx, fields);
                skipped_short += 1;
                continue;
            }
        };
        let is_header_echo = format
            .header_labels
            .iter()
            .any(|label| comparable(label) == comparable(&row.department));
        if row.department.is_empty() || is_header_echo {
            debug!("load_with: record {}: no department: {:?}", idx, row);
            skipped_department += 1;
            continue;
        }
        builder.add_row(&row);
    }

    let index = builder.build();
    info!(
        "Loaded territory listing: {} records, {} indexed, {} departments, skipped {} short and {} without department",
        records.len(),
        index.rows_indexed(),
        index.departments().len(),
        skipped_short,
        skipped_department
    );
    index
}

/// Keeps the last loaded index and reloads only when the listing changes.
///
/// The index is shared through an `Arc`, so concurrent readers keep the
/// version they got even after a reload.
pub struct TerritoryCache {
    format: ListingFormat,
    current: Option<(String, Arc<TerritoryIndex>)>,
    loads: usize,
}

impl TerritoryCache {
    pub fn new(format: ListingFormat) -> TerritoryCache {
        TerritoryCache {
            format,
            current: None,
            loads: 0,
        }
    }

    pub fn get_or_load(&mut self, raw: &str) -> Arc<TerritoryIndex> {
        let digest = sha256::digest(raw);
        if let Some((cached_digest, index)) = &self.current {
            if *cached_digest == digest {
                debug!("TerritoryCache: reusing index {}", digest);
                return index.clone();
            }
        }
        let index = Arc::new(load_with(raw, &self.format));
        self.loads += 1;
        self.current = Some((digest, index.clone()));
        index
    }

    pub fn current(&self) -> Option<Arc<TerritoryIndex>> {
        self.current.as_ref().map(|(_, index)| index.clone())
    }

    /// Forgets the cached index; the next `get_or_load` parses again.
    pub fn invalidate(&mut self) {
        self.current = None;
    }

    /// How many times the listing was actually parsed.
    pub fn loads(&self) -> usize {
        self.loads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn strings(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn single_row_listing() {
        init();
        let raw = "DEPARTAMENTO,MUNICIPIO,PUESTO,MESAS,DIRECCION\n\
                   BOGOTA D.C., BOGOTA D.C., PUESTO 1, 0, CALLE 1\n";
        let index = load(raw);
        assert_eq!(index.departments(), strings(&["BOGOTA D.C."]).as_slice());
        assert_eq!(
            index.municipalities("BOGOTA D.C."),
            strings(&["BOGOTA D.C."]).as_slice()
        );
        assert_eq!(
            index.stations("BOGOTA D.C.", "BOGOTA D.C."),
            strings(&["PUESTO 1"]).as_slice()
        );
        assert_eq!(
            index.addresses("BOGOTA D.C.", "BOGOTA D.C.", "PUESTO 1"),
            strings(&["CALLE 1"]).as_slice()
        );
    }

    #[test]
    fn quoted_fields() {
        let raw = "h1,h2,h3,h4,h5\n\"ANTIOQUIA\",\"MEDELLIN\",\"COLEGIO \"\"SAN JOSE\"\" SEDE\",\"3\",\"CRA 1, 2\nPISO 2\"\n";
        let records = parse_records(raw, ',', '"');
        assert_eq!(records.len(), 2);
        assert_eq!(records[1][2], "COLEGIO \"SAN JOSE\" SEDE");
        assert_eq!(records[1][4], "CRA 1, 2\nPISO 2");

        let index = load(raw);
        assert_eq!(
            index.stations("ANTIOQUIA", "MEDELLIN"),
            strings(&["COLEGIO \"SAN JOSE\" SEDE"]).as_slice()
        );
        assert_eq!(
            index.addresses("ANTIOQUIA", "MEDELLIN", "COLEGIO \"SAN JOSE\" SEDE"),
            strings(&["CRA 1, 2\nPISO 2"]).as_slice()
        );
    }

    #[test]
    fn malformed_rows_are_skipped() {
        init();
        let raw = "DEPARTAMENTO,MUNICIPIO,PUESTO,MESAS,DIRECCION\r\n\
                   SHORT,ROW\r\n\
                   \r\n\
                   ,PASTO,PUESTO 2,1,CALLE 2\r\n\
                   DEPARTAMENTO,MUNICIPIO,PUESTO,MESAS,DIRECCION\r\n\
                   NARIÑO,PASTO,PUESTO 3,1,CALLE 3\r\n";
        let index = load(raw);
        assert_eq!(index.departments(), strings(&["NARIÑO"]).as_slice());
        assert_eq!(index.rows_indexed(), 1);
    }

    #[test]
    fn garbage_never_fails() {
        assert!(load("").is_empty());
        assert!(load("\"unterminated,,,,").is_empty());
        assert!(load(",,,,\n,,,,\n").is_empty());
        assert!(load("\u{0}\u{1}").is_empty());
    }

    #[test]
    fn values_are_repaired_and_deduplicated() {
        let raw = "d,m,s,x,a\n\
                   NARIÃ‘O,PASTO,PUESTO 1,1,CALLE 1\n\
                   NARIÑO,PASTO,PUESTO 1,2,CALLE 1\n\
                   NARIÑO,PASTO,PUESTO 1,2,\n\
                   NARIÑO,IPIALES,,2,CALLE 9\n";
        let index = load(raw);
        assert_eq!(index.departments(), strings(&["NARIÑO"]).as_slice());
        assert_eq!(
            index.municipalities("NARIÑO"),
            strings(&["IPIALES", "PASTO"]).as_slice()
        );
        assert_eq!(
            index.addresses("NARIÑO", "PASTO", "PUESTO 1"),
            strings(&["CALLE 1"]).as_slice()
        );
        // A station-less row contributes no station and no address.
        assert!(index.stations("NARIÑO", "IPIALES").is_empty());
    }

    #[test]
    fn accents_sort_next_to_plain_letters() {
        let raw = "d,m,s,x,a\n\
                   ÑUÑOA,X,,,\n\
                   ZIPAQUIRA,X,,,\n\
                   ATLÁNTICO,X,,,\n\
                   ANTIOQUIA,X,,,\n\
                   ÁREA,X,,,\n\
                   NARIÑO,X,,,\n";
        let index = load(raw);
        assert_eq!(
            index.departments(),
            strings(&["ANTIOQUIA", "ÁREA", "ATLÁNTICO", "NARIÑO", "ÑUÑOA", "ZIPAQUIRA"]).as_slice()
        );
        assert_eq!(collate("Área", "Arena"), Ordering::Less);
    }

    #[test]
    fn separator_in_names_does_not_collide() {
        let raw = "d,m,s,x,a\n\
                   A|B,C,S1,,X1\n\
                   A,B|C,S2,,X2\n";
        let index = load(raw);
        assert_eq!(index.stations("A|B", "C"), strings(&["S1"]).as_slice());
        assert_eq!(index.stations("A", "B|C"), strings(&["S2"]).as_slice());
    }

    #[test]
    fn canonical_lookups_ignore_case() {
        let raw = "d,m,s,x,a\nNariño,Pasto,Colegio Central,1,Cra 1\n";
        let index = load(raw);
        assert_eq!(index.canonical_department(" NARIÑO "), Some("Nariño"));
        assert_eq!(index.canonical_municipality("Nariño", "pasto"), Some("Pasto"));
        assert_eq!(
            index.canonical_station("Nariño", "Pasto", "COLEGIO CENTRAL"),
            Some("Colegio Central")
        );
        assert_eq!(index.canonical_department("NARINO"), None);
        assert_eq!(index.canonical_department(""), None);
    }

    #[test]
    fn custom_delimiter() {
        let format = ListingFormat {
            delimiter: ';',
            ..ListingFormat::default()
        };
        let index = load_with("d;m;s;x;a\nCAUCA;POPAYAN;P1;1;C1\n", &format);
        assert_eq!(index.departments(), strings(&["CAUCA"]).as_slice());
    }

    #[test]
    fn cache_reloads_only_on_change() {
        let mut cache = TerritoryCache::new(ListingFormat::default());
        let a = "d,m,s,x,a\nCAUCA,POPAYAN,P1,1,C1\n";
        let b = "d,m,s,x,a\nHUILA,NEIVA,P1,1,C1\n";
        let first = cache.get_or_load(a);
        let again = cache.get_or_load(a);
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(cache.loads(), 1);

        let other = cache.get_or_load(b);
        assert_eq!(other.departments(), strings(&["HUILA"]).as_slice());
        assert_eq!(cache.loads(), 2);
        // Readers holding the old version keep it.
        assert_eq!(first.departments(), strings(&["CAUCA"]).as_slice());

        cache.invalidate();
        assert!(cache.current().is_none());
        cache.get_or_load(b);
        assert_eq!(cache.loads(), 3);
    }
}
