use std::collections::{BTreeSet, HashMap};

use log::debug;

use crate::territory::{collation_key, TerritoryIndex, TerritoryRow};

/// A builder for the territory index.
///
/// Rows are accumulated in a single pass; sorting happens once per level in
/// `build`.
///
/// ```
/// use canvass_core::builder::TerritoryBuilder;
/// use canvass_core::territory::TerritoryRow;
///
/// let mut builder = TerritoryBuilder::new();
/// builder.add_row(&TerritoryRow::new("NARIÑO", "PASTO", "COLEGIO CENTRAL", "CRA 1"));
/// builder.add_row(&TerritoryRow::new("ANTIOQUIA", "MEDELLÍN", "", ""));
/// let index = builder.build();
///
/// assert_eq!(index.departments(), &["ANTIOQUIA".to_string(), "NARIÑO".to_string()]);
/// assert_eq!(index.addresses("NARIÑO", "PASTO", "COLEGIO CENTRAL"), &["CRA 1".to_string()]);
/// ```
#[derive(Default)]
pub struct TerritoryBuilder {
    departments: BTreeSet<String>,
    municipalities: HashMap<String, BTreeSet<String>>,
    stations: HashMap<(String, String), BTreeSet<String>>,
    addresses: HashMap<(String, String, String), BTreeSet<String>>,
    rows: usize,
}

impl TerritoryBuilder {
    pub fn new() -> TerritoryBuilder {
        TerritoryBuilder::default()
    }

    /// Adds one row to the index.
    ///
    /// Returns false when the row carries no department, in which case it is ignored.
    pub fn add_row(&mut self, row: &TerritoryRow) -> bool {
        if row.department.is_empty() {
            return false;
        }
        self.rows += 1;
        let d = row.department.clone();
        self.departments.insert(d.clone());
        let munis = self.municipalities.entry(d.clone()).or_default();
        if row.municipality.is_empty() {
            return true;
        }
        munis.insert(row.municipality.clone());

        let dm = (d, row.municipality.clone());
        if row.station.is_empty() {
            return true;
        }
        self.stations
            .entry(dm.clone())
            .or_default()
            .insert(row.station.clone());

        if !row.address.is_empty() {
            self.addresses
                .entry((dm.0, dm.1, row.station.clone()))
                .or_default()
                .insert(row.address.clone());
        }
        true
    }

    pub fn build(self) -> TerritoryIndex {
        debug!(
            "TerritoryBuilder::build: rows: {} departments: {} municipalities: {} stations: {}",
            self.rows,
            self.departments.len(),
            self.municipalities.len(),
            self.stations.len()
        );
        TerritoryIndex {
            departments: sorted(self.departments),
            municipalities: self
                .municipalities
                .into_iter()
                .filter(|(_, ms)| !ms.is_empty())
                .map(|(k, v)| (k, sorted(v)))
                .collect(),
            stations: self
                .stations
                .into_iter()
                .map(|(k, v)| (k, sorted(v)))
                .collect(),
            addresses: self
                .addresses
                .into_iter()
                .map(|(k, v)| (k, sorted(v)))
                .collect(),
            rows_indexed: self.rows,
        }
    }
}

fn sorted(values: BTreeSet<String>) -> Vec<String> {
    let mut res: Vec<String> = values.into_iter().collect();
    res.sort_by_cached_key(|s| collation_key(s));
    res
}
