//! Bulk import of voter rows coming out of a spreadsheet.
//!
//! Every row is handled on its own: a bad row produces one message and the
//! batch moves on. Valid rows go through the same creation path as the
//! registration form.

use std::collections::HashMap;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::flow::{RecordStore, VerificationFlow};
use crate::normalize::header_key;
use crate::{Gender, ImportIncident, LocationClaim, RegistryError, VoterDraft};

/// One decoded spreadsheet row: column header → cell text.
pub type RawRow = HashMap<String, String>;

/// The meaning of a spreadsheet column.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Column {
    FullName,
    NationalId,
    Age,
    Gender,
    Phone,
    ResidenceAddress,
    Department,
    Municipality,
    VotingStation,
    PollingTable,
    Notes,
}

// Headers are compared after `header_key`: uppercase, no accents.
const COLUMN_ALIASES: &[(Column, &[&str])] = &[
    (
        Column::FullName,
        &["NOMBRES Y APELLIDOS", "NOMBRE COMPLETO", "NOMBRE", "FULL NAME", "NAME"],
    ),
    (
        Column::NationalId,
        &["CEDULA", "NUMERO DE CEDULA", "DOCUMENTO", "NATIONAL ID"],
    ),
    (Column::Age, &["EDAD", "AGE"]),
    (Column::Gender, &["GENERO", "SEXO", "GENDER"]),
    (Column::Phone, &["CELULAR", "TELEFONO", "PHONE"]),
    (
        Column::ResidenceAddress,
        &["DIRECCION", "DIRECCION DE RESIDENCIA", "ADDRESS"],
    ),
    (Column::Department, &["DEPARTAMENTO", "DEPARTMENT"]),
    (Column::Municipality, &["MUNICIPIO", "MUNICIPALITY"]),
    (
        Column::VotingStation,
        &["LUGAR DE VOTACION", "LUGAR VOTACION", "PUESTO DE VOTACION", "VOTING STATION"],
    ),
    (
        Column::PollingTable,
        &["MESA DE VOTACION", "MESA VOTACION", "MESA", "POLLING TABLE"],
    ),
    (Column::Notes, &["OBSERVACIONES", "NOTAS", "NOTES"]),
];

impl Column {
    /// Finds the column a header refers to.
    pub fn from_header(header: &str) -> Option<Column> {
        let key = header_key(header);
        COLUMN_ALIASES
            .iter()
            .find(|(_, aliases)| aliases.contains(&key.as_str()))
            .map(|(column, _)| *column)
    }
}

/// The outcome of one import.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub created: usize,
    pub total_rows: usize,
    /// One message per rejected row, in row order.
    pub errors: Vec<String>,
}

// Only a blank cell is missing. Spreadsheets write numbers as `30.0`, so the
// cell is read as a float and truncated; the range is checked on creation.
fn parse_age(cell: &str) -> Result<Option<i64>, RegistryError> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Ok(None);
    }
    match cell.parse::<f64>() {
        Ok(age) if age.is_finite() => Ok(Some(age.trunc() as i64)),
        _ => {
            debug!("parse_age: unreadable {:?}", cell);
            Err(RegistryError::UnreadableAge(cell.to_string()))
        }
    }
}

/// Maps a raw row to a draft. Unknown columns are ignored, and so are gender
/// values other than `M`, `F` and `Otro`.
///
/// Fails only when the age cell is not a number.
pub fn draft_from_row(row: &RawRow, leader_id: u64) -> Result<VoterDraft, RegistryError> {
    let mut cells: HashMap<Column, &str> = HashMap::new();
    for (header, value) in row.iter() {
        if let Some(column) = Column::from_header(header) {
            let value = value.as_str();
            // Two headers for the same column: a non-blank value wins.
            let slot = cells.entry(column).or_insert(value);
            if slot.trim().is_empty() {
                *slot = value;
            }
        }
    }
    let text = |c: Column| cells.get(&c).map(|s| s.trim().to_string());

    let age = match cells.get(&Column::Age) {
        Some(cell) => parse_age(cell)?,
        None => None,
    };

    Ok(VoterDraft {
        full_name: text(Column::FullName).unwrap_or_default(),
        national_id: text(Column::NationalId).unwrap_or_default(),
        age,
        gender: cells.get(&Column::Gender).and_then(|s| Gender::parse(s)),
        phone: text(Column::Phone),
        residence_address: text(Column::ResidenceAddress),
        leader_id: Some(leader_id),
        location: LocationClaim {
            department: text(Column::Department),
            municipality: text(Column::Municipality),
            voting_station: text(Column::VotingStation),
            polling_table: text(Column::PollingTable),
            address: None,
        },
        notes: text(Column::Notes),
        registered_by: None,
    })
}

/// Imports a batch of rows for one leader.
///
/// Row numbers in the messages are 1-based positions in `rows`. When at least
/// one row failed, an `ImportIncident` is handed to the store; failing to
/// record it is only logged. The authority is called for each valid row only
/// when the flow settings ask for it.
pub fn import_rows<I>(
    rows: I,
    leader_id: u64,
    file_name: Option<&str>,
    flow: &VerificationFlow,
    store: &mut dyn RecordStore,
) -> ImportSummary
where
    I: IntoIterator<Item = RawRow>,
{
    let verify = flow.settings().enabled && flow.settings().verify_on_import;
    let mut summary = ImportSummary::default();
    for (idx, row) in rows.into_iter().enumerate() {
        let row_number = idx + 1;
        summary.total_rows += 1;
        let created = draft_from_row(&row, leader_id)
            .and_then(|draft| flow.create_record(store, &draft, verify));
        match created {
            Ok(record) => {
                debug!(
                    "import_rows: row {} created record {} ({})",
                    row_number, record.id, record.state
                );
                summary.created += 1;
            }
            Err(e) => {
                warn!("import_rows: row {} rejected: {}", row_number, e);
                summary.errors.push(format!("Row {}: {}", row_number, e));
            }
        }
    }
    info!(
        "import_rows: leader {}: created {} of {} rows, {} errors",
        leader_id,
        summary.created,
        summary.total_rows,
        summary.errors.len()
    );

    if !summary.errors.is_empty() {
        let incident = ImportIncident {
            leader_id,
            file_name: file_name.map(str::to_string),
            created: summary.created,
            total_rows: summary.total_rows,
            errors: summary.errors.clone(),
        };
        if let Err(e) = store.record_incident(incident) {
            warn!("import_rows: could not record the import incident: {}", e);
        }
    }
    summary
}
