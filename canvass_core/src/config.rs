// ********* Verification data structures ***********

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// The validation state of a voter record.
///
/// A record starts as `Unverified`. Every explicit verification moves it to
/// one of the three other states; no state is terminal.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize, Default)]
pub enum ValidationState {
    /// No reconciliation attempted yet.
    #[default]
    #[serde(rename = "unverified", alias = "sin_verificar")]
    Unverified,
    /// The authority found the ID and every comparable field matched.
    #[serde(rename = "verified", alias = "verificado")]
    Verified,
    /// The authority found the ID but at least one comparable field differs.
    #[serde(rename = "revision")]
    Revision,
    /// The authority did not find the ID, or the call itself failed.
    #[serde(rename = "inconsistent", alias = "inconsistente")]
    Inconsistent,
}

impl ValidationState {
    pub const ALL: [ValidationState; 4] = [
        ValidationState::Unverified,
        ValidationState::Verified,
        ValidationState::Revision,
        ValidationState::Inconsistent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationState::Unverified => "unverified",
            ValidationState::Verified => "verified",
            ValidationState::Revision => "revision",
            ValidationState::Inconsistent => "inconsistent",
        }
    }

    /// Parses the persisted label. Accepts the legacy Spanish labels too.
    pub fn parse(label: &str) -> Option<ValidationState> {
        match label.trim().to_lowercase().as_str() {
            "unverified" | "sin_verificar" => Some(ValidationState::Unverified),
            "verified" | "verificado" => Some(ValidationState::Verified),
            "revision" => Some(ValidationState::Revision),
            "inconsistent" | "inconsistente" => Some(ValidationState::Inconsistent),
            _ => None,
        }
    }

    /// States from which an edit of the location fields triggers a new verification.
    pub fn reverifies_on_location_edit(&self) -> bool {
        matches!(
            self,
            ValidationState::Revision | ValidationState::Inconsistent
        )
    }
}

impl Display for ValidationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The location fields that take part in the reconciliation.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum LocationField {
    #[serde(rename = "department")]
    Department,
    #[serde(rename = "municipality")]
    Municipality,
    #[serde(rename = "votingStation")]
    VotingStation,
    #[serde(rename = "pollingTable")]
    PollingTable,
    #[serde(rename = "address")]
    Address,
}

impl LocationField {
    pub const ALL: [LocationField; 5] = [
        LocationField::Department,
        LocationField::Municipality,
        LocationField::VotingStation,
        LocationField::PollingTable,
        LocationField::Address,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LocationField::Department => "department",
            LocationField::Municipality => "municipality",
            LocationField::VotingStation => "votingStation",
            LocationField::PollingTable => "pollingTable",
            LocationField::Address => "address",
        }
    }
}

impl Display for LocationField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The fields on which a claim and the authority disagree.
///
/// Only set semantics matter. At the persistence boundary it is written as a
/// JSON array of field names, and a missing or `null` value reads back as
/// the empty set.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Option<Vec<LocationField>>", into = "Vec<LocationField>")]
pub struct DiscrepancySet(BTreeSet<LocationField>);

impl DiscrepancySet {
    pub fn new() -> DiscrepancySet {
        DiscrepancySet(BTreeSet::new())
    }

    pub fn insert(&mut self, field: LocationField) -> bool {
        self.0.insert(field)
    }

    pub fn contains(&self, field: LocationField) -> bool {
        self.0.contains(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn clear(&mut self) {
        self.0.clear()
    }

    pub fn iter(&self) -> impl Iterator<Item = LocationField> + '_ {
        self.0.iter().copied()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Reads the persisted form. `None`, an empty string and `null` are the empty set.
    pub fn from_json(persisted: Option<&str>) -> Result<DiscrepancySet, serde_json::Error> {
        match persisted.map(str::trim) {
            None | Some("") => Ok(DiscrepancySet::new()),
            Some(s) => serde_json::from_str(s),
        }
    }
}

impl From<Option<Vec<LocationField>>> for DiscrepancySet {
    fn from(fields: Option<Vec<LocationField>>) -> Self {
        DiscrepancySet(fields.unwrap_or_default().into_iter().collect())
    }
}

impl From<DiscrepancySet> for Vec<LocationField> {
    fn from(set: DiscrepancySet) -> Self {
        set.0.into_iter().collect()
    }
}

impl FromIterator<LocationField> for DiscrepancySet {
    fn from_iter<I: IntoIterator<Item = LocationField>>(iter: I) -> Self {
        DiscrepancySet(iter.into_iter().collect())
    }
}

/// The location fields as entered by an operator or an import row.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationClaim {
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub municipality: Option<String>,
    #[serde(default)]
    pub voting_station: Option<String>,
    #[serde(default)]
    pub polling_table: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl LocationClaim {
    pub fn get(&self, field: LocationField) -> Option<&str> {
        match field {
            LocationField::Department => self.department.as_deref(),
            LocationField::Municipality => self.municipality.as_deref(),
            LocationField::VotingStation => self.voting_station.as_deref(),
            LocationField::PollingTable => self.polling_table.as_deref(),
            LocationField::Address => self.address.as_deref(),
        }
    }

    pub fn set(&mut self, field: LocationField, value: Option<String>) {
        let slot = match field {
            LocationField::Department => &mut self.department,
            LocationField::Municipality => &mut self.municipality,
            LocationField::VotingStation => &mut self.voting_station,
            LocationField::PollingTable => &mut self.polling_table,
            LocationField::Address => &mut self.address,
        };
        *slot = value;
    }

    /// True when no field carries a non-blank value.
    pub fn is_empty(&self) -> bool {
        LocationField::ALL
            .iter()
            .all(|f| self.get(*f).map_or(true, |v| v.trim().is_empty()))
    }
}

/// The location data held by the authority for one national ID.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorityRecord {
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub municipality: Option<String>,
    #[serde(default)]
    pub voting_station: Option<String>,
    #[serde(default)]
    pub polling_table: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl AuthorityRecord {
    pub fn get(&self, field: LocationField) -> Option<&str> {
        match field {
            LocationField::Department => self.department.as_deref(),
            LocationField::Municipality => self.municipality.as_deref(),
            LocationField::VotingStation => self.voting_station.as_deref(),
            LocationField::PollingTable => self.polling_table.as_deref(),
            LocationField::Address => self.address.as_deref(),
        }
    }
}

/// What the external authority answered for one lookup.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum VerificationResult {
    Found(AuthorityRecord),
    NotFound,
    /// The call did not complete successfully (transport, status, configuration).
    AuthorityError(String),
}

impl VerificationResult {
    pub fn is_found(&self) -> bool {
        matches!(self, VerificationResult::Found(_))
    }
}

/// The classification of one claim against one authority answer.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reconciliation {
    pub state: ValidationState,
    #[serde(default)]
    pub discrepancies: DiscrepancySet,
}

// ******** Voter records *********

pub type RecordId = u64;

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "Otro", alias = "OTRO", alias = "otro")]
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
            Gender::Other => "Otro",
        }
    }

    /// Reads `M`, `F` or `Otro` in any case. Anything else is not a gender.
    pub fn parse(label: &str) -> Option<Gender> {
        match label.trim().to_uppercase().as_str() {
            "M" => Some(Gender::Male),
            "F" => Some(Gender::Female),
            "OTRO" | "OTHER" => Some(Gender::Other),
            _ => None,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterRecord {
    pub id: RecordId,
    pub full_name: String,
    pub national_id: String,
    pub age: u32,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub phone: Option<String>,
    pub residence_address: String,
    #[serde(default)]
    pub leader_id: Option<u64>,
    #[serde(default)]
    pub location: LocationClaim,
    #[serde(default)]
    pub state: ValidationState,
    #[serde(default)]
    pub discrepancies: DiscrepancySet,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub registered_by: Option<String>,
}

/// A voter record before it is created. Optional fields get their defaults
/// from the `ImportRules` at creation time.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct VoterDraft {
    pub full_name: String,
    pub national_id: String,
    /// Signed so that a negative spreadsheet cell is rejected rather than dropped.
    pub age: Option<i64>,
    pub gender: Option<Gender>,
    pub phone: Option<String>,
    pub residence_address: Option<String>,
    pub leader_id: Option<u64>,
    pub location: LocationClaim,
    pub notes: Option<String>,
    pub registered_by: Option<String>,
}

/// A partial update of a stored record. `None` leaves a field untouched.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct RecordPatch {
    pub full_name: Option<String>,
    pub national_id: Option<String>,
    pub gender: Option<Option<Gender>>,
    pub phone: Option<Option<String>>,
    pub residence_address: Option<String>,
    pub location: Option<LocationClaim>,
    pub state: Option<ValidationState>,
    pub discrepancies: Option<DiscrepancySet>,
    pub notes: Option<Option<String>>,
}

impl RecordPatch {
    pub fn touches_location(&self) -> bool {
        self.location.is_some()
    }

    /// Applies the patch. Discrepancies only survive on records in `Revision`.
    pub fn apply_to(&self, record: &mut VoterRecord) {
        if let Some(name) = &self.full_name {
            record.full_name = name.clone();
        }
        if let Some(nid) = &self.national_id {
            record.national_id = nid.clone();
        }
        if let Some(gender) = self.gender {
            record.gender = gender;
        }
        if let Some(phone) = &self.phone {
            record.phone = phone.clone();
        }
        if let Some(address) = &self.residence_address {
            record.residence_address = address.clone();
        }
        if let Some(location) = &self.location {
            record.location = location.clone();
        }
        if let Some(state) = self.state {
            record.state = state;
        }
        if let Some(discrepancies) = &self.discrepancies {
            record.discrepancies = discrepancies.clone();
        }
        if let Some(notes) = &self.notes {
            record.notes = notes.clone();
        }
        if record.state != ValidationState::Revision {
            record.discrepancies.clear();
        }
    }
}

/// Selection of stored records. Unset criteria match everything.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct RecordFilter {
    pub state: Option<ValidationState>,
    pub municipality: Option<String>,
    pub leader_id: Option<u64>,
}

impl RecordFilter {
    pub fn matches(&self, record: &VoterRecord) -> bool {
        if let Some(state) = self.state {
            if record.state != state {
                return false;
            }
        }
        if let Some(municipality) = &self.municipality {
            let wanted = crate::normalize::canonical_text(municipality);
            let actual = record
                .location
                .municipality
                .as_deref()
                .map(crate::normalize::canonical_text);
            if actual.as_deref() != Some(wanted.as_str()) {
                return false;
            }
        }
        if let Some(leader_id) = self.leader_id {
            if record.leader_id != Some(leader_id) {
                return false;
            }
        }
        true
    }
}

/// The error report of one bulk import, kept for later export.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportIncident {
    pub leader_id: u64,
    #[serde(default)]
    pub file_name: Option<String>,
    pub created: usize,
    pub total_rows: usize,
    pub errors: Vec<String>,
}

// ********* Configuration **********

/// The field validation rules shared by registration and bulk import.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportRules {
    /// Shortest accepted full name, in characters.
    pub min_name_chars: usize,
    pub min_age: u32,
    pub max_age: u32,
    /// Age stored when none was provided.
    pub default_age: u32,
    pub min_id_digits: usize,
    pub max_id_digits: usize,
    pub phone_digits: usize,
    /// Leading digit of mobile numbers.
    pub phone_prefix: char,
    /// Residence address stored when none was provided.
    pub default_residence: Cow<'static, str>,
}

impl ImportRules {
    pub const DEFAULT_RULES: ImportRules = ImportRules {
        min_name_chars: 2,
        min_age: 18,
        max_age: 120,
        default_age: 18,
        min_id_digits: 6,
        max_id_digits: 10,
        phone_digits: 10,
        phone_prefix: '3',
        default_residence: Cow::Borrowed("Por definir"),
    };
}

impl Default for ImportRules {
    fn default() -> Self {
        ImportRules::DEFAULT_RULES
    }
}

/// Switches of the verification flow, passed in at construction.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlowSettings {
    /// When off, the authority is never called and records stay `Unverified`.
    pub enabled: bool,
    /// Call the authority for every valid row of a bulk import.
    pub verify_on_import: bool,
}

impl FlowSettings {
    pub const DEFAULT_SETTINGS: FlowSettings = FlowSettings {
        enabled: true,
        verify_on_import: false,
    };
}

impl Default for FlowSettings {
    fn default() -> Self {
        FlowSettings::DEFAULT_SETTINGS
    }
}

/// Errors that indicate a defect in the calling code or a refused write.
///
/// Bad external data never ends up here: authority failures become
/// `ValidationState::Inconsistent` and import rows are reported as messages.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum RegistryError {
    EmptyName,
    /// The name, then the minimum length.
    ShortName(String, usize),
    EmptyNationalId,
    /// The value, then the allowed digit counts.
    InvalidNationalId(String, usize, usize),
    /// The value, then the allowed bounds.
    InvalidAge(i64, u32, u32),
    /// An age cell that is not a number.
    UnreadableAge(String),
    /// The value, then the expected length and leading digit.
    InvalidPhone(String, usize, char),
    DuplicateNationalId(String),
    RecordNotFound(RecordId),
    Store(String),
}

impl Error for RegistryError {}

impl Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::EmptyName => write!(f, "name is empty"),
            RegistryError::ShortName(name, min) => {
                write!(f, "name {:?} must have at least {} characters", name, min)
            }
            RegistryError::EmptyNationalId => write!(f, "national ID is empty"),
            RegistryError::InvalidNationalId(nid, min, max) => {
                write!(f, "national ID {:?} must have {}-{} digits", nid, min, max)
            }
            RegistryError::InvalidAge(age, min, max) => {
                write!(f, "age {} must be between {} and {}", age, min, max)
            }
            RegistryError::UnreadableAge(cell) => write!(f, "age {:?} is not a number", cell),
            RegistryError::InvalidPhone(phone, digits, prefix) => write!(
                f,
                "phone {:?} must have {} digits and start with {}",
                phone, digits, prefix
            ),
            RegistryError::DuplicateNationalId(nid) => {
                write!(f, "national ID {} already registered", nid)
            }
            RegistryError::RecordNotFound(id) => write!(f, "record {} not found", id),
            RegistryError::Store(msg) => write!(f, "store failure: {}", msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discrepancies_roundtrip_as_field_names() {
        let set: DiscrepancySet = [LocationField::PollingTable, LocationField::Department]
            .into_iter()
            .collect();
        let js = set.to_json().unwrap();
        assert_eq!(js, r#"["department","pollingTable"]"#);
        assert_eq!(DiscrepancySet::from_json(Some(&js)).unwrap(), set);
    }

    #[test]
    fn discrepancies_absent_or_null_are_empty() {
        assert!(DiscrepancySet::from_json(None).unwrap().is_empty());
        assert!(DiscrepancySet::from_json(Some("null")).unwrap().is_empty());
        assert!(DiscrepancySet::from_json(Some("  ")).unwrap().is_empty());

        let r: Reconciliation = serde_json::from_str(r#"{"state":"verified"}"#).unwrap();
        assert!(r.discrepancies.is_empty());
        let r: Reconciliation =
            serde_json::from_str(r#"{"state":"revision","discrepancies":null}"#).unwrap();
        assert!(r.discrepancies.is_empty());
    }

    #[test]
    fn states_accept_legacy_labels() {
        let s: ValidationState = serde_json::from_str(r#""sin_verificar""#).unwrap();
        assert_eq!(s, ValidationState::Unverified);
        assert_eq!(
            ValidationState::parse("Inconsistente"),
            Some(ValidationState::Inconsistent)
        );
        assert_eq!(ValidationState::parse("pending"), None);
        assert_eq!(
            serde_json::to_string(&ValidationState::Verified).unwrap(),
            r#""verified""#
        );
    }

    #[test]
    fn patch_drops_discrepancies_outside_revision() {
        let mut record = VoterRecord {
            id: 1,
            full_name: "ANA".to_string(),
            national_id: "1234567".to_string(),
            age: 30,
            gender: None,
            phone: None,
            residence_address: "Por definir".to_string(),
            leader_id: None,
            location: LocationClaim::default(),
            state: ValidationState::Revision,
            discrepancies: [LocationField::Municipality].into_iter().collect(),
            notes: None,
            registered_by: None,
        };
        let patch = RecordPatch {
            state: Some(ValidationState::Verified),
            ..RecordPatch::default()
        };
        patch.apply_to(&mut record);
        assert_eq!(record.state, ValidationState::Verified);
        assert!(record.discrepancies.is_empty());
    }

    #[test]
    fn rules_overrides_keep_defaults() {
        let rules: ImportRules = serde_json::from_str(r#"{"maxAge": 99}"#).unwrap();
        assert_eq!(rules.max_age, 99);
        assert_eq!(rules.min_age, 18);
        assert_eq!(rules.default_residence, "Por definir");
        assert_eq!(rules.min_name_chars, 2);
    }

    #[test]
    fn gender_labels() {
        assert_eq!(Gender::parse(" otro "), Some(Gender::Other));
        assert_eq!(Gender::parse("m"), Some(Gender::Male));
        assert_eq!(Gender::parse("X"), None);
        assert_eq!(Gender::parse(""), None);
        let g: Gender = serde_json::from_str(r#""OTRO""#).unwrap();
        assert_eq!(g, Gender::Other);
        assert_eq!(serde_json::to_string(&Gender::Female).unwrap(), r#""F""#);
    }
}
