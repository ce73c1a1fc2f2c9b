use std::fs;
use std::path::{Path, PathBuf};

use canvass_core::flow::RecordStore;
use canvass_core::store::MemoryStore;
use canvass_core::{
    ImportIncident, RecordFilter, RecordId, RecordPatch, RegistryError, VoterRecord,
};

use crate::canvass::*;

/// The record store kept in a JSON file.
///
/// Changes are kept in memory until `save` is called.
pub struct JsonStore {
    path: PathBuf,
    inner: MemoryStore,
    dirty: bool,
}

impl JsonStore {
    /// Opens the store. A missing file is an empty store.
    pub fn open(path: &Path) -> CanvassResult<JsonStore> {
        let p = path.display().to_string();
        let inner = if path.exists() {
            let contents = fs::read_to_string(path).context(OpeningFileSnafu { path: p.clone() })?;
            serde_json::from_str(&contents).context(ParsingJsonSnafu { path: p })?
        } else {
            info!("The record store {:?} does not exist yet", path);
            MemoryStore::new()
        };
        debug!("JsonStore::open: {:?}: {} records", path, inner.len());
        Ok(JsonStore {
            path: path.to_path_buf(),
            inner,
            dirty: false,
        })
    }

    pub fn incidents(&self) -> &[ImportIncident] {
        self.inner.incidents()
    }

    /// Writes the store back when something changed.
    pub fn save(&mut self) -> CanvassResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let js = serde_json::to_string_pretty(&self.inner).context(WritingJsonSnafu {})?;
        let p = self.path.display().to_string();
        fs::write(&self.path, js).context(WritingFileSnafu { path: p })?;
        debug!("JsonStore::save: {:?}", self.path);
        self.dirty = false;
        Ok(())
    }
}

impl RecordStore for JsonStore {
    fn create(&mut self, record: VoterRecord) -> Result<VoterRecord, RegistryError> {
        let res = self.inner.create(record)?;
        self.dirty = true;
        Ok(res)
    }

    fn patch(&mut self, id: RecordId, patch: &RecordPatch) -> Result<VoterRecord, RegistryError> {
        let res = self.inner.patch(id, patch)?;
        self.dirty = true;
        Ok(res)
    }

    fn get(&self, id: RecordId) -> Result<Option<VoterRecord>, RegistryError> {
        self.inner.get(id)
    }

    fn list(&self, filter: &RecordFilter) -> Result<Vec<VoterRecord>, RegistryError> {
        self.inner.list(filter)
    }

    fn find_by_national_id(
        &self,
        national_id: &str,
    ) -> Result<Option<VoterRecord>, RegistryError> {
        self.inner.find_by_national_id(national_id)
    }

    fn record_incident(&mut self, incident: ImportIncident) -> Result<(), RegistryError> {
        self.inner.record_incident(incident)?;
        self.dirty = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvass_core::{LocationField, ValidationState};

    #[test]
    fn records_survive_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        let mut store = JsonStore::open(&path).unwrap();
        assert!(store.list(&RecordFilter::default()).unwrap().is_empty());
        let rec = store
            .create(VoterRecord {
                id: 0,
                full_name: "ANA".to_string(),
                national_id: "1234567".to_string(),
                age: 30,
                gender: None,
                phone: None,
                residence_address: "Por definir".to_string(),
                leader_id: Some(3),
                location: Default::default(),
                state: ValidationState::Revision,
                discrepancies: [LocationField::PollingTable].into_iter().collect(),
                notes: None,
                registered_by: None,
            })
            .unwrap();
        store.save().unwrap();

        let reopened = JsonStore::open(&path).unwrap();
        assert_eq!(reopened.get(rec.id).unwrap(), Some(rec));
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains(r#""pollingTable""#));
    }

    #[test]
    fn reads_legacy_labels_and_null_discrepancies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        fs::write(
            &path,
            r#"{"records": [{"id": 4, "fullName": "LUIS", "nationalId": "7654321", "age": 40,
                "residenceAddress": "CALLE 1", "state": "inconsistente", "discrepancies": null}]}"#,
        )
        .unwrap();
        let store = JsonStore::open(&path).unwrap();
        let rec = store.get(4).unwrap().unwrap();
        assert_eq!(rec.state, ValidationState::Inconsistent);
        assert!(rec.discrepancies.is_empty());
        assert!(rec.location.is_empty());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            JsonStore::open(&path),
            Err(CanvassError::ParsingJson { .. })
        ));
    }
}
