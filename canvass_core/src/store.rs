use log::debug;
use serde::{Deserialize, Serialize};

use crate::flow::RecordStore;
use crate::{ImportIncident, RecordFilter, RecordId, RecordPatch, RegistryError, VoterRecord};

/// A `RecordStore` holding everything in memory.
///
/// It serializes to a plain JSON document, which is how the command line
/// tool persists it between runs.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    #[serde(default)]
    records: Vec<VoterRecord>,
    #[serde(default)]
    incidents: Vec<ImportIncident>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn incidents(&self) -> &[ImportIncident] {
        &self.incidents
    }

    fn next_id(&self) -> RecordId {
        self.records.iter().map(|r| r.id).max().unwrap_or(0) + 1
    }

    fn position(&self, id: RecordId) -> Option<usize> {
        self.records.iter().position(|r| r.id == id)
    }
}

impl RecordStore for MemoryStore {
    fn create(&mut self, record: VoterRecord) -> Result<VoterRecord, RegistryError> {
        if self.find_by_national_id(&record.national_id)?.is_some() {
            return Err(RegistryError::DuplicateNationalId(record.national_id));
        }
        let stored = VoterRecord {
            id: self.next_id(),
            ..record
        };
        debug!("MemoryStore::create: {:?}", stored);
        self.records.push(stored.clone());
        Ok(stored)
    }

    fn patch(&mut self, id: RecordId, patch: &RecordPatch) -> Result<VoterRecord, RegistryError> {
        if let Some(nid) = &patch.national_id {
            if self
                .records
                .iter()
                .any(|r| r.id != id && r.national_id == *nid)
            {
                return Err(RegistryError::DuplicateNationalId(nid.clone()));
            }
        }
        let pos = self.position(id).ok_or(RegistryError::RecordNotFound(id))?;
        let record = &mut self.records[pos];
        patch.apply_to(record);
        debug!("MemoryStore::patch: {:?}", record);
        Ok(record.clone())
    }

    fn get(&self, id: RecordId) -> Result<Option<VoterRecord>, RegistryError> {
        Ok(self.position(id).map(|pos| self.records[pos].clone()))
    }

    fn list(&self, filter: &RecordFilter) -> Result<Vec<VoterRecord>, RegistryError> {
        Ok(self
            .records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    fn find_by_national_id(
        &self,
        national_id: &str,
    ) -> Result<Option<VoterRecord>, RegistryError> {
        Ok(self
            .records
            .iter()
            .find(|r| r.national_id == national_id)
            .cloned())
    }

    fn record_incident(&mut self, incident: ImportIncident) -> Result<(), RegistryError> {
        self.incidents.push(incident);
        Ok(())
    }
}
