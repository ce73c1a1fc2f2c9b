//! The verify-then-save orchestration.
//!
//! Registration, the revision queue editor, ad-hoc re-verification and the
//! bulk import all go through `VerificationFlow`, so validation, duplicate
//! checks and reconciliation happen in one place. The flow talks to the
//! outside world through two collaborators: an `Authority` answering lookups
//! and a `RecordStore` persisting records.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::normalize::{canonical_opt, canonical_text};
use crate::territory::TerritoryIndex;
use crate::{
    canonicalize_claim, reconcile, DiscrepancySet, FlowSettings, ImportIncident, ImportRules,
    LocationClaim, LocationField, Reconciliation, RecordFilter, RecordId, RecordPatch,
    RegistryError, ValidationState, VerificationResult, VoterDraft, VoterRecord,
};

/// The external registry that knows where each national ID votes.
///
/// Implementations never fail: transport errors, refused credentials and bad
/// answers are all reported as `VerificationResult::AuthorityError`.
pub trait Authority {
    fn verify(&self, national_id: &str, claim: &LocationClaim) -> VerificationResult;
}

/// An authority that is not configured. Every lookup fails.
pub struct NoAuthority;

impl Authority for NoAuthority {
    fn verify(&self, _national_id: &str, _claim: &LocationClaim) -> VerificationResult {
        VerificationResult::AuthorityError("no verification authority configured".to_string())
    }
}

/// The persistence collaborator.
pub trait RecordStore {
    /// Stores a new record. The id of the argument is ignored and the stored
    /// record, with its assigned id, is returned.
    fn create(&mut self, record: VoterRecord) -> Result<VoterRecord, RegistryError>;

    fn patch(&mut self, id: RecordId, patch: &RecordPatch) -> Result<VoterRecord, RegistryError>;

    fn get(&self, id: RecordId) -> Result<Option<VoterRecord>, RegistryError>;

    fn list(&self, filter: &RecordFilter) -> Result<Vec<VoterRecord>, RegistryError>;

    fn find_by_national_id(&self, national_id: &str)
        -> Result<Option<VoterRecord>, RegistryError>;

    fn record_incident(&mut self, incident: ImportIncident) -> Result<(), RegistryError>;
}

const NO_PHONE_MARKERS: &[&str] = &["NO TIENE", "NO TIENE CELULAR"];

/// Removes the separators people type inside ID numbers (spaces, dots).
pub fn clean_national_id(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .collect()
}

/// `None` for a blank phone or one of the "has no phone" markers. Spaces are removed.
pub fn clean_phone(raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    if NO_PHONE_MARKERS.contains(&canonical_text(raw).as_str()) {
        return None;
    }
    let res: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if res.is_empty() {
        None
    } else {
        Some(res)
    }
}

fn check_name(raw: &str, rules: &ImportRules) -> Result<String, RegistryError> {
    let name = canonical_text(raw);
    if name.is_empty() {
        return Err(RegistryError::EmptyName);
    }
    if name.chars().count() < rules.min_name_chars {
        return Err(RegistryError::ShortName(name, rules.min_name_chars));
    }
    Ok(name)
}

fn check_national_id(national_id: &str, rules: &ImportRules) -> Result<(), RegistryError> {
    if national_id.is_empty() {
        return Err(RegistryError::EmptyNationalId);
    }
    let digits = national_id.chars().count();
    if !national_id.chars().all(|c| c.is_ascii_digit())
        || digits < rules.min_id_digits
        || digits > rules.max_id_digits
    {
        return Err(RegistryError::InvalidNationalId(
            national_id.to_string(),
            rules.min_id_digits,
            rules.max_id_digits,
        ));
    }
    Ok(())
}

fn check_phone(phone: &str, rules: &ImportRules) -> Result<(), RegistryError> {
    let valid = phone.chars().all(|c| c.is_ascii_digit())
        && phone.chars().count() == rules.phone_digits
        && phone.starts_with(rules.phone_prefix);
    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidPhone(
            phone.to_string(),
            rules.phone_digits,
            rules.phone_prefix,
        ))
    }
}

fn clean_notes(notes: Option<&str>) -> Option<String> {
    notes.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Validates a draft and turns it into a record ready to be stored.
///
/// Text values are canonicalized and the defaults of `rules` fill the missing
/// age and residence address. The record is `Unverified` with id 0.
pub fn prepare_record(draft: &VoterDraft, rules: &ImportRules) -> Result<VoterRecord, RegistryError> {
    let full_name = check_name(&draft.full_name, rules)?;
    let national_id = clean_national_id(&draft.national_id);
    check_national_id(&national_id, rules)?;
    let age = match draft.age {
        None => rules.default_age,
        Some(age) => match u32::try_from(age) {
            Ok(a) if a >= rules.min_age && a <= rules.max_age => a,
            _ => return Err(RegistryError::InvalidAge(age, rules.min_age, rules.max_age)),
        },
    };
    let phone = clean_phone(draft.phone.as_deref());
    if let Some(p) = &phone {
        check_phone(p, rules)?;
    }

    Ok(VoterRecord {
        id: 0,
        full_name,
        national_id,
        age,
        gender: draft.gender,
        phone,
        residence_address: canonical_opt(draft.residence_address.as_deref())
            .unwrap_or_else(|| rules.default_residence.to_string()),
        leader_id: draft.leader_id,
        location: canonical_claim(&draft.location),
        state: ValidationState::Unverified,
        discrepancies: Default::default(),
        notes: clean_notes(draft.notes.as_deref()),
        registered_by: draft.registered_by.clone(),
    })
}

fn canonical_claim(claim: &LocationClaim) -> LocationClaim {
    let mut res = LocationClaim::default();
    for field in LocationField::ALL.iter() {
        res.set(*field, canonical_opt(claim.get(*field)));
    }
    res
}

fn ensure_unique(
    store: &dyn RecordStore,
    national_id: &str,
    except: Option<RecordId>,
) -> Result<(), RegistryError> {
    match store.find_by_national_id(national_id)? {
        Some(existing) if Some(existing.id) != except => {
            Err(RegistryError::DuplicateNationalId(national_id.to_string()))
        }
        _ => Ok(()),
    }
}

/// Runs the verification actions against an authority and a store.
///
/// The authority is called at most once per action.
pub struct VerificationFlow<'a> {
    authority: &'a dyn Authority,
    territory: Option<Arc<TerritoryIndex>>,
    settings: FlowSettings,
    rules: ImportRules,
}

impl<'a> VerificationFlow<'a> {
    pub fn new(
        authority: &'a dyn Authority,
        settings: FlowSettings,
        rules: ImportRules,
    ) -> VerificationFlow<'a> {
        VerificationFlow {
            authority,
            territory: None,
            settings,
            rules,
        }
    }

    /// Claims are rewritten with the spelling of this index before being
    /// verified or stored.
    pub fn with_territory(mut self, index: Arc<TerritoryIndex>) -> VerificationFlow<'a> {
        self.territory = Some(index);
        self
    }

    pub fn settings(&self) -> &FlowSettings {
        &self.settings
    }

    pub fn rules(&self) -> &ImportRules {
        &self.rules
    }

    /// The form of a claim that gets verified and stored.
    pub fn storage_claim(&self, claim: &LocationClaim) -> LocationClaim {
        let claim = canonical_claim(claim);
        match &self.territory {
            Some(index) => canonicalize_claim(&claim, index),
            None => claim,
        }
    }

    /// Verifies a claim without saving anything.
    ///
    /// Malformed national IDs are refused before any lookup. Returns an
    /// `Unverified` reconciliation without calling the authority when
    /// verification is switched off.
    pub fn verify_claim(
        &self,
        national_id: &str,
        claim: &LocationClaim,
    ) -> Result<Reconciliation, RegistryError> {
        let national_id = clean_national_id(national_id);
        check_national_id(&national_id, &self.rules)?;
        if !self.settings.enabled {
            info!("verify_claim: verification disabled, {} stays unverified", national_id);
            return Ok(Reconciliation::default());
        }
        let claim = self.storage_claim(claim);
        let answer = self.authority.verify(&national_id, &claim);
        if let VerificationResult::AuthorityError(reason) = &answer {
            warn!("verify_claim: authority failed for {}: {}", national_id, reason);
        }
        let res = reconcile(&claim, &answer);
        debug!("verify_claim: {} -> {:?}", national_id, res);
        Ok(res)
    }

    /// The creation path shared by registration and bulk import.
    ///
    /// The record is checked, optionally verified, then stored once.
    pub fn create_record(
        &self,
        store: &mut dyn RecordStore,
        draft: &VoterDraft,
        verify: bool,
    ) -> Result<VoterRecord, RegistryError> {
        let mut record = prepare_record(draft, &self.rules)?;
        record.location = self.storage_claim(&record.location);
        ensure_unique(store, &record.national_id, None)?;
        if verify && self.settings.enabled {
            let res = self.verify_claim(&record.national_id, &record.location)?;
            record.state = res.state;
            record.discrepancies = res.discrepancies;
        }
        let created = store.create(record)?;
        debug!(
            "create_record: id: {} national_id: {} state: {}",
            created.id, created.national_id, created.state
        );
        Ok(created)
    }

    /// Registration form. Without `verify` the record is saved `Unverified`.
    pub fn register(
        &self,
        store: &mut dyn RecordStore,
        draft: &VoterDraft,
        verify: bool,
    ) -> Result<VoterRecord, RegistryError> {
        self.create_record(store, draft, verify)
    }

    /// Verifies a stored record again and persists the outcome.
    pub fn reverify(
        &self,
        store: &mut dyn RecordStore,
        id: RecordId,
    ) -> Result<VoterRecord, RegistryError> {
        let record = store.get(id)?.ok_or(RegistryError::RecordNotFound(id))?;
        if !self.settings.enabled {
            info!("reverify: verification disabled, record {} unchanged", id);
            return Ok(record);
        }
        ensure_unique(store, &record.national_id, Some(id))?;
        let res = self.verify_claim(&record.national_id, &record.location)?;
        let patch = RecordPatch {
            state: Some(res.state),
            discrepancies: Some(res.discrepancies),
            ..RecordPatch::default()
        };
        store.patch(id, &patch)
    }

    /// Edits a stored record.
    ///
    /// A changed location on a record in `Revision` or `Inconsistent` is
    /// verified again; its outcome replaces the previous state and
    /// discrepancies. With verification disabled such a record goes back to
    /// `Unverified`. Other edits never call the authority.
    pub fn edit(
        &self,
        store: &mut dyn RecordStore,
        id: RecordId,
        patch: &RecordPatch,
    ) -> Result<VoterRecord, RegistryError> {
        let current = store.get(id)?.ok_or(RegistryError::RecordNotFound(id))?;
        let mut patch = patch.clone();

        if let Some(name) = &patch.full_name {
            patch.full_name = Some(check_name(name, &self.rules)?);
        }
        if let Some(nid) = &patch.national_id {
            let nid = clean_national_id(nid);
            check_national_id(&nid, &self.rules)?;
            ensure_unique(store, &nid, Some(id))?;
            patch.national_id = Some(nid);
        }
        if let Some(phone) = &patch.phone {
            let phone = clean_phone(phone.as_deref());
            if let Some(p) = &phone {
                check_phone(p, &self.rules)?;
            }
            patch.phone = Some(phone);
        }
        if let Some(address) = &patch.residence_address {
            patch.residence_address = Some(
                canonical_opt(Some(address.as_str()))
                    .unwrap_or_else(|| self.rules.default_residence.to_string()),
            );
        }
        if let Some(notes) = &patch.notes {
            patch.notes = Some(clean_notes(notes.as_deref()));
        }
        if let Some(location) = &patch.location {
            patch.location = Some(self.storage_claim(location));
        }

        let location_changed = patch
            .location
            .as_ref()
            .map_or(false, |l| *l != current.location);
        if location_changed
            && current.state.reverifies_on_location_edit()
            && !self.settings.enabled
        {
            // The previous outcome described the old location.
            info!(
                "edit: record {} location changed with verification disabled, {} -> {}",
                id,
                current.state,
                ValidationState::Unverified
            );
            patch.state = Some(ValidationState::Unverified);
            patch.discrepancies = Some(DiscrepancySet::new());
        } else if location_changed && current.state.reverifies_on_location_edit() {
            let national_id = patch
                .national_id
                .clone()
                .unwrap_or_else(|| current.national_id.clone());
            let location = patch.location.clone().unwrap_or_default();
            let res = self.verify_claim(&national_id, &location)?;
            info!(
                "edit: record {} location changed, {} -> {}",
                id, current.state, res.state
            );
            patch.state = Some(res.state);
            patch.discrepancies = Some(res.discrepancies);
        }
        store.patch(id, &patch)
    }
}
