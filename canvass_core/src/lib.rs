mod config;
pub mod builder;
pub mod bulk;
pub mod flow;
pub mod manual;
pub mod normalize;
pub mod store;
pub mod territory;

use log::debug;

pub use crate::config::*;
use crate::normalize::comparable;
use crate::territory::TerritoryIndex;

// Compares one field. `None` when the claim does not carry the field, in which
// case it neither matches nor mismatches.
fn field_matches(claimed: Option<&str>, authority: Option<&str>) -> Option<bool> {
    let claimed = comparable(claimed?);
    if claimed.is_empty() {
        return None;
    }
    let authority = authority.map(comparable).unwrap_or_default();
    Some(claimed == authority)
}

/// Classifies a claim against the answer of the authority.
///
/// * the authority did not find the ID, or failed: `Inconsistent`
/// * at least one supplied field differs (ignoring case and surrounding
///   whitespace): `Revision`, with the differing fields
/// * otherwise `Verified`, including when the claim supplies no field at all
///
/// This function never calls the authority itself.
///
/// ```
/// use canvass_core::*;
///
/// let claim = LocationClaim {
///     municipality: Some("pasto".to_string()),
///     polling_table: Some("4".to_string()),
///     ..LocationClaim::default()
/// };
/// let found = VerificationResult::Found(AuthorityRecord {
///     municipality: Some("PASTO".to_string()),
///     polling_table: Some("7".to_string()),
///     ..AuthorityRecord::default()
/// });
/// let res = reconcile(&claim, &found);
/// assert_eq!(res.state, ValidationState::Revision);
/// assert!(res.discrepancies.contains(LocationField::PollingTable));
/// assert_eq!(res.discrepancies.len(), 1);
/// ```
pub fn reconcile(claim: &LocationClaim, authority: &VerificationResult) -> Reconciliation {
    let record = match authority {
        VerificationResult::Found(record) => record,
        VerificationResult::NotFound | VerificationResult::AuthorityError(_) => {
            debug!("reconcile: authority answer {:?}", authority);
            return Reconciliation {
                state: ValidationState::Inconsistent,
                discrepancies: DiscrepancySet::new(),
            };
        }
    };

    let discrepancies: DiscrepancySet = LocationField::ALL
        .iter()
        .filter(|field| field_matches(claim.get(**field), record.get(**field)) == Some(false))
        .copied()
        .collect();
    debug!(
        "reconcile: claim: {:?} authority: {:?} discrepancies: {:?}",
        claim, record, discrepancies
    );

    let state = if discrepancies.is_empty() {
        ValidationState::Verified
    } else {
        ValidationState::Revision
    };
    Reconciliation {
        state,
        discrepancies,
    }
}

/// Replaces the claim values by the spelling of the reference listing when a
/// case-insensitive exact match exists. Values without a match are kept.
///
/// The hierarchy is followed: a municipality is only looked up inside the
/// matched department, and so on.
pub fn canonicalize_claim(claim: &LocationClaim, index: &TerritoryIndex) -> LocationClaim {
    let mut res = claim.clone();
    let department = match claim
        .department
        .as_deref()
        .and_then(|d| index.canonical_department(d))
    {
        Some(d) => d,
        None => return res,
    };
    res.department = Some(department.to_string());

    let municipality = match claim
        .municipality
        .as_deref()
        .and_then(|m| index.canonical_municipality(department, m))
    {
        Some(m) => m,
        None => return res,
    };
    res.municipality = Some(municipality.to_string());

    let station = match claim
        .voting_station
        .as_deref()
        .and_then(|s| index.canonical_station(department, municipality, s))
    {
        Some(s) => s,
        None => return res,
    };
    res.voting_station = Some(station.to_string());

    if let Some(address) = claim
        .address
        .as_deref()
        .and_then(|a| index.canonical_address(department, municipality, station, a))
    {
        res.address = Some(address.to_string());
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(s: &str) -> Option<String> {
        Some(s.to_string())
    }

    fn authority() -> AuthorityRecord {
        AuthorityRecord {
            department: some("NARIÑO"),
            municipality: some("PASTO"),
            voting_station: some("COLEGIO CENTRAL"),
            polling_table: some("4"),
            address: some("CRA 24 # 18-50"),
        }
    }

    fn full_claim() -> LocationClaim {
        LocationClaim {
            department: some("Nariño"),
            municipality: some(" pasto "),
            voting_station: some("colegio central"),
            polling_table: some("4"),
            address: some("cra 24 # 18-50"),
        }
    }

    #[test]
    fn empty_claim_is_verified() {
        let res = reconcile(
            &LocationClaim::default(),
            &VerificationResult::Found(authority()),
        );
        assert_eq!(res.state, ValidationState::Verified);
        assert!(res.discrepancies.is_empty());

        let blank = LocationClaim {
            department: some("   "),
            polling_table: some(""),
            ..LocationClaim::default()
        };
        let res = reconcile(&blank, &VerificationResult::Found(authority()));
        assert_eq!(res.state, ValidationState::Verified);
    }

    #[test]
    fn matching_claim_ignores_case_and_whitespace() {
        let res = reconcile(&full_claim(), &VerificationResult::Found(authority()));
        assert_eq!(res.state, ValidationState::Verified);
        assert!(res.discrepancies.is_empty());
    }

    #[test]
    fn each_single_mismatch_is_reported_alone() {
        for field in LocationField::ALL.iter() {
            let mut claim = full_claim();
            claim.set(*field, some("SOMETHING ELSE"));
            let res = reconcile(&claim, &VerificationResult::Found(authority()));
            assert_eq!(res.state, ValidationState::Revision, "field {}", field);
            let expected: DiscrepancySet = [*field].into_iter().collect();
            assert_eq!(res.discrepancies, expected);

            // Other fields absent instead of matching: same outcome.
            let mut partial = LocationClaim::default();
            partial.set(*field, some("SOMETHING ELSE"));
            let res = reconcile(&partial, &VerificationResult::Found(authority()));
            assert_eq!(res.discrepancies, expected);
        }
    }

    #[test]
    fn claimed_value_missing_at_authority_is_a_mismatch() {
        let record = AuthorityRecord {
            polling_table: None,
            ..authority()
        };
        let claim = LocationClaim {
            polling_table: some("12"),
            ..LocationClaim::default()
        };
        let res = reconcile(&claim, &VerificationResult::Found(record));
        assert_eq!(res.state, ValidationState::Revision);
        assert!(res.discrepancies.contains(LocationField::PollingTable));
    }

    #[test]
    fn not_found_or_failure_is_inconsistent() {
        for answer in [
            VerificationResult::NotFound,
            VerificationResult::AuthorityError("timeout".to_string()),
        ]
        .iter()
        {
            for claim in [LocationClaim::default(), full_claim()].iter() {
                let res = reconcile(claim, answer);
                assert_eq!(res.state, ValidationState::Inconsistent);
                assert!(res.discrepancies.is_empty());
            }
        }
    }

    #[test]
    fn reconcile_is_deterministic() {
        let mut claim = full_claim();
        claim.municipality = some("IPIALES");
        claim.address = some("CALLE 1");
        let answer = VerificationResult::Found(authority());
        let first = reconcile(&claim, &answer);
        let second = reconcile(&claim, &answer);
        assert_eq!(first, second);
        assert_eq!(first.discrepancies.len(), 2);
    }

    #[test]
    fn claims_take_the_listing_spelling() {
        let index = territory::load(
            "d,m,s,x,a\nNariño,Pasto,Colegio Central,1,Cra 1\nNariño,Ipiales,Escuela Norte,1,Cl 2\n",
        );
        let claim = LocationClaim {
            department: some("NARIÑO"),
            municipality: some("pasto"),
            voting_station: some("COLEGIO CENTRAL"),
            polling_table: some("3"),
            address: some("CRA 1"),
        };
        let res = canonicalize_claim(&claim, &index);
        assert_eq!(res.department, some("Nariño"));
        assert_eq!(res.municipality, some("Pasto"));
        assert_eq!(res.voting_station, some("Colegio Central"));
        assert_eq!(res.address, some("Cra 1"));
        assert_eq!(res.polling_table, some("3"));

        // The station belongs to another municipality: left as typed.
        let claim = LocationClaim {
            department: some("nariño"),
            municipality: some("ipiales"),
            voting_station: some("colegio central"),
            ..LocationClaim::default()
        };
        let res = canonicalize_claim(&claim, &index);
        assert_eq!(res.municipality, some("Ipiales"));
        assert_eq!(res.voting_station, some("colegio central"));
    }
}
