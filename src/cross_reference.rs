// =============================================================================
// cross_reference.rs - HAVE WE SEEN THESE PEOPLE BEFORE?
// =============================================================================
//
// A claim under review names a petitioner and the petitioner's advocate. The
// case store holds every litigation record scraped so far. We look both names
// up by case-insensitive substring and report three lists:
//
//   petitioner_matches  petitioner field contains the petitioner name
//   advocate_matches    petitioner_advocate field contains the advocate name
//   common_matches      both at once (the same lawyer filing for the same
//                       claimant again is the interesting one)
//
// Every list is always there, empty when nothing matched. The store is
// read-only here, so concurrent lookups need no locking.
// =============================================================================

use std::path::Path;

use tracing::info;

use crate::error::{Result, SleuthError};
use crate::models::{CaseDetails, CrossReference};

/// Read access to previously scraped case records.
pub trait CaseStore: Send + Sync {
    fn cases(&self) -> &[CaseDetails];
}

/// A case store loaded from a JSON array of `CaseDetails`.
#[derive(Debug, Clone, Default)]
pub struct JsonCaseStore {
    cases: Vec<CaseDetails>,
}

impl JsonCaseStore {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SleuthError::Store(format!("cannot read {}: {e}", path.display())))?;
        let store = Self::from_json_str(&raw)?;
        info!(path = %path.display(), cases = store.cases.len(), "Case store loaded");
        Ok(store)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let cases = serde_json::from_str(raw)
            .map_err(|e| SleuthError::Store(format!("case store is not a JSON array of cases: {e}")))?;
        Ok(Self { cases })
    }

    #[cfg(test)]
    pub fn from_cases(cases: Vec<CaseDetails>) -> Self {
        Self { cases }
    }
}

impl CaseStore for JsonCaseStore {
    fn cases(&self) -> &[CaseDetails] {
        &self.cases
    }
}

/// Lowercased needle, or `None` when there is nothing to look for. An empty
/// needle would otherwise match every record in the store.
fn needle(name: Option<&str>) -> Option<String> {
    name.map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_lowercase)
}

fn field_contains(field: &Option<String>, needle: &str) -> bool {
    field
        .as_deref()
        .is_some_and(|value| value.to_lowercase().contains(needle))
}

pub fn cross_reference(
    store: &dyn CaseStore,
    petitioner_name: Option<&str>,
    advocate_name: Option<&str>,
) -> CrossReference {
    let petitioner = needle(petitioner_name);
    let advocate = needle(advocate_name);

    let mut result = CrossReference::default();
    for case in store.cases() {
        let petitioner_hit = petitioner
            .as_deref()
            .is_some_and(|n| field_contains(&case.petitioner, n));
        let advocate_hit = advocate
            .as_deref()
            .is_some_and(|n| field_contains(&case.petitioner_advocate, n));

        if petitioner_hit {
            result.petitioner_matches.push(case.clone());
        }
        if advocate_hit {
            result.advocate_matches.push(case.clone());
        }
        if petitioner_hit && advocate_hit {
            result.common_matches.push(case.clone());
        }
    }

    info!(
        petitioner_matches = result.petitioner_matches.len(),
        advocate_matches = result.advocate_matches.len(),
        common_matches = result.common_matches.len(),
        "Cross-reference complete"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(petitioner: &str, advocate: &str) -> CaseDetails {
        CaseDetails {
            petitioner: Some(petitioner.into()),
            petitioner_advocate: Some(advocate.into()),
            ..Default::default()
        }
    }

    fn store() -> JsonCaseStore {
        JsonCaseStore::from_cases(vec![
            case("Asha Verma", "R. K. Mehta"),
            case("Smt. ASHA VERMA and others", "P. Nair"),
            case("Vikram Singh", "R. K. Mehta"),
        ])
    }

    #[test]
    fn test_petitioner_hits_with_no_advocate_hits() {
        let result = cross_reference(&store(), Some("asha verma"), Some("Shah"));
        assert_eq!(result.petitioner_matches.len(), 2);
        assert!(result.advocate_matches.is_empty());
        assert!(result.common_matches.is_empty());
    }

    #[test]
    fn test_common_matches_need_both_names() {
        let result = cross_reference(&store(), Some("Asha"), Some("mehta"));
        assert_eq!(result.petitioner_matches.len(), 2);
        assert_eq!(result.advocate_matches.len(), 2);
        assert_eq!(result.common_matches.len(), 1);
        assert_eq!(result.common_matches[0].petitioner.as_deref(), Some("Asha Verma"));
    }

    #[test]
    fn test_missing_or_blank_names_match_nothing() {
        let result = cross_reference(&store(), None, Some("  "));
        assert_eq!(result, CrossReference::default());
    }

    #[test]
    fn test_store_loads_partial_records() {
        let store = JsonCaseStore::from_json_str(
            r#"[{"petitioner": "Asha Verma"}, {"cnr": "MHPU010012342019", "petitioner_advocate": "P. Nair"}]"#,
        )
        .unwrap();
        assert_eq!(store.cases().len(), 2);

        let result = cross_reference(&store, Some("asha"), Some("nair"));
        assert_eq!(result.petitioner_matches.len(), 1);
        assert_eq!(result.advocate_matches.len(), 1);
        assert!(result.common_matches.is_empty());
    }

    #[test]
    fn test_store_rejects_garbage() {
        assert!(matches!(
            JsonCaseStore::from_json_str("{not json"),
            Err(SleuthError::Store(_))
        ));
    }
}
