// 🧹 Validator - Three-stage address cleaning state machine
// Country → State → City, each Resolved-Exact, Resolved-Fuzzy, or Unresolved
//
// The validator only reports stage outcomes. Whether an unresolved stage
// triggers anomaly handling is the caller's policy (see pipeline.rs).

use crate::matching::title_case;
use crate::store::{GeoStore, StoreError};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Sentinel returned when no country code could be resolved
pub const COUNTRY_CODE_UNAVAILABLE: &str = "N/A";

/// Default minimum similarity for approximate matches
///
/// 0.7 keeps single-edit typos in short names above the bar while rejecting
/// unrelated names. Overridable through [`crate::config::Config`].
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;

// ============================================================================
// STAGE OUTCOME
// ============================================================================

/// How a single stage (country, state, or city) resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageOutcome {
    /// Matched the reference store verbatim (case-insensitive, or via alias)
    ResolvedExact,

    /// Matched via approximate string matching above the threshold
    ResolvedFuzzy,

    /// No usable match; the corrected value is the title-cased raw input
    Unresolved,
}

impl StageOutcome {
    /// Exact and fuzzy both count as usable
    pub fn is_resolved(&self) -> bool {
        !matches!(self, StageOutcome::Unresolved)
    }

    fn from_exact(exact: bool) -> Self {
        if exact {
            StageOutcome::ResolvedExact
        } else {
            StageOutcome::ResolvedFuzzy
        }
    }
}

// ============================================================================
// REQUEST / RESULT
// ============================================================================

/// Raw address fields as entered by the user; any may be empty
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressInput {
    pub city: String,
    pub state: String,
    pub country: String,
}

impl AddressInput {
    pub fn new(city: &str, state: &str, country: &str) -> Self {
        AddressInput {
            city: city.to_string(),
            state: state.to_string(),
            country: country.to_string(),
        }
    }
}

/// Corrected triple with per-stage outcomes
///
/// Every field always carries a value: on failure it falls back to the
/// title-cased raw input with its stage marked Unresolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanedAddress {
    pub corrected_city: String,
    pub corrected_state: String,
    pub corrected_country: String,

    /// ISO alpha-2 code; None when the country stage did not resolve
    pub country_code: Option<String>,

    pub country_outcome: StageOutcome,
    pub state_outcome: StageOutcome,
    pub city_outcome: StageOutcome,
}

impl CleanedAddress {
    /// At least one stage could not be resolved
    pub fn has_unresolved(&self) -> bool {
        !self.country_outcome.is_resolved()
            || !self.state_outcome.is_resolved()
            || !self.city_outcome.is_resolved()
    }

    /// Country code or the "N/A" sentinel
    pub fn country_code_display(&self) -> &str {
        self.country_code.as_deref().unwrap_or(COUNTRY_CODE_UNAVAILABLE)
    }
}

// ============================================================================
// VALIDATOR
// ============================================================================

/// Validates and corrects an address triple against the reference store
pub struct Validator {
    /// Minimum similarity for approximate matches
    pub similarity_threshold: f64,
}

impl Validator {
    pub fn new(similarity_threshold: f64) -> Self {
        Validator {
            similarity_threshold,
        }
    }

    /// Run the three ordered stages against the reference store
    ///
    /// Stage order is fixed: country first, then state scoped to the resolved
    /// country, then city scoped to the resolved state (or the country when
    /// the state did not resolve). An unresolved country short-circuits the
    /// later stages; no fuzzy search runs without a parent scope.
    pub fn validate(
        &self,
        store: &GeoStore,
        input: &AddressInput,
    ) -> Result<CleanedAddress, StoreError> {
        let threshold = self.similarity_threshold;

        // Stage 1: country
        let country = store.lookup_country(input.country.trim(), threshold)?;

        let Some(country) = country else {
            debug!(country = %input.country, "country unresolved, skipping state and city stages");
            return Ok(CleanedAddress {
                corrected_city: title_case(input.city.trim()),
                corrected_state: title_case(input.state.trim()),
                corrected_country: title_case(input.country.trim()),
                country_code: None,
                country_outcome: StageOutcome::Unresolved,
                state_outcome: StageOutcome::Unresolved,
                city_outcome: StageOutcome::Unresolved,
            });
        };

        // Stage 2: state, scoped to the resolved country
        let titled_state = title_case(input.state.trim());
        let state = store.lookup_state(&titled_state, &country.iso_code, threshold)?;

        let (corrected_state, state_outcome, admin_code) = match &state {
            Some(s) => (
                s.admin1_name.clone(),
                StageOutcome::from_exact(s.exact),
                Some(s.admin1_code.clone()),
            ),
            None => (titled_state, StageOutcome::Unresolved, None),
        };

        // Stage 3: city, scoped to the resolved state when available
        let titled_city = title_case(input.city.trim());
        let city = store.lookup_city(
            &titled_city,
            &country.iso_code,
            admin_code.as_deref(),
            threshold,
        )?;

        let (corrected_city, city_outcome) = match city {
            Some(c) => (c.city_name, StageOutcome::from_exact(c.exact)),
            None => (titled_city, StageOutcome::Unresolved),
        };

        Ok(CleanedAddress {
            corrected_city,
            corrected_state,
            corrected_country: country.country_name,
            country_code: Some(country.iso_code),
            country_outcome: StageOutcome::from_exact(country.exact),
            state_outcome,
            city_outcome,
        })
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::seed_reference_data;

    fn seeded_store() -> GeoStore {
        let store = GeoStore::open_in_memory().unwrap();
        seed_reference_data(&store).unwrap();
        store
    }

    #[test]
    fn test_exact_triple_resolves_exact() {
        let store = seeded_store();
        let validator = Validator::default();

        let cleaned = validator
            .validate(&store, &AddressInput::new("chicago", "illinois", "united states"))
            .unwrap();

        assert_eq!(cleaned.corrected_city, "Chicago");
        assert_eq!(cleaned.corrected_state, "Illinois");
        assert_eq!(cleaned.corrected_country, "United States");
        assert_eq!(cleaned.country_code.as_deref(), Some("US"));
        assert_eq!(cleaned.country_outcome, StageOutcome::ResolvedExact);
        assert_eq!(cleaned.state_outcome, StageOutcome::ResolvedExact);
        assert_eq!(cleaned.city_outcome, StageOutcome::ResolvedExact);
        assert!(!cleaned.has_unresolved());
    }

    #[test]
    fn test_new_york_admin_code_example() {
        let store = seeded_store();
        let validator = Validator::default();

        let cleaned = validator
            .validate(&store, &AddressInput::new("New York", "NY", "United States"))
            .unwrap();

        assert_eq!(cleaned.country_code.as_deref(), Some("US"));
        assert_eq!(cleaned.corrected_country, "United States");
        // "NY" resolves through the admin code
        assert_eq!(cleaned.corrected_state, "New York");
        assert!(cleaned.state_outcome.is_resolved());
        // "New York" resolves against the stored "New York City"
        assert_eq!(cleaned.corrected_city, "New York City");
        assert!(cleaned.city_outcome.is_resolved());
    }

    #[test]
    fn test_zurich_typo_with_empty_state() {
        let store = seeded_store();
        let validator = Validator::default();

        let cleaned = validator
            .validate(&store, &AddressInput::new("Zurihc", "", "Switzerland"))
            .unwrap();

        assert_eq!(cleaned.country_outcome, StageOutcome::ResolvedExact);
        assert_eq!(cleaned.corrected_country, "Switzerland");
        // Empty state stays empty and unresolved
        assert_eq!(cleaned.state_outcome, StageOutcome::Unresolved);
        assert_eq!(cleaned.corrected_state, "");
        // The typo still finds Zurich inside the Swiss scope
        assert_eq!(cleaned.city_outcome, StageOutcome::ResolvedFuzzy);
        assert_eq!(cleaned.corrected_city, "Zurich");
    }

    #[test]
    fn test_fuzzy_country_resolves() {
        let store = seeded_store();
        let validator = Validator::default();

        let cleaned = validator
            .validate(&store, &AddressInput::new("", "", "Untied States"))
            .unwrap();

        assert_eq!(cleaned.country_outcome, StageOutcome::ResolvedFuzzy);
        assert_eq!(cleaned.country_code.as_deref(), Some("US"));
        assert_eq!(cleaned.corrected_country, "United States");
    }

    #[test]
    fn test_unresolved_country_propagates() {
        let store = seeded_store();
        let validator = Validator::default();

        let cleaned = validator
            .validate(&store, &AddressInput::new("zurich", "zh", "atlantis"))
            .unwrap();

        // No country scope: every stage falls back, even though the city and
        // state would have matched inside Switzerland
        assert_eq!(cleaned.country_outcome, StageOutcome::Unresolved);
        assert_eq!(cleaned.state_outcome, StageOutcome::Unresolved);
        assert_eq!(cleaned.city_outcome, StageOutcome::Unresolved);
        assert_eq!(cleaned.country_code, None);
        assert_eq!(cleaned.country_code_display(), COUNTRY_CODE_UNAVAILABLE);
        assert_eq!(cleaned.corrected_city, "Zurich");
        assert_eq!(cleaned.corrected_state, "Zh");
        assert_eq!(cleaned.corrected_country, "Atlantis");
        assert!(cleaned.has_unresolved());
    }

    #[test]
    fn test_city_scoped_to_resolved_state() {
        let store = seeded_store();
        let validator = Validator::default();

        // Springfield is an Illinois city in the seed data; scoped to New
        // York it must fall back instead of matching across state lines
        let cleaned = validator
            .validate(&store, &AddressInput::new("springfield", "new york", "united states"))
            .unwrap();

        assert!(cleaned.state_outcome.is_resolved());
        assert_eq!(cleaned.city_outcome, StageOutcome::Unresolved);
        assert_eq!(cleaned.corrected_city, "Springfield");
    }

    #[test]
    fn test_below_threshold_city_falls_back() {
        let store = seeded_store();
        let validator = Validator::default();

        let cleaned = validator
            .validate(&store, &AddressInput::new("xanadu", "zürich", "switzerland"))
            .unwrap();

        assert_eq!(cleaned.city_outcome, StageOutcome::Unresolved);
        assert_eq!(cleaned.corrected_city, "Xanadu");
    }

    #[test]
    fn test_stricter_threshold_rejects_looser_matches() {
        let store = seeded_store();
        let validator = Validator::new(0.95);

        let cleaned = validator
            .validate(&store, &AddressInput::new("Zurihc", "", "Switzerland"))
            .unwrap();

        // At 0.95 the one-transposition typo no longer clears the bar
        assert_eq!(cleaned.city_outcome, StageOutcome::Unresolved);
        assert_eq!(cleaned.corrected_city, "Zurihc");
    }
}
