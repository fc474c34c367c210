// 🔁 Cleaning Pipeline - Per-request orchestration and anomaly policy
// caller → validator → (on failure) anomaly resolver → update materializer
//
// The pipeline owns the confidence policy: any unresolved stage triggers the
// resolver. Resolver and materializer failures degrade gracefully; only a
// reference-store failure aborts the request.

use crate::artifacts::ArtifactStore;
use crate::config::Config;
use crate::reasoning::{HttpReasoningClient, ReasoningService};
use crate::resolver::{AnomalyRecord, AnomalyResolver};
use crate::store::GeoStore;
use crate::validator::{AddressInput, CleanedAddress, Validator};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

// ============================================================================
// RESPONSE
// ============================================================================

/// User-facing response: original and corrected fields side by side
///
/// Every corrected field always carries a value; `country_code` is the ISO
/// alpha-2 code or "N/A".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanedResponse {
    pub original_city: String,
    pub corrected_city: String,
    pub original_state: String,
    pub corrected_state: String,
    pub original_country: String,
    pub corrected_country: String,
    pub country_code: String,
}

impl CleanedResponse {
    fn new(input: &AddressInput, cleaned: &CleanedAddress) -> Self {
        CleanedResponse {
            original_city: input.city.clone(),
            corrected_city: cleaned.corrected_city.clone(),
            original_state: input.state.clone(),
            corrected_state: cleaned.corrected_state.clone(),
            original_country: input.country.clone(),
            corrected_country: cleaned.corrected_country.clone(),
            country_code: cleaned.country_code_display().to_string(),
        }
    }
}

/// Result of one cleaning request
#[derive(Debug, Clone)]
pub struct CleanOutcome {
    pub response: CleanedResponse,

    /// Full per-stage detail behind the response
    pub cleaned: CleanedAddress,

    /// Present when the request went through anomaly resolution; carries the
    /// inferred triple once inference succeeded
    pub anomaly: Option<AnomalyRecord>,
}

// ============================================================================
// JANITOR
// ============================================================================

/// The assembled cleaning service
///
/// Holds the reference-store location rather than a connection: each request
/// opens and drops its own scoped connection.
pub struct Janitor {
    db_path: PathBuf,
    validator: Validator,
    service: Box<dyn ReasoningService>,
    artifacts: ArtifactStore,
}

impl Janitor {
    /// Assemble from configuration with the HTTP reasoning backend
    pub fn new(config: &Config) -> Result<Self> {
        let client = HttpReasoningClient::new(&config.reasoning)
            .context("Failed to build reasoning client")?;

        Ok(Self::with_service(config, Box::new(client)))
    }

    /// Assemble with a caller-supplied reasoning backend
    pub fn with_service(config: &Config, service: Box<dyn ReasoningService>) -> Self {
        Janitor {
            db_path: config.db_path.clone(),
            validator: Validator::new(config.similarity_threshold),
            service,
            artifacts: ArtifactStore::new(config.artifact_dir.clone()),
        }
    }

    /// Clean one address triple
    ///
    /// Store-connectivity failure is the only hard error; everything on the
    /// anomaly path is best-effort and the response always comes back with a
    /// value per field.
    pub fn clean(&self, input: &AddressInput) -> Result<CleanOutcome> {
        let store = GeoStore::open(&self.db_path)
            .with_context(|| format!("Failed to open reference store {}", self.db_path.display()))?;

        let cleaned = self
            .validator
            .validate(&store, input)
            .context("Reference store lookup failed")?;

        let anomaly = if cleaned.has_unresolved() {
            self.handle_anomaly(input, &cleaned)
        } else {
            None
        };

        Ok(CleanOutcome {
            response: CleanedResponse::new(input, &cleaned),
            cleaned,
            anomaly,
        })
    }

    /// Best-effort anomaly resolution; never fails the request
    fn handle_anomaly(
        &self,
        input: &AddressInput,
        cleaned: &CleanedAddress,
    ) -> Option<AnomalyRecord> {
        info!(
            city = %input.city,
            state = %input.state,
            country = %input.country,
            "unresolved stages, invoking anomaly resolver"
        );

        let resolver = AnomalyResolver::new(self.service.as_ref());
        let output = match resolver.resolve(input, cleaned) {
            Ok(output) => output,
            Err(err) => {
                warn!(error = %err, "anomaly resolution failed");
                return None;
            }
        };

        if let Err(err) = self.artifacts.materialize_output(&output) {
            warn!(error = %err, "failed to materialize generated artifacts");
        }

        Some(output.record)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::seed_reference_data;
    use crate::reasoning::ReasoningError;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ScriptedService {
        responses: RefCell<VecDeque<Result<String, ReasoningError>>>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedService {
        fn new(responses: Vec<Result<String, ReasoningError>>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                ScriptedService {
                    responses: RefCell::new(responses.into()),
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    impl ReasoningService for ScriptedService {
        fn complete(&self, _system: Option<&str>, _user: &str) -> Result<String, ReasoningError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or(Err(ReasoningError::EmptyResponse))
        }
    }

    fn seeded_db(dir: &Path) -> PathBuf {
        let db_path = dir.join("reference.db");
        let store = GeoStore::open(&db_path).unwrap();
        seed_reference_data(&store).unwrap();
        db_path
    }

    fn test_config(dir: &Path) -> Config {
        Config {
            db_path: seeded_db(dir),
            artifact_dir: dir.join("staged"),
            ..Config::default()
        }
    }

    #[test]
    fn test_clean_valid_triple_skips_resolver() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let (service, calls) = ScriptedService::new(vec![]);
        let janitor = Janitor::with_service(&config, Box::new(service));

        let outcome = janitor
            .clean(&AddressInput::new("chicago", "IL", "usa"))
            .unwrap();

        assert_eq!(outcome.response.original_city, "chicago");
        assert_eq!(outcome.response.corrected_city, "Chicago");
        assert_eq!(outcome.response.corrected_state, "Illinois");
        assert_eq!(outcome.response.corrected_country, "United States");
        assert_eq!(outcome.response.country_code, "US");
        assert!(outcome.anomaly.is_none());

        // No reasoning calls, no staging writes
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!config.artifact_dir.exists());
    }

    #[test]
    fn test_clean_anomaly_materializes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let inference = r#"{"city": "Zurich", "state": "Zürich", "country": "Switzerland"}"#;
        let (service, calls) = ScriptedService::new(vec![
            Ok(inference.to_string()),
            Ok("```sql\nINSERT INTO cities ...\n```".to_string()),
            Ok("```rust\n// revised validator\n```".to_string()),
        ]);
        let janitor = Janitor::with_service(&config, Box::new(service));

        let outcome = janitor
            .clean(&AddressInput::new("Zurihc", "Atlantis", "Switzerland"))
            .unwrap();

        // Response still uses the validator's values, not the inference
        assert_eq!(outcome.response.corrected_city, "Zurich");
        assert_eq!(outcome.response.corrected_state, "Atlantis");
        assert_eq!(outcome.response.country_code, "CH");

        let anomaly = outcome.anomaly.unwrap();
        assert_eq!(anomaly.inferred.unwrap().country, "Switzerland");
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // Both artifacts plus provenance were staged
        let entries: Vec<_> = std::fs::read_dir(&config.artifact_dir).unwrap().collect();
        assert_eq!(entries.len(), 3);
    }

    #[test]
    fn test_resolver_failure_never_fails_request() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let (service, calls) = ScriptedService::new(vec![Err(ReasoningError::EmptyResponse)]);
        let janitor = Janitor::with_service(&config, Box::new(service));

        let outcome = janitor
            .clean(&AddressInput::new("nowhere", "nowhere", "atlantis"))
            .unwrap();

        // Worst case: title-cased raw input and the sentinel code
        assert_eq!(outcome.response.corrected_city, "Nowhere");
        assert_eq!(outcome.response.corrected_country, "Atlantis");
        assert_eq!(outcome.response.country_code, "N/A");
        assert!(outcome.anomaly.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!config.artifact_dir.exists());
    }

    #[test]
    fn test_store_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            // A directory is not a database
            db_path: dir.path().to_path_buf(),
            artifact_dir: dir.path().join("staged"),
            ..Config::default()
        };
        let (service, _) = ScriptedService::new(vec![]);
        let janitor = Janitor::with_service(&config, Box::new(service));

        let result = janitor.clean(&AddressInput::new("a", "b", "c"));
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_input_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let (service, _) = ScriptedService::new(vec![]);
        let janitor = Janitor::with_service(&config, Box::new(service));

        let outcome = janitor.clean(&AddressInput::default()).unwrap();

        assert_eq!(outcome.response.corrected_city, "");
        assert_eq!(outcome.response.corrected_state, "");
        assert_eq!(outcome.response.corrected_country, "");
        assert_eq!(outcome.response.country_code, "N/A");
    }
}
