// 🚨 Anomaly Resolver - Reasoning-service feedback loop for failed triples
// Three sequential best-effort steps:
//   1. infer the intended (city, state, country) from the raw inputs
//   2. generate a data-ingestion procedure for the whole anomaly category
//   3. generate a revised validator that exploits the new reference data
//
// Step 1 failing aborts the loop; steps 2 and 3 are independent of each
// other. Generated procedures are proposals only: they go to the update
// materializer for human review and are never executed here.

use crate::reasoning::{ReasoningError, ReasoningService};
use crate::validator::{AddressInput, CleanedAddress, StageOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ResolverError {
    /// No well-formed `{ city, state, country }` object in the response
    #[error("no well-formed inference found in reasoning response")]
    InferenceParse,

    /// The inference call itself failed
    #[error(transparent)]
    Service(#[from] ReasoningError),
}

// ============================================================================
// ANOMALY RECORD
// ============================================================================

/// The triple the reasoning service believes the user intended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferredTriple {
    pub city: String,
    pub state: String,
    pub country: String,
}

/// A raw triple that failed validation, plus what was inferred for it
///
/// Created only on validator failure; its lifetime ends once the generated
/// artifacts are materialized (the record travels with them as provenance).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,

    /// The raw inputs as received
    pub input: AddressInput,

    pub country_outcome: StageOutcome,
    pub state_outcome: StageOutcome,
    pub city_outcome: StageOutcome,

    /// Set once the inference step succeeds
    pub inferred: Option<InferredTriple>,
}

impl AnomalyRecord {
    pub fn new(input: &AddressInput, cleaned: &CleanedAddress) -> Self {
        AnomalyRecord {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            input: input.clone(),
            country_outcome: cleaned.country_outcome,
            state_outcome: cleaned.state_outcome,
            city_outcome: cleaned.city_outcome,
            inferred: None,
        }
    }

    /// Stable key for artifact staging, derived from the raw triple
    ///
    /// Distinct anomalies get distinct keys so concurrent resolutions cannot
    /// overwrite each other; re-running the same triple overwrites its own
    /// prior artifacts.
    pub fn key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}\n{}\n{}",
            self.input.city, self.input.state, self.input.country
        ));
        let digest = format!("{:x}", hasher.finalize());
        digest[..16].to_string()
    }
}

/// Everything a single resolver run produced
#[derive(Debug, Clone)]
pub struct ResolverOutput {
    pub record: AnomalyRecord,

    /// Generated data-ingestion procedure, if that step succeeded
    pub ingestion_update: Option<String>,

    /// Generated validator revision, if that step succeeded
    pub validator_update: Option<String>,
}

// ============================================================================
// RESPONSE PARSING
// ============================================================================

/// Extract the first `{` through the matching last `}` from free text
///
/// The reasoning service wraps answers in prose and code fences; anything
/// outside the outermost braces is discarded.
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Extract procedural text from a response
///
/// Contents of the first fenced code block when a complete fence pair is
/// present; otherwise the whole trimmed response.
fn extract_code(text: &str) -> String {
    if let Some(open) = text.find("```") {
        let after_fence = &text[open + 3..];
        // Skip the language tag line
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_fence[body_start..];

        if let Some(close) = body.find("```") {
            return body[..close].trim().to_string();
        }
    }

    text.trim().to_string()
}

fn parse_inferred(text: &str) -> Result<InferredTriple, ResolverError> {
    let json = extract_json(text).ok_or(ResolverError::InferenceParse)?;
    serde_json::from_str(json).map_err(|_| ResolverError::InferenceParse)
}

// ============================================================================
// PROMPTS
// ============================================================================

/// How the reference store is shaped, for the generation prompts
const REFERENCE_SCHEMA_DESCRIPTION: &str = "\
The reference store is a SQLite database with three entity tables:
- countries(iso_code, country_name, aliases)  -- aliases is a JSON array of alternative names
- states(admin1_code, admin1_name, country_code)  -- each state is IN_COUNTRY its country
- cities(city_name, admin1_code, country_code, latitude, longitude)  -- each city is IN_STATE its state
A city's state must exist, and a state's country must exist.";

/// The validator the revision proposal must replace
const CURRENT_VALIDATOR_SOURCE: &str = include_str!("validator.rs");

fn inference_prompt(input: &AddressInput) -> String {
    format!(
        "You are an assistant helping to clean address data.\n\
         \n\
         The user provided the following inputs:\n\
         - City: '{}'\n\
         - State: '{}'\n\
         - Country: '{}'\n\
         \n\
         The system could not validate this data against its geographic reference store. \
         Analyze the inputs and determine what the user most likely meant. The fields are \
         related, so infer an invalid field from the valid ones where possible, and use any \
         relevant information placed in the wrong field (for example, coordinates entered in \
         the city field identify the city).\n\
         \n\
         Provide only the cleaned data in JSON format with the fields:\n\
         {{\n\
             \"city\": \"cleaned city name\",\n\
             \"state\": \"cleaned state name\",\n\
             \"country\": \"cleaned country name\"\n\
         }}",
        input.city, input.state, input.country
    )
}

const INGESTION_SYSTEM_PROMPT: &str = "\
You are an assistant specialized in extending a geographic reference store used by an \
address-cleaning system. When the cleaner meets an anomaly it cannot handle, you propose a \
data-ingestion procedure that adds the reference data needed to resolve that whole category \
of anomaly directly from the store, without further calls to you.";

fn ingestion_prompt(input: &AddressInput, inferred: &InferredTriple) -> String {
    format!(
        "The cleaner detected an address anomaly. The user entered:\n\
         - City: '{}'\n\
         - State: '{}'\n\
         - Country: '{}'\n\
         \n\
         The inferred intended data is:\n\
         - City: '{}'\n\
         - State: '{}'\n\
         - Country: '{}'\n\
         \n\
         {}\n\
         \n\
         Task:\n\
         1. Analyze the difference between the anomalous and the inferred data.\n\
         2. Decide what additional reference data would let the store resolve this category \
         of anomaly on its own.\n\
         3. Write a complete, runnable ingestion procedure that fetches the necessary data \
         for the whole anomaly category from a real external source (name a concrete public \
         API, no placeholders) and writes it into the store tables described above.\n\
         4. Generalize: if the user entered coordinates instead of a city name, ingest \
         coordinates for all cities, not just this one, so any similar future input resolves \
         from the store.",
        input.city, input.state, input.country,
        inferred.city, inferred.state, inferred.country,
        REFERENCE_SCHEMA_DESCRIPTION,
    )
}

const REVISION_SYSTEM_PROMPT: &str = "\
You are an assistant specialized in revising the validator of an address-cleaning system. \
The validator checks (city, state, country) inputs against a geographic reference store. \
After the store is extended for a new anomaly category, you rewrite the validator so it \
exploits the fresh reference data and handles that category without generative help. \
Output the complete revised module, ready for review.";

fn revision_prompt(
    input: &AddressInput,
    inferred: &InferredTriple,
    ingestion_update: Option<&str>,
) -> String {
    let ingestion_section = match ingestion_update {
        Some(code) => format!(
            "The reference store is being extended with this ingestion procedure:\n\
             ```\n{}\n```",
            code
        ),
        None => "No ingestion procedure is available for this anomaly yet; revise the \
                 validator using the existing store schema only."
            .to_string(),
    };

    format!(
        "The following address data caused an anomaly:\n\
         - City: '{}'\n\
         - State: '{}'\n\
         - Country: '{}'\n\
         \n\
         The inferred intended data is:\n\
         - City: '{}'\n\
         - State: '{}'\n\
         - Country: '{}'\n\
         \n\
         {}\n\
         \n\
         Here is the current validator module:\n\
         ```rust\n{}\n```\n\
         \n\
         Provide the entire revised validator module so it can handle this category of \
         anomaly (not just this specific instance) using the reference store.",
        input.city, input.state, input.country,
        inferred.city, inferred.state, inferred.country,
        ingestion_section,
        CURRENT_VALIDATOR_SOURCE,
    )
}

// ============================================================================
// RESOLVER
// ============================================================================

/// Drives the three-step feedback loop against a reasoning service
pub struct AnomalyResolver<'a> {
    service: &'a dyn ReasoningService,
}

impl<'a> AnomalyResolver<'a> {
    pub fn new(service: &'a dyn ReasoningService) -> Self {
        AnomalyResolver { service }
    }

    /// Run the full loop for one failed triple
    ///
    /// Returns an error only when the inference step fails; generation steps
    /// degrade to absent artifacts.
    pub fn resolve(
        &self,
        input: &AddressInput,
        cleaned: &CleanedAddress,
    ) -> Result<ResolverOutput, ResolverError> {
        let mut record = AnomalyRecord::new(input, cleaned);

        let inferred = self.infer_triple(input)?;
        record.inferred = Some(inferred.clone());

        let ingestion_update = self.generate_ingestion_update(input, &inferred);
        let validator_update =
            self.generate_validator_update(input, &inferred, ingestion_update.as_deref());

        Ok(ResolverOutput {
            record,
            ingestion_update,
            validator_update,
        })
    }

    /// Step 1: infer the intended triple
    fn infer_triple(&self, input: &AddressInput) -> Result<InferredTriple, ResolverError> {
        let response = self.service.complete(None, &inference_prompt(input))?;
        parse_inferred(&response)
    }

    /// Step 2: generate a data-ingestion procedure (best-effort)
    fn generate_ingestion_update(
        &self,
        input: &AddressInput,
        inferred: &InferredTriple,
    ) -> Option<String> {
        let response = match self
            .service
            .complete(Some(INGESTION_SYSTEM_PROMPT), &ingestion_prompt(input, inferred))
        {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "ingestion-procedure generation failed");
                return None;
            }
        };

        let code = extract_code(&response);
        if code.is_empty() {
            warn!("ingestion-procedure generation returned no content");
            return None;
        }
        Some(code)
    }

    /// Step 3: generate a revised validator (best-effort)
    fn generate_validator_update(
        &self,
        input: &AddressInput,
        inferred: &InferredTriple,
        ingestion_update: Option<&str>,
    ) -> Option<String> {
        let response = match self.service.complete(
            Some(REVISION_SYSTEM_PROMPT),
            &revision_prompt(input, inferred, ingestion_update),
        ) {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "validator-revision generation failed");
                return None;
            }
        };

        let code = extract_code(&response);
        if code.is_empty() {
            warn!("validator-revision generation returned no content");
            return None;
        }
        Some(code)
    }
}

// ============================================================================
// TESTS
// ============================================================================
