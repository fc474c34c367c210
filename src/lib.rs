// Geo Janitor - Core Library
// Cleans free-text address triples against a hierarchical geographic
// reference store; unresolvable triples go through a reasoning-service
// feedback loop that stages proposed fixes for review.

pub mod artifacts;
pub mod config;
pub mod ingest;
pub mod matching;
pub mod pipeline;
pub mod reasoning;
pub mod resolver;
pub mod store;
pub mod validator;

// Re-export commonly used types
pub use artifacts::{ArtifactKind, ArtifactStore};
pub use config::{Config, ReasoningConfig};
pub use ingest::{
    ingest_directory, seed_reference_data, IngestReport, IngestSummary,
};
pub use pipeline::{CleanOutcome, CleanedResponse, Janitor};
pub use reasoning::{HttpReasoningClient, ReasoningError, ReasoningService};
pub use resolver::{
    AnomalyRecord, AnomalyResolver, InferredTriple, ResolverError, ResolverOutput,
};
pub use store::{
    City, CityMatch, Country, CountryMatch, GeoStore, State, StateMatch, StoreError,
};
pub use validator::{
    AddressInput, CleanedAddress, StageOutcome, Validator, COUNTRY_CODE_UNAVAILABLE,
    DEFAULT_SIMILARITY_THRESHOLD,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
