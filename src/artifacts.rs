// 📦 Update Materializer - Stages generated procedures for human review
// Artifacts are inert text. They are never executed, imported, or merged
// into the live system; promotion happens out-of-band after review.

use crate::resolver::{AnomalyRecord, ResolverOutput};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

// ============================================================================
// ARTIFACT KIND
// ============================================================================

/// The two proposal types a resolver run can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Procedure that extends the reference store for an anomaly category
    IngestionUpdate,

    /// Revised validator exploiting the extended reference data
    ValidatorUpdate,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::IngestionUpdate => "ingestion_update",
            ArtifactKind::ValidatorUpdate => "validator_update",
        }
    }
}

// ============================================================================
// ARTIFACT STORE
// ============================================================================

/// Filesystem staging area for generated artifacts
///
/// Files are keyed by the anomaly's triple hash, so distinct anomalies never
/// overwrite each other; re-resolving the same triple replaces its own
/// artifacts. Writing the same content twice leaves storage unchanged.
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ArtifactStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write one artifact; empty content is a logged no-op
    ///
    /// Returns the path written, or None when there was nothing to write.
    pub fn materialize(
        &self,
        record: &AnomalyRecord,
        kind: ArtifactKind,
        content: &str,
    ) -> Result<Option<PathBuf>> {
        if content.is_empty() {
            info!(kind = kind.as_str(), "no content to materialize");
            return Ok(None);
        }

        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create staging dir {}", self.root.display()))?;

        let path = self.artifact_path(record, kind);
        fs::write(&path, content)
            .with_context(|| format!("Failed to write artifact {}", path.display()))?;

        info!(path = %path.display(), "materialized artifact");
        Ok(Some(path))
    }

    /// Stage everything a resolver run produced
    ///
    /// Writes the present artifacts plus one provenance document (the anomaly
    /// record itself) alongside them. A run that produced no artifacts writes
    /// nothing at all.
    pub fn materialize_output(&self, output: &ResolverOutput) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();

        if let Some(path) = self.materialize(
            &output.record,
            ArtifactKind::IngestionUpdate,
            output.ingestion_update.as_deref().unwrap_or(""),
        )? {
            written.push(path);
        }

        if let Some(path) = self.materialize(
            &output.record,
            ArtifactKind::ValidatorUpdate,
            output.validator_update.as_deref().unwrap_or(""),
        )? {
            written.push(path);
        }

        if !written.is_empty() {
            written.push(self.write_provenance(&output.record)?);
        }

        Ok(written)
    }

    fn artifact_path(&self, record: &AnomalyRecord, kind: ArtifactKind) -> PathBuf {
        self.root
            .join(format!("{}_{}.txt", record.key(), kind.as_str()))
    }

    fn write_provenance(&self, record: &AnomalyRecord) -> Result<PathBuf> {
        let path = self.root.join(format!("{}_anomaly.json", record.key()));
        let json = serde_json::to_string_pretty(record)
            .context("Failed to serialize anomaly record")?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write provenance {}", path.display()))?;
        Ok(path)
    }
}

// ============================================================================
// TESTS
// ============================================================================
