//! Artifact - what a succeeded candidate leaves behind

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::generator::TrainedModel;

/// Plan and code returned by the candidate generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSource {
    /// Natural-language solution plan.
    pub plan: String,
    /// Generated feature-engineering and training code.
    pub code: String,
}

/// Compute the content hash used for artifact files and artifacts.
///
/// Format: `trueno:<16 hex digits>`.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    format!("trueno:{:016x}", trueno::hash_bytes(bytes))
}

/// A file produced inside a candidate's execution directory.
///
/// Captured into memory before the directory is released, so it outlives
/// the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    key: String,
    cas_hash: String,
    size_bytes: u64,
    #[serde(skip)]
    bytes: Vec<u8>,
    created_at: DateTime<Utc>,
}

impl ArtifactFile {
    /// Create a new artifact file record from captured bytes.
    ///
    /// # Arguments
    ///
    /// * `key` - Path relative to the execution directory (e.g., "model.bin")
    /// * `bytes` - File contents
    #[must_use]
    pub fn new(key: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            cas_hash: content_hash(&bytes),
            size_bytes: bytes.len() as u64,
            bytes,
            created_at: Utc::now(),
        }
    }

    /// Get the file key/name.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the content-addressable hash.
    #[must_use]
    pub fn cas_hash(&self) -> &str {
        &self.cas_hash
    }

    /// Get the file size in bytes.
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Get the captured contents.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Get the capture timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Executed output of a succeeded node: source, trained model and files.
///
/// The trained model is shared behind an `Arc` so diagnostics clones stay
/// cheap; it is skipped when the graph is serialized.
#[derive(Clone, Serialize)]
pub struct Artifact {
    source: CandidateSource,
    files: Vec<ArtifactFile>,
    content_hash: String,
    #[serde(skip)]
    model: Arc<dyn TrainedModel>,
}

impl Artifact {
    /// Assemble an artifact; the content hash covers code and model bytes.
    #[must_use]
    pub fn new(source: CandidateSource, model: Arc<dyn TrainedModel>, files: Vec<ArtifactFile>) -> Self {
        let mut digest_input = source.code.as_bytes().to_vec();
        digest_input.extend_from_slice(&model.to_bytes());
        Self {
            content_hash: content_hash(&digest_input),
            source,
            files,
            model,
        }
    }

    /// Plan and code of the candidate.
    #[must_use]
    pub const fn source(&self) -> &CandidateSource {
        &self.source
    }

    /// Files captured from the execution directory.
    #[must_use]
    pub fn files(&self) -> &[ArtifactFile] {
        &self.files
    }

    /// Content hash over code and serialized model.
    #[must_use]
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// The trained model, ready to be packaged or used for prediction.
    #[must_use]
    pub fn model(&self) -> &Arc<dyn TrainedModel> {
        &self.model
    }
}

impl std::fmt::Debug for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Artifact")
            .field("source", &self.source)
            .field("files", &self.files)
            .field("content_hash", &self.content_hash)
            .finish_non_exhaustive()
    }
}
