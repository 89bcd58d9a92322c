//! Domain errors for a clustering run.
//!
//! Collaborator failures (I/O, SQLite, the MALLET process) travel as `anyhow::Error`;
//! these variants cover the conditions callers may want to match on.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ClusteringError {
    /// A corpus document has no entry in the topic model results.
    #[error("Document {name} is missing from the topic model results")]
    MissingDocument { name: String },

    #[error("Invalid topic model: {0}")]
    InvalidModel(String),

    #[error("Retrieval for cluster {cluster_id} timed out after {timeout:?}")]
    RetrievalTimeout { cluster_id: usize, timeout: Duration },

    #[error("Invalid state file: {0}")]
    InvalidState(String),
}
