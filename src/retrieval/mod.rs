//! Collaborator interfaces consumed by cluster refinement, and the SQLite FTS5 engine
//! that backs them.

pub mod index;
pub mod schema;

use anyhow::Result;
use futures::future::BoxFuture;
use std::sync::Mutex;
use tracing::debug;

use crate::corpus::Document;
use crate::TARGET_CLUSTER_DEBUG;

pub use index::{fts_query, SearchIndex};

/// Full-text retrieval restricted to a candidate set of documents.
pub trait Retriever: Send + Sync {
    /// Ranks the candidates against `query`, most relevant first, returning at most `top_n`.
    fn search_in_files<'a>(
        &'a self,
        query: &'a str,
        candidate_filenames: &'a [String],
        top_n: usize,
    ) -> BoxFuture<'a, Result<Vec<Document>>>;
}

/// Receives the raw retrieval results of each refined cluster.
pub trait DebugRecorder: Send + Sync {
    fn record_debug_info(&self, cluster_id: usize, docs: &[Document]);
}

/// Writes retrieval results to the `cluster_debug` log target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDebugRecorder;

impl DebugRecorder for TracingDebugRecorder {
    fn record_debug_info(&self, cluster_id: usize, docs: &[Document]) {
        let filenames: Vec<&str> = docs.iter().map(|d| d.filename.as_str()).collect();
        debug!(
            target: TARGET_CLUSTER_DEBUG,
            cluster_id,
            results = docs.len(),
            "Retrieved documents: {}",
            filenames.join(", ")
        );
    }
}

/// Keeps every recorded result list in memory, in the order received.
#[derive(Debug, Default)]
pub struct MemoryDebugRecorder {
    entries: Mutex<Vec<(usize, Vec<String>)>>,
}

impl MemoryDebugRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(cluster_id, filenames)` pairs recorded so far.
    pub fn entries(&self) -> Vec<(usize, Vec<String>)> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

impl DebugRecorder for MemoryDebugRecorder {
    fn record_debug_info(&self, cluster_id: usize, docs: &[Document]) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((cluster_id, docs.iter().map(|d| d.filename.clone()).collect()));
        }
    }
}
