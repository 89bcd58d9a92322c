use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::Path;
use tracing::{info, warn};

use super::types::{TopicModelParams, TopicModelResult};
use crate::corpus::TopicCorpus;
use crate::TARGET_TOPICS;

/// Fits a topic model over a corpus.
///
/// Implementations may run many workers internally; callers see one awaited call and do
/// not use the result until it has fully completed.
pub trait TopicModeler: Send + Sync {
    fn fit<'a>(
        &'a self,
        corpus: &'a TopicCorpus,
        params: &'a TopicModelParams,
    ) -> BoxFuture<'a, Result<TopicModelResult>>;
}

/// A model fitted elsewhere and loaded from its JSON snapshot.
#[derive(Debug, Clone)]
pub struct PrecomputedTopicModel {
    result: TopicModelResult,
}

impl PrecomputedTopicModel {
    pub fn new(result: TopicModelResult) -> Self {
        Self { result }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read topic model {}", path.display()))?;
        let result: TopicModelResult = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse topic model {}", path.display()))?;
        info!(
            target: TARGET_TOPICS,
            "Loaded precomputed topic model with {} topics and {} documents from {}",
            result.num_topics(),
            result.documents().len(),
            path.display()
        );
        Ok(Self::new(result))
    }
}

impl TopicModeler for PrecomputedTopicModel {
    fn fit<'a>(
        &'a self,
        _corpus: &'a TopicCorpus,
        params: &'a TopicModelParams,
    ) -> BoxFuture<'a, Result<TopicModelResult>> {
        async move {
            if params.num_topics != self.result.num_topics() {
                warn!(
                    target: TARGET_TOPICS,
                    "Requested {} topics but the precomputed model has {}; using the model",
                    params.num_topics,
                    self.result.num_topics()
                );
            }
            Ok(self.result.clone())
        }
        .boxed()
    }
}
