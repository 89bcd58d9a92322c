use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ClusteringError;

/// Fixed configuration handed to the topic-model library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicModelParams {
    pub num_topics: usize,
    /// Dirichlet prior per topic; the library receives the sum over topics.
    pub alpha_per_topic: f64,
    pub beta: f64,
    pub num_iterations: usize,
    /// Parallelism hint for the sampler.
    pub num_threads: usize,
    pub random_seed: Option<u64>,
}

impl TopicModelParams {
    pub fn alpha_sum(&self) -> f64 {
        self.alpha_per_topic * self.num_topics as f64
    }
}

/// A vocabulary term and its weight within one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermWeight {
    pub term: String,
    pub weight: f64,
}

impl TermWeight {
    pub fn new(term: &str, weight: f64) -> Self {
        Self {
            term: term.to_string(),
            weight,
        }
    }
}

/// Per-token topic labels for one document, keyed by the document's instance name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTopics {
    pub name: String,
    pub topic_sequence: Vec<usize>,
}

/// Serialized form of [`TopicModelResult`]; `alpha_sum` defaults to the sum of `alpha`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicModelSnapshot {
    pub num_topics: usize,
    pub documents: Vec<DocumentTopics>,
    pub topic_words: Vec<Vec<TermWeight>>,
    pub alpha: Vec<f64>,
    #[serde(default)]
    pub alpha_sum: Option<f64>,
}

/// The fitted output of a topic model, validated and read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "TopicModelSnapshot", into = "TopicModelSnapshot")]
pub struct TopicModelResult {
    num_topics: usize,
    documents: Vec<DocumentTopics>,
    topic_words: Vec<Vec<TermWeight>>,
    alpha: Vec<f64>,
    alpha_sum: f64,
    by_name: HashMap<String, usize>,
}

impl TopicModelResult {
    /// Builds a result with `alpha_sum` equal to the sum of `alpha`.
    pub fn new(
        num_topics: usize,
        documents: Vec<DocumentTopics>,
        topic_words: Vec<Vec<TermWeight>>,
        alpha: Vec<f64>,
    ) -> Result<Self, ClusteringError> {
        let alpha_sum = alpha.iter().sum();
        Self::with_alpha_sum(num_topics, documents, topic_words, alpha, alpha_sum)
    }

    /// Builds a result with an explicit `alpha_sum`, as reported by the library.
    ///
    /// Topic words are stably sorted by descending weight, so equal weights keep the order
    /// the library produced them in.
    pub fn with_alpha_sum(
        num_topics: usize,
        documents: Vec<DocumentTopics>,
        mut topic_words: Vec<Vec<TermWeight>>,
        alpha: Vec<f64>,
        alpha_sum: f64,
    ) -> Result<Self, ClusteringError> {
        if num_topics == 0 {
            return Err(ClusteringError::InvalidModel(
                "num_topics must be positive".to_string(),
            ));
        }
        if alpha.len() != num_topics {
            return Err(ClusteringError::InvalidModel(format!(
                "expected {} alpha values, got {}",
                num_topics,
                alpha.len()
            )));
        }
        if alpha.iter().any(|a| !a.is_finite() || *a < 0.0) {
            return Err(ClusteringError::InvalidModel(
                "alpha values must be finite and non-negative".to_string(),
            ));
        }
        if !alpha_sum.is_finite() || alpha_sum <= 0.0 {
            return Err(ClusteringError::InvalidModel(format!(
                "alpha_sum must be positive, got {}",
                alpha_sum
            )));
        }
        if topic_words.len() != num_topics {
            return Err(ClusteringError::InvalidModel(format!(
                "expected vocabulary for {} topics, got {}",
                num_topics,
                topic_words.len()
            )));
        }

        let mut by_name = HashMap::with_capacity(documents.len());
        for (index, doc) in documents.iter().enumerate() {
            if let Some(label) = doc.topic_sequence.iter().find(|t| **t >= num_topics) {
                return Err(ClusteringError::InvalidModel(format!(
                    "document {} has topic label {} outside 0..{}",
                    doc.name, label, num_topics
                )));
            }
            if by_name.insert(doc.name.clone(), index).is_some() {
                return Err(ClusteringError::InvalidModel(format!(
                    "duplicate document name {}",
                    doc.name
                )));
            }
        }

        for words in topic_words.iter_mut() {
            words.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        }

        Ok(Self {
            num_topics,
            documents,
            topic_words,
            alpha,
            alpha_sum,
            by_name,
        })
    }

    pub fn num_topics(&self) -> usize {
        self.num_topics
    }

    pub fn alpha(&self) -> &[f64] {
        &self.alpha
    }

    pub fn alpha_sum(&self) -> f64 {
        self.alpha_sum
    }

    pub fn documents(&self) -> &[DocumentTopics] {
        &self.documents
    }

    /// Topic labels of the document named `name`, if the model saw it.
    pub fn topic_sequence(&self, name: &str) -> Option<&[usize]> {
        self.by_name
            .get(name)
            .map(|index| self.documents[*index].topic_sequence.as_slice())
    }

    /// Vocabulary of `topic` in descending weight order; empty for an unknown topic.
    pub fn topic_words(&self, topic: usize) -> &[TermWeight] {
        self.topic_words
            .get(topic)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl TryFrom<TopicModelSnapshot> for TopicModelResult {
    type Error = ClusteringError;

    fn try_from(snapshot: TopicModelSnapshot) -> Result<Self, Self::Error> {
        let alpha_sum = snapshot
            .alpha_sum
            .unwrap_or_else(|| snapshot.alpha.iter().sum());
        Self::with_alpha_sum(
            snapshot.num_topics,
            snapshot.documents,
            snapshot.topic_words,
            snapshot.alpha,
            alpha_sum,
        )
    }
}

impl From<TopicModelResult> for TopicModelSnapshot {
    fn from(result: TopicModelResult) -> Self {
        Self {
            num_topics: result.num_topics,
            documents: result.documents,
            topic_words: result.topic_words,
            alpha: result.alpha,
            alpha_sum: Some(result.alpha_sum),
        }
    }
}
