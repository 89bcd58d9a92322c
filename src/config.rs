use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::environment::{get_env_var_or, parse_env_var, parse_optional_env_var};
use crate::retrieval::fts_query;
use crate::topics::TopicModelParams;

pub const DEFAULT_NUM_TOPICS: usize = 10;
pub const DEFAULT_TITLE_WORD_COUNT: usize = 5;
pub const DEFAULT_RETRIEVAL_RESULT_COUNT: usize = 50;
pub const DEFAULT_CENTROID_DOCS_PER_CLUSTER: usize = 5;
pub const DEFAULT_NUM_ITERATIONS: usize = 1000;
pub const DEFAULT_NUM_THREADS: usize = 4;
pub const DEFAULT_ALPHA_PER_TOPIC: f64 = 0.01;
pub const DEFAULT_BETA: f64 = 0.01;

/// How cluster membership is trimmed after assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DocSelectionMethod {
    #[default]
    None,
    KeepImportant,
    KeepCentroid,
}

impl fmt::Display for DocSelectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocSelectionMethod::None => write!(f, "none"),
            DocSelectionMethod::KeepImportant => write!(f, "keep-important"),
            DocSelectionMethod::KeepCentroid => write!(f, "keep-centroid"),
        }
    }
}

impl FromStr for DocSelectionMethod {
    type Err = anyhow::Error;

    // The numeric forms match the legacy selector values 0/1/2.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "none" | "0" => Ok(DocSelectionMethod::None),
            "keep-important" | "important" | "1" => Ok(DocSelectionMethod::KeepImportant),
            "keep-centroid" | "centroid" | "2" => Ok(DocSelectionMethod::KeepCentroid),
            other => Err(anyhow!("Unknown document selection method: {}", other)),
        }
    }
}

/// Everything a clustering run reads from configuration.
#[derive(Debug, Clone)]
pub struct ClusteringConfig {
    pub num_topics: usize,
    pub title_word_count: usize,
    pub doc_selection_method: DocSelectionMethod,
    pub retrieval_result_count: usize,
    pub centroid_docs_per_cluster: usize,
    /// Reference query used for centroid selection.
    pub query: String,
    pub num_iterations: usize,
    pub num_threads: usize,
    pub alpha_per_topic: f64,
    pub beta: f64,
    pub random_seed: Option<u64>,
    pub retrieval_timeout: Option<Duration>,
    pub max_concurrent_searches: usize,
    pub mallet_bin: String,
    pub work_dir: PathBuf,
    /// Upper bound on the whole MALLET import and training run.
    pub mallet_timeout: Option<Duration>,
    /// Keeps MALLET's scratch directory after the run.
    pub keep_work_dir: bool,
    pub index_path: String,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            num_topics: DEFAULT_NUM_TOPICS,
            title_word_count: DEFAULT_TITLE_WORD_COUNT,
            doc_selection_method: DocSelectionMethod::None,
            retrieval_result_count: DEFAULT_RETRIEVAL_RESULT_COUNT,
            centroid_docs_per_cluster: DEFAULT_CENTROID_DOCS_PER_CLUSTER,
            query: String::new(),
            num_iterations: DEFAULT_NUM_ITERATIONS,
            num_threads: DEFAULT_NUM_THREADS,
            alpha_per_topic: DEFAULT_ALPHA_PER_TOPIC,
            beta: DEFAULT_BETA,
            random_seed: None,
            retrieval_timeout: None,
            max_concurrent_searches: 1,
            mallet_bin: "mallet".to_string(),
            work_dir: std::env::temp_dir(),
            mallet_timeout: None,
            keep_work_dir: false,
            index_path: "syntopic.db".to_string(),
        }
    }
}

impl ClusteringConfig {
    /// Loads the configuration from `SYNTOPIC_*` environment variables.
    ///
    /// Unset variables keep their defaults; malformed values are errors.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            num_topics: parse_env_var("SYNTOPIC_NUM_TOPICS", defaults.num_topics)?,
            title_word_count: parse_env_var(
                "SYNTOPIC_TITLE_WORD_COUNT",
                defaults.title_word_count,
            )?,
            doc_selection_method: parse_env_var(
                "SYNTOPIC_DOC_SELECTION_METHOD",
                defaults.doc_selection_method,
            )?,
            retrieval_result_count: parse_env_var(
                "SYNTOPIC_RETRIEVAL_RESULT_COUNT",
                defaults.retrieval_result_count,
            )?,
            centroid_docs_per_cluster: parse_env_var(
                "SYNTOPIC_CENTROID_DOCS_PER_CLUSTER",
                defaults.centroid_docs_per_cluster,
            )?,
            query: get_env_var_or("SYNTOPIC_QUERY", ""),
            num_iterations: parse_env_var("SYNTOPIC_NUM_ITERATIONS", defaults.num_iterations)?,
            num_threads: parse_env_var("SYNTOPIC_NUM_THREADS", defaults.num_threads)?,
            alpha_per_topic: parse_env_var("SYNTOPIC_ALPHA", defaults.alpha_per_topic)?,
            beta: parse_env_var("SYNTOPIC_BETA", defaults.beta)?,
            random_seed: parse_optional_env_var("SYNTOPIC_RANDOM_SEED")?,
            retrieval_timeout: parse_optional_env_var::<u64>("SYNTOPIC_RETRIEVAL_TIMEOUT_SECS")?
                .map(Duration::from_secs),
            max_concurrent_searches: parse_env_var(
                "SYNTOPIC_MAX_CONCURRENT_SEARCHES",
                defaults.max_concurrent_searches,
            )?,
            mallet_bin: get_env_var_or("SYNTOPIC_MALLET_BIN", &defaults.mallet_bin),
            work_dir: std::env::var("SYNTOPIC_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            mallet_timeout: parse_optional_env_var::<u64>("SYNTOPIC_MALLET_TIMEOUT_SECS")?
                .map(Duration::from_secs),
            keep_work_dir: parse_env_var("SYNTOPIC_KEEP_WORK_DIR", defaults.keep_work_dir)?,
            index_path: get_env_var_or("SYNTOPIC_INDEX_PATH", &defaults.index_path),
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the clustering core cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.num_topics == 0 {
            bail!("num_topics must be a positive integer");
        }
        if self.title_word_count == 0 {
            bail!("title_word_count must be at least 1");
        }
        if self.num_iterations == 0 {
            bail!("num_iterations must be a positive integer");
        }
        if self.num_threads == 0 {
            bail!("num_threads must be a positive integer");
        }
        if self.max_concurrent_searches == 0 {
            bail!("max_concurrent_searches must be a positive integer");
        }
        if !(self.alpha_per_topic > 0.0) || !(self.beta > 0.0) {
            bail!("alpha and beta priors must be positive");
        }
        if self.doc_selection_method == DocSelectionMethod::KeepCentroid {
            if self.retrieval_result_count == 0 || self.centroid_docs_per_cluster == 0 {
                bail!("retrieval_result_count and centroid_docs_per_cluster must be positive for keep-centroid");
            }
            // A query without words matches nothing and would empty every titled cluster.
            if fts_query(&self.query).is_none() {
                bail!("keep-centroid requires a reference query with searchable words");
            }
        }
        Ok(())
    }

    /// Parameters handed to the topic-model collaborator.
    pub fn topic_model_params(&self) -> TopicModelParams {
        TopicModelParams {
            num_topics: self.num_topics,
            alpha_per_topic: self.alpha_per_topic,
            beta: self.beta,
            num_iterations: self.num_iterations,
            num_threads: self.num_threads,
            random_seed: self.random_seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_method_parsing() {
        assert_eq!(
            "keep-centroid".parse::<DocSelectionMethod>().unwrap(),
            DocSelectionMethod::KeepCentroid
        );
        assert_eq!(
            "KEEP_IMPORTANT".parse::<DocSelectionMethod>().unwrap(),
            DocSelectionMethod::KeepImportant
        );
        assert_eq!("0".parse::<DocSelectionMethod>().unwrap(), DocSelectionMethod::None);
        assert_eq!("2".parse::<DocSelectionMethod>().unwrap(), DocSelectionMethod::KeepCentroid);
        assert!("random".parse::<DocSelectionMethod>().is_err());
    }

    #[test]
    fn test_selection_method_display_round_trips() {
        for method in [
            DocSelectionMethod::None,
            DocSelectionMethod::KeepImportant,
            DocSelectionMethod::KeepCentroid,
        ] {
            assert_eq!(method.to_string().parse::<DocSelectionMethod>().unwrap(), method);
        }
    }

    #[test]
    fn test_validate() {
        assert!(ClusteringConfig::default().validate().is_ok());

        let config = ClusteringConfig {
            num_topics: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ClusteringConfig {
            title_word_count: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ClusteringConfig {
            doc_selection_method: DocSelectionMethod::KeepCentroid,
            ..Default::default()
        };
        assert!(config.validate().is_err(), "centroid selection needs a query");

        let config = ClusteringConfig {
            doc_selection_method: DocSelectionMethod::KeepCentroid,
            query: "?!".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err(), "punctuation is not a searchable query");

        let config = ClusteringConfig {
            query: "?!".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok(), "the query only matters for keep-centroid");

        let config = ClusteringConfig {
            doc_selection_method: DocSelectionMethod::KeepCentroid,
            query: "election results".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_topic_model_params() {
        let config = ClusteringConfig {
            num_topics: 20,
            random_seed: Some(7),
            ..Default::default()
        };
        let params = config.topic_model_params();
        assert_eq!(params.num_topics, 20);
        assert_eq!(params.random_seed, Some(7));
        assert!((params.alpha_sum() - 0.2).abs() < 1e-12);
    }
}
