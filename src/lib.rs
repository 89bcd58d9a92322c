pub mod clustering;
pub mod config;
pub mod corpus;
pub mod environment;
pub mod error;
pub mod logging;
pub mod retrieval;
pub mod topics;

pub const TARGET_CLUSTERING: &str = "clustering";
pub const TARGET_TOPICS: &str = "topics";
pub const TARGET_INDEX: &str = "search_index";
pub const TARGET_CORPUS: &str = "corpus";
pub const TARGET_CLUSTER_DEBUG: &str = "cluster_debug";

pub use clustering::{cluster_documents, Cluster, ClusteringOutcome};
pub use config::{ClusteringConfig, DocSelectionMethod};
pub use corpus::{Document, IngestReport};
pub use error::ClusteringError;
pub use topics::{TopicModelParams, TopicModelResult, TopicModeler};
