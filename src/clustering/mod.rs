// Module declarations
pub mod assignment;
pub mod refine;
pub mod titles;
pub mod types;

pub use types::*;

pub use assignment::{assign_documents, dominant_topic};
pub use refine::{ClusterRefiner, RefinementReport, RefinementSettings};
pub use titles::{generate_titles, topic_title};

use anyhow::Result;
use tracing::{info, warn};

use crate::config::ClusteringConfig;
use crate::corpus::{CorpusAdapter, Document};
use crate::topics::TopicModeler;
use crate::TARGET_CLUSTERING;

/// Runs one clustering pass over `documents`.
///
/// This function:
/// 1. Converts the corpus for the topic model and waits for the fit to finish
/// 2. Assigns every document to the cluster of its dominant topic
/// 3. Titles each cluster from its topic's vocabulary
/// 4. Refines cluster membership with `refiner`
///
/// An empty corpus produces no clusters and never reaches the topic model.
///
/// # Arguments
/// * `documents` - The corpus; each document's `cluster_id` is set on success
/// * `modeler` - Topic model collaborator
/// * `adapter` - Tokenizer producing the topic-model corpus
/// * `refiner` - Applies the configured document selection method
/// * `config` - Topic count, title length and model parameters
///
/// # Returns
/// * `Ok(ClusteringOutcome)` - Clusters with ids `0..num_topics` and the run's counters
/// * `Err` - If inference, assignment or retrieval fails; no partial result is returned
pub async fn cluster_documents(
    documents: &mut [Document],
    modeler: &dyn TopicModeler,
    adapter: &CorpusAdapter,
    refiner: &ClusterRefiner,
    config: &ClusteringConfig,
) -> Result<ClusteringOutcome> {
    if documents.is_empty() {
        info!(target: TARGET_CLUSTERING, "Corpus is empty, no clusters created");
        return Ok(ClusteringOutcome::default());
    }

    let corpus = adapter.to_topic_corpus(documents);
    let params = config.topic_model_params();
    info!(
        target: TARGET_CLUSTERING,
        "Fitting {} topics over {} documents",
        params.num_topics,
        corpus.len()
    );
    let model = modeler.fit(&corpus, &params).await?;

    let mut clusters = assign_documents(documents, &model)?;

    let titles = generate_titles(&model, config.title_word_count);
    for (cluster, title) in clusters.iter_mut().zip(titles) {
        cluster.title = title;
    }
    let degenerate_topics = clusters.iter().filter(|c| !c.has_title()).count();
    if degenerate_topics > 0 {
        warn!(
            target: TARGET_CLUSTERING,
            "{} of {} topics produced an empty title",
            degenerate_topics,
            clusters.len()
        );
    }

    let refinement = refiner.refine(&mut clusters).await?;

    let report = ClusteringReport {
        documents: documents.len(),
        clusters: clusters.len(),
        empty_clusters: clusters.iter().filter(|c| c.is_empty()).count(),
        degenerate_topics,
        refined_clusters: refinement.refined_clusters,
        retrieval_calls: refinement.retrieval_calls,
    };
    info!(
        target: TARGET_CLUSTERING,
        "Clustered {} documents into {} clusters ({} empty, {} refined)",
        report.documents,
        report.clusters,
        report.empty_clusters,
        report.refined_clusters
    );

    Ok(ClusteringOutcome { clusters, report })
}
