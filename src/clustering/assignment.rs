use tracing::{debug, info};

use super::types::Cluster;
use crate::corpus::Document;
use crate::error::ClusteringError;
use crate::topics::TopicModelResult;
use crate::TARGET_CLUSTERING;

/// Picks the topic with the largest smoothed weight for one document.
///
/// `weight(t) = (alpha[t] + counts[t]) / (doc_len + alpha_sum)`. Topics are scanned in
/// ascending order and a later topic only wins when strictly greater, so ties go to the
/// lowest index.
///
/// # Returns
/// * `(topic, weight)` of the winner
pub fn dominant_topic(
    topic_counts: &[usize],
    doc_len: usize,
    alpha: &[f64],
    alpha_sum: f64,
) -> (usize, f64) {
    let denominator = doc_len as f64 + alpha_sum;
    let mut best_topic = 0;
    let mut best_weight = f64::NEG_INFINITY;

    for (topic, (prior, count)) in alpha.iter().zip(topic_counts).enumerate() {
        let weight = (prior + *count as f64) / denominator;
        if weight > best_weight {
            best_topic = topic;
            best_weight = weight;
        }
    }

    (best_topic, best_weight)
}

/// Assigns every document to the cluster of its dominant topic.
///
/// This function:
/// 1. Resolves each document's topic sequence by filename
/// 2. Builds a fresh topic histogram per document
/// 3. Selects the dominant topic with [`dominant_topic`]
/// 4. Records the cluster on the document and appends a copy to that cluster
///
/// All lookups are resolved before any document is touched, so a missing document leaves
/// the corpus unmodified.
///
/// # Arguments
/// * `documents` - Corpus in iteration order; only `cluster_id` is written
/// * `model` - Fitted topic model
///
/// # Returns
/// * `Ok(clusters)` - Exactly `num_topics` clusters, index `i` having id `i`
/// * `Err(ClusteringError::MissingDocument)` - If the model has no entry for a document
pub fn assign_documents(
    documents: &mut [Document],
    model: &TopicModelResult,
) -> Result<Vec<Cluster>, ClusteringError> {
    let num_topics = model.num_topics();
    let mut clusters: Vec<Cluster> = (0..num_topics).map(Cluster::new).collect();

    let sequences = documents
        .iter()
        .map(|doc| {
            model
                .topic_sequence(&doc.filename)
                .ok_or_else(|| ClusteringError::MissingDocument {
                    name: doc.filename.clone(),
                })
        })
        .collect::<Result<Vec<&[usize]>, _>>()?;

    let mut topic_counts = vec![0usize; num_topics];

    for (doc, sequence) in documents.iter_mut().zip(sequences) {
        topic_counts.fill(0);
        for topic in sequence {
            topic_counts[*topic] += 1;
        }

        let (topic, weight) =
            dominant_topic(&topic_counts, sequence.len(), model.alpha(), model.alpha_sum());
        debug!(
            target: TARGET_CLUSTERING,
            "{} -> cluster {} (weight {:.4}, {} tokens)",
            doc.filename,
            topic,
            weight,
            sequence.len()
        );

        doc.cluster_id = Some(topic);
        clusters[topic].add_document(doc.clone());
    }

    info!(
        target: TARGET_CLUSTERING,
        "Assigned {} documents to {} clusters ({} empty)",
        documents.len(),
        num_topics,
        clusters.iter().filter(|c| c.is_empty()).count()
    );

    Ok(clusters)
}
