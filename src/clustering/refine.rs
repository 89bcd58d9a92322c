use anyhow::{anyhow, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::types::Cluster;
use crate::config::{ClusteringConfig, DocSelectionMethod};
use crate::error::ClusteringError;
use crate::retrieval::{DebugRecorder, Retriever, TracingDebugRecorder};
use crate::TARGET_CLUSTERING;

/// The part of the configuration that drives refinement.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinementSettings {
    pub method: DocSelectionMethod,
    /// Reference query for centroid selection.
    pub query: String,
    pub retrieval_result_count: usize,
    pub centroid_docs_per_cluster: usize,
    pub retrieval_timeout: Option<Duration>,
    pub max_concurrent_searches: usize,
}

impl Default for RefinementSettings {
    fn default() -> Self {
        Self::from(&ClusteringConfig::default())
    }
}

impl From<&ClusteringConfig> for RefinementSettings {
    fn from(config: &ClusteringConfig) -> Self {
        Self {
            method: config.doc_selection_method,
            query: config.query.clone(),
            retrieval_result_count: config.retrieval_result_count,
            centroid_docs_per_cluster: config.centroid_docs_per_cluster,
            retrieval_timeout: config.retrieval_timeout,
            max_concurrent_searches: config.max_concurrent_searches,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefinementReport {
    pub refined_clusters: usize,
    pub removed_documents: usize,
    /// Clusters skipped by centroid selection because their title was blank.
    pub skipped_untitled: usize,
    pub retrieval_calls: usize,
}

/// Trims cluster membership according to the configured selection method.
pub struct ClusterRefiner {
    settings: RefinementSettings,
    retriever: Option<Arc<dyn Retriever>>,
    recorder: Arc<dyn DebugRecorder>,
}

impl ClusterRefiner {
    pub fn new(settings: RefinementSettings) -> Self {
        Self {
            settings,
            retriever: None,
            recorder: Arc::new(TracingDebugRecorder),
        }
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_debug_recorder(mut self, recorder: Arc<dyn DebugRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn settings(&self) -> &RefinementSettings {
        &self.settings
    }

    /// Applies the selection method to every cluster in place.
    ///
    /// Membership only ever shrinks or is reordered. Under `keep-centroid` every search
    /// must succeed before any cluster is changed; the first failure or timeout is
    /// returned and the clusters are left as they were.
    pub async fn refine(&self, clusters: &mut [Cluster]) -> Result<RefinementReport> {
        let report = match self.settings.method {
            DocSelectionMethod::None => RefinementReport::default(),
            DocSelectionMethod::KeepImportant => keep_important(clusters),
            DocSelectionMethod::KeepCentroid => self.keep_centroid(clusters).await?,
        };

        info!(
            target: TARGET_CLUSTERING,
            "Refinement ({}) trimmed {} clusters, removing {} documents",
            self.settings.method,
            report.refined_clusters,
            report.removed_documents
        );
        Ok(report)
    }

    async fn keep_centroid(&self, clusters: &mut [Cluster]) -> Result<RefinementReport> {
        let retriever = self
            .retriever
            .as_deref()
            .ok_or_else(|| anyhow!("keep-centroid selection requires a retriever"))?;
        let mut report = RefinementReport::default();

        let mut targets: Vec<(usize, usize, Vec<String>)> = Vec::new();
        for (index, cluster) in clusters.iter().enumerate() {
            if !cluster.has_title() {
                debug!(
                    target: TARGET_CLUSTERING,
                    "Cluster {} has no title, keeping all {} documents",
                    cluster.id,
                    cluster.len()
                );
                report.skipped_untitled += 1;
                continue;
            }
            if cluster.is_empty() {
                continue;
            }
            targets.push((index, cluster.id, cluster.filenames()));
        }
        report.retrieval_calls = targets.len();

        let ranked: Vec<(usize, Vec<String>)> = stream::iter(targets.iter().map(
            |(index, cluster_id, filenames)| async move {
                let keep = self.centroid_search(retriever, *cluster_id, filenames).await?;
                Ok::<_, anyhow::Error>((*index, keep))
            },
        ))
        .buffered(self.settings.max_concurrent_searches.max(1))
        .try_collect()
        .await?;

        for (index, keep) in ranked {
            let cluster = &mut clusters[index];
            let before = cluster.len();
            cluster.keep_only_given_docs(&keep);
            if cluster.len() < before {
                report.refined_clusters += 1;
                report.removed_documents += before - cluster.len();
            }
        }

        Ok(report)
    }

    /// Runs the single search for one cluster and returns the filenames to keep, best first.
    async fn centroid_search(
        &self,
        retriever: &dyn Retriever,
        cluster_id: usize,
        filenames: &[String],
    ) -> Result<Vec<String>> {
        let search =
            retriever.search_in_files(&self.settings.query, filenames, self.settings.retrieval_result_count);
        let docs = match self.settings.retrieval_timeout {
            Some(timeout) => tokio::time::timeout(timeout, search)
                .await
                .map_err(|_| ClusteringError::RetrievalTimeout { cluster_id, timeout })??,
            None => search.await?,
        };

        self.recorder.record_debug_info(cluster_id, &docs);

        Ok(docs
            .into_iter()
            .take(self.settings.centroid_docs_per_cluster)
            .map(|doc| doc.filename)
            .collect())
    }
}

fn keep_important(clusters: &mut [Cluster]) -> RefinementReport {
    let mut report = RefinementReport::default();
    for cluster in clusters.iter_mut() {
        let removed = cluster.keep_only_important_docs();
        if removed > 0 {
            report.refined_clusters += 1;
            report.removed_documents += removed;
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Document;
    use crate::retrieval::MemoryDebugRecorder;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Ranks candidates by their position in `ranking`, and also returns `intruder`,
    /// which is never a cluster member.
    struct FakeRetriever {
        ranking: Vec<String>,
        calls: AtomicUsize,
        delay: Option<Duration>,
        fail: bool,
    }

    impl FakeRetriever {
        fn new(ranking: &[&str]) -> Self {
            Self {
                ranking: ranking.iter().map(|s| s.to_string()).collect(),
                calls: AtomicUsize::new(0),
                delay: None,
                fail: false,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Retriever for FakeRetriever {
        fn search_in_files<'a>(
            &'a self,
            _query: &'a str,
            candidate_filenames: &'a [String],
            top_n: usize,
        ) -> BoxFuture<'a, Result<Vec<Document>>> {
            async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                if self.fail {
                    return Err(anyhow!("index unavailable"));
                }
                let mut hits: Vec<Document> = self
                    .ranking
                    .iter()
                    .filter(|name| candidate_filenames.contains(name))
                    .map(|name| Document::new(0, name, name, ""))
                    .collect();
                hits.insert(1.min(hits.len()), Document::new(0, "intruder.xml", "", ""));
                hits.truncate(top_n);
                Ok(hits)
            }
            .boxed()
        }
    }

    fn cluster(id: usize, title: &str, names: &[String]) -> Cluster {
        let mut cluster = Cluster::new(id);
        cluster.title = title.to_string();
        for name in names {
            cluster.add_document(Document::new(0, name, name, ""));
        }
        cluster
    }

    fn names(prefix: &str, count: usize) -> Vec<String> {
        (0..count).map(|i| format!("{}{}.xml", prefix, i)).collect()
    }

    fn centroid_settings(result_count: usize, per_cluster: usize) -> RefinementSettings {
        RefinementSettings {
            method: DocSelectionMethod::KeepCentroid,
            query: "election results".to_string(),
            retrieval_result_count: result_count,
            centroid_docs_per_cluster: per_cluster,
            retrieval_timeout: None,
            max_concurrent_searches: 1,
        }
    }

    #[tokio::test]
    async fn test_keep_centroid_keeps_top_ranked_members() {
        let members = names("d", 10);
        let ranking: Vec<&str> = members.iter().rev().map(String::as_str).collect();
        let retriever = Arc::new(FakeRetriever::new(&ranking));
        let recorder = Arc::new(MemoryDebugRecorder::new());
        let refiner = ClusterRefiner::new(centroid_settings(8, 3))
            .with_retriever(retriever.clone())
            .with_debug_recorder(recorder.clone());

        let mut clusters = vec![cluster(0, "vote budget ", &members)];
        let report = refiner.refine(&mut clusters).await.unwrap();

        // The intruder is ranked second but is not a member, so it is dropped.
        assert_eq!(clusters[0].filenames(), vec!["d9.xml", "d8.xml"]);
        assert!(clusters[0].len() <= 3);
        assert_eq!(retriever.calls(), 1);
        assert_eq!(report.retrieval_calls, 1);
        assert_eq!(report.refined_clusters, 1);
        assert_eq!(report.removed_documents, 8);

        let entries = recorder.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, 0);
        assert_eq!(entries[0].1.len(), 8, "the full result list is recorded");
    }

    #[tokio::test]
    async fn test_keep_centroid_exact_bound_without_intruders() {
        struct Ranked;
        impl Retriever for Ranked {
            fn search_in_files<'a>(
                &'a self,
                _query: &'a str,
                candidate_filenames: &'a [String],
                top_n: usize,
            ) -> BoxFuture<'a, Result<Vec<Document>>> {
                async move {
                    Ok(candidate_filenames
                        .iter()
                        .rev()
                        .take(top_n)
                        .map(|name| Document::new(0, name, name, ""))
                        .collect())
                }
                .boxed()
            }
        }

        let members = names("d", 10);
        let refiner = ClusterRefiner::new(centroid_settings(8, 3)).with_retriever(Arc::new(Ranked));
        let mut clusters = vec![cluster(0, "vote ", &members)];
        refiner.refine(&mut clusters).await.unwrap();
        assert_eq!(clusters[0].filenames(), vec!["d9.xml", "d8.xml", "d7.xml"]);

        let refiner = ClusterRefiner::new(centroid_settings(2, 5)).with_retriever(Arc::new(Ranked));
        let mut clusters = vec![cluster(0, "vote ", &members)];
        refiner.refine(&mut clusters).await.unwrap();
        assert_eq!(clusters[0].len(), 2, "bounded by the retrieval result count");
    }

    #[tokio::test]
    async fn test_untitled_and_empty_clusters_are_not_searched() {
        let retriever = Arc::new(FakeRetriever::new(&["a.xml"]));
        let refiner = ClusterRefiner::new(centroid_settings(8, 1)).with_retriever(retriever.clone());

        let members = names("d", 4);
        let mut clusters = vec![cluster(0, "  ", &members), cluster(1, "budget ", &[])];
        let before = clusters.clone();

        let report = refiner.refine(&mut clusters).await.unwrap();
        assert_eq!(clusters, before);
        assert_eq!(retriever.calls(), 0);
        assert_eq!(report.skipped_untitled, 1);
        assert_eq!(report.retrieval_calls, 0);
    }

    #[tokio::test]
    async fn test_retrieval_failure_leaves_clusters_untouched() {
        let mut failing = FakeRetriever::new(&["b0.xml"]);
        failing.fail = true;
        let refiner = ClusterRefiner::new(centroid_settings(8, 1)).with_retriever(Arc::new(failing));

        let mut clusters = vec![cluster(0, "x ", &names("a", 3)), cluster(1, "y ", &names("b", 3))];
        let before = clusters.clone();

        let err = refiner.refine(&mut clusters).await.unwrap_err();
        assert!(err.to_string().contains("index unavailable"));
        assert_eq!(clusters, before);
    }

    #[tokio::test]
    async fn test_retrieval_timeout() {
        let mut slow = FakeRetriever::new(&["a0.xml"]);
        slow.delay = Some(Duration::from_secs(5));
        let settings = RefinementSettings {
            retrieval_timeout: Some(Duration::from_millis(20)),
            ..centroid_settings(8, 1)
        };
        let refiner = ClusterRefiner::new(settings).with_retriever(Arc::new(slow));

        let mut clusters = vec![cluster(4, "x ", &names("a", 3))];
        let err = refiner.refine(&mut clusters).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ClusteringError>(),
            Some(ClusteringError::RetrievalTimeout { cluster_id: 4, .. })
        ));
        assert_eq!(clusters[0].len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_refinement_matches_sequential() {
        let mut ranking: Vec<String> = Vec::new();
        for i in (0..6).rev() {
            ranking.extend(names(&format!("c{}-", i), 5).into_iter().rev());
        }
        let ranking: Vec<&str> = ranking.iter().map(String::as_str).collect();
        let build = || -> Vec<Cluster> {
            (0..6)
                .map(|i| cluster(i, "topic ", &names(&format!("c{}-", i), 5)))
                .collect()
        };

        let mut sequential = build();
        ClusterRefiner::new(centroid_settings(4, 2))
            .with_retriever(Arc::new(FakeRetriever::new(&ranking)))
            .refine(&mut sequential)
            .await
            .unwrap();

        let mut concurrent = build();
        let settings = RefinementSettings {
            max_concurrent_searches: 4,
            ..centroid_settings(4, 2)
        };
        let retriever = Arc::new(FakeRetriever::new(&ranking));
        ClusterRefiner::new(settings)
            .with_retriever(retriever.clone())
            .refine(&mut concurrent)
            .await
            .unwrap();

        assert_eq!(sequential, concurrent);
        assert_eq!(retriever.calls(), 6);
        assert_eq!(concurrent[2].filenames(), vec!["c2-4.xml"]);
    }

    #[tokio::test]
    async fn test_keep_centroid_requires_retriever() {
        let refiner = ClusterRefiner::new(centroid_settings(8, 1));
        let mut clusters = vec![cluster(0, "x ", &names("a", 2))];
        assert!(refiner.refine(&mut clusters).await.is_err());
    }

    #[tokio::test]
    async fn test_none_and_keep_important() {
        let mut clusters = vec![cluster(0, "budget ", &names("a", 3))];
        clusters[0].docs[1].content = "The budget vote.".to_string();
        let before = clusters.clone();

        let report = ClusterRefiner::new(RefinementSettings::default())
            .refine(&mut clusters)
            .await
            .unwrap();
        assert_eq!(clusters, before);
        assert_eq!(report, RefinementReport::default());

        let settings = RefinementSettings {
            method: DocSelectionMethod::KeepImportant,
            ..Default::default()
        };
        let report = ClusterRefiner::new(settings).refine(&mut clusters).await.unwrap();
        assert_eq!(clusters[0].filenames(), vec!["a1.xml"]);
        assert_eq!(report.refined_clusters, 1);
        assert_eq!(report.removed_documents, 2);
    }
}
