use serde::Serialize;
use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

use crate::corpus::Document;

/// A group of documents sharing a dominant topic.
///
/// One cluster exists per topic index, including topics no document ended up in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    pub id: usize,
    pub title: String,
    pub docs: Vec<Document>,
}

impl Cluster {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            title: String::new(),
            docs: Vec::new(),
        }
    }

    pub fn add_document(&mut self, doc: Document) {
        self.docs.push(doc);
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// A blank title marks a topic with no usable vocabulary.
    pub fn has_title(&self) -> bool {
        !self.title.trim().is_empty()
    }

    pub fn filenames(&self) -> Vec<String> {
        self.docs.iter().map(|d| d.filename.clone()).collect()
    }

    /// Keeps only the members named in `filenames`, reordered to follow that list.
    ///
    /// Names that are not members are ignored, so the result is always a subset.
    pub fn keep_only_given_docs(&mut self, filenames: &[String]) {
        let mut remaining: Vec<Option<Document>> = self.docs.drain(..).map(Some).collect();
        let mut kept = Vec::with_capacity(filenames.len().min(remaining.len()));

        for filename in filenames {
            if let Some(slot) = remaining
                .iter_mut()
                .find(|slot| matches!(slot, Some(doc) if &doc.filename == filename))
            {
                kept.extend(slot.take());
            }
        }

        self.docs = kept;
    }

    /// Keeps the members that mention at least one of the title terms.
    ///
    /// Matching is on whole lowercase words over the document title and content.
    /// When the title is blank or nothing matches, membership is left as is.
    ///
    /// # Returns
    /// * Number of documents removed
    pub fn keep_only_important_docs(&mut self) -> usize {
        let terms: HashSet<String> = self
            .title
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        if terms.is_empty() {
            return 0;
        }

        let important: Vec<bool> = self
            .docs
            .iter()
            .map(|doc| {
                doc.title
                    .unicode_words()
                    .chain(doc.content.unicode_words())
                    .any(|word| terms.contains(&word.to_lowercase()))
            })
            .collect();

        if !important.iter().any(|keep| *keep) {
            return 0;
        }

        let before = self.docs.len();
        let mut flags = important.into_iter();
        self.docs.retain(|_| flags.next().unwrap_or(false));
        before - self.docs.len()
    }
}

/// Counters for one clustering run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClusteringReport {
    pub documents: usize,
    pub clusters: usize,
    pub empty_clusters: usize,
    /// Topics whose title came out blank.
    pub degenerate_topics: usize,
    /// Clusters whose membership shrank during refinement.
    pub refined_clusters: usize,
    pub retrieval_calls: usize,
}

/// Clusters produced by a run, with the run's counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClusteringOutcome {
    pub clusters: Vec<Cluster>,
    pub report: ClusteringReport,
}
