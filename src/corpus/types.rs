use serde::{Deserialize, Serialize};

/// Title assigned to documents that arrive without one.
pub const DEFAULT_TITLE: &str = "DEFAULT";

/// A parsed document ready for clustering.
///
/// `filename` is the unique key shared with the search index and the topic model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub filename: String,
    pub title: String,
    pub content: String,
    pub word_count: usize,
    #[serde(default)]
    pub dates: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<usize>,
}

impl Document {
    pub fn new(id: i64, filename: &str, title: &str, content: &str) -> Self {
        Self {
            id,
            filename: filename.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            word_count: super::loader::count_words(content),
            dates: Vec::new(),
            cluster_id: None,
        }
    }

    /// Dates joined the way they are stored in the search index.
    pub fn date_text(&self) -> String {
        self.dates.join(" ")
    }
}

/// A document record as produced by the upstream parser.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDocument {
    #[serde(default)]
    pub id: Option<i64>,
    pub filename: String,
    #[serde(default)]
    pub title: Option<String>,
    pub content: String,
}

/// Outcome of loading a document collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub accepted: usize,
    pub skipped_without_date: usize,
    pub skipped_invalid: usize,
    /// Records that updated an earlier document with the same filename.
    pub replaced_duplicates: usize,
    pub total_words: u64,
}

impl IngestReport {
    pub fn skipped(&self) -> usize {
        self.skipped_without_date + self.skipped_invalid
    }
}
