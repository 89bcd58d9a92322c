use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

use super::types::Document;

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and",
        "any", "are", "as", "at", "be", "because", "been", "before", "being", "below", "between",
        "both", "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during",
        "each", "few", "for", "from", "further", "had", "has", "have", "having", "he", "her",
        "here", "hers", "herself", "him", "himself", "his", "how", "i", "if", "in", "into", "is",
        "it", "its", "itself", "just", "me", "more", "most", "mr", "mrs", "ms", "my", "myself",
        "no", "nor", "not", "now", "of", "off", "on", "once", "only", "or", "other", "our",
        "ours", "ourselves", "out", "over", "own", "said", "same", "says", "she", "should", "so",
        "some", "such", "than", "that", "the", "their", "theirs", "them", "themselves", "then",
        "there", "these", "they", "this", "those", "through", "to", "too", "under", "until",
        "up", "very", "was", "we", "were", "what", "when", "where", "which", "while", "who",
        "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
        "yourselves",
    ]
    .into_iter()
    .collect()
});

/// One document as seen by the topic model: its identifier and token stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub name: String,
    pub tokens: Vec<String>,
}

/// The corpus in topic-model form, in the same order as the source documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicCorpus {
    pub instances: Vec<Instance>,
}

impl TopicCorpus {
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Writes the corpus in MALLET's one-instance-per-line import format:
    /// `name<TAB>label<TAB>space separated tokens`.
    pub fn write_mallet_import(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create import file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        for instance in &self.instances {
            writeln!(
                writer,
                "{}\tX\t{}",
                sanitize_field(&instance.name),
                instance.tokens.join(" ")
            )?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn sanitize_field(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}

/// Converts documents into token streams for the topic model.
#[derive(Debug, Clone, Default)]
pub struct CorpusAdapter {
    extra_stop_words: HashSet<String>,
}

impl CorpusAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds corpus specific stop words on top of the built-in English list.
    pub fn with_stop_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extra_stop_words
            .extend(words.into_iter().map(|w| w.as_ref().to_lowercase()));
        self
    }

    pub fn to_topic_corpus(&self, documents: &[Document]) -> TopicCorpus {
        TopicCorpus {
            instances: documents
                .iter()
                .map(|doc| Instance {
                    name: doc.filename.clone(),
                    tokens: self.tokenize(&format!("{} {}", doc.title, doc.content)),
                })
                .collect(),
        }
    }

    /// Lowercased NFKC word tokens with stop words, numerals and single characters removed.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let normalized: String = text.nfkc().collect();
        normalized
            .unicode_words()
            .map(|word| word.to_lowercase())
            .filter(|word| word.chars().count() > 1)
            .filter(|word| !word.chars().all(|c| c.is_numeric()))
            .filter(|word| !STOP_WORDS.contains(word.as_str()))
            .filter(|word| !self.extra_stop_words.contains(word))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_filters_noise() {
        let adapter = CorpusAdapter::new();
        assert_eq!(
            adapter.tokenize("The Senate passed 3 bills in 2004, a record."),
            vec!["senate", "passed", "bills", "record"]
        );
    }

    #[test]
    fn test_tokenize_normalizes_compatibility_forms() {
        let adapter = CorpusAdapter::new();
        // Fullwidth letters fold to ASCII under NFKC.
        assert_eq!(adapter.tokenize("ＥＵ summit"), vec!["eu", "summit"]);
    }

    #[test]
    fn test_extra_stop_words() {
        let adapter = CorpusAdapter::new().with_stop_words(["Reuters"]);
        assert_eq!(adapter.tokenize("Reuters reports growth"), vec!["reports", "growth"]);
    }

    #[test]
    fn test_topic_corpus_preserves_order_and_names() {
        let docs = vec![
            Document::new(0, "b.xml", "Trade talks", "Tariffs dominate trade talks."),
            Document::new(1, "a.xml", "Storm", "A storm hit the coast."),
        ];
        let corpus = CorpusAdapter::new().to_topic_corpus(&docs);
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.instances[0].name, "b.xml");
        assert_eq!(
            corpus.instances[0].tokens,
            vec!["trade", "talks", "tariffs", "dominate", "trade", "talks"]
        );
        assert_eq!(corpus.instances[1].name, "a.xml");
        assert_eq!(corpus.instances[1].tokens, vec!["storm", "storm", "hit", "coast"]);
    }

    #[test]
    fn test_write_mallet_import() {
        let dir = std::env::temp_dir().join(format!("syntopic-import-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("corpus.tsv");

        let corpus = TopicCorpus {
            instances: vec![
                Instance {
                    name: "odd\tname.xml".to_string(),
                    tokens: vec!["alpha".to_string(), "beta".to_string()],
                },
                Instance {
                    name: "empty.xml".to_string(),
                    tokens: vec![],
                },
            ],
        };
        corpus.write_mallet_import(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "odd name.xml\tX\talpha beta\nempty.xml\tX\t\n");
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
