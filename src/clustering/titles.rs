use tracing::debug;

use crate::topics::{TermWeight, TopicModelResult};
use crate::TARGET_CLUSTERING;

/// Builds a cluster title from a topic's vocabulary.
///
/// Takes the first `title_word_count - 1` terms of `words`, which must already be in
/// descending weight order, each followed by a single space. A topic with no vocabulary,
/// or `title_word_count <= 1`, yields an empty title.
///
/// The title deliberately holds one term fewer than `title_word_count`; existing consumers
/// depend on that length.
pub fn topic_title(words: &[TermWeight], title_word_count: usize) -> String {
    words
        .iter()
        .take(title_word_count.saturating_sub(1))
        .fold(String::new(), |mut title, word| {
            title.push_str(&word.term);
            title.push(' ');
            title
        })
}

/// One title per topic, indexed by topic id.
pub fn generate_titles(model: &TopicModelResult, title_word_count: usize) -> Vec<String> {
    (0..model.num_topics())
        .map(|topic| {
            let title = topic_title(model.topic_words(topic), title_word_count);
            debug!(target: TARGET_CLUSTERING, "Topic {} title: {:?}", topic, title);
            title
        })
        .collect()
}
