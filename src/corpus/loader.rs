use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};
use unicode_segmentation::UnicodeSegmentation;

use super::dates::extract_dates;
use super::types::{Document, IngestReport, RawDocument, DEFAULT_TITLE};
use crate::TARGET_CORPUS;

/// Number of Unicode words in `text`.
pub fn count_words(text: &str) -> usize {
    text.unicode_words().count()
}

/// Loads pre-parsed documents from a JSON Lines file.
///
/// # Arguments
/// * `path` - File with one `{"filename", "title", "content"}` record per line
///
/// # Returns
/// * `Ok((documents, report))` - Accepted documents in file order and ingestion statistics
/// * `Err` - If the file cannot be opened or read
pub fn load_documents(path: &Path) -> Result<(Vec<Document>, IngestReport)> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open document file {}", path.display()))?;
    let (documents, report) = load_documents_from_reader(BufReader::new(file))?;

    info!(
        target: TARGET_CORPUS,
        "Loaded {} documents from {} ({} skipped: {} without dates, {} invalid; {} replaced; {} words)",
        report.accepted,
        path.display(),
        report.skipped(),
        report.skipped_without_date,
        report.skipped_invalid,
        report.replaced_duplicates,
        report.total_words
    );

    Ok((documents, report))
}

/// Loads documents from any buffered reader; see [`load_documents`].
///
/// Records that do not parse are skipped and counted, as are documents without an
/// extractable date. A missing or blank title is replaced with [`DEFAULT_TITLE`]. A record
/// whose filename was already loaded updates that document and keeps its position.
pub fn load_documents_from_reader<R: BufRead>(reader: R) -> Result<(Vec<Document>, IngestReport)> {
    let mut documents: Vec<Document> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut report = IngestReport::default();

    for (line_number, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", line_number + 1))?;
        if line.trim().is_empty() {
            continue;
        }

        let raw: RawDocument = match serde_json::from_str(&line) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(target: TARGET_CORPUS, "Skipping invalid record on line {}: {}", line_number + 1, e);
                report.skipped_invalid += 1;
                continue;
            }
        };

        if raw.filename.trim().is_empty() {
            warn!(target: TARGET_CORPUS, "Skipping record on line {} without a filename", line_number + 1);
            report.skipped_invalid += 1;
            continue;
        }

        let dates = extract_dates(&raw.content, &raw.filename);
        if dates.is_empty() {
            debug!(target: TARGET_CORPUS, "Skipping {}: no extractable date", raw.filename);
            report.skipped_without_date += 1;
            continue;
        }

        let title = raw
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        let word_count = count_words(&raw.content);

        // Filenames are the document key: a later record updates the earlier one in place.
        if let Some(&position) = positions.get(&raw.filename) {
            warn!(
                target: TARGET_CORPUS,
                "Line {} replaces the earlier record for {}",
                line_number + 1,
                raw.filename
            );
            let existing = &mut documents[position];
            report.total_words = report.total_words - existing.word_count as u64 + word_count as u64;
            report.replaced_duplicates += 1;
            existing.id = raw.id.unwrap_or(existing.id);
            existing.title = title;
            existing.content = raw.content;
            existing.word_count = word_count;
            existing.dates = dates;
            continue;
        }

        report.accepted += 1;
        report.total_words += word_count as u64;

        positions.insert(raw.filename.clone(), documents.len());
        documents.push(Document {
            id: raw.id.unwrap_or(documents.len() as i64),
            filename: raw.filename,
            title,
            content: raw.content,
            word_count,
            dates,
            cluster_id: None,
        });
    }

    Ok((documents, report))
}
