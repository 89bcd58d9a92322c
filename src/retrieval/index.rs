use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous},
    Pool, Row, Sqlite,
};
use std::str::FromStr;
use tokio::time::Duration;
use tracing::{debug, info, instrument};
use unicode_segmentation::UnicodeSegmentation;

use super::Retriever;
use crate::corpus::Document;
use crate::TARGET_INDEX;

/// SQLite FTS5 index over documents, keyed by filename.
#[derive(Clone)]
pub struct SearchIndex {
    pool: Pool<Sqlite>,
}

impl SearchIndex {
    /// Get access to the connection pool
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Opens (creating if needed) the index stored at `path`.
    #[instrument(target = "search_index", level = "info")]
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        info!(target: TARGET_INDEX, "Opening search index at {}", path);

        let connect_options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;

        let index = SearchIndex { pool };
        index.initialize_schema().await?;
        Ok(index)
    }

    /// A private in-memory index. Every pooled connection would see its own database,
    /// so the pool is pinned to a single long-lived connection.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_options)
            .await?;

        let index = SearchIndex { pool };
        index.initialize_schema().await?;
        Ok(index)
    }

    /// Adds `doc`, or replaces the stored copy with the same filename.
    ///
    /// # Returns
    /// * `Ok(true)` if an existing document was replaced, `Ok(false)` if it was added
    pub async fn upsert_document(&self, doc: &Document) -> Result<bool, sqlx::Error> {
        let dates = serde_json::to_string(&doc.dates).unwrap_or_else(|_| "[]".to_string());
        let mut tx = self.pool.begin().await?;

        let existed = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM documents WHERE filename = ?")
            .bind(&doc.filename)
            .fetch_one(&mut *tx)
            .await?
            > 0;

        sqlx::query(
            r#"
            INSERT INTO documents (filename, doc_id, title, contents, word_count, dates, indexed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(filename) DO UPDATE SET
                doc_id = excluded.doc_id,
                title = excluded.title,
                contents = excluded.contents,
                word_count = excluded.word_count,
                dates = excluded.dates,
                indexed_at = excluded.indexed_at
            "#,
        )
        .bind(&doc.filename)
        .bind(doc.id)
        .bind(&doc.title)
        .bind(&doc.content)
        .bind(doc.word_count as i64)
        .bind(&dates)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM documents_fts WHERE filename = ?")
            .bind(&doc.filename)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO documents_fts (filename, title, date, contents) VALUES (?1, ?2, ?3, ?4)")
            .bind(&doc.filename)
            .bind(&doc.title)
            .bind(doc.date_text())
            .bind(&doc.content)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(existed)
    }

    /// Indexes every document; returns how many replaced an existing entry.
    pub async fn index_documents(&self, docs: &[Document]) -> Result<usize, sqlx::Error> {
        let mut replaced = 0;
        for doc in docs {
            if self.upsert_document(doc).await? {
                replaced += 1;
            }
        }
        info!(
            target: TARGET_INDEX,
            "Indexed {} documents ({} added, {} replaced)",
            docs.len(),
            docs.len() - replaced,
            replaced
        );
        Ok(replaced)
    }

    /// Removes every document from the index.
    pub async fn clear(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM documents").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM documents_fts").execute(&mut *tx).await?;
        tx.commit().await?;
        info!(target: TARGET_INDEX, "Cleared search index");
        Ok(())
    }

    pub async fn document_count(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(self.pool())
            .await
    }

    /// Counts how many of `filenames` have no entry in the index.
    pub async fn count_unindexed(&self, filenames: &[String]) -> Result<i64, sqlx::Error> {
        let names = serde_json::to_string(filenames).unwrap_or_else(|_| "[]".to_string());
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM json_each(?1) WHERE value NOT IN (SELECT filename FROM documents)",
        )
        .bind(&names)
        .fetch_one(self.pool())
        .await
    }

    /// Ranks `candidate_filenames` against `query` by BM25, best first.
    ///
    /// Equal scores are ordered by filename so results are reproducible.
    pub async fn search(
        &self,
        query: &str,
        candidate_filenames: &[String],
        top_n: usize,
    ) -> Result<Vec<Document>, sqlx::Error> {
        let match_expr = match fts_query(query) {
            Some(expr) => expr,
            None => return Ok(Vec::new()),
        };
        if candidate_filenames.is_empty() || top_n == 0 {
            return Ok(Vec::new());
        }
        let candidates =
            serde_json::to_string(candidate_filenames).unwrap_or_else(|_| "[]".to_string());

        let rows = sqlx::query(
            r#"
            SELECT d.doc_id, d.filename, d.title, d.contents, d.word_count, d.dates
            FROM (
                SELECT filename, bm25(documents_fts) AS score
                FROM documents_fts
                WHERE documents_fts MATCH ?1
                  AND filename IN (SELECT value FROM json_each(?2))
                ORDER BY score, filename
                LIMIT ?3
            ) AS hits
            JOIN documents d ON d.filename = hits.filename
            ORDER BY hits.score, hits.filename
            "#,
        )
        .bind(&match_expr)
        .bind(&candidates)
        .bind(top_n as i64)
        .fetch_all(self.pool())
        .await?;

        debug!(
            target: TARGET_INDEX,
            "Query {:?} over {} candidates returned {} documents",
            match_expr,
            candidate_filenames.len(),
            rows.len()
        );

        Ok(rows.iter().map(document_from_row).collect())
    }
}

fn document_from_row(row: &SqliteRow) -> Document {
    let dates: String = row.get("dates");
    Document {
        id: row.get("doc_id"),
        filename: row.get("filename"),
        title: row.get("title"),
        content: row.get("contents"),
        word_count: row.get::<i64, _>("word_count").max(0) as usize,
        dates: serde_json::from_str(&dates).unwrap_or_default(),
        cluster_id: None,
    }
}

/// Turns free text into an FTS5 expression matching any of its words.
///
/// Every word is quoted, so FTS5 operators and punctuation in the input are taken
/// literally. Returns `None` when the text has no words.
pub fn fts_query(text: &str) -> Option<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in text.unicode_words() {
        let term = format!("\"{}\"", word.to_lowercase().replace('"', "\"\""));
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

impl Retriever for SearchIndex {
    fn search_in_files<'a>(
        &'a self,
        query: &'a str,
        candidate_filenames: &'a [String],
        top_n: usize,
    ) -> BoxFuture<'a, Result<Vec<Document>>> {
        async move { Ok(self.search(query, candidate_filenames, top_n).await?) }.boxed()
    }
}
