use tracing::info;

use super::index::SearchIndex;
use crate::TARGET_INDEX;

impl SearchIndex {
    pub(crate) async fn initialize_schema(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.pool().acquire().await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                filename TEXT PRIMARY KEY,
                doc_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                contents TEXT NOT NULL,
                word_count INTEGER NOT NULL,
                dates TEXT NOT NULL DEFAULT '[]', -- JSON array of ISO dates
                indexed_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_documents_doc_id ON documents (doc_id);

            -- Full-text side; filename joins back to documents
            CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(
                filename UNINDEXED,
                title,
                date,
                contents,
                tokenize = 'unicode61 remove_diacritics 2'
            );
            "#,
        )
        .execute(&mut *conn)
        .await?;

        info!(target: TARGET_INDEX, "Search index schema ready");
        Ok(())
    }
}
