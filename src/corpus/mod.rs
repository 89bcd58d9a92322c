//! Document model and the adapters that sit upstream of clustering.
//!
//! Documents arrive already parsed. This module gates them on date extraction,
//! records ingestion statistics, and turns them into token streams for the topic model.

pub mod adapter;
pub mod dates;
pub mod loader;
pub mod types;

pub use adapter::{CorpusAdapter, Instance, TopicCorpus};
pub use dates::extract_dates;
pub use loader::{load_documents, load_documents_from_reader};
pub use types::*;
