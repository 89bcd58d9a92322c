use anyhow::Result;
use clap::{Parser, Subcommand};
use prettytable::{Cell, Row, Table};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use syntopic::clustering::{cluster_documents, ClusterRefiner, ClusteringOutcome, RefinementSettings};
use syntopic::config::{ClusteringConfig, DocSelectionMethod};
use syntopic::corpus::{load_documents, CorpusAdapter, IngestReport};
use syntopic::retrieval::SearchIndex;
use syntopic::topics::{MalletTopicModeler, PrecomputedTopicModel, TopicModeler};
use syntopic::TARGET_CLUSTERING;

#[derive(Parser)]
#[clap(name = "syntopic", about = "Cluster documents by dominant topic")]
struct Cli {
    /// Directory for the rolling log file
    #[clap(long, default_value = "logs")]
    log_dir: String,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add or update documents in the full-text index
    Index {
        /// JSON Lines file of parsed documents
        #[clap(short, long)]
        documents: PathBuf,

        /// Index database path (defaults to SYNTOPIC_INDEX_PATH)
        #[clap(short, long)]
        index: Option<String>,

        /// Remove every indexed document first
        #[clap(long)]
        reset: bool,
    },

    /// Cluster documents and print the clusters
    Cluster {
        /// JSON Lines file of parsed documents
        #[clap(short, long)]
        documents: PathBuf,

        /// Precomputed topic model (JSON); MALLET is run when omitted
        #[clap(short, long)]
        model: Option<PathBuf>,

        /// Number of topics
        #[clap(short = 'k', long)]
        topics: Option<usize>,

        /// Title word count
        #[clap(long)]
        title_words: Option<usize>,

        /// Document selection method: none, keep-important or keep-centroid
        #[clap(long)]
        method: Option<String>,

        /// Reference query for keep-centroid
        #[clap(short, long)]
        query: Option<String>,

        /// Index database path (defaults to SYNTOPIC_INDEX_PATH)
        #[clap(short, long)]
        index: Option<String>,

        /// Index the documents before refining
        #[clap(long)]
        reindex: bool,

        /// Abort the MALLET run after this many seconds
        #[clap(long)]
        mallet_timeout_secs: Option<u64>,

        /// Keep MALLET's scratch directory for inspection
        #[clap(long)]
        keep_work_dir: bool,

        /// Print the outcome as JSON
        #[clap(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    syntopic::logging::configure_logging(&args.log_dir);

    match args.command {
        Commands::Index {
            documents,
            index,
            reset,
        } => {
            let config = ClusteringConfig::from_env()?;
            let index_path = index.unwrap_or(config.index_path);
            index_documents(&documents, &index_path, reset).await?;
        }
        Commands::Cluster {
            documents,
            model,
            topics,
            title_words,
            method,
            query,
            index,
            reindex,
            mallet_timeout_secs,
            keep_work_dir,
            json,
        } => {
            let mut config = ClusteringConfig::from_env()?;
            if let Some(topics) = topics {
                config.num_topics = topics;
            }
            if let Some(title_words) = title_words {
                config.title_word_count = title_words;
            }
            if let Some(method) = method {
                config.doc_selection_method = method.parse()?;
            }
            if let Some(query) = query {
                config.query = query;
            }
            if let Some(index) = index {
                config.index_path = index;
            }
            if let Some(secs) = mallet_timeout_secs {
                config.mallet_timeout = Some(Duration::from_secs(secs));
            }
            if keep_work_dir {
                config.keep_work_dir = true;
            }
            config.validate()?;

            let outcome = cluster(&documents, model.as_deref(), &config, reindex).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_clusters(&outcome);
            }
        }
    }

    Ok(())
}

async fn index_documents(documents: &Path, index_path: &str, reset: bool) -> Result<()> {
    let (docs, report) = load_documents(documents)?;
    let index = SearchIndex::open(index_path).await?;
    if reset {
        index.clear().await?;
    }
    let replaced = index.index_documents(&docs).await?;
    let total = index.document_count().await?;

    print_ingest(&report);
    println!(
        "Indexed {} documents ({} replaced); index now holds {}",
        docs.len(),
        replaced,
        total
    );
    Ok(())
}

async fn cluster(
    documents: &Path,
    model: Option<&Path>,
    config: &ClusteringConfig,
    reindex: bool,
) -> Result<ClusteringOutcome> {
    let (mut docs, report) = load_documents(documents)?;
    print_ingest(&report);

    let modeler: Box<dyn TopicModeler> = match model {
        Some(path) => Box::new(PrecomputedTopicModel::from_file(path)?),
        None => Box::new(MalletTopicModeler::from_config(config)),
    };

    let mut refiner = ClusterRefiner::new(RefinementSettings::from(config));
    if config.doc_selection_method == DocSelectionMethod::KeepCentroid {
        let index = SearchIndex::open(&config.index_path).await?;
        if reindex {
            index.index_documents(&docs).await?;
        }
        let filenames: Vec<String> = docs.iter().map(|d| d.filename.clone()).collect();
        let unindexed = index.count_unindexed(&filenames).await?;
        if unindexed > 0 {
            warn!(
                target: TARGET_CLUSTERING,
                "{} of {} documents are missing from search index {} and will drop out of \
                 keep-centroid clusters; run with --reindex or `syntopic index` first",
                unindexed,
                docs.len(),
                config.index_path
            );
        }
        refiner = refiner.with_retriever(Arc::new(index));
    }

    let settings = refiner.settings();
    info!(
        target: TARGET_CLUSTERING,
        "Clustering {} documents with selection method {} (query {:?}, {} per cluster)",
        docs.len(),
        settings.method,
        settings.query,
        settings.centroid_docs_per_cluster
    );
    cluster_documents(
        &mut docs,
        modeler.as_ref(),
        &CorpusAdapter::new(),
        &refiner,
        config,
    )
    .await
}

fn print_ingest(report: &IngestReport) {
    let mut table = Table::new();
    table.add_row(Row::new(vec![
        Cell::new("Accepted"),
        Cell::new("Skipped"),
        Cell::new("No date"),
        Cell::new("Invalid"),
        Cell::new("Replaced"),
        Cell::new("Words"),
    ]));
    table.add_row(Row::new(vec![
        Cell::new(&report.accepted.to_string()),
        Cell::new(&report.skipped().to_string()),
        Cell::new(&report.skipped_without_date.to_string()),
        Cell::new(&report.skipped_invalid.to_string()),
        Cell::new(&report.replaced_duplicates.to_string()),
        Cell::new(&report.total_words.to_string()),
    ]));
    table.printstd();
}

fn print_clusters(outcome: &ClusteringOutcome) {
    if outcome.clusters.is_empty() {
        println!("No clusters created");
        return;
    }

    let mut table = Table::new();
    table.add_row(Row::new(vec![
        Cell::new("ID"),
        Cell::new("Title"),
        Cell::new("Documents"),
        Cell::new("Members"),
    ]));

    for cluster in &outcome.clusters {
        let mut members = cluster
            .docs
            .iter()
            .take(5)
            .map(|d| d.filename.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        if cluster.len() > 5 {
            members.push_str(", ...");
        }

        table.add_row(Row::new(vec![
            Cell::new(&cluster.id.to_string()),
            Cell::new(cluster.title.trim()),
            Cell::new(&cluster.len().to_string()),
            Cell::new(&members),
        ]));
    }

    table.printstd();

    let report = &outcome.report;
    println!(
        "{} documents, {} clusters ({} empty, {} untitled, {} refined, {} searches)",
        report.documents,
        report.clusters,
        report.empty_clusters,
        report.degenerate_topics,
        report.refined_clusters,
        report.retrieval_calls
    );
}
