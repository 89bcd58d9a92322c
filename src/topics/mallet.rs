use anyhow::{anyhow, Context, Result};
use flate2::read::GzDecoder;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::modeler::TopicModeler;
use super::types::{DocumentTopics, TermWeight, TopicModelParams, TopicModelResult};
use crate::config::ClusteringConfig;
use crate::corpus::TopicCorpus;
use crate::error::ClusteringError;
use crate::TARGET_TOPICS;

const IMPORT_FILE: &str = "corpus.tsv";
const MALLET_FILE: &str = "corpus.mallet";
const STATE_FILE: &str = "state.gz";

/// Drives the MALLET command line tool and decodes its sampler state.
#[derive(Debug, Clone)]
pub struct MalletTopicModeler {
    mallet_bin: String,
    work_dir: PathBuf,
    timeout: Option<Duration>,
    keep_work_dir: bool,
}

impl MalletTopicModeler {
    pub fn new(mallet_bin: &str, work_dir: &Path) -> Self {
        Self {
            mallet_bin: mallet_bin.to_string(),
            work_dir: work_dir.to_path_buf(),
            timeout: None,
            keep_work_dir: false,
        }
    }

    /// Builds a modeler from the binary, scratch directory, timeout and retention settings.
    pub fn from_config(config: &ClusteringConfig) -> Self {
        let modeler = Self::new(&config.mallet_bin, &config.work_dir).keep_work_dir(config.keep_work_dir);
        match config.mallet_timeout {
            Some(limit) => modeler.with_timeout(limit),
            None => modeler,
        }
    }

    /// Bounds the whole import and training sequence; the child is killed on expiry.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Keeps the scratch directory (import file, state file) for inspection.
    pub fn keep_work_dir(mut self, keep: bool) -> Self {
        self.keep_work_dir = keep;
        self
    }

    async fn run_mallet(&self, args: Vec<String>) -> Result<()> {
        debug!(target: TARGET_TOPICS, "Running {} {}", self.mallet_bin, args.join(" "));

        let output = Command::new(&self.mallet_bin)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to start {}", self.mallet_bin))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            return Err(anyhow!(
                "{} {} exited with {}: {}",
                self.mallet_bin,
                args.first().map(String::as_str).unwrap_or_default(),
                output.status,
                tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
            ));
        }
        Ok(())
    }

    async fn fit_in(
        &self,
        scratch: &Path,
        corpus: &TopicCorpus,
        params: &TopicModelParams,
    ) -> Result<TopicModelResult> {
        let import_path = scratch.join(IMPORT_FILE);
        let mallet_path = scratch.join(MALLET_FILE);
        let state_path = scratch.join(STATE_FILE);

        corpus.write_mallet_import(&import_path)?;

        self.run_mallet(vec![
            "import-file".to_string(),
            "--input".to_string(),
            import_path.display().to_string(),
            "--output".to_string(),
            mallet_path.display().to_string(),
            "--keep-sequence".to_string(),
            "--token-regex".to_string(),
            r"\S+".to_string(),
        ])
        .await?;

        let mut train_args = vec![
            "train-topics".to_string(),
            "--input".to_string(),
            mallet_path.display().to_string(),
            "--num-topics".to_string(),
            params.num_topics.to_string(),
            "--alpha".to_string(),
            params.alpha_sum().to_string(),
            "--beta".to_string(),
            params.beta.to_string(),
            "--num-iterations".to_string(),
            params.num_iterations.to_string(),
            "--num-threads".to_string(),
            params.num_threads.to_string(),
            "--optimize-interval".to_string(),
            "0".to_string(),
            "--output-state".to_string(),
            state_path.display().to_string(),
        ];
        if let Some(seed) = params.random_seed {
            train_args.push("--random-seed".to_string());
            train_args.push(seed.to_string());
        }
        self.run_mallet(train_args).await?;

        let bytes = tokio::fs::read(&state_path)
            .await
            .with_context(|| format!("Failed to read state file {}", state_path.display()))?;
        let result = parse_mallet_state(BufReader::new(GzDecoder::new(bytes.as_slice())), corpus)?;

        if result.num_topics() != params.num_topics {
            warn!(
                target: TARGET_TOPICS,
                "Requested {} topics, state file reports {}",
                params.num_topics,
                result.num_topics()
            );
        }
        Ok(result)
    }
}

impl TopicModeler for MalletTopicModeler {
    fn fit<'a>(
        &'a self,
        corpus: &'a TopicCorpus,
        params: &'a TopicModelParams,
    ) -> BoxFuture<'a, Result<TopicModelResult>> {
        async move {
            let scratch = self.work_dir.join(format!("syntopic-{}", Uuid::new_v4()));
            tokio::fs::create_dir_all(&scratch)
                .await
                .with_context(|| format!("Failed to create {}", scratch.display()))?;

            info!(
                target: TARGET_TOPICS,
                "Fitting {} topics over {} documents ({} iterations, {} threads)",
                params.num_topics,
                corpus.len(),
                params.num_iterations,
                params.num_threads
            );
            let start = Instant::now();

            let result = match self.timeout {
                Some(limit) => match timeout(limit, self.fit_in(&scratch, corpus, params)).await {
                    Ok(result) => result,
                    Err(_) => Err(anyhow!("Topic model fitting timed out after {:?}", limit)),
                },
                None => self.fit_in(&scratch, corpus, params).await,
            };

            if self.keep_work_dir {
                info!(target: TARGET_TOPICS, "Kept MALLET work directory {}", scratch.display());
            } else if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
                warn!(target: TARGET_TOPICS, "Failed to remove {}: {}", scratch.display(), e);
            }

            if result.is_ok() {
                info!(target: TARGET_TOPICS, "Topic model fitted in {:.2?}", start.elapsed());
            }
            result
        }
        .boxed()
    }
}

/// Decodes a MALLET sampler state into a [`TopicModelResult`].
///
/// The state has `#alpha : a0 a1 ...` and `#beta : b` headers followed by one
/// `doc source pos typeindex type topic` row per token. Document indices refer to the
/// instance order of `corpus`. Topic vocabulary weights are the per-topic token counts,
/// ties broken by type index.
pub fn parse_mallet_state<R: BufRead>(reader: R, corpus: &TopicCorpus) -> Result<TopicModelResult> {
    let mut alpha: Option<Vec<f64>> = None;
    let mut sequences: Vec<Vec<usize>> = vec![Vec::new(); corpus.len()];
    // topic -> typeindex -> (term, count)
    let mut type_counts: Vec<HashMap<usize, (String, u64)>> = Vec::new();

    for (line_number, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read state file")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(header) = line.strip_prefix('#') {
            if let Some(values) = header.trim().strip_prefix("alpha") {
                let values = values.trim_start().trim_start_matches(':');
                let parsed = values
                    .split_whitespace()
                    .map(|v| v.parse::<f64>())
                    .collect::<Result<Vec<f64>, _>>()
                    .map_err(|e| ClusteringError::InvalidState(format!("bad alpha line: {}", e)))?;
                type_counts = vec![HashMap::new(); parsed.len()];
                alpha = Some(parsed);
            }
            continue;
        }

        let num_topics = match &alpha {
            Some(alpha) => alpha.len(),
            None => {
                return Err(ClusteringError::InvalidState(
                    "token rows before the #alpha header".to_string(),
                )
                .into())
            }
        };

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 6 {
            return Err(ClusteringError::InvalidState(format!(
                "line {}: expected 6 fields, got {}",
                line_number + 1,
                fields.len()
            ))
            .into());
        }
        let field = |index: usize| -> Result<usize> {
            fields[index].parse::<usize>().map_err(|_| {
                ClusteringError::InvalidState(format!(
                    "line {}: {:?} is not an index",
                    line_number + 1,
                    fields[index]
                ))
                .into()
            })
        };

        // Sources may contain spaces, so read the trailing columns from the end.
        let doc = field(0)?;
        let topic = field(fields.len() - 1)?;
        let term = fields[fields.len() - 2];
        let type_index = field(fields.len() - 3)?;

        if doc >= sequences.len() {
            return Err(ClusteringError::InvalidState(format!(
                "line {}: document {} but the corpus has {}",
                line_number + 1,
                doc,
                sequences.len()
            ))
            .into());
        }
        if topic >= num_topics {
            return Err(ClusteringError::InvalidState(format!(
                "line {}: topic {} outside 0..{}",
                line_number + 1,
                topic,
                num_topics
            ))
            .into());
        }

        sequences[doc].push(topic);
        type_counts[topic]
            .entry(type_index)
            .or_insert_with(|| (term.to_string(), 0))
            .1 += 1;
    }

    let alpha = alpha.ok_or_else(|| ClusteringError::InvalidState("missing #alpha header".to_string()))?;

    let topic_words = type_counts
        .into_iter()
        .map(|counts| {
            let mut entries: Vec<(usize, String, u64)> = counts
                .into_iter()
                .map(|(type_index, (term, count))| (type_index, term, count))
                .collect();
            entries.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));
            entries
                .into_iter()
                .map(|(_, term, count)| TermWeight {
                    term,
                    weight: count as f64,
                })
                .collect()
        })
        .collect();

    let documents = corpus
        .instances
        .iter()
        .zip(sequences)
        .map(|(instance, topic_sequence)| DocumentTopics {
            name: instance.name.clone(),
            topic_sequence,
        })
        .collect();

    let num_topics = alpha.len();
    Ok(TopicModelResult::new(num_topics, documents, topic_words, alpha)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Instance;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const STATE: &str = "#doc source pos typeindex type topic
#alpha : 0.01 0.01
#beta : 0.01
0 NA 0 0 budget 0
0 NA 1 1 vote 0
0 NA 2 0 budget 0
2 NA 0 3 coast 1
2 NA 1 2 storm 1
";

    fn corpus(names: &[&str]) -> TopicCorpus {
        TopicCorpus {
            instances: names
                .iter()
                .map(|name| Instance {
                    name: name.to_string(),
                    tokens: vec![],
                })
                .collect(),
        }
    }

    fn gzip(text: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_parse_state() {
        let corpus = corpus(&["a.xml", "b.xml", "c.xml"]);
        let bytes = gzip(STATE);
        let result = parse_mallet_state(BufReader::new(GzDecoder::new(bytes.as_slice())), &corpus).unwrap();

        assert_eq!(result.num_topics(), 2);
        assert_eq!(result.alpha(), &[0.01, 0.01]);
        assert!((result.alpha_sum() - 0.02).abs() < 1e-12);
        assert_eq!(result.topic_sequence("a.xml"), Some(&[0, 0, 0][..]));
        assert_eq!(result.topic_sequence("b.xml"), Some(&[][..]));
        assert_eq!(result.topic_sequence("c.xml"), Some(&[1, 1][..]));

        let topic0: Vec<(&str, f64)> = result
            .topic_words(0)
            .iter()
            .map(|t| (t.term.as_str(), t.weight))
            .collect();
        assert_eq!(topic0, vec![("budget", 2.0), ("vote", 1.0)]);

        // storm and coast tie on count; the lower type index wins even though coast came first.
        let topic1: Vec<&str> = result.topic_words(1).iter().map(|t| t.term.as_str()).collect();
        assert_eq!(topic1, vec!["storm", "coast"]);
    }

    #[test]
    fn test_parse_state_rejects_bad_input() {
        let corpus = corpus(&["a.xml"]);

        let no_alpha = "0 NA 0 0 budget 0\n";
        assert!(parse_mallet_state(BufReader::new(no_alpha.as_bytes()), &corpus).is_err());

        let bad_doc = "#alpha : 0.1\n5 NA 0 0 budget 0\n";
        assert!(parse_mallet_state(BufReader::new(bad_doc.as_bytes()), &corpus).is_err());

        let bad_topic = "#alpha : 0.1\n0 NA 0 0 budget 3\n";
        let err = parse_mallet_state(BufReader::new(bad_topic.as_bytes()), &corpus).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ClusteringError>(),
            Some(ClusteringError::InvalidState(_))
        ));

        let short_row = "#alpha : 0.1\n0 NA 0\n";
        assert!(parse_mallet_state(BufReader::new(short_row.as_bytes()), &corpus).is_err());
    }

    #[cfg(unix)]
    fn fake_mallet(dir: &Path, fixture: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = format!(
            r#"#!/bin/sh
cmd="$1"; shift
case "$cmd" in
  import-file)
    while [ $# -gt 0 ]; do
      case "$1" in
        --input) [ -f "$2" ] || exit 3; shift ;;
        --output) touch "$2"; shift ;;
      esac
      shift
    done ;;
  train-topics)
    while [ $# -gt 0 ]; do
      case "$1" in
        --output-state) cp "{}" "$2"; shift ;;
      esac
      shift
    done ;;
  *) echo "unknown command $cmd" >&2; exit 2 ;;
esac
"#,
            fixture.display()
        );
        let path = dir.join("mallet");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fit_runs_mallet_and_cleans_up() {
        let dir = std::env::temp_dir().join(format!("syntopic-mallet-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let fixture = dir.join("fixture.gz");
        std::fs::write(&fixture, gzip(STATE)).unwrap();
        let bin = fake_mallet(&dir, &fixture);
        let work_dir = dir.join("work");

        let modeler = MalletTopicModeler::new(&bin.display().to_string(), &work_dir)
            .with_timeout(Duration::from_secs(30));
        let params = TopicModelParams {
            num_topics: 2,
            alpha_per_topic: 0.01,
            beta: 0.01,
            num_iterations: 10,
            num_threads: 1,
            random_seed: Some(1),
        };
        let corpus = corpus(&["a.xml", "b.xml", "c.xml"]);

        let result = modeler.fit(&corpus, &params).await.unwrap();
        assert_eq!(result.topic_sequence("c.xml"), Some(&[1, 1][..]));

        let leftovers = std::fs::read_dir(&work_dir).unwrap().count();
        assert_eq!(leftovers, 0, "scratch directory should be removed");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_configured_modeler_keeps_work_dir() {
        let dir = std::env::temp_dir().join(format!("syntopic-keep-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let fixture = dir.join("fixture.gz");
        std::fs::write(&fixture, gzip(STATE)).unwrap();
        let bin = fake_mallet(&dir, &fixture);

        let config = ClusteringConfig {
            mallet_bin: bin.display().to_string(),
            work_dir: dir.join("work"),
            mallet_timeout: Some(Duration::from_secs(30)),
            keep_work_dir: true,
            ..Default::default()
        };
        let modeler = MalletTopicModeler::from_config(&config);
        assert_eq!(modeler.timeout, Some(Duration::from_secs(30)));
        assert!(modeler.keep_work_dir);

        let result = modeler
            .fit(&corpus(&["a.xml", "b.xml", "c.xml"]), &config.topic_model_params())
            .await
            .unwrap();
        assert_eq!(result.topic_sequence("a.xml"), Some(&[0, 0, 0][..]));

        let kept = std::fs::read_dir(&config.work_dir).unwrap().count();
        assert_eq!(kept, 1, "scratch directory should be kept");

        let defaults = MalletTopicModeler::from_config(&ClusteringConfig::default());
        assert_eq!(defaults.timeout, None);
        assert!(!defaults.keep_work_dir);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_fit_reports_missing_binary() {
        let work_dir = std::env::temp_dir().join(format!("syntopic-missing-{}", Uuid::new_v4()));
        let modeler = MalletTopicModeler::new("/nonexistent/syntopic-mallet", &work_dir);
        let params = TopicModelParams {
            num_topics: 2,
            alpha_per_topic: 0.01,
            beta: 0.01,
            num_iterations: 10,
            num_threads: 1,
            random_seed: None,
        };
        assert!(modeler.fit(&corpus(&["a.xml"]), &params).await.is_err());
        let _ = std::fs::remove_dir_all(&work_dir);
    }
}
