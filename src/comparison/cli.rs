use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::comparison::ComparisonError;
use crate::config::{AppConfig, StorageConfig, TranscriptionConfig};
use crate::types::{ComparisonRequest, RawComparisonRequest, RawRequestBatch};

#[derive(Parser, Debug)]
#[command(
    name = "singalyzer",
    version,
    about = "Compare a student's singing against a reference recording"
)]
pub struct Cli {
    /// JSON config file overlaid on the built-in defaults.
    #[arg(long, global = true, env = "SINGALYZER_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch, compare, publish and notify for one request or a batch.
    Compare(CompareArgs),
    /// Compare two local audio files and print the result JSON.
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    /// Request JSON (one object or an array)
    #[arg(
        long,
        value_name = "JSON",
        conflicts_with = "request_file",
        required_unless_present = "request_file"
    )]
    pub request_json: Option<String>,
    /// Path to a request JSON file
    #[arg(long, value_name = "PATH")]
    pub request_file: Option<PathBuf>,
    #[command(flatten)]
    pub storage: StorageArgs,
    #[command(flatten)]
    pub transcription: TranscriptionArgs,
    /// Maximum comparisons run at the same time.
    #[arg(long, env = "SINGALYZER_WORKERS")]
    pub workers: Option<usize>,
}

impl CompareArgs {
    pub fn requests(&self) -> Result<Vec<RawComparisonRequest>> {
        load_requests(self.request_file.as_deref(), self.request_json.as_deref())
    }

    /// Overlay command-line and environment settings onto `config`.
    pub fn apply(&self, config: &mut AppConfig) {
        self.storage.apply(config);
        self.transcription.apply(config);
        if let Some(workers) = self.workers {
            config.max_workers = workers;
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct StorageArgs {
    /// Store artifacts in this directory.
    #[arg(long, env = "SINGALYZER_OUTPUT_DIR", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
    /// Upload artifacts with PUT below this base URL; wins over --output-dir.
    #[arg(long, env = "SINGALYZER_UPLOAD_URL", value_name = "URL")]
    pub upload_url: Option<String>,
}

impl StorageArgs {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(base_url) = &self.upload_url {
            config.storage = StorageConfig::Http {
                base_url: base_url.clone(),
            };
        } else if let Some(root) = &self.output_dir {
            config.storage = StorageConfig::Directory { root: root.clone() };
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct TranscriptionArgs {
    /// Speech-to-text endpoint for transcript feedback on the student's take.
    #[arg(long, env = "SINGALYZER_TRANSCRIBE_URL", value_name = "URL")]
    pub transcribe_url: Option<String>,
    #[arg(
        long,
        env = "SINGALYZER_TRANSCRIBE_TOKEN",
        value_name = "TOKEN",
        hide_env_values = true
    )]
    pub transcribe_token: Option<String>,
}

impl TranscriptionArgs {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(url) = &self.transcribe_url {
            config.transcription = Some(TranscriptionConfig {
                url: url.clone(),
                token: None,
            });
        }
        if let (Some(token), Some(transcription)) =
            (&self.transcribe_token, config.transcription.as_mut())
        {
            transcription.token = Some(token.clone());
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Student recording
    #[arg(value_name = "STUDENT")]
    pub student: PathBuf,
    /// Reference recording
    #[arg(value_name = "REFERENCE")]
    pub reference: PathBuf,
    /// Write the comparison chart (SVG) here.
    #[arg(long, value_name = "PATH")]
    pub chart: Option<PathBuf>,
}

pub fn load_requests(path: Option<&Path>, json: Option<&str>) -> Result<Vec<RawComparisonRequest>> {
    if let Some(p) = path {
        let data =
            fs::read_to_string(p).with_context(|| format!("failed to read request file {:?}", p))?;
        return parse_requests(&data);
    }

    if let Some(raw) = json {
        return parse_requests(raw);
    }

    bail!("provide a request via --request-json or --request-file");
}

/// Splits a batch into runnable requests and the indices of rejected ones.
pub fn validate_requests(
    raw: Vec<RawComparisonRequest>,
) -> (Vec<ComparisonRequest>, Vec<(usize, ComparisonError)>) {
    let mut valid = Vec::with_capacity(raw.len());
    let mut rejected = Vec::new();
    for (index, request) in raw.into_iter().enumerate() {
        match request.validate() {
            Ok(request) => valid.push(request),
            Err(err) => rejected.push((index, err)),
        }
    }
    (valid, rejected)
}

fn parse_requests(raw: &str) -> Result<Vec<RawComparisonRequest>> {
    let batch: RawRequestBatch =
        serde_json::from_str(raw).context("failed to parse request JSON")?;
    let requests = batch.into_requests();
    if requests.is_empty() {
        bail!("request batch is empty");
    }
    Ok(requests)
}
