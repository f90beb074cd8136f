use std::fs;
use std::io::{self, Write};

use anyhow::{ensure, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use singalyzer::comparison::analyzer::Analyzer;
use singalyzer::comparison::cli::{validate_requests, AnalyzeArgs, Cli, Command, CompareArgs};
use singalyzer::comparison::pipeline::{Pipeline, PipelineOutcome, StageLog};
use singalyzer::config::AppConfig;
use singalyzer::services::{store_from_config, HttpTranscriber, UrlFetcher, WebhookNotifier};

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    match cli.command {
        Command::Compare(args) => handle_compare(config, &args),
        Command::Analyze(args) => handle_analyze(config, &args),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn handle_compare(mut config: AppConfig, args: &CompareArgs) -> Result<()> {
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    let raw = args.requests().context("failed to load comparison requests")?;
    let total = raw.len();
    let (requests, rejected) = validate_requests(raw);
    for (index, err) in &rejected {
        error!(index, error = %err, "request #{index} is invalid; skipping it");
    }
    ensure!(!requests.is_empty(), "none of the {total} requests is valid");
    info!(requests = requests.len(), workers = config.max_workers, "starting comparisons");

    let mut pipeline = Pipeline::new(
        &config,
        UrlFetcher::from_config(&config)?,
        store_from_config(&config)?,
        WebhookNotifier::new(&config.network)?,
    )?;
    if let Some(transcription) = &config.transcription {
        pipeline = pipeline.with_transcriber(HttpTranscriber::new(transcription, &config.network)?);
    }
    let outcomes = if requests.len() == 1 {
        vec![pipeline.run(&requests[0])]
    } else {
        pipeline.run_batch(&requests)
    };

    let payloads: Vec<_> = outcomes.iter().map(|outcome| &outcome.payload).collect();
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &payloads).context("failed to write payloads")?;
    writeln!(stdout)?;

    let failed: Vec<&PipelineOutcome> = outcomes.iter().filter(|o| !o.is_success()).collect();
    ensure!(
        failed.is_empty() && rejected.is_empty(),
        "{} of {} comparisons failed and {} of {} requests were invalid",
        failed.len(),
        outcomes.len(),
        rejected.len(),
        total
    );
    Ok(())
}

fn handle_analyze(config: AppConfig, args: &AnalyzeArgs) -> Result<()> {
    let student = fs::read(&args.student)
        .with_context(|| format!("failed to read student recording {:?}", args.student))?;
    let reference = fs::read(&args.reference)
        .with_context(|| format!("failed to read reference recording {:?}", args.reference))?;

    let analyzer = Analyzer::new(config.analysis);
    let mut log = StageLog::new("local");
    let analysis = analyzer.analyze(&student, &reference, &mut log)?;
    log.finish();

    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &analysis.result)
        .context("failed to write result")?;
    writeln!(stdout)?;

    if let Some(path) = &args.chart {
        match &analysis.chart {
            Some(chart) => fs::write(path, &chart.bytes)
                .with_context(|| format!("failed to write chart {:?}", path))?,
            None => warn!(path = %path.display(), "no chart was rendered; nothing written"),
        }
    }
    Ok(())
}
