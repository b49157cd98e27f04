use std::{
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use rustydigest::{
    config, logging,
    pipeline::{
        AnalysisSection, DigestService, FinalSummary, PipelineOverrides, ProgressEvent,
        SizeEstimator,
    },
    summarization::get_summarizer,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "digest",
    about = "Condense a long document into one synthesis via recursive map-reduce summarization"
)]
struct Cli {
    /// Document to summarize, or `-` to read stdin.
    input: PathBuf,
    /// JSON file holding an array of `{category, content}` analysis sections.
    #[arg(long)]
    sections: Option<PathBuf>,
    /// Maximum cumulative summary size considered final.
    #[arg(long)]
    token_max: Option<usize>,
    /// Number of leading chunks to keep.
    #[arg(long)]
    chunk_count_limit: Option<usize>,
    /// Maximum number of collapse rounds.
    #[arg(long)]
    recursion_limit: Option<u32>,
    /// Maximum chunk length in estimator tokens.
    #[arg(long)]
    chunk_size: Option<usize>,
    /// Tokens shared between consecutive chunks.
    #[arg(long)]
    chunk_overlap: Option<usize>,
    /// Maximum number of summarizer calls in flight.
    #[arg(long)]
    map_concurrency: Option<usize>,
    /// Cancel the run after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Print state transitions to stderr.
    #[arg(long)]
    progress: bool,
    /// Print the full result as JSON instead of the bare synthesis.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn overrides(&self) -> PipelineOverrides {
        PipelineOverrides {
            token_max: self.token_max,
            chunk_count_limit: self.chunk_count_limit,
            recursion_limit: self.recursion_limit,
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            map_concurrency: self.map_concurrency,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init_config().context("failed to load configuration")?;
    logging::init_tracing();

    let document = read_document(&cli.input)?;
    let sections = match &cli.sections {
        Some(path) => read_sections(path)?,
        None => Vec::new(),
    };

    let summarizer = get_summarizer(config).context("failed to build summarizer")?;
    let run_timeout = cli
        .timeout_secs
        .map(Duration::from_secs)
        .or(config.run_timeout);
    let service = DigestService::new(
        summarizer,
        SizeEstimator::for_model(&config.tokenizer_model),
        config.pipeline_config(),
        run_timeout,
    );

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("interrupted; cancelling run");
                cancel.cancel();
            }
        })
    };

    let (progress, printer) = if cli.progress {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Some(sender), Some(tokio::spawn(print_progress(receiver))))
    } else {
        (None, None)
    };

    let result = service
        .summarize_with(&document, sections, cli.overrides(), &cancel, progress)
        .await;
    interrupt.abort();
    if let Some(printer) = printer {
        // Sender dropped with the run, so the printer drains and exits.
        let _ = printer.await;
    }

    let summary = result.context("digest run failed")?;
    print_summary(&summary, cli.json)
}

fn read_document(input: &Path) -> Result<String> {
    if input == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read document from stdin")?;
        return Ok(buffer);
    }
    fs::read_to_string(input)
        .with_context(|| format!("failed to read document at {}", input.display()))
}

fn read_sections(path: &Path) -> Result<Vec<AnalysisSection>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read sections at {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse sections JSON at {}", path.display()))
}

async fn print_progress(mut receiver: mpsc::UnboundedReceiver<ProgressEvent>) {
    while let Some(event) = receiver.recv().await {
        eprintln!("[{}] round {}", event.state, event.round_count);
    }
}

fn print_summary(summary: &FinalSummary, json: bool) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut stdout, summary).context("failed to encode result")?;
        writeln!(stdout)?;
    } else {
        writeln!(stdout, "{}", summary.final_summary)?;
        if summary.dropped_chunks > 0 {
            eprintln!(
                "note: {} trailing chunk(s) exceeded the chunk limit and were not summarized",
                summary.dropped_chunks
            );
        }
    }
    Ok(())
}
