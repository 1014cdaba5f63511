mod report;

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use toolprobe::{HarnessConfig, RunSummary, TestRunner};

use crate::report::ConsoleReporter;

#[derive(Parser)]
#[command(
    name = "toolprobe",
    about = "Check that a chat model routes prompts to the right tools",
    version
)]
struct Cli {
    /// Print per-case configuration, transcripts and timings.
    #[arg(short, long)]
    verbose: bool,
    /// Path to a toolprobe.toml. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// List the test cases and the registered tools, then exit.
    #[arg(long)]
    list: bool,
    /// Run a single prompt instead of the test catalog.
    prompt: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so they never interleave with the report on stdout.
fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => HarnessConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => HarnessConfig::default(),
    };

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("SIGINT received");
            signal_cancel.cancel();
        }
    });

    if cli.list {
        return list(&config);
    }
    if !cli.prompt.is_empty() {
        return single_shot(&config, &cli.prompt.join(" "), cancel).await;
    }
    run_catalog(&config, cli.verbose, cancel).await
}

fn list(config: &HarnessConfig) -> Result<ExitCode> {
    let session = config
        .session(&config.model)
        .context("failed to build session")?;
    println!("Tools:");
    for name in session.registry().names() {
        println!("  {name}");
    }
    println!("\nTest cases:");
    for case in config.catalog() {
        println!("  {}: {}", case.name, case.prompt);
    }
    Ok(ExitCode::SUCCESS)
}

async fn single_shot(
    config: &HarnessConfig,
    prompt: &str,
    cancel: CancellationToken,
) -> Result<ExitCode> {
    let mut session = config
        .session(&config.model)
        .context("failed to build session")?
        .with_cancellation(cancel);

    let on_text = |text: &str| {
        print!("{text}");
        let _ = std::io::stdout().flush();
    };
    let transcript = session.run_turn(prompt, &on_text).await?;
    println!();

    if !transcript.calls.is_empty() {
        eprintln!("Called: {}", transcript.call_names().join(", "));
    }
    eprintln!(
        "Tokens: {} in / {} out | Rounds: {}",
        transcript.usage.input_tokens, transcript.usage.output_tokens, transcript.rounds
    );
    Ok(ExitCode::SUCCESS)
}

async fn run_catalog(
    config: &HarnessConfig,
    verbose: bool,
    cancel: CancellationToken,
) -> Result<ExitCode> {
    let cases = config.catalog();
    let reporter = Arc::new(ConsoleReporter::new(verbose));
    reporter.header(config, &cases);

    let runner = TestRunner::new().with_observer(reporter.clone());
    let results = runner
        .run(&cases, |case| {
            Ok(config
                .session(config.model_for(case))?
                .with_cancellation(cancel.clone()))
        })
        .await;

    let summary = RunSummary::from_results(&results);
    reporter.summary(&summary);
    Ok(if summary.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
