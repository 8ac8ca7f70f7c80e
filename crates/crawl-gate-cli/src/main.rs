use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crawl_gate_client::{ReqwestFetcher, RobotsPolicy};
use crawl_gate_core::traits::Fetcher;
use crawl_gate_core::config::DEFAULT_USER_AGENT;
use crawl_gate_core::{AppError, DelayGate, GateConfig, GatedFetcher, parse_delay_secs};

#[derive(Parser)]
#[command(name = "crawl-gate", version, about = "Polite crawling with per-host crawl-delay windows")]
struct Cli {
    /// Log gate transitions (same as RUST_LOG=crawl_gate=debug)
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a URL repeatedly from several workers, honouring the host's crawl-delay
    Probe(ProbeArgs),

    /// Show how the gate spaces workers out, without any network access
    Simulate {
        /// Number of concurrent workers
        #[arg(short, long, default_value_t = 3)]
        workers: usize,

        /// Windows each worker opens
        #[arg(short, long, default_value_t = 2)]
        rounds: usize,

        /// Crawl-delay in seconds
        #[arg(short, long, value_parser = parse_delay_arg)]
        delay: Duration,
    },
}

#[derive(Args)]
struct ProbeArgs {
    /// Page to fetch
    #[arg(short, long)]
    url: String,

    /// Total number of requests
    #[arg(short = 'n', long, default_value_t = 5)]
    requests: usize,

    /// Number of concurrent workers sharing the requests
    #[arg(short, long, default_value_t = 2)]
    workers: usize,

    /// Crawl-delay in seconds, overriding robots.txt
    #[arg(short, long, env = "CRAWL_DELAY_SECS", value_parser = parse_delay_arg)]
    delay: Option<Duration>,

    /// Cap for robots.txt crawl-delays, in seconds
    #[arg(
        long,
        env = "CRAWL_DELAY_MAX_SECS",
        default_value = "60",
        value_parser = parse_delay_arg
    )]
    max_delay: Duration,

    /// Product token for robots.txt and the User-Agent header
    #[arg(
        long,
        env = "CRAWL_USER_AGENT",
        default_value = DEFAULT_USER_AGENT,
        value_parser = parse_user_agent
    )]
    user_agent: String,

    /// Do not fetch robots.txt
    #[arg(long, default_value_t = false)]
    ignore_robots: bool,

    /// Print one JSON object per request instead of text
    #[arg(long, default_value_t = false)]
    json: bool,
}

/// Outcome of one probe request.
#[derive(Debug, Serialize)]
struct ProbeRecord {
    request: usize,
    worker: usize,
    /// Milliseconds from the start of the run until the response arrived.
    finished_ms: u64,
    /// Milliseconds spent at the gate plus on the wire.
    elapsed_ms: u64,
    bytes: Option<usize>,
    error: Option<String>,
    retryable: Option<bool>,
}

fn parse_delay_arg(raw: &str) -> Result<Duration, String> {
    parse_delay_secs(raw).map_err(|e| e.to_string())
}

fn parse_user_agent(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("user agent must not be empty".into());
    }
    Ok(trimmed.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let directive = if cli.verbose {
        "crawl_gate=debug"
    } else {
        "crawl_gate=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl-C received, stopping");
                shutdown.cancel();
            }
        });
    }

    match cli.command {
        Commands::Probe(args) => {
            let config = resolve_config(&args);
            cmd_probe(args, config, shutdown).await?;
        }
        Commands::Simulate {
            workers,
            rounds,
            delay,
        } => {
            cmd_simulate(workers, rounds, delay, shutdown).await?;
        }
    }

    Ok(())
}

/// Flags win over `CRAWL_*` variables (clap falls back to the environment,
/// which `.env` has been loaded into).
fn resolve_config(args: &ProbeArgs) -> GateConfig {
    GateConfig::default()
        .with_delay(args.delay)
        .with_max_delay(args.max_delay)
        .with_user_agent(args.user_agent.clone())
}

async fn cmd_probe(args: ProbeArgs, config: GateConfig, shutdown: CancellationToken) -> Result<()> {
    anyhow::ensure!(args.workers > 0, "--workers must be at least 1");

    let fetcher = ReqwestFetcher::with_options(&config.user_agent, Duration::from_secs(30))
        .context("Failed to create HTTP client")?;

    // 1. Work out the delay for this host
    let policy = if args.ignore_robots {
        RobotsPolicy::empty()
    } else {
        RobotsPolicy::fetch(&fetcher, &args.url)
            .await
            .context("Failed to load robots.txt")?
    };
    if !policy.is_allowed(&config.user_agent, &args.url) {
        anyhow::bail!(
            "robots.txt disallows {} for user agent '{}'",
            args.url,
            config.user_agent
        );
    }
    let declared = policy.crawl_delay(&config.user_agent);
    let delay = config.effective_delay(declared);
    tracing::info!(
        url = %args.url,
        declared = ?declared,
        delay = ?delay,
        "Resolved crawl-delay"
    );

    // 2. One gate for the target, shared by every worker
    let gate = DelayGate::new().with_shutdown(&shutdown);
    let gated = GatedFetcher::new(fetcher, gate, delay).with_cancellation(shutdown.clone());

    let next_request = Arc::new(AtomicUsize::new(0));
    let (tx, mut rx) = mpsc::unbounded_channel::<ProbeRecord>();
    let start = Instant::now();
    let mut workers = JoinSet::new();

    for worker in 0..args.workers {
        let gated = gated.clone();
        let next_request = Arc::clone(&next_request);
        let tx = tx.clone();
        let url = args.url.clone();
        let total = args.requests;
        let shutdown = shutdown.clone();

        workers.spawn(async move {
            loop {
                let request = next_request.fetch_add(1, Ordering::Relaxed);
                if request >= total || shutdown.is_cancelled() {
                    break;
                }

                let began = Instant::now();
                let result = gated.fetch(&url).await;
                let stop = matches!(result, Err(AppError::Gate(_)));

                let record = ProbeRecord {
                    request,
                    worker,
                    finished_ms: start.elapsed().as_millis() as u64,
                    elapsed_ms: began.elapsed().as_millis() as u64,
                    bytes: result.as_ref().ok().map(|body| body.len()),
                    retryable: result.as_ref().err().map(AppError::is_retryable),
                    error: result.err().map(|e| e.to_string()),
                };
                if tx.send(record).is_err() || stop {
                    break;
                }
            }
        });
    }
    drop(tx);

    // 3. Report as results arrive
    let mut succeeded = 0usize;
    let mut failed = 0usize;
    while let Some(record) = rx.recv().await {
        if record.error.is_none() {
            succeeded += 1;
        } else {
            failed += 1;
        }
        print_record(&record, args.json)?;
    }

    while let Some(joined) = workers.join_next().await {
        joined.context("Probe worker panicked")?;
    }

    tracing::info!(succeeded, failed, "Probe finished");
    Ok(())
}

fn print_record(record: &ProbeRecord, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(record)?);
        return Ok(());
    }

    match (&record.bytes, &record.error) {
        (Some(bytes), _) => println!(
            "  [{:>3}] worker {} at {:>7} ms: {} bytes ({} ms)",
            record.request, record.worker, record.finished_ms, bytes, record.elapsed_ms
        ),
        (None, Some(error)) => println!(
            "  [{:>3}] worker {} at {:>7} ms: FAILED{} {}",
            record.request,
            record.worker,
            record.finished_ms,
            if record.retryable == Some(true) {
                " (retryable)"
            } else {
                ""
            },
            error
        ),
        (None, None) => {}
    }
    Ok(())
}

async fn cmd_simulate(
    workers: usize,
    rounds: usize,
    delay: Duration,
    shutdown: CancellationToken,
) -> Result<()> {
    let gate = DelayGate::new().with_shutdown(&shutdown);
    let start = Instant::now();
    let mut set = JoinSet::new();

    for worker in 0..workers {
        let gate = gate.clone();
        let shutdown = shutdown.clone();
        set.spawn(async move {
            for round in 0..rounds {
                gate.enter_until(Some(delay), &shutdown).await?;
                println!(
                    "{:>9.3}s  worker {worker} round {round}: window of {delay:?} opened",
                    start.elapsed().as_secs_f64()
                );
            }
            Ok::<_, AppError>(())
        });
    }

    while let Some(joined) = set.join_next().await {
        if let Err(e) = joined.context("Simulation worker panicked")? {
            tracing::warn!(error = %e, "Worker stopped early");
        }
    }

    // Wait out the last window so the timeline ends unlocked.
    gate.enter_until(None, &shutdown).await.ok();
    println!("{:>9.3}s  gate unlocked", start.elapsed().as_secs_f64());
    Ok(())
}
