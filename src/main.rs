use clap::Parser;
use gratte::backends::BackendRegistry;
use gratte::engine::{Scraper, SearchIntent};
use gratte::types::BackendId;
use gratte::Config;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Search arXiv, Google Scholar and Scopus with one boolean query and
/// collect the results into a CSV table.
#[derive(Debug, Parser)]
#[command(name = "gratte", version, about)]
struct Cli {
    /// Keywords to include (AND, OR, quoted phrases)
    #[arg(long)]
    include: String,

    /// Keywords to exclude (each word is negated)
    #[arg(long, default_value = "")]
    exclude: String,

    /// Backends to search (arxiv, scholar, scopus)
    #[arg(long = "backend", value_delimiter = ',', default_value = "arxiv")]
    backends: Vec<BackendId>,

    /// Number of results per backend (defaults to SCRAPE_MAX_RESULTS)
    #[arg(long)]
    max_results: Option<usize>,

    /// Where to write the CSV result table
    #[arg(long, default_value = "results.csv")]
    output: PathBuf,

    /// Validate and print the compiled queries without retrieving
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gratte=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let (registry, refused) = BackendRegistry::from_config(&config);
    for refusal in &refused {
        warn!("{}", refusal);
    }

    let intent = SearchIntent {
        include_text: cli.include,
        exclude_text: cli.exclude,
        backends: cli.backends,
        max_results_per_backend: cli.max_results.unwrap_or(config.pacing.max_results),
    };

    let scraper = Scraper::new(registry, config.pacing.clone());
    let prepared = scraper.prepare(intent)?;

    println!("Expression: {}", prepared.canonical);
    for (backend, query) in &prepared.queries {
        println!("{} request: {}", backend.display_name(), query);
    }
    for (backend, reason) in &prepared.skipped {
        println!("{} skipped: {}", backend.display_name(), reason);
    }
    println!(
        "Estimated time: {}",
        gratte::engine::human_time(prepared.estimated_secs as i64)
    );

    if cli.dry_run {
        return Ok(());
    }

    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::channel(64);
    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);

    // Ctrl-C requests cooperative cancellation; already-collected
    // results still come back.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    let job = tokio::spawn(async move { scraper.run(prepared, progress_tx, cancel_rx).await });

    while let Some(snapshot) = progress_rx.recv().await {
        info!(
            found = snapshot.found,
            total_estimate = snapshot.total_estimate,
            "{}",
            snapshot.time_remaining
        );
    }

    let outcome = job.await?;
    info!(state = ?outcome.state, papers = outcome.papers.len(), "job finished");
    for failure in &outcome.failures {
        warn!(backend = %failure.backend, "backend failed: {}", failure.reason);
    }

    let file = std::fs::File::create(&cli.output)?;
    gratte::export::write_csv(&outcome.papers, file)?;
    println!(
        "Wrote {} results to {}",
        outcome.papers.len(),
        cli.output.display()
    );

    Ok(())
}
