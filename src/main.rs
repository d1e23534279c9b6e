use clap::{Parser, Subcommand};
use fitsense_client::{
    config::ClientConfig,
    models::{
        upload::UploadRequest,
        wardrobe::{WardrobeCategory, WardrobeQuery},
    },
    services::{
        analysis::AnalysisClient,
        poller::{JobPoller, Observation, ProgressEvent},
    },
};
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fitsense-client", version, about = "FitSense outfit analysis client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the analysis service is reachable
    Health,
    /// Upload an outfit photo and wait for its analysis
    Analyze {
        image: PathBuf,
        #[arg(long)]
        user_id: String,
    },
    /// Show a user's full wardrobe
    Wardrobe { user_id: String },
    /// Show item counts per wardrobe category
    Summary { user_id: String },
    /// Search a user's wardrobe
    Search {
        user_id: String,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        pattern: Option<String>,
        #[arg(long)]
        category: Option<WardrobeCategory>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Structured logs go to stderr; command output goes to stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env()?;

    metrics::describe_counter!(
        "analysis_jobs_submitted_total",
        "Total outfit analysis jobs submitted"
    );
    metrics::describe_counter!(
        "analysis_jobs_completed_total",
        "Total outfit analysis jobs completed"
    );
    metrics::describe_counter!(
        "analysis_jobs_failed_total",
        "Total outfit analysis jobs that ended without results"
    );
    metrics::describe_histogram!(
        "analysis_poll_attempts",
        "Status checks needed to reach completion"
    );

    let client = AnalysisClient::from_config(&config)?;
    tracing::info!(base_url = %client.base_url(), "Analysis service client ready");

    match cli.command {
        Command::Health => {
            let report = client.health_check().await?;
            print_json(&report)?;
        }
        Command::Analyze { image, user_id } => analyze(client, &config, image, user_id).await?,
        Command::Wardrobe { user_id } => print_json(&client.wardrobe(&user_id).await?)?,
        Command::Summary { user_id } => print_json(&client.wardrobe_summary(&user_id).await?)?,
        Command::Search {
            user_id,
            color,
            pattern,
            category,
        } => {
            let query = WardrobeQuery {
                color,
                pattern,
                category,
            };
            print_json(&client.search_wardrobe(&user_id, &query).await?)?;
        }
    }

    Ok(())
}

async fn analyze(
    client: AnalysisClient,
    config: &ClientConfig,
    image: PathBuf,
    user_id: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = tokio::fs::read(&image).await?;
    let request = UploadRequest::new(bytes, user_id, &config.upload_limits())?;
    let poller = JobPoller::new(client);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling analysis");
            interrupt.cancel();
        }
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let progress = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            log_progress(&event);
        }
    });

    let result = poller
        .submit_and_await(&request, &config.poll_config(), &cancel, Some(tx))
        .await;
    let _ = progress.await;

    let outcome = result?;
    let items = outcome.results.items();
    tracing::info!(
        job_id = %outcome.job_id,
        attempts = outcome.attempts,
        items = items.len(),
        "Analysis complete"
    );
    for item in &items {
        tracing::info!(
            category = %item.category,
            color = item.color().unwrap_or("unknown"),
            pattern = item.pattern().unwrap_or("unknown"),
            "Detected item"
        );
    }

    print_json(outcome.results.raw())?;
    Ok(())
}

fn log_progress(event: &ProgressEvent) {
    match event {
        ProgressEvent::Uploading {
            bytes_sent,
            total_bytes,
        } => tracing::debug!(bytes_sent, total_bytes, "Upload progress"),
        ProgressEvent::Submitted { job_id } => tracing::info!(job_id = %job_id, "Job submitted"),
        ProgressEvent::Polled {
            attempt,
            observation: Observation::Inconclusive(reason),
        } => tracing::debug!(attempt, reason = %reason, "Status check inconclusive"),
        ProgressEvent::Polled {
            attempt,
            observation,
        } => tracing::debug!(attempt, observation = ?observation, "Status checked"),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
