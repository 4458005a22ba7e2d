use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;

use quote_scraper::config::{Settings, DEFAULT_OUTPUT, DEFAULT_URL};
use quote_scraper::Pipeline;

#[derive(Parser)]
#[command(name = "quote_scraper", about = "Scrape inspirational quotes from a page into CSV")]
struct Cli {
    /// Page to scrape
    #[arg(default_value = DEFAULT_URL)]
    url: String,
    /// CSV file to write
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,
    /// Parse a saved HTML page instead of fetching the URL
    #[arg(long, value_name = "PATH")]
    from_file: Option<PathBuf>,
    /// Also write the parsed page, pretty-printed (e.g. prettify.html)
    #[arg(long, value_name = "PATH")]
    dump_html: Option<PathBuf>,
    /// Per-attempt timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
    /// Total fetch attempts
    #[arg(long)]
    retries: Option<u32>,
    /// Settings file (default: ./quote_scraper.toml if present)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let code = match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("Done in {}", format_duration(elapsed));
    }
    code
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(secs) = cli.timeout {
        settings.fetch.timeout_secs = secs;
    }
    if let Some(n) = cli.retries {
        settings.fetch.max_retries = n;
    }

    let mut pipeline = Pipeline::from_settings(&settings)?;
    if let Some(path) = cli.dump_html {
        pipeline = pipeline.with_html_dump(path);
    }

    let result = match &cli.from_file {
        Some(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            pipeline.run_bytes(&path.display().to_string(), &bytes, None, &cli.output)
        }
        None => {
            pipeline
                .run_until(&cli.url, &cli.output, shutdown_signal())
                .await
        }
    };

    match result {
        Ok(report) => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                report.print();
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    warn!("Interrupted, aborting run");
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{}m {}s", secs / 60, secs % 60)
    }
}
