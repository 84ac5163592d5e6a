use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use planet_fetch::aoi::AoiSource;
use planet_fetch::catalog;
use planet_fetch::config::{
    default_bundles, default_cloud_cover, default_item_types, AcquisitionRequest, ApiKey,
    OutputOptions, ProviderConfig, DEFAULT_DOWNLOAD_DIR,
};
use planet_fetch::metadata;
use planet_fetch::orchestrator::{self, RunOutcome};
use planet_fetch::order::DownloadOptions;
use planet_fetch::order_plan::OrderPlan;
use planet_fetch::planet::Provider;
use planet_fetch::vector::VectorFormat;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::info;

const NO_MATCHES: &str = "No images found. Make filters more flexible.";

#[derive(Parser)]
#[command(name = "planet-fetch", version, about = "Bulk Planet imagery search and ordering")]
struct Cli {
    /// Planet API key, falls back to PL_API_KEY
    #[arg(long, global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search, write metadata, then order and download every match
    Download {
        #[command(flatten)]
        request: RequestArgs,
        #[command(flatten)]
        output: OutputArgs,
        /// Replace files that already exist
        #[arg(long)]
        overwrite: bool,
        /// Hide download progress bars
        #[arg(long)]
        no_progress: bool,
        /// Record order progress in this file so the run can be resumed
        #[arg(long)]
        ledger: Option<PathBuf>,
    },
    /// Search and write metadata without ordering
    Search {
        #[command(flatten)]
        request: RequestArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Continue the orders recorded in a ledger file
    Resume {
        ledger: PathBuf,
    },
}

#[derive(Args)]
struct RequestArgs {
    /// TOML acquisition request; replaces the flags below
    #[arg(
        long,
        conflicts_with_all = ["aoi", "start_date", "end_date", "item_types", "bundles", "cloud_cover"]
    )]
    request: Option<PathBuf>,
    /// Vector file path or inline GeoJSON
    #[arg(long, required_unless_present = "request")]
    aoi: Option<AoiSource>,
    /// YYYY-MM-DD, inclusive
    #[arg(long, required_unless_present = "request")]
    start_date: Option<String>,
    /// YYYY-MM-DD, inclusive
    #[arg(long, required_unless_present = "request")]
    end_date: Option<String>,
    #[arg(long = "item-type")]
    item_types: Vec<String>,
    #[arg(long = "bundle")]
    bundles: Vec<String>,
    /// Maximum cloud cover fraction
    #[arg(long)]
    cloud_cover: Option<f64>,
}

impl RequestArgs {
    fn into_request(self) -> Result<AcquisitionRequest> {
        if let Some(path) = self.request {
            return AcquisitionRequest::read(path);
        }
        let missing = |flag: &str| anyhow!("--{flag} is required without --request");
        Ok(AcquisitionRequest {
            aoi: self.aoi.ok_or_else(|| missing("aoi"))?,
            start_date: self.start_date.ok_or_else(|| missing("start-date"))?,
            end_date: self.end_date.ok_or_else(|| missing("end-date"))?,
            item_types: non_empty_or(self.item_types, default_item_types),
            bundles: non_empty_or(self.bundles, default_bundles),
            cloud_cover: self.cloud_cover.unwrap_or_else(default_cloud_cover),
            provider: ProviderConfig::default(),
        })
    }
}

fn non_empty_or(values: Vec<String>, default: fn() -> Vec<String>) -> Vec<String> {
    if values.is_empty() {
        default()
    } else {
        values
    }
}

#[derive(Args)]
struct OutputArgs {
    #[arg(long, default_value = DEFAULT_DOWNLOAD_DIR)]
    out: PathBuf,
    /// GeoJSON, or GPKG for a GeoPackage
    #[arg(long, default_value = "GeoJSON", value_parser = parse_format)]
    metadata_format: VectorFormat,
}

fn parse_format(driver: &str) -> Result<VectorFormat, String> {
    Ok(VectorFormat::from_driver(driver))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let api_key = ApiKey::resolve(cli.api_key)?;
    let started = Instant::now();

    let code = match cli.command {
        Command::Download {
            request,
            output,
            overwrite,
            no_progress,
            ledger,
        } => {
            let request = request.into_request()?;
            let provider = Provider::new(api_key, request.provider.clone());
            let output = OutputOptions {
                download_dir: output.out,
                metadata_format: output.metadata_format,
                download: DownloadOptions {
                    overwrite,
                    show_progress: !no_progress,
                },
                ledger,
            };
            match orchestrator::run(&provider, &provider, &request, &output).await? {
                RunOutcome::NoMatches => no_matches(),
                RunOutcome::Completed { scenes, orders, metadata } => {
                    info!(
                        "Ordered {} scenes in {} orders, metadata at {}",
                        scenes,
                        orders,
                        metadata.display()
                    );
                    ExitCode::SUCCESS
                }
            }
        }
        Command::Search { request, output } => {
            let request = request.into_request()?;
            let provider = Provider::new(api_key, request.provider.clone());
            let aoi = request.aoi.resolve()?;
            let scenes = catalog::search_scenes(&provider, &aoi, &request.query()).await?;
            if scenes.is_empty() {
                no_matches()
            } else {
                std::fs::create_dir_all(&output.out)?;
                metadata::persist(&scenes, &output.out, output.metadata_format)?;
                ExitCode::SUCCESS
            }
        }
        Command::Resume { ledger } => {
            let mut plan = OrderPlan::read(&ledger)?;
            let provider = Provider::new(api_key, plan.provider.clone());
            info!("{} of {} orders left", plan.pending(), plan.tasks.len());
            plan.execute(&provider).await?;
            ExitCode::SUCCESS
        }
    };

    info!(
        "Finished in {:.2} minutes",
        started.elapsed().as_secs_f64() / 60.0
    );
    Ok(code)
}

fn no_matches() -> ExitCode {
    eprintln!("{NO_MATCHES}");
    ExitCode::FAILURE
}
