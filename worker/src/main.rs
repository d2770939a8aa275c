//! `leadgrid` - run collection jobs from the command line.

mod state;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use leadgrid_core::{estimate_api_calls, estimate_cost_usd, generate_grid, AppConfig, Coordinates};
use leadgrid_db::{leads, Layer};
use leadgrid_pipeline::JobRequest;
use state::AppState;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "leadgrid", version, about = "Collect business leads over a search area")]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true, env = "LEADGRID_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a job and wait for it to finish
    Run(JobArgs),
    /// Create a batch of jobs sharing a keyword and radius
    Batch {
        /// Batch name
        #[arg(long)]
        name: String,
        /// Address to notify when the batch finishes
        #[arg(long)]
        notify_email: Option<String>,
        /// Search keyword for every job
        #[arg(long)]
        keyword: String,
        /// Search radius in kilometres
        #[arg(long, default_value_t = 5.0)]
        radius_km: f64,
        /// One location per job, in run order
        #[arg(long = "location", required = true)]
        locations: Vec<String>,
    },
    /// Re-run one layer of an existing job
    Layer {
        job_id: String,
        #[arg(value_enum)]
        layer: LayerArg,
        /// Run the supplementary layer past its monthly quota
        #[arg(long)]
        override_quota: bool,
    },
    /// Cancel a job, keeping the leads collected so far
    Cancel { job_id: String },
    /// Print a job as JSON
    Status { job_id: String },
    /// Resume tasks interrupted by a previous run
    Recover,
    /// Show the grid size and estimated cost of a search
    Estimate {
        #[arg(long, allow_hyphen_values = true, default_value_t = 0.0)]
        latitude: f64,
        #[arg(long, allow_hyphen_values = true, default_value_t = 0.0)]
        longitude: f64,
        #[arg(long, default_value_t = 5.0)]
        radius_km: f64,
    },
}

#[derive(Args)]
struct JobArgs {
    /// Search keyword, e.g. "coffee"
    #[arg(long)]
    keyword: String,
    /// Free-text location to geocode
    #[arg(long, conflicts_with_all = ["latitude", "longitude"])]
    location: Option<String>,
    #[arg(long, requires = "longitude", allow_hyphen_values = true)]
    latitude: Option<f64>,
    #[arg(long, requires = "latitude", allow_hyphen_values = true)]
    longitude: Option<f64>,
    /// Search radius in kilometres
    #[arg(long, default_value_t = 5.0)]
    radius_km: f64,
}

impl JobArgs {
    fn request(&self) -> Result<JobRequest> {
        match (&self.location, self.latitude, self.longitude) {
            (_, Some(lat), Some(lng)) => Ok(JobRequest::coordinates(
                &self.keyword,
                Coordinates::checked(lat, lng)?,
                self.radius_km,
            )),
            (Some(location), _, _) => Ok(JobRequest::address(
                &self.keyword,
                location,
                self.radius_km,
            )),
            _ => bail!("either --location or --latitude/--longitude is required"),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum LayerArg {
    Primary,
    Serp,
    Enrichment,
}

impl From<LayerArg> for Layer {
    fn from(arg: LayerArg) -> Self {
        match arg {
            LayerArg::Primary => Layer::Playwright,
            LayerArg::Serp => Layer::SerpApi,
            LayerArg::Enrichment => Layer::Enrichment,
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,leadgrid=debug"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    let mut config = match path {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => AppConfig::load()?,
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_ref())?;

    if let Command::Estimate {
        latitude,
        longitude,
        radius_km,
    } = cli.command
    {
        let center = Coordinates::checked(latitude, longitude)?;
        let points = generate_grid(center, radius_km, config.grid.overlap_factor)?;
        let calls = estimate_api_calls(points.len());
        println!("grid points:  {}", points.len());
        println!("place calls:  {}", calls.place_calls);
        println!("serp calls:   {}", calls.serp_calls);
        println!("cost (USD):   {:.4}", estimate_cost_usd(points.len()));
        return Ok(());
    }

    let state = AppState::open(config).await?;
    let result = dispatch(&state, cli.command).await;
    state.db.clone().close().await;
    result
}

async fn dispatch(state: &AppState, command: Command) -> Result<()> {
    match command {
        Command::Run(args) => {
            let job = state.pipeline.create_job(&args.request()?).await?;
            tracing::info!("Job {} queued", job.id);
            wait(state, Some(&job.id)).await?;
            print_job(state, &job.id).await
        }
        Command::Batch {
            name,
            notify_email,
            keyword,
            radius_km,
            locations,
        } => {
            let requests: Vec<JobRequest> = locations
                .iter()
                .map(|location| JobRequest::address(&keyword, location, radius_km))
                .collect();
            let batch = state
                .pipeline
                .create_batch(&name, notify_email.as_deref(), &requests)
                .await?;
            tracing::info!("Batch {} queued with {} jobs", batch.id, batch.total_jobs);
            wait(state, None).await?;
            let batch = state.pipeline.batch(&batch.id).await?;
            println!("{}", serde_json::to_string_pretty(&batch)?);
            Ok(())
        }
        Command::Layer {
            job_id,
            layer,
            override_quota,
        } => {
            let task_id = state
                .pipeline
                .trigger_layer(&job_id, layer.into(), override_quota)
                .await?;
            tracing::info!("Layer task {} queued", task_id);
            wait(state, Some(&job_id)).await?;
            print_job(state, &job_id).await
        }
        Command::Cancel { job_id } => {
            let job = state.pipeline.cancel(&job_id).await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
            Ok(())
        }
        Command::Status { job_id } => print_job(state, &job_id).await,
        Command::Recover => {
            let resumed = state.queue.recover().await?;
            tracing::info!("Resumed {} interrupted task(s)", resumed);
            wait(state, None).await
        }
        Command::Estimate { .. } => Ok(()),
    }
}

/// Wait for queued work. Ctrl-C cancels `job_id` when one is given.
async fn wait(state: &AppState, job_id: Option<&str>) -> Result<()> {
    tokio::select! {
        () = state.drain() => Ok(()),
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::warn!("Interrupted");
            if let Some(job_id) = job_id {
                if let Err(e) = state.pipeline.cancel(job_id).await {
                    tracing::warn!("Could not cancel job {}: {}", job_id, e);
                }
            }
            Ok(())
        }
    }
}

async fn print_job(state: &AppState, job_id: &str) -> Result<()> {
    let job = state.pipeline.job(job_id).await?;
    let pool = state.db.pool();
    let total = leads::count_leads(pool, job_id).await?;
    let with_email = leads::count_with_email(pool, job_id).await?;

    println!("{}", serde_json::to_string_pretty(&job)?);
    println!("leads: {total} ({with_email} with email)");
    Ok(())
}
