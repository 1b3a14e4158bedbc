use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tcloud::config::Config;
use tcloud::fetch::{collect, FetchError};
use tcloud::gcp::client::{format_gcp_error, Endpoints, GcpClient};
use tcloud::gcp::http::GcpHttpClient;
use tcloud::gcp::gcloud::GcloudProfiles;
use tcloud::gcp::identity::GcloudIdentitySource;
use tcloud::gcp::{projects, zones};
use tcloud::identity::{ProfileSelection, Resolution, Resolver};
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Paged listing and identity lookup for GCP
#[derive(Parser, Debug)]
#[command(name = "tcloud", version = tcloud::VERSION, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Cap on concurrent identity lookups
    #[arg(long, global = true)]
    max_concurrent_fetches: Option<usize>,

    /// Cancel outstanding work after this many seconds
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve the account behind one or more gcloud profiles
    Identity {
        /// Profile to resolve (`@default`, `@env` or a gcloud configuration name)
        #[arg(short, long)]
        profile: Vec<String>,

        /// Resolve every gcloud configuration on disk
        #[arg(long, conflicts_with = "profile")]
        all: bool,

        /// Region to use; more than one enables multi-region mode
        #[arg(short, long)]
        region: Vec<String>,
    },
    /// List active projects
    Projects {
        /// Stop after this many projects (0 lists everything)
        #[arg(short, long, default_value_t = 0)]
        limit: usize,
    },
    /// List Compute Engine zones
    Zones {
        /// GCP project to use
        #[arg(short, long)]
        project: Option<String>,

        /// Only zones in this region
        #[arg(short, long)]
        region: Option<String>,

        /// Stop after this many zones (0 lists everything)
        #[arg(short, long, default_value_t = 0)]
        limit: usize,
    },
    /// Save default project and region
    Config {
        #[arg(short, long)]
        project: Option<String>,

        #[arg(short, long)]
        region: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Logging disabled: cannot open {:?}: {}", log_path, e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("tcloud {} started with log level: {:?}", tcloud::VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("tcloud").join("tcloud.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".tcloud").join("tcloud.log");
    }
    PathBuf::from("tcloud.log")
}

/// Token fired by Ctrl-C or by the `--timeout` deadline
fn cancellation(timeout: Option<u64>) -> CancellationToken {
    let cancel = CancellationToken::new();

    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling");
            on_signal.cancel();
        }
    });

    if let Some(secs) = timeout {
        let on_deadline = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            tracing::info!("Timeout of {}s reached, cancelling", secs);
            on_deadline.cancel();
        });
    }

    cancel
}

/// Log the full error, hand the user the short form
fn report(e: FetchError) -> anyhow::Error {
    if e.is_cancelled() {
        return anyhow::anyhow!("Cancelled");
    }
    tracing::error!("Fetch failed: {:#}", e);
    anyhow::anyhow!(format_gcp_error(&e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    let mut config = Config::load();
    if let Some(cap) = args.max_concurrent_fetches {
        config.max_concurrent_fetches = Some(cap);
    }
    let cancel = cancellation(args.timeout);

    match args.command {
        Command::Identity {
            profile,
            all,
            region,
        } => run_identity(config, profile, all, region, &cancel).await,
        Command::Projects { limit } => run_projects(limit, &cancel).await,
        Command::Zones {
            project,
            region,
            limit,
        } => run_zones(&config, project, region, limit, &cancel).await,
        // Reload so flag overrides never get persisted
        Command::Config { project, region } => run_config(Config::load(), project, region),
    }
}

async fn run_identity(
    mut config: Config,
    profiles: Vec<String>,
    all: bool,
    regions: Vec<String>,
    cancel: &CancellationToken,
) -> Result<()> {
    let gcloud = GcloudProfiles::discover();

    let selections = if all {
        gcloud
            .configuration_names()
            .into_iter()
            .map(ProfileSelection::Named)
            .collect()
    } else if !profiles.is_empty() {
        ProfileSelection::parse_all(&profiles)?
    } else {
        config.profile_selections()?
    };

    match regions.len() {
        0 => {}
        1 => config.region = regions.first().cloned(),
        _ => config.regions = regions,
    }

    // Each profile loads its own credentials inside its unit
    let source = Arc::new(GcloudIdentitySource::new(
        gcloud.clone(),
        GcpHttpClient::new()?,
        Endpoints::default(),
    ));
    let resolver = Resolver::from_config(source, &config);
    let resolution = resolver.resolve(&selections, cancel).await;

    print_resolution(&config, &gcloud, &resolution);

    if let Some(warning) = resolution.warning() {
        if resolution.accounts.is_empty() {
            return Err(anyhow::anyhow!(warning));
        }
        eprintln!("Warning: {}", warning);
    }
    Ok(())
}

fn print_resolution(config: &Config, gcloud: &GcloudProfiles, resolution: &Resolution) {
    if config.is_multi_region() {
        println!("regions: {}", config.regions.join(", "));
    } else {
        // CLI/config region wins over the one read from the profile
        let region = config
            .region
            .clone()
            .or_else(|| resolution.region.clone())
            .unwrap_or_else(|| config.effective_region(gcloud));
        println!("region: {}", region);
    }

    for (profile, account) in &resolution.accounts {
        println!("{:<24} {}", profile, account);
    }
}

async fn run_projects(limit: usize, cancel: &CancellationToken) -> Result<()> {
    let client = GcpClient::new().await?;

    let projects = if limit == 0 {
        projects::list_projects(&client, cancel)
            .await
            .map_err(report)?
    } else {
        let mut pages = projects::project_pages(&client, cancel.clone());
        let collected = collect(&mut pages, limit).await;
        if !pages.is_exhausted() && collected.error.is_none() {
            eprintln!("Showing first {}; more projects available", limit);
        }
        collected.into_result().map_err(report)?
    };

    for project in &projects {
        println!(
            "{:<32} {:<16} {}",
            project.project_id, project.project_number, project.name
        );
    }
    Ok(())
}

async fn run_zones(
    config: &Config,
    project: Option<String>,
    region: Option<String>,
    limit: usize,
    cancel: &CancellationToken,
) -> Result<()> {
    let gcloud = GcloudProfiles::discover();
    let project = project
        .or_else(|| config.effective_project(&gcloud))
        .context("No project configured. Pass --project or run 'tcloud config --project <id>'")?;

    let client = GcpClient::new().await?;

    let zones = if limit == 0 {
        zones::list_zones(&client, &project, region.as_deref(), cancel)
            .await
            .map_err(report)?
    } else {
        let mut pages = zones::zone_pages(&client, &project, region.as_deref(), cancel.clone());
        collect(&mut pages, limit).await.into_result().map_err(report)?
    };

    for zone in &zones {
        println!("{:<28} {:<24} {}", zone.name, zone.region, zone.status);
    }
    Ok(())
}

fn run_config(mut config: Config, project: Option<String>, region: Option<String>) -> Result<()> {
    if let Some(project) = project {
        config.set_project(&project)?;
    }
    if let Some(region) = region {
        config.set_region(&region)?;
    }

    let gcloud = GcloudProfiles::discover();
    println!(
        "project: {}",
        config
            .effective_project(&gcloud)
            .unwrap_or_else(|| "-".to_string())
    );
    println!("region: {}", config.effective_region(&gcloud));
    println!(
        "max concurrent fetches: {}",
        config.effective_max_concurrent_fetches()
    );
    Ok(())
}
