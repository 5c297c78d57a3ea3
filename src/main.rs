//! Meterdash - dashboard reports for water-utility billing backends
//!
//! A CLI that gathers every dashboard source for a site from the billing
//! REST API in parallel and renders whatever arrived, flagging the sources
//! that could not be loaded.
//!
//! Exit codes:
//!   0 - Success (including partial data, unless --fail-on-partial is set)
//!   1 - Runtime error (config, invalid arguments, composition fault)
//!   2 - Some sources failed and --fail-on-partial was set

mod aggregator;
mod cli;
mod client;
mod clock;
mod config;
mod models;
mod report;
mod view_state;

use aggregator::sources::SourceSettings;
use aggregator::Aggregator;
use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use client::{
    BearerAuth, CredentialStore, FileCredentials, HttpClient, HttpClientConfig,
    MemoryCredentials, UnauthorizedRedirect,
};
use clock::{Clock, FixedClock, SystemClock};
use config::{Config, CONFIG_FILE};
use indicatif::{ProgressBar, ProgressStyle};
use models::{Report, ReportBody, ReportMetadata};
use report::RenderOptions;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use view_state::{LatestOnly, Ticket};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("Meterdash v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Could not load: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .meterdash.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to set the backend URL, token file, and source limits.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Everything one aggregation run needs, shared with watch-mode tasks.
struct Session {
    aggregator: Aggregator<HttpClient>,
    reauth_required: Arc<AtomicBool>,
}

/// Run the report workflow. Returns exit code (0 or 2).
async fn run(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let session = Arc::new(build_session(&args, &config)?);
    let options = RenderOptions::from(&config.report);

    if args.site_id().trim().is_empty() {
        warn!("No site given; every source will be empty");
    }

    if let Some(interval) = args.watch {
        return watch(session, args, config, options, interval).await;
    }

    let report = fetch_report(&session, &args, !args.quiet).await?;
    write_report(&report, &config, &options)?;

    if !args.quiet {
        print_summary(&report);
    }
    notify_reauth(&session);

    if args.fail_on_partial && report.body.aggregate().is_partial() {
        eprintln!("\n⛔ Some sources failed. Failing (exit code 2).");
        return Ok(2);
    }

    Ok(0)
}

/// Wire credentials, middleware, client, and clock into an aggregator.
fn build_session(args: &Args, config: &Config) -> Result<Session> {
    let credentials: Arc<dyn CredentialStore> = match (&args.token, &config.api.token_file) {
        (Some(token), _) => Arc::new(MemoryCredentials::new(Some(token.clone()))),
        (None, Some(path)) => {
            let store = FileCredentials::new(path.clone());
            debug!("Reading token from {}", store.path().display());
            Arc::new(store)
        }
        (None, None) => Arc::new(MemoryCredentials::default()),
    };

    if credentials.token().is_none() {
        warn!("No bearer token configured; requests are sent unauthenticated");
    }

    let reauth_required = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&reauth_required);

    let client = HttpClient::builder(HttpClientConfig {
        base_url: config.api.base_url.clone(),
        timeout_seconds: config.api.timeout_seconds,
    })
    .with_request_interceptor(Arc::new(BearerAuth::new(Arc::clone(&credentials))))
    .with_response_interceptor(Arc::new(UnauthorizedRedirect::new(
        credentials,
        Arc::new(move || flag.store(true, Ordering::SeqCst)),
    )))
    .build()
    .context("Failed to create HTTP client")?;

    info!("Backend: {}", client.base_url());

    let clock: Arc<dyn Clock> = match args.today {
        Some(date) => Arc::new(FixedClock::new(date)),
        None => Arc::new(SystemClock),
    };

    Ok(Session {
        aggregator: Aggregator::new(
            Arc::new(client),
            clock,
            SourceSettings::from(&config.sources),
        ),
        reauth_required,
    })
}

/// Aggregate the requested view and wrap it with metadata.
async fn fetch_report(session: &Session, args: &Args, show_progress: bool) -> Result<Report> {
    let site = args.site_id();

    let spinner = if show_progress {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("Loading sources for {}...", site));
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    } else {
        None
    };

    let start = Instant::now();
    let (body, range) = match args.resident.as_deref() {
        Some(resident) => {
            let aggregate = session
                .aggregator
                .aggregate_resident_view(Some(site), Some(resident))
                .await
                .context("Could not load resident view")?;
            (ReportBody::Resident(aggregate), None)
        }
        None => {
            let range = session.aggregator.resolve_range(args.range());
            let aggregate = session
                .aggregator
                .aggregate(Some(site), Some(range))
                .await
                .context("Could not load dashboard")?;
            (ReportBody::Dashboard(aggregate), Some(range))
        }
    };
    let duration = start.elapsed().as_secs_f64();

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let aggregate = body.aggregate();
    let metadata = ReportMetadata {
        site: site.to_string(),
        resident: args.resident.clone(),
        range,
        generated_at: Utc::now(),
        sources_total: aggregate.sources().len(),
        sources_failed: aggregate.failures().len(),
        duration_seconds: duration,
    };

    Ok(Report { metadata, body })
}

/// Render the report and write it to the configured destination.
fn write_report(report: &Report, config: &Config, options: &RenderOptions) -> Result<()> {
    let output = match config.general.format {
        OutputFormat::Json => report::generate_json_report(report)?,
        OutputFormat::Markdown => report::generate_markdown_report(report, options),
    };

    match config.general.output {
        Some(ref path) => {
            std::fs::write(path, &output)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!("Report saved to {}", path.display());
        }
        None => println!("{}", output),
    }

    Ok(())
}

fn print_summary(report: &Report) {
    let aggregate = report.body.aggregate();
    let failed = aggregate.failures().len();

    eprintln!("\n📊 Summary:");
    eprintln!(
        "   Sources: {} ok, {} failed",
        aggregate.sources().len() - failed,
        failed
    );
    for failure in aggregate.failures() {
        eprintln!("   ⚠️  {}: {}", failure.source, failure.message);
    }
    eprintln!("   Duration: {:.2}s", report.metadata.duration_seconds);
}

/// Tell the user to log in again if the backend rejected the token.
fn notify_reauth(session: &Session) {
    if session.reauth_required.swap(false, Ordering::SeqCst) {
        eprintln!("\n🔒 The backend rejected the stored credentials; they have been cleared.");
        eprintln!("   Log in again and pass a fresh --token.");
    }
}

/// Refresh the report every `interval` seconds until Ctrl-C.
///
/// Each refresh runs as its own task. Ticks that fire while a refresh is
/// still running are skipped, so a slow refresh is rendered once it lands.
async fn watch(
    session: Arc<Session>,
    args: Args,
    config: Config,
    options: RenderOptions,
    interval: u64,
) -> Result<i32> {
    let latest: LatestOnly<Report> = LatestOnly::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<(Ticket, Result<Report>)>();
    let args = Arc::new(args);

    let mut ticker = tokio::time::interval(Duration::from_secs(interval));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!("Refreshing every {}s, press Ctrl-C to stop", interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if latest.is_pending() {
                    debug!("Previous refresh still running, skipping this tick");
                } else {
                    let ticket = latest.begin();
                    let tx = tx.clone();
                    let session = Arc::clone(&session);
                    let args = Arc::clone(&args);
                    tokio::spawn(async move {
                        let result = fetch_report(&session, &args, false).await;
                        let _ = tx.send((ticket, result));
                    });
                }
            }
            Some((ticket, result)) = rx.recv() => {
                match result {
                    Ok(report) => {
                        if latest.complete(ticket, report.clone()) {
                            write_report(&report, &config, &options)?;
                            if !args.quiet {
                                print_summary(&report);
                            }
                        }
                    }
                    Err(e) => {
                        if latest.abandon(ticket) {
                            error!("Refresh failed: {:#}", e);
                        }
                    }
                }
                notify_reauth(&session);
            }
            _ = tokio::signal::ctrl_c() => {
                if let Some(last) = latest.current() {
                    info!("Last refresh at {}", last.metadata.generated_at);
                }
                info!("Stopping watch");
                return Ok(0);
            }
        }
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
