//! CLI entry point for the turn-sequence sampler.
//!
//! Provides subcommands for running the full pipeline over the configured
//! places, estimating the call volume of a run without paying for it, and
//! recomputing statistics from the stored tables.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use turn_sequence::{
    analyzers::aggregate::build_report,
    config::Config,
    error::PipelineError,
    fetch::{BasicClient, Dispatcher, TokioSleeper, auth::{ApiKey, UrlParam}},
    infra::{
        google::{RoadsClient, RoutesClient},
        keys::{EnvKeyStore, KeyStore},
        nominatim::NominatimClient,
    },
    pipeline::{Pipeline, PlaceRun, plan_place},
    routes::RouteStage,
    snap::SnapStage,
    stats::CityStatistics,
    storage::{
        CsvStore, TabularStore,
        records::{PendingWrites, read_directions, read_places},
    },
};

#[derive(Parser)]
#[command(name = "turn_sequence")]
#[command(about = "Samples driving routes in cities and measures how often turns alternate", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline for every configured place and store the results
    Run {
        /// JSON run configuration
        #[arg(short, long, default_value = "turn_sequence.json")]
        config: PathBuf,
    },
    /// Geocode and sample the configured places, reporting the routing calls a run would need
    Plan {
        /// JSON run configuration
        #[arg(short, long, default_value = "turn_sequence.json")]
        config: PathBuf,
    },
    /// Recompute statistics from the stored Directions table
    Report {
        /// JSON run configuration
        #[arg(short, long, default_value = "turn_sequence.json")]
        config: PathBuf,

        /// Optional: write the report as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let _file_guard = init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            let config = Config::load(&config)?;
            run(&config).await?;
        }
        Commands::Plan { config } => {
            let config = Config::load(&config)?;
            plan(&config).await?;
        }
        Commands::Report { config, output } => {
            let config = Config::load(&config)?;
            report(&config, output.as_deref())?;
        }
    }

    Ok(())
}

/// Logging setup: colored stderr + JSON rolling log file.
fn init_tracing() -> WorkerGuard {
    let log_file_path =
        std::env::var("LOG_FILE").unwrap_or_else(|_| "logs/turn_sequence.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("turn_sequence.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new("info")));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(
            EnvFilter::try_from_env("RUST_LOG_JSON").unwrap_or_else(|_| EnvFilter::new("debug")),
        );

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    file_guard
}

/// Wires the HTTP adapters into a [`Pipeline`].
async fn build_pipeline(config: &Config, cancel: CancellationToken) -> Result<Pipeline> {
    let keys = EnvKeyStore::new();
    let api_key = keys.get(&config.credentials.maps_api_key).await?;
    let timeout = config.retry.call_timeout;

    let geocoder = NominatimClient::new(
        BasicClient::with_user_agent(timeout, &config.geocoder.user_agent)?,
        &config.geocoder.url,
    );
    let snapper = RoadsClient::new(
        UrlParam::google(BasicClient::new(timeout)?, &api_key),
        &config.snap.url,
        config.snap.batch_size,
    );
    let router = RoutesClient::new(
        ApiKey::google(BasicClient::new(timeout)?, &api_key)
            .context("API key is not a valid header value")?,
        &config.routing.url,
    );
    let sleeper = Arc::new(TokioSleeper);

    Ok(Pipeline {
        geocoder: Arc::new(geocoder),
        snap: SnapStage {
            snapper: Arc::new(snapper),
            dispatcher: Arc::new(Dispatcher::new(
                config.snap.concurrency,
                config.snap.requests_per_second,
            )),
            retry: config.retry.clone(),
            sleeper: sleeper.clone(),
            on_failure: config.snap.on_failure,
        },
        routes: RouteStage::new(
            Arc::new(router),
            Arc::new(Dispatcher::new(
                config.routing.concurrency,
                config.routing.requests_per_second,
            )),
            config.retry.clone(),
            sleeper,
            config.routing.max_calls,
            cancel,
        ),
        classifier: config.classifier.clone(),
        pair_mode: config.pair_mode,
        guard: config.routing.guard(),
    })
}

fn percent(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}

fn log_statistics(scope: &str, stats: Option<&CityStatistics>) {
    match stats {
        Some(s) => info!(
            scope,
            routes = s.routes,
            mean = %percent(s.mean),
            stddev = %percent(s.stddev),
            ci_lower = %percent(s.ci_lower),
            ci_upper = %percent(s.ci_upper),
            "Alternating turn fraction"
        ),
        None => warn!(scope, "No route with a defined alternating fraction"),
    }
}

fn log_run(run: &PlaceRun) {
    let s = &run.summary;
    info!(
        place = %run.place,
        points_sampled = s.points_sampled,
        points_no_road = s.points_no_road,
        points_snap_failed = s.points_snap_failed,
        points_merged = s.points_merged,
        snapped_points = s.snapped_points,
        routes_planned = s.routes_planned,
        routes_attempted = s.routes_attempted,
        routes_not_found = s.routes_not_found,
        routes_failed = s.routes_failed,
        routes_skipped = s.routes_skipped,
        routes_with_ratio = s.routes_with_ratio,
        "Run summary"
    );
    log_statistics(&run.place.display_name, run.statistics.as_ref());
}

/// Writes a run, retrying only the writes that have not succeeded yet.
async fn persist(store: &dyn TabularStore, config: &Config, run: &PlaceRun) -> Result<()> {
    let mut pending = PendingWrites::for_run(&config.storage.schema, run);
    let attempts = config.storage.write_attempts;
    for attempt in 1..=attempts {
        match pending.flush(store) {
            Ok(()) => return Ok(()),
            Err(e) if attempt < attempts => {
                let delay = config.retry.backoff(attempt, 0.0);
                warn!(attempt, attempts, ?delay, error = %e, "Persisting run failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return Err(PipelineError::Storage(e))
                    .with_context(|| format!("failed to persist results for {}", run.place));
            }
        }
    }
    Ok(())
}

#[tracing::instrument(skip_all, fields(places = config.places.len(), granularity = config.granularity))]
async fn run(config: &Config) -> Result<()> {
    let cancel = CancellationToken::new();
    let pipeline = build_pipeline(config, cancel.clone()).await?;
    let store = CsvStore::open(&config.storage.dir)?;

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight routes");
            ctrl_c.cancel();
        }
    });

    let mut all_fractions = Vec::new();
    let mut failed_writes = Vec::new();

    for name in &config.places {
        if cancel.is_cancelled() {
            warn!(place = %name, "Run cancelled, skipping place");
            continue;
        }

        let run = match pipeline.run_place(name, config.granularity).await {
            Ok(run) => run,
            Err(
                e @ (PipelineError::PlaceNotFound(_)
                | PipelineError::Geocoder(_)
                | PipelineError::MalformedPolygon(_)),
            ) => {
                error!(place = %name, error = %e, "Skipping place");
                continue;
            }
            Err(e) => return Err(e).with_context(|| format!("run failed for {name}")),
        };

        log_run(&run);
        all_fractions.extend(run.fractions());

        if let Err(e) = persist(&store, config, &run).await {
            error!(place = %run.place, error = %e, "Results kept in memory only");
            failed_writes.push(run.place.display_name.clone());
        }
    }

    info!(issued = pipeline.routes.issued(), "Routing requests issued");
    log_statistics("all places", CityStatistics::from_fractions(&all_fractions).as_ref());

    if !failed_writes.is_empty() {
        anyhow::bail!("results for {} could not be stored", failed_writes.join("; "));
    }
    Ok(())
}

async fn plan(config: &Config) -> Result<()> {
    let geocoder = NominatimClient::new(
        BasicClient::with_user_agent(config.retry.call_timeout, &config.geocoder.user_agent)?,
        &config.geocoder.url,
    );

    let mut total = 0u64;
    for name in &config.places {
        match plan_place(
            &geocoder,
            name,
            config.granularity,
            config.pair_mode,
            config.snap.batch_size,
        )
        .await
        {
            Ok(plan) => {
                total += plan.worst_case_calls;
                info!(
                    place = %plan.display_name,
                    grid_points = plan.grid_points,
                    snap_calls = plan.snap_calls,
                    worst_case_calls = plan.worst_case_calls,
                    "Plan"
                );
                if let Err(e) = config.routing.guard().check(plan.worst_case_calls) {
                    warn!(place = %plan.display_name, error = %e, "Place would be refused if every point snaps apart");
                }
            }
            Err(e) => error!(place = %name, error = %e, "Cannot plan place"),
        }
    }

    info!(worst_case_calls = total, max_calls = ?config.routing.max_calls, "Plan summary");
    Ok(())
}

fn report(config: &Config, output: Option<&Path>) -> Result<()> {
    let store = CsvStore::open(&config.storage.dir)?;
    let schema = &config.storage.schema;
    let places = read_places(&store, schema).context("failed to read places")?;
    let directions = read_directions(&store, schema).context("failed to read directions")?;

    let report = build_report(&places, &directions);
    for place in &report.places {
        info!(place = %place.display_name, routes = place.routes, found = place.routes_found, "Place");
        log_statistics(&place.display_name, place.statistics.as_ref());
    }
    log_statistics("all places", report.total.as_ref());

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "Report written");
    }
    Ok(())
}
