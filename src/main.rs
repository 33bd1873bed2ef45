mod collectors;
mod config;
mod http;
mod render;
mod scheduler;
mod snapshot;
mod store;

use axum::serve;
use clap::Parser;
use collectors::gpu::{GpuAggregator, SystemTools};
use collectors::system::SysinfoProbe;
use collectors::thermal::ThermalProbe;
use collectors::{Collect, Collector};
use config::{Config, TemperatureUnit};
use snapshot::Snapshot;
use scheduler::Scheduler;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use store::SnapshotStore;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hostmond")]
#[command(version)]
struct Cli {
    /// YAML config; built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    print_default_config: bool,
    /// Run a single collection cycle, print it and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match &cli.config {
        Some(path) => match Config::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                error!(error = %err, "failed to load configuration");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    let collector = Collector::new(
        SysinfoProbe::new(),
        ThermalProbe::new(),
        GpuAggregator::new(SystemTools::default()),
        cfg.disk_path.clone(),
    );

    if cli.once {
        run_once(collector, cfg.temperature_unit).await;
        return;
    }

    let store = SnapshotStore::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_task = cfg.listen.clone().map(|listen| {
        let store = store.clone();
        let unit = cfg.temperature_unit;
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let app = http::build_router(store, unit);
            let addr: SocketAddr = match listen.parse() {
                Ok(addr) => addr,
                Err(err) => {
                    error!(error = %err, listen = %listen, "invalid listen address");
                    return;
                }
            };

            let listener = match TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(err) => {
                    error!(error = %err, "failed to bind HTTP listener");
                    return;
                }
            };

            let server = serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });

            if let Err(err) = server.await {
                error!(error = %err, "HTTP server error");
            }
        })
    });

    let unit = cfg.temperature_unit;
    let report_task = tokio::spawn(report_loop(
        store.subscribe(),
        shutdown_rx.clone(),
        move |snapshot| {
            info!(
                captured_at = %snapshot.captured_at.to_rfc3339(),
                summary = %render::summary_lines(snapshot, unit).join(" | "),
                "snapshot published"
            );
        },
    ));

    let scheduler = Scheduler::new(collector, store, cfg.interval_secs());
    info!(
        interval = %humantime::format_duration(scheduler.interval()),
        disk_path = %cfg.disk_path.display(),
        listen = cfg.listen.as_deref().unwrap_or("-"),
        "starting hostmond"
    );
    let scheduler = scheduler.start();

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to wait for Ctrl+C");
    }
    info!("Ctrl+C received, shutting down");

    scheduler.stop();
    scheduler.join().await;
    let _ = shutdown_tx.send(true);

    let _ = report_task.await;
    if let Some(task) = http_task {
        let _ = task.await;
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run_once<C: Collect>(mut collector: C, unit: TemperatureUnit) {
    let snapshot = match tokio::task::spawn_blocking(move || collector.collect()).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            error!(error = %err, "collection cycle failed");
            std::process::exit(1);
        }
    };

    for line in render::summary_lines(&snapshot, unit) {
        println!("{line}");
    }
}

/// Hands every published snapshot to `report`. Pass a receiver subscribed
/// before the scheduler starts.
async fn report_loop(
    mut updates: watch::Receiver<Option<Arc<Snapshot>>>,
    mut shutdown: watch::Receiver<bool>,
    mut report: impl FnMut(&Snapshot),
) {
    loop {
        tokio::select! {
            biased;
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let latest = updates.borrow_and_update().clone();
                if let Some(snapshot) = latest {
                    report(&snapshot);
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
