//! semindexd — per-project code indexing daemon. Thin CLI shell that wires
//! together the core sync engine with the watcher, lifecycle guard, and the
//! stdio/HTTP MCP transports.

mod grep;
mod handlers;
mod lifecycle;
mod protocol;
mod state;
mod transport_http;
mod transport_stdio;
mod watcher;

use clap::Parser;
use dashmap::DashMap;
use semindex_core::config::GlobalConfig;
use semindex_core::project::Project;
use semindex_core::sync::SyncEngine;
use state::{ProjectHandle, ServiceState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const SYNC_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Per-project code indexing daemon: watches a project, keeps a semantic
/// index in sync, and serves MCP tool calls over stdio and HTTP.
#[derive(Parser)]
#[command(name = "semindexd", version, about, long_about = None)]
struct Cli {
    /// Project root to register and watch (default: current directory)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Serve a single client over stdio instead of HTTP
    #[arg(long)]
    stdio: bool,

    /// HTTP port to bind (0 = pick automatically)
    #[arg(long)]
    port: Option<u16>,

    /// Bind to 0.0.0.0 instead of 127.0.0.1
    #[arg(long)]
    bind_all: bool,

    /// Disable the filesystem watcher (used by integration tests)
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("semindex=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let data_dir = dirs::data_dir().map(|d| d.join("semindex")).unwrap_or_else(|| PathBuf::from(".semindex"));
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        error!(error = %e, dir = %data_dir.display(), "failed to create data directory");
        std::process::exit(1);
    }

    let pid_file = data_dir.join("semindexd.pid");
    if lifecycle::check_single_instance(&pid_file) {
        info!("another semindexd instance is already running, exiting");
        std::process::exit(0);
    }
    if let Err(e) = lifecycle::write_pid_file(&pid_file) {
        error!(error = %e, "failed to write PID file");
        std::process::exit(1);
    }

    let config_path = semindex_core::config::config_path().unwrap_or_else(|_| data_dir.join("config.json"));
    let mut global_config = GlobalConfig::load(&config_path).unwrap_or_else(|e| {
        error!(error = %e, "failed to load config, starting with defaults");
        GlobalConfig::default()
    });

    if let Some(root) = &cli.root {
        let root = root.canonicalize().unwrap_or_else(|e| {
            error!(error = %e, path = %root.display(), "invalid --root path");
            std::process::exit(1);
        });
        global_config.add_project(&root);
        if let Err(e) = global_config.save(&config_path) {
            warn!(error = %e, "failed to persist project registration");
        }
    }

    let state = Arc::new(ServiceState::new(config_path, data_dir.clone()));

    let mut watcher_handles = Vec::new();
    let registered_paths: Vec<PathBuf> = global_config.projects.keys().map(PathBuf::from).collect();
    for root in registered_paths {
        let Some((_, settings)) = global_config.get_project_config(&root) else {
            continue;
        };
        let project = Project::new(root.clone(), settings);
        let handle = match ProjectHandle::new(project, &data_dir) {
            Ok(h) => Arc::new(h),
            Err(e) => {
                error!(error = %e, project = %root.display(), "failed to open project handle, skipping");
                continue;
            }
        };
        let collection_id = handle.project.collection_name.clone();
        state.register_project(handle);
        info!(project = %root.display(), collection = %collection_id, "registered project");

        if !cli.no_watch {
            match watcher::watch_project(state.clone(), collection_id, root.clone()) {
                Ok(w) => watcher_handles.push(w),
                Err(e) => warn!(error = %e, project = %root.display(), "failed to start watcher"),
            }
        }
    }

    spawn_sync_loop(state.clone());

    let shutdown_guard = Arc::new(lifecycle::ShutdownGuard::new(state.shutting_down.clone(), pid_file.clone()));
    lifecycle::spawn_watchdog(state.clone(), shutdown_guard.clone());

    if cli.stdio {
        tokio::select! {
            _ = transport_stdio::run(&state) => {}
            _ = shutdown_signal() => {}
        }
        shutdown_guard.fire();
        return;
    }

    let ctx = transport_http::HttpContext { state: state.clone(), sessions: Arc::new(DashMap::new()) };
    let app = transport_http::router(ctx).layer(tower_http::trace::TraceLayer::new_for_http());

    let bind_addr = if cli.bind_all { "0.0.0.0" } else { "127.0.0.1" };
    let requested_port = cli.port.unwrap_or(0);
    let listener = tokio::net::TcpListener::bind(format!("{bind_addr}:{requested_port}")).await.unwrap_or_else(|e| {
        error!(error = %e, port = requested_port, "failed to bind HTTP listener");
        std::process::exit(1);
    });
    let port = listener.local_addr().map(|a| a.port()).unwrap_or(0);

    let port_file = data_dir.join("semindexd.port");
    if let Err(e) = lifecycle::advertise_port(&port_file, port) {
        warn!(error = %e, "failed to advertise listening port");
    }

    info!(port = port, "semindexd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_guard.fire();
        })
        .await
        .unwrap_or_else(|e| error!(error = %e, "HTTP server exited with an error"));

    let _ = watcher_handles;
}

/// Polls each project's dirty bit and runs a sync pass when set (or when a
/// watcher requested a forced full sync). Mirrors the "per project, at
/// most one sync is active" ordering guarantee from spec §5 by running
/// each project's pass to completion before its next poll can start one.
fn spawn_sync_loop(state: Arc<ServiceState>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SYNC_POLL_INTERVAL);
        loop {
            ticker.tick().await;
            if state.shutting_down.load(std::sync::atomic::Ordering::SeqCst) {
                break;
            }
            for handle in state.all_projects() {
                let force = handle.take_force_full_sync();
                if !handle.dirty.is_dirty() && !force {
                    continue;
                }
                let engine = SyncEngine {
                    snapshot_store: &handle.snapshot_store,
                    graph_store: &handle.graph_store,
                    vector_store: &handle.vector_store,
                    embeddings: &handle.embeddings,
                    import_resolver: &handle.import_resolver,
                };
                match engine.sync_project_with_diff(&handle.project, &handle.dirty, force).await {
                    Ok(Some(report)) => info!(
                        project = %handle.project.root.display(),
                        indexed = report.indexed,
                        unchanged = report.unchanged,
                        removed = report.removed,
                        failed = report.failed,
                        "sync pass complete"
                    ),
                    Ok(None) => {}
                    Err(e) => error!(project = %handle.project.root.display(), error = %e, "sync pass failed"),
                }
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!("received Ctrl+C, shutting down");
    }
}
