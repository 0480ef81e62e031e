use std::future;

use admin_ipc::{run_server, AdminRequest, AdminResponse, AdminStatus, EntityDetail};
use clap::Parser;
use collector::{Collector, CycleOutcome, CycleReport};
use feed::FeedClient;
use metrics::{CollectorMetrics, MetricsHandle};
use state::StateStore;
use storage::{init_sqlite, Repository};
use tokio::task;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod config;

use config::{ensure_sqlite_parent_dir, Args};

fn log_startup(args: &Args, run_id: &str) {
    info!(path = %args.sqlite_path, "sqlite path configured");
    info!(url = %args.feed_url, auth = args.feed_token.is_some(), "feed configured");
    info!(
        interval_s = args.poll_interval_secs,
        timeout_s = args.fetch_timeout_secs,
        "polling schedule configured"
    );
    info!(socket = %args.admin_socket, "admin socket bind planned");
    info!(addr = %args.metrics_addr, "metrics bind planned");
    info!(%run_id, "run initialized");
}

async fn handle_admin<R: Repository>(
    req: AdminRequest,
    repo: &R,
    states: &StateStore,
    run_id: &str,
) -> anyhow::Result<AdminResponse> {
    Ok(match req {
        AdminRequest::Status => AdminResponse::Status(AdminStatus {
            run_id: run_id.to_string(),
            collector: "active".to_string(),
            entities: states.snapshot(),
        }),
        AdminRequest::Entities => AdminResponse::Entities(repo.list_entities().await?),
        AdminRequest::Entity { entity_id } => match repo.get_entity(&entity_id).await? {
            Some(entity) => AdminResponse::Entity(Some(EntityDetail {
                entity,
                snapshots: repo.list_snapshots(&entity_id).await?,
            })),
            None => AdminResponse::Entity(None),
        },
        AdminRequest::Snapshots { entity_id } => {
            AdminResponse::Snapshots(repo.list_snapshots(&entity_id).await?)
        }
        AdminRequest::LatestSnapshot { entity_id } => {
            AdminResponse::LatestSnapshot(repo.latest_snapshot_record(&entity_id).await?)
        }
    })
}

fn record_cycle(metrics: &CollectorMetrics, report: &CycleReport, tracked: usize) {
    metrics.cycles.inc();
    if report.outcome == CycleOutcome::FetchFailed {
        metrics.fetch_failures.inc();
    }
    metrics.snapshots_persisted.inc_by(report.persisted as u64);
    metrics.entity_failures.inc_by(report.failed as u64);
    metrics.entities_finished.inc_by(report.finished.len() as u64);
    metrics.tracked_entities.set(tracked as i64);
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = ?err, "cannot listen for ctrl-c; running until killed");
        future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    args.validate()?;
    info!(
        sqlite = %args.sqlite_path,
        feed = %args.feed_url,
        socket = %args.admin_socket,
        "booting collectord"
    );

    ensure_sqlite_parent_dir(&args.sqlite_path)?;

    let run_id = Uuid::new_v4().to_string();
    let store = init_sqlite(&args.sqlite_path).await?;
    store.insert_run(&run_id, option_env!("GIT_SHA")).await?;
    log_startup(&args, &run_id);

    let missing_tables = store.validate_required_tables().await?;
    if !missing_tables.is_empty() {
        warn!(tables = ?missing_tables, "sqlite missing required tables");
        if let Err(err) = store
            .log_incident(
                &run_id,
                "warning",
                "db_schema_missing",
                &format!(
                    "sqlite missing required tables: {}",
                    missing_tables.join(", ")
                ),
            )
            .await
        {
            warn!(error = ?err, "failed to log missing schema incident");
        }
    }

    let states = StateStore::new();

    let admin_store = store.clone();
    let admin_states = states.clone();
    let admin_run_id = run_id.clone();
    let socket_path = args.admin_socket.clone();
    task::spawn(async move {
        let handler = move |req: AdminRequest| {
            let store = admin_store.clone();
            let states = admin_states.clone();
            let run_id = admin_run_id.clone();
            async move { handle_admin(req, &store, &states, &run_id).await }
        };
        if let Err(err) = run_server(&socket_path, handler).await {
            tracing::error!(error = ?err, "admin ipc server failed");
        }
    });

    let metrics = MetricsHandle::new()?;
    let collector_metrics = metrics.collector().clone();
    let metrics_addr = args.metrics_addr;
    task::spawn(async move {
        if let Err(err) = metrics.serve(metrics_addr).await {
            tracing::error!(error = ?err, "metrics server error");
        }
    });

    let feed = FeedClient::new(
        args.feed_url.clone(),
        args.feed_token.clone(),
        args.fetch_timeout(),
    )?;
    info!(url = %feed.url(), "feed client ready");
    let collector = Collector::new(feed, store.clone(), states.clone());

    info!(
        run_id = %run_id,
        interval_s = args.poll_interval_secs,
        metrics_addr = %args.metrics_addr,
        "ready"
    );
    if let Err(err) = store
        .log_incident(&run_id, "info", "ready", "collectord booted and ready")
        .await
    {
        warn!(error = ?err, "failed to record ready incident");
    }

    collector
        .run(args.poll_interval(), shutdown_signal(), |report| {
            record_cycle(&collector_metrics, report, states.len())
        })
        .await;

    info!(run_id = %run_id, "collectord stopped");
    Ok(())
}
