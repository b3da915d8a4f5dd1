use crate::cli::ServeArgs;
use crate::error::AppError;
use crate::infra::{
    seeded_directory, AppState, BackgroundJobs, InMemoryDocumentStore, LeasingContext,
    RecordingNotificationSender, RecordingPaymentGateway,
};
use crate::routes::leasing_router;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::Utc;
use leases_core::charges::cpi::CpiTable;
use leases_core::config::AppConfig;
use leases_core::store::InMemoryLeasingStore;
use leases_core::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// How often the outbox worker drains pending gateway registrations.
const GATEWAY_SYNC_INTERVAL: Duration = Duration::from_secs(30);
/// How often the daily invoicing and reminder runs fire.
const DAILY_RUN_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init("leases-api", &config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryLeasingStore::default());
    let directory = Arc::new(seeded_directory());
    let notifications = Arc::new(RecordingNotificationSender::default());
    let documents = Arc::new(InMemoryDocumentStore::default());
    let gateway = Arc::new(RecordingPaymentGateway::default());
    // CPI figures arrive through operational data loads; the service starts
    // with an empty table and CPI-indexed schedules stop at unpublished
    // quarters.
    let context = Arc::new(LeasingContext::new(
        Arc::clone(&store),
        directory,
        Arc::clone(&notifications),
        documents,
        CpiTable::new(Vec::new()),
        &config.invoicing,
    ));

    let jobs = Arc::new(BackgroundJobs::new(
        store,
        gateway,
        notifications,
        CpiTable::new(Vec::new()),
        &config.invoicing,
    ));
    let sync_jobs = Arc::clone(&jobs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(GATEWAY_SYNC_INTERVAL);
        loop {
            ticker.tick().await;
            sync_jobs.run_gateway_sync();
        }
    });
    let daily_jobs = jobs;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(DAILY_RUN_INTERVAL);
        loop {
            ticker.tick().await;
            daily_jobs.run_daily(Utc::now().date_naive());
        }
    });

    let app = leasing_router(context)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "leases and licensing service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
