use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use inference_meter::api::{self, ApiState};
use inference_meter::config::MeterConfig;
use inference_meter::limiter::RateLimiter;
use inference_meter::pricing::PricingTable;
use inference_meter::storage::{MeterDatabase, StoreHandle};
use inference_meter::tier::{TierPolicy, TierResolver};
use inference_meter::usage::UsageRecorder;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let config = MeterConfig::from_env()?;
    let host = config.server_host.clone();
    let port = config.server_port;

    info!(
        host = %host,
        port,
        data_dir = %config.data_dir.display(),
        "starting inference-meter service"
    );

    // Startup validation: unknown tiers, inverted limits, and malformed
    // pricing are configuration errors that must never surface mid-request.
    let policy = Arc::new(TierPolicy::default());
    policy.validate()?;

    let mut pricing = PricingTable::default();
    if let Some(path) = &config.pricing_file {
        pricing = pricing.load_overrides(path)?;
        info!(pricing_file = %path.display(), "loaded pricing overrides");
    }
    pricing.validate()?;
    let pricing = Arc::new(pricing);

    let database = Arc::new(MeterDatabase::new(config.data_dir.clone())?);
    let store = StoreHandle::new(database, config.store_timeout());

    let limiter = RateLimiter::new(store.clone(), Arc::clone(&policy));
    let recorder = UsageRecorder::new(store.clone(), Arc::clone(&pricing));
    let tiers = TierResolver::new(
        store.clone(),
        config.tier_cache_capacity,
        config.tier_cache_ttl(),
    );

    let _reaper_task = limiter.start_reaper_task(config.reaper_interval(), config.window_retention());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let state = Arc::new(ApiState::new(limiter, recorder, tiers, config));
    let router = api::create_router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("inference-meter service shutting down");
    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
