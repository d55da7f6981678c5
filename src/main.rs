use std::sync::Arc;

use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mastodon_exporter::{
    config::Config,
    db,
    routes,
    services::{
        exporter::MastodonExporter,
        registry::{build_info, MetricsRegistry},
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let config = Config::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    config.validate()?;
    let config = Arc::new(config);

    debug!("Connecting to database");
    let pool = match db::create_pool(&config.database_url, config.db_max_connections).await {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "Unable to connect to database");
            std::process::exit(1);
        }
    };
    info!("Database connected");

    let exporter = MastodonExporter::new(
        pool.clone(),
        &config.collectors,
        config.resolution_buckets.clone(),
    )?;
    let collectors: Vec<&str> = exporter.sources().iter().map(|s| s.as_str()).collect();
    info!(collectors = ?collectors, "Enabled collectors");

    let mut registry = MetricsRegistry::new();
    registry.register_static(Box::new(build_info()?))?;
    registry.register(Box::new(exporter))?;

    let state = AppState {
        db: pool,
        config: config.clone(),
        registry: Arc::new(registry),
    };
    let app = routes::router(state);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting mastodon_exporter on {} (metrics at {})",
        config.listen_address,
        config.telemetry_path
    );

    let listener = tokio::net::TcpListener::bind(&config.listen_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
