use std::sync::Arc;

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use agora_ticketing::access::RoleBasedAccess;
use agora_ticketing::clock::SystemClock;
use agora_ticketing::config::Config;
use agora_ticketing::gateway::GatewayRegistry;
use agora_ticketing::routes::create_routes;
use agora_ticketing::services::{spawn_reconciler, Engine};
use agora_ticketing::store::PgStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    tracing::info!("Successfully connected to database");

    sqlx::migrate!().run(&pool).await?;

    tracing::info!("Migrations run successfully");

    let gateways = GatewayRegistry::with_defaults();
    tracing::info!(gateways = ?gateways.names(), "Payment gateways registered");

    let engine = Engine::new(
        Arc::new(PgStore::new(pool, config.lock_timeout)),
        gateways,
        Arc::new(RoleBasedAccess),
        Arc::new(SystemClock),
        config.purchase_policy(),
    );

    let reconciler = spawn_reconciler(engine.clone(), config.reconcile_interval);

    let app = create_routes(engine, &config.http);

    tracing::info!("🚀 Server running at http://{}", config.bind_addr);

    let listener = TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    reconciler.abort();
    Ok(())
}
