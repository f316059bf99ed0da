use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use dotenvy::dotenv;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use municipal_portal::config::{AppConfig, StoreKind};
use municipal_portal::routes;
use municipal_portal::state::AppState;
use municipal_portal::store::{MemoryStore, PgStore};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return Err(e.into());
        }
    };

    let state = match config.store {
        StoreKind::Postgres => {
            let store = PgStore::connect(&config).await?;
            store.migrate().await?;
            info!("connected to Postgres, migrations applied");
            AppState::new(Arc::new(store), &config)
        }
        StoreKind::Memory => {
            warn!("using the in-memory store; nothing will be persisted");
            AppState::new(Arc::new(MemoryStore::new()), &config)
        }
    };

    let app = routes::app(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
