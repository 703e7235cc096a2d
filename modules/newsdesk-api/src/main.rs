use std::env;
use std::sync::Arc;

use newsdesk_store::{ArticleStore, MemoryStore, PgStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let store: Arc<dyn ArticleStore> = match env::var("DATABASE_URL") {
        Ok(url) => {
            let store = Arc::new(PgStore::connect(&url).await?);
            store.migrate().await?;
            store
        }
        Err(_) => {
            warn!("DATABASE_URL not set, serving the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let addr = env::var("API_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "api listening");
    axum::serve(listener, newsdesk_api::router(store)).await?;
    Ok(())
}
