use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use alcove_api::AppStateInner;
use alcove_db::Database;
use alcove_gateway::dispatcher::Dispatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "alcove=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("ALCOVE_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("ALCOVE_DB_PATH").unwrap_or_else(|_| "alcove.db".into());
    let host = std::env::var("ALCOVE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("ALCOVE_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = Database::open(&PathBuf::from(&db_path))?;

    // Shared state
    let state = Arc::new(AppStateInner {
        db,
        jwt_secret,
        dispatcher: Dispatcher::new(),
    });

    let app = alcove_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Alcove server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
