use dsr_api::handlers;
use dsr_api::state::AppState;

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL, APP_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dsr_api=info,tower_http=info".into()),
        )
        .init();

    let config = dsr_api::config::config();
    tracing::info!("Starting DSR API in {:?} mode", config.environment);

    let state = AppState::from_config();
    let app = handlers::router(state);

    // Allow deployments to override the port via env
    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    tracing::info!("DSR API listening on http://{}", bind_addr);

    axum::serve(listener, app).await.expect("server");
}
