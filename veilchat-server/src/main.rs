use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use veilchat_server::run_server;

const DEFAULT_ADDR: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let listener = TcpListener::bind(&addr).await.expect("failed to bind");
    tracing::info!(%addr, "relay listening");
    run_server(listener).await;
}
