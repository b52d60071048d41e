use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use log::info;
use stormlite_rs::server::{Master, master_router};
use tokio::net::TcpListener;

fn env_u16_or_default(key: &str, default: u16) -> u16 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let port = env_u16_or_default("STORMLITE_MASTER_PORT", 45555);
    let master = Arc::new(Master::new());
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Master listening on port {}", port);

    axum::serve(
        listener,
        master_router(master).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    Ok(())
}
