use std::env;
use std::sync::Arc;
use std::time::Duration;

use log::info;
use stormlite_rs::server::{Worker, serve_worker};
use stormlite_rs::{Cluster, ComponentRegistry, RuntimeConfig};
use tokio::net::TcpListener;

fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u16_or_default(key: &str, default: u16) -> u16 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(default)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let port = env_u16_or_default("STORMLITE_WORKER_PORT", 8001);
    let master = env::var("STORMLITE_MASTER").ok();
    let storage = env_or_default("STORMLITE_STORAGE_DIR", "./storage");
    std::fs::create_dir_all(&storage)?;

    // The cluster owns a blocking HTTP client, so it is built and dropped
    // outside the async runtime.
    let settings = RuntimeConfig::from_env();
    let cluster = Cluster::with_http(ComponentRegistry::with_builtins(), settings)?;
    let worker = Arc::new(Worker::new(cluster, port, Some(storage.clone())));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        info!(
            "Worker listening on port {} (storage {}, master {})",
            port,
            storage,
            master.as_deref().unwrap_or("none")
        );

        let served = Arc::clone(&worker);
        tokio::select! {
            result = serve_worker(served, listener, master) => result,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                Ok(())
            }
        }
    })?;
    runtime.shutdown_timeout(Duration::from_secs(5));

    worker.cluster().shutdown_with_timeout(Duration::from_secs(5));
    Ok(())
}
