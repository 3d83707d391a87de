//! Shared utilities for integration tests.

use std::path::PathBuf;

use http_bridge::config::{ConnectionConfig, ServerConfig};
use http_bridge::ServerHandle;

/// Config with a single ephemeral loopback connection.
#[allow(dead_code)]
pub fn local_config() -> ServerConfig {
    ServerConfig {
        connections: vec![ConnectionConfig::new("127.0.0.1", 0)],
        ..ServerConfig::default()
    }
}

/// Client without pooling so every test request opens a fresh connection.
#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Start `server` and return the base URL of its first connection.
#[allow(dead_code)]
pub async fn start(server: &mut ServerHandle) -> String {
    server.start().await.expect("server should start");
    let addr = server.local_addrs()[0];
    format!("http://{addr}")
}

/// Fresh directory under the system temp dir.
#[allow(dead_code)]
pub fn temp_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("http-bridge-{label}-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Grab a free loopback port by binding and releasing it.
#[allow(dead_code)]
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}
