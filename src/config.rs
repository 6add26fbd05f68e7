//! Runtime configuration

use std::net::SocketAddr;

use anyhow::{Context, Result};

pub const DEFAULT_DB_PATH: &str = "seguimiento.db";
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Settings for the HTTP server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db_path: String,
    pub addr: SocketAddr,
}

impl ServerConfig {
    pub fn new(db_path: impl Into<String>, addr: &str) -> Result<Self> {
        let addr = addr
            .parse()
            .with_context(|| format!("invalid listen address {addr:?}"))?;
        Ok(Self {
            db_path: db_path.into(),
            addr,
        })
    }
}

/// Install the tracing subscriber. `RUST_LOG` overrides the default level.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
