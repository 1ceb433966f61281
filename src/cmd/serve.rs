//! HTTP service command: `autoship serve`.

use anyhow::Result;
use autoship::config::{AppConfig, Credentials};

pub async fn cmd_serve(mut config: AppConfig, port: Option<u16>) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    let credentials = Credentials::from_env()?;
    autoship::server::start_server(config, credentials).await
}
