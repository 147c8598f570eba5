//! HTTP/WebSocket server command: `overseer serve`.

use anyhow::Result;
use std::path::Path;

use overseer::config::OverseerConfig;

pub async fn cmd_serve(
    mut config: OverseerConfig,
    data_dir: &Path,
    port: Option<u16>,
    dev: bool,
) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    if dev {
        config.server.dev_mode = true;
    }

    println!(
        "Overseer running at http://{}:{}",
        config.server.host, config.server.port
    );
    overseer::board::server::start_server(&config, data_dir).await
}
