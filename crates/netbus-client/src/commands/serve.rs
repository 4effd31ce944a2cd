//! `netbus serve`: run a relay server in the foreground.

use tracing::info;

use netbus_server::{Endpoint, RelayServer};

use crate::config::ClientConfig;
use crate::error::ClientResult;

/// Serves until SIGINT.
pub async fn run(config: &ClientConfig, listen: Option<Endpoint>) -> ClientResult<()> {
    let mut server_config = config.server_config();
    if let Some(listen) = listen {
        server_config.endpoint = listen;
    }

    let server = RelayServer::bind(server_config).await?;
    info!(endpoint = %server.local_endpoint(), "Relay server started");

    server
        .run_until_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("Relay server stopped");
    Ok(())
}
