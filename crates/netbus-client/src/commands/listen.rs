//! `netbus listen`: print broadcasts as JSON lines.

use std::io::Write;
use std::num::NonZeroUsize;

use tokio::sync::mpsc;
use tracing::info;

use netbus_protocol::InboundBroadcast;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Subscribes to `events` and prints every broadcast received until
/// interrupted, the server goes away, or `count` broadcasts were printed.
pub async fn run(config: &ClientConfig, events: &[String], count: Option<NonZeroUsize>) -> ClientResult<()> {
    let client = config.client();
    let (received, mut inbox) = mpsc::unbounded_channel();

    for event in events {
        let received = received.clone();
        let name = event.clone();
        client.on(event, move |args| {
            let _ = received.send(InboundBroadcast::new(name.clone(), args.to_vec()));
        });
    }
    drop(received);

    let endpoint = config.endpoint();
    let handle = client.connect(&endpoint).await?;
    info!(%endpoint, events = ?events, "listening");

    let closed = handle.closed();
    tokio::pin!(closed);

    let mut printed = 0;
    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            broadcast = inbox.recv() => {
                let Some(broadcast) = broadcast else { break };
                writeln!(stdout, "{}", serde_json::to_string(&broadcast)?)?;
                stdout.flush()?;
                printed += 1;
                if count.is_some_and(|count| printed >= count.get()) {
                    break;
                }
            }
            _ = &mut closed => {
                return Err(ClientError::Connection(format!("{endpoint} closed the connection")));
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    client.handle_close();
    closed.await;
    Ok(())
}
