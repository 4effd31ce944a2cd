//! `netbus emit`: broadcast one event and exit.

use serde_json::Value;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::ClientResult;

/// Connects, broadcasts `event` with `args` and waits for the frame to be flushed.
pub async fn run(config: &ClientConfig, event: &str, args: &[String]) -> ClientResult<()> {
    let args: Vec<Value> = args.iter().map(|arg| parse_arg(arg)).collect();

    let client = config.client();
    let handle = client.connect(&config.endpoint()).await?;
    client.emit(event, &args);
    debug!(event, args = args.len(), "broadcast queued");

    handle.close();
    handle.closed().await;
    Ok(())
}

/// Parses a command-line argument as JSON, falling back to a plain string.
pub(crate) fn parse_arg(arg: &str) -> Value {
    serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_arguments() {
        assert_eq!(parse_arg("1"), json!(1));
        assert_eq!(parse_arg("true"), json!(true));
        assert_eq!(parse_arg(r#"{"name":"luca"}"#), json!({"name": "luca"}));
        assert_eq!(parse_arg(r#""quoted""#), json!("quoted"));
    }

    #[test]
    fn plain_text_becomes_string() {
        assert_eq!(parse_arg("hello"), json!("hello"));
        assert_eq!(parse_arg("{broken"), json!("{broken"));
    }
}
