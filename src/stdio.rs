//! Stdio transport
//!
//! Newline-delimited JSON-RPC on stdin/stdout for locally launched MCP
//! clients. Every message is forwarded to 1C with the configured account;
//! replies are written one per line and notifications (no `id`) get none.

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::backend::BackendClient;
use crate::config::Config;
use crate::error::{rpc_codes, rpc_error_body};
use crate::oauth::Credentials;
use crate::{Error, Result};

/// Serve on the process's stdin/stdout until stdin closes.
pub async fn run(config: &Config) -> Result<()> {
    let credentials = config.backend.static_credentials().ok_or_else(|| {
        Error::Config("stdio mode requires backend.username".to_string())
    })?;
    let backend = BackendClient::new(&config.backend)?;

    info!(
        login = %credentials.login,
        url = %backend.service_url(),
        "Serving MCP over stdio"
    );
    relay(
        &backend,
        &credentials,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}

/// Relay JSON-RPC lines from `reader` to the backend and replies to `writer`.
pub async fn relay<R, W>(
    backend: &BackendClient,
    credentials: &Credentials,
    reader: R,
    mut writer: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(reply) = handle_line(backend, credentials, line).await {
            let mut out = serde_json::to_string(&reply)?;
            out.push('\n');
            writer.write_all(out.as_bytes()).await?;
            writer.flush().await?;
        }
    }

    debug!("stdin closed");
    Ok(())
}

async fn handle_line(
    backend: &BackendClient,
    credentials: &Credentials,
    line: &str,
) -> Option<Value> {
    let envelope: Value = match serde_json::from_str(line).map_err(Error::from) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "Rejected malformed JSON-RPC line");
            return Some(rpc_error_body(
                e.to_rpc_code(),
                &format!("Parse error: {e}"),
                Value::Null,
            ));
        }
    };

    if !envelope.is_object() && !envelope.is_array() {
        return Some(rpc_error_body(
            rpc_codes::INVALID_REQUEST,
            "Invalid Request: expected a JSON-RPC object or batch",
            Value::Null,
        ));
    }

    let id = envelope.get("id").cloned();
    let expects_reply = envelope.is_array() || id.is_some();

    match backend.forward(credentials, &envelope).await {
        Ok(reply) => expects_reply.then_some(reply),
        Err(e) => {
            warn!(login = %credentials.login, error = %e, "Backend call failed");
            expects_reply
                .then(|| rpc_error_body(e.to_rpc_code(), &e.to_string(), id.unwrap_or(Value::Null)))
        }
    }
}
