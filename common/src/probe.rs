//! Single-shot TCP reachability probe.

use core::time::Duration;

use tokio::{net::TcpStream, time::timeout};
use tracing::debug;

/// How long a probe waits for the connection before calling the host down.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Attempts one TCP connection to `host:port`.
///
/// Returns `true` iff the handshake completes within `connect_timeout`.
/// Refused connections, resolution failures, unreachable networks and timeouts
/// all yield `false`. The stream is dropped right away, so no descriptor
/// outlives the call.
pub async fn probe(host: &str, port: u16, connect_timeout: Duration) -> bool {
    match timeout(connect_timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            drop(stream);
            true
        }
        Ok(Err(e)) => {
            debug!(host, port, error = %e, "Probe connect failed");
            false
        }
        Err(_) => {
            debug!(host, port, ?connect_timeout, "Probe timed out");
            false
        }
    }
}
