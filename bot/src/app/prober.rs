//! Reachability checks behind a trait, so sweeps and chat handlers can be tested
//! without touching the network.

use core::time::Duration;

use async_trait::async_trait;

/// Answers "does this host accept TCP connections on this port right now?".
///
/// Implementations never fail: anything other than a completed connection is `false`.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, host: &str, port: u16) -> bool;
}

/// Plain TCP connect with a timeout.
#[derive(Debug, Clone, Copy)]
pub struct TcpProber {
    timeout: Duration,
}

impl TcpProber {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, host: &str, port: u16) -> bool {
        vpswatch_common::probe(host, port, self.timeout).await
    }
}
