pub mod latency;
pub mod sources;
pub mod status;

use async_trait::async_trait;

use crate::catalog::Endpoint;
use crate::domain::ServerStatus;

pub use latency::TcpLatencyProber;
pub use sources::{build_sources, StatusSource};
pub use status::FallbackStatusProber;

/// Liveness/metadata query for one endpoint. Implementations absorb every
/// failure into a [`ServerStatus`] sentinel; they never error outward.
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn probe(&self, endpoint: &Endpoint) -> ServerStatus;
}

/// Round-trip measurement against a host/port. Always resolves to a number:
/// a millisecond value on success, [`crate::domain::LATENCY_TIMEOUT_MS`] on
/// timeout or any network error.
#[async_trait]
pub trait LatencyProbe: Send + Sync {
    async fn probe(&self, host: &str, port: u16) -> i64;
}
