use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use crate::catalog::Endpoint;
use crate::domain::ServerStatus;
use crate::metrics::metrics;
use crate::probe::{StatusProbe, StatusSource};

/// Tries each registered source in order until one produces a definite
/// answer. Retries are bounded by the source list; a fixed backoff separates
/// attempts so a flapping upstream is not hammered.
pub struct FallbackStatusProber {
    sources: Vec<Arc<dyn StatusSource>>,
    source_timeout: Duration,
    backoff: Duration,
}

impl FallbackStatusProber {
    pub fn new(
        sources: Vec<Arc<dyn StatusSource>>,
        source_timeout: Duration,
        backoff: Duration,
    ) -> Self {
        Self {
            sources,
            source_timeout,
            backoff,
        }
    }
}

#[async_trait]
impl StatusProbe for FallbackStatusProber {
    async fn probe(&self, endpoint: &Endpoint) -> ServerStatus {
        for (attempt, source) in self.sources.iter().enumerate() {
            match timeout(self.source_timeout, source.fetch(endpoint)).await {
                Ok(Ok(status)) => {
                    metrics().inc_status_probe_resolved();
                    return status;
                }
                Ok(Err(err)) => {
                    tracing::debug!(
                        source = source.name(),
                        endpoint = endpoint.full_address.as_str(),
                        error = %err,
                        "status source failed"
                    );
                }
                Err(_) => {
                    tracing::debug!(
                        source = source.name(),
                        endpoint = endpoint.full_address.as_str(),
                        timeout_ms = self.source_timeout.as_millis() as u64,
                        "status source timed out"
                    );
                }
            }
            metrics().inc_status_source_failure();
            if attempt + 1 < self.sources.len() {
                sleep(self.backoff).await;
            }
        }

        metrics().inc_status_probe_exhausted();
        tracing::warn!(
            endpoint = endpoint.full_address.as_str(),
            sources = self.sources.len(),
            "all status sources failed"
        );
        ServerStatus::unreachable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ProtocolVariant;
    use crate::error::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedSource {
        name: &'static str,
        answer: Option<ServerStatus>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                answer: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn answering(name: &'static str, status: ServerStatus) -> Arc<Self> {
            Arc::new(Self {
                name,
                answer: Some(status),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl StatusSource for ScriptedSource {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch(&self, _endpoint: &Endpoint) -> Result<ServerStatus> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.answer {
                Some(status) => Ok(status.clone()),
                None => Err(crate::err!("scripted failure")),
            }
        }
    }

    fn endpoint() -> Endpoint {
        Endpoint::new(ProtocolVariant::Java, "a.example.com", 25565)
    }

    #[tokio::test]
    async fn first_successful_source_wins_and_later_ones_are_skipped() {
        let first = ScriptedSource::answering("first", ServerStatus::online("5/50", "1.20.1"));
        let second = ScriptedSource::answering("second", ServerStatus::online("9/99", "other"));
        let prober = FallbackStatusProber::new(
            vec![first.clone(), second.clone()],
            Duration::from_secs(1),
            Duration::from_millis(0),
        );

        let status = prober.probe(&endpoint()).await;
        assert_eq!(status.players, "5/50");
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn falls_through_failed_sources_in_order() {
        let broken = ScriptedSource::failing("broken");
        let working = ScriptedSource::answering("working", ServerStatus::offline());
        let prober = FallbackStatusProber::new(
            vec![broken.clone(), working],
            Duration::from_secs(1),
            Duration::from_millis(0),
        );

        let status = prober.probe(&endpoint()).await;
        assert!(!status.online);
        assert!(!status.is_unreachable());
        assert_eq!(broken.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_returns_the_unreachable_sentinel() {
        let prober = FallbackStatusProber::new(
            vec![ScriptedSource::failing("a"), ScriptedSource::failing("b")],
            Duration::from_secs(1),
            Duration::from_millis(0),
        );

        let status = prober.probe(&endpoint()).await;
        assert!(status.is_unreachable());
    }

    #[tokio::test]
    async fn slow_source_is_timed_out_not_awaited_forever() {
        struct HangingSource;

        #[async_trait]
        impl StatusSource for HangingSource {
            fn name(&self) -> &'static str {
                "hanging"
            }

            async fn fetch(&self, _endpoint: &Endpoint) -> Result<ServerStatus> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(ServerStatus::offline())
            }
        }

        tokio::time::pause();
        let prober = FallbackStatusProber::new(
            vec![Arc::new(HangingSource)],
            Duration::from_millis(100),
            Duration::from_millis(0),
        );

        let status = prober.probe(&endpoint()).await;
        assert!(status.is_unreachable());
    }
}
