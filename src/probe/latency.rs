use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio::time::{timeout, Instant};

use crate::domain::LATENCY_TIMEOUT_MS;
use crate::metrics::metrics;
use crate::probe::LatencyProbe;

/// Times a TCP connect as the round-trip measurement. Several samples run in
/// parallel and the successful ones are averaged, which smooths out
/// single-sample jitter; zero successful samples collapse to the timeout
/// sentinel.
pub struct TcpLatencyProber {
    sample_timeout: Duration,
    samples: u32,
}

impl TcpLatencyProber {
    pub fn new(sample_timeout: Duration, samples: u32) -> Self {
        Self {
            sample_timeout,
            samples: samples.max(1),
        }
    }

    async fn sample(host: String, port: u16, limit: Duration) -> Option<i64> {
        let started = Instant::now();
        match timeout(limit, TcpStream::connect((host.as_str(), port))).await {
            Ok(Ok(_stream)) => Some(started.elapsed().as_millis() as i64),
            Ok(Err(_)) | Err(_) => None,
        }
    }
}

#[async_trait]
impl LatencyProbe for TcpLatencyProber {
    async fn probe(&self, host: &str, port: u16) -> i64 {
        let mut set = JoinSet::new();
        for _ in 0..self.samples {
            set.spawn(Self::sample(
                host.to_string(),
                port,
                self.sample_timeout,
            ));
        }

        let mut successes: Vec<i64> = Vec::with_capacity(self.samples as usize);
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Some(elapsed)) => {
                    metrics().inc_latency_sample_ok();
                    successes.push(elapsed);
                }
                Ok(None) | Err(_) => metrics().inc_latency_sample_timeout(),
            }
        }

        if successes.is_empty() {
            tracing::debug!(host, port, "latency probe exhausted all samples");
            return LATENCY_TIMEOUT_MS;
        }

        let sum: i64 = successes.iter().sum();
        let average = (sum as f64 / successes.len() as f64).round() as i64;
        average.min(LATENCY_TIMEOUT_MS - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unroutable_target_resolves_to_the_timeout_sentinel() {
        // TEST-NET-1 is guaranteed unreachable; the connect attempt can only
        // fail or time out.
        let prober = TcpLatencyProber::new(Duration::from_millis(50), 2);
        let latency = prober.probe("192.0.2.1", 25565).await;
        assert_eq!(latency, LATENCY_TIMEOUT_MS);
    }

    #[tokio::test]
    async fn local_listener_yields_a_real_measurement() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let _ = listener.accept().await;
            }
        });

        let prober = TcpLatencyProber::new(Duration::from_secs(1), 3);
        let latency = prober.probe("127.0.0.1", port).await;
        assert!((0..LATENCY_TIMEOUT_MS).contains(&latency));
    }
}
