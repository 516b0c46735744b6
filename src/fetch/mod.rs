// src/fetch/mod.rs

use async_trait::async_trait;
use futures::future::join_all;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::config::FetchConfig;
use crate::error::TransportError;
use crate::types::{StatusCode, Target};

pub mod http;

pub use http::HttpTransport;

/// Fetches raw document content. Implementations must honour `timeout`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, address: &str, timeout: Duration) -> Result<String, TransportError>;
}

/// Result of fetching one target: raw content, or the reason it has none.
#[derive(Debug)]
pub struct Outcome {
    pub target: Target,
    pub result: Result<String, StatusCode>,
}

/// Absolute `http`/`https` address with a host.
pub fn is_well_formed(address: &str) -> bool {
    Url::parse(address.trim())
        .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
        .unwrap_or(false)
}

/// Delay before retry number `attempt + 1` (0-based): `base + 2^attempt * step`.
pub fn backoff_delay(config: &FetchConfig, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt);
    Duration::from_millis(
        config
            .backoff_base_ms
            .saturating_add(factor.saturating_mul(config.backoff_step_ms)),
    )
}

/// Fetch every target in fixed-size batches. Batch members run concurrently;
/// the next batch starts only after the previous one finished plus
/// `batch_pause_ms`. Outcomes come back in input order.
#[instrument(level = "info", skip_all, fields(targets = targets.len(), concurrency = config.concurrency))]
pub async fn fetch_all<T>(transport: &T, targets: &[Target], config: &FetchConfig) -> Vec<Outcome>
where
    T: Transport + ?Sized,
{
    let batch_size = config.concurrency.max(1);
    let pause = Duration::from_millis(config.batch_pause_ms);
    let mut outcomes = Vec::with_capacity(targets.len());

    for (i, batch) in targets.chunks(batch_size).enumerate() {
        if i > 0 && !pause.is_zero() {
            sleep(pause).await;
        }
        let results = join_all(batch.iter().map(|t| fetch_one(transport, t, config))).await;
        let ok = results.iter().filter(|o| o.result.is_ok()).count();
        debug!(batch = i + 1, size = batch.len(), ok, "batch complete");
        outcomes.extend(results);
    }

    let fetched = outcomes.iter().filter(|o| o.result.is_ok()).count();
    info!(fetched, failed = outcomes.len() - fetched, "fetch complete");
    outcomes
}

async fn fetch_one<T>(transport: &T, target: &Target, config: &FetchConfig) -> Outcome
where
    T: Transport + ?Sized,
{
    if !is_well_formed(&target.address) {
        warn!(address = %target.address, row = target.origin_row, "invalid target");
        return Outcome {
            target: target.clone(),
            result: Err(StatusCode::InvalidTarget),
        };
    }

    let address = target.address.trim();
    let timeout = Duration::from_millis(config.timeout_ms);
    let mut attempt = 0u32;
    loop {
        match transport.fetch(address, timeout).await {
            Ok(body) => {
                return Outcome {
                    target: target.clone(),
                    result: Ok(body),
                }
            }
            Err(e) if attempt < config.retries => {
                let delay = backoff_delay(config, attempt);
                attempt += 1;
                warn!(%address, attempt, delay_ms = delay.as_millis() as u64, error = %e, "Retrying");
                sleep(delay).await;
            }
            Err(e) => {
                error!(%address, attempts = attempt + 1, error = %e, "Exhausted retries");
                return Outcome {
                    target: target.clone(),
                    result: Err(StatusCode::Error(e.code())),
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
    };
    use tokio::time::Instant;
    use tracing_subscriber::{fmt, EnvFilter};

    fn init_logging() {
        let _ = fmt()
            .with_env_filter(EnvFilter::new("debug"))
            .with_target(false)
            .try_init();
    }

    /// Serves canned bodies; unknown addresses always fail with 503.
    struct ScriptedTransport {
        bodies: HashMap<String, String>,
        /// Addresses that fail this many times before succeeding.
        flaky: Mutex<HashMap<String, usize>>,
        calls: Mutex<HashMap<String, usize>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(bodies: &[(&str, &str)]) -> Self {
            Self {
                bodies: bodies
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                flaky: Mutex::new(HashMap::new()),
                calls: Mutex::new(HashMap::new()),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        fn calls(&self, address: &str) -> usize {
            *self.calls.lock().unwrap().get(address).unwrap_or(&0)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn fetch(&self, address: &str, _timeout: Duration) -> Result<String, TransportError> {
            *self
                .calls
                .lock()
                .unwrap()
                .entry(address.to_string())
                .or_default() += 1;
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if let Some(left) = self.flaky.lock().unwrap().get_mut(address) {
                if *left > 0 {
                    *left -= 1;
                    return Err(TransportError::Timeout);
                }
            }
            self.bodies
                .get(address)
                .cloned()
                .ok_or(TransportError::Status(503))
        }
    }

    fn fast_config() -> FetchConfig {
        FetchConfig {
            backoff_base_ms: 0,
            backoff_step_ms: 0,
            batch_pause_ms: 0,
            ..FetchConfig::default()
        }
    }

    #[test]
    fn well_formedness() {
        assert!(is_well_formed("http://x/ok"));
        assert!(is_well_formed(" https://example.org/a?b=c "));
        assert!(!is_well_formed("not-a-url"));
        assert!(!is_well_formed("ftp://example.org/file"));
        assert!(!is_well_formed("/relative/path"));
    }

    #[test]
    fn backoff_grows_exponentially() {
        let cfg = FetchConfig::default();
        assert_eq!(backoff_delay(&cfg, 0), Duration::from_millis(1000));
        assert_eq!(backoff_delay(&cfg, 1), Duration::from_millis(1500));
        assert_eq!(backoff_delay(&cfg, 2), Duration::from_millis(2500));
    }

    #[tokio::test]
    async fn permanent_failure_is_attempted_retries_plus_one_times() {
        init_logging();
        let transport = ScriptedTransport::new(&[]);
        let targets = vec![Target::new("http://x/down", 3)];

        let out = fetch_all(&transport, &targets, &fast_config()).await;

        assert_eq!(transport.calls("http://x/down"), 4);
        assert_eq!(out[0].result, Err(StatusCode::Error("HTTP_503".into())));
    }

    #[tokio::test]
    async fn flaky_target_recovers_within_retries() {
        init_logging();
        let transport = ScriptedTransport::new(&[("http://x/flaky", "<table/>")]);
        transport
            .flaky
            .lock()
            .unwrap()
            .insert("http://x/flaky".into(), 2);

        let out = fetch_all(&transport, &[Target::new("http://x/flaky", 1)], &fast_config()).await;

        assert_eq!(transport.calls("http://x/flaky"), 3);
        assert_eq!(out[0].result.as_deref(), Ok("<table/>"));
    }

    #[tokio::test]
    async fn invalid_target_uses_no_network_attempt() {
        let transport = ScriptedTransport::new(&[]);
        let out = fetch_all(&transport, &[Target::new("not-a-url", 9)], &fast_config()).await;

        assert_eq!(transport.calls("not-a-url"), 0);
        assert_eq!(out[0].result, Err(StatusCode::InvalidTarget));
        assert_eq!(out[0].target.origin_row, 9);
    }

    #[tokio::test]
    async fn outcomes_keep_input_order_and_batches_cap_concurrency() {
        let bodies: Vec<(String, String)> = (0..7)
            .map(|i| (format!("http://x/{}", i), format!("body{}", i)))
            .collect();
        let refs: Vec<(&str, &str)> = bodies.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
        let transport = ScriptedTransport::new(&refs);
        let targets: Vec<Target> = (0..7)
            .map(|i| Target::new(format!("http://x/{}", i), i + 1))
            .collect();
        let cfg = FetchConfig {
            concurrency: 3,
            ..fast_config()
        };

        let out = fetch_all(&transport, &targets, &cfg).await;

        let bodies: Vec<_> = out.iter().map(|o| o.result.clone().unwrap()).collect();
        assert_eq!(bodies, (0..7).map(|i| format!("body{}", i)).collect::<Vec<_>>());
        assert_eq!(transport.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn batch_members_are_in_flight_together() {
        let transport = ScriptedTransport::new(&[]);
        let targets: Vec<Target> = (0..4)
            .map(|i| Target::new(format!("http://x/{}", i), i + 1))
            .collect();
        let cfg = FetchConfig {
            concurrency: 10,
            retries: 0,
            ..fast_config()
        };

        fetch_all(&transport, &targets, &cfg).await;
        assert_eq!(transport.peak.load(Ordering::SeqCst), 4);

        let sequential = ScriptedTransport::new(&[]);
        let cfg = FetchConfig {
            concurrency: 1,
            retries: 0,
            ..fast_config()
        };
        fetch_all(&sequential, &targets, &cfg).await;
        assert_eq!(sequential.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn batches_are_separated_by_pause() {
        let transport = ScriptedTransport::new(&[("http://x/a", "a"), ("http://x/b", "b")]);
        let targets = vec![Target::new("http://x/a", 1), Target::new("http://x/b", 2)];
        let cfg = FetchConfig {
            concurrency: 1,
            batch_pause_ms: 50,
            ..fast_config()
        };

        let start = Instant::now();
        fetch_all(&transport, &targets, &cfg).await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
