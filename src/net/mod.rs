use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

const PROBE_URL: &str = "https://www.google.com";
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Internet reachability check, probed at most once per TTL (one tick).
///
/// `INTERNET_AVAILABLE` in the environment short-circuits the probe either
/// way; it exists for development and air-gapped test clusters.
pub struct ConnectivityProbe {
    client: Client,
    ttl: Duration,
    state: RwLock<Option<(bool, Instant)>>,
}

impl ConnectivityProbe {
    pub fn new(ttl: Duration) -> Self {
        let client = Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .expect("reqwest client construction only fails on TLS backend misconfiguration");
        Self {
            client,
            ttl,
            state: RwLock::new(None),
        }
    }

    pub async fn is_online(&self) -> bool {
        match std::env::var("INTERNET_AVAILABLE").as_deref() {
            Ok("true") => return true,
            Ok("false") => return false,
            _ => {},
        }

        {
            let state = self.state.read().await;
            if let Some((online, probed_at)) = *state
                && probed_at.elapsed() < self.ttl
            {
                return online;
            }
        }

        let online = match self.client.get(PROBE_URL).send().await {
            Ok(response) => {
                !response.status().is_client_error() && !response.status().is_server_error()
            },
            Err(_) => false,
        };

        debug!(online, "internet reachability probed");

        let mut state = self.state.write().await;
        *state = Some((online, Instant::now()));
        online
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test covers both behaviours; the environment variable is process
    // global and parallel tests would race on it.
    #[tokio::test]
    async fn test_override_and_cache() {
        // SAFETY: test-only process-local mutation.
        unsafe { std::env::set_var("INTERNET_AVAILABLE", "false") };
        let probe = ConnectivityProbe::new(Duration::from_secs(600));
        assert!(!probe.is_online().await);

        unsafe { std::env::set_var("INTERNET_AVAILABLE", "true") };
        assert!(probe.is_online().await);

        unsafe { std::env::remove_var("INTERNET_AVAILABLE") };
        {
            let mut state = probe.state.write().await;
            *state = Some((true, Instant::now()));
        }
        // The seeded cache answers without touching the network.
        assert!(probe.is_online().await);
    }
}
