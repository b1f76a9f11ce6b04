use std::time::Duration;

use futures::future::BoxFuture;
use rand::Rng;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use verdict_core::config::SearchConfig;
use verdict_core::error::{Result, VerdictError};
use verdict_core::traits::SearchProvider;

use crate::identity::IdentityProfile;
use crate::snippets::extract_snippets;
use crate::transport::{HttpTransport, Transport};

/// Pacing and retry settings of the search client.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    /// Upper bound of the uniform jitter added to each backoff sleep.
    pub jitter: Duration,
    /// Politeness delay window after a successful search.
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

impl From<&SearchConfig> for RetryPolicy {
    fn from(config: &SearchConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            jitter: Duration::from_millis(config.jitter_ms),
            min_delay: Duration::from_millis(config.min_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms.max(config.min_delay_ms)),
        }
    }
}

impl RetryPolicy {
    fn jittered(&self, backoff: Duration) -> Duration {
        backoff + random_between(Duration::ZERO, self.jitter)
    }

    fn politeness_delay(&self) -> Duration {
        random_between(self.min_delay, self.max_delay)
    }
}

fn random_between(low: Duration, high: Duration) -> Duration {
    if high <= low {
        return low;
    }
    let ms = rand::thread_rng().gen_range(low.as_millis() as u64..=high.as_millis() as u64);
    Duration::from_millis(ms)
}

/// Whether a status means "slow down" rather than "no".
fn is_throttled(status: u16) -> bool {
    matches!(status, 429 | 503)
}

/// Polite web search client.
///
/// Every attempt uses a freshly randomized browser identity. Throttling
/// responses (429/503) are retried with doubling backoff plus jitter; any
/// other failure is returned at once. A successful search is followed by a
/// random politeness delay.
///
/// One instance is meant to be shared by every node of every pipeline: a
/// single-permit gate is held across the request, its backoff sleeps and the
/// politeness delay, so concurrent callers queue up instead of hitting the
/// endpoint in parallel.
pub struct FetchClient<T: Transport = HttpTransport> {
    transport: T,
    endpoint: String,
    region: String,
    policy: RetryPolicy,
    gate: Semaphore,
}

impl FetchClient<HttpTransport> {
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        let transport = HttpTransport::new(Duration::from_secs(config.timeout_secs))?;
        Ok(Self::with_transport(transport, config))
    }
}

impl<T: Transport> FetchClient<T> {
    pub fn with_transport(transport: T, config: &SearchConfig) -> Self {
        Self {
            transport,
            endpoint: config.endpoint.clone(),
            region: config.region.clone(),
            policy: RetryPolicy::from(config),
            gate: Semaphore::new(1),
        }
    }

    /// Override the pacing policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Search and return up to `max_results` snippets joined by newlines.
    pub async fn search(&self, query: &str, max_results: usize) -> Result<String> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| VerdictError::RetrievalTransport(e.to_string()))?;

        let body = self.fetch_with_backoff(query).await?;
        let snippets = extract_snippets(&body, max_results)?;
        debug!(query = %query, snippets = snippets.len(), "Search complete");

        let pause = self.policy.politeness_delay();
        tokio::time::sleep(pause).await;

        Ok(snippets.join("\n"))
    }

    async fn fetch_with_backoff(&self, query: &str) -> Result<String> {
        let form = [("q", query), ("kl", self.region.as_str())];
        let max_attempts = self.policy.max_attempts;
        let mut backoff = self.policy.initial_backoff;

        for attempt in 1..=max_attempts {
            let identity = IdentityProfile::random();
            let reply = self
                .transport
                .post_form(&self.endpoint, &form, identity.headers())
                .await?;

            if (200..300).contains(&reply.status) {
                return Ok(reply.body);
            }
            if !is_throttled(reply.status) {
                warn!(status = reply.status, "Search request rejected");
                return Err(VerdictError::RetrievalStatus(reply.status));
            }
            if attempt == max_attempts {
                warn!(status = reply.status, attempts = attempt, "Search still throttled, giving up");
                return Err(VerdictError::RetrievalThrottled {
                    status: reply.status,
                    attempts: attempt,
                });
            }

            let sleep_for = self.policy.jittered(backoff);
            info!(
                status = reply.status,
                attempt,
                max_attempts,
                backoff_ms = sleep_for.as_millis() as u64,
                "Search throttled, backing off"
            );
            tokio::time::sleep(sleep_for).await;
            backoff *= 2;
        }

        // max_attempts >= 1, so the loop always returns
        Err(VerdictError::RetrievalTransport("no search attempt was made".into()))
    }
}

impl<T: Transport> SearchProvider for FetchClient<T> {
    fn search<'a>(&'a self, query: &'a str, max_results: usize) -> BoxFuture<'a, Result<String>> {
        Box::pin(FetchClient::search(self, query, max_results))
    }
}
