use std::future::Future;

use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, warn};

use crate::endpoints::EndpointSet;
use crate::error::OtpKitError;
use crate::pool::{ClientPool, PooledClient};
use crate::settings::RetryPolicy;

/// Drives signed queries across the failover endpoints.
///
/// One pooled client serves all attempts of a call. Every transport failure
/// sleeps the policy delay, then rotates the shared endpoint cursor before the
/// next attempt. A reply with any HTTP status counts as delivered; what the
/// reply means is the codec's business.
pub(crate) struct FailoverTransport {
    client_pool: Box<dyn ClientPool>,
    endpoints: EndpointSet,
    retry_policy: RetryPolicy,
}

impl FailoverTransport {
    pub(crate) fn new(
        client_pool: Box<dyn ClientPool>,
        endpoints: Vec<String>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            client_pool,
            endpoints: EndpointSet::new(endpoints),
            retry_policy,
        }
    }

    pub(crate) fn current_endpoint(&self) -> &str {
        self.endpoints.current()
    }

    pub(crate) async fn send(
        &self,
        query: &str,
        deadline: Option<Instant>,
    ) -> Result<reqwest::Response, OtpKitError> {
        let client =
            PooledClient::acquire(self.client_pool.as_ref()).map_err(|e| OtpKitError::Transport {
                attempts: 0,
                endpoint: self.endpoints.current().to_owned(),
                error: e.to_string(),
            })?;

        let mut delays = self.retry_policy.delays();
        let mut endpoint = self.endpoints.current();
        let mut last_endpoint = endpoint;
        let mut last_error = String::new();

        for attempt in 1..=self.retry_policy.attempt_limit {
            let url = format!("{endpoint}?{query}");
            debug!(%endpoint, %attempt, "sending verification request");
            match until(deadline, client.get(url).send()).await? {
                Ok(response) => return Ok(response),
                Err(e) => {
                    let delay = delays.next().unwrap_or(self.retry_policy.delay_ceiling);
                    warn!(%endpoint, %attempt, ?delay, error = %e, "verification request failed");
                    last_endpoint = endpoint;
                    last_error = e.to_string();
                    until(deadline, sleep(delay)).await?;
                    endpoint = self.endpoints.rotate();
                    debug!(%endpoint, "rotated to the next endpoint");
                }
            }
        }

        Err(OtpKitError::Transport {
            attempts: self.retry_policy.attempt_limit,
            endpoint: last_endpoint.to_owned(),
            error: last_error,
        })
    }
}

/// Races a future against the caller's deadline.
async fn until<F>(deadline: Option<Instant>, future: F) -> Result<F::Output, OtpKitError>
where
    F: Future,
{
    let Some(at) = deadline else {
        return Ok(future.await);
    };
    tokio::select! {
        () = sleep_until(at) => Err(OtpKitError::Cancelled),
        output = future => Ok(output),
    }
}
