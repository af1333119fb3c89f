use std::fmt;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};

use crate::endpoints::DEFAULT_ENDPOINTS;
use crate::error::OtpKitError;
use crate::nonce::{NonceProvider, SystemNonceProvider};
use crate::pool::{ClientPool, DefaultClientPool};

/// Default percentage of backend consensus required for a verdict.
pub const DEFAULT_SYNC_FACTOR: u8 = 100;

/// Default time the service may spend reaching consensus.
pub const DEFAULT_SYNC_TIME_LIMIT: Duration = Duration::from_secs(6);

/// Retry schedule for transport failures.
///
/// Transport attempts are spaced by an exponentially growing delay: the n-th
/// retry waits `min(initial_delay * delay_multiplier^(n-1), delay_ceiling)`.
/// Semantic rejections from the service are never retried; only failures to
/// obtain a reply at all are.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts per verification call.
    pub attempt_limit: u8,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Bound the grown delay never exceeds.
    pub delay_ceiling: Duration,
    /// Factor applied to the delay after every failed attempt.
    pub delay_multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempt_limit: 3,
            initial_delay: Duration::from_secs(2),
            delay_ceiling: Duration::from_secs(60),
            delay_multiplier: 1.3,
        }
    }
}

impl RetryPolicy {
    pub(crate) fn validate(&self) -> Result<(), OtpKitError> {
        if self.attempt_limit == 0 {
            return Err(invalid("retry strategy", "retry limit must be greater than zero"));
        }
        if self.initial_delay <= Duration::from_millis(30) {
            return Err(invalid(
                "retry strategy",
                "retry delay must be greater than 30 milliseconds",
            ));
        }
        if self.initial_delay > Duration::from_secs(60) {
            return Err(invalid("retry strategy", "retry delay must be less than one minute"));
        }
        if self.delay_ceiling < self.initial_delay {
            return Err(invalid(
                "retry strategy",
                "retry delay limit must be greater than retry delay",
            ));
        }
        if self.delay_multiplier <= 1.0 {
            return Err(invalid(
                "retry strategy",
                "retry multiplier must be greater than one",
            ));
        }
        if self.delay_multiplier > 10.0 {
            return Err(invalid("retry strategy", "retry multiplier must be less than 10"));
        }
        Ok(())
    }

    /// Delay sequence driven by the transport, one entry per possible retry.
    pub(crate) fn delays(&self) -> impl Iterator<Item = Duration> {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.delay_ceiling)
            .with_factor(self.delay_multiplier)
            .with_max_times(usize::from(self.attempt_limit))
            .build()
    }
}

/// Validated configuration for an [`Authenticator`].
///
/// Obtained only through [`Settings::builder`]; every value a `Settings`
/// carries has already passed validation.
///
/// [`Authenticator`]: crate::Authenticator
pub struct Settings {
    pub(crate) nonce_provider: Box<dyn NonceProvider>,
    pub(crate) sync_factor: u8,
    pub(crate) sync_time_limit: Duration,
    pub(crate) retry_policy: RetryPolicy,
    pub(crate) endpoints: Vec<String>,
    pub(crate) client_pool: Box<dyn ClientPool>,
}

impl Settings {
    /// Starts building a settings value; unset fields take their defaults.
    #[must_use]
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Percentage of backend consensus required for a verdict.
    #[must_use]
    pub const fn sync_factor(&self) -> u8 {
        self.sync_factor
    }

    /// Time the service may spend reaching consensus, in whole seconds.
    #[must_use]
    pub const fn sync_time_limit(&self) -> Duration {
        self.sync_time_limit
    }

    /// Retry schedule for transport failures.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }

    /// Verification endpoints in failover order.
    #[must_use]
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("sync_factor", &self.sync_factor)
            .field("sync_time_limit", &self.sync_time_limit)
            .field("retry_policy", &self.retry_policy)
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Settings`].
///
/// Setters only record values; all validation runs in [`build`], and defaults
/// pass through the same validators as explicit values.
///
/// [`build`]: SettingsBuilder::build
#[derive(Default)]
pub struct SettingsBuilder {
    nonce_provider: Option<Box<dyn NonceProvider>>,
    sync_factor: Option<u8>,
    sync_time_limit: Option<Duration>,
    retry_policy: Option<RetryPolicy>,
    endpoints: Option<Vec<String>>,
    client_pool: Option<Box<dyn ClientPool>>,
}

impl SettingsBuilder {
    /// Replaces the default nonce generator.
    #[must_use]
    pub fn nonce_provider(mut self, provider: impl NonceProvider + 'static) -> Self {
        self.nonce_provider = Some(Box::new(provider));
        self
    }

    /// Sets the `sl` request parameter, the percentage of backend consensus
    /// required. Lower values answer faster, 100 is the most strict.
    #[must_use]
    pub const fn sync_factor(mut self, percent: u8) -> Self {
        self.sync_factor = Some(percent);
        self
    }

    /// Sets the `timeout` request parameter. Truncated to whole seconds.
    #[must_use]
    pub const fn sync_time_limit(mut self, limit: Duration) -> Self {
        self.sync_time_limit = Some(limit);
        self
    }

    /// Replaces the default retry schedule.
    #[must_use]
    pub const fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Replaces the official endpoints with a custom failover list.
    /// Every entry must be an `https` URL.
    #[must_use]
    pub fn endpoints<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.endpoints = Some(endpoints.into_iter().map(Into::into).collect());
        self
    }

    /// Replaces the default network client pool.
    #[must_use]
    pub fn client_pool(mut self, pool: impl ClientPool + 'static) -> Self {
        self.client_pool = Some(Box::new(pool));
        self
    }

    /// Applies defaults, validates every field, and produces [`Settings`].
    ///
    /// # Errors
    ///
    /// Returns [`OtpKitError::InvalidSettings`] naming the offending
    /// attribute when any value is out of range, the endpoint list is
    /// malformed, the nonce provider fails its test firing, or the client
    /// pool cannot produce a usable client.
    pub fn build(self) -> Result<Settings, OtpKitError> {
        let nonce_provider = self
            .nonce_provider
            .unwrap_or_else(|| Box::new(SystemNonceProvider));
        nonce_provider.generate().map_err(|e| {
            invalid("nonce generator", format!("nonce generator does not work: {e}"))
        })?;

        let sync_factor = self.sync_factor.unwrap_or(DEFAULT_SYNC_FACTOR);
        if sync_factor > 100 {
            return Err(invalid(
                "synchronization factor",
                "synchronization factor must be between 0 and 100",
            ));
        }

        let seconds = self
            .sync_time_limit
            .unwrap_or(DEFAULT_SYNC_TIME_LIMIT)
            .as_secs();
        if !(1..=120).contains(&seconds) {
            return Err(invalid(
                "synchronization time limit",
                "synchronization time limit must be between 1 and 120 seconds",
            ));
        }

        let retry_policy = self.retry_policy.unwrap_or_default();
        retry_policy.validate()?;

        let endpoints = self
            .endpoints
            .unwrap_or_else(|| DEFAULT_ENDPOINTS.iter().map(ToString::to_string).collect());
        if endpoints.is_empty() {
            return Err(invalid("endpoints", "endpoints list is empty"));
        }
        for (index, endpoint) in endpoints.iter().enumerate() {
            if endpoint.is_empty() {
                return Err(invalid("endpoints", "endpoint cannot be empty"));
            }
            if endpoint.trim() != endpoint {
                return Err(invalid(
                    "endpoints",
                    "endpoint cannot contain leading or trailing whitespace",
                ));
            }
            if !endpoint.starts_with("https://") {
                return Err(invalid(
                    "endpoints",
                    format!("endpoint {endpoint:?} does not use https"),
                ));
            }
            if endpoints[..index].contains(endpoint) {
                return Err(invalid(
                    "endpoints",
                    format!("endpoint {endpoint:?} was already added"),
                ));
            }
        }

        let client_pool: Box<dyn ClientPool> = if let Some(pool) = self.client_pool {
            pool
        } else {
            let pool =
                DefaultClientPool::new().map_err(|e| invalid("client pool", e.to_string()))?;
            Box::new(pool)
        };
        let probe = client_pool.acquire().map_err(|e| {
            invalid(
                "client pool",
                format!("client pool does not return a usable network client: {e}"),
            )
        })?;
        client_pool.release(probe);

        Ok(Settings {
            nonce_provider,
            sync_factor,
            sync_time_limit: Duration::from_secs(seconds),
            retry_policy,
            endpoints,
            client_pool,
        })
    }
}

fn invalid(attribute: &'static str, reason: impl Into<String>) -> OtpKitError {
    OtpKitError::InvalidSettings {
        attribute,
        reason: reason.into(),
    }
}
