use std::time::Duration;

/// Error produced when a pool cannot hand out a usable client.
pub type PoolError = Box<dyn std::error::Error + Send + Sync>;

/// Source of network clients for verification calls.
///
/// The transport acquires one client per call and returns it on every exit
/// path, so implementations can bound how many clients exist at once. An
/// implementation is probed once at settings-build time.
pub trait ClientPool: Send + Sync {
    /// Hands out a client for one verification call.
    ///
    /// # Errors
    ///
    /// Returns a pool-specific error when no usable client can be produced.
    fn acquire(&self) -> Result<reqwest::Client, PoolError>;

    /// Takes back a previously acquired client.
    fn release(&self, client: reqwest::Client);
}

/// Pool that hands out clones of a single configured client.
///
/// Cloning a `reqwest` client shares its connection pool, so every borrower
/// reuses the same keep-alive connections.
#[derive(Debug, Clone)]
pub struct DefaultClientPool {
    client: reqwest::Client,
}

impl DefaultClientPool {
    /// Builds the pool around a client tuned for the verification service:
    /// 5s request timeout, 30s connect timeout, bounded idle connections.
    ///
    /// # Errors
    ///
    /// Returns the underlying client builder error, typically a TLS backend
    /// initialization failure.
    pub fn new() -> Result<Self, PoolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .connect_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .pool_max_idle_per_host(5)
            .build()?;
        Ok(Self { client })
    }
}

impl ClientPool for DefaultClientPool {
    fn acquire(&self) -> Result<reqwest::Client, PoolError> {
        Ok(self.client.clone())
    }

    fn release(&self, _client: reqwest::Client) {}
}

/// Borrowed client that returns itself to its pool on drop.
///
/// Dropping the guard is the only release path, so the client goes back even
/// when the verification future is dropped mid-flight.
pub(crate) struct PooledClient<'a> {
    pool: &'a dyn ClientPool,
    client: Option<reqwest::Client>,
}

impl<'a> PooledClient<'a> {
    pub(crate) fn acquire(pool: &'a dyn ClientPool) -> Result<Self, PoolError> {
        let client = pool.acquire()?;
        Ok(Self {
            pool,
            client: Some(client),
        })
    }
}

impl std::ops::Deref for PooledClient<'_> {
    type Target = reqwest::Client;

    fn deref(&self) -> &Self::Target {
        self.client.as_ref().expect("release happens only on drop")
    }
}

impl Drop for PooledClient<'_> {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.pool.release(client);
        }
    }
}
