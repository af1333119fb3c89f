use std::sync::{Mutex, PoisonError};

/// Official endpoints of the Yubico validation service.
///
/// All five answer the same protocol and share replay state, so the transport
/// treats them as interchangeable failover targets.
pub const DEFAULT_ENDPOINTS: [&str; 5] = [
    "https://api.yubico.com/wsapi/2.0/verify",
    "https://api2.yubico.com/wsapi/2.0/verify",
    "https://api3.yubico.com/wsapi/2.0/verify",
    "https://api4.yubico.com/wsapi/2.0/verify",
    "https://api5.yubico.com/wsapi/2.0/verify",
];

/// Failover endpoint list with a cursor shared across verification calls.
///
/// The cursor survives individual calls so that a dead endpoint discovered by
/// one verification is not retried first by the next. Only the cursor sits
/// behind the lock; the list itself is immutable after construction, and the
/// lock is never held across a network call or sleep.
#[derive(Debug)]
pub(crate) struct EndpointSet {
    endpoints: Vec<String>,
    cursor: Mutex<usize>,
}

impl EndpointSet {
    /// The list must be non-empty; the settings builder validates this.
    pub(crate) fn new(endpoints: Vec<String>) -> Self {
        debug_assert!(!endpoints.is_empty());
        Self {
            endpoints,
            cursor: Mutex::new(0),
        }
    }

    /// Endpoint the next attempt will target.
    pub(crate) fn current(&self) -> &str {
        let index = *self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        &self.endpoints[index]
    }

    /// Advances the cursor past a failed endpoint and returns the next one.
    /// Wraps over the configured list, however long it is.
    pub(crate) fn rotate(&self) -> &str {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        *cursor = (*cursor + 1) % self.endpoints.len();
        let index = *cursor;
        drop(cursor);
        &self.endpoints[index]
    }
}
