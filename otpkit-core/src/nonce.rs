//! Nonces embedded in verification requests to defeat replay.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::OtpKitError;

/// Characters a nonce may contain.
const CHARSET: &[u8; 62] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Protocol-mandated nonce length in characters.
const NONCE_LENGTH: usize = 40;

/// How many leading characters are derived from the clock rather than the RNG.
const TIME_PREFIX_LENGTH: usize = 4;

/// A single-use 40-character alphanumeric token.
///
/// A fresh nonce is embedded in every verification request so the service can
/// distinguish it from any earlier request carrying the same one-time
/// password.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_LENGTH]);

impl Nonce {
    /// The raw nonce bytes, each a member of the alphanumeric charset.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl TryFrom<&str> for Nonce {
    type Error = OtpKitError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let bytes: [u8; NONCE_LENGTH] =
            value
                .as_bytes()
                .try_into()
                .map_err(|_| OtpKitError::NonceGeneration {
                    reason: format!(
                        "nonce must be exactly {NONCE_LENGTH} characters, got {}",
                        value.len()
                    ),
                })?;
        if bytes.iter().any(|b| !CHARSET.contains(b)) {
            return Err(OtpKitError::NonceGeneration {
                reason: "nonce may only contain alphanumeric characters".to_owned(),
            });
        }
        Ok(Self(bytes))
    }
}

/// Source of fresh nonces for verification requests.
///
/// A nonce must never repeat across calls from the same process. Closures
/// with the matching signature satisfy this trait directly.
pub trait NonceProvider: Send + Sync {
    /// Produces a fresh nonce.
    ///
    /// # Errors
    /// Returns a nonce-generation error when no fresh value can be produced,
    /// for example when the entropy source is unavailable.
    fn generate(&self) -> Result<Nonce, OtpKitError>;
}

impl<F> NonceProvider for F
where
    F: Fn() -> Result<Nonce, OtpKitError> + Send + Sync,
{
    fn generate(&self) -> Result<Nonce, OtpKitError> {
        self()
    }
}

/// The default nonce source: four clock-derived characters followed by 36
/// characters from the operating system RNG.
///
/// The leading characters are successive base-62 digits of the current
/// nanosecond timestamp, so nonces generated in rapid succession differ even
/// if the RNG were to repeat itself within clock resolution. The remaining
/// bytes are folded into the charset by modulo reduction.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemNonceProvider;

impl NonceProvider for SystemNonceProvider {
    // Truncating casts below are bounded by the charset length.
    #[allow(clippy::cast_possible_truncation)]
    fn generate(&self) -> Result<Nonce, OtpKitError> {
        let mut raw = [0u8; NONCE_LENGTH];

        let mut t = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| OtpKitError::NonceGeneration {
                reason: format!("system clock is before the unix epoch: {err}"),
            })?
            .as_nanos();
        for slot in &mut raw[..TIME_PREFIX_LENGTH] {
            *slot = CHARSET[(t % CHARSET.len() as u128) as usize];
            t /= CHARSET.len() as u128;
        }

        OsRng
            .try_fill_bytes(&mut raw[TIME_PREFIX_LENGTH..])
            .map_err(|err| OtpKitError::NonceGeneration {
                reason: format!("not enough random bytes: {err}"),
            })?;
        for slot in &mut raw[TIME_PREFIX_LENGTH..] {
            *slot = CHARSET[usize::from(*slot % CHARSET.len() as u8)];
        }

        Ok(Nonce(raw))
    }
}
