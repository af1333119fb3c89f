#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! Client for the Yubico one-time-password validation protocol (`wsapi` 2.0).
//!
//! Each verification call signs a canonical query with the caller's shared
//! secret, sends it across a rotating list of failover endpoints with
//! exponential backoff, and checks the verdict and signature of the reply.
//! A non-OK verdict, a signature mismatch, and a transport failure are all
//! distinct error kinds, so callers can drive their own retry and alerting
//! policy.
//!
//! ```no_run
//! use otpkit_core::{Authenticator, SecretString, Settings, Verification};
//!
//! # async fn demo() -> Result<(), otpkit_core::OtpKitError> {
//! let authenticator = Authenticator::new(Settings::builder().build()?);
//! authenticator
//!     .authenticate(Verification {
//!         one_time_password: "ccccccclulvjtugenkidvdclnuitnbvnkkcdrlhertlt".to_owned(),
//!         client_id: 42,
//!         client_secret: SecretString::from("bXkgc2VjcmV0IGtleQ==".to_owned()),
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub use secrecy::SecretString;

mod authenticator;
pub use authenticator::*;

mod endpoints;
pub use endpoints::*;

mod error;
pub use error::*;

mod nonce;
pub use nonce::*;

mod pool;
pub use pool::*;

mod settings;
pub use settings::*;

// private modules
mod request;
mod response;
mod transport;
