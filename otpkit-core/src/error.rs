use thiserror::Error;

/// Error outputs from `otpkit`.
///
/// Every failure mode of a verification call maps to exactly one variant, so
/// callers can match on the kind to drive their own retry or alerting policy.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OtpKitError {
    /// A configuration value failed validation while building [`Settings`].
    ///
    /// [`Settings`]: crate::Settings
    #[error("invalid {attribute}: {reason}")]
    InvalidSettings {
        /// The settings attribute that failed validation.
        attribute: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
    /// The nonce provider could not produce a fresh nonce.
    #[error("nonce generation failed: {reason}")]
    NonceGeneration {
        /// Why no nonce could be produced.
        reason: String,
    },
    /// The client secret is not valid standard base64.
    #[error("invalid client secret: {0}")]
    InvalidClientSecret(#[from] base64::DecodeError),
    /// Every transport attempt failed; carries the last failure.
    #[error("network client failed: {error} (endpoint {endpoint}, {attempts} attempts)")]
    Transport {
        /// Number of attempts made before giving up.
        attempts: u8,
        /// Endpoint of the last failed attempt.
        endpoint: String,
        /// The last transport failure.
        error: String,
    },
    /// The caller-supplied deadline fired before a reply was obtained.
    #[error("verification cancelled by deadline")]
    Cancelled,
    /// The reply body could not be read off the wire.
    #[error("could not read response: {0}")]
    ResponseRead(String),
    /// The reply carried a field this protocol version does not know about.
    #[error("could not parse response: received an unexpected API field {key:?} with value {value:?}")]
    UnexpectedResponseField {
        /// The unrecognized key.
        key: String,
        /// The non-empty value that arrived with it.
        value: String,
    },
    /// The service rejected the verification request.
    #[error("could not verify response: {0}")]
    Rejected(#[from] RequestRejection),
    /// The reply signature does not match the shared secret.
    #[error("could not verify response: bad response signature")]
    ResponseSignature,
}

/// Request-level rejection reported through the service `status` field.
///
/// These are genuine verdicts from the validation service, not transport
/// conditions, and are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RequestRejection {
    /// The service answered with a status this client does not recognize.
    #[error("unknown failure")]
    UnknownFailure,
    /// `BAD_OTP`: the one-time password is malformed.
    #[error("one time password is in invalid format")]
    InvalidFormat,
    /// `REPLAYED_OTP` / `REPLAYED_REQUEST`: the password or request was seen before.
    #[error("one time password was already used in the past")]
    Replayed,
    /// `BAD_SIGNATURE`: the request signature did not verify server-side.
    #[error("the request signature did not match")]
    BadSignature,
    /// `MISSING_PARAMETER`: the request lacks a required parameter.
    #[error("the request lacks a parameter")]
    MissingParameter,
    /// `NO_SUCH_CLIENT`: the client id is not registered.
    #[error("client does not exist")]
    UnknownClient,
    /// `OPERATION_NOT_ALLOWED`: the client id may not verify OTPs.
    #[error("client is not allowed to verify one time passwords")]
    Forbidden,
    /// `NOT_ENOUGH_ANSWERS`: server consensus was not reached in time.
    #[error("server could not obtain the requested number of synchronizations before the deadline")]
    SyncDeadlineExceeded,
    /// `BACKEND_ERROR`: the service could not process the request.
    #[error("server could not process the request")]
    BackendError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_messages_use_service_vocabulary() {
        assert_eq!(
            RequestRejection::Replayed.to_string(),
            "one time password was already used in the past"
        );
        assert_eq!(
            OtpKitError::from(RequestRejection::Forbidden).to_string(),
            "could not verify response: client is not allowed to verify one time passwords"
        );
    }

    #[test]
    fn transport_error_reports_attempts_and_endpoint() {
        let err = OtpKitError::Transport {
            attempts: 3,
            endpoint: "https://api.example.com/wsapi/2.0/verify".to_owned(),
            error: "connection refused".to_owned(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("3 attempts"));
        assert!(rendered.contains("connection refused"));
    }
}
