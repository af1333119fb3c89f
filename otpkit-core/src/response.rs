use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq as _;

use crate::error::{OtpKitError, RequestRejection};

type HmacSha1 = Hmac<Sha1>;

/// Wire values of the service `status` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum Status {
    Ok,
    BadOtp,
    ReplayedOtp,
    ReplayedRequest,
    BadSignature,
    MissingParameter,
    NoSuchClient,
    OperationNotAllowed,
    NotEnoughAnswers,
    BackendError,
}

impl Status {
    /// Request-level verdict carried by this status.
    const fn verdict(self) -> Result<(), RequestRejection> {
        match self {
            Self::Ok => Ok(()),
            Self::BadOtp => Err(RequestRejection::InvalidFormat),
            Self::ReplayedOtp | Self::ReplayedRequest => Err(RequestRejection::Replayed),
            Self::BadSignature => Err(RequestRejection::BadSignature),
            Self::MissingParameter => Err(RequestRejection::MissingParameter),
            Self::NoSuchClient => Err(RequestRejection::UnknownClient),
            Self::OperationNotAllowed => Err(RequestRejection::Forbidden),
            Self::NotEnoughAnswers => Err(RequestRejection::SyncDeadlineExceeded),
            Self::BackendError => Err(RequestRejection::BackendError),
        }
    }
}

/// Parsed reply from the verification service.
///
/// Fields stay raw wire strings: the signature covers their exact bytes, so
/// any normalization before verification would break the comparison.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ServiceResponse {
    pub(crate) received_otp: String,
    pub(crate) signature: String,
    pub(crate) received_nonce: String,
    pub(crate) session_counter: String,
    pub(crate) session_use: String,
    pub(crate) status: String,
    pub(crate) sync_factor: String,
    pub(crate) request_timestamp: String,
    pub(crate) activation_timestamp: String,
}

impl ServiceResponse {
    /// Checks the status verdict, then the response signature.
    ///
    /// A non-OK status is a verdict in itself and short-circuits before any
    /// signature work; some rejections are answered unsigned.
    pub(crate) fn verify(&self, secret: &[u8]) -> Result<(), OtpKitError> {
        let status: Status = self
            .status
            .parse()
            .map_err(|_| RequestRejection::UnknownFailure)?;
        status.verdict()?;

        let mut mac = HmacSha1::new_from_slice(secret).expect("HMAC accepts any key length");
        mac.update(self.canonical_string().as_bytes());
        let expected = BASE64.encode(mac.finalize().into_bytes());
        if expected.as_bytes().ct_eq(self.signature.as_bytes()).into() {
            Ok(())
        } else {
            Err(OtpKitError::ResponseSignature)
        }
    }

    /// Response fields in strict alphabetical key order, the exact byte
    /// sequence the service signed.
    fn canonical_string(&self) -> String {
        let mut canonical = String::with_capacity(192);
        canonical.push_str("nonce=");
        canonical.push_str(&self.received_nonce);
        canonical.push_str("&otp=");
        canonical.push_str(&self.received_otp);
        canonical.push_str("&sessioncounter=");
        canonical.push_str(&self.session_counter);
        canonical.push_str("&sessionuse=");
        canonical.push_str(&self.session_use);
        canonical.push_str("&sl=");
        canonical.push_str(&self.sync_factor);
        canonical.push_str("&status=");
        canonical.push_str(&self.status);
        canonical.push_str("&t=");
        canonical.push_str(&self.request_timestamp);
        canonical.push_str("&timestamp=");
        canonical.push_str(&self.activation_timestamp);
        canonical
    }
}

/// Parses the newline-delimited `key=value` reply body.
///
/// A line without `=` counts as a key with an empty value. Unknown keys with
/// empty values are tolerated; an unknown key carrying a value means the
/// protocol has drifted and fails the parse.
pub(crate) fn parse_response(body: &str) -> Result<ServiceResponse, OtpKitError> {
    let mut response = ServiceResponse::default();
    for line in body.lines() {
        let (key, value) = line.split_once('=').unwrap_or((line, ""));
        match key {
            "h" => response.signature = value.to_owned(),
            "t" => response.request_timestamp = value.to_owned(),
            "timestamp" => response.activation_timestamp = value.to_owned(),
            "otp" => response.received_otp = value.to_owned(),
            "nonce" => response.received_nonce = value.to_owned(),
            "sessioncounter" => response.session_counter = value.to_owned(),
            "sessionuse" => response.session_use = value.to_owned(),
            "status" => response.status = value.to_owned(),
            "sl" => response.sync_factor = value.to_owned(),
            _ if value.is_empty() => {}
            _ => {
                return Err(OtpKitError::UnexpectedResponseField {
                    key: key.to_owned(),
                    value: value.to_owned(),
                })
            }
        }
    }
    Ok(response)
}
