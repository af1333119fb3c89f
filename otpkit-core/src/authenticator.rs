use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use secrecy::{ExposeSecret as _, SecretString};
use tokio::time::Instant;
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::OtpKitError;
use crate::nonce::NonceProvider;
use crate::request::build_signed_query;
use crate::response::parse_response;
use crate::settings::Settings;
use crate::transport::FailoverTransport;

/// Parameters of one verification call.
///
/// Client ID and secret are issued by the service operator:
/// <https://upgrade.yubico.com/getapikey/>.
#[derive(Debug, Clone)]
pub struct Verification {
    /// One-time password produced by a key touch.
    pub one_time_password: String,
    /// Identifies the verifying client to the service.
    pub client_id: u64,
    /// Base64-encoded shared secret. Signs the request and checks the reply.
    pub client_secret: SecretString,
}

/// Verifies one-time passwords against the Yubico validation service.
///
/// Built once from validated [`Settings`] and shared across calls; the
/// endpoint cursor and the client pool are process-lifetime state, so
/// concurrent calls cooperate on failover instead of interfering.
pub struct Authenticator {
    nonce_provider: Box<dyn NonceProvider>,
    transport: FailoverTransport,
    sync_factor: String,
    sync_time_limit: String,
}

impl Authenticator {
    /// Assembles an authenticator from validated settings. Never fails; all
    /// validation already happened in [`SettingsBuilder::build`].
    ///
    /// [`SettingsBuilder::build`]: crate::SettingsBuilder::build
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        let Settings {
            nonce_provider,
            sync_factor,
            sync_time_limit,
            retry_policy,
            endpoints,
            client_pool,
        } = settings;
        Self {
            nonce_provider,
            transport: FailoverTransport::new(client_pool, endpoints, retry_policy),
            // Wire strings are fixed for the authenticator's lifetime.
            sync_factor: sync_factor.to_string(),
            sync_time_limit: sync_time_limit.as_secs().to_string(),
        }
    }

    /// Endpoint the next verification attempt will target.
    #[must_use]
    pub fn current_endpoint(&self) -> &str {
        self.transport.current_endpoint()
    }

    /// Verifies a one-time password.
    ///
    /// # Errors
    ///
    /// Returns an [`OtpKitError`] when the secret is not valid base64, no
    /// endpoint could be reached within the retry budget, the reply cannot be
    /// read or parsed, the service rejected the request, or the reply
    /// signature does not match the shared secret.
    pub async fn authenticate(&self, verification: Verification) -> Result<(), OtpKitError> {
        self.run(verification, None).await
    }

    /// Verifies a one-time password, giving up at `deadline`.
    ///
    /// The deadline is honored at every suspension point: once it fires, no
    /// further attempts or backoff sleeps happen and the call reports
    /// [`OtpKitError::Cancelled`].
    ///
    /// # Errors
    ///
    /// As [`authenticate`], plus [`OtpKitError::Cancelled`] when the deadline
    /// fires first.
    ///
    /// [`authenticate`]: Authenticator::authenticate
    pub async fn authenticate_with_deadline(
        &self,
        verification: Verification,
        deadline: Instant,
    ) -> Result<(), OtpKitError> {
        self.run(verification, Some(deadline)).await
    }

    async fn run(
        &self,
        verification: Verification,
        deadline: Option<Instant>,
    ) -> Result<(), OtpKitError> {
        let secret = Zeroizing::new(BASE64.decode(verification.client_secret.expose_secret())?);
        let nonce = self.nonce_provider.generate()?;
        let query = build_signed_query(
            &verification.one_time_password,
            verification.client_id,
            &secret,
            &nonce,
            &self.sync_factor,
            &self.sync_time_limit,
        );

        let reply = self.transport.send(&query, deadline).await?;
        let body = reply
            .text()
            .await
            .map_err(|e| OtpKitError::ResponseRead(e.to_string()))?;
        let response = parse_response(&body)?;
        response.verify(&secret)?;
        debug!("one-time password verified");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nonce::Nonce;
    use crate::pool::DefaultClientPool;
    use crate::settings::RetryPolicy;
    use std::time::Duration;
    use tokio_test::assert_ok;

    const SECRET_B64: &str = "c2VjcmV0a2V5";

    fn charset_nonce() -> Nonce {
        Nonce::try_from("n".repeat(40).as_str()).expect("charset nonce")
    }

    fn verification() -> Verification {
        Verification {
            one_time_password: "c".repeat(44),
            client_id: 1,
            client_secret: SecretString::from(SECRET_B64.to_owned()),
        }
    }

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            attempt_limit: 3,
            initial_delay: Duration::from_millis(40),
            delay_ceiling: Duration::from_millis(200),
            delay_multiplier: 2.0,
        }
    }

    /// Test settings around plain-http loopback endpoints, which the public
    /// builder refuses.
    fn settings_for(endpoints: Vec<String>) -> Settings {
        let nonce_provider: Box<dyn NonceProvider> =
            Box::new(|| -> Result<Nonce, OtpKitError> { Ok(charset_nonce()) });
        Settings {
            nonce_provider,
            sync_factor: 100,
            sync_time_limit: Duration::from_secs(6),
            retry_policy: quick_policy(),
            endpoints,
            client_pool: Box::new(DefaultClientPool::new().expect("default pool")),
        }
    }

    fn authenticator_for(server: &mockito::ServerGuard) -> Authenticator {
        Authenticator::new(settings_for(vec![format!(
            "{}/wsapi/2.0/verify",
            server.url()
        )]))
    }

    /// Reply whose signature matches `verification()` under the fixed nonce.
    fn signed_ok_body() -> String {
        format!(
            "h=Ag9FUlbMI+OLuOtnIF3CS63wlDo=\nt=2024-08-25T12:00:00Z0000\notp={}\nnonce={}\n\
             sessioncounter=42\nsessionuse=7\nsl=100\nstatus=OK\ntimestamp=1\n",
            "c".repeat(44),
            "n".repeat(40),
        )
    }

    #[tokio::test]
    async fn verifies_a_signed_ok_reply() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/wsapi/2.0/verify")
            .match_query(mockito::Matcher::Any)
            .with_body(signed_ok_body())
            .create_async()
            .await;

        let authenticator = authenticator_for(&server);
        assert_ok!(authenticator.authenticate(verification()).await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn concurrent_calls_share_one_authenticator() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/wsapi/2.0/verify")
            .match_query(mockito::Matcher::Any)
            .with_body(signed_ok_body())
            .expect(2)
            .create_async()
            .await;

        let authenticator = authenticator_for(&server);
        let (first, second) = tokio::join!(
            authenticator.authenticate(verification()),
            authenticator.authenticate(verification()),
        );
        assert_ok!(first);
        assert_ok!(second);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn tampered_reply_signature_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/wsapi/2.0/verify")
            .match_query(mockito::Matcher::Any)
            .with_body(signed_ok_body().replace(
                "Ag9FUlbMI+OLuOtnIF3CS63wlDo=",
                "AAAAAAAAAAAAAAAAAAAAAAAAAAA=",
            ))
            .create_async()
            .await;

        let authenticator = authenticator_for(&server);
        let err = authenticator
            .authenticate(verification())
            .await
            .expect_err("signature must not verify");
        assert!(matches!(err, OtpKitError::ResponseSignature));
        assert_eq!(err.to_string(), "could not verify response: bad response signature");
    }

    #[tokio::test]
    async fn service_rejection_short_circuits_verification() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/wsapi/2.0/verify")
            .match_query(mockito::Matcher::Any)
            .with_body("status=BAD_OTP\n")
            .create_async()
            .await;

        let authenticator = authenticator_for(&server);
        let err = authenticator
            .authenticate(verification())
            .await
            .expect_err("service said no");
        assert_eq!(
            err.to_string(),
            "could not verify response: one time password is in invalid format"
        );
    }

    #[tokio::test]
    async fn unknown_reply_field_with_value_fails_the_parse() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/wsapi/2.0/verify")
            .match_query(mockito::Matcher::Any)
            .with_body("status=OK\nwat=42\n")
            .create_async()
            .await;

        let authenticator = authenticator_for(&server);
        let err = authenticator
            .authenticate(verification())
            .await
            .expect_err("protocol drift");
        assert_eq!(
            err.to_string(),
            "could not parse response: received an unexpected API field \"wat\" with value \"42\""
        );
    }

    #[tokio::test]
    async fn malformed_secret_fails_before_any_request() {
        let authenticator = Authenticator::new(settings_for(vec![
            "http://127.0.0.1:1/wsapi/2.0/verify".to_owned(),
        ]));
        let mut verification = verification();
        verification.client_secret = SecretString::from("!!!not base64!!!".to_owned());
        let err = authenticator
            .authenticate(verification)
            .await
            .expect_err("secret is not base64");
        assert!(matches!(err, OtpKitError::InvalidClientSecret(_)));
        assert!(err.to_string().starts_with("invalid client secret:"));
    }

    #[tokio::test]
    async fn exhausted_retries_leave_the_cursor_rotated() {
        let endpoints: Vec<String> = (1..=5)
            .map(|port| format!("http://127.0.0.1:{port}/wsapi/2.0/verify"))
            .collect();
        let authenticator = Authenticator::new(settings_for(endpoints.clone()));

        let err = authenticator
            .authenticate(verification())
            .await
            .expect_err("every endpoint is dead");
        assert!(err.to_string().starts_with("network client failed:"));
        // Three failures advance the shared cursor three steps.
        assert_eq!(authenticator.current_endpoint(), endpoints[3]);
    }

    #[tokio::test]
    async fn deadline_cancels_a_stalled_request() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/wsapi/2.0/verify")
            .match_query(mockito::Matcher::Any)
            .with_body_from_request(|_| {
                std::thread::sleep(Duration::from_millis(500));
                b"status=OK\n".to_vec()
            })
            .create_async()
            .await;

        let authenticator = authenticator_for(&server);
        let err = authenticator
            .authenticate_with_deadline(
                verification(),
                Instant::now() + Duration::from_millis(50),
            )
            .await
            .expect_err("deadline fires while the reply stalls");
        assert!(matches!(err, OtpKitError::Cancelled));
    }

    #[test]
    fn debug_output_redacts_the_secret() {
        let rendered = format!("{:?}", verification());
        assert!(!rendered.contains(SECRET_B64));
    }
}
