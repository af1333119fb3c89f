use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use url::form_urlencoded;

use crate::nonce::Nonce;

type HmacSha1 = Hmac<Sha1>;

/// Builds the signed verification query string.
///
/// Field order is a wire contract: the service recomputes the signature over
/// `id`, `nonce`, `otp`, `sl`, `timeout`, `timestamp` in exactly this order,
/// so reordering or re-encoding any field produces a signature mismatch. The
/// HMAC-SHA1 digest over those bytes is base64-encoded and appended as `h`.
pub(crate) fn build_signed_query(
    one_time_password: &str,
    client_id: u64,
    secret: &[u8],
    nonce: &Nonce,
    sync_factor: &str,
    sync_time_limit: &str,
) -> String {
    let mut query = String::with_capacity(192);
    query.push_str("id=");
    query.push_str(&client_id.to_string());
    query.push_str("&nonce=");
    query.push_str(&form_urlencoded::byte_serialize(nonce.as_bytes()).collect::<String>());
    query.push_str("&otp=");
    query.push_str(
        &form_urlencoded::byte_serialize(one_time_password.as_bytes()).collect::<String>(),
    );
    query.push_str("&sl=");
    query.push_str(sync_factor);
    query.push_str("&timeout=");
    query.push_str(sync_time_limit);
    query.push_str("&timestamp=1");

    let mut mac = HmacSha1::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(query.as_bytes());
    query.push_str("&h=");
    query.push_str(&BASE64.encode(mac.finalize().into_bytes()));
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"secretkey";

    fn fixed_nonce() -> Nonce {
        Nonce::try_from("n".repeat(40).as_str()).expect("charset nonce")
    }

    fn fixed_otp() -> String {
        "c".repeat(44)
    }

    #[test]
    fn query_is_byte_for_byte_reproducible() {
        let query = build_signed_query(&fixed_otp(), 1, SECRET, &fixed_nonce(), "100", "6");
        let expected_canonical = format!(
            "id=1&nonce={}&otp={}&sl=100&timeout=6&timestamp=1",
            "n".repeat(40),
            "c".repeat(44),
        );
        // Digest computed independently over the same canonical string.
        assert_eq!(query, format!("{expected_canonical}&h=CiFp+QNDz+bNhFi3KU2BerQmBVk="));
    }

    #[test]
    fn signature_matches_independent_hmac() {
        let query = build_signed_query(&fixed_otp(), 1, SECRET, &fixed_nonce(), "100", "6");
        let (canonical, signature) = query.split_once("&h=").expect("query carries a signature");

        let mut mac = HmacSha1::new_from_slice(SECRET).expect("HMAC accepts any key length");
        mac.update(canonical.as_bytes());
        let digest = mac.finalize().into_bytes();
        assert_eq!(hex::encode(digest), "0a2169f90343cfe6cd8458b7294d817ab4260559");
        assert_eq!(signature, BASE64.encode(digest));
    }

    #[test]
    fn identical_inputs_sign_identically() {
        let first = build_signed_query(&fixed_otp(), 1, SECRET, &fixed_nonce(), "100", "6");
        let second = build_signed_query(&fixed_otp(), 1, SECRET, &fixed_nonce(), "100", "6");
        assert_eq!(first, second);
    }

    #[test]
    fn nonce_and_otp_are_url_escaped() {
        let query = build_signed_query("otp with space", 7, SECRET, &fixed_nonce(), "50", "10");
        assert!(query.contains("&otp=otp+with+space&"));
        assert!(query.starts_with("id=7&nonce="));
    }
}
