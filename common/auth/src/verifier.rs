use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use common_crypto::ApiV3Key;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use sha2::Sha256;
use tracing::debug;

use crate::certificate::{find_certificate, public_key_from_pem, GatewayCertificate};
use crate::config::VerifyPolicy;
use crate::error::{AuthError, AuthResult};

/// One inbound response or notification, taken from its `Wechatpay-*` headers.
#[derive(Debug, Clone, Copy)]
pub struct VerificationContext<'a> {
    /// `Wechatpay-Timestamp`
    pub timestamp: &'a str,
    /// `Wechatpay-Nonce`
    pub nonce: &'a str,
    /// Raw body text exactly as received. Re-serialized JSON will not verify.
    pub body: &'a str,
    /// `Wechatpay-Serial`
    pub serial_number: &'a str,
    /// `Wechatpay-Signature`
    pub signature: &'a str,
    pub api_v3_key: &'a str,
}

impl VerificationContext<'_> {
    /// `TIMESTAMP\nNONCE\nBODY\n`
    pub fn canonical_string(&self) -> String {
        format!("{}\n{}\n{}\n", self.timestamp, self.nonce, self.body)
    }
}

/// Verifies gateway signatures against a caller-supplied certificate list.
///
/// Holds no certificates itself; rotation and caching stay with the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseVerifier {
    policy: VerifyPolicy,
}

impl ResponseVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: VerifyPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &VerifyPolicy {
        &self.policy
    }

    /// `Ok(true)` when the signature matches, `Ok(false)` when it does not.
    ///
    /// Errors are reserved for an empty certificate list, a missing APIv3 key, an
    /// unknown serial number, a certificate that will not decrypt or parse, and the
    /// freshness checks enabled in the policy.
    pub fn verify(
        &self,
        context: &VerificationContext<'_>,
        certificates: &[GatewayCertificate],
    ) -> AuthResult<bool> {
        self.verify_at(context, certificates, Utc::now())
    }

    pub fn verify_at(
        &self,
        context: &VerificationContext<'_>,
        certificates: &[GatewayCertificate],
        now: DateTime<Utc>,
    ) -> AuthResult<bool> {
        if certificates.is_empty() {
            return Err(AuthError::EmptyCertificateList);
        }
        if context.api_v3_key.is_empty() {
            return Err(AuthError::MissingApiV3Key);
        }
        let certificate = find_certificate(certificates, context.serial_number)
            .ok_or_else(|| AuthError::UnknownSerial(context.serial_number.to_string()))?;

        if let Some(max_skew_seconds) = self.policy.max_clock_skew_seconds {
            check_skew(context.timestamp, now, max_skew_seconds)?;
        }
        if self.policy.enforce_certificate_window {
            certificate.ensure_valid_at(now)?;
        }

        let api_v3_key = ApiV3Key::new(context.api_v3_key)?;
        let pem = certificate.decrypt_pem(&api_v3_key)?;
        let public_key =
            public_key_from_pem(pem.as_bytes()).map_err(|err| AuthError::PublicKeyParse {
                serial: certificate.serial_no.clone(),
                reason: err.to_string(),
            })?;

        let signature = match BASE64_STANDARD
            .decode(context.signature.trim())
            .ok()
            .and_then(|bytes| Signature::try_from(bytes.as_slice()).ok())
        {
            Some(signature) => signature,
            None => {
                debug!(serial = context.serial_number, "signature is not valid base64");
                return Ok(false);
            }
        };

        let verifying_key = VerifyingKey::<Sha256>::new(public_key);
        let matched = verifying_key
            .verify(context.canonical_string().as_bytes(), &signature)
            .is_ok();
        debug!(serial = context.serial_number, matched, "verified gateway signature");
        Ok(matched)
    }
}

fn check_skew(timestamp: &str, now: DateTime<Utc>, max_skew_seconds: i64) -> AuthResult<()> {
    let stale = || AuthError::StaleTimestamp {
        timestamp: timestamp.to_string(),
        max_skew_seconds,
    };
    let seconds: i64 = timestamp.trim().parse().map_err(|_| stale())?;
    let skew = now.timestamp().abs_diff(seconds);
    if !u64::try_from(max_skew_seconds).is_ok_and(|max| skew <= max) {
        return Err(stale());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn canonical_string_keeps_body_verbatim() {
        let context = VerificationContext {
            timestamp: "1606298401",
            nonce: "f6e418c9c4bf2dce",
            body: "{\"b\":1,\"a\":2}",
            serial_number: "ABC",
            signature: "",
            api_v3_key: "",
        };
        assert_eq!(
            context.canonical_string(),
            "1606298401\nf6e418c9c4bf2dce\n{\"b\":1,\"a\":2}\n"
        );
    }

    #[test]
    fn skew_window_is_symmetric() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        assert!(check_skew("1700000300", now, 300).is_ok());
        assert!(check_skew("1699999700", now, 300).is_ok());
        assert!(matches!(
            check_skew("1700000301", now, 300),
            Err(AuthError::StaleTimestamp { .. })
        ));
        assert!(matches!(
            check_skew("1699999699", now, 300),
            Err(AuthError::StaleTimestamp { .. })
        ));
        assert!(matches!(
            check_skew("not-a-number", now, 300),
            Err(AuthError::StaleTimestamp { .. })
        ));
    }

    #[test]
    fn extreme_timestamps_are_stale() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        for timestamp in [i64::MIN.to_string(), i64::MAX.to_string()] {
            assert!(matches!(
                check_skew(&timestamp, now, 300),
                Err(AuthError::StaleTimestamp { .. })
            ));
        }
        assert!(matches!(
            check_skew("1700000000", now, -1),
            Err(AuthError::StaleTimestamp { .. })
        ));
    }

    #[test]
    fn empty_list_is_checked_before_anything_else() {
        let context = VerificationContext {
            timestamp: "1606298401",
            nonce: "f6e418c9c4bf2dce",
            body: "{}",
            serial_number: "ABC",
            signature: "c2ln",
            api_v3_key: "",
        };
        let err = ResponseVerifier::new()
            .verify(&context, &[])
            .expect_err("empty list");
        assert!(matches!(err, AuthError::EmptyCertificateList));
    }
}
