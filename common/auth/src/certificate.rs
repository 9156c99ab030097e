use chrono::{DateTime, FixedOffset, Utc};
use common_crypto::ApiV3Key;
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use x509_cert::der::{DecodePem, Encode};
use x509_cert::Certificate;

use crate::error::{AuthError, AuthResult};

/// Platform certificate entry as returned by `GET /v3/certificates`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayCertificate {
    pub serial_no: String,
    pub effective_time: String,
    pub expire_time: String,
    pub encrypt_certificate: EncryptedCertificate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedCertificate {
    /// Always `AEAD_AES_256_GCM` at present.
    pub algorithm: String,
    pub nonce: String,
    #[serde(default)]
    pub associated_data: String,
    pub ciphertext: String,
}

impl GatewayCertificate {
    /// Decrypt the embedded certificate PEM with the APIv3 key.
    pub fn decrypt_pem(&self, api_v3_key: &ApiV3Key) -> AuthResult<String> {
        let payload = &self.encrypt_certificate;
        let pem =
            api_v3_key.decrypt_to_string(&payload.ciphertext, &payload.nonce, &payload.associated_data)?;
        Ok(pem)
    }

    /// Fails unless `effective_time <= now < expire_time`.
    pub fn ensure_valid_at(&self, now: DateTime<Utc>) -> AuthResult<()> {
        let effective = parse_time(&self.serial_no, "effective_time", &self.effective_time)?;
        let expires = parse_time(&self.serial_no, "expire_time", &self.expire_time)?;
        if now < effective {
            return Err(AuthError::CertificateNotValid {
                serial: self.serial_no.clone(),
                reason: format!("not effective until {}", self.effective_time),
            });
        }
        if now >= expires {
            return Err(AuthError::CertificateNotValid {
                serial: self.serial_no.clone(),
                reason: format!("expired at {}", self.expire_time),
            });
        }
        Ok(())
    }
}

fn parse_time(serial: &str, field: &str, value: &str) -> AuthResult<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).map_err(|err| AuthError::CertificateNotValid {
        serial: serial.to_string(),
        reason: format!("unreadable {field} '{value}': {err}"),
    })
}

/// Exact-match lookup by serial number.
pub fn find_certificate<'a>(
    certificates: &'a [GatewayCertificate],
    serial_number: &str,
) -> Option<&'a GatewayCertificate> {
    certificates
        .iter()
        .find(|certificate| certificate.serial_no == serial_number)
}

/// Serial number of a PEM certificate in the form the gateway puts in headers:
/// uppercase hex without the DER sign-padding byte.
pub fn extract_serial_number(pem: &[u8]) -> AuthResult<String> {
    let certificate = parse_certificate(pem)?;
    let bytes = certificate.tbs_certificate.serial_number.as_bytes();
    let significant = match bytes.iter().position(|byte| *byte != 0) {
        Some(start) => &bytes[start..],
        None => &bytes[bytes.len().saturating_sub(1)..],
    };
    Ok(significant.iter().map(|byte| format!("{byte:02X}")).collect())
}

/// RSA public key from an X.509 certificate PEM, or from a bare `PUBLIC KEY` PEM.
pub fn public_key_from_pem(pem: &[u8]) -> AuthResult<RsaPublicKey> {
    let text = std::str::from_utf8(pem)
        .map_err(|err| AuthError::CertificateParse(format!("PEM is not UTF-8: {err}")))?;
    if text.contains("BEGIN PUBLIC KEY") {
        return RsaPublicKey::from_public_key_pem(text)
            .map_err(|err| AuthError::CertificateParse(err.to_string()));
    }
    let certificate = parse_certificate(pem)?;
    let spki = certificate
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|err| AuthError::CertificateParse(err.to_string()))?;
    RsaPublicKey::from_public_key_der(&spki)
        .map_err(|err| AuthError::CertificateParse(err.to_string()))
}

fn parse_certificate(pem: &[u8]) -> AuthResult<Certificate> {
    if pem.iter().all(u8::is_ascii_whitespace) {
        return Err(AuthError::MissingCertificate);
    }
    Certificate::from_pem(pem).map_err(|err| AuthError::CertificateParse(err.to_string()))
}
