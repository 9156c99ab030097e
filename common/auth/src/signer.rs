use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use chrono::Utc;
use rand::rngs::OsRng;
use rand::Rng;
use rsa::pkcs1v15::SigningKey;
use rsa::signature::{SignatureEncoding, Signer};
use sha2::Sha256;
use tracing::debug;

use crate::config::MerchantIdentity;
use crate::error::{AuthError, AuthResult};
use crate::keys::KeyMaterial;

/// Scheme token at the start of every `Authorization` header.
pub const AUTH_SCHEME: &str = "WECHATPAY2-SHA256-RSA2048";

const NONCE_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const NONCE_LENGTH: usize = 32;

/// Inputs of one outbound signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningContext {
    pub method: String,
    /// Path including the query string, e.g. `/v3/pay/transactions/id/42?mchid=1900000109`.
    pub request_path: String,
    /// Exact body text sent on the wire; empty for bodyless requests.
    pub body: String,
    pub timestamp: String,
    pub nonce: String,
}

impl SigningContext {
    /// Context stamped with the current time and a fresh nonce.
    pub fn new(method: &str, request_path: &str, body: Option<&str>) -> Self {
        Self::with_stamp(method, request_path, body, current_timestamp(), generate_nonce())
    }

    pub fn with_stamp(
        method: &str,
        request_path: &str,
        body: Option<&str>,
        timestamp: impl Into<String>,
        nonce: impl Into<String>,
    ) -> Self {
        Self {
            method: method.to_string(),
            request_path: request_path.to_string(),
            body: body.unwrap_or_default().to_string(),
            timestamp: timestamp.into(),
            nonce: nonce.into(),
        }
    }

    /// `METHOD\nPATH\nTIMESTAMP\nNONCE\nBODY\n`
    pub fn canonical_string(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}\n{}\n",
            self.method, self.request_path, self.timestamp, self.nonce, self.body
        )
    }
}

/// Parsed form of the `Authorization` header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationHeader {
    pub merchant_id: String,
    pub nonce: String,
    pub timestamp: String,
    pub serial_number: String,
    pub signature: String,
}

impl fmt::Display for AuthorizationHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{AUTH_SCHEME} mchid=\"{}\",nonce_str=\"{}\",timestamp=\"{}\",serial_no=\"{}\",signature=\"{}\"",
            self.merchant_id, self.nonce, self.timestamp, self.serial_number, self.signature
        )
    }
}

/// Signs outbound requests with the merchant private key.
#[derive(Clone)]
pub struct RequestSigner {
    identity: MerchantIdentity,
    serial_number: String,
    signing_key: SigningKey<Sha256>,
}

impl RequestSigner {
    pub fn new(identity: MerchantIdentity, keys: KeyMaterial) -> Self {
        let signing_key = SigningKey::<Sha256>::new(keys.private_key().clone());
        Self {
            identity,
            serial_number: keys.serial_number().to_string(),
            signing_key,
        }
    }

    /// Build a signer straight from PEM inputs; fails before any request is made.
    pub fn from_pem(
        identity: MerchantIdentity,
        private_key_pem: &[u8],
        certificate_pem: &[u8],
    ) -> AuthResult<Self> {
        let keys = KeyMaterial::from_pem(private_key_pem, certificate_pem)?;
        Ok(Self::new(identity, keys))
    }

    pub fn identity(&self) -> &MerchantIdentity {
        &self.identity
    }

    /// Serial number of the merchant's own API certificate.
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    /// Base64 RSA-SHA256 signature over an arbitrary message.
    pub fn sign_message(&self, message: &str) -> AuthResult<String> {
        let signature = self
            .signing_key
            .try_sign(message.as_bytes())
            .map_err(|err| AuthError::Signing(err.to_string()))?;
        Ok(BASE64_STANDARD.encode(signature.to_bytes()))
    }

    pub fn sign_context(&self, context: &SigningContext) -> AuthResult<String> {
        self.sign_message(&context.canonical_string())
    }

    /// Signature for a request stamped with the current time and a fresh nonce.
    pub fn sign(&self, method: &str, request_path: &str, body: Option<&str>) -> AuthResult<String> {
        self.sign_context(&SigningContext::new(method, request_path, body))
    }

    pub fn authorize_context(&self, context: &SigningContext) -> AuthResult<AuthorizationHeader> {
        let signature = self.sign_context(context)?;
        debug!(
            method = %context.method,
            path = %context.request_path,
            serial = %self.serial_number,
            "signed outbound request"
        );
        Ok(AuthorizationHeader {
            merchant_id: self.identity.merchant_id.clone(),
            nonce: context.nonce.clone(),
            timestamp: context.timestamp.clone(),
            serial_number: self.serial_number.clone(),
            signature,
        })
    }

    /// Complete `Authorization` header value for one request.
    pub fn authorization_header(
        &self,
        method: &str,
        request_path: &str,
        body: Option<&str>,
    ) -> AuthResult<String> {
        let context = SigningContext::new(method, request_path, body);
        Ok(self.authorize_context(&context)?.to_string())
    }
}

impl fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSigner")
            .field("identity", &self.identity)
            .field("serial_number", &self.serial_number)
            .finish_non_exhaustive()
    }
}

/// Current unix time in whole seconds.
pub fn current_timestamp() -> String {
    Utc::now().timestamp().to_string()
}

/// 32 characters of `[0-9A-Z]` from the OS random source.
pub fn generate_nonce() -> String {
    let mut rng = OsRng;
    (0..NONCE_LENGTH)
        .map(|_| NONCE_ALPHABET[rng.gen_range(0..NONCE_ALPHABET.len())] as char)
        .collect()
}
