#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use http::{HeaderMap, StatusCode};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::RsaPrivateKey;
use sha2::Sha256;
use wechatpay_client::{
    AuthenticatedClient, EncryptedResource, GatewayCertificate, MerchantIdentity, Transport,
    TransportError, TransportRequest, TransportResponse,
};

pub const MERCHANT_KEY: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../common/auth/tests/fixtures/merchant_key.pem"
));
pub const MERCHANT_CERT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../common/auth/tests/fixtures/merchant_cert.pem"
));
pub const PLATFORM_KEY: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../common/auth/tests/fixtures/platform_key.pem"
));
pub const PLATFORM_CERT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../common/auth/tests/fixtures/platform_cert.pem"
));

pub const APP_ID: &str = "wxd678efh567hg6787";
pub const MERCHANT_ID: &str = "1900000109";
pub const MERCHANT_SERIAL: &str = "5157F09EFDC096DE15EBE81A47057A7232F1B8E1";
pub const PLATFORM_SERIAL: &str = "8FA2C61D39E04B7A5C2D11E0F3B6A9D47C50E913";
pub const API_V3_KEY: &str = "a7cde1ef5a8c4a3e9b1f7d2c6e0b4f18";

pub fn identity() -> MerchantIdentity {
    MerchantIdentity::new(APP_ID, MERCHANT_ID).with_user_agent("wechatpay-client-tests/1.0")
}

pub fn client(transport: Arc<dyn Transport>) -> AuthenticatedClient {
    AuthenticatedClient::new(
        identity(),
        MERCHANT_KEY.as_bytes(),
        MERCHANT_CERT.as_bytes(),
        transport,
    )
    .expect("client")
}

pub fn platform_certificate() -> GatewayCertificate {
    let nonce = "61f9c719728a";
    let ciphertext = common_crypto::encrypt(PLATFORM_CERT.as_bytes(), nonce, "certificate", API_V3_KEY)
        .expect("encrypt certificate");
    serde_json::from_value(serde_json::json!({
        "serial_no": PLATFORM_SERIAL,
        "effective_time": "2024-01-01T00:00:00+08:00",
        "expire_time": "2029-01-01T00:00:00+08:00",
        "encrypt_certificate": {
            "algorithm": "AEAD_AES_256_GCM",
            "nonce": nonce,
            "associated_data": "certificate",
            "ciphertext": ciphertext
        }
    }))
    .expect("certificate json")
}

pub fn encrypted_resource(plaintext: &str, associated_data: &str) -> EncryptedResource {
    let nonce = "fdasflkja484";
    EncryptedResource {
        algorithm: "AEAD_AES_256_GCM".to_string(),
        ciphertext: common_crypto::encrypt(plaintext.as_bytes(), nonce, associated_data, API_V3_KEY)
            .expect("encrypt resource"),
        associated_data: associated_data.to_string(),
        original_type: Some("transaction".to_string()),
        nonce: nonce.to_string(),
    }
}

pub fn platform_sign(message: &str) -> String {
    let key = RsaPrivateKey::from_pkcs8_pem(PLATFORM_KEY).expect("platform key");
    let signature = SigningKey::<Sha256>::new(key).sign(message.as_bytes());
    BASE64_STANDARD.encode(signature.to_bytes())
}

/// True when `signature` is a merchant-key signature over `message`.
pub fn merchant_signed(message: &str, signature: &str) -> bool {
    let public_key = common_auth::public_key_from_pem(MERCHANT_CERT.as_bytes()).expect("merchant public key");
    let bytes = BASE64_STANDARD.decode(signature).expect("base64 signature");
    let signature = Signature::try_from(bytes.as_slice()).expect("signature bytes");
    VerifyingKey::<Sha256>::new(public_key)
        .verify(message.as_bytes(), &signature)
        .is_ok()
}

/// Split `WECHATPAY2-SHA256-RSA2048 k="v",...` into its parameters.
pub fn authorization_params(header: &str) -> Vec<(String, String)> {
    let params = header
        .strip_prefix("WECHATPAY2-SHA256-RSA2048 ")
        .expect("auth scheme");
    params
        .split(',')
        .map(|pair| {
            let (key, value) = pair.split_once('=').expect("key=value");
            (key.to_string(), value.trim_matches('"').to_string())
        })
        .collect()
}

pub fn param<'a>(params: &'a [(String, String)], name: &str) -> &'a str {
    params
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
        .unwrap_or_else(|| panic!("missing {name}"))
}

/// Records every request and answers with a fixed response.
pub struct RecordingTransport {
    pub requests: Mutex<Vec<TransportRequest>>,
    status: StatusCode,
    body: String,
}

impl RecordingTransport {
    pub fn new(status: StatusCode, body: &str) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            status,
            body: body.to_string(),
        })
    }

    pub fn last(&self) -> TransportRequest {
        self.requests
            .lock()
            .expect("lock")
            .last()
            .cloned()
            .expect("a recorded request")
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.requests.lock().expect("lock").push(request);
        Ok(TransportResponse {
            status: self.status,
            headers: HeaderMap::new(),
            body: self.body.as_bytes().to_vec(),
        })
    }
}

/// Counts calls and always fails at the network layer.
#[derive(Default)]
pub struct FailingTransport {
    pub calls: AtomicUsize,
}

impl FailingTransport {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FailingTransport {
    async fn execute(&self, _request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::Network("connection refused".to_string()))
    }
}
