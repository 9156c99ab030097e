pub mod certificate;
pub mod config;
pub mod error;
pub mod keys;
pub mod signer;
pub mod verifier;

pub use certificate::{
    extract_serial_number, find_certificate, public_key_from_pem, EncryptedCertificate,
    GatewayCertificate,
};
pub use config::{MerchantIdentity, VerifyPolicy, DEFAULT_USER_AGENT};
pub use error::{AuthError, AuthResult, ErrorKind};
pub use keys::KeyMaterial;
pub use signer::{
    current_timestamp, generate_nonce, AuthorizationHeader, RequestSigner, SigningContext,
    AUTH_SCHEME,
};
pub use verifier::{ResponseVerifier, VerificationContext};
