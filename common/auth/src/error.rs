use common_crypto::CryptoError;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

/// Whether a failure is the caller's misconfiguration or a message that cannot be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fatal; fix the setup rather than retrying.
    Configuration,
    /// The inbound message or certificate must not be trusted.
    Trust,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("merchant private key is missing")]
    MissingPrivateKey,
    #[error("merchant certificate is missing")]
    MissingCertificate,
    #[error("failed to parse merchant private key: {0}")]
    PrivateKeyParse(String),
    #[error("failed to parse certificate: {0}")]
    CertificateParse(String),
    #[error("no gateway certificates supplied")]
    EmptyCertificateList,
    #[error("APIv3 key is missing")]
    MissingApiV3Key,
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("no gateway certificate with serial '{0}'")]
    UnknownSerial(String),
    #[error("failed to decrypt gateway payload: {0}")]
    Decrypt(#[from] CryptoError),
    #[error("failed to read public key for serial '{serial}': {reason}")]
    PublicKeyParse { serial: String, reason: String },
    #[error("message timestamp '{timestamp}' is outside the allowed skew of {max_skew_seconds}s")]
    StaleTimestamp {
        timestamp: String,
        max_skew_seconds: i64,
    },
    #[error("gateway certificate '{serial}' is not valid now: {reason}")]
    CertificateNotValid { serial: String, reason: String },
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::MissingPrivateKey
            | AuthError::MissingCertificate
            | AuthError::PrivateKeyParse(_)
            | AuthError::CertificateParse(_)
            | AuthError::EmptyCertificateList
            | AuthError::MissingApiV3Key
            | AuthError::Signing(_) => ErrorKind::Configuration,
            AuthError::Decrypt(CryptoError::MissingKey)
            | AuthError::Decrypt(CryptoError::InvalidKeyLength { .. }) => {
                ErrorKind::Configuration
            }
            AuthError::UnknownSerial(_)
            | AuthError::Decrypt(_)
            | AuthError::PublicKeyParse { .. }
            | AuthError::StaleTimestamp { .. }
            | AuthError::CertificateNotValid { .. } => ErrorKind::Trust,
        }
    }

    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }
}
