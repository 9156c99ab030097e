pub mod certificates;
pub mod client;
pub mod config;
pub mod error;
pub mod notification;
pub mod payments;
pub mod transport;

pub use certificates::{CertificateCache, CERTIFICATES_PATH, DEFAULT_CERTIFICATE_TTL};
pub use client::{ApiResponse, AuthenticatedClient};
pub use config::ClientConfig;
pub use error::{ApiError, ApiResult, TRANSPORT_ERROR_CODE};
pub use notification::{
    DecryptedNotification, EncryptedResource, Notification, NotificationHeaders, HEADER_NONCE,
    HEADER_SERIAL, HEADER_SIGNATURE, HEADER_TIMESTAMP,
};
pub use payments::{
    query_string, AppPayParams, BillResponse, H5Prepay, JsapiPayParams, MerchantMode,
    NativePrepay, Payments, SubMerchantBill, SubMerchantBillList,
};
pub use transport::{
    ReqwestTransport, Transport, TransportError, TransportRequest, TransportResponse,
    DEFAULT_BASE_URL, DEFAULT_TIMEOUT,
};

pub use common_auth::{
    AuthError, GatewayCertificate, MerchantIdentity, RequestSigner, ResponseVerifier,
    VerificationContext, VerifyPolicy,
};
pub use common_crypto::{ApiV3Key, CryptoError};
