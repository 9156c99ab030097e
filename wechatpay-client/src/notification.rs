use common_auth::VerificationContext;
use http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};

pub const HEADER_TIMESTAMP: &str = "wechatpay-timestamp";
pub const HEADER_NONCE: &str = "wechatpay-nonce";
pub const HEADER_SERIAL: &str = "wechatpay-serial";
pub const HEADER_SIGNATURE: &str = "wechatpay-signature";

/// Signature headers attached to gateway responses and callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationHeaders {
    pub timestamp: String,
    pub nonce: String,
    pub serial_number: String,
    pub signature: String,
}

impl NotificationHeaders {
    pub fn from_headers(headers: &HeaderMap) -> ApiResult<Self> {
        Ok(Self {
            timestamp: required(headers, HEADER_TIMESTAMP)?,
            nonce: required(headers, HEADER_NONCE)?,
            serial_number: required(headers, HEADER_SERIAL)?,
            signature: required(headers, HEADER_SIGNATURE)?,
        })
    }

    pub fn context<'a>(&'a self, body: &'a str, api_v3_key: &'a str) -> VerificationContext<'a> {
        VerificationContext {
            timestamp: &self.timestamp,
            nonce: &self.nonce,
            body,
            serial_number: &self.serial_number,
            signature: &self.signature,
            api_v3_key,
        }
    }
}

fn required(headers: &HeaderMap, name: &str) -> ApiResult<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::Notification(format!("missing {name} header")))
}

/// AEAD-wrapped `resource` object of a callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedResource {
    pub algorithm: String,
    pub ciphertext: String,
    #[serde(default)]
    pub associated_data: String,
    #[serde(default)]
    pub original_type: Option<String>,
    pub nonce: String,
}

/// Callback envelope as posted by the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    pub id: String,
    pub create_time: String,
    pub event_type: String,
    pub resource_type: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub resource: EncryptedResource,
}

/// A verified callback with its resource decrypted into `T`.
#[derive(Debug, Clone)]
pub struct DecryptedNotification<T> {
    pub id: String,
    pub create_time: String,
    pub event_type: String,
    pub summary: Option<String>,
    pub resource: T,
}
