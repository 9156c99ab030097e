use std::sync::Arc;

use common_auth::{
    AuthResult, GatewayCertificate, MerchantIdentity, RequestSigner, ResponseVerifier,
    VerificationContext, VerifyPolicy,
};
use common_crypto::{ApiV3Key, CryptoError};
use common_observability::ClientMetrics;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};
use crate::notification::{DecryptedNotification, EncryptedResource, Notification, NotificationHeaders};
use crate::transport::{Transport, TransportRequest, TransportResponse};

const JSON: &str = "application/json";

/// A successful (200/204) gateway response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn text(&self) -> ApiResult<&str> {
        std::str::from_utf8(&self.body).map_err(|err| ApiError::Decode(err.to_string()))
    }

    /// Deserialize the body; an empty body reads as JSON `null`.
    pub fn json<T: DeserializeOwned>(&self) -> ApiResult<T> {
        let body: &[u8] = if self.body.iter().all(u8::is_ascii_whitespace) {
            b"null"
        } else {
            &self.body
        };
        serde_json::from_slice(body).map_err(|err| ApiError::Decode(err.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// Signs outbound calls and checks inbound messages for one merchant.
#[derive(Clone)]
pub struct AuthenticatedClient {
    signer: RequestSigner,
    verifier: ResponseVerifier,
    notification_verifier: ResponseVerifier,
    transport: Arc<dyn Transport>,
    metrics: Option<ClientMetrics>,
}

impl AuthenticatedClient {
    /// Fails immediately when either PEM input is missing or unreadable.
    pub fn new(
        identity: MerchantIdentity,
        private_key_pem: &[u8],
        certificate_pem: &[u8],
        transport: Arc<dyn Transport>,
    ) -> AuthResult<Self> {
        let signer = RequestSigner::from_pem(identity, private_key_pem, certificate_pem)?;
        Ok(Self::from_signer(signer, transport))
    }

    pub fn from_signer(signer: RequestSigner, transport: Arc<dyn Transport>) -> Self {
        Self {
            signer,
            verifier: ResponseVerifier::new(),
            notification_verifier: ResponseVerifier::with_policy(VerifyPolicy::strict()),
            transport,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: ClientMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_notification_policy(mut self, policy: VerifyPolicy) -> Self {
        self.notification_verifier = ResponseVerifier::with_policy(policy);
        self
    }

    pub fn identity(&self) -> &MerchantIdentity {
        self.signer.identity()
    }

    pub fn signer(&self) -> &RequestSigner {
        &self.signer
    }

    /// Sign `body` as-is, send it, and hand back the response unchanged.
    ///
    /// 200 and 204 are success; anything else becomes [`ApiError::Status`].
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
        base_url: Option<&str>,
    ) -> ApiResult<ApiResponse> {
        let authorization = self
            .signer
            .authorization_header(method.as_str(), path, body.as_deref())?;
        let headers = self.request_headers(&authorization)?;
        let request = TransportRequest {
            method,
            path: path.to_string(),
            base_url: base_url.map(str::to_string),
            body,
            headers,
        };

        let response = match self.transport.execute(request).await {
            Ok(response) => response,
            Err(err) => {
                self.record_request("transport_error");
                warn!(error = %err, path, "gateway call failed before a response");
                return Err(ApiError::Transport(err));
            }
        };

        if matches!(response.status, StatusCode::OK | StatusCode::NO_CONTENT) {
            self.record_request("success");
            debug!(path, status = response.status.as_u16(), "gateway call succeeded");
            return Ok(ApiResponse {
                status: response.status,
                headers: response.headers,
                body: response.body,
            });
        }

        self.record_request("status_error");
        let failure = status_failure(&response);
        warn!(path, status = response.status.as_u16(), code = failure.code(), "gateway returned failure");
        Err(failure)
    }

    /// Serialize `body` once, sign that exact text and decode the JSON response.
    pub async fn call<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = body
            .map(serde_json::to_string)
            .transpose()
            .map_err(|err| ApiError::InvalidRequest(err.to_string()))?;
        self.execute(method, path, body, None).await?.json()
    }

    /// Check an inbound signature with the source semantics (no freshness checks).
    pub fn verify(
        &self,
        context: &VerificationContext<'_>,
        certificates: &[GatewayCertificate],
    ) -> AuthResult<bool> {
        let outcome = self.verifier.verify(context, certificates);
        self.record_verification(&outcome);
        outcome
    }

    /// Check the signature headers of a response returned by [`execute`](Self::execute).
    pub fn verify_response(
        &self,
        response: &ApiResponse,
        certificates: &[GatewayCertificate],
        api_v3_key: &str,
    ) -> ApiResult<bool> {
        let headers = NotificationHeaders::from_headers(&response.headers)?;
        let body = response.text()?;
        Ok(self.verify(&headers.context(body, api_v3_key), certificates)?)
    }

    /// Open an AEAD-wrapped resource with its own nonce and associated data.
    pub fn decrypt_payload(
        &self,
        resource: &EncryptedResource,
        api_v3_key: &str,
    ) -> Result<Vec<u8>, CryptoError> {
        let outcome = ApiV3Key::new(api_v3_key).and_then(|key| {
            key.decrypt(&resource.ciphertext, &resource.nonce, &resource.associated_data)
        });
        if outcome.is_err() {
            if let Some(metrics) = &self.metrics {
                metrics.record_decrypt_failure();
            }
        }
        outcome
    }

    /// Verify a callback under the notification policy, then decrypt its resource into `T`.
    pub fn handle_notification<T: DeserializeOwned>(
        &self,
        headers: &HeaderMap,
        body: &str,
        certificates: &[GatewayCertificate],
        api_v3_key: &str,
    ) -> ApiResult<DecryptedNotification<T>> {
        let signature_headers = NotificationHeaders::from_headers(headers)?;
        let outcome = self
            .notification_verifier
            .verify(&signature_headers.context(body, api_v3_key), certificates);
        self.record_verification(&outcome);
        if !outcome? {
            warn!(serial = %signature_headers.serial_number, "notification signature mismatch");
            return Err(ApiError::Notification("signature mismatch".to_string()));
        }

        let notification: Notification =
            serde_json::from_str(body).map_err(|err| ApiError::Decode(err.to_string()))?;
        let plaintext = self.decrypt_payload(&notification.resource, api_v3_key)?;
        let resource =
            serde_json::from_slice(&plaintext).map_err(|err| ApiError::Decode(err.to_string()))?;
        debug!(id = %notification.id, event_type = %notification.event_type, "accepted notification");
        Ok(DecryptedNotification {
            id: notification.id,
            create_time: notification.create_time,
            event_type: notification.event_type,
            summary: notification.summary,
            resource,
        })
    }

    fn request_headers(&self, authorization: &str) -> ApiResult<HeaderMap> {
        let invalid = |err: http::header::InvalidHeaderValue| ApiError::InvalidRequest(err.to_string());
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(JSON));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.identity().user_agent).map_err(invalid)?,
        );
        headers.insert(AUTHORIZATION, HeaderValue::from_str(authorization).map_err(invalid)?);
        Ok(headers)
    }

    fn record_request(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_request(outcome);
        }
    }

    fn record_verification(&self, outcome: &AuthResult<bool>) {
        if let Some(metrics) = &self.metrics {
            let label = match outcome {
                Ok(true) => "matched",
                Ok(false) => "mismatched",
                Err(_) => "error",
            };
            metrics.record_verification(label);
        }
    }
}

impl std::fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("signer", &self.signer)
            .field("verifier", &self.verifier)
            .finish_non_exhaustive()
    }
}

fn status_failure(response: &TransportResponse) -> ApiError {
    let parsed: Option<GatewayErrorBody> = serde_json::from_slice(&response.body).ok();
    let (code, message) = match parsed {
        Some(GatewayErrorBody {
            code: Some(code),
            message,
        }) => (code, message.unwrap_or_default()),
        _ => (
            response.status.as_u16().to_string(),
            response
                .status
                .canonical_reason()
                .unwrap_or_default()
                .to_string(),
        ),
    };
    ApiError::Status {
        status: response.status.as_u16(),
        code,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: StatusCode, body: &str) -> TransportResponse {
        TransportResponse {
            status,
            headers: HeaderMap::new(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn gateway_error_body_is_preferred() {
        let err = status_failure(&response(
            StatusCode::BAD_REQUEST,
            r#"{"code":"PARAM_ERROR","message":"mchid mismatch"}"#,
        ));
        match err {
            ApiError::Status { status, code, message } => {
                assert_eq!(status, 400);
                assert_eq!(code, "PARAM_ERROR");
                assert_eq!(message, "mchid mismatch");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn falls_back_to_status_line() {
        let err = status_failure(&response(StatusCode::ACCEPTED, ""));
        assert_eq!(err.code(), "202");
        assert_eq!(err.message(), "Accepted");
    }

    #[test]
    fn empty_body_reads_as_null() {
        let response = ApiResponse {
            status: StatusCode::NO_CONTENT,
            headers: HeaderMap::new(),
            body: Vec::new(),
        };
        response.json::<()>().expect("unit");
        let value: Option<serde_json::Value> = response.json().expect("option");
        assert!(value.is_none());
    }
}
