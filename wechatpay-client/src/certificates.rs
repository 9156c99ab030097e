use std::sync::Arc;
use std::time::{Duration, Instant};

use common_auth::GatewayCertificate;
use http::Method;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::info;

use crate::client::AuthenticatedClient;
use crate::error::ApiResult;

pub const CERTIFICATES_PATH: &str = "/v3/certificates";
pub const DEFAULT_CERTIFICATE_TTL: Duration = Duration::from_secs(10 * 60 * 60);

#[derive(Debug, Deserialize)]
struct CertificateList {
    #[serde(default)]
    data: Vec<GatewayCertificate>,
}

impl AuthenticatedClient {
    /// Download the platform certificate list, still encrypted under the APIv3 key.
    pub async fn get_certificates(&self) -> ApiResult<Vec<GatewayCertificate>> {
        let list: CertificateList = self.call::<(), _>(Method::GET, CERTIFICATES_PATH, None).await?;
        Ok(list.data)
    }
}

#[derive(Debug)]
struct CachedCertificates {
    certificates: Arc<Vec<GatewayCertificate>>,
    fetched_at: Option<Instant>,
}

/// Keeps the platform certificate list and refetches it once it is older than the TTL.
#[derive(Debug, Clone)]
pub struct CertificateCache {
    ttl: Duration,
    inner: Arc<RwLock<CachedCertificates>>,
}

impl Default for CertificateCache {
    fn default() -> Self {
        Self::new(DEFAULT_CERTIFICATE_TTL)
    }
}

impl CertificateCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Arc::new(RwLock::new(CachedCertificates {
                certificates: Arc::new(Vec::new()),
                fetched_at: None,
            })),
        }
    }

    pub async fn is_stale(&self) -> bool {
        let guard = self.inner.read().await;
        guard
            .fetched_at
            .map_or(true, |fetched_at| fetched_at.elapsed() >= self.ttl)
    }

    /// Cached list, refreshed through `client` first when stale.
    pub async fn get(&self, client: &AuthenticatedClient) -> ApiResult<Arc<Vec<GatewayCertificate>>> {
        if !self.is_stale().await {
            return Ok(self.inner.read().await.certificates.clone());
        }
        self.refresh(client).await
    }

    pub async fn refresh(&self, client: &AuthenticatedClient) -> ApiResult<Arc<Vec<GatewayCertificate>>> {
        let certificates = client.get_certificates().await?;
        Ok(self.replace(certificates).await)
    }

    pub async fn replace(&self, certificates: Vec<GatewayCertificate>) -> Arc<Vec<GatewayCertificate>> {
        let certificates = Arc::new(certificates);
        let mut guard = self.inner.write().await;
        guard.certificates = certificates.clone();
        guard.fetched_at = Some(Instant::now());
        info!(count = certificates.len(), "platform certificates refreshed");
        certificates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_auth::EncryptedCertificate;

    fn certificate(serial: &str) -> GatewayCertificate {
        GatewayCertificate {
            serial_no: serial.to_string(),
            effective_time: "2024-01-01T00:00:00+08:00".to_string(),
            expire_time: "2029-01-01T00:00:00+08:00".to_string(),
            encrypt_certificate: EncryptedCertificate {
                algorithm: "AEAD_AES_256_GCM".to_string(),
                nonce: "61f9c719728a".to_string(),
                associated_data: "certificate".to_string(),
                ciphertext: "AAAA".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn new_cache_starts_stale() {
        let cache = CertificateCache::default();
        assert!(cache.is_stale().await);
    }

    #[tokio::test]
    async fn replace_marks_fresh_until_ttl() {
        let cache = CertificateCache::new(Duration::from_secs(60));
        let stored = cache.replace(vec![certificate("AB12")]).await;
        assert_eq!(stored.len(), 1);
        assert!(!cache.is_stale().await);

        let expired = CertificateCache::new(Duration::ZERO);
        expired.replace(vec![certificate("AB12")]).await;
        assert!(expired.is_stale().await);
    }
}
