use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use common_auth::{MerchantIdentity, DEFAULT_USER_AGENT};
use tracing::info;

use crate::client::AuthenticatedClient;
use crate::payments::MerchantMode;
use crate::transport::{ReqwestTransport, DEFAULT_BASE_URL};

#[derive(Clone)]
pub struct ClientConfig {
    pub app_id: String,
    pub merchant_id: String,
    pub private_key_path: PathBuf,
    pub certificate_path: PathBuf,
    pub api_v3_key: Option<String>,
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub mode: MerchantMode,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let app_id = lookup("WECHATPAY_APPID").context("WECHATPAY_APPID must be set")?;
        let merchant_id = lookup("WECHATPAY_MCHID").context("WECHATPAY_MCHID must be set")?;
        let private_key_path = lookup("WECHATPAY_PRIVATE_KEY_PATH")
            .context("WECHATPAY_PRIVATE_KEY_PATH must be set")?;
        let certificate_path = lookup("WECHATPAY_CERTIFICATE_PATH")
            .context("WECHATPAY_CERTIFICATE_PATH must be set")?;
        let api_v3_key = lookup("WECHATPAY_APIV3_KEY").filter(|value| !value.is_empty());
        let base_url = lookup("WECHATPAY_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let user_agent =
            lookup("WECHATPAY_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let timeout_secs = lookup("WECHATPAY_TIMEOUT_SECONDS")
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(30);
        let mode = match lookup("WECHATPAY_MODE") {
            Some(value) => value
                .parse::<MerchantMode>()
                .map_err(|err| anyhow!(err))
                .context("WECHATPAY_MODE is invalid")?,
            None => MerchantMode::Direct,
        };

        Ok(Self {
            app_id,
            merchant_id,
            private_key_path: PathBuf::from(private_key_path),
            certificate_path: PathBuf::from(certificate_path),
            api_v3_key,
            base_url,
            user_agent,
            timeout: Duration::from_secs(timeout_secs.max(1)),
            mode,
        })
    }

    pub fn identity(&self) -> MerchantIdentity {
        MerchantIdentity::new(&self.app_id, &self.merchant_id).with_user_agent(&self.user_agent)
    }

    /// Read both PEM files and build a client over a reqwest transport.
    pub fn build_client(&self) -> Result<AuthenticatedClient> {
        let private_key = std::fs::read(&self.private_key_path).with_context(|| {
            format!("failed to read private key {}", self.private_key_path.display())
        })?;
        let certificate = std::fs::read(&self.certificate_path).with_context(|| {
            format!("failed to read certificate {}", self.certificate_path.display())
        })?;
        let transport = ReqwestTransport::with_timeout(&self.base_url, self.timeout)
            .context("failed to build HTTP transport")?;
        let client =
            AuthenticatedClient::new(self.identity(), &private_key, &certificate, Arc::new(transport))
                .context("failed to load merchant credentials")?;
        info!(
            merchant_id = %self.merchant_id,
            serial = %client.signer().serial_number(),
            mode = %self.mode,
            "merchant credentials loaded"
        );
        Ok(client)
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("app_id", &self.app_id)
            .field("merchant_id", &self.merchant_id)
            .field("private_key_path", &self.private_key_path)
            .field("certificate_path", &self.certificate_path)
            .field("api_v3_key", &self.api_v3_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("user_agent", &self.user_agent)
            .field("timeout", &self.timeout)
            .field("mode", &self.mode)
            .finish()
    }
}
