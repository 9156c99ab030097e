/// User-Agent sent when the caller does not supply one.
pub const DEFAULT_USER_AGENT: &str = concat!("wechatpay-client-rs/", env!("CARGO_PKG_VERSION"));

/// Identity of the calling merchant, fixed for the lifetime of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerchantIdentity {
    /// App id (direct merchant) or service-provider app id (partner).
    pub app_id: String,
    /// Merchant number (`mchid`) or service-provider merchant number (`sp_mchid`).
    pub merchant_id: String,
    pub user_agent: String,
}

impl MerchantIdentity {
    pub fn new(app_id: impl Into<String>, merchant_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            merchant_id: merchant_id.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Freshness checks applied on top of signature verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VerifyPolicy {
    /// Maximum distance in seconds between the message timestamp and now.
    pub max_clock_skew_seconds: Option<i64>,
    /// Reject certificates outside their `effective_time..expire_time` window.
    pub enforce_certificate_window: bool,
}

impl VerifyPolicy {
    /// Five minute skew plus certificate validity checks.
    pub fn strict() -> Self {
        Self {
            max_clock_skew_seconds: Some(300),
            enforce_certificate_window: true,
        }
    }

    /// Adjust the allowed skew.
    pub fn with_max_clock_skew(mut self, seconds: i64) -> Self {
        self.max_clock_skew_seconds = Some(seconds);
        self
    }
}
