use std::fmt;
use std::str::FromStr;

use common_auth::{current_timestamp, generate_nonce};
use http::Method;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::client::{ApiResponse, AuthenticatedClient};
use crate::error::{ApiError, ApiResult};

pub const JSAPI_SIGN_TYPE: &str = "RSA";
pub const APP_PACKAGE: &str = "Sign=WXPay";

/// Whether the configured merchant places orders for itself or for sub-merchants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MerchantMode {
    #[default]
    Direct,
    Partner,
}

impl MerchantMode {
    fn app_id_field(self) -> &'static str {
        match self {
            MerchantMode::Direct => "appid",
            MerchantMode::Partner => "sp_appid",
        }
    }

    fn merchant_id_field(self) -> &'static str {
        match self {
            MerchantMode::Direct => "mchid",
            MerchantMode::Partner => "sp_mchid",
        }
    }

    fn transactions_path(self) -> &'static str {
        match self {
            MerchantMode::Direct => "/v3/pay/transactions",
            MerchantMode::Partner => "/v3/pay/partner/transactions",
        }
    }
}

impl FromStr for MerchantMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(MerchantMode::Direct),
            "partner" => Ok(MerchantMode::Partner),
            other => Err(format!("unknown merchant mode '{other}', expected direct or partner")),
        }
    }
}

impl fmt::Display for MerchantMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MerchantMode::Direct => f.write_str("direct"),
            MerchantMode::Partner => f.write_str("partner"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PrepayResponse {
    prepay_id: Option<String>,
}

/// Parameters a mini program or official account page passes to `requestPayment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsapiPayParams {
    pub app_id: String,
    pub time_stamp: String,
    pub nonce_str: String,
    pub package: String,
    pub sign_type: String,
    pub pay_sign: String,
}

/// Parameters a mobile app passes to the WeChat SDK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppPayParams {
    pub appid: String,
    pub partnerid: String,
    pub prepayid: String,
    pub package: String,
    pub noncestr: String,
    pub timestamp: String,
    pub sign: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct H5Prepay {
    pub h5_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativePrepay {
    pub code_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillResponse {
    pub hash_type: String,
    pub hash_value: String,
    pub download_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubMerchantBill {
    pub download_url: String,
    pub encrypt_key: String,
    pub hash_type: String,
    pub hash_value: String,
    pub nonce: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubMerchantBillList {
    pub download_bill_count: u32,
    #[serde(default)]
    pub download_bill_list: Vec<SubMerchantBill>,
}

/// Build `?k=v&...` with keys sorted and both sides percent-encoded; empty input gives "".
pub fn query_string(pairs: &[(&str, &str)]) -> String {
    let mut pairs = pairs.to_vec();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    let joined = pairs
        .iter()
        .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    if joined.is_empty() {
        joined
    } else {
        format!("?{joined}")
    }
}

impl AuthenticatedClient {
    pub fn payments(&self, mode: MerchantMode) -> Payments<'_> {
        Payments { client: self, mode }
    }
}

/// Order, refund and bill endpoints for one merchant mode.
///
/// In partner mode `sub_mchid` arguments are required; direct mode ignores them.
#[derive(Debug, Clone, Copy)]
pub struct Payments<'a> {
    client: &'a AuthenticatedClient,
    mode: MerchantMode,
}

impl<'a> Payments<'a> {
    pub fn mode(&self) -> MerchantMode {
        self.mode
    }

    pub async fn prepay_jsapi(&self, order: Map<String, Value>) -> ApiResult<JsapiPayParams> {
        if self.mode == MerchantMode::Partner && !has_partner_payer(&order) {
            return Err(ApiError::InvalidRequest(
                "payer.sp_openid or payer.sub_openid is required".to_string(),
            ));
        }
        let app_id = match (self.mode, order.get("sub_appid").and_then(Value::as_str)) {
            (MerchantMode::Partner, Some(sub_appid)) => sub_appid.to_string(),
            _ => self.client.identity().app_id.clone(),
        };
        let prepay_id = self.prepay("jsapi", order).await?;
        self.jsapi_params(app_id, &prepay_id, current_timestamp(), generate_nonce())
    }

    pub async fn prepay_app(&self, order: Map<String, Value>) -> ApiResult<AppPayParams> {
        let prepay_id = self.prepay("app", order).await?;
        self.app_params(prepay_id, current_timestamp(), generate_nonce())
    }

    pub async fn prepay_h5(&self, order: Map<String, Value>) -> ApiResult<H5Prepay> {
        let path = format!("{}/h5", self.mode.transactions_path());
        self.client
            .call(Method::POST, &path, Some(&self.with_identity(order)))
            .await
    }

    pub async fn prepay_native(&self, order: Map<String, Value>) -> ApiResult<NativePrepay> {
        let path = format!("{}/native", self.mode.transactions_path());
        self.client
            .call(Method::POST, &path, Some(&self.with_identity(order)))
            .await
    }

    pub async fn query_order_by_id(
        &self,
        transaction_id: &str,
        sub_mchid: Option<&str>,
    ) -> ApiResult<Value> {
        let path = format!(
            "{}/id/{}{}",
            self.mode.transactions_path(),
            urlencoding::encode(transaction_id),
            self.merchant_query(sub_mchid)?
        );
        self.client.call::<(), _>(Method::GET, &path, None).await
    }

    pub async fn query_order_by_out_trade_no(
        &self,
        out_trade_no: &str,
        sub_mchid: Option<&str>,
    ) -> ApiResult<Value> {
        let path = format!(
            "{}/out-trade-no/{}{}",
            self.mode.transactions_path(),
            urlencoding::encode(out_trade_no),
            self.merchant_query(sub_mchid)?
        );
        self.client.call::<(), _>(Method::GET, &path, None).await
    }

    /// Close an unpaid order. The gateway answers 204 with no body.
    pub async fn close_order(&self, out_trade_no: &str, sub_mchid: Option<&str>) -> ApiResult<()> {
        let path = format!(
            "{}/out-trade-no/{}/close",
            self.mode.transactions_path(),
            urlencoding::encode(out_trade_no)
        );
        let mut body = Map::new();
        body.insert(
            self.mode.merchant_id_field().to_string(),
            Value::String(self.client.identity().merchant_id.clone()),
        );
        if self.mode == MerchantMode::Partner {
            body.insert("sub_mchid".to_string(), Value::String(required_sub_mchid(sub_mchid)?.to_string()));
        }
        let body = serde_json::to_string(&body).map_err(|err| ApiError::InvalidRequest(err.to_string()))?;
        self.client.execute(Method::POST, &path, Some(body), None).await?;
        Ok(())
    }

    /// Needs `transaction_id` or `out_trade_no` in `refund`.
    pub async fn create_refund(&self, refund: Map<String, Value>) -> ApiResult<Value> {
        let identifies_order = ["transaction_id", "out_trade_no"]
            .iter()
            .any(|field| refund.get(*field).and_then(Value::as_str).is_some_and(|v| !v.is_empty()));
        if !identifies_order {
            return Err(ApiError::InvalidRequest(
                "transaction_id or out_trade_no is required".to_string(),
            ));
        }
        if self.mode == MerchantMode::Partner && !refund.contains_key("sub_mchid") {
            return Err(ApiError::InvalidRequest("sub_mchid is required".to_string()));
        }
        self.client
            .call(Method::POST, "/v3/refund/domestic/refunds", Some(&refund))
            .await
    }

    pub async fn query_refund(&self, out_refund_no: &str, sub_mchid: Option<&str>) -> ApiResult<Value> {
        let query = match self.mode {
            MerchantMode::Direct => String::new(),
            MerchantMode::Partner => query_string(&[("sub_mchid", required_sub_mchid(sub_mchid)?)]),
        };
        let path = format!(
            "/v3/refund/domestic/refunds/{}{query}",
            urlencoding::encode(out_refund_no)
        );
        self.client.call::<(), _>(Method::GET, &path, None).await
    }

    /// Request a trade bill, e.g. `[("bill_date", "2024-05-01"), ("bill_type", "ALL")]`.
    pub async fn trade_bill(&self, params: &[(&str, &str)]) -> ApiResult<BillResponse> {
        let path = format!("/v3/bill/tradebill{}", query_string(params));
        self.client.call::<(), _>(Method::GET, &path, None).await
    }

    pub async fn fund_flow_bill(&self, params: &[(&str, &str)]) -> ApiResult<BillResponse> {
        let path = format!("/v3/bill/fundflowbill{}", query_string(params));
        self.client.call::<(), _>(Method::GET, &path, None).await
    }

    /// Partner only.
    pub async fn sub_merchant_fund_flow_bill(
        &self,
        params: &[(&str, &str)],
    ) -> ApiResult<SubMerchantBillList> {
        if self.mode != MerchantMode::Partner {
            return Err(ApiError::InvalidRequest(
                "sub-merchant fund flow bills are only available in partner mode".to_string(),
            ));
        }
        let path = format!("/v3/bill/sub-merchant-fundflowbill{}", query_string(params));
        self.client.call::<(), _>(Method::GET, &path, None).await
    }

    /// Fetch a bill from the `download_url` of a bill response. The URL is valid for 30s.
    pub async fn download_bill(&self, download_url: &str) -> ApiResult<ApiResponse> {
        let (base_url, path) = split_download_url(download_url)?;
        debug!(%base_url, "downloading bill");
        self.client
            .execute(Method::GET, &path, None, Some(&base_url))
            .await
    }

    async fn prepay(&self, kind: &str, order: Map<String, Value>) -> ApiResult<String> {
        let path = format!("{}/{kind}", self.mode.transactions_path());
        let response: PrepayResponse = self
            .client
            .call(Method::POST, &path, Some(&self.with_identity(order)))
            .await?;
        response
            .prepay_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::Decode("gateway response has no prepay_id".to_string()))
    }

    /// Caller-supplied fields win over the configured identity.
    fn with_identity(&self, mut order: Map<String, Value>) -> Map<String, Value> {
        let identity = self.client.identity();
        order
            .entry(self.mode.app_id_field())
            .or_insert_with(|| Value::String(identity.app_id.clone()));
        order
            .entry(self.mode.merchant_id_field())
            .or_insert_with(|| Value::String(identity.merchant_id.clone()));
        order
    }

    fn merchant_query(&self, sub_mchid: Option<&str>) -> ApiResult<String> {
        let merchant_id = self.client.identity().merchant_id.as_str();
        Ok(match self.mode {
            MerchantMode::Direct => query_string(&[("mchid", merchant_id)]),
            MerchantMode::Partner => query_string(&[
                ("sp_mchid", merchant_id),
                ("sub_mchid", required_sub_mchid(sub_mchid)?),
            ]),
        })
    }

    fn jsapi_params(
        &self,
        app_id: String,
        prepay_id: &str,
        time_stamp: String,
        nonce_str: String,
    ) -> ApiResult<JsapiPayParams> {
        let package = format!("prepay_id={prepay_id}");
        let message = format!("{app_id}\n{time_stamp}\n{nonce_str}\n{package}\n");
        let pay_sign = self.client.signer().sign_message(&message)?;
        Ok(JsapiPayParams {
            app_id,
            time_stamp,
            nonce_str,
            package,
            sign_type: JSAPI_SIGN_TYPE.to_string(),
            pay_sign,
        })
    }

    fn app_params(&self, prepayid: String, timestamp: String, noncestr: String) -> ApiResult<AppPayParams> {
        let identity = self.client.identity();
        let message = format!("{}\n{timestamp}\n{noncestr}\n{prepayid}\n", identity.app_id);
        let sign = self.client.signer().sign_message(&message)?;
        Ok(AppPayParams {
            appid: identity.app_id.clone(),
            partnerid: identity.merchant_id.clone(),
            prepayid,
            package: APP_PACKAGE.to_string(),
            noncestr,
            timestamp,
            sign,
        })
    }
}

fn has_partner_payer(order: &Map<String, Value>) -> bool {
    let Some(payer) = order.get("payer").and_then(Value::as_object) else {
        return false;
    };
    ["sp_openid", "sub_openid"]
        .iter()
        .any(|field| payer.get(*field).and_then(Value::as_str).is_some_and(|v| !v.is_empty()))
}

fn required_sub_mchid(sub_mchid: Option<&str>) -> ApiResult<&str> {
    sub_mchid
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::InvalidRequest("sub_mchid is required in partner mode".to_string()))
}

/// Split an absolute URL into `scheme://host[:port]` and `path?query`.
fn split_download_url(download_url: &str) -> ApiResult<(String, String)> {
    let url = Url::parse(download_url)
        .map_err(|err| ApiError::InvalidRequest(format!("invalid download_url: {err}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| ApiError::InvalidRequest("download_url has no host".to_string()))?;
    let base_url = match url.port() {
        Some(port) => format!("{}://{host}:{port}", url.scheme()),
        None => format!("{}://{host}", url.scheme()),
    };
    let path = match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    };
    Ok((base_url, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_string_sorts_and_encodes() {
        assert_eq!(
            query_string(&[("sub_mchid", "1900000109"), ("sp_mchid", "1230000109")]),
            "?sp_mchid=1230000109&sub_mchid=1900000109"
        );
        assert_eq!(
            query_string(&[("bill_date", "2024-05-01"), ("tar_type", "GZIP"), ("a b", "c&d")]),
            "?a%20b=c%26d&bill_date=2024-05-01&tar_type=GZIP"
        );
        assert_eq!(query_string(&[]), "");
    }

    #[test]
    fn merchant_mode_parses_case_insensitively() {
        assert_eq!("Partner".parse::<MerchantMode>(), Ok(MerchantMode::Partner));
        assert_eq!(" direct ".parse::<MerchantMode>(), Ok(MerchantMode::Direct));
        assert!("service".parse::<MerchantMode>().is_err());
        assert_eq!(MerchantMode::default().to_string(), "direct");
    }

    #[test]
    fn download_url_keeps_host_port_and_query() {
        let (base, path) =
            split_download_url("https://api.mch.weixin.qq.com/v3/billdownload/file?token=6XIv5TUP")
                .expect("split");
        assert_eq!(base, "https://api.mch.weixin.qq.com");
        assert_eq!(path, "/v3/billdownload/file?token=6XIv5TUP");

        let (base, path) = split_download_url("http://127.0.0.1:8080/bill").expect("split");
        assert_eq!(base, "http://127.0.0.1:8080");
        assert_eq!(path, "/bill");

        assert!(split_download_url("not a url").is_err());
    }

    #[test]
    fn partner_payer_needs_an_openid() {
        let order: Map<String, Value> =
            serde_json::from_str(r#"{"payer":{"sub_openid":"oUpF8uMuAJO_M2pxb1Q9zNjWeS6o"}}"#)
                .expect("order");
        assert!(has_partner_payer(&order));
        let order: Map<String, Value> = serde_json::from_str(r#"{"payer":{}}"#).expect("order");
        assert!(!has_partner_payer(&order));
        assert!(!has_partner_payer(&Map::new()));
    }

    #[test]
    fn blank_sub_mchid_is_rejected() {
        assert!(required_sub_mchid(None).is_err());
        assert!(required_sub_mchid(Some("  ")).is_err());
        assert_eq!(required_sub_mchid(Some("1900000109")).expect("id"), "1900000109");
    }
}
