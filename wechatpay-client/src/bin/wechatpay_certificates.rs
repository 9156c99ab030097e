use anyhow::{bail, Context};
use common_auth::extract_serial_number;
use common_crypto::ApiV3Key;
use common_observability::init_tracing;
use tracing::{info, warn};
use wechatpay_client::ClientConfig;

/// Fetch the platform certificates, decrypt each and check its serial against the listing.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");

    let config = ClientConfig::from_env()?;
    let api_v3_key = config
        .api_v3_key
        .as_deref()
        .context("WECHATPAY_APIV3_KEY must be set to decrypt platform certificates")?;
    let api_v3_key = ApiV3Key::new(api_v3_key).context("WECHATPAY_APIV3_KEY is invalid")?;
    let client = config.build_client()?;

    let certificates = client
        .get_certificates()
        .await
        .context("failed to download platform certificates")?;
    if certificates.is_empty() {
        bail!("gateway returned no platform certificates");
    }

    let mut mismatched = 0usize;
    for certificate in &certificates {
        let pem = certificate
            .decrypt_pem(&api_v3_key)
            .with_context(|| format!("failed to decrypt certificate {}", certificate.serial_no))?;
        let decoded_serial = extract_serial_number(pem.as_bytes())?;
        if decoded_serial != certificate.serial_no {
            mismatched += 1;
            warn!(
                listed = %certificate.serial_no,
                decoded = %decoded_serial,
                "certificate serial does not match listing"
            );
            continue;
        }
        info!(
            serial = %certificate.serial_no,
            effective_time = %certificate.effective_time,
            expire_time = %certificate.expire_time,
            "platform certificate ok"
        );
        println!(
            "{}\t{}\t{}",
            certificate.serial_no, certificate.effective_time, certificate.expire_time
        );
    }

    if mismatched > 0 {
        bail!("{mismatched} platform certificate(s) failed the serial check");
    }
    Ok(())
}
