use anyhow::Context;
use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use super::Notifier;
use crate::models::BookingEvent;

pub const SIGNATURE_HEADER: &str = "x-pitchbook-signature";

/// Posts each event as JSON to an external URL, signed with HMAC-SHA1 over the raw body.
pub struct WebhookNotifier {
    url: String,
    secret: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String, secret: String) -> Self {
        Self {
            url,
            secret,
            client: reqwest::Client::new(),
        }
    }
}

pub fn sign_payload(secret: &str, body: &[u8]) -> anyhow::Result<String> {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid webhook secret: {e}"))?;
    mac.update(body);
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &BookingEvent) -> anyhow::Result<()> {
        let body = serde_json::to_vec(event)?;
        let signature = sign_payload(&self.secret, &body)?;

        self.client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await
            .context("failed to deliver booking webhook")?
            .error_for_status()
            .context("booking webhook returned error")?;

        Ok(())
    }
}
