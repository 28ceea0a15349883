//! Outbound notification delivery.
//!
//! Reset codes are sent as a WhatsApp template message through the
//! notification service. A failed send is surfaced to the caller: the flow's
//! purpose is delivering the code, so it cannot be swallowed.

use reqwest::Client;
use serde_json::json;
use tracing::error;
use url::Url;

use crate::auth::error::AuthError;

const RESET_TEMPLATE: &str = "reset_password_code";

#[derive(Clone)]
pub struct Notifier {
    base_url: String,
    client: Client,
}

impl Notifier {
    pub fn new(base_url: String, user_agent: &str) -> Result<Self, AuthError> {
        Url::parse(&base_url)
            .map_err(|err| AuthError::Internal(anyhow::anyhow!("invalid notification URL: {err}")))?;
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|err| AuthError::Internal(anyhow::anyhow!("reqwest client: {err}")))?;
        Ok(Self { base_url, client })
    }

    /// Deliver a reset code to a phone number via the template endpoint.
    pub async fn send_reset_code(&self, phone: &str, code: &str) -> Result<(), AuthError> {
        let url = format!(
            "{}/api/v1/notify/whatsapp/template_message/",
            self.base_url.trim_end_matches('/')
        );
        let body = json!({
            "template_name": RESET_TEMPLATE,
            "phone": phone,
            "params": { "code": code },
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                error!("Notification request failed: {err}");
                AuthError::DeliveryFailed("notification service unreachable".to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            error!("Notification rejected with status {status}");
            return Err(AuthError::DeliveryFailed(format!(
                "notification service returned {status}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Notifier;

    #[test]
    fn notifier_builds_with_user_agent() {
        let notifier = Notifier::new("http://localhost".to_string(), "custodia/0.1.0");
        assert!(notifier.is_ok());
    }

    #[test]
    fn notifier_rejects_invalid_base_url() {
        let notifier = Notifier::new("not a url".to_string(), "custodia/0.1.0");
        assert!(notifier.is_err());
    }
}
