use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use super::MessagingProvider;
use crate::models::WhatsappSettings;

/// Client for an Evolution-style WhatsApp gateway. Gateway location and
/// credentials come from the stored settings on every call.
pub struct EvolutionGateway {
    client: reqwest::Client,
}

impl EvolutionGateway {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build messaging HTTP client")?;
        Ok(Self { client })
    }
}

/// Turns a gateway error status into a message an operator can act on.
pub fn describe_gateway_error(status: u16, body: &str) -> String {
    match status {
        401 => "invalid gateway API key".to_string(),
        404 => "gateway instance not found, check the instance name".to_string(),
        s if s >= 500 => "messaging gateway unavailable, check that it is online".to_string(),
        _ => format!("messaging gateway error ({status}): {body}"),
    }
}

#[async_trait]
impl MessagingProvider for EvolutionGateway {
    async fn send_text(
        &self,
        gateway: &WhatsappSettings,
        number: &str,
        text: &str,
    ) -> anyhow::Result<serde_json::Value> {
        let url = format!(
            "{}/message/sendText/{}",
            gateway.base_url.trim_end_matches('/'),
            gateway.instance
        );

        let resp = self
            .client
            .post(&url)
            .header("apikey", &gateway.api_key)
            .json(&json!({ "number": number, "text": text }))
            .send()
            .await
            .context("failed to call messaging gateway")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("messaging gateway error ({}): {}", status, body);
        }

        resp.json()
            .await
            .context("failed to parse messaging gateway response")
    }

    async fn connection_state(
        &self,
        gateway: &WhatsappSettings,
    ) -> anyhow::Result<serde_json::Value> {
        let url = format!(
            "{}/instance/connectionState/{}",
            gateway.base_url.trim_end_matches('/'),
            gateway.instance
        );

        let resp = self
            .client
            .get(&url)
            .header("apikey", &gateway.api_key)
            .send()
            .await
            .context("failed to call messaging gateway")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!(describe_gateway_error(status.as_u16(), &body));
        }

        resp.json()
            .await
            .context("failed to parse messaging gateway response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(server: &MockServer) -> WhatsappSettings {
        WhatsappSettings {
            enabled: true,
            base_url: format!("{}/", server.uri()),
            instance: "clinic".to_string(),
            api_key: "secret".to_string(),
        }
    }

    fn gateway() -> EvolutionGateway {
        EvolutionGateway::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_send_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/message/sendText/clinic"))
            .and(header("apikey", "secret"))
            .and(body_json(json!({"number": "5511999998888", "text": "oi"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"key": {"id": "m1"}})))
            .expect(1)
            .mount(&server)
            .await;

        let ack = gateway()
            .send_text(&settings(&server), "5511999998888", "oi")
            .await
            .unwrap();
        assert_eq!(ack["key"]["id"], "m1");
    }

    #[tokio::test]
    async fn test_send_text_failure_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/message/sendText/clinic"))
            .respond_with(ResponseTemplate::new(400).set_body_string("number not on whatsapp"))
            .mount(&server)
            .await;

        let err = gateway()
            .send_text(&settings(&server), "5500", "oi")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("number not on whatsapp"));
    }

    #[tokio::test]
    async fn test_connection_state_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/instance/connectionState/clinic"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = gateway()
            .connection_state(&settings(&server))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid gateway API key");
    }
}
