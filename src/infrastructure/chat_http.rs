use crate::domain::message::OutboundMessage;
use crate::domain::ports::{ChatTransport, TransportError};
use crate::error::{Result, RxError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const CHANNEL_PREFIX: &str = "whatsapp:";

/// Sends chat messages through a Twilio-style messaging REST API.
pub struct HttpChatTransport {
    http: Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

impl HttpChatTransport {
    pub fn new(base_url: &str, account_sid: &str, auth_token: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RxError::Internal(Box::new(e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            account_sid: account_sid.to_string(),
            auth_token: auth_token.to_string(),
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        )
    }
}

fn channel_address(number: &str) -> String {
    if number.starts_with(CHANNEL_PREFIX) {
        number.to_string()
    } else {
        format!("{CHANNEL_PREFIX}{number}")
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn send(
        &self,
        from: &str,
        message: &OutboundMessage,
    ) -> std::result::Result<String, TransportError> {
        let mut form = vec![
            ("From", channel_address(from)),
            ("To", channel_address(&message.to)),
            ("Body", message.body.clone()),
        ];
        if let Some(media_url) = &message.media_url {
            form.push(("MediaUrl", media_url.clone()));
        }

        let response = self
            .http
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| TransportError(format!("chat send failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ErrorResponse>()
                .await
                .ok()
                .and_then(|e| e.message.map(|m| format!("{m} (code {})", e.code.unwrap_or_default())))
                .unwrap_or_else(|| status.to_string());
            return Err(TransportError(format!("chat provider rejected message: {detail}")));
        }

        response
            .json::<SendResponse>()
            .await
            .map(|r| r.sid)
            .map_err(|e| TransportError(format!("unexpected chat provider response: {e}")))
    }
}
