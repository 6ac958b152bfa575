//! Messenger Graph API client: user profiles and the Send API.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, error, warn};

use super::types::{OutboundMessage, SendResponse, UserInfo};
use super::{endpoint, expect_json, expect_ok, ApiError};
use crate::config::Config;

/// Profile fields requested for each sender.
pub const PROFILE_FIELDS: &str = "first_name,last_name,profile_pic,locale,timezone,gender";

/// Graph API client bound to one page access token.
#[derive(Clone)]
pub struct GraphClient {
    client: Client,
    base_url: String,
    access_token: String,
    timeout: Duration,
}

impl GraphClient {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.graph_api_url.clone(),
            access_token: config.page_access_token.clone(),
            timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }

    /// Fetch the profile of a user who messaged the page.
    pub async fn get_user_profile(&self, user_id: &str) -> Result<UserInfo, ApiError> {
        let url = endpoint(&self.base_url, &[user_id])
            .inspect_err(|e| warn!(user_id = user_id, error = %e, "graph_profile_url_invalid"))?;

        let response = self
            .client
            .get(url)
            .query(&[
                ("access_token", self.access_token.as_str()),
                ("fields", PROFILE_FIELDS),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .inspect_err(|e| warn!(user_id = user_id, error = %e, "graph_profile_request_error"))?;

        expect_json(response)
            .await
            .inspect_err(|e| warn!(user_id = user_id, error = %e, "graph_profile_fetch_failed"))
    }

    /// Send an image attachment.
    pub async fn send_image(
        &self,
        recipient_id: &str,
        image_url: &str,
    ) -> Result<SendResponse, ApiError> {
        self.call_send_api(&OutboundMessage::image(recipient_id, image_url))
            .await
    }

    /// Send a tagged text message.
    pub async fn send_text(&self, recipient_id: &str, text: &str) -> Result<SendResponse, ApiError> {
        self.call_send_api(&OutboundMessage::text(recipient_id, text))
            .await
    }

    /// POST a message to the Send API. Only 200 OK counts as delivered.
    pub async fn call_send_api(&self, message: &OutboundMessage) -> Result<SendResponse, ApiError> {
        let recipient_id = message.recipient.id.as_str();
        let url = endpoint(&self.base_url, &["me", "messages"])?;

        let response = match self
            .client
            .post(url)
            .query(&[("access_token", self.access_token.as_str())])
            .json(message)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                if e.is_timeout() {
                    error!(
                        recipient_id = recipient_id,
                        timeout_ms = self.timeout.as_millis() as u64,
                        error = %e,
                        "send_api_timeout"
                    );
                } else {
                    error!(recipient_id = recipient_id, error = %e, "send_api_request_error");
                }
                return Err(e.into());
            }
        };

        let body = expect_ok(response)
            .await
            .inspect_err(|e| error!(recipient_id = recipient_id, error = %e, "send_api_failed"))?;

        // A 200 with an odd body still means the message went out.
        let reply: SendResponse = serde_json::from_str(&body).unwrap_or_default();

        debug!(
            recipient_id = ?reply.recipient_id,
            message_id = ?reply.message_id,
            "send_api_delivered"
        );

        Ok(reply)
    }
}
