//! Request and response bodies exchanged with the Graph API and the catalog.

use serde::{Deserialize, Deserializer, Serialize};

/// Metadata tag attached to every text message we send.
pub const TEXT_METADATA: &str = "TROVAMODA";

// =============================================================================
// Graph API
// =============================================================================

/// Sender profile. Only the names matter; the rest is kept for logging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

impl UserInfo {
    /// Stand-in used when the profile cannot be fetched.
    pub fn placeholder() -> Self {
        Self::default()
    }
}

/// Send API request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    pub recipient: Recipient,
    pub message: MessageBody,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recipient {
    pub id: String,
}

/// Either an attachment or a tagged text message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageBody {
    Attachment { attachment: Attachment },
    Text { text: String, metadata: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: AttachmentPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttachmentPayload {
    pub url: String,
}

impl OutboundMessage {
    pub fn image(recipient_id: &str, url: &str) -> Self {
        Self {
            recipient: Recipient {
                id: recipient_id.to_string(),
            },
            message: MessageBody::Attachment {
                attachment: Attachment {
                    kind: "image".to_string(),
                    payload: AttachmentPayload {
                        url: url.to_string(),
                    },
                },
            },
        }
    }

    pub fn text(recipient_id: &str, text: impl Into<String>) -> Self {
        Self {
            recipient: Recipient {
                id: recipient_id.to_string(),
            },
            message: MessageBody::Text {
                text: text.into(),
                metadata: TEXT_METADATA.to_string(),
            },
        }
    }
}

/// Send API reply. Both fields are optional in practice.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendResponse {
    #[serde(default)]
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
}

// =============================================================================
// Catalog
// =============================================================================

/// Catalog product.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Product {
    #[serde(rename = "_id", deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
}

/// The catalog has served ids both as strings and as numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}
