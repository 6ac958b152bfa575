//! Inbound webhook payload types.
//!
//! The platform batches callbacks: one POST carries a list of page entries,
//! each with a list of messaging events.
//!
//! ```text
//! {object:"page", entry:[{id, time, messaging:[{sender:{id}, optin:{ref}, ...}]}]}
//! ```

use serde::{Deserialize, Serialize};

/// The only `object` value this service handles.
pub const PAGE_OBJECT: &str = "page";

/// Top-level webhook body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub object: String,
    #[serde(default)]
    pub entry: Vec<PageEntry>,
}

/// One page's batch of events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageEntry {
    /// Page id
    #[serde(default)]
    pub id: Option<String>,
    /// Epoch millis of the batch
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(default)]
    pub messaging: Vec<MessagingEvent>,
}

/// A participant reference (`{"id": "..."}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
}

/// A single messaging event. Only opt-ins are acted upon; other event kinds
/// (messages, deliveries, postbacks) deserialize fine and are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingEvent {
    pub sender: Participant,
    #[serde(default)]
    pub recipient: Option<Participant>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub optin: Option<OptIn>,
}

/// Opt-in callback data from the "Send to Messenger" plugin.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptIn {
    /// The plugin's `data-ref`, used as the product id
    #[serde(default, rename = "ref")]
    pub reference: Option<String>,
}

/// An opt-in event ready for the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptInEvent {
    pub sender_id: String,
    pub reference: String,
    pub timestamp: Option<i64>,
}

impl WebhookPayload {
    pub fn is_page(&self) -> bool {
        self.object == PAGE_OBJECT
    }

    /// Every messaging event across all entries, in delivery order.
    pub fn events(&self) -> impl Iterator<Item = &MessagingEvent> {
        self.entry.iter().flat_map(|entry| entry.messaging.iter())
    }
}

impl MessagingEvent {
    pub fn is_optin(&self) -> bool {
        self.optin.is_some()
    }

    /// Convert into a pipeline event. `None` for non-opt-in events and for
    /// opt-ins without a usable reference.
    pub fn to_optin_event(&self) -> Option<OptInEvent> {
        let reference = self
            .optin
            .as_ref()?
            .reference
            .as_deref()
            .filter(|r| !r.is_empty())?;

        Some(OptInEvent {
            sender_id: self.sender.id.clone(),
            reference: reference.to_string(),
            timestamp: self.timestamp,
        })
    }
}
