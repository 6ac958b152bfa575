//! Per-event pipeline - the welcome sequence sent after an opt-in.
//!
//! Each opt-in event walks a fixed linear sequence of outbound calls:
//!
//! ```text
//! FetchUser → FetchProduct → SendImage → SendGreeting → SendLink → Done
//! ```
//!
//! The profile is best effort: if it cannot be fetched the pipeline carries
//! on with an empty-name placeholder, since nothing customer-visible depends
//! on it. Any failure from `FetchProduct` onwards abandons the event and no
//! later call is made. There are no retries.

use std::fmt;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiError, CatalogClient, GraphClient, Product, UserInfo};
use crate::config::Config;
use crate::events::{OptInEvent, WebhookPayload};

/// Steps of the welcome sequence, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FetchUser,
    FetchProduct,
    SendImage,
    SendGreeting,
    SendLink,
    Done,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::FetchUser => "fetch_user",
            Stage::FetchProduct => "fetch_product",
            Stage::SendImage => "send_image",
            Stage::SendGreeting => "send_greeting",
            Stage::SendLink => "send_link",
            Stage::Done => "done",
        }
    }

    fn fail(self) -> impl FnOnce(ApiError) -> PipelineError {
        move |source| PipelineError {
            stage: self,
            source,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The step that abandoned the pipeline and why.
#[derive(Debug, Error)]
#[error("pipeline abandoned at {stage}: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: ApiError,
}

/// What happened to one event.
#[derive(Debug)]
pub struct PipelineReport {
    pub sender_id: String,
    pub reference: String,
    /// Last stage entered; `Done` when every step succeeded
    pub stage: Stage,
    /// Fetched profile, or the placeholder
    pub user: UserInfo,
    pub profile_fetched: bool,
    pub product_id: Option<String>,
    pub result: Result<(), PipelineError>,
}

impl PipelineReport {
    fn new(event: &OptInEvent) -> Self {
        Self {
            sender_id: event.sender_id.clone(),
            reference: event.reference.clone(),
            stage: Stage::FetchUser,
            user: UserInfo::placeholder(),
            profile_fetched: false,
            product_id: None,
            result: Ok(()),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.stage == Stage::Done && self.result.is_ok()
    }
}

/// Greeting sent after the product image.
pub fn greeting_text(product_title: &str) -> String {
    format!(
        "TrovaModa ti dà il benvenuto! Sono la tua personal shopper, vuoi consigli sul prodotto {}?",
        product_title.to_lowercase()
    )
}

/// Link to the product's page on the shop.
pub fn product_link(link_base: &str, product_id: &str) -> String {
    format!("{}{}", link_base, product_id)
}

/// Runs the welcome sequence for opt-in events.
#[derive(Clone)]
pub struct Pipeline {
    graph: GraphClient,
    catalog: CatalogClient,
    link_base: String,
}

impl Pipeline {
    pub fn new(graph: GraphClient, catalog: CatalogClient, config: &Config) -> Self {
        Self {
            graph,
            catalog,
            link_base: config.outbound_link_base.clone(),
        }
    }

    /// Spawn a detached pipeline for every opt-in event in the payload.
    ///
    /// Returns immediately; callers may drop the handles.
    pub fn dispatch(&self, payload: &WebhookPayload) -> Vec<JoinHandle<PipelineReport>> {
        let mut handles = Vec::new();

        for event in payload.events() {
            match event.to_optin_event() {
                Some(optin) => {
                    let pipeline = self.clone();
                    handles.push(tokio::spawn(async move { pipeline.run(&optin).await }));
                }
                None if event.is_optin() => {
                    warn!(sender_id = %event.sender.id, "webhook_optin_without_ref");
                }
                None => {
                    debug!(sender_id = %event.sender.id, "webhook_event_ignored");
                }
            }
        }

        handles
    }

    /// Run every stage for one event. Never fails; the outcome is in the
    /// returned report.
    pub async fn run(&self, event: &OptInEvent) -> PipelineReport {
        info!(
            sender_id = %event.sender_id,
            reference = %event.reference,
            timestamp = ?event.timestamp,
            "pipeline_started"
        );

        let mut report = PipelineReport::new(event);
        let result = self.drive(event, &mut report).await;
        report.result = result;

        let user = serde_json::to_string(&report.user).unwrap_or_default();
        match &report.result {
            Ok(()) => info!(
                sender_id = %report.sender_id,
                product_id = ?report.product_id,
                user = %user,
                profile_fetched = report.profile_fetched,
                "pipeline_finished"
            ),
            Err(e) => warn!(
                sender_id = %report.sender_id,
                product_id = ?report.product_id,
                user = %user,
                profile_fetched = report.profile_fetched,
                stage = %e.stage,
                status = ?e.source.status(),
                error = %e.source,
                "pipeline_abandoned"
            ),
        }

        report
    }

    async fn drive(
        &self,
        event: &OptInEvent,
        report: &mut PipelineReport,
    ) -> Result<(), PipelineError> {
        let recipient = event.sender_id.as_str();

        report.stage = Stage::FetchUser;
        match self.graph.get_user_profile(recipient).await {
            Ok(user) => {
                report.user = user;
                report.profile_fetched = true;
            }
            Err(e) => {
                warn!(sender_id = %recipient, error = %e, "pipeline_profile_placeholder");
            }
        }

        report.stage = Stage::FetchProduct;
        let product: Product = self
            .catalog
            .get_product(&event.reference)
            .await
            .map_err(Stage::FetchProduct.fail())?;
        report.product_id = Some(product.id.clone());

        report.stage = Stage::SendImage;
        self.graph
            .send_image(recipient, &product.image_url)
            .await
            .map_err(Stage::SendImage.fail())?;

        report.stage = Stage::SendGreeting;
        self.graph
            .send_text(recipient, &greeting_text(&product.title))
            .await
            .map_err(Stage::SendGreeting.fail())?;

        report.stage = Stage::SendLink;
        self.graph
            .send_text(recipient, &product_link(&self.link_base, &product.id))
            .await
            .map_err(Stage::SendLink.fail())?;

        report.stage = Stage::Done;
        Ok(())
    }
}
