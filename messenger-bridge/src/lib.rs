//! Messenger bridge - opt-in webhook receiver for the TrovaModa shop.
//!
//! When a shopper clicks "Send to Messenger" on a product page, the platform
//! delivers an opt-in callback carrying the product id. This crate verifies
//! the callback, looks the product up in the catalog and greets the shopper
//! through the Send API.
//!
//! ## Architecture
//!
//! ```text
//! Messenger → POST /webhook → signature check → Pipeline (per opt-in, detached)
//!                                                 ├─ Graph API: profile
//!                                                 ├─ Catalog: product
//!                                                 └─ Send API: image, greeting, link
//! ```

pub mod api;
pub mod config;
pub mod events;
pub mod pipeline;
pub mod web;

// Re-export commonly used types
pub use api::{ApiError, CatalogClient, GraphClient, Product, UserInfo};
pub use config::{Config, ConfigError};
pub use events::{OptInEvent, WebhookPayload};
pub use pipeline::{Pipeline, PipelineReport, Stage};
pub use web::{router, AppState};
