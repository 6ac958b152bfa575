//! Product catalog client.

use std::time::Duration;

use reqwest::Client;
use tracing::error;

use super::types::Product;
use super::{endpoint, expect_json, ApiError};
use crate::config::Config;

#[derive(Clone)]
pub struct CatalogClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl CatalogClient {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.catalog_api_url.clone(),
            timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }

    /// Look up a product by the id carried in the opt-in reference.
    pub async fn get_product(&self, product_id: &str) -> Result<Product, ApiError> {
        let url = endpoint(&self.base_url, &["api", "products", product_id])
            .inspect_err(|e| error!(product_id = product_id, error = %e, "catalog_url_invalid"))?;

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .inspect_err(|e| error!(product_id = product_id, error = %e, "catalog_request_error"))?;

        expect_json(response)
            .await
            .inspect_err(|e| error!(product_id = product_id, error = %e, "catalog_fetch_failed"))
    }
}
