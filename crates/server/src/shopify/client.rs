//! Shopify Admin REST client.
//!
//! Only the draft-order surface is wired up: the quote request endpoint
//! records each quote as a Shopify draft order so staff can convert it to a
//! real order later.

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::ShopifyAdminConfig;

use super::ShopifyError;

/// Shopify Admin REST API client.
#[derive(Clone)]
pub struct AdminClient {
    client: Client,
    store_url: String,
    access_token: SecretString,
    api_version: String,
}

impl std::fmt::Debug for AdminClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminClient")
            .field("store_url", &self.store_url)
            .field("access_token", &"[REDACTED]")
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

impl AdminClient {
    /// Create a new Admin API client.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created. This should never happen
    /// under normal circumstances as we use standard TLS configuration.
    #[must_use]
    pub fn new(config: &ShopifyAdminConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            store_url: config.store_url.clone(),
            access_token: config.access_token.clone(),
            api_version: config.api_version.clone(),
        }
    }

    /// Create a draft order.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails, Shopify returns a non-success
    /// status, or the response cannot be parsed.
    #[instrument(skip(self, draft), fields(lines = draft.line_items.len()))]
    pub async fn create_draft_order(
        &self,
        draft: &DraftOrderInput,
    ) -> Result<CreatedDraftOrder, ShopifyError> {
        #[derive(Serialize)]
        struct Envelope<'a> {
            draft_order: &'a DraftOrderInput,
        }

        #[derive(Deserialize)]
        struct ResponseEnvelope {
            draft_order: CreatedDraftOrder,
        }

        let url = format!(
            "{}/admin/api/{}/draft_orders.json",
            self.store_url, self.api_version
        );

        let response = self
            .client
            .post(url)
            .header("X-Shopify-Access-Token", self.access_token.expose_secret())
            .json(&Envelope { draft_order: draft })
            .send()
            .await
            .map_err(|e| ShopifyError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ShopifyError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let created: ResponseEnvelope = response
            .json()
            .await
            .map_err(|e| ShopifyError::Response(e.to_string()))?;

        debug!(id = created.draft_order.id, "draft order created");

        Ok(created.draft_order)
    }
}

/// Outbound draft-order payload.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DraftOrderInput {
    pub line_items: Vec<DraftOrderLineItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<DraftOrderCustomer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<DraftOrderAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_address: Option<DraftOrderAddress>,
    pub use_customer_default_address: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
}

/// One custom draft-order line. Prices are decimal strings, per the REST API.
#[derive(Debug, Clone, Serialize)]
pub struct DraftOrderLineItem {
    pub title: String,
    pub price: String,
    pub quantity: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    /// Always true: quote lines are not tied to existing variants.
    pub custom: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DraftOrderCustomer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DraftOrderAddress {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// The subset of the created draft order the bridge reports back.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedDraftOrder {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
}
