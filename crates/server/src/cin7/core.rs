//! Cin7 Core API client.
//!
//! Core authenticates with an account-id/application-key header pair rather
//! than basic auth, and answers with PascalCase objects instead of arrays.
//! Like the Omni client, sale creation goes through the dispatch queue and
//! only the customer lookup is a direct call.

use std::time::Duration;

use moka::future::Cache;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, warn};

use cin7_bridge_core::{CoreSale, Email};

use crate::config::CoreConfig;
use crate::dispatch::{OutboundRequest, RequestAuth};

use super::Cin7Error;

/// How long resolved customer ids stay cached.
const CUSTOMER_CACHE_TTL: Duration = Duration::from_secs(600);
const CUSTOMER_CACHE_CAPACITY: u64 = 10_000;

/// Cin7 Core API client.
#[derive(Clone)]
pub struct CoreClient {
    client: reqwest::Client,
    base_url: String,
    account_id: String,
    app_key: SecretString,
    /// Customer-id-by-email cache. Successful lookups (including "no such
    /// customer") are cached; transport failures are not.
    customers: Cache<String, Option<String>>,
}

impl std::fmt::Debug for CoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreClient")
            .field("base_url", &self.base_url)
            .field("account_id", &self.account_id)
            .field("app_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl CoreClient {
    /// Create a new Core client.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created. This should never happen
    /// under normal circumstances as we use standard TLS configuration.
    #[must_use]
    pub fn new(config: &CoreConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: config.base_url.clone(),
            account_id: config.account_id.clone(),
            app_key: config.app_key.clone(),
            customers: Cache::builder()
                .max_capacity(CUSTOMER_CACHE_CAPACITY)
                .time_to_live(CUSTOMER_CACHE_TTL)
                .build(),
        }
    }

    /// Build the queued request that creates one sale.
    #[must_use]
    pub fn create_sale_request(&self, sale: &CoreSale) -> OutboundRequest {
        OutboundRequest {
            label: format!(
                "core sale {}",
                sale.customer_reference.as_deref().unwrap_or("(no reference)")
            ),
            url: format!("{}/Sale", self.base_url),
            auth: RequestAuth::AccountKey {
                account_id: self.account_id.clone(),
                app_key: self.app_key.clone(),
            },
            // The API expects an array even for a single document.
            body: json!([sale]),
        }
    }

    /// Resolve an existing customer id by email.
    ///
    /// Best effort: failures are logged and reported as `None` so the
    /// caller proceeds without an id.
    #[instrument(skip(self, email))]
    pub async fn find_customer_id(&self, email: &Email) -> Option<String> {
        let key = email.as_str().to_ascii_lowercase();
        if let Some(cached) = self.customers.get(&key).await {
            return cached;
        }

        let resolved = match self.lookup_customer(&key).await {
            Ok(found) => found,
            Err(err) => {
                warn!(error = %err, "customer lookup failed, proceeding without customer id");
                return None;
            }
        };

        debug!(customer_id = ?resolved, "customer lookup resolved");
        self.customers.insert(key, resolved.clone()).await;
        resolved
    }

    async fn lookup_customer(&self, email: &str) -> Result<Option<String>, Cin7Error> {
        #[derive(Deserialize)]
        struct CustomerPage {
            #[serde(rename = "CustomerList", default)]
            customers: Vec<CoreCustomer>,
        }

        #[derive(Deserialize)]
        struct CoreCustomer {
            #[serde(rename = "ID")]
            id: Option<String>,
        }

        let response = self
            .client
            .get(format!("{}/Customer", self.base_url))
            .header("api-auth-accountid", &self.account_id)
            .header("api-auth-applicationkey", self.app_key.expose_secret())
            .query(&[("Search", email)])
            .send()
            .await
            .map_err(|e| Cin7Error::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Cin7Error::Api {
                status: status.as_u16(),
                message,
            });
        }

        let page: CustomerPage = response
            .json()
            .await
            .map_err(|e| Cin7Error::Response(e.to_string()))?;

        Ok(page.customers.into_iter().find_map(|c| c.id))
    }
}
