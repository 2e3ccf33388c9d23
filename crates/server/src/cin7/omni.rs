//! Cin7 Omni v1 API client.
//!
//! Document creation goes through the dispatch queue, so this client only
//! *builds* those requests; the one direct call it makes is the best-effort
//! contact lookup that runs before mapping.

use std::time::Duration;

use moka::future::Cache;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, warn};

use cin7_bridge_core::{Email, MemberId, OmniDocument, OmniDocumentKind};

use crate::config::OmniConfig;
use crate::dispatch::{OutboundRequest, RequestAuth};

use super::Cin7Error;

/// How long resolved contact ids stay cached.
const CONTACT_CACHE_TTL: Duration = Duration::from_secs(600);
const CONTACT_CACHE_CAPACITY: u64 = 10_000;

/// Cin7 Omni API client.
#[derive(Clone)]
pub struct OmniClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    api_key: SecretString,
    load_boms: bool,
    /// Contact-id-by-email cache. Successful lookups (including "no such
    /// contact") are cached; transport failures are not.
    contacts: Cache<String, Option<MemberId>>,
}

impl std::fmt::Debug for OmniClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OmniClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("api_key", &"[REDACTED]")
            .field("load_boms", &self.load_boms)
            .finish_non_exhaustive()
    }
}

impl OmniClient {
    /// Create a new Omni client.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created. This should never happen
    /// under normal circumstances as we use standard TLS configuration.
    #[must_use]
    pub fn new(config: &OmniConfig) -> Self {
        // Lookups are best-effort and must not stall webhook handling, so
        // they get a short timeout.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: config.base_url.clone(),
            username: config.username.clone(),
            api_key: config.api_key.clone(),
            load_boms: config.load_boms,
            contacts: Cache::builder()
                .max_capacity(CONTACT_CACHE_CAPACITY)
                .time_to_live(CONTACT_CACHE_TTL)
                .build(),
        }
    }

    /// Build the queued request that creates one document.
    #[must_use]
    pub fn create_document_request(
        &self,
        kind: OmniDocumentKind,
        document: &OmniDocument,
    ) -> OutboundRequest {
        let load_boms = match kind {
            OmniDocumentKind::Quote => false,
            OmniDocumentKind::SalesOrder => self.load_boms,
        };

        OutboundRequest {
            label: format!(
                "omni {kind} {}",
                document.reference.as_deref().unwrap_or("(no reference)")
            ),
            url: format!(
                "{}/v1/{}?loadboms={load_boms}",
                self.base_url,
                kind.path()
            ),
            auth: RequestAuth::Basic {
                username: self.username.clone(),
                api_key: self.api_key.clone(),
            },
            // The API expects an array even for a single document.
            body: json!([document]),
        }
    }

    /// Resolve an existing contact id by email.
    ///
    /// Best effort: failures are logged and reported as `None` so the
    /// caller proceeds without an id and Omni creates a fresh contact.
    #[instrument(skip(self, email))]
    pub async fn find_contact_id(&self, email: &Email) -> Option<MemberId> {
        let key = email.as_str().to_ascii_lowercase();
        if let Some(cached) = self.contacts.get(&key).await {
            return cached;
        }

        let resolved = match self.lookup_contact(&key).await {
            Ok(found) => found,
            Err(err) => {
                warn!(error = %err, "contact lookup failed, proceeding without member id");
                return None;
            }
        };

        debug!(member_id = ?resolved, "contact lookup resolved");
        self.contacts.insert(key, resolved).await;
        resolved
    }

    async fn lookup_contact(&self, email: &str) -> Result<Option<MemberId>, Cin7Error> {
        #[derive(Deserialize)]
        struct Contact {
            id: Option<i64>,
        }

        // The filter value is single-quoted; strip quotes from the email so
        // the expression cannot be broken out of.
        let sanitized = email.replace('\'', "");
        let filter = format!("email='{sanitized}'");

        let response = self
            .client
            .get(format!("{}/v1/Contacts", self.base_url))
            .basic_auth(&self.username, Some(self.api_key.expose_secret()))
            .query(&[("fields", "id"), ("where", filter.as_str())])
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

        let contacts: Vec<Contact> = response
            .json()
            .await
            .map_err(|e| Cin7Error::Response(e.to_string()))?;

        Ok(contacts
            .into_iter()
            .find_map(|c| c.id.map(MemberId::new)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn client() -> OmniClient {
        OmniClient::new(&OmniConfig {
            base_url: "https://api.cin7.example/api".to_string(),
            username: "store-user".to_string(),
            api_key: SecretString::from("k3y"),
            load_boms: true,
        })
    }

    #[test]
    fn test_quote_request_shape() {
        let document = OmniDocument {
            reference: Some("#1001".to_string()),
            tax_rate: Some(Decimal::from(10)),
            ..OmniDocument::default()
        };

        let request = client().create_document_request(OmniDocumentKind::Quote, &document);

        // Quotes never load bills of materials.
        assert_eq!(
            request.url,
            "https://api.cin7.example/api/v1/Quotes?loadboms=false"
        );
        assert_eq!(request.label, "omni quote #1001");
        assert!(request.body.is_array());
        assert_eq!(request.body[0]["reference"], "#1001");
    }

    #[test]
    fn test_sales_order_request_honors_load_boms() {
        let document = OmniDocument::default();
        let request = client().create_document_request(OmniDocumentKind::SalesOrder, &document);
        assert_eq!(
            request.url,
            "https://api.cin7.example/api/v1/SalesOrders?loadboms=true"
        );
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let debug_output = format!("{:?}", client());
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("k3y"));
    }
}
