//! Application state shared across handlers.
//!
//! Everything a handler touches (clients, dispatch handles, the webhook
//! verifier, the delivery-id cache) is constructed once at startup and
//! owned here; nothing lives in module-level statics.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use cin7_bridge_core::mapping::MapperSettings;

use crate::cin7::{CoreClient, OmniClient};
use crate::config::BridgeConfig;
use crate::dispatch::DispatchHandle;
use crate::shopify::{AdminClient, WebhookVerifier};

/// Shopify redelivers webhooks for at most 48 hours; remembering ids for a
/// day covers the realistic duplicate window.
const DELIVERY_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const DELIVERY_CACHE_CAPACITY: u64 = 100_000;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: BridgeConfig,
    verifier: WebhookVerifier,
    omni: Option<(OmniClient, DispatchHandle)>,
    core: Option<(CoreClient, DispatchHandle)>,
    shopify: Option<AdminClient>,
    /// Webhook delivery ids already processed; duplicates are acked without
    /// re-dispatching.
    seen_deliveries: Cache<String, ()>,
}

impl AppState {
    /// Build the state from configuration and the per-backend dispatch
    /// handles. A handle must be present exactly when its config section is.
    #[must_use]
    pub fn new(
        config: BridgeConfig,
        omni_dispatch: Option<DispatchHandle>,
        core_dispatch: Option<DispatchHandle>,
    ) -> Self {
        let verifier = WebhookVerifier::new(
            config.webhook.secret.clone(),
            config.webhook.allowed_shop_domain.clone(),
        );

        let omni = config
            .omni
            .as_ref()
            .map(OmniClient::new)
            .zip(omni_dispatch);
        let core = config
            .core
            .as_ref()
            .map(CoreClient::new)
            .zip(core_dispatch);
        let shopify = config.shopify_admin.as_ref().map(AdminClient::new);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                verifier,
                omni,
                core,
                shopify,
                seen_deliveries: Cache::builder()
                    .max_capacity(DELIVERY_CACHE_CAPACITY)
                    .time_to_live(DELIVERY_CACHE_TTL)
                    .build(),
            }),
        }
    }

    /// The loaded configuration.
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Mapper parameters.
    #[must_use]
    pub fn mapper(&self) -> &MapperSettings {
        &self.inner.config.mapper
    }

    /// The webhook verifier.
    #[must_use]
    pub fn verifier(&self) -> &WebhookVerifier {
        &self.inner.verifier
    }

    /// The Omni client and its dispatch handle, when configured.
    #[must_use]
    pub fn omni(&self) -> Option<(&OmniClient, &DispatchHandle)> {
        self.inner.omni.as_ref().map(|(c, d)| (c, d))
    }

    /// The Core client and its dispatch handle, when configured.
    #[must_use]
    pub fn core(&self) -> Option<(&CoreClient, &DispatchHandle)> {
        self.inner.core.as_ref().map(|(c, d)| (c, d))
    }

    /// The Shopify Admin client, when configured.
    #[must_use]
    pub fn shopify(&self) -> Option<&AdminClient> {
        self.inner.shopify.as_ref()
    }

    #[must_use]
    pub fn has_omni(&self) -> bool {
        self.inner.omni.is_some()
    }

    #[must_use]
    pub fn has_core(&self) -> bool {
        self.inner.core.is_some()
    }

    /// Record a webhook delivery id. Returns true the first time an id is
    /// seen; duplicates (Shopify delivers at least once) return false.
    pub async fn first_delivery(&self, id: &str) -> bool {
        if self.inner.seen_deliveries.contains_key(id) {
            return false;
        }
        self.inner.seen_deliveries.insert(id.to_string(), ()).await;
        true
    }
}
