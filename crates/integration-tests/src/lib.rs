//! Integration test harness for the Cin7 bridge.
//!
//! Spins up the real router on an ephemeral port with every outbound base
//! URL pointed at a [`wiremock`] server, so tests drive the full flow:
//! signed webhook in, mapped document out.
//!
//! # Test Categories
//!
//! - `webhook_omni` - Shopify webhook to Cin7 Omni flow
//! - `webhook_core` - Shopify webhook to Cin7 Core flow
//! - `quote_api` - storefront quote request endpoint

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::unwrap_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use secrecy::SecretString;
use sha2::Sha256;
use wiremock::MockServer;

use cin7_bridge_core::mapping::MapperSettings;
use cin7_bridge_server::config::{
    BridgeConfig, CoreConfig, DispatchSettings, OmniConfig, ShopifyAdminConfig, WebhookConfig,
};
use cin7_bridge_server::dispatch::{Dispatcher, HttpTransport};
use cin7_bridge_server::routes;
use cin7_bridge_server::state::AppState;

/// Webhook secret shared by the test config and [`sign`].
pub const WEBHOOK_SECRET: &str = "shpss_it_2f7c91d4ab6e0835";

/// A bridge config with no back ends wired up; tests fill in the mock URLs.
#[must_use]
pub fn base_config() -> BridgeConfig {
    BridgeConfig {
        host: [127, 0, 0, 1].into(),
        port: 0,
        webhook: WebhookConfig {
            secret: SecretString::from(WEBHOOK_SECRET),
            allowed_shop_domain: None,
        },
        omni: None,
        core: None,
        shopify_admin: None,
        mapper: MapperSettings::default(),
        dispatch: fast_dispatch(),
        dry_run: false,
        verbose: false,
        cors_origins: vec!["*".to_string()],
        sentry_dsn: None,
        sentry_environment: None,
        tls: None,
    }
}

/// Dispatch settings tuned so retries resolve within a test run.
#[must_use]
pub fn fast_dispatch() -> DispatchSettings {
    DispatchSettings {
        max_per_second: 20,
        max_per_minute: 1200,
        max_attempts: 4,
        retry_base: Duration::from_millis(20),
        retry_cap: Duration::from_millis(100),
        retry_jitter: Duration::ZERO,
        queue_capacity: 64,
    }
}

#[must_use]
pub fn omni_config(base_url: &str) -> OmniConfig {
    OmniConfig {
        base_url: base_url.trim_end_matches('/').to_string(),
        username: "bridge-test".to_string(),
        api_key: SecretString::from("omni_6b21f0c9d4e8a753"),
        load_boms: false,
    }
}

#[must_use]
pub fn core_config(base_url: &str) -> CoreConfig {
    CoreConfig {
        base_url: base_url.trim_end_matches('/').to_string(),
        account_id: "acct-test-1".to_string(),
        app_key: SecretString::from("core_8d40e2b7f6a91c35"),
    }
}

#[must_use]
pub fn shopify_config(base_url: &str) -> ShopifyAdminConfig {
    ShopifyAdminConfig {
        store_url: base_url.trim_end_matches('/').to_string(),
        access_token: SecretString::from("shpat_it_5e19c8a374d2b60f"),
        api_version: "2024-01".to_string(),
    }
}

/// A bridge instance listening on an ephemeral local port.
pub struct TestBridge {
    address: String,
    pub client: reqwest::Client,
}

impl TestBridge {
    /// Spawn the dispatchers, assemble the router, and start serving.
    ///
    /// The dispatch workers outlive the returned value; they stop when the
    /// test's state (and with it the enqueue handles) is dropped.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot bind.
    pub async fn spawn(config: BridgeConfig) -> Self {
        let omni_dispatcher = config.omni.as_ref().map(|_| {
            Dispatcher::spawn(
                config.dispatch.clone(),
                Arc::new(HttpTransport::new()),
                config.dry_run,
            )
        });
        let core_dispatcher = config.core.as_ref().map(|_| {
            Dispatcher::spawn(
                config.dispatch.clone(),
                Arc::new(HttpTransport::new()),
                config.dry_run,
            )
        });

        let state = AppState::new(
            config,
            omni_dispatcher.as_ref().map(Dispatcher::handle),
            core_dispatcher.as_ref().map(Dispatcher::handle),
        );
        let app = routes::router(&state).with_state(state);

        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .expect("bind test listener");
        let address = format!("http://{}", listener.local_addr().expect("local addr"));
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });

        Self {
            address,
            client: reqwest::Client::new(),
        }
    }

    /// Absolute URL for a path on this instance.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.address)
    }
}

/// Sign a webhook body the way Shopify does: base64 HMAC-SHA256 over the
/// exact bytes, keyed with [`WEBHOOK_SECRET`].
#[must_use]
pub fn sign(body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    BASE64.encode(mac.finalize().into_bytes())
}

/// Wait until the mock server has seen `count` POSTs to `path`, then return
/// them. Webhook handlers ack before dispatching, so tests must poll for the
/// out-of-band request.
///
/// # Panics
///
/// Panics after five seconds without reaching `count`.
pub async fn wait_for_posts(server: &MockServer, path: &str, count: usize) -> Vec<wiremock::Request> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let posts: Vec<_> = server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.method.as_str() == "POST" && r.url.path() == path)
            .collect();
        if posts.len() >= count {
            return posts;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {count} POSTs to {path}, saw {}",
            posts.len()
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

/// Assert the mock server receives nothing, allowing the out-of-band
/// dispatch a moment to (incorrectly) arrive.
///
/// # Panics
///
/// Panics when any request reached the server.
pub async fn assert_no_requests(server: &MockServer) {
    tokio::time::sleep(Duration::from_millis(300)).await;
    let received = server.received_requests().await.unwrap_or_default();
    assert!(
        received.is_empty(),
        "expected no downstream requests, saw {}: {:?}",
        received.len(),
        received.iter().map(|r| r.url.path().to_string()).collect::<Vec<_>>()
    );
}
