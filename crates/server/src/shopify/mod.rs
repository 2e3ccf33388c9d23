//! Shopify-facing pieces: webhook signature verification and the Admin REST
//! client used by the quote request endpoint.

mod client;
mod verify;

pub use client::{
    AdminClient, CreatedDraftOrder, DraftOrderAddress, DraftOrderCustomer, DraftOrderInput,
    DraftOrderLineItem,
};
pub use verify::{VerifyError, WebhookVerifier};

use thiserror::Error;

/// Errors from the Shopify Admin API client.
#[derive(Debug, Error)]
pub enum ShopifyError {
    /// The request could not be sent.
    #[error("Request failed: {0}")]
    Request(String),

    /// The response could not be parsed.
    #[error("Invalid response: {0}")]
    Response(String),

    /// Shopify returned a non-success status.
    #[error("Shopify API error ({status}): {message}")]
    Api { status: u16, message: String },
}
