//! Cin7 Bridge server library.
//!
//! Webhook-driven glue between a Shopify store and the Cin7 Omni/Core
//! commerce back ends. Each entry point authenticates the inbound call,
//! maps the Shopify payload into the target system's schema, and forwards
//! it through a rate-limited dispatch queue.
//!
//! The crate is a library so the integration tests can assemble the router
//! and application state without spawning the binary.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cin7;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod routes;
pub mod shopify;
pub mod state;
