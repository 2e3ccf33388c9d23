//! Cin7 Bridge Core - shared types and order mapping.
//!
//! This crate provides the pieces shared by every bridge entry point:
//! - [`types`] - inbound Shopify payloads, outbound Cin7 documents, and
//!   type-safe wrappers for ids and email addresses
//! - [`mapping`] - the pure field mapper that turns a Shopify order into a
//!   Cin7 document, including tax rate resolution and price conversion
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no clocks. Everything here is deterministic and unit-testable
//! without a network.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod mapping;
pub mod types;

pub use types::*;
