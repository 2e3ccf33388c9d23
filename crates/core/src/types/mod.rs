//! Core types for the Cin7 bridge.
//!
//! Inbound Shopify shapes live in [`shopify`], outbound Cin7 shapes in
//! [`cin7`]. The remaining modules provide type-safe wrappers for common
//! domain concepts.

pub mod cin7;
pub mod email;
pub mod id;
pub mod shopify;

pub use cin7::*;
pub use email::{Email, EmailError};
pub use id::*;
pub use shopify::*;
