//! Outbound Cin7 document types.
//!
//! Two generations of the Cin7 API are represented here: the Omni v1 sales
//! shape (camelCase, shared by the Quotes and SalesOrders collections) and
//! the Core Sale shape (PascalCase). Both APIs expect absent rather than
//! null for optional fields, so everything optional is pruned with
//! `skip_serializing_if` and money serializes as JSON numbers.

use rust_decimal::Decimal;
use serde::Serialize;

use super::id::{BranchId, MemberId};

/// Which Omni document collection a payload is destined for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OmniDocumentKind {
    /// `POST /v1/Quotes`
    Quote,
    /// `POST /v1/SalesOrders`
    SalesOrder,
}

impl OmniDocumentKind {
    /// API path segment under `/v1/`.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Quote => "Quotes",
            Self::SalesOrder => "SalesOrders",
        }
    }
}

impl std::fmt::Display for OmniDocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Quote => write!(f, "quote"),
            Self::SalesOrder => write!(f, "sales order"),
        }
    }
}

/// A Cin7 Omni sales document (quote or sales order).
///
/// The API accepts a JSON array of these; the bridge always sends exactly
/// one per request.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OmniDocument {
    /// Pipeline stage, e.g. "New". Quotes only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Win probability percentage. Quotes only.
    #[serde(skip_serializing_if = "Option::is_none", with = "rust_decimal::serde::float_option")]
    pub probability: Option<Decimal>,
    /// Existing Omni contact, when one was resolved by email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_id: Option<MemberId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_address_1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_address_2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<BranchId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency_code: Option<String>,
    /// "Excl" or "Incl". The bridge always emits exclusive prices.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_status: Option<String>,
    /// Document tax rate as a percentage (10 for 10% GST).
    #[serde(skip_serializing_if = "Option::is_none", with = "rust_decimal::serde::float_option")]
    pub tax_rate: Option<Decimal>,
    /// Source order identifier, e.g. the Shopify order name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_order_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_comments: Option<String>,
    /// Order-level discount as exclusive money.
    #[serde(skip_serializing_if = "Option::is_none", with = "rust_decimal::serde::float_option")]
    pub discount_total: Option<Decimal>,
    /// Shipping cost as exclusive money.
    #[serde(skip_serializing_if = "Option::is_none", with = "rust_decimal::serde::float_option")]
    pub freight_total: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freight_description: Option<String>,
    pub line_items: Vec<OmniLineItem>,
}

/// One Omni document line.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OmniLineItem {
    /// Product variant code (Shopify SKU).
    pub code: String,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub qty: Decimal,
    /// Exclusive unit price.
    #[serde(skip_serializing_if = "Option::is_none", with = "rust_decimal::serde::float_option")]
    pub unit_price: Option<Decimal>,
    /// Exclusive line discount.
    #[serde(skip_serializing_if = "Option::is_none", with = "rust_decimal::serde::float_option")]
    pub discount: Option<Decimal>,
}

/// A Cin7 Core sale, posted to `/Sale` as a single-element array.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CoreSale {
    /// Customer display name: company if present, else the contact name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<String>,
    /// Existing Core customer, when one was resolved by email.
    #[serde(rename = "CustomerID", skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_reference: Option<String>,
    #[serde(rename = "Currency", skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_rule: Option<String>,
    /// Always false: the bridge converts prices to exclusive before mapping.
    pub tax_inclusive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_address: Option<CoreAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<CoreAddress>,
    pub lines: Vec<CoreSaleLine>,
}

/// A Core postal address block.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CoreAddress {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl CoreAddress {
    /// True when every field is empty; used to prune empty address blocks.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.line_1.is_none()
            && self.line_2.is_none()
            && self.city.is_none()
            && self.state.is_none()
            && self.postcode.is_none()
            && self.country.is_none()
    }
}

/// One Core sale line.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CoreSaleLine {
    #[serde(rename = "SKU")]
    pub sku: String,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    /// Exclusive unit price.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// Exclusive line discount.
    #[serde(skip_serializing_if = "Option::is_none", with = "rust_decimal::serde::float_option")]
    pub discount: Option<Decimal>,
}
