//! Storefront quote request endpoint.
//!
//! Accepts a product-plus-customer form from the storefront, records it as
//! a Shopify draft order (best effort) and files a Cin7 Omni quote through
//! the dispatch queue. Unlike the webhook routes this endpoint serves an
//! interactive caller, so it waits for the dispatch to finish and reports
//! the per-system outcome.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use uuid::Uuid;

use cin7_bridge_core::mapping::map_to_omni;
use cin7_bridge_core::{
    Address, Customer, Email, LineItem, OmniDocumentKind, Order,
};

use crate::cin7;
use crate::error::AppError;
use crate::shopify::{
    DraftOrderAddress, DraftOrderCustomer, DraftOrderInput, DraftOrderLineItem,
};
use crate::state::AppState;

const MAX_LINE_ITEMS: usize = 10;

/// A storefront quote request.
#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub product_title: String,
    #[serde(default)]
    pub product_handle: Option<String>,
    pub line_items: Vec<QuoteLineItem>,
    pub customer: QuoteCustomer,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuoteLineItem {
    /// Product variant code.
    pub code: String,
    pub name: String,
    pub qty: i64,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct QuoteCustomer {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub business_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub address_line1: String,
    #[serde(default)]
    pub address_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String {
    "Australia".to_string()
}

/// Per-system outcome of a quote request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    /// Every configured system accepted the quote.
    Completed,
    /// Some systems accepted it; details are in the log.
    Partial,
    /// No system accepted it.
    Failed,
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub quote_id: Uuid,
    pub reference: String,
    pub shopify_draft_order_id: Option<i64>,
    pub cin7_quote_id: Option<i64>,
    pub status: QuoteStatus,
    pub customer_name: String,
    pub total_items: usize,
    pub message: String,
}

/// `POST /api/quotes`
#[instrument(skip_all, fields(product = %request.product_title))]
pub async fn create_quote(
    State(state): State<AppState>,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>, AppError> {
    validate(&request)?;
    let email = Email::parse(&request.customer.email)
        .map_err(|e| AppError::BadRequest(format!("invalid email: {e}")))?;

    let quote_id = Uuid::new_v4();
    let reference = format!("WEB-{}", Utc::now().format("%Y%m%d%H%M%S"));

    // Shopify draft order first (best effort: a failure here must not stop
    // the Cin7 quote).
    let shopify_draft_order_id = match state.shopify() {
        Some(client) => {
            match client.create_draft_order(&draft_order_input(&request)).await {
                Ok(created) => Some(created.id),
                Err(err) => {
                    error!(error = %err, "Shopify draft order creation failed");
                    None
                }
            }
        }
        None => None,
    };

    // Cin7 Omni quote through the dispatch queue (blocking pattern).
    let cin7_quote_id = match state.omni() {
        Some((client, dispatch)) => {
            let order = order_from_request(&request, &reference);
            let member_id = client.find_contact_id(&email).await;
            let document = map_to_omni(state.mapper(), OmniDocumentKind::Quote, &order, member_id);
            let ticket =
                dispatch.enqueue(client.create_document_request(OmniDocumentKind::Quote, &document))?;

            match ticket.outcome().await {
                Ok(outcome) if cin7::body_reports_success(&outcome.body) => {
                    cin7::created_id(&outcome.body)
                }
                Ok(outcome) => {
                    error!(response = %outcome.body, "Cin7 reported quote failure");
                    None
                }
                Err(err) => {
                    error!(error = %err, "Cin7 quote dispatch failed");
                    None
                }
            }
        }
        None => None,
    };

    let attempted = usize::from(state.shopify().is_some()) + usize::from(state.omni().is_some());
    let succeeded =
        usize::from(shopify_draft_order_id.is_some()) + usize::from(cin7_quote_id.is_some());
    let (status, message) = match (succeeded, attempted) {
        (s, a) if s == a && a > 0 => (
            QuoteStatus::Completed,
            "Quote successfully created in all connected systems".to_string(),
        ),
        (0, _) => (
            QuoteStatus::Failed,
            "Quote creation failed in all connected systems".to_string(),
        ),
        _ => (
            QuoteStatus::Partial,
            "Quote partially created. Check logs for details.".to_string(),
        ),
    };

    info!(
        quote_id = %quote_id,
        reference = %reference,
        ?status,
        "quote request processed"
    );

    Ok(Json(QuoteResponse {
        quote_id,
        reference,
        shopify_draft_order_id,
        cin7_quote_id,
        status,
        customer_name: format!(
            "{} {}",
            request.customer.first_name, request.customer.last_name
        ),
        total_items: request.line_items.len(),
        message,
    }))
}

fn validate(request: &QuoteRequest) -> Result<(), AppError> {
    if request.line_items.is_empty() {
        return Err(AppError::BadRequest("at least one line item required".into()));
    }
    if request.line_items.len() > MAX_LINE_ITEMS {
        return Err(AppError::BadRequest(format!(
            "at most {MAX_LINE_ITEMS} line items allowed"
        )));
    }
    if request.line_items.iter().any(|line| line.qty <= 0) {
        return Err(AppError::BadRequest(
            "quantity must be greater than zero".into(),
        ));
    }

    let customer = &request.customer;
    let required = [
        ("product_title", &request.product_title),
        ("first_name", &customer.first_name),
        ("last_name", &customer.last_name),
        ("business_name", &customer.business_name),
        ("address_line1", &customer.address_line1),
        ("city", &customer.city),
        ("state", &customer.state),
        ("postal_code", &customer.postal_code),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(AppError::BadRequest(format!("{field} is required")));
        }
    }

    Ok(())
}

/// Express the quote as an order so the shared mapper handles it.
fn order_from_request(request: &QuoteRequest, reference: &str) -> Order {
    let customer = &request.customer;
    let address = Address {
        first_name: Some(customer.first_name.clone()),
        last_name: Some(customer.last_name.clone()),
        company: Some(customer.business_name.clone()),
        address1: Some(customer.address_line1.clone()),
        address2: customer.address_line2.clone(),
        city: Some(customer.city.clone()),
        province: Some(customer.state.clone()),
        zip: Some(customer.postal_code.clone()),
        country: Some(customer.country.clone()),
        phone: customer.phone.clone(),
    };

    Order {
        name: Some(reference.to_string()),
        email: Some(customer.email.clone()),
        // Storefront quote prices are already exclusive.
        taxes_included: false,
        note: Some(note_text(request)),
        customer: Some(Customer {
            first_name: Some(customer.first_name.clone()),
            last_name: Some(customer.last_name.clone()),
            phone: customer.phone.clone(),
            ..Customer::default()
        }),
        billing_address: Some(address.clone()),
        shipping_address: Some(address),
        line_items: request
            .line_items
            .iter()
            .map(|line| LineItem {
                sku: Some(line.code.clone()),
                title: Some(line.name.clone()),
                quantity: line.qty,
                price: line.unit_price,
                ..LineItem::default()
            })
            .collect(),
        ..Order::default()
    }
}

fn note_text(request: &QuoteRequest) -> String {
    format!(
        "Quote generated from product: {}. Customer notes: {}",
        request.product_title,
        request.notes.as_deref().unwrap_or("None")
    )
}

fn draft_order_input(request: &QuoteRequest) -> DraftOrderInput {
    let customer = &request.customer;
    let address = DraftOrderAddress {
        first_name: Some(customer.first_name.clone()),
        last_name: Some(customer.last_name.clone()),
        company: Some(customer.business_name.clone()),
        address1: Some(customer.address_line1.clone()),
        address2: customer.address_line2.clone(),
        city: Some(customer.city.clone()),
        province: Some(customer.state.clone()),
        zip: Some(customer.postal_code.clone()),
        country: Some(customer.country.clone()),
    };

    DraftOrderInput {
        line_items: request
            .line_items
            .iter()
            .map(|line| DraftOrderLineItem {
                title: line.name.clone(),
                price: line
                    .unit_price
                    .map_or_else(|| "0.00".to_string(), |p| p.to_string()),
                quantity: line.qty,
                sku: Some(line.code.clone()),
                custom: true,
            })
            .collect(),
        customer: Some(DraftOrderCustomer {
            first_name: Some(customer.first_name.clone()),
            last_name: Some(customer.last_name.clone()),
            email: Some(customer.email.clone()),
            phone: customer.phone.clone(),
        }),
        shipping_address: Some(address.clone()),
        billing_address: Some(address),
        use_customer_default_address: false,
        note: Some(note_text(request)),
        tags: Some("quote,bridge".to_string()),
    }
}
