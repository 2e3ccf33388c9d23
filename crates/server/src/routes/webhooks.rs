//! Inbound Shopify webhook handlers.
//!
//! All three entry points share one flow: verify the signature over the raw
//! body bytes, parse, drop duplicate deliveries, check the email
//! precondition, resolve the downstream contact (best effort), map, and
//! enqueue. The handler acks with 202 before the dispatch completes:
//! Shopify re-delivers undelivered webhooks aggressively, so a fast ack
//! beats surfacing downstream errors to a sender that cannot act on them.
//! Terminal dispatch states land in the log instead.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use tracing::{info, warn};

use cin7_bridge_core::mapping::{map_to_core_sale, map_to_omni};
use cin7_bridge_core::{Email, OmniDocumentKind, Order, WebhookOrder};

use crate::cin7;
use crate::error::AppError;
use crate::state::AppState;

const HMAC_HEADER: &str = "x-shopify-hmac-sha256";
const SHOP_DOMAIN_HEADER: &str = "x-shopify-shop-domain";
const WEBHOOK_ID_HEADER: &str = "x-shopify-webhook-id";

/// `POST /webhooks/draft-orders` - draft order to Omni quote.
pub async fn draft_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    omni_webhook(&state, &headers, &body, OmniDocumentKind::Quote).await
}

/// `POST /webhooks/orders` - order to Omni sales order.
pub async fn order(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    omni_webhook(&state, &headers, &body, OmniDocumentKind::SalesOrder).await
}

/// `POST /webhooks/core/orders` - order to Core sale.
pub async fn core_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let Some(order) = authenticate_and_parse(&state, &headers, &body, "core-sale").await? else {
        return Ok(StatusCode::OK);
    };

    let Some(email) = resolvable_email(&order) else {
        return Ok(skip_no_email(&order));
    };

    let Some((client, dispatch)) = state.core() else {
        return Err(AppError::Internal("Core back end not configured".into()));
    };

    let customer_id = client.find_customer_id(&email).await;
    let sale = map_to_core_sale(state.mapper(), &order, customer_id);
    let ticket = dispatch.enqueue(client.create_sale_request(&sale))?;

    info!(label = ticket.label(), "webhook accepted, dispatch queued");
    cin7::log_outcome_detached(ticket);

    Ok(StatusCode::ACCEPTED)
}

/// Shared flow for the two Omni-bound webhook topics.
async fn omni_webhook(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
    kind: OmniDocumentKind,
) -> Result<StatusCode, AppError> {
    let scope = match kind {
        OmniDocumentKind::Quote => "omni-quote",
        OmniDocumentKind::SalesOrder => "omni-order",
    };
    let Some(order) = authenticate_and_parse(state, headers, body, scope).await? else {
        return Ok(StatusCode::OK);
    };

    let Some(email) = resolvable_email(&order) else {
        return Ok(skip_no_email(&order));
    };

    let Some((client, dispatch)) = state.omni() else {
        return Err(AppError::Internal("Omni back end not configured".into()));
    };

    let member_id = client.find_contact_id(&email).await;
    let document = map_to_omni(state.mapper(), kind, &order, member_id);
    let ticket = dispatch.enqueue(client.create_document_request(kind, &document))?;

    info!(label = ticket.label(), "webhook accepted, dispatch queued");
    cin7::log_outcome_detached(ticket);

    Ok(StatusCode::ACCEPTED)
}

/// Verify headers and body and parse the order. `None` means a duplicate
/// delivery that should be acked without further work.
async fn authenticate_and_parse(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
    scope: &str,
) -> Result<Option<Order>, AppError> {
    let signature = header_str(headers, HMAC_HEADER);
    let shop_domain = header_str(headers, SHOP_DOMAIN_HEADER);
    state.verifier().verify(shop_domain, signature, body)?;

    let order: WebhookOrder = serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("unparseable webhook body: {e}")))?;
    let order = order.into_order();

    // Shopify delivers at least once; ack duplicates without re-dispatching.
    let delivery_id = header_str(headers, WEBHOOK_ID_HEADER)
        .map(|id| format!("{scope}:{id}"))
        .or_else(|| order.id.map(|id| format!("{scope}:{id}")));
    if let Some(id) = delivery_id {
        if !state.first_delivery(&id).await {
            info!(delivery = %id, "duplicate webhook delivery acked");
            return Ok(None);
        }
    }

    Ok(Some(order))
}

/// The no-email skip: acked as a non-error so Shopify does not re-deliver.
fn skip_no_email(order: &Order) -> StatusCode {
    warn!(
        order = order.name.as_deref().unwrap_or("(unnamed)"),
        "no resolvable email, skipping dispatch"
    );
    StatusCode::OK
}

fn resolvable_email(order: &Order) -> Option<Email> {
    order.contact_email().and_then(|raw| Email::parse(raw).ok())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
