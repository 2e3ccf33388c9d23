//! Inbound Shopify payload types.
//!
//! These mirror the REST Admin API order and draft-order shapes, narrowed to
//! the fields the bridge actually maps. Shopify sends money as decimal
//! strings, tax rates as fractional numbers, and omits most optional fields,
//! so nearly everything here is optional and money fields parse through
//! `rust_decimal::serde::str_option`.

use rust_decimal::Decimal;
use serde::Deserialize;

/// A webhook body: draft-order topics nest the document under a
/// `draft_order` key, order topics deliver it at the top level.
///
/// The wrapped variant is listed first so that a body carrying a
/// `draft_order` key never falls through to the bare variant (every field of
/// [`Order`] is optional, so the bare variant matches almost anything).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WebhookOrder {
    /// `{ "draft_order": { ... } }`
    Wrapped {
        /// The nested draft order document.
        draft_order: Order,
    },
    /// A top-level order document.
    Bare(Order),
}

impl WebhookOrder {
    /// Unwrap to the order document regardless of nesting.
    #[must_use]
    pub fn into_order(self) -> Order {
        match self {
            Self::Wrapped { draft_order } => draft_order,
            Self::Bare(order) => order,
        }
    }
}

/// A Shopify order or draft order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Order {
    /// Numeric Shopify id.
    pub id: Option<i64>,
    /// Human order name, e.g. `#1001` (orders) or `#D12` (draft orders).
    pub name: Option<String>,
    /// Top-level contact email. May be absent even when `customer.email` is set.
    pub email: Option<String>,
    /// ISO currency code of the presented prices.
    pub currency: Option<String>,
    /// When true, all prices on this document already contain tax.
    #[serde(default)]
    pub taxes_included: bool,
    /// Free-form merchant note.
    pub note: Option<String>,
    pub customer: Option<Customer>,
    pub billing_address: Option<Address>,
    pub shipping_address: Option<Address>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub shipping_lines: Vec<ShippingLine>,
    /// Order-level tax lines.
    #[serde(default)]
    pub tax_lines: Vec<TaxLine>,
    /// Order-level discount on draft orders.
    pub applied_discount: Option<AppliedDiscount>,
    /// Total of all order-level discounts on completed orders.
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub total_discounts: Option<Decimal>,
}

impl Order {
    /// Resolve the contact email: the top-level field first, then the
    /// customer record. Blank strings count as absent.
    #[must_use]
    pub fn contact_email(&self) -> Option<&str> {
        non_empty(self.email.as_deref())
            .or_else(|| non_empty(self.customer.as_ref()?.email.as_deref()))
    }

    /// The first discount amount present at order level: draft-order
    /// `applied_discount` first, then the completed-order total.
    #[must_use]
    pub fn order_discount(&self) -> Option<Decimal> {
        self.applied_discount
            .as_ref()
            .and_then(AppliedDiscount::money_amount)
            .or(self.total_discounts)
            .filter(|d| !d.is_zero())
    }
}

/// The customer record attached to an order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Customer {
    pub id: Option<i64>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

/// A postal address. Shopify ships these on both `shipping_address` and
/// `billing_address` with identical shape.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Address {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
}

/// One order line.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LineItem {
    pub sku: Option<String>,
    /// Product title.
    pub title: Option<String>,
    /// Variant-qualified name, e.g. "Widget - Large".
    pub name: Option<String>,
    #[serde(default)]
    pub quantity: i64,
    /// Unit price as presented (inclusive or exclusive per `taxes_included`).
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub price: Option<Decimal>,
    /// Line-level tax lines.
    #[serde(default)]
    pub tax_lines: Vec<TaxLine>,
    /// Line-level discount on draft orders.
    pub applied_discount: Option<AppliedDiscount>,
    /// Discount allocated to this line on completed orders.
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub total_discount: Option<Decimal>,
}

impl LineItem {
    /// Display name precedence: variant-qualified name, then product title.
    #[must_use]
    pub fn display_name(&self) -> &str {
        non_empty(self.name.as_deref())
            .or_else(|| non_empty(self.title.as_deref()))
            .unwrap_or("")
    }

    /// The discount amount for this line, if any: draft-order
    /// `applied_discount` first, then the completed-order allocation.
    #[must_use]
    pub fn discount(&self) -> Option<Decimal> {
        self.applied_discount
            .as_ref()
            .and_then(AppliedDiscount::money_amount)
            .or(self.total_discount)
            .filter(|d| !d.is_zero())
    }
}

/// One shipping (freight) line.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShippingLine {
    pub title: Option<String>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub tax_lines: Vec<TaxLine>,
}

/// A tax line at order, line, or shipping level.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaxLine {
    pub title: Option<String>,
    /// Fractional rate, e.g. `0.1` for 10% GST. Sent as a JSON number.
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub rate: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub price: Option<Decimal>,
}

/// A draft-order discount, at order or line level.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppliedDiscount {
    pub description: Option<String>,
    /// "percentage" or "fixed_amount".
    pub value_type: Option<String>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub value: Option<Decimal>,
    /// The computed money amount, present regardless of `value_type`.
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub amount: Option<Decimal>,
}

impl AppliedDiscount {
    /// The discount expressed as money, preferring the pre-computed amount.
    #[must_use]
    pub fn money_amount(&self) -> Option<Decimal> {
        self.amount.or_else(|| {
            // Fixed-amount discounts sometimes arrive with only `value` set.
            match self.value_type.as_deref() {
                Some("fixed_amount") => self.value,
                _ => None,
            }
        })
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wrapped_draft_order_unwraps() {
        let body = json!({
            "draft_order": {
                "id": 99,
                "name": "#D12",
                "taxes_included": true,
                "line_items": [{"sku": "LM-100", "quantity": 2, "price": "110.00"}]
            }
        });

        let order = serde_json::from_value::<WebhookOrder>(body)
            .unwrap()
            .into_order();
        assert_eq!(order.id, Some(99));
        assert_eq!(order.name.as_deref(), Some("#D12"));
        assert!(order.taxes_included);
        assert_eq!(order.line_items.len(), 1);
    }

    #[test]
    fn test_bare_order_parses() {
        let body = json!({
            "id": 1,
            "email": "buyer@example.com",
            "line_items": []
        });

        let order = serde_json::from_value::<WebhookOrder>(body)
            .unwrap()
            .into_order();
        assert_eq!(order.id, Some(1));
        assert_eq!(order.contact_email(), Some("buyer@example.com"));
    }

    #[test]
    fn test_contact_email_falls_back_to_customer() {
        let order = Order {
            email: Some("   ".to_string()),
            customer: Some(Customer {
                email: Some("fallback@example.com".to_string()),
                ..Customer::default()
            }),
            ..Order::default()
        };
        assert_eq!(order.contact_email(), Some("fallback@example.com"));
    }

    #[test]
    fn test_contact_email_absent() {
        let order = Order {
            customer: Some(Customer::default()),
            ..Order::default()
        };
        assert_eq!(order.contact_email(), None);
    }

    #[test]
    fn test_money_fields_parse_from_strings() {
        let line: LineItem = serde_json::from_value(json!({
            "sku": "A",
            "quantity": 1,
            "price": "19.95",
            "total_discount": "2.00",
            "tax_lines": [{"rate": 0.1, "price": "1.81"}]
        }))
        .unwrap();

        assert_eq!(line.price.unwrap().to_string(), "19.95");
        assert_eq!(line.discount().unwrap().to_string(), "2.00");
        assert_eq!(
            line.tax_lines.first().unwrap().rate.unwrap(),
            rust_decimal::Decimal::new(1, 1)
        );
    }

    #[test]
    fn test_missing_price_is_none() {
        let line: LineItem = serde_json::from_value(json!({"quantity": 3})).unwrap();
        assert!(line.price.is_none());
        assert_eq!(line.quantity, 3);
    }

    #[test]
    fn test_draft_discount_prefers_amount() {
        let discount: AppliedDiscount = serde_json::from_value(json!({
            "value_type": "percentage",
            "value": "10.0",
            "amount": "25.00"
        }))
        .unwrap();
        assert_eq!(discount.money_amount().unwrap().to_string(), "25.00");
    }

    #[test]
    fn test_fixed_amount_discount_without_amount() {
        let discount: AppliedDiscount = serde_json::from_value(json!({
            "value_type": "fixed_amount",
            "value": "5.00"
        }))
        .unwrap();
        assert_eq!(discount.money_amount().unwrap().to_string(), "5.00");
    }

    #[test]
    fn test_line_display_name_precedence() {
        let line = LineItem {
            title: Some("Widget".to_string()),
            name: Some("Widget - Large".to_string()),
            ..LineItem::default()
        };
        assert_eq!(line.display_name(), "Widget - Large");

        let line = LineItem {
            title: Some("Widget".to_string()),
            ..LineItem::default()
        };
        assert_eq!(line.display_name(), "Widget");
    }
}
