//! Field mapping from Shopify orders to Cin7 documents.
//!
//! One mapper serves every entry point: the Omni quote, Omni sales order,
//! and Core sale variants all run through the same precedence rules and the
//! same tax conversion, parameterized by [`MapperSettings`] and the target
//! document kind. Mapping is pure: no I/O, no clock, no randomness.
//!
//! Field precedence follows the source document: a shipping-address value
//! wins over the billing-address value, which wins over the customer record;
//! blank strings count as absent and absent values are pruned from the
//! serialized output.

pub mod tax;

use rust_decimal::Decimal;

use crate::types::cin7::{
    CoreAddress, CoreSale, CoreSaleLine, OmniDocument, OmniDocumentKind, OmniLineItem,
};
use crate::types::id::{BranchId, MemberId};
use crate::types::shopify::{Address, LineItem, Order};

use tax::{
    document_rate, ex_tax, freight_level_rate, line_level_rate, order_level_rate, resolve_rate,
    round_money, shipping_level_rate,
};

/// Settings that parameterize the mapper, sourced from configuration.
#[derive(Debug, Clone)]
pub struct MapperSettings {
    /// Currency code used when the order carries none.
    pub default_currency: String,
    /// Fractional tax rate used when no rate is present anywhere on the
    /// order (e.g. `0.1` for 10% GST).
    pub fallback_tax_rate: Decimal,
    /// Omni branch to file documents under.
    pub branch_id: Option<BranchId>,
    /// Core location name for mapped sales.
    pub location: Option<String>,
    /// Core tax rule name for mapped sales.
    pub tax_rule: Option<String>,
}

impl Default for MapperSettings {
    fn default() -> Self {
        Self {
            default_currency: "AUD".to_string(),
            fallback_tax_rate: Decimal::new(1, 1),
            branch_id: None,
            location: None,
            tax_rule: None,
        }
    }
}

/// Map an order to a Cin7 Omni document.
///
/// `member_id` is the pre-resolved Omni contact, when the lookup found one.
#[must_use]
pub fn map_to_omni(
    settings: &MapperSettings,
    kind: OmniDocumentKind,
    order: &Order,
    member_id: Option<MemberId>,
) -> OmniDocument {
    let converter = PriceConverter::for_order(order, settings);

    let ship = order.shipping_address.as_ref();
    let bill = order.billing_address.as_ref();
    let customer = order.customer.as_ref();

    let shipping_line = order.shipping_lines.first();
    let freight_total = shipping_line
        .and_then(|sl| sl.price)
        .filter(|p| !p.is_zero())
        .map(|p| converter.convert(p, shipping_line.and_then(shipping_level_rate)));

    let is_quote = kind == OmniDocumentKind::Quote;

    OmniDocument {
        stage: is_quote.then(|| "New".to_string()),
        probability: is_quote.then(|| Decimal::from(50)),
        member_id,
        first_name: first_of([
            customer.and_then(|c| c.first_name.as_deref()),
            addr(bill, |a| &a.first_name),
            addr(ship, |a| &a.first_name),
        ]),
        last_name: first_of([
            customer.and_then(|c| c.last_name.as_deref()),
            addr(bill, |a| &a.last_name),
            addr(ship, |a| &a.last_name),
        ]),
        company: first_of([addr(bill, |a| &a.company), addr(ship, |a| &a.company)]),
        email: order.contact_email().map(str::to_owned),
        phone: first_of([
            customer.and_then(|c| c.phone.as_deref()),
            addr(ship, |a| &a.phone),
            addr(bill, |a| &a.phone),
        ]),
        delivery_first_name: first_of([addr(ship, |a| &a.first_name), addr(bill, |a| &a.first_name)]),
        delivery_last_name: first_of([addr(ship, |a| &a.last_name), addr(bill, |a| &a.last_name)]),
        delivery_company: first_of([addr(ship, |a| &a.company), addr(bill, |a| &a.company)]),
        delivery_address_1: first_of([addr(ship, |a| &a.address1), addr(bill, |a| &a.address1)]),
        delivery_address_2: first_of([addr(ship, |a| &a.address2), addr(bill, |a| &a.address2)]),
        delivery_city: first_of([addr(ship, |a| &a.city), addr(bill, |a| &a.city)]),
        delivery_state: first_of([addr(ship, |a| &a.province), addr(bill, |a| &a.province)]),
        delivery_postal_code: first_of([addr(ship, |a| &a.zip), addr(bill, |a| &a.zip)]),
        delivery_country: first_of([addr(ship, |a| &a.country), addr(bill, |a| &a.country)]),
        branch_id: settings.branch_id,
        currency_code: Some(
            first_of([order.currency.as_deref()]).unwrap_or_else(|| settings.default_currency.clone()),
        ),
        tax_status: Some("Excl".to_string()),
        tax_rate: Some(round_money(
            document_rate(order, settings.fallback_tax_rate) * Decimal::ONE_HUNDRED,
        )),
        reference: first_of([order.name.as_deref()]),
        customer_order_no: first_of([order.name.as_deref()]),
        internal_comments: first_of([order.note.as_deref()]),
        discount_total: order.order_discount().map(|d| converter.convert(d, None)),
        freight_total,
        freight_description: shipping_line.and_then(|sl| first_of([sl.title.as_deref()])),
        line_items: order
            .line_items
            .iter()
            .map(|line| omni_line(line, &converter))
            .collect(),
    }
}

/// Map an order to a Cin7 Core sale.
///
/// `customer_id` is the pre-resolved Core customer, when the lookup found one.
#[must_use]
pub fn map_to_core_sale(
    settings: &MapperSettings,
    order: &Order,
    customer_id: Option<String>,
) -> CoreSale {
    let converter = PriceConverter::for_order(order, settings);

    let ship = order.shipping_address.as_ref();
    let bill = order.billing_address.as_ref();
    let customer = order.customer.as_ref();

    let first_name = first_of([
        customer.and_then(|c| c.first_name.as_deref()),
        addr(bill, |a| &a.first_name),
        addr(ship, |a| &a.first_name),
    ]);
    let last_name = first_of([
        customer.and_then(|c| c.last_name.as_deref()),
        addr(bill, |a| &a.last_name),
        addr(ship, |a| &a.last_name),
    ]);
    let contact = match (&first_name, &last_name) {
        (Some(first), Some(last)) => Some(format!("{first} {last}")),
        (Some(single), None) | (None, Some(single)) => Some(single.clone()),
        (None, None) => None,
    };
    let company = first_of([addr(bill, |a| &a.company), addr(ship, |a| &a.company)]);

    CoreSale {
        customer: company.or_else(|| contact.clone()),
        customer_id,
        contact,
        email: order.contact_email().map(str::to_owned),
        phone: first_of([
            customer.and_then(|c| c.phone.as_deref()),
            addr(ship, |a| &a.phone),
            addr(bill, |a| &a.phone),
        ]),
        customer_reference: first_of([order.name.as_deref()]),
        currency: Some(
            first_of([order.currency.as_deref()]).unwrap_or_else(|| settings.default_currency.clone()),
        ),
        tax_rule: settings.tax_rule.clone(),
        tax_inclusive: false,
        location: settings.location.clone(),
        note: first_of([order.note.as_deref()]),
        billing_address: prune_address(core_address(bill, ship)),
        shipping_address: prune_address(core_address(ship, bill)),
        lines: order
            .line_items
            .iter()
            .map(|line| core_line(line, &converter))
            .collect(),
    }
}

/// Converts presented amounts to exclusive money for one order.
///
/// Holds the order-wide rate sources so each component only supplies its own
/// line-level rate; the precedence chain (line, order, freight, fallback) is
/// applied per component by [`tax::resolve_rate`].
struct PriceConverter {
    inclusive: bool,
    order_rate: Option<Decimal>,
    freight_rate: Option<Decimal>,
    fallback: Decimal,
}

impl PriceConverter {
    fn for_order(order: &Order, settings: &MapperSettings) -> Self {
        Self {
            inclusive: order.taxes_included,
            order_rate: order_level_rate(order),
            freight_rate: freight_level_rate(order),
            fallback: settings.fallback_tax_rate,
        }
    }

    /// Convert one amount using the component's own rate where present.
    fn convert(&self, amount: Decimal, own_rate: Option<Decimal>) -> Decimal {
        if self.inclusive {
            let rate = resolve_rate(own_rate, self.order_rate, self.freight_rate, self.fallback);
            ex_tax(amount, rate)
        } else {
            round_money(amount)
        }
    }
}

fn omni_line(line: &LineItem, converter: &PriceConverter) -> OmniLineItem {
    let own_rate = line_level_rate(line);
    let unit_price = converter.convert(line.price.unwrap_or(Decimal::ZERO), own_rate);

    OmniLineItem {
        code: first_of([line.sku.as_deref()]).unwrap_or_default(),
        name: line.display_name().to_owned(),
        qty: Decimal::from(line.quantity),
        unit_price: Some(unit_price),
        discount: line.discount().map(|d| converter.convert(d, own_rate)),
    }
}

fn core_line(line: &LineItem, converter: &PriceConverter) -> CoreSaleLine {
    let own_rate = line_level_rate(line);

    CoreSaleLine {
        sku: first_of([line.sku.as_deref()]).unwrap_or_default(),
        name: line.display_name().to_owned(),
        quantity: Decimal::from(line.quantity),
        price: converter.convert(line.price.unwrap_or(Decimal::ZERO), own_rate),
        discount: line.discount().map(|d| converter.convert(d, own_rate)),
    }
}

fn core_address(preferred: Option<&Address>, fallback: Option<&Address>) -> CoreAddress {
    CoreAddress {
        line_1: first_of([addr(preferred, |a| &a.address1), addr(fallback, |a| &a.address1)]),
        line_2: first_of([addr(preferred, |a| &a.address2), addr(fallback, |a| &a.address2)]),
        city: first_of([addr(preferred, |a| &a.city), addr(fallback, |a| &a.city)]),
        state: first_of([addr(preferred, |a| &a.province), addr(fallback, |a| &a.province)]),
        postcode: first_of([addr(preferred, |a| &a.zip), addr(fallback, |a| &a.zip)]),
        country: first_of([addr(preferred, |a| &a.country), addr(fallback, |a| &a.country)]),
    }
}

fn prune_address(address: CoreAddress) -> Option<CoreAddress> {
    (!address.is_empty()).then_some(address)
}

/// The field-precedence primitive: the first non-blank candidate wins.
fn first_of<const N: usize>(candidates: [Option<&str>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_owned)
}

fn addr<'a>(
    address: Option<&'a Address>,
    field: impl FnOnce(&'a Address) -> &'a Option<String>,
) -> Option<&'a str> {
    address.and_then(|a| field(a).as_deref())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::shopify::{AppliedDiscount, Customer, ShippingLine, TaxLine};
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn tax_line(rate: &str) -> TaxLine {
        TaxLine {
            rate: Some(dec(rate)),
            ..TaxLine::default()
        }
    }

    fn settings() -> MapperSettings {
        MapperSettings::default()
    }

    #[test]
    fn test_inclusive_line_converts_to_exclusive() {
        // 110.00 inclusive at a 10% line-level rate maps to 100.00 exclusive
        // with the document rate reported as 10.
        let order = Order {
            taxes_included: true,
            line_items: vec![LineItem {
                sku: Some("LM-100".to_string()),
                title: Some("Laser".to_string()),
                quantity: 1,
                price: Some(dec("110.00")),
                tax_lines: vec![tax_line("0.1")],
                ..LineItem::default()
            }],
            ..Order::default()
        };

        let doc = map_to_omni(&settings(), OmniDocumentKind::Quote, &order, None);
        assert_eq!(doc.tax_status.as_deref(), Some("Excl"));
        assert_eq!(doc.tax_rate, Some(dec("10.00")));
        let line = doc.line_items.first().unwrap();
        assert_eq!(line.unit_price, Some(dec("100.00")));
    }

    #[test]
    fn test_exclusive_prices_pass_through() {
        let order = Order {
            taxes_included: false,
            line_items: vec![LineItem {
                quantity: 2,
                price: Some(dec("45.50")),
                ..LineItem::default()
            }],
            ..Order::default()
        };

        let doc = map_to_omni(&settings(), OmniDocumentKind::SalesOrder, &order, None);
        let line = doc.line_items.first().unwrap();
        assert_eq!(line.unit_price, Some(dec("45.50")));
        assert_eq!(line.qty, dec("2"));
        // Sales orders carry no pipeline fields.
        assert!(doc.stage.is_none());
        assert!(doc.probability.is_none());
    }

    #[test]
    fn test_each_component_uses_its_own_rate() {
        // Line converts at its own 20% rate, shipping at its own 10% rate,
        // order discount at the order-level 5% rate.
        let order = Order {
            taxes_included: true,
            tax_lines: vec![tax_line("0.05")],
            line_items: vec![LineItem {
                quantity: 1,
                price: Some(dec("120.00")),
                tax_lines: vec![tax_line("0.2")],
                ..LineItem::default()
            }],
            shipping_lines: vec![ShippingLine {
                title: Some("Express".to_string()),
                price: Some(dec("11.00")),
                tax_lines: vec![tax_line("0.1")],
            }],
            applied_discount: Some(AppliedDiscount {
                amount: Some(dec("21.00")),
                ..AppliedDiscount::default()
            }),
            ..Order::default()
        };

        let doc = map_to_omni(&settings(), OmniDocumentKind::Quote, &order, None);
        assert_eq!(doc.line_items.first().unwrap().unit_price, Some(dec("100.00")));
        assert_eq!(doc.freight_total, Some(dec("10.00")));
        assert_eq!(doc.discount_total, Some(dec("20.00")));
        assert_eq!(doc.freight_description.as_deref(), Some("Express"));
    }

    #[test]
    fn test_line_without_own_rate_uses_order_rate() {
        let order = Order {
            taxes_included: true,
            tax_lines: vec![tax_line("0.1")],
            line_items: vec![LineItem {
                quantity: 1,
                price: Some(dec("110.00")),
                ..LineItem::default()
            }],
            ..Order::default()
        };

        let doc = map_to_omni(&settings(), OmniDocumentKind::Quote, &order, None);
        assert_eq!(doc.line_items.first().unwrap().unit_price, Some(dec("100.00")));
    }

    #[test]
    fn test_missing_price_defaults_to_zero() {
        let order = Order {
            line_items: vec![LineItem {
                quantity: 4,
                ..LineItem::default()
            }],
            ..Order::default()
        };

        let doc = map_to_omni(&settings(), OmniDocumentKind::Quote, &order, None);
        assert_eq!(doc.line_items.first().unwrap().unit_price, Some(Decimal::ZERO));
    }

    #[test]
    fn test_delivery_address_prefers_shipping_then_billing() {
        let order = Order {
            billing_address: Some(Address {
                first_name: Some("Billing".to_string()),
                city: Some("Melbourne".to_string()),
                country: Some("Australia".to_string()),
                ..Address::default()
            }),
            shipping_address: Some(Address {
                city: Some("Sydney".to_string()),
                ..Address::default()
            }),
            ..Order::default()
        };

        let doc = map_to_omni(&settings(), OmniDocumentKind::Quote, &order, None);
        // Field-level precedence: shipping city wins, billing fills the gaps.
        assert_eq!(doc.delivery_city.as_deref(), Some("Sydney"));
        assert_eq!(doc.delivery_country.as_deref(), Some("Australia"));
        assert_eq!(doc.delivery_first_name.as_deref(), Some("Billing"));
    }

    #[test]
    fn test_blank_strings_are_pruned() {
        let order = Order {
            shipping_address: Some(Address {
                company: Some("   ".to_string()),
                ..Address::default()
            }),
            ..Order::default()
        };

        let doc = map_to_omni(&settings(), OmniDocumentKind::Quote, &order, None);
        assert!(doc.delivery_company.is_none());

        let value = serde_json::to_value(&doc).unwrap();
        assert!(!value.as_object().unwrap().contains_key("deliveryCompany"));
    }

    #[test]
    fn test_member_and_branch_carried_through() {
        let order = Order::default();
        let with_branch = MapperSettings {
            branch_id: Some(BranchId::new(3)),
            ..MapperSettings::default()
        };

        let doc = map_to_omni(
            &with_branch,
            OmniDocumentKind::Quote,
            &order,
            Some(MemberId::new(41)),
        );
        assert_eq!(doc.member_id, Some(MemberId::new(41)));
        assert_eq!(doc.branch_id, Some(BranchId::new(3)));
    }

    #[test]
    fn test_currency_falls_back_to_default() {
        let order = Order::default();
        let doc = map_to_omni(&settings(), OmniDocumentKind::Quote, &order, None);
        assert_eq!(doc.currency_code.as_deref(), Some("AUD"));

        let order = Order {
            currency: Some("NZD".to_string()),
            ..Order::default()
        };
        let doc = map_to_omni(&settings(), OmniDocumentKind::Quote, &order, None);
        assert_eq!(doc.currency_code.as_deref(), Some("NZD"));
    }

    #[test]
    fn test_core_sale_mapping() {
        let order = Order {
            name: Some("#1001".to_string()),
            email: Some("buyer@example.com".to_string()),
            taxes_included: true,
            customer: Some(Customer {
                first_name: Some("Ada".to_string()),
                last_name: Some("Lovelace".to_string()),
                phone: Some("+61 400 000 000".to_string()),
                ..Customer::default()
            }),
            billing_address: Some(Address {
                company: Some("Acme Pty Ltd".to_string()),
                address1: Some("1 George St".to_string()),
                city: Some("Sydney".to_string()),
                province: Some("NSW".to_string()),
                zip: Some("2000".to_string()),
                country: Some("Australia".to_string()),
                ..Address::default()
            }),
            line_items: vec![LineItem {
                sku: Some("LM-100".to_string()),
                title: Some("Laser".to_string()),
                quantity: 1,
                price: Some(dec("110.00")),
                tax_lines: vec![tax_line("0.1")],
                ..LineItem::default()
            }],
            ..Order::default()
        };

        let core_settings = MapperSettings {
            location: Some("Main Warehouse".to_string()),
            tax_rule: Some("Tax on Sales".to_string()),
            ..MapperSettings::default()
        };
        let sale = map_to_core_sale(&core_settings, &order, Some("c-9".to_string()));

        assert_eq!(sale.customer.as_deref(), Some("Acme Pty Ltd"));
        assert_eq!(sale.customer_id.as_deref(), Some("c-9"));
        assert_eq!(sale.contact.as_deref(), Some("Ada Lovelace"));
        assert_eq!(sale.customer_reference.as_deref(), Some("#1001"));
        assert!(!sale.tax_inclusive);
        assert_eq!(sale.location.as_deref(), Some("Main Warehouse"));
        assert_eq!(sale.lines.first().unwrap().price, dec("100.00"));
        // Billing was the only address, so both blocks resolve to it.
        let shipping = sale.shipping_address.as_ref().unwrap();
        assert_eq!(shipping.city.as_deref(), Some("Sydney"));
    }

    #[test]
    fn test_core_sale_without_company_uses_contact_name() {
        let order = Order {
            customer: Some(Customer {
                first_name: Some("Ada".to_string()),
                last_name: Some("Lovelace".to_string()),
                ..Customer::default()
            }),
            ..Order::default()
        };

        let sale = map_to_core_sale(&settings(), &order, None);
        assert_eq!(sale.customer.as_deref(), Some("Ada Lovelace"));
        assert!(sale.shipping_address.is_none());
    }
}
