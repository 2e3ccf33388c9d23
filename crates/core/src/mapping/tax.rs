//! Tax rate resolution and inclusive-to-exclusive price conversion.
//!
//! Cin7 documents carry exclusive prices, Shopify orders may present either.
//! The precedence rules here decide which rate strips the tax out of each
//! priced component; downstream accounting depends on them, so they are kept
//! as standalone functions with exhaustive tests rather than inlined into
//! the mapper.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::types::shopify::{LineItem, Order, ShippingLine, TaxLine};

/// Round a money amount to two decimal places, half away from zero.
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert a tax-inclusive amount to its exclusive equivalent:
/// `exclusive = inclusive / (1 + rate)`, rounded to two decimal places.
///
/// A non-positive rate leaves the amount unchanged apart from rounding.
#[must_use]
pub fn ex_tax(inclusive: Decimal, rate: Decimal) -> Decimal {
    if rate <= Decimal::ZERO {
        return round_money(inclusive);
    }
    round_money(inclusive / (Decimal::ONE + rate))
}

/// Re-apply tax to an exclusive amount.
#[must_use]
pub fn inc_tax(exclusive: Decimal, rate: Decimal) -> Decimal {
    if rate <= Decimal::ZERO {
        return round_money(exclusive);
    }
    round_money(exclusive * (Decimal::ONE + rate))
}

/// Pick the effective rate for one priced component.
///
/// Precedence: the component's own line-level rate, then the order-level
/// rate, then the freight-level rate, then the configured fallback.
#[must_use]
pub fn resolve_rate(
    line: Option<Decimal>,
    order: Option<Decimal>,
    freight: Option<Decimal>,
    fallback: Decimal,
) -> Decimal {
    line.or(order).or(freight).unwrap_or(fallback)
}

/// First explicit rate among a set of tax lines.
fn first_rate(tax_lines: &[TaxLine]) -> Option<Decimal> {
    tax_lines.iter().find_map(|t| t.rate)
}

/// The order-level rate: the first explicit rate on the order's own tax lines.
#[must_use]
pub fn order_level_rate(order: &Order) -> Option<Decimal> {
    first_rate(&order.tax_lines)
}

/// The freight-level rate: the first explicit rate across the order's
/// shipping lines.
#[must_use]
pub fn freight_level_rate(order: &Order) -> Option<Decimal> {
    order
        .shipping_lines
        .iter()
        .find_map(|sl| first_rate(&sl.tax_lines))
}

/// A line item's own rate.
#[must_use]
pub fn line_level_rate(line: &LineItem) -> Option<Decimal> {
    first_rate(&line.tax_lines)
}

/// A shipping line's own rate.
#[must_use]
pub fn shipping_level_rate(line: &ShippingLine) -> Option<Decimal> {
    first_rate(&line.tax_lines)
}

/// The rate reported on the document itself (as opposed to the rate used to
/// strip tax from an individual component). Resolution order: order-level
/// tax lines, then the first per-line tax line, then shipping-line tax
/// lines, then the configured fallback.
#[must_use]
pub fn document_rate(order: &Order, fallback: Decimal) -> Decimal {
    order_level_rate(order)
        .or_else(|| order.line_items.iter().find_map(line_level_rate))
        .or_else(|| freight_level_rate(order))
        .unwrap_or(fallback)
}
