use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use super::value_objects::{DeliveryFee, DeliveryMode, FeeKind, FeeRule};

// ============================================================================
// Fee Calculator
// ============================================================================
//
// Pure functions: rule selection, fee computation per delivery mode and fee
// recomputation after items are cancelled.
//
// ============================================================================

/// Most recent active rule owned by `vendor_id` (`None` = platform-wide rule)
pub fn select_fee_rule(rules: &[FeeRule], vendor_id: Option<Uuid>) -> Option<&FeeRule> {
    rules
        .iter()
        .filter(|rule| rule.active && rule.vendor_id == vendor_id)
        .max_by_key(|rule| rule.created_at)
}

pub fn percentage_of(subtotal: Decimal, percent: Decimal) -> Decimal {
    (subtotal * percent / Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn fee_from_rule(rule: &FeeRule, subtotal: Decimal) -> DeliveryFee {
    let amount = match rule.kind {
        FeeKind::Fixed => rule.value,
        FeeKind::Percentage => percentage_of(subtotal, rule.value),
    };
    DeliveryFee { kind: rule.kind, value: rule.value, amount }
}

/// Delivery fee at checkout.
///
/// `rule` is the vendor rule for vendor-direct delivery and the platform rule
/// for supermarket and vendor delivery. Collection is always free.
pub fn compute_delivery_fee(
    mode: DeliveryMode,
    rule: Option<&FeeRule>,
    subtotal: Decimal,
    default_fee: Decimal,
) -> DeliveryFee {
    match mode {
        DeliveryMode::Collect => DeliveryFee::zero(),
        DeliveryMode::VendorDirect => rule
            .map(|rule| fee_from_rule(rule, subtotal))
            .unwrap_or_else(DeliveryFee::zero),
        DeliveryMode::SupermarketDelivery | DeliveryMode::VendorDelivery => rule
            .map(|rule| fee_from_rule(rule, subtotal))
            .unwrap_or(DeliveryFee {
                kind: FeeKind::Fixed,
                value: default_fee,
                amount: default_fee,
            }),
    }
}

/// Fee after the subtotal changed: percentages follow the subtotal, a fixed
/// fee is kept until nothing is left to deliver.
pub fn recompute_fee(fee: &DeliveryFee, subtotal: Decimal) -> DeliveryFee {
    let amount = match fee.kind {
        FeeKind::Percentage => percentage_of(subtotal, fee.value),
        FeeKind::Fixed if subtotal.is_zero() => Decimal::ZERO,
        FeeKind::Fixed => fee.value,
    };
    DeliveryFee { kind: fee.kind, value: fee.value, amount }
}
