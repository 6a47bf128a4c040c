use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

/// Decimal places used when quantizing amounts in the given currency.
pub fn currency_precision(currency: &str) -> u32 {
    match currency {
        "BIF" | "CLP" | "DJF" | "GNF" | "ISK" | "JPY" | "KMF" | "KRW" | "PYG" | "RWF"
        | "UGX" | "VND" | "VUV" | "XAF" | "XOF" | "XPF" => 0,
        "BHD" | "IQD" | "JOD" | "KWD" | "LYD" | "OMR" | "TND" => 3,
        _ => 2,
    }
}

/// Rounds an amount to the currency's precision, ties away from zero.
pub fn quantize_price(amount: Decimal, currency: &str) -> Decimal {
    amount.round_dp_with_strategy(
        currency_precision(currency),
        RoundingStrategy::MidpointAwayFromZero,
    )
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Voucher,
    Manual,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DiscountValueType {
    Fixed,
    Percentage,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VoucherScope {
    EntireOrder,
    Shipping,
}

/// A single discount as stored on the order, before realized amounts are
/// computed.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscountSpec {
    pub id: Uuid,
    pub discount_type: DiscountType,
    pub value_type: DiscountValueType,
    pub value: Decimal,
    pub voucher_scope: Option<VoucherScope>,
}

/// Order amounts a discount pass starts from and mutates.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAmounts {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub currency: String,
}

impl OrderAmounts {
    pub fn total(&self) -> Decimal {
        self.subtotal + self.shipping
    }
}

/// Outcome of applying all order discounts: remaining amounts plus the
/// realized value of each discount in application order.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscountedAmounts {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    /// (discount id, realized amount), in the order discounts were applied.
    pub realized: Vec<(Uuid, Decimal)>,
}

/// Applies a fixed or percentage value to a base amount. The result is
/// quantized and never exceeds the base.
pub fn apply_discount_to_value(
    value: Decimal,
    value_type: DiscountValueType,
    base: Decimal,
    currency: &str,
) -> Decimal {
    let raw = match value_type {
        DiscountValueType::Fixed => value,
        DiscountValueType::Percentage => base * value / Decimal::ONE_HUNDRED,
    };
    quantize_price(raw.min(base).max(Decimal::ZERO), currency)
}

/// Splits a fixed manual discount between subtotal and shipping in
/// proportion to their share of the combined total. The two components
/// always sum to the capped discount amount; rounding drift lands on the
/// shipping side unless that would overflow shipping, in which case it is
/// pushed back onto the subtotal.
fn split_fixed_discount(
    value: Decimal,
    subtotal: Decimal,
    shipping: Decimal,
    currency: &str,
) -> (Decimal, Decimal) {
    let combined = subtotal + shipping;
    if combined <= Decimal::ZERO {
        return (Decimal::ZERO, Decimal::ZERO);
    }
    let capped = quantize_price(value.min(combined), currency);
    let mut subtotal_part = quantize_price(capped * subtotal / combined, currency).min(subtotal);
    let mut shipping_part = capped - subtotal_part;
    if shipping_part > shipping {
        subtotal_part = (subtotal_part + (shipping_part - shipping)).min(subtotal);
        shipping_part = capped - subtotal_part;
    }
    (subtotal_part, shipping_part)
}

fn apply_one(
    discount: &DiscountSpec,
    subtotal: &mut Decimal,
    shipping: &mut Decimal,
    currency: &str,
) -> Decimal {
    match discount.discount_type {
        DiscountType::Voucher => match discount.voucher_scope {
            Some(VoucherScope::Shipping) => {
                let amount = apply_discount_to_value(
                    discount.value,
                    discount.value_type,
                    *shipping,
                    currency,
                );
                *shipping -= amount;
                amount
            }
            _ => {
                let amount = apply_discount_to_value(
                    discount.value,
                    discount.value_type,
                    *subtotal,
                    currency,
                );
                *subtotal -= amount;
                amount
            }
        },
        DiscountType::Manual => match discount.value_type {
            DiscountValueType::Percentage => {
                let subtotal_part = apply_discount_to_value(
                    discount.value,
                    DiscountValueType::Percentage,
                    *subtotal,
                    currency,
                );
                let shipping_part = apply_discount_to_value(
                    discount.value,
                    DiscountValueType::Percentage,
                    *shipping,
                    currency,
                );
                *subtotal -= subtotal_part;
                *shipping -= shipping_part;
                subtotal_part + shipping_part
            }
            DiscountValueType::Fixed => {
                let (subtotal_part, shipping_part) =
                    split_fixed_discount(discount.value, *subtotal, *shipping, currency);
                *subtotal -= subtotal_part;
                *shipping -= shipping_part;
                subtotal_part + shipping_part
            }
        },
    }
}

/// Applies every order discount to the given amounts. Vouchers apply
/// before manual discounts regardless of creation order; within each group
/// the incoming order is preserved.
pub fn apply_order_discounts(
    amounts: &OrderAmounts,
    discounts: &[DiscountSpec],
) -> DiscountedAmounts {
    let currency = amounts.currency.as_str();
    let mut subtotal = amounts.subtotal;
    let mut shipping = amounts.shipping;
    let mut realized = Vec::with_capacity(discounts.len());

    for discount in discounts
        .iter()
        .filter(|d| d.discount_type == DiscountType::Voucher)
        .chain(
            discounts
                .iter()
                .filter(|d| d.discount_type == DiscountType::Manual),
        )
    {
        let amount = apply_one(discount, &mut subtotal, &mut shipping, currency);
        realized.push((discount.id, amount));
    }

    DiscountedAmounts {
        subtotal,
        shipping,
        realized,
    }
}

/// Distributes a subtotal-level discount across lines in proportion to
/// each line's share of the undiscounted subtotal.
///
/// Every line but the last gets its quantized proportional share, capped
/// at the line total. The last line absorbs the rounding remainder so the
/// shares sum exactly to the discount; if that would push the last line
/// past its own total, the overflow walks back onto earlier lines with
/// spare capacity. Returns the per-line discount amounts in input order.
pub fn allocate_subtotal_discount(
    line_totals: &[Decimal],
    discount: Decimal,
    currency: &str,
) -> Vec<Decimal> {
    let subtotal: Decimal = line_totals.iter().copied().sum();
    if line_totals.is_empty() || subtotal <= Decimal::ZERO || discount <= Decimal::ZERO {
        return vec![Decimal::ZERO; line_totals.len()];
    }
    let discount = discount.min(subtotal);

    let mut shares = Vec::with_capacity(line_totals.len());
    let mut allocated = Decimal::ZERO;
    for (idx, &line_total) in line_totals.iter().enumerate() {
        let share = if idx + 1 == line_totals.len() {
            (discount - allocated).clamp(Decimal::ZERO, line_total)
        } else {
            quantize_price(line_total * discount / subtotal, currency).min(line_total)
        };
        allocated += share;
        shares.push(share);
    }

    // Rounding can leave the shares off the discount in either direction:
    // a run of rounded-down shares leaves more remainder than the last
    // line holds, a run of rounded-up shares overshoots. Walk back over
    // the lines settling the difference; the discount never exceeds the
    // subtotal, so a valid allocation always exists.
    let mut off_by = discount - allocated;
    for (share, &line_total) in shares.iter_mut().zip(line_totals.iter()).rev() {
        if off_by == Decimal::ZERO {
            break;
        }
        if off_by > Decimal::ZERO {
            let taken = off_by.min(line_total - *share);
            *share += taken;
            off_by -= taken;
        } else {
            let returned = (-off_by).min(*share);
            *share -= returned;
            off_by += returned;
        }
    }
    shares
}
