use rust_decimal::{Decimal, RoundingStrategy};

/// Round half-up to `dp` decimal places. Applied to every price and
/// quantity at the venue boundary; nothing inside the engine is rounded.
#[inline]
pub fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// Parse a decimal out of a JSON field that may be a string ("61000.5")
/// or a bare number. Venue payloads mix both.
pub fn decimal_field(v: &serde_json::Value) -> Option<Decimal> {
    if let Some(s) = v.as_str() {
        return s.parse().ok();
    }
    if v.is_number() {
        return v.to_string().parse().ok();
    }
    None
}
