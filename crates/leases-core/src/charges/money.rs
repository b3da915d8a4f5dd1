//! Monetary arithmetic. Every amount in the system is a [`Decimal`] rounded
//! to the cent; floats never appear on a money path.

use rust_decimal::{Decimal, RoundingStrategy};

/// Round to two decimal places, midpoints away from zero.
pub fn quantize(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Extract the GST component from a GST-inclusive total.
///
/// `rate` is a percentage (e.g. `10` for 10%). The component is
/// `rate / (100 + rate) * total`, quantized to the cent.
pub fn gst_from_total(total_incl_tax: Decimal, rate: Decimal) -> Decimal {
    let rate = quantize(rate);
    quantize(rate / (Decimal::ONE_HUNDRED + rate) * total_incl_tax)
}

/// GST-exclusive value of a GST-inclusive total. Returns the total unchanged
/// when the charge is GST free.
pub fn excl_gst(total_incl_tax: Decimal, rate: Decimal, gst_free: bool) -> Decimal {
    if gst_free {
        return quantize(total_incl_tax);
    }
    quantize(total_incl_tax - gst_from_total(total_incl_tax, rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn gst_is_one_eleventh_at_ten_percent() {
        assert_eq!(gst_from_total(dec!(110.00), dec!(10)), dec!(10.00));
        assert_eq!(gst_from_total(dec!(100.00), dec!(10)), dec!(9.09));
    }

    #[test]
    fn quantize_rounds_midpoints_away_from_zero() {
        assert_eq!(quantize(dec!(10.005)), dec!(10.01));
        assert_eq!(quantize(dec!(-10.005)), dec!(-10.01));
        assert_eq!(quantize(dec!(10.004)), dec!(10.00));
    }

    #[test]
    fn gst_free_totals_pass_through() {
        assert_eq!(excl_gst(dec!(550.00), dec!(10), true), dec!(550.00));
        assert_eq!(excl_gst(dec!(550.00), dec!(10), false), dec!(500.00));
    }
}
