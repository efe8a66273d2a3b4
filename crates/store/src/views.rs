//! Pure presentation computations over mirror state.
//!
//! All money math stays in [`Decimal`]; totals are exact, never floated.

use rust_decimal::Decimal;

use crate::api::types::CartLine;

/// Aggregates over the cart, computed locally from the mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartTotals {
    /// Number of distinct cart lines.
    pub item_count: usize,
    /// Sum of quantities across all lines.
    pub total_quantity: u32,
    /// Exact total price.
    pub total_price: Decimal,
}

/// Exact subtotal for one cart line.
#[must_use]
pub fn line_subtotal(line: &CartLine) -> Decimal {
    line.product.price * Decimal::from(line.quantity)
}

/// Totals across the whole cart.
#[must_use]
pub fn cart_totals(lines: &[CartLine]) -> CartTotals {
    CartTotals {
        item_count: lines.len(),
        total_quantity: lines.iter().map(|l| l.quantity).sum(),
        total_price: lines.iter().map(line_subtotal).sum(),
    }
}

/// Display form of a price, two decimal places.
#[must_use]
pub fn format_price(amount: Decimal) -> String {
    format!("${amount:.2}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::sample_line;
    use orchard_core::ProductId;

    fn line_priced(product_id: i64, line_id: i64, price: &str, quantity: u32) -> CartLine {
        let mut line = sample_line(product_id, line_id, quantity);
        line.product.price = price.parse().unwrap();
        line.subtotal = line.product.price * Decimal::from(quantity);
        line
    }

    #[test]
    fn test_subtotal_is_exact() {
        // 3 x 8.50 must be exactly 25.50, not 25.499999.
        let line = line_priced(1, 1, "8.50", 3);
        assert_eq!(line_subtotal(&line), Decimal::new(2550, 2));
        assert_eq!(format_price(line_subtotal(&line)), "$25.50");
    }

    #[test]
    fn test_totals_over_empty_cart() {
        let totals = cart_totals(&[]);
        assert_eq!(totals.item_count, 0);
        assert_eq!(totals.total_quantity, 0);
        assert_eq!(totals.total_price, Decimal::ZERO);
    }

    #[test]
    fn test_totals_count_distinct_lines() {
        let lines = vec![
            line_priced(1, 1, "8.50", 3),
            line_priced(2, 2, "0.10", 7),
        ];
        let totals = cart_totals(&lines);

        assert_eq!(totals.item_count, 2);
        assert_eq!(totals.total_quantity, 10);
        assert_eq!(totals.total_price, Decimal::new(2620, 2)); // 25.50 + 0.70
        assert_eq!(lines[0].product.id, ProductId::new(1));
    }

    #[test]
    fn test_format_price_pads_decimals() {
        assert_eq!(format_price(Decimal::new(5, 0)), "$5.00");
        assert_eq!(format_price(Decimal::new(125, 1)), "$12.50");
    }
}
