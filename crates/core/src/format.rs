//! Number formatting for outgoing messages.

use num_format::{Locale, ToFormattedString};

/// Format a price with two decimal places and `,` thousands separators.
pub fn format_price(price: f64) -> String {
    if !price.is_finite() {
        return price.to_string();
    }
    let scaled = (price.abs() * 100.0).round();
    // Beyond u64 cents the cast would saturate
    if scaled >= u64::MAX as f64 {
        return format!("{:.2}", price);
    }
    let cents = scaled as u64;
    let sign = if price < 0.0 && cents > 0 { "-" } else { "" };
    format!(
        "{}{}.{:02}",
        sign,
        (cents / 100).to_formatted_string(&Locale::en),
        cents % 100
    )
}
