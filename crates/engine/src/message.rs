//! Outgoing message text.

use chrono::{DateTime, Utc};
use pricebell_core::{alert_bounds, format_price, Rule, Subscription};

/// Periodic price reminder.
pub fn interval_message(asset: &str, price: f64) -> String {
    format!("{} price: {}", asset.to_uppercase(), format_price(price))
}

/// Price band alert.
pub fn alert_message(asset: &str, price: f64, center: f64, band: f64) -> String {
    let (low, high) = alert_bounds(center, band);
    format!(
        "{} is trading at {}, within your alert range around {} ({:.2} - {:.2})",
        asset.to_uppercase(),
        format_price(price),
        format_price(center),
        low,
        high
    )
}

/// One-line summary of a subscription for a "view my rules" reply.
pub fn describe_subscription(sub: &Subscription) -> String {
    match sub.rule {
        Rule::Interval { every_minutes } => format!(
            "{} every {} minutes, last sent: {}",
            sub.asset.to_uppercase(),
            every_minutes,
            format_timestamp(sub.last_fired_at)
        ),
        Rule::Alert { center, band } => {
            let (low, high) = alert_bounds(center, band);
            format!(
                "{}: {} ({:.2} - {:.2})",
                sub.asset.to_uppercase(),
                format_price(center),
                low,
                high
            )
        }
    }
}

fn format_timestamp(at: Option<DateTime<Utc>>) -> String {
    match at {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "never".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_interval_message() {
        assert_eq!(interval_message("btc", 1_250_000.456), "BTC price: 1,250,000.46");
    }

    #[test]
    fn test_alert_message() {
        assert_eq!(
            alert_message("eth", 102.0, 100.0, 5.0),
            "ETH is trading at 102.00, within your alert range around 100.00 (95.00 - 105.00)"
        );
    }

    #[test]
    fn test_alert_message_non_latin_asset() {
        let msg = alert_message("บาท", 1.0, 1.0, 0.5);
        assert!(msg.starts_with("บาท is trading at 1.00"));
    }

    #[test]
    fn test_describe_subscription() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();
        let sub = Subscription::new("U1", "btc", Rule::Interval { every_minutes: 10 }, t0);
        assert_eq!(
            describe_subscription(&sub),
            "BTC every 10 minutes, last sent: 2024-03-01 08:30:00 UTC"
        );

        let mut never = sub.clone();
        never.last_fired_at = None;
        assert!(describe_subscription(&never).ends_with("last sent: never"));

        let alert = Subscription::new(
            "U1",
            "omg",
            Rule::Alert {
                center: 2500.0,
                band: 100.0,
            },
            t0,
        );
        assert_eq!(
            describe_subscription(&alert),
            "OMG: 2,500.00 (2400.00 - 2600.00)"
        );
    }
}
