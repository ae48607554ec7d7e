//! Human-readable breakdown of a remaining lock duration.

use chrono::Duration;

const YEAR_SECONDS: i64 = 365 * 24 * 60 * 60;
const MONTH_SECONDS: i64 = 30 * 24 * 60 * 60;
const DAY_SECONDS: i64 = 24 * 60 * 60;
const HOUR_SECONDS: i64 = 60 * 60;
const MINUTE_SECONDS: i64 = 60;

/// Format a remaining duration as a years/months/days/hours/minutes/seconds
/// breakdown, skipping zero units. Pure; no clock access.
#[must_use]
pub fn format_remaining(remaining: Duration) -> String {
    let mut seconds = remaining.num_seconds().max(0);

    let units = [
        ("year", YEAR_SECONDS),
        ("month", MONTH_SECONDS),
        ("day", DAY_SECONDS),
        ("hour", HOUR_SECONDS),
        ("minute", MINUTE_SECONDS),
        ("second", 1),
    ];

    let mut parts = Vec::new();
    for (name, unit_seconds) in units {
        let count = seconds / unit_seconds;
        seconds %= unit_seconds;
        if count > 0 {
            let plural = if count == 1 { "" } else { "s" };
            parts.push(format!("{count} {name}{plural}"));
        }
    }

    if parts.is_empty() {
        "0 seconds".to_string()
    } else {
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_negative_render_as_zero_seconds() {
        assert_eq!(format_remaining(Duration::zero()), "0 seconds");
        assert_eq!(format_remaining(Duration::seconds(-5)), "0 seconds");
    }

    #[test]
    fn single_units_are_singular() {
        assert_eq!(format_remaining(Duration::seconds(1)), "1 second");
        assert_eq!(format_remaining(Duration::minutes(1)), "1 minute");
        assert_eq!(format_remaining(Duration::hours(1)), "1 hour");
        assert_eq!(format_remaining(Duration::days(1)), "1 day");
    }

    #[test]
    fn mixed_breakdown_skips_zero_units() {
        let duration = Duration::days(2) + Duration::minutes(5);
        assert_eq!(format_remaining(duration), "2 days 5 minutes");
    }

    #[test]
    fn large_durations_roll_into_months_and_years() {
        let duration = Duration::days(365 + 30 + 1) + Duration::hours(3);
        assert_eq!(format_remaining(duration), "1 year 1 month 1 day 3 hours");
    }

    #[test]
    fn full_breakdown() {
        let duration = Duration::hours(25) + Duration::minutes(2) + Duration::seconds(3);
        assert_eq!(format_remaining(duration), "1 day 1 hour 2 minutes 3 seconds");
    }
}
