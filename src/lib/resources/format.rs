//! Display strings shared by the resource models.
//!
//! Every helper takes `now` explicitly so list rendering and tests agree on
//! the reference instant.

use chrono::{DateTime, Utc};

fn plural(n: i64) -> &'static str {
    if n > 1 { "s" } else { "" }
}

/// Short age used in the container list: "3d ago", "2h ago", "5m ago".
pub fn compact_age(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(created_at);

    if duration.num_days() > 0 {
        format!("{}d ago", duration.num_days())
    } else if duration.num_hours() > 0 {
        format!("{}h ago", duration.num_hours())
    } else if duration.num_minutes() > 0 {
        format!("{}m ago", duration.num_minutes())
    } else {
        "just now".to_string()
    }
}

/// Long age used for images, volumes and networks: "2 months ago", "1 week ago".
pub fn relative_age(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(created_at);
    let days = duration.num_days();
    let hours = duration.num_hours();

    if days >= 30 {
        let months = days / 30;
        format!("{} month{} ago", months, plural(months))
    } else if days >= 7 {
        let weeks = days / 7;
        format!("{} week{} ago", weeks, plural(weeks))
    } else if days > 0 {
        format!("{} day{} ago", days, plural(days))
    } else if hours > 0 {
        format!("{} hour{} ago", hours, plural(hours))
    } else {
        "just now".to_string()
    }
}

/// Decimal size with GB above 1000 MB, e.g. "187 MB", "1.2 GB".
pub fn decimal_size(bytes: u64) -> String {
    let mb = bytes as f64 / 1_000_000.0;
    if mb >= 1000.0 {
        format!("{:.1} GB", mb / 1000.0)
    } else {
        format!("{:.0} MB", mb)
    }
}

/// Like [`decimal_size`] but falls through to KB for small values and
/// "N/A" when the daemon did not report a size.
pub fn optional_size(bytes: Option<u64>) -> String {
    match bytes {
        Some(bytes) => {
            let mb = bytes as f64 / 1_000_000.0;
            if mb >= 1000.0 {
                format!("{:.1} GB", mb / 1000.0)
            } else if mb >= 1.0 {
                format!("{:.0} MB", mb)
            } else {
                format!("{:.0} KB", bytes as f64 / 1000.0)
            }
        }
        None => "N/A".to_string(),
    }
}

/// Header total for a list, e.g. "1.25 GB total".
pub fn total_size(bytes: u64) -> String {
    let gb = bytes as f64 / 1_000_000_000.0;
    if gb >= 1.0 {
        format!("{:.2} GB total", gb)
    } else {
        format!("{:.0} MB total", bytes as f64 / 1_000_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn compact_age_picks_largest_unit() {
        let now = Utc::now();
        assert_eq!(compact_age(now - Duration::days(2), now), "2d ago");
        assert_eq!(compact_age(now - Duration::hours(3), now), "3h ago");
        assert_eq!(compact_age(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(compact_age(now - Duration::seconds(20), now), "just now");
        // clock skew from the daemon
        assert_eq!(compact_age(now + Duration::minutes(10), now), "just now");
    }

    #[test]
    fn relative_age_pluralises() {
        let now = Utc::now();
        assert_eq!(relative_age(now - Duration::days(65), now), "2 months ago");
        assert_eq!(relative_age(now - Duration::days(30), now), "1 month ago");
        assert_eq!(relative_age(now - Duration::days(7), now), "1 week ago");
        assert_eq!(relative_age(now - Duration::days(20), now), "2 weeks ago");
        assert_eq!(relative_age(now - Duration::days(1), now), "1 day ago");
        assert_eq!(relative_age(now - Duration::hours(5), now), "5 hours ago");
        assert_eq!(relative_age(now - Duration::minutes(59), now), "just now");
    }

    #[test]
    fn sizes() {
        assert_eq!(decimal_size(187_000_000), "187 MB");
        assert_eq!(decimal_size(1_200_000_000), "1.2 GB");
        assert_eq!(optional_size(Some(512_000)), "512 KB");
        assert_eq!(optional_size(Some(45_000_000)), "45 MB");
        assert_eq!(optional_size(Some(2_500_000_000)), "2.5 GB");
        assert_eq!(optional_size(None), "N/A");
        assert_eq!(total_size(1_250_000_000), "1.25 GB total");
        assert_eq!(total_size(640_000_000), "640 MB total");
    }
}
