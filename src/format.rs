//! Compact human-readable duration strings.
//!
//! One granularity policy applies everywhere a span is shown: seconds only
//! below one minute, minutes below one hour, hours and minutes below one day,
//! days and hours above that.

use chrono::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("cannot format negative span of {millis}ms")]
    NegativeSpan { millis: i64 },
}

/// Format a non-negative span, e.g. `45s`, `10m`, `1h 1m`, `2d 3h`.
pub fn format_duration(span: Duration) -> Result<String, FormatError> {
    if span < Duration::zero() {
        return Err(FormatError::NegativeSpan {
            millis: span.num_milliseconds(),
        });
    }

    let total = span.num_seconds();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    let text = if total < 60 {
        format!("{}s", seconds)
    } else if total < 3_600 {
        format!("{}m", minutes)
    } else if total < 86_400 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}d {}h", days, hours)
    };
    Ok(text)
}
