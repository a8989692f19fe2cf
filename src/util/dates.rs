/*!
 Contains date conversion helpers for the Apple reference epoch.

 Both the binary date marker and archived `NSDate` objects store a floating-point
 number of seconds relative to `2001-01-01T00:00:00Z`.
*/

use chrono::{DateTime, Utc};

/// Seconds between the Unix epoch and the Apple reference date (`2001-01-01T00:00:00Z`)
pub const APPLE_EPOCH_OFFSET: i64 = 978_307_200;

/// Convert seconds relative to the Apple reference date into a UTC instant.
///
/// Returns [`None`] if the value is not finite or falls outside the representable range.
pub fn from_apple_time(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let unix = seconds + APPLE_EPOCH_OFFSET as f64;
    if unix <= (i64::MIN as f64) || unix >= (i64::MAX as f64) {
        return None;
    }
    let whole = unix.floor();
    let nanos = ((unix - whole) * 1_000_000_000.0).round() as u32;
    // Rounding the fractional part can carry into the next second
    let (secs, nanos) = if nanos >= 1_000_000_000 {
        (whole as i64 + 1, 0)
    } else {
        (whole as i64, nanos)
    };
    DateTime::from_timestamp(secs, nanos)
}
