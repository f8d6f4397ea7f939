//! Human-readable formatting of trip values.

/// Formats a value with exactly two decimal places.
pub fn two_places(value: f64) -> String {
    format!("{:.2}", value)
}

/// Formats an elapsed duration as `HH:MM:SS`.
///
/// Hours are not folded into days: 25 hours renders as `25:00:00` and the
/// hours field simply grows past two digits. Negative durations render as zero.
pub fn format_duration(elapsed_ms: i64) -> String {
    let total_secs = elapsed_ms.max(0) / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}
