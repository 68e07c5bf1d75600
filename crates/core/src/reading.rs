//! Reading-time estimates used by the transport display

/// Average narration speed
pub const WORDS_PER_MINUTE: f64 = 150.0;

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Estimated reading time in minutes (fractional)
pub fn reading_minutes(text: &str) -> f64 {
    if text.trim().is_empty() {
        return 0.0;
    }
    word_count(text) as f64 / WORDS_PER_MINUTE
}

/// Rounded-up duration label: `"12 min"` or `"2h 5m"`
pub fn estimate_duration(text: &str) -> String {
    if text.trim().is_empty() {
        return "--:--".to_string();
    }

    let minutes = (word_count(text) as f64 / WORDS_PER_MINUTE).ceil() as u64;
    if minutes < 60 {
        return format!("{} min", minutes);
    }

    format!("{}h {}m", minutes / 60, minutes % 60)
}

/// Clock label for a fractional number of minutes: `m:ss` or `h:mm:ss`
pub fn format_time(total_minutes: f64) -> String {
    if !total_minutes.is_finite() || total_minutes <= 0.0 {
        return "0:00".to_string();
    }

    let seconds = (total_minutes * 60.0).floor() as u64;
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;

    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}
