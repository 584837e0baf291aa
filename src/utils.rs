use std::time::{Duration, Instant};

/// Format a `Duration` as a human-readable string with automatic unit scaling.
///
/// Produces output like `1.94ms`, `2.34s`, `150.00µs` using Rust's Debug format.
pub fn fmt_duration(d: Duration) -> String {
    format!("{d:.2?}")
}

/// Log a warning if the elapsed time since `start` exceeds `threshold`.
pub fn log_if_slow(start: Instant, threshold: Duration, label: &str) {
    let elapsed = start.elapsed();
    if elapsed > threshold {
        tracing::warn!(duration = fmt_duration(elapsed), "slow operation: {label}");
    }
}

/// Shorten `text` to at most `max_bytes`, cutting on a character boundary.
pub fn truncate_on_char_boundary(text: &mut String, max_bytes: usize) {
    if text.len() <= max_bytes {
        return;
    }
    let cut = (0..=max_bytes)
        .rev()
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(0);
    text.truncate(cut);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_scale_units() {
        assert_eq!(fmt_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(fmt_duration(Duration::from_micros(1940)), "1.94ms");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let mut ascii = "bad gateway".to_string();
        truncate_on_char_boundary(&mut ascii, 3);
        assert_eq!(ascii, "bad");

        // "हरियाणा" is made of 3-byte characters.
        let mut hindi = "हरियाणा".to_string();
        truncate_on_char_boundary(&mut hindi, 4);
        assert_eq!(hindi, "ह");

        let mut short = "ok".to_string();
        truncate_on_char_boundary(&mut short, 512);
        assert_eq!(short, "ok");
    }
}
