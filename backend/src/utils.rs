use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref VIDEO_ID_PATTERN: Regex =
        Regex::new(r"^[a-zA-Z0-9_-]{11}$").expect("video id pattern is a valid regex");
}

/// Whether `video_id` has the shape of a platform identifier (11 chars of `[A-Za-z0-9_-]`).
pub fn is_valid_video_id(video_id: &str) -> bool {
    VIDEO_ID_PATTERN.is_match(video_id)
}

/// Formats a duration in seconds as `M:SS`, or `H:MM:SS` once it reaches an hour.
pub fn format_duration(seconds: u64) -> String {
    if seconds == 0 {
        return "0:00".to_string();
    }

    let minutes = seconds / 60;
    let remaining_seconds = seconds % 60;

    if minutes >= 60 {
        let hours = minutes / 60;
        let minutes = minutes % 60;
        return format!("{hours}:{minutes:02}:{remaining_seconds:02}");
    }

    format!("{minutes}:{remaining_seconds:02}")
}

/// Converts an optional, possibly fractional or negative duration into whole seconds.
pub fn duration_seconds(raw: Option<f64>) -> u64 {
    match raw {
        Some(d) if d.is_finite() && d > 0.0 => d as u64,
        _ => 0,
    }
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(9), "0:09");
        assert_eq!(format_duration(65), "1:05");
        assert_eq!(format_duration(3599), "59:59");
        assert_eq!(format_duration(3600), "1:00:00");
        assert_eq!(format_duration(3725), "1:02:05");
    }

    #[test]
    fn duration_seconds_never_negative() {
        assert_eq!(duration_seconds(None), 0);
        assert_eq!(duration_seconds(Some(-3.0)), 0);
        assert_eq!(duration_seconds(Some(f64::NAN)), 0);
        assert_eq!(duration_seconds(Some(212.9)), 212);
    }

    #[test]
    fn validates_video_ids() {
        assert!(is_valid_video_id("dQw4w9WgXcQ"));
        assert!(is_valid_video_id("abcDEFghi_-"));
        assert!(!is_valid_video_id(""));
        assert!(!is_valid_video_id("dQw4w9WgXc"));
        assert!(!is_valid_video_id("dQw4w9WgXcQQ"));
        assert!(!is_valid_video_id("dQw4w9WgXc!"));
        assert!(!is_valid_video_id("../../etc/p"));
    }
}
