use crate::models::ThumbnailCandidate;
use crate::services::probe::{is_success, HttpProbe};
use log::debug;
use std::time::Duration;

/// Conventional image qualities, best first.
pub const QUALITY_LADDER: [&str; 4] = ["maxresdefault", "sddefault", "hqdefault", "mqdefault"];

const FALLBACK_QUALITY: &str = "mqdefault";

pub fn conventional_url(media_id: &str, quality: &str) -> String {
    format!("https://img.youtube.com/vi/{media_id}/{quality}.jpg")
}

/// The URL returned when nothing else resolves. Never probed.
pub fn fallback_url(media_id: &str) -> String {
    conventional_url(media_id, FALLBACK_QUALITY)
}

/// Candidates with both dimensions known, largest pixel area first.
pub fn rank_candidates(candidates: &[ThumbnailCandidate]) -> Vec<&str> {
    let mut sized: Vec<(u64, &str)> = candidates
        .iter()
        .filter(|c| !c.url.is_empty())
        .filter_map(|c| match (c.width, c.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w as u64 * h as u64, c.url.as_str())),
            _ => None,
        })
        .collect();
    // stable sort keeps extractor order among equal areas
    sized.sort_by(|a, b| b.0.cmp(&a.0));
    sized.into_iter().map(|(_, url)| url).collect()
}

/// Tries the conventional URLs, then the ranked candidates, then falls back.
pub async fn resolve_thumbnail(
    probe: &dyn HttpProbe,
    candidates: &[ThumbnailCandidate],
    media_id: &str,
    timeout: Duration,
) -> String {
    for quality in QUALITY_LADDER {
        let url = conventional_url(media_id, quality);
        if responds(probe, &url, timeout).await {
            return url;
        }
    }

    for url in rank_candidates(candidates) {
        if responds(probe, url, timeout).await {
            return url.to_string();
        }
    }

    fallback_url(media_id)
}

async fn responds(probe: &dyn HttpProbe, url: &str, timeout: Duration) -> bool {
    match probe.head(url, timeout).await {
        Ok(status) => is_success(status),
        Err(e) => {
            debug!("Thumbnail probe skipped: {e}");
            false
        }
    }
}
