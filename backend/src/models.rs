use serde::{Deserialize, Serialize};

pub const UNKNOWN_TITLE: &str = "Unknown title";
pub const UNKNOWN_CHANNEL: &str = "Unknown channel";

/// One search or autocomplete hit, serialized with the field names the web client expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSummary {
    pub id: String,
    pub title: String,
    #[serde(rename = "channelTitle")]
    pub channel_name: String,
    #[serde(rename = "thumbnail")]
    pub thumbnail_url: String,
    #[serde(rename = "duration")]
    pub duration_display: String,
}

/// A thumbnail as reported by the extractor. Dimensions are often missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailCandidate {
    #[serde(default)]
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// An entry as printed by `yt-dlp -j`. Only the fields we shape into a summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEntry {
    pub id: Option<String>,
    pub title: Option<String>,
    pub channel: Option<String>,
    pub uploader: Option<String>,
    pub duration: Option<f64>,
    #[serde(default)]
    pub thumbnails: Vec<ThumbnailCandidate>,
}

impl RawEntry {
    pub fn video_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn display_title(&self) -> String {
        non_empty(self.title.as_deref())
            .unwrap_or(UNKNOWN_TITLE)
            .to_string()
    }

    pub fn channel_name(&self) -> String {
        non_empty(self.channel.as_deref())
            .or_else(|| non_empty(self.uploader.as_deref()))
            .unwrap_or(UNKNOWN_CHANNEL)
            .to_string()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DebugAutocompleteResponse {
    pub query: String,
    pub cached: bool,
    pub results: Vec<MediaSummary>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
