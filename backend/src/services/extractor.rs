use crate::models::RawEntry;
use crate::utils::watch_url;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

/// Extension the extractor is asked to transcode to.
pub const AUDIO_FORMAT: &str = "mp3";
pub const AUDIO_QUALITY: &str = "192K";

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("unreadable extractor output: {0}")]
    Parse(String),

    #[error("required tool unavailable: {0}")]
    MissingDependency(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub limit: usize,
    /// Listing only, without resolving each entry's full metadata.
    pub flat: bool,
}

impl SearchRequest {
    pub fn full(query: &str) -> Self {
        SearchRequest {
            query: query.to_string(),
            limit: 10,
            flat: false,
        }
    }

    pub fn suggestions(query: &str) -> Self {
        SearchRequest {
            query: query.to_string(),
            limit: 6,
            flat: true,
        }
    }

    pub fn search_term(&self) -> String {
        format!("ytsearch{}:{}", self.limit, self.query)
    }
}

/// Out-of-process tool that searches the platform and pulls audio tracks.
///
/// Both calls block; callers run them on the worker pool.
pub trait MediaExtractor: Send + Sync {
    fn search(&self, request: &SearchRequest) -> Result<Vec<RawEntry>, ExtractorError>;

    /// Writes `<video_id>.<ext>` into `output_dir`.
    fn download_audio(&self, video_id: &str, output_dir: &Path) -> Result<(), ExtractorError>;
}

pub struct YtDlpExtractor {
    yt_dlp: PathBuf,
    ffmpeg: PathBuf,
}

impl YtDlpExtractor {
    pub fn new(yt_dlp: impl Into<PathBuf>, ffmpeg: impl Into<PathBuf>) -> Self {
        YtDlpExtractor {
            yt_dlp: yt_dlp.into(),
            ffmpeg: ffmpeg.into(),
        }
    }

    fn program(&self) -> String {
        self.yt_dlp.display().to_string()
    }

    fn check_ffmpeg(&self) -> Result<(), ExtractorError> {
        let status = Command::new(&self.ffmpeg)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| {
                ExtractorError::MissingDependency(format!(
                    "{} not found: {e}",
                    self.ffmpeg.display()
                ))
            })?;
        if !status.success() {
            return Err(ExtractorError::MissingDependency(format!(
                "{} -version exited with {status}",
                self.ffmpeg.display()
            )));
        }
        Ok(())
    }
}

impl MediaExtractor for YtDlpExtractor {
    fn search(&self, request: &SearchRequest) -> Result<Vec<RawEntry>, ExtractorError> {
        let mut cmd = Command::new(&self.yt_dlp);
        cmd.args(["-j", "--skip-download", "--no-warnings", "--socket-timeout", "10"]);
        if request.flat {
            cmd.arg("--flat-playlist");
        }
        cmd.arg(request.search_term());

        debug!("Running {} for '{}'", self.program(), request.search_term());
        let output = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| ExtractorError::Spawn {
                program: self.program(),
                source,
            })?;

        if !output.status.success() {
            return Err(ExtractorError::Failed {
                program: self.program(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_entries(&String::from_utf8_lossy(&output.stdout))
    }

    fn download_audio(&self, video_id: &str, output_dir: &Path) -> Result<(), ExtractorError> {
        self.check_ffmpeg()?;

        let template = output_dir.join(format!("{video_id}.%(ext)s"));
        info!("Downloading audio for {video_id} into {}", output_dir.display());

        let output = Command::new(&self.yt_dlp)
            .args(["-f", "bestaudio/best", "-x"])
            .args(["--audio-format", AUDIO_FORMAT])
            .args(["--audio-quality", AUDIO_QUALITY])
            .arg("--ffmpeg-location")
            .arg(&self.ffmpeg)
            .arg("-o")
            .arg(&template)
            .args(["--no-check-certificate", "--geo-bypass", "--quiet"])
            .arg(watch_url(video_id))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| ExtractorError::Spawn {
                program: self.program(),
                source,
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Err(ExtractorError::Failed {
                program: self.program(),
                code: output.status.code(),
                stderr,
            });
        }
        if !stderr.is_empty() {
            debug!("{} stderr for {video_id}: {stderr}", self.program());
        }
        Ok(())
    }
}

/// Parses `-j` output: one JSON object per line. Unreadable lines are skipped.
pub fn parse_entries(stdout: &str) -> Result<Vec<RawEntry>, ExtractorError> {
    let mut entries = Vec::new();
    let mut skipped = 0;
    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match serde_json::from_str::<RawEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                skipped += 1;
                debug!("Skipping unreadable entry: {e}");
            }
        }
    }
    if entries.is_empty() && skipped > 0 {
        return Err(ExtractorError::Parse(format!(
            "none of {skipped} line(s) could be parsed"
        )));
    }
    if skipped > 0 {
        warn!("Skipped {skipped} unreadable extractor line(s)");
    }
    Ok(entries)
}
