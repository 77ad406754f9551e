use crate::error::RetrievalError;
use crate::models::{DebugAutocompleteResponse, MediaSummary, RawEntry};
use crate::services::extractor::{MediaExtractor, SearchRequest, AUDIO_FORMAT};
use crate::services::probe::{is_success, HttpProbe};
use crate::services::search_cache::SearchCache;
use crate::services::thumbnail::resolve_thumbnail;
use crate::services::worker_pool::WorkerPool;
use crate::utils::{duration_seconds, format_duration, is_valid_video_id};
use futures::future::join_all;
use log::{debug, error, info, warn};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

/// Extensions accepted when the extractor left a non-transcoded track behind.
pub const ALTERNATE_EXTENSIONS: [&str; 5] = ["m4a", "webm", "opus", "aac", "ogg"];

const OEMBED_ENDPOINT: &str = "https://www.youtube.com/oembed";

/// Minimum query length before autocomplete consults anything.
pub const AUTOCOMPLETE_MIN_CHARS: usize = 2;

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub worker_pool_size: usize,
    pub search_timeout: Duration,
    pub search_cache_capacity: usize,
    pub autocomplete_cache_capacity: usize,
    pub thumbnail_probe_timeout: Duration,
    pub availability_probe_timeout: Duration,
    /// Parent of per-job working directories; the system temp dir when unset.
    pub download_root: Option<PathBuf>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        RetrievalConfig {
            worker_pool_size: 4,
            search_timeout: Duration::from_secs(15),
            search_cache_capacity: 100,
            autocomplete_cache_capacity: 100,
            thumbnail_probe_timeout: Duration::from_secs(2),
            availability_probe_timeout: Duration::from_secs(10),
            download_root: None,
        }
    }
}

/// How a shaped summary renders its duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DurationStyle {
    /// Whole seconds as a plain number, e.g. `"213"`.
    Seconds,
    /// `M:SS` or `H:MM:SS`.
    Clock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Validating,
    CheckingAvailability,
    Downloading,
    Verifying,
    Ready,
    Error,
}

/// A downloaded track and the working directory that holds it.
///
/// The directory is removed by [`DownloadedAudio::cleanup`], or when the value
/// is dropped.
#[derive(Debug)]
pub struct DownloadedAudio {
    pub video_id: String,
    pub path: PathBuf,
    pub size: u64,
    working_dir: TempDir,
}

impl DownloadedAudio {
    pub fn working_dir(&self) -> &Path {
        self.working_dir.path()
    }

    pub fn file_name(&self) -> String {
        format!("{}.{AUDIO_FORMAT}", self.video_id)
    }

    pub fn cleanup(self) -> io::Result<()> {
        debug!("Removing working directory {}", self.working_dir.path().display());
        self.working_dir.close()
    }
}

pub struct RetrievalOrchestrator {
    extractor: Arc<dyn MediaExtractor>,
    probe: Arc<dyn HttpProbe>,
    pool: WorkerPool,
    search_cache: SearchCache,
    autocomplete_cache: SearchCache,
    config: RetrievalConfig,
}

impl RetrievalOrchestrator {
    pub fn new(
        extractor: Arc<dyn MediaExtractor>,
        probe: Arc<dyn HttpProbe>,
        config: RetrievalConfig,
    ) -> Self {
        RetrievalOrchestrator {
            extractor,
            probe,
            pool: WorkerPool::new(config.worker_pool_size),
            search_cache: SearchCache::new("search", config.search_cache_capacity),
            autocomplete_cache: SearchCache::new("autocomplete", config.autocomplete_cache_capacity),
            config,
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn search_cache(&self) -> &SearchCache {
        &self.search_cache
    }

    pub fn autocomplete_cache(&self) -> &SearchCache {
        &self.autocomplete_cache
    }

    /// Full search, up to 10 results. Never fails.
    ///
    /// Timeouts and pool failures return an empty list that is not cached.
    /// An extractor failure is cached as an empty list.
    pub async fn search(&self, query: &str) -> Vec<MediaSummary> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        if let Some(hit) = self.search_cache.get(query) {
            debug!("{} cache hit for '{query}'", self.search_cache.name());
            return hit;
        }

        let request = SearchRequest::full(query);
        let extractor = self.extractor.clone();
        let job = self.pool.run(move || extractor.search(&request));

        let entries = match tokio::time::timeout(self.config.search_timeout, job).await {
            Ok(Ok(Ok(entries))) => entries,
            Ok(Ok(Err(e))) => {
                warn!("Search failed for '{query}': {e}");
                Vec::new()
            }
            Ok(Err(e)) => {
                error!("Search job for '{query}' did not complete: {e}");
                return Vec::new();
            }
            Err(_) => {
                warn!(
                    "Search timed out for query '{query}' after {:?}",
                    self.config.search_timeout
                );
                return Vec::new();
            }
        };

        let results = self.shape(entries, DurationStyle::Seconds).await;
        info!("Search for '{query}' returned {} result(s)", results.len());
        self.search_cache.insert(query, results.clone());
        results
    }

    /// Up to 6 suggestions with clock-formatted durations. Never fails.
    pub async fn autocomplete(&self, query: &str) -> Vec<MediaSummary> {
        self.lookup_suggestions(query).await.0
    }

    /// Same as [`Self::autocomplete`], also reporting whether the cache already
    /// held the query.
    pub async fn autocomplete_debug(&self, query: &str) -> DebugAutocompleteResponse {
        let (results, cached) = self.lookup_suggestions(query).await;
        DebugAutocompleteResponse {
            query: query.to_string(),
            cached,
            count: results.len(),
            results,
        }
    }

    async fn lookup_suggestions(&self, query: &str) -> (Vec<MediaSummary>, bool) {
        if query.chars().count() < AUTOCOMPLETE_MIN_CHARS {
            return (Vec::new(), false);
        }
        if let Some(hit) = self.autocomplete_cache.get(query) {
            debug!("{} cache hit for '{query}'", self.autocomplete_cache.name());
            return (hit, true);
        }

        let request = SearchRequest::suggestions(query);
        let extractor = self.extractor.clone();
        let entries = match self.pool.run(move || extractor.search(&request)).await {
            Ok(Ok(entries)) => entries,
            Ok(Err(e)) => {
                warn!("Autocomplete failed for '{query}': {e}");
                Vec::new()
            }
            Err(e) => {
                error!("Autocomplete job for '{query}' did not complete: {e}");
                return (Vec::new(), false);
            }
        };

        let results = self.shape(entries, DurationStyle::Clock).await;
        debug!("Autocomplete suggestions for '{query}': {} result(s)", results.len());
        self.autocomplete_cache.insert(query, results.clone());
        (results, false)
    }

    /// Maps raw entries to summaries in extractor order, dropping entries
    /// without an id. Thumbnails are resolved concurrently.
    async fn shape(&self, entries: Vec<RawEntry>, style: DurationStyle) -> Vec<MediaSummary> {
        let timeout = self.config.thumbnail_probe_timeout;
        let probe = self.probe.as_ref();

        let summaries = entries
            .iter()
            .filter_map(|entry| entry.video_id().map(|id| (id, entry)))
            .map(|(id, entry)| async move {
                let thumbnail_url = resolve_thumbnail(probe, &entry.thumbnails, id, timeout).await;
                let seconds = duration_seconds(entry.duration);
                MediaSummary {
                    id: id.to_string(),
                    title: entry.display_title(),
                    channel_name: entry.channel_name(),
                    thumbnail_url,
                    duration_display: match style {
                        DurationStyle::Seconds => seconds.to_string(),
                        DurationStyle::Clock => format_duration(seconds),
                    },
                }
            });

        join_all(summaries).await
    }

    /// Downloads the audio track of `video_id` into a fresh working directory.
    ///
    /// Only `InvalidIdentifier` and `NotFound` are reported as such; every
    /// other failure is logged and surfaces as `DownloadFailed`.
    pub async fn download(&self, video_id: &str) -> Result<DownloadedAudio, RetrievalError> {
        log_state(video_id, DownloadState::Validating);
        if !is_valid_video_id(video_id) {
            log_state(video_id, DownloadState::Error);
            warn!("Invalid video ID format: {video_id}");
            return Err(RetrievalError::InvalidIdentifier(video_id.to_string()));
        }

        log_state(video_id, DownloadState::CheckingAvailability);
        if let Err(e) = self.check_availability(video_id).await {
            log_state(video_id, DownloadState::Error);
            return Err(e);
        }

        let job = DownloadJob {
            video_id: video_id.to_string(),
            download_root: self.config.download_root.clone(),
            extractor: self.extractor.clone(),
        };
        match self.pool.run(move || job.run()).await {
            Ok(Ok(audio)) => {
                log_state(video_id, DownloadState::Ready);
                info!(
                    "Download completed. File path: {}, size: {} bytes",
                    audio.path.display(),
                    audio.size
                );
                Ok(audio)
            }
            Ok(Err(e)) => {
                log_state(video_id, DownloadState::Error);
                error!("Error downloading audio for {video_id}: {e}");
                Err(RetrievalError::DownloadFailed)
            }
            Err(e) => {
                log_state(video_id, DownloadState::Error);
                error!("Download job for {video_id} did not complete: {e}");
                Err(RetrievalError::DownloadFailed)
            }
        }
    }

    async fn check_availability(&self, video_id: &str) -> Result<(), RetrievalError> {
        let url = availability_url(video_id).map_err(|e| {
            error!("Could not build availability URL for {video_id}: {e}");
            RetrievalError::DownloadFailed
        })?;

        match self
            .probe
            .head(url.as_str(), self.config.availability_probe_timeout)
            .await
        {
            Ok(status) if is_success(status) => {
                debug!("Video {video_id} exists and is available");
                Ok(())
            }
            Ok(status) => {
                warn!("Video {video_id} not found. Status code: {status}");
                Err(RetrievalError::NotFound(video_id.to_string()))
            }
            Err(e) => {
                error!("Availability check for {video_id} failed: {e}");
                Err(RetrievalError::DownloadFailed)
            }
        }
    }
}

/// Public metadata endpoint that answers 2xx only for existing, embeddable media.
pub fn availability_url(video_id: &str) -> Result<Url, url::ParseError> {
    let watch = format!("http://www.youtube.com/watch?v={video_id}");
    Url::parse_with_params(OEMBED_ENDPOINT, &[("url", watch.as_str()), ("format", "json")])
}

fn log_state(video_id: &str, state: DownloadState) {
    debug!("[{video_id}] {state:?}");
}

/// The blocking part of a download, run on a pool slot.
struct DownloadJob {
    video_id: String,
    download_root: Option<PathBuf>,
    extractor: Arc<dyn MediaExtractor>,
}

impl DownloadJob {
    /// The working directory is dropped, and so removed, on every error return.
    fn run(self) -> Result<DownloadedAudio, RetrievalError> {
        log_state(&self.video_id, DownloadState::Downloading);
        let mut builder = tempfile::Builder::new();
        builder.prefix("utone-download-");
        let working_dir = match &self.download_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| RetrievalError::ExtractionFailed(format!("working directory: {e}")))?;

        self.extractor
            .download_audio(&self.video_id, working_dir.path())
            .map_err(|e| RetrievalError::ExtractionFailed(e.to_string()))?;

        log_state(&self.video_id, DownloadState::Verifying);
        let path = locate_output(working_dir.path(), &self.video_id)
            .map_err(|e| RetrievalError::ExtractionFailed(format!("verifying output: {e}")))?
            .ok_or_else(|| RetrievalError::ExtractionFailed("no output produced".to_string()))?;
        let size = std::fs::metadata(&path)
            .map_err(|e| RetrievalError::ExtractionFailed(format!("reading output size: {e}")))?
            .len();

        Ok(DownloadedAudio {
            video_id: self.video_id,
            path,
            size,
            working_dir,
        })
    }
}

/// Finds `<id>.mp3` in `dir`, renaming an alternate-extension track into place
/// when the transcoded file is missing.
pub fn locate_output(dir: &Path, video_id: &str) -> io::Result<Option<PathBuf>> {
    let expected = dir.join(format!("{video_id}.{AUDIO_FORMAT}"));
    if expected.is_file() {
        return Ok(Some(expected));
    }

    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            let name_matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(video_id));
            let ext_matches = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| ALTERNATE_EXTENSIONS.contains(&e));
            name_matches && ext_matches && path.is_file()
        })
        .collect();
    candidates.sort();

    match candidates.into_iter().next() {
        Some(found) => {
            warn!(
                "Expected {} not found, using alternative audio file {}",
                expected.display(),
                found.display()
            );
            std::fs::rename(&found, &expected)?;
            Ok(Some(expected))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ThumbnailCandidate;
    use crate::services::extractor::ExtractorError;
    use crate::services::probe::ProbeError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Clone, Copy)]
    enum DownloadBehavior {
        WriteMp3,
        WriteM4a,
        WriteNothing,
        ExitNonZero,
    }

    struct MockExtractor {
        entries: Vec<RawEntry>,
        fail_search: bool,
        search_delay: Duration,
        download: DownloadBehavior,
        searches: AtomicUsize,
        downloads: AtomicUsize,
        requests: Mutex<Vec<SearchRequest>>,
    }

    impl MockExtractor {
        fn new(entries: Vec<RawEntry>) -> Self {
            MockExtractor {
                entries,
                fail_search: false,
                search_delay: Duration::ZERO,
                download: DownloadBehavior::WriteMp3,
                searches: AtomicUsize::new(0),
                downloads: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl MediaExtractor for MockExtractor {
        fn search(&self, request: &SearchRequest) -> Result<Vec<RawEntry>, ExtractorError> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            std::thread::sleep(self.search_delay);
            if self.fail_search {
                return Err(ExtractorError::Parse("blocked".into()));
            }
            Ok(self.entries.clone())
        }

        fn download_audio(&self, video_id: &str, dir: &Path) -> Result<(), ExtractorError> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            match self.download {
                DownloadBehavior::WriteMp3 => {
                    std::fs::write(dir.join(format!("{video_id}.mp3")), b"ID3 fake mp3").unwrap();
                    Ok(())
                }
                DownloadBehavior::WriteM4a => {
                    std::fs::write(dir.join(format!("{video_id}.m4a")), b"fake m4a").unwrap();
                    Ok(())
                }
                DownloadBehavior::WriteNothing => Ok(()),
                DownloadBehavior::ExitNonZero => {
                    std::fs::write(dir.join(format!("{video_id}.part")), b"partial").unwrap();
                    Err(ExtractorError::Failed {
                        program: "yt-dlp".into(),
                        code: Some(1),
                        stderr: "ERROR: Video unavailable".into(),
                    })
                }
            }
        }
    }

    struct MockProbe {
        status: Result<u16, ()>,
        calls: AtomicUsize,
    }

    impl MockProbe {
        fn answering(status: Result<u16, ()>) -> Self {
            MockProbe {
                status,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[rocket::async_trait]
    impl HttpProbe for MockProbe {
        async fn head(&self, url: &str, _timeout: Duration) -> Result<u16, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.status.map_err(|_| ProbeError::Transport {
                url: url.to_string(),
                message: "connection refused".into(),
            })
        }
    }

    fn entry(id: Option<&str>, title: &str, duration: Option<f64>) -> RawEntry {
        RawEntry {
            id: id.map(str::to_string),
            title: Some(title.to_string()),
            uploader: Some("Uploader".to_string()),
            duration,
            thumbnails: vec![ThumbnailCandidate {
                url: "https://i.ytimg.com/x.jpg".into(),
                width: Some(320),
                height: Some(180),
            }],
            ..Default::default()
        }
    }

    fn lofi_entries() -> Vec<RawEntry> {
        vec![
            entry(Some("aaaaaaaaaaa"), "First", Some(213.7)),
            entry(None, "No id", Some(10.0)),
            entry(Some("bbbbbbbbbbb"), "Second", None),
        ]
    }

    fn orchestrator(
        extractor: Arc<MockExtractor>,
        probe: Arc<MockProbe>,
        config: RetrievalConfig,
    ) -> RetrievalOrchestrator {
        RetrievalOrchestrator::new(extractor, probe, config)
    }

    fn dir_entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn search_drops_entries_without_id_and_keeps_order() {
        let extractor = Arc::new(MockExtractor::new(lofi_entries()));
        let probe = Arc::new(MockProbe::answering(Ok(404)));
        let service = orchestrator(extractor, probe, RetrievalConfig::default());

        let results = service.search("lofi").await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "aaaaaaaaaaa");
        assert_eq!(results[1].id, "bbbbbbbbbbb");
        assert_eq!(results[0].channel_name, "Uploader");
        assert_eq!(results[0].duration_display, "213");
        assert_eq!(results[1].duration_display, "0");
        assert_eq!(
            results[0].thumbnail_url,
            "https://img.youtube.com/vi/aaaaaaaaaaa/mqdefault.jpg"
        );
    }

    #[tokio::test]
    async fn repeated_search_is_served_from_cache() {
        let extractor = Arc::new(MockExtractor::new(lofi_entries()));
        let probe = Arc::new(MockProbe::answering(Ok(200)));
        let service = orchestrator(extractor.clone(), probe, RetrievalConfig::default());

        let first = service.search("lofi").await;
        let second = service.search("lofi").await;
        assert_eq!(first, second);
        assert_eq!(extractor.searches.load(Ordering::SeqCst), 1);
        assert_eq!(extractor.requests.lock().unwrap()[0], SearchRequest::full("lofi"));
    }

    #[tokio::test]
    async fn empty_query_touches_nothing() {
        let extractor = Arc::new(MockExtractor::new(lofi_entries()));
        let probe = Arc::new(MockProbe::answering(Ok(200)));
        let service = orchestrator(extractor.clone(), probe, RetrievalConfig::default());

        assert!(service.search("").await.is_empty());
        assert!(service.search("   ").await.is_empty());
        assert_eq!(extractor.searches.load(Ordering::SeqCst), 0);
        assert!(service.search_cache().is_empty());
    }

    #[tokio::test]
    async fn extractor_failure_is_cached_as_empty() {
        let mut mock = MockExtractor::new(lofi_entries());
        mock.fail_search = true;
        let extractor = Arc::new(mock);
        let probe = Arc::new(MockProbe::answering(Ok(200)));
        let service = orchestrator(extractor.clone(), probe, RetrievalConfig::default());

        assert!(service.search("lofi").await.is_empty());
        assert!(service.search_cache().contains("lofi"));
        assert!(service.search("lofi").await.is_empty());
        assert_eq!(extractor.searches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn timed_out_search_is_empty_and_not_cached() {
        let mut mock = MockExtractor::new(lofi_entries());
        mock.search_delay = Duration::from_millis(300);
        let extractor = Arc::new(mock);
        let probe = Arc::new(MockProbe::answering(Ok(200)));
        let config = RetrievalConfig {
            search_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let service = orchestrator(extractor.clone(), probe, config);

        assert!(service.search("lofi").await.is_empty());
        assert!(!service.search_cache().contains("lofi"));

        // the detached job still holds its slot until it finishes
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(service.pool().idle_workers(), service.pool().size());
        assert!(!service.search_cache().contains("lofi"));
    }

    #[tokio::test]
    async fn short_autocomplete_query_skips_cache_and_extractor() {
        let extractor = Arc::new(MockExtractor::new(lofi_entries()));
        let probe = Arc::new(MockProbe::answering(Ok(200)));
        let service = orchestrator(extractor.clone(), probe.clone(), RetrievalConfig::default());

        assert!(service.autocomplete("a").await.is_empty());
        assert_eq!(extractor.searches.load(Ordering::SeqCst), 0);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
        assert!(service.autocomplete_cache().is_empty());
    }

    #[tokio::test]
    async fn autocomplete_formats_durations_and_uses_its_own_cache() {
        let extractor = Arc::new(MockExtractor::new(vec![entry(
            Some("ccccccccccc"),
            "Long mix",
            Some(3725.0),
        )]));
        let probe = Arc::new(MockProbe::answering(Ok(200)));
        let service = orchestrator(extractor.clone(), probe, RetrievalConfig::default());

        let results = service.autocomplete("lo").await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].duration_display, "1:02:05");
        assert!(service.autocomplete_cache().contains("lo"));
        assert!(!service.search_cache().contains("lo"));
        assert_eq!(
            extractor.requests.lock().unwrap()[0],
            SearchRequest::suggestions("lo")
        );

        let debug = service.autocomplete_debug("lo").await;
        assert!(debug.cached);
        assert_eq!(debug.count, 1);
        assert_eq!(extractor.searches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_identifier_does_no_work() {
        let extractor = Arc::new(MockExtractor::new(Vec::new()));
        let probe = Arc::new(MockProbe::answering(Ok(200)));
        let service = orchestrator(extractor.clone(), probe.clone(), RetrievalConfig::default());

        for id in ["", "short", "abcDEFghi_-x", "abcDEFghi!-", "abc DEFghi_"] {
            let result = service.download(id).await;
            assert!(matches!(result, Err(RetrievalError::InvalidIdentifier(_))));
        }
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
        assert_eq!(extractor.downloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unavailable_media_is_not_found() {
        let extractor = Arc::new(MockExtractor::new(Vec::new()));
        let probe = Arc::new(MockProbe::answering(Ok(404)));
        let service = orchestrator(extractor.clone(), probe, RetrievalConfig::default());

        let result = service.download("abcDEFghi_-").await;
        assert!(matches!(result, Err(RetrievalError::NotFound(_))));
        assert_eq!(extractor.downloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn probe_transport_error_is_generic_failure() {
        let extractor = Arc::new(MockExtractor::new(Vec::new()));
        let probe = Arc::new(MockProbe::answering(Err(())));
        let service = orchestrator(extractor, probe, RetrievalConfig::default());

        let result = service.download("abcDEFghi_-").await;
        assert!(matches!(result, Err(RetrievalError::DownloadFailed)));
    }

    #[tokio::test]
    async fn failed_extraction_leaves_no_working_directory() {
        let root = tempfile::tempdir().unwrap();
        for behavior in [DownloadBehavior::ExitNonZero, DownloadBehavior::WriteNothing] {
            let mut mock = MockExtractor::new(Vec::new());
            mock.download = behavior;
            let probe = Arc::new(MockProbe::answering(Ok(200)));
            let config = RetrievalConfig {
                download_root: Some(root.path().to_path_buf()),
                ..Default::default()
            };
            let service = orchestrator(Arc::new(mock), probe, config);

            let result = service.download("abcDEFghi_-").await;
            assert!(matches!(result, Err(RetrievalError::DownloadFailed)));
            assert_eq!(dir_entries(root.path()), 0);
        }
    }

    #[tokio::test]
    async fn successful_download_until_cleanup() {
        let root = tempfile::tempdir().unwrap();
        let extractor = Arc::new(MockExtractor::new(Vec::new()));
        let probe = Arc::new(MockProbe::answering(Ok(200)));
        let config = RetrievalConfig {
            download_root: Some(root.path().to_path_buf()),
            ..Default::default()
        };
        let service = orchestrator(extractor, probe, config);

        let audio = service.download("abcDEFghi_-").await.unwrap();
        assert_eq!(audio.size, 12);
        assert_eq!(audio.file_name(), "abcDEFghi_-.mp3");
        assert!(audio.path.is_file());
        assert_eq!(dir_entries(root.path()), 1);

        audio.cleanup().unwrap();
        assert_eq!(dir_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn alternate_extension_is_renamed_into_place() {
        let mut mock = MockExtractor::new(Vec::new());
        mock.download = DownloadBehavior::WriteM4a;
        let probe = Arc::new(MockProbe::answering(Ok(200)));
        let service = orchestrator(Arc::new(mock), probe, RetrievalConfig::default());

        let audio = service.download("abcDEFghi_-").await.unwrap();
        assert!(audio.path.ends_with("abcDEFghi_-.mp3"));
        assert_eq!(std::fs::read(&audio.path).unwrap(), b"fake m4a");

        let dir = audio.working_dir().to_path_buf();
        drop(audio);
        assert!(!dir.exists());
    }

    #[test]
    fn locate_output_ignores_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("abcDEFghi_-.part"), b"x").unwrap();
        std::fs::write(dir.path().join("otherid0000.m4a"), b"x").unwrap();
        assert_eq!(locate_output(dir.path(), "abcDEFghi_-").unwrap(), None);
    }

    #[test]
    fn availability_url_embeds_watch_url() {
        let url = availability_url("abcDEFghi_-").unwrap();
        assert_eq!(url.host_str(), Some("www.youtube.com"));
        assert_eq!(url.path(), "/oembed");
        let params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            params,
            vec![
                (
                    "url".to_string(),
                    "http://www.youtube.com/watch?v=abcDEFghi_-".to_string()
                ),
                ("format".to_string(), "json".to_string()),
            ]
        );
    }
}
