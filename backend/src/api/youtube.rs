use crate::error::{ApiError, RetrievalError};
use crate::models::{DebugAutocompleteResponse, MediaSummary};
use crate::services::retrieval_service::DownloadedAudio;
use crate::AppState;
use log::{error, info};
use rocket::http::ContentType;
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use rocket::serde::json::Json;
use rocket::tokio::fs::File;
use rocket::tokio::io::{AsyncRead, AsyncSeek, ReadBuf};
use rocket::tokio::runtime::Handle;
use rocket::tokio::task::JoinHandle;
use rocket::{get, State};
use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};

fn required_query(q: Option<&str>) -> Result<&str, ApiError> {
    match q {
        Some(q) if !q.is_empty() => Ok(q),
        _ => Err(ApiError::bad_request("Query parameter is required")),
    }
}

#[get("/search?<q>")]
pub async fn search_videos(
    q: Option<&str>,
    state: &State<AppState>,
) -> Result<Json<Vec<MediaSummary>>, ApiError> {
    let query = required_query(q)?;
    Ok(Json(state.retrieval.search(query).await))
}

#[get("/autocomplete?<q>")]
pub async fn autocomplete(
    q: Option<&str>,
    state: &State<AppState>,
) -> Result<Json<Vec<MediaSummary>>, ApiError> {
    let query = required_query(q)?;
    Ok(Json(state.retrieval.autocomplete(query).await))
}

#[get("/debug/autocomplete?<q>")]
pub async fn debug_autocomplete(
    q: Option<&str>,
    state: &State<AppState>,
) -> Result<Json<DebugAutocompleteResponse>, ApiError> {
    let query = required_query(q)?;
    Ok(Json(state.retrieval.autocomplete_debug(query).await))
}

#[get("/download/<video_id>")]
pub async fn download_video(
    video_id: &str,
    state: &State<AppState>,
) -> Result<AudioAttachment, ApiError> {
    info!("Starting download process for video {video_id}");
    let audio = state.retrieval.download(video_id).await?;

    match File::open(&audio.path).await {
        Ok(file) => Ok(AudioAttachment::new(audio, file)),
        Err(e) => {
            error!("Could not open {}: {e}", audio.path.display());
            release(audio);
            Err(RetrievalError::DownloadFailed.into())
        }
    }
}

/// An `audio/mpeg` attachment backed by a downloaded file.
pub struct AudioAttachment {
    file_name: String,
    size: u64,
    body: CleanupOnDrop,
}

impl AudioAttachment {
    pub fn new(audio: DownloadedAudio, file: File) -> Self {
        AudioAttachment {
            file_name: audio.file_name(),
            size: audio.size,
            body: CleanupOnDrop {
                file,
                audio: Some(audio),
            },
        }
    }
}

impl<'r> Responder<'r, 'static> for AudioAttachment {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let size = usize::try_from(self.size).ok();
        Response::build()
            .header(ContentType::new("audio", "mpeg"))
            .raw_header(
                "Content-Disposition",
                format!("attachment; filename=\"{}\"", self.file_name),
            )
            .sized_body(size, self.body)
            .ok()
    }
}

/// Reads the file and removes its working directory once the body is dropped,
/// whether the client read it all or went away.
struct CleanupOnDrop {
    file: File,
    audio: Option<DownloadedAudio>,
}

impl AsyncRead for CleanupOnDrop {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().file).poll_read(cx, buf)
    }
}

impl AsyncSeek for CleanupOnDrop {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.get_mut().file).start_seek(position)
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.get_mut().file).poll_complete(cx)
    }
}

impl Drop for CleanupOnDrop {
    fn drop(&mut self) {
        if let Some(audio) = self.audio.take() {
            release(audio);
        }
    }
}

/// Removes the working directory on the blocking pool when a runtime is
/// available, inline otherwise.
fn release(audio: DownloadedAudio) -> Option<JoinHandle<()>> {
    match Handle::try_current() {
        Ok(handle) => Some(handle.spawn_blocking(move || remove_working_dir(audio))),
        Err(_) => {
            remove_working_dir(audio);
            None
        }
    }
}

fn remove_working_dir(audio: DownloadedAudio) {
    let dir = audio.working_dir().to_path_buf();
    match audio.cleanup() {
        Ok(()) => info!("Cleaned up {}", dir.display()),
        Err(e) => error!("Error cleaning up {}: {e}", dir.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawEntry;
    use crate::services::extractor::{ExtractorError, MediaExtractor, SearchRequest};
    use crate::services::probe::{HttpProbe, ProbeError};
    use crate::services::retrieval_service::{RetrievalConfig, RetrievalOrchestrator};
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    struct WritesMp3;

    impl MediaExtractor for WritesMp3 {
        fn search(&self, _: &SearchRequest) -> Result<Vec<RawEntry>, ExtractorError> {
            Ok(Vec::new())
        }

        fn download_audio(&self, video_id: &str, dir: &Path) -> Result<(), ExtractorError> {
            std::fs::write(dir.join(format!("{video_id}.mp3")), b"ID3").unwrap();
            Ok(())
        }
    }

    struct Available;

    #[rocket::async_trait]
    impl HttpProbe for Available {
        async fn head(&self, _: &str, _: Duration) -> Result<u16, ProbeError> {
            Ok(200)
        }
    }

    async fn downloaded() -> DownloadedAudio {
        let service = RetrievalOrchestrator::new(
            Arc::new(WritesMp3),
            Arc::new(Available),
            RetrievalConfig::default(),
        );
        service.download("dQw4w9WgXcQ").await.unwrap()
    }

    #[tokio::test]
    async fn release_hands_removal_to_blocking_pool() {
        let audio = downloaded().await;
        let dir = audio.working_dir().to_path_buf();

        let handle = release(audio).expect("runtime is available");
        handle.await.unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn release_without_runtime_removes_inline() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let audio = runtime.block_on(downloaded());
        let dir = audio.working_dir().to_path_buf();
        drop(runtime);

        assert!(release(audio).is_none());
        assert!(!dir.exists());
    }
}
