use crate::error::{ApiError, AudioError};
use crate::AppState;
use log::info;
use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::http::ContentType;
use rocket::tokio::io::AsyncReadExt;
use rocket::{post, FromForm, State};

#[derive(FromForm)]
pub struct TransformUpload<'r> {
    pub file: TempFile<'r>,
    /// Raw text so a malformed number is rejected instead of read as absent.
    pub pitch: Option<&'r str>,
    pub tempo: Option<&'r str>,
}

/// `default` when the field is absent; an error when it is present but not a number.
fn numeric_field(name: &str, raw: Option<&str>, default: f64) -> Result<f64, AudioError> {
    match raw.map(str::trim) {
        None => Ok(default),
        Some(value) => value.parse::<f64>().map_err(|_| {
            AudioError::InvalidParameter(format!("{name} must be a number, got '{value}'"))
        }),
    }
}

fn is_audio(content_type: Option<&ContentType>) -> bool {
    content_type.is_some_and(|ct| ct.top().as_str().eq_ignore_ascii_case("audio"))
}

#[post("/process", data = "<upload>")]
pub async fn process_audio(
    upload: Form<TransformUpload<'_>>,
    state: &State<AppState>,
) -> Result<(ContentType, Vec<u8>), ApiError> {
    let upload = upload.into_inner();
    let content_type = upload.file.content_type();
    info!(
        "Received file: name={:?}, content_type={:?}, size={}",
        upload.file.name(),
        content_type.map(ToString::to_string),
        upload.file.len()
    );
    if !is_audio(content_type) {
        return Err(ApiError::bad_request(format!(
            "Invalid file type: {}. Expected audio file.",
            content_type.map(ToString::to_string).unwrap_or_default()
        )));
    }

    let pitch = numeric_field("pitch", upload.pitch, 0.0)?;
    let tempo = numeric_field("tempo", upload.tempo, 1.0)?;

    let mut bytes = Vec::new();
    let reader = upload
        .file
        .open()
        .await
        .map_err(|e| AudioError::processing("reading upload", e))?;
    rocket::tokio::pin!(reader);
    reader
        .read_to_end(&mut bytes)
        .await
        .map_err(|e| AudioError::processing("reading upload", e))?;
    info!("Read {} bytes from file", bytes.len());

    let pipeline = state.pipeline.clone();
    let wav = rocket::tokio::task::spawn_blocking(move || pipeline.transform(&bytes, pitch, tempo))
        .await
        .map_err(|e| AudioError::processing("processing", e))??;

    info!("Audio processed successfully, returning {} bytes", wav.len());
    Ok((ContentType::new("audio", "wav"), wav))
}
