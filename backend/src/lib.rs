#[macro_use]
extern crate rocket;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

use crate::services::audio_service::TransformPipeline;
use crate::services::retrieval_service::RetrievalOrchestrator;
use rocket::{Build, Config, Rocket};
use std::sync::Arc;

pub struct AppState {
    pub retrieval: Arc<RetrievalOrchestrator>,
    pub pipeline: Arc<TransformPipeline>,
}

#[get("/")]
fn index() -> &'static str {
    "UTone API"
}

/// Mounts every route on a Rocket instance that manages `state`.
pub fn build_rocket(state: AppState) -> Rocket<Build> {
    let figment = Config::figment().merge(("limits", config::upload_limits()));

    rocket::custom(figment)
        .manage(state)
        .mount("/", routes![index])
        .mount(
            "/api/youtube",
            routes![
                api::search_videos,
                api::autocomplete,
                api::debug_autocomplete,
                api::download_video,
            ],
        )
        .mount("/api/audio", routes![api::process_audio])
}
