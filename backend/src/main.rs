use log::error;
use rocket::{launch, Build, Rocket};
use utone_backend::{build_rocket, config};

#[launch]
fn rocket() -> Rocket<Build> {
    config::load_environment();
    config::init_logger();

    let state = match config::create_app_state() {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application state: {e:?}");
            std::process::exit(1);
        }
    };
    let cors = match config::create_cors() {
        Ok(cors) => cors,
        Err(e) => {
            error!("{e:?}");
            std::process::exit(1);
        }
    };

    build_rocket(state).attach(cors)
}
