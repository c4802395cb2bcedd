use actix_web::{middleware::Logger, web, App, HttpServer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use quick_notes::{configure, AppState, Settings};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = Settings::config_path();
    let settings = Settings::load(&config_path).map_err(|e| {
        error!(path = %config_path, "invalid configuration: {e}");
        std::io::Error::other(e)
    })?;

    let addr = settings.server.address();
    let state = web::Data::new(AppState::new(settings));
    state.store.ensure_dir().map_err(std::io::Error::other)?;

    info!(notes_dir = %state.store.dir().display(), "Listening on: {}", addr);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .configure(configure)
    })
    .bind(addr)?
    .run()
    .await
}
