mod aggregate;
mod config;
mod decode;
mod error;
mod model;
mod response;
mod routes;
mod state;
mod ws;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use config::AppConfig;
use routes::configure_routes;
use state::Models;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::load().map_err(|e| {
        log::error!("Failed to load configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let models = Models::from_config(&config).map_err(|e| {
        log::error!("Failed to initialize model backends: {}", e);
        std::io::Error::other(format!("Model initialization failed: {}", e))
    })?;
    log::info!(
        "Routes: stream={} (enforce_detection={}), majority={}, weighted={} (enforce_detection={})",
        models.stream.backend_name(),
        models.stream.options().enforce_detection,
        models.majority.backend_name(),
        models.weighted.backend_name(),
        models.weighted.options().enforce_detection,
    );
    let models = web::Data::new(models);
    let limits = web::Data::new(config.limits);

    let bind_address = config.bind_address();
    let allowed_origins = config.server.allowed_origins.clone();
    if allowed_origins.is_empty() {
        log::warn!("No ALLOWED_ORIGINS configured, accepting any origin");
    }

    log::info!("Starting server on {}", bind_address);

    let result = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors(&allowed_origins))
            .app_data(models.clone())
            .app_data(limits.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await;

    log::info!("Server stopped, model backends released");
    result
}

fn cors(allowed_origins: &[String]) -> Cors {
    let cors = if allowed_origins.is_empty() {
        Cors::default().allow_any_origin()
    } else {
        allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };
    cors.allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![
            actix_web::http::header::AUTHORIZATION,
            actix_web::http::header::ACCEPT,
            actix_web::http::header::CONTENT_TYPE,
        ])
        .max_age(3600)
}
