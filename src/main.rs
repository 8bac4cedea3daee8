mod auth;
mod backend;
mod config;
mod drive;
mod errors;
mod models;
mod routes;
mod sanitize;

use actix_cors::Cors;
use actix_web::{App, HttpServer, http::header, middleware, web::Data};
use env_logger::Env;

use crate::backend::Services;
use crate::config::Config;
use crate::drive::ProgressBoard;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // info by default, RUST_LOG overrides
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cfg = Config::from_env_config()?;
    let services = Services::connect(&cfg)?;
    let board = Data::new(ProgressBoard::default());

    log::info!("Starting server at {} ({:?} backend)", cfg.listen, cfg.backend);

    let listen_addr = cfg.listen.clone();
    HttpServer::new(move || {
        let cors = if cfg.allowed_origins.is_empty() {
            Cors::permissive()
        } else {
            let mut cors = Cors::default()
                .allowed_methods(vec!["GET", "POST"])
                .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
                .supports_credentials()
                .max_age(3600);
            for origin in &cfg.allowed_origins {
                cors = cors.allowed_origin(origin);
            }
            cors
        };

        App::new()
            .wrap(middleware::from_fn(auth::load_session))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(Data::new(cfg.clone()))
            .app_data(Data::new(services.clone()))
            .app_data(board.clone())
            .configure(routes::configure)
    })
    .bind(listen_addr)?
    .run()
    .await?;
    Ok(())
}
