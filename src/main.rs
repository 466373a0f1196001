mod auth;
mod calendar;
mod config;
mod db;
mod error;
mod gateway;
mod guards;
mod hours;
mod i18n;
mod listing;
mod models;
mod pricing;
mod routes;
mod session;
mod state;
mod storage;
mod templates;
mod wizard;

#[cfg(test)]
mod test_utils;

use std::{str::FromStr, sync::Arc};

use actix_files::Files;
use actix_web::{middleware, web, App, HttpServer};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::{
    auth::AuthProvider, config::Config, gateway::Gateway, session::SessionProvider,
    state::AppState, storage::ImageStore,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(err) = run().await {
        eprintln!("Startup error: {err}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            return Err(err.into());
        }
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env();
    db::ensure_sqlite_dir(&config.database_url)?;

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options)
        .await?;

    db::run_migrations(&pool).await?;

    let auth = AuthProvider::new(pool.clone(), config.session_ttl());
    db::seed_defaults(&pool, &auth, &config).await?;
    let sessions = SessionProvider::start(&auth).await;

    let storage = ImageStore::new(config.upload_dir.clone());
    storage.ensure_root().await?;

    let upload_dir = config.upload_dir.clone();
    let address = format!("0.0.0.0:{}", config.port);
    let state = AppState {
        gateway: Gateway::new(pool),
        auth,
        sessions: Arc::clone(&sessions),
        storage,
        config: Arc::new(config),
    };

    log::info!("Starting {} on http://{address}", state.config.shop_name);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(middleware::Logger::default())
            .service(Files::new("/static", "./static").prefer_utf8(true))
            .service(Files::new(storage::PUBLIC_PREFIX, upload_dir.clone()))
            .configure(routes::public::configure)
            .configure(routes::booking::configure)
            .configure(routes::admin::configure)
    })
    .bind(address)?
    .run()
    .await?;

    sessions.shutdown();
    Ok(())
}
