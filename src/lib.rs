pub mod auth;
pub mod config;
pub mod db;
pub mod discovery;
pub mod error;
pub mod geo;
pub mod locations;
pub mod meetings;
pub mod messages;
pub mod models;
pub mod profiles;
pub mod session;

use axum::{Router, extract::FromRef};
use sqlx::SqlitePool;
use time::Duration;
use tower_http::cors::CorsLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::SameSite};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
}

/// The full application router with session and CORS layers applied.
pub fn app(db_pool: SqlitePool) -> Router {
    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(Duration::hours(2)));

    Router::new()
        .merge(auth::router())
        .merge(profiles::router())
        .merge(locations::router())
        .merge(discovery::router())
        .nest("/meetings", meetings::router())
        .nest("/messages", messages::router())
        .with_state(AppState { db_pool })
        .layer(session_layer)
        .layer(CorsLayer::permissive())
}
