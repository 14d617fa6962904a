//! Tutor discovery. One SQL pass collects the available candidates with
//! their live rating; the optional filters run here, where the typed values
//! live.

use axum::{
    Json, Router, debug_handler,
    extract::{Query, State},
    routing::get,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{
    AppState, auth,
    error::ApiResult,
    geo,
    models::{HourlyRate, Level},
    profiles::{self, TutorCard},
};

/// Proximity cut-off for the `near` filter.
const SEARCH_RADIUS_KM: f64 = 10.0;

pub fn router() -> Router<AppState> {
    Router::new().route("/tutors/search", get(search))
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchFilters {
    /// Price ceiling; tutors without a rate are excluded when set.
    pub hourly_rate: Option<HourlyRate>,
    /// Exact subject match; blank input switches the filter off.
    pub subject: Option<String>,
    /// Minimum qualification; higher levels qualify too.
    pub level: Option<Level>,
    /// Rating floor.
    pub rating: Option<f64>,
    /// `lon,lat` point; unparsable input switches the filter off.
    pub near: Option<String>,
}

pub async fn search_tutors(pool: &SqlitePool, filters: &SearchFilters) -> ApiResult<Vec<TutorCard>> {
    let mut cards = profiles::available_tutor_cards(pool).await?;

    if let Some(ceiling) = filters.hourly_rate {
        cards.retain(|c| c.hourly_rate.is_some_and(|rate| rate <= ceiling));
    }
    if let Some(subject) = filters.subject.as_deref().map(str::trim) {
        if !subject.is_empty() {
            cards.retain(|c| c.subjects.iter().any(|s| s == subject));
        }
    }
    if let Some(level) = filters.level {
        cards.retain(|c| c.level.is_some_and(|l| l >= level));
    }
    if let Some(floor) = filters.rating {
        cards.retain(|c| c.rating >= floor);
    }
    if let Some(point) = filters.near.as_deref().and_then(geo::parse_point) {
        cards.retain_mut(|c| {
            let nearest = c
                .locations
                .iter()
                .filter_map(|l| l.point())
                .map(|p| p.distance_km(&point))
                .min_by(f64::total_cmp);
            match nearest {
                Some(d) if d <= SEARCH_RADIUS_KM => {
                    c.distance_km = Some(d);
                    true
                }
                _ => false,
            }
        });
    }

    Ok(cards)
}

#[debug_handler]
pub(crate) async fn search(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Query(filters): Query<SearchFilters>,
) -> ApiResult<Json<Vec<TutorCard>>> {
    auth::require_caller(&db_pool, &session).await?;
    Ok(Json(search_tutors(&db_pool, &filters).await?))
}
