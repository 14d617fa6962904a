//! Owned locations. Coordinates are stored raw; the geodetic point is
//! derived on demand so it can never go stale relative to the columns.

use axum::{
    Json, Router, debug_handler,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    AppState,
    auth::{self, Caller, ProfileRef},
    error::{ApiError, ApiResult},
    geo::GeoPoint,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/locations", get(list).post(add))
        .route("/locations/{id}", put(update).delete(destroy))
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Location {
    pub id: Uuid,
    pub address: String,
    pub google_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn point(&self) -> Option<GeoPoint> {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Deserialize)]
pub struct NewLocation {
    pub address: String,
    #[serde(default)]
    pub google_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl NewLocation {
    fn validate(&self) -> ApiResult<()> {
        if self.address.trim().is_empty() {
            return Err(ApiError::validation("address must not be empty"));
        }
        if GeoPoint::new(self.latitude, self.longitude).is_none() {
            return Err(ApiError::validation("coordinates out of range"));
        }
        Ok(())
    }
}

/// Inserts a location, owned or free-standing (meeting venues have no
/// owner). Runs on the caller's transaction so profile and meeting creation
/// stay atomic.
pub(crate) async fn insert_location(
    conn: &mut sqlx::SqliteConnection,
    owner: Option<ProfileRef>,
    loc: &NewLocation,
) -> ApiResult<Location> {
    loc.validate()?;

    let id = Uuid::now_v7();
    let (student_id, tutor_id) = match owner {
        Some(ProfileRef::Student(sid)) => (Some(sid), None),
        Some(ProfileRef::Tutor(tid)) => (None, Some(tid)),
        None => (None, None),
    };
    sqlx::query(
        "INSERT INTO locations (id, address, google_id, latitude, longitude, student_id, tutor_id) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(loc.address.trim())
    .bind(&loc.google_id)
    .bind(loc.latitude)
    .bind(loc.longitude)
    .bind(student_id)
    .bind(tutor_id)
    .execute(&mut *conn)
    .await?;

    Ok(Location {
        id,
        address: loc.address.trim().to_string(),
        google_id: loc.google_id.clone(),
        latitude: loc.latitude,
        longitude: loc.longitude,
    })
}

pub(crate) async fn locations_of(
    pool: &SqlitePool,
    owner: ProfileRef,
) -> Result<Vec<Location>, sqlx::Error> {
    let sql = match owner {
        ProfileRef::Student(_) => {
            "SELECT id, address, google_id, latitude, longitude FROM locations WHERE student_id = ?"
        }
        ProfileRef::Tutor(_) => {
            "SELECT id, address, google_id, latitude, longitude FROM locations WHERE tutor_id = ?"
        }
    };
    sqlx::query_as(sql).bind(owner.id()).fetch_all(pool).await
}

/// The caller's own locations.
pub async fn list_locations(pool: &SqlitePool, caller: &Caller) -> ApiResult<Vec<Location>> {
    Ok(locations_of(pool, caller.profile()?).await?)
}

/// Adds a location owned by the caller's profile.
pub async fn add_location(
    pool: &SqlitePool,
    caller: &Caller,
    payload: &NewLocation,
) -> ApiResult<Location> {
    let profile = caller.profile()?;

    let mut tx = pool.begin().await?;
    let location = insert_location(&mut tx, Some(profile), payload).await?;
    tx.commit().await?;

    Ok(location)
}

/// Rewrites one of the caller's locations. The update is scoped to the
/// caller's profile; another profile's location is indistinguishable from
/// a missing one.
pub async fn update_location(
    pool: &SqlitePool,
    caller: &Caller,
    location_id: Uuid,
    payload: &NewLocation,
) -> ApiResult<Location> {
    let profile = caller.profile()?;
    payload.validate()?;

    let sql = match profile {
        ProfileRef::Student(_) => {
            "UPDATE locations SET address = ?, google_id = ?, latitude = ?, longitude = ? \
             WHERE id = ? AND student_id = ?"
        }
        ProfileRef::Tutor(_) => {
            "UPDATE locations SET address = ?, google_id = ?, latitude = ?, longitude = ? \
             WHERE id = ? AND tutor_id = ?"
        }
    };
    let result = sqlx::query(sql)
        .bind(payload.address.trim())
        .bind(&payload.google_id)
        .bind(payload.latitude)
        .bind(payload.longitude)
        .bind(location_id)
        .bind(profile.id())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("no such location"));
    }

    Ok(Location {
        id: location_id,
        address: payload.address.trim().to_string(),
        google_id: payload.google_id.clone(),
        latitude: payload.latitude,
        longitude: payload.longitude,
    })
}

/// Removes one of the caller's locations; scoped like update.
pub async fn delete_location(
    pool: &SqlitePool,
    caller: &Caller,
    location_id: Uuid,
) -> ApiResult<()> {
    let profile = caller.profile()?;

    let sql = match profile {
        ProfileRef::Student(_) => "DELETE FROM locations WHERE id = ? AND student_id = ?",
        ProfileRef::Tutor(_) => "DELETE FROM locations WHERE id = ? AND tutor_id = ?",
    };
    let result = sqlx::query(sql)
        .bind(location_id)
        .bind(profile.id())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("no such location"));
    }
    Ok(())
}

#[debug_handler]
pub(crate) async fn list(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> ApiResult<Json<Vec<Location>>> {
    let caller = auth::require_caller(&db_pool, &session).await?;
    Ok(Json(list_locations(&db_pool, &caller).await?))
}

#[debug_handler]
pub(crate) async fn add(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(payload): Json<NewLocation>,
) -> ApiResult<impl IntoResponse> {
    let caller = auth::require_caller(&db_pool, &session).await?;
    let location = add_location(&db_pool, &caller, &payload).await?;
    Ok((StatusCode::CREATED, Json(location)))
}

#[debug_handler]
pub(crate) async fn update(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(location_id): Path<Uuid>,
    Json(payload): Json<NewLocation>,
) -> ApiResult<Json<Location>> {
    let caller = auth::require_caller(&db_pool, &session).await?;
    Ok(Json(
        update_location(&db_pool, &caller, location_id, &payload).await?,
    ))
}

#[debug_handler]
pub(crate) async fn destroy(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(location_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let caller = auth::require_caller(&db_pool, &session).await?;
    delete_location(&db_pool, &caller, location_id).await?;
    Ok(Json(json!({ "status": "location deleted" })))
}
