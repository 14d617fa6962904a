use axum::{
    Json, debug_handler,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use time::Date;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    auth::{self, Account, Caller, ProfileRef},
    error::{ApiError, ApiResult},
    locations::{self, Location, NewLocation},
    models::{HourlyRate, Level, Role},
};

use super::{StudentCard, TutorCard, claim_role, my_student_cards, release_role, tutor_card};

#[derive(Debug, Deserialize)]
pub struct NewTutor {
    #[serde(default)]
    pub date_of_birth: Option<Date>,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub hourly_rate: Option<HourlyRate>,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub level: Option<Level>,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default)]
    pub locations: Vec<NewLocation>,
}

fn default_available() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct TutorProfileView {
    pub id: Uuid,
    pub display_name: String,
    pub date_of_birth: Option<Date>,
    pub gender: String,
    pub hourly_rate: Option<HourlyRate>,
    pub subjects: Vec<String>,
    pub level: Option<Level>,
    pub available: bool,
    pub rating: f64,
    pub locations: Vec<Location>,
    pub my_students: Vec<StudentCard>,
}

pub async fn create_tutor_profile(
    pool: &SqlitePool,
    caller: &Caller,
    payload: NewTutor,
) -> ApiResult<TutorProfileView> {
    let mut tx = pool.begin().await?;
    claim_role(&mut tx, caller.account.id, Role::Tutor).await?;

    let tutor_id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO tutors (id, account_id, date_of_birth, gender, hourly_rate_cents, \
         subjects, level, available) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(tutor_id)
    .bind(caller.account.id)
    .bind(payload.date_of_birth)
    .bind(payload.gender.trim())
    .bind(payload.hourly_rate)
    .bind(sqlx::types::Json(&payload.subjects))
    .bind(payload.level)
    .bind(payload.available)
    .execute(&mut *tx)
    .await?;
    for loc in &payload.locations {
        locations::insert_location(&mut tx, Some(ProfileRef::Tutor(tutor_id)), loc).await?;
    }
    tx.commit().await?;
    tracing::info!(account = %caller.account.username, "tutor profile created");

    tutor_view(pool, &caller.account, tutor_id).await
}

#[derive(sqlx::FromRow)]
struct TutorRow {
    date_of_birth: Option<Date>,
    gender: String,
    hourly_rate: Option<HourlyRate>,
    subjects: sqlx::types::Json<Vec<String>>,
    level: Option<Level>,
    available: bool,
}

pub(crate) async fn tutor_view(
    pool: &SqlitePool,
    account: &Account,
    tutor_id: Uuid,
) -> ApiResult<TutorProfileView> {
    let row: TutorRow = sqlx::query_as(
        "SELECT date_of_birth, gender, hourly_rate_cents AS hourly_rate, subjects, level, \
         available FROM tutors WHERE id = ?",
    )
    .bind(tutor_id)
    .fetch_one(pool)
    .await?;
    let locations = locations::locations_of(pool, ProfileRef::Tutor(tutor_id)).await?;
    let my_students = my_student_cards(pool, tutor_id).await?;
    let rating = tutor_rating(pool, tutor_id).await?;

    Ok(TutorProfileView {
        id: tutor_id,
        display_name: account.display_name.clone(),
        date_of_birth: row.date_of_birth,
        gender: row.gender,
        hourly_rate: row.hourly_rate,
        subjects: row.subjects.0,
        level: row.level,
        available: row.available,
        rating,
        locations,
        my_students,
    })
}

pub(crate) async fn tutor_rating(pool: &SqlitePool, tutor_id: Uuid) -> Result<f64, sqlx::Error> {
    let (rating,): (f64,) = sqlx::query_as(
        "SELECT COALESCE(AVG(r.rating), 0.0) FROM reviews r \
         JOIN meetings m ON m.id = r.meeting_id WHERE m.tutor_id = ?",
    )
    .bind(tutor_id)
    .fetch_one(pool)
    .await?;
    Ok(rating)
}

pub async fn delete_tutor_profile(
    pool: &SqlitePool,
    caller: &Caller,
    tutor_id: Uuid,
) -> ApiResult<()> {
    let Some((account_id,)): Option<(Uuid,)> =
        sqlx::query_as("SELECT account_id FROM tutors WHERE id = ?")
            .bind(tutor_id)
            .fetch_optional(pool)
            .await?
    else {
        return Err(ApiError::not_found("no such tutor"));
    };
    if account_id != caller.account.id {
        return Err(ApiError::forbidden("not your profile"));
    }

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM locations WHERE tutor_id = ?")
        .bind(tutor_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM tutors WHERE id = ?")
        .bind(tutor_id)
        .execute(&mut *tx)
        .await?;
    release_role(&mut tx, account_id).await?;
    tx.commit().await?;
    tracing::info!(account = %caller.account.username, "tutor profile deleted");
    Ok(())
}

pub async fn tutor_detail_card(pool: &SqlitePool, tutor_id: Uuid) -> ApiResult<TutorCard> {
    let Some(card) = tutor_card(pool, tutor_id).await? else {
        return Err(ApiError::not_found("no such tutor"));
    };
    Ok(card)
}

#[debug_handler]
pub(crate) async fn create_tutor(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(payload): Json<NewTutor>,
) -> ApiResult<impl IntoResponse> {
    let caller = auth::require_caller(&db_pool, &session).await?;
    let view = create_tutor_profile(&db_pool, &caller, payload).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[debug_handler]
pub(crate) async fn delete_tutor(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(tutor_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let caller = auth::require_caller(&db_pool, &session).await?;
    delete_tutor_profile(&db_pool, &caller, tutor_id).await?;
    Ok(Json(json!({ "status": "profile deleted" })))
}

#[debug_handler]
pub(crate) async fn tutor_detail(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(tutor_id): Path<Uuid>,
) -> ApiResult<Json<TutorCard>> {
    auth::require_caller(&db_pool, &session).await?;
    Ok(Json(tutor_detail_card(&db_pool, tutor_id).await?))
}
