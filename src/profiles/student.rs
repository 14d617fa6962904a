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
    messages,
    models::Role,
};

use super::{TutorCard, claim_role, my_tutor_cards, release_role};

#[derive(Debug, Deserialize)]
pub struct NewStudent {
    #[serde(default)]
    pub date_of_birth: Option<Date>,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub locations: Vec<NewLocation>,
}

#[derive(Debug, Serialize)]
pub struct StudentProfileView {
    pub id: Uuid,
    pub display_name: String,
    pub date_of_birth: Option<Date>,
    pub gender: String,
    pub locations: Vec<Location>,
    pub my_tutors: Vec<TutorCard>,
}

/// Creates the student profile with its initial locations and claims the
/// account role, all in one transaction.
pub async fn create_student_profile(
    pool: &SqlitePool,
    caller: &Caller,
    payload: NewStudent,
) -> ApiResult<StudentProfileView> {
    let mut tx = pool.begin().await?;
    claim_role(&mut tx, caller.account.id, Role::Student).await?;

    let student_id = Uuid::now_v7();
    sqlx::query("INSERT INTO students (id, account_id, date_of_birth, gender) VALUES (?, ?, ?, ?)")
        .bind(student_id)
        .bind(caller.account.id)
        .bind(payload.date_of_birth)
        .bind(payload.gender.trim())
        .execute(&mut *tx)
        .await?;
    for loc in &payload.locations {
        locations::insert_location(&mut tx, Some(ProfileRef::Student(student_id)), loc).await?;
    }
    tx.commit().await?;
    tracing::info!(account = %caller.account.username, "student profile created");

    student_view(pool, &caller.account, student_id).await
}

pub(crate) async fn student_view(
    pool: &SqlitePool,
    account: &Account,
    student_id: Uuid,
) -> ApiResult<StudentProfileView> {
    let (date_of_birth, gender): (Option<Date>, String) =
        sqlx::query_as("SELECT date_of_birth, gender FROM students WHERE id = ?")
            .bind(student_id)
            .fetch_one(pool)
            .await?;
    let locations = locations::locations_of(pool, ProfileRef::Student(student_id)).await?;
    let my_tutors = my_tutor_cards(pool, student_id).await?;

    Ok(StudentProfileView {
        id: student_id,
        display_name: account.display_name.clone(),
        date_of_birth,
        gender,
        locations,
        my_tutors,
    })
}

/// Deletes the profile, its locations, and releases the account role.
/// Owner only; meetings cascade away, thread sides null out.
pub async fn delete_student_profile(
    pool: &SqlitePool,
    caller: &Caller,
    student_id: Uuid,
) -> ApiResult<()> {
    let Some((account_id,)): Option<(Uuid,)> =
        sqlx::query_as("SELECT account_id FROM students WHERE id = ?")
            .bind(student_id)
            .fetch_optional(pool)
            .await?
    else {
        return Err(ApiError::not_found("no such student"));
    };
    if account_id != caller.account.id {
        return Err(ApiError::forbidden("not your profile"));
    }

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM locations WHERE student_id = ?")
        .bind(student_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM students WHERE id = ?")
        .bind(student_id)
        .execute(&mut *tx)
        .await?;
    release_role(&mut tx, account_id).await?;
    tx.commit().await?;
    tracing::info!(account = %caller.account.username, "student profile deleted");
    Ok(())
}

/// Links the tutor into the caller's my-tutors set and makes sure the pair's
/// message thread exists. Safe to repeat.
pub async fn add_to_my_tutors(pool: &SqlitePool, caller: &Caller, tutor_id: Uuid) -> ApiResult<()> {
    let student_id = caller.student_id()?;
    if sqlx::query("SELECT 1 FROM tutors WHERE id = ?")
        .bind(tutor_id)
        .fetch_optional(pool)
        .await?
        .is_none()
    {
        return Err(ApiError::not_found("no such tutor"));
    }

    let mut tx = pool.begin().await?;
    sqlx::query("INSERT OR IGNORE INTO student_tutors (student_id, tutor_id) VALUES (?, ?)")
        .bind(student_id)
        .bind(tutor_id)
        .execute(&mut *tx)
        .await?;
    messages::ensure_thread(&mut tx, student_id, tutor_id).await?;
    tx.commit().await?;
    Ok(())
}

/// Unlinks the tutor. The message thread and its history stay.
pub async fn remove_from_my_tutors(
    pool: &SqlitePool,
    caller: &Caller,
    tutor_id: Uuid,
) -> ApiResult<()> {
    let student_id = caller.student_id()?;
    if sqlx::query("SELECT 1 FROM tutors WHERE id = ?")
        .bind(tutor_id)
        .fetch_optional(pool)
        .await?
        .is_none()
    {
        return Err(ApiError::not_found("no such tutor"));
    }

    sqlx::query("DELETE FROM student_tutors WHERE student_id = ? AND tutor_id = ?")
        .bind(student_id)
        .bind(tutor_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[debug_handler]
pub(crate) async fn create_student(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(payload): Json<NewStudent>,
) -> ApiResult<impl IntoResponse> {
    let caller = auth::require_caller(&db_pool, &session).await?;
    let view = create_student_profile(&db_pool, &caller, payload).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[debug_handler]
pub(crate) async fn delete_student(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(student_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let caller = auth::require_caller(&db_pool, &session).await?;
    delete_student_profile(&db_pool, &caller, student_id).await?;
    Ok(Json(json!({ "status": "profile deleted" })))
}

#[debug_handler]
pub(crate) async fn add_my_tutor(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(tutor_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let caller = auth::require_caller(&db_pool, &session).await?;
    add_to_my_tutors(&db_pool, &caller, tutor_id).await?;
    Ok(Json(json!({ "status": "tutor added to my tutors" })))
}

#[debug_handler]
pub(crate) async fn remove_my_tutor(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(tutor_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let caller = auth::require_caller(&db_pool, &session).await?;
    remove_from_my_tutors(&db_pool, &caller, tutor_id).await?;
    Ok(Json(json!({ "status": "tutor removed from my tutors" })))
}
