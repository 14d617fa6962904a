use axum::{
    Json, debug_handler,
    extract::{Path, State},
};
use serde_json::json;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    auth::{self, Caller, ProfileRef},
    error::ApiResult,
};

use super::find_for;

/// Stamps the caller's own acceptance. Repeats just refresh the stamp.
pub async fn accept_meeting(pool: &SqlitePool, caller: &Caller, meeting_id: Uuid) -> ApiResult<()> {
    let profile = caller.profile()?;
    find_for(pool, profile, meeting_id).await?;

    let sql = match profile {
        ProfileRef::Student(_) => "UPDATE meetings SET student_accepted_at = ? WHERE id = ?",
        ProfileRef::Tutor(_) => "UPDATE meetings SET tutor_accepted_at = ? WHERE id = ?",
    };
    sqlx::query(sql)
        .bind(OffsetDateTime::now_utc())
        .bind(meeting_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Stamps the caller's own cancellation. The other side's stamps are never
/// touched.
pub async fn cancel_meeting(pool: &SqlitePool, caller: &Caller, meeting_id: Uuid) -> ApiResult<()> {
    let profile = caller.profile()?;
    find_for(pool, profile, meeting_id).await?;

    let sql = match profile {
        ProfileRef::Student(_) => "UPDATE meetings SET student_cancelled_at = ? WHERE id = ?",
        ProfileRef::Tutor(_) => "UPDATE meetings SET tutor_cancelled_at = ? WHERE id = ?",
    };
    sqlx::query(sql)
        .bind(OffsetDateTime::now_utc())
        .bind(meeting_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Clears the caller's own cancellation. Returns false when there was
/// nothing to clear.
pub async fn reopen_meeting(
    pool: &SqlitePool,
    caller: &Caller,
    meeting_id: Uuid,
) -> ApiResult<bool> {
    let profile = caller.profile()?;
    let meeting = find_for(pool, profile, meeting_id).await?;

    let was_cancelled = match profile {
        ProfileRef::Student(_) => meeting.student_cancelled_at.is_some(),
        ProfileRef::Tutor(_) => meeting.tutor_cancelled_at.is_some(),
    };
    if !was_cancelled {
        return Ok(false);
    }

    let sql = match profile {
        ProfileRef::Student(_) => "UPDATE meetings SET student_cancelled_at = NULL WHERE id = ?",
        ProfileRef::Tutor(_) => "UPDATE meetings SET tutor_cancelled_at = NULL WHERE id = ?",
    };
    sqlx::query(sql).bind(meeting_id).execute(pool).await?;
    Ok(true)
}

#[debug_handler]
pub(crate) async fn accept(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(meeting_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let caller = auth::require_caller(&db_pool, &session).await?;
    accept_meeting(&db_pool, &caller, meeting_id).await?;
    Ok(Json(json!({ "status": "meeting accepted" })))
}

#[debug_handler]
pub(crate) async fn cancel(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(meeting_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let caller = auth::require_caller(&db_pool, &session).await?;
    cancel_meeting(&db_pool, &caller, meeting_id).await?;
    Ok(Json(json!({ "status": "meeting cancelled" })))
}

#[debug_handler]
pub(crate) async fn reopen(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(meeting_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let caller = auth::require_caller(&db_pool, &session).await?;
    let status = if reopen_meeting(&db_pool, &caller, meeting_id).await? {
        "meeting reopened"
    } else {
        "meeting was not cancelled"
    };
    Ok(Json(json!({ "status": status })))
}

/// DELETE on the meeting itself; destroying is cancelling your own side.
#[debug_handler]
pub(crate) async fn destroy(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(meeting_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let caller = auth::require_caller(&db_pool, &session).await?;
    cancel_meeting(&db_pool, &caller, meeting_id).await?;
    Ok(Json(json!({ "status": "meeting cancelled" })))
}
