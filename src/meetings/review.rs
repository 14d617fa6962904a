use axum::{
    Json, debug_handler,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    auth::{self, Caller, ProfileRef},
    error::{ApiError, ApiResult},
};

use super::find_for;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Review {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub rating: i64,
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct ReviewInput {
    pub rating: i64,
    #[serde(default)]
    pub comment: String,
}

pub(crate) async fn review_of(
    pool: &SqlitePool,
    meeting_id: Uuid,
) -> Result<Option<Review>, sqlx::Error> {
    sqlx::query_as("SELECT id, meeting_id, rating, comment FROM reviews WHERE meeting_id = ?")
        .bind(meeting_id)
        .fetch_optional(pool)
        .await
}

/// Creates or overwrites the meeting's review. Student side only, and only
/// once the meeting has ended.
pub async fn upsert_review(
    pool: &SqlitePool,
    caller: &Caller,
    meeting_id: Uuid,
    input: ReviewInput,
) -> ApiResult<Review> {
    let profile = caller.profile()?;
    let ProfileRef::Student(_) = profile else {
        return Err(ApiError::forbidden("only the student may review a meeting"));
    };
    let meeting = find_for(pool, profile, meeting_id).await?;

    if meeting.ends_at >= OffsetDateTime::now_utc() {
        return Err(ApiError::validation("cannot review meetings in the future"));
    }
    if !(0..=5).contains(&input.rating) {
        return Err(ApiError::validation("rating must be between 0 and 5"));
    }

    let review = sqlx::query_as::<_, Review>(
        "INSERT INTO reviews (id, meeting_id, rating, comment) VALUES (?, ?, ?, ?) \
         ON CONFLICT(meeting_id) DO UPDATE \
         SET rating = excluded.rating, comment = excluded.comment \
         RETURNING id, meeting_id, rating, comment",
    )
    .bind(Uuid::now_v7())
    .bind(meeting_id)
    .bind(input.rating)
    .bind(input.comment.trim())
    .fetch_one(pool)
    .await?;
    Ok(review)
}

/// Removes the review when present. Returns false when there was none;
/// that is a no-op, not an error.
pub async fn delete_review(
    pool: &SqlitePool,
    caller: &Caller,
    meeting_id: Uuid,
) -> ApiResult<bool> {
    let profile = caller.profile()?;
    let ProfileRef::Student(_) = profile else {
        return Err(ApiError::forbidden("only the student may review a meeting"));
    };
    find_for(pool, profile, meeting_id).await?;

    let result = sqlx::query("DELETE FROM reviews WHERE meeting_id = ?")
        .bind(meeting_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[debug_handler]
pub(crate) async fn upsert(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(meeting_id): Path<Uuid>,
    Json(input): Json<ReviewInput>,
) -> ApiResult<Json<Review>> {
    let caller = auth::require_caller(&db_pool, &session).await?;
    Ok(Json(upsert_review(&db_pool, &caller, meeting_id, input).await?))
}

#[debug_handler]
pub(crate) async fn destroy(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(meeting_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let caller = auth::require_caller(&db_pool, &session).await?;
    let status = if delete_review(&db_pool, &caller, meeting_id).await? {
        "review deleted"
    } else {
        "no review to delete"
    };
    Ok(Json(json!({ "status": status })))
}
