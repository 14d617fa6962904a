use axum::{Json, debug_handler, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    auth::{self, Caller, ProfileRef},
    error::{ApiError, ApiResult},
    locations::{self, NewLocation},
    profiles,
};

use super::{MeetingDetail, detail, find_for};

#[derive(Debug, Deserialize)]
pub struct ProposeMeeting {
    /// The other side of the engagement, a tutor id for students and a
    /// student id for tutors.
    pub counterpart_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub starts_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub ends_at: OffsetDateTime,
    #[serde(default)]
    pub location: Option<NewLocation>,
}

/// Creates a meeting between the caller and a matched counterpart, stamping
/// the caller's own acceptance. The optional venue is created in the same
/// transaction.
pub async fn propose_meeting(
    pool: &SqlitePool,
    caller: &Caller,
    payload: ProposeMeeting,
) -> ApiResult<MeetingDetail> {
    let profile = caller.profile()?;
    if payload.starts_at >= payload.ends_at {
        return Err(ApiError::validation("start date must be before end date"));
    }

    let (student_id, tutor_id) = match profile {
        ProfileRef::Student(sid) => (sid, payload.counterpart_id),
        ProfileRef::Tutor(tid) => (payload.counterpart_id, tid),
    };
    if !profiles::is_matched(pool, student_id, tutor_id).await? {
        return Err(match profile {
            ProfileRef::Student(_) => ApiError::forbidden("tutor not in my tutors"),
            ProfileRef::Tutor(_) => ApiError::forbidden("student not in my students"),
        });
    }

    let now = OffsetDateTime::now_utc();
    let (student_accepted_at, tutor_accepted_at) = match profile {
        ProfileRef::Student(_) => (Some(now), None),
        ProfileRef::Tutor(_) => (None, Some(now)),
    };

    let mut tx = pool.begin().await?;
    let location = match &payload.location {
        Some(loc) => Some(locations::insert_location(&mut tx, None, loc).await?),
        None => None,
    };
    let meeting_id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO meetings (id, student_id, tutor_id, starts_at, ends_at, \
         student_accepted_at, tutor_accepted_at, location_id) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(meeting_id)
    .bind(student_id)
    .bind(tutor_id)
    .bind(payload.starts_at)
    .bind(payload.ends_at)
    .bind(student_accepted_at)
    .bind(tutor_accepted_at)
    .bind(location.as_ref().map(|l| l.id))
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    tracing::info!(meeting = %meeting_id, "meeting proposed");

    let meeting = find_for(pool, profile, meeting_id).await?;
    detail(pool, meeting).await
}

#[debug_handler]
pub(crate) async fn create(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(payload): Json<ProposeMeeting>,
) -> ApiResult<impl IntoResponse> {
    let caller = auth::require_caller(&db_pool, &session).await?;
    let created = propose_meeting(&db_pool, &caller, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}
