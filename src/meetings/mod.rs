//! The engagement lifecycle. A meeting is proposed by one side, confirmed
//! by mutual acceptance, and cancelled or reopened per side; every state is
//! derived from the four timestamps, never stored.

mod propose;
mod review;
mod transitions;

pub use propose::{ProposeMeeting, propose_meeting};
pub use review::{Review, ReviewInput, delete_review, upsert_review};
pub use transitions::{accept_meeting, cancel_meeting, reopen_meeting};

use std::cmp::Reverse;

use axum::{
    Json, Router, debug_handler,
    extract::{Query, State},
    routing::{delete, post},
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    AppState,
    auth::{self, Caller, ProfileRef},
    error::{ApiError, ApiResult},
    locations::Location,
    models::Role,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(propose::create).get(list))
        .route("/{id}", delete(transitions::destroy))
        .route("/{id}/accept", post(transitions::accept))
        .route(
            "/{id}/cancel",
            post(transitions::cancel).delete(transitions::reopen),
        )
        .route(
            "/{id}/review",
            post(review::upsert).put(review::upsert).delete(review::destroy),
        )
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Meeting {
    pub id: Uuid,
    pub student_id: Uuid,
    pub tutor_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub starts_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub ends_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub student_accepted_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub student_cancelled_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub tutor_accepted_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub tutor_cancelled_at: Option<OffsetDateTime>,
    pub location_id: Option<Uuid>,
}

/// The bucket a meeting lands in from one side's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    Past,
    Future,
    Requests,
}

impl Meeting {
    pub fn is_accepted(&self) -> bool {
        self.student_accepted_at.is_some() && self.tutor_accepted_at.is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        self.student_cancelled_at.is_some() || self.tutor_cancelled_at.is_some()
    }

    fn own_accepted(&self, side: Role) -> Option<OffsetDateTime> {
        match side {
            Role::Student => self.student_accepted_at,
            Role::Tutor => self.tutor_accepted_at,
        }
    }

    fn own_cancelled(&self, side: Role) -> Option<OffsetDateTime> {
        match side {
            Role::Student => self.student_cancelled_at,
            Role::Tutor => self.tutor_cancelled_at,
        }
    }

    /// The single derivation site for the past/future/requests partition.
    /// Ended meetings are past no matter their stamps; upcoming ones are
    /// future once the caller accepted and nobody cancelled, requests while
    /// the caller has neither accepted nor cancelled, hidden otherwise.
    pub fn bucket(&self, side: Role, now: OffsetDateTime) -> Option<View> {
        if self.ends_at < now {
            return Some(View::Past);
        }
        if self.own_accepted(side).is_some() && !self.is_cancelled() {
            return Some(View::Future);
        }
        if self.own_accepted(side).is_none() && self.own_cancelled(side).is_none() {
            return Some(View::Requests);
        }
        None
    }
}

#[derive(Debug, Serialize)]
pub struct MeetingDetail {
    #[serde(flatten)]
    pub meeting: Meeting,
    pub is_accepted: bool,
    pub is_cancelled: bool,
    pub location: Option<Location>,
    pub review: Option<Review>,
}

const MEETING_COLS: &str = "id, student_id, tutor_id, starts_at, ends_at, \
    student_accepted_at, student_cancelled_at, tutor_accepted_at, tutor_cancelled_at, \
    location_id";

/// Fetches a meeting scoped to the caller's side of it. Another pair's
/// meeting is indistinguishable from a missing one.
pub(crate) async fn find_for(
    pool: &SqlitePool,
    profile: ProfileRef,
    meeting_id: Uuid,
) -> ApiResult<Meeting> {
    let sql = match profile {
        ProfileRef::Student(_) => {
            format!("SELECT {MEETING_COLS} FROM meetings WHERE id = ? AND student_id = ?")
        }
        ProfileRef::Tutor(_) => {
            format!("SELECT {MEETING_COLS} FROM meetings WHERE id = ? AND tutor_id = ?")
        }
    };
    let Some(meeting) = sqlx::query_as::<_, Meeting>(&sql)
        .bind(meeting_id)
        .bind(profile.id())
        .fetch_optional(pool)
        .await?
    else {
        return Err(ApiError::not_found("no such meeting"));
    };
    Ok(meeting)
}

pub(crate) async fn detail(pool: &SqlitePool, meeting: Meeting) -> ApiResult<MeetingDetail> {
    let location = match meeting.location_id {
        Some(id) => {
            sqlx::query_as::<_, Location>(
                "SELECT id, address, google_id, latitude, longitude FROM locations WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(pool)
            .await?
        }
        None => None,
    };
    let review = review::review_of(pool, meeting.id).await?;

    Ok(MeetingDetail {
        is_accepted: meeting.is_accepted(),
        is_cancelled: meeting.is_cancelled(),
        meeting,
        location,
        review,
    })
}

/// The caller's meetings, filtered to one view when asked. Past runs newest
/// ended first, the other views soonest first.
pub async fn list_meetings(
    pool: &SqlitePool,
    caller: &Caller,
    view: Option<View>,
) -> ApiResult<Vec<MeetingDetail>> {
    let profile = caller.profile()?;
    let sql = match profile {
        ProfileRef::Student(_) => {
            format!("SELECT {MEETING_COLS} FROM meetings WHERE student_id = ?")
        }
        ProfileRef::Tutor(_) => format!("SELECT {MEETING_COLS} FROM meetings WHERE tutor_id = ?"),
    };
    let mut meetings: Vec<Meeting> =
        sqlx::query_as(&sql).bind(profile.id()).fetch_all(pool).await?;

    if let Some(view) = view {
        let now = OffsetDateTime::now_utc();
        let side = profile.role();
        meetings.retain(|m| m.bucket(side, now) == Some(view));
        match view {
            View::Past => meetings.sort_by_key(|m| Reverse(m.ends_at)),
            View::Future | View::Requests => meetings.sort_by_key(|m| m.starts_at),
        }
    } else {
        meetings.sort_by_key(|m| m.starts_at);
    }

    let mut details = Vec::with_capacity(meetings.len());
    for meeting in meetings {
        details.push(detail(pool, meeting).await?);
    }
    Ok(details)
}

#[derive(Deserialize)]
pub(crate) struct ListQuery {
    view: Option<View>,
}

#[debug_handler]
pub(crate) async fn list(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Query(ListQuery { view }): Query<ListQuery>,
) -> ApiResult<Json<Vec<MeetingDetail>>> {
    let caller = auth::require_caller(&db_pool, &session).await?;
    Ok(Json(list_meetings(&db_pool, &caller, view).await?))
}
