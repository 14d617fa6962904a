//! Per-pair message threads. A thread exists once per (student, tutor) pair
//! and outlives the match; profile deletion nulls its side and keeps the
//! history.

use axum::{
    Json, Router, debug_handler,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
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
    models::Role,
    profiles,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(threads))
        .route("/{counterpart_id}", get(list).post(send))
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Message {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub sent_by: Role,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ThreadSummary {
    pub id: Uuid,
    pub student_id: Option<Uuid>,
    pub tutor_id: Option<Uuid>,
}

fn pair_of(profile: ProfileRef, counterpart_id: Uuid) -> (Uuid, Uuid) {
    match profile {
        ProfileRef::Student(sid) => (sid, counterpart_id),
        ProfileRef::Tutor(tid) => (counterpart_id, tid),
    }
}

/// Get-or-create the pair's thread. Runs on the caller's transaction so
/// matching and thread creation land together. Insert-or-ignore first, then
/// read back, so racing first contacts converge on one row instead of
/// tripping the unique pair constraint.
pub(crate) async fn ensure_thread(
    conn: &mut sqlx::SqliteConnection,
    student_id: Uuid,
    tutor_id: Uuid,
) -> Result<Uuid, sqlx::Error> {
    sqlx::query("INSERT OR IGNORE INTO message_threads (id, student_id, tutor_id) VALUES (?, ?, ?)")
        .bind(Uuid::now_v7())
        .bind(student_id)
        .bind(tutor_id)
        .execute(&mut *conn)
        .await?;

    let (id,): (Uuid,) =
        sqlx::query_as("SELECT id FROM message_threads WHERE student_id = ? AND tutor_id = ?")
            .bind(student_id)
            .bind(tutor_id)
            .fetch_one(&mut *conn)
            .await?;
    Ok(id)
}

/// Appends a message to the pair's thread. A matched pair gets the thread
/// created on demand; anyone else needs an existing thread or is told the
/// conversation does not exist.
pub async fn send_message(
    pool: &SqlitePool,
    caller: &Caller,
    counterpart_id: Uuid,
    content: &str,
) -> ApiResult<Message> {
    let profile = caller.profile()?;
    let content = content.trim();
    if content.is_empty() {
        return Err(ApiError::validation("message must not be empty"));
    }
    let (student_id, tutor_id) = pair_of(profile, counterpart_id);

    let mut tx = pool.begin().await?;
    let thread_id = if profiles::is_matched(&mut *tx, student_id, tutor_id).await? {
        ensure_thread(&mut tx, student_id, tutor_id).await?
    } else {
        let Some((id,)): Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM message_threads WHERE student_id = ? AND tutor_id = ?")
                .bind(student_id)
                .bind(tutor_id)
                .fetch_optional(&mut *tx)
                .await?
        else {
            return Err(ApiError::not_found("no conversation with that counterpart"));
        };
        id
    };

    let message = sqlx::query_as::<_, Message>(
        "INSERT INTO messages (id, thread_id, sent_by, content, sent_at) VALUES (?, ?, ?, ?, ?) \
         RETURNING id, thread_id, sent_by, content, sent_at",
    )
    .bind(Uuid::now_v7())
    .bind(thread_id)
    .bind(profile.role())
    .bind(content)
    .bind(OffsetDateTime::now_utc())
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(message)
}

/// Both paired sides read the same sequence; outsiders get not-found.
pub async fn list_messages(
    pool: &SqlitePool,
    caller: &Caller,
    counterpart_id: Uuid,
) -> ApiResult<Vec<Message>> {
    let profile = caller.profile()?;
    let (student_id, tutor_id) = pair_of(profile, counterpart_id);
    let Some((thread_id,)): Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM message_threads WHERE student_id = ? AND tutor_id = ?")
            .bind(student_id)
            .bind(tutor_id)
            .fetch_optional(pool)
            .await?
    else {
        return Err(ApiError::not_found("no conversation with that counterpart"));
    };

    let mut messages: Vec<Message> = sqlx::query_as(
        "SELECT id, thread_id, sent_by, content, sent_at FROM messages WHERE thread_id = ?",
    )
    .bind(thread_id)
    .fetch_all(pool)
    .await?;
    // send time is the only ordering key
    messages.sort_by_key(|m| m.sent_at);
    Ok(messages)
}

pub async fn list_threads(pool: &SqlitePool, caller: &Caller) -> ApiResult<Vec<ThreadSummary>> {
    let profile = caller.profile()?;
    let sql = match profile {
        ProfileRef::Student(_) => {
            "SELECT id, student_id, tutor_id FROM message_threads WHERE student_id = ?"
        }
        ProfileRef::Tutor(_) => {
            "SELECT id, student_id, tutor_id FROM message_threads WHERE tutor_id = ?"
        }
    };
    Ok(sqlx::query_as(sql).bind(profile.id()).fetch_all(pool).await?)
}

#[derive(Debug, Deserialize)]
pub struct SendMessage {
    pub content: String,
}

#[debug_handler]
pub(crate) async fn threads(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> ApiResult<Json<Vec<ThreadSummary>>> {
    let caller = auth::require_caller(&db_pool, &session).await?;
    Ok(Json(list_threads(&db_pool, &caller).await?))
}

#[debug_handler]
pub(crate) async fn list(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(counterpart_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Message>>> {
    let caller = auth::require_caller(&db_pool, &session).await?;
    Ok(Json(list_messages(&db_pool, &caller, counterpart_id).await?))
}

#[debug_handler]
pub(crate) async fn send(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(counterpart_id): Path<Uuid>,
    Json(SendMessage { content }): Json<SendMessage>,
) -> ApiResult<impl IntoResponse> {
    let caller = auth::require_caller(&db_pool, &session).await?;
    let message = send_message(&db_pool, &caller, counterpart_id, &content).await?;
    Ok((StatusCode::CREATED, Json(message)))
}
