//! Role profiles and the student/tutor matching relationship.

pub mod student;
pub mod tutor;

use axum::{
    Json, Router, debug_handler,
    extract::State,
    routing::{delete, get, post},
};
use serde::Serialize;
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    AppState,
    auth::{self, Caller, ProfileRef},
    error::{ApiError, ApiResult},
    locations::{Location, locations_of},
    models::{HourlyRate, Level, Role},
};

pub use student::StudentProfileView;
pub use tutor::TutorProfileView;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(profile))
        .route("/students", post(student::create_student))
        .route("/students/{id}", delete(student::delete_student))
        .route("/tutors", post(tutor::create_tutor))
        .route(
            "/tutors/{id}",
            get(tutor::tutor_detail).delete(tutor::delete_tutor),
        )
        .route(
            "/tutors/{id}/my_tutors",
            post(student::add_my_tutor).delete(student::remove_my_tutor),
        )
}

/// The caller's profile, tagged by role.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProfileView {
    Student(StudentProfileView),
    Tutor(TutorProfileView),
}

pub async fn profile_view(pool: &SqlitePool, caller: &Caller) -> ApiResult<ProfileView> {
    let Some(profile) = caller.profile else {
        return Err(ApiError::not_found("no profile for this account"));
    };
    Ok(match profile {
        ProfileRef::Student(id) => {
            ProfileView::Student(student::student_view(pool, &caller.account, id).await?)
        }
        ProfileRef::Tutor(id) => {
            ProfileView::Tutor(tutor::tutor_view(pool, &caller.account, id).await?)
        }
    })
}

#[debug_handler]
pub(crate) async fn profile(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> ApiResult<Json<ProfileView>> {
    let caller = auth::require_caller(&db_pool, &session).await?;
    Ok(Json(profile_view(&db_pool, &caller).await?))
}

/// Public tutor card, shared by search results, my-tutors listings and the
/// tutor detail read. `rating` is the live mean over all reviewed meetings,
/// 0.0 when none exist.
#[derive(Debug, Serialize)]
pub struct TutorCard {
    pub id: Uuid,
    pub display_name: String,
    pub hourly_rate: Option<HourlyRate>,
    pub subjects: Vec<String>,
    pub level: Option<Level>,
    pub available: bool,
    pub rating: f64,
    pub locations: Vec<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct StudentCard {
    pub id: Uuid,
    pub display_name: String,
}

const TUTOR_CARD_SQL: &str = "\
SELECT t.id, a.display_name, t.hourly_rate_cents AS hourly_rate, t.subjects, t.level, \
       t.available, \
       COALESCE((SELECT AVG(r.rating) FROM reviews r \
                 JOIN meetings m ON m.id = r.meeting_id \
                 WHERE m.tutor_id = t.id), 0.0) AS rating \
FROM tutors t JOIN accounts a ON a.id = t.account_id";

#[derive(sqlx::FromRow)]
struct TutorCardRow {
    id: Uuid,
    display_name: String,
    hourly_rate: Option<HourlyRate>,
    subjects: sqlx::types::Json<Vec<String>>,
    level: Option<Level>,
    available: bool,
    rating: f64,
}

async fn card_with_locations(
    pool: &SqlitePool,
    row: TutorCardRow,
) -> Result<TutorCard, sqlx::Error> {
    let locations = locations_of(pool, ProfileRef::Tutor(row.id)).await?;
    Ok(TutorCard {
        id: row.id,
        display_name: row.display_name,
        hourly_rate: row.hourly_rate,
        subjects: row.subjects.0,
        level: row.level,
        available: row.available,
        rating: row.rating,
        locations,
        distance_km: None,
    })
}

pub(crate) async fn available_tutor_cards(
    pool: &SqlitePool,
) -> Result<Vec<TutorCard>, sqlx::Error> {
    let sql = format!("{TUTOR_CARD_SQL} WHERE t.available = 1");
    let rows: Vec<TutorCardRow> = sqlx::query_as(&sql).fetch_all(pool).await?;
    let mut cards = Vec::with_capacity(rows.len());
    for row in rows {
        cards.push(card_with_locations(pool, row).await?);
    }
    Ok(cards)
}

pub(crate) async fn my_tutor_cards(
    pool: &SqlitePool,
    student_id: Uuid,
) -> Result<Vec<TutorCard>, sqlx::Error> {
    let sql = format!(
        "{TUTOR_CARD_SQL} JOIN student_tutors st ON st.tutor_id = t.id WHERE st.student_id = ?"
    );
    let rows: Vec<TutorCardRow> = sqlx::query_as(&sql).bind(student_id).fetch_all(pool).await?;
    let mut cards = Vec::with_capacity(rows.len());
    for row in rows {
        cards.push(card_with_locations(pool, row).await?);
    }
    Ok(cards)
}

pub(crate) async fn tutor_card(
    pool: &SqlitePool,
    tutor_id: Uuid,
) -> Result<Option<TutorCard>, sqlx::Error> {
    let sql = format!("{TUTOR_CARD_SQL} WHERE t.id = ?");
    let Some(row) = sqlx::query_as::<_, TutorCardRow>(&sql)
        .bind(tutor_id)
        .fetch_optional(pool)
        .await?
    else {
        return Ok(None);
    };
    Ok(Some(card_with_locations(pool, row).await?))
}

pub(crate) async fn my_student_cards(
    pool: &SqlitePool,
    tutor_id: Uuid,
) -> Result<Vec<StudentCard>, sqlx::Error> {
    sqlx::query_as(
        "SELECT s.id, a.display_name FROM students s \
         JOIN accounts a ON a.id = s.account_id \
         JOIN student_tutors st ON st.student_id = s.id \
         WHERE st.tutor_id = ?",
    )
    .bind(tutor_id)
    .fetch_all(pool)
    .await
}

/// Whether the tutor sits in the student's my-tutors set. The gate for
/// meeting proposals and messaging.
pub(crate) async fn is_matched(
    executor: impl sqlx::SqliteExecutor<'_>,
    student_id: Uuid,
    tutor_id: Uuid,
) -> Result<bool, sqlx::Error> {
    Ok(
        sqlx::query("SELECT 1 FROM student_tutors WHERE student_id = ? AND tutor_id = ?")
            .bind(student_id)
            .bind(tutor_id)
            .fetch_optional(executor)
            .await?
            .is_some(),
    )
}

/// Claims the account role; refuses when any role was already set. The
/// guard keeps a second profile out even when two creates race.
pub(crate) async fn claim_role(
    conn: &mut sqlx::SqliteConnection,
    account_id: Uuid,
    role: Role,
) -> ApiResult<()> {
    let result = sqlx::query("UPDATE accounts SET role = ? WHERE id = ? AND role IS NULL")
        .bind(role)
        .bind(account_id)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::validation("profile already exists"));
    }
    Ok(())
}

pub(crate) async fn release_role(
    conn: &mut sqlx::SqliteConnection,
    account_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE accounts SET role = NULL WHERE id = ?")
        .bind(account_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
