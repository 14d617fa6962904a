//! Account registration and session login. Credential verification belongs
//! to the deployment's identity provider; this module only resolves who the
//! caller is and which profile they act as.

use axum::{Json, Router, debug_handler, extract::State, routing::post};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    AppState,
    error::{ApiError, ApiResult, on_unique_violation},
    models::Role,
    session::ACCOUNT_ID,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/accounts", post(create_account))
        .route("/login", post(login))
        .route("/logout", post(logout))
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub role: Option<Role>,
}

/// The caller's profile, tagged by role. Role-gated operations match on
/// this instead of re-querying the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileRef {
    Student(Uuid),
    Tutor(Uuid),
}

impl ProfileRef {
    pub fn id(self) -> Uuid {
        match self {
            ProfileRef::Student(id) | ProfileRef::Tutor(id) => id,
        }
    }

    pub fn role(self) -> Role {
        match self {
            ProfileRef::Student(_) => Role::Student,
            ProfileRef::Tutor(_) => Role::Tutor,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Caller {
    pub account: Account,
    pub profile: Option<ProfileRef>,
}

impl Caller {
    /// The caller's profile, or forbidden when no role was claimed yet.
    pub fn profile(&self) -> ApiResult<ProfileRef> {
        self.profile
            .ok_or_else(|| ApiError::forbidden("no profile for this account"))
    }

    pub fn student_id(&self) -> ApiResult<Uuid> {
        match self.profile {
            Some(ProfileRef::Student(id)) => Ok(id),
            _ => Err(ApiError::forbidden("student profile required")),
        }
    }

    pub fn tutor_id(&self) -> ApiResult<Uuid> {
        match self.profile {
            Some(ProfileRef::Tutor(id)) => Ok(id),
            _ => Err(ApiError::forbidden("tutor profile required")),
        }
    }
}

/// Resolves the session to a caller, or 401 when nobody is signed in.
pub async fn require_caller(pool: &SqlitePool, session: &Session) -> ApiResult<Caller> {
    let Some(account_id) = session.get::<Uuid>(ACCOUNT_ID).await? else {
        return Err(ApiError::Unauthenticated);
    };
    caller_by_account(pool, account_id).await
}

pub async fn caller_by_account(pool: &SqlitePool, account_id: Uuid) -> ApiResult<Caller> {
    let Some(account) = sqlx::query_as::<_, Account>(
        "SELECT id, username, display_name, role FROM accounts WHERE id = ?",
    )
    .bind(account_id)
    .fetch_optional(pool)
    .await?
    else {
        // the session outlived the account
        return Err(ApiError::Unauthenticated);
    };

    let profile = match account.role {
        Some(Role::Student) => {
            let (id,): (Uuid,) = sqlx::query_as("SELECT id FROM students WHERE account_id = ?")
                .bind(account.id)
                .fetch_one(pool)
                .await?;
            Some(ProfileRef::Student(id))
        }
        Some(Role::Tutor) => {
            let (id,): (Uuid,) = sqlx::query_as("SELECT id FROM tutors WHERE account_id = ?")
                .bind(account.id)
                .fetch_one(pool)
                .await?;
            Some(ProfileRef::Tutor(id))
        }
        None => None,
    };

    Ok(Caller { account, profile })
}

/// Registers an account with no role yet. Usernames are trimmed, must not
/// be blank, and must be unique.
pub async fn register_account(
    pool: &SqlitePool,
    username: &str,
    display_name: &str,
) -> ApiResult<Account> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ApiError::validation("username must not be empty"));
    }

    let account = sqlx::query_as::<_, Account>(
        "INSERT INTO accounts (id, username, display_name) VALUES (?, ?, ?) \
         RETURNING id, username, display_name, role",
    )
    .bind(Uuid::now_v7())
    .bind(username)
    .bind(display_name.trim())
    .fetch_one(pool)
    .await
    .map_err(|e| on_unique_violation(e, "username already taken"))?;

    tracing::info!(username = %account.username, "account created");
    Ok(account)
}

/// Resolves a login attempt to its account; unknown usernames are not found.
pub async fn account_by_username(pool: &SqlitePool, username: &str) -> ApiResult<Account> {
    let Some(account) = sqlx::query_as::<_, Account>(
        "SELECT id, username, display_name, role FROM accounts WHERE username = ?",
    )
    .bind(username.trim())
    .fetch_optional(pool)
    .await?
    else {
        return Err(ApiError::not_found("no account with that username"));
    };
    Ok(account)
}

#[derive(Deserialize)]
pub(crate) struct NewAccount {
    username: String,
    #[serde(default)]
    display_name: String,
}

#[debug_handler]
pub(crate) async fn create_account(
    State(db_pool): State<SqlitePool>,
    Json(NewAccount {
        username,
        display_name,
    }): Json<NewAccount>,
) -> ApiResult<Json<Account>> {
    Ok(Json(register_account(&db_pool, &username, &display_name).await?))
}

#[derive(Deserialize)]
pub(crate) struct LoginRequest {
    username: String,
}

#[debug_handler]
pub(crate) async fn login(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(LoginRequest { username }): Json<LoginRequest>,
) -> ApiResult<Json<Account>> {
    let account = account_by_username(&db_pool, &username).await?;
    session.insert(ACCOUNT_ID, account.id).await?;
    Ok(Json(account))
}

#[debug_handler]
pub(crate) async fn logout(session: Session) -> ApiResult<Json<serde_json::Value>> {
    session.clear().await;
    Ok(Json(json!({ "status": "logged out" })))
}
