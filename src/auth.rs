use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tower_sessions::Session;
use validator::{Validate, ValidationErrors};

use crate::model::{NewUser, User};
use crate::schema::users;
use crate::{utils, DbPool};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Email already registered")]
    EmailTaken,
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Database error")]
    DatabaseError(#[from] diesel::result::Error),
    #[error("Connection pool error")]
    PoolError(#[from] r2d2::Error),
    #[error("Hashing error")]
    HashingError(#[from] bcrypt::BcryptError),
    #[error("Session error: {0}")]
    SessionError(String),
}

impl From<tower_sessions::session::Error> for AuthError {
    fn from(err: tower_sessions::session::Error) -> Self {
        AuthError::SessionError(err.to_string())
    }
}

impl From<ValidationErrors> for AuthError {
    fn from(err: ValidationErrors) -> Self {
        AuthError::ValidationError(err.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, self.to_string()),
            AuthError::EmailTaken => (StatusCode::CONFLICT, self.to_string()),
            AuthError::ValidationError(e) => (StatusCode::BAD_REQUEST, e),
            AuthError::DatabaseError(e) => {
                log::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AuthError::PoolError(e) => {
                log::error!("Connection pool error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AuthError::HashingError(e) => {
                log::error!("Hashing error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AuthError::SessionError(e) => {
                log::error!("Session error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "status": status.as_u16()
        });

        (status, axum::Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterForm {
    #[validate(length(min = 1, message = "Name must not be empty"))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

pub async fn handle_register(
    State(pool): State<DbPool>,
    session: Session,
    Json(form): Json<RegisterForm>,
) -> Result<Json<serde_json::Value>, AuthError> {
    form.validate()?;

    let mut conn = pool.get()?;

    let existing = users::table
        .filter(users::email.eq(&form.email))
        .first::<User>(&mut conn)
        .optional()?;
    if existing.is_some() {
        return Err(AuthError::EmailTaken);
    }

    let hashed_password = hash(&form.password, DEFAULT_COST)?;
    diesel::insert_into(users::table)
        .values(&NewUser {
            name: &form.name,
            email: &form.email,
            password: &hashed_password,
            created_at: Utc::now().naive_utc(),
        })
        .execute(&mut conn)?;

    let user = users::table
        .filter(users::email.eq(&form.email))
        .first::<User>(&mut conn)?;

    utils::set_user_session(&session, user.id, &user.email).await?;

    Ok(Json(json!({ "user_id": user.id })))
}

pub async fn handle_login(
    State(pool): State<DbPool>,
    session: Session,
    Json(form): Json<LoginForm>,
) -> Result<Json<serde_json::Value>, AuthError> {
    let mut conn = pool.get()?;

    let user = users::table
        .filter(users::email.eq(&form.email))
        .filter(users::is_active.eq(true))
        .first::<User>(&mut conn)
        .optional()?;

    if let Some(user) = user {
        if verify(&form.password, &user.password)? {
            diesel::update(users::table.find(user.id))
                .set(users::last_login_at.eq(Utc::now().naive_utc()))
                .execute(&mut conn)?;
            utils::set_user_session(&session, user.id, &user.email).await?;
            return Ok(Json(json!({ "user_id": user.id })));
        }
    }

    Err(AuthError::InvalidCredentials)
}

pub async fn handle_logout(session: Session) -> Result<Json<serde_json::Value>, AuthError> {
    session.flush().await?;
    Ok(Json(json!({ "message": "Logged out" })))
}

pub fn router(pool: DbPool) -> Router {
    Router::new()
        .route("/register", post(handle_register))
        .route("/login", post(handle_login))
        .route("/logout", get(handle_logout))
        .with_state(pool)
}
