//! User management: admin CRUD plus the caller's own profile.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use diesel::PgConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{hash_password, validate_email, AuthUser};
use crate::error::{Error, Result};
use crate::shared::enums::{UserRole, UserStatus};
use crate::shared::models::{find_user, User};
use crate::shared::schema::users;
use crate::shared::state::AppState;

// ===== Request/Response Structures =====

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
    pub department: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    pub department: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub status: &'static str,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub status: &'static str,
    pub count: usize,
    pub users: Vec<User>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub status: &'static str,
    pub message: String,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = users)]
struct UserChanges {
    name: Option<String>,
    email: Option<String>,
    password_hash: Option<String>,
    role: Option<UserRole>,
    department: Option<String>,
    status: Option<UserStatus>,
}

fn parse_role(value: &str) -> Result<UserRole> {
    value
        .parse()
        .map_err(|_| Error::Validation(format!("Invalid role: {}", value)))
}

fn parse_status(value: &str) -> Result<UserStatus> {
    value
        .parse()
        .map_err(|_| Error::Validation(format!("Invalid status: {}", value)))
}

fn email_taken(conn: &mut PgConnection, email: &str, exclude: Option<Uuid>) -> Result<bool> {
    let mut q = users::table
        .filter(users::email.eq(email))
        .select(users::id)
        .into_boxed();
    if let Some(id) = exclude {
        q = q.filter(users::id.ne(id));
    }
    Ok(q.first::<Uuid>(conn).optional()?.is_some())
}

// ===== API Handlers =====

pub async fn get_users(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<UserListResponse>> {
    auth.require_role(&[UserRole::Admin, UserRole::Manager])?;

    let mut conn = state.conn.get()?;
    let rows: Vec<User> = users::table.order(users::name.asc()).load(&mut conn)?;

    Ok(Json(UserListResponse {
        status: "success",
        count: rows.len(),
        users: rows,
    }))
}

pub async fn get_user_by_id(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>> {
    auth.require_role(&[UserRole::Admin, UserRole::Manager])?;

    let mut conn = state.conn.get()?;
    let user =
        find_user(&mut conn, id)?.ok_or_else(|| Error::NotFound("User not found".into()))?;

    Ok(Json(UserResponse {
        status: "success",
        user,
    }))
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    auth.require_role(&[UserRole::Admin])?;

    let name = req.name.trim();
    if name.is_empty() {
        return Err(Error::Validation("Name is required".into()));
    }
    if !validate_email(&req.email) {
        return Err(Error::Validation("Please provide a valid email".into()));
    }
    if req.password.len() < 6 {
        return Err(Error::Validation(
            "Password must be at least 6 characters".into(),
        ));
    }
    let role = req.role.as_deref().map(parse_role).transpose()?.unwrap_or_default();
    let status = req
        .status
        .as_deref()
        .map(parse_status)
        .transpose()?
        .unwrap_or_default();

    let mut conn = state.conn.get()?;
    if email_taken(&mut conn, &req.email, None)? {
        return Err(Error::Conflict("Email already in use".into()));
    }

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: req.email,
        password_hash: hash_password(&req.password)?,
        role,
        department: req.department.unwrap_or_else(|| "other".to_string()),
        status,
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(users::table)
        .values(&user)
        .execute(&mut conn)?;

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            status: "success",
            user,
        }),
    ))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>> {
    auth.require_role(&[UserRole::Admin])?;

    if let Some(email) = &req.email {
        if !validate_email(email) {
            return Err(Error::Validation("Please provide a valid email".into()));
        }
    }
    if let Some(password) = &req.password {
        if password.len() < 6 {
            return Err(Error::Validation(
                "Password must be at least 6 characters".into(),
            ));
        }
    }

    let changes = UserChanges {
        name: req.name,
        email: req.email,
        password_hash: req.password.as_deref().map(hash_password).transpose()?,
        role: req.role.as_deref().map(parse_role).transpose()?,
        department: req.department,
        status: req.status.as_deref().map(parse_status).transpose()?,
    };

    let mut conn = state.conn.get()?;
    find_user(&mut conn, id)?.ok_or_else(|| Error::NotFound("User not found".into()))?;
    if let Some(email) = &changes.email {
        if email_taken(&mut conn, email, Some(id))? {
            return Err(Error::Conflict("Email already in use".into()));
        }
    }

    diesel::update(users::table.filter(users::id.eq(id)))
        .set((&changes, users::updated_at.eq(Utc::now())))
        .execute(&mut conn)?;

    let user =
        find_user(&mut conn, id)?.ok_or_else(|| Error::NotFound("User not found".into()))?;

    Ok(Json(UserResponse {
        status: "success",
        user,
    }))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>> {
    auth.require_role(&[UserRole::Admin])?;

    let mut conn = state.conn.get()?;
    match diesel::delete(users::table.filter(users::id.eq(id))).execute(&mut conn) {
        Ok(0) => Err(Error::NotFound("User not found".into())),
        Ok(_) => Ok(Json(MessageResponse {
            status: "success",
            message: "User deleted successfully".to_string(),
        })),
        Err(diesel::result::Error::DatabaseError(
            DatabaseErrorKind::ForeignKeyViolation,
            _,
        )) => Err(Error::Conflict(
            "User has related tickets and cannot be deleted".into(),
        )),
        Err(e) => Err(e.into()),
    }
}

pub async fn get_profile(auth: AuthUser) -> Json<UserResponse> {
    Json(UserResponse {
        status: "success",
        user: auth.0,
    })
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>> {
    if let Some(email) = &req.email {
        if !validate_email(email) {
            return Err(Error::Validation("Please provide a valid email".into()));
        }
    }

    let changes = UserChanges {
        name: req.name,
        email: req.email,
        department: req.department,
        ..Default::default()
    };

    let mut conn = state.conn.get()?;
    if let Some(email) = &changes.email {
        if email_taken(&mut conn, email, Some(auth.id()))? {
            return Err(Error::Conflict("Email already in use".into()));
        }
    }

    diesel::update(users::table.filter(users::id.eq(auth.id())))
        .set((&changes, users::updated_at.eq(Utc::now())))
        .execute(&mut conn)?;

    let user = find_user(&mut conn, auth.id())?
        .ok_or_else(|| Error::NotFound("User not found".into()))?;

    Ok(Json(UserResponse {
        status: "success",
        user,
    }))
}

pub fn configure_users_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/users/profile", get(get_profile).put(update_profile))
        .route("/api/users", get(get_users).post(create_user))
        .route(
            "/api/users/:id",
            get(get_user_by_id).put(update_user).delete(delete_user),
        )
}
