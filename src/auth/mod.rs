//! Authentication: registration, login, and the bearer-token request
//! identity every protected route extracts.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{Error, Result};
use crate::shared::enums::{UserRole, UserStatus};
use crate::shared::models::{find_user, User};
use crate::shared::schema::users;
use crate::shared::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: Uuid,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub department: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub status: &'static str,
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub status: &'static str,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub status: &'static str,
    pub message: String,
}

/// The authenticated caller, resolved from the bearer token to a live user
/// row. Handlers take this as an extractor argument so the acting user is
/// always explicit.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl AuthUser {
    pub fn id(&self) -> Uuid {
        self.0.id
    }

    pub fn role(&self) -> UserRole {
        self.0.role
    }

    pub fn require_role(&self, allowed: &[UserRole]) -> Result<()> {
        if allowed.contains(&self.0.role) {
            Ok(())
        } else {
            Err(Error::Forbidden)
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| Error::Unauthorized("Not authorized to access this route".into()))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| Error::Unauthorized("Not authorized to access this route".into()))?;

        let claims = decode_token(&state.config.auth, token)?;

        let mut conn = state.conn.get()?;
        let user = find_user(&mut conn, claims.sub)?
            .ok_or_else(|| Error::Unauthorized("User no longer exists".into()))?;
        if user.status == UserStatus::Inactive {
            return Err(Error::Unauthorized("User account is inactive".into()));
        }

        Ok(AuthUser(user))
    }
}

pub fn issue_token(config: &AuthConfig, user_id: Uuid) -> Result<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        iat: now.timestamp(),
        exp: (now + Duration::hours(config.token_ttl_hours)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| Error::Internal(format!("Token issue failed: {}", e)))
}

fn decode_token(config: &AuthConfig, token: &str) -> Result<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| Error::Unauthorized("Invalid or expired token".into()))
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Internal(format!("Password hashing failed: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

pub fn validate_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
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

    let mut conn = state.conn.get()?;

    let existing: Option<Uuid> = users::table
        .filter(users::email.eq(&req.email))
        .select(users::id)
        .first(&mut conn)
        .optional()?;
    if existing.is_some() {
        return Err(Error::Conflict("Email already in use".into()));
    }

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: req.email,
        password_hash: hash_password(&req.password)?,
        role: UserRole::User,
        department: req.department.unwrap_or_else(|| "other".to_string()),
        status: UserStatus::Active,
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(users::table)
        .values(&user)
        .execute(&mut conn)?;

    let token = issue_token(&state.config.auth, user.id)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            status: "success",
            token,
            user,
        }),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let mut conn = state.conn.get()?;

    let user: Option<User> = users::table
        .filter(users::email.eq(&req.email))
        .first(&mut conn)
        .optional()?;

    let user = match user {
        Some(user) if verify_password(&req.password, &user.password_hash) => user,
        _ => return Err(Error::Unauthorized("Invalid credentials".into())),
    };
    if user.status == UserStatus::Inactive {
        return Err(Error::Unauthorized("User account is inactive".into()));
    }

    let token = issue_token(&state.config.auth, user.id)?;

    Ok(Json(AuthResponse {
        status: "success",
        token,
        user,
    }))
}

pub async fn me(auth: AuthUser) -> Json<MeResponse> {
    Json(MeResponse {
        status: "success",
        user: auth.0,
    })
}

pub async fn logout(_auth: AuthUser) -> Json<MessageResponse> {
    // Tokens are stateless; the endpoint exists so clients have a uniform
    // sign-out call.
    Json(MessageResponse {
        status: "success",
        message: "Logged out successfully".to_string(),
    })
}

pub fn configure_auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
        .route("/api/auth/logout", post(logout))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret".to_string(),
            token_ttl_hours: 1,
        }
    }

    #[test]
    fn token_round_trip() {
        let config = test_config();
        let user_id = Uuid::new_v4();
        let token = issue_token(&config, user_id).unwrap();
        let claims = decode_token(&config, &token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn token_rejects_wrong_secret() {
        let token = issue_token(&test_config(), Uuid::new_v4()).unwrap();
        let other = AuthConfig {
            jwt_secret: "different".to_string(),
            token_ttl_hours: 1,
        };
        assert!(decode_token(&other, &token).is_err());
    }

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("password123").unwrap();
        assert!(verify_password("password123", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn email_validation() {
        assert!(validate_email("user@company.com"));
        assert!(!validate_email("not-an-email"));
        assert!(!validate_email("@company.com"));
        assert!(!validate_email("user@nodot"));
    }
}
