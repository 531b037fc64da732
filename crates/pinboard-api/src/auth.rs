use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;

use pinboard_db::models::UserRow;
use pinboard_db::{Database, is_constraint_violation};
use pinboard_db::queries::Registration;
use pinboard_types::ObjectId;
use pinboard_types::api::{
    AuthResponse, Claims, LoginRequest, RegisterRequest, UpdateProfileRequest, UserResponse,
    UserSummary,
};

use crate::error::ApiError;
use crate::users::user_response;
use crate::blocking;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
}

impl AppStateInner {
    pub fn new(db: Database, jwt_secret: impl Into<String>, token_ttl_days: i64) -> AppState {
        Arc::new(Self {
            db,
            jwt_secret: jwt_secret.into(),
            token_ttl: chrono::Duration::days(token_ttl_days),
        })
    }
}

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    let username = req.username.trim().to_string();
    let email = normalize_email(&req.email);

    // Validate input
    if !valid_username(&username) {
        return Err(ApiError::BadRequest("Username must be 3-32 characters".into()));
    }
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::BadRequest("A valid email is required".into()));
    }
    if req.password.chars().count() < 8 {
        return Err(ApiError::BadRequest("Password must be at least 8 characters".into()));
    }

    let db_state = state.clone();
    let user = blocking(move || {
        // Hash password with Argon2id
        let password_hash = hash_password(&req.password)?;
        match db_state.db.register_user(UserRow::new(&username, &email, &password_hash))? {
            Registration::Created(user) => Ok(user),
            Registration::EmailTaken => Err(ApiError::Conflict("User already exists".into())),
            Registration::UsernameTaken => Err(ApiError::Conflict("Username is taken".into())),
        }
    })
    .await?;

    info!("Registered user {} ({})", user.username, user.id);
    let token = create_token(&state, &user.id, &user.username)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: summary(&user),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest("Email and password are required".into()));
    }

    let email = normalize_email(&req.email);
    let db_state = state.clone();
    let user = blocking(move || {
        let db = &db_state.db;
        let user = db.get_user_by_email(&email)?.ok_or(ApiError::Unauthorized)?;

        // Verify password
        let parsed_hash = PasswordHash::new(&user.password)
            .map_err(|e| anyhow::anyhow!("Corrupt password hash for {}: {}", user.id, e))?;
        Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .map_err(|_| ApiError::Unauthorized)?;

        db.record_login(&user.id)?.ok_or(ApiError::Unauthorized)
    })
    .await?;

    let token = create_token(&state, &user.id, &user.username)?;

    Ok(Json(AuthResponse {
        token,
        user: summary(&user),
    }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = blocking(move || {
        state
            .db
            .find_user_by_id(&claims.sub)?
            .ok_or(ApiError::NotFound("User"))
    })
    .await?;

    Ok(Json(user_response(user, true)))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, ApiError> {
    let Json(req) = payload?;

    let username = req
        .username
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);
    let email = req.email.as_deref().map(normalize_email).filter(|s| !s.is_empty());

    if let Some(name) = &username {
        if !valid_username(name) {
            return Err(ApiError::BadRequest("Username must be 3-32 characters".into()));
        }
    }
    if let Some(email) = &email {
        if !email.contains('@') {
            return Err(ApiError::BadRequest("A valid email is required".into()));
        }
    }

    let user = blocking(move || {
        let db = &state.db;
        let me = &claims.sub;

        if let Some(name) = &username {
            if db.get_user_by_username(name)?.is_some_and(|u| &u.id != me) {
                return Err(ApiError::Conflict("Username is taken".into()));
            }
        }
        if let Some(email) = &email {
            if db.get_user_by_email(email)?.is_some_and(|u| &u.id != me) {
                return Err(ApiError::Conflict("User already exists".into()));
            }
        }

        db.update_user(me, |user| {
            if let Some(name) = username {
                user.username = name;
            }
            if let Some(email) = email {
                user.email = email;
            }
            if let Some(bio) = req.bio {
                user.bio = bio;
            }
            if let Some(avatar) = req.avatar {
                user.avatar = avatar;
            }
            if let Some(location) = req.location {
                user.location = location;
            }
            if let Some(website) = req.website {
                user.website = website;
            }
        })
        .map_err(|e| {
            if is_constraint_violation(&e) {
                ApiError::Conflict("Username or email is taken".into())
            } else {
                ApiError::from(e)
            }
        })?
        .ok_or(ApiError::NotFound("User"))
    })
    .await?;

    Ok(Json(user_response(user, true)))
}

fn valid_username(name: &str) -> bool {
    (3..=32).contains(&name.chars().count())
}

fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn summary(user: &UserRow) -> UserSummary {
    UserSummary {
        id: user.id.clone(),
        username: user.username.clone(),
        email: user.email.clone(),
    }
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
}

pub fn create_token(
    state: &AppStateInner,
    user_id: &ObjectId,
    username: &str,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id.clone(),
        username: username.to_string(),
        exp: (chrono::Utc::now() + state.token_ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.jwt_secret.as_bytes()),
    )?;

    Ok(token)
}
