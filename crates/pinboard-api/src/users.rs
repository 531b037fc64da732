use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::info;

use pinboard_db::models::UserRow;
use pinboard_types::ObjectId;
use pinboard_types::api::{Claims, FollowResponse, UserResponse};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

/// Public view of a user. The email is only included for the caller's own
/// profile.
pub(crate) fn user_response(row: UserRow, include_email: bool) -> UserResponse {
    UserResponse {
        id: row.id,
        username: row.username,
        email: include_email.then_some(row.email),
        bio: row.bio,
        avatar: row.avatar,
        location: row.location,
        website: row.website,
        total_pins_created: row.total_pins_created,
        total_comments: row.total_comments,
        total_boards: row.total_boards,
        followers_count: row.followers_count,
        following_count: row.following_count,
        activity_score: row.activity_score,
        segment: row.segment,
        login_count: row.login_count,
        last_login: row.last_login,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let user_id = ObjectId::parse(&user_id)?;
    let row = blocking(move || {
        state
            .db
            .find_user_by_id(&user_id)?
            .ok_or(ApiError::NotFound("User"))
    })
    .await?;
    Ok(Json(user_response(row, false)))
}

pub async fn follow(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<FollowResponse>, ApiError> {
    let target = ObjectId::parse(&user_id)?;
    if target == claims.sub {
        return Err(ApiError::BadRequest("You cannot follow yourself".into()));
    }

    let (created, followee) = blocking(move || {
        state
            .db
            .follow(&claims.sub, &target)?
            .ok_or(ApiError::NotFound("User"))
    })
    .await?;

    if created {
        info!("{} gained a follower ({} total)", followee.id, followee.followers_count);
    }

    Ok(Json(FollowResponse {
        following: true,
        followers_count: followee.followers_count,
    }))
}

pub async fn unfollow(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<FollowResponse>, ApiError> {
    let target = ObjectId::parse(&user_id)?;

    let (_, followee) = blocking(move || {
        state
            .db
            .unfollow(&claims.sub, &target)?
            .ok_or(ApiError::NotFound("User"))
    })
    .await?;

    Ok(Json(FollowResponse {
        following: false,
        followers_count: followee.followers_count,
    }))
}
