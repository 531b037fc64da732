use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use pinboard_db::PinStore;
use pinboard_db::models::CommentRow;
use pinboard_types::ObjectId;
use pinboard_types::api::{Claims, CommentResponse, CreateCommentRequest};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

const MAX_COMMENT_LEN: usize = 1000;

fn comment_response(row: CommentRow) -> CommentResponse {
    CommentResponse {
        id: row.id,
        pin: row.pin_id,
        user: row.user_id,
        username: row.username,
        text: row.text,
        created_at: row.created_at,
    }
}

pub async fn list_comments(
    State(state): State<AppState>,
    Path(pin_id): Path<String>,
) -> Result<Json<Vec<CommentResponse>>, ApiError> {
    let pin_id = ObjectId::parse(&pin_id)?;

    let rows = blocking(move || {
        let db = &state.db;
        if db.find_pin_by_id(&pin_id)?.is_none() {
            return Err(ApiError::NotFound("Pin"));
        }
        Ok(db.list_comments(&pin_id)?)
    })
    .await?;

    Ok(Json(rows.into_iter().map(comment_response).collect()))
}

/// Adding a comment credits the author's `totalComments`.
pub async fn add_comment(
    State(state): State<AppState>,
    Path(pin_id): Path<String>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<CreateCommentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let pin_id = ObjectId::parse(&pin_id)?;
    let Json(req) = payload?;

    let text = req.text.trim().to_string();
    if text.is_empty() || text.chars().count() > MAX_COMMENT_LEN {
        return Err(ApiError::BadRequest("Comment must be 1-1000 characters".into()));
    }

    let row = blocking(move || {
        let db = &state.db;
        if db.find_pin_by_id(&pin_id)?.is_none() {
            return Err(ApiError::NotFound("Pin"));
        }
        Ok(db.add_comment(&pin_id, &claims.sub, &text)?)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(comment_response(row))))
}
