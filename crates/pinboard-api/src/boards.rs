use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use pinboard_db::models::BoardRow;
use pinboard_types::ObjectId;
use pinboard_types::api::{
    BoardResponse, Claims, CreateBoardRequest, MessageResponse, UpdateBoardRequest,
};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::pins::PageQuery;

const MAX_NAME_LEN: usize = 100;

fn board_response(row: BoardRow) -> BoardResponse {
    BoardResponse {
        id: row.id,
        user: row.owner_id,
        name: row.name,
        description: row.description,
        created_at: row.created_at,
    }
}

fn check_name(name: &str) -> Result<(), ApiError> {
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::BadRequest("Board name must be 1-100 characters".into()));
    }
    Ok(())
}

pub async fn list_boards(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<Vec<BoardResponse>>, ApiError> {
    let Query(query) = query?;
    let (limit, offset) = query.window();

    let rows = blocking(move || Ok(state.db.list_boards(limit, offset)?)).await?;
    Ok(Json(rows.into_iter().map(board_response).collect()))
}

pub async fn create_board(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<CreateBoardRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    let name = req.name.trim();
    check_name(name)?;

    let board = BoardRow::new(claims.sub, name, &req.description);
    let row = blocking(move || Ok(state.db.create_board(&board)?)).await?;

    Ok((StatusCode::CREATED, Json(board_response(row))))
}

pub async fn get_board(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
) -> Result<Json<BoardResponse>, ApiError> {
    let board_id = ObjectId::parse(&board_id)?;
    let row = blocking(move || state.db.get_board(&board_id)?.ok_or(ApiError::NotFound("Board")))
        .await?;
    Ok(Json(board_response(row)))
}

pub async fn update_board(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<UpdateBoardRequest>, JsonRejection>,
) -> Result<Json<BoardResponse>, ApiError> {
    let board_id = ObjectId::parse(&board_id)?;
    let Json(req) = payload?;

    let name = req.name.map(|n| n.trim().to_string());
    if let Some(name) = &name {
        check_name(name)?;
    }

    let row = blocking(move || {
        let db = &state.db;
        let existing = db.get_board(&board_id)?.ok_or(ApiError::NotFound("Board"))?;
        if existing.owner_id != claims.sub {
            return Err(ApiError::Forbidden);
        }

        db.update_board(&board_id, |board| {
            if let Some(name) = name {
                board.name = name;
            }
            if let Some(description) = req.description {
                board.description = description;
            }
        })?
        .ok_or(ApiError::NotFound("Board"))
    })
    .await?;

    Ok(Json(board_response(row)))
}

pub async fn delete_board(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MessageResponse>, ApiError> {
    let board_id = ObjectId::parse(&board_id)?;

    blocking(move || {
        let db = &state.db;
        let existing = db.get_board(&board_id)?.ok_or(ApiError::NotFound("Board"))?;
        if existing.owner_id != claims.sub {
            return Err(ApiError::Forbidden);
        }
        if !db.delete_board(&board_id)? {
            return Err(ApiError::NotFound("Board"));
        }
        info!("Board {} deleted by {}", board_id, claims.sub);
        Ok(())
    })
    .await?;

    Ok(Json(MessageResponse {
        message: "Board deleted successfully".into(),
    }))
}

pub async fn list_user_boards(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<BoardResponse>>, ApiError> {
    let user_id = ObjectId::parse(&user_id)?;

    let rows = blocking(move || {
        let db = &state.db;
        if db.find_user_by_id(&user_id)?.is_none() {
            return Err(ApiError::NotFound("User"));
        }
        Ok(db.list_boards_by_owner(&user_id)?)
    })
    .await?;

    Ok(Json(rows.into_iter().map(board_response).collect()))
}
