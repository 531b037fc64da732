use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;

use pinboard_db::PinStore;
use pinboard_db::models::PinRow;
use pinboard_types::ObjectId;
use pinboard_types::api::{Claims, CreatePinRequest, MessageResponse, PinResponse, UpdatePinRequest};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

const MAX_TITLE_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 2000;

/// `?page&limit` paging shared by the list endpoints.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    20
}

impl PageQuery {
    /// `(limit, offset)` with `limit` clamped to 1..=100 and `page` to >= 1.
    pub(crate) fn window(&self) -> (u32, u32) {
        let limit = self.limit.clamp(1, 100);
        let offset = self.page.max(1).saturating_sub(1).saturating_mul(limit);
        (limit, offset)
    }
}

pub(crate) fn pin_response(row: PinRow) -> PinResponse {
    PinResponse {
        id: row.id,
        user: row.owner_id,
        title: row.title,
        description: row.description,
        image_url: row.image_url,
        likes: row.likes,
        saves: row.saves,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

pub async fn list_pins(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<Vec<PinResponse>>, ApiError> {
    let Query(query) = query?;
    let (limit, offset) = query.window();

    let rows = blocking(move || Ok(state.db.list_pins(limit, offset)?)).await?;
    Ok(Json(rows.into_iter().map(pin_response).collect()))
}

pub async fn get_pin(
    State(state): State<AppState>,
    Path(pin_id): Path<String>,
) -> Result<Json<PinResponse>, ApiError> {
    let pin_id = ObjectId::parse(&pin_id)?;
    let row = blocking(move || {
        state
            .db
            .find_pin_by_id(&pin_id)?
            .ok_or(ApiError::NotFound("Pin"))
    })
    .await?;
    Ok(Json(pin_response(row)))
}

pub async fn create_pin(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<CreatePinRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    let title = req.title.trim();
    if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
        return Err(ApiError::BadRequest("Title must be 1-200 characters".into()));
    }
    if req.description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ApiError::BadRequest("Description is too long".into()));
    }
    if req.image_url.trim().is_empty() {
        return Err(ApiError::BadRequest("Image URL is required".into()));
    }

    let pin = PinRow::new(claims.sub, title, &req.description, req.image_url.trim());
    let row = blocking(move || Ok(state.db.create_pin(&pin)?)).await?;

    info!("Pin {} created by {}", row.id, row.owner_id);
    Ok((StatusCode::CREATED, Json(pin_response(row))))
}

pub async fn update_pin(
    State(state): State<AppState>,
    Path(pin_id): Path<String>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<UpdatePinRequest>, JsonRejection>,
) -> Result<Json<PinResponse>, ApiError> {
    let pin_id = ObjectId::parse(&pin_id)?;
    let Json(req) = payload?;

    if let Some(title) = &req.title {
        let title = title.trim();
        if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
            return Err(ApiError::BadRequest("Title must be 1-200 characters".into()));
        }
    }
    if req.description.as_ref().is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LEN) {
        return Err(ApiError::BadRequest("Description is too long".into()));
    }

    let row = blocking(move || {
        let db = &state.db;
        let existing = db.find_pin_by_id(&pin_id)?.ok_or(ApiError::NotFound("Pin"))?;
        if existing.owner_id != claims.sub {
            return Err(ApiError::Forbidden);
        }

        db.update_pin(&pin_id, |pin| {
            let mut changed = false;
            if let Some(title) = req.title.map(|t| t.trim().to_string()) {
                changed |= pin.title != title;
                pin.title = title;
            }
            if let Some(description) = req.description {
                changed |= pin.description != description;
                pin.description = description;
            }
            changed
        })?
        .ok_or(ApiError::NotFound("Pin"))
    })
    .await?;

    Ok(Json(pin_response(row)))
}

pub async fn delete_pin(
    State(state): State<AppState>,
    Path(pin_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MessageResponse>, ApiError> {
    let pin_id = ObjectId::parse(&pin_id)?;

    blocking(move || {
        let db = &state.db;
        let existing = db.find_pin_by_id(&pin_id)?.ok_or(ApiError::NotFound("Pin"))?;
        if existing.owner_id != claims.sub {
            return Err(ApiError::Forbidden);
        }
        if !db.delete_pin(&pin_id)? {
            return Err(ApiError::NotFound("Pin"));
        }
        info!("Pin {} deleted by {}", pin_id, claims.sub);
        Ok(())
    })
    .await?;

    Ok(Json(MessageResponse {
        message: "Pin deleted successfully".into(),
    }))
}
