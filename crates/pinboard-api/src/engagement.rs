//! Likes and saves on pins.
//!
//! Membership is set-like and driven by an explicit desired state: adding a
//! user who is already present, or removing one who is absent, succeeds
//! without changing anything. Duplicate client retries therefore converge
//! instead of flipping back and forth.

use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
};
use serde_json::Value;
use tracing::debug;

use pinboard_db::PinStore;
use pinboard_db::models::PinRow;
use pinboard_types::api::{Claims, LikeRequest, PinResponse, SaveRequest};
use pinboard_types::models::{EngagementAction, EngagementKind};
use pinboard_types::{InvalidIdentifier, ObjectId};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::pins::pin_response;

#[derive(Debug, thiserror::Error)]
pub enum EngagementError {
    #[error(transparent)]
    InvalidIdentifier(#[from] InvalidIdentifier),
    #[error("Pin not found")]
    PinNotFound,
    #[error("storage failure: {0}")]
    PersistenceFailure(anyhow::Error),
}

impl From<EngagementError> for ApiError {
    fn from(err: EngagementError) -> Self {
        match err {
            EngagementError::InvalidIdentifier(e) => ApiError::InvalidIdentifier(e),
            EngagementError::PinNotFound => ApiError::NotFound("Pin"),
            EngagementError::PersistenceFailure(e) => ApiError::PersistenceFailure(e),
        }
    }
}

/// Bring `user_id`'s membership in the pin's `kind` collection to the state
/// `action` asks for, persist, and return the pin as stored.
///
/// Both identifiers are validated before the store is touched. When the
/// membership is already in the requested state nothing is written and the
/// pin is returned unchanged.
pub fn toggle_engagement<S: PinStore>(
    store: &S,
    pin_id: &str,
    user_id: &str,
    kind: EngagementKind,
    action: EngagementAction,
) -> Result<PinRow, EngagementError> {
    let pin_id = ObjectId::parse(pin_id)?;
    let user_id = ObjectId::parse(user_id)?;

    let mut changed = false;
    let pin = store
        .update_pin(&pin_id, |pin| {
            changed = apply(pin.members_mut(kind), &user_id, action);
            changed
        })
        .map_err(EngagementError::PersistenceFailure)?
        .ok_or(EngagementError::PinNotFound)?;

    debug!(
        "{} {:?} by {} on pin {} (changed: {})",
        kind.as_str(),
        action,
        user_id,
        pin_id,
        changed
    );
    Ok(pin)
}

/// Returns whether `members` changed.
fn apply(members: &mut Vec<ObjectId>, user_id: &ObjectId, action: EngagementAction) -> bool {
    let present = members.contains(user_id);
    match action {
        EngagementAction::Add if !present => {
            members.push(user_id.clone());
            true
        }
        EngagementAction::Remove if present => {
            members.retain(|m| m != user_id);
            true
        }
        _ => false,
    }
}

pub async fn like_pin(
    State(state): State<AppState>,
    Path(pin_id): Path<String>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<LikeRequest>, JsonRejection>,
) -> Result<Json<PinResponse>, ApiError> {
    let Json(req) = payload?;
    let user_id = acting_user(&claims, req.user_id.as_ref())?;
    engage(state, pin_id, user_id, EngagementKind::Like, req.action.into()).await
}

pub async fn save_pin(
    State(state): State<AppState>,
    Path(pin_id): Path<String>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<SaveRequest>, JsonRejection>,
) -> Result<Json<PinResponse>, ApiError> {
    let Json(req) = payload?;
    let user_id = acting_user(&claims, req.user_id.as_ref())?;
    engage(state, pin_id, user_id, EngagementKind::Save, req.action.into()).await
}

async fn engage(
    state: AppState,
    pin_id: String,
    user_id: ObjectId,
    kind: EngagementKind,
    action: EngagementAction,
) -> Result<Json<PinResponse>, ApiError> {
    let pin = blocking(move || {
        toggle_engagement(&state.db, &pin_id, user_id.as_str(), kind, action)
            .map_err(ApiError::from)
    })
    .await?;

    Ok(Json(pin_response(pin)))
}

/// The body may name the acting user; it must be the authenticated one.
fn acting_user(claims: &Claims, body_user: Option<&Value>) -> Result<ObjectId, ApiError> {
    let Some(raw) = body_user else {
        return Ok(claims.sub.clone());
    };

    let user_id = ObjectId::from_value(raw).ok_or_else(|| InvalidIdentifier(raw.to_string()))?;
    if user_id != claims.sub {
        return Err(ApiError::Forbidden);
    }
    Ok(user_id)
}
