use axum::{
    Json, Router, middleware,
    routing::{get, post, put},
};

use crate::auth::{self, AppState};
use crate::middleware::require_auth;
use crate::{boards, comments, engagement, pins, users};

/// All API routes. Transport layers (CORS, tracing) are added by the server.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/pins", get(pins::list_pins))
        .route("/pins/{id}", get(pins::get_pin))
        .route("/pins/{id}/comments", get(comments::list_comments))
        .route("/boards", get(boards::list_boards))
        .route("/boards/{id}", get(boards::get_board))
        .route("/boards/user/{user_id}", get(boards::list_user_boards))
        .route("/users/{id}", get(users::get_user));

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me).put(auth::update_me))
        .route("/pins", post(pins::create_pin))
        .route("/pins/{id}", put(pins::update_pin).delete(pins::delete_pin))
        .route("/pins/{id}/like", put(engagement::like_pin))
        .route("/pins/{id}/save", put(engagement::save_pin))
        .route("/pins/{id}/comments", post(comments::add_comment))
        .route("/boards", post(boards::create_board))
        .route("/boards/{id}", put(boards::update_board).delete(boards::delete_board))
        .route("/users/{id}/follow", post(users::follow).delete(users::unfollow))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
