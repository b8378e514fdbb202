use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
};
use serde_json::json;

use estate_gateway::connection;

use crate::images::MAX_IMAGE_SIZE;
use crate::middleware::{require_admin, require_auth};
use crate::state::AppState;
use crate::{admin, auth, dashboard, favorites, images, messages, properties};

/// Every HTTP and WebSocket route. CORS and tracing layers are added by the
/// binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/properties", get(properties::list_properties))
        .route("/properties/{property_id}", get(properties::get_property))
        .route("/files/{image_id}", get(images::serve_file))
        .route("/realtime", get(ws_upgrade));

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/dashboard", get(dashboard::dashboard))
        .route("/me/properties", get(properties::my_properties))
        .route("/properties", post(properties::create_property))
        .route(
            "/properties/{property_id}",
            patch(properties::update_property).delete(properties::delete_property),
        )
        .route(
            "/properties/{property_id}/images",
            post(images::upload_image).layer(DefaultBodyLimit::max(MAX_IMAGE_SIZE + 1024)),
        )
        .route(
            "/properties/{property_id}/favorite",
            post(favorites::toggle_favorite),
        )
        .route("/favorites", get(favorites::list_favorites))
        .route("/favorites/ids", get(favorites::favorite_ids))
        .route(
            "/properties/{property_id}/messages",
            get(messages::get_thread).post(messages::send_message),
        )
        .route("/messages/inbox", get(messages::inbox))
        .route("/messages/{message_id}/status", patch(messages::update_status))
        .route("/messages/{message_id}/reply", post(messages::reply))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // require_admin reads the AuthUser that require_auth inserts, so it sits
    // inside it.
    let admin_routes = Router::new()
        .route("/admin/users", get(admin::list_users))
        .route(
            "/admin/users/{user_id}",
            patch(admin::update_user).delete(admin::delete_user),
        )
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET /realtime: upgrades to the push gateway. The socket authenticates
/// with an `Identify` command, not a header.
async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(
            socket,
            state.dispatcher.clone(),
            state.db.clone(),
            state.config.jwt_secret.clone(),
        )
    })
}
