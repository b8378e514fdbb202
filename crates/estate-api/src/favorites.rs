use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use tracing::debug;
use uuid::Uuid;

use estate_types::api::ToggleFavoriteResponse;
use estate_types::events::RealtimeEvent;

use crate::error::{ApiError, blocking};
use crate::middleware::AuthUser;
use crate::params::PageParams;
use crate::properties::{load_visible, to_list};
use crate::state::AppState;

/// POST /properties/{id}/favorite: flips the caller's favorite on a listing.
/// The unique (user, listing) pair means repeated toggles alternate.
pub async fn toggle_favorite(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
    Extension(caller): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    load_visible(&state, property_id, Some(&caller)).await?;

    let db = state.db.clone();
    let uid = caller.id.to_string();
    let pid = property_id.to_string();
    let favorited =
        blocking(move || db.toggle_favorite(&Uuid::new_v4().to_string(), &uid, &pid)).await?;

    debug!("{} favorite on {} -> {}", caller.email, property_id, favorited);
    state.dispatcher.publish(RealtimeEvent::FavoriteUpdate {
        user_id: caller.id,
        property_id,
        favorited,
    });

    Ok(Json(ToggleFavoriteResponse { favorited }))
}

/// GET /favorites: the caller's favorited listings, newest favorite first.
pub async fn list_favorites(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, ApiError> {
    let page = params.spec();
    let db = state.db.clone();
    let uid = caller.id.to_string();
    let (rows, total) = blocking(move || db.list_favorites(&uid, page)).await?;

    Ok(Json(to_list(&state, page.page, page.per_page, total, rows)))
}

/// GET /favorites/ids: bare id list used to mark hearts on search results.
pub async fn favorite_ids(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let uid = caller.id.to_string();
    let ids = blocking(move || db.favorite_property_ids(&uid)).await?;
    Ok(Json(ids))
}
