use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use estate_types::api::{AdminUpdateUserRequest, ListResult};
use estate_types::events::RealtimeEvent;
use estate_types::models::User;

use crate::convert;
use crate::error::{ApiError, blocking};
use crate::images;
use crate::middleware::AuthUser;
use crate::params::PageParams;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UserSearch {
    /// Matches email or name.
    pub q: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// GET /admin/users
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserSearch>,
) -> Result<impl IntoResponse, ApiError> {
    let page = PageParams {
        page: query.page,
        per_page: query.per_page,
    }
    .spec();
    let search = query
        .q
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty());

    let db = state.db.clone();
    let (rows, total) = blocking(move || db.list_users(search.as_deref(), page)).await?;

    let items: Vec<User> = rows.into_iter().map(convert::user).collect();
    Ok(Json(ListResult::new(page.page, page.per_page, total, items)))
}

/// PATCH /admin/users/{id}: moderation flags. Pushes `UserUpdate` so open
/// admin tables reflect the change.
pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<AdminUpdateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if user_id == caller.id {
        if req.is_banned == Some(true) {
            return Err(ApiError::bad_request("you cannot ban yourself"));
        }
        if req.is_admin == Some(false) {
            return Err(ApiError::bad_request("you cannot remove your own admin rights"));
        }
    }
    if req.is_banned.is_none() && req.is_admin.is_none() && req.verified.is_none() {
        return Err(ApiError::bad_request("nothing to update"));
    }

    let db = state.db.clone();
    let uid = user_id.to_string();
    let row = blocking(move || db.update_user_flags(&uid, req.is_banned, req.is_admin, req.verified))
        .await?
        .ok_or_else(|| ApiError::not_found("user"))?;

    if req.is_banned == Some(true) {
        warn!("{} banned {}", caller.email, row.email);
    } else {
        info!("{} updated account {}", caller.email, row.email);
    }

    let user = convert::user(row);
    state
        .dispatcher
        .publish(RealtimeEvent::UserUpdate { user: user.clone() });
    Ok(Json(user))
}

/// DELETE /admin/users/{id}: removes the account with its listings,
/// favorites, and messages.
pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(caller): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    if user_id == caller.id {
        return Err(ApiError::bad_request("you cannot delete your own account"));
    }

    let db = state.db.clone();
    let uid = user_id.to_string();
    let image_ids = blocking(move || db.delete_user(&uid))
        .await?
        .ok_or_else(|| ApiError::not_found("user"))?;

    images::remove_files(&state, &image_ids).await;
    state.dispatcher.publish(RealtimeEvent::UserDelete { user_id });

    warn!("{} deleted account {}", caller.email, user_id);
    Ok(StatusCode::NO_CONTENT)
}
