use std::collections::BTreeMap;

use axum::{Extension, Json, extract::State, response::IntoResponse};
use tracing::warn;

use estate_types::api::{AdminStats, DashboardResponse};
use estate_types::models::PropertyStatus;

use crate::error::{ApiError, blocking};
use crate::middleware::AuthUser;
use crate::state::AppState;

/// GET /dashboard: counts for the caller's own listings, plus site-wide
/// user numbers for admins.
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let uid = caller.id.to_string();
    let is_admin = caller.is_admin;
    let (by_status, favorites, unread, users) = blocking(move || {
        let by_status = db.count_properties_by_status(&uid)?;
        let favorites = db.count_favorites(&uid)?;
        let unread = db.count_unread_messages(&uid)?;
        let users = if is_admin { Some(db.count_users()?) } else { None };
        Ok((by_status, favorites, unread, users))
    })
    .await?;

    let mut properties_by_status = BTreeMap::new();
    for (status, n) in by_status {
        match status.parse::<PropertyStatus>() {
            Ok(s) => {
                properties_by_status.insert(s, n);
            }
            Err(_) => warn!("Skipping unknown listing status '{}' in dashboard", status),
        }
    }

    Ok(Json(DashboardResponse {
        total_properties: properties_by_status.values().sum(),
        properties_by_status,
        favorites,
        unread_messages: unread,
        admin: users.map(|(total_users, banned_users)| AdminStats {
            total_users,
            banned_users,
        }),
    }))
}
