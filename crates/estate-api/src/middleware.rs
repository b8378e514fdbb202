use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use uuid::Uuid;

use estate_types::api::Claims;

use crate::error::{ApiError, blocking};
use crate::state::AppState;

/// The authenticated caller, refreshed from the DB on every request so bans
/// and role changes apply to tokens that were already issued.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub is_admin: bool,
}

/// Extract and validate the bearer JWT, then load the account behind it.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = claims_from_headers(req.headers(), &state.config.jwt_secret)
        .ok_or_else(|| ApiError::Unauthorized("missing or invalid token".into()))?;

    let user = load_user(&state, claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("account no longer exists".into()))?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Layer inside `require_auth`; rejects non-admins.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, ApiError> {
    let is_admin = req
        .extensions()
        .get::<AuthUser>()
        .is_some_and(|u| u.is_admin);
    if !is_admin {
        return Err(ApiError::forbidden("admin access required"));
    }
    Ok(next.run(req).await)
}

/// Caller on public routes. Anonymous or unusable tokens yield `None`;
/// banned accounts are still rejected.
pub async fn optional_viewer(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<AuthUser>, ApiError> {
    match claims_from_headers(headers, &state.config.jwt_secret) {
        Some(claims) => load_user(state, claims.sub).await,
        None => Ok(None),
    }
}

async fn load_user(state: &AppState, user_id: Uuid) -> Result<Option<AuthUser>, ApiError> {
    let db = state.db.clone();
    let row = blocking(move || db.get_user_by_id(&user_id.to_string())).await?;

    match row {
        Some(row) if row.is_banned => Err(ApiError::forbidden("account is banned")),
        Some(row) => Ok(Some(AuthUser {
            id: user_id,
            email: row.email,
            name: row.name,
            is_admin: row.is_admin,
        })),
        None => Ok(None),
    }
}

fn claims_from_headers(headers: &HeaderMap, secret: &str) -> Option<Claims> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))?;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}
