use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use rand_core::OsRng;
use tracing::info;
use uuid::Uuid;

use estate_db::models::UserRow;
use estate_db::now_ts;
use estate_types::api::{AuthResponse, Claims, LoginRequest, RegisterRequest};

use crate::convert;
use crate::error::{ApiError, blocking};
use crate::middleware::AuthUser;
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 8;
const MAX_NAME_LEN: usize = 64;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    let name = req.name.trim().to_string();

    if !is_valid_email(&email) {
        return Err(ApiError::bad_request("invalid email address"));
    }
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::bad_request(format!(
            "name must be 1-{} characters",
            MAX_NAME_LEN
        )));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hash failed: {}", e)))?
        .to_string();

    let is_admin = state
        .config
        .admin_email
        .as_deref()
        .is_some_and(|admin| admin.eq_ignore_ascii_case(&email));

    let ts = now_ts();
    let row = UserRow {
        id: Uuid::new_v4().to_string(),
        email,
        name,
        phone: None,
        avatar: None,
        password: password_hash,
        is_admin,
        is_banned: false,
        verified: false,
        created: ts.clone(),
        updated: ts,
    };

    let db = state.db.clone();
    let insert = row.clone();
    let created = blocking(move || db.create_user(&insert)).await?;

    if !created {
        return Err(ApiError::conflict("email is already registered"));
    }

    info!("Registered {} (admin: {})", row.email, row.is_admin);
    let user = convert::user(row);
    let token = create_token(&state, &user.id, &user.email, user.is_admin)?;

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let invalid = || ApiError::Unauthorized("invalid email or password".into());
    let email = req.email.trim().to_lowercase();

    let db = state.db.clone();
    let row = blocking(move || db.get_user_by_email(&email))
        .await?
        .ok_or_else(invalid)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&row.password)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored hash unreadable: {}", e)))?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| invalid())?;

    if row.is_banned {
        return Err(ApiError::forbidden("account is banned"));
    }

    let user = convert::user(row);
    let token = create_token(&state, &user.id, &user.email, user.is_admin)?;
    Ok(Json(AuthResponse { token, user }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let id = caller.id.to_string();
    let row = blocking(move || db.get_user_by_id(&id))
        .await?
        .ok_or_else(|| ApiError::not_found("user"))?;
    Ok(Json(convert::user(row)))
}

fn create_token(state: &AppState, user_id: &Uuid, email: &str, is_admin: bool) -> Result<String, ApiError> {
    let claims = Claims {
        sub: *user_id,
        email: email.to_string(),
        is_admin,
        exp: (chrono::Utc::now() + chrono::Duration::days(state.config.token_ttl_days)).timestamp()
            as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.config.jwt_secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(e.into()))
}

/// `local@domain.tld` with no whitespace.
fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !email.chars().any(char::is_whitespace)
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
}

#[cfg(test)]
mod tests {
    use super::is_valid_email;

    #[test]
    fn email_shape() {
        assert!(is_valid_email("agent@realty.example"));
        assert!(!is_valid_email("agent"));
        assert!(!is_valid_email("@realty.example"));
        assert!(!is_valid_email("agent@realty"));
        assert!(!is_valid_email("a b@realty.example"));
        assert!(!is_valid_email("a@b@realty.example"));
    }
}
