use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use estate_db::models::{MessageRow, PropertyRow};
use estate_db::{TransitionOutcome, now_ts};
use estate_query::filter::is_unset;
use estate_types::api::{ListResult, ReplyRequest, SendMessageRequest, UpdateMessageStatusRequest};
use estate_types::events::RealtimeEvent;
use estate_types::models::{MessageStatus, PropertyMessage, PropertyStatus};

use crate::convert;
use crate::error::{ApiError, blocking};
use crate::middleware::AuthUser;
use crate::params::PageParams;
use crate::properties::load_visible;
use crate::state::AppState;

const MAX_BODY_LEN: usize = 5000;

#[derive(Debug, Deserialize)]
pub struct ThreadQuery {
    /// Whose thread to read. Defaults to the caller.
    pub sender: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// POST /properties/{id}/messages: start or continue an inquiry thread.
pub async fn send_message(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let body = validate_body(&req.body)?;

    let property = load_visible(&state, property_id, Some(&caller)).await?;
    if property.owner_id == caller.id.to_string() {
        return Err(ApiError::bad_request("you cannot message your own listing"));
    }
    if property.status == PropertyStatus::Draft.as_str() {
        return Err(ApiError::bad_request("listing is not published"));
    }

    let ts = now_ts();
    let row = MessageRow {
        id: Uuid::new_v4().to_string(),
        property_id: property.id,
        sender_id: caller.id.to_string(),
        name: non_blank(req.name).unwrap_or_else(|| caller.name.clone()),
        email: non_blank(req.email).unwrap_or_else(|| caller.email.clone()),
        phone: non_blank(req.phone),
        body,
        status: MessageStatus::New.as_str().into(),
        reply: None,
        replied_by: None,
        replied_at: None,
        created: ts.clone(),
        updated: ts,
    };

    let db = state.db.clone();
    let insert = row.clone();
    blocking(move || db.insert_message(&insert)).await?;

    info!("{} sent message {} on listing {}", caller.email, row.id, property_id);
    let message = convert::message(row);
    state.dispatcher.publish(RealtimeEvent::MessageCreate {
        message: message.clone(),
    });
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /properties/{id}/messages: one thread, oldest first.
pub async fn get_thread(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
    Extension(caller): Extension<AuthUser>,
    Query(query): Query<ThreadQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let property = load_visible(&state, property_id, Some(&caller)).await?;
    let sender = query.sender.unwrap_or(caller.id);
    if sender != caller.id && !is_owner_or_admin(&caller, &property) {
        return Err(ApiError::forbidden("you can only read your own threads"));
    }

    let db = state.db.clone();
    let sid = sender.to_string();
    let rows = blocking(move || db.get_thread(&property.id, &sid)).await?;

    let thread: Vec<PropertyMessage> = rows.into_iter().map(convert::message).collect();
    Ok(Json(thread))
}

/// GET /messages/inbox: messages on the caller's listings (all listings for
/// admins), newest first.
pub async fn inbox(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Query(query): Query<InboxQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = match query.status.as_deref() {
        Some(s) if !is_unset(s) => Some(
            s.parse::<MessageStatus>()
                .map_err(|e| ApiError::bad_request(e.to_string()))?,
        ),
        _ => None,
    };
    let page = PageParams {
        page: query.page,
        per_page: query.per_page,
    }
    .spec();

    let db = state.db.clone();
    let owner = (!caller.is_admin).then(|| caller.id.to_string());
    let (rows, total) = blocking(move || {
        db.list_inbox(owner.as_deref(), status.map(|s| s.as_str()), page)
    })
    .await?;

    let items = rows.into_iter().map(convert::message).collect();
    Ok(Json(ListResult::new(page.page, page.per_page, total, items)))
}

/// PATCH /messages/{id}/status
///
/// Owners and admins may make any forward transition. The sender may only
/// close their own inquiry.
pub async fn update_status(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<UpdateMessageStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (message, property) = load_message(&state, message_id).await?;
    let is_sender = message.sender_id == caller.id.to_string();
    let manages = is_owner_or_admin(&caller, &property);
    if !manages && !(is_sender && req.status == MessageStatus::Closed) {
        return Err(ApiError::forbidden("you cannot change this message"));
    }

    let next = req.status;
    let db = state.db.clone();
    let outcome = blocking(move || {
        db.update_message(&message.id, |row| {
            let current = row.status.parse().unwrap_or(MessageStatus::New);
            if current == next || !current.can_transition_to(next) {
                return false;
            }
            row.status = next.as_str().into();
            true
        })
    })
    .await?;

    let row = settle(outcome, next)?;
    info!("{} set message {} to {}", caller.email, message_id, row.status);
    Ok(Json(publish_update(&state, row)))
}

/// POST /messages/{id}/reply: store the owner's answer and mark the thread
/// replied.
pub async fn reply(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<ReplyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let text = validate_body(&req.reply)?;
    let (message, property) = load_message(&state, message_id).await?;
    if !is_owner_or_admin(&caller, &property) {
        return Err(ApiError::forbidden("only the listing owner can reply"));
    }

    let replier = caller.id.to_string();
    let db = state.db.clone();
    let outcome = blocking(move || {
        db.update_message(&message.id, |row| {
            let current: MessageStatus = row.status.parse().unwrap_or(MessageStatus::New);
            if !current.can_transition_to(MessageStatus::Replied) {
                return false;
            }
            row.status = MessageStatus::Replied.as_str().into();
            row.reply = Some(text);
            row.replied_by = Some(replier);
            row.replied_at = Some(now_ts());
            true
        })
    })
    .await?;

    let row = match outcome {
        TransitionOutcome::Updated(row) => row,
        TransitionOutcome::NotFound => return Err(ApiError::not_found("message")),
        TransitionOutcome::Rejected(row) => {
            return Err(ApiError::conflict(format!(
                "cannot reply to a message that is {}",
                row.status
            )));
        }
    };

    info!("{} replied to message {}", caller.email, message_id);
    Ok(Json(publish_update(&state, row)))
}

/// Map a guarded transition to a response. Asking for the status a message
/// already has is a no-op, not a conflict.
fn settle(outcome: TransitionOutcome, requested: MessageStatus) -> Result<MessageRow, ApiError> {
    match outcome {
        TransitionOutcome::Updated(row) => Ok(row),
        TransitionOutcome::NotFound => Err(ApiError::not_found("message")),
        TransitionOutcome::Rejected(row) if row.status == requested.as_str() => Ok(row),
        TransitionOutcome::Rejected(row) => Err(ApiError::conflict(format!(
            "cannot move a message from {} to {}",
            row.status, requested
        ))),
    }
}

fn publish_update(state: &AppState, row: MessageRow) -> PropertyMessage {
    let message = convert::message(row);
    state.dispatcher.publish(RealtimeEvent::MessageUpdate {
        message: message.clone(),
    });
    message
}

async fn load_message(
    state: &AppState,
    message_id: Uuid,
) -> Result<(MessageRow, PropertyRow), ApiError> {
    let db = state.db.clone();
    let found = blocking(move || {
        let Some(message) = db.get_message(&message_id.to_string())? else {
            return Ok(None);
        };
        let property = db.get_property(&message.property_id)?;
        Ok(property.map(|p| (message, p)))
    })
    .await?;
    found.ok_or_else(|| ApiError::not_found("message"))
}

fn is_owner_or_admin(caller: &AuthUser, property: &PropertyRow) -> bool {
    caller.is_admin || property.owner_id == caller.id.to_string()
}

fn validate_body(body: &str) -> Result<String, ApiError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(ApiError::bad_request("message cannot be empty"));
    }
    if body.chars().count() > MAX_BODY_LEN {
        return Err(ApiError::bad_request(format!(
            "message exceeds {} characters",
            MAX_BODY_LEN
        )));
    }
    Ok(body.to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: MessageStatus) -> MessageRow {
        MessageRow {
            id: "m1".into(),
            property_id: "p1".into(),
            sender_id: "u1".into(),
            name: "Buyer".into(),
            email: "buyer@example.com".into(),
            phone: None,
            body: "Is it still available?".into(),
            status: status.as_str().into(),
            reply: None,
            replied_by: None,
            replied_at: None,
            created: now_ts(),
            updated: now_ts(),
        }
    }

    #[test]
    fn repeating_current_status_is_not_a_conflict() {
        let settled = settle(
            TransitionOutcome::Rejected(row(MessageStatus::Read)),
            MessageStatus::Read,
        );
        assert!(settled.is_ok());
    }

    #[test]
    fn backwards_transition_is_a_conflict() {
        let settled = settle(
            TransitionOutcome::Rejected(row(MessageStatus::Closed)),
            MessageStatus::New,
        );
        assert!(matches!(settled, Err(ApiError::Conflict(_))));
    }

    #[test]
    fn body_is_trimmed_and_bounded() {
        assert_eq!(validate_body("  hello  ").unwrap(), "hello");
        assert!(validate_body("   ").is_err());
        assert!(validate_body(&"x".repeat(MAX_BODY_LEN + 1)).is_err());
    }
}
