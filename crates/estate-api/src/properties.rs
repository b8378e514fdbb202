use axum::{
    Extension, Json,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use tracing::{debug, info};
use uuid::Uuid;

use estate_db::models::PropertyRow;
use estate_db::{ListScope, UpdateOutcome, now_ts};
use estate_query::{PropertyFilter, translate};
use estate_types::api::{CreatePropertyRequest, ListResult, UpdatePropertyRequest};
use estate_types::events::RealtimeEvent;
use estate_types::models::{Property, PropertyStatus};

use crate::convert;
use crate::error::{ApiError, blocking};
use crate::images;
use crate::middleware::{AuthUser, optional_viewer};
use crate::state::AppState;

const MAX_TITLE_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 10_000;

/// GET /properties: public search. Filters, sort, and paging come from the
/// URL query string; drafts are only returned to their owner.
pub async fn list_properties(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = optional_viewer(&state, &headers).await?;
    let filter = PropertyFilter::from_query_string(query.as_deref().unwrap_or_default());
    let query = translate(&filter);
    debug!(
        filter = %query.filter_expression(),
        sort = %query.sort,
        page = query.page.page,
        "Listing properties"
    );

    let db = state.db.clone();
    let viewer_id = viewer.as_ref().map(|v| v.id.to_string());
    let is_admin = viewer.as_ref().is_some_and(|v| v.is_admin);
    let page = query.page;
    let (rows, total) = blocking(move || {
        let scope = if is_admin {
            ListScope::All
        } else {
            ListScope::Public {
                viewer: viewer_id.as_deref(),
            }
        };
        db.list_properties(&query, scope)
    })
    .await?;

    Ok(Json(to_list(&state, page.page, page.per_page, total, rows)))
}

/// GET /me/properties: the caller's own listings, drafts included, with the
/// same filter parameters as the public search.
pub async fn my_properties(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    RawQuery(query): RawQuery,
) -> Result<impl IntoResponse, ApiError> {
    let filter = PropertyFilter::from_query_string(query.as_deref().unwrap_or_default());
    let query = translate(&filter);
    let page = query.page;

    let db = state.db.clone();
    let owner = caller.id.to_string();
    let (rows, total) = blocking(move || db.list_properties(&query, ListScope::Owner(&owner))).await?;

    Ok(Json(to_list(&state, page.page, page.per_page, total, rows)))
}

/// GET /properties/{id}
pub async fn get_property(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = optional_viewer(&state, &headers).await?;
    let row = load_visible(&state, property_id, viewer.as_ref()).await?;
    Ok(Json(convert::property(&state, row)))
}

/// POST /properties
pub async fn create_property(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<CreatePropertyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_text(&req.title, &req.description)?;
    validate_numbers(req.price, req.latitude, req.longitude)?;
    if req.city.trim().is_empty() {
        return Err(ApiError::bad_request("city is required"));
    }
    ensure_agent(&state, req.agent_id).await?;

    let ts = now_ts();
    let row = PropertyRow {
        id: Uuid::new_v4().to_string(),
        title: req.title.trim().to_string(),
        description: req.description,
        property_type: req.property_type.as_str().into(),
        listing_type: req.listing_type.as_str().into(),
        status: req.status.unwrap_or(PropertyStatus::Draft).as_str().into(),
        address: req.address,
        city: req.city.trim().to_string(),
        state: req.state,
        country: req.country,
        latitude: req.latitude,
        longitude: req.longitude,
        price: req.price,
        bedrooms: req.bedrooms as i64,
        bathrooms: req.bathrooms as i64,
        square_feet: req.square_feet as i64,
        owner_id: caller.id.to_string(),
        agent_id: req.agent_id.map(|a| a.to_string()),
        images: Vec::new(),
        created: ts.clone(),
        updated: ts,
    };

    let db = state.db.clone();
    let insert = row.clone();
    blocking(move || db.insert_property(&insert)).await?;

    info!("{} created listing {} ({})", caller.email, row.id, row.title);
    Ok((StatusCode::CREATED, Json(convert::property(&state, row))))
}

/// PATCH /properties/{id}: partial edit guarded by `expected_updated`.
pub async fn update_property(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<UpdatePropertyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let expected = req
        .expected_updated
        .map(convert::to_db_ts)
        .ok_or_else(|| ApiError::bad_request("expected_updated is required"))?;

    let mut row = load_visible(&state, property_id, Some(&caller)).await?;
    ensure_manager(&caller, &row)?;
    ensure_agent(&state, req.agent_id).await?;

    apply_changes(&mut row, req)?;

    let db = state.db.clone();
    let outcome = blocking(move || db.update_property(&row, Some(&expected))).await?;

    let row = match outcome {
        UpdateOutcome::Updated(row) => row,
        UpdateOutcome::NotFound => return Err(ApiError::not_found("property")),
        UpdateOutcome::Conflict { current_updated } => {
            return Err(ApiError::conflict(format!(
                "listing was changed by someone else (updated {}); reload and try again",
                current_updated
            )));
        }
    };

    let property = convert::property(&state, row);
    state.dispatcher.publish(RealtimeEvent::PropertyUpdate {
        property: property.clone(),
    });
    Ok(Json(property))
}

/// DELETE /properties/{id}
pub async fn delete_property(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
    Extension(caller): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let row = load_visible(&state, property_id, Some(&caller)).await?;
    ensure_manager(&caller, &row)?;

    let db = state.db.clone();
    let image_ids = blocking(move || db.delete_property(&row.id))
        .await?
        .ok_or_else(|| ApiError::not_found("property"))?;

    images::remove_files(&state, &image_ids).await;
    state
        .dispatcher
        .publish(RealtimeEvent::PropertyDelete { property_id });

    info!("{} deleted listing {}", caller.email, property_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Fetch a listing the viewer is allowed to see. Other people's drafts are
/// reported as missing.
pub async fn load_visible(
    state: &AppState,
    property_id: Uuid,
    viewer: Option<&AuthUser>,
) -> Result<PropertyRow, ApiError> {
    let db = state.db.clone();
    let row = blocking(move || db.get_property(&property_id.to_string()))
        .await?
        .ok_or_else(|| ApiError::not_found("property"))?;

    let privileged = viewer.is_some_and(|v| v.is_admin || v.id.to_string() == row.owner_id);
    if row.status == PropertyStatus::Draft.as_str() && !privileged {
        return Err(ApiError::not_found("property"));
    }
    Ok(row)
}

/// Owners and admins may edit a listing.
pub fn ensure_manager(caller: &AuthUser, row: &PropertyRow) -> Result<(), ApiError> {
    if caller.is_admin || caller.id.to_string() == row.owner_id {
        Ok(())
    } else {
        Err(ApiError::forbidden("only the owner or an admin can change this listing"))
    }
}

pub fn to_list(
    state: &AppState,
    page: u32,
    per_page: u32,
    total: u64,
    rows: Vec<PropertyRow>,
) -> ListResult<Property> {
    let items = rows
        .into_iter()
        .map(|row| convert::property(state, row))
        .collect();
    ListResult::new(page, per_page, total, items)
}

/// An assigned agent must be an existing account that is not banned.
async fn ensure_agent(state: &AppState, agent_id: Option<Uuid>) -> Result<(), ApiError> {
    let Some(agent_id) = agent_id else {
        return Ok(());
    };
    let db = state.db.clone();
    if blocking(move || db.is_active_user(&agent_id.to_string())).await? {
        Ok(())
    } else {
        Err(ApiError::bad_request("unknown agent"))
    }
}

fn apply_changes(row: &mut PropertyRow, req: UpdatePropertyRequest) -> Result<(), ApiError> {
    if let Some(title) = req.title {
        row.title = title.trim().to_string();
    }
    if let Some(description) = req.description {
        row.description = description;
    }
    validate_text(&row.title, &row.description)?;

    if let Some(t) = req.property_type {
        row.property_type = t.as_str().into();
    }
    if let Some(t) = req.listing_type {
        row.listing_type = t.as_str().into();
    }
    if let Some(s) = req.status {
        row.status = s.as_str().into();
    }
    if let Some(address) = req.address {
        row.address = address;
    }
    if let Some(city) = req.city {
        if city.trim().is_empty() {
            return Err(ApiError::bad_request("city is required"));
        }
        row.city = city.trim().to_string();
    }
    if let Some(state) = req.state {
        row.state = state;
    }
    if let Some(country) = req.country {
        row.country = country;
    }
    if req.latitude.is_some() {
        row.latitude = req.latitude;
    }
    if req.longitude.is_some() {
        row.longitude = req.longitude;
    }
    if let Some(price) = req.price {
        row.price = price;
    }
    if let Some(n) = req.bedrooms {
        row.bedrooms = n as i64;
    }
    if let Some(n) = req.bathrooms {
        row.bathrooms = n as i64;
    }
    if let Some(n) = req.square_feet {
        row.square_feet = n as i64;
    }
    if let Some(agent) = req.agent_id {
        row.agent_id = Some(agent.to_string());
    }
    validate_numbers(row.price, row.latitude, row.longitude)
}

fn validate_text(title: &str, description: &str) -> Result<(), ApiError> {
    let len = title.trim().chars().count();
    if len == 0 || len > MAX_TITLE_LEN {
        return Err(ApiError::bad_request(format!(
            "title must be 1-{} characters",
            MAX_TITLE_LEN
        )));
    }
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ApiError::bad_request("description is too long"));
    }
    Ok(())
}

fn validate_numbers(price: i64, latitude: Option<f64>, longitude: Option<f64>) -> Result<(), ApiError> {
    if price < 0 {
        return Err(ApiError::bad_request("price cannot be negative"));
    }
    if latitude.is_some_and(|l| !(-90.0..=90.0).contains(&l)) {
        return Err(ApiError::bad_request("latitude out of range"));
    }
    if longitude.is_some_and(|l| !(-180.0..=180.0).contains(&l)) {
        return Err(ApiError::bad_request("longitude out of range"));
    }
    Ok(())
}
