//! Row -> API model conversion. Corrupt columns are logged and replaced with
//! defaults instead of failing the whole response.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;
use uuid::Uuid;

use estate_db::models::{MessageRow, PropertyRow, UserRow};
use estate_types::models::{
    ListingType, MessageStatus, Property, PropertyMessage, PropertyStatus, PropertyType, User,
};

use crate::state::AppStateInner;

/// Format a timestamp the way the DB stores it.
pub fn to_db_ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn user(row: UserRow) -> User {
    User {
        id: uuid(&row.id, "user.id", &row.id),
        created: ts(&row.created, "user.created", &row.id),
        updated: ts(&row.updated, "user.updated", &row.id),
        email: row.email,
        name: row.name,
        phone: row.phone,
        avatar: row.avatar,
        is_admin: row.is_admin,
        is_banned: row.is_banned,
        verified: row.verified,
    }
}

pub fn property(state: &AppStateInner, row: PropertyRow) -> Property {
    let id = &row.id;
    Property {
        id: uuid(id, "property.id", id),
        property_type: enum_or(&row.property_type, PropertyType::House, "property.property_type", id),
        listing_type: enum_or(&row.listing_type, ListingType::Sale, "property.listing_type", id),
        status: enum_or(&row.status, PropertyStatus::Draft, "property.status", id),
        owner_id: uuid(&row.owner_id, "property.owner_id", id),
        agent_id: row
            .agent_id
            .as_deref()
            .map(|a| uuid(a, "property.agent_id", id)),
        bedrooms: count(row.bedrooms),
        bathrooms: count(row.bathrooms),
        square_feet: count(row.square_feet),
        image_urls: row.images.iter().map(|i| state.image_url(i)).collect(),
        created: ts(&row.created, "property.created", id),
        updated: ts(&row.updated, "property.updated", id),
        title: row.title,
        description: row.description,
        address: row.address,
        city: row.city,
        state: row.state,
        country: row.country,
        latitude: row.latitude,
        longitude: row.longitude,
        price: row.price,
        images: row.images,
    }
}

pub fn message(row: MessageRow) -> PropertyMessage {
    let id = &row.id;
    PropertyMessage {
        id: uuid(id, "message.id", id),
        property_id: uuid(&row.property_id, "message.property_id", id),
        sender_id: uuid(&row.sender_id, "message.sender_id", id),
        status: enum_or(&row.status, MessageStatus::New, "message.status", id),
        replied_by: row
            .replied_by
            .as_deref()
            .map(|r| uuid(r, "message.replied_by", id)),
        replied_at: row
            .replied_at
            .as_deref()
            .map(|r| ts(r, "message.replied_at", id)),
        created: ts(&row.created, "message.created", id),
        updated: ts(&row.updated, "message.updated", id),
        name: row.name,
        email: row.email,
        phone: row.phone,
        body: row.body,
        reply: row.reply,
    }
}

fn uuid(value: &str, column: &str, row_id: &str) -> Uuid {
    value.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}' on row '{}': {}", column, value, row_id, e);
        Uuid::default()
    })
}

fn ts(value: &str, column: &str, row_id: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!("Corrupt {} '{}' on row '{}': {}", column, value, row_id, e);
            DateTime::default()
        })
}

fn enum_or<T: FromStr>(value: &str, fallback: T, column: &str, row_id: &str) -> T {
    value.parse().unwrap_or_else(|_| {
        warn!("Corrupt {} '{}' on row '{}'", column, value, row_id);
        fallback
    })
}

fn count(value: i64) -> u32 {
    u32::try_from(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn db_timestamp_roundtrip() {
        let t = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap();
        let s = to_db_ts(t);
        assert_eq!(s, "2026-03-01T12:30:00.000Z");
        assert_eq!(ts(&s, "created", "x"), t);
    }

    #[test]
    fn corrupt_message_columns_fall_back() {
        let row = MessageRow {
            id: "not-a-uuid".into(),
            property_id: Uuid::nil().to_string(),
            sender_id: Uuid::nil().to_string(),
            name: "A".into(),
            email: "a@example.com".into(),
            phone: None,
            body: "hi".into(),
            status: "archived".into(),
            reply: None,
            replied_by: None,
            replied_at: None,
            created: "yesterday".into(),
            updated: to_db_ts(Utc::now()),
        };
        let m = message(row);
        assert_eq!(m.id, Uuid::default());
        assert_eq!(m.status, MessageStatus::New);
        assert_eq!(m.created, DateTime::<Utc>::default());
    }
}
