use anyhow::Result;

use estate_db::Database;
use estate_db::models::UserRow;
use estate_types::events::Topic;

/// Decide whether `user` may subscribe to `topic`. Blocking; call from
/// `spawn_blocking`.
///
/// - threads: the sender, the listing's owner, and admins
/// - listings: anyone, except drafts (owner and admins only)
/// - user feeds: that user only
/// - admin feed: current admins, checked against the DB rather than the token
pub fn may_subscribe(db: &Database, user: &UserRow, topic: &Topic) -> Result<bool> {
    if user.is_banned {
        return Ok(false);
    }

    let user_id = user.id.as_str();
    match topic {
        Topic::Admin => Ok(user.is_admin),
        Topic::User { user_id: target } => Ok(target.to_string() == user_id),
        Topic::Thread {
            property_id,
            sender_id,
        } => {
            if user.is_admin || sender_id.to_string() == user_id {
                return Ok(true);
            }
            let property = db.get_property(&property_id.to_string())?;
            Ok(property.is_some_and(|p| p.owner_id == user_id))
        }
        Topic::Property { property_id } => {
            let Some(property) = db.get_property(&property_id.to_string())? else {
                return Ok(false);
            };
            Ok(property.status != "draft" || property.owner_id == user_id || user.is_admin)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estate_db::models::PropertyRow;
    use estate_db::now_ts;
    use uuid::Uuid;

    fn user(db: &Database, is_admin: bool) -> UserRow {
        let ts = now_ts();
        let id = Uuid::new_v4();
        let row = UserRow {
            id: id.to_string(),
            email: format!("{}@example.com", id),
            name: "Test".into(),
            phone: None,
            avatar: None,
            password: String::new(),
            is_admin,
            is_banned: false,
            verified: true,
            created: ts.clone(),
            updated: ts,
        };
        db.create_user(&row).unwrap();
        row
    }

    fn listing(db: &Database, owner: &UserRow, status: &str) -> Uuid {
        let id = Uuid::new_v4();
        let ts = now_ts();
        db.insert_property(&PropertyRow {
            id: id.to_string(),
            title: "Home".into(),
            description: String::new(),
            property_type: "house".into(),
            listing_type: "sale".into(),
            status: status.into(),
            address: String::new(),
            city: "Austin".into(),
            state: String::new(),
            country: String::new(),
            latitude: None,
            longitude: None,
            price: 1,
            bedrooms: 0,
            bathrooms: 0,
            square_feet: 0,
            owner_id: owner.id.clone(),
            agent_id: None,
            images: vec![],
            created: ts.clone(),
            updated: ts,
        })
        .unwrap();
        id
    }

    #[test]
    fn thread_access() {
        let db = Database::open_in_memory().unwrap();
        let owner = user(&db, false);
        let buyer = user(&db, false);
        let stranger = user(&db, false);
        let admin = user(&db, true);
        let property_id = listing(&db, &owner, "active");

        let topic = Topic::Thread {
            property_id,
            sender_id: buyer.id.parse().unwrap(),
        };
        assert!(may_subscribe(&db, &buyer, &topic).unwrap());
        assert!(may_subscribe(&db, &owner, &topic).unwrap());
        assert!(may_subscribe(&db, &admin, &topic).unwrap());
        assert!(!may_subscribe(&db, &stranger, &topic).unwrap());
    }

    #[test]
    fn draft_listing_and_admin_feed() {
        let db = Database::open_in_memory().unwrap();
        let owner = user(&db, false);
        let stranger = user(&db, false);
        let draft = Topic::Property {
            property_id: listing(&db, &owner, "draft"),
        };

        assert!(may_subscribe(&db, &owner, &draft).unwrap());
        assert!(!may_subscribe(&db, &stranger, &draft).unwrap());
        assert!(!may_subscribe(&db, &stranger, &Topic::Admin).unwrap());
        assert!(!may_subscribe(&db, &stranger, &Topic::User { user_id: owner.id.parse().unwrap() }).unwrap());
    }

    #[test]
    fn banned_users_get_nothing() {
        let db = Database::open_in_memory().unwrap();
        let mut admin = user(&db, true);
        admin.is_banned = true;
        assert!(!may_subscribe(&db, &admin, &Topic::Admin).unwrap());
    }
}
