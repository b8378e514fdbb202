//! Integration tests for the SQLite query layer, run against a throwaway
//! database file per test.

use estate_db::models::{MessageRow, PropertyRow, UserRow};
use estate_db::{Database, ListScope, TransitionOutcome, UpdateOutcome, now_ts};
use estate_query::{PropertyFilter, translate};
use estate_types::models::MessageStatus;
use uuid::Uuid;

fn open() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(&dir.path().join("estate-test.db")).unwrap();
    (dir, db)
}

fn user(db: &Database, email: &str) -> String {
    let id = Uuid::new_v4().to_string();
    let ts = now_ts();
    db.create_user(&UserRow {
        id: id.clone(),
        email: email.into(),
        name: email.split('@').next().unwrap().into(),
        phone: None,
        avatar: None,
        password: "x".into(),
        is_admin: false,
        is_banned: false,
        verified: false,
        created: ts.clone(),
        updated: ts,
    })
    .unwrap();
    id
}

fn listing(db: &Database, owner: &str, title: &str, city: &str, price: i64, status: &str) -> String {
    let id = Uuid::new_v4().to_string();
    let ts = now_ts();
    db.insert_property(&PropertyRow {
        id: id.clone(),
        title: title.into(),
        description: String::new(),
        property_type: "house".into(),
        listing_type: "sale".into(),
        status: status.into(),
        address: String::new(),
        city: city.into(),
        state: "TX".into(),
        country: "US".into(),
        latitude: None,
        longitude: None,
        price,
        bedrooms: 3,
        bathrooms: 2,
        square_feet: 1500,
        owner_id: owner.into(),
        agent_id: None,
        images: vec![],
        created: ts.clone(),
        updated: ts,
    })
    .unwrap();
    id
}

fn message(db: &Database, property_id: &str, sender_id: &str, body: &str) -> String {
    let id = Uuid::new_v4().to_string();
    let ts = now_ts();
    db.insert_message(&MessageRow {
        id: id.clone(),
        property_id: property_id.into(),
        sender_id: sender_id.into(),
        name: "Buyer".into(),
        email: "buyer@example.com".into(),
        phone: None,
        body: body.into(),
        status: "new".into(),
        reply: None,
        replied_by: None,
        replied_at: None,
        created: ts.clone(),
        updated: ts,
    })
    .unwrap();
    id
}

#[test]
fn price_range_bounds_every_result() {
    let (_dir, db) = open();
    let owner = user(&db, "owner@example.com");
    for price in [50_000, 100_000, 250_000, 500_000, 750_000] {
        listing(&db, &owner, "Home", "Austin", price, "active");
    }

    let query = translate(&PropertyFilter::from_query_string(
        "min_price=100000&max_price=500000&sort=price",
    ));
    let (rows, total) = db.list_properties(&query, ListScope::Public { viewer: None }).unwrap();

    assert_eq!(total, 3);
    assert!(rows.iter().all(|r| (100_000..=500_000).contains(&r.price)));
    let prices: Vec<i64> = rows.iter().map(|r| r.price).collect();
    assert_eq!(prices, vec![100_000, 250_000, 500_000]);
}

#[test]
fn free_text_matches_location_and_title() {
    let (_dir, db) = open();
    let owner = user(&db, "owner@example.com");
    listing(&db, &owner, "Lakeside cabin", "Austin", 1, "active");
    listing(&db, &owner, "Downtown loft", "Lakeway", 1, "active");
    listing(&db, &owner, "Ranch", "Dallas", 1, "active");

    let query = translate(&PropertyFilter::from_query_string("q=LAKE"));
    let (_, total) = db.list_properties(&query, ListScope::All).unwrap();
    assert_eq!(total, 2);
}

#[test]
fn drafts_are_hidden_from_other_viewers() {
    let (_dir, db) = open();
    let owner = user(&db, "owner@example.com");
    let other = user(&db, "other@example.com");
    listing(&db, &owner, "Live", "Austin", 1, "active");
    listing(&db, &owner, "Draft", "Austin", 1, "draft");

    let query = translate(&PropertyFilter::default());
    let (_, anon) = db.list_properties(&query, ListScope::Public { viewer: None }).unwrap();
    let (_, stranger) = db
        .list_properties(&query, ListScope::Public { viewer: Some(&other) })
        .unwrap();
    let (_, mine) = db
        .list_properties(&query, ListScope::Public { viewer: Some(&owner) })
        .unwrap();

    assert_eq!((anon, stranger, mine), (1, 1, 2));
}

#[test]
fn pagination_reports_total() {
    let (_dir, db) = open();
    let owner = user(&db, "owner@example.com");
    for i in 0..5 {
        listing(&db, &owner, &format!("Home {}", i), "Austin", i, "active");
    }

    let query = translate(&PropertyFilter::from_query_string("per_page=2&page=3"));
    let (rows, total) = db.list_properties(&query, ListScope::All).unwrap();
    assert_eq!(total, 5);
    assert_eq!(rows.len(), 1);
}

#[test]
fn toggle_favorite_twice_restores_state() {
    let (_dir, db) = open();
    let owner = user(&db, "owner@example.com");
    let buyer = user(&db, "buyer@example.com");
    let home = listing(&db, &owner, "Home", "Austin", 1, "active");

    assert!(db.toggle_favorite(&Uuid::new_v4().to_string(), &buyer, &home).unwrap());
    assert!(db.is_favorited(&buyer, &home).unwrap());
    assert_eq!(db.count_favorites(&buyer).unwrap(), 1);

    assert!(!db.toggle_favorite(&Uuid::new_v4().to_string(), &buyer, &home).unwrap());
    assert!(!db.is_favorited(&buyer, &home).unwrap());
    assert!(db.favorite_property_ids(&buyer).unwrap().is_empty());
}

#[test]
fn favorites_hide_listings_moved_back_to_draft() {
    let (_dir, db) = open();
    let owner = user(&db, "owner@example.com");
    let buyer = user(&db, "buyer@example.com");
    let home = listing(&db, &owner, "Home", "Austin", 1, "active");
    db.toggle_favorite(&Uuid::new_v4().to_string(), &buyer, &home).unwrap();
    db.toggle_favorite(&Uuid::new_v4().to_string(), &owner, &home).unwrap();

    let mut draft = db.get_property(&home).unwrap().unwrap();
    let token = draft.updated.clone();
    draft.status = "draft".into();
    assert!(matches!(
        db.update_property(&draft, Some(&token)).unwrap(),
        UpdateOutcome::Updated(_)
    ));

    let (rows, total) = db.list_favorites(&buyer, estate_query::PageSpec::default()).unwrap();
    assert_eq!(total, 0);
    assert!(rows.is_empty());
    assert!(db.favorite_property_ids(&buyer).unwrap().is_empty());
    assert_eq!(db.count_favorites(&buyer).unwrap(), 0);

    // The owner still sees their own draft
    let (rows, total) = db.list_favorites(&owner, estate_query::PageSpec::default()).unwrap();
    assert_eq!(total, 1);
    assert_eq!(rows[0].status, "draft");
}

#[test]
fn stale_concurrency_token_is_rejected() {
    let (_dir, db) = open();
    let owner = user(&db, "owner@example.com");
    let id = listing(&db, &owner, "Home", "Austin", 1, "active");

    let original = db.get_property(&id).unwrap().unwrap();
    let mut edit = original.clone();
    edit.price = 2;
    let first = match db.update_property(&edit, Some(&original.updated)).unwrap() {
        UpdateOutcome::Updated(row) => row,
        other => panic!("expected update, got {:?}", other),
    };
    assert_eq!(first.price, 2);
    assert_ne!(first.updated, original.updated);

    edit.price = 3;
    match db.update_property(&edit, Some(&original.updated)).unwrap() {
        UpdateOutcome::Conflict { current_updated } => assert_eq!(current_updated, first.updated),
        other => panic!("expected conflict, got {:?}", other),
    }
    assert_eq!(db.get_property(&id).unwrap().unwrap().price, 2);
}

#[test]
fn thread_is_ordered_oldest_first() {
    let (_dir, db) = open();
    let owner = user(&db, "owner@example.com");
    let buyer = user(&db, "buyer@example.com");
    let other = user(&db, "other@example.com");
    let home = listing(&db, &owner, "Home", "Austin", 1, "active");

    let ids: Vec<String> = (0..5)
        .map(|i| message(&db, &home, &buyer, &format!("message {}", i)))
        .collect();
    message(&db, &home, &other, "someone else");

    let thread = db.get_thread(&home, &buyer).unwrap();
    let thread_ids: Vec<String> = thread.iter().map(|m| m.id.clone()).collect();
    assert_eq!(thread_ids, ids);

    let newest = message(&db, &home, &buyer, "latest");
    let thread = db.get_thread(&home, &buyer).unwrap();
    assert_eq!(thread.last().unwrap().id, newest);
}

#[test]
fn message_guard_refuses_without_writing() {
    let (_dir, db) = open();
    let owner = user(&db, "owner@example.com");
    let buyer = user(&db, "buyer@example.com");
    let home = listing(&db, &owner, "Home", "Austin", 1, "active");
    let id = message(&db, &home, &buyer, "hello");

    let closed = db
        .update_message(&id, |m| {
            m.status = MessageStatus::Closed.as_str().into();
            true
        })
        .unwrap();
    assert!(matches!(closed, TransitionOutcome::Updated(ref m) if m.status == "closed"));

    let reopened = db
        .update_message(&id, |m| {
            let current: MessageStatus = m.status.parse().unwrap();
            if !current.can_transition_to(MessageStatus::New) {
                return false;
            }
            m.status = "new".into();
            true
        })
        .unwrap();
    assert!(matches!(reopened, TransitionOutcome::Rejected(ref m) if m.status == "closed"));
    assert_eq!(db.get_message(&id).unwrap().unwrap().status, "closed");

    assert!(matches!(
        db.update_message("missing", |_| true).unwrap(),
        TransitionOutcome::NotFound
    ));
}

#[test]
fn inbox_and_unread_counts_follow_ownership() {
    let (_dir, db) = open();
    let owner = user(&db, "owner@example.com");
    let buyer = user(&db, "buyer@example.com");
    let home = listing(&db, &owner, "Home", "Austin", 1, "active");
    let first = message(&db, &home, &buyer, "one");
    message(&db, &home, &buyer, "two");

    db.update_message(&first, |m| {
        m.status = "read".into();
        true
    })
    .unwrap();

    assert_eq!(db.count_unread_messages(&owner).unwrap(), 1);
    assert_eq!(db.count_unread_messages(&buyer).unwrap(), 0);

    let page = estate_query::PageSpec::default();
    let (rows, total) = db.list_inbox(Some(&owner), None, page).unwrap();
    assert_eq!(total, 2);
    assert_eq!(rows[0].body, "two");

    let (_, unread) = db.list_inbox(None, Some("new"), page).unwrap();
    assert_eq!(unread, 1);
}

#[test]
fn ban_flag_and_user_deletion_cascade() {
    let (_dir, db) = open();
    let owner = user(&db, "owner@example.com");
    let buyer = user(&db, "buyer@example.com");
    let home = listing(&db, &owner, "Home", "Austin", 1, "active");
    db.add_property_image("img-1", &home, 10).unwrap();
    db.add_property_image("img-2", &home, 20).unwrap();
    db.toggle_favorite(&Uuid::new_v4().to_string(), &buyer, &home).unwrap();

    let banned = db.update_user_flags(&buyer, Some(true), None, None).unwrap().unwrap();
    assert!(banned.is_banned);
    assert!(!banned.is_admin);
    assert_eq!(db.count_users().unwrap(), (2, 1));

    assert_eq!(db.get_property(&home).unwrap().unwrap().images, vec!["img-1", "img-2"]);

    let images = db.delete_user(&owner).unwrap().unwrap();
    assert_eq!(images.len(), 2);
    assert!(db.get_property(&home).unwrap().is_none());
    assert!(db.get_image("img-1").unwrap().is_none());
    assert_eq!(db.count_favorites(&buyer).unwrap(), 0);
    assert!(db.delete_user(&owner).unwrap().is_none());
}

#[test]
fn user_search_matches_email_or_name() {
    let (_dir, db) = open();
    user(&db, "alice@example.com");
    user(&db, "bob@example.com");

    let (rows, total) = db
        .list_users(Some("alice"), estate_query::PageSpec::default())
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(rows[0].email, "alice@example.com");
    assert!(db.get_user_by_email("ALICE@example.com").unwrap().is_some());
}

#[test]
fn user_search_treats_wildcards_literally() {
    let (_dir, db) = open();
    user(&db, "a_b@example.com");
    user(&db, "axb@example.com");
    user(&db, "full@example.com");

    let (rows, total) = db
        .list_users(Some("a_b"), estate_query::PageSpec::default())
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(rows[0].email, "a_b@example.com");

    let (_, total) = db.list_users(Some("%"), estate_query::PageSpec::default()).unwrap();
    assert_eq!(total, 0);
}

#[test]
fn duplicate_email_is_not_inserted() {
    let (_dir, db) = open();
    let first = user(&db, "dup@example.com");

    let ts = now_ts();
    let again = UserRow {
        id: Uuid::new_v4().to_string(),
        email: "DUP@example.com".into(),
        name: "Dup".into(),
        phone: None,
        avatar: None,
        password: "y".into(),
        is_admin: true,
        is_banned: false,
        verified: false,
        created: ts.clone(),
        updated: ts,
    };
    assert!(!db.create_user(&again).unwrap());
    assert!(db.get_user_by_id(&again.id).unwrap().is_none());
    assert_eq!(db.get_user_by_email("dup@example.com").unwrap().unwrap().id, first);
    assert!(db.is_active_user(&first).unwrap());
    assert!(!db.is_active_user(&again.id).unwrap());
}
