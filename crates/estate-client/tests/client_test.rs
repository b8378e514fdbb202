//! Client against a live server on a random local port.

use std::net::SocketAddr;
use std::time::Duration;

use estate_api::{ApiConfig, AppStateInner, router};
use estate_client::{ClientConfig, ClientError, EstateClient, FavoritesStore, RealtimeStream};
use estate_db::Database;
use estate_query::FilterState;
use estate_types::api::{
    AdminUpdateUserRequest, CreatePropertyRequest, RegisterRequest, SendMessageRequest,
    UpdatePropertyRequest,
};
use estate_types::events::{RealtimeEvent, Topic};
use estate_types::models::{ListingType, Property, PropertyStatus, PropertyType};

struct Server {
    _dir: tempfile::TempDir,
    addr: SocketAddr,
}

async fn start_server() -> Server {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(&dir.path().join("client-test.db")).unwrap();
    let state = AppStateInner::new(
        db,
        ApiConfig {
            jwt_secret: "client-test-secret".into(),
            token_ttl_days: 1,
            upload_dir: dir.path().join("uploads"),
            public_file_url: "/files".into(),
            admin_email: Some("admin@client.test".into()),
        },
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    Server { _dir: dir, addr }
}

async fn signed_in(server: &Server, email: &str) -> EstateClient {
    let mut config = ClientConfig::new(format!("http://{}", server.addr));
    config.stale_time = Duration::from_secs(60);
    let client = EstateClient::new(config).unwrap();
    client
        .register(&RegisterRequest {
            email: email.into(),
            name: "Client Test".into(),
            password: "correct-horse-battery".into(),
        })
        .await
        .unwrap();
    client
}

async fn listing(client: &EstateClient, title: &str, price: i64) -> Property {
    client
        .create_property(&CreatePropertyRequest {
            title: title.into(),
            description: "Close to the park".into(),
            property_type: PropertyType::Apartment,
            listing_type: ListingType::Rent,
            status: Some(PropertyStatus::Active),
            address: "12 Elm St".into(),
            city: "Denver".into(),
            state: "CO".into(),
            country: "US".into(),
            latitude: None,
            longitude: None,
            price,
            bedrooms: 2,
            bathrooms: 1,
            square_feet: 900,
            agent_id: None,
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn search_results_are_cached_until_a_mutation() {
    let server = start_server().await;
    let owner = signed_in(&server, "owner@client.test").await;
    listing(&owner, "Studio", 1_200).await;

    let mut filters = FilterState::default();
    filters.set("city", Some("Denver")).unwrap();

    let first = owner.list_properties(filters.filter()).await.unwrap();
    assert_eq!(first.total_items, 1);
    let second = owner.list_properties(filters.filter()).await.unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));

    listing(&owner, "Two bed", 1_900).await;
    let third = owner.list_properties(filters.filter()).await.unwrap();
    assert_eq!(third.total_items, 2);
}

#[tokio::test]
async fn stale_edit_surfaces_as_conflict() {
    let server = start_server().await;
    let owner = signed_in(&server, "owner@client.test").await;
    let property = listing(&owner, "Studio", 1_200).await;

    let edit = UpdatePropertyRequest {
        expected_updated: Some(property.updated),
        price: Some(1_150),
        ..Default::default()
    };
    owner.update_property(property.id, &edit).await.unwrap();

    let err = owner.update_property(property.id, &edit).await.unwrap_err();
    assert!(err.is_conflict(), "{}", err);
}

#[tokio::test]
async fn favorites_store_round_trips_through_server() {
    let server = start_server().await;
    let owner = signed_in(&server, "owner@client.test").await;
    let buyer = signed_in(&server, "buyer@client.test").await;
    let property = listing(&owner, "Loft", 2_000).await;

    let store = FavoritesStore::new(buyer.clone(), buyer.cache().clone());
    assert!(store.toggle(property.id).await.unwrap());
    assert!(!store.toggle(property.id).await.unwrap());
    assert!(!store.is_favorited(property.id));

    let page = buyer.favorites(1).await.unwrap();
    assert_eq!(page.total_items, 0);
}

#[tokio::test]
async fn thread_subscription_receives_new_messages() {
    let server = start_server().await;
    let owner = signed_in(&server, "owner@client.test").await;
    let buyer = signed_in(&server, "buyer@client.test").await;
    let property = listing(&owner, "Cottage", 1_500).await;
    let buyer_id = buyer.me().await.unwrap().id;

    let mut stream = owner.subscribe_thread(property.id, buyer_id).await.unwrap();
    match stream.next_event().await.unwrap() {
        Some(RealtimeEvent::Subscribed { topics }) => assert_eq!(topics.len(), 1),
        other => panic!("expected Subscribed, got {:?}", other),
    }

    buyer
        .send_message(
            property.id,
            &SendMessageRequest {
                name: None,
                email: None,
                phone: None,
                body: "Is parking included?".into(),
            },
        )
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), stream.next_event())
        .await
        .unwrap()
        .unwrap();
    match event {
        Some(RealtimeEvent::MessageCreate { message }) => {
            assert_eq!(message.body, "Is parking included?");
            assert_eq!(message.sender_id, buyer_id);
        }
        other => panic!("expected MessageCreate, got {:?}", other),
    }

    let thread = owner.thread(property.id, Some(buyer_id)).await.unwrap();
    assert_eq!(thread.len(), 1);
    stream.close().await.unwrap();
}

#[tokio::test]
async fn signed_out_client_cannot_write() {
    let server = start_server().await;
    let client = EstateClient::new(ClientConfig::new(format!("http://{}", server.addr))).unwrap();
    let err = client.dashboard().await.unwrap_err();
    assert!(matches!(err, ClientError::NotSignedIn));
}

async fn next_event(stream: &mut RealtimeStream) -> Option<RealtimeEvent> {
    tokio::time::timeout(Duration::from_secs(5), stream.next_event())
        .await
        .unwrap()
        .unwrap()
}

async fn connect(client: &EstateClient) -> RealtimeStream {
    RealtimeStream::connect(&client.config().realtime_url(), &client.token().unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn listing_turned_draft_is_not_pushed_to_followers() {
    let server = start_server().await;
    let owner = signed_in(&server, "owner@client.test").await;
    let buyer = signed_in(&server, "buyer@client.test").await;
    let property = listing(&owner, "Bungalow", 1_800).await;
    let topic = Topic::Property {
        property_id: property.id,
    };

    let mut follower = connect(&buyer).await;
    follower.subscribe(vec![topic]).await.unwrap();
    assert!(matches!(next_event(&mut follower).await, Some(RealtimeEvent::Subscribed { .. })));

    let mut watcher = connect(&owner).await;
    watcher.subscribe(vec![topic]).await.unwrap();
    assert!(matches!(next_event(&mut watcher).await, Some(RealtimeEvent::Subscribed { .. })));

    owner
        .update_property(
            property.id,
            &UpdatePropertyRequest {
                expected_updated: Some(property.updated),
                status: Some(PropertyStatus::Draft),
                description: Some("private draft notes".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // The owner still sees the edit
    match next_event(&mut watcher).await {
        Some(RealtimeEvent::PropertyUpdate { property }) => {
            assert_eq!(property.status, PropertyStatus::Draft)
        }
        other => panic!("expected PropertyUpdate, got {:?}", other),
    }

    // The buyer only learns the subscription is gone
    match next_event(&mut follower).await {
        Some(RealtimeEvent::SubscribeDenied { topic: denied, .. }) => assert_eq!(denied, topic),
        other => panic!("expected SubscribeDenied, got {:?}", other),
    }
}

#[tokio::test]
async fn demoted_and_banned_admins_lose_the_admin_feed() {
    let server = start_server().await;
    let admin = signed_in(&server, "admin@client.test").await;
    let moderator = signed_in(&server, "mod@client.test").await;
    let moderator_id = moderator.me().await.unwrap().id;

    admin
        .admin_update_user(
            moderator_id,
            &AdminUpdateUserRequest {
                is_admin: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let mut feed = connect(&moderator).await;
    feed.subscribe(vec![Topic::Admin]).await.unwrap();
    match next_event(&mut feed).await {
        Some(RealtimeEvent::Subscribed { topics }) => assert_eq!(topics, vec![Topic::Admin]),
        other => panic!("expected Subscribed, got {:?}", other),
    }

    admin
        .admin_update_user(
            moderator_id,
            &AdminUpdateUserRequest {
                is_admin: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    match next_event(&mut feed).await {
        Some(RealtimeEvent::SubscribeDenied { topic, .. }) => assert_eq!(topic, Topic::Admin),
        other => panic!("expected SubscribeDenied, got {:?}", other),
    }

    admin
        .admin_update_user(
            moderator_id,
            &AdminUpdateUserRequest {
                is_banned: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let closed = tokio::time::timeout(Duration::from_secs(5), feed.next_event())
        .await
        .unwrap();
    assert!(matches!(closed, Ok(None) | Err(_)), "{:?}", closed);
}
