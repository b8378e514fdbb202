use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use estate_db::Database;
use estate_db::models::UserRow;
use estate_types::api::Claims;
use estate_types::events::{RealtimeCommand, RealtimeEvent, Topic};

use crate::access::may_subscribe;
use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Time a new socket has to send `Identify`.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

type Subscriptions = Arc<RwLock<HashSet<Topic>>>;

/// Handle one realtime WebSocket from `Identify` to disconnect.
///
/// Subscriptions live only as long as the connection. Dropping the socket
/// drops the topic set and unregisters from the dispatcher.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    jwt_secret: String,
) {
    let (mut sender, mut receiver) = socket.split();

    let Some(claims) = wait_for_identify(&mut receiver, &jwt_secret).await else {
        warn!("Realtime client failed to identify, closing");
        let _ = sender.send(Message::Close(None)).await;
        return;
    };
    let user_id = claims.sub;

    let is_admin = match load_user(&db, user_id).await {
        Some(user) if !user.is_banned => user.is_admin,
        _ => {
            warn!("Realtime identify rejected for {} (missing or banned)", user_id);
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    if !send_event(&mut sender, &RealtimeEvent::Ready { user_id }).await {
        return;
    }

    let conn_id = dispatcher.register(user_id).await;
    info!(
        "{} connected to realtime ({}, {} open)",
        user_id,
        conn_id,
        dispatcher.connection_count().await
    );

    run_connection_loop(sender, receiver, dispatcher.clone(), db, user_id, is_admin).await;

    dispatcher.unregister(conn_id).await;
    info!(
        "{} disconnected from realtime ({}, {} open)",
        user_id,
        conn_id,
        dispatcher.connection_count().await
    );
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    user_id: Uuid,
    mut is_admin: bool,
) {
    let mut broadcast_rx = dispatcher.subscribe();
    let (direct_tx, mut direct_rx) = mpsc::unbounded_channel::<RealtimeEvent>();

    let subscriptions: Subscriptions = Arc::new(RwLock::new(HashSet::new()));
    let send_subscriptions = subscriptions.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward matching broadcasts + direct replies -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let envelope = match result {
                        Ok(envelope) => envelope,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Realtime receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if let Some(change) = envelope.account.filter(|c| c.user_id == user_id) {
                        if change.revoked {
                            info!("{} lost access, closing realtime connection", user_id);
                            let _ = sender.send(Message::Close(None)).await;
                            break;
                        }
                        if is_admin && !change.is_admin {
                            send_subscriptions
                                .write()
                                .unwrap_or_else(|e| e.into_inner())
                                .remove(&Topic::Admin);
                            let denied = RealtimeEvent::SubscribeDenied {
                                topic: Topic::Admin,
                                reason: "admin rights revoked".into(),
                            };
                            if !send_event(&mut sender, &denied).await {
                                break;
                            }
                        }
                        is_admin = change.is_admin;
                    }

                    let wanted = {
                        let subs = send_subscriptions.read().unwrap_or_else(|e| e.into_inner());
                        envelope.matches(&subs)
                    };
                    if !wanted {
                        continue;
                    }

                    if !envelope.visible_to(user_id, is_admin) {
                        // The listing went private; stop following it
                        let revoked: Vec<Topic> = {
                            let mut subs = send_subscriptions.write().unwrap_or_else(|e| e.into_inner());
                            envelope.topics.iter().copied().filter(|t| subs.remove(t)).collect()
                        };
                        debug!("{} lost access to {:?}", user_id, revoked);
                        for topic in revoked {
                            let denied = RealtimeEvent::SubscribeDenied {
                                topic,
                                reason: "no longer visible".into(),
                            };
                            if !send_event(&mut sender, &denied).await {
                                return;
                            }
                        }
                        continue;
                    }

                    if sender.send(Message::Text(envelope.json.to_string().into())).await.is_err() {
                        break;
                    }
                }
                event = direct_rx.recv() => {
                    let Some(event) = event else { break };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<RealtimeCommand>(&text) {
                    Ok(cmd) => handle_command(&db, user_id, cmd, &subscriptions, &direct_tx).await,
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

async fn handle_command(
    db: &Arc<Database>,
    user_id: Uuid,
    cmd: RealtimeCommand,
    subscriptions: &Subscriptions,
    direct_tx: &mpsc::UnboundedSender<RealtimeEvent>,
) {
    match cmd {
        RealtimeCommand::Identify { .. } => {} // Already handled

        RealtimeCommand::Subscribe { topics } => {
            let db = db.clone();
            let requested = topics.clone();
            let checked = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<(Topic, bool)>> {
                let user = db
                    .get_user_by_id(&user_id.to_string())?
                    .ok_or_else(|| anyhow::anyhow!("user {} no longer exists", user_id))?;
                requested
                    .into_iter()
                    .map(|topic| -> anyhow::Result<(Topic, bool)> {
                        Ok((topic, may_subscribe(&db, &user, &topic)?))
                    })
                    .collect()
            })
            .await;

            let checked = match checked {
                Ok(Ok(checked)) => checked,
                Ok(Err(e)) => {
                    warn!("{} subscribe check failed: {}", user_id, e);
                    topics.into_iter().map(|t| (t, false)).collect()
                }
                Err(e) => {
                    error!("spawn_blocking join error: {}", e);
                    return;
                }
            };

            let mut accepted = Vec::new();
            for (topic, allowed) in checked {
                if allowed {
                    accepted.push(topic);
                } else {
                    let _ = direct_tx.send(RealtimeEvent::SubscribeDenied {
                        topic,
                        reason: "not permitted".into(),
                    });
                }
            }

            debug!("{} subscribed to {:?}", user_id, accepted);
            subscriptions
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .extend(accepted.iter().copied());
            let _ = direct_tx.send(RealtimeEvent::Subscribed { topics: accepted });
        }

        RealtimeCommand::Unsubscribe { topics } => {
            let mut subs = subscriptions.write().unwrap_or_else(|e| e.into_inner());
            for topic in &topics {
                subs.remove(topic);
            }
            debug!("{} unsubscribed from {:?}", user_id, topics);
        }
    }
}

async fn wait_for_identify(
    receiver: &mut SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<Claims> {
    let timeout = tokio::time::timeout(IDENTIFY_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(RealtimeCommand::Identify { token }) =
                    serde_json::from_str::<RealtimeCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some(token_data.claims);
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

async fn load_user(db: &Arc<Database>, user_id: Uuid) -> Option<UserRow> {
    let db = db.clone();
    match tokio::task::spawn_blocking(move || db.get_user_by_id(&user_id.to_string())).await {
        Ok(Ok(user)) => user,
        Ok(Err(e)) => {
            error!("DB get_user_by_id error: {}", e);
            None
        }
        Err(e) => {
            error!("spawn_blocking join error: {}", e);
            None
        }
    }
}

/// Serialize and send one event. Returns false if the socket is gone.
async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &RealtimeEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to serialize realtime event: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}
