use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use uuid::Uuid;

use alcove_types::api::Claims;
use alcove_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;

/// Server pings on this cadence; two consecutive missed pongs drop the
/// connection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a fresh connection gets to present a valid Identify.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Drive a single WebSocket connection: Identify handshake, ready frame,
/// then the filtered event loop until either side goes away.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, jwt_secret: String) {
    let (mut sender, mut receiver) = socket.split();

    let Some((user_id, username)) = wait_for_identify(&mut receiver, &jwt_secret).await else {
        warn!("WebSocket client failed to identify, closing");
        return;
    };

    info!("{} ({}) connected to gateway", username, user_id);

    let ready = GatewayEvent::Ready {
        user_id,
        username: username.clone(),
    };
    let Ok(ready_json) = serde_json::to_string(&ready.to_frame()) else {
        return;
    };
    if sender.send(Message::Text(ready_json.into())).await.is_err() {
        return;
    }

    // Chat subscriptions, shared between the two tasks. The recv task
    // replaces the set on Subscribe; the send task filters against it.
    let subscriptions: Arc<RwLock<HashSet<Uuid>>> = Arc::new(RwLock::new(HashSet::new()));
    let send_subscriptions = subscriptions.clone();

    let pong_seen = Arc::new(AtomicBool::new(true));
    let pong_seen_send = pong_seen.clone();
    let pong_seen_recv = pong_seen.clone();

    let mut broadcast_rx = dispatcher.subscribe();
    let recv_dispatcher = dispatcher.clone();

    // Forward filtered broadcasts to the client and run the heartbeat.
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} events", n);
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };

                    if let Some(chat_id) = event.chat_id() {
                        let subscribed = send_subscriptions
                            .read()
                            .map(|subs| subs.contains(&chat_id))
                            .unwrap_or(false);
                        if !subscribed {
                            continue;
                        }
                    }

                    let Ok(text) = serde_json::to_string(&event.to_frame()) else {
                        continue;
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_seen_send.swap(false, Ordering::AcqRel) {
                        missed = 0;
                    } else {
                        missed += 1;
                        if missed >= 2 {
                            warn!("Heartbeat timeout after {} missed pongs, dropping connection", missed);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from the client.
    let recv_username = username.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&recv_dispatcher, user_id, &recv_username, cmd, &subscriptions);
                    }
                    Err(e) => {
                        warn!("{} ({}) sent a bad command: {}", recv_username, user_id, e);
                    }
                },
                Message::Pong(_) => {
                    pong_seen_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("{} ({}) disconnected from gateway", username, user_id);
}

fn handle_command(
    dispatcher: &Dispatcher,
    user_id: Uuid,
    username: &str,
    cmd: GatewayCommand,
    subscriptions: &RwLock<HashSet<Uuid>>,
) {
    match cmd {
        // Already authenticated during the handshake.
        GatewayCommand::Identify { .. } => {}

        GatewayCommand::Subscribe { chat_ids } => {
            info!("{} ({}) subscribed to {} chats", username, user_id, chat_ids.len());
            if let Ok(mut subs) = subscriptions.write() {
                *subs = chat_ids.into_iter().collect();
            }
        }

        GatewayCommand::StartTyping { chat_id } => {
            dispatcher.broadcast(GatewayEvent::TypingStart {
                chat_id,
                display_name: username.to_string(),
                author_id: user_id,
            });
        }
    }
}

/// First phase of every connection: wait for an Identify command carrying
/// a valid JWT. Anything else is ignored until the timeout fires.
async fn wait_for_identify(
    receiver: &mut SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<(Uuid, String)> {
    let identified = tokio::time::timeout(IDENTIFY_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some((token_data.claims.sub, token_data.claims.username));
                }
            }
        }
        None
    });

    identified.await.ok().flatten()
}
