use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use futures_util::stream::{SplitSink, SplitStream};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use cradle_core::children::ChildRegistry;
use cradle_core::feed::{FeedAggregator, FeedView};
use cradle_core::logs::LogBook;
use cradle_types::api::Claims;
use cradle_types::events::{GatewayCommand, GatewayEvent};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Time a fresh socket gets to send `Identify`.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a connection needs from the server.
#[derive(Clone)]
pub struct GatewayContext {
    pub logs: LogBook,
    pub children: ChildRegistry,
    pub jwt_secret: String,
}

fn encode(event: &GatewayEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            error!("Failed to serialize gateway event: {}", e);
            None
        }
    }
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &GatewayEvent) -> bool {
    match encode(event) {
        Some(msg) => sender.send(msg).await.is_ok(),
        None => true,
    }
}

/// Handle a single WebSocket connection: Identify handshake, then commands
/// in and feed updates out until either side goes away.
pub async fn handle_connection(socket: WebSocket, ctx: GatewayContext) {
    let (mut sender, mut receiver) = socket.split();

    // Step 1: Wait for Identify command with JWT
    let claims = match wait_for_identify(&mut receiver, &ctx.jwt_secret).await {
        Some(claims) => claims,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} ({}) connected to gateway", claims.email, claims.sub);

    // Step 2: Send Ready event
    let ready = GatewayEvent::Ready {
        user_id: claims.sub,
        email: claims.email.clone(),
    };
    if !send_event(&mut sender, &ready).await {
        return;
    }

    run_connection_loop(sender, receiver, ctx, claims).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    ctx: GatewayContext,
    claims: Claims,
) {
    let aggregator = Arc::new(FeedAggregator::new(ctx.logs.clone()));
    let mut feed_rx = aggregator.watch();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<GatewayEvent>();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward feed changes and command replies -> client, with heartbeat
    let send_aggregator = aggregator.clone();
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                changed = feed_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let view = feed_rx.borrow_and_update().clone();
                    if let Some(event) = feed_update(send_aggregator.child_id(), &view) {
                        if !send_event(&mut sender, &event).await {
                            break;
                        }
                    }
                }
                reply = reply_rx.recv() => {
                    let Some(event) = reply else { break };
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
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_aggregator = aggregator.clone();
    let recv_ctx = ctx.clone();
    let recv_claims = claims.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        if let Some(reply) =
                            handle_command(&recv_ctx, &recv_aggregator, &recv_claims, cmd).await
                        {
                            if reply_tx.send(reply).is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            recv_claims.email,
                            recv_claims.sub,
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

    aggregator.stop();
    info!("{} ({}) disconnected from gateway", claims.email, claims.sub);
}

/// `None` while nothing is being watched.
fn feed_update(child_id: Option<String>, view: &FeedView) -> Option<GatewayEvent> {
    child_id.map(|child_id| GatewayEvent::FeedUpdate {
        child_id,
        items: view.as_ref().clone(),
    })
}

fn decode_identify(text: &str, jwt_secret: &str) -> Option<Claims> {
    let Ok(GatewayCommand::Identify { token }) = serde_json::from_str::<GatewayCommand>(text) else {
        return None;
    };
    decode::<Claims>(
        &token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

async fn wait_for_identify(receiver: &mut SplitStream<WebSocket>, jwt_secret: &str) -> Option<Claims> {
    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                // The first text frame decides: a bad token ends the handshake.
                return decode_identify(&text, jwt_secret);
            }
        }
        None
    };

    tokio::time::timeout(IDENTIFY_TIMEOUT, identify).await.ok().flatten()
}

/// Apply one command. Returns an event to send back when the command is
/// rejected.
async fn handle_command(
    ctx: &GatewayContext,
    aggregator: &FeedAggregator,
    claims: &Claims,
    cmd: GatewayCommand,
) -> Option<GatewayEvent> {
    match cmd {
        GatewayCommand::Identify { .. } => None, // Already handled

        GatewayCommand::WatchFeed { child_id } => {
            let owned = match ctx.children.get(&child_id).await {
                Ok(Some(child)) => child.user_id == claims.sub.to_string(),
                Ok(None) => false,
                Err(e) => {
                    error!(child_id = %child_id, "Child lookup failed: {}", e);
                    return Some(GatewayEvent::Error {
                        message: "could not load child".into(),
                    });
                }
            };
            if !owned {
                return Some(GatewayEvent::Error {
                    message: format!("child {} not found", child_id),
                });
            }

            info!("{} ({}) watching feed of {}", claims.email, claims.sub, child_id);
            match aggregator.start(&child_id).await {
                Ok(()) => None,
                Err(e) => {
                    error!(child_id = %child_id, "Failed to start feed: {}", e);
                    Some(GatewayEvent::Error {
                        message: "could not start feed".into(),
                    })
                }
            }
        }

        GatewayCommand::Unwatch => {
            aggregator.stop();
            None
        }
    }
}
