//! Session lifecycle for one WebSocket connection.
//!
//! A session starts unauthenticated and must present a handshake as its first
//! frame. Once authenticated it runs two workers: the inbound worker decodes
//! frames and hands them to the router, the outbound worker drains the
//! session's mailbox onto the socket and sends keepalive pings. Closing the
//! mailbox is the only way to stop the outbound worker.

use std::{net::SocketAddr, sync::Arc};

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::time::{Instant, interval_at, timeout, timeout_at};

use crate::{
    config::SessionConfig,
    domain::{RateLimitKey, UserId},
    infrastructure::{
        dto::websocket::{ClientEnvelope, HandshakeAck, ProtocolError, ServerEnvelope},
        registry::{Frame, Mailbox, MailboxReceiver, Offer},
    },
    ui::state::AppState,
    usecase::HandshakeError,
};

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// Why the handshake phase ended without an identity
enum Unauthenticated {
    /// Reply with an error envelope, then close
    Rejected(HandshakeError),
    /// Peer went away or timed out; nothing to send
    Gone,
}

/// Drive one accepted connection until it closes.
pub async fn run(socket: WebSocket, state: Arc<AppState>, peer: SocketAddr) {
    let config = state.session;
    let (mut sink, mut stream) = socket.split();
    let key = RateLimitKey::from_addr(peer.ip());

    // Connected -> Authenticated
    let handshake = timeout(config.pong_wait, handshake(&mut stream, &state, &key)).await;
    let user = match handshake {
        Ok(Ok(user)) => user,
        Ok(Err(Unauthenticated::Rejected(e))) => {
            tracing::info!(peer = %peer, "Handshake rejected: {}", e);
            reject(&mut sink, e.client_message(), config).await;
            return;
        }
        Ok(Err(Unauthenticated::Gone)) => {
            tracing::debug!(peer = %peer, "Connection closed before handshake");
            return;
        }
        Err(_) => {
            tracing::info!(peer = %peer, "Handshake timed out");
            reject(&mut sink, "handshake timeout", config).await;
            return;
        }
    };

    let (mailbox, receiver) = Mailbox::channel(config.mailbox_capacity);
    let ack = match ServerEnvelope::Handshake(HandshakeAck { user_id: user }).encode() {
        Ok(ack) => ack,
        Err(e) => {
            tracing::error!(user_id = %user, "Failed to encode handshake ack: {}", e);
            return;
        }
    };
    // the ack must be the first frame the client sees
    let offer = mailbox.offer(Arc::from(ack));
    if offer != Offer::Accepted {
        tracing::error!(user_id = %user, ?offer, "Failed to queue handshake ack");
        return;
    }

    // the writer must be draining before backlog delivery starts
    let shutdown = state.shutdown.clone();
    let mut send_task = tokio::spawn(write_pump(sink, receiver, config, shutdown));
    let connected = state.connect.execute(user, mailbox.clone()).await;
    if connected.evicted_previous {
        tracing::info!(user_id = %user, "Replaced previous session");
    }
    let mut recv_task = tokio::spawn(read_pump(stream, state.clone(), user, mailbox.clone()));

    // If either worker finishes, stop the other
    tokio::select! {
        _ = &mut recv_task => {
            // let the writer flush what is queued and send a close frame
            mailbox.close();
            if timeout(config.write_wait, &mut send_task).await.is_err() {
                send_task.abort();
            }
        }
        _ = &mut send_task => recv_task.abort(),
    };

    state.disconnect.execute(user, &mailbox).await;
}

/// Wait for the first text frame and authenticate it.
async fn handshake(
    stream: &mut WsStream,
    state: &AppState,
    key: &RateLimitKey,
) -> Result<UserId, Unauthenticated> {
    loop {
        let message = match stream.next().await {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                tracing::debug!("WebSocket error before handshake: {}", e);
                return Err(Unauthenticated::Gone);
            }
            None => return Err(Unauthenticated::Gone),
        };

        let token = match message {
            Message::Text(text) => {
                ClientEnvelope::decode(text.as_str()).and_then(ClientEnvelope::into_handshake_token)
            }
            Message::Binary(_) => Err(ProtocolError::BinaryFrame),
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => return Err(Unauthenticated::Gone),
        };

        let result = match token {
            Ok(token) => state.authenticate.execute(key, &token).await,
            Err(e) => {
                tracing::debug!("Invalid handshake frame: {}", e);
                Err(state.authenticate.reject_malformed(key))
            }
        };

        return result.map_err(Unauthenticated::Rejected);
    }
}

/// Send an error envelope followed by a policy-violation close.
async fn reject(sink: &mut WsSink, message: &str, config: SessionConfig) {
    let close = async {
        if let Ok(text) = ServerEnvelope::error(message).encode() {
            sink.send(Message::Text(text.into())).await?;
        }
        sink.send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: "authentication failed".into(),
        })))
        .await
    };
    if let Ok(Err(e)) = timeout(config.write_wait, close).await {
        tracing::debug!("Failed to send rejection: {}", e);
    }
}

/// Inbound worker: decode frames and route them until the peer goes away.
async fn read_pump(mut stream: WsStream, state: Arc<AppState>, user: UserId, mailbox: Mailbox) {
    let pong_wait = state.session.pong_wait;
    let mut deadline = Instant::now() + pong_wait;

    loop {
        let message = match timeout_at(deadline, stream.next()).await {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(e))) => {
                // also covers frames above the size limit
                tracing::debug!(user_id = %user, "WebSocket read error: {}", e);
                break;
            }
            Ok(None) => break,
            Err(_) => {
                tracing::info!(user_id = %user, "Read deadline exceeded, closing session");
                break;
            }
        };

        match message {
            Message::Text(text) => handle_text(&state, user, &mailbox, text.as_str()).await,
            Message::Binary(_) => reply_error(&mailbox, &ProtocolError::BinaryFrame.to_string()),
            Message::Pong(_) => deadline = Instant::now() + pong_wait,
            // pings are answered by the protocol layer
            Message::Ping(_) => {}
            Message::Close(_) => {
                tracing::debug!(user_id = %user, "Client requested close");
                break;
            }
        }
    }
}

async fn handle_text(state: &AppState, user: UserId, mailbox: &Mailbox, text: &str) {
    let event = match ClientEnvelope::decode(text).and_then(ClientEnvelope::into_event) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(user_id = %user, "Rejected frame: {}", e);
            reply_error(mailbox, &e.to_string());
            return;
        }
    };

    let kind = event.kind();
    match state.route.execute(user, event).await {
        Ok(report) => {
            tracing::debug!(user_id = %user, kind, delivered = report.delivered, "Routed event");
        }
        Err(e) => {
            tracing::warn!(user_id = %user, kind, "Failed to route event: {}", e);
            reply_error(mailbox, &e.client_message());
        }
    }
}

/// Queue an error envelope on the session's own mailbox.
fn reply_error(mailbox: &Mailbox, message: &str) {
    let frame: Frame = match ServerEnvelope::error(message).encode() {
        Ok(text) => Arc::from(text),
        Err(e) => {
            tracing::error!("Failed to encode error reply: {}", e);
            return;
        }
    };
    if mailbox.offer(frame) == Offer::Full {
        // the outbound worker sees the close; cleanup unregisters the session
        mailbox.close();
    }
}

/// Outbound worker: write queued frames and keepalive pings.
async fn write_pump(
    mut sink: WsSink,
    mut receiver: MailboxReceiver,
    config: SessionConfig,
    shutdown: tokio_util::sync::CancellationToken,
) {
    let mut ping = interval_at(Instant::now() + config.ping_period, config.ping_period);
    let closed = receiver.closed();
    tokio::pin!(closed);

    let code = loop {
        tokio::select! {
            frame = receiver.recv() => {
                let Some(frame) = frame else {
                    break close_code::NORMAL;
                };
                match timeout(config.write_wait, write_batch(&mut sink, &mut receiver, frame)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::debug!("WebSocket write failed: {}", e);
                        return;
                    }
                    Err(_) => {
                        tracing::warn!("Write deadline exceeded, dropping session");
                        return;
                    }
                }
            }
            _ = ping.tick() => {
                match timeout(config.write_wait, sink.send(Message::Ping(Default::default()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::debug!("Ping failed: {}", e);
                        return;
                    }
                    Err(_) => {
                        tracing::warn!("Ping deadline exceeded, dropping session");
                        return;
                    }
                }
            }
            _ = &mut closed => break close_code::NORMAL,
            _ = shutdown.cancelled() => break close_code::AWAY,
        }
    };

    // mailbox closed: flush what is still queued, then say goodbye
    let goodbye = async {
        while let Some(frame) = receiver.try_recv() {
            sink.feed(Message::Text(frame.as_ref().into())).await?;
        }
        sink.send(Message::Close(Some(CloseFrame {
            code,
            reason: "session closed".into(),
        })))
        .await
    };
    if let Ok(Err(e)) = timeout(config.write_wait, goodbye).await {
        tracing::debug!("Failed to close WebSocket cleanly: {}", e);
    }
}

/// Write `first` plus everything already queued, then flush once.
async fn write_batch(
    sink: &mut WsSink,
    receiver: &mut MailboxReceiver,
    first: Frame,
) -> Result<(), axum::Error> {
    sink.feed(Message::Text(first.as_ref().into())).await?;
    while let Some(frame) = receiver.try_recv() {
        sink.feed(Message::Text(frame.as_ref().into())).await?;
    }
    sink.flush().await
}
