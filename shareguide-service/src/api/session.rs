//! The guided-session WebSocket endpoint.
//!
//! Clients connect to `/ws/{token}`. The handler loads and hydrates the
//! session bound to the token, then runs the connection loop: every inbound
//! message is rate-limited, decoded, handed to the engine, and the mutated
//! state is written back to the session store before the next message is
//! dispatched. Messages for one token are handled strictly sequentially;
//! sessions for different tokens run in parallel.
//!
//! Every connection lives at most `max_connection_lifetime`; on expiry the
//! server sends a timeout close frame and deconstructs the session. The
//! session-store entry is left in place on close (the store has its own
//! TTL); only the rate-limit window is dropped eagerly.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::ws::{self, CloseFrame, WebSocket, WebSocketUpgrade, close_code};
use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::any;
use shareguide_types::SessionToken;
use shareguide_types::protocol::{ServerMessage, close_codes, limits};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument as _, instrument};

use crate::api::codec;
use crate::api::errors::Error;
use crate::config::Environment;
use crate::metrics::{
    METRICS_ID_MESSAGES_RATE_LIMITED, METRICS_ID_SESSIONS_OPEN, METRICS_ID_SESSIONS_TIMEOUT,
};
use crate::services::engine::{EngineDeps, SessionEngine};
use crate::services::rate_limit::RateLimiter;

/// Everything the session endpoint needs, cloned per connection.
#[derive(Clone)]
pub(crate) struct SessionArgs {
    pub(crate) environment: Environment,
    pub(crate) allowed_origins: Arc<Vec<String>>,
    pub(crate) engine_deps: EngineDeps,
    pub(crate) rate_limiter: RateLimiter,
    pub(crate) max_connection_lifetime: Duration,
    pub(crate) cancellation_token: CancellationToken,
}

/// Creates a `Router` with the single `/{token}` WebSocket route.
///
/// Clients upgrade their connection via the WebSocket upgrade protocol.
/// Axum supports both HTTP/1.1 and HTTP/2.0 WebSocket connections,
/// therefore we accept connections with `any`.
pub(crate) fn routes(args: SessionArgs) -> Router {
    Router::new().route(
        "/{token}",
        any(move |upgrade, path, headers| handle_upgrade(args.clone(), upgrade, path, headers)),
    )
}

/// WebSocket handler.
///
/// In `prod`, connections carrying a non-empty `Origin` header outside the
/// allow-list are rejected before the upgrade. The WebSocket message size
/// is capped at the wire limit, so oversized payloads die at the transport.
#[instrument(level = "debug", skip_all, name = "session", fields(token = %token))]
async fn handle_upgrade(
    args: SessionArgs,
    upgrade: WebSocketUpgrade,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> axum::response::Response {
    if args.environment.is_prod()
        && let Some(origin) = headers.get(header::ORIGIN)
    {
        let origin = origin.to_str().unwrap_or_default();
        if !origin.is_empty() && !args.allowed_origins.iter().any(|allowed| allowed == origin) {
            tracing::warn!("rejecting connection from origin {origin}");
            return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
        }
    }
    let parent_span = tracing::Span::current();
    upgrade
        .max_message_size(limits::MAX_INBOUND_MESSAGE_BYTES)
        .on_failed_upgrade(|err| {
            tracing::warn!("could not establish websocket connection: {err:?}");
        })
        .on_upgrade(move |mut socket| {
            async move {
                ::metrics::gauge!(METRICS_ID_SESSIONS_OPEN).increment(1);
                let close_frame = match tokio::time::timeout(
                    args.max_connection_lifetime,
                    run_session(&mut socket, &args, &token),
                )
                .await
                {
                    Ok(Ok(())) => Some(CloseFrame {
                        code: close_code::NORMAL,
                        reason: "closed".into(),
                    }),
                    Ok(Err(err)) => err.into_close_frame(),
                    Err(_) => {
                        ::metrics::counter!(METRICS_ID_SESSIONS_TIMEOUT).increment(1);
                        Some(CloseFrame {
                            code: close_codes::TIMEOUT,
                            reason: "timeout".into(),
                        })
                    }
                };
                if let Some(close_frame) = close_frame {
                    tracing::trace!(" < sending close frame");
                    // send the frame and ignore the error; the peer may
                    // already be gone
                    let _ = socket.send(ws::Message::Close(Some(close_frame))).await;
                }
                args.rate_limiter.forget(&token);
                ::metrics::gauge!(METRICS_ID_SESSIONS_OPEN).decrement(1);
            }
            .instrument(parent_span)
        })
}

/// The whole life-cycle of a single guided session connection.
///
/// 1) Load the session row and template bound to the token, hydrate the
///    state, and commit it to the session store.
/// 2) Emit `connected` (and the spoken first instruction on step 0).
/// 3) Loop: rate-limit, decode, dispatch each inbound message; flush the
///    engine's replies and write the state back to the store.
///
/// Clients may close the connection at any point (gracefully with a `Close`
/// frame or not); this method handles that gracefully and leaves the
/// session-store entry for the store's TTL to collect.
#[instrument(level = "debug", skip_all)]
async fn run_session(
    socket: &mut WebSocket,
    args: &SessionArgs,
    token: &str,
) -> Result<(), Error> {
    let open = SessionEngine::open(args.engine_deps.clone(), SessionToken::from(token)).await;
    let mut engine = match open {
        Ok(engine) => engine,
        Err(err) => {
            if let Some(message) = err.client_message() {
                let _ = socket
                    .send(codec::encode(&ServerMessage::error(message)))
                    .await;
            }
            return Err(err);
        }
    };
    flush(socket, &mut engine).await?;

    loop {
        let message = tokio::select! {
            _ = args.cancellation_token.cancelled() => {
                tracing::debug!("shutting down, closing session");
                return Ok(());
            }
            message = socket.recv() => message.ok_or(Error::ConnectionClosed)??,
        };
        match message {
            ws::Message::Close(_) => return Err(Error::ConnectionClosed),
            // transport-level keep-alives are answered by the stack
            ws::Message::Ping(_) | ws::Message::Pong(_) => continue,
            inbound => {
                if !args
                    .rate_limiter
                    .allow(token, args.engine_deps.clock.now_ms())
                {
                    ::metrics::counter!(METRICS_ID_MESSAGES_RATE_LIMITED).increment(1);
                    socket
                        .send(codec::encode(&ServerMessage::error("Rate limit exceeded")))
                        .await?;
                    continue;
                }
                let decoded = match codec::decode(&inbound) {
                    Ok(decoded) => decoded,
                    Err(err) => {
                        tracing::debug!("rejecting inbound message: {err}");
                        socket.send(codec::encode(&err.reply())).await?;
                        continue;
                    }
                };
                engine.handle(decoded).await;
                flush(socket, &mut engine).await?;
                engine.persist_to_store().await;
            }
        }
    }
}

/// Sends the engine's queued replies in FIFO order.
async fn flush(socket: &mut WebSocket, engine: &mut SessionEngine) -> Result<(), Error> {
    for message in engine.drain_outbox() {
        socket.send(codec::encode(&message)).await?;
    }
    Ok(())
}
