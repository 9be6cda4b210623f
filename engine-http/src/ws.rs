//! WebSocket re-exports from Axum.
//!
//! Gated behind the `ws` feature flag.

use axum::extract::FromRequest;

pub use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};

use crate::{IntoResponse, Request, Response};

/// Extract a [`WebSocketUpgrade`] out of a raw request, consuming it. A
/// request that isn't a valid WS handshake (missing `Upgrade` header, wrong
/// method, ...) rejects with the response Axum would have returned for that
/// failure — the caller never gets a socket.
pub async fn try_upgrade(request: Request) -> Result<WebSocketUpgrade, Response> {
    WebSocketUpgrade::from_request(request, &()).await.map_err(IntoResponse::into_response)
}
