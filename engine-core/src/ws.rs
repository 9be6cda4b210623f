//! WebSocket lifecycle dispatch (§2 component F/G, §4.3 "WebSocket path").
//!
//! The Engine Responder installs this loop after a successful upgrade and a
//! clean middleware pass; each frame dispatches to the endpoint's
//! [`WebSocketHandler`](crate::middleware::WebSocketHandler) with the
//! request [`Context`]. A middleware error closes the socket immediately
//! with a structured error payload and "going away" (close code 1001),
//! without ever installing the loop.

use std::sync::Arc;

use engine_http::ws::{Message, WebSocket};

use crate::context::Context;
use crate::error::EngineError;
use crate::middleware::WebSocketHandler;

/// The close code used when middleware rejects a WebSocket connection
/// before the lifecycle loop starts (§4.3).
pub const GOING_AWAY: u16 = 1001;

/// Drive a single WebSocket connection's lifecycle, dispatching each frame
/// kind to `handler` with `ctx`. Returns once the socket closes.
pub async fn run(mut socket: WebSocket, mut ctx: Context, handler: Arc<dyn WebSocketHandler>) {
    while let Some(frame) = socket.recv().await {
        let message = match frame {
            Ok(message) => message,
            Err(_) => break,
        };

        match message {
            Message::Text(text) => handler.on_text(&mut ctx, text.to_string()).await,
            Message::Binary(data) => handler.on_binary(&mut ctx, data.to_vec()).await,
            Message::Ping(payload) => handler.on_ping(&mut ctx, payload.to_vec()).await,
            Message::Pong(payload) => handler.on_pong(&mut ctx, payload.to_vec()).await,
            Message::Close(_) => {
                handler.on_close(&mut ctx).await;
                break;
            }
        }
    }
}

/// Close a socket immediately because middleware rejected the connection,
/// sending a structured error payload before the "going away" close frame.
pub async fn reject(mut socket: WebSocket, error: EngineError) {
    let payload = serde_json::json!({ "error": error.to_string() }).to_string();
    let _ = socket.send(Message::Text(payload.into())).await;
    let _ = socket
        .send(Message::Close(Some(engine_http::ws::CloseFrame {
            code: GOING_AWAY,
            reason: "going away".into(),
        })))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn going_away_is_the_standard_close_code() {
        assert_eq!(GOING_AWAY, 1001);
    }
}

