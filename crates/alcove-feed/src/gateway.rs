use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};
use uuid::Uuid;

use alcove_types::events::{
    EventFrame, GatewayCommand, READY_EVENT, TypingPayload, message_create_event,
    message_update_event, typing_event,
};
use alcove_types::models::Message;

use crate::source::FeedUpdate;

/// Covers connect, Identify and the ready frame end to end.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection parameters for the push channel.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// ws:// or wss:// URL of the gateway endpoint.
    pub url: String,
    pub token: String,
    pub chat_id: Uuid,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("websocket error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("handshake failed: {0}")]
    Handshake(&'static str),

    #[error("handshake timed out")]
    Timeout,
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The three event names this feed listens for, derived once from the
/// chat id at connect time.
struct FeedKeys {
    create: String,
    update: String,
    typing: String,
}

impl FeedKeys {
    fn for_chat(chat_id: Uuid) -> Self {
        Self {
            create: message_create_event(chat_id),
            update: message_update_event(chat_id),
            typing: typing_event(chat_id),
        }
    }
}

/// Push-channel update source: one authenticated, subscribed WebSocket.
pub struct GatewaySource {
    ws: WsStream,
    keys: FeedKeys,
}

impl GatewaySource {
    /// Connect, Identify, await the ready frame, then subscribe to the
    /// chat.
    pub async fn connect(config: &GatewayConfig) -> Result<Self, GatewayError> {
        tokio::time::timeout(HANDSHAKE_TIMEOUT, Self::handshake(config))
            .await
            .map_err(|_| GatewayError::Timeout)?
    }

    async fn handshake(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let (mut ws, _) = connect_async(config.url.as_str()).await?;

        let identify = GatewayCommand::Identify {
            token: config.token.clone(),
        };
        ws.send(WsMessage::text(encode_command(&identify)?)).await?;

        // A valid Identify is answered with a ready frame; anything else
        // first would be a protocol break.
        loop {
            let Some(msg) = ws.next().await else {
                return Err(GatewayError::Handshake("closed before ready"));
            };
            match msg? {
                WsMessage::Text(text) => {
                    let frame: EventFrame = serde_json::from_str(text.as_str())
                        .map_err(|_| GatewayError::Handshake("unparseable frame before ready"))?;
                    if frame.event == READY_EVENT {
                        break;
                    }
                }
                WsMessage::Ping(payload) => ws.send(WsMessage::Pong(payload)).await?,
                WsMessage::Close(_) => return Err(GatewayError::Handshake("closed before ready")),
                _ => {}
            }
        }

        let subscribe = GatewayCommand::Subscribe {
            chat_ids: vec![config.chat_id],
        };
        ws.send(WsMessage::text(encode_command(&subscribe)?)).await?;

        Ok(Self {
            ws,
            keys: FeedKeys::for_chat(config.chat_id),
        })
    }

    /// Next feed update, or None once the connection is gone.
    pub async fn next_update(&mut self) -> Option<FeedUpdate> {
        loop {
            let msg = match self.ws.next().await? {
                Ok(msg) => msg,
                Err(e) => {
                    warn!("gateway stream error: {e}");
                    return None;
                }
            };

            match msg {
                WsMessage::Text(text) => {
                    if let Some(update) = self.parse_frame(text.as_str()) {
                        return Some(update);
                    }
                }
                WsMessage::Ping(payload) => {
                    if self.ws.send(WsMessage::Pong(payload)).await.is_err() {
                        return None;
                    }
                }
                WsMessage::Close(_) => return None,
                _ => {}
            }
        }
    }

    fn parse_frame(&self, raw: &str) -> Option<FeedUpdate> {
        let frame: EventFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("bad gateway frame: {e}");
                return None;
            }
        };

        if frame.event == self.keys.create {
            let message: Message = decode_payload(frame.data)?;
            Some(FeedUpdate::Created(message))
        } else if frame.event == self.keys.update {
            let message: Message = decode_payload(frame.data)?;
            Some(FeedUpdate::Updated(message))
        } else if frame.event == self.keys.typing {
            let payload: TypingPayload = decode_payload(frame.data)?;
            Some(FeedUpdate::Typing {
                display_name: payload.display_name,
                author_id: payload.author_id,
            })
        } else {
            // Ready replays and events for other chats.
            debug!("ignoring gateway event '{}'", frame.event);
            None
        }
    }
}

fn encode_command(cmd: &GatewayCommand) -> Result<String, GatewayError> {
    serde_json::to_string(cmd).map_err(|_| GatewayError::Handshake("command failed to encode"))
}

fn decode_payload<T: serde::de::DeserializeOwned>(data: serde_json::Value) -> Option<T> {
    match serde_json::from_value(data) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("bad gateway payload: {e}");
            None
        }
    }
}
