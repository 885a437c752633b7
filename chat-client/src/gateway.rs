//! Websocket event stream: connects to the chat gateway, keeps the
//! heartbeat going and forwards decoded dispatches as [`ChatEvent`]s.

use crate::events::{parse_dispatch, ChatEvent};
use futures::{SinkExt, StreamExt};
use likewatch_core::{ChatApiError, CoreError, RetryConfig, Secret};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// GUILDS | GUILD_MESSAGES | GUILD_MESSAGE_REACTIONS | DIRECT_MESSAGES | MESSAGE_CONTENT
pub const DEFAULT_INTENTS: u64 = (1 << 0) | (1 << 9) | (1 << 10) | (1 << 12) | (1 << 15);

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

/// Close codes after which reconnecting cannot help.
const FATAL_CLOSE_CODES: &[u16] = &[4004, 4010, 4011, 4012, 4013, 4014];

#[derive(Debug, Deserialize)]
struct GatewayPayload {
    op: u8,
    #[serde(default)]
    d: Value,
    s: Option<u64>,
    t: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Hello {
    heartbeat_interval: u64,
}

/// Why a single gateway session ended.
#[derive(Debug, PartialEq)]
enum SessionEnd {
    Reconnect,
    ReceiverClosed,
    Cancelled,
}

pub struct EventStream {
    token: Secret,
    intents: u64,
    url: String,
    reconnect: RetryConfig,
}

impl EventStream {
    pub fn new(token: Secret) -> Self {
        Self {
            token,
            intents: DEFAULT_INTENTS,
            url: GATEWAY_URL.to_string(),
            reconnect: RetryConfig {
                max_attempts: u32::MAX,
                base_delay_ms: 1000,
                max_delay_ms: 60000,
                ..RetryConfig::default()
            },
        }
    }

    pub fn with_intents(mut self, intents: u64) -> Self {
        self.intents = intents;
        self
    }

    /// Forward events into `sender` until cancelled, the receiver goes away,
    /// or the gateway rejects the credentials.
    pub async fn run(
        self,
        sender: mpsc::Sender<ChatEvent>,
        cancel: CancellationToken,
    ) -> Result<(), CoreError> {
        let mut consecutive_failures: u32 = 0;

        loop {
            match self.run_session(&sender, &cancel).await {
                Ok(SessionEnd::Cancelled) => {
                    info!("Chat gateway stopped");
                    return Ok(());
                }
                Ok(SessionEnd::ReceiverClosed) => {
                    info!("Event receiver closed, leaving chat gateway");
                    return Ok(());
                }
                Ok(SessionEnd::Reconnect) => {
                    consecutive_failures = 0;
                    info!("Chat gateway asked for a reconnect");
                }
                Err(CoreError::ChatApi(ChatApiError::AuthenticationFailed { reason })) => {
                    error!("Chat gateway rejected the session: {}", reason);
                    return Err(CoreError::ChatApi(ChatApiError::AuthenticationFailed {
                        reason,
                    }));
                }
                Err(e) => {
                    warn!("Chat gateway session failed: {}", e);
                    consecutive_failures = consecutive_failures.saturating_add(1);
                }
            }

            let delay = if consecutive_failures == 0 {
                Duration::from_millis(self.reconnect.base_delay_ms)
            } else {
                self.reconnect.delay_for(consecutive_failures - 1)
            };
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn run_session(
        &self,
        sender: &mpsc::Sender<ChatEvent>,
        cancel: &CancellationToken,
    ) -> Result<SessionEnd, CoreError> {
        let (socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| gateway_error(format!("connect failed: {e}")))?;
        let (mut write, mut read) = socket.split();
        debug!("Connected to chat gateway");

        let hello = loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    let payload: GatewayPayload = serde_json::from_str(&text)?;
                    if payload.op == OP_HELLO {
                        break serde_json::from_value::<Hello>(payload.d)?;
                    }
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(gateway_error(e.to_string())),
                None => return Err(gateway_error("closed before hello".to_string())),
            }
        };

        let identify = json!({
            "op": OP_IDENTIFY,
            "d": {
                "token": self.token.expose(),
                "intents": self.intents,
                "properties": { "os": std::env::consts::OS, "browser": "likewatch", "device": "likewatch" }
            }
        });
        write
            .send(Message::Text(identify.to_string()))
            .await
            .map_err(|e| gateway_error(e.to_string()))?;

        let mut heartbeat = tokio::time::interval(Duration::from_millis(hello.heartbeat_interval));
        // The first tick completes immediately; identify already went out
        heartbeat.tick().await;
        let mut sequence: Option<u64> = None;
        let mut awaiting_ack = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Cancelled);
                }
                _ = heartbeat.tick() => {
                    if awaiting_ack {
                        warn!("Heartbeat not acknowledged, reconnecting");
                        return Ok(SessionEnd::Reconnect);
                    }
                    let beat = json!({ "op": OP_HEARTBEAT, "d": sequence });
                    write
                        .send(Message::Text(beat.to_string()))
                        .await
                        .map_err(|e| gateway_error(e.to_string()))?;
                    awaiting_ack = true;
                }
                frame = read.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(frame))) => {
                            let code = frame.as_ref().map(|f| u16::from(f.code)).unwrap_or(1000);
                            if FATAL_CLOSE_CODES.contains(&code) {
                                return Err(CoreError::ChatApi(ChatApiError::AuthenticationFailed {
                                    reason: format!("gateway closed with code {code}"),
                                }));
                            }
                            return Ok(SessionEnd::Reconnect);
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(gateway_error(e.to_string())),
                        None => return Ok(SessionEnd::Reconnect),
                    };

                    let payload: GatewayPayload = match serde_json::from_str(&text) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!("Undecodable gateway frame: {}", e);
                            continue;
                        }
                    };
                    if payload.s.is_some() {
                        sequence = payload.s;
                    }

                    match payload.op {
                        OP_DISPATCH => {
                            let event = payload
                                .t
                                .as_deref()
                                .and_then(|t| parse_dispatch(t, payload.d));
                            if let Some(event) = event {
                                if sender.send(event).await.is_err() {
                                    return Ok(SessionEnd::ReceiverClosed);
                                }
                            }
                        }
                        OP_HEARTBEAT => {
                            let beat = json!({ "op": OP_HEARTBEAT, "d": sequence });
                            write
                                .send(Message::Text(beat.to_string()))
                                .await
                                .map_err(|e| gateway_error(e.to_string()))?;
                        }
                        OP_HEARTBEAT_ACK => awaiting_ack = false,
                        OP_RECONNECT | OP_INVALID_SESSION => return Ok(SessionEnd::Reconnect),
                        other => debug!("Ignoring gateway op {}", other),
                    }
                }
            }
        }
    }
}

fn gateway_error(reason: String) -> CoreError {
    CoreError::ChatApi(ChatApiError::GatewayConnection { reason })
}
