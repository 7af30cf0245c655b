// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Minimal Discord gateway and REST client for the command handler

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::{Attachment, CommandHandler, Conversation, IncomingMessage, Reply};
use crate::{Result, TrashLensError};

const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";
const API_BASE: &str = "https://discord.com/api/v10";

/// GUILD_MESSAGES | DIRECT_MESSAGES | MESSAGE_CONTENT
const INTENTS: u64 = (1 << 9) | (1 << 12) | (1 << 15);

/// Discord rejects message content above this many characters
const MESSAGE_LIMIT: usize = 2000;

const EMBED_COLOR: u32 = 0x3498db;

mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

#[derive(Deserialize, Debug)]
struct GatewayPayload {
    op: u8,
    #[serde(default)]
    d: Value,
    s: Option<u64>,
    t: Option<String>,
}

#[derive(Deserialize, Debug)]
struct MessageCreate {
    channel_id: String,
    author: Author,
    #[serde(default)]
    content: String,
    #[serde(default)]
    attachments: Vec<DiscordAttachment>,
}

#[derive(Deserialize, Debug)]
struct Author {
    id: String,
    #[serde(default)]
    bot: bool,
}

#[derive(Deserialize, Debug)]
struct DiscordAttachment {
    filename: String,
    url: String,
    content_type: Option<String>,
}

impl MessageCreate {
    fn into_incoming(self, self_id: Option<u64>) -> Option<(String, IncomingMessage)> {
        let author_id: u64 = self.author.id.parse().ok()?;
        let message = IncomingMessage {
            author_id,
            author_is_bot: self.author.bot || Some(author_id) == self_id,
            content: self.content,
            attachments: self
                .attachments
                .into_iter()
                .map(|a| Attachment {
                    filename: a.filename,
                    url: a.url,
                    content_type: a.content_type,
                })
                .collect(),
        };
        Some((self.channel_id, message))
    }
}

/// REST half of the bot: sending replies and fetching attachments
#[derive(Clone)]
pub struct DiscordRest {
    client: Client,
    token: String,
    api_base: String,
}

impl DiscordRest {
    pub fn new(token: &str) -> Self {
        Self::with_api_base(token, API_BASE)
    }

    pub fn with_api_base(token: &str, api_base: &str) -> Self {
        Self {
            client: Client::new(),
            token: token.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    pub async fn send(&self, channel_id: &str, reply: &Reply) -> Result<()> {
        let url = format!("{}/channels/{}/messages", self.api_base, channel_id);

        for body in message_bodies(reply) {
            let resp = self
                .client
                .post(&url)
                .header("Authorization", format!("Bot {}", self.token))
                .json(&body)
                .send()
                .await
                .map_err(|e| TrashLensError::transport("Discord", e))?;

            if !resp.status().is_success() {
                let status = resp.status().as_u16();
                let err_text = resp.text().await.unwrap_or_default();
                error!("Discord create message error: {}", err_text);
                return Err(TrashLensError::upstream("Discord", status, &err_text));
            }
        }
        Ok(())
    }

    pub async fn download(&self, attachment: &Attachment) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(&attachment.url)
            .send()
            .await
            .map_err(|e| TrashLensError::transport("Discord CDN", e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TrashLensError::upstream("Discord CDN", status, &body));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| TrashLensError::transport("Discord CDN", e))?;
        Ok(bytes.to_vec())
    }
}

/// Request bodies for one reply, splitting long text
fn message_bodies(reply: &Reply) -> Vec<Value> {
    match reply {
        Reply::Text(text) => split_message(text, MESSAGE_LIMIT)
            .into_iter()
            .map(|chunk| json!({ "content": chunk }))
            .collect(),
        Reply::Embed { title, description, fields } => vec![json!({
            "embeds": [{
                "title": title,
                "description": description,
                "color": EMBED_COLOR,
                "fields": fields
                    .iter()
                    .map(|f| json!({ "name": f.name, "value": f.value, "inline": false }))
                    .collect::<Vec<_>>(),
            }]
        })],
    }
}

/// Split into chunks of at most `max_len` chars, preferring to break after a newline
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + max_len).min(chars.len());
        let cut = if end == chars.len() {
            end
        } else {
            chars[start..end]
                .iter()
                .rposition(|&c| c == '\n')
                .map(|i| start + i + 1)
                .unwrap_or(end)
        };
        chunks.push(chars[start..cut].iter().collect());
        start = cut;
    }
    chunks
}

/// One channel bound to the REST client
struct DiscordConversation {
    rest: DiscordRest,
    channel_id: String,
}

#[async_trait]
impl Conversation for DiscordConversation {
    async fn reply(&self, reply: Reply) -> Result<()> {
        self.rest.send(&self.channel_id, &reply).await
    }

    async fn download(&self, attachment: &Attachment) -> Result<Vec<u8>> {
        self.rest.download(attachment).await
    }
}

/// Why a gateway session ended without an error
enum SessionEnd {
    Reconnect,
}

/// Close codes that no amount of reconnecting will fix
fn fatal_close_reason(code: u16) -> Option<&'static str> {
    match code {
        4004 => Some("authentication failed, check DISCORD_TOKEN"),
        4010 => Some("invalid shard"),
        4011 => Some("sharding required"),
        4012 => Some("invalid API version"),
        4013 => Some("invalid intents"),
        4014 => Some("disallowed intents, enable the message content intent for the bot"),
        _ => None,
    }
}

/// Reconnect delay: 1s doubling up to 60s
struct Backoff {
    secs: u64,
}

impl Backoff {
    const MAX_SECS: u64 = 60;

    fn new() -> Self {
        Self { secs: 1 }
    }

    fn reset(&mut self) {
        self.secs = 1;
    }

    fn next_delay(&mut self) -> Duration {
        let delay = Duration::from_secs(self.secs);
        self.secs = (self.secs * 2).min(Self::MAX_SECS);
        delay
    }
}

/// Gateway connection feeding the command handler
pub struct DiscordGateway {
    token: String,
    rest: DiscordRest,
    handler: Arc<CommandHandler>,
    self_id: Option<u64>,
    ready: bool,
}

impl DiscordGateway {
    pub fn new(token: &str, handler: Arc<CommandHandler>) -> Self {
        Self {
            token: token.to_string(),
            rest: DiscordRest::new(token),
            handler,
            self_id: None,
            ready: false,
        }
    }

    /// Connect and serve until a fatal close, reconnecting with backoff
    pub async fn run(&mut self) -> Result<()> {
        info!("Starting Discord gateway");
        let mut backoff = Backoff::new();

        loop {
            self.ready = false;
            let outcome = self.run_session().await;
            if self.ready {
                backoff.reset();
            }

            match outcome {
                Ok(SessionEnd::Reconnect) => {
                    info!("Discord requested reconnect");
                    backoff.reset();
                }
                Err(TrashLensError::Config(reason)) => {
                    error!("Discord gateway refused the bot: {}", reason);
                    return Err(TrashLensError::Config(reason));
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!("Discord gateway error: {}. Reconnecting in {}s...", e, delay.as_secs());
                    sleep(delay).await;
                }
            }
        }
    }

    async fn run_session(&mut self) -> Result<SessionEnd> {
        let (socket, _) = connect_async(GATEWAY_URL)
            .await
            .map_err(|e| TrashLensError::Gateway(format!("connect failed: {}", e)))?;
        let (mut sink, mut stream) = socket.split();

        let hello = match stream.next().await {
            Some(Ok(Message::Text(text))) => serde_json::from_str::<GatewayPayload>(&text)?,
            other => return Err(TrashLensError::Gateway(format!("expected HELLO, got {:?}", other))),
        };
        if hello.op != opcode::HELLO {
            return Err(TrashLensError::Gateway(format!("expected HELLO, got op {}", hello.op)));
        }
        let heartbeat_ms = hello.d["heartbeat_interval"].as_u64().unwrap_or(41_250);
        debug!("Gateway heartbeat interval {}ms", heartbeat_ms);

        let identify = json!({
            "op": opcode::IDENTIFY,
            "d": {
                "token": self.token,
                "intents": INTENTS,
                "properties": { "os": std::env::consts::OS, "browser": "trashlens", "device": "trashlens" }
            }
        });
        sink.send(Message::Text(identify.to_string()))
            .await
            .map_err(|e| TrashLensError::Gateway(e.to_string()))?;

        let mut heartbeat = interval(Duration::from_millis(heartbeat_ms));
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;

        let mut seq: Option<u64> = None;
        let mut acked = true;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if !acked {
                        return Err(TrashLensError::Gateway("heartbeat not acknowledged".to_string()));
                    }
                    acked = false;
                    sink.send(Message::Text(json!({ "op": opcode::HEARTBEAT, "d": seq }).to_string()))
                        .await
                        .map_err(|e| TrashLensError::Gateway(e.to_string()))?;
                }
                frame = stream.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(frame))) => {
                            let code = frame.as_ref().map(|f| u16::from(f.code));
                            if let Some(reason) = code.and_then(fatal_close_reason) {
                                return Err(TrashLensError::Config(format!("Discord close code {:?}: {}", code, reason)));
                            }
                            return Err(TrashLensError::Gateway(format!("closed by server: {:?}", frame)));
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(TrashLensError::Gateway(e.to_string())),
                        None => return Err(TrashLensError::Gateway("connection closed".to_string())),
                    };

                    let payload: GatewayPayload = match serde_json::from_str(&text) {
                        Ok(p) => p,
                        Err(e) => {
                            warn!("Undecodable gateway payload: {}", e);
                            continue;
                        }
                    };
                    if payload.s.is_some() {
                        seq = payload.s;
                    }

                    match payload.op {
                        opcode::DISPATCH => self.dispatch(payload),
                        opcode::HEARTBEAT => {
                            sink.send(Message::Text(json!({ "op": opcode::HEARTBEAT, "d": seq }).to_string()))
                                .await
                                .map_err(|e| TrashLensError::Gateway(e.to_string()))?;
                        }
                        opcode::HEARTBEAT_ACK => acked = true,
                        opcode::RECONNECT => return Ok(SessionEnd::Reconnect),
                        opcode::INVALID_SESSION => {
                            return Err(TrashLensError::Gateway("invalid session".to_string()));
                        }
                        other => debug!("Ignoring gateway op {}", other),
                    }
                }
            }
        }
    }

    fn dispatch(&mut self, payload: GatewayPayload) {
        match payload.t.as_deref() {
            Some("READY") => {
                self.ready = true;
                self.self_id = payload.d["user"]["id"].as_str().and_then(|id| id.parse().ok());
                info!(
                    "Logged in as {}",
                    payload.d["user"]["username"].as_str().unwrap_or("unknown")
                );
            }
            Some("MESSAGE_CREATE") => {
                let event: MessageCreate = match serde_json::from_value(payload.d) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("Malformed MESSAGE_CREATE: {}", e);
                        return;
                    }
                };
                let Some((channel_id, message)) = event.into_incoming(self.self_id) else {
                    return;
                };

                let handler = self.handler.clone();
                let conversation = DiscordConversation {
                    rest: self.rest.clone(),
                    channel_id,
                };
                tokio::spawn(async move {
                    if let Err(e) = handler.handle(&message, &conversation).await {
                        error!("Failed to handle Discord message: {}", e);
                    }
                });
            }
            _ => {}
        }
    }
}
