//! Chat interaction webhook. The chat platform POSTs slash-command invocations here; each
//! request is signed with the application's Ed25519 key over `timestamp || body`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::Extension,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use ed25519_dalek::{PublicKey, Signature};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::commands::{self, Command, Invoker};
use crate::error::{AppError, AppResult};
use crate::keys::KeyService;

pub const SIGNATURE_HEADER: &str = "x-signature-ed25519";
pub const TIMESTAMP_HEADER: &str = "x-signature-timestamp";

const INTERACTION_PING: u8 = 1;
const INTERACTION_APPLICATION_COMMAND: u8 = 2;
const RESPONSE_PONG: u8 = 1;
const RESPONSE_CHANNEL_MESSAGE: u8 = 4;
const FLAG_EPHEMERAL: u64 = 1 << 6;
/// Signed requests older or newer than this are refused to stop replays.
pub const MAX_TIMESTAMP_SKEW_SECS: i64 = 300;

/// Verification key and command permissions for the interaction endpoint.
#[derive(Clone, Debug, Default)]
pub struct InteractionSettings {
    pub public_key: Option<PublicKey>,
    pub admin_ids: HashSet<String>,
}

impl InteractionSettings {
    pub fn from_hex(
        public_key_hex: Option<&str>,
        admin_ids: HashSet<String>,
    ) -> anyhow::Result<Self> {
        let public_key = public_key_hex.map(parse_public_key).transpose()?;
        Ok(Self {
            public_key,
            admin_ids,
        })
    }

    fn is_admin(&self, id: Option<&str>) -> bool {
        self.admin_ids.is_empty() || id.map_or(false, |id| self.admin_ids.contains(id))
    }
}

pub fn parse_public_key(hex_key: &str) -> anyhow::Result<PublicKey> {
    let bytes = hex::decode(hex_key.trim())?;
    PublicKey::from_bytes(&bytes)
        .map_err(|err| anyhow::anyhow!("invalid interaction public key: {err}"))
}

pub fn routes() -> Router {
    Router::new().route("/interactions", post(handle_interaction))
}

#[derive(Debug, Deserialize)]
struct Interaction {
    #[serde(rename = "type")]
    kind: u8,
    data: Option<InteractionData>,
    member: Option<InteractionMember>,
    user: Option<InteractionUser>,
}

#[derive(Debug, Deserialize)]
struct InteractionData {
    name: String,
    #[serde(default)]
    options: Vec<InteractionOption>,
}

#[derive(Debug, Deserialize)]
struct InteractionOption {
    name: String,
    value: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct InteractionMember {
    user: Option<InteractionUser>,
}

#[derive(Debug, Deserialize)]
struct InteractionUser {
    id: String,
}

impl Interaction {
    fn invoker_id(&self) -> Option<&str> {
        self.member
            .as_ref()
            .and_then(|member| member.user.as_ref())
            .or(self.user.as_ref())
            .map(|user| user.id.as_str())
    }
}

pub async fn handle_interaction(
    Extension(service): Extension<Arc<KeyService>>,
    Extension(settings): Extension<Arc<InteractionSettings>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let public_key = settings.public_key.as_ref().ok_or(AppError::Unauthorized)?;
    let signature = header_str(&headers, SIGNATURE_HEADER).ok_or(AppError::Unauthorized)?;
    let timestamp = header_str(&headers, TIMESTAMP_HEADER).ok_or(AppError::Unauthorized)?;
    if !verify_signature(public_key, timestamp, &body, signature) {
        tracing::warn!("rejected interaction with invalid signature");
        return Err(AppError::Unauthorized);
    }
    if !timestamp_is_fresh(timestamp, service.now().timestamp()) {
        tracing::warn!(timestamp, "rejected interaction with stale timestamp");
        return Err(AppError::Unauthorized);
    }

    let interaction: Interaction = serde_json::from_slice(&body)
        .map_err(|err| AppError::BadRequest(format!("invalid interaction payload: {err}")))?;

    match interaction.kind {
        INTERACTION_PING => Ok(Json(json!({ "type": RESPONSE_PONG }))),
        INTERACTION_APPLICATION_COMMAND => {
            let invoker_id = interaction.invoker_id().map(str::to_string);
            let data = interaction
                .data
                .ok_or_else(|| AppError::BadRequest("command interaction without data".into()))?;
            let options: HashMap<String, String> = data
                .options
                .into_iter()
                .filter_map(|option| option.value.map(|value| (option.name, option_text(value))))
                .collect();
            tracing::info!(command = %data.name, invoker = ?invoker_id, "received chat command");

            let content = match Command::parse(&data.name, &options) {
                Ok(command) => {
                    let invoker = Invoker {
                        is_admin: settings.is_admin(invoker_id.as_deref()),
                        id: invoker_id,
                    };
                    commands::execute(&service, command, &invoker).await?
                }
                Err(err) => format!("❌ {err}"),
            };
            Ok(Json(ephemeral_message(&content)))
        }
        other => Err(AppError::BadRequest(format!(
            "unsupported interaction type {other}"
        ))),
    }
}

pub fn verify_signature(
    public_key: &PublicKey,
    timestamp: &str,
    body: &[u8],
    signature_hex: &str,
) -> bool {
    let Ok(bytes) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(signature) = Signature::try_from(bytes.as_slice()) else {
        return false;
    };
    let mut message = Vec::with_capacity(timestamp.len() + body.len());
    message.extend_from_slice(timestamp.as_bytes());
    message.extend_from_slice(body);
    public_key.verify_strict(&message, &signature).is_ok()
}

fn timestamp_is_fresh(timestamp: &str, now_secs: i64) -> bool {
    timestamp
        .trim()
        .parse::<i64>()
        .map(|signed_at| (now_secs - signed_at).abs() <= MAX_TIMESTAMP_SKEW_SECS)
        .unwrap_or(false)
}

fn ephemeral_message(content: &str) -> Value {
    json!({
        "type": RESPONSE_CHANNEL_MESSAGE,
        "data": { "content": content, "flags": FLAG_EPHEMERAL },
    })
}

fn option_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_outside_the_skew_window_are_stale() {
        let now = 1_718_000_000;
        assert!(timestamp_is_fresh("1718000000", now));
        assert!(timestamp_is_fresh("1717999700", now));
        assert!(timestamp_is_fresh("1718000300", now));
        assert!(!timestamp_is_fresh("1717999699", now));
        assert!(!timestamp_is_fresh("1718000301", now));
        assert!(!timestamp_is_fresh("yesterday", now));
        assert!(!timestamp_is_fresh("", now));
    }
}
