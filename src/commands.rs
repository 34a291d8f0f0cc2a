//! Chat command surface: parses slash-command invocations and renders private replies.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::keys::{KeyDuration, KeyDurationError, KeyRecord, KeyService, OwnerPolicy, StoreError};

/// Upper bound the chat platform accepts for a single message body.
pub const MAX_REPLY_CHARS: usize = 2000;
const TRUNCATION_MARKER: &str = "\n…(truncated)";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Generate {
        duration: KeyDuration,
        userid: Option<String>,
    },
    Delete {
        key: String,
    },
    ListKeys,
    UserInfo {
        userid: String,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("missing required option `{0}`")]
    MissingOption(&'static str),
    #[error(transparent)]
    InvalidDuration(#[from] KeyDurationError),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Generate { .. } => "generate",
            Command::Delete { .. } => "delete",
            Command::ListKeys => "listkeys",
            Command::UserInfo { .. } => "userinfo",
        }
    }

    /// Builds a command from its name and string option values.
    pub fn parse(name: &str, options: &HashMap<String, String>) -> Result<Self, CommandError> {
        let optional = |option: &str| {
            options
                .get(option)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        let required =
            |option: &'static str| optional(option).ok_or(CommandError::MissingOption(option));

        match name {
            "generate" => Ok(Command::Generate {
                duration: required("duration")?.parse()?,
                userid: optional("userid"),
            }),
            "delete" => Ok(Command::Delete {
                key: required("key")?,
            }),
            "listkeys" => Ok(Command::ListKeys),
            "userinfo" => Ok(Command::UserInfo {
                userid: required("userid")?,
            }),
            other => Err(CommandError::UnknownCommand(other.to_string())),
        }
    }
}

/// Who issued a command, as reported by the chat platform.
#[derive(Clone, Debug, Default)]
pub struct Invoker {
    pub id: Option<String>,
    pub is_admin: bool,
}

/// Runs `command` against the key service and returns the reply text.
pub async fn execute(
    service: &KeyService,
    command: Command,
    invoker: &Invoker,
) -> Result<String, StoreError> {
    let policy = service.config().owner_policy;
    let self_service_generate =
        matches!(command, Command::Generate { .. }) && policy == OwnerPolicy::SelfService;
    if !invoker.is_admin && !self_service_generate {
        tracing::warn!(
            command = command.name(),
            invoker = ?invoker.id,
            "rejected command from non-admin"
        );
        return Ok("❌ You are not allowed to use this command.".to_string());
    }

    let reply = match command {
        Command::Generate { duration, userid } => {
            let owner = policy.resolve(userid.as_deref(), invoker.id.as_deref());
            let issued = service.issue(duration, owner).await?;
            format!(
                "✅ **Key Generated!**\n```{}```\n🕒 Expires: **{}**\n🔗 Bound to ID: **{}**",
                issued.key,
                describe_expiry(issued.record.expires_at, "Never (Lifetime)"),
                issued.record.owner.as_deref().unwrap_or("Anyone"),
            )
        }
        Command::Delete { key } => {
            if service.delete_key(&key).await? {
                format!("✅ Key **{}** has been deleted.", key.trim().to_ascii_uppercase())
            } else {
                "❌ Key not found.".to_string()
            }
        }
        Command::ListKeys => {
            let entries = service.list_all().await;
            if entries.is_empty() {
                "No keys exist.".to_string()
            } else {
                let mut out = String::from("🧾 **All Keys:**\n\n");
                for (key, record) in &entries {
                    out.push_str(&format!(
                        "**{key}**\nOwner: {}\n{}",
                        record.owner.as_deref().unwrap_or("Anyone"),
                        describe_record(record),
                    ));
                }
                out
            }
        }
        Command::UserInfo { userid } => {
            let entries = service.list_by_owner(&userid).await;
            if entries.is_empty() {
                "❌ This user has no keys.".to_string()
            } else {
                let mut out = format!("🔍 **Keys for {userid}:**\n\n");
                for (key, record) in &entries {
                    out.push_str(&format!("**{key}**\n{}", describe_record(record)));
                }
                out
            }
        }
    };

    Ok(truncate_reply(reply))
}

fn describe_record(record: &KeyRecord) -> String {
    format!(
        "Used: {}\nExpires: {}\nHWID: {}\n\n",
        record.used,
        describe_expiry(record.expires_at, "Lifetime"),
        record.hwid.as_deref().unwrap_or("None"),
    )
}

fn describe_expiry(expires_at: Option<DateTime<Utc>>, lifetime: &str) -> String {
    expires_at
        .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| lifetime.to_string())
}

pub fn truncate_reply(reply: String) -> String {
    if reply.chars().count() <= MAX_REPLY_CHARS {
        return reply;
    }
    let keep = MAX_REPLY_CHARS - TRUNCATION_MARKER.chars().count();
    let mut truncated: String = reply.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}
