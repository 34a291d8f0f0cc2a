use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::fs;

use crate::keys::{LifecycleConfig, OwnerPolicy};

/// Address the HTTP server should bind to. Defaults to `0.0.0.0`.
pub static BIND_ADDRESS: Lazy<String> =
    Lazy::new(|| std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()));

/// Port the HTTP server should listen on, read from `PORT`. Defaults to `3000`.
pub static BIND_PORT: Lazy<u16> = Lazy::new(|| {
    std::env::var("PORT")
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
        .unwrap_or(3000)
});

/// Location of the JSON key file. Defaults to `./keys.json`.
pub static KEYS_FILE: Lazy<String> =
    Lazy::new(|| read_optional_env("KEYS_FILE").unwrap_or_else(|| "./keys.json".to_string()));

/// Shared secret expected in the `x-admin-secret` header. Read from `ADMIN_SECRET` or from the
/// file named by `ADMIN_SECRET_FILE`. When unset, admin endpoints reject every request.
pub static ADMIN_SECRET: Lazy<Option<String>> =
    Lazy::new(|| read_secret_env("ADMIN_SECRET", "ADMIN_SECRET_FILE"));

/// Hex encoded Ed25519 public key of the chat application, used to verify interaction payloads.
pub static DISCORD_PUBLIC_KEY: Lazy<Option<String>> =
    Lazy::new(|| read_optional_env("DISCORD_PUBLIC_KEY"));

/// Comma separated chat identities allowed to run admin commands. Empty allows everyone.
pub static DISCORD_ADMIN_IDS: Lazy<HashSet<String>> = Lazy::new(|| {
    read_optional_env("DISCORD_ADMIN_IDS")
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
});

/// key: lifecycle-config -> caller identity required on validate
pub static KEY_REQUIRE_OWNER: Lazy<bool> = Lazy::new(|| read_flag("KEY_REQUIRE_OWNER", true));

/// key: lifecycle-config -> bind keys to the first hardware id that validates them
pub static KEY_HWID_BINDING: Lazy<bool> = Lazy::new(|| read_flag("KEY_HWID_BINDING", true));

/// key: lifecycle-config -> consume keys on their first successful validation
pub static KEY_SINGLE_USE: Lazy<bool> = Lazy::new(|| read_flag("KEY_SINGLE_USE", false));

fn parse_owner_policy() -> OwnerPolicy {
    match std::env::var("KEY_OWNER_POLICY") {
        Ok(raw) => {
            let normalized = raw.trim().to_ascii_lowercase();
            match normalized.as_str() {
                "" | "explicit" => OwnerPolicy::Explicit,
                "self" => OwnerPolicy::SelfService,
                "unrestricted" => OwnerPolicy::Unrestricted,
                other => panic!(
                    "unsupported KEY_OWNER_POLICY value '{other}'; expected 'explicit', 'self' or 'unrestricted'"
                ),
            }
        }
        Err(_) => OwnerPolicy::Explicit,
    }
}

/// key: lifecycle-config -> how issued keys pick their owner
pub static KEY_OWNER_POLICY: Lazy<OwnerPolicy> = Lazy::new(parse_owner_policy);

pub fn lifecycle_config_from_env() -> LifecycleConfig {
    LifecycleConfig {
        require_owner: *KEY_REQUIRE_OWNER,
        hwid_binding: *KEY_HWID_BINDING,
        single_use: *KEY_SINGLE_USE,
        owner_policy: *KEY_OWNER_POLICY,
    }
}

fn read_optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_flag(key: &str, default: bool) -> bool {
    match read_optional_env(key) {
        Some(value) => parse_flag(&value).unwrap_or_else(|| {
            panic!("unsupported {key} value '{value}'; expected true/false, yes/no, on/off or 1/0")
        }),
        None => default,
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn read_secret_env(value_key: &str, file_key: &str) -> Option<String> {
    if let Some(path) = read_optional_env(file_key) {
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let trimmed = contents.trim().to_string();
                if !trimmed.is_empty() {
                    return Some(trimmed);
                }
            }
            Err(err) => panic!("failed to read {file_key} from {path}: {err}"),
        }
    }

    read_optional_env(value_key)
}
