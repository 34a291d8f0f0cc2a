use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// key: license-keys-model
/// Persisted license key record. The key string itself is the map key in the store.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyRecord {
    #[serde(
        rename = "expires",
        default,
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub used: bool,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub hwid: Option<String>,
}

impl KeyRecord {
    pub fn new(expires_at: Option<DateTime<Utc>>, owner: Option<String>) -> Self {
        Self {
            expires_at,
            used: false,
            owner,
            hwid: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |expires_at| now > expires_at)
    }
}

/// A freshly issued key together with its stored record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedKey {
    pub key: String,
    pub record: KeyRecord,
}

/// Flattened view used by listing endpoints.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct KeySummary {
    pub key: String,
    #[serde(flatten)]
    pub record: KeyRecord,
}

impl From<(String, KeyRecord)> for KeySummary {
    fn from((key, record): (String, KeyRecord)) -> Self {
        Self { key, record }
    }
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub enum KeyDuration {
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "lifetime")]
    Lifetime,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown duration `{0}`; expected 1d, 7d or lifetime")]
pub struct KeyDurationError(pub String);

impl KeyDuration {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyDuration::OneDay => "1d",
            KeyDuration::SevenDays => "7d",
            KeyDuration::Lifetime => "lifetime",
        }
    }

    /// Absolute expiry for a key issued at `issued_at`; `None` means it never expires.
    pub fn expires_from(&self, issued_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            KeyDuration::OneDay => Some(issued_at + Duration::days(1)),
            KeyDuration::SevenDays => Some(issued_at + Duration::days(7)),
            KeyDuration::Lifetime => None,
        }
    }
}

impl FromStr for KeyDuration {
    type Err = KeyDurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "1d" => Ok(KeyDuration::OneDay),
            "7d" => Ok(KeyDuration::SevenDays),
            "lifetime" => Ok(KeyDuration::Lifetime),
            other => Err(KeyDurationError(other.to_string())),
        }
    }
}

impl fmt::Display for KeyDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a validation attempt was refused. Serialized names are part of the public API.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MissingParams,
    NotFound,
    AlreadyUsed,
    Expired,
    WrongOwner,
    HwidMismatch,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MissingParams => "missing_params",
            RejectReason::NotFound => "not_found",
            RejectReason::AlreadyUsed => "already_used",
            RejectReason::Expired => "expired",
            RejectReason::WrongOwner => "wrong_owner",
            RejectReason::HwidMismatch => "hwid_mismatch",
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hwid: Option<String>,
}

impl ValidationOutcome {
    pub fn accepted(hwid: Option<String>) -> Self {
        Self {
            valid: true,
            reason: None,
            hwid,
        }
    }

    pub fn rejected(reason: RejectReason) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            hwid: None,
        }
    }
}

/// Raw validation input as supplied by a caller; empty strings count as missing.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ValidateRequest {
    pub key: Option<String>,
    #[serde(rename = "userid")]
    pub owner: Option<String>,
    pub hwid: Option<String>,
}
