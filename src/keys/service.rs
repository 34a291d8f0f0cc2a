use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::models::{
    IssuedKey, KeyDuration, KeyRecord, RejectReason, ValidateRequest, ValidationOutcome,
};
use super::store::{KeyStore, StoreError};

const KEY_LENGTH: usize = 16;

/// Source of the current time, injectable so expiry can be exercised deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// How `issue` resolves the owner a new key is restricted to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OwnerPolicy {
    /// Bind to the requested owner, or leave unbound when none is given.
    #[default]
    Explicit,
    /// Always bind to the identity performing the issuance.
    SelfService,
    /// Never bind an owner.
    Unrestricted,
}

impl OwnerPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerPolicy::Explicit => "explicit",
            OwnerPolicy::SelfService => "self",
            OwnerPolicy::Unrestricted => "unrestricted",
        }
    }

    pub fn resolve(&self, requested: Option<&str>, invoker: Option<&str>) -> Option<String> {
        let chosen = match self {
            OwnerPolicy::Explicit => requested,
            OwnerPolicy::SelfService => invoker.or(requested),
            OwnerPolicy::Unrestricted => None,
        };
        non_empty(chosen)
    }
}

/// key: license-keys-lifecycle-config
/// Behavioral switches for validation and issuance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LifecycleConfig {
    pub require_owner: bool,
    pub hwid_binding: bool,
    pub single_use: bool,
    pub owner_policy: OwnerPolicy,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            require_owner: true,
            hwid_binding: true,
            single_use: false,
            owner_policy: OwnerPolicy::Explicit,
        }
    }
}

/// key: license-keys-service
/// Issues, validates and removes license keys. All store access goes through one lock so
/// validation's read-check-bind sequence cannot interleave with another caller.
pub struct KeyService {
    store: Mutex<Box<dyn KeyStore>>,
    config: LifecycleConfig,
    clock: Arc<dyn Clock>,
}

impl KeyService {
    pub fn new(store: impl KeyStore + 'static, config: LifecycleConfig) -> Self {
        Self {
            store: Mutex::new(Box::new(store)),
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn issue(
        &self,
        duration: KeyDuration,
        owner: Option<String>,
    ) -> Result<IssuedKey, StoreError> {
        let owner = non_empty(owner.as_deref());
        let mut store = self.store.lock().await;

        let key = loop {
            let candidate = generate_key();
            if store.get(&candidate).is_none() {
                break candidate;
            }
        };

        let record = KeyRecord::new(duration.expires_from(self.clock.now()), owner);
        store.put(&key, record.clone()).await?;
        tracing::info!(
            key = %mask_key(&key),
            %duration,
            owner = ?record.owner,
            "issued license key"
        );

        Ok(IssuedKey { key, record })
    }

    pub async fn validate(&self, request: ValidateRequest) -> Result<ValidationOutcome, StoreError> {
        let key = request.key.as_deref().and_then(normalize_key);
        let owner = non_empty(request.owner.as_deref());
        let hwid = non_empty(request.hwid.as_deref());

        let key = match key {
            Some(key)
                if !(self.config.require_owner && owner.is_none())
                    && !(self.config.hwid_binding && hwid.is_none()) =>
            {
                key
            }
            _ => return Ok(ValidationOutcome::rejected(RejectReason::MissingParams)),
        };

        let mut store = self.store.lock().await;
        let Some(mut record) = store.get(&key) else {
            return Ok(reject(&key, RejectReason::NotFound));
        };

        if record.used {
            return Ok(reject(&key, RejectReason::AlreadyUsed));
        }
        if record.is_expired(self.clock.now()) {
            return Ok(reject(&key, RejectReason::Expired));
        }
        if let Some(expected) = record.owner.as_deref() {
            if owner.as_deref() != Some(expected) {
                return Ok(reject(&key, RejectReason::WrongOwner));
            }
        }

        let mut changed = false;
        if self.config.hwid_binding {
            match record.hwid.as_deref() {
                Some(bound) if hwid.as_deref() != Some(bound) => {
                    return Ok(reject(&key, RejectReason::HwidMismatch));
                }
                Some(_) => {}
                None => {
                    record.hwid = hwid;
                    changed = true;
                    tracing::info!(key = %mask_key(&key), "bound license key to hardware id");
                }
            }
        }
        if self.config.single_use {
            record.used = true;
            changed = true;
        }

        if changed {
            store.put(&key, record.clone()).await?;
        }
        tracing::debug!(key = %mask_key(&key), consumed = record.used, "license key validated");

        let bound = if self.config.hwid_binding {
            record.hwid
        } else {
            None
        };
        Ok(ValidationOutcome::accepted(bound))
    }

    pub async fn delete_key(&self, key: &str) -> Result<bool, StoreError> {
        let Some(key) = normalize_key(key) else {
            return Ok(false);
        };
        let existed = self.store.lock().await.delete(&key).await?;
        if existed {
            tracing::info!(key = %mask_key(&key), "deleted license key");
        }
        Ok(existed)
    }

    pub async fn list_all(&self) -> Vec<(String, KeyRecord)> {
        self.store.lock().await.list()
    }

    pub async fn list_by_owner(&self, owner: &str) -> Vec<(String, KeyRecord)> {
        let owner = owner.trim();
        self.store
            .lock()
            .await
            .list()
            .into_iter()
            .filter(|(_, record)| record.owner.as_deref() == Some(owner))
            .collect()
    }
}

fn reject(key: &str, reason: RejectReason) -> ValidationOutcome {
    tracing::debug!(key = %mask_key(key), reason = reason.as_str(), "license key rejected");
    ValidationOutcome::rejected(reason)
}

/// Sixteen uppercase hex characters taken from a random v4 UUID.
fn generate_key() -> String {
    let mut key = Uuid::new_v4().simple().to_string();
    key.make_ascii_uppercase();
    key.truncate(KEY_LENGTH);
    key
}

pub fn normalize_key(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_ascii_uppercase())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Shortened form of a key for log lines.
pub fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(4).collect();
    format!("{prefix}…")
}
