//! License key issuance, validation and storage.

pub mod models;
pub mod service;
pub mod store;

pub use models::{
    IssuedKey, KeyDuration, KeyDurationError, KeyRecord, KeySummary, RejectReason,
    ValidateRequest, ValidationOutcome,
};
pub use service::{Clock, KeyService, LifecycleConfig, OwnerPolicy, SystemClock};
pub use store::{FileKeyStore, KeyStore, MemoryKeyStore, StoreError};
