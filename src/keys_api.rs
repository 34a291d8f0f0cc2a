use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Path, Query},
    http::{header, HeaderMap},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::extractor::AdminAuth;
use crate::keys::{KeyDuration, KeyService, KeySummary, ValidateRequest, ValidationOutcome};

/// key: license-keys-api
/// Validation endpoint for clients plus secret-guarded admin endpoints.
pub fn routes() -> Router {
    Router::new()
        .route("/validate", get(validate_key))
        .route("/admin/generate", post(generate_key))
        .route("/admin/keys", get(list_keys))
        .route("/admin/keys/:key", delete(delete_key))
}

pub async fn validate_key(
    Extension(service): Extension<Arc<KeyService>>,
    Query(params): Query<ValidateRequest>,
) -> AppResult<Json<ValidationOutcome>> {
    let outcome = service.validate(params).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateKeyRequest {
    pub duration: Option<String>,
    pub userid: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateKeyResponse {
    pub success: bool,
    pub key: String,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub expires: Option<DateTime<Utc>>,
}

pub async fn generate_key(
    _admin: AdminAuth,
    Extension(service): Extension<Arc<KeyService>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<GenerateKeyResponse>> {
    let payload = parse_generate_body(&headers, &body)?;
    let duration = match payload.duration.as_deref() {
        Some(raw) => raw.parse::<KeyDuration>()?,
        None => KeyDuration::Lifetime,
    };
    let owner = service
        .config()
        .owner_policy
        .resolve(payload.userid.as_deref(), None);

    let issued = service.issue(duration, owner).await?;
    Ok(Json(GenerateKeyResponse {
        success: true,
        key: issued.key,
        expires: issued.record.expires_at,
    }))
}

/// An empty body means "all defaults"; anything else must be a JSON object.
fn parse_generate_body(headers: &HeaderMap, body: &[u8]) -> AppResult<GenerateKeyRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(GenerateKeyRequest::default());
    }
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false);
    if !is_json {
        return Err(AppError::BadRequest(
            "expected an application/json request body".into(),
        ));
    }
    serde_json::from_slice(body)
        .map_err(|err| AppError::BadRequest(format!("invalid generate request: {err}")))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListKeysQuery {
    pub userid: Option<String>,
}

pub async fn list_keys(
    _admin: AdminAuth,
    Extension(service): Extension<Arc<KeyService>>,
    Query(query): Query<ListKeysQuery>,
) -> AppResult<Json<Vec<KeySummary>>> {
    let entries = match query.userid.as_deref() {
        Some(owner) => service.list_by_owner(owner).await,
        None => service.list_all().await,
    };
    Ok(Json(entries.into_iter().map(KeySummary::from).collect()))
}

pub async fn delete_key(
    _admin: AdminAuth,
    Extension(service): Extension<Arc<KeyService>>,
    Path(key): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    if service.delete_key(&key).await? {
        Ok(Json(serde_json::json!({ "success": true })))
    } else {
        Err(AppError::NotFound)
    }
}
