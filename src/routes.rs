use std::sync::Arc;

use axum::{routing::get, Extension, Router};

use crate::extractor::AdminSecret;
use crate::interactions::{self, InteractionSettings};
use crate::keys::KeyService;
use crate::keys_api;

pub const ROOT_MESSAGE: &str = "Key System API Online";

async fn root() -> &'static str {
    ROOT_MESSAGE
}

pub fn api_routes() -> Router {
    Router::new()
        .merge(keys_api::routes())
        .merge(interactions::routes())
}

/// Full application router with shared state attached. Metrics are layered on by the binary.
pub fn app(
    service: Arc<KeyService>,
    admin_secret: AdminSecret,
    interaction_settings: Arc<InteractionSettings>,
) -> Router {
    Router::new()
        .route("/", get(root))
        .merge(api_routes())
        .layer(Extension(service))
        .layer(Extension(admin_secret))
        .layer(Extension(interaction_settings))
}
