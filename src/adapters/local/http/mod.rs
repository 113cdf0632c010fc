//! HTTP inbound adapter.
//!
//! A thin axum surface over [`StreamService`]: it resolves playlist URLs,
//! exposes the session registry and serves the HLS output directory.

mod error;
mod hls;
mod routes;

pub use error::ApiError;

use crate::application::stream::StreamService;
use crate::ports::catalog::AssetCatalog;
use crate::ports::encoder::EncodeLauncher;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Mount point of the static HLS output unless the public prefix is a local
/// path. An absolute prefix expects the proxy or CDN in front to map onto it.
pub const HLS_ROUTE: &str = "/hls";

pub fn router<C, E>(service: Arc<StreamService<C, E>>) -> Router
where
    C: AssetCatalog + 'static,
    E: EncodeLauncher + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let layout = &service.settings().layout;
    let hls = hls::service(
        layout.local_route().unwrap_or(HLS_ROUTE),
        layout.base_dir(),
        service.registry().clone(),
    );

    Router::new()
        .route("/health", get(routes::health))
        .route("/catalog", get(routes::catalog::<C, E>))
        .route(
            "/stream/:id",
            get(routes::stream::<C, E>).delete(routes::stop::<C, E>),
        )
        .route("/sessions", get(routes::sessions::<C, E>))
        .merge(hls)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}
