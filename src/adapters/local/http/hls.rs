//! Static HLS output, with reads counted as session activity.

use crate::application::registry::SessionRegistry;
use crate::domain::asset::AssetId;
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use std::path::Path;
use std::sync::Arc;
use tower_http::services::ServeDir;

#[derive(Clone)]
struct HlsAccess {
    registry: Arc<SessionRegistry>,
    route: Arc<str>,
}

/// Serves `base_dir` under `route`. Players only fetch playlists and
/// segments once playing, so each read keeps the asset's session from
/// being evicted as idle.
pub fn service<S>(route: &str, base_dir: &Path, registry: Arc<SessionRegistry>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let access = HlsAccess {
        registry,
        route: Arc::from(route),
    };
    Router::new()
        .nest_service(route, ServeDir::new(base_dir))
        .layer(middleware::from_fn_with_state(access, touch_session))
}

async fn touch_session(State(access): State<HlsAccess>, request: Request, next: Next) -> Response {
    if let Some(session) = asset_in_path(request.uri().path(), &access.route)
        .and_then(|id| access.registry.get(id))
    {
        session.touch();
    }
    next.run(request).await
}

/// `/hls/7/seg_00003.ts` -> 7. Also accepts the path with the route stripped.
fn asset_in_path(path: &str, route: &str) -> Option<AssetId> {
    let rest = path.strip_prefix(route).unwrap_or(path);
    rest.trim_start_matches('/').split('/').next()?.parse().ok()
}
