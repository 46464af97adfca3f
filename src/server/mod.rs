pub mod appstate;
pub mod http;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::routes;
use crate::server::appstate::AppState;

pub fn build_service(appstate: AppState) -> Router {
    Router::new()
        .nest("/api", routes::router())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(appstate)
}
