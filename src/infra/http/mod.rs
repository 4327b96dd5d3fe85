pub mod error;
mod handlers;
pub mod middleware;
pub mod models;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, put},
};

use crate::application::tree::TreeService;

use middleware::{assign_request_id, log_outcome};

#[derive(Clone)]
pub struct RouterState {
    pub tree: Arc<TreeService>,
}

impl RouterState {
    pub fn new(tree: Arc<TreeService>) -> Self {
        Self { tree }
    }
}

pub fn build_router(state: RouterState) -> Router {
    Router::new()
        .route(
            "/tree",
            get(handlers::list_tree).post(handlers::create_node),
        )
        .route(
            "/tree/{id}",
            put(handlers::update_node).delete(handlers::delete_node),
        )
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_outcome))
        .layer(axum_middleware::from_fn(assign_request_id))
}
