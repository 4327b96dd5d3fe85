use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::application::error::ErrorReport;
use crate::application::pagination::{PageRequest, PaginatedTree};
use crate::domain::nodes::NodeId;

use super::RouterState;
use super::error::ApiError;
use super::models::{NodeRequest, NodeResponse, TreeQuery};

pub async fn list_tree(
    State(state): State<RouterState>,
    query: Result<Query<TreeQuery>, QueryRejection>,
) -> Result<Json<PaginatedTree>, ApiError> {
    let Query(query) = query.map_err(|rejection| {
        ApiError::bad_request("Invalid query string").with_hint(rejection.body_text())
    })?;
    let request = PageRequest::parse(query.page.as_deref(), query.page_size.as_deref())?;

    let page = state.tree.list_page(request).await?;
    Ok(Json(page))
}

pub async fn create_node(
    State(state): State<RouterState>,
    payload: Result<Json<NodeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<NodeResponse>), ApiError> {
    let Json(payload) = payload.map_err(json_rejection)?;

    let node = state.tree.create_node(payload.into()).await?;
    Ok((StatusCode::CREATED, Json(node.into())))
}

pub async fn update_node(
    State(state): State<RouterState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<NodeRequest>, JsonRejection>,
) -> Result<Json<NodeResponse>, ApiError> {
    let id = node_id(id)?;
    let Json(payload) = payload.map_err(json_rejection)?;

    let node = state.tree.update_node(id, payload.into()).await?;
    Ok(Json(node.into()))
}

pub async fn delete_node(
    State(state): State<RouterState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let id = node_id(id)?;

    state.tree.delete_node(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn healthz(State(state): State<RouterState>) -> Response {
    match state.tree.health_check().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::healthz",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

fn node_id(id: Result<Path<i64>, PathRejection>) -> Result<NodeId, ApiError> {
    match id {
        Ok(Path(id)) if id > 0 => Ok(id),
        Ok(Path(id)) => Err(ApiError::bad_request("Invalid node id")
            .with_hint(format!("node id must be a positive integer, got {id}"))),
        Err(rejection) => {
            Err(ApiError::bad_request("Invalid node id").with_hint(rejection.body_text()))
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::bad_request("Invalid request body").with_hint(rejection.body_text())
}
