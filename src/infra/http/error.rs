//! JSON error envelope: `{"error": {"code", "message", "hint"}}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::ErrorReport;
use crate::application::pagination::PaginationError;
use crate::application::repos::RepoError;
use crate::application::tree::TreeServiceError;

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const INVALID_PAGINATION: &str = "invalid_pagination";
    pub const NOT_FOUND: &str = "not_found";
    pub const PARENT_NOT_FOUND: &str = "parent_not_found";
    pub const DB_TIMEOUT: &str = "db_timeout";
    pub const REPO: &str = "repo_error";
    pub const INTERNAL: &str = "internal_error";
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    error: Body<'a>,
}

#[derive(Debug, Serialize)]
struct Body<'a> {
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'a str>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
}

impl ApiError {
    const fn of(status: StatusCode, code: &'static str, message: &'static str) -> Self {
        Self {
            status,
            code,
            message,
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn bad_request(message: &'static str) -> Self {
        Self::of(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message)
    }

    pub fn invalid_input(hint: impl Into<String>) -> Self {
        Self::of(StatusCode::BAD_REQUEST, codes::INVALID_INPUT, "Invalid input").with_hint(hint)
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::of(StatusCode::NOT_FOUND, codes::NOT_FOUND, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let envelope = Envelope {
            error: Body {
                code: self.code,
                message: self.message,
                hint: self.hint.as_deref(),
            },
        };
        let mut response = (self.status, Json(envelope)).into_response();

        let detail = self.hint.as_deref().unwrap_or(self.message);
        ErrorReport::from_message(
            "infra::http::error",
            self.status,
            format!("{}: {detail}", self.code),
        )
        .attach(&mut response);
        response
    }
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => Self::not_found("Node not found"),
            RepoError::ParentNotFound { parent_id } => Self::of(
                StatusCode::NOT_FOUND,
                codes::PARENT_NOT_FOUND,
                "Parent node not found",
            )
            .with_hint(format!("no node with id {parent_id}")),
            RepoError::InvalidInput { message } => Self::invalid_input(message),
            RepoError::Timeout => Self::of(
                StatusCode::SERVICE_UNAVAILABLE,
                codes::DB_TIMEOUT,
                "Database timeout",
            ),
            RepoError::Persistence(message) => Self::of(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::REPO,
                "Persistence error",
            )
            .with_hint(message),
        }
    }
}

impl From<PaginationError> for ApiError {
    fn from(err: PaginationError) -> Self {
        Self::of(
            StatusCode::BAD_REQUEST,
            codes::INVALID_PAGINATION,
            "Invalid pagination parameters",
        )
        .with_hint(err.to_string())
    }
}

impl From<TreeServiceError> for ApiError {
    fn from(err: TreeServiceError) -> Self {
        match err {
            TreeServiceError::Domain(err) => Self::invalid_input(err.to_string()),
            TreeServiceError::Pagination(err) => err.into(),
            TreeServiceError::Repo(err) => err.into(),
            TreeServiceError::Build(err) => Self::of(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::INTERNAL,
                "Tree could not be assembled",
            )
            .with_hint(err.to_string()),
        }
    }
}
