//! Error reporting shared by the HTTP layer and the process entry point.

use std::error::Error as StdError;
use std::iter;

use axum::{http::StatusCode, response::Response};
use thiserror::Error;

use crate::{cache::CacheError, config::LoadError, infra::error::InfraError};

/// Diagnostic carried in response extensions so the response logger can
/// print the whole cause chain without exposing it to clients.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let messages = iter::successors(Some(error), |err| (*err).source())
            .map(ToString::to_string)
            .collect();
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Failure that stops the process: configuration, startup or serving.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("tree cache could not be configured: {0}")]
    Cache(#[from] CacheError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Configuration mistakes exit with 2 so wrappers can tell them apart
    /// from runtime failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_)
            | AppError::Cache(CacheError::Configuration(_))
            | AppError::Infra(InfraError::Configuration(_)) => 2,
            _ => 1,
        }
    }

    /// Messages of every underlying cause, outermost first.
    pub fn causes(&self) -> Vec<String> {
        iter::successors(self.source(), |err| (*err).source())
            .map(ToString::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use axum::response::IntoResponse;

    use super::*;

    #[derive(Debug, Error)]
    #[error("outer failure")]
    struct Outer {
        #[source]
        inner: std::io::Error,
    }

    #[test]
    fn report_collects_source_chain() {
        let error = Outer {
            inner: std::io::Error::other("disk gone"),
        };
        let report = ErrorReport::from_error("tests", StatusCode::INTERNAL_SERVER_ERROR, &error);
        assert_eq!(report.messages, vec!["outer failure", "disk gone"]);
    }

    #[test]
    fn report_travels_in_response_extensions() {
        let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
        ErrorReport::from_message("tests", StatusCode::SERVICE_UNAVAILABLE, "store down")
            .attach(&mut response);

        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert_eq!(report.messages, vec!["store down"]);
    }

    #[test]
    fn configuration_failures_use_exit_code_two() {
        let err = AppError::from(InfraError::Configuration(
            "database url is not configured".into(),
        ));
        assert_eq!(err.exit_code(), 2);

        let err = AppError::from(CacheError::Configuration("bad url".into()));
        assert_eq!(err.exit_code(), 2);

        let err = AppError::from(InfraError::Connect(sqlx::Error::PoolClosed));
        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.to_string(), "could not connect to postgres");
    }

    #[test]
    fn causes_skip_the_top_level_message() {
        let err = AppError::from(InfraError::Connect(sqlx::Error::PoolClosed));
        assert_eq!(err.causes(), vec![sqlx::Error::PoolClosed.to_string()]);

        assert!(AppError::unexpected("boom").causes().is_empty());
    }
}
