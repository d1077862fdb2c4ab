// HTTP API error types.
//
// Status convention inherited from the legacy service and preserved for
// wire compatibility: 401 carries every domain "not found / invalid key /
// bad credential" failure, not just authentication; 501 carries errors the
// store itself reported; 500 is everything that went wrong outside a store
// call. This is a historical quirk, not a convention to extend to new
// endpoints.
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::database::store::StoreError;

#[derive(Debug)]
pub enum ApiError {
    /// 401: lookup by id/username/key found nothing, or credentials failed.
    InvalidKey(String),
    /// 500: failure outside the store call (malformed input and the like).
    Server(String),
    /// 501: the store reported an error; its message rides along.
    Store(String),
}

impl ApiError {
    pub fn invalid_key(message: impl Into<String>) -> Self {
        ApiError::InvalidKey(message.into())
    }

    pub fn server(err: impl std::fmt::Display) -> Self {
        ApiError::Server(format!("Server Exception: {err}"))
    }

    pub fn store(err: impl std::fmt::Display) -> Self {
        ApiError::Store(format!("Database Exception: {err}"))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidKey(_) => StatusCode::UNAUTHORIZED,
            ApiError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Store(_) => StatusCode::NOT_IMPLEMENTED,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::InvalidKey(msg) | ApiError::Server(msg) | ApiError::Store(msg) => msg,
        }
    }

    pub fn to_json(&self) -> Value {
        json!({ "message": self.message() })
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::error!("store error: {err}");
        ApiError::store(err)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), Json(self.to_json())).into_response()
    }
}
