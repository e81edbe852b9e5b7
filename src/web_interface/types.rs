use std::fmt;

use log::error;
use serde::Serialize;
use warp::http::StatusCode;
use warp::{reply, Reply};

use crate::error_handling::types::{AuthError, IngestError};

/// API error payload
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteAlertsResponse {
    /// Count rendered as a string for client compatibility.
    #[serde(rename = "nbDeleted")]
    pub deleted_count: String,
}

/// A status code and a JSON body, produced by every handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self { status, body },
            Err(e) => {
                error!("failed to serialize response: {}", e);
                Self::error(StatusCode::INTERNAL_SERVER_ERROR, &e)
            }
        }
    }

    pub fn error(status: StatusCode, err: &dyn fmt::Display) -> Self {
        let payload = ApiError {
            message: err.to_string(),
        };
        Self {
            status,
            body: serde_json::to_string(&payload).unwrap_or_default(),
        }
    }
}

impl Reply for ApiResponse {
    fn into_response(self) -> reply::Response {
        reply::with_status(
            reply::with_header(self.body, "content-type", "application/json"),
            self.status,
        )
        .into_response()
    }
}

pub fn ingest_status(err: &IngestError) -> StatusCode {
    match err {
        IngestError::MalformedInput(_) | IngestError::EmptyBatch => StatusCode::BAD_REQUEST,
        IngestError::MissingRequiredField(_)
        | IngestError::InvalidField(_)
        | IngestError::InvalidDecision(_)
        | IngestError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn auth_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        AuthError::ForbiddenOrigin(_) => StatusCode::FORBIDDEN,
    }
}
