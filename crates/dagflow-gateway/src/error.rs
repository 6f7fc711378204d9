use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use dagflow_core::{ErrorKind, FlowError};

/// Engine error mapped onto an HTTP status.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: ErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn status_for(kind: ErrorKind) -> StatusCode {
        match kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::DuplicateNode
            | ErrorKind::DuplicateEdge
            | ErrorKind::Cycle
            | ErrorKind::NodeInUse => StatusCode::CONFLICT,
            ErrorKind::InvalidInput | ErrorKind::MissingInput => StatusCode::BAD_REQUEST,
            ErrorKind::Schedule | ErrorKind::Node | ErrorKind::Storage => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<FlowError> for ApiError {
    fn from(e: FlowError) -> Self {
        let kind = e.kind();
        Self {
            status: Self::status_for(kind),
            kind,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": {
                "kind": self.kind,
                "message": self.message,
            }
        }));
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (FlowError::NodeNotFound("a".into()), StatusCode::NOT_FOUND),
            (FlowError::GraphNotFound("g".into()), StatusCode::NOT_FOUND),
            (FlowError::DuplicateNode("a".into()), StatusCode::CONFLICT),
            (FlowError::DuplicateEdge("a.v -> b.v".into()), StatusCode::CONFLICT),
            (
                FlowError::Cycle {
                    path: vec!["a".into(), "a".into()],
                },
                StatusCode::CONFLICT,
            ),
            (
                FlowError::NodeInUse {
                    operation: "add node".into(),
                    active_runs: 1,
                },
                StatusCode::CONFLICT,
            ),
            (FlowError::InvalidRunConfig("x".into()), StatusCode::BAD_REQUEST),
            (FlowError::UnknownUnit("x".into()), StatusCode::BAD_REQUEST),
            (
                FlowError::Schedule {
                    ordered: 0,
                    total: 1,
                    unresolved: vec!["a".into()],
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (FlowError::Database("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }
}
