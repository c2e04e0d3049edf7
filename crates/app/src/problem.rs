use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use handy_core::transition::TransitionError;
use handy_storage::{TaskError, UserError};

#[derive(Debug, Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    problem_type: &'static str,
    title: &'static str,
    detail: String,
}

/// RFC 7807 error body returned by every handler.
#[derive(Debug)]
pub struct ProblemResponse {
    status: StatusCode,
    body: ProblemDetails,
}

impl ProblemResponse {
    pub fn new<S: Into<String>>(status: StatusCode, problem_type: &'static str, detail: S) -> Self {
        Self {
            status,
            body: ProblemDetails {
                problem_type,
                title: status.canonical_reason().unwrap_or("error"),
                detail: detail.into(),
            },
        }
    }

    pub fn bad_request<S: Into<String>>(problem_type: &'static str, detail: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, problem_type, detail)
    }

    pub fn unauthorized<S: Into<String>>(problem_type: &'static str, detail: S) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, problem_type, detail)
    }

    pub fn forbidden<S: Into<String>>(problem_type: &'static str, detail: S) -> Self {
        Self::new(StatusCode::FORBIDDEN, problem_type, detail)
    }

    pub fn not_found<S: Into<String>>(problem_type: &'static str, detail: S) -> Self {
        Self::new(StatusCode::NOT_FOUND, problem_type, detail)
    }

    pub fn conflict<S: Into<String>>(problem_type: &'static str, detail: S) -> Self {
        Self::new(StatusCode::CONFLICT, problem_type, detail)
    }

    pub fn internal<S: Into<String>>(detail: S) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", detail)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ProblemResponse {
    fn into_response(self) -> Response {
        let mut response = Json(self.body).into_response();
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

impl From<JsonRejection> for ProblemResponse {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request("invalid_body", rejection.body_text())
    }
}

impl From<QueryRejection> for ProblemResponse {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request("invalid_query", rejection.body_text())
    }
}

impl From<PathRejection> for ProblemResponse {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request("invalid_path", rejection.body_text())
    }
}

impl From<TransitionError> for ProblemResponse {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::Forbidden(reason) => Self::forbidden("transition_forbidden", reason),
            TransitionError::InvalidState { .. } => {
                Self::conflict("invalid_transition", err.to_string())
            }
            TransitionError::SameStatus(_) => Self::conflict("status_unchanged", err.to_string()),
            TransitionError::NotRequestable(_) => {
                Self::bad_request("status_not_requestable", err.to_string())
            }
        }
    }
}

impl From<TaskError> for ProblemResponse {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::NotFound => Self::not_found("task_not_found", "task does not exist"),
            TaskError::Conflict => Self::conflict(
                "task_modified",
                "task changed while the request was processed; reload and retry",
            ),
            other => {
                error!(stage = "storage", error = %other, "task query failed");
                Self::internal("failed to access tasks")
            }
        }
    }
}

impl From<UserError> for ProblemResponse {
    fn from(err: UserError) -> Self {
        match err {
            UserError::DuplicateEmail => {
                Self::conflict("user_exists", "an account with this email already exists")
            }
            other => {
                error!(stage = "storage", error = %other, "user query failed");
                Self::internal("failed to access users")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handy_core::types::TaskStatus;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn renders_problem_json() {
        let response =
            ProblemResponse::bad_request("invalid_status", "status must be open").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_TYPE],
            "application/problem+json"
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["type"], "invalid_status");
        assert_eq!(body["title"], "Bad Request");
        assert_eq!(body["detail"], "status must be open");
    }

    #[test]
    fn maps_domain_errors_to_statuses() {
        let cases = [
            (
                ProblemResponse::from(TransitionError::Forbidden("only_creator_can_cancel")),
                StatusCode::FORBIDDEN,
            ),
            (
                ProblemResponse::from(TransitionError::InvalidState {
                    from: TaskStatus::Completed,
                    action: "cancel",
                }),
                StatusCode::CONFLICT,
            ),
            (
                ProblemResponse::from(TransitionError::NotRequestable(TaskStatus::Open)),
                StatusCode::BAD_REQUEST,
            ),
            (ProblemResponse::from(TaskError::NotFound), StatusCode::NOT_FOUND),
            (ProblemResponse::from(TaskError::Conflict), StatusCode::CONFLICT),
            (
                ProblemResponse::from(UserError::DuplicateEmail),
                StatusCode::CONFLICT,
            ),
        ];
        for (problem, expected) in cases {
            assert_eq!(problem.status(), expected);
        }
    }
}
