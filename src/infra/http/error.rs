use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::ErrorReport;
use crate::application::questions::QuizError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const INVALID_LEVEL: &str = "invalid_level";
    pub const NO_QUESTIONS: &str = "no_questions";
    pub const STORE_UNAVAILABLE: &str = "store_unavailable";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    report: Option<ErrorReport>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
            report: None,
        }
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<QuizError> for ApiError {
    fn from(err: QuizError) -> Self {
        match &err {
            QuizError::InvalidLevel { .. } => Self::new(
                StatusCode::BAD_REQUEST,
                codes::INVALID_LEVEL,
                "Invalid level",
                Some(err.to_string()),
            ),
            QuizError::NoQuestionsAvailable { .. } => Self::new(
                StatusCode::NOT_FOUND,
                codes::NO_QUESTIONS,
                "No questions available",
                Some(err.to_string()),
            ),
            QuizError::StoreUnavailable(_) => {
                let status = StatusCode::SERVICE_UNAVAILABLE;
                // Internal detail stays in the log; clients only learn to retry.
                let report = ErrorReport::from_error("infra::http::questions", status, &err);
                Self {
                    report: Some(report),
                    ..Self::new(
                        status,
                        codes::STORE_UNAVAILABLE,
                        "Store unavailable, retry later",
                        None,
                    )
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let report = self.report.unwrap_or_else(|| {
            ErrorReport::from_message(
                "infra::http",
                self.status,
                format!(
                    "{}: {}",
                    self.code,
                    self.hint.as_deref().unwrap_or(self.message)
                ),
            )
        });
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        report.attach(&mut response);
        response
    }
}
