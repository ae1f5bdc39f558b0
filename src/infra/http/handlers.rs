//! Question routes.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::HttpState;
use super::error::ApiError;

pub const STATUS_UPDATED: &str = "status updated";

#[derive(Debug, Deserialize)]
pub struct LevelQuery {
    #[serde(alias = "Level")]
    pub level: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    #[serde(alias = "Level")]
    pub level: String,
    #[serde(alias = "ID")]
    pub id: i64,
    #[serde(default, alias = "datetime_shown")]
    pub shown_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

pub async fn get_test(
    State(state): State<HttpState>,
    Query(query): Query<LevelQuery>,
) -> Result<impl IntoResponse, ApiError> {
    // A missing level is reported like any other unrecognized one.
    let level = query.level.unwrap_or_default();
    let test = state.questions.get_next(&level).await?;
    Ok(Json(test))
}

pub async fn update_status(
    State(state): State<HttpState>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload
        .map_err(|rejection| ApiError::bad_request("Malformed body", Some(rejection.body_text())))?;

    if request.id <= 0 {
        return Err(ApiError::bad_request(
            "Invalid id",
            Some(format!("id must be positive, got {}", request.id)),
        ));
    }

    let shown_at = request
        .shown_at
        .as_deref()
        .map(parse_utc_timestamp)
        .transpose()?;

    state
        .questions
        .mark_shown(&request.level, request.id, shown_at)
        .await?;

    Ok(Json(MessageResponse {
        message: STATUS_UPDATED.to_string(),
    }))
}

fn parse_utc_timestamp(value: &str) -> Result<OffsetDateTime, ApiError> {
    let parsed = OffsetDateTime::parse(value, &Rfc3339).map_err(|err| {
        ApiError::bad_request(
            "Invalid shown_at",
            Some(format!("expected an RFC 3339 timestamp: {err}")),
        )
    })?;

    if !parsed.offset().is_utc() {
        return Err(ApiError::bad_request(
            "Invalid shown_at",
            Some(format!("timestamp must be in UTC, got offset {}", parsed.offset())),
        ));
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use time::macros::datetime;

    use super::*;

    #[test]
    fn utc_timestamps_parse_with_fractional_seconds() {
        assert_eq!(
            parse_utc_timestamp("2024-05-06T07:08:09.123Z").expect("valid"),
            datetime!(2024-05-06 07:08:09.123 UTC)
        );
        assert_eq!(
            parse_utc_timestamp("2024-05-06T07:08:09+00:00").expect("valid"),
            datetime!(2024-05-06 07:08:09 UTC)
        );
    }

    #[test]
    fn non_utc_or_naive_timestamps_are_rejected() {
        for value in ["2024-05-06T07:08:09+02:00", "2024-05-06T07:08:09", "yesterday"] {
            let err = parse_utc_timestamp(value).expect_err(value);
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
            assert_eq!(err.code(), "bad_request");
        }
    }
}
