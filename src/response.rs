use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

/// Envelope shared by every endpoint, successful or not.
///
/// Successful calls carry `data`; failed calls carry the reason in
/// `status_message` and `data: null`.
#[derive(Serialize, Deserialize, Debug)]
pub struct ApiResponse<T: Serialize> {
    pub status_code: u16,
    pub status_message: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            status_code: StatusCode::OK.as_u16(),
            status_message: "OK".to_string(),
            data: Some(data),
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl ApiResponse<()> {
    pub fn error(status: StatusCode, message: String) -> Self {
        ApiResponse {
            status_code: status.as_u16(),
            status_message: message,
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_envelope_carries_data() {
        let response = ApiResponse::ok(vec![1, 2]);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.status_message, "OK");
        assert_eq!(response.data, Some(vec![1, 2]));
    }

    #[test]
    fn error_envelope_has_no_data() {
        let response = ApiResponse::error(StatusCode::CONFLICT, "taken".to_string());
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(response.data.is_none());
    }
}
