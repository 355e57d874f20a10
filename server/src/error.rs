use std::fmt;

use anyhow::Error as AnyError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use tracing::error;

use quillpad_core::roles::AccessError;
use quillpad_core::store::StoreError;

#[derive(Debug, Clone, Copy)]
struct ErrorDescriptor {
    status: StatusCode,
    name: &'static str,
    error_type: &'static str,
    default_message: &'static str,
}

const BAD_REQUEST_DESCRIPTOR: ErrorDescriptor = ErrorDescriptor {
    status: StatusCode::BAD_REQUEST,
    name: "BAD_REQUEST",
    error_type: "BAD_REQUEST",
    default_message: "Bad request.",
};

const UNAUTHORIZED_DESCRIPTOR: ErrorDescriptor = ErrorDescriptor {
    status: StatusCode::UNAUTHORIZED,
    name: "AUTHENTICATION_REQUIRED",
    error_type: "AUTHENTICATION_REQUIRED",
    default_message: "You must sign in first to access this resource.",
};

const FORBIDDEN_DESCRIPTOR: ErrorDescriptor = ErrorDescriptor {
    status: StatusCode::FORBIDDEN,
    name: "ACTION_FORBIDDEN",
    error_type: "ACTION_FORBIDDEN",
    default_message: "Action forbidden.",
};

const NOT_FOUND_DESCRIPTOR: ErrorDescriptor = ErrorDescriptor {
    status: StatusCode::NOT_FOUND,
    name: "NOT_FOUND",
    error_type: "RESOURCE_NOT_FOUND",
    default_message: "Resource not found.",
};

const CONFLICT_DESCRIPTOR: ErrorDescriptor = ErrorDescriptor {
    status: StatusCode::CONFLICT,
    name: "RESOURCE_ALREADY_EXISTS",
    error_type: "RESOURCE_ALREADY_EXISTS",
    default_message: "Resource already exists.",
};

const TRANSIENT_DESCRIPTOR: ErrorDescriptor = ErrorDescriptor {
    status: StatusCode::SERVICE_UNAVAILABLE,
    name: "TRANSIENT_ERROR",
    error_type: "TRANSIENT_ERROR",
    default_message: "A backing service is temporarily unavailable; retry the request.",
};

const INTERNAL_SERVER_ERROR_DESCRIPTOR: ErrorDescriptor = ErrorDescriptor {
    status: StatusCode::INTERNAL_SERVER_ERROR,
    name: "INTERNAL_SERVER_ERROR",
    error_type: "INTERNAL_SERVER_ERROR",
    default_message: "An internal error occurred.",
};

#[derive(Debug)]
pub struct AppError {
    descriptor: &'static ErrorDescriptor,
    name: String,
    error_type: String,
    message: String,
    data: Option<JsonValue>,
    source: Option<AnyError>,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::from_descriptor(&BAD_REQUEST_DESCRIPTOR, Some(message.into()))
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::from_descriptor(&UNAUTHORIZED_DESCRIPTOR, Some(message.into()))
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::from_descriptor(&FORBIDDEN_DESCRIPTOR, Some(message.into()))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::from_descriptor(&NOT_FOUND_DESCRIPTOR, Some(message.into()))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::from_descriptor(&CONFLICT_DESCRIPTOR, Some(message.into()))
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::from_descriptor(&TRANSIENT_DESCRIPTOR, Some(message.into()))
    }

    pub fn internal(error: AnyError) -> Self {
        error!(?error, "internal server error");
        Self::from_descriptor(&INTERNAL_SERVER_ERROR_DESCRIPTOR, None).with_source(error)
    }

    pub fn from_anyhow(error: AnyError) -> Self {
        Self::internal(error)
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::from_descriptor(&BAD_REQUEST_DESCRIPTOR, Some(message.into()))
            .with_name("INVALID_OPERATION")
            .with_error_type("INVALID_OPERATION")
    }

    pub fn invalid_base_version(base_version: u64, current_version: u64) -> Self {
        let message = format!(
            "Operation base version {base_version} is ahead of document version {current_version}; re-join the document."
        );
        Self::from_descriptor(&BAD_REQUEST_DESCRIPTOR, Some(message))
            .with_name("INVALID_BASE_VERSION")
            .with_error_type("INVALID_BASE_VERSION")
            .with_data(json!({
                "baseVersion": base_version,
                "currentVersion": current_version,
            }))
    }

    pub fn doc_not_found(doc_id: &str) -> Self {
        let doc_id = doc_id.to_owned();
        let message = format!("Document {doc_id} not found.");

        Self::from_descriptor(&NOT_FOUND_DESCRIPTOR, Some(message))
            .with_name("DOC_NOT_FOUND")
            .with_data(json!({ "docId": doc_id }))
    }

    pub fn doc_access_denied(doc_id: &str) -> Self {
        let doc_id = doc_id.to_owned();
        let message = format!("You do not have permission to access document {doc_id}.");

        Self::from_descriptor(&FORBIDDEN_DESCRIPTOR, Some(message))
            .with_name("DOC_ACCESS_DENIED")
            .with_error_type("NO_PERMISSION")
            .with_data(json!({ "docId": doc_id }))
    }

    pub fn not_in_document() -> Self {
        Self::from_descriptor(
            &FORBIDDEN_DESCRIPTOR,
            Some("Join a document before performing this action.".to_owned()),
        )
        .with_name("NOT_IN_DOCUMENT")
        .with_error_type("NOT_IN_DOCUMENT")
    }

    pub fn email_already_used(email: &str) -> Self {
        let email = email.to_owned();
        let message = format!("An account already exists for {email}.");

        Self::from_descriptor(&CONFLICT_DESCRIPTOR, Some(message))
            .with_name("EMAIL_ALREADY_USED")
            .with_data(json!({ "email": email }))
    }

    pub fn status(&self) -> StatusCode {
        self.descriptor.status
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn into_payload(self) -> (StatusCode, UserFriendlyPayload) {
        let AppError {
            descriptor,
            name,
            error_type,
            message,
            data,
            source: _,
        } = self;

        let status = descriptor.status;
        let (code, reason) = code_and_reason(status);
        let payload = UserFriendlyPayload {
            status: status.as_u16(),
            code,
            reason,
            error_type,
            name,
            message,
            data,
        };

        (status, payload)
    }

    fn from_descriptor(descriptor: &'static ErrorDescriptor, message: Option<String>) -> Self {
        Self {
            descriptor,
            name: descriptor.name.to_owned(),
            error_type: descriptor.error_type.to_owned(),
            message: message.unwrap_or_else(|| descriptor.default_message.to_owned()),
            data: None,
            source: None,
        }
    }

    fn with_source(mut self, error: AnyError) -> Self {
        self.source = Some(error);
        self
    }

    fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn with_error_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = error_type.into();
        self
    }

    fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => AppError::not_found(format!("Record {id} not found.")),
            StoreError::Conflict(id) => AppError::conflict(format!("Record {id} already exists.")),
            StoreError::Unavailable(reason) => {
                AppError::transient(format!("Document store unavailable: {reason}"))
            }
        }
    }
}

impl From<AccessError> for AppError {
    fn from(error: AccessError) -> Self {
        match error {
            AccessError::NotFound(id) => AppError::doc_not_found(id.as_str()),
            AccessError::Forbidden { id, .. } => AppError::doc_access_denied(id.as_str()),
            AccessError::Store(store) => store.into(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, payload) = self.into_payload();
        (status, Json(payload)).into_response()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserFriendlyPayload {
    pub status: u16,
    pub code: String,
    pub reason: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

fn code_and_reason(status: StatusCode) -> (String, String) {
    let reason = status
        .canonical_reason()
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("Status {}", status.as_u16()));

    let code = reason
        .chars()
        .map(|ch| match ch {
            'a'..='z' => ch.to_ascii_uppercase(),
            'A'..='Z' | '0'..='9' => ch,
            _ => '_',
        })
        .collect::<String>();

    (code, reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn http_error_payload_matches_contract() {
        let response = AppError::bad_request("title must not be empty").into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

        assert_eq!(json["status"], 400);
        assert_eq!(json["code"], "BAD_REQUEST");
        assert_eq!(json["reason"], "Bad Request");
        assert_eq!(json["name"], "BAD_REQUEST");
        assert_eq!(json["message"], "title must not be empty");
        assert!(json.get("data").is_none());
    }

    #[tokio::test]
    async fn doc_not_found_error_includes_domain_metadata() {
        let response = AppError::doc_not_found("doc-456").into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

        assert_eq!(json["status"], 404);
        assert_eq!(json["name"], "DOC_NOT_FOUND");
        assert_eq!(json["type"], "RESOURCE_NOT_FOUND");
        assert_eq!(json["message"], "Document doc-456 not found.");
        assert_eq!(json["data"]["docId"], "doc-456");
    }

    #[tokio::test]
    async fn invalid_base_version_carries_both_versions() {
        let response = AppError::invalid_base_version(12, 10).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

        assert_eq!(json["name"], "INVALID_BASE_VERSION");
        assert_eq!(json["data"]["baseVersion"], 12);
        assert_eq!(json["data"]["currentVersion"], 10);
    }

    #[tokio::test]
    async fn access_denied_uses_forbidden_contract() {
        let response = AppError::doc_access_denied("doc-abc").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

        assert_eq!(json["name"], "DOC_ACCESS_DENIED");
        assert_eq!(json["type"], "NO_PERMISSION");
        assert_eq!(json["data"]["docId"], "doc-abc");
    }

    #[test]
    fn store_errors_map_to_spec_dispositions() {
        let conflict: AppError = StoreError::Conflict("u@x.io".into()).into();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let unavailable: AppError = StoreError::Unavailable("timeout".into()).into();
        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(unavailable.name(), "TRANSIENT_ERROR");
    }
}
