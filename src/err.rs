use std::collections::BTreeMap;
use std::fmt;

use axum::extract::multipart::MultipartError;
use axum::body::Body;
use axum::http::header::ALLOW;
use axum::http::{Request, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

/// Field name -> messages, rendered as the `data` of a validation error.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

pub async fn handler404(path: Uri) -> Error {
    Error::NotFound {
        message: format!("Invalid path: {}", path),
    }
}

/// Rewrites the router's bare 405 into an error envelope, keeping `Allow`.
pub async fn envelope_method_not_allowed(req: Request<Body>, next: Next<Body>) -> Response {
    let method = req.method().clone();
    let response = next.run(req).await;
    if response.status() != StatusCode::METHOD_NOT_ALLOWED {
        return response;
    }

    let allow = response.headers().get(ALLOW).cloned();
    let mut enveloped = Error::MethodNotAllowed {
        message: format!("Method \"{}\" not allowed.", method),
    }
    .into_response();
    if let Some(allow) = allow {
        enveloped.headers_mut().insert(ALLOW, allow);
    }
    enveloped
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Uniform `{status, data}` wrapper for every response body.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<V> {
    pub status: Status,
    pub data: V,
}

impl<V: Serialize> Envelope<V> {
    pub fn success(data: V) -> Self {
        Self {
            status: Status::Success,
            data,
        }
    }
}

impl Envelope<Value> {
    pub fn error(data: Value) -> Self {
        Self {
            status: Status::Error,
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Validation(FieldErrors),
    NotFound { message: String },
    Unauthorized { message: String },
    InvalidPayload { message: String },
    MethodNotAllowed { message: String },
    InternalError { kind: &'static str, message: String },
}

impl Error {
    pub fn item_not_found() -> Error {
        Error::NotFound {
            message: "Item not found".to_string(),
        }
    }

    pub fn unauthorized<S: Into<String>>(msg: S) -> Error {
        Error::Unauthorized {
            message: msg.into(),
        }
    }

    pub fn invalid_payload<S: Into<String>>(msg: S) -> Error {
        Error::InvalidPayload {
            message: msg.into(),
        }
    }

    /// Validation error carrying a single message for a single field.
    pub fn field<F: Into<String>, M: Into<String>>(field: F, message: M) -> Error {
        let mut errors = FieldErrors::new();
        errors.insert(field.into(), vec![message.into()]);
        Error::Validation(errors)
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) | Error::InvalidPayload { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Error::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Error::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The `data` member of the error envelope. Internal errors only expose their kind.
    pub fn data(&self) -> Value {
        match self {
            Error::Validation(errors) => serde_json::to_value(errors).unwrap_or(Value::Null),
            Error::NotFound { message }
            | Error::Unauthorized { message }
            | Error::InvalidPayload { message }
            | Error::MethodNotAllowed { message } => Value::String(message.clone()),
            Error::InternalError { kind, .. } => {
                Value::String(format!("Internal server error ({})", kind))
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(errors) => write!(f, "validation failed: {:?}", errors),
            Error::NotFound { message }
            | Error::Unauthorized { message }
            | Error::InvalidPayload { message }
            | Error::MethodNotAllowed { message } => f.write_str(message),
            Error::InternalError { kind, message } => write!(f, "{}: {}", kind, message),
        }
    }
}

impl std::error::Error for Error {}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        if let Error::InternalError { kind, message } = &self {
            log::error!("{}: {}", kind, message);
        }
        (self.status_code(), Json(Envelope::error(self.data()))).into_response()
    }
}

impl From<std::io::Error> for Error {
    fn from(io: std::io::Error) -> Self {
        Self::InternalError {
            kind: "IOError",
            message: io.to_string(),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::InternalError {
            kind: "DatabaseError",
            message: err.to_string(),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::InternalError {
            kind: "MigrationError",
            message: err.to_string(),
        }
    }
}

impl From<pbkdf2::password_hash::Error> for Error {
    fn from(err: pbkdf2::password_hash::Error) -> Self {
        Self::InternalError {
            kind: "PasswordHashError",
            message: err.to_string(),
        }
    }
}

impl From<MultipartError> for Error {
    fn from(err: MultipartError) -> Self {
        Self::InvalidPayload {
            message: format!("Multipart form parse error - {}", err),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError {
            kind: "Unknown",
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validation_errors_render_as_field_map() {
        let err = Error::field("age", "Age must be greater than 0.");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.data(), json!({"age": ["Age must be greater than 0."]}));
    }

    #[test]
    fn internal_errors_hide_their_message() {
        let err = Error::InternalError {
            kind: "DatabaseError",
            message: "connection refused on 10.0.0.4".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.data(), json!("Internal server error (DatabaseError)"));
    }

    #[test]
    fn envelope_shapes() {
        let ok = serde_json::to_value(Envelope::success(json!({"id": 1}))).unwrap();
        assert_eq!(ok, json!({"status": "success", "data": {"id": 1}}));

        let err = serde_json::to_value(Envelope::error(Error::item_not_found().data())).unwrap();
        assert_eq!(err, json!({"status": "error", "data": "Item not found"}));
    }
}
