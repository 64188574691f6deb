//! Error types shared across the client.
//!
//! None of these are fatal: pages turn them into inline text or toasts.

use serde_json::Value;
use thiserror::Error;

/// Failure talking to the REST backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// 401.
    #[error("not signed in")]
    Unauthorized,

    /// 403.
    #[error("not permitted")]
    Forbidden,

    /// 422, already flattened into user-facing text.
    #[error("{0}")]
    Validation(String),

    /// Any other non-2xx status.
    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    /// 2xx with a body we could not understand.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Maps a non-success status and its body onto the taxonomy.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            422 => Self::Validation(validation_message(body)),
            _ => Self::Status {
                status,
                message: detail_text(body).unwrap_or_else(|| "no details".to_string()),
            },
        }
    }

    /// Both 401 and 403 are "normal" states rather than failures.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized | Self::Forbidden)
    }
}

/// Flattens a 422 body into one line of user-facing text.
///
/// Accepts `{"detail": [{"loc": [...], "msg": "..."}]}`, `{"detail": "..."}`
/// and `{"message": "..."}`.
pub fn validation_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return "invalid input".to_string();
    };

    if let Some(items) = value.get("detail").and_then(Value::as_array) {
        let parts: Vec<String> = items.iter().filter_map(field_error).collect();
        if !parts.is_empty() {
            return parts.join("; ");
        }
    }

    detail_text(body).unwrap_or_else(|| "invalid input".to_string())
}

fn field_error(item: &Value) -> Option<String> {
    let msg = item.get("msg").and_then(Value::as_str)?;
    let field = item
        .get("loc")
        .and_then(Value::as_array)
        .and_then(|loc| {
            loc.iter()
                .rev()
                .find_map(|p| p.as_str().filter(|s| *s != "body"))
        });
    Some(match field {
        Some(field) => format!("{field}: {msg}"),
        None => msg.to_string(),
    })
}

fn detail_text(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["detail", "message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Client-side rejection of a file before anything is sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("the selected file is empty")]
    Empty,

    #[error("{file_name} is not an image")]
    NotAnImage { file_name: String },

    #[error("{file_name} is {size} bytes; the limit is {limit} bytes")]
    TooLarge {
        file_name: String,
        size: usize,
        limit: usize,
    },

    #[error("unsupported file type .{extension}; expected one of {allowed}")]
    UnsupportedExtension { extension: String, allowed: String },
}

/// Upload flows fail either locally or at the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadFlowError {
    #[error(transparent)]
    Rejected(#[from] UploadError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Why the viewer could not show a model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewerError {
    #[error("no model URL provided")]
    MissingUrl,

    #[error("unsupported model format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to download model: {0}")]
    Download(String),

    #[error("failed to parse {format}: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },

    #[error("{format} file contains no triangles")]
    EmptyMesh { format: &'static str },

    #[error("graphics error: {0}")]
    Gpu(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(401, ApiError::Unauthorized)]
    #[case(403, ApiError::Forbidden)]
    fn auth_statuses_are_recognised(#[case] status: u16, #[case] expected: ApiError) {
        let err = ApiError::from_status(status, "");
        assert_eq!(err, expected);
        assert!(err.is_auth());
    }

    #[test]
    fn fastapi_detail_list_is_flattened() {
        let body = r#"{"detail":[
            {"loc":["body","email"],"msg":"value is not a valid email address","type":"value_error"},
            {"loc":["body","password"],"msg":"too short"}
        ]}"#;
        assert_eq!(
            validation_message(body),
            "email: value is not a valid email address; password: too short"
        );
    }

    #[rstest]
    #[case(r#"{"detail":"Email already registered"}"#, "Email already registered")]
    #[case(r#"{"message":"bad username"}"#, "bad username")]
    #[case("<html>", "invalid input")]
    #[case(r#"{"detail":[]}"#, "invalid input")]
    fn other_validation_shapes(#[case] body: &str, #[case] expected: &str) {
        assert_eq!(validation_message(body), expected);
    }

    #[test]
    fn other_statuses_keep_detail() {
        let err = ApiError::from_status(500, r#"{"detail":"boom"}"#);
        assert_eq!(
            err,
            ApiError::Status {
                status: 500,
                message: "boom".into()
            }
        );
        assert!(!err.is_auth());
    }

    #[test]
    fn viewer_messages_are_format_specific() {
        let err = ViewerError::Parse {
            format: "STL",
            message: "truncated".into(),
        };
        assert_eq!(err.to_string(), "failed to parse STL: truncated");
        assert_eq!(ViewerError::MissingUrl.to_string(), "no model URL provided");
    }
}
