//! Response envelope shared by the proxy and its clients.
//!
//! The spreadsheet script answers with JSON most of the time, but on some
//! success paths it returns an HTML redirect page instead. Every response,
//! upstream or proxy, goes through [`decode_body`] / [`decode`] so callers
//! deal with exactly one shape: `Ok(value)` or `Err(reason)`.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::CafeError;

const SYNTHESIZED_SUCCESS_MESSAGE: &str = "Request accepted by upstream";
const BODY_PREVIEW_CHARS: usize = 120;

/// `{ success, data?, error?, message? }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Envelope {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            message: None,
        }
    }

    pub fn accepted(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            error: None,
            message: Some(message.into()),
        }
    }

    /// Rows of a read envelope. A missing or non-array `data` yields no rows.
    pub fn rows(&self) -> Vec<Vec<Value>> {
        match &self.data {
            Some(Value::Array(rows)) => rows
                .iter()
                .filter_map(|row| row.as_array().cloned())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Which side of the contract a response belongs to. Only writes get the
/// HTML-on-success leniency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

fn preview(body: &str) -> String {
    let trimmed = body.trim();
    let mut out: String = trimmed.chars().take(BODY_PREVIEW_CHARS).collect();
    if trimmed.chars().count() > BODY_PREVIEW_CHARS {
        out.push('…');
    }
    out
}

/// Decode a raw HTTP response into its JSON value without interpreting the
/// `success` flag.
///
/// - non-2xx status: [`CafeError::Transport`]
/// - unparsable body on a write with HTTP 200: a synthesized success envelope
/// - unparsable body otherwise: [`CafeError::Decode`]
pub fn decode_body(status: StatusCode, body: &str, access: Access) -> Result<Value, CafeError> {
    if !status.is_success() {
        return Err(CafeError::Transport(format!(
            "HTTP error! status: {}",
            status.as_u16()
        )));
    }

    match serde_json::from_str::<Value>(body) {
        Ok(value) => Ok(value),
        Err(e) => {
            if access == Access::Write && status == StatusCode::OK {
                debug!(
                    body = %preview(body),
                    "non-JSON 200 on write path, treating as success"
                );
                let synthesized = Envelope::accepted(SYNTHESIZED_SUCCESS_MESSAGE);
                return Ok(serde_json::to_value(synthesized)?);
            }
            warn!(body = %preview(body), error = %e, "response body is not JSON");
            Err(CafeError::Decode(format!("invalid JSON body: {e}")))
        }
    }
}

/// Decode a response into an [`Envelope`] and fold `success: false` into
/// [`CafeError::Backend`] carrying the backend's message verbatim.
pub fn decode(status: StatusCode, body: &str, access: Access) -> Result<Envelope, CafeError> {
    let value = decode_body(status, body, access)?;
    let envelope: Envelope = serde_json::from_value(value)
        .map_err(|e| CafeError::Decode(format!("not a response envelope: {e}")))?;

    if !envelope.success {
        let message = envelope
            .error
            .clone()
            .or_else(|| envelope.message.clone())
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(CafeError::Backend(message));
    }
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REDIRECT_HTML: &str =
        "<HTML><HEAD><TITLE>Moved Temporarily</TITLE></HEAD><BODY>The document has moved</BODY></HTML>";

    #[test]
    fn test_success_envelope_with_rows() {
        let body = r#"{"success":true,"data":[["Latte",450,true,"ソフトドリンク",""]]}"#;
        let env = decode(StatusCode::OK, body, Access::Read).unwrap();
        assert!(env.success);
        assert_eq!(env.rows().len(), 1);
        assert_eq!(env.rows()[0][0], "Latte");
    }

    #[test]
    fn test_backend_failure_carries_message() {
        let body = r#"{"success":false,"error":"X"}"#;
        let err = decode(StatusCode::OK, body, Access::Read).unwrap_err();
        assert_eq!(err, CafeError::Backend("X".into()));
    }

    #[test]
    fn test_backend_failure_without_message() {
        let err = decode(StatusCode::OK, r#"{"success":false}"#, Access::Write).unwrap_err();
        assert_eq!(err, CafeError::Backend("Unknown error".into()));
    }

    #[test]
    fn test_non_2xx_is_transport() {
        let err = decode(StatusCode::BAD_GATEWAY, "{}", Access::Read).unwrap_err();
        assert!(matches!(err, CafeError::Transport(ref m) if m.contains("502")));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_html_on_write_200_is_success() {
        let env = decode(StatusCode::OK, REDIRECT_HTML, Access::Write).unwrap();
        assert!(env.success);
        assert!(env.message.is_some());
    }

    #[test]
    fn test_html_on_read_is_decode_error() {
        let err = decode(StatusCode::OK, REDIRECT_HTML, Access::Read).unwrap_err();
        assert!(matches!(err, CafeError::Decode(_)));
    }

    #[test]
    fn test_html_on_write_201_is_not_lenient() {
        let err = decode(StatusCode::CREATED, REDIRECT_HTML, Access::Write).unwrap_err();
        assert!(matches!(err, CafeError::Decode(_)));
    }

    #[test]
    fn test_json_without_success_flag_is_decode_error() {
        let err = decode(StatusCode::OK, r#"{"data":[]}"#, Access::Read).unwrap_err();
        assert!(matches!(err, CafeError::Decode(_)));
    }

    #[test]
    fn test_rows_ignores_non_array_data() {
        let env = decode(
            StatusCode::OK,
            r#"{"success":true,"data":"nothing"}"#,
            Access::Read,
        )
        .unwrap();
        assert!(env.rows().is_empty());
    }

    #[test]
    fn test_decode_body_passes_failure_envelope_through() {
        let value = decode_body(
            StatusCode::OK,
            r#"{"success":false,"error":"Invalid action"}"#,
            Access::Read,
        )
        .unwrap();
        assert_eq!(value["error"], "Invalid action");
    }
}
