//! OCPP-J message framing
//!
//! Implements the OCPP-J (JSON over WebSocket) transport protocol framing
//! used by OCPP 2.0.1:
//!
//! - **Call**       `[2, "<uniqueId>", "<action>", {<payload>}]`
//! - **CallResult** `[3, "<uniqueId>", {<payload>}]`
//! - **CallError**  `[4, "<uniqueId>", "<errorCode>", "<errorDescription>", {<errorDetails>}]`
//!
//! The error codes form a closed set; an unknown code arriving from the
//! wire is a protocol violation, not an extension point.

use serde_json::Value;
use std::fmt;

// ── Message-type constants ─────────────────────────────────────

const MSG_TYPE_CALL: u64 = 2;
const MSG_TYPE_CALL_RESULT: u64 = 3;
const MSG_TYPE_CALL_ERROR: u64 = 4;

/// The uniqueId field is limited to 36 bytes by the OCPP-J spec
/// (a UUID-v4 string exactly fills it).
pub const MAX_UNIQUE_ID_LEN: usize = 36;

// ── Error codes ────────────────────────────────────────────────

/// The fixed OCPP-J CallError code set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcppErrorCode {
    NotImplemented,
    NotSupported,
    InternalError,
    ProtocolError,
    SecurityError,
    FormationViolation,
    PropertyConstraintViolation,
    OccurrenceConstraintViolation,
    TypeConstraintViolation,
    GenericError,
}

impl OcppErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotImplemented => "NotImplemented",
            Self::NotSupported => "NotSupported",
            Self::InternalError => "InternalError",
            Self::ProtocolError => "ProtocolError",
            Self::SecurityError => "SecurityError",
            Self::FormationViolation => "FormationViolation",
            Self::PropertyConstraintViolation => "PropertyConstraintViolation",
            Self::OccurrenceConstraintViolation => "OccurrenceConstraintViolation",
            Self::TypeConstraintViolation => "TypeConstraintViolation",
            Self::GenericError => "GenericError",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NotImplemented" => Some(Self::NotImplemented),
            "NotSupported" => Some(Self::NotSupported),
            "InternalError" => Some(Self::InternalError),
            "ProtocolError" => Some(Self::ProtocolError),
            "SecurityError" => Some(Self::SecurityError),
            "FormationViolation" => Some(Self::FormationViolation),
            "PropertyConstraintViolation" => Some(Self::PropertyConstraintViolation),
            "OccurrenceConstraintViolation" => Some(Self::OccurrenceConstraintViolation),
            "TypeConstraintViolation" => Some(Self::TypeConstraintViolation),
            "GenericError" => Some(Self::GenericError),
            _ => None,
        }
    }
}

impl fmt::Display for OcppErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── OcppFrame ──────────────────────────────────────────────────

/// A parsed OCPP-J frame (transport envelope).
#[derive(Debug, Clone)]
pub enum OcppFrame {
    /// `[2, uniqueId, action, payload]`
    Call {
        unique_id: String,
        action: String,
        payload: Value,
    },
    /// `[3, uniqueId, payload]`
    CallResult {
        unique_id: String,
        payload: Value,
    },
    /// `[4, uniqueId, errorCode, errorDescription, errorDetails]`
    CallError {
        unique_id: String,
        error_code: OcppErrorCode,
        error_description: String,
        error_details: Value,
    },
}

impl OcppFrame {
    // ── Construction ───────────────────────────────────────

    /// Create a `CallResult` response for a given unique ID.
    pub fn result_response(unique_id: impl Into<String>, payload: Value) -> Self {
        Self::CallResult {
            unique_id: unique_id.into(),
            payload,
        }
    }

    /// Create a `CallError` response for a given unique ID.
    pub fn error_response(
        unique_id: impl Into<String>,
        error_code: OcppErrorCode,
        error_description: impl Into<String>,
    ) -> Self {
        Self::CallError {
            unique_id: unique_id.into(),
            error_code,
            error_description: error_description.into(),
            error_details: Value::Object(Default::default()),
        }
    }

    // ── Parsing ────────────────────────────────────────────

    /// Parse a raw JSON text into an `OcppFrame`.
    pub fn parse(text: &str) -> Result<Self, OcppFrameError> {
        let arr: Vec<Value> =
            serde_json::from_str(text).map_err(|e| OcppFrameError::InvalidJson(e.to_string()))?;

        if arr.is_empty() {
            return Err(OcppFrameError::EmptyArray);
        }

        let msg_type = arr[0]
            .as_u64()
            .ok_or(OcppFrameError::InvalidMessageType)?;

        match msg_type {
            MSG_TYPE_CALL => Self::parse_call(&arr),
            MSG_TYPE_CALL_RESULT => Self::parse_call_result(&arr),
            MSG_TYPE_CALL_ERROR => Self::parse_call_error(&arr),
            _ => Err(OcppFrameError::UnknownMessageType(msg_type)),
        }
    }

    fn parse_unique_id(arr: &[Value]) -> Result<String, OcppFrameError> {
        let unique_id = arr[1]
            .as_str()
            .ok_or(OcppFrameError::FieldTypeMismatch("uniqueId must be a string"))?;
        if unique_id.len() > MAX_UNIQUE_ID_LEN {
            return Err(OcppFrameError::UniqueIdTooLong(unique_id.len()));
        }
        Ok(unique_id.to_string())
    }

    fn parse_call(arr: &[Value]) -> Result<Self, OcppFrameError> {
        if arr.len() < 4 {
            return Err(OcppFrameError::MissingFields {
                expected: 4,
                got: arr.len(),
            });
        }

        let unique_id = Self::parse_unique_id(arr)?;
        let action = arr[2]
            .as_str()
            .ok_or(OcppFrameError::FieldTypeMismatch("action must be a string"))?
            .to_string();
        let payload = arr[3].clone();

        Ok(Self::Call {
            unique_id,
            action,
            payload,
        })
    }

    fn parse_call_result(arr: &[Value]) -> Result<Self, OcppFrameError> {
        if arr.len() < 3 {
            return Err(OcppFrameError::MissingFields {
                expected: 3,
                got: arr.len(),
            });
        }

        let unique_id = Self::parse_unique_id(arr)?;
        let payload = arr[2].clone();

        Ok(Self::CallResult { unique_id, payload })
    }

    fn parse_call_error(arr: &[Value]) -> Result<Self, OcppFrameError> {
        if arr.len() < 4 {
            return Err(OcppFrameError::MissingFields {
                expected: 4,
                got: arr.len(),
            });
        }

        let unique_id = Self::parse_unique_id(arr)?;
        let code_str = arr[2]
            .as_str()
            .ok_or(OcppFrameError::FieldTypeMismatch("errorCode must be a string"))?;
        let error_code = OcppErrorCode::parse(code_str)
            .ok_or_else(|| OcppFrameError::UnknownErrorCode(code_str.to_string()))?;
        let error_description = arr
            .get(3)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let error_details = arr
            .get(4)
            .cloned()
            .unwrap_or(Value::Object(Default::default()));

        Ok(Self::CallError {
            unique_id,
            error_code,
            error_description,
            error_details,
        })
    }

    // ── Serialization ──────────────────────────────────────

    /// Serialize this frame to a JSON string.
    pub fn serialize(&self) -> String {
        let arr: Value = match self {
            Self::Call {
                unique_id,
                action,
                payload,
            } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL.into()),
                Value::String(unique_id.clone()),
                Value::String(action.clone()),
                payload.clone(),
            ]),

            Self::CallResult { unique_id, payload } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL_RESULT.into()),
                Value::String(unique_id.clone()),
                payload.clone(),
            ]),

            Self::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL_ERROR.into()),
                Value::String(unique_id.clone()),
                Value::String(error_code.as_str().to_string()),
                Value::String(error_description.clone()),
                error_details.clone(),
            ]),
        };

        // serde_json::to_string on a Value never fails
        serde_json::to_string(&arr).unwrap()
    }

    // ── Helpers ────────────────────────────────────────────

    /// Get the unique message ID.
    pub fn unique_id(&self) -> &str {
        match self {
            Self::Call { unique_id, .. }
            | Self::CallResult { unique_id, .. }
            | Self::CallError { unique_id, .. } => unique_id,
        }
    }
}

// ── Errors ─────────────────────────────────────────────────────

/// Errors that can occur when parsing an OCPP-J frame.
#[derive(Debug)]
pub enum OcppFrameError {
    InvalidJson(String),
    EmptyArray,
    InvalidMessageType,
    UnknownMessageType(u64),
    UnknownErrorCode(String),
    UniqueIdTooLong(usize),
    MissingFields { expected: usize, got: usize },
    FieldTypeMismatch(&'static str),
}

impl OcppFrameError {
    /// Classify a parse failure for the reply sent back to the CSMS.
    /// Unknown message types map to `NotSupported`; everything else is
    /// a malformed frame.
    pub fn error_code(&self) -> OcppErrorCode {
        match self {
            Self::UnknownMessageType(_) => OcppErrorCode::NotSupported,
            _ => OcppErrorCode::FormationViolation,
        }
    }
}

impl fmt::Display for OcppFrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidJson(msg) => write!(f, "Invalid JSON: {}", msg),
            Self::EmptyArray => write!(f, "Empty OCPP message array"),
            Self::InvalidMessageType => write!(f, "Message type is not a number"),
            Self::UnknownMessageType(t) => write!(f, "Unknown message type: {}", t),
            Self::UnknownErrorCode(c) => write!(f, "Unknown CallError code: {}", c),
            Self::UniqueIdTooLong(n) => {
                write!(f, "uniqueId exceeds {} bytes (got {})", MAX_UNIQUE_ID_LEN, n)
            }
            Self::MissingFields { expected, got } => {
                write!(f, "Expected at least {} fields, got {}", expected, got)
            }
            Self::FieldTypeMismatch(msg) => write!(f, "Field type mismatch: {}", msg),
        }
    }
}

impl std::error::Error for OcppFrameError {}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn parse_call() {
        let text = r#"[2,"abc123","BootNotification",{"reason":"PowerUp"}]"#;
        let frame = OcppFrame::parse(text).unwrap();
        match frame {
            OcppFrame::Call {
                unique_id,
                action,
                payload,
            } => {
                assert_eq!(unique_id, "abc123");
                assert_eq!(action, "BootNotification");
                assert_eq!(payload["reason"], "PowerUp");
            }
            _ => panic!("Expected Call frame"),
        }
    }

    #[test]
    fn parse_call_result() {
        let text = r#"[3,"abc123",{"status":"Accepted","currentTime":"2025-01-01T00:00:00Z","interval":30}]"#;
        let frame = OcppFrame::parse(text).unwrap();
        match frame {
            OcppFrame::CallResult { unique_id, payload } => {
                assert_eq!(unique_id, "abc123");
                assert_eq!(payload["status"], "Accepted");
            }
            _ => panic!("Expected CallResult frame"),
        }
    }

    #[test]
    fn parse_call_error() {
        let text = r#"[4,"abc123","NotImplemented","Action not supported",{}]"#;
        let frame = OcppFrame::parse(text).unwrap();
        match frame {
            OcppFrame::CallError {
                unique_id,
                error_code,
                error_description,
                ..
            } => {
                assert_eq!(unique_id, "abc123");
                assert_eq!(error_code, OcppErrorCode::NotImplemented);
                assert_eq!(error_description, "Action not supported");
            }
            _ => panic!("Expected CallError frame"),
        }
    }

    #[test]
    fn unknown_error_code_is_rejected() {
        let text = r#"[4,"abc123","VendorSpecificError","boom",{}]"#;
        let err = OcppFrame::parse(text).unwrap_err();
        assert!(matches!(err, OcppFrameError::UnknownErrorCode(_)));
    }

    #[test]
    fn unknown_message_type_maps_to_not_supported() {
        let err = OcppFrame::parse(r#"[7,"id",{}]"#).unwrap_err();
        assert_eq!(err.error_code(), OcppErrorCode::NotSupported);
    }

    #[test]
    fn overlong_unique_id_is_rejected() {
        let long_id = "x".repeat(MAX_UNIQUE_ID_LEN + 1);
        let text = format!(r#"[3,"{}",{{}}]"#, long_id);
        let err = OcppFrame::parse(&text).unwrap_err();
        assert!(matches!(err, OcppFrameError::UniqueIdTooLong(_)));
        assert_eq!(err.error_code(), OcppErrorCode::FormationViolation);
    }

    #[test]
    fn roundtrip_call() {
        let frame = OcppFrame::Call {
            unique_id: Uuid::new_v4().to_string(),
            action: "Heartbeat".into(),
            payload: serde_json::json!({}),
        };
        let id = frame.unique_id().to_string();
        // A UUID-v4 string exactly fills the uniqueId limit.
        assert_eq!(id.len(), MAX_UNIQUE_ID_LEN);

        let parsed = OcppFrame::parse(&frame.serialize()).unwrap();
        assert!(matches!(parsed, OcppFrame::Call { .. }));
        assert_eq!(parsed.unique_id(), id);
    }

    #[test]
    fn roundtrip_call_error() {
        let frame = OcppFrame::error_response("id3", OcppErrorCode::GenericError, "Something went wrong");
        let json = frame.serialize();
        let parsed = OcppFrame::parse(&json).unwrap();
        assert_eq!(parsed.unique_id(), "id3");
        match parsed {
            OcppFrame::CallError { error_code, .. } => {
                assert_eq!(error_code, OcppErrorCode::GenericError)
            }
            _ => panic!("Expected CallError frame"),
        }
    }
}
