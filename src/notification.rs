//! Render → control notifications.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Notification {
    /// Engine constructed; commands are now applied.
    Ready,
    /// Engine construction failed. Sent once; the processor stays failed.
    Error { reason: String },
    /// A parameter the control surface displays was applied.
    Ack {
        key: &'static str,
        value: Value,
        timestamp: u64,
    },
    /// Protocol mismatch: an unknown kind or a payload that failed validation.
    Warning {
        message: String,
        #[serde(rename = "originalType")]
        original_type: String,
        timestamp: u64,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Ready => "ready",
            Notification::Error { .. } => "error",
            Notification::Ack { .. } => "ack",
            Notification::Warning { .. } => "warning",
        }
    }

    pub fn unknown_kind(kind: &str, timestamp: u64) -> Self {
        Notification::Warning {
            message: format!("Unknown parameter type: {kind}"),
            original_type: kind.to_string(),
            timestamp,
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Milliseconds since the Unix epoch, from the host clock.
#[cfg(target_arch = "wasm32")]
pub fn now_millis() -> u64 {
    js_sys::Date::now() as u64
}

/// Milliseconds since the Unix epoch, from the host clock.
#[cfg(not(target_arch = "wasm32"))]
pub fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
