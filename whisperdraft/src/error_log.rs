//! Structured error reporting.
//!
//! Every logged failure carries a type, a severity tier and the component /
//! action it came from. Records go through `tracing`; severity picks the
//! level.

use serde::Serialize;
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Validation,
    Storage,
    Network,
    AiService,
    Initialization,
    Unknown,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Storage => "storage",
            Self::Network => "network",
            Self::AiService => "ai_service",
            Self::Initialization => "initialization",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorContext {
    pub component: &'static str,
    pub action: String,
    pub timestamp_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional: Option<serde_json::Value>,
}

impl ErrorContext {
    pub fn new(component: &'static str, action: impl Into<String>) -> Self {
        Self {
            component,
            action: action.into(),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            additional: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.additional = Some(data);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetails {
    pub error_type: ErrorType,
    pub severity: ErrorSeverity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    pub context: ErrorContext,
}

pub fn log_error(details: &ErrorDetails) {
    let additional = details
        .context
        .additional
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    let cause = details.cause.as_deref().unwrap_or("");

    macro_rules! emit {
        ($level:ident) => {
            tracing::$level!(
                error_type = details.error_type.as_str(),
                severity = details.severity.as_str(),
                critical = details.severity == ErrorSeverity::Critical,
                component = details.context.component,
                action = %details.context.action,
                timestamp_ms = details.context.timestamp_ms,
                cause,
                additional = %additional,
                "{}",
                details.message
            )
        };
    }

    match details.severity {
        ErrorSeverity::Info => emit!(info),
        ErrorSeverity::Warning => emit!(warn),
        ErrorSeverity::Error | ErrorSeverity::Critical => emit!(error),
    }
}

pub fn log_storage_error(message: &str, action: &str, error: &dyn Display, key: &str) {
    log_error(&ErrorDetails {
        error_type: ErrorType::Storage,
        severity: ErrorSeverity::Error,
        message: message.to_string(),
        cause: Some(error.to_string()),
        context: ErrorContext::new("storage", action)
            .with_data(serde_json::json!({ "key": key })),
    });
}

pub fn log_completion_error(
    message: &str,
    action: &str,
    error: &dyn Display,
    data: Option<serde_json::Value>,
) {
    let mut context = ErrorContext::new("completion", action);
    context.additional = data;
    log_error(&ErrorDetails {
        error_type: ErrorType::AiService,
        severity: ErrorSeverity::Error,
        message: message.to_string(),
        cause: Some(error.to_string()),
        context,
    });
}

pub fn log_network_error(message: &str, action: &str, error: &dyn Display) {
    log_error(&ErrorDetails {
        error_type: ErrorType::Network,
        severity: ErrorSeverity::Warning,
        message: message.to_string(),
        cause: Some(error.to_string()),
        context: ErrorContext::new("completion", action),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_tiers_are_ordered() {
        assert!(ErrorSeverity::Info < ErrorSeverity::Warning);
        assert!(ErrorSeverity::Warning < ErrorSeverity::Error);
        assert!(ErrorSeverity::Error < ErrorSeverity::Critical);
    }

    #[test]
    fn test_details_serialize_with_context() {
        let details = ErrorDetails {
            error_type: ErrorType::AiService,
            severity: ErrorSeverity::Critical,
            message: "provider down".to_string(),
            cause: None,
            context: ErrorContext::new("conversation", "process_new_diff")
                .with_data(serde_json::json!({"diff_id": "d1"})),
        };

        let value = serde_json::to_value(&details).unwrap();
        assert_eq!(value["error_type"], "ai_service");
        assert_eq!(value["severity"], "critical");
        assert_eq!(value["context"]["component"], "conversation");
        assert_eq!(value["context"]["additional"]["diff_id"], "d1");
        assert!(value.get("cause").is_none());
        assert!(value["context"]["timestamp_ms"].as_i64().unwrap() > 0);

        // Logging must not panic regardless of subscriber state.
        log_error(&details);
    }
}
