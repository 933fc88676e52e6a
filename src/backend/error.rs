use std::error::Error;
use std::fmt;

use crate::backend::BackendKind;

/// Rejected configuration. The factory never returns an adapter alongside
/// one of these; construction either succeeds fully or not at all.
#[derive(Debug)]
pub enum ConfigurationError {
    /// A field required by the selected backend kind is absent or empty.
    MissingField {
        kind: BackendKind,
        field: &'static str,
    },
    /// The backend name does not match any known kind.
    UnknownBackend(String),
    /// The named model could not be verified, pulled, or loaded.
    ModelUnavailable { model: String, reason: String },
    /// The backend kind exists but this build cannot construct it.
    UnsupportedBackend {
        kind: BackendKind,
        reason: String,
    },
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::MissingField { kind, field } => {
                write!(
                    f,
                    "{} backend requires the `{}` option",
                    kind.display_name(),
                    field
                )
            }
            ConfigurationError::UnknownBackend(name) => {
                write!(
                    f,
                    "unknown backend '{name}' (expected one of: openai, gemini, local, ollama)"
                )
            }
            ConfigurationError::ModelUnavailable { model, reason } => {
                write!(f, "model '{model}' is unavailable: {reason}")
            }
            ConfigurationError::UnsupportedBackend { kind, reason } => {
                write!(f, "{} backend is unavailable: {reason}", kind.display_name())
            }
        }
    }
}

impl Error for ConfigurationError {}

/// Failure of a single `generate` call. A failed turn does not invalidate
/// the adapter; the next call starts fresh.
#[derive(Debug)]
pub enum BackendError {
    /// The request never produced a usable response (connect, TLS, I/O).
    Request(String),
    /// The provider rejected the call; the message is already formatted
    /// for display.
    Api(String),
    /// The streamed body could not be decoded.
    Stream(String),
    /// The in-process inference engine failed.
    Engine(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Request(e) => write!(f, "request failed: {e}"),
            BackendError::Api(e) => write!(f, "{e}"),
            BackendError::Stream(e) => write!(f, "malformed streaming response: {e}"),
            BackendError::Engine(e) => write!(f, "local inference failed: {e}"),
        }
    }
}

impl Error for BackendError {}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                serde_json::Value::Object(map) => map
                    .get("message")
                    .and_then(|message| message.as_str().map(str::to_owned)),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.trim().to_string()
    })
}

/// Format a raw provider error body for display: JSON bodies are
/// pretty-printed with a one-line summary when one can be extracted.
pub(crate) fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API Error:\n```\n<empty>\n```".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Ok(pretty_json) = serde_json::to_string_pretty(&json_value) {
            if let Some(summary) = extract_error_summary(&json_value) {
                if !summary.is_empty() {
                    return format!("API Error: {}\n```json\n{}\n```", summary, pretty_json);
                }
            }
            return format!("API Error:\n```json\n{}\n```", pretty_json);
        }
    }

    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        format!("API Error:\n```xml\n{}\n```", trimmed)
    } else {
        format!("API Error:\n```\n{}\n```", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_api_error_prettifies_json_with_summary() {
        let raw = r#"{"error":{"message":"model overloaded","type":"invalid_request_error"}}"#;
        let formatted = format_api_error(raw);

        let expected = r#"API Error: model overloaded
```json
{
  "error": {
    "message": "model overloaded",
    "type": "invalid_request_error"
  }
}
```"#;
        assert_eq!(formatted, expected);
    }

    #[test]
    fn format_api_error_handles_json_without_summary() {
        let raw = r#"{"status":"failed"}"#;
        let formatted = format_api_error(raw);

        let expected = r#"API Error:
```json
{
  "status": "failed"
}
```"#;
        assert_eq!(formatted, expected);
    }

    #[test]
    fn format_api_error_handles_xml_and_plaintext() {
        let xml = "<error>bad</error>";
        let plain = "api failure";

        assert_eq!(
            format_api_error(xml),
            "API Error:\n```xml\n<error>bad</error>\n```"
        );
        assert_eq!(format_api_error(plain), "API Error:\n```\napi failure\n```");
    }

    #[test]
    fn configuration_errors_name_the_offending_option() {
        let err = ConfigurationError::MissingField {
            kind: BackendKind::OpenAi,
            field: "api_key",
        };
        assert!(err.to_string().contains("api_key"));

        let err = ConfigurationError::UnknownBackend("claude".to_string());
        assert!(err.to_string().contains("claude"));
    }
}
