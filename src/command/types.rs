//! Saved command definitions.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::framing::FramingConfig;
use crate::identifiers::CommandId;
use crate::validation::ValidationConfig;

// ============================================================================
// Enums
// ============================================================================

/// How a command payload is turned into bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayloadFormat {
    /// UTF-8 text.
    #[default]
    Text,
    /// Whitespace-separated hex bytes, e.g. `01 03 00 00`.
    Hex,
}

/// Line ending appended to text payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LineEnding {
    /// Nothing appended.
    #[default]
    None,
    /// `\n`
    Lf,
    /// `\r`
    Cr,
    /// `\r\n`
    CrLf,
}

impl LineEnding {
    /// Returns the bytes appended.
    #[inline]
    #[must_use]
    pub const fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::None => b"",
            Self::Lf => b"\n",
            Self::Cr => b"\r",
            Self::CrLf => b"\r\n",
        }
    }
}

// ============================================================================
// CommandParameter
// ============================================================================

/// A `{{name}}` placeholder declared by a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandParameter {
    /// Placeholder name.
    pub name: String,
    /// Value used when the caller supplies none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

// ============================================================================
// Command
// ============================================================================

/// A saved command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    /// Catalog key.
    pub id: CommandId,
    /// Display name, used in logs and expectations.
    pub name: String,
    /// Payload template.
    pub payload: String,
    /// Payload encoding.
    #[serde(default)]
    pub format: PayloadFormat,
    /// Line ending for text payloads.
    #[serde(default)]
    pub line_ending: LineEnding,
    /// Declared placeholders.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<CommandParameter>,
    /// Pre-send script name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_send_script: Option<String>,
    /// Expected reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationConfig>,
    /// Reply deadline. Takes precedence over the validation's own timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Framing in effect while this command awaits its reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framing_override: Option<FramingConfig>,
}

impl Command {
    /// Creates a text command.
    #[must_use]
    pub fn text(id: impl Into<CommandId>, name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            payload: payload.into(),
            format: PayloadFormat::Text,
            line_ending: LineEnding::None,
            parameters: Vec::new(),
            pre_send_script: None,
            validation: None,
            timeout_ms: None,
            framing_override: None,
        }
    }

    /// Creates a hex command.
    #[must_use]
    pub fn hex(id: impl Into<CommandId>, name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            format: PayloadFormat::Hex,
            ..Self::text(id, name, payload)
        }
    }

    /// Sets the line ending.
    #[must_use]
    pub fn with_line_ending(mut self, line_ending: LineEnding) -> Self {
        self.line_ending = line_ending;
        self
    }

    /// Declares a placeholder with an optional default.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, default: Option<Value>) -> Self {
        self.parameters.push(CommandParameter {
            name: name.into(),
            default,
        });
        self
    }

    /// Sets the pre-send script.
    #[must_use]
    pub fn with_pre_send(mut self, script: impl Into<String>) -> Self {
        self.pre_send_script = Some(script.into());
        self
    }

    /// Sets the expected reply.
    #[must_use]
    pub fn with_validation(mut self, validation: ValidationConfig) -> Self {
        self.validation = Some(validation);
        self
    }

    /// Sets the reply deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Sets the framing override.
    #[must_use]
    pub fn with_framing_override(mut self, framing: FramingConfig) -> Self {
        self.framing_override = Some(framing);
        self
    }

    /// Validation config with the command timeout applied.
    #[must_use]
    pub fn effective_validation(&self) -> Option<ValidationConfig> {
        let mut validation = self.validation.clone()?;
        if let Some(timeout_ms) = self.timeout_ms {
            validation.timeout_ms = Some(timeout_ms);
        }
        Some(validation)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_command_timeout_wins() {
        let command = Command::text("csq", "Signal", "AT+CSQ")
            .with_validation(ValidationConfig::contains("OK").with_timeout(500))
            .with_timeout(2000);
        assert_eq!(command.effective_validation().unwrap().timeout_ms, Some(2000));

        let command = Command::text("csq", "Signal", "AT+CSQ")
            .with_validation(ValidationConfig::contains("OK").with_timeout(500));
        assert_eq!(command.effective_validation().unwrap().timeout_ms, Some(500));

        assert!(Command::text("x", "x", "x").effective_validation().is_none());
    }

    #[test]
    fn test_deserialize_minimal() {
        let command: Command = serde_json::from_value(json!({
            "id": "reset",
            "name": "Reset",
            "payload": "ATZ",
            "lineEnding": "CRLF"
        }))
        .unwrap();
        assert_eq!(command.format, PayloadFormat::Text);
        assert_eq!(command.line_ending, LineEnding::CrLf);
        assert!(command.validation.is_none());
    }

    #[test]
    fn test_line_ending_bytes() {
        assert_eq!(LineEnding::None.as_bytes(), b"");
        assert_eq!(LineEnding::CrLf.as_bytes(), b"\r\n");
    }
}
