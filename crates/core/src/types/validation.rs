use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Validation Types
// =============================================================================

/// Kind of rule an input failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Violation {
    /// Payload exceeds the configured size limit.
    TooLarge,
    /// Payload is empty or whitespace-only.
    Empty,
    /// Value exceeds the configured length limit.
    TooLong,
    /// Path contains a parent-directory segment.
    PathTraversal,
    /// Path points into a protected system directory.
    ForbiddenPath,
    /// Value contains a forbidden character (e.g. NUL).
    InvalidCharacter,
    /// Content contains a credential-shaped literal.
    SecretDetected,
    /// Code matched a dangerous pattern while strict mode is on.
    DangerousPattern,
    /// Package list is empty.
    EmptyList,
    /// Package list exceeds the configured cap.
    TooMany,
    /// A package name is blank.
    EmptyName,
    /// A package name does not fit the ecosystem's naming grammar.
    InvalidFormat,
    /// A package name matches the blocklist.
    SuspiciousName,
}

impl Violation {
    /// Stable machine-readable code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TooLarge => "too_large",
            Self::Empty => "empty",
            Self::TooLong => "too_long",
            Self::PathTraversal => "path_traversal",
            Self::ForbiddenPath => "forbidden_path",
            Self::InvalidCharacter => "invalid_character",
            Self::SecretDetected => "secret_detected",
            Self::DangerousPattern => "dangerous_pattern",
            Self::EmptyList => "empty_list",
            Self::TooMany => "too_many",
            Self::EmptyName => "empty_name",
            Self::InvalidFormat => "invalid_format",
            Self::SuspiciousName => "suspicious_name",
        }
    }

    fn default_reason(&self) -> &'static str {
        match self {
            Self::TooLarge => "input exceeds the size limit",
            Self::Empty => "input is empty",
            Self::TooLong => "input exceeds the length limit",
            Self::PathTraversal => "path traversal is not allowed",
            Self::ForbiddenPath => "access to system directories is not allowed",
            Self::InvalidCharacter => "input contains an invalid character",
            Self::SecretDetected => "input appears to contain a secret",
            Self::DangerousPattern => "input matches a dangerous pattern",
            Self::EmptyList => "at least one entry is required",
            Self::TooMany => "too many entries",
            Self::EmptyName => "name is empty",
            Self::InvalidFormat => "name has an invalid format",
            Self::SuspiciousName => "name looks suspicious",
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single validation check.
///
/// A failing verdict always carries a violation and a non-empty reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the check passed.
    pub passed: bool,
    /// Human-readable reason for failure.
    pub reason: Option<String>,
    /// Rule that failed.
    pub violation: Option<Violation>,
}

impl Verdict {
    /// Create a passing verdict.
    pub fn pass() -> Self {
        Self {
            passed: true,
            reason: None,
            violation: None,
        }
    }

    /// Create a failing verdict. A blank reason falls back to the violation's description.
    pub fn fail(violation: Violation, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let reason = if reason.trim().is_empty() {
            violation.default_reason().to_string()
        } else {
            reason
        };
        Self {
            passed: false,
            reason: Some(reason),
            violation: Some(violation),
        }
    }

    /// Convert into a `Result`, attaching the field name on failure.
    pub fn into_result(self, field: &str) -> crate::Result<()> {
        if self.passed {
            return Ok(());
        }
        let violation = self.violation.unwrap_or(Violation::InvalidFormat);
        Err(crate::Error::Validation {
            field: field.to_string(),
            violation,
            reason: self
                .reason
                .unwrap_or_else(|| violation.default_reason().to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_always_has_reason() {
        let verdict = Verdict::fail(Violation::Empty, "   ");
        assert!(!verdict.passed);
        assert_eq!(verdict.reason.as_deref(), Some("input is empty"));
        assert_eq!(verdict.violation, Some(Violation::Empty));
    }

    #[test]
    fn test_into_result() {
        assert!(Verdict::pass().into_result("code").is_ok());

        let err = Verdict::fail(Violation::PathTraversal, "no dots")
            .into_result("path")
            .unwrap_err();
        match err {
            crate::Error::Validation {
                field, violation, ..
            } => {
                assert_eq!(field, "path");
                assert_eq!(violation, Violation::PathTraversal);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
