//! Input validation gate.
//!
//! Every inbound parameter is checked here before any remote call is made.
//! Size and shape limits are hard failures. Dangerous code patterns are soft:
//! they are audited and allowed through unless `strict` is set. Secrets in file
//! content are always hard failures.

use regex::Regex;
use std::sync::{Arc, OnceLock};

use codegate_core::config::ValidationConfig;
use codegate_core::{Language, Verdict, Violation};

use crate::audit::{summarize_input, SecurityAuditor, SecurityEvent, TracingAuditor};
use crate::patterns::{rules, PatternCategory, RuleSet};

/// Substrings that mark a package name as suspicious.
const SUSPICIOUS_PACKAGE_TERMS: &[&str] = &[
    "malware",
    "backdoor",
    "keylogger",
    "trojan",
    "ransomware",
    "rootkit",
    "cryptominer",
    "stealer",
];

/// Naming grammar of each package ecosystem, optionally followed by a version.
fn package_grammar(language: Language) -> &'static Regex {
    static PYTHON: OnceLock<Regex> = OnceLock::new();
    static JAVASCRIPT: OnceLock<Regex> = OnceLock::new();

    match language {
        // PEP 508 name, optional extras, optional comma-separated specifiers.
        Language::Python => PYTHON.get_or_init(|| {
            Regex::new(
                r"^[A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?(?:\[[A-Za-z0-9._-]+(?:,[A-Za-z0-9._-]+)*\])?(?:(?:===|==|>=|<=|~=|!=|>|<)[A-Za-z0-9.*+!_-]+(?:,(?:===|==|>=|<=|~=|!=|>|<)[A-Za-z0-9.*+!_-]+)*)?$",
            )
            .unwrap_or_else(|e| panic!("invalid python package grammar: {e}"))
        }),
        // npm name with optional @scope/, optional @version or dist-tag. A
        // leading `-` would reach npm as an option.
        Language::JavaScript => JAVASCRIPT.get_or_init(|| {
            Regex::new(
                r"^(?:@[a-z0-9~][a-z0-9._~-]*/)?[a-z0-9~][a-z0-9._~-]*(?:@[A-Za-z0-9._^~*+-]+)?$",
            )
            .unwrap_or_else(|e| panic!("invalid npm package grammar: {e}"))
        }),
    }
}

/// Validates code, paths, file content and package lists.
pub struct InputValidator {
    config: ValidationConfig,
    rules: &'static RuleSet,
    auditor: Arc<dyn SecurityAuditor>,
}

impl InputValidator {
    /// Create a validator that audits through `tracing`.
    pub fn new(config: ValidationConfig) -> Self {
        Self {
            config,
            rules: rules(),
            auditor: Arc::new(TracingAuditor),
        }
    }

    /// Replace the security event sink.
    pub fn with_auditor(mut self, auditor: Arc<dyn SecurityAuditor>) -> Self {
        self.auditor = auditor;
        self
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Check a code payload.
    pub fn validate_code(&self, code: &str, language: Language) -> Verdict {
        let length = code.chars().count();
        if length > self.config.max_code_length {
            return self.reject(
                "code",
                code,
                Verdict::fail(
                    Violation::TooLarge,
                    format!(
                        "code is {} characters, exceeding the limit of {}",
                        length, self.config.max_code_length
                    ),
                ),
            );
        }

        if code.trim().is_empty() {
            return self.reject("code", code, Verdict::fail(Violation::Empty, "code is empty"));
        }

        let matched: Vec<String> = self
            .rules
            .scan(code)
            .iter()
            .map(|rule| format!("{}:{}", rule.category.as_str(), rule.name))
            .collect();

        if !matched.is_empty() {
            if self.config.strict {
                return self.reject(
                    "code",
                    code,
                    Verdict::fail(
                        Violation::DangerousPattern,
                        format!("{} code matches blocked patterns: {}", language, matched.join(", ")),
                    ),
                );
            }

            tracing::debug!(%language, patterns = ?matched, "Allowing code with suspicious patterns");
            self.auditor.record(&SecurityEvent::suspicious_pattern(
                "code",
                matched,
                summarize_input("code", code),
            ));
        }

        Verdict::pass()
    }

    /// Check a sandbox file path. Checks run in a fixed order and the first
    /// failure wins: length, emptiness, traversal, forbidden prefix, NUL byte.
    pub fn validate_file_path(&self, path: &str) -> Verdict {
        let length = path.chars().count();
        if length > self.config.max_path_length {
            return self.reject(
                "path",
                path,
                Verdict::fail(
                    Violation::TooLong,
                    format!(
                        "path is {} characters, exceeding the limit of {}",
                        length, self.config.max_path_length
                    ),
                ),
            );
        }

        if path.trim().is_empty() {
            return self.reject("path", path, Verdict::fail(Violation::Empty, "path is empty"));
        }

        if path.split(['/', '\\']).any(|segment| segment == "..") {
            return self.reject(
                "path",
                path,
                Verdict::fail(
                    Violation::PathTraversal,
                    "path traversal ('..' segments) is not allowed",
                ),
            );
        }

        if let Some(prefix) = self.forbidden_prefix(path) {
            return self.reject(
                "path",
                path,
                Verdict::fail(
                    Violation::ForbiddenPath,
                    format!("access to system directory '{}' is not allowed", prefix),
                ),
            );
        }

        if path.contains('\0') {
            return self.reject(
                "path",
                path,
                Verdict::fail(Violation::InvalidCharacter, "path contains a null byte"),
            );
        }

        Verdict::pass()
    }

    /// Check file content before it is written into a sandbox.
    pub fn validate_file_content(&self, content: &str) -> Verdict {
        // Byte length: multi-byte characters count for every byte they occupy.
        let size = content.len();
        if size > self.config.max_file_size_bytes {
            return self.reject(
                "content",
                content,
                Verdict::fail(
                    Violation::TooLarge,
                    format!(
                        "content is {} bytes, exceeding the limit of {} bytes",
                        size, self.config.max_file_size_bytes
                    ),
                ),
            );
        }

        let secrets: Vec<&str> = self
            .rules
            .scan_category(PatternCategory::Secret, content)
            .iter()
            .map(|rule| rule.name)
            .collect();

        if !secrets.is_empty() {
            return self.reject(
                "content",
                content,
                Verdict::fail(
                    Violation::SecretDetected,
                    format!("content appears to contain a secret ({})", secrets.join(", ")),
                ),
            );
        }

        Verdict::pass()
    }

    /// Check a package list. The first invalid name rejects the whole list.
    pub fn validate_packages(&self, names: &[String], language: Language) -> Verdict {
        if names.is_empty() {
            return self.reject(
                "packages",
                "",
                Verdict::fail(Violation::EmptyList, "at least one package is required"),
            );
        }

        if names.len() > self.config.max_packages {
            return self.reject(
                "packages",
                &names.join(" "),
                Verdict::fail(
                    Violation::TooMany,
                    format!(
                        "{} packages requested, exceeding the limit of {}",
                        names.len(),
                        self.config.max_packages
                    ),
                ),
            );
        }

        for name in names {
            let verdict = self.check_package_name(name, language);
            if !verdict.passed {
                return self.reject("packages", name, verdict);
            }
        }

        Verdict::pass()
    }

    fn check_package_name(&self, name: &str, language: Language) -> Verdict {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Verdict::fail(Violation::EmptyName, "package name is empty");
        }

        let length = trimmed.chars().count();
        if length > self.config.max_package_name_length {
            return Verdict::fail(
                Violation::TooLong,
                format!(
                    "package name is {} characters, exceeding the limit of {}",
                    length, self.config.max_package_name_length
                ),
            );
        }

        if !package_grammar(language).is_match(trimmed) {
            return Verdict::fail(
                Violation::InvalidFormat,
                format!("'{}' is not a valid {} package name", trimmed, language.package_manager()),
            );
        }

        let lower = trimmed.to_ascii_lowercase();
        if let Some(term) = SUSPICIOUS_PACKAGE_TERMS.iter().find(|t| lower.contains(*t)) {
            return Verdict::fail(
                Violation::SuspiciousName,
                format!("package '{}' matches blocked term '{}'", trimmed, term),
            );
        }

        Verdict::pass()
    }

    fn forbidden_prefix(&self, path: &str) -> Option<&str> {
        if !path.starts_with('/') {
            return None;
        }
        // Collapse "//etc/./passwd" style spellings before comparing.
        let normalized = format!(
            "/{}",
            path.split('/')
                .filter(|s| !s.is_empty() && *s != ".")
                .collect::<Vec<_>>()
                .join("/")
        );

        self.config
            .forbidden_path_prefixes
            .iter()
            .map(|p| p.trim_end_matches('/'))
            .find(|prefix| {
                !prefix.is_empty()
                    && (normalized == *prefix
                        || normalized
                            .strip_prefix(*prefix)
                            .is_some_and(|rest| rest.starts_with('/')))
            })
    }

    fn reject(&self, field: &str, input: &str, verdict: Verdict) -> Verdict {
        if let (Some(violation), Some(reason)) = (verdict.violation, verdict.reason.as_deref()) {
            self.auditor.record(&SecurityEvent::validation_failed(
                field,
                violation,
                reason,
                summarize_input(field, input),
            ));
        }
        verdict
    }
}
