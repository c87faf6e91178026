//! Static pattern library shared by the input validator and the output sanitizer.
//!
//! Two lists are exposed:
//! - detection rules, grouped by [`PatternCategory`], used to flag dangerous code
//!   and credential-shaped content;
//! - sanitization rules, applied in order to remote output, each replacing its
//!   match with a placeholder that no rule matches again.
//!
//! The set is compiled once per process and never mutated.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Category of a detection rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    /// Outbound network access.
    Network,
    /// Restricted filesystem locations or destructive file operations.
    Filesystem,
    /// Process spawning and dynamic code execution.
    Process,
    /// Credential-shaped literals.
    Secret,
}

impl PatternCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Filesystem => "filesystem",
            Self::Process => "process",
            Self::Secret => "secret",
        }
    }
}

/// A named pattern, optionally carrying the text that replaces its matches.
#[derive(Debug)]
pub struct PatternRule {
    pub name: &'static str,
    pub category: PatternCategory,
    pub regex: Regex,
    pub replacement: Option<&'static str>,
}

impl PatternRule {
    fn detect(name: &'static str, category: PatternCategory, pattern: &str) -> Self {
        Self {
            name,
            category,
            regex: compile(pattern),
            replacement: None,
        }
    }

    fn mask(name: &'static str, pattern: &str, replacement: &'static str) -> Self {
        Self {
            name,
            category: PatternCategory::Secret,
            regex: compile(pattern),
            replacement: Some(replacement),
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

// Patterns are compile-time constants; a failure here is a programming error.
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern:?}: {e}"))
}

/// Immutable collection of detection and sanitization rules.
#[derive(Debug)]
pub struct RuleSet {
    detection: Vec<PatternRule>,
    sanitization: Vec<PatternRule>,
}

/// The process-wide rule set.
pub fn rules() -> &'static RuleSet {
    static RULES: OnceLock<RuleSet> = OnceLock::new();
    RULES.get_or_init(RuleSet::builtin)
}

impl RuleSet {
    fn builtin() -> Self {
        use PatternCategory::*;

        let detection = vec![
            // Network
            PatternRule::detect(
                "raw_socket",
                Network,
                r"\bsocket\s*\.\s*(?:socket|create_connection)\s*\(|\bnet\s*\.\s*(?:connect|createConnection|createServer)\s*\(",
            ),
            PatternRule::detect(
                "http_client",
                Network,
                r#"\b(?:urllib\.request|urllib2|http\.client|httpx|aiohttp)\b|\brequests\s*\.\s*(?:get|post|put|delete|patch|head|request)\s*\(|\bfetch\s*\(|\bXMLHttpRequest\b|\brequire\s*\(\s*['"](?:http|https|net|dgram)['"]\s*\)"#,
            ),
            // Filesystem
            PatternRule::detect(
                "system_file",
                Filesystem,
                r"/etc/(?:passwd|shadow|sudoers|hosts)\b",
            ),
            PatternRule::detect("ssh_material", Filesystem, r"/\.ssh/|\bid_(?:rsa|ed25519|ecdsa)\b"),
            PatternRule::detect(
                "recursive_delete",
                Filesystem,
                r"\brm\s+-[a-zA-Z]*(?:rf|fr)\b|\bshutil\s*\.\s*rmtree\s*\(|\bfs\s*\.\s*rmSync\s*\(",
            ),
            // Process
            PatternRule::detect(
                "os_command",
                Process,
                r"\bos\s*\.\s*(?:system|popen|exec[lv]p?e?|spawn[lv]p?e?)\s*\(",
            ),
            PatternRule::detect(
                "subprocess",
                Process,
                r"\bsubprocess\s*\.\s*(?:run|call|check_call|check_output|Popen)\s*\(",
            ),
            PatternRule::detect(
                "child_process",
                Process,
                r"\bchild_process\b|\b(?:execSync|spawnSync|execFileSync)\s*\(",
            ),
            PatternRule::detect(
                "dynamic_eval",
                Process,
                r"\b(?:eval|exec)\s*\(|\b__import__\s*\(|\bnew\s+Function\s*\(",
            ),
            // Secrets
            PatternRule::detect(
                "private_key",
                Secret,
                r"-----BEGIN (?:[A-Z0-9]+ )*PRIVATE KEY-----",
            ),
            PatternRule::detect("aws_access_key", Secret, r"(?:AKIA|ASIA)[0-9A-Z]{16}\b"),
            PatternRule::detect("github_token", Secret, r"gh[pousr]_[A-Za-z0-9]{36,}\b"),
            PatternRule::detect("api_secret_key", Secret, r"sk-(?:proj-|ant-)?[A-Za-z0-9_-]{20,}"),
            PatternRule::detect("slack_token", Secret, r"xox[abposr]-[A-Za-z0-9-]{10,}"),
            PatternRule::detect("google_api_key", Secret, r"AIza[0-9A-Za-z_-]{35}"),
            PatternRule::detect("long_base64", Secret, r"[A-Za-z0-9+/]{100,}={0,2}"),
        ];

        // Order matters: block-level matches first, then token shapes, then
        // generic assignments. No placeholder matches any rule. Token shapes
        // carry no leading word boundary so `AWS_KEY_AKIA...` is still caught.
        let sanitization = vec![
            PatternRule::mask(
                "private_key",
                r"(?s)-----BEGIN (?:[A-Z0-9]+ )*PRIVATE KEY-----(?:.*?-----END (?:[A-Z0-9]+ )*PRIVATE KEY-----|.*$)",
                "[REDACTED PRIVATE KEY]",
            ),
            PatternRule::mask(
                "aws_access_key",
                r"(?:AKIA|ASIA)[0-9A-Z]{16}\b",
                "[REDACTED AWS KEY]",
            ),
            PatternRule::mask(
                "github_token",
                r"gh[pousr]_[A-Za-z0-9]{36,}\b",
                "[REDACTED GITHUB TOKEN]",
            ),
            PatternRule::mask(
                "api_secret_key",
                r"sk-(?:proj-|ant-)?[A-Za-z0-9_-]{20,}",
                "[REDACTED API KEY]",
            ),
            PatternRule::mask(
                "slack_token",
                r"xox[abposr]-[A-Za-z0-9-]{10,}",
                "[REDACTED SLACK TOKEN]",
            ),
            PatternRule::mask(
                "google_api_key",
                r"AIza[0-9A-Za-z_-]{35}",
                "[REDACTED GOOGLE KEY]",
            ),
            PatternRule::mask(
                "bearer_token",
                r"(?i)\bbearer\s+[A-Za-z0-9._~+/-]{16,}=*",
                "Bearer [REDACTED]",
            ),
            PatternRule::mask(
                "credential_assignment",
                r#"(?i)(api[_-]?key|secret|token|passwd|password)(\s*[:=]\s*)['"]?[^\s'"\[][^\s'"]{7,}['"]?"#,
                "${1}${2}[REDACTED]",
            ),
        ];

        Self {
            detection,
            sanitization,
        }
    }

    /// All detection rules.
    pub fn detection(&self) -> &[PatternRule] {
        &self.detection
    }

    /// Sanitization rules in application order.
    pub fn sanitization(&self) -> &[PatternRule] {
        &self.sanitization
    }

    /// Detection rules of one category.
    pub fn by_category(&self, category: PatternCategory) -> impl Iterator<Item = &PatternRule> {
        self.detection.iter().filter(move |r| r.category == category)
    }

    /// Detection rules matching `text`.
    pub fn scan(&self, text: &str) -> Vec<&PatternRule> {
        self.detection.iter().filter(|r| r.is_match(text)).collect()
    }

    /// Detection rules of one category matching `text`.
    pub fn scan_category(&self, category: PatternCategory, text: &str) -> Vec<&PatternRule> {
        self.by_category(category).filter(|r| r.is_match(text)).collect()
    }
}
