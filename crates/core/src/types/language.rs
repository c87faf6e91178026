use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Language runtime a sandbox is provisioned for.
///
/// Language-specific behavior lives in two places only: the package-name
/// grammar in the input validator and the install-script template in the
/// sandbox tools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Python,
    JavaScript,
}

impl Language {
    /// All supported languages.
    pub const ALL: [Language; 2] = [Language::Python, Language::JavaScript];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
        }
    }

    /// Name of the package manager used for installs.
    pub fn package_manager(&self) -> &'static str {
        match self {
            Self::Python => "pip",
            Self::JavaScript => "npm",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "py" => Ok(Self::Python),
            "javascript" | "js" | "node" => Ok(Self::JavaScript),
            other => Err(crate::Error::invalid_request(format!(
                "Unsupported language '{}': expected 'python' or 'javascript'",
                other
            ))),
        }
    }
}
