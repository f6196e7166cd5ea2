use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Languages the evaluator knows how to build and run.
/// Serialized lowercase; `c++` and `py` are accepted aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupportedLanguage {
    #[serde(alias = "py", alias = "python3")]
    Python,
    C,
    #[serde(alias = "c++")]
    Cpp,
    Java,
}

impl SupportedLanguage {
    pub const ALL: [SupportedLanguage; 4] = [
        SupportedLanguage::Python,
        SupportedLanguage::C,
        SupportedLanguage::Cpp,
        SupportedLanguage::Java,
    ];

    /// Parse a user-supplied language tag. Case-insensitive; `c++` and `cpp`
    /// name the same variant.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "python" | "python3" | "py" => Some(SupportedLanguage::Python),
            "c" => Some(SupportedLanguage::C),
            "cpp" | "c++" => Some(SupportedLanguage::Cpp),
            "java" => Some(SupportedLanguage::Java),
            _ => None,
        }
    }

    /// Canonical lowercase tag, used for config keys and metrics labels
    pub fn as_str(&self) -> &'static str {
        match self {
            SupportedLanguage::Python => "python",
            SupportedLanguage::C => "c",
            SupportedLanguage::Cpp => "cpp",
            SupportedLanguage::Java => "java",
        }
    }

    /// Human-facing name, used in messages shown to students
    pub fn display_name(&self) -> &'static str {
        match self {
            SupportedLanguage::Python => "Python",
            SupportedLanguage::C => "C",
            SupportedLanguage::Cpp => "C++",
            SupportedLanguage::Java => "Java",
        }
    }

    /// Comma-separated list for "unsupported language" messages
    pub fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(|l| l.display_name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for SupportedLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLanguage(pub String);

impl fmt::Display for UnknownLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unsupported language '{}'. Supported languages: {}",
            self.0,
            SupportedLanguage::supported_list()
        )
    }
}

impl std::error::Error for UnknownLanguage {}

impl FromStr for SupportedLanguage {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s).ok_or_else(|| UnknownLanguage(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_case_insensitive() {
        assert_eq!(SupportedLanguage::from_tag("Python"), Some(SupportedLanguage::Python));
        assert_eq!(SupportedLanguage::from_tag("JAVA"), Some(SupportedLanguage::Java));
        assert_eq!(SupportedLanguage::from_tag(" c "), Some(SupportedLanguage::C));
    }

    #[test]
    fn test_cpp_aliases() {
        assert_eq!(SupportedLanguage::from_tag("c++"), Some(SupportedLanguage::Cpp));
        assert_eq!(SupportedLanguage::from_tag("CPP"), Some(SupportedLanguage::Cpp));
        assert_eq!(SupportedLanguage::from_tag("C++"), Some(SupportedLanguage::Cpp));
    }

    #[test]
    fn test_unknown_tag_lists_supported_set() {
        let err = "rust".parse::<SupportedLanguage>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("rust"));
        assert!(msg.contains("Python, C, C++, Java"));
    }

    #[test]
    fn test_serde_uses_lowercase_tags() {
        let json = serde_json::to_string(&SupportedLanguage::Cpp).unwrap();
        assert_eq!(json, "\"cpp\"");
        let parsed: SupportedLanguage = serde_json::from_str("\"c++\"").unwrap();
        assert_eq!(parsed, SupportedLanguage::Cpp);
    }
}
