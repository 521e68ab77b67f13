//! Compiler configuration
//!
//! Host-facing knobs for one compilation: which back-end formatter the IR
//! is destined for, how diagnostics are rendered, and the minimum
//! confidence for fix suggestions. Loadable from an `asthra.toml` file.

use serde::Deserialize;
use std::path::Path;

use crate::diagnostics::Confidence;

/// Target selection for the external assembly formatter. The IR itself is
/// architecture-agnostic; this only routes the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetArch {
    #[default]
    X86_64Att,
    X86_64Intel,
    Aarch64,
    Wasm,
}

impl TargetArch {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetArch::X86_64Att => "x86_64-att",
            TargetArch::X86_64Intel => "x86_64-intel",
            TargetArch::Aarch64 => "aarch64",
            TargetArch::Wasm => "wasm",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Back-end formatter the IR will be handed to.
    pub target: TargetArch,
    /// Emit diagnostics as the stable JSON form instead of human text.
    pub json_diagnostics: bool,
    /// Suggestions below this confidence are dropped at render time.
    pub min_suggestion_confidence: Confidence,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            target: TargetArch::default(),
            json_diagnostics: false,
            min_suggestion_confidence: Confidence::Low,
        }
    }
}

impl CompilerConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse compiler config: {}", e))
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config '{}': {}", path.display(), e))?;
        Self::from_toml(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CompilerConfig::default();
        assert_eq!(config.target, TargetArch::X86_64Att);
        assert!(!config.json_diagnostics);
        assert_eq!(config.min_suggestion_confidence, Confidence::Low);
    }

    #[test]
    fn test_parse_toml() {
        let config = CompilerConfig::from_toml(
            r#"
target = "aarch64"
json_diagnostics = true
min_suggestion_confidence = "medium"
"#,
        )
        .unwrap();
        assert_eq!(config.target, TargetArch::Aarch64);
        assert!(config.json_diagnostics);
        assert_eq!(config.min_suggestion_confidence, Confidence::Medium);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = CompilerConfig::from_toml("target = \"wasm\"").unwrap();
        assert_eq!(config.target, TargetArch::Wasm);
        assert!(!config.json_diagnostics);
    }

    #[test]
    fn test_invalid_target_rejected() {
        assert!(CompilerConfig::from_toml("target = \"pdp11\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "json_diagnostics = true").unwrap();
        let config = CompilerConfig::load(file.path()).unwrap();
        assert!(config.json_diagnostics);
        assert!(CompilerConfig::load(Path::new("/nonexistent/asthra.toml")).is_err());
    }
}
