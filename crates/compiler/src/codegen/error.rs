//! Code generation error types.

/// Error type for code generation operations.
///
/// This allows proper error propagation using `?` for both logical errors
/// (analyzer contract violations, unsupported constructs) and internal
/// invariant failures found by the IR self-validation pass.
#[derive(Debug)]
pub enum CodeGenError {
    /// A logical error in code generation (e.g., an expression the
    /// analyzer left untyped).
    Logic(String),
    /// The emitted IR failed self-validation.
    Validation(String),
}

impl std::fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeGenError::Logic(s) => write!(f, "{}", s),
            CodeGenError::Validation(s) => write!(f, "IR validation error: {}", s),
        }
    }
}

impl std::error::Error for CodeGenError {}

impl From<String> for CodeGenError {
    fn from(s: String) -> Self {
        CodeGenError::Logic(s)
    }
}
