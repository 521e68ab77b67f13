//! Diagnostics for Asthra compilation
//!
//! Structured errors with spans, labels, and ranked fix suggestions.
//! Diagnostics are collected per compilation in the order produced and
//! rendered either as human-readable text or as a stable JSON form
//! consumed by editor tooling.

use serde::{Deserialize, Serialize};

use crate::ast::Span;

/// Stable diagnostic codes. The numeric part is ABI for tooling; new codes
/// are appended, existing ones never renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    UndefinedSymbol,
    DuplicateSymbol,
    TypeMismatch,
    InvalidArguments,
    NotCallable,
    InvalidType,
    InvalidExpression,
    InvalidDeclaration,
    TypeInferenceFailed,
    InvalidOperation,
    UnsupportedOperation,
    NonExhaustiveMatch,
    SymbolTable,
    MemoryAllocation,
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::UndefinedSymbol => "ASTHRA_E001",
            ErrorCode::DuplicateSymbol => "ASTHRA_E002",
            ErrorCode::TypeMismatch => "ASTHRA_E003",
            ErrorCode::InvalidArguments => "ASTHRA_E004",
            ErrorCode::NotCallable => "ASTHRA_E005",
            ErrorCode::InvalidType => "ASTHRA_E006",
            ErrorCode::InvalidExpression => "ASTHRA_E007",
            ErrorCode::InvalidDeclaration => "ASTHRA_E008",
            ErrorCode::TypeInferenceFailed => "ASTHRA_E009",
            ErrorCode::InvalidOperation => "ASTHRA_E010",
            ErrorCode::UnsupportedOperation => "ASTHRA_E011",
            ErrorCode::NonExhaustiveMatch => "ASTHRA_E012",
            ErrorCode::SymbolTable => "ASTHRA_E101",
            ErrorCode::MemoryAllocation => "ASTHRA_E102",
            ErrorCode::Internal => "ASTHRA_E103",
        }
    }
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        }
    }
}

/// Suggestion confidence, ordered Low < Medium < High.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

/// Kind of source edit a suggestion proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuggestionKind {
    Insert,
    Replace,
    Delete,
}

impl SuggestionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SuggestionKind::Insert => "insert",
            SuggestionKind::Replace => "replace",
            SuggestionKind::Delete => "delete",
        }
    }
}

/// A ranked fix suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub kind: SuggestionKind,
    pub span: Span,
    pub text: String,
    pub confidence: Confidence,
    pub rationale: String,
}

/// A span with an optional label and source snippet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledSpan {
    pub span: Span,
    pub label: Option<String>,
    pub snippet: Option<String>,
}

/// A single diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub severity: Severity,
    pub message: String,
    pub spans: Vec<LabeledSpan>,
    pub suggestions: Vec<Suggestion>,
}

impl Diagnostic {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Diagnostic {
            code,
            severity: Severity::Error,
            message: message.into(),
            spans: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    pub fn warning(code: ErrorCode, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            ..Diagnostic::error(code, message)
        }
    }

    pub fn note(code: ErrorCode, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Note,
            ..Diagnostic::error(code, message)
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.spans.push(LabeledSpan {
            span,
            label: None,
            snippet: None,
        });
        self
    }

    pub fn with_labeled_span(mut self, span: Span, label: impl Into<String>) -> Self {
        self.spans.push(LabeledSpan {
            span,
            label: Some(label.into()),
            snippet: None,
        });
        self
    }

    pub fn with_suggestion(mut self, suggestion: Suggestion) -> Self {
        self.suggestions.push(suggestion);
        self
    }

    pub fn primary_span(&self) -> Option<&Span> {
        self.spans.first().map(|s| &s.span)
    }
}

/// Per-compilation diagnostic sink.
///
/// Suggestions below `min_confidence` are dropped at render time, not at
/// report time, so a host can re-render with a lower threshold.
pub struct DiagnosticReporter {
    diagnostics: Vec<Diagnostic>,
    min_confidence: Confidence,
}

impl Default for DiagnosticReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticReporter {
    pub fn new() -> Self {
        DiagnosticReporter {
            diagnostics: Vec::new(),
            min_confidence: Confidence::Low,
        }
    }

    pub fn with_min_confidence(min_confidence: Confidence) -> Self {
        DiagnosticReporter {
            diagnostics: Vec::new(),
            min_confidence,
        }
    }

    /// Raise or lower the suggestion threshold. Filtering happens at
    /// render time, so this may be called after diagnostics were reported.
    pub fn set_min_confidence(&mut self, min_confidence: Confidence) {
        self.min_confidence = min_confidence;
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    fn visible_suggestions<'a>(&self, d: &'a Diagnostic) -> Vec<&'a Suggestion> {
        d.suggestions
            .iter()
            .filter(|s| s.confidence >= self.min_confidence)
            .collect()
    }

    /// Human-readable rendering, one diagnostic per paragraph.
    pub fn render_human(&self) -> String {
        let mut output = String::new();
        for d in &self.diagnostics {
            match d.primary_span() {
                Some(span) => output.push_str(&format!(
                    "{}: {} [{}]: {}\n",
                    span,
                    d.severity.as_str(),
                    d.code.as_str(),
                    d.message
                )),
                None => output.push_str(&format!(
                    "{} [{}]: {}\n",
                    d.severity.as_str(),
                    d.code.as_str(),
                    d.message
                )),
            }
            for ls in d.spans.iter().skip(1) {
                if let Some(label) = &ls.label {
                    output.push_str(&format!("  {}: {}\n", ls.span, label));
                }
            }
            for s in self.visible_suggestions(d) {
                output.push_str(&format!(
                    "  suggestion ({}): {} `{}` ({})\n",
                    s.confidence.as_str(),
                    s.kind.as_str(),
                    s.text,
                    s.rationale
                ));
            }
        }
        output
    }

    /// Stable JSON form:
    /// `{ diagnostics: [ { code, level, message, spans: [...], suggestions: [...] } ] }`
    pub fn to_json(&self) -> serde_json::Value {
        let diagnostics: Vec<serde_json::Value> = self
            .diagnostics
            .iter()
            .map(|d| {
                let spans: Vec<serde_json::Value> = d
                    .spans
                    .iter()
                    .map(|ls| {
                        let mut span = serde_json::json!({
                            "file": ls.span.file,
                            "start_line": ls.span.start_line,
                            "start_column": ls.span.start_column,
                            "end_line": ls.span.end_line,
                            "end_column": ls.span.end_column,
                        });
                        if let Some(label) = &ls.label {
                            span["label"] = serde_json::json!(label);
                        }
                        span
                    })
                    .collect();
                let suggestions: Vec<serde_json::Value> = self
                    .visible_suggestions(d)
                    .iter()
                    .map(|s| {
                        serde_json::json!({
                            "type": s.kind.as_str(),
                            "span": {
                                "file": s.span.file,
                                "start_line": s.span.start_line,
                                "start_column": s.span.start_column,
                                "end_line": s.span.end_line,
                                "end_column": s.span.end_column,
                            },
                            "text": s.text,
                            "confidence": s.confidence.as_str(),
                            "rationale": s.rationale,
                        })
                    })
                    .collect();
                serde_json::json!({
                    "code": d.code.as_str(),
                    "level": d.severity.as_str(),
                    "message": d.message,
                    "spans": spans,
                    "suggestions": suggestions,
                })
            })
            .collect();
        serde_json::json!({ "diagnostics": diagnostics })
    }
}

// ----------------------------------------------------------------------
// Fix heuristics
// ----------------------------------------------------------------------

/// Levenshtein edit distance, used by the did-you-mean scan.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Find the closest in-scope name within edit distance 2.
/// Ties resolve to the lexicographically-smallest candidate so the
/// suggestion is deterministic.
pub fn suggest_similar_name(name: &str, candidates: &[String]) -> Option<String> {
    let mut best: Option<(usize, &String)> = None;
    for candidate in candidates {
        if candidate == name {
            continue;
        }
        let dist = edit_distance(name, candidate);
        if dist > 2 {
            continue;
        }
        best = match best {
            None => Some((dist, candidate)),
            Some((bd, bc)) if dist < bd || (dist == bd && candidate < bc) => {
                Some((dist, candidate))
            }
            other => other,
        };
    }
    best.map(|(_, c)| c.clone())
}

/// Known type-conversion pairs, as (suffix text, confidence, rationale).
pub fn conversion_hint(from: &str, to: &str) -> Option<(String, Confidence, String)> {
    match (from, to) {
        ("i32", "string") => Some((
            ".to_string()".to_string(),
            Confidence::High,
            "Convert the integer to a string".to_string(),
        )),
        ("string", "i32") => Some((
            ".parse::<i32>().unwrap()".to_string(),
            Confidence::Medium,
            "Parse the string as an integer".to_string(),
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;

    fn span() -> Span {
        Span::new("test.as", 2, 4, 2, 9)
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ErrorCode::UndefinedSymbol.as_str(), "ASTHRA_E001");
        assert_eq!(ErrorCode::TypeMismatch.as_str(), "ASTHRA_E003");
        assert_eq!(ErrorCode::InvalidArguments.as_str(), "ASTHRA_E004");
    }

    #[test]
    fn test_has_errors_ignores_warnings() {
        let mut reporter = DiagnosticReporter::new();
        reporter.report(Diagnostic::warning(
            ErrorCode::NonExhaustiveMatch,
            "match is not exhaustive",
        ));
        assert!(!reporter.has_errors());
        reporter.report(Diagnostic::error(ErrorCode::TypeMismatch, "mismatch"));
        assert!(reporter.has_errors());
        assert_eq!(reporter.error_count(), 1);
    }

    #[test]
    fn test_human_rendering() {
        let mut reporter = DiagnosticReporter::new();
        reporter.report(
            Diagnostic::error(ErrorCode::UndefinedSymbol, "Undefined symbol 'useer_id'")
                .with_span(span())
                .with_suggestion(Suggestion {
                    kind: SuggestionKind::Replace,
                    span: span(),
                    text: "user_id".to_string(),
                    confidence: Confidence::Medium,
                    rationale: "Similar variable found in scope".to_string(),
                }),
        );
        let out = reporter.render_human();
        assert!(out.contains("ASTHRA_E001"));
        assert!(out.contains("test.as:3:5"));
        assert!(out.contains("user_id"));
    }

    #[test]
    fn test_json_shape() {
        let mut reporter = DiagnosticReporter::new();
        reporter.report(
            Diagnostic::error(ErrorCode::TypeMismatch, "type mismatch").with_labeled_span(
                span(),
                "expected 'string', found 'i32'",
            ),
        );
        let json = reporter.to_json();
        let list = json["diagnostics"].as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["code"], "ASTHRA_E003");
        assert_eq!(list[0]["level"], "error");
        assert_eq!(list[0]["spans"][0]["file"], "test.as");
        assert_eq!(list[0]["spans"][0]["start_line"], 2);
    }

    #[test]
    fn test_confidence_filter() {
        let mut reporter = DiagnosticReporter::with_min_confidence(Confidence::Medium);
        reporter.report(
            Diagnostic::error(ErrorCode::TypeMismatch, "mismatch")
                .with_span(span())
                .with_suggestion(Suggestion {
                    kind: SuggestionKind::Replace,
                    span: span(),
                    text: "as i64".to_string(),
                    confidence: Confidence::Low,
                    rationale: "Cast".to_string(),
                })
                .with_suggestion(Suggestion {
                    kind: SuggestionKind::Replace,
                    span: span(),
                    text: ".to_string()".to_string(),
                    confidence: Confidence::High,
                    rationale: "Convert".to_string(),
                }),
        );
        let out = reporter.render_human();
        assert!(!out.contains("as i64"));
        assert!(out.contains(".to_string()"));
        let json = reporter.to_json();
        assert_eq!(
            json["diagnostics"][0]["suggestions"].as_array().unwrap().len(),
            1
        );
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("user_id", "useer_id"), 1);
        assert_eq!(edit_distance("abc", "abc"), 0);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn test_suggest_similar_name() {
        let names = vec![
            "user_id".to_string(),
            "count".to_string(),
            "total".to_string(),
        ];
        assert_eq!(
            suggest_similar_name("useer_id", &names),
            Some("user_id".to_string())
        );
        assert_eq!(suggest_similar_name("zzzzz", &names), None);
        // An exact match is not a suggestion.
        assert_eq!(suggest_similar_name("count", &names), None);
    }

    #[test]
    fn test_conversion_hints() {
        let (text, conf, _) = conversion_hint("i32", "string").unwrap();
        assert_eq!(text, ".to_string()");
        assert_eq!(conf, Confidence::High);
        assert!(conversion_hint("f64", "bool").is_none());
    }
}
