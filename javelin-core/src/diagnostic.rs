//! Diagnostics reported by the lexer, parser, resolver and code generator.
//!
//! Diagnostics are plain data: every stage appends to a list and keeps
//! going, so an editor always has tokens, a tree and messages to show.

use core::fmt;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::span::{ModuleId, Range};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub message: String,
    pub id: Option<String>,
    pub severity: Severity,
    pub range: Range,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>, range: Range) -> Self {
        Self {
            message: message.into(),
            id: None,
            severity,
            range,
        }
    }

    pub fn error(message: impl Into<String>, range: Range) -> Self {
        Self::new(Severity::Error, message, range)
    }

    pub fn warning(message: impl Into<String>, range: Range) -> Self {
        Self::new(Severity::Warning, message, range)
    }

    pub fn info(message: impl Into<String>, range: Range) -> Self {
        Self::new(Severity::Info, message, range)
    }

    pub fn with_code(mut self, code: &str) -> Self {
        self.id = Some(code.to_string());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        match &self.id {
            Some(id) => write!(f, "{level}[{id}] {}: {}", self.range, self.message),
            None => write!(f, "{level} {}: {}", self.range, self.message),
        }
    }
}

pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

/// Diagnostics of one compilation, grouped by module.
///
/// Problems that belong to no single module, such as a static
/// initialization cycle spanning several files, are kept as global.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticSink {
    modules: BTreeMap<ModuleId, Vec<Diagnostic>>,
    global: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, module: ModuleId, diagnostic: Diagnostic) {
        self.modules.entry(module).or_default().push(diagnostic);
    }

    pub fn extend(&mut self, module: ModuleId, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.modules.entry(module).or_default().extend(diagnostics);
    }

    pub fn push_global(&mut self, diagnostic: Diagnostic) {
        self.global.push(diagnostic);
    }

    pub fn module(&self, module: ModuleId) -> &[Diagnostic] {
        self.modules.get(&module).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn global(&self) -> &[Diagnostic] {
        &self.global
    }

    pub fn has_errors_in(&self, module: ModuleId) -> bool {
        has_errors(self.module(module))
    }

    pub fn has_errors(&self) -> bool {
        has_errors(&self.global) || self.modules.values().any(|d| has_errors(d))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Option<ModuleId>, &Diagnostic)> {
        self.modules
            .iter()
            .flat_map(|(m, list)| list.iter().map(move |d| (Some(*m), d)))
            .chain(self.global.iter().map(|d| (None, d)))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn serializes_with_lowercase_severity_and_camel_case_range() {
        let diagnostic = Diagnostic::error("missing return statement", Range::new(2, 47, 2, 47)).with_code("E0314");
        let value = serde_json::to_value(&diagnostic).expect("serializes");
        assert_eq!(
            value,
            json!({
                "message": "missing return statement",
                "id": "E0314",
                "severity": "error",
                "range": { "startLine": 2, "startColumn": 47, "endLine": 2, "endColumn": 47 },
            })
        );
    }

    #[test]
    fn compiled_diagnostics_serialize_as_a_list() {
        let source = "public class Main {\n  static int f(int x) { if (x > 0) return 1; }\n}\n";
        let exe = crate::compiler::compile_source("Main.java", source);
        let module = exe.modules[0].id;
        let text = serde_json::to_string(&exe.module_diagnostics(module)).expect("serializes");
        let parsed: serde_json::Value = serde_json::from_str(&text).expect("valid json");
        let list = parsed.as_array().expect("array");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["id"], "E0314");
        assert_eq!(list[0]["range"]["startLine"], 2);
    }
}
