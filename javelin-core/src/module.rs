//! One source file and its front-end products.

use crate::ast::Ast;
use crate::diagnostic::Diagnostic;
use crate::lexer::{BracketError, ColorHint, Token, lex};
use crate::parser::parse;
use crate::span::ModuleId;

#[derive(Debug, Clone)]
pub struct Module {
    pub id: ModuleId,
    /// Path relative to the workspace root, or a display name.
    pub path: String,
    pub source: String,
    pub tokens: Vec<Token>,
    pub ast: Ast,
    /// Lexer and parser diagnostics; later stages report through the executable.
    pub diagnostics: Vec<Diagnostic>,
    pub bracket_error: Option<BracketError>,
    pub color_hints: Vec<ColorHint>,
    /// Set when the source changed since the last compilation.
    pub is_dirty: bool,
}

impl Module {
    pub fn new(id: ModuleId, path: impl Into<String>, source: impl Into<String>) -> Self {
        let mut module = Self {
            id,
            path: path.into(),
            source: source.into(),
            tokens: Vec::new(),
            ast: Ast::new(),
            diagnostics: Vec::new(),
            bracket_error: None,
            color_hints: Vec::new(),
            is_dirty: true,
        };
        module.analyze();
        module
    }

    /// Replace the text; re-lexes and re-parses only when it changed.
    pub fn set_source(&mut self, source: impl Into<String>) {
        let source = source.into();
        if source == self.source {
            return;
        }
        self.source = source;
        self.is_dirty = true;
        self.analyze();
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    fn analyze(&mut self) {
        let lexed = lex(&self.source);
        let parsed = parse(&lexed.tokens);
        self.diagnostics = lexed.diagnostics;
        self.diagnostics.extend(parsed.diagnostics);
        self.tokens = lexed.tokens;
        self.ast = parsed.ast;
        self.bracket_error = lexed.bracket_error;
        self.color_hints = lexed.color_hints;
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_source_keeps_module_clean() {
        let mut module = Module::new(ModuleId(0), "A.java", "class A {}");
        module.mark_clean();
        module.set_source("class A {}");
        assert!(!module.is_dirty);
        module.set_source("class A { int x; }");
        assert!(module.is_dirty);
        assert!(!module.has_errors());
    }

    #[test]
    fn syntax_errors_are_kept_on_the_module() {
        let module = Module::new(ModuleId(0), "B.java", "class B { void f( }");
        assert!(module.has_errors());
        assert!(module.ast.root().is_some());
    }
}
