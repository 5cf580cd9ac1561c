//! Recursive-descent parser producing the [`Ast`] arena.
//!
//! Parse functions return [`PResult`]; a syntax error propagates up to the
//! nearest statement or member loop, which records it as a diagnostic and
//! resynchronizes at the next `;`, `}` or declaration keyword. Everything
//! parsed before and after the error survives.

mod expr;
mod stmt;

use crate::ast::{
    Annotation, Ast, Modifiers, NodeId, NodeKind, Param, TypeDecl, TypeDeclKind, TypeExpr,
    TypeParam,
};
use crate::diagnostic::Diagnostic;
use crate::lexer::{Token, TokenKind, lex};
use crate::span::Range;

pub use expr::is_primitive_name;

/// Result of parsing one module.
#[derive(Debug)]
pub struct ParseResult {
    pub ast: Ast,
    pub diagnostics: Vec<Diagnostic>,
}

/// Result of parsing a REPL snippet.
#[derive(Debug)]
pub struct ReplParse {
    pub ast: Ast,
    pub statements: Vec<NodeId>,
    /// Trailing expression without `;` whose value the snippet yields.
    pub value: Option<NodeId>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone)]
pub(crate) struct SyntaxError {
    message: String,
    range: Range,
}

pub(crate) type PResult<T> = Result<T, SyntaxError>;

/// Parse a module's token stream into a tree rooted at a compilation unit.
pub fn parse(tokens: &[Token]) -> ParseResult {
    let mut p = Parser::new(tokens, false);
    let root = parse_compilation_unit(&mut p);
    p.ast.set_root(root);
    ParseResult {
        ast: p.ast,
        diagnostics: p.diagnostics,
    }
}

/// Parse a sequence of statements, optionally ending in a bare expression.
pub fn parse_repl(source: &str) -> ReplParse {
    let lexed = lex(source);
    let mut p = Parser::new(&lexed.tokens, true);
    p.diagnostics.extend(lexed.diagnostics);

    let start = p.peek().range;
    let mut statements = Vec::new();
    while !p.at(TokenKind::Eof) {
        let before = p.pos;
        match stmt::parse_statement(&mut p) {
            Ok(stmt) => statements.push(stmt),
            Err(err) => p.recover(err, before),
        }
    }
    let range = start.join(&p.prev_range());
    let root = p.ast.alloc(
        NodeKind::CompilationUnit {
            types: Vec::new(),
            statements: statements.clone(),
        },
        range,
    );
    p.ast.set_root(root);

    // A trailing value expression is only meaningful as the last statement.
    let value = p.repl_value.filter(|value| {
        statements
            .last()
            .is_some_and(|last| p.ast.kind(*last) == &NodeKind::ExprStmt(*value))
    });
    ReplParse {
        ast: p.ast,
        statements,
        value,
        diagnostics: p.diagnostics,
    }
}

pub(crate) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    pub(crate) ast: Ast,
    diagnostics: Vec<Diagnostic>,
    repl: bool,
    repl_value: Option<NodeId>,
    /// Name of the innermost type being parsed, to recognize constructors.
    type_names: Vec<String>,
}

impl Parser {
    fn new(tokens: &[Token], repl: bool) -> Self {
        let mut significant: Vec<Token> = tokens
            .iter()
            .filter(|t| !t.kind.is_layout())
            .cloned()
            .collect();
        if significant.last().is_none_or(|t| t.kind != TokenKind::Eof) {
            let end = significant.last().map(|t| t.range).unwrap_or_default();
            significant.push(Token {
                kind: TokenKind::Eof,
                value: crate::lexer::TokenValue::None,
                text: String::new(),
                range: Range::new(end.end_line, end.end_column, end.end_line, end.end_column),
            });
        }
        Self {
            tokens: significant,
            pos: 0,
            ast: Ast::new(),
            diagnostics: Vec::new(),
            repl,
            repl_value: None,
            type_names: Vec::new(),
        }
    }

    // ---------------------------------------------------------------------
    // Token access
    // ---------------------------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn token_at(&self, offset: usize) -> &Token {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)]
    }

    fn kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn kind_at(&self, offset: usize) -> TokenKind {
        self.token_at(offset).kind
    }

    /// Kind at an absolute token index.
    fn kind_abs(&self, index: usize) -> TokenKind {
        self.tokens[index.min(self.tokens.len() - 1)].kind
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> PResult<Token> {
        if self.at(kind) {
            Ok(self.bump())
        } else {
            self.error(format!("expected {what}"))
        }
    }

    fn expect_ident(&mut self) -> PResult<(String, Range)> {
        if self.at(TokenKind::Ident) {
            let token = self.bump();
            Ok((token.text, token.range))
        } else {
            self.error("expected identifier")
        }
    }

    /// Consume a `>` closing a type argument list, splitting `>>` and `>>>`.
    fn expect_gt(&mut self) -> PResult<()> {
        let token = self.peek().clone();
        let rest = match token.kind {
            TokenKind::Gt => {
                self.bump();
                return Ok(());
            }
            TokenKind::Shr => TokenKind::Gt,
            TokenKind::UShr => TokenKind::Shr,
            TokenKind::Ge => TokenKind::Assign,
            _ => return self.error("expected '>'"),
        };
        let split = &mut self.tokens[self.pos];
        split.kind = rest;
        split.text.remove(0);
        split.range.start_column += 1;
        Ok(())
    }

    fn prev_range(&self) -> Range {
        if self.pos == 0 {
            return self.peek().range;
        }
        self.tokens[self.pos - 1].range
    }

    fn range_from(&self, start: Range) -> Range {
        start.join(&self.prev_range())
    }

    // ---------------------------------------------------------------------
    // Errors and recovery
    // ---------------------------------------------------------------------

    fn error<T>(&self, message: impl Into<String>) -> PResult<T> {
        let token = self.peek();
        let found = if token.kind == TokenKind::Eof {
            "end of input".to_string()
        } else {
            format!("'{}'", token.text)
        };
        Err(SyntaxError {
            message: format!("{}, found {found}", message.into()),
            range: token.range,
        })
    }

    fn report(&mut self, message: impl Into<String>, range: Range) {
        self.diagnostics
            .push(Diagnostic::error(message, range).with_code("E0101"));
    }

    /// Record `err` and skip to the next statement or declaration boundary.
    fn recover(&mut self, err: SyntaxError, start_pos: usize) {
        self.report(err.message, err.range);
        if self.pos == start_pos {
            self.bump();
        }
        self.synchronize();
    }

    fn synchronize(&mut self) {
        loop {
            match self.kind() {
                TokenKind::Eof | TokenKind::RBrace => return,
                TokenKind::Semi => {
                    self.bump();
                    return;
                }
                TokenKind::Class
                | TokenKind::Interface
                | TokenKind::Enum
                | TokenKind::Public
                | TokenKind::Private
                | TokenKind::Protected
                | TokenKind::Static
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Do
                | TokenKind::For
                | TokenKind::Switch
                | TokenKind::Return
                | TokenKind::Try
                | TokenKind::Throw
                | TokenKind::Break
                | TokenKind::Continue => return,
                _ => {
                    self.bump();
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Types
    // ---------------------------------------------------------------------

    /// Token index just past a syntactically plausible type starting at
    /// `index`, without consuming anything.
    fn scan_type(&self, index: usize) -> Option<usize> {
        let mut i = index;
        if self.kind_abs(i) != TokenKind::Ident {
            return None;
        }
        i += 1;
        while self.kind_abs(i) == TokenKind::Dot && self.kind_abs(i + 1) == TokenKind::Ident {
            i += 2;
        }
        if self.kind_abs(i) == TokenKind::Lt {
            let mut depth: i32 = 1;
            i += 1;
            while depth > 0 {
                match self.kind_abs(i) {
                    TokenKind::Lt => depth += 1,
                    TokenKind::Gt => depth -= 1,
                    TokenKind::Shr => depth -= 2,
                    TokenKind::UShr => depth -= 3,
                    TokenKind::Ident
                    | TokenKind::Comma
                    | TokenKind::Dot
                    | TokenKind::Question
                    | TokenKind::Extends
                    | TokenKind::Super
                    | TokenKind::LBracket
                    | TokenKind::RBracket => {}
                    _ => return None,
                }
                i += 1;
            }
            if depth < 0 {
                return None;
            }
        }
        while self.kind_abs(i) == TokenKind::LBracket && self.kind_abs(i + 1) == TokenKind::RBracket
        {
            i += 2;
        }
        Some(i)
    }

    fn parse_type(&mut self) -> PResult<TypeExpr> {
        let mut ty = self.parse_type_without_dims()?;
        while self.at(TokenKind::LBracket) && self.kind_at(1) == TokenKind::RBracket {
            self.bump();
            self.bump();
            ty.dims += 1;
        }
        ty.range = self.range_from(ty.range);
        Ok(ty)
    }

    fn parse_type_without_dims(&mut self) -> PResult<TypeExpr> {
        let (mut name, start) = self.expect_ident()?;
        while self.at(TokenKind::Dot) && self.kind_at(1) == TokenKind::Ident {
            self.bump();
            let (part, _) = self.expect_ident()?;
            name.push('.');
            name.push_str(&part);
        }
        let mut ty = TypeExpr::named(name, start);
        if self.eat(TokenKind::Lt) {
            if !matches!(self.kind(), TokenKind::Gt | TokenKind::Shr | TokenKind::UShr) {
                loop {
                    ty.args.push(self.parse_type_argument()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect_gt()?;
        }
        ty.range = self.range_from(start);
        Ok(ty)
    }

    fn parse_type_argument(&mut self) -> PResult<TypeExpr> {
        if self.at(TokenKind::Question) {
            let start = self.bump().range;
            if self.eat(TokenKind::Extends) {
                return self.parse_type();
            }
            if self.eat(TokenKind::Super) {
                self.parse_type()?;
            }
            return Ok(TypeExpr::named("Object", self.range_from(start)));
        }
        self.parse_type()
    }

    fn parse_type_params(&mut self) -> PResult<Vec<TypeParam>> {
        let mut params = Vec::new();
        if !self.eat(TokenKind::Lt) {
            return Ok(params);
        }
        loop {
            let (name, range) = self.expect_ident()?;
            let bound = if self.eat(TokenKind::Extends) {
                let bound = self.parse_type()?;
                while self.eat(TokenKind::Amp) {
                    self.parse_type()?;
                }
                Some(bound)
            } else {
                None
            };
            params.push(TypeParam { name, bound, range });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect_gt()?;
        Ok(params)
    }

    fn parse_type_list(&mut self) -> PResult<Vec<TypeExpr>> {
        let mut types = vec![self.parse_type()?];
        while self.eat(TokenKind::Comma) {
            types.push(self.parse_type()?);
        }
        Ok(types)
    }

    // ---------------------------------------------------------------------
    // Modifiers
    // ---------------------------------------------------------------------

    fn parse_modifiers(&mut self) -> Modifiers {
        let mut modifiers = Modifiers::default();
        loop {
            match self.kind() {
                TokenKind::Public => modifiers.is_public = true,
                TokenKind::Private => modifiers.is_private = true,
                TokenKind::Protected => modifiers.is_protected = true,
                TokenKind::Static => modifiers.is_static = true,
                TokenKind::Final => modifiers.is_final = true,
                TokenKind::Abstract => modifiers.is_abstract = true,
                TokenKind::Default if self.kind_at(1) != TokenKind::Colon => {
                    modifiers.is_default = true
                }
                TokenKind::Annotation => {
                    let token = self.peek().clone();
                    modifiers.annotations.push(Annotation {
                        name: token.text.trim_start_matches('@').to_string(),
                        range: token.range,
                    });
                    self.bump();
                    // Annotation arguments are accepted and ignored.
                    if self.at(TokenKind::LParen) {
                        self.skip_balanced_parens();
                    }
                    continue;
                }
                TokenKind::Ident
                    if matches!(
                        self.peek().text.as_str(),
                        "synchronized" | "transient" | "volatile" | "native" | "strictfp"
                    ) && self.kind_at(1) != TokenKind::LParen
                        && self.kind_at(1) != TokenKind::Dot =>
                {
                    if self.kind_at(1) == TokenKind::Ident
                        || self.kind_at(1).is_modifier()
                        || self.kind_at(1) == TokenKind::Void
                    {
                        self.bump();
                        continue;
                    }
                    return modifiers;
                }
                _ => return modifiers,
            }
            self.bump();
        }
    }

    fn skip_balanced_parens(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.kind() {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        self.bump();
                        return;
                    }
                }
                TokenKind::Eof => return,
                _ => {}
            }
            self.bump();
        }
    }
}

// -------------------------------------------------------------------------
// Compilation units and declarations
// -------------------------------------------------------------------------

fn parse_compilation_unit(p: &mut Parser) -> NodeId {
    let start = p.peek().range;
    let mut types = Vec::new();
    let mut statements = Vec::new();

    while !p.at(TokenKind::Eof) {
        let before = p.pos;
        if p.at(TokenKind::Package) || p.at(TokenKind::Import) {
            while !p.at(TokenKind::Semi) && !p.at(TokenKind::Eof) {
                p.bump();
            }
            p.eat(TokenKind::Semi);
            continue;
        }
        if starts_type_decl(p) {
            let decl_start = p.peek().range;
            let modifiers = p.parse_modifiers();
            match parse_type_decl(p, modifiers, decl_start) {
                Ok(decl) => types.push(decl),
                Err(err) => p.recover(err, before),
            }
            continue;
        }
        if p.at(TokenKind::RBrace) {
            let range = p.bump().range;
            p.report("unexpected '}'", range);
            continue;
        }
        match stmt::parse_statement(p) {
            Ok(stmt) => statements.push(stmt),
            Err(err) => p.recover(err, before),
        }
    }

    let range = start.join(&p.prev_range());
    p.ast
        .alloc(NodeKind::CompilationUnit { types, statements }, range)
}

/// Modifiers and annotations followed by `class`, `interface` or `enum`.
fn starts_type_decl(p: &Parser) -> bool {
    let mut offset = 0;
    loop {
        match p.kind_at(offset) {
            TokenKind::Class | TokenKind::Interface | TokenKind::Enum => return true,
            kind if kind.is_modifier() || kind == TokenKind::Annotation => offset += 1,
            _ => return false,
        }
    }
}

fn parse_type_decl(p: &mut Parser, modifiers: Modifiers, start: Range) -> PResult<NodeId> {
    let kind = match p.kind() {
        TokenKind::Class => TypeDeclKind::Class,
        TokenKind::Interface => TypeDeclKind::Interface,
        TokenKind::Enum => TypeDeclKind::Enum,
        _ => return p.error("expected 'class', 'interface' or 'enum'"),
    };
    p.bump();
    let (name, name_range) = p.expect_ident()?;
    let type_params = p.parse_type_params()?;

    let mut extends = Vec::new();
    let mut implements = Vec::new();
    if p.eat(TokenKind::Extends) {
        extends = p.parse_type_list()?;
        if kind == TypeDeclKind::Class && extends.len() > 1 {
            let range = extends[1].range;
            p.report("a class can only extend one class", range);
            extends.truncate(1);
        }
    }
    if p.eat(TokenKind::Implements) {
        implements = p.parse_type_list()?;
    }

    p.expect(TokenKind::LBrace, "'{'")?;
    p.type_names.push(name.clone());
    let enum_constants = if kind == TypeDeclKind::Enum {
        parse_enum_constants(p)
    } else {
        Vec::new()
    };
    let members = parse_members(p);
    p.type_names.pop();
    p.expect(TokenKind::RBrace, "'}'")?;

    let range = p.range_from(start);
    Ok(p.ast.alloc(
        NodeKind::TypeDecl(TypeDecl {
            kind,
            name,
            name_range,
            modifiers,
            type_params,
            extends,
            implements,
            enum_constants,
            members,
        }),
        range,
    ))
}

fn parse_enum_constants(p: &mut Parser) -> Vec<NodeId> {
    let mut constants = Vec::new();
    while p.at(TokenKind::Ident) || p.at(TokenKind::Annotation) {
        let before = p.pos;
        match parse_enum_constant(p) {
            Ok(constant) => constants.push(constant),
            Err(err) => {
                p.recover(err, before);
                return constants;
            }
        }
        if !p.eat(TokenKind::Comma) {
            break;
        }
    }
    if !p.eat(TokenKind::Semi) && !p.at(TokenKind::RBrace) {
        let range = p.peek().range;
        p.report("expected ';' after enum constants", range);
    }
    constants
}

fn parse_enum_constant(p: &mut Parser) -> PResult<NodeId> {
    p.parse_modifiers();
    let (name, start) = p.expect_ident()?;
    let args = if p.at(TokenKind::LParen) {
        expr::parse_arguments(p)?
    } else {
        Vec::new()
    };
    if p.at(TokenKind::LBrace) {
        return p.error("enum constant bodies are not supported");
    }
    let range = p.range_from(start);
    Ok(p.ast.alloc(NodeKind::EnumConstant { name, args }, range))
}

fn parse_members(p: &mut Parser) -> Vec<NodeId> {
    let mut members = Vec::new();
    while !p.at(TokenKind::RBrace) && !p.at(TokenKind::Eof) {
        let before = p.pos;
        if p.eat(TokenKind::Semi) {
            continue;
        }
        match parse_member(p) {
            Ok(mut parsed) => members.append(&mut parsed),
            Err(err) => p.recover(err, before),
        }
    }
    members
}

/// Parse one member; a field declaration with several declarators yields
/// one node per variable.
fn parse_member(p: &mut Parser) -> PResult<Vec<NodeId>> {
    let start = p.peek().range;

    if p.at(TokenKind::LBrace) || (p.at(TokenKind::Static) && p.kind_at(1) == TokenKind::LBrace) {
        let is_static = p.eat(TokenKind::Static);
        let body = stmt::parse_block(p)?;
        let range = p.range_from(start);
        return Ok(vec![
            p.ast.alloc(NodeKind::Initializer { is_static, body }, range),
        ]);
    }

    let modifiers = p.parse_modifiers();
    if matches!(
        p.kind(),
        TokenKind::Class | TokenKind::Interface | TokenKind::Enum
    ) {
        return Ok(vec![parse_type_decl(p, modifiers, start)?]);
    }

    let type_params = p.parse_type_params()?;
    let is_constructor = p.at(TokenKind::Ident)
        && p.kind_at(1) == TokenKind::LParen
        && p.type_names.last().is_some_and(|n| *n == p.peek().text);

    if is_constructor {
        let (name, name_range) = p.expect_ident()?;
        return Ok(vec![parse_method_rest(
            p, start, modifiers, type_params, None, name, name_range,
        )?]);
    }

    let return_type = if p.at(TokenKind::Void) {
        let range = p.bump().range;
        TypeExpr::named("void", range)
    } else {
        p.parse_type()?
    };
    let (name, name_range) = p.expect_ident()?;

    if p.at(TokenKind::LParen) {
        return Ok(vec![parse_method_rest(
            p,
            start,
            modifiers,
            type_params,
            Some(return_type),
            name,
            name_range,
        )?]);
    }

    if return_type.name == "void" {
        return Err(SyntaxError {
            message: "fields cannot have type void".into(),
            range: return_type.range,
        });
    }

    let mut fields = Vec::new();
    let mut declarator = (name, name_range);
    loop {
        let mut ty = return_type.clone();
        while p.at(TokenKind::LBracket) && p.kind_at(1) == TokenKind::RBracket {
            p.bump();
            p.bump();
            ty.dims += 1;
        }
        let init = if p.eat(TokenKind::Assign) {
            Some(expr::parse_variable_initializer(p)?)
        } else {
            None
        };
        let range = p.range_from(start);
        fields.push(p.ast.alloc(
            NodeKind::Field {
                modifiers: modifiers.clone(),
                ty,
                name: declarator.0,
                name_range: declarator.1,
                init,
            },
            range,
        ));
        if !p.eat(TokenKind::Comma) {
            break;
        }
        declarator = p.expect_ident()?;
    }
    p.expect(TokenKind::Semi, "';' after field declaration")?;
    Ok(fields)
}

fn parse_method_rest(
    p: &mut Parser,
    start: Range,
    modifiers: Modifiers,
    type_params: Vec<TypeParam>,
    return_type: Option<TypeExpr>,
    name: String,
    name_range: Range,
) -> PResult<NodeId> {
    let params = parse_params(p)?;
    if p.eat(TokenKind::Throws) {
        p.parse_type_list()?;
    }
    let body = if p.eat(TokenKind::Semi) {
        None
    } else {
        Some(stmt::parse_block(p)?)
    };
    let range = p.range_from(start);
    Ok(p.ast.alloc(
        NodeKind::Method(crate::ast::MethodDecl {
            modifiers,
            type_params,
            return_type,
            name,
            name_range,
            params,
            body,
        }),
        range,
    ))
}

fn parse_params(p: &mut Parser) -> PResult<Vec<Param>> {
    p.expect(TokenKind::LParen, "'('")?;
    let mut params = Vec::new();
    if p.eat(TokenKind::RParen) {
        return Ok(params);
    }
    loop {
        p.parse_modifiers();
        let mut ty = p.parse_type()?;
        if p.eat(TokenKind::Ellipsis) {
            ty.dims += 1;
        }
        let (name, name_range) = p.expect_ident()?;
        while p.at(TokenKind::LBracket) && p.kind_at(1) == TokenKind::RBracket {
            p.bump();
            p.bump();
            ty.dims += 1;
        }
        params.push(Param {
            name,
            name_range,
            ty,
        });
        if !p.eat(TokenKind::Comma) {
            break;
        }
    }
    p.expect(TokenKind::RParen, "')'")?;
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, Literal};

    fn parse_source(source: &str) -> ParseResult {
        parse(&lex(source).tokens)
    }

    fn root_types(result: &ParseResult) -> Vec<NodeId> {
        let root = result.ast.root().expect("root");
        match result.ast.kind(root) {
            NodeKind::CompilationUnit { types, .. } => types.clone(),
            other => panic!("unexpected root {other:?}"),
        }
    }

    #[test]
    fn parses_class_with_members() {
        let result = parse_source(
            "public class Point {\n  private int x, y;\n  Point(int x) { this.x = x; }\n  int getX() { return x; }\n  static { }\n}",
        );
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        let types = root_types(&result);
        let NodeKind::TypeDecl(decl) = result.ast.kind(types[0]) else {
            panic!("expected type decl");
        };
        assert_eq!(decl.name, "Point");
        let kinds: Vec<&str> = decl
            .members
            .iter()
            .map(|m| match result.ast.kind(*m) {
                NodeKind::Field { .. } => "field",
                NodeKind::Method(m) if m.is_constructor() => "ctor",
                NodeKind::Method(_) => "method",
                NodeKind::Initializer { .. } => "init",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["field", "field", "ctor", "method", "init"]);
    }

    #[test]
    fn every_node_but_the_root_has_a_parent() {
        let result = parse_source(
            "class A { int f(int a) { if (a > 0) { return a * 2; } return -a; } }\nint z = 3;",
        );
        let root = result.ast.root().expect("root");
        for id in result.ast.ids() {
            if id == root {
                assert_eq!(result.ast.parent(id), None);
            } else {
                assert!(result.ast.parent(id).is_some(), "orphan {:?}", result.ast.node(id));
            }
        }
    }

    #[test]
    fn recovers_after_a_bad_statement() {
        let result = parse_source(
            "class A { void f() { int x = ; int y = 2; } void g() { } }",
        );
        assert_eq!(result.diagnostics.len(), 1, "{:?}", result.diagnostics);
        let types = root_types(&result);
        let NodeKind::TypeDecl(decl) = result.ast.kind(types[0]) else {
            panic!("expected type decl");
        };
        assert_eq!(decl.members.len(), 2);
    }

    #[test]
    fn splits_shift_tokens_in_nested_generics() {
        let result = parse_source("class A { java.util.List<List<String>> items; }");
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        let types = root_types(&result);
        let NodeKind::TypeDecl(decl) = result.ast.kind(types[0]) else {
            panic!("expected type decl");
        };
        let NodeKind::Field { ty, .. } = result.ast.kind(decl.members[0]) else {
            panic!("expected field");
        };
        assert_eq!(ty.to_string(), "java.util.List<List<String>>");
    }

    #[test]
    fn parses_enum_with_constructor_arguments() {
        let result = parse_source(
            "enum Coin { PENNY(1), DIME(10); private final int cents; Coin(int c) { cents = c; } }",
        );
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        let types = root_types(&result);
        let NodeKind::TypeDecl(decl) = result.ast.kind(types[0]) else {
            panic!("expected type decl");
        };
        assert_eq!(decl.kind, TypeDeclKind::Enum);
        assert_eq!(decl.enum_constants.len(), 2);
    }

    #[test]
    fn repl_snippet_yields_trailing_value() {
        let parsed = parse_repl("int a = 2; a * 21");
        assert!(parsed.diagnostics.is_empty(), "{:?}", parsed.diagnostics);
        assert_eq!(parsed.statements.len(), 2);
        let value = parsed.value.expect("value expression");
        assert!(matches!(
            parsed.ast.kind(value),
            NodeKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn repl_statement_with_semicolon_has_no_value() {
        let parsed = parse_repl("x = 5;");
        assert!(parsed.value.is_none());
        let parsed = parse_repl("-2147483648");
        let value = parsed.value.expect("value");
        assert_eq!(
            parsed.ast.kind(value),
            &NodeKind::Literal(Literal::Int(-2147483648))
        );
    }
}
