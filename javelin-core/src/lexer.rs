//! Lexer for Javelin sources.
//!
//! The lexer never aborts: malformed literals, unterminated strings and
//! stray characters are reported as diagnostics and a best-effort token is
//! synthesized so the parser always has something to work with. Layout
//! (whitespace, newlines, comments) is kept in the token stream, which makes
//! the token list a lossless image of the source text.

use serde::Serialize;

use crate::diagnostic::Diagnostic;
use crate::span::{Position, Range};

/// Kind of a token produced by the lexer.
///
/// Primitive type names (`int`, `double`, ...) are plain identifiers; the
/// parser and resolver give them meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Special
    Eof,
    Unknown,

    // Layout
    Whitespace,
    Newline,
    Comment,

    // Identifiers and literals
    Ident,
    IntLiteral,
    LongLiteral,
    FloatLiteral,
    DoubleLiteral,
    CharLiteral,
    StringLiteral,
    True,
    False,
    Null,
    Annotation, // @Name

    // Punctuation
    LParen,      // (
    RParen,      // )
    LBrace,      // {
    RBrace,      // }
    LBracket,    // [
    RBracket,    // ]
    Semi,        // ;
    Comma,       // ,
    Dot,         // .
    Ellipsis,    // ...
    Colon,       // :
    DoubleColon, // ::
    Question,    // ?
    Arrow,       // ->

    // Operators
    Assign,        // =
    PlusAssign,    // +=
    MinusAssign,   // -=
    StarAssign,    // *=
    SlashAssign,   // /=
    PercentAssign, // %=
    AmpAssign,     // &=
    PipeAssign,    // |=
    CaretAssign,   // ^=
    ShlAssign,     // <<=
    ShrAssign,     // >>=
    UShrAssign,    // >>>=
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,
    EqEq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    AndAnd,
    OrOr,
    Not,
    Tilde,
    Amp,
    Pipe,
    Caret,
    Shl,
    Shr,
    UShr,

    // Keywords
    Class,
    Interface,
    Enum,
    Extends,
    Implements,
    Public,
    Private,
    Protected,
    Static,
    Final,
    Abstract,
    Void,
    New,
    This,
    Super,
    Return,
    If,
    Else,
    While,
    Do,
    For,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Throw,
    Throws,
    Try,
    Catch,
    Finally,
    Instanceof,
    Package,
    Import,
}

impl TokenKind {
    pub fn is_layout(self) -> bool {
        matches!(
            self,
            TokenKind::Whitespace | TokenKind::Newline | TokenKind::Comment | TokenKind::Unknown
        )
    }

    pub fn is_assignment(self) -> bool {
        matches!(
            self,
            TokenKind::Assign
                | TokenKind::PlusAssign
                | TokenKind::MinusAssign
                | TokenKind::StarAssign
                | TokenKind::SlashAssign
                | TokenKind::PercentAssign
                | TokenKind::AmpAssign
                | TokenKind::PipeAssign
                | TokenKind::CaretAssign
                | TokenKind::ShlAssign
                | TokenKind::ShrAssign
                | TokenKind::UShrAssign
        )
    }

    pub fn is_modifier(self) -> bool {
        matches!(
            self,
            TokenKind::Public
                | TokenKind::Private
                | TokenKind::Protected
                | TokenKind::Static
                | TokenKind::Final
                | TokenKind::Abstract
        )
    }
}

/// Literal value carried by a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    None,
    Int(i64),
    Float(f64),
    Char(char),
    Str(String),
}

/// A single token with its kind, value, exact source text and range.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: TokenValue,
    /// The exact characters this token was lexed from.
    pub text: String,
    pub range: Range,
}

/// First bracket mismatch found in a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BracketError {
    pub message: String,
    /// The offending closer, or the still-open bracket at end of input.
    pub found: char,
    pub range: Range,
}

/// Color literal recognized in the source, for editor color decorations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColorHint {
    pub range: Range,
    pub rgb: u32,
}

/// Result of lexing a source file.
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<Token>,
    pub diagnostics: Vec<Diagnostic>,
    pub bracket_error: Option<BracketError>,
    pub color_hints: Vec<ColorHint>,
}

/// Lex a source string into tokens.
pub fn lex(source: &str) -> LexResult {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        index: 0,
        line: 1,
        column: 1,
        tokens: Vec::new(),
        diagnostics: Vec::new(),
        bracket_stack: Vec::new(),
        bracket_error: None,
    };
    lexer.run()
}

/// Concatenate the source text of `tokens`.
pub fn tokens_to_source(tokens: &[Token]) -> String {
    tokens.iter().map(|token| token.text.as_str()).collect()
}

const NAMED_COLORS: &[(&str, u32)] = &[
    ("black", 0x000000),
    ("white", 0xffffff),
    ("red", 0xff0000),
    ("green", 0x00ff00),
    ("blue", 0x0000ff),
    ("yellow", 0xffff00),
    ("cyan", 0x00ffff),
    ("magenta", 0xff00ff),
    ("orange", 0xffa500),
    ("gray", 0x808080),
    ("pink", 0xffc0cb),
    ("brown", 0xa52a2a),
];

struct Lexer {
    chars: Vec<char>,
    index: usize,
    line: u32,
    column: u32,
    tokens: Vec<Token>,
    diagnostics: Vec<Diagnostic>,
    bracket_stack: Vec<(char, Range)>,
    bracket_error: Option<BracketError>,
}

impl Lexer {
    fn run(&mut self) -> LexResult {
        while let Some(ch) = self.peek_char() {
            let start_index = self.index;
            let start = self.position();
            match ch {
                ' ' | '\t' | '\r' | '\u{a0}' => {
                    while matches!(self.peek_char(), Some(' ' | '\t' | '\r' | '\u{a0}')) {
                        self.consume_char();
                    }
                    self.push(TokenKind::Whitespace, TokenValue::None, start_index, start);
                }
                '\n' => {
                    self.consume_char();
                    self.push(TokenKind::Newline, TokenValue::None, start_index, start);
                }
                '(' | '[' | '{' => {
                    self.consume_char();
                    let kind = match ch {
                        '(' => TokenKind::LParen,
                        '[' => TokenKind::LBracket,
                        _ => TokenKind::LBrace,
                    };
                    let range = self.push(kind, TokenValue::None, start_index, start);
                    self.bracket_stack.push((ch, range));
                }
                ')' | ']' | '}' => {
                    self.consume_char();
                    let kind = match ch {
                        ')' => TokenKind::RParen,
                        ']' => TokenKind::RBracket,
                        _ => TokenKind::RBrace,
                    };
                    let range = self.push(kind, TokenValue::None, start_index, start);
                    self.close_bracket(ch, range);
                }
                ';' => self.op(1, TokenKind::Semi),
                ',' => self.op(1, TokenKind::Comma),
                '?' => self.op(1, TokenKind::Question),
                '~' => self.op(1, TokenKind::Tilde),
                ':' => {
                    if self.peek_next() == Some(':') {
                        self.op(2, TokenKind::DoubleColon)
                    } else {
                        self.op(1, TokenKind::Colon)
                    }
                }
                '.' => {
                    if self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
                        self.lex_number(start_index, start);
                    } else if self.peek_next() == Some('.') && self.peek_at(2) == Some('.') {
                        self.op(3, TokenKind::Ellipsis)
                    } else {
                        self.op(1, TokenKind::Dot)
                    }
                }
                '=' => self.op_eq(TokenKind::Assign, TokenKind::EqEq),
                '!' => self.op_eq(TokenKind::Not, TokenKind::NotEq),
                '*' => self.op_eq(TokenKind::Star, TokenKind::StarAssign),
                '%' => self.op_eq(TokenKind::Percent, TokenKind::PercentAssign),
                '^' => self.op_eq(TokenKind::Caret, TokenKind::CaretAssign),
                '<' => match (self.peek_next(), self.peek_at(2)) {
                    (Some('<'), Some('=')) => self.op(3, TokenKind::ShlAssign),
                    (Some('<'), _) => self.op(2, TokenKind::Shl),
                    (Some('='), _) => self.op(2, TokenKind::Le),
                    _ => self.op(1, TokenKind::Lt),
                },
                '>' => match (self.peek_next(), self.peek_at(2), self.peek_at(3)) {
                    (Some('>'), Some('>'), Some('=')) => self.op(4, TokenKind::UShrAssign),
                    (Some('>'), Some('>'), _) => self.op(3, TokenKind::UShr),
                    (Some('>'), Some('='), _) => self.op(3, TokenKind::ShrAssign),
                    (Some('>'), _, _) => self.op(2, TokenKind::Shr),
                    (Some('='), _, _) => self.op(2, TokenKind::Ge),
                    _ => self.op(1, TokenKind::Gt),
                },
                '+' => match self.peek_next() {
                    Some('+') => self.op(2, TokenKind::PlusPlus),
                    Some('=') => self.op(2, TokenKind::PlusAssign),
                    _ => self.op(1, TokenKind::Plus),
                },
                '-' => match self.peek_next() {
                    Some('-') => self.op(2, TokenKind::MinusMinus),
                    Some('=') => self.op(2, TokenKind::MinusAssign),
                    Some('>') => self.op(2, TokenKind::Arrow),
                    _ => self.op(1, TokenKind::Minus),
                },
                '&' => match self.peek_next() {
                    Some('&') => self.op(2, TokenKind::AndAnd),
                    Some('=') => self.op(2, TokenKind::AmpAssign),
                    _ => self.op(1, TokenKind::Amp),
                },
                '|' => match self.peek_next() {
                    Some('|') => self.op(2, TokenKind::OrOr),
                    Some('=') => self.op(2, TokenKind::PipeAssign),
                    _ => self.op(1, TokenKind::Pipe),
                },
                '/' => match self.peek_next() {
                    Some('/') => self.lex_line_comment(start_index, start),
                    Some('*') => self.lex_block_comment(start_index, start),
                    Some('=') => self.op(2, TokenKind::SlashAssign),
                    _ => self.op(1, TokenKind::Slash),
                },
                '"' => {
                    if self.peek_next() == Some('"') && self.peek_at(2) == Some('"') {
                        self.lex_text_block(start_index, start);
                    } else {
                        self.lex_string(start_index, start);
                    }
                }
                '\'' => self.lex_char(start_index, start),
                '@' => self.lex_annotation(start_index, start),
                c if c.is_ascii_digit() => self.lex_number(start_index, start),
                c if is_ident_start(c) => self.lex_ident_or_keyword(start_index, start),
                _ => {
                    self.consume_char();
                    let range = self.push(TokenKind::Unknown, TokenValue::None, start_index, start);
                    self.diagnostics.push(
                        Diagnostic::error(format!("unexpected character '{ch}'"), range)
                            .with_code("E0001"),
                    );
                }
            }
        }

        if self.bracket_error.is_none() {
            if let Some((open, range)) = self.bracket_stack.pop() {
                self.bracket_error = Some(BracketError {
                    message: format!("'{open}' is never closed, expected '{}'", closing_for(open)),
                    found: open,
                    range,
                });
            }
        }

        let eof = self.position();
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            value: TokenValue::None,
            text: String::new(),
            range: Range::from_positions(eof, eof),
        });

        let color_hints = collect_color_hints(&self.tokens);

        LexResult {
            tokens: core::mem::take(&mut self.tokens),
            diagnostics: core::mem::take(&mut self.diagnostics),
            bracket_error: self.bracket_error.take(),
            color_hints,
        }
    }

    fn push(&mut self, kind: TokenKind, value: TokenValue, start_index: usize, start: Position) -> Range {
        let range = Range::from_positions(start, self.position());
        let text: String = self.chars[start_index..self.index].iter().collect();
        self.tokens.push(Token {
            kind,
            value,
            text,
            range,
        });
        range
    }

    fn op(&mut self, len: usize, kind: TokenKind) {
        let start_index = self.index;
        let start = self.position();
        for _ in 0..len {
            self.consume_char();
        }
        self.push(kind, TokenValue::None, start_index, start);
    }

    fn op_eq(&mut self, single: TokenKind, with_eq: TokenKind) {
        if self.peek_next() == Some('=') {
            self.op(2, with_eq)
        } else {
            self.op(1, single)
        }
    }

    fn close_bracket(&mut self, close: char, range: Range) {
        let expected_open = match close {
            ')' => '(',
            ']' => '[',
            _ => '{',
        };
        match self.bracket_stack.pop() {
            Some((open, _)) if open == expected_open => {}
            Some((open, _)) => self.set_bracket_error(BracketError {
                message: format!("expected '{}' but found '{close}'", closing_for(open)),
                found: close,
                range,
            }),
            None => self.set_bracket_error(BracketError {
                message: format!("'{close}' has no matching '{expected_open}'"),
                found: close,
                range,
            }),
        }
    }

    fn set_bracket_error(&mut self, error: BracketError) {
        if self.bracket_error.is_none() {
            self.bracket_error = Some(error);
        }
    }

    fn lex_line_comment(&mut self, start_index: usize, start: Position) {
        while let Some(ch) = self.peek_char() {
            if ch == '\n' {
                break;
            }
            self.consume_char();
        }
        self.push(TokenKind::Comment, TokenValue::None, start_index, start);
    }

    fn lex_block_comment(&mut self, start_index: usize, start: Position) {
        self.consume_char(); // '/'
        self.consume_char(); // '*'
        loop {
            match self.peek_char() {
                Some('*') if self.peek_next() == Some('/') => {
                    self.consume_char();
                    self.consume_char();
                    break;
                }
                Some(_) => self.consume_char(),
                None => {
                    let range = Range::from_positions(start, self.position());
                    self.diagnostics.push(
                        Diagnostic::error("end of file inside block comment", range)
                            .with_code("E0002"),
                    );
                    break;
                }
            }
        }
        self.push(TokenKind::Comment, TokenValue::None, start_index, start);
    }

    fn lex_string(&mut self, start_index: usize, start: Position) {
        self.consume_char(); // opening quote
        let mut text = String::new();
        loop {
            match self.peek_char() {
                Some('"') => {
                    self.consume_char();
                    break;
                }
                Some('\\') => {
                    if let Some(c) = self.lex_escape() {
                        text.push(c);
                    }
                }
                Some('\n') | None => {
                    let range = Range::from_positions(start, self.position());
                    self.diagnostics.push(
                        Diagnostic::error("unterminated string literal", range).with_code("E0003"),
                    );
                    break;
                }
                Some(c) => {
                    text.push(c);
                    self.consume_char();
                }
            }
        }
        self.push(TokenKind::StringLiteral, TokenValue::Str(text), start_index, start);
    }

    fn lex_text_block(&mut self, start_index: usize, start: Position) {
        for _ in 0..3 {
            self.consume_char();
        }

        let rest_start = self.position();
        let mut rest = String::new();
        while let Some(ch) = self.peek_char() {
            if ch == '\n' {
                break;
            }
            rest.push(ch);
            self.consume_char();
        }
        let rest = rest.trim();
        if !rest.is_empty() && !rest.starts_with("//") && !rest.starts_with("/*") {
            let range = Range::from_positions(rest_start, self.position());
            self.diagnostics.push(
                Diagnostic::error("text block content must start on a new line", range)
                    .with_code("E0004"),
            );
        }
        if self.peek_char() == Some('\n') {
            self.consume_char();
        }

        let mut lines: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut terminated = false;
        while let Some(ch) = self.peek_char() {
            match ch {
                '"' if self.peek_next() == Some('"') && self.peek_at(2) == Some('"') => {
                    for _ in 0..3 {
                        self.consume_char();
                    }
                    terminated = true;
                    break;
                }
                '\\' => {
                    if let Some(c) = self.lex_escape() {
                        current.push(c);
                    }
                }
                '\r' => self.consume_char(),
                '\n' => {
                    self.consume_char();
                    lines.push(core::mem::take(&mut current));
                }
                c => {
                    current.push(c);
                    self.consume_char();
                }
            }
        }
        if !terminated {
            let range = Range::from_positions(start, self.position());
            self.diagnostics.push(
                Diagnostic::error("end of file inside text block", range).with_code("E0005"),
            );
        }

        // The closing line decides how much indentation is stripped.
        let indent = current.chars().take_while(|c| *c == ' ' || *c == '\t').count();
        if !current.trim().is_empty() {
            lines.push(current);
        }
        let text = lines
            .iter()
            .map(|line| strip_indent(line, indent))
            .collect::<Vec<_>>()
            .join("\n");
        self.push(TokenKind::StringLiteral, TokenValue::Str(text), start_index, start);
    }

    /// Consume a backslash escape and return the character it denotes.
    fn lex_escape(&mut self) -> Option<char> {
        let start = self.position();
        self.consume_char(); // '\'
        let Some(ch) = self.peek_char() else {
            return None;
        };
        let simple = match ch {
            'n' => Some('\n'),
            't' => Some('\t'),
            'r' => Some('\r'),
            'b' => Some('\u{8}'),
            'f' => Some('\u{c}'),
            '0' => Some('\0'),
            's' => Some(' '),
            '\'' => Some('\''),
            '"' => Some('"'),
            '\\' => Some('\\'),
            _ => None,
        };
        if let Some(c) = simple {
            self.consume_char();
            return Some(c);
        }
        if ch == 'u' {
            self.consume_char();
            let mut hex = String::new();
            while hex.len() < 4 && self.peek_char().is_some_and(|c| c.is_ascii_hexdigit()) {
                hex.extend(self.peek_char());
                self.consume_char();
            }
            if let Some(c) = u32::from_str_radix(&hex, 16).ok().filter(|_| hex.len() == 4).and_then(char::from_u32) {
                return Some(c);
            }
            let range = Range::from_positions(start, self.position());
            self.diagnostics.push(
                Diagnostic::error(format!("invalid unicode escape '\\u{hex}'"), range)
                    .with_code("E0006"),
            );
            return None;
        }
        if ch != '\n' {
            self.consume_char();
        }
        let range = Range::from_positions(start, self.position());
        self.diagnostics.push(
            Diagnostic::error(format!("unknown escape sequence '\\{ch}'"), range).with_code("E0006"),
        );
        None
    }

    fn lex_char(&mut self, start_index: usize, start: Position) {
        self.consume_char(); // opening quote
        let value = match self.peek_char() {
            Some('\\') => self.lex_escape(),
            Some('\'') | Some('\n') | None => None,
            Some(c) => {
                self.consume_char();
                Some(c)
            }
        };
        if self.peek_char() == Some('\'') {
            self.consume_char();
        } else {
            let range = Range::from_positions(start, self.position());
            self.diagnostics.push(
                Diagnostic::error("expected ' to end the character literal", range)
                    .with_code("E0007"),
            );
        }
        let value = value.unwrap_or(' ');
        self.push(TokenKind::CharLiteral, TokenValue::Char(value), start_index, start);
    }

    fn lex_annotation(&mut self, start_index: usize, start: Position) {
        self.consume_char(); // '@'
        let mut name = String::new();
        while let Some(ch) = self.peek_char() {
            if is_ident_continue(ch) {
                name.push(ch);
                self.consume_char();
            } else {
                break;
            }
        }
        let range = self.push(TokenKind::Annotation, TokenValue::Str(name.clone()), start_index, start);
        if name.is_empty() {
            self.diagnostics.push(
                Diagnostic::error("expected annotation name after '@'", range).with_code("E0008"),
            );
        }
    }

    fn lex_number(&mut self, start_index: usize, start: Position) {
        let mut radix = 10;
        if self.peek_char() == Some('0') {
            match self.peek_next() {
                Some('x' | 'X') => radix = 16,
                Some('b' | 'B') => radix = 2,
                Some('0'..='7') => radix = 8,
                _ => {}
            }
        }
        if radix == 16 || radix == 2 {
            self.consume_char();
            self.consume_char();
        }

        let mut digits = String::new();
        let mut is_float = false;
        self.lex_digits(radix.max(10), &mut digits);

        if self.peek_char() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit() || !is_ident_start(c) && c != '.') {
            is_float = true;
            digits.push('.');
            self.consume_char();
            self.lex_digits(10, &mut digits);
        }
        if matches!(self.peek_char(), Some('e' | 'E')) && radix != 16 {
            let sign_ok = match self.peek_next() {
                Some('+' | '-') => self.peek_at(2).is_some_and(|c| c.is_ascii_digit()),
                Some(c) => c.is_ascii_digit(),
                None => false,
            };
            if sign_ok {
                is_float = true;
                digits.push('e');
                self.consume_char();
                if let Some(sign @ ('+' | '-')) = self.peek_char() {
                    digits.push(sign);
                    self.consume_char();
                }
                self.lex_digits(10, &mut digits);
            }
        }

        let mut kind = if is_float {
            TokenKind::DoubleLiteral
        } else {
            TokenKind::IntLiteral
        };
        match self.peek_char() {
            Some('L' | 'l') if !is_float => {
                kind = TokenKind::LongLiteral;
                self.consume_char();
            }
            Some('f' | 'F') => {
                kind = TokenKind::FloatLiteral;
                self.consume_char();
            }
            Some('d' | 'D') => {
                kind = TokenKind::DoubleLiteral;
                self.consume_char();
            }
            _ => {}
        }

        let end_range = Range::from_positions(start, self.position());
        let is_floating = matches!(kind, TokenKind::FloatLiteral | TokenKind::DoubleLiteral);
        let value = if is_floating {
            if radix != 10 && radix != 8 {
                self.diagnostics.push(
                    Diagnostic::error("floating point literals must be decimal", end_range)
                        .with_code("E0009"),
                );
            }
            TokenValue::Float(digits.parse::<f64>().unwrap_or(0.0))
        } else {
            let parsed = if digits.is_empty() {
                None
            } else if radix == 8 {
                i64::from_str_radix(&digits, 8).ok()
            } else {
                i64::from_str_radix(&digits, radix).ok()
            };
            let limit: i64 = if kind == TokenKind::LongLiteral {
                i64::MAX
            } else if radix == 10 {
                // 2147483648 is accepted so that the parser can negate it.
                1 << 31
            } else {
                u32::MAX as i64
            };
            match parsed {
                Some(v) if v <= limit => {
                    // Hex/binary/octal ints wrap like Java: 0xFFFFFFFF == -1.
                    if kind == TokenKind::IntLiteral && radix != 10 {
                        TokenValue::Int(v as u32 as i32 as i64)
                    } else {
                        TokenValue::Int(v)
                    }
                }
                _ => {
                    self.diagnostics.push(
                        Diagnostic::error("malformed or out of range integer literal", end_range)
                            .with_code("E0010"),
                    );
                    TokenValue::Int(0)
                }
            }
        };
        self.push(kind, value, start_index, start);

        // Trailing identifier characters glued to a number, like `12abc`.
        if self.peek_char().is_some_and(is_ident_start) {
            let junk_index = self.index;
            let junk_start = self.position();
            while self.peek_char().is_some_and(is_ident_continue) {
                self.consume_char();
            }
            let range = self.push(TokenKind::Unknown, TokenValue::None, junk_index, junk_start);
            self.diagnostics.push(
                Diagnostic::error("unexpected characters after number", range).with_code("E0010"),
            );
        }
    }

    fn lex_digits(&mut self, radix: u32, digits: &mut String) {
        while let Some(ch) = self.peek_char() {
            if ch == '_' {
                self.consume_char();
            } else if ch.is_digit(radix) {
                digits.push(ch);
                self.consume_char();
            } else {
                break;
            }
        }
    }

    fn lex_ident_or_keyword(&mut self, start_index: usize, start: Position) {
        while self.peek_char().is_some_and(is_ident_continue) {
            self.consume_char();
        }
        let text: String = self.chars[start_index..self.index].iter().collect();
        let kind = keyword(&text).unwrap_or(TokenKind::Ident);
        self.push(kind, TokenValue::None, start_index, start);
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.peek_at(1)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.index + offset).copied()
    }

    fn consume_char(&mut self) {
        if let Some(ch) = self.peek_char() {
            self.index += 1;
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }
}

fn keyword(text: &str) -> Option<TokenKind> {
    let kind = match text {
        "class" => TokenKind::Class,
        "interface" => TokenKind::Interface,
        "enum" => TokenKind::Enum,
        "extends" => TokenKind::Extends,
        "implements" => TokenKind::Implements,
        "public" => TokenKind::Public,
        "private" => TokenKind::Private,
        "protected" => TokenKind::Protected,
        "static" => TokenKind::Static,
        "final" => TokenKind::Final,
        "abstract" => TokenKind::Abstract,
        "void" => TokenKind::Void,
        "new" => TokenKind::New,
        "this" => TokenKind::This,
        "super" => TokenKind::Super,
        "return" => TokenKind::Return,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "do" => TokenKind::Do,
        "for" => TokenKind::For,
        "switch" => TokenKind::Switch,
        "case" => TokenKind::Case,
        "default" => TokenKind::Default,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "throw" => TokenKind::Throw,
        "throws" => TokenKind::Throws,
        "try" => TokenKind::Try,
        "catch" => TokenKind::Catch,
        "finally" => TokenKind::Finally,
        "instanceof" => TokenKind::Instanceof,
        "package" => TokenKind::Package,
        "import" => TokenKind::Import,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        _ => return None,
    };
    Some(kind)
}

fn closing_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

fn strip_indent(line: &str, indent: usize) -> &str {
    let mut stripped = 0;
    let mut offset = 0;
    for (i, c) in line.char_indices() {
        if stripped == indent || !(c == ' ' || c == '\t') {
            offset = i;
            break;
        }
        stripped += 1;
        offset = i + c.len_utf8();
    }
    &line[offset..]
}

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '$'
}

fn is_ident_continue(ch: char) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}

fn collect_color_hints(tokens: &[Token]) -> Vec<ColorHint> {
    let significant: Vec<&Token> = tokens.iter().filter(|t| !t.kind.is_layout()).collect();
    let mut hints = Vec::new();

    for (i, token) in significant.iter().enumerate() {
        match token.kind {
            TokenKind::IntLiteral => {
                let text = token.text.replace('_', "");
                if text.len() == 8 && (text.starts_with("0x") || text.starts_with("0X")) {
                    if let TokenValue::Int(v) = token.value {
                        hints.push(ColorHint {
                            range: token.range,
                            rgb: (v as u32) & 0xff_ffff,
                        });
                    }
                }
            }
            TokenKind::Ident if token.text == "Color" => {
                let previous_is_new = i > 0 && significant[i - 1].kind == TokenKind::New;
                if previous_is_new {
                    if let Some(rgb) = constructor_color(&significant[i + 1..]) {
                        let end = significant[i + 7].range;
                        hints.push(ColorHint {
                            range: significant[i - 1].range.join(&end),
                            rgb,
                        });
                    }
                } else if let (Some(dot), Some(name)) = (significant.get(i + 1), significant.get(i + 2)) {
                    if dot.kind == TokenKind::Dot && name.kind == TokenKind::Ident {
                        if let Some((_, rgb)) = NAMED_COLORS.iter().find(|(n, _)| *n == name.text) {
                            hints.push(ColorHint {
                                range: token.range.join(&name.range),
                                rgb: *rgb,
                            });
                        }
                    }
                }
            }
            _ => {}
        }
    }
    hints
}

/// Match `( int , int , int )` following `new Color`.
fn constructor_color(rest: &[&Token]) -> Option<u32> {
    use TokenKind::*;
    let pattern = [LParen, IntLiteral, Comma, IntLiteral, Comma, IntLiteral, RParen];
    if rest.len() < pattern.len() || rest.iter().zip(pattern).any(|(t, k)| t.kind != k) {
        return None;
    }
    let component = |token: &Token| match token.value {
        TokenValue::Int(v) => Some(v.clamp(0, 255) as u32),
        _ => None,
    };
    let (r, g, b) = (component(rest[1])?, component(rest[3])?, component(rest[5])?);
    Some((r << 16) | (g << 8) | b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source)
            .tokens
            .into_iter()
            .filter(|t| !t.kind.is_layout())
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_longest_match_operators() {
        assert_eq!(
            kinds("a >>>= b >> c >= d -> e"),
            vec![
                TokenKind::Ident,
                TokenKind::UShrAssign,
                TokenKind::Ident,
                TokenKind::Shr,
                TokenKind::Ident,
                TokenKind::Ge,
                TokenKind::Ident,
                TokenKind::Arrow,
                TokenKind::Ident,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn records_ranges_with_one_based_columns() {
        let result = lex("int x;\n  y = 2;");
        let y = result.tokens.iter().find(|t| t.text == "y").expect("y token");
        assert_eq!(y.range, Range::new(2, 3, 2, 4));
    }

    #[test]
    fn balanced_input_has_no_bracket_error() {
        let result = lex("class A { void f() { int[] a = new int[3]; } }");
        assert!(result.bracket_error.is_none());
    }

    #[test]
    fn reports_unmatched_closer_as_first_mismatch() {
        let result = lex("f(a));\ng(b);");
        let error = result.bracket_error.expect("bracket error");
        assert_eq!(error.found, ')');
        assert_eq!(error.range, Range::new(1, 5, 1, 6));
    }

    #[test]
    fn reports_only_first_mismatch() {
        let result = lex("( ] }");
        let error = result.bracket_error.expect("bracket error");
        assert_eq!(error.found, ']');
    }

    #[test]
    fn reports_still_open_bracket_at_end_of_input() {
        let result = lex("class A {");
        let error = result.bracket_error.expect("bracket error");
        assert_eq!(error.found, '{');
    }

    #[test]
    fn lexes_numeric_literals() {
        let result = lex("0x1F 0b101 017 1_000 2.5e3 3f 10L 4d");
        let values: Vec<(TokenKind, TokenValue)> = result
            .tokens
            .into_iter()
            .filter(|t| !t.kind.is_layout() && t.kind != TokenKind::Eof)
            .map(|t| (t.kind, t.value))
            .collect();
        assert_eq!(
            values,
            vec![
                (TokenKind::IntLiteral, TokenValue::Int(31)),
                (TokenKind::IntLiteral, TokenValue::Int(5)),
                (TokenKind::IntLiteral, TokenValue::Int(15)),
                (TokenKind::IntLiteral, TokenValue::Int(1000)),
                (TokenKind::DoubleLiteral, TokenValue::Float(2500.0)),
                (TokenKind::FloatLiteral, TokenValue::Float(3.0)),
                (TokenKind::LongLiteral, TokenValue::Int(10)),
                (TokenKind::DoubleLiteral, TokenValue::Float(4.0)),
            ]
        );
    }

    #[test]
    fn unterminated_string_yields_token_and_diagnostic() {
        let result = lex("String s = \"abc\nint x;");
        assert_eq!(result.diagnostics.len(), 1);
        let string = result
            .tokens
            .iter()
            .find(|t| t.kind == TokenKind::StringLiteral)
            .expect("string token");
        assert_eq!(string.value, TokenValue::Str("abc".into()));
        assert!(result.tokens.iter().any(|t| t.text == "int"));
    }

    #[test]
    fn decodes_character_escapes() {
        let result = lex(r"'\n' 'A' 'x'");
        let chars: Vec<TokenValue> = result
            .tokens
            .into_iter()
            .filter(|t| t.kind == TokenKind::CharLiteral)
            .map(|t| t.value)
            .collect();
        assert_eq!(
            chars,
            vec![TokenValue::Char('\n'), TokenValue::Char('A'), TokenValue::Char('x')]
        );
    }

    #[test]
    fn text_block_strips_closing_line_indentation() {
        let source = "String s = \"\"\"\n    Hello\n      World\n    \"\"\";";
        let result = lex(source);
        assert!(result.diagnostics.is_empty());
        let string = result
            .tokens
            .iter()
            .find(|t| t.kind == TokenKind::StringLiteral)
            .expect("string token");
        assert_eq!(string.value, TokenValue::Str("Hello\n  World".into()));
    }

    #[test]
    fn lexes_annotations_and_comments() {
        let result = lex("@Test // note\n/* block */ void");
        let kinds: Vec<TokenKind> = result.tokens.iter().map(|t| t.kind).collect();
        assert!(kinds.contains(&TokenKind::Annotation));
        assert_eq!(kinds.iter().filter(|k| **k == TokenKind::Comment).count(), 2);
        assert!(kinds.contains(&TokenKind::Void));
    }

    #[test]
    fn token_text_round_trips_source() {
        let source = "class A {\n  // hi\n  int x = 0x10 + 'c'; String s = \"a\\tb\";\n}\n";
        let result = lex(source);
        assert_eq!(tokens_to_source(&result.tokens), source);
    }

    #[test]
    fn collects_color_hints() {
        let result = lex("int c = 0xff8000; Color k = new Color(255, 0, 0); x = Color.blue;");
        let rgbs: Vec<u32> = result.color_hints.iter().map(|h| h.rgb).collect();
        assert_eq!(rgbs, vec![0xff8000, 0xff0000, 0x0000ff]);
    }

    #[test]
    fn unknown_character_is_reported_and_kept() {
        let result = lex("int # x;");
        assert_eq!(result.diagnostics.len(), 1);
        assert!(result.tokens.iter().any(|t| t.kind == TokenKind::Unknown));
    }
}
