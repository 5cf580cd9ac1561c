// Expression parsing: precedence climbing over binary operators, with
// prefix/postfix handling and cast/lambda disambiguation by lookahead.

use crate::ast::{BinaryOp, LambdaParam, Literal, NodeId, NodeKind, UnaryOp};
use crate::lexer::{TokenKind, TokenValue};

use super::stmt::parse_block;
use super::{PResult, Parser, SyntaxError};

const PRIMITIVE_NAMES: &[&str] = &[
    "boolean", "byte", "short", "int", "long", "float", "double", "char",
];

pub fn is_primitive_name(name: &str) -> bool {
    PRIMITIVE_NAMES.contains(&name)
}

/// Relational precedence, shared with `instanceof`.
const RELATIONAL: u8 = 7;

fn binary_op(kind: TokenKind) -> Option<(u8, BinaryOp)> {
    let op = match kind {
        TokenKind::OrOr => (1, BinaryOp::Or),
        TokenKind::AndAnd => (2, BinaryOp::And),
        TokenKind::Pipe => (3, BinaryOp::BitOr),
        TokenKind::Caret => (4, BinaryOp::BitXor),
        TokenKind::Amp => (5, BinaryOp::BitAnd),
        TokenKind::EqEq => (6, BinaryOp::Eq),
        TokenKind::NotEq => (6, BinaryOp::Ne),
        TokenKind::Lt => (RELATIONAL, BinaryOp::Lt),
        TokenKind::Gt => (RELATIONAL, BinaryOp::Gt),
        TokenKind::Le => (RELATIONAL, BinaryOp::Le),
        TokenKind::Ge => (RELATIONAL, BinaryOp::Ge),
        TokenKind::Shl => (8, BinaryOp::Shl),
        TokenKind::Shr => (8, BinaryOp::Shr),
        TokenKind::UShr => (8, BinaryOp::UShr),
        TokenKind::Plus => (9, BinaryOp::Add),
        TokenKind::Minus => (9, BinaryOp::Sub),
        TokenKind::Star => (10, BinaryOp::Mul),
        TokenKind::Slash => (10, BinaryOp::Div),
        TokenKind::Percent => (10, BinaryOp::Rem),
        _ => return None,
    };
    Some(op)
}

fn compound_op(kind: TokenKind) -> Option<BinaryOp> {
    let op = match kind {
        TokenKind::PlusAssign => BinaryOp::Add,
        TokenKind::MinusAssign => BinaryOp::Sub,
        TokenKind::StarAssign => BinaryOp::Mul,
        TokenKind::SlashAssign => BinaryOp::Div,
        TokenKind::PercentAssign => BinaryOp::Rem,
        TokenKind::AmpAssign => BinaryOp::BitAnd,
        TokenKind::PipeAssign => BinaryOp::BitOr,
        TokenKind::CaretAssign => BinaryOp::BitXor,
        TokenKind::ShlAssign => BinaryOp::Shl,
        TokenKind::ShrAssign => BinaryOp::Shr,
        TokenKind::UShrAssign => BinaryOp::UShr,
        _ => return None,
    };
    Some(op)
}

pub(super) fn parse_expression(p: &mut Parser) -> PResult<NodeId> {
    if starts_lambda(p) {
        return parse_lambda(p);
    }
    let target = parse_conditional_expression(p)?;
    let kind = p.kind();
    if !kind.is_assignment() {
        return Ok(target);
    }
    if !matches!(
        p.ast.kind(target),
        NodeKind::Name(_) | NodeKind::FieldAccess { .. } | NodeKind::ArrayAccess { .. }
    ) {
        return p.error("invalid assignment target");
    }
    p.bump();
    let value = if p.at(TokenKind::LBrace) {
        parse_array_init(p)?
    } else {
        parse_expression(p)?
    };
    let range = p.ast.range(target).join(&p.ast.range(value));
    Ok(p.ast.alloc(
        NodeKind::Assign {
            op: compound_op(kind),
            target,
            value,
        },
        range,
    ))
}

/// Initializer of a field or local: an expression or an array initializer.
pub(super) fn parse_variable_initializer(p: &mut Parser) -> PResult<NodeId> {
    if p.at(TokenKind::LBrace) {
        parse_array_init(p)
    } else {
        parse_expression(p)
    }
}

pub(super) fn parse_conditional_expression(p: &mut Parser) -> PResult<NodeId> {
    let cond = parse_binary(p, 1)?;
    if !p.eat(TokenKind::Question) {
        return Ok(cond);
    }
    let then = parse_expression(p)?;
    p.expect(TokenKind::Colon, "':'")?;
    let otherwise = if starts_lambda(p) {
        parse_lambda(p)?
    } else {
        parse_conditional_expression(p)?
    };
    let range = p.ast.range(cond).join(&p.ast.range(otherwise));
    Ok(p.ast.alloc(
        NodeKind::Conditional {
            cond,
            then,
            otherwise,
        },
        range,
    ))
}

fn parse_binary(p: &mut Parser, min_prec: u8) -> PResult<NodeId> {
    let mut left = parse_unary(p)?;
    loop {
        if p.at(TokenKind::Instanceof) && RELATIONAL >= min_prec {
            p.bump();
            let ty = p.parse_type()?;
            if p.at(TokenKind::Ident) {
                return p.error("pattern matching instanceof is not supported");
            }
            let range = p.ast.range(left).join(&ty.range);
            left = p.ast.alloc(NodeKind::InstanceOf { expr: left, ty }, range);
            continue;
        }
        let Some((prec, op)) = binary_op(p.kind()) else {
            break;
        };
        if prec < min_prec {
            break;
        }
        p.bump();
        let right = parse_binary(p, prec + 1)?;
        let range = p.ast.range(left).join(&p.ast.range(right));
        left = p.ast.alloc(NodeKind::Binary { op, left, right }, range);
    }
    Ok(left)
}

fn parse_unary(p: &mut Parser) -> PResult<NodeId> {
    let start = p.peek().range;
    let op = match p.kind() {
        TokenKind::Minus => {
            if let Some(literal) = negated_literal(p) {
                p.bump();
                p.bump();
                let range = p.range_from(start);
                return Ok(p.ast.alloc(NodeKind::Literal(literal), range));
            }
            Some(UnaryOp::Neg)
        }
        TokenKind::Plus => Some(UnaryOp::Plus),
        TokenKind::Not => Some(UnaryOp::Not),
        TokenKind::Tilde => Some(UnaryOp::BitNot),
        TokenKind::PlusPlus => Some(UnaryOp::PreInc),
        TokenKind::MinusMinus => Some(UnaryOp::PreDec),
        _ => None,
    };
    if let Some(op) = op {
        p.bump();
        let operand = parse_unary(p)?;
        let range = start.join(&p.ast.range(operand));
        return Ok(p.ast.alloc(NodeKind::Unary { op, operand }, range));
    }

    if let Some(close) = cast_close_paren(p) {
        p.bump();
        let ty = p.parse_type()?;
        debug_assert_eq!(p.pos, close);
        p.expect(TokenKind::RParen, "')'")?;
        let expr = if starts_lambda(p) {
            parse_lambda(p)?
        } else {
            parse_unary(p)?
        };
        let range = start.join(&p.ast.range(expr));
        return Ok(p.ast.alloc(NodeKind::Cast { ty, expr }, range));
    }

    let primary = parse_primary(p)?;
    parse_postfix(p, primary)
}

/// `-` directly followed by an integer literal folds into one literal, so
/// that `-2147483648` is representable.
fn negated_literal(p: &Parser) -> Option<Literal> {
    let token = p.token_at(1);
    match (token.kind, &token.value) {
        (TokenKind::IntLiteral, TokenValue::Int(v)) => Some(Literal::Int(-v)),
        (TokenKind::LongLiteral, TokenValue::Int(v)) => Some(Literal::Long(v.wrapping_neg())),
        _ => None,
    }
}

/// Index of the `)` closing a cast at the current position, if any.
fn cast_close_paren(p: &Parser) -> Option<usize> {
    if !p.at(TokenKind::LParen) {
        return None;
    }
    let after_type = p.scan_type(p.pos + 1)?;
    if p.kind_abs(after_type) != TokenKind::RParen {
        return None;
    }
    let type_token = &p.tokens[p.pos + 1];
    let is_primitive = is_primitive_name(&type_token.text) && p.kind_abs(p.pos + 2) != TokenKind::Dot;
    if is_primitive {
        return Some(after_type);
    }
    let follows_cast = matches!(
        p.kind_abs(after_type + 1),
        TokenKind::Ident
            | TokenKind::IntLiteral
            | TokenKind::LongLiteral
            | TokenKind::FloatLiteral
            | TokenKind::DoubleLiteral
            | TokenKind::CharLiteral
            | TokenKind::StringLiteral
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Null
            | TokenKind::LParen
            | TokenKind::Not
            | TokenKind::Tilde
            | TokenKind::This
            | TokenKind::Super
            | TokenKind::New
    );
    follows_cast.then_some(after_type)
}

fn starts_lambda(p: &Parser) -> bool {
    match p.kind() {
        TokenKind::Ident => p.kind_at(1) == TokenKind::Arrow,
        TokenKind::LParen => {
            let mut depth = 0usize;
            let mut i = p.pos;
            loop {
                match p.kind_abs(i) {
                    TokenKind::LParen => depth += 1,
                    TokenKind::RParen => {
                        depth -= 1;
                        if depth == 0 {
                            return p.kind_abs(i + 1) == TokenKind::Arrow;
                        }
                    }
                    TokenKind::Eof | TokenKind::Semi | TokenKind::LBrace => return false,
                    _ => {}
                }
                i += 1;
            }
        }
        _ => false,
    }
}

fn parse_lambda(p: &mut Parser) -> PResult<NodeId> {
    let start = p.peek().range;
    let mut params = Vec::new();
    if p.at(TokenKind::Ident) {
        let (name, name_range) = p.expect_ident()?;
        params.push(LambdaParam {
            name,
            name_range,
            ty: None,
        });
    } else {
        p.expect(TokenKind::LParen, "'('")?;
        if !p.at(TokenKind::RParen) {
            loop {
                p.parse_modifiers();
                let typed = p.kind_at(1) != TokenKind::Comma && p.kind_at(1) != TokenKind::RParen;
                let ty = if typed { Some(p.parse_type()?) } else { None };
                let (name, name_range) = p.expect_ident()?;
                params.push(LambdaParam {
                    name,
                    name_range,
                    ty,
                });
                if !p.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        p.expect(TokenKind::RParen, "')'")?;
    }
    p.expect(TokenKind::Arrow, "'->'")?;
    let body = if p.at(TokenKind::LBrace) {
        parse_block(p)?
    } else {
        parse_expression(p)?
    };
    let range = start.join(&p.ast.range(body));
    Ok(p.ast.alloc(NodeKind::Lambda { params, body }, range))
}

pub(super) fn parse_arguments(p: &mut Parser) -> PResult<Vec<NodeId>> {
    p.expect(TokenKind::LParen, "'('")?;
    let mut args = Vec::new();
    if p.eat(TokenKind::RParen) {
        return Ok(args);
    }
    loop {
        args.push(parse_expression(p)?);
        if !p.eat(TokenKind::Comma) {
            break;
        }
    }
    p.expect(TokenKind::RParen, "')'")?;
    Ok(args)
}

fn parse_array_init(p: &mut Parser) -> PResult<NodeId> {
    let start = p.expect(TokenKind::LBrace, "'{'")?.range;
    let mut items = Vec::new();
    while !p.at(TokenKind::RBrace) {
        items.push(parse_variable_initializer(p)?);
        if !p.eat(TokenKind::Comma) {
            break;
        }
    }
    p.expect(TokenKind::RBrace, "'}'")?;
    let range = p.range_from(start);
    Ok(p.ast.alloc(NodeKind::ArrayInit(items), range))
}

fn parse_primary(p: &mut Parser) -> PResult<NodeId> {
    let token = p.peek().clone();
    let start = token.range;
    let literal = match (token.kind, &token.value) {
        (TokenKind::IntLiteral, TokenValue::Int(v)) => {
            if *v > i32::MAX as i64 {
                p.report("integer literal out of range for int", start);
            }
            Some(Literal::Int(*v))
        }
        (TokenKind::LongLiteral, TokenValue::Int(v)) => Some(Literal::Long(*v)),
        (TokenKind::FloatLiteral, TokenValue::Float(v)) => Some(Literal::Float(*v)),
        (TokenKind::DoubleLiteral, TokenValue::Float(v)) => Some(Literal::Double(*v)),
        (TokenKind::CharLiteral, TokenValue::Char(c)) => Some(Literal::Char(*c)),
        (TokenKind::StringLiteral, TokenValue::Str(s)) => Some(Literal::Str(s.clone())),
        (TokenKind::True, _) => Some(Literal::Bool(true)),
        (TokenKind::False, _) => Some(Literal::Bool(false)),
        (TokenKind::Null, _) => Some(Literal::Null),
        _ => None,
    };
    if let Some(literal) = literal {
        p.bump();
        return Ok(p.ast.alloc(NodeKind::Literal(literal), start));
    }

    match token.kind {
        TokenKind::Ident => {
            p.bump();
            if p.at(TokenKind::LParen) {
                let args = parse_arguments(p)?;
                let range = p.range_from(start);
                return Ok(p.ast.alloc(
                    NodeKind::Call {
                        target: None,
                        name: token.text,
                        name_range: start,
                        args,
                    },
                    range,
                ));
            }
            Ok(p.ast.alloc(NodeKind::Name(token.text), start))
        }
        TokenKind::This => {
            p.bump();
            Ok(p.ast.alloc(NodeKind::This, start))
        }
        TokenKind::Super => {
            p.bump();
            if !p.at(TokenKind::Dot) {
                return p.error("expected '.' after 'super'");
            }
            Ok(p.ast.alloc(NodeKind::Super, start))
        }
        TokenKind::LParen => {
            p.bump();
            let inner = parse_expression(p)?;
            p.expect(TokenKind::RParen, "')'")?;
            Ok(inner)
        }
        TokenKind::New => parse_new(p),
        TokenKind::LBrace => parse_array_init(p),
        TokenKind::Switch => p.error("switch expressions are not supported"),
        _ => p.error("expected expression"),
    }
}

fn parse_new(p: &mut Parser) -> PResult<NodeId> {
    let start = p.bump().range;
    let elem = p.parse_type_without_dims()?;

    if p.at(TokenKind::LBracket) {
        let mut dims = Vec::new();
        while p.at(TokenKind::LBracket) && p.kind_at(1) != TokenKind::RBracket {
            p.bump();
            dims.push(parse_expression(p)?);
            p.expect(TokenKind::RBracket, "']'")?;
        }
        let mut extra_dims = 0;
        while p.at(TokenKind::LBracket) && p.kind_at(1) == TokenKind::RBracket {
            p.bump();
            p.bump();
            extra_dims += 1;
        }
        let init = if dims.is_empty() {
            if !p.at(TokenKind::LBrace) {
                return p.error("array creation needs a size or an initializer");
            }
            Some(parse_array_init(p)?)
        } else {
            None
        };
        let range = p.range_from(start);
        return Ok(p.ast.alloc(
            NodeKind::NewArray {
                elem,
                dims,
                extra_dims,
                init,
            },
            range,
        ));
    }

    let args = parse_arguments(p)?;
    let body = if p.at(TokenKind::LBrace) {
        p.bump();
        p.type_names.push(String::new());
        let members = super::parse_members(p);
        p.type_names.pop();
        p.expect(TokenKind::RBrace, "'}'")?;
        Some(members)
    } else {
        None
    };
    let range = p.range_from(start);
    Ok(p.ast.alloc(
        NodeKind::New {
            ty: elem,
            args,
            body,
        },
        range,
    ))
}

fn parse_postfix(p: &mut Parser, mut expr: NodeId) -> PResult<NodeId> {
    loop {
        let start = p.ast.range(expr);
        match p.kind() {
            TokenKind::Dot => {
                p.bump();
                if p.at(TokenKind::Lt) {
                    // Explicit method type arguments are inferred instead.
                    p.parse_type_params()?;
                }
                if p.at(TokenKind::Class) || p.at(TokenKind::This) || p.at(TokenKind::New) {
                    return p.error("qualified 'class', 'this' and 'new' are not supported");
                }
                let (name, name_range) = p.expect_ident()?;
                if p.at(TokenKind::LParen) {
                    let args = parse_arguments(p)?;
                    let range = p.range_from(start);
                    expr = p.ast.alloc(
                        NodeKind::Call {
                            target: Some(expr),
                            name,
                            name_range,
                            args,
                        },
                        range,
                    );
                } else {
                    let range = p.range_from(start);
                    expr = p.ast.alloc(
                        NodeKind::FieldAccess {
                            target: expr,
                            name,
                            name_range,
                        },
                        range,
                    );
                }
            }
            TokenKind::LBracket => {
                p.bump();
                let index = parse_expression(p)?;
                p.expect(TokenKind::RBracket, "']'")?;
                let range = p.range_from(start);
                expr = p.ast.alloc(NodeKind::ArrayAccess { array: expr, index }, range);
            }
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let op = if p.bump().kind == TokenKind::PlusPlus {
                    UnaryOp::PostInc
                } else {
                    UnaryOp::PostDec
                };
                let range = p.range_from(start);
                expr = p.ast.alloc(NodeKind::Unary { op, operand: expr }, range);
            }
            TokenKind::DoubleColon => {
                return Err(SyntaxError {
                    message: "method references are not supported; use a lambda".into(),
                    range: p.peek().range,
                });
            }
            _ => return Ok(expr),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{BinaryOp, NodeKind, UnaryOp};
    use crate::parser::parse_repl;

    fn value_kind(source: &str) -> (crate::parser::ReplParse, NodeKind) {
        let parsed = parse_repl(source);
        assert!(parsed.diagnostics.is_empty(), "{:?}", parsed.diagnostics);
        let value = parsed.value.expect("value");
        let kind = parsed.ast.kind(value).clone();
        (parsed, kind)
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let (parsed, kind) = value_kind("1 + 2 * 3");
        let NodeKind::Binary { op, right, .. } = kind else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(
            parsed.ast.kind(right),
            NodeKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn assignment_is_right_associative() {
        let (parsed, kind) = value_kind("a = b = 3");
        let NodeKind::Assign { value, .. } = kind else {
            panic!("expected assignment");
        };
        assert!(matches!(parsed.ast.kind(value), NodeKind::Assign { .. }));
    }

    #[test]
    fn distinguishes_casts_from_parenthesized_expressions() {
        let (_, kind) = value_kind("(int) x");
        assert!(matches!(kind, NodeKind::Cast { .. }));
        let (_, kind) = value_kind("(a) - b");
        assert!(matches!(
            kind,
            NodeKind::Binary {
                op: BinaryOp::Sub,
                ..
            }
        ));
        let (_, kind) = value_kind("(String) o");
        assert!(matches!(kind, NodeKind::Cast { .. }));
    }

    #[test]
    fn parses_lambdas() {
        let (_, kind) = value_kind("(a, b) -> a + b");
        let NodeKind::Lambda { params, .. } = kind else {
            panic!("expected lambda");
        };
        assert_eq!(params.len(), 2);
        let (_, kind) = value_kind("x -> { return x; }");
        assert!(matches!(kind, NodeKind::Lambda { .. }));
    }

    #[test]
    fn parses_postfix_chains() {
        let (parsed, kind) = value_kind("System.out.println(a[i++])");
        let NodeKind::Call { target, name, args, .. } = kind else {
            panic!("expected call");
        };
        assert_eq!(name, "println");
        assert!(matches!(
            parsed.ast.kind(target.expect("target")),
            NodeKind::FieldAccess { .. }
        ));
        let NodeKind::ArrayAccess { index, .. } = parsed.ast.kind(args[0]) else {
            panic!("expected array access");
        };
        assert!(matches!(
            parsed.ast.kind(*index),
            NodeKind::Unary {
                op: UnaryOp::PostInc,
                ..
            }
        ));
    }

    #[test]
    fn parses_array_creation() {
        let (_, kind) = value_kind("new int[2][]");
        let NodeKind::NewArray {
            dims, extra_dims, ..
        } = kind
        else {
            panic!("expected new array");
        };
        assert_eq!(dims.len(), 1);
        assert_eq!(extra_dims, 1);
    }

    #[test]
    fn instanceof_has_relational_precedence() {
        let (_, kind) = value_kind("o instanceof String && ok");
        assert!(matches!(
            kind,
            NodeKind::Binary {
                op: BinaryOp::And,
                ..
            }
        ));
    }
}
