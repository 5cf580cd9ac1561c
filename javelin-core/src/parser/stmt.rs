// Statement parsing.

use crate::ast::{CatchClause, NodeId, NodeKind, SwitchCase, TypeExpr, VarDeclarator};
use crate::lexer::TokenKind;
use crate::span::Range;

use super::expr::{self, parse_expression};
use super::{PResult, Parser, SyntaxError};

pub(super) fn parse_block(p: &mut Parser) -> PResult<NodeId> {
    let start = p.expect(TokenKind::LBrace, "'{'")?.range;
    let stmts = parse_statements_until_brace(p);
    p.expect(TokenKind::RBrace, "'}'")?;
    let range = p.range_from(start);
    Ok(p.ast.alloc(NodeKind::Block(stmts), range))
}

fn parse_statements_until_brace(p: &mut Parser) -> Vec<NodeId> {
    let mut stmts = Vec::new();
    while !p.at(TokenKind::RBrace) && !p.at(TokenKind::Eof) {
        let before = p.pos;
        match parse_statement(p) {
            Ok(stmt) => stmts.push(stmt),
            Err(err) => p.recover(err, before),
        }
    }
    stmts
}

pub(super) fn parse_statement(p: &mut Parser) -> PResult<NodeId> {
    let start = p.peek().range;
    match p.kind() {
        TokenKind::LBrace => parse_block(p),
        TokenKind::Semi => {
            p.bump();
            Ok(p.ast.alloc(NodeKind::Empty, start))
        }
        TokenKind::If => parse_if(p),
        TokenKind::While => parse_while(p),
        TokenKind::Do => parse_do_while(p),
        TokenKind::For => parse_for(p),
        TokenKind::Switch => parse_switch(p),
        TokenKind::Try => parse_try(p),
        TokenKind::Return => {
            p.bump();
            let value = if p.at(TokenKind::Semi) {
                None
            } else {
                Some(parse_expression(p)?)
            };
            end_statement(p)?;
            let range = p.range_from(start);
            Ok(p.ast.alloc(NodeKind::Return(value), range))
        }
        TokenKind::Throw => {
            p.bump();
            let value = parse_expression(p)?;
            end_statement(p)?;
            let range = p.range_from(start);
            Ok(p.ast.alloc(NodeKind::Throw(value), range))
        }
        TokenKind::Break | TokenKind::Continue => {
            let is_break = p.bump().kind == TokenKind::Break;
            let label = if p.at(TokenKind::Ident) {
                Some(p.bump().text)
            } else {
                None
            };
            end_statement(p)?;
            let range = p.range_from(start);
            let kind = if is_break {
                NodeKind::Break(label)
            } else {
                NodeKind::Continue(label)
            };
            Ok(p.ast.alloc(kind, range))
        }
        TokenKind::This | TokenKind::Super if p.kind_at(1) == TokenKind::LParen => {
            let is_super = p.bump().kind == TokenKind::Super;
            let args = expr::parse_arguments(p)?;
            end_statement(p)?;
            let range = p.range_from(start);
            Ok(p.ast.alloc(NodeKind::CtorCall { is_super, args }, range))
        }
        TokenKind::Ident if p.peek().text == "synchronized" && p.kind_at(1) == TokenKind::LParen => {
            p.bump();
            let lock = parse_paren_condition(p)?;
            let body = parse_block(p)?;
            let range = p.range_from(start);
            Ok(p.ast.alloc(NodeKind::Synchronized { lock, body }, range))
        }
        TokenKind::Ident if p.kind_at(1) == TokenKind::Colon => {
            let label = p.bump().text;
            p.bump();
            let body = parse_statement(p)?;
            let range = p.range_from(start);
            Ok(p.ast.alloc(NodeKind::Labeled { label, body }, range))
        }
        TokenKind::Class | TokenKind::Interface | TokenKind::Enum => {
            p.error("local type declarations are not supported")
        }
        TokenKind::Final | TokenKind::Annotation => {
            p.parse_modifiers();
            parse_local_var(p, start)
        }
        _ if looks_like_local_var(p) => parse_local_var(p, start),
        _ => {
            let value = parse_expression(p)?;
            if p.repl && p.at(TokenKind::Eof) {
                let range = p.range_from(start);
                let stmt = p.ast.alloc(NodeKind::ExprStmt(value), range);
                p.repl_value = Some(value);
                return Ok(stmt);
            }
            if !p.repl && !is_statement_expression(p.ast.kind(value)) {
                let range = p.ast.range(value);
                end_statement(p)?;
                return Err(SyntaxError {
                    message: "not a statement".into(),
                    range,
                });
            }
            end_statement(p)?;
            let range = p.range_from(start);
            Ok(p.ast.alloc(NodeKind::ExprStmt(value), range))
        }
    }
}

fn end_statement(p: &mut Parser) -> PResult<()> {
    p.expect(TokenKind::Semi, "';'")?;
    Ok(())
}

fn is_statement_expression(kind: &NodeKind) -> bool {
    use crate::ast::UnaryOp;
    match kind {
        NodeKind::Assign { .. } | NodeKind::Call { .. } | NodeKind::New { .. } => true,
        NodeKind::Unary { op, .. } => matches!(
            op,
            UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec
        ),
        NodeKind::Error => true,
        _ => false,
    }
}

/// `Type name` followed by `=`, `;`, `,`, `:` or `[`.
fn looks_like_local_var(p: &Parser) -> bool {
    let Some(after_type) = p.scan_type(p.pos) else {
        return false;
    };
    p.kind_abs(after_type) == TokenKind::Ident
        && matches!(
            p.kind_abs(after_type + 1),
            TokenKind::Assign
                | TokenKind::Semi
                | TokenKind::Comma
                | TokenKind::Colon
                | TokenKind::LBracket
        )
}

fn parse_local_var(p: &mut Parser, start: Range) -> PResult<NodeId> {
    let node = parse_local_var_head(p, start)?;
    end_statement(p)?;
    Ok(node)
}

/// Local declaration without the terminating `;`, as used by `for` headers.
fn parse_local_var_head(p: &mut Parser, start: Range) -> PResult<NodeId> {
    let ty = p.parse_type()?;
    let mut vars = Vec::new();
    let mut dims_mismatch = false;
    loop {
        let (name, name_range) = p.expect_ident()?;
        let mut dims = 0;
        while p.at(TokenKind::LBracket) && p.kind_at(1) == TokenKind::RBracket {
            p.bump();
            p.bump();
            dims += 1;
        }
        dims_mismatch |= dims > 0;
        let init = if p.eat(TokenKind::Assign) {
            Some(expr::parse_variable_initializer(p)?)
        } else {
            None
        };
        vars.push(VarDeclarator {
            name,
            name_range,
            init,
        });
        if !p.eat(TokenKind::Comma) {
            break;
        }
    }
    if dims_mismatch {
        let range = p.range_from(start);
        p.report("write array brackets after the type, not the variable name", range);
    }
    let range = p.range_from(start);
    Ok(p.ast.alloc(NodeKind::LocalVar { ty, vars }, range))
}

fn parse_paren_condition(p: &mut Parser) -> PResult<NodeId> {
    p.expect(TokenKind::LParen, "'('")?;
    let cond = parse_expression(p)?;
    p.expect(TokenKind::RParen, "')'")?;
    Ok(cond)
}

fn parse_if(p: &mut Parser) -> PResult<NodeId> {
    let start = p.bump().range;
    let cond = parse_paren_condition(p)?;
    let then = parse_statement(p)?;
    let otherwise = if p.eat(TokenKind::Else) {
        Some(parse_statement(p)?)
    } else {
        None
    };
    let range = p.range_from(start);
    Ok(p.ast.alloc(
        NodeKind::If {
            cond,
            then,
            otherwise,
        },
        range,
    ))
}

fn parse_while(p: &mut Parser) -> PResult<NodeId> {
    let start = p.bump().range;
    let cond = parse_paren_condition(p)?;
    let body = parse_statement(p)?;
    let range = p.range_from(start);
    Ok(p.ast.alloc(NodeKind::While { cond, body }, range))
}

fn parse_do_while(p: &mut Parser) -> PResult<NodeId> {
    let start = p.bump().range;
    let body = parse_statement(p)?;
    p.expect(TokenKind::While, "'while'")?;
    let cond = parse_paren_condition(p)?;
    end_statement(p)?;
    let range = p.range_from(start);
    Ok(p.ast.alloc(NodeKind::DoWhile { body, cond }, range))
}

fn parse_for(p: &mut Parser) -> PResult<NodeId> {
    let start = p.bump().range;
    p.expect(TokenKind::LParen, "'('")?;
    p.parse_modifiers();

    if let Some(after_type) = p.scan_type(p.pos) {
        if p.kind_abs(after_type) == TokenKind::Ident
            && p.kind_abs(after_type + 1) == TokenKind::Colon
        {
            let ty: TypeExpr = p.parse_type()?;
            let (name, name_range) = p.expect_ident()?;
            p.expect(TokenKind::Colon, "':'")?;
            let iterable = parse_expression(p)?;
            p.expect(TokenKind::RParen, "')'")?;
            let body = parse_statement(p)?;
            let range = p.range_from(start);
            return Ok(p.ast.alloc(
                NodeKind::ForEach {
                    ty,
                    name,
                    name_range,
                    iterable,
                    body,
                },
                range,
            ));
        }
    }

    let mut init = Vec::new();
    if !p.at(TokenKind::Semi) {
        let init_start = p.peek().range;
        if looks_like_local_var(p) {
            init.push(parse_local_var_head(p, init_start)?);
        } else {
            init = parse_expression_statements(p)?;
        }
    }
    p.expect(TokenKind::Semi, "';'")?;
    let cond = if p.at(TokenKind::Semi) {
        None
    } else {
        Some(parse_expression(p)?)
    };
    p.expect(TokenKind::Semi, "';'")?;
    let update = if p.at(TokenKind::RParen) {
        Vec::new()
    } else {
        parse_expression_statements(p)?
    };
    p.expect(TokenKind::RParen, "')'")?;
    let body = parse_statement(p)?;
    let range = p.range_from(start);
    Ok(p.ast.alloc(
        NodeKind::For {
            init,
            cond,
            update,
            body,
        },
        range,
    ))
}

/// Comma separated expressions, each wrapped in an expression statement.
fn parse_expression_statements(p: &mut Parser) -> PResult<Vec<NodeId>> {
    let mut stmts = Vec::new();
    loop {
        let value = parse_expression(p)?;
        let range = p.ast.range(value);
        stmts.push(p.ast.alloc(NodeKind::ExprStmt(value), range));
        if !p.eat(TokenKind::Comma) {
            return Ok(stmts);
        }
    }
}

fn parse_switch(p: &mut Parser) -> PResult<NodeId> {
    let start = p.bump().range;
    let selector = parse_paren_condition(p)?;
    p.expect(TokenKind::LBrace, "'{'")?;

    let mut cases: Vec<SwitchCase> = Vec::new();
    while !p.at(TokenKind::RBrace) && !p.at(TokenKind::Eof) {
        let label_start = p.peek().range;
        let mut labels = Vec::new();
        if p.eat(TokenKind::Default) {
            if cases.iter().any(SwitchCase::is_default) {
                p.report("duplicate default label", label_start);
            }
        } else {
            p.expect(TokenKind::Case, "'case' or 'default'")?;
            loop {
                labels.push(expr::parse_conditional_expression(p)?);
                if !p.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        if p.at(TokenKind::Arrow) {
            return p.error("arrow-style switch cases are not supported");
        }
        p.expect(TokenKind::Colon, "':'")?;
        let label_range = p.range_from(label_start);

        let mut body = Vec::new();
        while !matches!(
            p.kind(),
            TokenKind::Case | TokenKind::Default | TokenKind::RBrace | TokenKind::Eof
        ) {
            let before = p.pos;
            match parse_statement(p) {
                Ok(stmt) => body.push(stmt),
                Err(err) => p.recover(err, before),
            }
        }
        cases.push(SwitchCase {
            labels,
            label_range,
            body,
        });
    }
    p.expect(TokenKind::RBrace, "'}'")?;
    let range = p.range_from(start);
    Ok(p.ast.alloc(NodeKind::Switch { selector, cases }, range))
}

fn parse_try(p: &mut Parser) -> PResult<NodeId> {
    let start = p.bump().range;
    if p.at(TokenKind::LParen) {
        return p.error("try-with-resources is not supported");
    }
    let body = parse_block(p)?;

    let mut catches = Vec::new();
    while p.eat(TokenKind::Catch) {
        p.expect(TokenKind::LParen, "'('")?;
        p.parse_modifiers();
        let mut types = vec![p.parse_type()?];
        while p.eat(TokenKind::Pipe) {
            types.push(p.parse_type()?);
        }
        let (name, name_range) = p.expect_ident()?;
        p.expect(TokenKind::RParen, "')'")?;
        let body = parse_block(p)?;
        catches.push(CatchClause {
            types,
            name,
            name_range,
            body,
        });
    }
    let finally = if p.eat(TokenKind::Finally) {
        Some(parse_block(p)?)
    } else {
        None
    };
    if catches.is_empty() && finally.is_none() {
        return p.error("expected 'catch' or 'finally' after try block");
    }
    let range = p.range_from(start);
    Ok(p.ast.alloc(
        NodeKind::Try {
            body,
            catches,
            finally,
        },
        range,
    ))
}

#[cfg(test)]
mod tests {
    use crate::ast::NodeKind;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn statements(source: &str) -> (crate::parser::ParseResult, Vec<crate::ast::NodeId>) {
        let result = parse(&lex(source).tokens);
        let root = result.ast.root().expect("root");
        let NodeKind::CompilationUnit { statements, .. } = result.ast.kind(root).clone() else {
            panic!("expected compilation unit");
        };
        (result, statements)
    }

    #[test]
    fn distinguishes_declarations_from_expressions() {
        let (result, stmts) = statements("int[] a = new int[3];\nList<String> l;\na[0] = 1;\ni < n;");
        assert!(matches!(result.ast.kind(stmts[0]), NodeKind::LocalVar { .. }));
        assert!(matches!(result.ast.kind(stmts[1]), NodeKind::LocalVar { .. }));
        assert!(matches!(result.ast.kind(stmts[2]), NodeKind::ExprStmt(_)));
        assert_eq!(result.diagnostics.len(), 1);
        assert!(result.diagnostics[0].message.contains("not a statement"));
    }

    #[test]
    fn parses_synchronized_block_as_statement() {
        let (result, stmts) = statements("synchronized (lock) { count++; }");
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        let NodeKind::Synchronized { lock, body } = result.ast.kind(stmts[0]) else {
            panic!("expected synchronized");
        };
        assert!(matches!(result.ast.kind(*lock), NodeKind::Name(name) if name == "lock"));
        assert!(matches!(result.ast.kind(*body), NodeKind::Block(stmts) if stmts.len() == 1));
    }

    #[test]
    fn parses_switch_with_fallthrough_and_default() {
        let (result, stmts) = statements(
            "switch (x) { case 0: a(); break; case 1: b(); case 2: c(); break; default: d(); }",
        );
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        let NodeKind::Switch { cases, .. } = result.ast.kind(stmts[0]) else {
            panic!("expected switch");
        };
        assert_eq!(cases.len(), 4);
        assert!(cases[3].is_default());
        assert_eq!(cases[1].body.len(), 1);
    }

    #[test]
    fn parses_for_each_and_classic_for() {
        let (result, stmts) = statements(
            "for (int i = 0, j = 1; i < 3; i++, j--) { }\nfor (String s : names) { }",
        );
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        let NodeKind::For { init, update, .. } = result.ast.kind(stmts[0]) else {
            panic!("expected for");
        };
        assert_eq!(init.len(), 1);
        assert_eq!(update.len(), 2);
        assert!(matches!(result.ast.kind(stmts[1]), NodeKind::ForEach { .. }));
    }

    #[test]
    fn parses_try_with_multi_catch_and_finally() {
        let (result, stmts) = statements(
            "try { f(); } catch (IllegalStateException | ArithmeticException e) { g(); } finally { h(); }",
        );
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        let NodeKind::Try {
            catches, finally, ..
        } = result.ast.kind(stmts[0])
        else {
            panic!("expected try");
        };
        assert_eq!(catches[0].types.len(), 2);
        assert!(finally.is_some());
    }

    #[test]
    fn labeled_break_keeps_its_label() {
        let (result, stmts) = statements("outer: while (true) { break outer; }");
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        let NodeKind::Labeled { label, .. } = result.ast.kind(stmts[0]) else {
            panic!("expected labeled statement");
        };
        assert_eq!(label, "outer");
    }
}
