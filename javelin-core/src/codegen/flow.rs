//! Definite assignment and missing-return checks.
//!
//! A forward walk over one body. The state is the set of locals declared
//! without an initializer that are not yet definitely assigned; `None`
//! marks unreachable code, where every local counts as assigned. Paths
//! join by union, so a local stays unassigned if any incoming path leaves
//! it so.

use std::collections::BTreeSet;

use crate::ast::{Ast, BinaryOp, Literal, NodeId, NodeKind, SwitchCase, UnaryOp};
use crate::diagnostic::Diagnostic;
use crate::span::Range;

type State = Option<BTreeSet<String>>;

fn join(a: State, b: State) -> State {
    match (a, b) {
        (None, other) | (other, None) => other,
        (Some(mut a), Some(b)) => {
            a.extend(b);
            Some(a)
        }
    }
}

/// Where `break` and `continue` states collect.
struct Frame {
    label: Option<String>,
    /// Loops and switches take unlabelled `break`.
    breakable: bool,
    /// Only loops take `continue`.
    is_loop: bool,
    breaks: State,
    continues: State,
}

struct Flow<'a> {
    ast: &'a Ast,
    frames: Vec<Frame>,
    /// Tracked locals currently in scope, innermost last.
    scope: Vec<String>,
    diagnostics: Vec<Diagnostic>,
}

/// Check a method or top-level body. With `returns_value`, reaching the end
/// of the body is an error.
pub(super) fn check_body(ast: &Ast, body: &[NodeId], end: Range, returns_value: bool) -> Vec<Diagnostic> {
    let mut flow = Flow {
        ast,
        frames: Vec::new(),
        scope: Vec::new(),
        diagnostics: Vec::new(),
    };
    let state = flow.block(body, Some(BTreeSet::new()));
    if returns_value && state.is_some() {
        let at = Range::from_positions(end.end(), end.end());
        flow.diagnostics
            .push(Diagnostic::error("missing return statement", at).with_code("E0314"));
    }
    flow.diagnostics
}

impl Flow<'_> {
    fn block(&mut self, stmts: &[NodeId], mut state: State) -> State {
        let depth = self.scope.len();
        for stmt in stmts {
            state = self.statement(*stmt, state);
        }
        self.scope.truncate(depth);
        self.prune(state)
    }

    /// Forget locals that went out of scope.
    fn prune(&self, state: State) -> State {
        state.map(|mut set| {
            set.retain(|name| self.scope.contains(name));
            set
        })
    }

    fn statement(&mut self, node: NodeId, state: State) -> State {
        let ast = self.ast;
        match ast.kind(node) {
            NodeKind::Block(stmts) => self.block(stmts, state),
            NodeKind::LocalVar { vars, .. } => {
                let mut state = state;
                for var in vars {
                    match var.init {
                        Some(init) => {
                            state = self.expr(init, state);
                            state = assign(state, &var.name);
                        }
                        None => {
                            self.scope.push(var.name.clone());
                            if let Some(set) = state.as_mut() {
                                set.insert(var.name.clone());
                            }
                        }
                    }
                }
                state
            }
            NodeKind::ExprStmt(expr) => self.expr(*expr, state),
            NodeKind::If {
                cond,
                then,
                otherwise,
            } => {
                let state = self.expr(*cond, state);
                let after_then = self.nested(*then, state.clone());
                let after_else = match otherwise {
                    Some(otherwise) => self.nested(*otherwise, state),
                    None => state,
                };
                join(after_then, after_else)
            }
            NodeKind::While { .. }
            | NodeKind::DoWhile { .. }
            | NodeKind::For { .. }
            | NodeKind::ForEach { .. } => self.loop_statement(node, None, state),
            NodeKind::Switch { selector, cases } => self.switch(*selector, cases, None, state),
            NodeKind::Labeled { label, body } => match ast.kind(*body) {
                NodeKind::While { .. }
                | NodeKind::DoWhile { .. }
                | NodeKind::For { .. }
                | NodeKind::ForEach { .. } => self.loop_statement(*body, Some(label.clone()), state),
                NodeKind::Switch { selector, cases } => {
                    self.switch(*selector, cases, Some(label.clone()), state)
                }
                _ => {
                    self.frames.push(Frame {
                        label: Some(label.clone()),
                        breakable: false,
                        is_loop: false,
                        breaks: None,
                        continues: None,
                    });
                    let end = self.nested(*body, state);
                    let frame = self.pop_frame();
                    self.prune(join(end, frame.breaks))
                }
            },
            NodeKind::Break(label) => {
                if let Some(frame) = self.target(label.as_deref(), false) {
                    frame.breaks = join(frame.breaks.take(), state);
                }
                None
            }
            NodeKind::Continue(label) => {
                if let Some(frame) = self.target(label.as_deref(), true) {
                    frame.continues = join(frame.continues.take(), state);
                }
                None
            }
            NodeKind::Return(value) => {
                if let Some(value) = value {
                    self.expr(*value, state);
                }
                None
            }
            NodeKind::Throw(expr) => {
                self.expr(*expr, state);
                None
            }
            NodeKind::Try {
                body,
                catches,
                finally,
            } => {
                let mut merged = self.nested(*body, state.clone());
                for catch in catches {
                    let after = self.nested(catch.body, state.clone());
                    merged = join(merged, after);
                }
                match finally {
                    Some(finally) => {
                        let after = self.nested(*finally, state);
                        match (merged, after) {
                            (None, _) | (_, None) => None,
                            (Some(mut merged), Some(after)) => {
                                merged.retain(|name| after.contains(name));
                                Some(merged)
                            }
                        }
                    }
                    None => merged,
                }
            }
            NodeKind::Synchronized { lock, body } => {
                let state = self.expr(*lock, state);
                self.nested(*body, state)
            }
            NodeKind::CtorCall { args, .. } => self.exprs(args, state),
            NodeKind::Empty | NodeKind::TypeDecl(_) => state,
            _ => self.expr(node, state),
        }
    }

    /// A sub-statement with its own scope.
    fn nested(&mut self, node: NodeId, state: State) -> State {
        let depth = self.scope.len();
        let state = self.statement(node, state);
        self.scope.truncate(depth);
        self.prune(state)
    }

    fn pop_frame(&mut self) -> Frame {
        self.frames.pop().unwrap_or(Frame {
            label: None,
            breakable: false,
            is_loop: false,
            breaks: None,
            continues: None,
        })
    }

    fn target(&mut self, label: Option<&str>, is_continue: bool) -> Option<&mut Frame> {
        self.frames.iter_mut().rev().find(|f| match label {
            Some(label) => f.label.as_deref() == Some(label) && (!is_continue || f.is_loop),
            None if is_continue => f.is_loop,
            None => f.breakable,
        })
    }

    fn push_loop(&mut self, label: Option<String>) {
        self.frames.push(Frame {
            label,
            breakable: true,
            is_loop: true,
            breaks: None,
            continues: None,
        });
    }

    fn loop_statement(&mut self, node: NodeId, label: Option<String>, state: State) -> State {
        let ast = self.ast;
        let depth = self.scope.len();
        let exit = match ast.kind(node) {
            NodeKind::While { cond, body } => {
                let state = self.expr(*cond, state);
                self.push_loop(label);
                self.nested(*body, state.clone());
                let frame = self.pop_frame();
                let fallthrough = if self.always_true(*cond) { None } else { state };
                join(fallthrough, frame.breaks)
            }
            NodeKind::DoWhile { body, cond } => {
                self.push_loop(label);
                let end = self.nested(*body, state);
                let frame = self.pop_frame();
                let before_cond = join(end, frame.continues);
                let after_cond = self.expr(*cond, before_cond);
                let fallthrough = if self.always_true(*cond) { None } else { after_cond };
                join(fallthrough, frame.breaks)
            }
            NodeKind::For {
                init,
                cond,
                update,
                body,
            } => {
                let mut state = state;
                for stmt in init {
                    state = self.statement(*stmt, state);
                }
                if let Some(cond) = cond {
                    state = self.expr(*cond, state);
                }
                self.push_loop(label);
                let end = self.nested(*body, state.clone());
                let frame = self.pop_frame();
                let mut next = join(end, frame.continues);
                for expr in update {
                    next = self.statement(*expr, next);
                }
                let fallthrough = match cond {
                    Some(cond) if !self.always_true(*cond) => state,
                    _ => None,
                };
                join(fallthrough, frame.breaks)
            }
            NodeKind::ForEach { iterable, body, .. } => {
                let state = self.expr(*iterable, state);
                self.push_loop(label);
                self.nested(*body, state.clone());
                let frame = self.pop_frame();
                join(state, frame.breaks)
            }
            _ => state,
        };
        self.scope.truncate(depth);
        self.prune(exit)
    }

    fn switch(&mut self, selector: NodeId, cases: &[SwitchCase], label: Option<String>, state: State) -> State {
        let state = self.expr(selector, state);
        self.frames.push(Frame {
            label,
            breakable: true,
            is_loop: false,
            breaks: None,
            continues: None,
        });
        let depth = self.scope.len();
        let mut fallthrough: State = None;
        for case in cases {
            let entry = join(state.clone(), fallthrough.take());
            let mut current = entry;
            for stmt in &case.body {
                current = self.statement(*stmt, current);
            }
            fallthrough = current;
        }
        self.scope.truncate(depth);
        let frame = self.pop_frame();
        let mut exit = join(fallthrough, frame.breaks);
        if !cases.iter().any(SwitchCase::is_default) {
            exit = join(exit, state);
        }
        self.prune(exit)
    }

    fn always_true(&self, cond: NodeId) -> bool {
        matches!(self.ast.kind(cond), NodeKind::Literal(Literal::Bool(true)))
    }

    fn exprs(&mut self, nodes: &[NodeId], mut state: State) -> State {
        for node in nodes {
            state = self.expr(*node, state);
        }
        state
    }

    fn expr(&mut self, node: NodeId, state: State) -> State {
        let ast = self.ast;
        match ast.kind(node) {
            NodeKind::Name(name) => self.read(name, ast.range(node), state),
            NodeKind::Assign { op, target, value } => {
                let target_name = match ast.kind(*target) {
                    NodeKind::Name(name) => Some(name),
                    _ => None,
                };
                let mut state = state;
                match (op, target_name) {
                    (None, Some(_)) => {}
                    (Some(_), Some(name)) => state = self.read(name, ast.range(*target), state),
                    (_, None) => state = self.target_parts(*target, state),
                }
                state = self.expr(*value, state);
                match target_name {
                    Some(name) => assign(state, name),
                    None => state,
                }
            }
            NodeKind::Unary { op, operand } => {
                let state = self.expr(*operand, state);
                match (op, ast.kind(*operand)) {
                    (
                        UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec,
                        NodeKind::Name(name),
                    ) => assign(state, name),
                    _ => state,
                }
            }
            NodeKind::Binary {
                op: BinaryOp::And | BinaryOp::Or,
                left,
                right,
            } => {
                let state = self.expr(*left, state);
                let after_right = self.expr(*right, state.clone());
                join(state, after_right)
            }
            NodeKind::Conditional {
                cond,
                then,
                otherwise,
            } => {
                let state = self.expr(*cond, state);
                let a = self.expr(*then, state.clone());
                let b = self.expr(*otherwise, state);
                join(a, b)
            }
            NodeKind::Lambda { body, .. } => {
                let depth = self.scope.len();
                let frames = std::mem::take(&mut self.frames);
                match ast.kind(*body) {
                    NodeKind::Block(_) => {
                        self.statement(*body, state.clone());
                    }
                    _ => {
                        self.expr(*body, state.clone());
                    }
                }
                self.frames = frames;
                self.scope.truncate(depth);
                state
            }
            // Anonymous class members run later, in their own bodies.
            NodeKind::New { args, .. } => self.exprs(args, state),
            _ => {
                let children = ast.kind(node).children();
                self.exprs(&children, state)
            }
        }
    }

    /// Subexpressions of a field or element assignment target.
    fn target_parts(&mut self, target: NodeId, state: State) -> State {
        match self.ast.kind(target) {
            NodeKind::FieldAccess { target, .. } => self.expr(*target, state),
            NodeKind::ArrayAccess { array, index } => {
                let state = self.expr(*array, state);
                self.expr(*index, state)
            }
            _ => self.expr(target, state),
        }
    }

    fn read(&mut self, name: &str, range: Range, state: State) -> State {
        match state {
            Some(mut set) if set.contains(name) => {
                self.diagnostics.push(
                    Diagnostic::error(format!("variable {name} might not have been initialized"), range)
                        .with_code("E0315"),
                );
                set.remove(name);
                Some(set)
            }
            other => other,
        }
    }
}

fn assign(state: State, name: &str) -> State {
    state.map(|mut set| {
        set.remove(name);
        set
    })
}
