//! Statement lowering: blocks, locals, branches, loops, switches and
//! exception handling.
//!
//! Every statement starts a fresh step so step-over and breakpoints land on
//! statement boundaries. `try` installs numbered handlers; jumps that cross
//! a handler become `Leave` exits so the runtime can replay `finally` blocks.

use crate::ast::{BinaryOp, CatchClause, NodeId, NodeKind, SwitchCase, TypeExpr, VarDeclarator};
use crate::runtime::program::{CallTarget, Exit, Label, NumKind, Op};
use crate::runtime::value::Value;
use crate::span::Range;
use crate::symbols::{SymbolKind, UsageTarget};
use crate::types::{ClassKind, Prim, TypeId};

use super::{Generator, JumpTarget};

/// What a `switch` compares its selector by.
#[derive(Debug, Clone, Copy)]
enum SwitchKind {
    Int,
    Str,
    Enum(TypeId),
    Invalid,
}

impl Generator<'_> {
    pub(crate) fn statement(&mut self, node: NodeId) {
        let ast = self.ast;
        let range = ast.range(node);
        match ast.kind(node) {
            NodeKind::Block(stmts) => {
                let previous = self.push_block(range);
                for stmt in stmts {
                    self.statement(*stmt);
                }
                self.pop_block(previous);
            }
            NodeKind::LocalVar { ty, vars } => {
                self.cur.b.begin_statement(range);
                self.local_var(ty, vars);
            }
            NodeKind::ExprStmt(expr) => {
                self.cur.b.begin_statement(range);
                self.effect(*expr);
            }
            NodeKind::If {
                cond,
                then,
                otherwise,
            } => self.if_statement(*cond, *then, *otherwise),
            NodeKind::While { .. }
            | NodeKind::DoWhile { .. }
            | NodeKind::For { .. }
            | NodeKind::ForEach { .. } => self.loop_statement(node, None),
            NodeKind::Switch { selector, cases } => self.switch(*selector, cases, None),
            NodeKind::Break(label) => {
                self.cur.b.begin_statement(range);
                self.jump(label.as_deref(), false, range);
            }
            NodeKind::Continue(label) => {
                self.cur.b.begin_statement(range);
                self.jump(label.as_deref(), true, range);
            }
            NodeKind::Labeled { label, body } => self.labeled(label, *body),
            NodeKind::Return(value) => {
                self.cur.b.begin_statement(range);
                self.return_statement(*value, range);
            }
            NodeKind::Throw(expr) => {
                self.cur.b.begin_statement(range);
                let ty = self.value(*expr, None);
                let throwable = self.types.well_known("Throwable");
                if !self.types.is_error(ty) && !self.types.is_assignable(ty, throwable) {
                    self.report_incompatible(ty, throwable, ast.range(*expr));
                }
                self.exit(Exit::Throw);
            }
            NodeKind::Try {
                body,
                catches,
                finally,
            } => self.try_statement(*body, catches, *finally),
            NodeKind::Synchronized { lock, body } => self.synchronized(*lock, *body, range),
            NodeKind::CtorCall { is_super, .. } => {
                let what = if *is_super { "super" } else { "this" };
                self.error(
                    "E0304",
                    format!("call to {what} must be first statement in constructor"),
                    range,
                );
            }
            NodeKind::Empty => {}
            _ => {
                self.cur.b.begin_statement(range);
                self.error("E0303", "not a statement", range);
                self.effect(node);
            }
        }
    }

    fn local_var(&mut self, ty: &TypeExpr, vars: &[VarDeclarator]) {
        let declared = if ty.is_var() {
            None
        } else {
            Some(self.resolve_type(ty))
        };
        for var in vars {
            let var_ty = match (declared, var.init) {
                (Some(t), Some(init)) => {
                    self.value_as(init, t);
                    t
                }
                (None, Some(init)) => {
                    let t = self.value(init, None);
                    if t == self.types.null() {
                        self.error("E0303", "cannot infer type for local variable initialized to null", var.name_range);
                        self.types.object()
                    } else {
                        t
                    }
                }
                (Some(t), None) => {
                    let prim = self.types.as_prim(t);
                    self.emit(Op::Const(Value::default_for(prim)), var.name_range);
                    t
                }
                (None, None) => {
                    self.error("E0303", "cannot use 'var' on variable without initializer", var.name_range);
                    self.emit(Op::Const(Value::Null), var.name_range);
                    self.types.error()
                }
            };
            let slot = self.declare_local(&var.name, var.name_range, var_ty);
            self.emit(Op::Store(slot), var.name_range);
        }
    }

    /// Declare a local in the current block, reporting redeclarations.
    fn declare_local(&mut self, name: &str, name_range: Range, ty: TypeId) -> usize {
        if self.symbols.lookup_in_frame(self.cur.scope, name).is_some() {
            self.error(
                "E0313",
                format!("variable {name} is already defined in this method"),
                name_range,
            );
        }
        let symbol = self
            .symbols
            .declare(self.cur.scope, name, name_range, ty, SymbolKind::Local);
        self.record(name_range, UsageTarget::Symbol(symbol), true);
        self.symbols.symbol(symbol).slot
    }

    fn temp_slot(&mut self) -> usize {
        self.symbols.allocate_slot(self.cur.frame_scope)
    }

    fn if_statement(&mut self, cond: NodeId, then: NodeId, otherwise: Option<NodeId>) {
        let cond_range = self.ast.range(cond);
        self.cur.b.begin_statement(cond_range);
        self.condition(cond);
        let then_label = self.label();
        let else_label = self.label();
        let end = self.label();
        self.exit(Exit::Branch {
            if_true: then_label,
            if_false: if otherwise.is_some() { else_label } else { end },
        });
        self.bind(then_label);
        self.statement(then);
        if let Some(otherwise) = otherwise {
            if self.cur.b.tail_reachable() {
                self.exit(Exit::Goto(end));
            }
            self.bind(else_label);
            self.statement(otherwise);
        }
        self.bind(end);
    }

    fn jump_target(&self, label: Option<&str>, break_to: Label, continue_to: Option<Label>) -> JumpTarget {
        JumpTarget {
            label: label.map(str::to_owned),
            break_to,
            continue_to,
            plain_break: true,
            handler_depth: self.cur.handler_depth,
        }
    }

    fn loop_statement(&mut self, node: NodeId, label: Option<&str>) {
        let ast = self.ast;
        let range = ast.range(node);
        match ast.kind(node) {
            NodeKind::While { cond, body } => {
                let head = self.label();
                let body_label = self.label();
                let end = self.label();
                self.bind(head);
                self.cur.b.begin_statement(ast.range(*cond));
                self.condition(*cond);
                self.exit(Exit::Branch {
                    if_true: body_label,
                    if_false: end,
                });
                self.bind(body_label);
                self.loop_body(*body, self.jump_target(label, end, Some(head)));
                if self.cur.b.tail_reachable() {
                    self.exit(Exit::Goto(head));
                }
                self.bind(end);
            }
            NodeKind::DoWhile { body, cond } => {
                let body_label = self.label();
                let check = self.label();
                let end = self.label();
                self.bind(body_label);
                self.loop_body(*body, self.jump_target(label, end, Some(check)));
                self.bind(check);
                self.cur.b.begin_statement(ast.range(*cond));
                self.condition(*cond);
                self.exit(Exit::Branch {
                    if_true: body_label,
                    if_false: end,
                });
                self.bind(end);
            }
            NodeKind::For {
                init,
                cond,
                update,
                body,
            } => {
                let previous = self.push_block(range);
                for stmt in init {
                    self.statement(*stmt);
                }
                let head = self.label();
                let body_label = self.label();
                let next = self.label();
                let end = self.label();
                self.bind(head);
                if let Some(cond) = cond {
                    self.cur.b.begin_statement(ast.range(*cond));
                    self.condition(*cond);
                    self.exit(Exit::Branch {
                        if_true: body_label,
                        if_false: end,
                    });
                }
                self.bind(body_label);
                self.loop_body(*body, self.jump_target(label, end, Some(next)));
                self.bind(next);
                for stmt in update {
                    self.statement(*stmt);
                }
                self.exit(Exit::Goto(head));
                self.bind(end);
                self.pop_block(previous);
            }
            NodeKind::ForEach {
                ty,
                name,
                name_range,
                iterable,
                body,
            } => self.for_each(ty, name, *name_range, *iterable, *body, label, range),
            _ => self.statement(node),
        }
    }

    fn loop_body(&mut self, body: NodeId, target: JumpTarget) {
        self.cur.jumps.push(target);
        self.statement(body);
        self.cur.jumps.pop();
    }

    /// `for (T x : e)` over an array or a `List`.
    #[allow(clippy::too_many_arguments)]
    fn for_each(
        &mut self,
        ty: &TypeExpr,
        name: &str,
        name_range: Range,
        iterable: NodeId,
        body: NodeId,
        label: Option<&str>,
        range: Range,
    ) {
        let previous = self.push_block(range);
        let iterable_range = self.ast.range(iterable);
        self.cur.b.begin_statement(iterable_range);
        let source_ty = self.value(iterable, None);

        let list = self.types.well_known("List");
        let (elem_ty, over_list) = match self.types.array_elem(source_ty) {
            Some(elem) => (elem, false),
            None if self.types.is_assignable(source_ty, list) => {
                let elem = self
                    .types
                    .view_as(source_ty, list)
                    .and_then(|args| args.first().copied())
                    .unwrap_or_else(|| self.types.object());
                (elem, true)
            }
            None => {
                if !self.types.is_error(source_ty) {
                    let ty_name = self.types.name(source_ty);
                    self.error(
                        "E0303",
                        format!("for-each not applicable to expression type {ty_name}"),
                        iterable_range,
                    );
                }
                (self.types.error(), false)
            }
        };
        let var_ty = if ty.is_var() {
            elem_ty
        } else {
            self.resolve_type(ty)
        };

        let source = self.temp_slot();
        let index = self.temp_slot();
        self.emit(Op::Store(source), iterable_range);
        self.emit(Op::Const(Value::Int(0)), iterable_range);
        self.emit(Op::Store(index), iterable_range);
        let var_slot = self.declare_local(name, name_range, var_ty);

        let (size, get) = if over_list {
            let size = self.types.find_methods(list, "size").first().copied();
            let get = self.types.find_methods(list, "get").first().copied();
            (size, get)
        } else {
            (None, None)
        };

        let head = self.label();
        let body_label = self.label();
        let next = self.label();
        let end = self.label();
        self.bind(head);
        self.cur.b.begin_statement(name_range.join(&iterable_range));
        self.emit(Op::Load(index), range);
        self.emit(Op::Load(source), range);
        match size {
            Some(size) => self.invoke(CallTarget::Virtual(size), 1, range),
            None => self.emit(Op::ArrayLength, range),
        }
        self.emit(Op::Binary(BinaryOp::Lt, NumKind::Int), range);
        self.exit(Exit::Branch {
            if_true: body_label,
            if_false: end,
        });

        self.bind(body_label);
        self.emit(Op::Load(source), name_range);
        self.emit(Op::Load(index), name_range);
        match get {
            Some(get) => self.invoke(CallTarget::Virtual(get), 2, name_range),
            None => self.emit(Op::ArrayGet, name_range),
        }
        self.coerce(elem_ty, var_ty, name_range, None);
        self.emit(Op::Store(var_slot), name_range);
        self.loop_body(body, self.jump_target(label, end, Some(next)));

        self.bind(next);
        self.emit(Op::Load(index), range);
        self.emit(Op::Const(Value::Int(1)), range);
        self.emit(Op::Binary(BinaryOp::Add, NumKind::Int), range);
        self.emit(Op::Store(index), range);
        self.exit(Exit::Goto(head));
        self.bind(end);
        self.pop_block(previous);
    }

    /// Cases are tested in source order; when none matches control goes to
    /// `default` (wherever it sits) or past the switch. Bodies are laid out
    /// in source order so execution falls through until a `break`.
    fn switch(&mut self, selector: NodeId, cases: &[SwitchCase], label: Option<&str>) {
        let selector_range = self.ast.range(selector);
        self.cur.b.begin_statement(selector_range);
        let selector_ty = self.value(selector, None);
        let kind = self.switch_kind(selector_ty);
        match kind {
            SwitchKind::Int => self.to_prim(selector_ty, Prim::Int, selector_range),
            SwitchKind::Invalid if !self.types.is_error(selector_ty) => {
                let ty_name = self.types.name(selector_ty);
                self.error(
                    "E0303",
                    format!("cannot switch on a value of type {ty_name}"),
                    selector_range,
                );
            }
            _ => {}
        }
        let temp = self.temp_slot();
        self.emit(Op::Store(temp), selector_range);

        let previous = self.push_block(self.ast.range(selector));
        let bodies: Vec<Label> = cases.iter().map(|_| self.label()).collect();
        let end = self.label();
        for (case, body) in cases.iter().zip(&bodies) {
            for label_node in &case.labels {
                self.case_test(kind, temp, *label_node, case.label_range);
                let miss = self.label();
                self.exit(Exit::Branch {
                    if_true: *body,
                    if_false: miss,
                });
                self.bind(miss);
            }
        }
        let fallback = cases
            .iter()
            .position(SwitchCase::is_default)
            .map_or(end, |i| bodies[i]);
        self.exit(Exit::Goto(fallback));

        let mut target = self.jump_target(label, end, None);
        target.continue_to = None;
        self.cur.jumps.push(target);
        for (case, body) in cases.iter().zip(&bodies) {
            self.bind(*body);
            for stmt in &case.body {
                self.statement(*stmt);
            }
        }
        self.cur.jumps.pop();
        self.bind(end);
        self.pop_block(previous);
    }

    fn switch_kind(&self, ty: TypeId) -> SwitchKind {
        if self.types.is_string(ty) {
            return SwitchKind::Str;
        }
        if let Some(class) = self.types.class(ty) {
            if class.kind == ClassKind::Enum {
                return SwitchKind::Enum(self.types.erase(ty));
            }
        }
        let prim = self.types.as_prim(ty).or_else(|| self.types.unboxed(ty));
        match prim {
            Some(Prim::Int | Prim::Short | Prim::Byte | Prim::Char) => SwitchKind::Int,
            _ => SwitchKind::Invalid,
        }
    }

    /// Push whether case label `node` matches the selector held in `temp`.
    fn case_test(&mut self, kind: SwitchKind, temp: usize, node: NodeId, range: Range) {
        let ast = self.ast;
        let node_range = ast.range(node);
        self.emit(Op::Load(temp), range);
        match kind {
            SwitchKind::Int => {
                let int = self.types.prim(Prim::Int);
                let ty = self.value(node, Some(int));
                self.to_prim(ty, Prim::Int, node_range);
                self.emit(Op::Binary(BinaryOp::Eq, NumKind::Int), range);
            }
            SwitchKind::Str => {
                let string = self.types.string();
                self.value_as(node, string);
                match self.types.find_methods(string, "equals").first().copied() {
                    Some(equals) => self.invoke(CallTarget::Virtual(equals), 2, range),
                    None => self.emit(Op::Binary(BinaryOp::Eq, NumKind::Ref), range),
                }
            }
            SwitchKind::Enum(class) => {
                let field = match ast.kind(node) {
                    NodeKind::Name(name) => self
                        .types
                        .find_field(class, name)
                        .filter(|f| self.types.field(*f).is_static),
                    _ => None,
                };
                match field {
                    Some(field) => {
                        let slot = self.types.field(field).slot;
                        let user = self.is_user_class(class);
                        self.record(node_range, UsageTarget::Field(field), user);
                        self.emit(Op::GetStatic(class, slot), node_range);
                    }
                    None => {
                        let class_name = self.types.name(class);
                        self.error(
                            "E0302",
                            format!("an enum switch case label must be a constant of {class_name}"),
                            node_range,
                        );
                        self.emit(Op::Const(Value::Null), node_range);
                    }
                }
                self.emit(Op::Binary(BinaryOp::Eq, NumKind::Ref), range);
            }
            SwitchKind::Invalid => {
                self.effect(node);
                self.emit(Op::Pop, range);
                self.emit(Op::Const(Value::Bool(false)), range);
            }
        }
    }

    fn labeled(&mut self, label: &str, body: NodeId) {
        let ast = self.ast;
        match ast.kind(body) {
            NodeKind::While { .. }
            | NodeKind::DoWhile { .. }
            | NodeKind::For { .. }
            | NodeKind::ForEach { .. } => self.loop_statement(body, Some(label)),
            NodeKind::Switch { selector, cases } => self.switch(*selector, cases, Some(label)),
            _ => {
                let end = self.label();
                let mut target = self.jump_target(Some(label), end, None);
                target.plain_break = false;
                self.cur.jumps.push(target);
                self.statement(body);
                self.cur.jumps.pop();
                self.bind(end);
            }
        }
    }

    /// `break` or `continue`, leaving `try` blocks on the way out.
    fn jump(&mut self, label: Option<&str>, is_continue: bool, range: Range) {
        let found = self.cur.jumps.iter().rev().find(|t| match (label, is_continue) {
            (Some(l), _) => t.label.as_deref() == Some(l),
            (None, false) => t.plain_break,
            (None, true) => t.continue_to.is_some(),
        });
        let keyword = if is_continue { "continue" } else { "break" };
        let Some(target) = found.cloned() else {
            match label {
                Some(l) => self.error("E0308", format!("undefined label: {l}"), range),
                None => self.error("E0308", format!("{keyword} outside of loop"), range),
            }
            return;
        };
        let destination = if is_continue {
            match target.continue_to {
                Some(l) => l,
                None => {
                    self.error("E0308", format!("not a loop label: {}", label.unwrap_or_default()), range);
                    return;
                }
            }
        } else {
            target.break_to
        };
        self.cur.b.touch(range);
        if target.handler_depth < self.cur.handler_depth {
            self.exit(Exit::Leave {
                target: Some(destination),
                depth: target.handler_depth,
                value: false,
            });
        } else {
            self.exit(Exit::Goto(destination));
        }
    }

    fn return_statement(&mut self, value: Option<NodeId>, range: Range) {
        let ret = self.cur.ret;
        let void = self.types.is_void(ret);
        let has_value = match value {
            Some(v) if void => {
                self.error("E0309", "incompatible types: unexpected return value", self.ast.range(v));
                self.effect(v);
                false
            }
            Some(v) => {
                self.value_as(v, ret);
                true
            }
            None if !void => {
                self.error("E0309", "missing return value", range);
                let prim = self.types.as_prim(ret);
                self.emit(Op::Const(Value::default_for(prim)), range);
                true
            }
            None => false,
        };
        self.cur.b.touch(range);
        if self.cur.handler_depth > 0 {
            self.exit(Exit::Leave {
                target: None,
                depth: 0,
                value: has_value,
            });
        } else {
            self.exit(Exit::Return { value: has_value });
        }
    }

    /// Layout of `try { B } catch (E e) { C } finally { F }`:
    ///
    /// ```text
    ///     TryEnter(outer)          ; finally handler
    ///     TryEnter(inner)          ; catch handler
    ///     B
    ///     TryExit; goto after
    /// c:  Store e; C; goto after   ; runtime pushes the exception
    /// after:
    ///     TryExit; EnterFinally
    /// f:  F
    ///     EndFinally -> end
    /// end:
    /// ```
    fn try_statement(&mut self, body: NodeId, catches: &[CatchClause], finally: Option<NodeId>) {
        let base = self.cur.handler_depth;
        let range = self.ast.range(body);
        let end = self.label();

        let finally_label = finally.map(|_| self.label());
        if let Some(label) = finally_label {
            let handler = self.cur.b.add_handler();
            self.cur.b.handler_mut(handler).finally = Some(label);
            self.emit(Op::TryEnter(handler), range);
            self.cur.handler_depth += 1;
        }

        if catches.is_empty() {
            self.statement(body);
        } else {
            let handler = self.cur.b.add_handler();
            self.emit(Op::TryEnter(handler), range);
            self.cur.handler_depth += 1;
            self.statement(body);
            self.cur.handler_depth -= 1;

            let after = self.label();
            if self.cur.b.tail_reachable() {
                self.emit(Op::TryExit, range);
                self.exit(Exit::Goto(after));
            }
            for clause in catches {
                let entry = self.label();
                let mut accepted = Vec::new();
                let throwable = self.types.well_known("Throwable");
                for te in &clause.types {
                    let ty = self.resolve_type(te);
                    if self.types.is_error(ty) {
                        continue;
                    }
                    if !self.types.is_subclass(ty, throwable) {
                        self.report_incompatible(ty, throwable, te.range);
                        continue;
                    }
                    accepted.push(self.types.erase(ty));
                }
                let var_ty = match accepted.as_slice() {
                    [single] => *single,
                    _ => throwable,
                };
                self.cur.b.handler_mut(handler).catches.push((accepted, entry));

                self.bind(entry);
                let previous = self.push_block(clause.name_range.join(&self.ast.range(clause.body)));
                self.cur.b.begin_statement(clause.name_range);
                let slot = self.declare_local(&clause.name, clause.name_range, var_ty);
                self.emit(Op::Store(slot), clause.name_range);
                self.statement(clause.body);
                self.pop_block(previous);
                if self.cur.b.tail_reachable() {
                    self.exit(Exit::Goto(after));
                }
            }
            self.bind(after);
        }

        match (finally, finally_label) {
            (Some(finally), Some(label)) => {
                let finally_range = self.ast.range(finally);
                if self.cur.b.tail_reachable() {
                    self.emit(Op::TryExit, finally_range);
                    self.emit(Op::EnterFinally, finally_range);
                }
                self.cur.handler_depth = base;
                self.bind(label);
                self.statement(finally);
                if self.cur.b.tail_reachable() {
                    self.cur.b.touch(finally_range);
                    self.exit(Exit::EndFinally { next: end });
                }
            }
            _ => self.cur.handler_depth = base,
        }
        self.bind(end);
    }

    /// Lower `synchronized (lock) body` as a `try`/`finally` whose entry
    /// takes the monitor and whose `finally` releases it.
    fn synchronized(&mut self, lock: NodeId, body: NodeId, range: Range) {
        let lock_range = self.ast.range(lock);
        self.cur.b.begin_statement(lock_range);
        let ty = self.value(lock, None);
        if !self.types.is_error(ty) && (!self.types.is_reference(ty) || ty == self.types.null()) {
            let found = self.types.name(ty);
            self.error("E0303", format!("unexpected type: required reference, found {found}"), lock_range);
        }
        let slot = self.temp_slot();
        self.emit(Op::Store(slot), lock_range);

        // The monitor op ends its step so a blocked thread retries only the entry.
        let enter = self.label();
        self.bind(enter);
        self.emit(Op::Load(slot), lock_range);
        self.emit(Op::MonitorEnter, lock_range);
        let acquired = self.label();
        self.bind(acquired);

        let base = self.cur.handler_depth;
        let release = self.label();
        let end = self.label();
        let handler = self.cur.b.add_handler();
        self.cur.b.handler_mut(handler).finally = Some(release);
        self.emit(Op::TryEnter(handler), range);
        self.cur.handler_depth += 1;
        self.statement(body);
        if self.cur.b.tail_reachable() {
            self.emit(Op::TryExit, range);
            self.emit(Op::EnterFinally, range);
        }
        self.cur.handler_depth = base;

        self.bind(release);
        self.emit(Op::Load(slot), lock_range);
        self.emit(Op::MonitorExit, lock_range);
        self.exit(Exit::EndFinally { next: end });
        self.bind(end);
    }
}
