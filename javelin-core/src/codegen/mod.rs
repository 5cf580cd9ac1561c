//! Lowering of declarations and bodies into step programs.
//!
//! Body-level name resolution, expression typing and op emission happen in
//! a single walk. Each method, constructor, initializer, lambda and block of
//! top-level statements becomes one [`Program`]; the resolver has already
//! reserved program ids for everything callable, so calls can be emitted
//! before their targets are generated.

mod builder;
mod call;
mod expr;
mod flow;
mod stmt;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::ast::{Ast, NodeId, NodeKind, TypeDecl, TypeExpr};
use crate::builtins::{ENUM_NAME_SLOT, ENUM_ORDINAL_SLOT};
use crate::diagnostic::{Diagnostic, DiagnosticSink};
use crate::parser::ReplParse;
use crate::resolver::{DeclaredClass, DeclaredMethod, Declarations, TypeContext, Unit};
use crate::runtime::program::{
    Call, CallTarget, Exit, Label, Op, Program, ProgramId, ProgramKind, ProgramStore,
};
use crate::runtime::value::Value;
use crate::span::{ModuleId, Range};
use crate::symbols::{ScopeId, ScopeKind, SymbolId, SymbolKind, SymbolTable, UsageTarget};
use crate::types::{FieldId, MethodId, Prim, TypeId, TypeStore};

pub(crate) use builder::ProgramBuilder;

/// A runnable `@Test` method and the program that calls it on a fresh instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestEntry {
    pub class: TypeId,
    pub method: MethodId,
    pub program: ProgramId,
}

#[derive(Debug, Default)]
pub struct CodegenOutput {
    /// Classes each static initializer touches directly.
    pub static_deps: HashMap<TypeId, BTreeSet<TypeId>>,
    /// Programs holding each module's top-level statements.
    pub top_level: BTreeMap<ModuleId, ProgramId>,
    pub tests: Vec<TestEntry>,
}

/// Generate every body declared in `units`.
pub fn generate(
    units: &[Unit<'_>],
    decls: &Declarations,
    types: &mut TypeStore,
    symbols: &mut SymbolTable,
    programs: &mut ProgramStore,
    sink: &mut DiagnosticSink,
) -> CodegenOutput {
    let mut out = CodegenOutput::default();
    for unit in units {
        let mut g = Generator::new(types, symbols, programs, unit.module, unit.ast);
        for class in decls.classes.iter().filter(|c| c.module == unit.module) {
            g.class_initializers(class);
        }
        for method in decls.methods.iter().filter(|m| m.module == unit.module) {
            g.method(method, decls);
        }
        if let (Some(root), Some(scope)) = (unit.ast.root(), decls.module_scopes.get(&unit.module)) {
            if let NodeKind::CompilationUnit { statements, .. } = unit.ast.kind(root) {
                if !statements.is_empty() {
                    let program = g.top_level(*scope, statements);
                    out.top_level.insert(unit.module, program);
                }
            }
        }
        for class in decls.classes.iter().filter(|c| c.module == unit.module) {
            out.tests.extend(g.test_runners(class.ty));
        }
        let Generator {
            diagnostics,
            static_deps,
            ..
        } = g;
        sink.extend(unit.module, diagnostics);
        for (class, deps) in static_deps {
            out.static_deps.entry(class).or_default().extend(deps);
        }
    }
    out
}

/// Context a REPL snippet is compiled into.
#[derive(Debug, Clone, Copy)]
pub struct ReplFrame {
    /// Scope receiving the snippet's declarations; its frame holds them.
    pub scope: ScopeId,
    pub class: Option<TypeId>,
    /// `None` when `this` is unavailable, such as in static methods.
    pub this_type: Option<TypeId>,
    pub module: ModuleId,
}

#[derive(Debug)]
pub struct ReplSnippet {
    pub program: Program,
    /// Type of the trailing expression, when the snippet yields a value.
    pub value_type: Option<TypeId>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Generate one REPL evaluation as a program over `frame`'s stackframe.
pub fn generate_snippet(
    parsed: &ReplParse,
    frame: &ReplFrame,
    types: &mut TypeStore,
    symbols: &mut SymbolTable,
    programs: &mut ProgramStore,
) -> ReplSnippet {
    let mut g = Generator::new(types, symbols, programs, frame.module, &parsed.ast);
    let void = g.types.void();
    let mut ctx = FnCtx::new(frame.scope, frame.class, frame.this_type, void);
    ctx.frame_scope = g.symbols.frame_scope(frame.scope);
    g.enter(ctx);

    let mut value_type = None;
    let last = parsed.statements.last().copied();
    for stmt in &parsed.statements {
        let trailing = parsed
            .value
            .filter(|_| Some(*stmt) == last);
        match trailing {
            Some(value) => {
                let range = parsed.ast.range(*stmt);
                g.cur.b.begin_statement(range);
                let ty = g.expr(value, None);
                if g.types.is_void(ty) {
                    g.exit(Exit::Return { value: false });
                } else {
                    value_type = Some(ty);
                    g.exit(Exit::Return { value: true });
                }
            }
            None => g.statement(*stmt),
        }
    }
    if value_type.is_none() && g.cur.b.tail_reachable() {
        g.exit(Exit::Return { value: false });
    }

    let range = parsed
        .statements
        .iter()
        .fold(Range::EMPTY, |acc, s| acc.join(&parsed.ast.range(*s)));
    let program = g.finish("<repl>".into(), ProgramKind::Repl, range, value_type.is_some());
    ReplSnippet {
        program,
        value_type,
        diagnostics: g.diagnostics,
    }
}

// ---------------------------------------------------------------------
// Function contexts
// ---------------------------------------------------------------------

/// Something a lambda copies from an enclosing frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Capture {
    Symbol(SymbolId),
    This,
}

#[derive(Debug, Clone)]
struct JumpTarget {
    label: Option<String>,
    break_to: Label,
    continue_to: Option<Label>,
    /// Reachable by an unlabelled `break` (loops and switches).
    plain_break: bool,
    handler_depth: usize,
}

/// State of the program currently being generated.
#[derive(Debug)]
pub(crate) struct FnCtx {
    b: ProgramBuilder,
    root: ScopeId,
    scope: ScopeId,
    frame_scope: ScopeId,
    class: Option<TypeId>,
    this_type: Option<TypeId>,
    ret: TypeId,
    is_lambda: bool,
    jumps: Vec<JumpTarget>,
    handler_depth: usize,
    captures: Vec<(Capture, usize)>,
    static_owner: Option<TypeId>,
    method_type_params: Vec<TypeId>,
}

impl FnCtx {
    pub(crate) fn new(scope: ScopeId, class: Option<TypeId>, this_type: Option<TypeId>, ret: TypeId) -> Self {
        Self {
            b: ProgramBuilder::new(),
            root: scope,
            scope,
            frame_scope: scope,
            class,
            this_type,
            ret,
            is_lambda: false,
            jumps: Vec::new(),
            handler_depth: 0,
            captures: Vec::new(),
            static_owner: None,
            method_type_params: Vec::new(),
        }
    }
}

/// How a name in expression position resolved.
#[derive(Debug, Clone, Copy)]
enum NameRef {
    Local(SymbolId),
    Field(FieldId),
    Type(TypeId),
    Missing,
}

/// An assignable location whose address parts are already on the stack.
#[derive(Debug, Clone, Copy)]
enum Place {
    Local(usize, TypeId),
    Field(usize, TypeId),
    Static(TypeId, usize, TypeId),
    Element(TypeId),
}

impl Place {
    fn ty(self) -> TypeId {
        match self {
            Place::Local(_, ty) | Place::Field(_, ty) | Place::Static(_, _, ty) | Place::Element(ty) => ty,
        }
    }
}

pub(crate) struct Generator<'g> {
    pub(crate) types: &'g mut TypeStore,
    pub(crate) symbols: &'g mut SymbolTable,
    programs: &'g mut ProgramStore,
    pub(crate) diagnostics: Vec<Diagnostic>,
    module: ModuleId,
    ast: &'g Ast,
    cur: FnCtx,
    outer: Vec<FnCtx>,
    static_deps: HashMap<TypeId, BTreeSet<TypeId>>,
}

impl<'g> Generator<'g> {
    pub(crate) fn new(
        types: &'g mut TypeStore,
        symbols: &'g mut SymbolTable,
        programs: &'g mut ProgramStore,
        module: ModuleId,
        ast: &'g Ast,
    ) -> Self {
        let void = types.void();
        Self {
            types,
            symbols,
            programs,
            diagnostics: Vec::new(),
            module,
            ast,
            cur: FnCtx::new(ScopeId(0), None, None, void),
            outer: Vec::new(),
            static_deps: HashMap::new(),
        }
    }

    fn error(&mut self, code: &str, message: impl Into<String>, range: Range) {
        self.diagnostics
            .push(Diagnostic::error(message, range).with_code(code));
    }

    pub(crate) fn enter(&mut self, ctx: FnCtx) {
        let previous = std::mem::replace(&mut self.cur, ctx);
        self.outer.push(previous);
    }

    fn leave(&mut self) -> FnCtx {
        let ctx = self.outer.pop();
        match ctx {
            Some(ctx) => std::mem::replace(&mut self.cur, ctx),
            None => {
                let void = self.types.void();
                std::mem::replace(&mut self.cur, FnCtx::new(ScopeId(0), None, None, void))
            }
        }
    }

    /// Close the current function and assemble its program.
    pub(crate) fn finish(&mut self, name: String, kind: ProgramKind, range: Range, returns_value: bool) -> Program {
        let ctx = self.leave();
        let frame = self.symbols.frame(ctx.frame_scope).layout();
        let captures = ctx.captures.iter().map(|(_, slot)| *slot).collect();
        ctx.b.finish(
            name,
            kind,
            Some(self.module),
            Some(ctx.root),
            frame,
            returns_value,
            range,
            captures,
        )
    }

    // -----------------------------------------------------------------
    // Emission helpers
    // -----------------------------------------------------------------

    fn emit(&mut self, op: Op, range: Range) {
        self.cur.b.emit(op, range);
    }

    fn exit(&mut self, exit: Exit<Label>) {
        self.cur.b.exit(exit);
    }

    fn label(&mut self) -> Label {
        self.cur.b.new_label()
    }

    fn bind(&mut self, label: Label) {
        self.cur.b.bind(label);
    }

    /// End the step with a call; the next step resumes after it returns.
    fn invoke(&mut self, target: CallTarget, argc: usize, range: Range) {
        let resume = self.label();
        self.cur.b.touch(range);
        self.exit(Exit::Invoke {
            call: Call { target, argc },
            resume,
        });
        self.bind(resume);
    }

    /// Emit the implicit return at the end of a body.
    fn implicit_return(&mut self, ret: TypeId) {
        if self.types.is_void(ret) {
            self.exit(Exit::Return { value: false });
        } else {
            let prim = self.types.as_prim(ret);
            self.emit(Op::Const(Value::default_for(prim)), Range::EMPTY);
            self.exit(Exit::Return { value: true });
        }
    }

    fn record(&mut self, range: Range, target: UsageTarget, user: bool) {
        self.symbols.record_usage(self.module, range, target, user);
    }

    fn is_user_class(&self, ty: TypeId) -> bool {
        self.types.class(ty).is_some_and(|c| !c.is_builtin)
    }

    /// Note that the static initializer being generated touches `class`.
    fn touch_class(&mut self, class: TypeId) {
        let class = self.types.erase(class);
        let Some(owner) = self.cur.static_owner else { return };
        if owner != class && self.is_user_class(class) {
            self.static_deps.entry(owner).or_default().insert(class);
        }
    }

    // -----------------------------------------------------------------
    // Scopes and names
    // -----------------------------------------------------------------

    fn push_block(&mut self, range: Range) -> ScopeId {
        let previous = self.cur.scope;
        let scope = self
            .symbols
            .add_scope(ScopeKind::Block, Some(previous), Some(self.module), range, false);
        self.cur.scope = scope;
        previous
    }

    fn pop_block(&mut self, previous: ScopeId) {
        self.cur.scope = previous;
    }

    pub(crate) fn resolve_type(&mut self, te: &TypeExpr) -> TypeId {
        let params = self.cur.method_type_params.clone();
        let ctx = TypeContext {
            module: Some(self.module),
            method_params: &params,
            class: self.cur.class,
        };
        crate::resolver::resolve_type_expr(self.types, self.symbols, &mut self.diagnostics, te, ctx)
    }

    fn self_type(&mut self, class: TypeId) -> TypeId {
        let params = self
            .types
            .class(class)
            .map(|c| c.type_params.clone())
            .unwrap_or_default();
        self.types.generic(class, params)
    }

    /// Classes whose members are visible unqualified, innermost first.
    fn enclosing_classes(&self) -> Vec<TypeId> {
        let mut out = Vec::new();
        let mut class = self.cur.class;
        while let Some(id) = class {
            out.push(id);
            class = self.types.class(id).and_then(|c| c.outer);
        }
        out
    }

    fn lookup_name(&self, name: &str) -> NameRef {
        if let Some(symbol) = self.symbols.lookup(self.cur.scope, name) {
            return NameRef::Local(symbol);
        }
        for class in self.enclosing_classes() {
            if let Some(field) = self.types.find_field(class, name) {
                return NameRef::Field(field);
            }
        }
        match self.types.lookup(name) {
            Some(ty) if self.types.class(ty).is_some() => NameRef::Type(ty),
            _ => NameRef::Missing,
        }
    }

    /// Slot of `capture` in the frame at `depth`, capturing it through
    /// enclosing lambdas as needed.
    fn slot_for(&mut self, depth: usize, capture: Capture) -> Option<usize> {
        let ctx = if depth == self.outer.len() {
            &self.cur
        } else {
            self.outer.get(depth)?
        };
        match capture {
            Capture::Symbol(id) if self.symbols.symbol(id).frame_scope == ctx.frame_scope => {
                return Some(self.symbols.symbol(id).slot);
            }
            Capture::This if !ctx.is_lambda && ctx.this_type.is_some() => return Some(0),
            _ => {}
        }
        if let Some((_, slot)) = ctx.captures.iter().find(|(c, _)| *c == capture) {
            return Some(*slot);
        }
        if !ctx.is_lambda || depth == 0 {
            return None;
        }
        let frame_scope = ctx.frame_scope;
        let slot = self.symbols.allocate_slot(frame_scope);
        let ctx = if depth == self.outer.len() {
            &mut self.cur
        } else {
            &mut self.outer[depth]
        };
        ctx.captures.push((capture, slot));
        Some(slot)
    }

    fn load_local(&mut self, symbol: SymbolId, range: Range) -> TypeId {
        let depth = self.outer.len();
        let ty = self.symbols.symbol(symbol).ty;
        match self.slot_for(depth, Capture::Symbol(symbol)) {
            Some(slot) => self.emit(Op::Load(slot), range),
            None => {
                let name = self.symbols.symbol(symbol).name.clone();
                self.error("E0302", format!("variable {name} is not accessible here"), range);
                self.emit(Op::Const(Value::Null), range);
            }
        }
        ty
    }

    /// Push `this`; reports an error in static contexts.
    fn load_this(&mut self, range: Range) -> TypeId {
        let Some(this_type) = self.cur.this_type else {
            self.error("E0306", "cannot use this in a static context", range);
            self.emit(Op::Const(Value::Null), range);
            return self.types.error();
        };
        let depth = self.outer.len();
        let slot = self.slot_for(depth, Capture::This).unwrap_or(0);
        self.emit(Op::Load(slot), range);
        this_type
    }

    // -----------------------------------------------------------------
    // Conversions
    // -----------------------------------------------------------------

    fn report_incompatible(&mut self, from: TypeId, to: TypeId, range: Range) {
        let message = format!(
            "incompatible types: {} cannot be converted to {}",
            self.types.name(from),
            self.types.name(to)
        );
        self.error("E0303", message, range);
    }

    /// Assignment conversion of the value on top of the stack.
    fn coerce(&mut self, from: TypeId, to: TypeId, range: Range, constant: Option<i64>) {
        if from == to || self.types.is_error(from) || self.types.is_error(to) {
            return;
        }
        match (self.types.as_prim(from), self.types.as_prim(to)) {
            (Some(a), Some(b)) => {
                if a.widens_to(b) {
                    self.convert_prim(a, b, range);
                    return;
                }
                let narrowable = matches!(a, Prim::Int | Prim::Short | Prim::Char | Prim::Byte);
                if narrowable && constant.is_some_and(|v| fits(v, b)) {
                    self.emit(Op::Convert(b), range);
                    return;
                }
            }
            (Some(_), None) => {
                if self.types.is_assignable(from, to) {
                    return;
                }
            }
            (None, Some(b)) => {
                if let Some(unboxed) = self.types.unboxed(from) {
                    if unboxed.widens_to(b) {
                        self.emit(Op::Unbox(unboxed), range);
                        self.convert_prim(unboxed, b, range);
                        return;
                    }
                }
            }
            (None, None) => {
                if self.types.is_assignable(from, to) {
                    return;
                }
            }
        }
        self.report_incompatible(from, to, range);
    }

    fn convert_prim(&mut self, from: Prim, to: Prim, range: Range) {
        if needs_convert(from, to) {
            self.emit(Op::Convert(to), range);
        }
    }

    /// Convert the top of the stack to primitive `to`, unboxing if needed.
    fn to_prim(&mut self, from: TypeId, to: Prim, range: Range) {
        match self.types.as_prim(from) {
            Some(p) => self.convert_prim(p, to, range),
            None => {
                if !self.types.is_error(from) {
                    self.emit(Op::Unbox(to), range);
                }
            }
        }
    }

    /// Render the value on top of the stack as a `String`.
    fn stringify(&mut self, ty: TypeId, range: Range) {
        if self.types.is_string(ty) {
            self.emit(Op::Stringify(None), range);
        } else if let Some(prim) = self.types.as_prim(ty) {
            self.emit(Op::Stringify(Some(prim)), range);
        } else {
            self.invoke(CallTarget::Stringify, 1, range);
        }
    }

    // -----------------------------------------------------------------
    // Classes
    // -----------------------------------------------------------------

    fn type_decl(&self, node: NodeId) -> Option<&'g TypeDecl> {
        let ast: &'g Ast = self.ast;
        match ast.kind(node) {
            NodeKind::TypeDecl(decl) => Some(decl),
            _ => None,
        }
    }

    fn field_for_decl(&self, class: TypeId, node: NodeId) -> Option<FieldId> {
        self.types
            .class(class)?
            .fields
            .iter()
            .copied()
            .find(|f| self.types.field(*f).decl == Some(node))
    }

    fn class_initializers(&mut self, class: &DeclaredClass) {
        let Some(decl) = self.type_decl(class.node) else { return };
        let Some(info) = self.types.class(class.ty) else { return };
        let (static_init, instance_init) = (info.static_init, info.instance_init);
        if let Some(program) = static_init {
            self.static_initializer(class, decl, program);
        }
        if let Some(program) = instance_init {
            self.instance_initializer(class, decl, program);
        }
    }

    fn static_initializer(&mut self, class: &DeclaredClass, decl: &'g TypeDecl, id: ProgramId) {
        let ast = self.ast;
        let ty = class.ty;
        let void = self.types.void();
        let scope = self.symbols.add_scope(
            ScopeKind::Method,
            Some(class.scope),
            Some(self.module),
            Range::EMPTY,
            true,
        );
        let mut ctx = FnCtx::new(scope, Some(ty), None, void);
        ctx.static_owner = Some(ty);
        self.enter(ctx);

        let constants = self
            .types
            .class(ty)
            .map(|c| c.enum_constants.clone())
            .unwrap_or_default();
        for (ordinal, field) in constants.into_iter().enumerate() {
            let info = self.types.field(field).clone();
            let Some(node) = info.decl else { continue };
            let NodeKind::EnumConstant { args, .. } = ast.kind(node) else { continue };
            let range = ast.range(node);
            self.cur.b.begin_statement(range);
            self.emit(Op::NewObject(ty), range);
            self.emit(Op::Dup, range);
            self.emit(Op::Const(Value::str(info.name.as_str())), range);
            self.emit(Op::PutField(ENUM_NAME_SLOT), range);
            self.emit(Op::Dup, range);
            self.emit(Op::Const(Value::Int(ordinal as i32)), range);
            self.emit(Op::PutField(ENUM_ORDINAL_SLOT), range);
            self.emit(Op::Dup, range);
            let ctors = self.types.constructors(ty);
            let self_ty = self.self_type(ty);
            match self.arguments(&ctors, Some(self_ty), args, range) {
                Some((ctor, _)) => self.invoke(CallTarget::Special(ctor), args.len() + 1, range),
                None => self.emit(Op::Pop, range),
            }
            self.emit(Op::PutStatic(ty, info.slot), range);
        }

        for member in &decl.members {
            match ast.kind(*member) {
                NodeKind::Field { init: Some(init), .. } => {
                    let Some(field) = self.field_for_decl(ty, *member) else { continue };
                    let info = self.types.field(field).clone();
                    if !info.is_static {
                        continue;
                    }
                    self.cur.b.begin_statement(self.ast.range(*member));
                    self.value_as(*init, info.ty);
                    self.emit(Op::PutStatic(ty, info.slot), info.range);
                }
                NodeKind::Initializer {
                    is_static: true,
                    body,
                } => self.statement(*body),
                _ => {}
            }
        }
        self.exit(Exit::Return { value: false });
        let name = format!("{}.<clinit>", self.types.name(ty));
        let range = self.ast.range(class.node);
        let program = self.finish(name, ProgramKind::StaticInit(ty), range, false);
        self.programs.fill(id, program);
    }

    fn instance_initializer(&mut self, class: &DeclaredClass, decl: &'g TypeDecl, id: ProgramId) {
        let ast = self.ast;
        let ty = class.ty;
        let void = self.types.void();
        let this_type = self.self_type(ty);
        let scope = self.symbols.add_scope(
            ScopeKind::Method,
            Some(class.scope),
            Some(self.module),
            Range::EMPTY,
            true,
        );
        self.symbols
            .declare(scope, "this", Range::EMPTY, this_type, SymbolKind::This);
        self.enter(FnCtx::new(scope, Some(ty), Some(this_type), void));

        for member in &decl.members {
            match ast.kind(*member) {
                NodeKind::Field { init: Some(init), .. } => {
                    let Some(field) = self.field_for_decl(ty, *member) else { continue };
                    let info = self.types.field(field).clone();
                    if info.is_static {
                        continue;
                    }
                    self.cur.b.begin_statement(self.ast.range(*member));
                    self.emit(Op::Load(0), info.range);
                    self.value_as(*init, info.ty);
                    self.emit(Op::PutField(info.slot), info.range);
                }
                NodeKind::Initializer {
                    is_static: false,
                    body,
                } => self.statement(*body),
                _ => {}
            }
        }
        self.exit(Exit::Return { value: false });
        let name = format!("{}.<init-fields>", self.types.name(ty));
        let range = self.ast.range(class.node);
        let program = self.finish(name, ProgramKind::InstanceInit(ty), range, false);
        self.programs.fill(id, program);
    }

    // -----------------------------------------------------------------
    // Methods and constructors
    // -----------------------------------------------------------------

    fn method(&mut self, declared: &DeclaredMethod, decls: &Declarations) {
        let ast = self.ast;
        let info = self.types.method(declared.id).clone();
        let Some(class) = decls.class(declared.class) else { return };
        let method_decl = declared.node.and_then(|node| match ast.kind(node) {
            NodeKind::Method(m) => Some(m),
            _ => None,
        });
        let range = match declared.node {
            Some(node) => ast.range(node),
            None => info.range,
        };
        let scope = self.symbols.add_scope(
            ScopeKind::Method,
            Some(class.scope),
            Some(self.module),
            range,
            true,
        );
        let this_type = (!info.is_static).then(|| self.self_type(declared.class));
        if let Some(this_type) = this_type {
            self.symbols
                .declare(scope, "this", Range::EMPTY, this_type, SymbolKind::This);
        }
        if let Some(m) = method_decl {
            for (param, ty) in m.params.iter().zip(&info.params) {
                self.symbols
                    .declare(scope, param.name.clone(), param.name_range, *ty, SymbolKind::Parameter);
            }
        }
        let mut ctx = FnCtx::new(scope, Some(declared.class), this_type, info.ret);
        ctx.method_type_params = info.type_params.clone();
        self.enter(ctx);

        let body: Vec<NodeId> = match method_decl.and_then(|m| m.body).map(|b| ast.kind(b)) {
            Some(NodeKind::Block(stmts)) => stmts.clone(),
            _ => Vec::new(),
        };
        let mut rest: &[NodeId] = &body;
        if info.is_constructor {
            rest = self.constructor_prologue(declared.class, &body, info.range);
        }
        for stmt in rest {
            self.statement(*stmt);
        }
        if self.cur.b.tail_reachable() {
            self.implicit_return(info.ret);
        }
        if let Some(block) = method_decl.and_then(|m| m.body) {
            let returns_value = !info.is_constructor
                && !self.types.is_void(info.ret)
                && !self.types.is_error(info.ret);
            let found = flow::check_body(ast, &body, ast.range(block), returns_value);
            self.diagnostics.extend(found);
        }

        let owner = self.types.name(declared.class);
        let (name, kind) = if info.is_constructor {
            (format!("{owner}.<init>"), ProgramKind::Constructor(declared.id))
        } else {
            (format!("{owner}.{}", info.name), ProgramKind::Method(declared.id))
        };
        let returns_value = !self.types.is_void(info.ret);
        let program = self.finish(name, kind, range, returns_value);
        self.programs.fill(declared.program, program);
    }

    /// Emit the superclass or sibling constructor call and the field
    /// initializers; returns the statements left to generate.
    fn constructor_prologue<'b>(&mut self, class: TypeId, body: &'b [NodeId], range: Range) -> &'b [NodeId] {
        let first = body.first().map(|n| (*n, self.ast.kind(*n).clone()));
        match first {
            Some((node, NodeKind::CtorCall { is_super: false, args })) => {
                let call_range = self.ast.range(node);
                self.cur.b.begin_statement(call_range);
                self.emit(Op::Load(0), call_range);
                let ctors = self.types.constructors(class);
                let self_ty = self.self_type(class);
                match self.arguments(&ctors, Some(self_ty), &args, call_range) {
                    Some((ctor, _)) => {
                        self.invoke(CallTarget::Special(ctor), args.len() + 1, call_range)
                    }
                    None => self.emit(Op::Pop, call_range),
                }
                &body[1..]
            }
            Some((node, NodeKind::CtorCall { is_super: true, args })) => {
                let call_range = self.ast.range(node);
                self.cur.b.begin_statement(call_range);
                self.super_constructor(class, &args, call_range);
                self.run_instance_init(class, call_range);
                &body[1..]
            }
            _ => {
                self.super_constructor(class, &[], range);
                self.run_instance_init(class, range);
                body
            }
        }
    }

    fn super_constructor(&mut self, class: TypeId, args: &[NodeId], range: Range) {
        let Some(superclass) = self.types.class(class).and_then(|c| c.superclass) else { return };
        let object = self.types.object();
        let enum_base = self.types.well_known("Enum");
        if superclass == object || superclass == enum_base {
            if !args.is_empty() {
                self.error("E0304", "constructor Object takes no arguments", range);
            }
            return;
        }
        let super_ref = self
            .types
            .class(class)
            .and_then(|c| c.super_refs.first().copied())
            .unwrap_or(superclass);
        self.emit(Op::Load(0), range);
        let ctors = self.types.constructors(superclass);
        match self.arguments(&ctors, Some(super_ref), args, range) {
            Some((ctor, _)) => self.invoke(CallTarget::Special(ctor), args.len() + 1, range),
            None => self.emit(Op::Pop, range),
        }
    }

    fn run_instance_init(&mut self, class: TypeId, range: Range) {
        if let Some(program) = self.types.class(class).and_then(|c| c.instance_init) {
            self.emit(Op::Load(0), range);
            self.invoke(CallTarget::Init(program), 1, range);
        }
    }

    // -----------------------------------------------------------------
    // Entry programs
    // -----------------------------------------------------------------

    fn top_level(&mut self, module_scope: ScopeId, statements: &[NodeId]) -> ProgramId {
        let void = self.types.void();
        let scope = self.symbols.add_scope(
            ScopeKind::Method,
            Some(module_scope),
            Some(self.module),
            Range::EMPTY,
            true,
        );
        self.enter(FnCtx::new(scope, None, None, void));
        for stmt in statements {
            self.statement(*stmt);
        }
        if self.cur.b.tail_reachable() {
            self.exit(Exit::Return { value: false });
        }
        let found = flow::check_body(self.ast, statements, Range::EMPTY, false);
        self.diagnostics.extend(found);
        let range = statements
            .iter()
            .fold(Range::EMPTY, |acc, s| acc.join(&self.ast.range(*s)));
        let program = self.finish("<main>".into(), ProgramKind::Main(self.module), range, false);
        self.programs.add(program)
    }

    /// `new C().m()` for every `@Test` method of `class`.
    fn test_runners(&mut self, class: TypeId) -> Vec<TestEntry> {
        let Some(info) = self.types.class(class) else { return Vec::new() };
        if info.is_abstract {
            return Vec::new();
        }
        let tests: Vec<MethodId> = info
            .methods
            .iter()
            .copied()
            .filter(|m| {
                let m = self.types.method(*m);
                m.annotations.iter().any(|a| a == "Test")
                    && !m.is_static
                    && m.params.is_empty()
                    && self.types.is_void(m.ret)
            })
            .collect();
        let Some(ctor) = self
            .types
            .constructors(class)
            .into_iter()
            .find(|c| self.types.method(*c).params.is_empty())
        else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for method in tests {
            let void = self.types.void();
            let range = self.types.method(method).range;
            let scope = self.symbols.add_scope(
                ScopeKind::Method,
                None,
                Some(self.module),
                Range::EMPTY,
                true,
            );
            self.enter(FnCtx::new(scope, Some(class), None, void));
            self.emit(Op::NewObject(class), range);
            self.emit(Op::Dup, range);
            self.invoke(CallTarget::Special(ctor), 1, range);
            self.invoke(CallTarget::Virtual(method), 1, range);
            self.exit(Exit::Return { value: false });
            let name = format!("test {}.{}", self.types.name(class), self.types.method(method).name);
            let program = self.finish(name, ProgramKind::TestRunner(method), range, false);
            out.push(TestEntry {
                class,
                method,
                program: self.programs.add(program),
            });
        }
        out
    }
}

fn int_like(prim: Prim) -> bool {
    matches!(prim, Prim::Byte | Prim::Short | Prim::Int)
}

/// Whether converting between the runtime representations changes the value.
fn needs_convert(from: Prim, to: Prim) -> bool {
    if from == to {
        return false;
    }
    if int_like(from) && int_like(to) && from.widens_to(to) {
        return false;
    }
    !(from == Prim::Float && to == Prim::Double)
}

/// Whether an integer constant is representable in `to`.
fn fits(value: i64, to: Prim) -> bool {
    match to {
        Prim::Byte => (i8::MIN as i64..=i8::MAX as i64).contains(&value),
        Prim::Short => (i16::MIN as i64..=i16::MAX as i64).contains(&value),
        Prim::Char => (0..=u16::MAX as i64).contains(&value),
        Prim::Int => (i32::MIN as i64..=i32::MAX as i64).contains(&value),
        _ => false,
    }
}

/// Binary numeric promotion.
fn promote(a: Prim, b: Prim) -> Prim {
    if a == Prim::Double || b == Prim::Double {
        Prim::Double
    } else if a == Prim::Float || b == Prim::Float {
        Prim::Float
    } else if a == Prim::Long || b == Prim::Long {
        Prim::Long
    } else {
        Prim::Int
    }
}

/// Unary numeric promotion.
fn promote_unary(a: Prim) -> Prim {
    match a {
        Prim::Byte | Prim::Short | Prim::Char => Prim::Int,
        other => other,
    }
}

#[cfg(test)]
mod tests;
