//! Declaration resolution.
//!
//! Runs before code generation over every module of a compilation:
//!
//! 1. register classes, interfaces and enums (including member types),
//! 2. resolve `extends`/`implements` clauses and check the hierarchy,
//! 3. lay out fields and declare methods, reserving a program per body,
//! 4. check that concrete classes implement every abstract method.
//!
//! Method bodies are resolved later, fused with lowering in `codegen`.

pub mod static_init;

use std::collections::HashMap;

use crate::ast::{
    Ast, MethodDecl, Modifiers, NodeId, NodeKind, TypeDecl, TypeDeclKind, TypeExpr, TypeParam,
};
use crate::builtins::NativeMethod;
use crate::diagnostic::{Diagnostic, DiagnosticSink};
use crate::runtime::program::{ProgramId, ProgramStore};
use crate::span::{ModuleId, Range};
use crate::symbols::{ScopeId, ScopeKind, SymbolTable, UsageTarget};
use crate::types::{
    ClassInfo, ClassKind, FieldInfo, MethodBody, MethodId, MethodInfo, Prim, TypeId, TypeKind,
    TypeStore,
};

pub use static_init::{StaticInitOrder, order_static_initializers};

/// One parsed module handed to the resolver and code generator.
#[derive(Debug, Clone, Copy)]
pub struct Unit<'a> {
    pub module: ModuleId,
    pub ast: &'a Ast,
}

#[derive(Debug, Clone)]
pub struct DeclaredClass {
    pub ty: TypeId,
    pub module: ModuleId,
    pub node: NodeId,
    pub scope: ScopeId,
}

#[derive(Debug, Clone)]
pub struct DeclaredMethod {
    pub id: MethodId,
    pub class: TypeId,
    pub module: ModuleId,
    /// `None` for synthesized default constructors.
    pub node: Option<NodeId>,
    pub program: ProgramId,
}

/// Everything later stages need to find declarations again.
#[derive(Debug, Default)]
pub struct Declarations {
    pub classes: Vec<DeclaredClass>,
    pub methods: Vec<DeclaredMethod>,
    pub module_scopes: HashMap<ModuleId, ScopeId>,
}

impl Declarations {
    pub fn class(&self, ty: TypeId) -> Option<&DeclaredClass> {
        self.classes.iter().find(|c| c.ty == ty)
    }
}

/// Type variables in scope while resolving a type expression.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeContext<'a> {
    pub module: Option<ModuleId>,
    pub method_params: &'a [TypeId],
    pub class: Option<TypeId>,
}

/// Resolve a written type against the store, reporting unknown names.
pub fn resolve_type_expr(
    types: &mut TypeStore,
    symbols: &mut SymbolTable,
    diagnostics: &mut Vec<Diagnostic>,
    te: &TypeExpr,
    ctx: TypeContext<'_>,
) -> TypeId {
    let base = resolve_type_name(types, symbols, diagnostics, te, ctx);
    if types.is_error(base) {
        return base;
    }
    types.array_of_dims(base, te.dims)
}

fn resolve_type_name(
    types: &mut TypeStore,
    symbols: &mut SymbolTable,
    diagnostics: &mut Vec<Diagnostic>,
    te: &TypeExpr,
    ctx: TypeContext<'_>,
) -> TypeId {
    if te.name == "void" {
        return types.void();
    }
    if let Some(prim) = Prim::from_name(&te.name) {
        if !te.args.is_empty() {
            diagnostics.push(
                Diagnostic::error(
                    format!("primitive type {} cannot have type arguments", te.name),
                    te.range,
                )
                .with_code("E0211"),
            );
        }
        return types.prim(prim);
    }

    let simple = te.name.rsplit('.').next().unwrap_or(&te.name);
    if let Some(var) = find_type_var(types, ctx, simple) {
        return var;
    }
    let Some(base) = types.lookup(simple).filter(|id| types.class(*id).is_some()) else {
        diagnostics.push(
            Diagnostic::error(format!("cannot find type {}", te.name), te.range)
                .with_code("E0205"),
        );
        return types.error();
    };

    if let Some(module) = ctx.module {
        let user = types.class(base).is_some_and(|c| !c.is_builtin);
        let name_range = name_range(te.range, &te.name);
        symbols.record_usage(module, name_range, UsageTarget::Type(base), user);
    }

    if te.args.is_empty() {
        return base;
    }
    let expected = types.class(base).map_or(0, |c| c.type_params.len());
    if expected != te.args.len() {
        diagnostics.push(
            Diagnostic::error(
                format!(
                    "type {} expects {expected} type argument(s) but {} were given",
                    te.name,
                    te.args.len()
                ),
                te.range,
            )
            .with_code("E0211"),
        );
        return base;
    }
    let mut args = Vec::with_capacity(te.args.len());
    for arg in &te.args {
        let mut ty = resolve_type_expr(types, symbols, diagnostics, arg, ctx);
        if let Some(prim) = types.as_prim(ty) {
            diagnostics.push(
                Diagnostic::error(
                    format!("type argument cannot be primitive type {}", prim.name()),
                    arg.range,
                )
                .with_code("E0211"),
            );
            ty = types.boxed(prim);
        }
        args.push(ty);
    }
    types.generic(base, args)
}

fn find_type_var(types: &TypeStore, ctx: TypeContext<'_>, name: &str) -> Option<TypeId> {
    let named = |id: &TypeId| matches!(types.kind(*id), TypeKind::TypeVar { name: n, .. } if n == name);
    if let Some(var) = ctx.method_params.iter().find(|v| named(v)) {
        return Some(*var);
    }
    let mut class = ctx.class;
    while let Some(id) = class {
        let info = types.class(id)?;
        if let Some(var) = info.type_params.iter().find(|v| named(v)) {
            return Some(*var);
        }
        class = info.outer;
    }
    None
}

/// Range of the first `name.len()` characters of `range` on its start line.
pub fn name_range(range: Range, name: &str) -> Range {
    let simple = name.rsplit('.').next().unwrap_or(name);
    let offset = name.len() - simple.len();
    let start = range.start_column + offset as u32;
    Range::new(
        range.start_line,
        start,
        range.start_line,
        start + simple.chars().count() as u32,
    )
}

/// Run every declaration pass over `units`.
pub fn declare(
    units: &[Unit<'_>],
    types: &mut TypeStore,
    symbols: &mut SymbolTable,
    programs: &mut ProgramStore,
    diagnostics: &mut DiagnosticSink,
) -> Declarations {
    let mut resolver = Resolver {
        types,
        symbols,
        programs,
        diagnostics,
        decls: Declarations::default(),
    };
    for unit in units {
        resolver.register_module(*unit);
    }
    for unit in units {
        resolver.resolve_headers(*unit);
    }
    resolver.break_cycles();
    let order = resolver.hierarchy_order();
    for ty in order {
        resolver.declare_members(units, ty);
    }
    resolver.check_abstract_methods();
    resolver.decls
}

struct Resolver<'r> {
    types: &'r mut TypeStore,
    symbols: &'r mut SymbolTable,
    programs: &'r mut ProgramStore,
    diagnostics: &'r mut DiagnosticSink,
    decls: Declarations,
}

fn type_decl(ast: &Ast, node: NodeId) -> Option<&TypeDecl> {
    match ast.kind(node) {
        NodeKind::TypeDecl(decl) => Some(decl),
        _ => None,
    }
}

impl Resolver<'_> {
    fn error(&mut self, module: ModuleId, code: &str, message: String, range: Range) {
        self.diagnostics
            .push(module, Diagnostic::error(message, range).with_code(code));
    }

    fn unit<'u>(units: &'u [Unit<'u>], module: ModuleId) -> Option<Unit<'u>> {
        units.iter().find(|u| u.module == module).copied()
    }

    // -----------------------------------------------------------------
    // Pass 1: register types
    // -----------------------------------------------------------------

    fn register_module(&mut self, unit: Unit<'_>) {
        let Some(root) = unit.ast.root() else { return };
        let scope = self.symbols.add_scope(
            ScopeKind::Module,
            None,
            Some(unit.module),
            unit.ast.range(root),
            false,
        );
        self.decls.module_scopes.insert(unit.module, scope);
        if let NodeKind::CompilationUnit { types, .. } = unit.ast.kind(root) {
            for node in types {
                self.register_type(unit, *node, None, scope);
            }
        }
    }

    fn register_type(&mut self, unit: Unit<'_>, node: NodeId, outer: Option<TypeId>, parent: ScopeId) {
        let Some(decl) = type_decl(unit.ast, node) else { return };
        if let Some(existing) = self.types.lookup(&decl.name) {
            let builtin = self.types.class(existing).is_some_and(|c| c.is_builtin);
            let message = if builtin {
                format!("class {} clashes with a library class", decl.name)
            } else {
                format!("duplicate class {}", decl.name)
            };
            self.error(unit.module, "E0201", message, decl.name_range);
            return;
        }

        let kind = match decl.kind {
            TypeDeclKind::Class => ClassKind::Class,
            TypeDeclKind::Interface => ClassKind::Interface,
            TypeDeclKind::Enum => ClassKind::Enum,
        };
        let mut info = ClassInfo::new(decl.name.clone(), kind);
        info.module = Some(unit.module);
        info.decl = Some(node);
        info.name_range = decl.name_range;
        info.is_abstract = kind == ClassKind::Interface || decl.modifiers.is_abstract;
        info.is_final = decl.modifiers.is_final || kind == ClassKind::Enum;
        info.outer = outer;
        let ty = self.types.add_class(info);
        self.symbols
            .record_usage(unit.module, decl.name_range, UsageTarget::Type(ty), true);

        let object = self.types.object();
        let params: Vec<TypeId> = decl
            .type_params
            .iter()
            .map(|p| self.types.type_var(p.name.clone(), object))
            .collect();
        if let Some(class) = self.types.class_mut(ty) {
            class.type_params = params;
        }

        let scope = self.symbols.add_scope(
            ScopeKind::Class(ty),
            Some(parent),
            Some(unit.module),
            unit.ast.range(node),
            false,
        );
        self.decls.classes.push(DeclaredClass {
            ty,
            module: unit.module,
            node,
            scope,
        });

        for member in &decl.members {
            if matches!(unit.ast.kind(*member), NodeKind::TypeDecl(_)) {
                self.register_type(unit, *member, Some(ty), scope);
            }
        }
    }

    // -----------------------------------------------------------------
    // Pass 2: supertypes
    // -----------------------------------------------------------------

    fn resolve(&mut self, module: ModuleId, te: &TypeExpr, class: Option<TypeId>, method_params: &[TypeId]) -> TypeId {
        let mut found = Vec::new();
        let ctx = TypeContext {
            module: Some(module),
            method_params,
            class,
        };
        let ty = resolve_type_expr(self.types, self.symbols, &mut found, te, ctx);
        self.diagnostics.extend(module, found);
        ty
    }

    fn resolve_headers(&mut self, unit: Unit<'_>) {
        let classes: Vec<DeclaredClass> = self
            .decls
            .classes
            .iter()
            .filter(|c| c.module == unit.module)
            .cloned()
            .collect();
        for class in classes {
            let Some(decl) = type_decl(unit.ast, class.node) else { continue };
            self.resolve_type_param_bounds(unit.module, class.ty, &decl.type_params, &[]);
            self.resolve_supertypes(unit.module, class.ty, decl);
        }
    }

    fn resolve_type_param_bounds(
        &mut self,
        module: ModuleId,
        class: TypeId,
        params: &[TypeParam],
        method_vars: &[TypeId],
    ) {
        let vars = if method_vars.is_empty() {
            self.types.class(class).map(|c| c.type_params.clone()).unwrap_or_default()
        } else {
            method_vars.to_vec()
        };
        for (param, var) in params.iter().zip(vars) {
            if let Some(bound) = &param.bound {
                let ty = self.resolve(module, bound, Some(class), method_vars);
                if self.types.is_reference(ty) {
                    self.types.set_type_var_bound(var, ty);
                }
            }
        }
    }

    fn resolve_supertypes(&mut self, module: ModuleId, ty: TypeId, decl: &TypeDecl) {
        let object = self.types.object();
        let enum_base = self.types.well_known("Enum");
        let mut superclass = match decl.kind {
            TypeDeclKind::Class => Some(object),
            TypeDeclKind::Enum => Some(enum_base),
            TypeDeclKind::Interface => None,
        };
        let mut super_refs = Vec::new();
        let mut interfaces = Vec::new();

        for te in &decl.extends {
            let sup = self.resolve(module, te, Some(ty), &[]);
            if self.types.is_error(sup) {
                continue;
            }
            let is_interface = self.types.is_interface(sup);
            match decl.kind {
                TypeDeclKind::Interface if !is_interface => {
                    self.error(
                        module,
                        "E0202",
                        format!("interface {} cannot extend class {}", decl.name, te.name),
                        te.range,
                    );
                }
                TypeDeclKind::Interface => {
                    interfaces.push(self.types.erase(sup));
                    super_refs.push(sup);
                }
                _ if is_interface => {
                    self.error(
                        module,
                        "E0202",
                        format!(
                            "class {} cannot extend interface {}; use implements",
                            decl.name, te.name
                        ),
                        te.range,
                    );
                }
                _ => {
                    let info = self.types.class(sup);
                    let is_final = info.is_some_and(|c| c.is_final);
                    let is_enum = info.is_some_and(|c| c.kind == ClassKind::Enum);
                    if is_final || is_enum || sup == enum_base {
                        self.error(
                            module,
                            "E0203",
                            format!("class {} cannot extend final class {}", decl.name, te.name),
                            te.range,
                        );
                    } else {
                        superclass = Some(self.types.erase(sup));
                        super_refs.insert(0, sup);
                    }
                }
            }
        }
        for te in &decl.implements {
            let sup = self.resolve(module, te, Some(ty), &[]);
            if self.types.is_error(sup) {
                continue;
            }
            if !self.types.is_interface(sup) {
                self.error(
                    module,
                    "E0204",
                    format!("{} is not an interface", te.name),
                    te.range,
                );
                continue;
            }
            interfaces.push(self.types.erase(sup));
            super_refs.push(sup);
        }
        if let Some(superclass) = superclass {
            if !super_refs.iter().any(|r| self.types.erase(*r) == superclass) {
                super_refs.insert(0, superclass);
            }
        }
        if let Some(class) = self.types.class_mut(ty) {
            class.superclass = superclass;
            class.interfaces = interfaces;
            class.super_refs = super_refs;
        }
    }

    /// Report inheritance cycles and cut them so later passes terminate.
    fn break_cycles(&mut self) {
        let classes: Vec<(TypeId, ModuleId)> =
            self.decls.classes.iter().map(|c| (c.ty, c.module)).collect();
        for (ty, module) in classes {
            if !self.reaches_itself(ty) {
                continue;
            }
            let (name, range) = match self.types.class(ty) {
                Some(c) => (c.name.clone(), c.name_range),
                None => continue,
            };
            self.error(
                module,
                "E0206",
                format!("cyclic inheritance involving {name}"),
                range,
            );
            let object = self.types.object();
            let is_interface = self.types.is_interface(ty);
            if let Some(class) = self.types.class_mut(ty) {
                class.superclass = (!is_interface).then_some(object);
                class.interfaces.clear();
                class.super_refs = class.superclass.into_iter().collect();
            }
        }
    }

    fn reaches_itself(&self, start: TypeId) -> bool {
        let mut stack: Vec<TypeId> = self.direct_supertypes(start);
        let mut seen = Vec::new();
        while let Some(ty) = stack.pop() {
            if ty == start {
                return true;
            }
            if seen.contains(&ty) {
                continue;
            }
            seen.push(ty);
            stack.extend(self.direct_supertypes(ty));
        }
        false
    }

    fn direct_supertypes(&self, ty: TypeId) -> Vec<TypeId> {
        self.types
            .class(ty)
            .map(|c| c.superclass.into_iter().chain(c.interfaces.iter().copied()).collect())
            .unwrap_or_default()
    }

    /// User classes ordered so that every superclass precedes its subclasses.
    fn hierarchy_order(&self) -> Vec<TypeId> {
        let mut order = Vec::new();
        for class in &self.decls.classes {
            self.visit_hierarchy(class.ty, &mut order);
        }
        order
    }

    fn visit_hierarchy(&self, ty: TypeId, order: &mut Vec<TypeId>) {
        if order.contains(&ty) || self.decls.class(ty).is_none() {
            return;
        }
        for sup in self.direct_supertypes(ty) {
            self.visit_hierarchy(sup, order);
        }
        order.push(ty);
    }

    // -----------------------------------------------------------------
    // Pass 3: members
    // -----------------------------------------------------------------

    fn declare_members(&mut self, units: &[Unit<'_>], ty: TypeId) {
        let Some(class) = self.decls.class(ty).cloned() else { return };
        let Some(unit) = Self::unit(units, class.module) else { return };
        let Some(decl) = type_decl(unit.ast, class.node) else { return };
        let module = unit.module;

        let inherited = self
            .types
            .class(ty)
            .and_then(|c| c.superclass)
            .and_then(|s| self.types.class(s))
            .map_or(0, |s| s.instance_size);
        let mut instance_size = inherited;
        let mut static_size = 0;
        let mut needs_static_init = false;
        let mut needs_instance_init = false;

        // Enum constants come first among the statics.
        for constant in &decl.enum_constants {
            let NodeKind::EnumConstant { name, .. } = unit.ast.kind(*constant) else { continue };
            let range = name_range(unit.ast.range(*constant), name);
            if self.duplicate_field(ty, name) {
                self.error(module, "E0207", format!("duplicate field {name}"), range);
                continue;
            }
            let field = self.types.add_field(FieldInfo {
                name: name.clone(),
                owner: ty,
                ty,
                is_static: true,
                is_final: true,
                slot: static_size,
                module: Some(module),
                range,
                decl: Some(*constant),
            });
            static_size += 1;
            needs_static_init = true;
            if let Some(info) = self.types.class_mut(ty) {
                info.enum_constants.push(field);
            }
        }

        let is_interface = decl.kind == TypeDeclKind::Interface;
        let mut has_constructor = false;
        for member in &decl.members {
            match unit.ast.kind(*member) {
                NodeKind::Field {
                    modifiers,
                    ty: te,
                    name,
                    name_range,
                    init,
                } => {
                    let field_ty = self.resolve(module, te, Some(ty), &[]);
                    if self.duplicate_field(ty, name) {
                        self.error(module, "E0207", format!("duplicate field {name}"), *name_range);
                        continue;
                    }
                    // Interface fields are implicitly static.
                    let is_static = modifiers.is_static || is_interface;
                    let slot = if is_static {
                        static_size += 1;
                        needs_static_init |= init.is_some();
                        static_size - 1
                    } else {
                        instance_size += 1;
                        needs_instance_init |= init.is_some();
                        instance_size - 1
                    };
                    self.types.add_field(FieldInfo {
                        name: name.clone(),
                        owner: ty,
                        ty: field_ty,
                        is_static,
                        is_final: modifiers.is_final || is_interface,
                        slot,
                        module: Some(module),
                        range: *name_range,
                        decl: Some(*member),
                    });
                }
                NodeKind::Method(method) => {
                    has_constructor |= method.is_constructor();
                    self.declare_method(module, ty, *member, method, is_interface);
                }
                NodeKind::Initializer { is_static, .. } => {
                    if *is_static {
                        needs_static_init = true;
                    } else {
                        needs_instance_init = true;
                    }
                }
                _ => {}
            }
        }

        if !has_constructor && !is_interface {
            self.declare_default_constructor(module, ty);
        }
        if decl.kind == TypeDeclKind::Enum {
            self.declare_enum_values(module, ty);
        }

        let static_init = needs_static_init.then(|| self.programs.reserve());
        let instance_init = needs_instance_init.then(|| self.programs.reserve());
        if let Some(info) = self.types.class_mut(ty) {
            info.instance_size = instance_size;
            info.static_size = static_size;
            info.static_init = static_init;
            info.instance_init = instance_init;
        }
    }

    fn duplicate_field(&self, ty: TypeId, name: &str) -> bool {
        self.types
            .class(ty)
            .is_some_and(|c| c.fields.iter().any(|f| self.types.field(*f).name == name))
    }

    fn declare_method(
        &mut self,
        module: ModuleId,
        class: TypeId,
        node: NodeId,
        method: &MethodDecl,
        is_interface: bool,
    ) {
        let object = self.types.object();
        let vars: Vec<TypeId> = method
            .type_params
            .iter()
            .map(|p| self.types.type_var(p.name.clone(), object))
            .collect();
        self.resolve_type_param_bounds(module, class, &method.type_params, &vars);

        let params: Vec<TypeId> = method
            .params
            .iter()
            .map(|p| self.resolve(module, &p.ty, Some(class), &vars))
            .collect();
        let ret = match &method.return_type {
            Some(te) => self.resolve(module, te, Some(class), &vars),
            None => self.types.void(),
        };

        let modifiers: &Modifiers = &method.modifiers;
        let is_static = modifiers.is_static;
        let has_body = method.body.is_some();
        let is_abstract = modifiers.is_abstract || (is_interface && !has_body && !is_static);
        if is_abstract && has_body {
            self.error(
                module,
                "E0208",
                format!("abstract method {} cannot have a body", method.name),
                method.name_range,
            );
        } else if !is_abstract && !has_body {
            self.error(
                module,
                "E0208",
                format!("missing body for method {}", method.name),
                method.name_range,
            );
        }
        if is_abstract && !is_interface && !self.types.class(class).is_some_and(|c| c.is_abstract) {
            let name = self.types.name(class);
            self.error(
                module,
                "E0210",
                format!("{name} declares abstract method {} but is not abstract", method.name),
                method.name_range,
            );
        }

        let info = MethodInfo {
            name: method.name.clone(),
            owner: class,
            params,
            param_names: method.params.iter().map(|p| p.name.clone()).collect(),
            ret,
            is_static,
            is_constructor: method.is_constructor(),
            is_public: modifiers.is_public || is_interface,
            type_params: vars,
            body: if is_abstract {
                MethodBody::Abstract
            } else {
                MethodBody::Pending
            },
            annotations: modifiers.annotations.iter().map(|a| a.name.clone()).collect(),
            module: Some(module),
            range: method.name_range,
            decl: Some(node),
            stringify_args: false,
        };

        let duplicate = self.types.class(class).and_then(|c| {
            c.methods.iter().copied().find(|m| {
                let other = self.types.method(*m);
                other.name == info.name
                    && other.is_constructor == info.is_constructor
                    && other.params.len() == info.params.len()
                    && other
                        .params
                        .iter()
                        .zip(&info.params)
                        .all(|(a, b)| self.types.erase(*a) == self.types.erase(*b))
            })
        });
        if duplicate.is_some() {
            let sig = format!("{}({})", info.name, {
                let names: Vec<String> = info.params.iter().map(|p| self.types.name(*p)).collect();
                names.join(", ")
            });
            self.error(module, "E0209", format!("duplicate method {sig}"), method.name_range);
            return;
        }

        let needs_program = !is_abstract && has_body;
        let id = self.types.add_method(info);
        if needs_program {
            let program = self.programs.reserve();
            self.types.method_mut(id).body = MethodBody::Program(program);
            self.decls.methods.push(DeclaredMethod {
                id,
                class,
                module,
                node: Some(node),
                program,
            });
        }
    }

    fn declare_default_constructor(&mut self, module: ModuleId, class: TypeId) {
        let void = self.types.void();
        let range = self.types.class(class).map_or(Range::EMPTY, |c| c.name_range);
        let id = self.types.add_method(MethodInfo {
            name: crate::builtins::CONSTRUCTOR.into(),
            owner: class,
            params: Vec::new(),
            param_names: Vec::new(),
            ret: void,
            is_static: false,
            is_constructor: true,
            is_public: true,
            type_params: Vec::new(),
            body: MethodBody::Pending,
            annotations: Vec::new(),
            module: Some(module),
            range,
            decl: None,
            stringify_args: false,
        });
        let program = self.programs.reserve();
        self.types.method_mut(id).body = MethodBody::Program(program);
        self.decls.methods.push(DeclaredMethod {
            id,
            class,
            module,
            node: None,
            program,
        });
    }

    fn declare_enum_values(&mut self, module: ModuleId, class: TypeId) {
        let ret = self.types.array_of(class);
        self.types.add_method(MethodInfo {
            name: "values".into(),
            owner: class,
            params: Vec::new(),
            param_names: Vec::new(),
            ret,
            is_static: true,
            is_constructor: false,
            is_public: true,
            type_params: Vec::new(),
            body: MethodBody::Native(NativeMethod::EnumValues),
            annotations: Vec::new(),
            module: Some(module),
            range: Range::EMPTY,
            decl: None,
            stringify_args: false,
        });
    }

    // -----------------------------------------------------------------
    // Pass 4: abstract methods
    // -----------------------------------------------------------------

    fn check_abstract_methods(&mut self) {
        let classes: Vec<DeclaredClass> = self.decls.classes.clone();
        for class in classes {
            let Some(info) = self.types.class(class.ty) else { continue };
            if info.is_abstract || info.is_interface() {
                continue;
            }
            let name = info.name.clone();
            let range = info.name_range;
            let missing = self.types.unimplemented_methods(class.ty);
            for method in missing {
                let sig = self.types.signature(method);
                let owner = self.types.name(self.types.method(method).owner);
                self.error(
                    class.module,
                    "E0210",
                    format!("{name} must implement abstract method {sig} of {owner}"),
                    range,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::register_builtins;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn resolve(source: &str) -> (TypeStore, Declarations, DiagnosticSink) {
        let ast = parse(&lex(source).tokens).ast;
        let mut types = TypeStore::new();
        register_builtins(&mut types);
        let mut symbols = SymbolTable::new();
        let mut programs = ProgramStore::new();
        let mut diagnostics = DiagnosticSink::new();
        let units = [Unit {
            module: ModuleId(0),
            ast: &ast,
        }];
        let decls = declare(&units, &mut types, &mut symbols, &mut programs, &mut diagnostics);
        (types, decls, diagnostics)
    }

    fn messages(diagnostics: &DiagnosticSink) -> Vec<String> {
        diagnostics
            .module(ModuleId(0))
            .iter()
            .map(|d| d.message.clone())
            .collect()
    }

    #[test]
    fn fields_get_slots_after_inherited_ones() {
        let (types, _, diagnostics) = resolve(
            "class A { int a; static int s; }\nclass B extends A { int b; int c; static int t; }",
        );
        assert!(!diagnostics.has_errors(), "{:?}", messages(&diagnostics));
        let b = types.lookup("B").unwrap();
        assert_eq!(types.class(b).unwrap().instance_size, 3);
        let c = types.find_field(b, "c").unwrap();
        assert_eq!(types.field(c).slot, 2);
        let t = types.find_field(b, "t").unwrap();
        assert_eq!(types.field(t).slot, 0);
    }

    #[test]
    fn cyclic_inheritance_is_reported() {
        let (_, _, diagnostics) = resolve("class A extends B {}\nclass B extends A {}");
        let messages = messages(&diagnostics);
        assert!(
            messages.iter().any(|m| m.contains("cyclic inheritance")),
            "{messages:?}"
        );
    }

    #[test]
    fn class_cannot_extend_interface() {
        let (_, _, diagnostics) = resolve("interface I {}\nclass A extends I {}");
        assert!(messages(&diagnostics)[0].contains("cannot extend interface"));
    }

    #[test]
    fn missing_abstract_implementation() {
        let (_, _, diagnostics) = resolve(
            "interface Shape { double area(); }\nclass Square implements Shape { }",
        );
        let messages = messages(&diagnostics);
        assert!(
            messages.iter().any(|m| m.contains("must implement abstract method area()")),
            "{messages:?}"
        );
    }

    #[test]
    fn unknown_types_and_duplicates() {
        let (_, _, diagnostics) = resolve(
            "class A { Foo f; void m() {} void m() {} }\nclass A {}",
        );
        let messages = messages(&diagnostics);
        assert!(messages.iter().any(|m| m == "cannot find type Foo"));
        assert!(messages.iter().any(|m| m == "duplicate method m()"));
        assert!(messages.iter().any(|m| m == "duplicate class A"));
    }

    #[test]
    fn enums_get_constants_and_values() {
        let (types, decls, diagnostics) = resolve("enum Color { RED, GREEN }");
        assert!(!diagnostics.has_errors());
        let color = types.lookup("Color").unwrap();
        let info = types.class(color).unwrap();
        assert_eq!(info.enum_constants.len(), 2);
        assert!(info.static_init.is_some());
        assert!(!types.find_methods(color, "values").is_empty());
        assert!(!types.find_methods(color, "ordinal").is_empty());
        // Default constructor is synthesized.
        assert_eq!(decls.methods.len(), 1);
    }

    #[test]
    fn generic_classes_resolve_type_variables() {
        let (types, _, diagnostics) = resolve("class Box<T> { T value; T get() { return value; } }");
        assert!(!diagnostics.has_errors(), "{:?}", messages(&diagnostics));
        let boxed = types.lookup("Box").unwrap();
        let field = types.find_field(boxed, "value").unwrap();
        assert_eq!(types.name(types.field(field).ty), "T");
    }
}
