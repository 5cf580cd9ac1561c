//! Method calls, overload selection and object creation.

use crate::ast::{NodeId, NodeKind, TypeExpr};
use crate::runtime::program::{CallTarget, Op};
use crate::runtime::value::Value;
use crate::span::Range;
use crate::symbols::UsageTarget;
use crate::types::{MethodId, TypeId, TypeKind};

use super::{Generator, needs_convert};

/// How the receiver of a call was written.
enum Receiver {
    Implicit,
    Super,
    Class(TypeId),
    Value(TypeId),
}

impl Generator<'_> {
    pub(crate) fn call(
        &mut self,
        target: Option<NodeId>,
        name: &str,
        name_range: Range,
        args: &[NodeId],
        range: Range,
    ) -> TypeId {
        let ast = self.ast;
        let receiver = match target {
            None => Receiver::Implicit,
            Some(t) if matches!(ast.kind(t), NodeKind::Super) => Receiver::Super,
            Some(t) => match self.type_qualifier(t) {
                Some(class) => Receiver::Class(class),
                None => Receiver::Value(self.value(t, None)),
            },
        };

        match receiver {
            Receiver::Implicit => {
                let found = self
                    .enclosing_classes()
                    .into_iter()
                    .map(|c| self.types.find_methods(c, name))
                    .find(|ms| !ms.is_empty());
                let Some(candidates) = found else {
                    return self.missing_method(name, name_range, args, false, range);
                };
                let any_instance = candidates.iter().any(|m| !self.types.method(*m).is_static);
                let pushed = any_instance && self.cur.this_type.is_some();
                let receiver_ty = pushed.then(|| self.load_this(range));
                let Some((method, arg_types)) = self.arguments(&candidates, receiver_ty, args, range) else {
                    return self.failed_call(pushed, range);
                };
                let is_static = self.types.method(method).is_static;
                if !is_static && !pushed {
                    let sig = self.types.signature(method);
                    self.error(
                        "E0306",
                        format!("non-static method {sig} cannot be referenced from a static context"),
                        name_range,
                    );
                }
                self.emit_call(method, receiver_ty, pushed && is_static, false, &arg_types, name_range, range)
            }
            Receiver::Super => {
                let this = self.load_this(range);
                let superclass = self
                    .cur
                    .class
                    .and_then(|c| self.types.class(c))
                    .and_then(|c| c.superclass)
                    .unwrap_or_else(|| self.types.object());
                let super_ref = self
                    .types
                    .class(this)
                    .and_then(|c| {
                        c.super_refs
                            .iter()
                            .copied()
                            .find(|r| self.types.erase(*r) == superclass)
                    })
                    .unwrap_or(superclass);
                let candidates = self.types.find_methods(superclass, name);
                if candidates.is_empty() {
                    self.emit(Op::Pop, range);
                    return self.missing_method(name, name_range, args, false, range);
                }
                let Some((method, arg_types)) = self.arguments(&candidates, Some(super_ref), args, range) else {
                    return self.failed_call(true, range);
                };
                let method = match self.types.resolve_override(superclass, method) {
                    Some(m) => m,
                    None => {
                        let sig = self.types.signature(method);
                        self.error("E0304", format!("abstract method {sig} cannot be accessed directly"), name_range);
                        method
                    }
                };
                let is_static = self.types.method(method).is_static;
                self.emit_call(method, Some(super_ref), is_static, true, &arg_types, name_range, range)
            }
            Receiver::Class(class) => {
                let candidates = self.types.find_methods(class, name);
                if candidates.is_empty() {
                    return self.missing_method(name, name_range, args, false, range);
                }
                let Some((method, arg_types)) = self.arguments(&candidates, None, args, range) else {
                    return self.failed_call(false, range);
                };
                if !self.types.method(method).is_static {
                    let sig = self.types.signature(method);
                    self.error(
                        "E0306",
                        format!("non-static method {sig} cannot be referenced from a static context"),
                        name_range,
                    );
                }
                self.emit_call(method, None, false, false, &arg_types, name_range, range)
            }
            Receiver::Value(ty) => {
                if self.types.is_error(ty) {
                    return self.missing_method(name, name_range, args, true, range);
                }
                if let Some(prim) = self.types.as_prim(ty) {
                    self.error(
                        "E0304",
                        format!("{} cannot be dereferenced", prim.name()),
                        name_range,
                    );
                    return self.missing_method(name, name_range, args, true, range);
                }
                let lookup = match self.types.kind(ty) {
                    TypeKind::Array(_) | TypeKind::Null => self.types.object(),
                    _ => ty,
                };
                let candidates = self.types.find_methods(lookup, name);
                if candidates.is_empty() {
                    let ty_name = self.types.name(ty);
                    self.error("E0302", format!("cannot find symbol: method {name} in {ty_name}"), name_range);
                    return self.missing_method(name, name_range, args, true, range);
                }
                let Some((method, arg_types)) = self.arguments(&candidates, Some(ty), args, range) else {
                    return self.failed_call(true, range);
                };
                let is_static = self.types.method(method).is_static;
                self.emit_call(method, Some(ty), is_static, false, &arg_types, name_range, range)
            }
        }
    }

    /// Report an unknown method, still compiling the arguments for their diagnostics.
    fn missing_method(
        &mut self,
        name: &str,
        name_range: Range,
        args: &[NodeId],
        receiver_pushed: bool,
        range: Range,
    ) -> TypeId {
        if !receiver_pushed {
            self.error("E0302", format!("cannot find symbol: method {name}"), name_range);
        }
        for arg in args {
            let ty = self.expr(*arg, None);
            if !self.types.is_void(ty) {
                self.emit(Op::Pop, range);
            }
        }
        if receiver_pushed {
            self.emit(Op::Pop, range);
        }
        self.emit(Op::Const(Value::Null), range);
        self.types.error()
    }

    fn failed_call(&mut self, receiver_pushed: bool, range: Range) -> TypeId {
        if receiver_pushed {
            self.emit(Op::Pop, range);
        }
        self.emit(Op::Const(Value::Null), range);
        self.types.error()
    }

    /// Emit the invoke for a selected method and compute the result type.
    #[allow(clippy::too_many_arguments)]
    fn emit_call(
        &mut self,
        method: MethodId,
        receiver: Option<TypeId>,
        drop_receiver: bool,
        special: bool,
        arg_types: &[TypeId],
        name_range: Range,
        range: Range,
    ) -> TypeId {
        let info = self.types.method(method).clone();
        let user = self.is_user_class(info.owner);
        self.record(name_range, UsageTarget::Method(method), user);
        let target = if info.is_static {
            self.touch_class(info.owner);
            CallTarget::Static(method)
        } else if special {
            CallTarget::Special(method)
        } else {
            CallTarget::Virtual(method)
        };
        let argc = info.params.len() + usize::from(!info.is_static);
        self.invoke(target, argc, range);

        let mut ret = info.ret;
        let mut params = info.params.clone();
        if let Some(receiver) = receiver {
            ret = self.types.member_type(ret, info.owner, receiver);
            params = params
                .iter()
                .map(|p| self.types.member_type(*p, info.owner, receiver))
                .collect();
        }
        if !info.type_params.is_empty() {
            let bindings = self.infer_type_args(&info.type_params, &params, arg_types);
            ret = self.types.substitute(ret, &info.type_params, &bindings);
        }

        if drop_receiver {
            if self.types.is_void(ret) {
                self.emit(Op::Pop, range);
            } else {
                self.emit(Op::Swap, range);
                self.emit(Op::Pop, range);
            }
        }
        ret
    }

    /// Bind a generic method's type variables from its argument types.
    fn infer_type_args(&mut self, vars: &[TypeId], params: &[TypeId], args: &[TypeId]) -> Vec<TypeId> {
        let mut bound: Vec<Option<TypeId>> = vec![None; vars.len()];
        for (param, arg) in params.iter().zip(args) {
            self.unify(*param, *arg, vars, &mut bound);
        }
        vars.iter()
            .zip(bound)
            .map(|(var, b)| b.unwrap_or_else(|| self.types.erase(*var)))
            .collect()
    }

    fn unify(&self, param: TypeId, arg: TypeId, vars: &[TypeId], bound: &mut [Option<TypeId>]) {
        if let Some(i) = vars.iter().position(|v| *v == param) {
            if bound[i].is_none() && !self.types.is_error(arg) && arg != self.types.null() {
                bound[i] = Some(match self.types.as_prim(arg) {
                    Some(prim) => self.types.boxed(prim),
                    None => arg,
                });
            }
            return;
        }
        match (self.types.kind(param), self.types.kind(arg)) {
            (TypeKind::Array(p), TypeKind::Array(a)) => self.unify(*p, *a, vars, bound),
            (TypeKind::Generic { base, args: pargs }, _) => {
                if let Some(viewed) = self.types.view_as(arg, *base) {
                    for (p, a) in pargs.iter().zip(viewed) {
                        self.unify(*p, a, vars, bound);
                    }
                }
            }
            _ => {}
        }
    }

    fn param_types(&mut self, method: MethodId, receiver: Option<TypeId>) -> Vec<TypeId> {
        let info = self.types.method(method);
        let (owner, params) = (info.owner, info.params.clone());
        match receiver {
            Some(r) => params
                .into_iter()
                .map(|p| self.types.member_type(p, owner, r))
                .collect(),
            None => params,
        }
    }

    /// Compile call arguments and pick the overload they select.
    ///
    /// With a single candidate of the right arity every argument is
    /// converted as soon as it is compiled. Otherwise all arguments are
    /// compiled first, the most specific applicable candidate is chosen,
    /// and primitive conversions are patched in below the top.
    pub(crate) fn arguments(
        &mut self,
        candidates: &[MethodId],
        receiver: Option<TypeId>,
        args: &[NodeId],
        range: Range,
    ) -> Option<(MethodId, Vec<TypeId>)> {
        let viable: Vec<MethodId> = candidates
            .iter()
            .copied()
            .filter(|m| self.types.method(*m).params.len() == args.len())
            .collect();
        let ast = self.ast;

        if viable.is_empty() {
            for arg in args {
                let ty = self.expr(*arg, None);
                if !self.types.is_void(ty) {
                    self.emit(Op::Pop, range);
                }
            }
            if let Some(first) = candidates.first() {
                let sig = self.types.signature(*first);
                self.error(
                    "E0304",
                    format!("{sig} cannot be applied to {} argument(s)", args.len()),
                    range,
                );
            }
            return None;
        }

        if let [method] = viable.as_slice() {
            let method = *method;
            let params = self.param_types(method, receiver);
            let stringify = self.types.method(method).stringify_args;
            let mut arg_types = Vec::with_capacity(args.len());
            for (arg, param) in args.iter().zip(params) {
                let arg_range = ast.range(*arg);
                if stringify {
                    let ty = self.value(*arg, None);
                    self.stringify(ty, arg_range);
                    arg_types.push(ty);
                } else {
                    let ty = self.value(*arg, Some(param));
                    let constant = self.constant_int(*arg);
                    self.coerce(ty, param, arg_range, constant);
                    arg_types.push(ty);
                }
            }
            return Some((method, arg_types));
        }

        let signatures: Vec<Vec<TypeId>> = viable
            .iter()
            .map(|m| self.param_types(*m, receiver))
            .collect();
        let mut arg_types = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let hint = self.argument_hint(*arg, i, &signatures);
            arg_types.push(self.value(*arg, hint));
        }

        let Some(index) = self.most_specific(&signatures, &arg_types) else {
            let names: Vec<String> = arg_types.iter().map(|t| self.types.name(*t)).collect();
            let method_name = self.types.method(viable[0]).name.clone();
            self.error(
                "E0304",
                format!("no suitable method found for {method_name}({})", names.join(", ")),
                range,
            );
            for _ in args {
                self.emit(Op::Pop, range);
            }
            return None;
        };
        let params = &signatures[index];
        let n = args.len();
        for (i, (arg_ty, param)) in arg_types.iter().zip(params).enumerate() {
            self.coerce_below(*arg_ty, *param, n - 1 - i, range);
        }
        Some((viable[index], arg_types))
    }

    /// Expected type for an overloaded argument: shared by every candidate,
    /// or the first functional interface offered to a lambda.
    fn argument_hint(&self, arg: NodeId, index: usize, signatures: &[Vec<TypeId>]) -> Option<TypeId> {
        let first = signatures.first()?.get(index).copied()?;
        if signatures
            .iter()
            .all(|s| s.get(index).is_some_and(|p| self.types.erase(*p) == self.types.erase(first)))
        {
            return Some(first);
        }
        if matches!(self.ast.kind(arg), NodeKind::Lambda { .. }) {
            return signatures
                .iter()
                .filter_map(|s| s.get(index).copied())
                .find(|p| self.types.functional_method(*p).is_some());
        }
        None
    }

    /// Index of the most specific applicable signature: strict invocation
    /// (no boxing) first, then loose invocation.
    fn most_specific(&self, signatures: &[Vec<TypeId>], args: &[TypeId]) -> Option<usize> {
        let strict = |params: &Vec<TypeId>| {
            params.iter().zip(args).all(|(p, a)| {
                match (self.types.as_prim(*a), self.types.as_prim(*p)) {
                    (Some(x), Some(y)) => x.widens_to(y),
                    (None, None) => self.types.is_assignable(*a, *p),
                    _ => self.types.is_error(*a),
                }
            })
        };
        let loose = |params: &Vec<TypeId>| {
            params
                .iter()
                .zip(args)
                .all(|(p, a)| self.types.is_assignable(*a, *p))
        };
        let mut applicable: Vec<usize> = (0..signatures.len())
            .filter(|i| strict(&signatures[*i]))
            .collect();
        if applicable.is_empty() {
            applicable = (0..signatures.len())
                .filter(|i| loose(&signatures[*i]))
                .collect();
        }
        let best = applicable.iter().copied().find(|i| {
            applicable.iter().all(|j| {
                i == j
                    || signatures[*i]
                        .iter()
                        .zip(&signatures[*j])
                        .all(|(x, y)| self.types.is_assignable(*x, *y))
            })
        });
        best.or_else(|| applicable.first().copied())
    }

    /// Convert an argument `depth` slots below the top of the stack.
    fn coerce_below(&mut self, from: TypeId, to: TypeId, depth: usize, range: Range) {
        if depth == 0 {
            self.coerce(from, to, range, None);
            return;
        }
        match (self.types.as_prim(from), self.types.as_prim(to)) {
            (Some(a), Some(b)) if needs_convert(a, b) => {
                self.emit(Op::ConvertBelow { depth, to: b }, range);
            }
            (None, Some(b)) if !self.types.is_error(from) => {
                self.emit(Op::ConvertBelow { depth, to: b }, range);
            }
            _ => {}
        }
    }

    // -----------------------------------------------------------------
    // Object creation
    // -----------------------------------------------------------------

    pub(crate) fn new_object(
        &mut self,
        te: &TypeExpr,
        args: &[NodeId],
        anonymous: bool,
        expected: Option<TypeId>,
        range: Range,
    ) -> TypeId {
        let mut ty = self.resolve_type(te);
        if anonymous {
            self.error("E0301", "anonymous classes are not supported", range);
            self.emit(Op::Const(Value::Null), range);
            return ty;
        }
        if self.types.is_error(ty) {
            return self.missing_method("<init>", te.range, args, true, range);
        }
        if te.args.is_empty() {
            if let Some(expected) = expected {
                ty = self.diamond(ty, expected);
            }
        }
        let class = self.types.erase(ty);
        let Some(info) = self.types.class(class) else {
            self.emit(Op::Const(Value::Null), range);
            return self.types.error();
        };
        if info.is_abstract || info.is_interface() {
            let name = info.name.clone();
            self.error("E0311", format!("{name} is abstract; cannot be instantiated"), te.range);
        }

        self.touch_class(class);
        self.emit(Op::NewObject(class), range);
        self.emit(Op::Dup, range);
        let ctors = self.types.constructors(class);
        if ctors.is_empty() {
            let name = self.types.name(class);
            self.error("E0304", format!("{name} has no accessible constructor"), te.range);
            return self.missing_method("<init>", te.range, args, true, range);
        }
        match self.arguments(&ctors, Some(ty), args, range) {
            Some((ctor, _)) => {
                let user = self.is_user_class(class);
                let name_range = crate::resolver::name_range(te.range, &te.name);
                self.record(name_range, UsageTarget::Method(ctor), user);
                self.invoke(CallTarget::Special(ctor), args.len() + 1, range);
            }
            None => self.emit(Op::Pop, range),
        }
        ty
    }

    /// Type arguments for `new C<>()` taken from the expected type.
    fn diamond(&mut self, class: TypeId, expected: TypeId) -> TypeId {
        let params = match self.types.class(class) {
            Some(info) if !info.type_params.is_empty() => info.type_params.clone(),
            _ => return class,
        };
        let expected_args = self.types.type_args(expected).to_vec();
        if expected_args.is_empty() {
            return class;
        }
        let generic_self = self.types.generic(class, params.clone());
        let Some(viewed) = self.types.view_as(generic_self, expected) else {
            return class;
        };
        let args: Vec<TypeId> = params
            .iter()
            .map(|p| {
                viewed
                    .iter()
                    .position(|v| v == p)
                    .and_then(|i| expected_args.get(i).copied())
                    .unwrap_or_else(|| self.types.erase(*p))
            })
            .collect();
        self.types.generic(class, args)
    }
}
