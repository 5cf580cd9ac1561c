//! Expression lowering.
//!
//! Every expression leaves exactly one value on the stack, except calls to
//! `void` methods which leave nothing and report `void` as their type.

use std::rc::Rc;

use crate::ast::{BinaryOp, LambdaParam, Literal, NodeId, NodeKind, TypeExpr, UnaryOp};
use crate::runtime::program::{CastTarget, Exit, NumKind, Op, ProgramKind};
use crate::runtime::value::Value;
use crate::span::Range;
use crate::symbols::{ScopeKind, SymbolKind, UsageTarget};
use crate::types::{FieldId, Prim, TypeId, TypeKind};

use super::{Capture, FnCtx, Generator, NameRef, Place, needs_convert, promote, promote_unary};

impl Generator<'_> {
    /// Compile `node`, returning its static type (possibly `void`).
    pub(crate) fn expr(&mut self, node: NodeId, expected: Option<TypeId>) -> TypeId {
        let ast = self.ast;
        let range = ast.range(node);
        match ast.kind(node) {
            NodeKind::Literal(lit) => self.literal(lit, range),
            NodeKind::Name(name) => self.name_value(name, range),
            NodeKind::This => self.load_this(range),
            NodeKind::Super => {
                self.load_this(range);
                self.cur
                    .class
                    .and_then(|c| self.types.class(c))
                    .and_then(|c| c.superclass)
                    .unwrap_or_else(|| self.types.object())
            }
            NodeKind::FieldAccess {
                target,
                name,
                name_range,
            } => self.field_access(*target, name, *name_range, range),
            NodeKind::ArrayAccess { array, index } => {
                let array_ty = self.value(*array, None);
                let elem = self.element_type(array_ty, range);
                let int = self.types.prim(Prim::Int);
                self.value_as(*index, int);
                self.emit(Op::ArrayGet, range);
                elem
            }
            NodeKind::Call {
                target,
                name,
                name_range,
                args,
            } => self.call(*target, name, *name_range, args, range),
            NodeKind::New { ty, args, body } => {
                self.new_object(ty, args, body.is_some(), expected, range)
            }
            NodeKind::NewArray {
                elem,
                dims,
                extra_dims,
                init,
            } => self.new_array(elem, dims, *extra_dims, *init, range),
            NodeKind::ArrayInit(items) => {
                match expected.filter(|t| self.types.array_elem(*t).is_some()) {
                    Some(ty) => {
                        self.array_init(items, ty, range);
                        ty
                    }
                    None => {
                        self.error("E0303", "array initializer needs an explicit array type", range);
                        self.emit(Op::Const(Value::Null), range);
                        self.types.error()
                    }
                }
            }
            NodeKind::Assign { op, target, value } => self.assign(*op, *target, *value, true, range),
            NodeKind::Unary { op, operand } => self.unary(*op, *operand, true, range),
            NodeKind::Binary { op, left, right } => self.binary(*op, *left, *right, range),
            NodeKind::Conditional {
                cond,
                then,
                otherwise,
            } => self.conditional(*cond, *then, *otherwise, expected, range),
            NodeKind::InstanceOf { expr, ty } => {
                self.value(*expr, None);
                let target = self.resolve_type(ty);
                let target = self.cast_target(target);
                self.emit(Op::InstanceOf(target), range);
                self.types.prim(Prim::Boolean)
            }
            NodeKind::Cast { ty, expr } => {
                let to = self.resolve_type(ty);
                let from = self.value(*expr, Some(to));
                self.cast_value(from, to, range);
                to
            }
            NodeKind::Lambda { params, body } => self.lambda(params, *body, expected, range),
            NodeKind::Error => {
                self.emit(Op::Const(Value::Null), range);
                self.types.error()
            }
            _ => {
                self.error("E0303", "not an expression", range);
                self.emit(Op::Const(Value::Null), range);
                self.types.error()
            }
        }
    }

    /// Compile an expression that must produce a value.
    pub(crate) fn value(&mut self, node: NodeId, expected: Option<TypeId>) -> TypeId {
        let ty = self.expr(node, expected);
        if self.types.is_void(ty) {
            let range = self.ast.range(node);
            self.error("E0303", "'void' type not allowed here", range);
            self.emit(Op::Const(Value::Null), range);
            return self.types.error();
        }
        ty
    }

    /// Compile `node` and convert it to `target` by assignment conversion.
    pub(crate) fn value_as(&mut self, node: NodeId, target: TypeId) {
        let ty = self.value(node, Some(target));
        let constant = self.constant_int(node);
        let range = self.ast.range(node);
        self.coerce(ty, target, range, constant);
    }

    pub(crate) fn condition(&mut self, node: NodeId) {
        let boolean = self.types.prim(Prim::Boolean);
        self.value_as(node, boolean);
    }

    /// Compile an expression statement, discarding any value.
    pub(crate) fn effect(&mut self, node: NodeId) {
        let ast = self.ast;
        let range = ast.range(node);
        match ast.kind(node) {
            NodeKind::Assign { op, target, value } => {
                self.assign(*op, *target, *value, false, range);
            }
            NodeKind::Unary {
                op: op @ (UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec),
                operand,
            } => {
                self.incdec(*op, *operand, false, range);
            }
            _ => {
                let ty = self.expr(node, None);
                if !self.types.is_void(ty) {
                    self.emit(Op::Pop, range);
                }
            }
        }
    }

    /// Integer value of a constant expression, for narrowing assignments.
    pub(crate) fn constant_int(&self, node: NodeId) -> Option<i64> {
        match self.ast.kind(node) {
            NodeKind::Literal(Literal::Int(v)) => Some(*v),
            NodeKind::Literal(Literal::Char(c)) => Some(*c as i64),
            NodeKind::Unary {
                op: UnaryOp::Neg,
                operand,
            } => self.constant_int(*operand).map(|v| -v),
            _ => None,
        }
    }

    fn literal(&mut self, lit: &Literal, range: Range) -> TypeId {
        let (value, ty) = match lit {
            Literal::Int(v) => (Value::Int(*v as i32), self.types.prim(Prim::Int)),
            Literal::Long(v) => (Value::Long(*v), self.types.prim(Prim::Long)),
            Literal::Float(v) => (Value::Double(*v as f32 as f64), self.types.prim(Prim::Float)),
            Literal::Double(v) => (Value::Double(*v), self.types.prim(Prim::Double)),
            Literal::Char(c) => (Value::Char(*c), self.types.prim(Prim::Char)),
            Literal::Str(s) => (Value::str(s.as_str()), self.types.string()),
            Literal::Bool(b) => (Value::Bool(*b), self.types.prim(Prim::Boolean)),
            Literal::Null => (Value::Null, self.types.null()),
        };
        self.emit(Op::Const(value), range);
        ty
    }

    // -----------------------------------------------------------------
    // Names and fields
    // -----------------------------------------------------------------

    fn name_value(&mut self, name: &str, range: Range) -> TypeId {
        match self.lookup_name(name) {
            NameRef::Local(symbol) => {
                self.record(range, UsageTarget::Symbol(symbol), true);
                self.load_local(symbol, range)
            }
            NameRef::Field(field) => self.implicit_field(field, range),
            NameRef::Type(_) => {
                self.error("E0302", format!("expected a value but found type {name}"), range);
                self.emit(Op::Const(Value::Null), range);
                self.types.error()
            }
            NameRef::Missing => {
                self.error("E0302", format!("cannot find symbol: {name}"), range);
                self.emit(Op::Const(Value::Null), range);
                self.types.error()
            }
        }
    }

    fn record_field(&mut self, field: FieldId, range: Range) {
        let owner = self.types.field(field).owner;
        let user = self.is_user_class(owner);
        self.record(range, UsageTarget::Field(field), user);
    }

    /// A field named without a qualifier: static, or an instance field of `this`.
    fn implicit_field(&mut self, field: FieldId, range: Range) -> TypeId {
        self.record_field(field, range);
        let info = self.types.field(field).clone();
        if info.is_static {
            self.touch_class(info.owner);
            self.emit(Op::GetStatic(info.owner, info.slot), range);
            return info.ty;
        }
        let this = self.load_this(range);
        self.emit(Op::GetField(info.slot), range);
        self.types.member_type(info.ty, info.owner, this)
    }

    /// The class a qualifier names, if it names one. Emits nothing.
    pub(crate) fn type_qualifier(&mut self, node: NodeId) -> Option<TypeId> {
        let ast = self.ast;
        let range = ast.range(node);
        let ty = match ast.kind(node) {
            NodeKind::Name(name) => match self.lookup_name(name) {
                NameRef::Type(ty) => ty,
                _ => return None,
            },
            NodeKind::FieldAccess { target, name, .. } => {
                let outer = self.type_qualifier(*target)?;
                let inner = self.types.lookup(name)?;
                if self.types.class(inner)?.outer != Some(outer) {
                    return None;
                }
                inner
            }
            _ => return None,
        };
        let user = self.is_user_class(ty);
        let name_range = crate::resolver::name_range(range, &self.types.name(ty));
        self.record(name_range, UsageTarget::Type(ty), user);
        Some(ty)
    }

    fn field_access(&mut self, target: NodeId, name: &str, name_range: Range, range: Range) -> TypeId {
        if let Some(class) = self.type_qualifier(target) {
            return match self.types.find_field(class, name) {
                Some(field) if self.types.field(field).is_static => {
                    self.record_field(field, name_range);
                    let info = self.types.field(field).clone();
                    self.touch_class(info.owner);
                    self.emit(Op::GetStatic(info.owner, info.slot), range);
                    info.ty
                }
                Some(_) => {
                    self.error(
                        "E0306",
                        format!("non-static field {name} cannot be referenced from a static context"),
                        name_range,
                    );
                    self.emit(Op::Const(Value::Null), range);
                    self.types.error()
                }
                None => {
                    let class_name = self.types.name(class);
                    self.error("E0302", format!("cannot find symbol: {class_name}.{name}"), name_range);
                    self.emit(Op::Const(Value::Null), range);
                    self.types.error()
                }
            };
        }

        let target_ty = self.value(target, None);
        if self.types.is_error(target_ty) {
            return target_ty;
        }
        if self.types.array_elem(target_ty).is_some() && name == "length" {
            self.emit(Op::ArrayLength, range);
            return self.types.prim(Prim::Int);
        }
        match self.types.find_field(target_ty, name) {
            Some(field) => {
                self.record_field(field, name_range);
                let info = self.types.field(field).clone();
                if info.is_static {
                    self.emit(Op::Pop, range);
                    self.touch_class(info.owner);
                    self.emit(Op::GetStatic(info.owner, info.slot), range);
                    info.ty
                } else {
                    self.emit(Op::GetField(info.slot), range);
                    self.types.member_type(info.ty, info.owner, target_ty)
                }
            }
            None => {
                let ty_name = self.types.name(target_ty);
                self.error("E0302", format!("cannot find symbol: {name} in {ty_name}"), name_range);
                self.emit(Op::Pop, range);
                self.emit(Op::Const(Value::Null), range);
                self.types.error()
            }
        }
    }

    fn element_type(&mut self, array_ty: TypeId, range: Range) -> TypeId {
        match self.types.array_elem(array_ty) {
            Some(elem) => elem,
            None => {
                if !self.types.is_error(array_ty) {
                    let name = self.types.name(array_ty);
                    self.error("E0303", format!("array required, but {name} found"), range);
                }
                self.types.error()
            }
        }
    }

    // -----------------------------------------------------------------
    // Arrays
    // -----------------------------------------------------------------

    fn new_array(
        &mut self,
        elem: &TypeExpr,
        dims: &[NodeId],
        extra: usize,
        init: Option<NodeId>,
        range: Range,
    ) -> TypeId {
        let base = self.resolve_type(elem);
        let ty = self.types.array_of_dims(base, dims.len() + extra);
        if let Some(init) = init {
            match self.ast.kind(init) {
                NodeKind::ArrayInit(items) => self.array_init(items, ty, range),
                _ => {
                    self.value_as(init, ty);
                }
            }
            return ty;
        }
        let int = self.types.prim(Prim::Int);
        for dim in dims {
            self.value_as(*dim, int);
        }
        let default = if extra == 0 {
            Value::default_for(self.types.as_prim(base))
        } else {
            Value::Null
        };
        let elem_name: Rc<str> = self.types.name(base).into();
        self.emit(
            Op::NewArray {
                dims: dims.len(),
                extra,
                elem_name,
                default,
            },
            range,
        );
        ty
    }

    fn array_init(&mut self, items: &[NodeId], ty: TypeId, range: Range) {
        let elem = self.element_type(ty, range);
        let ast = self.ast;
        for item in items {
            match ast.kind(*item) {
                NodeKind::ArrayInit(inner) if self.types.array_elem(elem).is_some() => {
                    self.array_init(inner, elem, ast.range(*item));
                }
                _ => self.value_as(*item, elem),
            }
        }
        let elem_name: Rc<str> = self.types.name(elem).into();
        self.emit(
            Op::ArrayLiteral {
                len: items.len(),
                elem_name,
            },
            range,
        );
    }

    // -----------------------------------------------------------------
    // Assignment
    // -----------------------------------------------------------------

    /// Compile an assignment target, leaving its address parts on the stack.
    fn place(&mut self, node: NodeId) -> Option<Place> {
        let ast = self.ast;
        let range = ast.range(node);
        match ast.kind(node) {
            NodeKind::Name(name) => match self.lookup_name(name) {
                NameRef::Local(symbol) => {
                    let info = self.symbols.symbol(symbol).clone();
                    if info.frame_scope != self.cur.frame_scope {
                        self.error(
                            "E0310",
                            format!("local variable {name} is captured by a lambda and cannot be assigned"),
                            range,
                        );
                        return None;
                    }
                    self.record(range, UsageTarget::Symbol(symbol), true);
                    Some(Place::Local(info.slot, info.ty))
                }
                NameRef::Field(field) => {
                    self.record_field(field, range);
                    let info = self.types.field(field).clone();
                    if info.is_static {
                        self.touch_class(info.owner);
                        return Some(Place::Static(info.owner, info.slot, info.ty));
                    }
                    let this = self.load_this(range);
                    let ty = self.types.member_type(info.ty, info.owner, this);
                    Some(Place::Field(info.slot, ty))
                }
                _ => {
                    self.error("E0302", format!("cannot find symbol: {name}"), range);
                    None
                }
            },
            NodeKind::FieldAccess {
                target,
                name,
                name_range,
            } => {
                if let Some(class) = self.type_qualifier(*target) {
                    let field = self
                        .types
                        .find_field(class, name)
                        .filter(|f| self.types.field(*f).is_static);
                    let Some(field) = field else {
                        self.error("E0302", format!("cannot find static field {name}"), *name_range);
                        return None;
                    };
                    self.record_field(field, *name_range);
                    let info = self.types.field(field).clone();
                    self.touch_class(info.owner);
                    return Some(Place::Static(info.owner, info.slot, info.ty));
                }
                let target_ty = self.value(*target, None);
                let Some(field) = self.types.find_field(target_ty, name) else {
                    if !self.types.is_error(target_ty) {
                        self.error("E0307", format!("cannot assign to {name}"), *name_range);
                    }
                    self.emit(Op::Pop, range);
                    return None;
                };
                self.record_field(field, *name_range);
                let info = self.types.field(field).clone();
                if info.is_static {
                    self.emit(Op::Pop, range);
                    return Some(Place::Static(info.owner, info.slot, info.ty));
                }
                let ty = self.types.member_type(info.ty, info.owner, target_ty);
                Some(Place::Field(info.slot, ty))
            }
            NodeKind::ArrayAccess { array, index } => {
                let array_ty = self.value(*array, None);
                let elem = self.element_type(array_ty, range);
                let int = self.types.prim(Prim::Int);
                self.value_as(*index, int);
                Some(Place::Element(elem))
            }
            _ => {
                self.error("E0307", "invalid assignment target", range);
                None
            }
        }
    }

    /// Load the current value of `place`, keeping its address.
    fn place_load(&mut self, place: Place, range: Range) {
        match place {
            Place::Local(slot, _) => self.emit(Op::Load(slot), range),
            Place::Field(slot, _) => {
                self.emit(Op::Dup, range);
                self.emit(Op::GetField(slot), range);
            }
            Place::Static(class, slot, _) => self.emit(Op::GetStatic(class, slot), range),
            Place::Element(_) => {
                self.emit(Op::Dup2, range);
                self.emit(Op::ArrayGet, range);
            }
        }
    }

    /// Copy the value on top beneath the address of `place`.
    fn place_keep_value(&mut self, place: Place, range: Range) {
        let op = match place {
            Place::Local(..) | Place::Static(..) => Op::Dup,
            Place::Field(..) => Op::DupX1,
            Place::Element(_) => Op::DupX2,
        };
        self.emit(op, range);
    }

    fn place_store(&mut self, place: Place, range: Range) {
        let op = match place {
            Place::Local(slot, _) => Op::Store(slot),
            Place::Field(slot, _) => Op::PutField(slot),
            Place::Static(class, slot, _) => Op::PutStatic(class, slot),
            Place::Element(_) => Op::ArrayPut,
        };
        self.emit(op, range);
    }

    fn discard_place(&mut self, place: Option<Place>, range: Range) {
        match place {
            Some(Place::Field(..)) => self.emit(Op::Pop, range),
            Some(Place::Element(_)) => {
                self.emit(Op::Pop, range);
                self.emit(Op::Pop, range);
            }
            _ => {}
        }
    }

    pub(crate) fn assign(
        &mut self,
        op: Option<BinaryOp>,
        target: NodeId,
        value: NodeId,
        want: bool,
        range: Range,
    ) -> TypeId {
        let Some(place) = self.place(target) else {
            let ty = self.expr(value, None);
            if !self.types.is_void(ty) {
                self.emit(Op::Pop, range);
            }
            if want {
                self.emit(Op::Const(Value::Null), range);
            }
            return self.types.error();
        };
        let ty = place.ty();
        match op {
            None => self.value_as(value, ty),
            Some(op) => {
                self.place_load(place, range);
                let result = self.binary_rest(op, ty, value, range);
                self.cast_value(result, ty, range);
            }
        }
        if want {
            self.place_keep_value(place, range);
        }
        self.place_store(place, range);
        ty
    }

    fn incdec(&mut self, op: UnaryOp, operand: NodeId, want: bool, range: Range) -> TypeId {
        let place = self.place(operand);
        let prim = place.and_then(|p| self.types.numeric_prim(p.ty()));
        let (Some(place), Some(prim)) = (place, prim.filter(|p| p.is_numeric())) else {
            if place.is_some() {
                self.error("E0303", "bad operand type for increment or decrement", range);
            }
            self.discard_place(place, range);
            if want {
                self.emit(Op::Const(Value::Null), range);
            }
            return self.types.error();
        };
        let ty = place.ty();
        let post = matches!(op, UnaryOp::PostInc | UnaryOp::PostDec);
        let kind = promote_unary(prim);
        self.place_load(place, range);
        if want && post {
            self.place_keep_value(place, range);
        }
        self.to_prim(ty, kind, range);
        let one = match kind {
            Prim::Long => Value::Long(1),
            Prim::Float | Prim::Double => Value::Double(1.0),
            _ => Value::Int(1),
        };
        self.emit(Op::Const(one), range);
        let bin = if matches!(op, UnaryOp::PreInc | UnaryOp::PostInc) {
            BinaryOp::Add
        } else {
            BinaryOp::Sub
        };
        self.emit(Op::Binary(bin, NumKind::from_prim(kind)), range);
        if needs_convert(kind, prim) {
            self.emit(Op::Convert(prim), range);
        }
        if want && !post {
            self.place_keep_value(place, range);
        }
        self.place_store(place, range);
        ty
    }

    // -----------------------------------------------------------------
    // Operators
    // -----------------------------------------------------------------

    fn unary(&mut self, op: UnaryOp, operand: NodeId, want: bool, range: Range) -> TypeId {
        match op {
            UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => {
                self.incdec(op, operand, want, range)
            }
            UnaryOp::Not => {
                self.condition(operand);
                self.emit(Op::Not, range);
                self.types.prim(Prim::Boolean)
            }
            UnaryOp::Neg | UnaryOp::Plus | UnaryOp::BitNot => {
                let ty = self.value(operand, None);
                let prim = self.types.numeric_prim(ty).filter(|p| p.is_numeric());
                let Some(prim) = prim.filter(|p| op != UnaryOp::BitNot || p.is_integral()) else {
                    if !self.types.is_error(ty) {
                        let name = self.types.name(ty);
                        self.error("E0303", format!("bad operand type {name} for unary operator"), range);
                    }
                    return self.types.error();
                };
                let kind = promote_unary(prim);
                self.to_prim(ty, kind, range);
                match op {
                    UnaryOp::Neg => self.emit(Op::Neg(NumKind::from_prim(kind)), range),
                    UnaryOp::BitNot => self.emit(Op::BitNot(NumKind::from_prim(kind)), range),
                    _ => {}
                }
                self.types.prim(kind)
            }
        }
    }

    fn binary(&mut self, op: BinaryOp, left: NodeId, right: NodeId, range: Range) -> TypeId {
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            return self.logical(op, left, right, range);
        }
        let left_ty = self.value(left, None);
        self.binary_rest(op, left_ty, right, range)
    }

    /// `&&` and `||` evaluate the right operand only when needed.
    fn logical(&mut self, op: BinaryOp, left: NodeId, right: NodeId, range: Range) -> TypeId {
        self.condition(left);
        let rhs = self.label();
        let end = self.label();
        self.emit(Op::Dup, range);
        let (if_true, if_false) = if op == BinaryOp::And { (rhs, end) } else { (end, rhs) };
        self.cur.b.touch(range);
        self.exit(Exit::Branch { if_true, if_false });
        self.bind(rhs);
        self.emit(Op::Pop, range);
        self.condition(right);
        self.bind(end);
        self.types.prim(Prim::Boolean)
    }

    fn bad_operands(&mut self, op: BinaryOp, left: TypeId, right: TypeId, range: Range) -> TypeId {
        if !self.types.is_error(left) && !self.types.is_error(right) {
            let message = format!(
                "bad operand types for binary operator '{}': {} and {}",
                op.symbol(),
                self.types.name(left),
                self.types.name(right)
            );
            self.error("E0303", message, range);
        }
        self.emit(Op::Pop, range);
        self.emit(Op::Pop, range);
        self.emit(Op::Const(Value::Null), range);
        self.types.error()
    }

    /// Apply `op` with the left operand already on the stack.
    pub(crate) fn binary_rest(&mut self, op: BinaryOp, left: TypeId, right: NodeId, range: Range) -> TypeId {
        let right_ty = self.value(right, None);
        if self.types.is_error(left) || self.types.is_error(right_ty) {
            return self.bad_operands(op, left, right_ty, range);
        }
        let left_string = self.types.is_string(left);
        let right_string = self.types.is_string(right_ty);
        if op == BinaryOp::Add && (left_string || right_string) {
            if !left_string {
                self.emit(Op::Swap, range);
                self.stringify(left, range);
                self.emit(Op::Swap, range);
            }
            if !right_string {
                self.stringify(right_ty, range);
            }
            self.emit(Op::Concat, range);
            return self.types.string();
        }

        let lp = self.types.numeric_prim(left);
        let rp = self.types.numeric_prim(right_ty);
        let boolean = self.types.prim(Prim::Boolean);
        match op {
            BinaryOp::Eq | BinaryOp::Ne => {
                let either_prim =
                    self.types.as_prim(left).is_some() || self.types.as_prim(right_ty).is_some();
                match (lp, rp) {
                    (Some(Prim::Boolean), Some(Prim::Boolean)) if either_prim => {
                        self.to_prim(right_ty, Prim::Boolean, range);
                        self.unbox_below(left, Prim::Boolean, range);
                        self.emit(Op::Binary(op, NumKind::Bool), range);
                    }
                    (Some(a), Some(b)) if either_prim && a.is_numeric() && b.is_numeric() => {
                        let kind = promote(a, b);
                        self.convert_operands(left, right_ty, kind, range);
                        self.emit(Op::Binary(op, NumKind::from_prim(kind)), range);
                    }
                    _ if self.types.is_reference(left) && self.types.is_reference(right_ty) => {
                        self.emit(Op::Binary(op, NumKind::Ref), range);
                    }
                    _ => return self.bad_operands(op, left, right_ty, range),
                }
                boolean
            }
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
                match (lp, rp) {
                    (Some(a), Some(b)) if a.is_numeric() && b.is_numeric() => {
                        let kind = promote(a, b);
                        self.convert_operands(left, right_ty, kind, range);
                        self.emit(Op::Binary(op, NumKind::from_prim(kind)), range);
                    }
                    _ => return self.bad_operands(op, left, right_ty, range),
                }
                boolean
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                match (lp, rp) {
                    (Some(a), Some(b)) if a.is_numeric() && b.is_numeric() => {
                        let kind = promote(a, b);
                        self.convert_operands(left, right_ty, kind, range);
                        self.emit(Op::Binary(op, NumKind::from_prim(kind)), range);
                        self.types.prim(kind)
                    }
                    _ => self.bad_operands(op, left, right_ty, range),
                }
            }
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => match (lp, rp) {
                (Some(Prim::Boolean), Some(Prim::Boolean)) => {
                    self.to_prim(right_ty, Prim::Boolean, range);
                    self.unbox_below(left, Prim::Boolean, range);
                    self.emit(Op::Binary(op, NumKind::Bool), range);
                    boolean
                }
                (Some(a), Some(b)) if a.is_integral() && b.is_integral() => {
                    let kind = promote(a, b);
                    self.convert_operands(left, right_ty, kind, range);
                    self.emit(Op::Binary(op, NumKind::from_prim(kind)), range);
                    self.types.prim(kind)
                }
                _ => self.bad_operands(op, left, right_ty, range),
            },
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr => match (lp, rp) {
                (Some(a), Some(b)) if a.is_integral() && b.is_integral() => {
                    let kind = promote_unary(a);
                    self.to_prim(right_ty, Prim::Int, range);
                    if needs_convert(a, kind) || self.types.as_prim(left).is_none() {
                        self.emit(Op::ConvertBelow { depth: 1, to: kind }, range);
                    }
                    self.emit(Op::Binary(op, NumKind::from_prim(kind)), range);
                    self.types.prim(kind)
                }
                _ => self.bad_operands(op, left, right_ty, range),
            },
            BinaryOp::And | BinaryOp::Or => self.bad_operands(op, left, right_ty, range),
        }
    }

    /// Bring both operands to `kind`: the right one on top, the left below it.
    fn convert_operands(&mut self, left: TypeId, right: TypeId, kind: Prim, range: Range) {
        self.to_prim(right, kind, range);
        let left_prim = self.types.as_prim(left);
        if left_prim.is_none_or(|p| needs_convert(p, kind)) {
            self.emit(Op::ConvertBelow { depth: 1, to: kind }, range);
        }
    }

    fn unbox_below(&mut self, left: TypeId, to: Prim, range: Range) {
        if self.types.as_prim(left).is_none() {
            self.emit(Op::ConvertBelow { depth: 1, to }, range);
        }
    }

    fn conditional(
        &mut self,
        cond: NodeId,
        then: NodeId,
        otherwise: NodeId,
        expected: Option<TypeId>,
        range: Range,
    ) -> TypeId {
        self.condition(cond);
        let then_l = self.label();
        let else_l = self.label();
        let end = self.label();
        self.cur.b.touch(range);
        self.exit(Exit::Branch {
            if_true: then_l,
            if_false: else_l,
        });
        let expected = expected.filter(|t| !self.types.is_error(*t));

        self.bind(then_l);
        let then_ty = match expected {
            Some(t) => {
                self.value_as(then, t);
                t
            }
            None => self.value(then, None),
        };
        self.exit(Exit::Goto(end));
        self.bind(else_l);
        let else_ty = match expected {
            Some(t) => {
                self.value_as(otherwise, t);
                t
            }
            None => self.value(otherwise, None),
        };
        self.bind(end);
        if let Some(t) = expected {
            return t;
        }

        let (tp, ep) = (self.types.as_prim(then_ty), self.types.as_prim(else_ty));
        match (tp, ep) {
            (Some(a), Some(b)) if a == b => then_ty,
            (Some(a), Some(b)) if a.is_numeric() && b.is_numeric() => {
                let kind = promote(a, b);
                self.emit(Op::Convert(kind), range);
                self.types.prim(kind)
            }
            _ => {
                if self.types.is_assignable(else_ty, then_ty) {
                    then_ty
                } else if self.types.is_assignable(then_ty, else_ty) {
                    else_ty
                } else {
                    self.types.object()
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Casts
    // -----------------------------------------------------------------

    pub(crate) fn cast_target(&self, ty: TypeId) -> CastTarget {
        match self.types.kind(ty) {
            TypeKind::Array(_) => CastTarget::Array,
            _ => CastTarget::Class(self.types.erase(ty)),
        }
    }

    /// Casting conversion of the value on top of the stack.
    pub(crate) fn cast_value(&mut self, from: TypeId, to: TypeId, range: Range) {
        if from == to || self.types.is_error(from) || self.types.is_error(to) {
            return;
        }
        match (self.types.as_prim(from), self.types.as_prim(to)) {
            (Some(a), Some(b)) => {
                if (a == Prim::Boolean) != (b == Prim::Boolean) {
                    self.report_incompatible(from, to, range);
                } else {
                    self.convert_prim(a, b, range);
                }
            }
            (None, Some(b)) => {
                if let Some(unboxed) = self.types.unboxed(from) {
                    self.emit(Op::Unbox(unboxed), range);
                    self.convert_prim(unboxed, b, range);
                } else if self.types.is_reference(from) {
                    let boxed = self.types.boxed(b);
                    self.emit(Op::CheckCast(CastTarget::Class(boxed)), range);
                    self.emit(Op::Unbox(b), range);
                } else {
                    self.report_incompatible(from, to, range);
                }
            }
            (Some(_), None) => {
                if !self.types.is_assignable(from, to) {
                    self.report_incompatible(from, to, range);
                }
            }
            (None, None) => {
                if self.types.is_assignable(from, to) {
                    return;
                }
                let related = self.types.is_assignable(to, from)
                    || self.types.is_interface(from)
                    || self.types.is_interface(to)
                    || matches!(self.types.kind(from), TypeKind::TypeVar { .. });
                if related {
                    let target = self.cast_target(to);
                    self.emit(Op::CheckCast(target), range);
                } else {
                    self.report_incompatible(from, to, range);
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Lambdas
    // -----------------------------------------------------------------

    fn lambda(
        &mut self,
        params: &[LambdaParam],
        body: NodeId,
        expected: Option<TypeId>,
        range: Range,
    ) -> TypeId {
        let sam = expected.and_then(|t| self.types.functional_method(t).map(|m| (t, m)));
        let Some((target, sam)) = sam else {
            self.error("E0305", "lambda expression needs a functional interface as its target type", range);
            self.emit(Op::Const(Value::Null), range);
            return self.types.error();
        };
        let info = self.types.method(sam).clone();
        if info.params.len() != params.len() {
            let message = format!(
                "lambda expects {} parameter(s) for {}",
                info.params.len(),
                self.types.signature(sam)
            );
            self.error("E0305", message, range);
        }
        let param_types: Vec<TypeId> = info
            .params
            .iter()
            .map(|p| self.types.member_type(*p, info.owner, target))
            .collect();
        let ret = self.types.member_type(info.ret, info.owner, target);

        let scope = self.symbols.add_scope(
            ScopeKind::Lambda,
            Some(self.cur.scope),
            Some(self.module),
            range,
            true,
        );
        for (i, param) in params.iter().enumerate() {
            let inferred = param_types
                .get(i)
                .copied()
                .unwrap_or_else(|| self.types.object());
            let ty = match &param.ty {
                Some(te) => self.resolve_type(te),
                None => inferred,
            };
            let symbol = self.symbols.declare(
                scope,
                param.name.clone(),
                param.name_range,
                ty,
                SymbolKind::Parameter,
            );
            self.record(param.name_range, UsageTarget::Symbol(symbol), true);
        }
        let mut ctx = FnCtx::new(scope, self.cur.class, self.cur.this_type, ret);
        ctx.is_lambda = true;
        ctx.method_type_params = self.cur.method_type_params.clone();
        self.enter(ctx);

        let ast = self.ast;
        match ast.kind(body) {
            NodeKind::Block(_) => {
                self.statement(body);
                if self.cur.b.tail_reachable() {
                    self.implicit_return(ret);
                }
            }
            _ => {
                let body_range = ast.range(body);
                self.cur.b.begin_statement(body_range);
                if self.types.is_void(ret) {
                    self.effect(body);
                    self.exit(Exit::Return { value: false });
                } else {
                    self.value_as(body, ret);
                    self.exit(Exit::Return { value: true });
                }
            }
        }

        let captures = self.cur.captures.clone();
        let returns_value = !self.types.is_void(ret);
        let name = format!("lambda@{}:{}", range.start_line, range.start_column);
        let program = self.finish(name, ProgramKind::Lambda, range, returns_value);
        let id = self.programs.add(program);

        let depth = self.outer.len();
        for (capture, _) in &captures {
            match self.slot_for(depth, *capture) {
                Some(slot) => self.emit(Op::Load(slot), range),
                None => {
                    if *capture == Capture::This {
                        self.error("E0306", "cannot use this in a static context", range);
                    }
                    self.emit(Op::Const(Value::Null), range);
                }
            }
        }
        if let Some(program) = self.programs.get(id).cloned() {
            let interface = self.types.erase(target);
            self.emit(
                Op::MakeLambda {
                    program,
                    interface,
                    captures: captures.len(),
                },
                range,
            );
        }
        target
    }
}
