//! Type store for Javelin programs.
//!
//! Every type the compiler or runtime talks about lives in one
//! [`TypeStore`] arena and is referred to by [`TypeId`]. Classes carry
//! their members as [`FieldId`]/[`MethodId`] handles into the same store,
//! so the runtime can resolve fields, statics and virtual dispatch
//! without going back to the syntax tree.

use std::collections::HashMap;
use std::fmt;

use crate::ast::NodeId;
use crate::builtins::{NativeKind, NativeMethod};
use crate::runtime::program::ProgramId;
use crate::span::{ModuleId, Range};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Primitive value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prim {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
}

impl Prim {
    pub const ALL: [Prim; 8] = [
        Prim::Boolean,
        Prim::Byte,
        Prim::Short,
        Prim::Char,
        Prim::Int,
        Prim::Long,
        Prim::Float,
        Prim::Double,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Prim::Boolean => "boolean",
            Prim::Byte => "byte",
            Prim::Short => "short",
            Prim::Char => "char",
            Prim::Int => "int",
            Prim::Long => "long",
            Prim::Float => "float",
            Prim::Double => "double",
        }
    }

    pub fn from_name(name: &str) -> Option<Prim> {
        Prim::ALL.into_iter().find(|p| p.name() == name)
    }

    pub fn is_numeric(self) -> bool {
        self != Prim::Boolean
    }

    pub fn is_integral(self) -> bool {
        matches!(
            self,
            Prim::Byte | Prim::Short | Prim::Char | Prim::Int | Prim::Long
        )
    }

    /// Position in the widening order `byte < short < int < long < float < double`.
    fn rank(self) -> u8 {
        match self {
            Prim::Boolean => 0,
            Prim::Byte => 1,
            Prim::Short => 2,
            Prim::Char => 2,
            Prim::Int => 3,
            Prim::Long => 4,
            Prim::Float => 5,
            Prim::Double => 6,
        }
    }

    /// Implicit widening primitive conversion.
    pub fn widens_to(self, to: Prim) -> bool {
        if self == to {
            return true;
        }
        if !self.is_numeric() || !to.is_numeric() {
            return false;
        }
        match (self, to) {
            (_, Prim::Char) => false,
            (Prim::Char, Prim::Short) | (Prim::Char, Prim::Byte) => false,
            _ => self.rank() < to.rank(),
        }
    }

    /// Name of the wrapper class used when the value is boxed.
    pub fn wrapper(self) -> &'static str {
        match self {
            Prim::Boolean => "Boolean",
            Prim::Byte => "Byte",
            Prim::Short => "Short",
            Prim::Char => "Character",
            Prim::Int => "Integer",
            Prim::Long => "Long",
            Prim::Float => "Float",
            Prim::Double => "Double",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Interface,
    Enum,
}

/// A class, interface or enum, user-declared or provided by the library.
#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: String,
    pub kind: ClassKind,
    pub module: Option<ModuleId>,
    pub decl: Option<NodeId>,
    pub name_range: Range,
    pub superclass: Option<TypeId>,
    pub interfaces: Vec<TypeId>,
    /// Supertypes as written, possibly generic (`List<E>`).
    pub super_refs: Vec<TypeId>,
    pub type_params: Vec<TypeId>,
    pub is_abstract: bool,
    pub is_final: bool,
    pub is_builtin: bool,
    pub native: NativeKind,
    pub fields: Vec<FieldId>,
    pub methods: Vec<MethodId>,
    /// Instance field slots including inherited ones.
    pub instance_size: usize,
    pub static_size: usize,
    pub enum_constants: Vec<FieldId>,
    pub instance_init: Option<ProgramId>,
    pub static_init: Option<ProgramId>,
    /// Enclosing class for member types.
    pub outer: Option<TypeId>,
}

impl ClassInfo {
    pub fn new(name: impl Into<String>, kind: ClassKind) -> Self {
        Self {
            name: name.into(),
            kind,
            module: None,
            decl: None,
            name_range: Range::EMPTY,
            superclass: None,
            interfaces: Vec::new(),
            super_refs: Vec::new(),
            type_params: Vec::new(),
            is_abstract: kind == ClassKind::Interface,
            is_final: false,
            is_builtin: false,
            native: NativeKind::None,
            fields: Vec::new(),
            methods: Vec::new(),
            instance_size: 0,
            static_size: 0,
            enum_constants: Vec::new(),
            instance_init: None,
            static_init: None,
            outer: None,
        }
    }

    pub fn is_interface(&self) -> bool {
        self.kind == ClassKind::Interface
    }
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub owner: TypeId,
    pub ty: TypeId,
    pub is_static: bool,
    pub is_final: bool,
    pub slot: usize,
    pub module: Option<ModuleId>,
    pub range: Range,
    pub decl: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MethodBody {
    /// Declared but not compiled yet.
    Pending,
    Program(ProgramId),
    Native(NativeMethod),
    Abstract,
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub name: String,
    pub owner: TypeId,
    pub params: Vec<TypeId>,
    pub param_names: Vec<String>,
    pub ret: TypeId,
    pub is_static: bool,
    pub is_constructor: bool,
    pub is_public: bool,
    pub type_params: Vec<TypeId>,
    pub body: MethodBody,
    pub annotations: Vec<String>,
    pub module: Option<ModuleId>,
    pub range: Range,
    pub decl: Option<NodeId>,
    /// Reference arguments are converted to strings before the call.
    pub stringify_args: bool,
}

impl MethodInfo {
    pub fn is_abstract(&self) -> bool {
        self.body == MethodBody::Abstract
    }
}

#[derive(Debug, Clone)]
pub enum TypeKind {
    Void,
    Null,
    /// Stand-in after a reported error; compatible with everything.
    Error,
    Primitive(Prim),
    Class(ClassInfo),
    Array(TypeId),
    TypeVar { name: String, bound: TypeId },
    Generic { base: TypeId, args: Vec<TypeId> },
}

#[derive(Debug, Clone)]
pub struct TypeStore {
    types: Vec<TypeKind>,
    fields: Vec<FieldInfo>,
    methods: Vec<MethodInfo>,
    by_name: HashMap<String, TypeId>,
    arrays: HashMap<TypeId, TypeId>,
    generics: HashMap<(TypeId, Vec<TypeId>), TypeId>,
}

impl Default for TypeStore {
    fn default() -> Self {
        Self::new()
    }
}

const VOID: TypeId = TypeId(0);
const NULL: TypeId = TypeId(1);
const ERROR: TypeId = TypeId(2);
const FIRST_PRIM: u32 = 3;

impl TypeStore {
    pub fn new() -> Self {
        let mut store = Self {
            types: vec![TypeKind::Void, TypeKind::Null, TypeKind::Error],
            fields: Vec::new(),
            methods: Vec::new(),
            by_name: HashMap::new(),
            arrays: HashMap::new(),
            generics: HashMap::new(),
        };
        store.by_name.insert("void".into(), VOID);
        for prim in Prim::ALL {
            let id = store.push(TypeKind::Primitive(prim));
            store.by_name.insert(prim.name().into(), id);
        }
        store
    }

    fn push(&mut self, kind: TypeKind) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(kind);
        id
    }

    // -----------------------------------------------------------------
    // Well-known types
    // -----------------------------------------------------------------

    pub fn void(&self) -> TypeId {
        VOID
    }

    pub fn null(&self) -> TypeId {
        NULL
    }

    pub fn error(&self) -> TypeId {
        ERROR
    }

    pub fn prim(&self, prim: Prim) -> TypeId {
        let offset = Prim::ALL.iter().position(|p| *p == prim).unwrap_or(0);
        TypeId(FIRST_PRIM + offset as u32)
    }

    /// A library class that is always registered; falls back to the error type.
    pub fn well_known(&self, name: &str) -> TypeId {
        self.lookup(name).unwrap_or(ERROR)
    }

    pub fn object(&self) -> TypeId {
        self.well_known("Object")
    }

    pub fn string(&self) -> TypeId {
        self.well_known("String")
    }

    // -----------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------

    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    pub fn add_class(&mut self, info: ClassInfo) -> TypeId {
        let name = info.name.clone();
        let id = self.push(TypeKind::Class(info));
        self.by_name.insert(name, id);
        id
    }

    pub fn array_of(&mut self, elem: TypeId) -> TypeId {
        if let Some(id) = self.arrays.get(&elem) {
            return *id;
        }
        let id = self.push(TypeKind::Array(elem));
        self.arrays.insert(elem, id);
        id
    }

    pub fn array_of_dims(&mut self, elem: TypeId, dims: usize) -> TypeId {
        (0..dims).fold(elem, |ty, _| self.array_of(ty))
    }

    pub fn generic(&mut self, base: TypeId, args: Vec<TypeId>) -> TypeId {
        if args.is_empty() {
            return base;
        }
        let key = (base, args);
        if let Some(id) = self.generics.get(&key) {
            return *id;
        }
        let id = self.push(TypeKind::Generic {
            base,
            args: key.1.clone(),
        });
        self.generics.insert(key, id);
        id
    }

    pub fn type_var(&mut self, name: impl Into<String>, bound: TypeId) -> TypeId {
        self.push(TypeKind::TypeVar {
            name: name.into(),
            bound,
        })
    }

    pub fn set_type_var_bound(&mut self, var: TypeId, new_bound: TypeId) {
        if let Some(TypeKind::TypeVar { bound, .. }) = self.types.get_mut(var.index()) {
            *bound = new_bound;
        }
    }

    pub fn add_field(&mut self, info: FieldInfo) -> FieldId {
        let id = FieldId(self.fields.len() as u32);
        let owner = info.owner;
        self.fields.push(info);
        if let Some(class) = self.class_mut(owner) {
            class.fields.push(id);
        }
        id
    }

    pub fn add_method(&mut self, info: MethodInfo) -> MethodId {
        let id = MethodId(self.methods.len() as u32);
        let owner = info.owner;
        self.methods.push(info);
        if let Some(class) = self.class_mut(owner) {
            class.methods.push(id);
        }
        id
    }

    // -----------------------------------------------------------------
    // Access
    // -----------------------------------------------------------------

    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.types[id.index()]
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Class info of a class type, looking through generic instantiations.
    pub fn class(&self, id: TypeId) -> Option<&ClassInfo> {
        match self.types.get(id.index())? {
            TypeKind::Class(info) => Some(info),
            TypeKind::Generic { base, .. } => self.class(*base),
            _ => None,
        }
    }

    pub fn class_mut(&mut self, id: TypeId) -> Option<&mut ClassInfo> {
        let id = self.erase(id);
        match self.types.get_mut(id.index())? {
            TypeKind::Class(info) => Some(info),
            _ => None,
        }
    }

    pub fn field(&self, id: FieldId) -> &FieldInfo {
        &self.fields[id.0 as usize]
    }

    pub fn method(&self, id: MethodId) -> &MethodInfo {
        &self.methods[id.0 as usize]
    }

    pub fn method_mut(&mut self, id: MethodId) -> &mut MethodInfo {
        &mut self.methods[id.0 as usize]
    }

    pub fn methods(&self) -> impl Iterator<Item = (MethodId, &MethodInfo)> {
        self.methods
            .iter()
            .enumerate()
            .map(|(i, m)| (MethodId(i as u32), m))
    }

    pub fn fields(&self) -> impl Iterator<Item = (FieldId, &FieldInfo)> {
        self.fields
            .iter()
            .enumerate()
            .map(|(i, f)| (FieldId(i as u32), f))
    }

    /// Class ids in registration order.
    pub fn classes(&self) -> impl Iterator<Item = (TypeId, &ClassInfo)> {
        self.types.iter().enumerate().filter_map(|(i, kind)| match kind {
            TypeKind::Class(info) => Some((TypeId(i as u32), info)),
            _ => None,
        })
    }

    pub fn as_prim(&self, id: TypeId) -> Option<Prim> {
        match self.kind(id) {
            TypeKind::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn array_elem(&self, id: TypeId) -> Option<TypeId> {
        match self.kind(id) {
            TypeKind::Array(elem) => Some(*elem),
            _ => None,
        }
    }

    pub fn is_void(&self, id: TypeId) -> bool {
        id == VOID
    }

    pub fn is_error(&self, id: TypeId) -> bool {
        id == ERROR
    }

    pub fn is_reference(&self, id: TypeId) -> bool {
        matches!(
            self.kind(id),
            TypeKind::Null
                | TypeKind::Class(_)
                | TypeKind::Array(_)
                | TypeKind::TypeVar { .. }
                | TypeKind::Generic { .. }
        )
    }

    pub fn is_string(&self, id: TypeId) -> bool {
        self.erase(id) == self.string()
    }

    pub fn is_interface(&self, id: TypeId) -> bool {
        self.class(id).is_some_and(ClassInfo::is_interface)
    }

    /// Strip generic arguments and replace type variables by their bounds.
    pub fn erase(&self, id: TypeId) -> TypeId {
        match self.kind(id) {
            TypeKind::Generic { base, .. } => *base,
            TypeKind::TypeVar { bound, .. } => self.erase(*bound),
            _ => id,
        }
    }

    pub fn type_args(&self, id: TypeId) -> &[TypeId] {
        match self.kind(id) {
            TypeKind::Generic { args, .. } => args,
            _ => &[],
        }
    }

    /// Primitive carried by a wrapper class such as `Integer`.
    pub fn unboxed(&self, id: TypeId) -> Option<Prim> {
        let class = self.class(id)?;
        if !class.is_builtin {
            return None;
        }
        Prim::ALL.into_iter().find(|p| p.wrapper() == class.name)
    }

    pub fn boxed(&self, prim: Prim) -> TypeId {
        self.well_known(prim.wrapper())
    }

    /// Primitive view of a type, unboxing wrappers.
    pub fn numeric_prim(&self, id: TypeId) -> Option<Prim> {
        self.as_prim(id).or_else(|| self.unboxed(id))
    }

    // -----------------------------------------------------------------
    // Hierarchy
    // -----------------------------------------------------------------

    /// Walk `sub`'s superclasses and interfaces looking for `sup`.
    pub fn is_subclass(&self, sub: TypeId, sup: TypeId) -> bool {
        let sub = self.erase(sub);
        let sup = self.erase(sup);
        let mut seen = Vec::new();
        self.is_subclass_inner(sub, sup, &mut seen)
    }

    fn is_subclass_inner(&self, sub: TypeId, sup: TypeId, seen: &mut Vec<TypeId>) -> bool {
        if sub == sup {
            return true;
        }
        if seen.contains(&sub) {
            return false;
        }
        seen.push(sub);
        let Some(class) = self.class(sub) else {
            return false;
        };
        if let Some(parent) = class.superclass {
            if self.is_subclass_inner(parent, sup, seen) {
                return true;
            }
        }
        class
            .interfaces
            .iter()
            .any(|iface| self.is_subclass_inner(*iface, sup, seen))
    }

    /// Superclass chain starting at `class` itself.
    pub fn ancestors(&self, class: TypeId) -> Vec<TypeId> {
        let mut out = Vec::new();
        let mut current = Some(self.erase(class));
        while let Some(id) = current {
            if out.contains(&id) {
                break;
            }
            out.push(id);
            current = self.class(id).and_then(|c| c.superclass);
        }
        out
    }

    /// Every supertype reachable from `class`, class chain first.
    pub fn all_supertypes(&self, class: TypeId) -> Vec<TypeId> {
        let mut out = self.ancestors(class);
        let mut i = 0;
        while i < out.len() {
            if let Some(info) = self.class(out[i]) {
                for iface in &info.interfaces {
                    if !out.contains(iface) {
                        out.push(*iface);
                    }
                }
            }
            i += 1;
        }
        let object = self.object();
        if !out.contains(&object) && self.class(object).is_some() {
            out.push(object);
        }
        out
    }

    pub fn is_assignable(&self, from: TypeId, to: TypeId) -> bool {
        if from == to || from == ERROR || to == ERROR {
            return true;
        }
        match (self.kind(from), self.kind(to)) {
            (TypeKind::Void, _) | (_, TypeKind::Void) => false,
            (TypeKind::Primitive(a), TypeKind::Primitive(b)) => a.widens_to(*b),
            (TypeKind::Primitive(p), _) => {
                let boxed = self.boxed(*p);
                boxed != ERROR && self.is_reference_assignable(boxed, to)
            }
            (_, TypeKind::Primitive(p)) => self.unboxed(from).is_some_and(|u| u.widens_to(*p)),
            (TypeKind::Null, _) => true,
            _ => self.is_reference_assignable(from, to),
        }
    }

    fn is_reference_assignable(&self, from: TypeId, to: TypeId) -> bool {
        if from == to {
            return true;
        }
        match (self.kind(from), self.kind(to)) {
            (_, TypeKind::TypeVar { bound, .. }) => {
                // Unchecked: any reference compatible with the bound.
                self.is_reference_assignable(from, *bound)
            }
            (TypeKind::TypeVar { bound, .. }, _) => self.is_reference_assignable(*bound, to),
            (TypeKind::Array(a), TypeKind::Array(b)) => {
                if self.is_reference(*a) && self.is_reference(*b) {
                    self.is_reference_assignable(*a, *b)
                } else {
                    a == b
                }
            }
            (TypeKind::Array(_), _) => self.erase(to) == self.object(),
            (_, TypeKind::Array(_)) => false,
            _ => {
                if !self.is_subclass(from, to) && self.erase(to) != self.object() {
                    return false;
                }
                self.generic_args_compatible(from, to)
            }
        }
    }

    /// Raw types match anything; otherwise the viewed arguments must agree.
    fn generic_args_compatible(&self, from: TypeId, to: TypeId) -> bool {
        let to_args = self.type_args(to);
        if to_args.is_empty() || self.type_args(from).is_empty() {
            return true;
        }
        let Some(viewed) = self.view_as(from, self.erase(to)) else {
            return true;
        };
        viewed.iter().zip(to_args).all(|(a, b)| {
            a == b
                || matches!(self.kind(*a), TypeKind::TypeVar { .. })
                || matches!(self.kind(*b), TypeKind::TypeVar { .. })
                || self.erase(*b) == self.object()
        })
    }

    /// Type arguments of `owner` as seen from `receiver`, following
    /// generic supertype declarations such as `ArrayList<E> implements List<E>`.
    pub fn view_as(&self, receiver: TypeId, owner: TypeId) -> Option<Vec<TypeId>> {
        let args = self.type_args(receiver).to_vec();
        self.view_args(self.erase(receiver), args, self.erase(owner), &mut Vec::new())
    }

    /// Walk supertypes as (class, arguments) pairs so that instantiations
    /// such as `List<String>` need not be interned.
    fn view_args(
        &self,
        base: TypeId,
        args: Vec<TypeId>,
        owner: TypeId,
        seen: &mut Vec<TypeId>,
    ) -> Option<Vec<TypeId>> {
        if base == owner {
            return if args.is_empty() { None } else { Some(args) };
        }
        if seen.contains(&base) {
            return None;
        }
        seen.push(base);
        let class = self.class(base)?;
        for sup in &class.super_refs {
            let sup_base = self.erase(*sup);
            if !self.is_subclass(sup_base, owner) {
                continue;
            }
            let sup_args = if args.is_empty() {
                self.type_args(*sup).to_vec()
            } else {
                self.type_args(*sup)
                    .iter()
                    .map(|a| self.substitute_known(*a, &class.type_params, &args))
                    .collect()
            };
            return self.view_args(sup_base, sup_args, owner, seen);
        }
        None
    }

    /// Replace type variables in `ty` without creating new types; nested
    /// instantiations that were never interned stay unsubstituted.
    fn substitute_known(&self, ty: TypeId, params: &[TypeId], args: &[TypeId]) -> TypeId {
        if let Some(pos) = params.iter().position(|p| *p == ty) {
            return args.get(pos).copied().unwrap_or(ty);
        }
        if let TypeKind::Generic { base, args: inner } = self.kind(ty) {
            let replaced: Vec<TypeId> = inner
                .iter()
                .map(|a| self.substitute_known(*a, params, args))
                .collect();
            if let Some(id) = self.generics.get(&(*base, replaced)) {
                return *id;
            }
        }
        ty
    }

    /// Replace type variables in `ty`, interning new generic and array types.
    pub fn substitute(&mut self, ty: TypeId, params: &[TypeId], args: &[TypeId]) -> TypeId {
        if params.is_empty() {
            return ty;
        }
        if let Some(pos) = params.iter().position(|p| *p == ty) {
            return args.get(pos).copied().unwrap_or(ty);
        }
        match self.kind(ty).clone() {
            TypeKind::Generic { base, args: inner } => {
                let replaced = inner
                    .iter()
                    .map(|a| self.substitute(*a, params, args))
                    .collect();
                self.generic(base, replaced)
            }
            TypeKind::Array(elem) => {
                let elem = self.substitute(elem, params, args);
                self.array_of(elem)
            }
            _ => ty,
        }
    }

    /// Type of a member declared on `owner` when accessed through `receiver`.
    pub fn member_type(&mut self, ty: TypeId, owner: TypeId, receiver: TypeId) -> TypeId {
        let params = match self.class(owner) {
            Some(class) => class.type_params.clone(),
            None => return ty,
        };
        match self.view_as(receiver, owner) {
            Some(args) => self.substitute(ty, &params, &args),
            None => {
                // Raw access erases the owner's type variables.
                let erased: Vec<TypeId> = params.iter().map(|p| self.erase(*p)).collect();
                self.substitute(ty, &params, &erased)
            }
        }
    }

    // -----------------------------------------------------------------
    // Members
    // -----------------------------------------------------------------

    /// Field lookup through the superclass chain and interfaces.
    pub fn find_field(&self, class: TypeId, name: &str) -> Option<FieldId> {
        for ty in self.all_supertypes(class) {
            let Some(info) = self.class(ty) else { continue };
            if let Some(id) = info
                .fields
                .iter()
                .find(|f| self.field(**f).name == name)
            {
                return Some(*id);
            }
        }
        None
    }

    /// Methods named `name` visible on `class`, most-derived first.
    ///
    /// A method overridden in a subclass hides the inherited declaration.
    pub fn find_methods(&self, class: TypeId, name: &str) -> Vec<MethodId> {
        let mut out: Vec<MethodId> = Vec::new();
        for ty in self.all_supertypes(class) {
            let Some(info) = self.class(ty) else { continue };
            for id in &info.methods {
                let method = self.method(*id);
                if method.name != name || method.is_constructor {
                    continue;
                }
                let hidden = out.iter().any(|seen| self.same_signature(*seen, *id));
                if !hidden {
                    out.push(*id);
                }
            }
        }
        out
    }

    pub fn constructors(&self, class: TypeId) -> Vec<MethodId> {
        self.class(class)
            .map(|info| {
                info.methods
                    .iter()
                    .copied()
                    .filter(|m| self.method(*m).is_constructor)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Same name and erased parameter types.
    pub fn same_signature(&self, a: MethodId, b: MethodId) -> bool {
        let (ma, mb) = (self.method(a), self.method(b));
        ma.name == mb.name
            && ma.params.len() == mb.params.len()
            && ma
                .params
                .iter()
                .zip(&mb.params)
                .all(|(x, y)| self.params_match(*x, *y))
    }

    /// Parameter compatibility for overriding; type variables match any reference.
    fn params_match(&self, a: TypeId, b: TypeId) -> bool {
        let is_var = |t: TypeId| matches!(self.kind(t), TypeKind::TypeVar { .. });
        if is_var(a) || is_var(b) {
            return self.is_reference(a) && self.is_reference(b);
        }
        self.erase(a) == self.erase(b)
            || matches!(
                (self.kind(a), self.kind(b)),
                (TypeKind::Array(_), TypeKind::Array(_))
            ) && self.erase_array(a) == self.erase_array(b)
    }

    fn erase_array(&self, id: TypeId) -> TypeId {
        match self.kind(id) {
            TypeKind::Array(elem) => self.erase_array(*elem),
            _ => self.erase(id),
        }
    }

    /// Most-derived implementation of `declared` for a receiver of class `runtime`.
    pub fn resolve_override(&self, runtime: TypeId, declared: MethodId) -> Option<MethodId> {
        let target = self.method(declared);
        if target.is_static || target.is_constructor {
            return Some(declared);
        }
        for ty in self.all_supertypes(runtime) {
            let Some(info) = self.class(ty) else { continue };
            for id in &info.methods {
                let m = self.method(*id);
                if m.is_static || m.is_constructor || m.is_abstract() {
                    continue;
                }
                if *id == declared || self.same_signature(*id, declared) {
                    return Some(*id);
                }
            }
        }
        if target.is_abstract() { None } else { Some(declared) }
    }

    /// Abstract methods of `class`'s supertypes with no concrete implementation.
    pub fn unimplemented_methods(&self, class: TypeId) -> Vec<MethodId> {
        let mut out: Vec<MethodId> = Vec::new();
        for ty in self.all_supertypes(class) {
            let Some(info) = self.class(ty) else { continue };
            for id in &info.methods {
                let m = self.method(*id);
                if !m.is_abstract() || out.iter().any(|o| self.same_signature(*o, *id)) {
                    continue;
                }
                if self.resolve_override(class, *id).is_none() {
                    out.push(*id);
                }
            }
        }
        out
    }

    /// The single abstract method of a functional interface.
    pub fn functional_method(&self, iface: TypeId) -> Option<MethodId> {
        if !self.is_interface(iface) {
            return None;
        }
        let mut found: Vec<MethodId> = Vec::new();
        for ty in self.all_supertypes(iface) {
            if ty == self.object() {
                continue;
            }
            let Some(info) = self.class(ty) else { continue };
            for id in &info.methods {
                let m = self.method(*id);
                if m.is_abstract() && !found.iter().any(|f| self.same_signature(*f, *id)) {
                    found.push(*id);
                }
            }
        }
        if found.len() == 1 { found.pop() } else { None }
    }

    /// Instance field types ordered by slot, inherited fields first.
    pub fn instance_fields(&self, class: TypeId) -> Vec<FieldId> {
        let mut out = Vec::new();
        for ty in self.ancestors(class).into_iter().rev() {
            let Some(info) = self.class(ty) else { continue };
            out.extend(
                info.fields
                    .iter()
                    .copied()
                    .filter(|f| !self.field(*f).is_static),
            );
        }
        out.sort_by_key(|f| self.field(*f).slot);
        out
    }

    pub fn static_fields(&self, class: TypeId) -> Vec<FieldId> {
        self.class(class)
            .map(|info| {
                info.fields
                    .iter()
                    .copied()
                    .filter(|f| self.field(*f).is_static)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// First native representation found along the superclass chain.
    pub fn native_kind(&self, class: TypeId) -> NativeKind {
        self.ancestors(class)
            .into_iter()
            .filter_map(|ty| self.class(ty))
            .map(|c| c.native)
            .find(|n| *n != NativeKind::None)
            .unwrap_or(NativeKind::None)
    }

    // -----------------------------------------------------------------
    // Display
    // -----------------------------------------------------------------

    pub fn name(&self, id: TypeId) -> String {
        match self.kind(id) {
            TypeKind::Void => "void".into(),
            TypeKind::Null => "null".into(),
            TypeKind::Error => "<error>".into(),
            TypeKind::Primitive(p) => p.name().into(),
            TypeKind::Class(info) => info.name.clone(),
            TypeKind::Array(elem) => format!("{}[]", self.name(*elem)),
            TypeKind::TypeVar { name, .. } => name.clone(),
            TypeKind::Generic { base, args } => {
                let args: Vec<String> = args.iter().map(|a| self.name(*a)).collect();
                format!("{}<{}>", self.name(*base), args.join(", "))
            }
        }
    }

    pub fn display(&self, id: TypeId) -> TypeDisplay<'_> {
        TypeDisplay { store: self, id }
    }

    /// `name(int, String)` style signature.
    pub fn signature(&self, id: MethodId) -> String {
        let m = self.method(id);
        let params: Vec<String> = m.params.iter().map(|p| self.name(*p)).collect();
        let name = if m.is_constructor {
            self.class(m.owner).map(|c| c.name.as_str()).unwrap_or("?")
        } else {
            m.name.as_str()
        };
        format!("{name}({})", params.join(", "))
    }
}

pub struct TypeDisplay<'a> {
    store: &'a TypeStore,
    id: TypeId,
}

impl fmt::Display for TypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.store.name(self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::register_builtins;

    fn store() -> TypeStore {
        let mut store = TypeStore::new();
        register_builtins(&mut store);
        store
    }

    #[test]
    fn primitive_widening() {
        let s = store();
        let int = s.prim(Prim::Int);
        let long = s.prim(Prim::Long);
        let double = s.prim(Prim::Double);
        let char_ = s.prim(Prim::Char);
        let short = s.prim(Prim::Short);
        assert!(s.is_assignable(int, long));
        assert!(s.is_assignable(int, double));
        assert!(!s.is_assignable(double, int));
        assert!(s.is_assignable(char_, int));
        assert!(!s.is_assignable(short, char_));
    }

    #[test]
    fn boxing_and_references() {
        let s = store();
        let int = s.prim(Prim::Int);
        let integer = s.well_known("Integer");
        let object = s.object();
        assert!(s.is_assignable(int, integer));
        assert!(s.is_assignable(int, object));
        assert!(s.is_assignable(integer, int));
        assert!(s.is_assignable(s.null(), s.string()));
        assert!(!s.is_assignable(s.null(), int));
        assert!(s.is_assignable(s.string(), object));
        assert!(!s.is_assignable(object, s.string()));
    }

    #[test]
    fn generic_views_follow_supertypes() {
        let mut s = store();
        let list = s.well_known("List");
        let array_list = s.well_known("ArrayList");
        let string = s.string();
        let strings = s.generic(array_list, vec![string]);
        assert_eq!(s.view_as(strings, list), Some(vec![string]));

        let get = s.find_methods(list, "get")[0];
        let ret = s.method(get).ret;
        let owner = s.method(get).owner;
        assert_eq!(s.member_type(ret, owner, strings), string);

        let list_of_strings = s.generic(list, vec![string]);
        assert!(s.is_assignable(strings, list_of_strings));
        assert!(s.is_assignable(array_list, list_of_strings));
    }

    #[test]
    fn overrides_resolve_to_most_derived() {
        let s = store();
        let list = s.well_known("List");
        let array_list = s.well_known("ArrayList");
        let size = s.find_methods(list, "size")[0];
        assert!(s.method(size).is_abstract());
        let resolved = s.resolve_override(array_list, size).unwrap();
        assert_eq!(s.method(resolved).owner, array_list);
        assert!(s.unimplemented_methods(array_list).is_empty());
    }

    #[test]
    fn functional_interfaces() {
        let s = store();
        let runnable = s.well_known("Runnable");
        let run = s.functional_method(runnable).unwrap();
        assert_eq!(s.method(run).name, "run");
        assert!(s.functional_method(s.well_known("List")).is_none());
    }
}
