//! Scopes, local symbols and the usage index.
//!
//! Scopes form a tree per compilation: module scopes at the root, then
//! class, method and block scopes. A scope that owns a stack frame
//! (methods, lambdas, initializers, top-level code) carries a
//! [`Stackframe`] from which every nested local gets its slot. Slots are
//! never reused within a frame.
//!
//! Every resolved identifier is recorded in one of two usage indices:
//! the user index (things declared in source) and the system index
//! (library members). Editor features read them back.

use std::collections::{BTreeMap, HashMap};

use crate::runtime::program::FrameLayout;
use crate::span::{ModuleId, Position, Range};
use crate::types::{FieldId, MethodId, TypeId, TypeStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Class(TypeId),
    Method,
    Lambda,
    Block,
    Repl,
}

/// Slot counters of one frame, in allocation order `this`, parameters, locals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stackframe {
    pub this_slots: usize,
    pub parameters: usize,
    pub locals: usize,
}

impl Stackframe {
    pub fn next_slot(&self) -> usize {
        self.this_slots + self.parameters + self.locals
    }

    pub fn layout(&self) -> FrameLayout {
        FrameLayout {
            this_slots: self.this_slots,
            parameters: self.parameters,
            locals: self.locals,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    pub range: Range,
    pub module: Option<ModuleId>,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    pub symbols: Vec<SymbolId>,
    pub frame: Option<Stackframe>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    This,
    Parameter,
    Local,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub range: Range,
    pub module: Option<ModuleId>,
    pub ty: TypeId,
    pub kind: SymbolKind,
    pub slot: usize,
    pub scope: ScopeId,
    /// Scope owning the frame the slot lives in.
    pub frame_scope: ScopeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageTarget {
    Symbol(SymbolId),
    Field(FieldId),
    Method(MethodId),
    Type(TypeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub module: ModuleId,
    pub range: Range,
    pub target: UsageTarget,
}

type UsageIndex = BTreeMap<(ModuleId, Position), Usage>;

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    symbols: Vec<Symbol>,
    user_usages: UsageIndex,
    system_usages: UsageIndex,
    by_target: HashMap<UsageTarget, Vec<Usage>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------
    // Scopes
    // -----------------------------------------------------------------

    pub fn add_scope(
        &mut self,
        kind: ScopeKind,
        parent: Option<ScopeId>,
        module: Option<ModuleId>,
        range: Range,
        owns_frame: bool,
    ) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            kind,
            range,
            module,
            parent,
            children: Vec::new(),
            symbols: Vec::new(),
            frame: owns_frame.then(Stackframe::default),
        });
        if let Some(parent) = parent {
            self.scopes[parent.0 as usize].children.push(id);
        }
        id
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn set_scope_range(&mut self, id: ScopeId, range: Range) {
        self.scopes[id.0 as usize].range = range;
    }

    pub fn scopes(&self) -> impl Iterator<Item = (ScopeId, &Scope)> {
        self.scopes
            .iter()
            .enumerate()
            .map(|(i, s)| (ScopeId(i as u32), s))
    }

    /// Nearest scope at or above `scope` that owns a frame.
    pub fn frame_scope(&self, scope: ScopeId) -> ScopeId {
        let mut current = scope;
        loop {
            let s = self.scope(current);
            if s.frame.is_some() {
                return current;
            }
            match s.parent {
                Some(parent) => current = parent,
                None => return current,
            }
        }
    }

    pub fn frame(&self, scope: ScopeId) -> Stackframe {
        self.scope(self.frame_scope(scope)).frame.unwrap_or_default()
    }

    /// Reserve an anonymous local slot in the frame enclosing `scope`.
    pub fn allocate_slot(&mut self, scope: ScopeId) -> usize {
        let frame_scope = self.frame_scope(scope);
        let frame = self.scopes[frame_scope.0 as usize]
            .frame
            .get_or_insert_with(Stackframe::default);
        let slot = frame.next_slot();
        frame.locals += 1;
        slot
    }

    /// Deepest scope under `root` whose range contains `position`.
    pub fn innermost_scope(&self, root: ScopeId, position: Position) -> ScopeId {
        let mut current = root;
        'descend: loop {
            for child in &self.scope(current).children {
                if self.scope(*child).range.contains_position(position) {
                    current = *child;
                    continue 'descend;
                }
            }
            return current;
        }
    }

    // -----------------------------------------------------------------
    // Symbols
    // -----------------------------------------------------------------

    pub fn declare(
        &mut self,
        scope: ScopeId,
        name: impl Into<String>,
        range: Range,
        ty: TypeId,
        kind: SymbolKind,
    ) -> SymbolId {
        let frame_scope = self.frame_scope(scope);
        let module = self.scope(scope).module;
        let frame = self.scopes[frame_scope.0 as usize]
            .frame
            .get_or_insert_with(Stackframe::default);
        let slot = frame.next_slot();
        match kind {
            SymbolKind::This => frame.this_slots += 1,
            SymbolKind::Parameter => frame.parameters += 1,
            SymbolKind::Local => frame.locals += 1,
        }
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol {
            name: name.into(),
            range,
            module,
            ty,
            kind,
            slot,
            scope,
            frame_scope,
        });
        self.scopes[scope.0 as usize].symbols.push(id);
        id
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn set_symbol_type(&mut self, id: SymbolId, ty: TypeId) {
        self.symbols[id.0 as usize].ty = ty;
    }

    /// Innermost symbol named `name` visible from `scope`.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.scope(id);
            if let Some(found) = s
                .symbols
                .iter()
                .rev()
                .find(|sym| self.symbol(**sym).name == name)
            {
                return Some(*found);
            }
            current = s.parent;
        }
        None
    }

    /// Symbol declared directly in `scope` or an enclosing block of the same frame.
    pub fn lookup_in_frame(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        let frame = self.frame_scope(scope);
        self.lookup(scope, name)
            .filter(|id| self.symbol(*id).frame_scope == frame)
    }

    /// Symbols visible at `position` from `scope` up to its frame scope,
    /// innermost first, shadowed names removed.
    pub fn visible_symbols(&self, scope: ScopeId, position: Position) -> Vec<SymbolId> {
        let frame = self.frame_scope(scope);
        let mut out: Vec<SymbolId> = Vec::new();
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.scope(id);
            for sym in s.symbols.iter().rev() {
                let symbol = self.symbol(*sym);
                let declared = symbol.kind != SymbolKind::Local
                    || symbol.range.is_empty()
                    || symbol.range.start() <= position;
                let shadowed = out.iter().any(|o| self.symbol(*o).name == symbol.name);
                if declared && !shadowed {
                    out.push(*sym);
                }
            }
            if id == frame {
                break;
            }
            current = s.parent;
        }
        out
    }

    // -----------------------------------------------------------------
    // Usages
    // -----------------------------------------------------------------

    pub fn record_usage(&mut self, module: ModuleId, range: Range, target: UsageTarget, user: bool) {
        if range.is_empty() {
            return;
        }
        let usage = Usage {
            module,
            range,
            target,
        };
        let index = if user {
            &mut self.user_usages
        } else {
            &mut self.system_usages
        };
        index.insert((module, range.start()), usage);
        self.by_target.entry(target).or_default().push(usage);
    }

    /// Usage whose range contains `position`, user index first.
    pub fn usage_at(&self, module: ModuleId, position: Position) -> Option<Usage> {
        [&self.user_usages, &self.system_usages]
            .into_iter()
            .find_map(|index| {
                index
                    .range(..=(module, position))
                    .next_back()
                    .map(|(_, usage)| *usage)
                    .filter(|u| u.module == module && u.range.contains_position(position))
            })
    }

    pub fn usages(&self, target: UsageTarget) -> &[Usage] {
        self.by_target
            .get(&target)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn user_usage_count(&self) -> usize {
        self.user_usages.len()
    }

    pub fn system_usage_count(&self) -> usize {
        self.system_usages.len()
    }

    /// Declaration site of a usage target, when it lives in source.
    pub fn definition(&self, target: UsageTarget, types: &TypeStore) -> Option<(ModuleId, Range)> {
        let (module, range) = match target {
            UsageTarget::Symbol(id) => {
                let s = self.symbol(id);
                (s.module, s.range)
            }
            UsageTarget::Field(id) => {
                let f = types.field(id);
                (f.module, f.range)
            }
            UsageTarget::Method(id) => {
                let m = types.method(id);
                (m.module, m.range)
            }
            UsageTarget::Type(id) => {
                let c = types.class(id)?;
                (c.module, c.name_range)
            }
        };
        Some((module?, range))
    }

    /// Target at `position`: a usage, or a declaration name.
    pub fn target_at(
        &self,
        module: ModuleId,
        position: Position,
        types: &TypeStore,
    ) -> Option<UsageTarget> {
        if let Some(usage) = self.usage_at(module, position) {
            return Some(usage.target);
        }
        let symbol = self
            .symbols
            .iter()
            .position(|s| s.module == Some(module) && s.range.contains_position(position))
            .map(|i| UsageTarget::Symbol(SymbolId(i as u32)));
        symbol
            .or_else(|| {
                types
                    .fields()
                    .find(|(_, f)| f.module == Some(module) && f.range.contains_position(position))
                    .map(|(id, _)| UsageTarget::Field(id))
            })
            .or_else(|| {
                types
                    .methods()
                    .find(|(_, m)| m.module == Some(module) && m.range.contains_position(position))
                    .map(|(id, _)| UsageTarget::Method(id))
            })
            .or_else(|| {
                types
                    .classes()
                    .find(|(_, c)| {
                        c.module == Some(module) && c.name_range.contains_position(position)
                    })
                    .map(|(id, _)| UsageTarget::Type(id))
            })
    }

    /// Every range to rewrite when renaming the user-defined entity at
    /// `position`, declaration first. Library members cannot be renamed.
    pub fn rename_ranges(
        &self,
        module: ModuleId,
        position: Position,
        types: &TypeStore,
    ) -> Option<Vec<(ModuleId, Range)>> {
        let target = self.target_at(module, position, types)?;
        let definition = self.definition(target, types)?;
        let mut out = vec![definition];
        for usage in self.usages(target) {
            let entry = (usage.module, usage.range);
            if !out.contains(&entry) {
                out.push(entry);
            }
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Prim;

    fn table() -> (SymbolTable, TypeStore, ScopeId) {
        let types = TypeStore::new();
        let mut table = SymbolTable::new();
        let module = table.add_scope(
            ScopeKind::Module,
            None,
            Some(ModuleId(0)),
            Range::new(1, 1, 20, 1),
            false,
        );
        let method = table.add_scope(
            ScopeKind::Method,
            Some(module),
            Some(ModuleId(0)),
            Range::new(2, 1, 10, 1),
            true,
        );
        (table, types, method)
    }

    #[test]
    fn slots_are_monotonic_per_frame() {
        let (mut table, types, method) = table();
        let int = types.prim(Prim::Int);
        let this = table.declare(method, "this", Range::EMPTY, int, SymbolKind::This);
        let p = table.declare(method, "p", Range::new(2, 10, 2, 11), int, SymbolKind::Parameter);
        let block = table.add_scope(
            ScopeKind::Block,
            Some(method),
            Some(ModuleId(0)),
            Range::new(3, 1, 5, 1),
            false,
        );
        let a = table.declare(block, "a", Range::new(3, 5, 3, 6), int, SymbolKind::Local);
        let b = table.declare(method, "b", Range::new(6, 5, 6, 6), int, SymbolKind::Local);
        let slots: Vec<usize> = [this, p, a, b].iter().map(|s| table.symbol(*s).slot).collect();
        assert_eq!(slots, vec![0, 1, 2, 3]);
        assert_eq!(
            table.frame(block),
            Stackframe {
                this_slots: 1,
                parameters: 1,
                locals: 2
            }
        );
    }

    #[test]
    fn lookup_prefers_inner_declarations() {
        let (mut table, types, method) = table();
        let int = types.prim(Prim::Int);
        let outer = table.declare(method, "x", Range::new(2, 5, 2, 6), int, SymbolKind::Local);
        let block = table.add_scope(ScopeKind::Block, Some(method), None, Range::new(3, 1, 4, 1), false);
        let inner = table.declare(block, "x", Range::new(3, 5, 3, 6), int, SymbolKind::Local);
        assert_eq!(table.lookup(block, "x"), Some(inner));
        assert_eq!(table.lookup(method, "x"), Some(outer));
        assert_eq!(table.lookup(method, "y"), None);
    }

    #[test]
    fn visible_symbols_respect_declaration_order() {
        let (mut table, types, method) = table();
        let int = types.prim(Prim::Int);
        table.declare(method, "a", Range::new(3, 5, 3, 6), int, SymbolKind::Local);
        table.declare(method, "b", Range::new(7, 5, 7, 6), int, SymbolKind::Local);
        let visible = table.visible_symbols(method, Position::new(5, 1));
        let names: Vec<&str> = visible.iter().map(|s| table.symbol(*s).name.as_str()).collect();
        assert_eq!(names, vec!["a"]);
    }

    #[test]
    fn rename_collects_definition_and_usages() {
        let (mut table, types, method) = table();
        let int = types.prim(Prim::Int);
        let decl = Range::new(3, 9, 3, 10);
        let x = table.declare(method, "x", decl, int, SymbolKind::Local);
        let use1 = Range::new(4, 5, 4, 6);
        let use2 = Range::new(5, 12, 5, 13);
        table.record_usage(ModuleId(0), use1, UsageTarget::Symbol(x), true);
        table.record_usage(ModuleId(0), use2, UsageTarget::Symbol(x), true);

        assert_eq!(
            table.usage_at(ModuleId(0), Position::new(5, 12)).map(|u| u.target),
            Some(UsageTarget::Symbol(x))
        );
        let ranges = table
            .rename_ranges(ModuleId(0), Position::new(4, 5), &types)
            .unwrap();
        assert_eq!(
            ranges,
            vec![(ModuleId(0), decl), (ModuleId(0), use1), (ModuleId(0), use2)]
        );
    }
}
