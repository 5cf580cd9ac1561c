//! The result of compiling a set of modules: everything a scheduler needs
//! to run, plus the per-module diagnostics and breakpoint bookkeeping.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use serde::Serialize;

use crate::codegen::TestEntry;
use crate::diagnostic::{Diagnostic, DiagnosticSink};
use crate::module::Module;
use crate::resolver::static_init::StaticInitOrder;
use crate::runtime::program::{Program, ProgramId, ProgramStore};
use crate::span::{ModuleId, Position, Range};
use crate::symbols::{ScopeId, SymbolTable};
use crate::types::{MethodBody, MethodId, TypeId, TypeStore};

/// Where a run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MainEntry {
    pub module: ModuleId,
    #[serde(skip)]
    pub program: ProgramId,
    /// `main(String[] args)` rather than `main()` or top-level statements.
    pub takes_args: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Breakpoint {
    pub module: ModuleId,
    /// Line the breakpoint was requested on.
    pub line: u32,
    #[serde(skip)]
    pub program: ProgramId,
    pub step: usize,
    /// Range of the step it bound to.
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestMethod {
    pub class_name: String,
    pub method_name: String,
    pub entry: TestEntry,
}

#[derive(Debug)]
pub struct Executable {
    pub modules: Vec<Module>,
    pub types: TypeStore,
    pub symbols: SymbolTable,
    pub programs: ProgramStore,
    /// Resolver and code generator diagnostics.
    pub diagnostics: DiagnosticSink,
    pub static_init: StaticInitOrder,
    pub module_scopes: HashMap<ModuleId, ScopeId>,
    pub top_level: BTreeMap<ModuleId, ProgramId>,
    pub tests: Vec<TestEntry>,
    /// Selected entry point; `None` when nothing is startable.
    pub main: Option<MainEntry>,
    breakpoints: Vec<Breakpoint>,
}

impl Executable {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        modules: Vec<Module>,
        types: TypeStore,
        symbols: SymbolTable,
        programs: ProgramStore,
        diagnostics: DiagnosticSink,
        static_init: StaticInitOrder,
        module_scopes: HashMap<ModuleId, ScopeId>,
        top_level: BTreeMap<ModuleId, ProgramId>,
        tests: Vec<TestEntry>,
    ) -> Self {
        Self {
            modules,
            types,
            symbols,
            programs,
            diagnostics,
            static_init,
            module_scopes,
            top_level,
            tests,
            main: None,
            breakpoints: Vec::new(),
        }
    }

    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.iter().find(|m| m.id == id)
    }

    pub fn module_by_path(&self, path: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.path == path)
    }

    pub fn program(&self, id: ProgramId) -> Option<&Rc<Program>> {
        self.programs.get(id)
    }

    /// Every diagnostic of one module, front end first.
    pub fn module_diagnostics(&self, id: ModuleId) -> Vec<&Diagnostic> {
        let front = self.module(id).map(|m| m.diagnostics.as_slice()).unwrap_or_default();
        front.iter().chain(self.diagnostics.module(id)).collect()
    }

    /// Global diagnostics followed by each module's, in module order.
    pub fn all_diagnostics(&self) -> Vec<(Option<ModuleId>, &Diagnostic)> {
        let mut all: Vec<_> = self.diagnostics.global().iter().map(|d| (None, d)).collect();
        for module in &self.modules {
            all.extend(
                self.module_diagnostics(module.id)
                    .into_iter()
                    .map(|d| (Some(module.id), d)),
            );
        }
        all
    }

    pub fn has_errors_in(&self, module: ModuleId) -> bool {
        self.module_diagnostics(module).iter().any(|d| d.is_error())
    }

    pub fn has_errors(&self) -> bool {
        self.all_diagnostics().iter().any(|(_, d)| d.is_error())
    }

    /// Entry point of `module` if it is startable: it declares
    /// `public static void main(String[] args)` or `main()`, or has
    /// top-level statements, and carries no error.
    pub fn entry_of(&self, module: ModuleId) -> Option<MainEntry> {
        if self.has_errors_in(module) || !self.static_init.is_complete() {
            return None;
        }
        let main = self
            .types
            .methods()
            .filter(|(_, m)| m.module == Some(module) && self.is_main_method(m))
            .find_map(|(_, m)| match m.body {
                MethodBody::Program(program) => Some(MainEntry {
                    module,
                    program,
                    takes_args: !m.params.is_empty(),
                }),
                _ => None,
            });
        main.or_else(|| {
            self.top_level.get(&module).map(|program| MainEntry {
                module,
                program: *program,
                takes_args: false,
            })
        })
    }

    fn is_main_method(&self, m: &crate::types::MethodInfo) -> bool {
        let args_ok = match m.params.as_slice() {
            [] => true,
            [single] => self
                .types
                .array_elem(*single)
                .is_some_and(|elem| self.types.is_string(elem)),
            _ => false,
        };
        m.name == "main" && m.is_static && m.is_public && self.types.is_void(m.ret) && args_ok
    }

    pub fn is_startable(&self, module: ModuleId) -> bool {
        self.entry_of(module).is_some()
    }

    /// Choose the entry point: `current` if startable, then `last_opened`,
    /// then the first startable module.
    pub fn select_main(&mut self, current: Option<ModuleId>, last_opened: Option<ModuleId>) -> Option<MainEntry> {
        let chosen = current
            .and_then(|m| self.entry_of(m))
            .or_else(|| last_opened.and_then(|m| self.entry_of(m)))
            .or_else(|| self.modules.iter().find_map(|m| self.entry_of(m.id)));
        self.main = chosen;
        chosen
    }

    /// Flag the first step executed on the nearest line at or after `line`
    /// in `module`.
    pub fn set_breakpoint(&mut self, module: ModuleId, line: u32) -> Option<Breakpoint> {
        let (program_id, step, range) = self
            .programs
            .iter()
            .filter(|(_, p)| p.module == Some(module))
            .filter_map(|(id, p)| p.first_step_at_or_after(line).map(|s| (id, s.index, s.range)))
            .min_by_key(|(_, _, range)| (range.start_line, range.start()))?;
        let program = self.programs.get(program_id)?;
        program.set_breakpoint(step, true);
        let breakpoint = Breakpoint {
            module,
            line,
            program: program_id,
            step,
            range,
        };
        tracing::debug!(target: "scheduler", module = module.0, line, bound = %range, "breakpoint set");
        self.breakpoints.retain(|b| !(b.module == module && b.line == line));
        self.breakpoints.push(breakpoint);
        Some(breakpoint)
    }

    /// Remove the breakpoint requested on `line`; true if one existed.
    pub fn clear_breakpoint(&mut self, module: ModuleId, line: u32) -> bool {
        let Some(index) = self
            .breakpoints
            .iter()
            .position(|b| b.module == module && b.line == line)
        else {
            return false;
        };
        let removed = self.breakpoints.remove(index);
        let still_used = self
            .breakpoints
            .iter()
            .any(|b| b.program == removed.program && b.step == removed.step);
        if !still_used {
            if let Some(program) = self.programs.get(removed.program) {
                program.set_breakpoint(removed.step, false);
            }
        }
        true
    }

    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    /// `@Test` methods grouped by class, in declaration order.
    pub fn test_methods(&self) -> Vec<TestMethod> {
        let mut tests: Vec<TestMethod> = self
            .tests
            .iter()
            .map(|entry| TestMethod {
                class_name: self.types.name(entry.class),
                method_name: self.types.method(entry.method).name.clone(),
                entry: entry.clone(),
            })
            .collect();
        tests.sort_by_key(|t| (class_order(&self.types, t.entry.class), t.entry.method));
        tests
    }

    pub fn test(&self, class: &str, method: &str) -> Option<TestEntry> {
        self.test_methods()
            .into_iter()
            .find(|t| t.class_name == class && t.method_name == method)
            .map(|t| t.entry)
    }

    /// Name of a method, for logs and the debug view.
    pub fn method_name(&self, method: MethodId) -> String {
        self.types.signature(method)
    }

    // -----------------------------------------------------------------
    // Source navigation
    // -----------------------------------------------------------------

    /// Every recorded use of the entity at `position`.
    pub fn find_usages(&self, module: ModuleId, position: Position) -> Vec<(ModuleId, Range)> {
        self.symbols
            .target_at(module, position, &self.types)
            .map(|target| {
                self.symbols
                    .usages(target)
                    .iter()
                    .map(|u| (u.module, u.range))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Declaration site of the entity at `position`, if it is declared in source.
    pub fn definition_at(&self, module: ModuleId, position: Position) -> Option<(ModuleId, Range)> {
        let target = self.symbols.target_at(module, position, &self.types)?;
        self.symbols.definition(target, &self.types)
    }

    pub fn rename_ranges(&self, module: ModuleId, position: Position) -> Option<Vec<(ModuleId, Range)>> {
        self.symbols.rename_ranges(module, position, &self.types)
    }
}

fn class_order(types: &TypeStore, class: TypeId) -> (Option<ModuleId>, Position) {
    types
        .class(class)
        .map_or((None, Position::new(0, 0)), |c| (c.module, c.name_range.start()))
}
