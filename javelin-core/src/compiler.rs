//! The compilation pipeline: modules in, [`Executable`] out.
//!
//! Stages never abort each other: every stage runs over every module and
//! reports into the diagnostics, so a broken file still leaves the rest of
//! the workspace compiled.

use std::path::Path;

use crate::builtins::register_builtins;
use crate::codegen;
use crate::diagnostic::DiagnosticSink;
use crate::error::CoreError;
use crate::executable::Executable;
use crate::module::Module;
use crate::resolver::static_init::order_static_initializers;
use crate::resolver::{self, Unit};
use crate::runtime::program::ProgramStore;
use crate::span::ModuleId;
use crate::symbols::SymbolTable;
use crate::types::TypeStore;
use crate::workspace::{SourceFile, load_workspace};

/// Editor context used to pick the entry point.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    /// Module currently shown to the user.
    pub current: Option<ModuleId>,
    /// Module the user opened last.
    pub last_opened: Option<ModuleId>,
}

/// Wrap files into modules numbered in order.
pub fn modules_from_sources(files: Vec<SourceFile>) -> Vec<Module> {
    files
        .into_iter()
        .enumerate()
        .map(|(i, f)| Module::new(ModuleId(i as u32), f.path, f.contents))
        .collect()
}

pub fn compile_source(path: &str, source: &str) -> Executable {
    compile(
        modules_from_sources(vec![SourceFile::new(path, source)]),
        &CompileOptions::default(),
    )
}

pub fn compile_workspace(root: impl AsRef<Path>, options: &CompileOptions) -> Result<Executable, CoreError> {
    let files = load_workspace(root)?;
    Ok(compile(modules_from_sources(files), options))
}

pub fn compile(mut modules: Vec<Module>, options: &CompileOptions) -> Executable {
    let mut types = TypeStore::new();
    let mut symbols = SymbolTable::new();
    let mut programs = ProgramStore::new();
    let mut sink = DiagnosticSink::new();

    stage("builtins", || register_builtins(&mut types));

    let units: Vec<Unit<'_>> = modules
        .iter()
        .map(|m| Unit {
            module: m.id,
            ast: &m.ast,
        })
        .collect();

    let decls = stage("resolve", || {
        resolver::declare(&units, &mut types, &mut symbols, &mut programs, &mut sink)
    });
    let output = stage("codegen", || {
        codegen::generate(&units, &decls, &mut types, &mut symbols, &mut programs, &mut sink)
    });

    let initializers: Vec<_> = decls
        .classes
        .iter()
        .filter_map(|c| types.class(c.ty).and_then(|info| info.static_init).map(|p| (c.ty, p)))
        .filter(|(_, p)| programs.get(*p).is_some_and(|p| !p.is_empty()))
        .collect();
    let static_init = order_static_initializers(&initializers, &output.static_deps);
    if let Some(diagnostic) = static_init.cycle_diagnostic(&types) {
        sink.push_global(diagnostic);
    }
    drop(units);

    tracing::debug!(
        target: "pipeline",
        modules = modules.len(),
        programs = programs.len(),
        static_inits = static_init.sequence.len(),
        errors = sink.has_errors(),
        "compiled"
    );

    for module in &mut modules {
        module.mark_clean();
    }
    let mut executable = Executable::new(
        modules,
        types,
        symbols,
        programs,
        sink,
        static_init,
        decls.module_scopes,
        output.top_level,
        output.tests,
    );
    executable.select_main(options.current, options.last_opened);
    executable
}

/// Run one pipeline stage, logging how long it took.
fn stage<T>(name: &'static str, f: impl FnOnce() -> T) -> T {
    #[cfg(not(target_arch = "wasm32"))]
    {
        let started = std::time::Instant::now();
        let result = f();
        tracing::debug!(target: "pipeline", stage = name, elapsed_us = started.elapsed().as_micros() as u64, "stage done");
        result
    }
    #[cfg(target_arch = "wasm32")]
    {
        let result = f();
        tracing::debug!(target: "pipeline", stage = name, "stage done");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_current_module_when_startable() {
        let files = vec![
            SourceFile::new("A.java", "public class A { public static void main(String[] args) { } }"),
            SourceFile::new("B.java", "public class B { public static void main() { } }"),
        ];
        let options = CompileOptions {
            current: Some(ModuleId(1)),
            last_opened: None,
        };
        let exe = compile(modules_from_sources(files), &options);
        let main = exe.main.unwrap();
        assert_eq!(main.module, ModuleId(1));
        assert!(!main.takes_args);
    }

    #[test]
    fn module_with_errors_is_not_startable() {
        let files = vec![
            SourceFile::new("A.java", "public class A { public static void main(String[] args) { int x = ; } }"),
            SourceFile::new("B.java", "public class B { public static void main(String[] args) { } }"),
        ];
        let exe = compile(modules_from_sources(files), &CompileOptions::default());
        assert!(exe.has_errors_in(ModuleId(0)));
        assert_eq!(exe.main.map(|m| m.module), Some(ModuleId(1)));
        assert!(exe.main.unwrap().takes_args);
    }

    #[test]
    fn workspace_compiles_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("Main.java"),
            "public class Main { public static void main(String[] args) { System.out.println(1); } }",
        )
        .unwrap();
        let exe = compile_workspace(dir.path(), &CompileOptions::default()).unwrap();
        assert!(!exe.has_errors());
        assert!(exe.main.is_some());
        assert!(exe.modules.iter().all(|m| !m.is_dirty));
    }
}
