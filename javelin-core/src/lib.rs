//! Core of the Javelin toolchain for a teaching subset of Java.
//!
//! The pipeline is roughly:
//!
//!   source .java
//!     -> lexer      (tokens, bracket check, color hints)
//!     -> parser     (AST)
//!     -> resolver   (classes, members, scopes, static-init order)
//!     -> codegen    (step programs)
//!     -> scheduler  (cooperative threads, breakpoints, stepping, REPL)
//!
//! The CLI and the web playground depend on this crate rather than
//! reimplementing the pipeline.

// ---------------------------------------------------------------------
// Error handling and diagnostics
// ---------------------------------------------------------------------

pub mod span;
pub mod diagnostic;
pub mod error;

// ---------------------------------------------------------------------
// Front-end: lexing and parsing
// ---------------------------------------------------------------------

pub mod lexer;
pub mod parser;
pub mod ast;

// ---------------------------------------------------------------------
// Semantic layers: types, symbols, name resolution
// ---------------------------------------------------------------------

pub mod types;
pub mod symbols;
pub mod resolver;
pub mod builtins;

// ---------------------------------------------------------------------
// Back-end: code generation and compiler orchestration
// ---------------------------------------------------------------------

pub mod codegen;
pub mod module;
pub mod executable;
pub mod workspace;
pub mod compiler;

// ---------------------------------------------------------------------
// Execution: runtime, debugging and the REPL
// ---------------------------------------------------------------------

pub mod runtime;
pub mod debug;
pub mod repl;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use compiler::{CompileOptions, compile, compile_source, compile_workspace, modules_from_sources};
pub use diagnostic::{Diagnostic, Severity};
pub use error::CoreError;
pub use executable::{Breakpoint, Executable, MainEntry};
pub use module::Module;
pub use repl::{ReplOutcome, ReplTarget};
pub use runtime::scheduler::{RunOutcome, RunState, Scheduler, SchedulerConfig, SliceResult, Tick};
pub use runtime::{PrintSink, SharedBuffer, StdoutSink};
pub use span::{ModuleId, Position, Range};
pub use workspace::SourceFile;
