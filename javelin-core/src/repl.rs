//! Read-eval-print over a scheduler.
//!
//! A snippet runs either standalone, in a session frame whose locals
//! persist from one evaluation to the next, or inside the frame a paused
//! thread stopped in, where it can read and assign that frame's variables.
//! Snippets run on a thread of their own: synchronously up to a step cap
//! with [`Scheduler::repl_eval`], or spread over slices with
//! [`Scheduler::repl_submit`] and [`Scheduler::repl_poll`].

use std::rc::Rc;

use serde::Serialize;

use crate::codegen::{self, ReplFrame};
use crate::debug::render_value;
use crate::diagnostic::{Diagnostic, has_errors};
use crate::error::CoreError;
use crate::parser::parse_repl;
use crate::runtime::program::{Program, ProgramKind};
use crate::runtime::scheduler::{RunState, Scheduler};
use crate::runtime::thread::{Thread, ThreadId, ThreadState, UncaughtException};
use crate::runtime::value::Value;
use crate::span::{ModuleId, Range};
use crate::symbols::{ScopeId, ScopeKind};
use crate::types::TypeId;

/// Module id carried by ranges of REPL input.
pub const REPL_MODULE: ModuleId = ModuleId(u32::MAX);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplTarget {
    /// The session frame, independent of any run.
    Standalone,
    /// The top frame of the paused thread.
    Paused,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplOutcome {
    /// Rendered value of a trailing expression.
    pub value: Option<String>,
    pub value_type: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub exception: Option<UncaughtException>,
}

impl ReplOutcome {
    fn failed(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            diagnostics,
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.exception.is_some() || has_errors(&self.diagnostics)
    }
}

/// Persistent state of standalone evaluation.
#[derive(Debug, Default)]
pub(crate) struct ReplSession {
    scope: Option<ScopeId>,
    locals: Vec<Value>,
}

pub type ReplTicket = u32;

/// Where a finished evaluation writes its frame back to.
#[derive(Debug, Clone, Copy)]
enum WriteBack {
    Session,
    Frame { thread: ThreadId, base: usize, size: usize },
}

/// An evaluation in flight.
#[derive(Debug)]
pub(crate) struct ReplJob {
    pub ticket: ReplTicket,
    pub thread: Thread,
    write_back: WriteBack,
    value_type: Option<TypeId>,
    warnings: Vec<Diagnostic>,
}

impl ReplJob {
    pub fn is_running(&self) -> bool {
        !self.thread.state.is_terminated()
    }
}

/// A compiled snippet ready to run.
struct Prepared {
    thread: Thread,
    write_back: WriteBack,
    value_type: Option<TypeId>,
    warnings: Vec<Diagnostic>,
}

impl Scheduler {
    /// Evaluate `source` to completion, running at most the configured
    /// REPL step cap.
    pub fn repl_eval(&mut self, source: &str, target: ReplTarget) -> Result<ReplOutcome, CoreError> {
        let mut prepared = match self.prepare_snippet(source, target)? {
            Ok(prepared) => prepared,
            Err(outcome) => return Ok(outcome),
        };
        let cap = self.config.repl_step_cap;
        let steps = self.run_detached(&mut prepared.thread, cap)?;
        let thread = &prepared.thread;
        if !thread.state.is_terminated() {
            let message = match thread.state {
                ThreadState::Waiting(_) => "evaluation is blocked waiting and cannot finish here".to_string(),
                _ => format!("evaluation did not finish within {steps} steps"),
            };
            return Ok(ReplOutcome::failed(vec![Diagnostic::error(message, Range::EMPTY)]));
        }
        Ok(self.complete(prepared.thread, prepared.write_back, prepared.value_type, prepared.warnings))
    }

    /// Queue `source` to run alongside the scheduled threads. Snippets that
    /// fail to compile complete immediately.
    pub fn repl_submit(&mut self, source: &str, target: ReplTarget) -> Result<ReplTicket, CoreError> {
        let ticket = self.repl_jobs.iter().map(|j| j.ticket + 1).max().unwrap_or(0);
        let job = match self.prepare_snippet(source, target)? {
            Ok(prepared) => ReplJob {
                ticket,
                thread: prepared.thread,
                write_back: prepared.write_back,
                value_type: prepared.value_type,
                warnings: prepared.warnings,
            },
            Err(outcome) => {
                let mut thread = self.new_thread("repl");
                thread.state = ThreadState::Terminated;
                ReplJob {
                    ticket,
                    thread,
                    write_back: WriteBack::Session,
                    value_type: None,
                    warnings: outcome.diagnostics,
                }
            }
        };
        tracing::debug!(target: "repl", ticket, "repl evaluation queued");
        self.repl_jobs.push(job);
        Ok(ticket)
    }

    /// Result of a submitted evaluation once it finished.
    pub fn repl_poll(&mut self, ticket: ReplTicket) -> Option<ReplOutcome> {
        let index = self
            .repl_jobs
            .iter()
            .position(|j| j.ticket == ticket && !j.is_running())?;
        let job = self.repl_jobs.remove(index);
        if has_errors(&job.warnings) {
            return Some(ReplOutcome::failed(job.warnings));
        }
        Some(self.complete(job.thread, job.write_back, job.value_type, job.warnings))
    }

    /// Compile a snippet against the target frame. The inner `Err` carries
    /// diagnostics of input that does not compile.
    fn prepare_snippet(&mut self, source: &str, target: ReplTarget) -> Result<Result<Prepared, ReplOutcome>, CoreError> {
        let parsed = parse_repl(source);
        if has_errors(&parsed.diagnostics) {
            return Ok(Err(ReplOutcome::failed(parsed.diagnostics)));
        }
        let (frame, locals, write_back) = match target {
            ReplTarget::Standalone => self.session_frame(),
            ReplTarget::Paused => self.paused_frame()?,
        };

        let exe = &mut self.executable;
        let snippet = codegen::generate_snippet(&parsed, &frame, &mut exe.types, &mut exe.symbols, &mut exe.programs);
        let mut diagnostics = parsed.diagnostics;
        diagnostics.extend(snippet.diagnostics);
        if has_errors(&diagnostics) {
            return Ok(Err(ReplOutcome::failed(diagnostics)));
        }
        let program: Rc<Program> = Rc::new(snippet.program);
        tracing::trace!(target: "repl", program = %program.dump(), "repl snippet");

        let mut thread = self.new_thread("repl");
        let argc = locals.len();
        thread.stack = locals;
        thread.enter(program, argc);
        thread.state = ThreadState::Runnable;
        Ok(Ok(Prepared {
            thread,
            write_back,
            value_type: snippet.value_type,
            warnings: diagnostics,
        }))
    }

    fn session_frame(&mut self) -> (ReplFrame, Vec<Value>, WriteBack) {
        let scope = match self.repl.scope {
            Some(scope) => scope,
            None => {
                let scope = self
                    .executable
                    .symbols
                    .add_scope(ScopeKind::Repl, None, Some(REPL_MODULE), Range::EMPTY, true);
                self.repl.scope = Some(scope);
                scope
            }
        };
        let frame = ReplFrame {
            scope,
            class: None,
            this_type: None,
            module: REPL_MODULE,
        };
        (frame, self.repl.locals.clone(), WriteBack::Session)
    }

    fn paused_frame(&mut self) -> Result<(ReplFrame, Vec<Value>, WriteBack), CoreError> {
        let unavailable = |why: &str| CoreError::ReplTarget(why.into());
        let at = match (self.state(), self.paused_at()) {
            (RunState::Paused, Some(at)) => at,
            _ => return Err(unavailable("no thread is paused")),
        };
        let thread = self
            .threads
            .iter()
            .find(|t| t.id == at.thread)
            .ok_or_else(|| unavailable("the paused thread has ended"))?;
        let frame = thread.top().ok_or_else(|| unavailable("the paused thread has no frame"))?;
        let program = frame.program.clone();
        let root = program
            .scope
            .ok_or_else(|| unavailable("the paused frame has no variables"))?;
        let base = frame.stack_base;
        let size = program.frame.size();
        let locals = thread.stack.get(base..base + size).map(<[Value]>::to_vec).unwrap_or_default();
        let position = frame.current_range().start();

        let (class, this_type) = self.frame_receiver(&program.kind);
        let symbols = &mut self.executable.symbols;
        let innermost = symbols.innermost_scope(root, position);
        let scope = symbols.add_scope(ScopeKind::Block, Some(innermost), program.module, Range::EMPTY, false);
        let frame = ReplFrame {
            scope,
            class,
            this_type,
            module: program.module.unwrap_or(REPL_MODULE),
        };
        Ok((frame, locals, WriteBack::Frame { thread: at.thread, base, size }))
    }

    /// Enclosing class and `this` type of a frame running `kind`.
    fn frame_receiver(&self, kind: &ProgramKind) -> (Option<TypeId>, Option<TypeId>) {
        let types = &self.executable.types;
        match kind {
            ProgramKind::Method(method) => {
                let info = types.method(*method);
                (Some(info.owner), (!info.is_static).then_some(info.owner))
            }
            ProgramKind::Constructor(method) => {
                let owner = types.method(*method).owner;
                (Some(owner), Some(owner))
            }
            ProgramKind::InstanceInit(class) => (Some(*class), Some(*class)),
            ProgramKind::StaticInit(class) => (Some(*class), None),
            ProgramKind::TestRunner(method) => (Some(types.method(*method).owner), None),
            ProgramKind::Main(_) | ProgramKind::Lambda | ProgramKind::Repl => (None, None),
        }
    }

    fn complete(
        &mut self,
        thread: Thread,
        write_back: WriteBack,
        value_type: Option<TypeId>,
        diagnostics: Vec<Diagnostic>,
    ) -> ReplOutcome {
        if let Some(exception) = thread.exception {
            return ReplOutcome {
                exception: Some(exception),
                diagnostics,
                ..ReplOutcome::default()
            };
        }
        match write_back {
            WriteBack::Session => self.repl.locals = thread.final_locals,
            WriteBack::Frame { thread: id, base, size } => {
                if let Some(target) = self.threads.iter_mut().find(|t| t.id == id) {
                    for (slot, value) in thread.final_locals.into_iter().take(size).enumerate() {
                        if let Some(cell) = target.stack.get_mut(base + slot) {
                            *cell = value;
                        }
                    }
                }
            }
        }
        let types = &self.executable.types;
        ReplOutcome {
            value: value_type.and(thread.result.as_ref()).map(|v| render_value(types, v)),
            value_type: value_type.map(|t| types.name(t)),
            diagnostics,
            exception: None,
        }
    }

    /// Forget every standalone declaration.
    pub fn repl_reset(&mut self) {
        self.repl = ReplSession::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_source;
    use crate::runtime::SharedBuffer;
    use crate::runtime::scheduler::SchedulerConfig;
    use crate::span::ModuleId;

    fn scheduler(source: &str) -> (Scheduler, SharedBuffer) {
        let exe = compile_source("Main.java", source);
        assert!(!exe.has_errors(), "{:?}", exe.all_diagnostics());
        let out = SharedBuffer::new();
        (Scheduler::new(exe, Box::new(out.clone()), SchedulerConfig::default()), out)
    }

    #[test]
    fn standalone_locals_persist_between_snippets() {
        let (mut s, _) = scheduler("public class Main { static int twice(int x) { return x * 2; } }");
        let first = s.repl_eval("int a = 20;", ReplTarget::Standalone).unwrap();
        assert!(!first.is_error(), "{first:?}");
        assert_eq!(first.value, None);
        let second = s.repl_eval("Main.twice(a) + 2", ReplTarget::Standalone).unwrap();
        assert_eq!(second.value.as_deref(), Some("42"));
        assert_eq!(second.value_type.as_deref(), Some("int"));
    }

    #[test]
    fn compile_errors_are_reported_not_run() {
        let (mut s, out) = scheduler("public class Main { }");
        let outcome = s.repl_eval("System.out.println(missing);", ReplTarget::Standalone).unwrap();
        assert!(outcome.is_error());
        assert!(outcome.exception.is_none());
        assert_eq!(out.contents(), "");
    }

    #[test]
    fn exceptions_are_returned() {
        let (mut s, _) = scheduler("public class Main { }");
        let outcome = s.repl_eval("int z = 0; 1 / z", ReplTarget::Standalone).unwrap();
        let exception = outcome.exception.unwrap();
        assert_eq!(exception.class_name, "ArithmeticException");
        assert_eq!(exception.message.as_deref(), Some("/ by zero"));
    }

    #[test]
    fn runaway_snippet_hits_the_step_cap() {
        let (mut s, _) = scheduler("public class Main { }");
        s.config.repl_step_cap = 500;
        let outcome = s.repl_eval("while (true) { }", ReplTarget::Standalone).unwrap();
        assert!(outcome.is_error());
    }

    #[test]
    fn paused_frame_is_readable_and_writable() {
        let source = "public class Main {\n  public static void main(String[] args) {\n    int a = 5;\n    System.out.println(a);\n  }\n}\n";
        let (mut s, out) = scheduler(source);
        s.executable_mut().set_breakpoint(ModuleId(0), 4).unwrap();
        s.start_main().unwrap();
        s.run_to_completion(1_000).unwrap();
        let read = s.repl_eval("a * 2", ReplTarget::Paused).unwrap();
        assert_eq!(read.value.as_deref(), Some("10"));
        let write = s.repl_eval("a = 7;", ReplTarget::Paused).unwrap();
        assert!(!write.is_error(), "{write:?}");
        s.resume();
        s.run_to_completion(1_000).unwrap();
        assert_eq!(out.contents(), "7\n");
    }

    #[test]
    fn paused_frame_matches_the_debugger_variables() {
        let source = "public class Main {\n  static void show(int n, String label) {\n    double ratio = n / 4.0;\n    boolean big = n > 2;\n    char initial = label.charAt(0);\n    int[] digits = { n, n + 1 };\n    System.out.println(label);\n  }\n  public static void main(String[] args) {\n    show(3, \"three\");\n  }\n}\n";
        let (mut s, _) = scheduler(source);
        s.executable_mut().set_breakpoint(ModuleId(0), 7).unwrap();
        s.start_main().unwrap();
        s.run_to_completion(1_000).unwrap();
        let paused = s.paused_at().expect("paused");
        let thread = s.thread(paused.thread).expect("paused thread");
        let depth = thread.frames.len() - 1;
        let shown = crate::debug::frame_variables(s.executable(), thread, depth);
        let mut names: Vec<&str> = shown.iter().map(|v| v.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, ["big", "digits", "initial", "label", "n", "ratio"]);

        for view in &shown {
            let outcome = s.repl_eval(&view.name, ReplTarget::Paused).unwrap();
            assert!(!outcome.is_error(), "{}: {outcome:?}", view.name);
            assert_eq!(outcome.value.as_deref(), Some(view.value.as_str()), "{}", view.name);
            assert_eq!(outcome.value_type.as_deref(), Some(view.type_name.as_str()), "{}", view.name);
        }

        let write = s.repl_eval("n = 9;", ReplTarget::Paused).unwrap();
        assert!(!write.is_error(), "{write:?}");
        let after = s.variables(paused.thread, depth);
        let n = after.iter().find(|v| v.name == "n").unwrap();
        assert_eq!(n.value, "9");
    }

    #[test]
    fn paused_target_needs_a_paused_thread() {
        let (mut s, _) = scheduler("public class Main { }");
        let err = s.repl_eval("1", ReplTarget::Paused).unwrap_err();
        assert!(matches!(err, CoreError::ReplTarget(_)));
    }

    #[test]
    fn submitted_snippet_completes_over_slices() {
        let (mut s, out) = scheduler("public class Main { }");
        let ticket = s.repl_submit("System.out.println(\"hi\"); 3 + 4", ReplTarget::Standalone).unwrap();
        assert!(s.repl_poll(ticket).is_none());
        s.run_slice(crate::runtime::scheduler::Tick { max_steps: 1_000, now_ms: 0.0 }).unwrap();
        let outcome = s.repl_poll(ticket).unwrap();
        assert_eq!(outcome.value.as_deref(), Some("7"));
        assert_eq!(out.contents(), "hi\n");
        assert!(s.repl_poll(ticket).is_none());
    }
}
