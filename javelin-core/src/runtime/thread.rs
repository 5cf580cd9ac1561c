//! Threads: an operand stack plus a stack of program frames.

use std::rc::Rc;

use serde::Serialize;

use crate::runtime::program::{Program, StepList};
use crate::runtime::value::Value;
use crate::span::{ModuleId, Range};

pub type ThreadId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ThreadState {
    NotStarted,
    Runnable,
    Running,
    Waiting(WaitReason),
    Paused,
    Terminated,
    TerminatedWithException,
}

impl ThreadState {
    pub fn is_terminated(self) -> bool {
        matches!(self, ThreadState::Terminated | ThreadState::TerminatedWithException)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum WaitReason {
    /// Parked in `Input.readLine()` or, with `int` set, `Input.readInt()`.
    Input { int: bool },
    /// Parked in `Thread.sleep` until the host clock reaches `until_ms`.
    Sleep { until_ms: f64 },
    /// Blocked entering a `synchronized` block held by another thread.
    Monitor { object: u64 },
}

/// A `try` handler installed in a frame.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ActiveHandler {
    pub index: usize,
    pub stack_height: usize,
    pub pending_len: usize,
}

/// How a `finally` block was entered, replayed by `EndFinally`.
#[derive(Debug, Clone)]
pub(crate) enum Completion {
    Normal,
    Throw(Value),
    Leave {
        target: Option<usize>,
        depth: usize,
        value: Option<Value>,
    },
}

/// One active call.
#[derive(Debug, Clone)]
pub struct ProgramState {
    pub program: Rc<Program>,
    pub step: usize,
    /// Index of slot 0 (receiver or first argument) on the thread's stack.
    pub stack_base: usize,
    /// Step list consulted for ranges and stop flags.
    pub list: StepList,
    pub(crate) handlers: Vec<ActiveHandler>,
    pub(crate) pending: Vec<Completion>,
}

impl ProgramState {
    pub fn new(program: Rc<Program>, stack_base: usize, list: StepList) -> Self {
        Self {
            program,
            step: 0,
            stack_base,
            list,
            handlers: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Source range of the step about to run.
    pub fn current_range(&self) -> Range {
        self.program
            .step(self.step, self.list)
            .map_or(self.program.range, |s| s.range)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
    pub program: String,
    pub module: Option<ModuleId>,
    pub range: Range,
}

/// An exception nobody caught.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UncaughtException {
    pub class_name: String,
    pub message: Option<String>,
    pub module: Option<ModuleId>,
    pub range: Range,
    /// Innermost frame first.
    pub stack_trace: Vec<TraceEntry>,
}

impl std::fmt::Display for UncaughtException {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {message}", self.class_name)?,
            None => f.write_str(&self.class_name)?,
        }
        for entry in &self.stack_trace {
            write!(f, "\n    at {} ({})", entry.program, entry.range)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Thread {
    pub id: ThreadId,
    pub name: String,
    pub state: ThreadState,
    pub stack: Vec<Value>,
    pub frames: Vec<ProgramState>,
    pub exception: Option<UncaughtException>,
    /// Value returned by the bottom frame.
    pub result: Option<Value>,
    /// Stack slots of the bottom frame when it returned.
    pub final_locals: Vec<Value>,
    pub max_steps_per_second: Option<f64>,
    /// Host time up to which the throttle has paid for executed steps.
    pub(crate) last_ran_ms: Option<f64>,
    pub steps_executed: u64,
}

impl Thread {
    pub fn new(id: ThreadId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            state: ThreadState::NotStarted,
            stack: Vec::new(),
            frames: Vec::new(),
            exception: None,
            result: None,
            final_locals: Vec::new(),
            max_steps_per_second: None,
            last_ran_ms: None,
            steps_executed: 0,
        }
    }

    /// Push a frame whose receiver and arguments are the top `argc` values.
    pub fn enter(&mut self, program: Rc<Program>, argc: usize) {
        let base = self.stack.len().saturating_sub(argc);
        let list = self.frames.last().map_or(StepList::Single, |f| f.list);
        self.stack.resize(base + program.frame.size().max(argc), Value::Null);
        self.frames.push(ProgramState::new(program, base, list));
    }

    pub fn top(&self) -> Option<&ProgramState> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut ProgramState> {
        self.frames.last_mut()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_runnable(&self) -> bool {
        matches!(self.state, ThreadState::Runnable | ThreadState::Running)
    }

    /// Frames from innermost to outermost, as shown in a stack trace.
    pub fn trace(&self) -> Vec<TraceEntry> {
        self.frames
            .iter()
            .rev()
            .map(|f| TraceEntry {
                program: f.program.name.clone(),
                module: f.program.module,
                range: f.current_range(),
            })
            .collect()
    }

    pub fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or_default()
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Drop every frame and value; the thread is finished.
    pub fn terminate(&mut self) {
        self.frames.clear();
        self.stack.clear();
        if !self.state.is_terminated() {
            self.state = ThreadState::Terminated;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::program::{FrameLayout, ProgramKind};

    fn program(size: usize) -> Rc<Program> {
        Rc::new(Program::new(
            "p".into(),
            ProgramKind::Lambda,
            None,
            None,
            FrameLayout {
                this_slots: 0,
                parameters: 1,
                locals: size - 1,
            },
            false,
            Range::EMPTY,
            Vec::new(),
        ))
    }

    #[test]
    fn enter_reserves_locals_above_arguments() {
        let mut thread = Thread::new(0, "main");
        thread.push(Value::Int(7));
        thread.push(Value::Int(42));
        thread.enter(program(3), 1);
        let frame = thread.top().unwrap();
        assert_eq!(frame.stack_base, 1);
        assert_eq!(thread.stack.len(), 4);
        assert!(matches!(thread.stack[1], Value::Int(42)));
        assert!(thread.stack[2].is_null());
    }

    #[test]
    fn terminate_keeps_exceptional_state() {
        let mut thread = Thread::new(1, "worker");
        thread.state = ThreadState::TerminatedWithException;
        thread.terminate();
        assert_eq!(thread.state, ThreadState::TerminatedWithException);
        assert!(thread.frames.is_empty());
    }
}
