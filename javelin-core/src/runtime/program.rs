//! Executable form of one method, initializer, lambda or top-level block.
//!
//! A [`Program`] is an ordered list of [`Step`]s. Each step is a run of
//! straight-line [`Op`]s followed by exactly one [`Exit`] that names the
//! next step. Jump targets are recorded as [`Label`]s during code
//! generation and resolved to step indices the first time a step runs.

use std::cell::{Cell, OnceCell};
use std::rc::Rc;

use crate::ast::BinaryOp;
use crate::error::CoreError;
use crate::runtime::value::Value;
use crate::span::{ModuleId, Range};
use crate::symbols::ScopeId;
use crate::types::{MethodId, Prim, TypeId};

/// Index into the executable's program store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u32);

/// Sentinel step index meaning the program has returned.
pub const STEP_FINISHED: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumKind {
    Int,
    Long,
    Float,
    Double,
    Bool,
    /// Reference identity; strings compare by content.
    Ref,
}

impl NumKind {
    pub fn from_prim(prim: Prim) -> NumKind {
        match prim {
            Prim::Boolean => NumKind::Bool,
            Prim::Long => NumKind::Long,
            Prim::Float => NumKind::Float,
            Prim::Double => NumKind::Double,
            _ => NumKind::Int,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastTarget {
    Class(TypeId),
    Array,
}

/// Straight-line operations on the thread's value stack.
#[derive(Debug, Clone)]
pub enum Op {
    Const(Value),
    Load(usize),
    Store(usize),
    Dup,
    /// `a b -> a b a b`
    Dup2,
    /// `a b -> b a b`
    DupX1,
    /// `a b c -> c a b c`
    DupX2,
    Pop,
    Swap,
    GetField(usize),
    PutField(usize),
    GetStatic(TypeId, usize),
    PutStatic(TypeId, usize),
    ArrayGet,
    ArrayPut,
    ArrayLength,
    /// Pops `dims` lengths. `extra` trailing dimensions stay unallocated.
    NewArray {
        dims: usize,
        extra: usize,
        elem_name: Rc<str>,
        default: Value,
    },
    /// Pops `len` values into a fresh array.
    ArrayLiteral {
        len: usize,
        elem_name: Rc<str>,
    },
    NewObject(TypeId),
    Binary(BinaryOp, NumKind),
    Neg(NumKind),
    Not,
    BitNot(NumKind),
    Convert(Prim),
    /// Convert the value `depth` slots below the top.
    ConvertBelow {
        depth: usize,
        to: Prim,
    },
    /// Unwrap a boxed value, throwing on null.
    Unbox(Prim),
    /// Render a primitive or string on top of the stack.
    Stringify(Option<Prim>),
    /// Pop two strings, push their concatenation.
    Concat,
    CheckCast(CastTarget),
    InstanceOf(CastTarget),
    /// Pops `captures` values and builds a closure over `program`.
    MakeLambda {
        program: Rc<Program>,
        interface: TypeId,
        captures: usize,
    },
    /// Install handler `n` of the current program.
    TryEnter(usize),
    TryExit,
    /// Enter a `finally` block by normal completion.
    EnterFinally,
    EnumValues(TypeId),
    /// Pop an object and take its monitor, parking while another thread
    /// holds it. Always the last op of its step.
    MonitorEnter,
    /// Pop an object and release its monitor once.
    MonitorExit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTarget {
    Static(MethodId),
    /// Non-virtual instance call: constructors, `super.m()`, private helpers.
    Special(MethodId),
    Virtual(MethodId),
    /// Run an initializer program on the receiver.
    Init(ProgramId),
    /// `String.valueOf(obj)` semantics: `null` renders as `"null"`.
    Stringify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Call {
    pub target: CallTarget,
    /// Arguments on the stack, including the receiver.
    pub argc: usize,
}

/// The single terminator of a step. `L` is [`Label`] while generating and
/// a step index once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit<L> {
    Goto(L),
    Branch { if_true: L, if_false: L },
    Invoke { call: Call, resume: L },
    Return { value: bool },
    Throw,
    /// Jump out of `try` blocks down to handler `depth`, running finally blocks.
    Leave {
        target: Option<L>,
        depth: usize,
        value: bool,
    },
    /// End of a finally block: resume the pending completion or fall to `next`.
    EndFinally { next: L },
}

impl<L: Copy> Exit<L> {
    pub fn map<M, E>(&self, mut f: impl FnMut(L) -> Result<M, E>) -> Result<Exit<M>, E> {
        Ok(match self {
            Exit::Goto(l) => Exit::Goto(f(*l)?),
            Exit::Branch { if_true, if_false } => Exit::Branch {
                if_true: f(*if_true)?,
                if_false: f(*if_false)?,
            },
            Exit::Invoke { call, resume } => Exit::Invoke {
                call: *call,
                resume: f(*resume)?,
            },
            Exit::Return { value } => Exit::Return { value: *value },
            Exit::Throw => Exit::Throw,
            Exit::Leave {
                target,
                depth,
                value,
            } => Exit::Leave {
                target: match target {
                    Some(l) => Some(f(*l)?),
                    None => None,
                },
                depth: *depth,
                value: *value,
            },
            Exit::EndFinally { next } => Exit::EndFinally { next: f(*next)? },
        })
    }
}

#[derive(Debug, Clone)]
pub struct Handler {
    /// Each catch clause: accepted exception classes and entry label.
    pub catches: Vec<(Vec<TypeId>, Label)>,
    pub finally: Option<Label>,
}

/// Step body shared by the single and multiple step lists.
#[derive(Debug)]
pub struct StepCode {
    pub ops: Vec<Op>,
    pub exit: Exit<Label>,
    resolved: OnceCell<Exit<usize>>,
}

impl StepCode {
    pub fn new(ops: Vec<Op>, exit: Exit<Label>) -> Self {
        Self {
            ops,
            exit,
            resolved: OnceCell::new(),
        }
    }
}

#[derive(Debug)]
pub struct Step {
    pub index: usize,
    pub range: Range,
    pub breakpoint: Cell<bool>,
    /// Step-over stops before this step (statement starts).
    pub stop_step_over_before: bool,
    code: Rc<StepCode>,
}

impl Step {
    pub fn new(index: usize, range: Range, stop: bool, code: Rc<StepCode>) -> Self {
        Self {
            index,
            range,
            breakpoint: Cell::new(false),
            stop_step_over_before: stop,
            code,
        }
    }

    pub fn ops(&self) -> &[Op] {
        &self.code.ops
    }

    pub fn exit(&self) -> &Exit<Label> {
        &self.code.exit
    }

    pub fn is_compiled(&self) -> bool {
        self.code.resolved.get().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepList {
    /// One step per expression-level boundary.
    Single,
    /// Same steps, carrying statement ranges and step-over stops.
    Multiple,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramKind {
    Method(MethodId),
    Constructor(MethodId),
    InstanceInit(TypeId),
    StaticInit(TypeId),
    Main(ModuleId),
    Lambda,
    TestRunner(MethodId),
    Repl,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameLayout {
    pub this_slots: usize,
    pub parameters: usize,
    pub locals: usize,
}

impl FrameLayout {
    pub fn size(&self) -> usize {
        self.this_slots + self.parameters + self.locals
    }

    /// Slots filled by the caller: receiver and arguments.
    pub fn argument_slots(&self) -> usize {
        self.this_slots + self.parameters
    }
}

#[derive(Debug)]
pub struct Program {
    pub name: String,
    pub kind: ProgramKind,
    pub module: Option<ModuleId>,
    /// Scope holding the frame's symbols.
    pub scope: Option<ScopeId>,
    pub frame: FrameLayout,
    /// Slots receiving captured values when a lambda is invoked.
    pub captures: Vec<usize>,
    pub returns_value: bool,
    pub range: Range,
    pub steps_single: Vec<Step>,
    pub steps_multiple: Vec<Step>,
    pub handlers: Vec<Handler>,
    labels: Vec<usize>,
}

impl Program {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        kind: ProgramKind,
        module: Option<ModuleId>,
        scope: Option<ScopeId>,
        frame: FrameLayout,
        returns_value: bool,
        range: Range,
        labels: Vec<usize>,
    ) -> Self {
        Self {
            name,
            kind,
            module,
            scope,
            frame,
            captures: Vec::new(),
            returns_value,
            range,
            steps_single: Vec::new(),
            steps_multiple: Vec::new(),
            handlers: Vec::new(),
            labels,
        }
    }

    pub fn len(&self) -> usize {
        self.steps_single.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps_single.is_empty()
    }

    pub fn step(&self, index: usize, list: StepList) -> Option<&Step> {
        match list {
            StepList::Single => self.steps_single.get(index),
            StepList::Multiple => self.steps_multiple.get(index),
        }
    }

    pub fn label_target(&self, label: Label) -> Result<usize, CoreError> {
        self.labels
            .get(label.0 as usize)
            .copied()
            .filter(|target| *target < self.len())
            .ok_or_else(|| self.fault(STEP_FINISHED, format!("unbound label {}", label.0)))
    }

    /// Resolve a step's exit on first use and validate every target.
    pub fn compiled_exit(&self, index: usize) -> Result<&Exit<usize>, CoreError> {
        let step = self
            .steps_single
            .get(index)
            .ok_or_else(|| self.fault(index, "step index out of range".into()))?;
        if let Some(exit) = step.code.resolved.get() {
            return Ok(exit);
        }
        let resolved = step.code.exit.map(|label| self.label_target(label))?;
        Ok(step.code.resolved.get_or_init(|| resolved))
    }

    /// Force resolution of every step, reporting the first invalid target.
    pub fn validate(&self) -> Result<(), CoreError> {
        for index in 0..self.len() {
            self.compiled_exit(index)?;
        }
        for handler in &self.handlers {
            for (_, label) in &handler.catches {
                self.label_target(*label)?;
            }
            if let Some(label) = handler.finally {
                self.label_target(label)?;
            }
        }
        Ok(())
    }

    pub fn fault(&self, step: usize, message: String) -> CoreError {
        CoreError::Internal {
            program: self.name.clone(),
            step,
            message,
        }
    }

    /// First step in execution order on the nearest line at or after `line`.
    pub fn first_step_at_or_after(&self, line: u32) -> Option<&Step> {
        self.steps_single
            .iter()
            .filter(|s| !s.range.is_empty() && s.range.start_line >= line)
            .min_by_key(|s| (s.range.start_line, s.index))
    }

    pub fn set_breakpoint(&self, index: usize, enabled: bool) {
        for list in [&self.steps_single, &self.steps_multiple] {
            if let Some(step) = list.get(index) {
                step.breakpoint.set(enabled);
            }
        }
    }

    /// Multi-line listing used by `--emit steps`.
    pub fn dump(&self) -> String {
        use std::fmt::Write as _;
        let mut out = String::new();
        let _ = writeln!(out, "program {} ({:?})", self.name, self.frame);
        for step in &self.steps_single {
            let stmt = &self.steps_multiple[step.index];
            let marker = if stmt.stop_step_over_before { "*" } else { " " };
            let _ = writeln!(out, "  {marker}{:>3} @{}", step.index, step.range);
            for op in step.ops() {
                let _ = writeln!(out, "        {op:?}");
            }
            let _ = writeln!(out, "        -> {:?}", step.exit());
        }
        out
    }
}

/// All programs of an executable, addressed by [`ProgramId`].
#[derive(Debug, Default)]
pub struct ProgramStore {
    programs: Vec<Option<Rc<Program>>>,
}

impl ProgramStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve an id before the program is generated, so calls can refer to it.
    pub fn reserve(&mut self) -> ProgramId {
        self.programs.push(None);
        ProgramId(self.programs.len() as u32 - 1)
    }

    pub fn fill(&mut self, id: ProgramId, program: Program) -> Rc<Program> {
        let program = Rc::new(program);
        if let Some(slot) = self.programs.get_mut(id.0 as usize) {
            *slot = Some(program.clone());
        }
        program
    }

    pub fn add(&mut self, program: Program) -> ProgramId {
        let id = self.reserve();
        self.fill(id, program);
        id
    }

    pub fn get(&self, id: ProgramId) -> Option<&Rc<Program>> {
        self.programs.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProgramId, &Rc<Program>)> {
        self.programs
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.as_ref().map(|p| (ProgramId(i as u32), p)))
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}
