//! Incremental construction of one [`Program`].
//!
//! The builder always has an open step. Ops are appended to it until an
//! exit is emitted, which closes the step and opens the next one. Labels
//! are bound to the start of the open step; binding a label to a step that
//! already holds ops first closes it with a `Goto` to the new step.

use std::rc::Rc;

use crate::runtime::program::{
    Exit, FrameLayout, Handler, Label, Op, Program, ProgramKind, STEP_FINISHED, Step, StepCode,
};
use crate::span::{ModuleId, Range};
use crate::symbols::ScopeId;

#[derive(Debug, Default)]
struct Draft {
    ops: Vec<Op>,
    range: Range,
    statement: Range,
    stop: bool,
    labelled: bool,
}

#[derive(Debug)]
pub(crate) struct ProgramBuilder {
    steps: Vec<(Draft, Exit<Label>)>,
    open: Draft,
    labels: Vec<usize>,
    handlers: Vec<Handler>,
    statement: Range,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            open: Draft::default(),
            labels: Vec::new(),
            handlers: Vec::new(),
            statement: Range::EMPTY,
        }
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(STEP_FINISHED);
        Label(self.labels.len() as u32 - 1)
    }

    /// Bind `label` to the start of the next step.
    pub fn bind(&mut self, label: Label) {
        self.split();
        self.open.labelled = true;
        self.labels[label.0 as usize] = self.steps.len();
    }

    pub fn emit(&mut self, op: Op, range: Range) {
        self.touch(range);
        self.open.ops.push(op);
    }

    /// Widen the open step's range to cover `range`.
    pub fn touch(&mut self, range: Range) {
        if range.is_empty() {
            return;
        }
        let current = &mut self.open.range;
        if current.is_empty() {
            *current = range;
        } else if range.end() > current.end() {
            current.end_line = range.end_line;
            current.end_column = range.end_column;
        }
    }

    /// Close the open step with `exit`.
    pub fn exit(&mut self, exit: Exit<Label>) {
        let mut draft = std::mem::take(&mut self.open);
        if draft.statement.is_empty() {
            draft.statement = self.statement;
        }
        self.steps.push((draft, exit));
        self.open.statement = self.statement;
    }

    /// Start a statement: it begins a fresh step that step-over stops before.
    pub fn begin_statement(&mut self, range: Range) {
        self.split();
        self.statement = range;
        self.open.statement = range;
        self.open.stop = true;
    }

    /// Close a non-empty open step with a `Goto` to its successor.
    fn split(&mut self) {
        if self.open.ops.is_empty() {
            return;
        }
        let next = self.new_label();
        self.exit(Exit::Goto(next));
        self.labels[next.0 as usize] = self.steps.len();
        self.open.labelled = true;
    }

    /// Whether control can reach the open step.
    pub fn tail_reachable(&self) -> bool {
        self.steps.is_empty() || self.open.labelled || !self.open.ops.is_empty()
    }

    pub fn add_handler(&mut self) -> usize {
        self.handlers.push(Handler {
            catches: Vec::new(),
            finally: None,
        });
        self.handlers.len() - 1
    }

    pub fn handler_mut(&mut self, index: usize) -> &mut Handler {
        &mut self.handlers[index]
    }

    /// Close any pending step and assemble the program.
    #[allow(clippy::too_many_arguments)]
    pub fn finish(
        mut self,
        name: String,
        kind: ProgramKind,
        module: Option<ModuleId>,
        scope: Option<ScopeId>,
        frame: FrameLayout,
        returns_value: bool,
        range: Range,
        captures: Vec<usize>,
    ) -> Program {
        if !self.open.ops.is_empty() || self.open.labelled {
            self.exit(Exit::Return { value: false });
        }
        let mut program = Program::new(
            name,
            kind,
            module,
            scope,
            frame,
            returns_value,
            range,
            self.labels,
        );
        program.captures = captures;
        program.handlers = self.handlers;
        for (index, (draft, exit)) in self.steps.into_iter().enumerate() {
            let code = Rc::new(StepCode::new(draft.ops, exit));
            let statement = if draft.statement.is_empty() {
                draft.range
            } else {
                draft.statement
            };
            program
                .steps_single
                .push(Step::new(index, draft.range, false, code.clone()));
            program
                .steps_multiple
                .push(Step::new(index, statement, draft.stop, code));
        }
        program
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::value::Value;

    fn finish(b: ProgramBuilder) -> Program {
        b.finish(
            "t".into(),
            ProgramKind::Lambda,
            None,
            None,
            FrameLayout::default(),
            false,
            Range::EMPTY,
            Vec::new(),
        )
    }

    #[test]
    fn statements_start_new_steps() {
        let mut b = ProgramBuilder::new();
        b.begin_statement(Range::new(1, 1, 1, 5));
        b.emit(Op::Const(Value::Int(1)), Range::new(1, 1, 1, 2));
        b.emit(Op::Pop, Range::new(1, 3, 1, 5));
        b.begin_statement(Range::new(2, 1, 2, 5));
        b.emit(Op::Const(Value::Int(2)), Range::new(2, 1, 2, 2));
        b.exit(Exit::Return { value: false });
        let program = finish(b);
        assert_eq!(program.len(), 2);
        assert_eq!(program.steps_single[0].range, Range::new(1, 1, 1, 5));
        assert!(program.steps_multiple[1].stop_step_over_before);
        assert!(program.validate().is_ok());
    }

    #[test]
    fn labels_bind_to_following_step() {
        let mut b = ProgramBuilder::new();
        let end = b.new_label();
        b.emit(Op::Const(Value::Bool(true)), Range::EMPTY);
        let body = b.new_label();
        b.exit(Exit::Branch {
            if_true: body,
            if_false: end,
        });
        b.bind(body);
        b.emit(Op::Const(Value::Int(1)), Range::EMPTY);
        b.emit(Op::Pop, Range::EMPTY);
        b.bind(end);
        let program = finish(b);
        assert_eq!(program.len(), 3);
        assert_eq!(program.compiled_exit(0).unwrap(), &Exit::Branch { if_true: 1, if_false: 2 });
        assert_eq!(program.compiled_exit(1).unwrap(), &Exit::Goto(2));
        assert!(program.validate().is_ok());
    }

    #[test]
    fn ranges_widen_but_keep_start() {
        let mut b = ProgramBuilder::new();
        b.touch(Range::new(3, 5, 3, 8));
        b.touch(Range::new(3, 1, 3, 2));
        b.touch(Range::new(4, 1, 4, 9));
        b.exit(Exit::Return { value: false });
        let program = finish(b);
        assert_eq!(program.steps_single[0].range, Range::new(3, 5, 4, 9));
    }
}
