//! Execution of one step on one thread.
//!
//! A step runs its ops in order and then follows its exit. Exceptions raised
//! by ops or natives unwind through the frame's installed handlers; a frame
//! without a matching handler is popped and the search continues in the
//! caller.

use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::BinaryOp;
use crate::error::CoreError;
use crate::runtime::RuntimeContext;
use crate::runtime::native::{self, NativeOutcome};
use crate::runtime::program::{
    Call, CallTarget, CastTarget, Exit, NumKind, Op, Program, ProgramStore, StepList,
};
use crate::runtime::thread::{ActiveHandler, Completion, Thread, ThreadState, UncaughtException, WaitReason};
use crate::runtime::value::{ArrayObject, Lambda, Value, format_float};
use crate::types::{MethodBody, MethodId, Prim, TypeId, TypeStore};

/// Everything a step may touch besides its thread.
pub(crate) struct Machine<'a> {
    pub types: &'a TypeStore,
    pub programs: &'a ProgramStore,
    pub ctx: &'a mut RuntimeContext,
}

#[derive(Debug)]
pub(crate) enum StepOutcome {
    Continue,
    /// The thread parked itself; the step has completed.
    Waiting(WaitReason),
    /// Start a new thread for this `Thread` object, then continue.
    Spawn(Value),
    /// The bottom frame returned.
    Finished,
    /// An exception escaped every frame; `thread.exception` is set.
    Uncaught,
}

/// Why a step stopped early.
pub(crate) enum Raise {
    Exception(Value),
    Fault(CoreError),
    /// Block the thread and retry the step once it is woken.
    Park(WaitReason),
}

impl From<CoreError> for Raise {
    fn from(err: CoreError) -> Self {
        Raise::Fault(err)
    }
}

pub(crate) type OpResult<T = ()> = Result<T, Raise>;

/// Run the step the thread's top frame points at.
pub(crate) fn step(m: &mut Machine<'_>, thread: &mut Thread) -> Result<StepOutcome, CoreError> {
    let Some(frame) = thread.frames.last() else {
        return Ok(StepOutcome::Finished);
    };
    let program = frame.program.clone();
    let index = frame.step;
    let base = frame.stack_base;
    let step = program
        .step(index, StepList::Single)
        .ok_or_else(|| program.fault(index, "no step at this index".into()))?;
    let exit = program.compiled_exit(index)?.clone();

    for op in step.ops() {
        match exec_op(m, thread, op, base) {
            Ok(()) => {}
            Err(Raise::Exception(exc)) => return throw(m, thread, exc),
            Err(Raise::Fault(err)) => return Err(err),
            Err(Raise::Park(reason)) => return Ok(StepOutcome::Waiting(reason)),
        }
    }

    let result = follow_exit(m, thread, &program, exit);
    match result {
        Ok(outcome) => Ok(outcome),
        Err(Raise::Exception(exc)) => throw(m, thread, exc),
        Err(Raise::Fault(err)) => Err(err),
        Err(Raise::Park(reason)) => Ok(StepOutcome::Waiting(reason)),
    }
}

fn follow_exit(
    m: &mut Machine<'_>,
    thread: &mut Thread,
    program: &Rc<Program>,
    exit: Exit<usize>,
) -> OpResult<StepOutcome> {
    match exit {
        Exit::Goto(target) => {
            set_step(thread, target);
            Ok(StepOutcome::Continue)
        }
        Exit::Branch { if_true, if_false } => {
            let cond = thread.pop().as_bool();
            set_step(thread, if cond { if_true } else { if_false });
            Ok(StepOutcome::Continue)
        }
        Exit::Invoke { call, resume } => {
            set_step(thread, resume);
            invoke(m, thread, call)
        }
        Exit::Return { value } => {
            let value = value.then(|| thread.pop());
            Ok(finish_frame(thread, value))
        }
        Exit::Throw => {
            let exc = thread.pop();
            if exc.is_null() {
                return Err(npe(m, "Cannot throw null"));
            }
            Err(Raise::Exception(exc))
        }
        Exit::Leave {
            target,
            depth,
            value,
        } => {
            let value = value.then(|| thread.pop());
            leave(thread, program, target, depth, value)
        }
        Exit::EndFinally { next } => {
            let completion = thread.top_mut().and_then(|f| f.pending.pop());
            match completion {
                None | Some(Completion::Normal) => {
                    set_step(thread, next);
                    Ok(StepOutcome::Continue)
                }
                Some(Completion::Throw(exc)) => Err(Raise::Exception(exc)),
                Some(Completion::Leave {
                    target,
                    depth,
                    value,
                }) => leave(thread, program, target, depth, value),
            }
        }
    }
}

fn set_step(thread: &mut Thread, index: usize) {
    if let Some(frame) = thread.top_mut() {
        frame.step = index;
    }
}

/// Pop the top frame, handing `value` to the caller.
fn finish_frame(thread: &mut Thread, value: Option<Value>) -> StepOutcome {
    let Some(frame) = thread.frames.pop() else {
        return StepOutcome::Finished;
    };
    let base = frame.stack_base.min(thread.stack.len());
    if thread.frames.is_empty() {
        let end = (base + frame.program.frame.size()).min(thread.stack.len());
        thread.final_locals = thread.stack[base..end].to_vec();
        thread.stack.truncate(base);
        thread.result = value;
        return StepOutcome::Finished;
    }
    thread.stack.truncate(base);
    if let Some(value) = value {
        thread.push(value);
    }
    StepOutcome::Continue
}

/// Unwind handlers down to `depth`, running `finally` blocks on the way,
/// then jump to `target` or return.
fn leave(
    thread: &mut Thread,
    program: &Rc<Program>,
    target: Option<usize>,
    depth: usize,
    value: Option<Value>,
) -> OpResult<StepOutcome> {
    let Thread { frames, stack, .. } = &mut *thread;
    let Some(frame) = frames.last_mut() else {
        return Ok(StepOutcome::Finished);
    };
    while frame.handlers.len() > depth {
        let Some(active) = frame.handlers.pop() else { break };
        let finally = program.handlers.get(active.index).and_then(|h| h.finally);
        if let Some(label) = finally {
            let entry = program.label_target(label)?;
            stack.truncate(active.stack_height);
            frame.pending.truncate(active.pending_len);
            frame.pending.push(Completion::Leave {
                target,
                depth,
                value,
            });
            frame.step = entry;
            return Ok(StepOutcome::Continue);
        }
    }
    match target {
        Some(target) => {
            frame.step = target;
            Ok(StepOutcome::Continue)
        }
        None => Ok(finish_frame(thread, value)),
    }
}

/// Hand `exc` to the innermost matching handler, popping frames that have none.
pub(crate) fn throw(m: &mut Machine<'_>, thread: &mut Thread, exc: Value) -> Result<StepOutcome, CoreError> {
    let trace = thread.trace();
    let origin = thread.top().map(|f| (f.program.module, f.current_range()));
    let class = exc.runtime_class(m.types);

    loop {
        let Thread { frames, stack, .. } = &mut *thread;
        let Some(frame) = frames.last_mut() else { break };
        let program = frame.program.clone();
        while let Some(active) = frame.handlers.pop() {
            let Some(handler) = program.handlers.get(active.index) else { continue };
            let caught = handler.catches.iter().find(|(accepted, _)| {
                class.is_some_and(|c| accepted.iter().any(|t| m.types.is_subclass(c, *t)))
            });
            if let Some((_, label)) = caught {
                let entry = program.label_target(*label)?;
                stack.truncate(active.stack_height);
                frame.pending.truncate(active.pending_len);
                stack.push(exc);
                frame.step = entry;
                return Ok(StepOutcome::Continue);
            }
            if let Some(label) = handler.finally {
                let entry = program.label_target(label)?;
                stack.truncate(active.stack_height);
                frame.pending.truncate(active.pending_len);
                frame.pending.push(Completion::Throw(exc));
                frame.step = entry;
                return Ok(StepOutcome::Continue);
            }
        }
        let base = frame.stack_base;
        frames.pop();
        stack.truncate(base);
    }

    let (module, range) = origin.unwrap_or_default();
    let (class_name, message) = describe_exception(m.types, &exc);
    tracing::debug!(target: "scheduler", thread = thread.id, %class_name, "uncaught exception");
    thread.exception = Some(UncaughtException {
        class_name,
        message,
        module,
        range,
        stack_trace: trace,
    });
    thread.state = ThreadState::TerminatedWithException;
    thread.stack.clear();
    Ok(StepOutcome::Uncaught)
}

fn describe_exception(types: &TypeStore, exc: &Value) -> (String, Option<String>) {
    match exc {
        Value::Object(object) => {
            let message = match object.fields.borrow().get(crate::builtins::MESSAGE_SLOT) {
                Some(Value::Str(text)) => Some(text.to_string()),
                _ => None,
            };
            (types.name(object.class), message)
        }
        other => (other.display(types), None),
    }
}

// ---------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------

pub(crate) fn invoke(m: &mut Machine<'_>, thread: &mut Thread, call: Call) -> OpResult<StepOutcome> {
    let argc = call.argc;
    match call.target {
        CallTarget::Static(method) | CallTarget::Special(method) => call_method(m, thread, method, argc),
        CallTarget::Virtual(method) => {
            let receiver = thread
                .stack
                .len()
                .checked_sub(argc)
                .and_then(|i| thread.stack.get(i))
                .cloned()
                .unwrap_or_default();
            match &receiver {
                Value::Null => {
                    let name = &m.types.method(method).name;
                    Err(npe(m, format!("Cannot invoke \"{name}()\" because value is null")))
                }
                Value::Lambda(lambda) if m.types.method(method).is_abstract() => {
                    enter_lambda(thread, lambda, argc);
                    Ok(StepOutcome::Continue)
                }
                _ => {
                    let target = receiver
                        .runtime_class(m.types)
                        .and_then(|class| m.types.resolve_override(class, method))
                        .unwrap_or(method);
                    call_method(m, thread, target, argc)
                }
            }
        }
        CallTarget::Init(program) => {
            let program = m
                .programs
                .get(program)
                .cloned()
                .ok_or_else(|| missing_program(thread))?;
            thread.enter(program, argc);
            Ok(StepOutcome::Continue)
        }
        CallTarget::Stringify => {
            let value = thread.stack.last().cloned().unwrap_or_default();
            if let Value::Object(object) = &value {
                let object_ty = m.types.object();
                let to_string = m.types.find_methods(object_ty, "toString").first().copied();
                let user = to_string
                    .and_then(|ts| m.types.resolve_override(object.class, ts))
                    .filter(|ts| matches!(m.types.method(*ts).body, MethodBody::Program(_)));
                if let Some(method) = user {
                    return call_method(m, thread, method, 1);
                }
            }
            let text = value.display(m.types);
            thread.pop();
            thread.push(Value::str(text));
            Ok(StepOutcome::Continue)
        }
    }
}

/// Start a virtual call from the host, such as a new thread's `run()`.
pub(crate) fn call_virtual(
    m: &mut Machine<'_>,
    thread: &mut Thread,
    method: MethodId,
    args: Vec<Value>,
) -> Result<StepOutcome, CoreError> {
    let argc = args.len();
    thread.stack.extend(args);
    let call = Call {
        target: CallTarget::Virtual(method),
        argc,
    };
    match invoke(m, thread, call) {
        Ok(outcome) => Ok(outcome),
        Err(Raise::Exception(exc)) => throw(m, thread, exc),
        Err(Raise::Fault(err)) => Err(err),
        Err(Raise::Park(reason)) => Ok(StepOutcome::Waiting(reason)),
    }
}

/// Complete a parked `Input.readLine()`/`readInt()` with `line`.
pub(crate) fn deliver_input(
    m: &mut Machine<'_>,
    thread: &mut Thread,
    line: &str,
    int: bool,
) -> Result<StepOutcome, CoreError> {
    match native::parse_input(m, line, int) {
        NativeOutcome::Throw(exc) => throw(m, thread, exc),
        NativeOutcome::Return(value) => {
            thread.stack.extend(value);
            Ok(StepOutcome::Continue)
        }
        _ => Ok(StepOutcome::Continue),
    }
}

fn missing_program(thread: &Thread) -> Raise {
    let (name, step) = thread
        .top()
        .map_or((String::new(), 0), |f| (f.program.name.clone(), f.step));
    Raise::Fault(CoreError::Internal {
        program: name,
        step,
        message: "call target has no generated program".into(),
    })
}

/// Call `method` with receiver and arguments already on the stack.
pub(crate) fn call_method(
    m: &mut Machine<'_>,
    thread: &mut Thread,
    method: MethodId,
    argc: usize,
) -> OpResult<StepOutcome> {
    let types = m.types;
    let info = types.method(method);
    match &info.body {
        MethodBody::Program(id) => {
            let program = m.programs.get(*id).cloned().ok_or_else(|| missing_program(thread))?;
            thread.enter(program, argc);
            Ok(StepOutcome::Continue)
        }
        MethodBody::Native(native) => {
            let split = thread.stack.len().saturating_sub(argc);
            let args = thread.stack.split_off(split);
            match native::call(m, *native, method, args) {
                NativeOutcome::Return(value) => {
                    if let Some(value) = value {
                        thread.push(value);
                    }
                    Ok(StepOutcome::Continue)
                }
                NativeOutcome::Throw(exc) => Err(Raise::Exception(exc)),
                NativeOutcome::Wait(reason) => Ok(StepOutcome::Waiting(reason)),
                NativeOutcome::Spawn(thread_object) => Ok(StepOutcome::Spawn(thread_object)),
                NativeOutcome::Invoke { method, args } => {
                    let argc = args.len();
                    thread.stack.extend(args);
                    invoke(
                        m,
                        thread,
                        Call {
                            target: CallTarget::Virtual(method),
                            argc,
                        },
                    )
                }
            }
        }
        MethodBody::Abstract => {
            let sig = types.signature(method);
            Err(Raise::Exception(m.ctx.new_exception(
                types,
                "UnsupportedOperationException",
                format!("abstract method {sig} has no implementation"),
            )))
        }
        MethodBody::Pending => Err(missing_program(thread)),
    }
}

/// Replace the lambda receiver by its captures and enter its program.
fn enter_lambda(thread: &mut Thread, lambda: &Rc<Lambda>, argc: usize) {
    let receiver_at = thread.stack.len().saturating_sub(argc);
    if receiver_at < thread.stack.len() {
        thread.stack.remove(receiver_at);
    }
    thread.enter(lambda.program.clone(), argc.saturating_sub(1));
    let base = thread.top().map_or(0, |f| f.stack_base);
    for (slot, value) in lambda.program.captures.iter().zip(&lambda.captures) {
        if let Some(target) = thread.stack.get_mut(base + slot) {
            *target = value.clone();
        }
    }
}

// ---------------------------------------------------------------------
// Ops
// ---------------------------------------------------------------------

fn npe(m: &Machine<'_>, message: impl Into<String>) -> Raise {
    Raise::Exception(m.ctx.new_exception(m.types, "NullPointerException", message))
}

fn raise(m: &Machine<'_>, class: &str, message: impl Into<String>) -> Raise {
    Raise::Exception(m.ctx.new_exception(m.types, class, message))
}

fn exec_op(m: &mut Machine<'_>, thread: &mut Thread, op: &Op, base: usize) -> OpResult {
    match op {
        Op::Const(value) => thread.push(value.clone()),
        Op::Load(slot) => {
            let value = thread.stack.get(base + slot).cloned().unwrap_or_default();
            thread.push(value);
        }
        Op::Store(slot) => {
            let value = thread.pop();
            if let Some(target) = thread.stack.get_mut(base + slot) {
                *target = value;
            }
        }
        Op::Dup => {
            let top = thread.stack.last().cloned().unwrap_or_default();
            thread.push(top);
        }
        Op::Dup2 => {
            let b = thread.pop();
            let a = thread.pop();
            thread.stack.extend([a.clone(), b.clone(), a, b]);
        }
        Op::DupX1 => {
            let b = thread.pop();
            let a = thread.pop();
            thread.stack.extend([b.clone(), a, b]);
        }
        Op::DupX2 => {
            let c = thread.pop();
            let b = thread.pop();
            let a = thread.pop();
            thread.stack.extend([c.clone(), a, b, c]);
        }
        Op::Pop => {
            thread.pop();
        }
        Op::Swap => {
            let len = thread.stack.len();
            if len >= 2 {
                thread.stack.swap(len - 1, len - 2);
            }
        }
        Op::GetField(slot) => {
            let target = thread.pop();
            let Value::Object(object) = target else {
                return Err(npe(m, "Cannot read field because value is null"));
            };
            let value = object.fields.borrow().get(*slot).cloned().unwrap_or_default();
            thread.push(value);
        }
        Op::PutField(slot) => {
            let value = thread.pop();
            let target = thread.pop();
            let Value::Object(object) = target else {
                return Err(npe(m, "Cannot assign field because value is null"));
            };
            if let Some(field) = object.fields.borrow_mut().get_mut(*slot) {
                *field = value;
            }
        }
        Op::GetStatic(class, slot) => {
            let value = m.ctx.get_static(*class, *slot);
            thread.push(value);
        }
        Op::PutStatic(class, slot) => {
            let value = thread.pop();
            m.ctx.put_static(*class, *slot, value);
        }
        Op::ArrayGet => {
            let index = thread.pop().as_int();
            let array = array_operand(m, thread.pop())?;
            let items = array.items.borrow();
            let value = checked_index(m, index, items.len())
                .map(|i| items[i].clone())?;
            drop(items);
            thread.push(value);
        }
        Op::ArrayPut => {
            let value = thread.pop();
            let index = thread.pop().as_int();
            let array = array_operand(m, thread.pop())?;
            let mut items = array.items.borrow_mut();
            let i = checked_index(m, index, items.len())?;
            items[i] = value;
        }
        Op::ArrayLength => {
            let array = array_operand(m, thread.pop())?;
            let len = array.items.borrow().len();
            thread.push(Value::Int(len as i32));
        }
        Op::NewArray {
            dims,
            extra,
            elem_name,
            default,
        } => {
            let split = thread.stack.len().saturating_sub(*dims);
            let lengths: Vec<i32> = thread.stack.split_off(split).iter().map(Value::as_int).collect();
            if let Some(negative) = lengths.iter().find(|l| **l < 0) {
                return Err(raise(m, "NegativeArraySizeException", negative.to_string()));
            }
            let array = new_array(m.ctx, &lengths, *extra, elem_name, default);
            thread.push(array);
        }
        Op::ArrayLiteral { len, elem_name } => {
            let split = thread.stack.len().saturating_sub(*len);
            let items = thread.stack.split_off(split);
            thread.push(make_array(m.ctx, elem_name.clone(), items));
        }
        Op::NewObject(class) => {
            let object = m.ctx.new_object(m.types, *class);
            thread.push(object);
        }
        Op::Binary(op, kind) => {
            let b = thread.pop();
            let a = thread.pop();
            let value = binary(m, *op, *kind, &a, &b)?;
            thread.push(value);
        }
        Op::Neg(kind) => {
            let v = thread.pop();
            thread.push(match kind {
                NumKind::Long => Value::Long(v.as_long().wrapping_neg()),
                NumKind::Float => Value::Double(-v.as_double()),
                NumKind::Double => Value::Double(-v.as_double()),
                _ => Value::Int(v.as_int().wrapping_neg()),
            });
        }
        Op::Not => {
            let v = thread.pop();
            thread.push(Value::Bool(!v.as_bool()));
        }
        Op::BitNot(kind) => {
            let v = thread.pop();
            thread.push(match kind {
                NumKind::Long => Value::Long(!v.as_long()),
                _ => Value::Int(!v.as_int()),
            });
        }
        Op::Convert(prim) => {
            let v = thread.pop();
            thread.push(v.convert(*prim));
        }
        Op::ConvertBelow { depth, to } => {
            let len = thread.stack.len();
            if let Some(slot) = len.checked_sub(depth + 1).and_then(|i| thread.stack.get_mut(i)) {
                if !slot.is_null() {
                    *slot = slot.convert(*to);
                }
            }
        }
        Op::Unbox(prim) => {
            let v = thread.pop();
            if v.is_null() {
                return Err(npe(m, "Cannot unbox null value"));
            }
            thread.push(v.convert(*prim));
        }
        Op::Stringify(prim) => {
            let v = thread.pop();
            let text = match (prim, &v) {
                (Some(Prim::Float), _) => format_float(v.as_double()),
                (Some(Prim::Char), _) => v.as_char().to_string(),
                _ => v.display(m.types),
            };
            thread.push(Value::str(text));
        }
        Op::Concat => {
            let b = thread.pop();
            let a = thread.pop();
            let mut text = a.display(m.types);
            text.push_str(&b.display(m.types));
            thread.push(Value::str(text));
        }
        Op::CheckCast(target) => {
            let v = thread.stack.last().cloned().unwrap_or_default();
            if !v.is_null() && !instance_of(m.types, &v, *target) {
                let from = v.runtime_class(m.types).map(|c| m.types.name(c)).unwrap_or_default();
                let to = match target {
                    CastTarget::Class(c) => m.types.name(*c),
                    CastTarget::Array => "array".into(),
                };
                return Err(raise(
                    m,
                    "ClassCastException",
                    format!("class {from} cannot be cast to class {to}"),
                ));
            }
        }
        Op::InstanceOf(target) => {
            let v = thread.pop();
            let result = !v.is_null() && instance_of(m.types, &v, *target);
            thread.push(Value::Bool(result));
        }
        Op::MakeLambda {
            program,
            interface,
            captures,
        } => {
            let split = thread.stack.len().saturating_sub(*captures);
            let captured = thread.stack.split_off(split);
            thread.push(Value::Lambda(Rc::new(Lambda {
                id: m.ctx.next_id(),
                program: program.clone(),
                interface: *interface,
                captures: captured,
            })));
        }
        Op::TryEnter(index) => {
            let height = thread.stack.len();
            if let Some(frame) = thread.top_mut() {
                let pending_len = frame.pending.len();
                frame.handlers.push(ActiveHandler {
                    index: *index,
                    stack_height: height,
                    pending_len,
                });
            }
        }
        Op::TryExit => {
            if let Some(frame) = thread.top_mut() {
                frame.handlers.pop();
            }
        }
        Op::EnterFinally => {
            if let Some(frame) = thread.top_mut() {
                frame.pending.push(Completion::Normal);
            }
        }
        Op::EnumValues(class) => {
            let values = enum_values(m.types, m.ctx, *class);
            thread.push(values);
        }
        Op::MonitorEnter => {
            let object = monitor_key(m, thread.pop())?;
            if !m.ctx.enter_monitor(object, thread.id) {
                return Err(Raise::Park(WaitReason::Monitor { object }));
            }
        }
        Op::MonitorExit => {
            let object = monitor_key(m, thread.pop())?;
            if !m.ctx.exit_monitor(object, thread.id) {
                return Err(raise(m, "IllegalMonitorStateException", "current thread is not owner"));
            }
        }
    }
    Ok(())
}

/// Key of the monitor guarding `value`; strings lock by content.
fn monitor_key(m: &Machine<'_>, value: Value) -> OpResult<u64> {
    match value {
        Value::Null => Err(npe(m, "Cannot enter synchronized block because value is null")),
        Value::Str(_) => Ok((1 << 32) | u64::from(value.identity())),
        other => Ok(u64::from(other.identity())),
    }
}

fn array_operand(m: &Machine<'_>, value: Value) -> OpResult<Rc<ArrayObject>> {
    match value {
        Value::Array(array) => Ok(array),
        _ => Err(npe(m, "Cannot load from array because value is null")),
    }
}

fn checked_index(m: &Machine<'_>, index: i32, len: usize) -> OpResult<usize> {
    if index < 0 || index as usize >= len {
        return Err(raise(
            m,
            "ArrayIndexOutOfBoundsException",
            format!("Index {index} out of bounds for length {len}"),
        ));
    }
    Ok(index as usize)
}

pub(crate) fn make_array(ctx: &RuntimeContext, elem_name: Rc<str>, items: Vec<Value>) -> Value {
    Value::Array(Rc::new(ArrayObject {
        id: ctx.next_id(),
        elem_name,
        items: RefCell::new(items),
    }))
}

/// Allocate nested arrays for `lengths`; `extra` inner dimensions stay null.
fn new_array(ctx: &RuntimeContext, lengths: &[i32], extra: usize, base: &str, default: &Value) -> Value {
    let Some((first, rest)) = lengths.split_first() else {
        return default.clone();
    };
    let elem_name: Rc<str> = format!("{base}{}", "[]".repeat(rest.len() + extra)).into();
    let items = (0..*first)
        .map(|_| {
            if rest.is_empty() {
                if extra > 0 { Value::Null } else { default.clone() }
            } else {
                new_array(ctx, rest, extra, base, default)
            }
        })
        .collect();
    make_array(ctx, elem_name, items)
}

fn instance_of(types: &TypeStore, value: &Value, target: CastTarget) -> bool {
    match target {
        CastTarget::Array => matches!(value, Value::Array(_)),
        CastTarget::Class(class) => match value {
            Value::Array(_) => class == types.object(),
            Value::Lambda(lambda) => class == types.object() || types.is_subclass(lambda.interface, class),
            other => other
                .runtime_class(types)
                .is_some_and(|c| types.is_subclass(c, class)),
        },
    }
}

/// The constants of enum `class` in declaration order.
pub(crate) fn enum_values(types: &TypeStore, ctx: &RuntimeContext, class: TypeId) -> Value {
    let constants = types
        .class(class)
        .map(|c| c.enum_constants.clone())
        .unwrap_or_default();
    let items = constants
        .iter()
        .map(|f| ctx.get_static(class, types.field(*f).slot))
        .collect();
    make_array(ctx, types.name(class).into(), items)
}

fn binary(m: &Machine<'_>, op: BinaryOp, kind: NumKind, a: &Value, b: &Value) -> OpResult<Value> {
    use BinaryOp::*;
    let value = match kind {
        NumKind::Int => {
            let (x, y) = (a.as_int(), b.as_int());
            match op {
                Add => Value::Int(x.wrapping_add(y)),
                Sub => Value::Int(x.wrapping_sub(y)),
                Mul => Value::Int(x.wrapping_mul(y)),
                Div | Rem if y == 0 => return Err(raise(m, "ArithmeticException", "/ by zero")),
                Div => Value::Int(x.wrapping_div(y)),
                Rem => Value::Int(x.wrapping_rem(y)),
                Shl => Value::Int(x.wrapping_shl(y as u32)),
                Shr => Value::Int(x.wrapping_shr(y as u32)),
                UShr => Value::Int((x as u32).wrapping_shr(y as u32) as i32),
                BitAnd => Value::Int(x & y),
                BitOr => Value::Int(x | y),
                BitXor => Value::Int(x ^ y),
                _ => Value::Bool(compare(op, x.cmp(&y))),
            }
        }
        NumKind::Long => {
            let (x, y) = (a.as_long(), b.as_long());
            match op {
                Add => Value::Long(x.wrapping_add(y)),
                Sub => Value::Long(x.wrapping_sub(y)),
                Mul => Value::Long(x.wrapping_mul(y)),
                Div | Rem if y == 0 => return Err(raise(m, "ArithmeticException", "/ by zero")),
                Div => Value::Long(x.wrapping_div(y)),
                Rem => Value::Long(x.wrapping_rem(y)),
                Shl => Value::Long(x.wrapping_shl(y as u32)),
                Shr => Value::Long(x.wrapping_shr(y as u32)),
                UShr => Value::Long((x as u64).wrapping_shr(y as u32) as i64),
                BitAnd => Value::Long(x & y),
                BitOr => Value::Long(x | y),
                BitXor => Value::Long(x ^ y),
                _ => Value::Bool(compare(op, x.cmp(&y))),
            }
        }
        NumKind::Float | NumKind::Double => {
            let (x, y) = (a.as_double(), b.as_double());
            let result = match op {
                Add => x + y,
                Sub => x - y,
                Mul => x * y,
                Div => x / y,
                Rem => x % y,
                _ => {
                    return Ok(Value::Bool(match x.partial_cmp(&y) {
                        Some(ordering) => compare(op, ordering),
                        None => op == Ne,
                    }));
                }
            };
            if kind == NumKind::Float {
                Value::Double(result as f32 as f64)
            } else {
                Value::Double(result)
            }
        }
        NumKind::Bool => {
            let (x, y) = (a.as_bool(), b.as_bool());
            Value::Bool(match op {
                And | BitAnd => x && y,
                Or | BitOr => x || y,
                BitXor | Ne => x != y,
                _ => x == y,
            })
        }
        NumKind::Ref => Value::Bool(match op {
            Ne => !a.ref_eq(b),
            _ => a.ref_eq(b),
        }),
    };
    Ok(value)
}

fn compare(op: BinaryOp, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        BinaryOp::Eq => ordering == Equal,
        BinaryOp::Ne => ordering != Equal,
        BinaryOp::Lt => ordering == Less,
        BinaryOp::Gt => ordering == Greater,
        BinaryOp::Le => ordering != Greater,
        BinaryOp::Ge => ordering != Less,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::register_builtins;
    use crate::runtime::SharedBuffer;
    use crate::runtime::program::{FrameLayout, Handler, Label, ProgramKind, Step, StepCode};
    use crate::span::Range;

    fn program(steps: Vec<(Vec<Op>, Exit<Label>)>, labels: Vec<usize>, handlers: Vec<Handler>) -> Rc<Program> {
        let mut program = Program::new(
            "test".into(),
            ProgramKind::Lambda,
            None,
            None,
            FrameLayout {
                this_slots: 0,
                parameters: 0,
                locals: 2,
            },
            false,
            Range::EMPTY,
            labels,
        );
        program.handlers = handlers;
        for (index, (ops, exit)) in steps.into_iter().enumerate() {
            let code = Rc::new(StepCode::new(ops, exit));
            let range = Range::new(index as u32 + 1, 1, index as u32 + 1, 5);
            program.steps_single.push(Step::new(index, range, false, code.clone()));
            program.steps_multiple.push(Step::new(index, range, true, code));
        }
        Rc::new(program)
    }

    fn run(program: Rc<Program>) -> (Thread, StepOutcome) {
        let mut types = TypeStore::new();
        register_builtins(&mut types);
        let programs = ProgramStore::new();
        let mut ctx = RuntimeContext::new(&types, Box::new(SharedBuffer::new()));
        let mut m = Machine {
            types: &types,
            programs: &programs,
            ctx: &mut ctx,
        };
        let mut thread = Thread::new(0, "main");
        thread.enter(program, 0);
        for _ in 0..100 {
            let outcome = step(&mut m, &mut thread).unwrap();
            if !matches!(outcome, StepOutcome::Continue) {
                return (thread, outcome);
            }
        }
        panic!("program did not finish");
    }

    #[test]
    fn integer_division_by_zero_is_caught_by_handler() {
        // try { 1 / 0 } catch (ArithmeticException e) { x = 7 } return x
        let mut types = TypeStore::new();
        register_builtins(&mut types);
        let arith = types.well_known("ArithmeticException");
        let handler = Handler {
            catches: vec![(vec![arith], Label(0))],
            finally: None,
        };
        let program = program(
            vec![
                (
                    vec![
                        Op::TryEnter(0),
                        Op::Const(Value::Int(1)),
                        Op::Const(Value::Int(0)),
                        Op::Binary(BinaryOp::Div, NumKind::Int),
                        Op::Pop,
                        Op::TryExit,
                    ],
                    Exit::Goto(Label(1)),
                ),
                (
                    vec![Op::Pop, Op::Const(Value::Int(7)), Op::Store(0)],
                    Exit::Goto(Label(1)),
                ),
                (vec![Op::Load(0)], Exit::Return { value: true }),
            ],
            vec![1, 2],
            vec![handler],
        );
        let (thread, outcome) = run(program);
        assert!(matches!(outcome, StepOutcome::Finished));
        assert!(matches!(thread.result, Some(Value::Int(7))));
    }

    #[test]
    fn return_inside_try_runs_finally_first() {
        // try { return 1 } finally { x = 5 }  => returns 1 after x = 5
        let handler = Handler {
            catches: Vec::new(),
            finally: Some(Label(0)),
        };
        let program = program(
            vec![
                (
                    vec![Op::TryEnter(0), Op::Const(Value::Int(1))],
                    Exit::Leave {
                        target: None,
                        depth: 0,
                        value: true,
                    },
                ),
                (
                    vec![Op::Const(Value::Int(5)), Op::Store(1)],
                    Exit::EndFinally { next: Label(1) },
                ),
                (vec![], Exit::Return { value: false }),
            ],
            vec![1, 2],
            vec![handler],
        );
        let (thread, outcome) = run(program);
        assert!(matches!(outcome, StepOutcome::Finished));
        assert!(matches!(thread.result, Some(Value::Int(1))));
        assert!(matches!(thread.final_locals.get(1), Some(Value::Int(5))));
    }

    #[test]
    fn uncaught_exception_records_origin() {
        let program = program(
            vec![(
                vec![Op::Const(Value::Null), Op::GetField(0)],
                Exit::Return { value: false },
            )],
            vec![],
            vec![],
        );
        let (thread, outcome) = run(program);
        assert!(matches!(outcome, StepOutcome::Uncaught));
        let exc = thread.exception.unwrap();
        assert_eq!(exc.class_name, "NullPointerException");
        assert_eq!(exc.range.start_line, 1);
        assert_eq!(exc.stack_trace.len(), 1);
        assert_eq!(thread.state, ThreadState::TerminatedWithException);
    }

    #[test]
    fn arithmetic_follows_java_rules() {
        let mut types = TypeStore::new();
        register_builtins(&mut types);
        let programs = ProgramStore::new();
        let mut ctx = RuntimeContext::new(&types, Box::new(SharedBuffer::new()));
        let m = Machine {
            types: &types,
            programs: &programs,
            ctx: &mut ctx,
        };
        let wrap = binary(&m, BinaryOp::Add, NumKind::Int, &Value::Int(i32::MAX), &Value::Int(1));
        assert!(matches!(wrap, Ok(Value::Int(i32::MIN))));
        let ushr = binary(&m, BinaryOp::UShr, NumKind::Int, &Value::Int(-1), &Value::Int(28));
        assert!(matches!(ushr, Ok(Value::Int(15))));
        let rem = binary(&m, BinaryOp::Rem, NumKind::Int, &Value::Int(-7), &Value::Int(3));
        assert!(matches!(rem, Ok(Value::Int(-1))));
        let nan = binary(&m, BinaryOp::Ne, NumKind::Double, &Value::Double(f64::NAN), &Value::Double(f64::NAN));
        assert!(matches!(nan, Ok(Value::Bool(true))));
    }
}
