//! Execution of generated programs.
//!
//! [`program`] defines the step IR, [`value`] the runtime values,
//! [`thread`] a thread's stack and frames, `interp` single-step execution,
//! `native` the library methods, and [`scheduler`] the cooperative host
//! loop with breakpoints, stepping and the REPL.
//!
//! All mutable state of a run that is not owned by a thread lives in
//! [`RuntimeContext`]: static fields, object monitors, the output sink,
//! buffered input and the host clock.

pub mod program;
pub mod scheduler;
pub mod thread;
pub mod value;

mod interp;
mod native;

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::io::Write as _;
use std::rc::Rc;

use crate::builtins::{Constant, LIBRARY, MESSAGE_SLOT};
use crate::types::{TypeId, TypeStore};
use thread::ThreadId;
use value::{NativeData, Object, Value};

/// Destination of `System.out`.
pub trait PrintSink {
    fn print(&mut self, text: &str);
}

/// Sink writing straight to the process's stdout.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl PrintSink for StdoutSink {
    fn print(&mut self, text: &str) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

/// In-memory sink; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<String>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        self.0.borrow().clone()
    }

    /// Return and clear everything printed so far.
    pub fn take(&self) -> String {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

impl PrintSink for SharedBuffer {
    fn print(&mut self, text: &str) {
        self.0.borrow_mut().push_str(text);
    }
}

/// Per-run state shared by every thread of one executable.
pub struct RuntimeContext {
    statics: HashMap<TypeId, Vec<Value>>,
    layouts: RefCell<HashMap<TypeId, Rc<[Value]>>>,
    next_id: Cell<u32>,
    output: Box<dyn PrintSink>,
    input: VecDeque<String>,
    /// Held monitors: owner and re-entry count per object.
    monitors: HashMap<u64, (ThreadId, u32)>,
    /// Host time in milliseconds, advanced by the scheduler.
    pub now_ms: f64,
    random_state: u64,
}

impl std::fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("classes_with_statics", &self.statics.len())
            .field("now_ms", &self.now_ms)
            .field("buffered_input", &self.input.len())
            .finish_non_exhaustive()
    }
}

impl RuntimeContext {
    /// Fresh static storage for every class in `types`, with library
    /// constants such as `Math.PI` and `System.out` already in place.
    pub fn new(types: &TypeStore, output: Box<dyn PrintSink>) -> Self {
        let mut ctx = Self {
            statics: HashMap::new(),
            layouts: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
            output,
            input: VecDeque::new(),
            monitors: HashMap::new(),
            now_ms: 0.0,
            random_state: 0x2545_F491_4F6C_DD1D,
        };
        ctx.install_statics(types);
        ctx
    }

    /// Drop all run state but keep the output sink.
    pub fn reset(&mut self, types: &TypeStore) {
        self.statics.clear();
        self.layouts.borrow_mut().clear();
        self.input.clear();
        self.monitors.clear();
        self.install_statics(types);
    }

    /// Whether `thread` could enter the monitor of `object` now.
    pub fn monitor_available(&self, object: u64, thread: ThreadId) -> bool {
        self.monitors.get(&object).is_none_or(|(owner, _)| *owner == thread)
    }

    /// Enter or re-enter the monitor; false if another thread holds it.
    pub fn enter_monitor(&mut self, object: u64, thread: ThreadId) -> bool {
        match self.monitors.get_mut(&object) {
            Some((owner, count)) if *owner == thread => {
                *count += 1;
                true
            }
            Some(_) => false,
            None => {
                self.monitors.insert(object, (thread, 1));
                true
            }
        }
    }

    /// Leave the monitor once; false if `thread` does not hold it.
    pub fn exit_monitor(&mut self, object: u64, thread: ThreadId) -> bool {
        match self.monitors.get_mut(&object) {
            Some((owner, count)) if *owner == thread => {
                *count -= 1;
                if *count == 0 {
                    self.monitors.remove(&object);
                }
                true
            }
            _ => false,
        }
    }

    /// Drop every monitor a finished thread still holds.
    pub fn release_monitors(&mut self, thread: ThreadId) {
        self.monitors.retain(|_, (owner, _)| *owner != thread);
    }

    fn install_statics(&mut self, types: &TypeStore) {
        for (class, info) in types.classes() {
            if info.static_size == 0 {
                continue;
            }
            let mut slots = vec![Value::Null; info.static_size];
            for field in types.static_fields(class) {
                let field = types.field(field);
                if field.owner == class {
                    if let Some(slot) = slots.get_mut(field.slot) {
                        *slot = Value::default_for(types.as_prim(field.ty));
                    }
                }
            }
            self.statics.insert(class, slots);
        }
        for desc in LIBRARY {
            let class = types.well_known(desc.name);
            for field in desc.fields.iter().filter(|f| f.is_static) {
                let Some(id) = types.find_field(class, field.name) else { continue };
                let slot = types.field(id).slot;
                let value = match field.value {
                    Some(Constant::Int(v)) => Value::Int(v),
                    Some(Constant::Long(v)) => Value::Long(v),
                    Some(Constant::Double(v)) => Value::Double(v),
                    Some(Constant::Char(c)) => Value::Char(c),
                    Some(Constant::Instance(name)) => self.new_object(types, types.well_known(name)),
                    None => continue,
                };
                self.put_static(class, slot, value);
            }
        }
    }

    pub fn get_static(&self, class: TypeId, slot: usize) -> Value {
        self.statics
            .get(&class)
            .and_then(|s| s.get(slot))
            .cloned()
            .unwrap_or_default()
    }

    pub fn put_static(&mut self, class: TypeId, slot: usize, value: Value) {
        if let Some(target) = self.statics.get_mut(&class).and_then(|s| s.get_mut(slot)) {
            *target = value;
        }
    }

    pub fn next_id(&self) -> u32 {
        let id = self.next_id.get();
        self.next_id.set(id.wrapping_add(1));
        id
    }

    /// Allocate an instance of `class` with every field at its zero value.
    pub fn new_object(&self, types: &TypeStore, class: TypeId) -> Value {
        let layout = self.layout(types, class);
        let native = match types.native_kind(class) {
            crate::builtins::NativeKind::None => NativeData::None,
            crate::builtins::NativeKind::List => NativeData::List(Vec::new()),
            crate::builtins::NativeKind::Builder => NativeData::Builder(String::new()),
            crate::builtins::NativeKind::Thread => NativeData::Thread {
                runnable: None,
                started: false,
            },
        };
        Value::Object(Rc::new(Object {
            id: self.next_id(),
            class,
            fields: RefCell::new(layout.to_vec()),
            native: RefCell::new(native),
        }))
    }

    fn layout(&self, types: &TypeStore, class: TypeId) -> Rc<[Value]> {
        if let Some(layout) = self.layouts.borrow().get(&class) {
            return layout.clone();
        }
        let size = types.class(class).map_or(0, |c| c.instance_size);
        let mut fields = vec![Value::Null; size];
        for field in types.instance_fields(class) {
            let field = types.field(field);
            if let Some(slot) = fields.get_mut(field.slot) {
                *slot = Value::default_for(types.as_prim(field.ty));
            }
        }
        let layout: Rc<[Value]> = fields.into();
        self.layouts.borrow_mut().insert(class, layout.clone());
        layout
    }

    /// A library exception such as `ArithmeticException` carrying `message`.
    pub fn new_exception(&self, types: &TypeStore, class_name: &str, message: impl Into<String>) -> Value {
        let value = self.new_object(types, types.well_known(class_name));
        if let Value::Object(object) = &value {
            if let Some(slot) = object.fields.borrow_mut().get_mut(MESSAGE_SLOT) {
                *slot = Value::str(message.into());
            }
        }
        value
    }

    pub fn print(&mut self, text: &str) {
        self.output.print(text);
    }

    pub fn push_input(&mut self, line: impl Into<String>) {
        self.input.push_back(line.into());
    }

    pub fn pop_input(&mut self) -> Option<String> {
        self.input.pop_front()
    }

    /// Uniform double in `[0, 1)` from a xorshift generator.
    pub fn random(&mut self) -> f64 {
        let mut x = self.random_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.random_state = x;
        (x >> 11) as f64 / (1u64 << 53) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::register_builtins;

    fn store() -> TypeStore {
        let mut types = TypeStore::new();
        register_builtins(&mut types);
        types
    }

    #[test]
    fn library_constants_are_installed() {
        let types = store();
        let ctx = RuntimeContext::new(&types, Box::new(SharedBuffer::new()));
        let math = types.well_known("Math");
        let pi = types.find_field(math, "PI").unwrap();
        assert!(matches!(
            ctx.get_static(math, types.field(pi).slot),
            Value::Double(v) if v == std::f64::consts::PI
        ));
        let system = types.well_known("System");
        let out = types.find_field(system, "out").unwrap();
        assert!(matches!(ctx.get_static(system, types.field(out).slot), Value::Object(_)));
    }

    #[test]
    fn exceptions_carry_their_message() {
        let types = store();
        let ctx = RuntimeContext::new(&types, Box::new(SharedBuffer::new()));
        let exc = ctx.new_exception(&types, "ArithmeticException", "/ by zero");
        assert_eq!(exc.display(&types), "ArithmeticException: / by zero");
    }

    #[test]
    fn shared_buffer_clones_share_output() {
        let buffer = SharedBuffer::new();
        let mut sink: Box<dyn PrintSink> = Box::new(buffer.clone());
        sink.print("a");
        sink.print("b");
        assert_eq!(buffer.take(), "ab");
        assert_eq!(buffer.contents(), "");
    }
}
