//! Views of a thread for a debugger: its call stack and the variables
//! visible in each frame.

use serde::Serialize;

use crate::executable::Executable;
use crate::runtime::scheduler::Scheduler;
use crate::runtime::thread::{Thread, ThreadId};
use crate::runtime::value::{NativeData, Value};
use crate::span::{ModuleId, Range};
use crate::symbols::SymbolId;
use crate::types::{TypeId, TypeStore};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStackEntry {
    pub name: String,
    pub module: Option<ModuleId>,
    pub step: usize,
    pub range: Range,
    /// Index into the thread's frames; 0 is the bottom frame.
    pub depth: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableView {
    pub name: String,
    pub type_name: String,
    pub value: String,
}

/// Frames of `thread`, innermost first.
pub fn call_stack(thread: &Thread) -> Vec<CallStackEntry> {
    thread
        .frames
        .iter()
        .enumerate()
        .rev()
        .map(|(depth, frame)| CallStackEntry {
            name: frame.program.name.clone(),
            module: frame.program.module,
            step: frame.step,
            range: frame.current_range(),
            depth,
        })
        .collect()
}

/// Symbols in scope where the frame at `depth` currently stands.
pub fn frame_symbols(exe: &Executable, thread: &Thread, depth: usize) -> Vec<SymbolId> {
    let Some(frame) = thread.frames.get(depth) else {
        return Vec::new();
    };
    let Some(root) = frame.program.scope else {
        return Vec::new();
    };
    let position = frame.current_range().start();
    let scope = exe.symbols.innermost_scope(root, position);
    exe.symbols.visible_symbols(scope, position)
}

/// Variables of the frame at `depth`, innermost declarations first.
pub fn frame_variables(exe: &Executable, thread: &Thread, depth: usize) -> Vec<VariableView> {
    let Some(frame) = thread.frames.get(depth) else {
        return Vec::new();
    };
    frame_symbols(exe, thread, depth)
        .into_iter()
        .map(|id| {
            let symbol = exe.symbols.symbol(id);
            let value = thread
                .stack
                .get(frame.stack_base + symbol.slot)
                .cloned()
                .unwrap_or_default();
            VariableView {
                name: symbol.name.clone(),
                type_name: exe.types.name(symbol.ty),
                value: render_value(&exe.types, &value),
            }
        })
        .collect()
}

/// Text for a value in the debugger and REPL. Strings and chars are quoted,
/// arrays and lists show their elements, other objects their fields one
/// level deep.
pub fn render_value(types: &TypeStore, value: &Value) -> String {
    render(types, value, 1)
}

fn render(types: &TypeStore, value: &Value, depth: usize) -> String {
    match value {
        Value::Str(s) => format!("{s:?}"),
        Value::Char(c) => format!("'{c}'"),
        Value::Array(array) => {
            let items = array.items.borrow();
            format!("[{}]", render_items(types, &items, depth))
        }
        Value::Object(object) => {
            if let NativeData::List(items) = &*object.native.borrow() {
                return format!("[{}]", render_items(types, items, depth));
            }
            let fields = types.instance_fields(object.class);
            if depth == 0 || fields.is_empty() || is_library_shaped(types, object.class) {
                return value.display(types);
            }
            let values = object.fields.borrow();
            let parts: Vec<String> = fields
                .iter()
                .map(|id| {
                    let field = types.field(*id);
                    let shown = values
                        .get(field.slot)
                        .map_or_else(|| "null".into(), |v| render(types, v, depth - 1));
                    format!("{} = {shown}", field.name)
                })
                .collect();
            format!("{} {{ {} }}", types.name(object.class), parts.join(", "))
        }
        other => other.display(types),
    }
}

/// Enums and throwables read best through their own text.
fn is_library_shaped(types: &TypeStore, class: TypeId) -> bool {
    types.is_subclass(class, types.well_known("Enum")) || types.is_subclass(class, types.well_known("Throwable"))
}

fn render_items(types: &TypeStore, items: &[Value], depth: usize) -> String {
    items
        .iter()
        .map(|v| render(types, v, depth.saturating_sub(1)))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Scheduler {
    pub fn call_stack(&self, thread: ThreadId) -> Vec<CallStackEntry> {
        self.thread(thread).map(call_stack).unwrap_or_default()
    }

    pub fn variables(&self, thread: ThreadId, depth: usize) -> Vec<VariableView> {
        self.thread(thread)
            .map(|t| frame_variables(self.executable(), t, depth))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_source;
    use crate::repl::ReplTarget;
    use crate::runtime::SharedBuffer;
    use crate::runtime::scheduler::{RunOutcome, SchedulerConfig};

    #[test]
    fn paused_frame_shows_call_stack_and_variables() {
        let source = "public class Main {\n  static int twice(int x) {\n    int y = x * 2;\n    return y;\n  }\n  public static void main(String[] args) {\n    String name = \"jo\";\n    int a = twice(3);\n  }\n}\n";
        let exe = compile_source("Main.java", source);
        let mut s = Scheduler::new(exe, Box::new(SharedBuffer::new()), SchedulerConfig::default());
        s.executable_mut().set_breakpoint(ModuleId(0), 4).unwrap();
        let main = s.start_main().unwrap();
        let summary = s.run_to_completion(1_000).unwrap();
        assert!(matches!(summary.outcome, RunOutcome::Paused(_)));

        let stack = s.call_stack(main);
        assert_eq!(stack.len(), 2);
        assert_eq!(stack[0].depth, 1);
        assert_eq!(stack[0].range.start_line, 4);
        assert_eq!(stack[1].range.start_line, 8);

        let inner = s.variables(main, 1);
        let names: Vec<&str> = inner.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["y", "x"]);
        assert_eq!(inner[0].value, "6");
        assert_eq!(inner[0].type_name, "int");

        let outer = s.variables(main, 0);
        let name = outer.iter().find(|v| v.name == "name").unwrap();
        assert_eq!(name.value, "\"jo\"");

        let repl = s.repl_eval("y", ReplTarget::Paused).unwrap();
        assert_eq!(repl.value.as_deref(), Some(inner[0].value.as_str()));
    }

    #[test]
    fn objects_render_one_level_deep() {
        let source = "public class Main { }\nclass Point { int x; int y; Point next; }\n";
        let exe = compile_source("Main.java", source);
        let mut s = Scheduler::new(exe, Box::new(SharedBuffer::new()), SchedulerConfig::default());
        let outcome = s
            .repl_eval(
                "Point p = new Point(); p.x = 1; p.next = new Point(); p",
                ReplTarget::Standalone,
            )
            .unwrap();
        let text = outcome.value.unwrap();
        assert!(text.starts_with("Point { x = 1, y = 0, next = Point@"), "{text}");
    }
}
