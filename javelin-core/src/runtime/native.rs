//! Host implementations of the library's native methods.
//!
//! Arguments arrive in call order with the receiver first for instance
//! methods. A native either produces a value or asks the interpreter to do
//! something it cannot do itself: throw, park the thread, start a thread or
//! call back into user code.

use crate::builtins::{ENUM_NAME_SLOT, ENUM_ORDINAL_SLOT, MESSAGE_SLOT, NativeMethod};
use crate::runtime::interp::{Machine, enum_values, make_array};
use crate::runtime::thread::WaitReason;
use crate::runtime::value::{NativeData, Value, string_hash};
use crate::types::MethodId;

#[derive(Debug)]
pub(crate) enum NativeOutcome {
    Return(Option<Value>),
    Throw(Value),
    Wait(WaitReason),
    /// `Thread.start()` on this thread object.
    Spawn(Value),
    /// Call `method` virtually with `args` (receiver first).
    Invoke { method: MethodId, args: Vec<Value> },
}

use NativeOutcome::Return;

fn value(v: Value) -> NativeOutcome {
    Return(Some(v))
}

fn unit() -> NativeOutcome {
    Return(None)
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

fn text(args: &[Value], index: usize) -> String {
    args.get(index).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn chars(args: &[Value], index: usize) -> Vec<char> {
    args.get(index)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .chars()
        .collect()
}

fn throw(m: &Machine<'_>, class: &str, message: impl Into<String>) -> NativeOutcome {
    NativeOutcome::Throw(m.ctx.new_exception(m.types, class, message))
}

fn number_format(m: &Machine<'_>, input: &str) -> NativeOutcome {
    throw(m, "NumberFormatException", format!("For input string: \"{input}\""))
}

fn index_error(m: &Machine<'_>, index: i32, len: usize) -> NativeOutcome {
    throw(
        m,
        "IndexOutOfBoundsException",
        format!("Index {index} out of bounds for length {len}"),
    )
}

fn string_index_error(m: &Machine<'_>, message: String) -> NativeOutcome {
    throw(m, "StringIndexOutOfBoundsException", message)
}

fn index_in(index: i32, len: usize) -> Option<usize> {
    usize::try_from(index).ok().filter(|i| *i < len)
}

pub(crate) fn call(
    m: &mut Machine<'_>,
    native: NativeMethod,
    method: MethodId,
    args: Vec<Value>,
) -> NativeOutcome {
    use NativeMethod::*;
    match native {
        ObjectInit => unit(),
        ObjectToString => value(Value::str(arg(&args, 0).display(m.types))),
        ObjectEquals => value(Value::Bool(arg(&args, 0).ref_eq(&arg(&args, 1)))),
        ObjectHashCode => {
            let hash = match &arg(&args, 0) {
                Value::Str(s) => string_hash(s),
                Value::Int(v) => *v,
                Value::Bool(b) => if *b { 1231 } else { 1237 },
                other => other.identity() as i32,
            };
            value(Value::Int(hash))
        }

        StrLength => value(Value::Int(chars(&args, 0).len() as i32)),
        StrCharAt => {
            let s = chars(&args, 0);
            let index = arg(&args, 1).as_int();
            match index_in(index, s.len()) {
                Some(i) => value(Value::Char(s[i])),
                None => string_index_error(m, format!("Index {index} out of bounds for length {}", s.len())),
            }
        }
        StrSubstring | StrSubstringRange => {
            let s = chars(&args, 0);
            let begin = arg(&args, 1).as_int();
            let end = if native == StrSubstring {
                s.len() as i32
            } else {
                arg(&args, 2).as_int()
            };
            if begin < 0 || end > s.len() as i32 || begin > end {
                return string_index_error(
                    m,
                    format!("begin {begin}, end {end}, length {}", s.len()),
                );
            }
            value(Value::str(s[begin as usize..end as usize].iter().collect::<String>()))
        }
        StrIndexOf => {
            let s = text(&args, 0);
            let needle = text(&args, 1);
            let found = s.find(&needle).map_or(-1, |byte| s[..byte].chars().count() as i32);
            value(Value::Int(found))
        }
        StrIndexOfChar => {
            let needle = arg(&args, 1).as_char();
            let found = chars(&args, 0)
                .iter()
                .position(|c| *c == needle)
                .map_or(-1, |i| i as i32);
            value(Value::Int(found))
        }
        StrContains => value(Value::Bool(text(&args, 0).contains(&text(&args, 1)))),
        StrEquals => value(Value::Bool(match (&arg(&args, 0), &arg(&args, 1)) {
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => false,
        })),
        StrEqualsIgnoreCase => {
            let other = arg(&args, 1);
            let equal = other
                .as_str()
                .is_some_and(|b| text(&args, 0).to_lowercase() == b.to_lowercase());
            value(Value::Bool(equal))
        }
        StrCompareTo => {
            let other = arg(&args, 1);
            let Some(b) = other.as_str() else {
                return throw(m, "NullPointerException", "Cannot compare to null");
            };
            let a = chars(&args, 0);
            let b: Vec<char> = b.chars().collect();
            let diff = a
                .iter()
                .zip(&b)
                .find(|(x, y)| x != y)
                .map_or(a.len() as i32 - b.len() as i32, |(x, y)| *x as i32 - *y as i32);
            value(Value::Int(diff))
        }
        StrToUpperCase => value(Value::str(text(&args, 0).to_uppercase())),
        StrToLowerCase => value(Value::str(text(&args, 0).to_lowercase())),
        StrTrim => value(Value::str(text(&args, 0).trim_matches(|c: char| c <= ' '))),
        StrIsEmpty => value(Value::Bool(text(&args, 0).is_empty())),
        StrStartsWith => value(Value::Bool(text(&args, 0).starts_with(&text(&args, 1)))),
        StrEndsWith => value(Value::Bool(text(&args, 0).ends_with(&text(&args, 1)))),
        StrReplace => value(Value::str(text(&args, 0).replace(&text(&args, 1), &text(&args, 2)))),
        StrSplit => {
            let s = text(&args, 0);
            let separator = text(&args, 1);
            let mut parts: Vec<Value> = if separator.is_empty() {
                s.chars().map(|c| Value::str(c.to_string())).collect()
            } else {
                s.split(separator.as_str()).map(Value::str).collect()
            };
            while parts.len() > 1 && parts.last().and_then(Value::as_str) == Some("") {
                parts.pop();
            }
            value(make_array(m.ctx, "String".into(), parts))
        }
        StrToCharArray => {
            let items = chars(&args, 0).into_iter().map(Value::Char).collect();
            value(make_array(m.ctx, "char".into(), items))
        }
        StrRepeat => {
            let count = arg(&args, 1).as_int();
            if count < 0 {
                return throw(m, "IllegalArgumentException", format!("count is negative: {count}"));
            }
            value(Value::str(text(&args, 0).repeat(count as usize)))
        }
        StrValueOf => value(Value::str(arg(&args, 0).display(m.types))),

        MathAbsInt => value(Value::Int(arg(&args, 0).as_int().wrapping_abs())),
        MathAbsDouble => value(Value::Double(arg(&args, 0).as_double().abs())),
        MathSqrt => value(Value::Double(arg(&args, 0).as_double().sqrt())),
        MathPow => value(Value::Double(arg(&args, 0).as_double().powf(arg(&args, 1).as_double()))),
        MathMaxInt => value(Value::Int(arg(&args, 0).as_int().max(arg(&args, 1).as_int()))),
        MathMinInt => value(Value::Int(arg(&args, 0).as_int().min(arg(&args, 1).as_int()))),
        MathMaxDouble => value(Value::Double(arg(&args, 0).as_double().max(arg(&args, 1).as_double()))),
        MathMinDouble => value(Value::Double(arg(&args, 0).as_double().min(arg(&args, 1).as_double()))),
        MathRandom => value(Value::Double(m.ctx.random())),
        MathFloor => value(Value::Double(arg(&args, 0).as_double().floor())),
        MathCeil => value(Value::Double(arg(&args, 0).as_double().ceil())),
        MathRound => value(Value::Long((arg(&args, 0).as_double() + 0.5).floor() as i64)),
        MathSin => value(Value::Double(arg(&args, 0).as_double().sin())),
        MathCos => value(Value::Double(arg(&args, 0).as_double().cos())),

        SystemCurrentTimeMillis => value(Value::Long(m.ctx.now_ms as i64)),
        Println => {
            let mut line = arg(&args, 1).display(m.types);
            line.push('\n');
            m.ctx.print(&line);
            unit()
        }
        PrintlnEmpty => {
            m.ctx.print("\n");
            unit()
        }
        Print => {
            let out = arg(&args, 1).display(m.types);
            m.ctx.print(&out);
            unit()
        }

        IntegerParseInt => {
            let input = text(&args, 0);
            match input.parse::<i32>() {
                Ok(v) => value(Value::Int(v)),
                Err(_) => number_format(m, &input),
            }
        }
        IntegerToString => value(Value::str(arg(&args, 0).as_int().to_string())),
        DoubleParseDouble => {
            let input = text(&args, 0);
            match input.trim().parse::<f64>() {
                Ok(v) => value(Value::Double(v)),
                Err(_) => number_format(m, &input),
            }
        }
        BooleanParseBoolean => value(Value::Bool(text(&args, 0).eq_ignore_ascii_case("true"))),
        Identity => value(arg(&args, 0)),
        CharIsDigit => value(Value::Bool(arg(&args, 0).as_char().is_ascii_digit())),
        CharIsLetter => value(Value::Bool(arg(&args, 0).as_char().is_alphabetic())),
        CharIsWhitespace => value(Value::Bool(arg(&args, 0).as_char().is_whitespace())),
        CharToUpperCase => value(Value::Char(single_char(arg(&args, 0).as_char().to_uppercase()))),
        CharToLowerCase => value(Value::Char(single_char(arg(&args, 0).as_char().to_lowercase()))),

        ListInit | BuilderInit | ThreadInit | ThrowableInit => unit(),
        ListAdd | ListAddAt | ListGet | ListSet | ListSize | ListRemoveAt | ListIsEmpty
        | ListClear | ListContains | ListIndexOf => list(m, native, &args),

        BuilderInitWith | BuilderAppend | BuilderToString | BuilderLength | BuilderReverse
        | BuilderCharAt => builder(m, native, &args),

        ThreadInitWith => {
            if let Value::Object(object) = &arg(&args, 0) {
                *object.native.borrow_mut() = NativeData::Thread {
                    runnable: Some(arg(&args, 1)),
                    started: false,
                };
            }
            unit()
        }
        ThreadStart => {
            let receiver = arg(&args, 0);
            let Value::Object(object) = &receiver else { return unit() };
            let already = match &mut *object.native.borrow_mut() {
                NativeData::Thread { started, .. } => std::mem::replace(started, true),
                _ => return unit(),
            };
            if already {
                throw(m, "IllegalStateException", "Thread already started")
            } else {
                NativeOutcome::Spawn(receiver.clone())
            }
        }
        ThreadRun => {
            let runnable = match &arg(&args, 0) {
                Value::Object(object) => match &*object.native.borrow() {
                    NativeData::Thread { runnable, .. } => runnable.clone(),
                    _ => None,
                },
                _ => None,
            };
            let run = m
                .types
                .find_methods(m.types.well_known("Runnable"), "run")
                .first()
                .copied();
            match (runnable, run) {
                (Some(target), Some(method)) if !target.is_null() => NativeOutcome::Invoke {
                    method,
                    args: vec![target],
                },
                _ => unit(),
            }
        }
        ThreadSleep => {
            let ms = arg(&args, 0).as_long();
            if ms < 0 {
                return throw(m, "IllegalArgumentException", "timeout value is negative");
            }
            NativeOutcome::Wait(WaitReason::Sleep {
                until_ms: m.ctx.now_ms + ms as f64,
            })
        }

        InputReadLine => match m.ctx.pop_input() {
            Some(line) => value(Value::str(line)),
            None => NativeOutcome::Wait(WaitReason::Input { int: false }),
        },
        InputReadInt => match m.ctx.pop_input() {
            Some(line) => parse_input(m, &line, true),
            None => NativeOutcome::Wait(WaitReason::Input { int: true }),
        },

        ThrowableInitWith => {
            set_field(&arg(&args, 0), MESSAGE_SLOT, arg(&args, 1));
            unit()
        }
        ThrowableGetMessage => value(get_field(&arg(&args, 0), MESSAGE_SLOT)),
        ThrowableToString => value(Value::str(arg(&args, 0).display(m.types))),

        EnumName => value(get_field(&arg(&args, 0), ENUM_NAME_SLOT)),
        EnumOrdinal => value(get_field(&arg(&args, 0), ENUM_ORDINAL_SLOT)),
        EnumValues => {
            let class = m.types.method(method).owner;
            value(enum_values(m.types, m.ctx, class))
        }
    }
}

/// Turn one line of host input into the value a parked read returns.
pub(crate) fn parse_input(m: &Machine<'_>, line: &str, int: bool) -> NativeOutcome {
    if !int {
        return value(Value::str(line));
    }
    match line.trim().parse::<i32>() {
        Ok(v) => value(Value::Int(v)),
        Err(_) => number_format(m, line.trim()),
    }
}

fn single_char(mut mapped: impl Iterator<Item = char>) -> char {
    mapped.next().unwrap_or_default()
}

fn get_field(target: &Value, slot: usize) -> Value {
    match target {
        Value::Object(object) => object.fields.borrow().get(slot).cloned().unwrap_or_default(),
        _ => Value::Null,
    }
}

fn set_field(target: &Value, slot: usize, v: Value) {
    if let Value::Object(object) = target {
        if let Some(field) = object.fields.borrow_mut().get_mut(slot) {
            *field = v;
        }
    }
}

fn list(m: &Machine<'_>, native: NativeMethod, args: &[Value]) -> NativeOutcome {
    use NativeMethod::*;
    let Value::Object(object) = arg(args, 0) else { return unit() };
    let mut data = object.native.borrow_mut();
    let NativeData::List(items) = &mut *data else { return unit() };
    let len = items.len();
    match native {
        ListAdd => {
            items.push(arg(args, 1));
            value(Value::Bool(true))
        }
        ListAddAt => {
            let index = arg(args, 1).as_int();
            if index < 0 || index as usize > len {
                return index_error(m, index, len);
            }
            items.insert(index as usize, arg(args, 2));
            unit()
        }
        ListGet => {
            let index = arg(args, 1).as_int();
            match index_in(index, len) {
                Some(i) => value(items[i].clone()),
                None => index_error(m, index, len),
            }
        }
        ListSet => {
            let index = arg(args, 1).as_int();
            match index_in(index, len) {
                Some(i) => value(std::mem::replace(&mut items[i], arg(args, 2))),
                None => index_error(m, index, len),
            }
        }
        ListRemoveAt => {
            let index = arg(args, 1).as_int();
            match index_in(index, len) {
                Some(i) => value(items.remove(i)),
                None => index_error(m, index, len),
            }
        }
        ListSize => value(Value::Int(len as i32)),
        ListIsEmpty => value(Value::Bool(len == 0)),
        ListClear => {
            items.clear();
            unit()
        }
        ListContains => {
            let needle = arg(args, 1);
            value(Value::Bool(items.iter().any(|v| v.ref_eq(&needle))))
        }
        ListIndexOf => {
            let needle = arg(args, 1);
            let found = items.iter().position(|v| v.ref_eq(&needle));
            value(Value::Int(found.map_or(-1, |i| i as i32)))
        }
        _ => unit(),
    }
}

fn builder(m: &Machine<'_>, native: NativeMethod, args: &[Value]) -> NativeOutcome {
    use NativeMethod::*;
    let receiver = arg(args, 0);
    let Value::Object(object) = &receiver else { return unit() };
    let mut data = object.native.borrow_mut();
    let NativeData::Builder(buffer) = &mut *data else { return unit() };
    match native {
        BuilderInitWith => {
            buffer.push_str(arg(args, 1).as_str().unwrap_or("null"));
            unit()
        }
        BuilderAppend => {
            buffer.push_str(&arg(args, 1).display(m.types));
            drop(data);
            value(receiver.clone())
        }
        BuilderToString => value(Value::str(buffer.as_str())),
        BuilderLength => value(Value::Int(buffer.chars().count() as i32)),
        BuilderReverse => {
            *buffer = buffer.chars().rev().collect();
            drop(data);
            value(receiver.clone())
        }
        BuilderCharAt => {
            let index = arg(args, 1).as_int();
            let chars: Vec<char> = buffer.chars().collect();
            match index_in(index, chars.len()) {
                Some(i) => value(Value::Char(chars[i])),
                None => string_index_error(
                    m,
                    format!("index {index},length {}", chars.len()),
                ),
            }
        }
        _ => unit(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::register_builtins;
    use crate::runtime::program::ProgramStore;
    use crate::runtime::{RuntimeContext, SharedBuffer};
    use crate::types::TypeStore;

    fn with_machine(f: impl FnOnce(&mut Machine<'_>, &TypeStore)) -> String {
        let mut types = TypeStore::new();
        register_builtins(&mut types);
        let programs = ProgramStore::new();
        let buffer = SharedBuffer::new();
        let mut ctx = RuntimeContext::new(&types, Box::new(buffer.clone()));
        let mut m = Machine {
            types: &types,
            programs: &programs,
            ctx: &mut ctx,
        };
        f(&mut m, &types);
        buffer.take()
    }

    fn any_method(types: &TypeStore) -> MethodId {
        types.find_methods(types.object(), "toString")[0]
    }

    fn returned(outcome: NativeOutcome) -> Value {
        match outcome {
            Return(Some(v)) => v,
            other => panic!("expected a value, got {other:?}"),
        }
    }

    #[test]
    fn string_methods_use_char_indices() {
        with_machine(|m, types| {
            let id = any_method(types);
            let s = Value::str("héllo");
            let sub = returned(call(m, NativeMethod::StrSubstringRange, id, vec![s.clone(), Value::Int(1), Value::Int(3)]));
            assert_eq!(sub.as_str(), Some("él"));
            let at = call(m, NativeMethod::StrCharAt, id, vec![s, Value::Int(9)]);
            assert!(matches!(at, NativeOutcome::Throw(_)));
        });
    }

    #[test]
    fn split_drops_trailing_empty_strings() {
        with_machine(|m, types| {
            let id = any_method(types);
            let parts = returned(call(m, NativeMethod::StrSplit, id, vec![Value::str("a,b,,"), Value::str(",")]));
            let Value::Array(array) = parts else { panic!("not an array") };
            assert_eq!(array.items.borrow().len(), 2);
        });
    }

    #[test]
    fn println_writes_to_the_sink() {
        let out = with_machine(|m, types| {
            let id = any_method(types);
            call(m, NativeMethod::Println, id, vec![Value::Null, Value::Int(3)]);
            call(m, NativeMethod::Print, id, vec![Value::Null, Value::str("x")]);
        });
        assert_eq!(out, "3\nx");
    }

    #[test]
    fn read_waits_without_input_and_parses_buffered_lines() {
        with_machine(|m, types| {
            let id = any_method(types);
            assert!(matches!(
                call(m, NativeMethod::InputReadInt, id, Vec::new()),
                NativeOutcome::Wait(WaitReason::Input { int: true })
            ));
            m.ctx.push_input(" 42 ");
            assert!(matches!(
                returned(call(m, NativeMethod::InputReadInt, id, Vec::new())),
                Value::Int(42)
            ));
            m.ctx.push_input("abc");
            assert!(matches!(
                call(m, NativeMethod::InputReadInt, id, Vec::new()),
                NativeOutcome::Throw(_)
            ));
        });
    }

    #[test]
    fn list_bounds_are_checked() {
        with_machine(|m, types| {
            let id = any_method(types);
            let list = m.ctx.new_object(types, types.well_known("ArrayList"));
            call(m, NativeMethod::ListAdd, id, vec![list.clone(), Value::Int(5)]);
            let got = returned(call(m, NativeMethod::ListGet, id, vec![list.clone(), Value::Int(0)]));
            assert!(matches!(got, Value::Int(5)));
            let missing = call(m, NativeMethod::ListGet, id, vec![list, Value::Int(1)]);
            assert!(matches!(missing, NativeOutcome::Throw(_)));
        });
    }

    #[test]
    fn thread_can_only_start_once() {
        with_machine(|m, types| {
            let id = any_method(types);
            let thread = m.ctx.new_object(types, types.well_known("Thread"));
            assert!(matches!(
                call(m, NativeMethod::ThreadStart, id, vec![thread.clone()]),
                NativeOutcome::Spawn(_)
            ));
            assert!(matches!(
                call(m, NativeMethod::ThreadStart, id, vec![thread]),
                NativeOutcome::Throw(_)
            ));
        });
    }
}
