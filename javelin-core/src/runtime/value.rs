//! Runtime values.
//!
//! Boxed wrappers (`Integer`, `Double`, ...) share the representation of
//! their primitive: boxing is free and unboxing only has to check for
//! `null`. `float` values are stored as `Double` and rounded through
//! `f32` whenever they are produced.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::runtime::program::Program;
use crate::types::{Prim, TypeId, TypeStore};

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Char(char),
    Int(i32),
    Long(i64),
    Double(f64),
    Str(Rc<str>),
    Array(Rc<ArrayObject>),
    Object(Rc<Object>),
    Lambda(Rc<Lambda>),
}

#[derive(Debug)]
pub struct ArrayObject {
    pub id: u32,
    pub elem_name: Rc<str>,
    pub items: RefCell<Vec<Value>>,
}

#[derive(Debug)]
pub struct Object {
    pub id: u32,
    pub class: TypeId,
    pub fields: RefCell<Vec<Value>>,
    pub native: RefCell<NativeData>,
}

/// Host state behind library objects.
#[derive(Debug, Clone, Default)]
pub enum NativeData {
    #[default]
    None,
    List(Vec<Value>),
    Builder(String),
    Thread {
        runnable: Option<Value>,
        started: bool,
    },
}

#[derive(Debug)]
pub struct Lambda {
    pub id: u32,
    pub program: Rc<Program>,
    pub interface: TypeId,
    pub captures: Vec<Value>,
}

impl Value {
    pub fn str(text: impl Into<Rc<str>>) -> Value {
        Value::Str(text.into())
    }

    /// Zero value of a field, local or array element of the given type.
    pub fn default_for(prim: Option<Prim>) -> Value {
        match prim {
            None => Value::Null,
            Some(Prim::Boolean) => Value::Bool(false),
            Some(Prim::Char) => Value::Char('\0'),
            Some(Prim::Long) => Value::Long(0),
            Some(Prim::Float) | Some(Prim::Double) => Value::Double(0.0),
            Some(_) => Value::Int(0),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    pub fn as_int(&self) -> i32 {
        match self {
            Value::Int(v) => *v,
            Value::Char(c) => *c as i32,
            Value::Long(v) => *v as i32,
            Value::Double(v) => *v as i32,
            Value::Bool(b) => *b as i32,
            _ => 0,
        }
    }

    pub fn as_long(&self) -> i64 {
        match self {
            Value::Long(v) => *v,
            Value::Double(v) => *v as i64,
            other => other.as_int() as i64,
        }
    }

    pub fn as_double(&self) -> f64 {
        match self {
            Value::Double(v) => *v,
            Value::Long(v) => *v as f64,
            other => other.as_int() as f64,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            Value::Char(c) => *c,
            other => char_from_code(other.as_int()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Primitive conversion with two's complement wrapping and saturating
    /// float-to-integer casts.
    pub fn convert(&self, to: Prim) -> Value {
        match to {
            Prim::Boolean => Value::Bool(self.as_bool()),
            Prim::Byte => Value::Int(self.as_int() as i8 as i32),
            Prim::Short => Value::Int(self.as_int() as i16 as i32),
            Prim::Char => Value::Char(char_from_code(self.as_int() as u16 as i32)),
            Prim::Int => Value::Int(self.as_int()),
            Prim::Long => Value::Long(self.as_long()),
            Prim::Float => Value::Double(self.as_double() as f32 as f64),
            Prim::Double => Value::Double(self.as_double()),
        }
    }

    /// `==` on references: identity, except strings and boxed values compare by content.
    pub fn ref_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Lambda(a), Value::Lambda(b)) => Rc::ptr_eq(a, b),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            _ => false,
        }
    }

    /// Identity used by `hashCode()` and the default `toString()`.
    pub fn identity(&self) -> u32 {
        match self {
            Value::Object(o) => o.id,
            Value::Array(a) => a.id,
            Value::Lambda(l) => l.id,
            Value::Str(s) => string_hash(s) as u32,
            other => other.as_int() as u32,
        }
    }

    /// Class the value belongs to for dispatch, casts and `instanceof`.
    pub fn runtime_class(&self, types: &TypeStore) -> Option<TypeId> {
        let class = match self {
            Value::Null => return None,
            Value::Bool(_) => types.boxed(Prim::Boolean),
            Value::Char(_) => types.boxed(Prim::Char),
            Value::Int(_) => types.boxed(Prim::Int),
            Value::Long(_) => types.boxed(Prim::Long),
            Value::Double(_) => types.boxed(Prim::Double),
            Value::Str(_) => types.string(),
            Value::Array(_) => types.object(),
            Value::Object(o) => o.class,
            Value::Lambda(l) => l.interface,
        };
        Some(class)
    }

    /// Text for values that need no user `toString()` call.
    pub fn display(&self, types: &TypeStore) -> String {
        match self {
            Value::Null => "null".into(),
            Value::Bool(b) => b.to_string(),
            Value::Char(c) => c.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Long(v) => v.to_string(),
            Value::Double(v) => format_double(*v),
            Value::Str(s) => s.to_string(),
            Value::Array(a) => format!("[{}@{:x}", array_prefix(&a.elem_name), a.id),
            Value::Lambda(l) => format!("{}$$Lambda@{:x}", types.name(l.interface), l.id),
            Value::Object(o) => display_object(o, types),
        }
    }
}

fn display_object(object: &Object, types: &TypeStore) -> String {
    let class_name = types.name(object.class);
    match &*object.native.borrow() {
        NativeData::List(items) => {
            let parts: Vec<String> = items.iter().map(|v| v.display(types)).collect();
            return format!("[{}]", parts.join(", "));
        }
        NativeData::Builder(text) => return text.clone(),
        _ => {}
    }
    let throwable = types.well_known("Throwable");
    let enum_base = types.well_known("Enum");
    let fields = object.fields.borrow();
    if types.is_subclass(object.class, enum_base) {
        if let Some(name) = fields.first() {
            return name.display(types);
        }
    }
    if types.is_subclass(object.class, throwable) {
        return match fields.first() {
            Some(Value::Str(message)) => format!("{class_name}: {message}"),
            _ => class_name,
        };
    }
    format!("{class_name}@{:x}", object.id)
}

fn array_prefix(elem_name: &str) -> String {
    match elem_name {
        "int" => "I".into(),
        "long" => "J".into(),
        "double" => "D".into(),
        "float" => "F".into(),
        "char" => "C".into(),
        "boolean" => "Z".into(),
        "byte" => "B".into(),
        "short" => "S".into(),
        other => format!("L{other};"),
    }
}

pub fn char_from_code(code: i32) -> char {
    char::from_u32(code as u32).unwrap_or(char::REPLACEMENT_CHARACTER)
}

pub fn string_hash(text: &str) -> i32 {
    text.encode_utf16()
        .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32))
}

/// Decimal rendering that matches `Double.toString`.
pub fn format_double(v: f64) -> String {
    if v.is_nan() {
        return "NaN".into();
    }
    if v.is_infinite() {
        return if v > 0.0 { "Infinity" } else { "-Infinity" }.into();
    }
    if v == 0.0 {
        return if v.is_sign_negative() { "-0.0" } else { "0.0" }.into();
    }
    let abs = v.abs();
    if (1e-3..1e7).contains(&abs) {
        let text = format!("{v}");
        if text.contains('.') { text } else { format!("{text}.0") }
    } else {
        let text = format!("{v:E}");
        match text.split_once('E') {
            Some((mantissa, exp)) if !mantissa.contains('.') => format!("{mantissa}.0E{exp}"),
            _ => text,
        }
    }
}

/// Decimal rendering that matches `Float.toString`.
pub fn format_float(v: f64) -> String {
    let f = v as f32;
    if !f.is_finite() || f == 0.0 {
        return format_double(f as f64);
    }
    let abs = f.abs();
    if (1e-3..1e7).contains(&abs) {
        let text = format!("{f}");
        if text.contains('.') { text } else { format!("{text}.0") }
    } else {
        let text = format!("{f:E}");
        match text.split_once('E') {
            Some((mantissa, exp)) if !mantissa.contains('.') => format!("{mantissa}.0E{exp}"),
            _ => text,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Char(c) => write!(f, "{c}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Double(v) => f.write_str(&format_double(*v)),
            Value::Str(s) => f.write_str(s),
            Value::Array(a) => write!(f, "{}[{}]", a.elem_name, a.items.borrow().len()),
            Value::Object(o) => write!(f, "object#{}", o.id),
            Value::Lambda(l) => write!(f, "lambda#{}", l.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_render_like_java() {
        assert_eq!(format_double(1.0), "1.0");
        assert_eq!(format_double(0.1), "0.1");
        assert_eq!(format_double(-2.5), "-2.5");
        assert_eq!(format_double(1e10), "1.0E10");
        assert_eq!(format_double(f64::NAN), "NaN");
        assert_eq!(format_float(1.1f32 as f64), "1.1");
    }

    #[test]
    fn conversions_wrap_and_saturate() {
        assert!(matches!(Value::Int(300).convert(Prim::Byte), Value::Int(44)));
        assert!(matches!(Value::Double(3.9).convert(Prim::Int), Value::Int(3)));
        assert!(matches!(
            Value::Double(1e20).convert(Prim::Int),
            Value::Int(i32::MAX)
        ));
        assert!(matches!(Value::Int(65).convert(Prim::Char), Value::Char('A')));
        assert!(matches!(Value::Char('a').convert(Prim::Int), Value::Int(97)));
    }

    #[test]
    fn strings_compare_by_content() {
        let a = Value::str("hi");
        let b = Value::str(String::from("h") + "i");
        assert!(a.ref_eq(&b));
        assert!(!a.ref_eq(&Value::Null));
        assert_eq!(string_hash("hello"), 99162322);
    }
}
