//! Library classes visible to every Javelin program.
//!
//! The library is described by a static descriptor table. Types are
//! written as source-like strings (`"int"`, `"List<E>"`, `"char[]"`) and
//! resolved when the table is registered into a [`TypeStore`]. Method
//! bodies are [`NativeMethod`] tags; the runtime maps each tag to host
//! behavior in `runtime::native`.

use crate::span::Range;
use crate::types::{
    ClassInfo, ClassKind, FieldInfo, MethodBody, MethodInfo, Prim, TypeId, TypeStore,
};

/// Host-side payload attached to objects of a library class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NativeKind {
    #[default]
    None,
    List,
    Builder,
    Thread,
}

/// Native method implementations, dispatched by `runtime::native::call`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeMethod {
    ObjectInit,
    ObjectToString,
    ObjectEquals,
    ObjectHashCode,

    StrLength,
    StrCharAt,
    StrSubstring,
    StrSubstringRange,
    StrIndexOf,
    StrIndexOfChar,
    StrContains,
    StrEquals,
    StrEqualsIgnoreCase,
    StrCompareTo,
    StrToUpperCase,
    StrToLowerCase,
    StrTrim,
    StrIsEmpty,
    StrStartsWith,
    StrEndsWith,
    StrReplace,
    StrSplit,
    StrToCharArray,
    StrRepeat,
    StrValueOf,

    MathAbsInt,
    MathAbsDouble,
    MathSqrt,
    MathPow,
    MathMaxInt,
    MathMaxDouble,
    MathMinInt,
    MathMinDouble,
    MathRandom,
    MathFloor,
    MathCeil,
    MathRound,
    MathSin,
    MathCos,

    SystemCurrentTimeMillis,
    Println,
    PrintlnEmpty,
    Print,

    IntegerParseInt,
    IntegerToString,
    DoubleParseDouble,
    BooleanParseBoolean,
    /// `intValue()`, `Integer.valueOf(int)` and friends: the argument is the result.
    Identity,
    CharIsDigit,
    CharIsLetter,
    CharIsWhitespace,
    CharToUpperCase,
    CharToLowerCase,

    ListInit,
    ListAdd,
    ListAddAt,
    ListGet,
    ListSet,
    ListSize,
    ListRemoveAt,
    ListIsEmpty,
    ListClear,
    ListContains,
    ListIndexOf,

    BuilderInit,
    BuilderInitWith,
    BuilderAppend,
    BuilderToString,
    BuilderLength,
    BuilderReverse,
    BuilderCharAt,

    ThreadInit,
    ThreadInitWith,
    ThreadStart,
    ThreadRun,
    ThreadSleep,

    InputReadLine,
    InputReadInt,

    ThrowableInit,
    ThrowableInitWith,
    ThrowableGetMessage,
    ThrowableToString,

    EnumName,
    EnumOrdinal,
    EnumValues,
}

/// Initial value of a library static field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    Int(i32),
    Long(i64),
    Double(f64),
    Char(char),
    /// A fresh instance of the named library class, such as `System.out`.
    Instance(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub ty: &'static str,
    pub is_static: bool,
    pub value: Option<Constant>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MethodDescriptor {
    /// `<init>` for constructors.
    pub name: &'static str,
    pub params: &'static [&'static str],
    pub ret: &'static str,
    pub is_static: bool,
    /// `None` for abstract interface methods.
    pub native: Option<NativeMethod>,
    pub stringify: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassDescriptor {
    pub name: &'static str,
    pub kind: ClassKind,
    pub type_params: &'static [&'static str],
    pub superclass: Option<&'static str>,
    pub interfaces: &'static [&'static str],
    pub native: NativeKind,
    pub is_abstract: bool,
    pub is_final: bool,
    pub fields: &'static [FieldDescriptor],
    pub methods: &'static [MethodDescriptor],
}

pub const CONSTRUCTOR: &str = "<init>";

const fn method(
    name: &'static str,
    params: &'static [&'static str],
    ret: &'static str,
    native: NativeMethod,
) -> MethodDescriptor {
    MethodDescriptor {
        name,
        params,
        ret,
        is_static: false,
        native: Some(native),
        stringify: false,
    }
}

const fn static_method(
    name: &'static str,
    params: &'static [&'static str],
    ret: &'static str,
    native: NativeMethod,
) -> MethodDescriptor {
    MethodDescriptor {
        is_static: true,
        ..method(name, params, ret, native)
    }
}

const fn abstract_method(
    name: &'static str,
    params: &'static [&'static str],
    ret: &'static str,
) -> MethodDescriptor {
    MethodDescriptor {
        name,
        params,
        ret,
        is_static: false,
        native: None,
        stringify: false,
    }
}

const fn ctor(params: &'static [&'static str], native: NativeMethod) -> MethodDescriptor {
    method(CONSTRUCTOR, params, "void", native)
}

impl MethodDescriptor {
    const fn stringify(self) -> Self {
        MethodDescriptor {
            stringify: true,
            ..self
        }
    }
}

const fn constant(name: &'static str, ty: &'static str, value: Constant) -> FieldDescriptor {
    FieldDescriptor {
        name,
        ty,
        is_static: true,
        value: Some(value),
    }
}

const CLASS: ClassDescriptor = ClassDescriptor {
    name: "",
    kind: ClassKind::Class,
    type_params: &[],
    superclass: Some("Object"),
    interfaces: &[],
    native: NativeKind::None,
    is_abstract: false,
    is_final: false,
    fields: &[],
    methods: &[],
};

const INTERFACE: ClassDescriptor = ClassDescriptor {
    kind: ClassKind::Interface,
    superclass: None,
    is_abstract: true,
    ..CLASS
};

const EXCEPTION_CTORS: &[MethodDescriptor] = &[
    ctor(&[], NativeMethod::ThrowableInit),
    ctor(&["String"], NativeMethod::ThrowableInitWith),
];

const fn exception(name: &'static str, superclass: &'static str) -> ClassDescriptor {
    ClassDescriptor {
        name,
        superclass: Some(superclass),
        methods: EXCEPTION_CTORS,
        ..CLASS
    }
}

/// The complete library, in registration order. `Object` comes first.
pub const LIBRARY: &[ClassDescriptor] = &[
    ClassDescriptor {
        name: "Object",
        superclass: None,
        methods: &[
            ctor(&[], NativeMethod::ObjectInit),
            method("toString", &[], "String", NativeMethod::ObjectToString),
            method("equals", &["Object"], "boolean", NativeMethod::ObjectEquals),
            method("hashCode", &[], "int", NativeMethod::ObjectHashCode),
        ],
        ..CLASS
    },
    ClassDescriptor {
        name: "Comparable",
        type_params: &["T"],
        methods: &[abstract_method("compareTo", &["T"], "int")],
        ..INTERFACE
    },
    ClassDescriptor {
        name: "String",
        is_final: true,
        interfaces: &["Comparable<String>"],
        methods: &[
            method("length", &[], "int", NativeMethod::StrLength),
            method("charAt", &["int"], "char", NativeMethod::StrCharAt),
            method("substring", &["int"], "String", NativeMethod::StrSubstring),
            method(
                "substring",
                &["int", "int"],
                "String",
                NativeMethod::StrSubstringRange,
            ),
            method("indexOf", &["String"], "int", NativeMethod::StrIndexOf),
            method("indexOf", &["char"], "int", NativeMethod::StrIndexOfChar),
            method("contains", &["String"], "boolean", NativeMethod::StrContains),
            method("equals", &["Object"], "boolean", NativeMethod::StrEquals),
            method(
                "equalsIgnoreCase",
                &["String"],
                "boolean",
                NativeMethod::StrEqualsIgnoreCase,
            ),
            method("compareTo", &["String"], "int", NativeMethod::StrCompareTo),
            method("toUpperCase", &[], "String", NativeMethod::StrToUpperCase),
            method("toLowerCase", &[], "String", NativeMethod::StrToLowerCase),
            method("trim", &[], "String", NativeMethod::StrTrim),
            method("isEmpty", &[], "boolean", NativeMethod::StrIsEmpty),
            method("startsWith", &["String"], "boolean", NativeMethod::StrStartsWith),
            method("endsWith", &["String"], "boolean", NativeMethod::StrEndsWith),
            method(
                "replace",
                &["String", "String"],
                "String",
                NativeMethod::StrReplace,
            ),
            method("split", &["String"], "String[]", NativeMethod::StrSplit),
            method("toCharArray", &[], "char[]", NativeMethod::StrToCharArray),
            method("repeat", &["int"], "String", NativeMethod::StrRepeat),
            static_method("valueOf", &["Object"], "String", NativeMethod::StrValueOf).stringify(),
        ],
        ..CLASS
    },
    ClassDescriptor {
        name: "Math",
        is_final: true,
        fields: &[
            constant("PI", "double", Constant::Double(core::f64::consts::PI)),
            constant("E", "double", Constant::Double(core::f64::consts::E)),
        ],
        methods: &[
            static_method("abs", &["int"], "int", NativeMethod::MathAbsInt),
            static_method("abs", &["double"], "double", NativeMethod::MathAbsDouble),
            static_method("sqrt", &["double"], "double", NativeMethod::MathSqrt),
            static_method("pow", &["double", "double"], "double", NativeMethod::MathPow),
            static_method("max", &["int", "int"], "int", NativeMethod::MathMaxInt),
            static_method(
                "max",
                &["double", "double"],
                "double",
                NativeMethod::MathMaxDouble,
            ),
            static_method("min", &["int", "int"], "int", NativeMethod::MathMinInt),
            static_method(
                "min",
                &["double", "double"],
                "double",
                NativeMethod::MathMinDouble,
            ),
            static_method("random", &[], "double", NativeMethod::MathRandom),
            static_method("floor", &["double"], "double", NativeMethod::MathFloor),
            static_method("ceil", &["double"], "double", NativeMethod::MathCeil),
            static_method("round", &["double"], "long", NativeMethod::MathRound),
            static_method("sin", &["double"], "double", NativeMethod::MathSin),
            static_method("cos", &["double"], "double", NativeMethod::MathCos),
        ],
        ..CLASS
    },
    ClassDescriptor {
        name: "PrintStream",
        methods: &[
            method("println", &[], "void", NativeMethod::PrintlnEmpty),
            method("println", &["Object"], "void", NativeMethod::Println).stringify(),
            method("print", &["Object"], "void", NativeMethod::Print).stringify(),
        ],
        ..CLASS
    },
    ClassDescriptor {
        name: "System",
        is_final: true,
        fields: &[constant(
            "out",
            "PrintStream",
            Constant::Instance("PrintStream"),
        )],
        methods: &[static_method(
            "currentTimeMillis",
            &[],
            "long",
            NativeMethod::SystemCurrentTimeMillis,
        )],
        ..CLASS
    },
    ClassDescriptor {
        name: "Integer",
        is_final: true,
        fields: &[
            constant("MAX_VALUE", "int", Constant::Int(i32::MAX)),
            constant("MIN_VALUE", "int", Constant::Int(i32::MIN)),
        ],
        methods: &[
            static_method("parseInt", &["String"], "int", NativeMethod::IntegerParseInt),
            static_method("valueOf", &["int"], "Integer", NativeMethod::Identity),
            static_method("toString", &["int"], "String", NativeMethod::IntegerToString),
            method("intValue", &[], "int", NativeMethod::Identity),
        ],
        ..CLASS
    },
    ClassDescriptor {
        name: "Long",
        is_final: true,
        fields: &[
            constant("MAX_VALUE", "long", Constant::Long(i64::MAX)),
            constant("MIN_VALUE", "long", Constant::Long(i64::MIN)),
        ],
        methods: &[method("longValue", &[], "long", NativeMethod::Identity)],
        ..CLASS
    },
    ClassDescriptor {
        name: "Double",
        is_final: true,
        fields: &[constant("MAX_VALUE", "double", Constant::Double(f64::MAX))],
        methods: &[
            static_method(
                "parseDouble",
                &["String"],
                "double",
                NativeMethod::DoubleParseDouble,
            ),
            static_method("valueOf", &["double"], "Double", NativeMethod::Identity),
            method("doubleValue", &[], "double", NativeMethod::Identity),
        ],
        ..CLASS
    },
    ClassDescriptor {
        name: "Float",
        is_final: true,
        ..CLASS
    },
    ClassDescriptor {
        name: "Short",
        is_final: true,
        ..CLASS
    },
    ClassDescriptor {
        name: "Byte",
        is_final: true,
        ..CLASS
    },
    ClassDescriptor {
        name: "Boolean",
        is_final: true,
        methods: &[
            static_method(
                "parseBoolean",
                &["String"],
                "boolean",
                NativeMethod::BooleanParseBoolean,
            ),
            method("booleanValue", &[], "boolean", NativeMethod::Identity),
        ],
        ..CLASS
    },
    ClassDescriptor {
        name: "Character",
        is_final: true,
        fields: &[constant("MAX_VALUE", "char", Constant::Char('\u{ffff}'))],
        methods: &[
            static_method("isDigit", &["char"], "boolean", NativeMethod::CharIsDigit),
            static_method("isLetter", &["char"], "boolean", NativeMethod::CharIsLetter),
            static_method(
                "isWhitespace",
                &["char"],
                "boolean",
                NativeMethod::CharIsWhitespace,
            ),
            static_method("toUpperCase", &["char"], "char", NativeMethod::CharToUpperCase),
            static_method("toLowerCase", &["char"], "char", NativeMethod::CharToLowerCase),
            method("charValue", &[], "char", NativeMethod::Identity),
        ],
        ..CLASS
    },
    ClassDescriptor {
        name: "List",
        type_params: &["E"],
        methods: &[
            abstract_method("add", &["E"], "boolean"),
            abstract_method("add", &["int", "E"], "void"),
            abstract_method("get", &["int"], "E"),
            abstract_method("set", &["int", "E"], "E"),
            abstract_method("size", &[], "int"),
            abstract_method("remove", &["int"], "E"),
            abstract_method("isEmpty", &[], "boolean"),
            abstract_method("clear", &[], "void"),
            abstract_method("contains", &["Object"], "boolean"),
            abstract_method("indexOf", &["Object"], "int"),
        ],
        ..INTERFACE
    },
    ClassDescriptor {
        name: "ArrayList",
        type_params: &["E"],
        interfaces: &["List<E>"],
        native: NativeKind::List,
        methods: &[
            ctor(&[], NativeMethod::ListInit),
            method("add", &["E"], "boolean", NativeMethod::ListAdd),
            method("add", &["int", "E"], "void", NativeMethod::ListAddAt),
            method("get", &["int"], "E", NativeMethod::ListGet),
            method("set", &["int", "E"], "E", NativeMethod::ListSet),
            method("size", &[], "int", NativeMethod::ListSize),
            method("remove", &["int"], "E", NativeMethod::ListRemoveAt),
            method("isEmpty", &[], "boolean", NativeMethod::ListIsEmpty),
            method("clear", &[], "void", NativeMethod::ListClear),
            method("contains", &["Object"], "boolean", NativeMethod::ListContains),
            method("indexOf", &["Object"], "int", NativeMethod::ListIndexOf),
        ],
        ..CLASS
    },
    ClassDescriptor {
        name: "StringBuilder",
        is_final: true,
        native: NativeKind::Builder,
        methods: &[
            ctor(&[], NativeMethod::BuilderInit),
            ctor(&["String"], NativeMethod::BuilderInitWith),
            method(
                "append",
                &["Object"],
                "StringBuilder",
                NativeMethod::BuilderAppend,
            )
            .stringify(),
            method("toString", &[], "String", NativeMethod::BuilderToString),
            method("length", &[], "int", NativeMethod::BuilderLength),
            method("reverse", &[], "StringBuilder", NativeMethod::BuilderReverse),
            method("charAt", &["int"], "char", NativeMethod::BuilderCharAt),
        ],
        ..CLASS
    },
    ClassDescriptor {
        name: "Runnable",
        methods: &[abstract_method("run", &[], "void")],
        ..INTERFACE
    },
    ClassDescriptor {
        name: "Supplier",
        type_params: &["T"],
        methods: &[abstract_method("get", &[], "T")],
        ..INTERFACE
    },
    ClassDescriptor {
        name: "Consumer",
        type_params: &["T"],
        methods: &[abstract_method("accept", &["T"], "void")],
        ..INTERFACE
    },
    ClassDescriptor {
        name: "Predicate",
        type_params: &["T"],
        methods: &[abstract_method("test", &["T"], "boolean")],
        ..INTERFACE
    },
    ClassDescriptor {
        name: "Function",
        type_params: &["T", "R"],
        methods: &[abstract_method("apply", &["T"], "R")],
        ..INTERFACE
    },
    ClassDescriptor {
        name: "BiFunction",
        type_params: &["T", "U", "R"],
        methods: &[abstract_method("apply", &["T", "U"], "R")],
        ..INTERFACE
    },
    ClassDescriptor {
        name: "Thread",
        interfaces: &["Runnable"],
        native: NativeKind::Thread,
        methods: &[
            ctor(&[], NativeMethod::ThreadInit),
            ctor(&["Runnable"], NativeMethod::ThreadInitWith),
            method("start", &[], "void", NativeMethod::ThreadStart),
            method("run", &[], "void", NativeMethod::ThreadRun),
            static_method("sleep", &["long"], "void", NativeMethod::ThreadSleep),
        ],
        ..CLASS
    },
    ClassDescriptor {
        name: "Input",
        is_final: true,
        methods: &[
            static_method("readLine", &[], "String", NativeMethod::InputReadLine),
            static_method("readInt", &[], "int", NativeMethod::InputReadInt),
        ],
        ..CLASS
    },
    ClassDescriptor {
        name: "Throwable",
        fields: &[FieldDescriptor {
            name: "message",
            ty: "String",
            is_static: false,
            value: None,
        }],
        methods: &[
            ctor(&[], NativeMethod::ThrowableInit),
            ctor(&["String"], NativeMethod::ThrowableInitWith),
            method("getMessage", &[], "String", NativeMethod::ThrowableGetMessage),
            method("toString", &[], "String", NativeMethod::ThrowableToString),
        ],
        ..CLASS
    },
    exception("Exception", "Throwable"),
    exception("Error", "Throwable"),
    exception("InterruptedException", "Exception"),
    exception("RuntimeException", "Exception"),
    exception("ArithmeticException", "RuntimeException"),
    exception("NullPointerException", "RuntimeException"),
    exception("ClassCastException", "RuntimeException"),
    exception("IllegalArgumentException", "RuntimeException"),
    exception("IllegalStateException", "RuntimeException"),
    exception("IllegalMonitorStateException", "RuntimeException"),
    exception("NumberFormatException", "IllegalArgumentException"),
    exception("IndexOutOfBoundsException", "RuntimeException"),
    exception(
        "ArrayIndexOutOfBoundsException",
        "IndexOutOfBoundsException",
    ),
    exception(
        "StringIndexOutOfBoundsException",
        "IndexOutOfBoundsException",
    ),
    exception("NegativeArraySizeException", "RuntimeException"),
    exception("UnsupportedOperationException", "RuntimeException"),
    ClassDescriptor {
        name: "Enum",
        is_abstract: true,
        fields: &[
            FieldDescriptor {
                name: "name",
                ty: "String",
                is_static: false,
                value: None,
            },
            FieldDescriptor {
                name: "ordinal",
                ty: "int",
                is_static: false,
                value: None,
            },
        ],
        methods: &[
            method("name", &[], "String", NativeMethod::EnumName),
            method("ordinal", &[], "int", NativeMethod::EnumOrdinal),
            method("toString", &[], "String", NativeMethod::EnumName),
        ],
        ..CLASS
    },
];

/// Slot of `Throwable.message`.
pub const MESSAGE_SLOT: usize = 0;
/// Slots of `Enum.name` and `Enum.ordinal`.
pub const ENUM_NAME_SLOT: usize = 0;
pub const ENUM_ORDINAL_SLOT: usize = 1;

/// Look up a library class by its simple name.
///
/// The search is linear over `LIBRARY` because the table is small.
pub fn find_builtin(name: &str) -> Option<&'static ClassDescriptor> {
    LIBRARY.iter().find(|c| c.name == name)
}

/// Register every library class, field and method into `store`.
pub fn register_builtins(store: &mut TypeStore) {
    let mut ids = Vec::with_capacity(LIBRARY.len());
    for desc in LIBRARY {
        let mut info = ClassInfo::new(desc.name, desc.kind);
        info.is_builtin = true;
        info.is_abstract = desc.is_abstract;
        info.is_final = desc.is_final;
        info.native = desc.native;
        ids.push(store.add_class(info));
    }
    let object = store.object();

    for (desc, id) in LIBRARY.iter().zip(&ids) {
        let params: Vec<TypeId> = desc
            .type_params
            .iter()
            .map(|name| store.type_var(*name, object))
            .collect();
        if let Some(class) = store.class_mut(*id) {
            class.type_params = params;
        }
    }

    for (desc, id) in LIBRARY.iter().zip(&ids) {
        let id = *id;
        let params = store.class(id).map(|c| c.type_params.clone()).unwrap_or_default();
        let superclass = desc.superclass.map(|s| parse_type(store, s, &params));
        let interfaces: Vec<TypeId> = desc
            .interfaces
            .iter()
            .map(|s| parse_type(store, s, &params))
            .collect();
        let erased_interfaces: Vec<TypeId> = interfaces.iter().map(|i| store.erase(*i)).collect();
        if let Some(class) = store.class_mut(id) {
            class.superclass = superclass;
            class.super_refs = superclass.into_iter().chain(interfaces).collect();
            class.interfaces = erased_interfaces;
        }
    }

    // Fields need the superclass sizes, which registration order guarantees.
    for (desc, id) in LIBRARY.iter().zip(&ids) {
        let id = *id;
        let params = store.class(id).map(|c| c.type_params.clone()).unwrap_or_default();
        let inherited = store
            .class(id)
            .and_then(|c| c.superclass)
            .and_then(|s| store.class(s))
            .map_or(0, |s| s.instance_size);
        let mut instance_size = inherited;
        let mut static_size = 0;
        for field in desc.fields {
            let ty = parse_type(store, field.ty, &params);
            let slot = if field.is_static {
                static_size += 1;
                static_size - 1
            } else {
                instance_size += 1;
                instance_size - 1
            };
            store.add_field(FieldInfo {
                name: field.name.to_string(),
                owner: id,
                ty,
                is_static: field.is_static,
                is_final: field.is_static,
                slot,
                module: None,
                range: Range::EMPTY,
                decl: None,
            });
        }
        if let Some(class) = store.class_mut(id) {
            class.instance_size = instance_size;
            class.static_size = static_size;
        }

        for m in desc.methods {
            let params_ty: Vec<TypeId> = m
                .params
                .iter()
                .map(|p| parse_type(store, p, &params))
                .collect();
            let ret = parse_type(store, m.ret, &params);
            store.add_method(MethodInfo {
                name: m.name.to_string(),
                owner: id,
                param_names: (0..params_ty.len()).map(|i| format!("arg{i}")).collect(),
                params: params_ty,
                ret,
                is_static: m.is_static,
                is_constructor: m.name == CONSTRUCTOR,
                is_public: true,
                type_params: Vec::new(),
                body: match m.native {
                    Some(native) => MethodBody::Native(native),
                    None => MethodBody::Abstract,
                },
                annotations: Vec::new(),
                module: None,
                range: Range::EMPTY,
                decl: None,
                stringify_args: m.stringify,
            });
        }
    }
}

/// Resolve a descriptor type string such as `List<E>` or `char[]`.
fn parse_type(store: &mut TypeStore, text: &str, params: &[TypeId]) -> TypeId {
    let text = text.trim();
    if let Some(inner) = text.strip_suffix("[]") {
        let elem = parse_type(store, inner, params);
        return store.array_of(elem);
    }
    if let Some(open) = text.find('<') {
        let base = parse_type(store, &text[..open], params);
        let args_text = text[open + 1..].trim_end_matches('>');
        let args = args_text
            .split(',')
            .map(|arg| parse_type(store, arg, params))
            .collect();
        return store.generic(base, args);
    }
    if let Some(prim) = Prim::from_name(text) {
        return store.prim(prim);
    }
    if text == "void" {
        return store.void();
    }
    if let Some(var) = params.iter().find(|p| store.name(**p) == text) {
        return *var;
    }
    store.well_known(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeKind;

    #[test]
    fn find_builtin_by_name() {
        assert!(find_builtin("ArrayList").is_some());
        assert!(find_builtin("Scanner").is_none());
    }

    #[test]
    fn every_descriptor_type_resolves() {
        let mut store = TypeStore::new();
        register_builtins(&mut store);
        for (_, method) in store.methods() {
            assert!(!store.is_error(method.ret), "{}", method.name);
            for p in &method.params {
                assert!(!store.is_error(*p), "{}", method.name);
            }
        }
        for (_, field) in store.fields() {
            assert!(!store.is_error(field.ty), "{}", field.name);
        }
    }

    #[test]
    fn exception_layout_and_hierarchy() {
        let mut store = TypeStore::new();
        register_builtins(&mut store);
        let npe = store.well_known("NullPointerException");
        let throwable = store.well_known("Throwable");
        assert!(store.is_subclass(npe, throwable));
        assert_eq!(store.class(npe).unwrap().instance_size, 1);
        let message = store.find_field(npe, "message").unwrap();
        assert_eq!(store.field(message).slot, MESSAGE_SLOT);
        assert_eq!(store.constructors(npe).len(), 2);
    }

    #[test]
    fn generic_supertypes_are_recorded() {
        let mut store = TypeStore::new();
        register_builtins(&mut store);
        let array_list = store.well_known("ArrayList");
        let refs = &store.class(array_list).unwrap().super_refs;
        assert!(
            refs.iter()
                .any(|r| matches!(store.kind(*r), TypeKind::Generic { .. }))
        );
    }
}
