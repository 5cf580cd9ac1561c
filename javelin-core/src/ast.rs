//! Syntax tree for Javelin sources.
//!
//! Nodes live in one arena per module and refer to each other by
//! [`NodeId`]. Every node records its source range and the id of its
//! parent; the parent link is filled in when the parent is allocated, so
//! builders always create children first.

use core::fmt::Write as _;

use crate::span::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub range: Range,
    pub parent: Option<NodeId>,
}

/// A (possibly generic, possibly array) type as written in source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeExpr {
    /// Dotted name, e.g. `int`, `String`, `Outer.Inner`, or `var`.
    pub name: String,
    pub args: Vec<TypeExpr>,
    pub dims: usize,
    pub range: Range,
}

impl TypeExpr {
    pub fn named(name: impl Into<String>, range: Range) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            dims: 0,
            range,
        }
    }

    pub fn is_var(&self) -> bool {
        self.name == "var" && self.args.is_empty() && self.dims == 0
    }
}

impl core::fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.name)?;
        if !self.args.is_empty() {
            f.write_char('<')?;
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{arg}")?;
            }
            f.write_char('>')?;
        }
        for _ in 0..self.dims {
            f.write_str("[]")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub name: String,
    pub range: Range,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub is_public: bool,
    pub is_private: bool,
    pub is_protected: bool,
    pub is_static: bool,
    pub is_final: bool,
    pub is_abstract: bool,
    pub is_default: bool,
    pub annotations: Vec<Annotation>,
}

impl Modifiers {
    pub fn has_annotation(&self, name: &str) -> bool {
        self.annotations.iter().any(|a| a.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeDeclKind {
    Class,
    Interface,
    Enum,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeParam {
    pub name: String,
    pub bound: Option<TypeExpr>,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub kind: TypeDeclKind,
    pub name: String,
    pub name_range: Range,
    pub modifiers: Modifiers,
    pub type_params: Vec<TypeParam>,
    /// Superclass for classes; super-interfaces for interfaces.
    pub extends: Vec<TypeExpr>,
    pub implements: Vec<TypeExpr>,
    pub enum_constants: Vec<NodeId>,
    pub members: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub name_range: Range,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub modifiers: Modifiers,
    pub type_params: Vec<TypeParam>,
    /// `None` for constructors.
    pub return_type: Option<TypeExpr>,
    pub name: String,
    pub name_range: Range,
    pub params: Vec<Param>,
    pub body: Option<NodeId>,
}

impl MethodDecl {
    pub fn is_constructor(&self) -> bool {
        self.return_type.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDeclarator {
    pub name: String,
    pub name_range: Range,
    pub init: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    /// Empty for `default`.
    pub labels: Vec<NodeId>,
    pub label_range: Range,
    pub body: Vec<NodeId>,
}

impl SwitchCase {
    pub fn is_default(&self) -> bool {
        self.labels.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub types: Vec<TypeExpr>,
    pub name: String,
    pub name_range: Range,
    pub body: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LambdaParam {
    pub name: String,
    pub name_range: Range,
    pub ty: Option<TypeExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Long(i64),
    Float(f64),
    Double(f64),
    Char(char),
    Str(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    UShr,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::UShr => ">>>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    // Declarations
    CompilationUnit {
        types: Vec<NodeId>,
        statements: Vec<NodeId>,
    },
    TypeDecl(TypeDecl),
    EnumConstant {
        name: String,
        args: Vec<NodeId>,
    },
    Field {
        modifiers: Modifiers,
        ty: TypeExpr,
        name: String,
        name_range: Range,
        init: Option<NodeId>,
    },
    Method(MethodDecl),
    Initializer {
        is_static: bool,
        body: NodeId,
    },

    // Statements
    Block(Vec<NodeId>),
    LocalVar {
        ty: TypeExpr,
        vars: Vec<VarDeclarator>,
    },
    ExprStmt(NodeId),
    If {
        cond: NodeId,
        then: NodeId,
        otherwise: Option<NodeId>,
    },
    While {
        cond: NodeId,
        body: NodeId,
    },
    DoWhile {
        body: NodeId,
        cond: NodeId,
    },
    For {
        init: Vec<NodeId>,
        cond: Option<NodeId>,
        update: Vec<NodeId>,
        body: NodeId,
    },
    ForEach {
        ty: TypeExpr,
        name: String,
        name_range: Range,
        iterable: NodeId,
        body: NodeId,
    },
    Switch {
        selector: NodeId,
        cases: Vec<SwitchCase>,
    },
    Break(Option<String>),
    Continue(Option<String>),
    Labeled {
        label: String,
        body: NodeId,
    },
    Return(Option<NodeId>),
    Throw(NodeId),
    Try {
        body: NodeId,
        catches: Vec<CatchClause>,
        finally: Option<NodeId>,
    },
    Synchronized {
        lock: NodeId,
        body: NodeId,
    },
    /// `this(...)` or `super(...)` as the first statement of a constructor.
    CtorCall {
        is_super: bool,
        args: Vec<NodeId>,
    },
    Empty,

    // Expressions
    Literal(Literal),
    Name(String),
    FieldAccess {
        target: NodeId,
        name: String,
        name_range: Range,
    },
    ArrayAccess {
        array: NodeId,
        index: NodeId,
    },
    Call {
        target: Option<NodeId>,
        name: String,
        name_range: Range,
        args: Vec<NodeId>,
    },
    New {
        ty: TypeExpr,
        args: Vec<NodeId>,
        /// Members of an anonymous class body.
        body: Option<Vec<NodeId>>,
    },
    NewArray {
        elem: TypeExpr,
        dims: Vec<NodeId>,
        extra_dims: usize,
        init: Option<NodeId>,
    },
    ArrayInit(Vec<NodeId>),
    Assign {
        op: Option<BinaryOp>,
        target: NodeId,
        value: NodeId,
    },
    Unary {
        op: UnaryOp,
        operand: NodeId,
    },
    Binary {
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    },
    Conditional {
        cond: NodeId,
        then: NodeId,
        otherwise: NodeId,
    },
    InstanceOf {
        expr: NodeId,
        ty: TypeExpr,
    },
    Cast {
        ty: TypeExpr,
        expr: NodeId,
    },
    This,
    Super,
    Lambda {
        params: Vec<LambdaParam>,
        body: NodeId,
    },
    Error,
}

impl NodeKind {
    /// Direct children in source order.
    pub fn children(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        match self {
            NodeKind::CompilationUnit { types, statements } => {
                out.extend(types);
                out.extend(statements);
            }
            NodeKind::TypeDecl(decl) => {
                out.extend(&decl.enum_constants);
                out.extend(&decl.members);
            }
            NodeKind::EnumConstant { args, .. } => out.extend(args),
            NodeKind::Field { init, .. } => out.extend(init),
            NodeKind::Method(method) => out.extend(method.body),
            NodeKind::Initializer { body, .. } => out.push(*body),
            NodeKind::Block(stmts) => out.extend(stmts),
            NodeKind::LocalVar { vars, .. } => out.extend(vars.iter().filter_map(|v| v.init)),
            NodeKind::ExprStmt(expr) | NodeKind::Throw(expr) => out.push(*expr),
            NodeKind::If {
                cond,
                then,
                otherwise,
            } => {
                out.push(*cond);
                out.push(*then);
                out.extend(otherwise);
            }
            NodeKind::While { cond, body } => out.extend([*cond, *body]),
            NodeKind::DoWhile { body, cond } => out.extend([*body, *cond]),
            NodeKind::For {
                init,
                cond,
                update,
                body,
            } => {
                out.extend(init);
                out.extend(cond);
                out.extend(update);
                out.push(*body);
            }
            NodeKind::ForEach { iterable, body, .. } => out.extend([*iterable, *body]),
            NodeKind::Switch { selector, cases } => {
                out.push(*selector);
                for case in cases {
                    out.extend(&case.labels);
                    out.extend(&case.body);
                }
            }
            NodeKind::Labeled { body, .. } => out.push(*body),
            NodeKind::Return(value) => out.extend(value),
            NodeKind::Try {
                body,
                catches,
                finally,
            } => {
                out.push(*body);
                out.extend(catches.iter().map(|c| c.body));
                out.extend(finally);
            }
            NodeKind::Synchronized { lock, body } => out.extend([*lock, *body]),
            NodeKind::CtorCall { args, .. } => out.extend(args),
            NodeKind::FieldAccess { target, .. } => out.push(*target),
            NodeKind::ArrayAccess { array, index } => out.extend([*array, *index]),
            NodeKind::Call { target, args, .. } => {
                out.extend(target);
                out.extend(args);
            }
            NodeKind::New { args, body, .. } => {
                out.extend(args);
                if let Some(members) = body {
                    out.extend(members);
                }
            }
            NodeKind::NewArray { dims, init, .. } => {
                out.extend(dims);
                out.extend(init);
            }
            NodeKind::ArrayInit(items) => out.extend(items),
            NodeKind::Assign { target, value, .. } => out.extend([*target, *value]),
            NodeKind::Unary { operand, .. } => out.push(*operand),
            NodeKind::Binary { left, right, .. } => out.extend([*left, *right]),
            NodeKind::Conditional {
                cond,
                then,
                otherwise,
            } => out.extend([*cond, *then, *otherwise]),
            NodeKind::InstanceOf { expr, .. } | NodeKind::Cast { expr, .. } => out.push(*expr),
            NodeKind::Lambda { body, .. } => out.push(*body),
            NodeKind::Break(_)
            | NodeKind::Continue(_)
            | NodeKind::Empty
            | NodeKind::Literal(_)
            | NodeKind::Name(_)
            | NodeKind::This
            | NodeKind::Super
            | NodeKind::Error => {}
        }
        out
    }

    fn label(&self) -> String {
        match self {
            NodeKind::CompilationUnit { .. } => "CompilationUnit".into(),
            NodeKind::TypeDecl(decl) => format!("{:?} {}", decl.kind, decl.name),
            NodeKind::EnumConstant { name, .. } => format!("EnumConstant {name}"),
            NodeKind::Field { ty, name, .. } => format!("Field {ty} {name}"),
            NodeKind::Method(method) => match &method.return_type {
                Some(ret) => format!("Method {ret} {}", method.name),
                None => format!("Constructor {}", method.name),
            },
            NodeKind::Initializer { is_static, .. } => {
                if *is_static {
                    "StaticInitializer".into()
                } else {
                    "Initializer".into()
                }
            }
            NodeKind::LocalVar { ty, vars } => {
                let names: Vec<&str> = vars.iter().map(|v| v.name.as_str()).collect();
                format!("LocalVar {ty} {}", names.join(", "))
            }
            NodeKind::ForEach { ty, name, .. } => format!("ForEach {ty} {name}"),
            NodeKind::Break(Some(label)) => format!("Break {label}"),
            NodeKind::Continue(Some(label)) => format!("Continue {label}"),
            NodeKind::Labeled { label, .. } => format!("Labeled {label}"),
            NodeKind::Literal(lit) => format!("Literal {lit:?}"),
            NodeKind::Name(name) => format!("Name {name}"),
            NodeKind::FieldAccess { name, .. } => format!("FieldAccess .{name}"),
            NodeKind::Call { name, .. } => format!("Call {name}"),
            NodeKind::New { ty, .. } => format!("New {ty}"),
            NodeKind::NewArray { elem, .. } => format!("NewArray {elem}"),
            NodeKind::Assign { op: Some(op), .. } => format!("Assign {}=", op.symbol()),
            NodeKind::Unary { op, .. } => format!("Unary {op:?}"),
            NodeKind::Binary { op, .. } => format!("Binary {}", op.symbol()),
            NodeKind::InstanceOf { ty, .. } => format!("InstanceOf {ty}"),
            NodeKind::Cast { ty, .. } => format!("Cast {ty}"),
            NodeKind::CtorCall { is_super, .. } => {
                if *is_super {
                    "SuperCall".into()
                } else {
                    "ThisCall".into()
                }
            }
            other => {
                let debug = format!("{other:?}");
                debug
                    .split(|c: char| !c.is_alphanumeric())
                    .next()
                    .unwrap_or_default()
                    .to_string()
            }
        }
    }
}

/// Node arena for one module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ast {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a node and adopt its children.
    pub fn alloc(&mut self, kind: NodeKind, range: Range) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        for child in kind.children() {
            self.nodes[child.index()].parent = Some(id);
        }
        self.nodes.push(Node {
            kind,
            range,
            parent: None,
        });
        id
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub fn range(&self, id: NodeId) -> Range {
        self.nodes[id.index()].range
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(|i| NodeId(i as u32))
    }

    /// Indented outline of the tree below `id`.
    pub fn dump(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.dump_into(id, 0, &mut out);
        out
    }

    fn dump_into(&self, id: NodeId, depth: usize, out: &mut String) {
        let node = self.node(id);
        let _ = writeln!(
            out,
            "{:indent$}{} @{}",
            "",
            node.kind.label(),
            node.range,
            indent = depth * 2
        );
        for child in node.kind.children() {
            self.dump_into(child, depth + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_links_children_to_parent() {
        let mut ast = Ast::new();
        let one = ast.alloc(NodeKind::Literal(Literal::Int(1)), Range::new(1, 1, 1, 2));
        let two = ast.alloc(NodeKind::Literal(Literal::Int(2)), Range::new(1, 5, 1, 6));
        let sum = ast.alloc(
            NodeKind::Binary {
                op: BinaryOp::Add,
                left: one,
                right: two,
            },
            Range::new(1, 1, 1, 6),
        );
        assert_eq!(ast.parent(one), Some(sum));
        assert_eq!(ast.parent(two), Some(sum));
        assert_eq!(ast.parent(sum), None);
    }

    #[test]
    fn dump_prints_nested_outline() {
        let mut ast = Ast::new();
        let name = ast.alloc(NodeKind::Name("x".into()), Range::new(1, 1, 1, 2));
        let stmt = ast.alloc(NodeKind::ExprStmt(name), Range::new(1, 1, 1, 3));
        let text = ast.dump(stmt);
        assert_eq!(text, "ExprStmt @1:1-1:3\n  Name x @1:1-1:2\n");
    }
}
