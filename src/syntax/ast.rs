//! Surface AST.
//!
//! One tagged enum per syntactic category; every node carries its span.
//! Type annotations are kept as raw spellings (`TypeRef`) and resolved
//! against the registry during checking.
use crate::syntax::Span;
use smol_str::SmolStr;
use strum::{Display, EnumString};

/// GPU pipeline stage of an entry point.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

/// An `@name` or `@name(value)` attribute.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Attribute {
    pub name: SmolStr,
    /// Raw argument text between the parentheses, untrimmed of inner commas.
    pub value: Option<SmolStr>,
    pub span: Span,
}

impl Attribute {
    /// The argument parsed as an unsigned integer (`@location(3)`).
    pub fn int_value(&self) -> Option<u32> {
        self.value.as_ref()?.trim().parse().ok()
    }
}

/// A type annotation as spelled in the source.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TypeRef {
    pub text: SmolStr,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct Program {
    pub imports: Vec<ImportDecl>,
    pub structs: Vec<StructDecl>,
    /// CPU-side class declarations, carried through but never compiled.
    pub classes: Vec<ClassDecl>,
    pub functions: Vec<FunctionDecl>,
    pub globals: Vec<GlobalDecl>,
}

#[derive(Clone, Debug)]
pub enum ImportClause {
    Default(SmolStr),
    Named(Vec<SmolStr>),
    Namespace(SmolStr),
}

#[derive(Clone, Debug)]
pub struct ImportDecl {
    pub clause: ImportClause,
    pub path: SmolStr,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct FieldDecl {
    pub name: SmolStr,
    pub ty: TypeRef,
    pub attrs: Vec<Attribute>,
    pub span: Span,
}

/// A shared type definition (`struct`, `interface` or object-shaped `type`
/// alias).
#[derive(Clone, Debug)]
pub struct StructDecl {
    pub name: SmolStr,
    pub fields: Vec<FieldDecl>,
    pub span: Span,
}

/// A class member variable; the initializer is dropped since classes are
/// never compiled.
#[derive(Clone, Debug)]
pub struct ClassField {
    pub name: SmolStr,
    pub ty: Option<TypeRef>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct ClassDecl {
    pub name: SmolStr,
    pub fields: Vec<ClassField>,
    pub methods: Vec<FunctionDecl>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct ParamDecl {
    pub name: SmolStr,
    pub ty: Option<TypeRef>,
    pub attrs: Vec<Attribute>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct FunctionDecl {
    pub name: SmolStr,
    pub stage: Option<ShaderStage>,
    pub attrs: Vec<Attribute>,
    pub params: Vec<ParamDecl>,
    pub ret: Option<TypeRef>,
    pub ret_attrs: Vec<Attribute>,
    /// `(x, y, z)` of `@workgroup_size`; `y`/`z` default to `None` when
    /// omitted.
    pub workgroup_size: Option<(u32, Option<u32>, Option<u32>)>,
    pub body: Block,
    pub exported: bool,
    pub span: Span,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VarKind {
    Const,
    Let,
    Var,
}

/// A module-scope declaration, promoted from a variable statement when it
/// carries `@group`/`@binding` attributes.
#[derive(Clone, Debug)]
pub struct GlobalDecl {
    pub kind: VarKind,
    pub name: SmolStr,
    pub ty: Option<TypeRef>,
    pub init: Option<Expr>,
    pub attrs: Vec<Attribute>,
    pub group: Option<u32>,
    pub binding: Option<u32>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum Stmt {
    Var {
        kind: VarKind,
        name: SmolStr,
        ty: Option<TypeRef>,
        init: Option<Expr>,
        attrs: Vec<Attribute>,
        span: Span,
    },
    If {
        cond: Expr,
        then_branch: Block,
        else_branch: Option<Block>,
        span: Span,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Box<Stmt>>,
        body: Block,
        span: Span,
    },
    While {
        cond: Expr,
        body: Block,
        span: Span,
    },
    Return {
        value: Option<Expr>,
        span: Span,
    },
    Block(Block),
    Expr {
        expr: Expr,
        span: Span,
    },
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Var { span, .. }
            | Stmt::If { span, .. }
            | Stmt::For { span, .. }
            | Stmt::While { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::Expr { span, .. } => *span,
            Stmt::Block(block) => block.span,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(self, BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
    AddressOf,
    PreIncrement,
    PreDecrement,
    PostIncrement,
    PostDecrement,
}

/// Numeric literal type suffix.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum NumSuffix {
    F,
    H,
    I,
    U,
}

#[derive(Clone, Debug)]
pub enum Expr {
    IntLit {
        value: i64,
        suffix: Option<NumSuffix>,
        span: Span,
    },
    FloatLit {
        value: f64,
        suffix: Option<NumSuffix>,
        span: Span,
    },
    BoolLit {
        value: bool,
        span: Span,
    },
    StrLit {
        value: SmolStr,
        span: Span,
    },
    Ident {
        name: SmolStr,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    /// `target = value` or a compound assignment (`op` carries the arithmetic
    /// part of `+=` and friends).
    Assign {
        op: Option<BinOp>,
        target: Box<Expr>,
        value: Box<Expr>,
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    Member {
        base: Box<Expr>,
        member: SmolStr,
        span: Span,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    ArrayLit {
        elements: Vec<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::IntLit { span, .. }
            | Expr::FloatLit { span, .. }
            | Expr::BoolLit { span, .. }
            | Expr::StrLit { span, .. }
            | Expr::Ident { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Assign { span, .. }
            | Expr::Call { span, .. }
            | Expr::Member { span, .. }
            | Expr::Index { span, .. }
            | Expr::ArrayLit { span, .. } => *span,
        }
    }

    pub fn ident_name(&self) -> Option<&SmolStr> {
        match self {
            Expr::Ident { name, .. } => Some(name),
            _ => None,
        }
    }
}
