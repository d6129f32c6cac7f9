//! Intermediate representation.
//!
//! The IR keeps function bodies as structured statement and expression trees
//! from lowering all the way through the optimizer; only codegen turns them
//! into text. Expressions implement structural `Eq`/`Hash` (floats compare by
//! bit pattern) so passes can hash them directly.
pub mod lower;

pub use lower::lower;

use crate::{
    syntax::ast::{BinOp, ShaderStage, UnaryOp},
    syntax::Loc,
    ty::{AddressSpace, TypeDesc},
};
use smol_str::SmolStr;
use std::{
    collections::HashSet,
    fmt,
    hash::{Hash, Hasher},
};

/// A canonical target attribute (`@vertex`, `@location(0)`, ...).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Attr {
    pub name: SmolStr,
    pub value: Option<SmolStr>,
}

impl Attr {
    pub fn new(name: impl Into<SmolStr>) -> Attr {
        Attr {
            name: name.into(),
            value: None,
        }
    }

    pub fn with_value(name: impl Into<SmolStr>, value: impl Into<SmolStr>) -> Attr {
        Attr {
            name: name.into(),
            value: Some(value.into()),
        }
    }
}

impl fmt::Display for Attr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "@{}({})", self.name, value),
            None => write!(f, "@{}", self.name),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FieldDef {
    pub name: SmolStr,
    pub ty: TypeDesc,
    pub attrs: Vec<Attr>,
}

#[derive(Clone, Debug)]
pub struct StructDef {
    pub name: SmolStr,
    pub fields: Vec<FieldDef>,
}

/// A module-scope resource. `space: None` declares a plain `var` (textures
/// and samplers take no address space).
#[derive(Clone, Debug)]
pub struct UniformDef {
    pub name: SmolStr,
    pub ty: TypeDesc,
    pub group: u32,
    pub binding: u32,
    pub space: Option<AddressSpace>,
}

#[derive(Clone, Debug)]
pub struct Param {
    pub name: SmolStr,
    pub ty: TypeDesc,
    pub attrs: Vec<Attr>,
}

#[derive(Clone, Debug)]
pub struct Function {
    pub name: SmolStr,
    pub stage: Option<ShaderStage>,
    pub entry_point: bool,
    pub workgroup_size: Option<[u32; 3]>,
    pub params: Vec<Param>,
    pub ret: Option<TypeDesc>,
    pub ret_attrs: Vec<Attr>,
    pub body: Vec<Stmt>,
    pub loc: Option<Loc>,
}

/// A module-scope constant (a global declaration without binding
/// attributes).
#[derive(Clone, Debug)]
pub struct ConstDef {
    pub name: SmolStr,
    pub ty: Option<TypeDesc>,
    pub init: Expr,
}

#[derive(Clone, Debug, Default)]
pub struct Module {
    pub structs: Vec<StructDef>,
    pub uniforms: Vec<UniformDef>,
    pub consts: Vec<ConstDef>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn entry_points(&self) -> impl Iterator<Item = &Function> + '_ {
        self.functions.iter().filter(|f| f.entry_point)
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Stmt {
    /// Immutable binding (`const` in the surface language lowers here too).
    Let {
        name: SmolStr,
        ty: Option<TypeDesc>,
        init: Expr,
        loc: Option<Loc>,
    },
    Var {
        name: SmolStr,
        ty: Option<TypeDesc>,
        init: Option<Expr>,
        loc: Option<Loc>,
    },
    Assign {
        target: Expr,
        op: Option<BinOp>,
        value: Expr,
        loc: Option<Loc>,
    },
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
        loc: Option<Loc>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Box<Stmt>>,
        body: Vec<Stmt>,
        loc: Option<Loc>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
        loc: Option<Loc>,
    },
    Return {
        value: Option<Expr>,
        loc: Option<Loc>,
    },
    Block(Vec<Stmt>),
    Expr {
        expr: Expr,
        loc: Option<Loc>,
    },
}

impl Stmt {
    pub fn loc(&self) -> Option<Loc> {
        match self {
            Stmt::Let { loc, .. }
            | Stmt::Var { loc, .. }
            | Stmt::Assign { loc, .. }
            | Stmt::If { loc, .. }
            | Stmt::For { loc, .. }
            | Stmt::While { loc, .. }
            | Stmt::Return { loc, .. }
            | Stmt::Expr { loc, .. } => *loc,
            Stmt::Block(_) => None,
        }
    }
}

#[derive(Clone, Debug)]
pub enum Expr {
    FloatConst(f64),
    IntConst(i64),
    UintConst(u32),
    BoolConst(bool),
    Ident(SmolStr),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        func: SmolStr,
        args: Vec<Expr>,
    },
    Construct {
        ty: TypeDesc,
        args: Vec<Expr>,
    },
    Member {
        base: Box<Expr>,
        member: SmolStr,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        use Expr::*;
        match (self, other) {
            (FloatConst(a), FloatConst(b)) => a.to_bits() == b.to_bits(),
            (IntConst(a), IntConst(b)) => a == b,
            (UintConst(a), UintConst(b)) => a == b,
            (BoolConst(a), BoolConst(b)) => a == b,
            (Ident(a), Ident(b)) => a == b,
            (Unary { op: a_op, expr: a }, Unary { op: b_op, expr: b }) => a_op == b_op && a == b,
            (
                Binary {
                    op: a_op,
                    left: a_l,
                    right: a_r,
                },
                Binary {
                    op: b_op,
                    left: b_l,
                    right: b_r,
                },
            ) => a_op == b_op && a_l == b_l && a_r == b_r,
            (Call { func: a_f, args: a_a }, Call { func: b_f, args: b_a }) => a_f == b_f && a_a == b_a,
            (Construct { ty: a_t, args: a_a }, Construct { ty: b_t, args: b_a }) => a_t == b_t && a_a == b_a,
            (
                Member {
                    base: a_b,
                    member: a_m,
                },
                Member {
                    base: b_b,
                    member: b_m,
                },
            ) => a_m == b_m && a_b == b_b,
            (
                Index {
                    base: a_b,
                    index: a_i,
                },
                Index {
                    base: b_b,
                    index: b_i,
                },
            ) => a_b == b_b && a_i == b_i,
            _ => false,
        }
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use Expr::*;
        std::mem::discriminant(self).hash(state);
        match self {
            FloatConst(v) => v.to_bits().hash(state),
            IntConst(v) => v.hash(state),
            UintConst(v) => v.hash(state),
            BoolConst(v) => v.hash(state),
            Ident(name) => name.hash(state),
            Unary { op, expr } => {
                op.hash(state);
                expr.hash(state);
            }
            Binary { op, left, right } => {
                op.hash(state);
                left.hash(state);
                right.hash(state);
            }
            Call { func, args } => {
                func.hash(state);
                args.hash(state);
            }
            Construct { ty, args } => {
                ty.hash(state);
                args.hash(state);
            }
            Member { base, member } => {
                base.hash(state);
                member.hash(state);
            }
            Index { base, index } => {
                base.hash(state);
                index.hash(state);
            }
        }
    }
}

impl Expr {
    pub fn ident(name: impl Into<SmolStr>) -> Expr {
        Expr::Ident(name.into())
    }

    pub fn call(func: impl Into<SmolStr>, args: Vec<Expr>) -> Expr {
        Expr::Call {
            func: func.into(),
            args,
        }
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Expr::FloatConst(_) | Expr::IntConst(_) | Expr::UintConst(_) | Expr::BoolConst(_)
        )
    }

    /// The numeric value of a literal, integers widened to f64.
    pub fn as_number(&self) -> Option<f64> {
        match *self {
            Expr::FloatConst(v) => Some(v),
            Expr::IntConst(v) => Some(v as f64),
            Expr::UintConst(v) => Some(v as f64),
            _ => None,
        }
    }

    pub fn is_number(&self, value: f64) -> bool {
        self.as_number() == Some(value)
    }

    /// Node count of the expression tree.
    pub fn size(&self) -> usize {
        let mut count = 0;
        walk_expr(self, &mut |_| count += 1);
        count
    }
}

// ----------------------------------------------------------------------
// Traversal helpers
// ----------------------------------------------------------------------

/// Pre-order visit of every node in an expression tree.
pub fn walk_expr(expr: &Expr, on_expr: &mut impl FnMut(&Expr)) {
    on_expr(expr);
    match expr {
        Expr::Unary { expr, .. } => walk_expr(expr, on_expr),
        Expr::Binary { left, right, .. } => {
            walk_expr(left, on_expr);
            walk_expr(right, on_expr);
        }
        Expr::Call { args, .. } => {
            for arg in args {
                walk_expr(arg, on_expr);
            }
        }
        Expr::Construct { args, .. } => {
            for arg in args {
                walk_expr(arg, on_expr);
            }
        }
        Expr::Member { base, .. } => walk_expr(base, on_expr),
        Expr::Index { base, index } => {
            walk_expr(base, on_expr);
            walk_expr(index, on_expr);
        }
        _ => {}
    }
}

/// Visits every expression tree rooted in the statement list, including
/// nested statements.
pub fn walk_stmts(stmts: &[Stmt], on_expr: &mut impl FnMut(&Expr)) {
    for stmt in stmts {
        walk_stmt(stmt, on_expr);
    }
}

pub fn walk_stmt(stmt: &Stmt, on_expr: &mut impl FnMut(&Expr)) {
    match stmt {
        Stmt::Let { init, .. } => walk_expr(init, on_expr),
        Stmt::Var { init, .. } => {
            if let Some(init) = init {
                walk_expr(init, on_expr);
            }
        }
        Stmt::Assign { target, value, .. } => {
            walk_expr(target, on_expr);
            walk_expr(value, on_expr);
        }
        Stmt::If {
            cond,
            then_branch,
            else_branch,
            ..
        } => {
            walk_expr(cond, on_expr);
            walk_stmts(then_branch, on_expr);
            if let Some(else_branch) = else_branch {
                walk_stmts(else_branch, on_expr);
            }
        }
        Stmt::For {
            init, cond, step, body, ..
        } => {
            if let Some(init) = init {
                walk_stmt(init, on_expr);
            }
            if let Some(cond) = cond {
                walk_expr(cond, on_expr);
            }
            if let Some(step) = step {
                walk_stmt(step, on_expr);
            }
            walk_stmts(body, on_expr);
        }
        Stmt::While { cond, body, .. } => {
            walk_expr(cond, on_expr);
            walk_stmts(body, on_expr);
        }
        Stmt::Return { value, .. } => {
            if let Some(value) = value {
                walk_expr(value, on_expr);
            }
        }
        Stmt::Block(stmts) => walk_stmts(stmts, on_expr),
        Stmt::Expr { expr, .. } => walk_expr(expr, on_expr),
    }
}

/// Rebuilds an expression bottom-up through `f`: children are mapped first,
/// then the rebuilt node itself is passed to `f`.
pub fn map_expr(expr: Expr, f: &mut impl FnMut(Expr) -> Expr) -> Expr {
    let mapped = match expr {
        Expr::Unary { op, expr } => Expr::Unary {
            op,
            expr: Box::new(map_expr(*expr, f)),
        },
        Expr::Binary { op, left, right } => Expr::Binary {
            op,
            left: Box::new(map_expr(*left, f)),
            right: Box::new(map_expr(*right, f)),
        },
        Expr::Call { func, args } => Expr::Call {
            func,
            args: args.into_iter().map(|arg| map_expr(arg, f)).collect(),
        },
        Expr::Construct { ty, args } => Expr::Construct {
            ty,
            args: args.into_iter().map(|arg| map_expr(arg, f)).collect(),
        },
        Expr::Member { base, member } => Expr::Member {
            base: Box::new(map_expr(*base, f)),
            member,
        },
        Expr::Index { base, index } => Expr::Index {
            base: Box::new(map_expr(*base, f)),
            index: Box::new(map_expr(*index, f)),
        },
        leaf => leaf,
    };
    f(mapped)
}

/// Applies `f` bottom-up to every expression tree in the statement.
pub fn map_stmt_exprs(stmt: &mut Stmt, f: &mut impl FnMut(Expr) -> Expr) {
    fn take(expr: &mut Expr, f: &mut impl FnMut(Expr) -> Expr) {
        let owned = std::mem::replace(expr, Expr::BoolConst(false));
        *expr = map_expr(owned, f);
    }
    match stmt {
        Stmt::Let { init, .. } => take(init, f),
        Stmt::Var { init, .. } => {
            if let Some(init) = init {
                take(init, f);
            }
        }
        Stmt::Assign { target, value, .. } => {
            take(target, f);
            take(value, f);
        }
        Stmt::If {
            cond,
            then_branch,
            else_branch,
            ..
        } => {
            take(cond, f);
            for stmt in then_branch.iter_mut() {
                map_stmt_exprs(stmt, f);
            }
            if let Some(else_branch) = else_branch {
                for stmt in else_branch.iter_mut() {
                    map_stmt_exprs(stmt, f);
                }
            }
        }
        Stmt::For {
            init, cond, step, body, ..
        } => {
            if let Some(init) = init {
                map_stmt_exprs(init, f);
            }
            if let Some(cond) = cond {
                take(cond, f);
            }
            if let Some(step) = step {
                map_stmt_exprs(step, f);
            }
            for stmt in body.iter_mut() {
                map_stmt_exprs(stmt, f);
            }
        }
        Stmt::While { cond, body, .. } => {
            take(cond, f);
            for stmt in body.iter_mut() {
                map_stmt_exprs(stmt, f);
            }
        }
        Stmt::Return { value, .. } => {
            if let Some(value) = value {
                take(value, f);
            }
        }
        Stmt::Block(stmts) => {
            for stmt in stmts.iter_mut() {
                map_stmt_exprs(stmt, f);
            }
        }
        Stmt::Expr { expr, .. } => take(expr, f),
    }
}

/// Names written anywhere in the statement list: declarations, assignment
/// targets and increment/decrement operands.
pub fn vars_written(stmts: &[Stmt]) -> HashSet<SmolStr> {
    let mut written = HashSet::new();
    collect_written(stmts, &mut written);
    written
}

fn collect_written(stmts: &[Stmt], written: &mut HashSet<SmolStr>) {
    for stmt in stmts {
        match stmt {
            Stmt::Let { name, .. } | Stmt::Var { name, .. } => {
                written.insert(name.clone());
            }
            Stmt::Assign { target, .. } => {
                if let Some(name) = root_ident(target) {
                    written.insert(name.clone());
                }
            }
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                collect_written(then_branch, written);
                if let Some(else_branch) = else_branch {
                    collect_written(else_branch, written);
                }
            }
            Stmt::For { init, step, body, .. } => {
                if let Some(init) = init {
                    collect_written(std::slice::from_ref(&**init), written);
                }
                if let Some(step) = step {
                    collect_written(std::slice::from_ref(&**step), written);
                }
                collect_written(body, written);
            }
            Stmt::While { body, .. } => collect_written(body, written),
            Stmt::Block(stmts) => collect_written(stmts, written),
            _ => {}
        }
        // Increment/decrement inside any expression position also writes.
        walk_stmt(stmt, &mut |expr| {
            if let Expr::Unary {
                op:
                    UnaryOp::PreIncrement
                    | UnaryOp::PreDecrement
                    | UnaryOp::PostIncrement
                    | UnaryOp::PostDecrement,
                expr: inner,
            } = expr
            {
                if let Some(name) = root_ident(inner) {
                    written.insert(name.clone());
                }
            }
        });
    }
}

/// The identifier at the root of a place expression (`a.b[i]` roots at `a`).
pub fn root_ident(expr: &Expr) -> Option<&SmolStr> {
    match expr {
        Expr::Ident(name) => Some(name),
        Expr::Member { base, .. } => root_ident(base),
        Expr::Index { base, .. } => root_ident(base),
        _ => None,
    }
}

/// Replaces every occurrence of the identifier `name` with `replacement`.
pub fn subst_ident(expr: Expr, name: &str, replacement: &Expr) -> Expr {
    map_expr(expr, &mut |e| match e {
        Expr::Ident(ref n) if n == name => replacement.clone(),
        other => other,
    })
}

/// Calls that may observe or mutate state beyond their operands; these stop
/// CSE, hoisting and dead-initializer removal.
pub fn has_side_effects(expr: &Expr) -> bool {
    let mut found = false;
    walk_expr(expr, &mut |e| match e {
        Expr::Call { func, .. } if func == "textureStore" || func.starts_with("atomic") => found = true,
        Expr::Unary {
            op:
                UnaryOp::PreIncrement | UnaryOp::PreDecrement | UnaryOp::PostIncrement | UnaryOp::PostDecrement,
            ..
        } => found = true,
        _ => {}
    });
    found
}

/// Purity for value-numbering purposes: side-effect free and not a texture
/// read (sampling depends on implicit derivatives and bound state).
pub fn is_cse_pure(expr: &Expr) -> bool {
    let mut pure = true;
    walk_expr(expr, &mut |e| match e {
        Expr::Call { func, .. } if func.starts_with("texture") || func.starts_with("atomic") => pure = false,
        Expr::Unary {
            op:
                UnaryOp::PreIncrement | UnaryOp::PreDecrement | UnaryOp::PostIncrement | UnaryOp::PostDecrement,
            ..
        } => pure = false,
        _ => {}
    });
    pure
}
