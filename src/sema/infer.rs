//! Expression and statement type inference.
use crate::{
    diag::{codes, DiagnosticSink},
    options::ValidationFlags,
    syntax::ast::{BinOp, Block, Expr, NumSuffix, Stmt, TypeRef, UnaryOp},
    syntax::Span,
    ty::{registry::TypeRegistry, swizzle, ScalarType, TypeDesc},
};
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::collections::HashMap;

/// Types of every inferred expression, keyed by span. Populated even when
/// diagnostics were reported; downstream phases consult it defensively.
pub type TypeMap = HashMap<Span, TypeDesc>;

/// Resolved signature of a user function.
#[derive(Clone, Debug)]
pub struct FunctionSig {
    pub name: SmolStr,
    pub params: Vec<(SmolStr, TypeDesc)>,
    pub ret: TypeDesc,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum VarOrigin {
    Local,
    Param,
}

#[derive(Clone, Debug)]
struct LocalVar {
    ty: TypeDesc,
    span: Span,
    origin: VarOrigin,
    reads: u32,
}

pub(crate) struct InferCtx<'a> {
    pub registry: &'a mut TypeRegistry,
    pub diag: &'a mut DiagnosticSink,
    pub types: TypeMap,
    pub functions: &'a IndexMap<SmolStr, FunctionSig>,
    pub globals: &'a HashMap<SmolStr, TypeDesc>,
    pub flags: ValidationFlags,
    /// Declared return type of the function being checked.
    pub current_ret: Option<TypeDesc>,
    scopes: Vec<HashMap<SmolStr, LocalVar>>,
}

impl<'a> InferCtx<'a> {
    pub fn new(
        registry: &'a mut TypeRegistry,
        diag: &'a mut DiagnosticSink,
        functions: &'a IndexMap<SmolStr, FunctionSig>,
        globals: &'a HashMap<SmolStr, TypeDesc>,
        flags: ValidationFlags,
    ) -> InferCtx<'a> {
        InferCtx {
            registry,
            diag,
            types: TypeMap::new(),
            functions,
            globals,
            flags,
            current_ret: None,
            scopes: vec![],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Pops a scope, reporting unused locals and parameters when the
    /// corresponding strict checks are on.
    pub fn pop_scope(&mut self) {
        let scope = self.scopes.pop().expect("scope underflow");
        let mut vars: Vec<_> = scope.into_iter().collect();
        vars.sort_by_key(|(_, var)| (var.span.start, var.span.end));
        for (name, var) in vars {
            if var.reads > 0 {
                continue;
            }
            match var.origin {
                VarOrigin::Local if self.flags.contains(ValidationFlags::NO_UNUSED_LOCALS) => {
                    self.diag
                        .warning(codes::UNUSED_LOCAL, format!("unused local variable `{}`", name))
                        .span(var.span)
                        .emit();
                }
                VarOrigin::Param if self.flags.contains(ValidationFlags::NO_UNUSED_PARAMETERS) => {
                    self.diag
                        .warning(codes::UNUSED_PARAMETER, format!("unused parameter `{}`", name))
                        .span(var.span)
                        .emit();
                }
                _ => {}
            }
        }
    }

    pub fn declare_local(&mut self, name: SmolStr, ty: TypeDesc, span: Span) {
        self.declare(name, ty, span, VarOrigin::Local);
    }

    pub fn declare_param(&mut self, name: SmolStr, ty: TypeDesc, span: Span) {
        self.declare(name, ty, span, VarOrigin::Param);
    }

    fn declare(&mut self, name: SmolStr, ty: TypeDesc, span: Span, origin: VarOrigin) {
        self.scopes
            .last_mut()
            .expect("no active scope")
            .insert(name, LocalVar { ty, span, origin, reads: 0 });
    }

    fn lookup(&mut self, name: &str) -> Option<TypeDesc> {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(var) = scope.get_mut(name) {
                var.reads += 1;
                return Some(var.ty.clone());
            }
        }
        if let Some(ty) = self.globals.get(name) {
            return Some(ty.clone());
        }
        super::builtins::builtin_uniform(name).cloned()
    }

    /// Resolves a type annotation, reporting `E001` for unknown spellings.
    pub fn resolve_type(&mut self, ty: &TypeRef) -> TypeDesc {
        match self.registry.parse_type(&ty.text) {
            Some(resolved) => resolved,
            None => {
                self.diag
                    .error(codes::UNKNOWN_TYPE, format!("unknown type `{}`", ty.text))
                    .span(ty.span)
                    .emit();
                TypeDesc::Error
            }
        }
    }

    fn record(&mut self, span: Span, ty: TypeDesc) -> TypeDesc {
        self.types.insert(span, ty.clone());
        ty
    }

    /// Retypes an integer literal used in a float context. Returns true when
    /// a conversion was recorded.
    fn coerce_literal(&mut self, expr: &Expr, to: &TypeDesc) -> bool {
        let to_scalar = match to {
            TypeDesc::Scalar(s) if s.is_float() => *s,
            TypeDesc::Vector { elem, .. } if elem.is_float() => *elem,
            _ => return false,
        };
        match expr {
            Expr::IntLit { suffix: None, span, .. } => {
                self.types.insert(*span, TypeDesc::Scalar(to_scalar));
                if self.flags.contains(ValidationFlags::NO_IMPLICIT_FLOAT) {
                    self.diag
                        .warning(
                            codes::IMPLICIT_FLOAT,
                            "integer literal used where a float is expected",
                        )
                        .span(*span)
                        .suggestion("add a decimal point or an `f` suffix")
                        .emit();
                }
                true
            }
            Expr::Unary {
                op: UnaryOp::Neg, expr, span,
            } => {
                if self.coerce_literal(expr, to) {
                    self.types.insert(*span, TypeDesc::Scalar(to_scalar));
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    /// Whether `from` may flow into a slot of type `to`, coercing literal
    /// operands and reporting narrowing warnings.
    fn check_assignable(&mut self, value: &Expr, from: &TypeDesc, to: &TypeDesc, span: Span) -> bool {
        if from.is_error() || to.is_error() || from == to {
            return true;
        }
        if self.coerce_literal(value, to) {
            return true;
        }
        match (from, to) {
            // Implicit widening of integer scalars into float slots.
            (TypeDesc::Scalar(f), TypeDesc::Scalar(t)) if f.is_integer() && t.is_float() => true,
            (TypeDesc::Scalar(ScalarType::F32), TypeDesc::Scalar(t))
                if matches!(*t, ScalarType::I32 | ScalarType::F16) =>
            {
                self.diag
                    .warning(
                        codes::NARROWING_CONVERSION,
                        format!("implicit narrowing conversion from `f32` to `{}`", t),
                    )
                    .span(span)
                    .emit();
                true
            }
            (TypeDesc::Scalar(ScalarType::I32), TypeDesc::Scalar(ScalarType::U32)) => {
                self.diag
                    .warning(
                        codes::NARROWING_CONVERSION,
                        "implicit narrowing conversion from `i32` to `u32`",
                    )
                    .span(span)
                    .emit();
                true
            }
            _ => {
                self.diag
                    .error(
                        codes::TYPE_MISMATCH,
                        format!("expected `{}`, found `{}`", to, from),
                    )
                    .span(span)
                    .emit();
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn infer_expr(&mut self, expr: &Expr) -> TypeDesc {
        let span = expr.span();
        let ty = match expr {
            Expr::IntLit { suffix, .. } => match suffix {
                Some(NumSuffix::U) => TypeDesc::U32,
                Some(NumSuffix::F) => TypeDesc::F32,
                Some(NumSuffix::H) => TypeDesc::F16,
                _ => TypeDesc::I32,
            },
            Expr::FloatLit { suffix, .. } => match suffix {
                Some(NumSuffix::H) => TypeDesc::F16,
                _ => TypeDesc::F32,
            },
            Expr::BoolLit { .. } => TypeDesc::BOOL,
            Expr::StrLit { .. } => TypeDesc::Error,
            Expr::Ident { name, .. } => match self.lookup(name) {
                Some(ty) => ty,
                None => {
                    self.diag
                        .error(codes::UNKNOWN_IDENTIFIER, format!("unknown identifier `{}`", name))
                        .span(span)
                        .emit();
                    TypeDesc::Error
                }
            },
            Expr::Unary { op, expr: inner, .. } => self.infer_unary(*op, inner, span),
            Expr::Binary { op, left, right, .. } => self.infer_binary(*op, left, right, span),
            Expr::Assign { op, target, value, .. } => self.infer_assign(*op, target, value, span),
            Expr::Call { callee, args, .. } => self.infer_call(callee, args, span),
            Expr::Member { base, member, .. } => self.infer_member(base, member, span),
            Expr::Index { base, index, .. } => self.infer_index(base, index, span),
            Expr::ArrayLit { elements, .. } => self.infer_array_lit(elements, span),
        };
        self.record(span, ty)
    }

    fn infer_unary(&mut self, op: UnaryOp, inner: &Expr, span: Span) -> TypeDesc {
        let ty = self.infer_expr(inner);
        if ty.is_error() {
            return TypeDesc::Error;
        }
        match op {
            UnaryOp::Neg => {
                if ty.is_numeric() {
                    ty
                } else {
                    self.diag
                        .error(codes::TYPE_MISMATCH, format!("cannot negate `{}`", ty))
                        .span(span)
                        .emit();
                    TypeDesc::Error
                }
            }
            UnaryOp::Not => {
                if ty == TypeDesc::BOOL {
                    ty
                } else {
                    self.diag
                        .error(codes::TYPE_MISMATCH, format!("`!` expects `bool`, found `{}`", ty))
                        .span(span)
                        .emit();
                    TypeDesc::Error
                }
            }
            UnaryOp::BitNot => match ty.scalar_elem() {
                Some(s) if s.is_integer() => ty,
                _ => {
                    self.diag
                        .error(codes::TYPE_MISMATCH, format!("`~` expects an integer, found `{}`", ty))
                        .span(span)
                        .emit();
                    TypeDesc::Error
                }
            },
            UnaryOp::AddressOf => TypeDesc::Pointer {
                space: crate::ty::AddressSpace::Function,
                elem: std::sync::Arc::new(ty),
                access: crate::ty::AccessMode::Read,
            },
            UnaryOp::PreIncrement | UnaryOp::PreDecrement | UnaryOp::PostIncrement | UnaryOp::PostDecrement => {
                match ty {
                    TypeDesc::Scalar(s) if s != ScalarType::Bool => TypeDesc::Scalar(s),
                    _ => {
                        self.diag
                            .error(
                                codes::TYPE_MISMATCH,
                                format!("increment/decrement expects a numeric scalar, found `{}`", ty),
                            )
                            .span(span)
                            .emit();
                        TypeDesc::Error
                    }
                }
            }
        }
    }

    fn infer_binary(&mut self, op: BinOp, left: &Expr, right: &Expr, span: Span) -> TypeDesc {
        let lt = self.infer_expr(left);
        let rt = self.infer_expr(right);
        if lt.is_error() || rt.is_error() {
            return TypeDesc::Error;
        }

        if op.is_logical() {
            if lt != TypeDesc::BOOL || rt != TypeDesc::BOOL {
                self.diag
                    .error(
                        codes::TYPE_MISMATCH,
                        format!("`{}` expects `bool` operands, found `{}` and `{}`", op.symbol(), lt, rt),
                    )
                    .span(span)
                    .emit();
                return TypeDesc::Error;
            }
            return TypeDesc::BOOL;
        }

        if op.is_comparison() {
            if self.arith_common(op, left, right, &lt, &rt, span).is_error() {
                return TypeDesc::Error;
            }
            return TypeDesc::BOOL;
        }

        // Matrix algebra only exists for `*`.
        if op == BinOp::Mul {
            match (&lt, &rt) {
                (TypeDesc::Matrix { elem, rows, columns }, TypeDesc::Vector { elem: velem, len }) => {
                    if columns == len && elem == velem {
                        return TypeDesc::vec(*rows, *elem);
                    }
                    self.diag
                        .error(
                            codes::TYPE_MISMATCH,
                            format!("cannot multiply `{}` by `{}`: the matrix has {} columns", lt, rt, columns),
                        )
                        .span(span)
                        .emit();
                    return TypeDesc::Error;
                }
                (TypeDesc::Vector { .. }, TypeDesc::Matrix { .. }) => {
                    self.diag
                        .error(
                            codes::INVALID_OPERAND_ORDER,
                            format!("`vector * matrix` is not supported; write `{} * {}` instead", rt, lt),
                        )
                        .span(span)
                        .suggestion("reverse the operand order")
                        .emit();
                    return TypeDesc::Error;
                }
                (
                    TypeDesc::Matrix {
                        elem,
                        rows,
                        columns: lc,
                    },
                    TypeDesc::Matrix {
                        elem: relem,
                        rows: rr,
                        columns: rc,
                    },
                ) => {
                    if lc == rr && elem == relem {
                        return TypeDesc::mat(*rc, *rows, *elem);
                    }
                    self.diag
                        .error(
                            codes::TYPE_MISMATCH,
                            format!("cannot multiply `{}` by `{}`: inner dimensions do not match", lt, rt),
                        )
                        .span(span)
                        .emit();
                    return TypeDesc::Error;
                }
                (TypeDesc::Matrix { elem, .. }, TypeDesc::Scalar(s)) if s == elem => return lt.clone(),
                (TypeDesc::Scalar(s), TypeDesc::Matrix { elem, .. }) if s == elem => return rt.clone(),
                _ => {}
            }
        }

        if op == BinOp::Div && lt.is_float_scalar_or_vector() {
            let constant_divisor = matches!(right, Expr::FloatLit { .. } | Expr::IntLit { .. });
            if constant_divisor {
                self.diag
                    .hint(codes::DIV_BY_CONSTANT, "division by a constant")
                    .span(span)
                    .suggestion("multiply by the reciprocal instead")
                    .emit();
            }
        }

        if matches!(op, BinOp::Shl | BinOp::Shr | BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor) {
            let ints = lt.scalar_elem().map_or(false, ScalarType::is_integer)
                && rt.scalar_elem().map_or(false, ScalarType::is_integer);
            if !ints {
                self.diag
                    .error(
                        codes::TYPE_MISMATCH,
                        format!("`{}` expects integer operands, found `{}` and `{}`", op.symbol(), lt, rt),
                    )
                    .span(span)
                    .emit();
                return TypeDesc::Error;
            }
            return lt;
        }

        self.arith_common(op, left, right, &lt, &rt, span)
    }

    /// The common type of an arithmetic or comparison operation, broadcasting
    /// scalars onto vectors and converting integer literals into float slots.
    fn arith_common(
        &mut self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
        lt: &TypeDesc,
        rt: &TypeDesc,
        span: Span,
    ) -> TypeDesc {
        if lt == rt {
            if !lt.is_numeric() && !op.is_comparison() {
                self.diag
                    .error(
                        codes::TYPE_MISMATCH,
                        format!("`{}` is not defined for `{}`", op.symbol(), lt),
                    )
                    .span(span)
                    .emit();
                return TypeDesc::Error;
            }
            return lt.clone();
        }
        match (lt, rt) {
            (TypeDesc::Vector { elem, .. }, TypeDesc::Scalar(s)) => {
                if elem == s || (elem.is_float() && self.coerce_literal(right, lt)) || (elem.is_float() && s.is_integer()) {
                    lt.clone()
                } else {
                    self.mismatch(op, lt, rt, span)
                }
            }
            (TypeDesc::Scalar(s), TypeDesc::Vector { elem, .. }) => {
                if elem == s || (elem.is_float() && self.coerce_literal(left, rt)) || (elem.is_float() && s.is_integer()) {
                    rt.clone()
                } else {
                    self.mismatch(op, lt, rt, span)
                }
            }
            (TypeDesc::Scalar(a), TypeDesc::Scalar(b)) => {
                if a.is_float() && self.coerce_literal(right, lt) {
                    lt.clone()
                } else if b.is_float() && self.coerce_literal(left, rt) {
                    rt.clone()
                } else if (a.is_float() && b.is_integer()) || (a.is_integer() && b.is_float()) {
                    TypeDesc::F32
                } else {
                    self.mismatch(op, lt, rt, span)
                }
            }
            _ => self.mismatch(op, lt, rt, span),
        }
    }

    fn mismatch(&mut self, op: BinOp, lt: &TypeDesc, rt: &TypeDesc, span: Span) -> TypeDesc {
        self.diag
            .error(
                codes::TYPE_MISMATCH,
                format!(
                    "`{}` operands have incompatible types `{}` and `{}`",
                    op.symbol(),
                    lt,
                    rt
                ),
            )
            .span(span)
            .emit();
        TypeDesc::Error
    }

    fn infer_assign(&mut self, op: Option<BinOp>, target: &Expr, value: &Expr, span: Span) -> TypeDesc {
        let target_ty = self.infer_expr(target);
        let value_ty = self.infer_expr(value);

        // A swizzle is only assignable when its components are distinct.
        if let Expr::Member { base, member, .. } = target {
            if let Some(base_ty) = self.types.get(&base.span()).cloned() {
                if base_ty.is_vector() {
                    if let Ok(sw) = swizzle::check(&base_ty, member) {
                        if !sw.writable {
                            self.diag
                                .error(
                                    codes::INVALID_SWIZZLE,
                                    format!("swizzle `{}` repeats components and cannot be assigned", member),
                                )
                                .span(span)
                                .emit();
                        }
                    }
                }
            }
        }

        if let Some(op) = op {
            // `a op= b` types like `a = a op b`.
            let combined = self.arith_common(op, target, value, &target_ty, &value_ty, span);
            if !combined.is_error() {
                self.check_assignable(value, &combined, &target_ty, span);
            }
        } else {
            self.check_assignable(value, &value_ty, &target_ty, span);
        }
        target_ty
    }

    fn infer_call(&mut self, callee: &Expr, args: &[Expr], span: Span) -> TypeDesc {
        // `Math.*` calls map onto target builtins.
        if let Expr::Member { base, member, .. } = callee {
            if matches!(base.ident_name(), Some(name) if name == "Math") {
                match super::builtins::math_builtin(member) {
                    Some(target) => return self.infer_builtin_call(target, args, span),
                    None => {
                        self.diag
                            .error(codes::UNKNOWN_FUNCTION, format!("unknown function `Math.{}`", member))
                            .span(span)
                            .emit();
                        return TypeDesc::Error;
                    }
                }
            }
        }

        let name = match callee.ident_name() {
            Some(name) => name.clone(),
            None => {
                self.diag
                    .error(codes::UNKNOWN_FUNCTION, "expression is not callable")
                    .span(span)
                    .emit();
                return TypeDesc::Error;
            }
        };

        // Vector and matrix constructors.
        if let Some(ty) = self.registry.parse_type(&name) {
            return self.infer_constructor(&name, ty, args, span);
        }

        if super::builtins::is_builtin_function(&name) {
            return self.infer_builtin_call(&name, args, span);
        }

        match self.functions.get(&name).cloned() {
            Some(sig) => {
                if args.len() != sig.params.len() {
                    self.diag
                        .error(
                            codes::TYPE_MISMATCH,
                            format!(
                                "`{}` expects {} argument(s), found {}",
                                name,
                                sig.params.len(),
                                args.len()
                            ),
                        )
                        .span(span)
                        .emit();
                    return sig.ret;
                }
                for (arg, (_, param_ty)) in args.iter().zip(&sig.params) {
                    let arg_ty = self.infer_expr(arg);
                    self.check_assignable(arg, &arg_ty, param_ty, arg.span());
                }
                sig.ret
            }
            None => {
                let suggestions = self.similar_functions(&name);
                self.diag
                    .error(codes::UNKNOWN_FUNCTION, format!("call to unknown function `{}`", name))
                    .span(span)
                    .suggestions(suggestions)
                    .emit();
                TypeDesc::Error
            }
        }
    }

    fn similar_functions(&self, name: &str) -> Vec<String> {
        self.functions
            .keys()
            .filter(|candidate| {
                candidate.len().abs_diff(name.len()) <= 1
                    && candidate
                        .chars()
                        .zip(name.chars())
                        .filter(|(a, b)| a != b)
                        .count()
                        <= 1
            })
            .map(|candidate| format!("did you mean `{}`?", candidate))
            .collect()
    }

    fn infer_builtin_call(&mut self, name: &str, args: &[Expr], span: Span) -> TypeDesc {
        let mut arg_types: Vec<TypeDesc> = args.iter().map(|arg| self.infer_expr(arg)).collect();

        // Integer literals convert implicitly when the builtin wants floats.
        if super::builtins::expects_float(name) {
            for (arg, ty) in args.iter().zip(arg_types.iter_mut()) {
                if matches!(ty, TypeDesc::Scalar(s) if s.is_integer()) && self.coerce_literal(arg, &TypeDesc::F32) {
                    *ty = TypeDesc::F32;
                }
            }
        }

        // Performance hints on exact call shapes.
        if name == "pow" && args.len() == 2 {
            let small_exponent = match &args[1] {
                Expr::IntLit { value, .. } => (2..=4).contains(value),
                Expr::FloatLit { value, .. } => [2.0, 3.0, 4.0].contains(value),
                _ => false,
            };
            if small_exponent {
                self.diag
                    .hint(codes::POW_SMALL_EXPONENT, "`pow` with a small integer exponent")
                    .span(span)
                    .suggestion("repeated multiplication is cheaper than `pow`")
                    .emit();
            }
        }

        match super::builtins::builtin_call_type(name, &arg_types) {
            Some(Ok(ty)) => ty,
            Some(Err(message)) => {
                if !arg_types.iter().any(TypeDesc::is_error) {
                    self.diag.error(codes::TYPE_MISMATCH, message).span(span).emit();
                }
                TypeDesc::Error
            }
            None => {
                self.diag
                    .error(codes::UNKNOWN_FUNCTION, format!("call to unknown function `{}`", name))
                    .span(span)
                    .emit();
                TypeDesc::Error
            }
        }
    }

    /// Checks a vector or matrix constructor: either a single scalar splat or
    /// components summing to the exact element count.
    fn infer_constructor(&mut self, name: &str, ty: TypeDesc, args: &[Expr], span: Span) -> TypeDesc {
        let arg_types: Vec<TypeDesc> = args.iter().map(|arg| self.infer_expr(arg)).collect();
        if arg_types.iter().any(TypeDesc::is_error) {
            return ty;
        }

        let (expected, elem) = match &ty {
            TypeDesc::Vector { elem, len } => (*len as u32, *elem),
            TypeDesc::Matrix { elem, rows, columns } => (*rows as u32 * *columns as u32, *elem),
            TypeDesc::Scalar(elem) => {
                // Scalar conversion like `f32(x)`.
                if arg_types.len() != 1 {
                    self.diag
                        .error(
                            codes::CONSTRUCTOR_ARITY,
                            format!("`{}` conversion expects 1 argument, found {}", name, arg_types.len()),
                        )
                        .span(span)
                        .emit();
                }
                return TypeDesc::Scalar(*elem);
            }
            _ => return ty,
        };

        let mut components = 0u32;
        for (arg, arg_ty) in args.iter().zip(&arg_types) {
            components += match arg_ty {
                TypeDesc::Scalar(_) => 1,
                TypeDesc::Vector { len, .. } => *len as u32,
                other => {
                    self.diag
                        .error(
                            codes::TYPE_MISMATCH,
                            format!("`{}` cannot be a `{}` constructor component", other, name),
                        )
                        .span(arg.span())
                        .emit();
                    return ty;
                }
            };
            if elem.is_float() {
                self.coerce_literal(arg, &TypeDesc::Scalar(elem));
            }
        }

        let splat = components == 1 && args.len() == 1 && matches!(ty, TypeDesc::Vector { .. });
        if components != expected && !splat {
            self.diag
                .error(
                    codes::CONSTRUCTOR_ARITY,
                    format!(
                        "`{}` expects {} component(s) or a single scalar, found {}",
                        name, expected, components
                    ),
                )
                .span(span)
                .emit();
        }
        ty
    }

    fn infer_member(&mut self, base: &Expr, member: &str, span: Span) -> TypeDesc {
        // `Math.PI` and `Math.E`.
        if matches!(base.ident_name(), Some(name) if name == "Math") {
            if super::builtins::math_constant(member).is_some() {
                return TypeDesc::F32;
            }
            self.diag
                .error(codes::UNKNOWN_IDENTIFIER, format!("unknown constant `Math.{}`", member))
                .span(span)
                .emit();
            return TypeDesc::Error;
        }

        let base_ty = self.infer_expr(base);
        match &base_ty {
            TypeDesc::Error => TypeDesc::Error,
            TypeDesc::Vector { .. } => match swizzle::check(&base_ty, member) {
                Ok(sw) => sw.result,
                Err(err) => {
                    self.diag.error(codes::INVALID_SWIZZLE, err.to_string()).span(span).emit();
                    TypeDesc::Error
                }
            },
            TypeDesc::Struct(st) => match st.fields.iter().find(|f| f.name == member) {
                Some(field) => field.ty.clone(),
                None => {
                    self.diag
                        .error(
                            codes::UNKNOWN_IDENTIFIER,
                            format!("struct `{}` has no member `{}`", st.name, member),
                        )
                        .span(span)
                        .emit();
                    TypeDesc::Error
                }
            },
            other => {
                self.diag
                    .error(codes::TYPE_MISMATCH, format!("`{}` has no members", other))
                    .span(span)
                    .emit();
                TypeDesc::Error
            }
        }
    }

    fn infer_index(&mut self, base: &Expr, index: &Expr, span: Span) -> TypeDesc {
        let base_ty = self.infer_expr(base);
        let index_ty = self.infer_expr(index);
        if !index_ty.is_error() && !matches!(index_ty.scalar_elem(), Some(s) if s.is_integer()) {
            self.diag
                .error(
                    codes::TYPE_MISMATCH,
                    format!("index must be an integer, found `{}`", index_ty),
                )
                .span(index.span())
                .emit();
        }
        match &base_ty {
            TypeDesc::Array { elem, .. } => (**elem).clone(),
            TypeDesc::Vector { elem, .. } => TypeDesc::Scalar(*elem),
            TypeDesc::Matrix { elem, rows, .. } => TypeDesc::vec(*rows, *elem),
            TypeDesc::Error => TypeDesc::Error,
            other => {
                self.diag
                    .error(codes::TYPE_MISMATCH, format!("`{}` cannot be indexed", other))
                    .span(span)
                    .emit();
                TypeDesc::Error
            }
        }
    }

    fn infer_array_lit(&mut self, elements: &[Expr], span: Span) -> TypeDesc {
        let mut elem_ty = TypeDesc::Error;
        for element in elements {
            let ty = self.infer_expr(element);
            if elem_ty.is_error() {
                elem_ty = ty;
            } else if !ty.is_error() && ty != elem_ty {
                self.diag
                    .error(
                        codes::TYPE_MISMATCH,
                        format!("array literal mixes `{}` and `{}`", elem_ty, ty),
                    )
                    .span(span)
                    .emit();
            }
        }
        TypeDesc::Array {
            elem: std::sync::Arc::new(elem_ty),
            len: Some(elements.len() as u32),
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    pub fn infer_block(&mut self, block: &Block) {
        self.push_scope();
        self.infer_stmts(&block.stmts);
        self.pop_scope();
    }

    pub fn infer_stmts(&mut self, stmts: &[Stmt]) {
        let mut returned = false;
        for stmt in stmts {
            if returned {
                self.diag
                    .info(codes::UNREACHABLE_CODE, "unreachable code after `return`")
                    .span(stmt.span())
                    .emit();
                returned = false;
            }
            if matches!(stmt, Stmt::Return { .. }) {
                returned = true;
            }
            self.infer_stmt(stmt);
        }
    }

    pub fn infer_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Var {
                name, ty, init, span, ..
            } => {
                let annotated = ty.as_ref().map(|t| self.resolve_type(t));
                let init_ty = init.as_ref().map(|e| self.infer_expr(e));
                let var_ty = match (&annotated, &init_ty) {
                    (Some(annotated), Some(init_ty)) => {
                        if let Some(init) = init {
                            self.check_assignable(init, init_ty, annotated, init.span());
                        }
                        annotated.clone()
                    }
                    (Some(annotated), None) => annotated.clone(),
                    (None, Some(init_ty)) => init_ty.clone(),
                    (None, None) => {
                        if self.flags.contains(ValidationFlags::NO_IMPLICIT_ANY) {
                            self.diag
                                .warning(
                                    codes::IMPLICIT_ANY,
                                    format!("`{}` has no type annotation and no initializer", name),
                                )
                                .span(*span)
                                .emit();
                        }
                        TypeDesc::Error
                    }
                };
                self.declare_local(name.clone(), var_ty, *span);
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                self.check_condition(cond);
                self.infer_block(then_branch);
                if let Some(else_branch) = else_branch {
                    self.infer_block(else_branch);
                }
            }
            Stmt::For {
                init, cond, step, body, ..
            } => {
                self.push_scope();
                if let Some(init) = init {
                    self.infer_stmt(init);
                }
                if let Some(cond) = cond {
                    self.check_condition(cond);
                }
                if let Some(step) = step {
                    self.infer_stmt(step);
                }
                self.infer_stmts(&body.stmts);
                self.pop_scope();
            }
            Stmt::While { cond, body, .. } => {
                self.check_condition(cond);
                self.infer_block(body);
            }
            Stmt::Return { value, span } => {
                let value_ty = value.as_ref().map(|e| self.infer_expr(e));
                match (&self.current_ret.clone(), value, value_ty) {
                    (Some(ret), Some(value), Some(value_ty)) => {
                        if !value_ty.is_error()
                            && !ret.is_error()
                            && &value_ty != ret
                            && !self.coerce_literal(value, ret)
                            && !returnable(&value_ty, ret)
                        {
                            let narrowing = matches!(
                                (&value_ty, ret),
                                (TypeDesc::Scalar(ScalarType::F32), TypeDesc::Scalar(ScalarType::I32))
                                    | (TypeDesc::Scalar(ScalarType::F32), TypeDesc::Scalar(ScalarType::F16))
                                    | (TypeDesc::Scalar(ScalarType::I32), TypeDesc::Scalar(ScalarType::U32))
                            );
                            if narrowing {
                                self.diag
                                    .warning(
                                        codes::NARROWING_CONVERSION,
                                        format!("returning `{}` narrows to `{}`", value_ty, ret),
                                    )
                                    .span(*span)
                                    .emit();
                            } else {
                                self.diag
                                    .error(
                                        codes::RETURN_TYPE_MISMATCH,
                                        format!("return type mismatch: expected `{}`, found `{}`", ret, value_ty),
                                    )
                                    .span(*span)
                                    .emit();
                            }
                        }
                    }
                    (Some(ret), None, _) if !ret.is_error() => {
                        self.diag
                            .error(
                                codes::RETURN_TYPE_MISMATCH,
                                format!("expected a `{}` return value", ret),
                            )
                            .span(*span)
                            .emit();
                    }
                    _ => {}
                }
            }
            Stmt::Block(block) => self.infer_block(block),
            Stmt::Expr { expr, .. } => {
                self.infer_expr(expr);
            }
        }
    }

    fn check_condition(&mut self, cond: &Expr) {
        let ty = self.infer_expr(cond);
        if !ty.is_error() && ty != TypeDesc::BOOL {
            self.diag
                .error(codes::TYPE_MISMATCH, format!("condition must be `bool`, found `{}`", ty))
                .span(cond.span())
                .emit();
        }
    }
}

/// Implicit conversions allowed on `return`: i32/u32 widen to f32.
fn returnable(from: &TypeDesc, to: &TypeDesc) -> bool {
    matches!(
        (from, to),
        (TypeDesc::Scalar(f), TypeDesc::Scalar(t)) if f.is_integer() && t.is_float()
    )
}

/// Whether every control-flow path through `stmts` ends in a `return`.
pub fn always_returns(stmts: &[Stmt]) -> bool {
    for stmt in stmts {
        match stmt {
            Stmt::Return { .. } => return true,
            Stmt::If {
                then_branch,
                else_branch: Some(else_branch),
                ..
            } => {
                if always_returns(&then_branch.stmts) && always_returns(&else_branch.stmts) {
                    return true;
                }
            }
            Stmt::Block(block) => {
                if always_returns(&block.stmts) {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}
