//! Constant folding.
use crate::{
    hir::{is_cse_pure, map_stmt_exprs, Expr, Module},
    opt::{OptStats, Pass},
    syntax::ast::BinOp,
};

pub(crate) struct ConstantFolding;

impl Pass for ConstantFolding {
    fn name(&self) -> &'static str {
        "constant-folding"
    }

    fn min_level(&self) -> u8 {
        1
    }

    fn run(&self, module: &mut Module, stats: &mut OptStats) -> bool {
        let mut changed = false;
        let mut fold = |expr: Expr| {
            let folded = fold_expr(expr);
            if let Some(folded) = folded.1 {
                stats.constants_folded += 1;
                changed = true;
                folded
            } else {
                folded.0
            }
        };
        for constant in module.consts.iter_mut() {
            let init = std::mem::replace(&mut constant.init, Expr::BoolConst(false));
            constant.init = crate::hir::map_expr(init, &mut fold);
        }
        for func in module.functions.iter_mut() {
            for stmt in func.body.iter_mut() {
                map_stmt_exprs(stmt, &mut fold);
            }
        }
        changed
    }
}

/// Returns `(original, None)` when nothing folds, `(_, Some(folded))` on a
/// rewrite.
fn fold_expr(expr: Expr) -> (Expr, Option<Expr>) {
    match &expr {
        Expr::Binary { op, left, right } => {
            if let Some(folded) = fold_binary(*op, left, right) {
                return (expr, Some(folded));
            }
        }
        Expr::Unary {
            op: crate::syntax::ast::UnaryOp::Neg,
            expr: inner,
        } => match **inner {
            Expr::IntConst(v) => return (expr, Some(Expr::IntConst(v.wrapping_neg()))),
            Expr::FloatConst(v) => return (expr, Some(Expr::FloatConst(-v))),
            _ => {}
        },
        Expr::Call { func, args } => {
            if let Some(folded) = fold_call(func, args) {
                return (expr, Some(folded));
            }
        }
        _ => {}
    }
    (expr, None)
}

fn fold_binary(op: BinOp, left: &Expr, right: &Expr) -> Option<Expr> {
    // Integer arithmetic stays exact; mixed or float operands fold in f64.
    if let (Expr::IntConst(a), Expr::IntConst(b)) = (left, right) {
        let (a, b) = (*a, *b);
        let value = match op {
            BinOp::Add => Expr::IntConst(a.wrapping_add(b)),
            BinOp::Sub => Expr::IntConst(a.wrapping_sub(b)),
            BinOp::Mul => Expr::IntConst(a.wrapping_mul(b)),
            BinOp::Div => Expr::IntConst(a.checked_div(b)?),
            BinOp::Mod => Expr::IntConst(a.checked_rem(b)?),
            BinOp::Shl => Expr::IntConst(a.checked_shl(u32::try_from(b).ok()?)?),
            BinOp::Shr => Expr::IntConst(a.checked_shr(u32::try_from(b).ok()?)?),
            BinOp::BitAnd => Expr::IntConst(a & b),
            BinOp::BitOr => Expr::IntConst(a | b),
            BinOp::BitXor => Expr::IntConst(a ^ b),
            BinOp::Eq => Expr::BoolConst(a == b),
            BinOp::Ne => Expr::BoolConst(a != b),
            BinOp::Lt => Expr::BoolConst(a < b),
            BinOp::Le => Expr::BoolConst(a <= b),
            BinOp::Gt => Expr::BoolConst(a > b),
            BinOp::Ge => Expr::BoolConst(a >= b),
            BinOp::And | BinOp::Or => return None,
        };
        return Some(value);
    }

    if let (Expr::BoolConst(a), Expr::BoolConst(b)) = (left, right) {
        return match op {
            BinOp::And => Some(Expr::BoolConst(*a && *b)),
            BinOp::Or => Some(Expr::BoolConst(*a || *b)),
            BinOp::Eq => Some(Expr::BoolConst(a == b)),
            BinOp::Ne => Some(Expr::BoolConst(a != b)),
            _ => None,
        };
    }

    let (a, b) = (left.as_number()?, right.as_number()?);
    if !matches!(left, Expr::FloatConst(_)) && !matches!(right, Expr::FloatConst(_)) {
        return None;
    }
    let value = match op {
        BinOp::Add => Expr::FloatConst(a + b),
        BinOp::Sub => Expr::FloatConst(a - b),
        BinOp::Mul => Expr::FloatConst(a * b),
        BinOp::Div => {
            if b == 0.0 {
                return None;
            }
            Expr::FloatConst(a / b)
        }
        BinOp::Mod => {
            if b == 0.0 {
                return None;
            }
            Expr::FloatConst(a % b)
        }
        BinOp::Eq => Expr::BoolConst(a == b),
        BinOp::Ne => Expr::BoolConst(a != b),
        BinOp::Lt => Expr::BoolConst(a < b),
        BinOp::Le => Expr::BoolConst(a <= b),
        BinOp::Gt => Expr::BoolConst(a > b),
        BinOp::Ge => Expr::BoolConst(a >= b),
        _ => return None,
    };
    Some(value)
}

fn fold_call(func: &str, args: &[Expr]) -> Option<Expr> {
    match (func, args) {
        ("sin", [arg]) if arg.is_number(0.0) => Some(Expr::FloatConst(0.0)),
        ("cos", [arg]) if arg.is_number(0.0) => Some(Expr::FloatConst(1.0)),
        ("sqrt", [arg]) if arg.is_number(0.0) => Some(Expr::FloatConst(0.0)),
        ("sqrt", [arg]) if arg.is_number(1.0) => Some(Expr::FloatConst(1.0)),
        ("pow", [base, exponent]) if is_cse_pure(base) => match exponent.as_number() {
            Some(e) if e == 2.0 => Some(Expr::binary(BinOp::Mul, base.clone(), base.clone())),
            Some(e) if e == 3.0 => Some(Expr::binary(
                BinOp::Mul,
                Expr::binary(BinOp::Mul, base.clone(), base.clone()),
                base.clone(),
            )),
            Some(e) if e == 0.5 => Some(Expr::call("sqrt", vec![base.clone()])),
            Some(e) if e == -1.0 => Some(Expr::binary(BinOp::Div, Expr::FloatConst(1.0), base.clone())),
            _ => None,
        },
        ("abs", [Expr::FloatConst(v)]) => Some(Expr::FloatConst(v.abs())),
        ("abs", [Expr::IntConst(v)]) => Some(Expr::IntConst(v.wrapping_abs())),
        ("floor", [Expr::FloatConst(v)]) => Some(Expr::FloatConst(v.floor())),
        ("ceil", [Expr::FloatConst(v)]) => Some(Expr::FloatConst(v.ceil())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold_once(expr: Expr) -> Expr {
        crate::hir::map_expr(expr, &mut |e| {
            let (orig, folded) = fold_expr(e);
            folded.unwrap_or(orig)
        })
    }

    #[test]
    fn arithmetic_folds_in_one_sweep() {
        // (2 + 3) * 4 => 20
        let expr = Expr::binary(
            BinOp::Mul,
            Expr::binary(BinOp::Add, Expr::IntConst(2), Expr::IntConst(3)),
            Expr::IntConst(4),
        );
        assert_eq!(fold_once(expr), Expr::IntConst(20));
    }

    #[test]
    fn division_by_zero_stays() {
        let expr = Expr::binary(BinOp::Div, Expr::IntConst(1), Expr::IntConst(0));
        assert_eq!(fold_once(expr.clone()), expr);
    }

    #[test]
    fn trig_identities() {
        assert_eq!(fold_once(Expr::call("sin", vec![Expr::FloatConst(0.0)])), Expr::FloatConst(0.0));
        assert_eq!(fold_once(Expr::call("cos", vec![Expr::FloatConst(0.0)])), Expr::FloatConst(1.0));
    }

    #[test]
    fn pow_expansion() {
        let x = Expr::ident("x");
        assert_eq!(
            fold_once(Expr::call("pow", vec![x.clone(), Expr::FloatConst(2.0)])),
            Expr::binary(BinOp::Mul, x.clone(), x.clone())
        );
        assert_eq!(
            fold_once(Expr::call("pow", vec![x.clone(), Expr::FloatConst(0.5)])),
            Expr::call("sqrt", vec![x])
        );
    }
}
