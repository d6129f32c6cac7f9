//! Strength reduction: divisions by small powers of two become
//! multiplications, doubling becomes addition.
use crate::{
    hir::{map_stmt_exprs, Expr, Module},
    opt::{is_float_expr, OptStats, Pass, TypeEnv},
    syntax::ast::BinOp,
};

pub(crate) struct StrengthReduction;

impl Pass for StrengthReduction {
    fn name(&self) -> &'static str {
        "strength-reduction"
    }

    fn min_level(&self) -> u8 {
        2
    }

    fn run(&self, module: &mut Module, stats: &mut OptStats) -> bool {
        let mut changed = false;
        let envs: Vec<TypeEnv> = module
            .functions
            .iter()
            .map(|func| TypeEnv::for_function(module, func))
            .collect();
        for (func, env) in module.functions.iter_mut().zip(&envs) {
            let mut reduce = |expr: Expr| match reduce_expr(expr, env) {
                (_, Some(reduced)) => {
                    stats.strength_reduced += 1;
                    changed = true;
                    reduced
                }
                (original, None) => original,
            };
            for stmt in func.body.iter_mut() {
                map_stmt_exprs(stmt, &mut reduce);
            }
        }
        changed
    }
}

fn reciprocal(divisor: f64) -> Option<f64> {
    match divisor {
        d if d == 2.0 => Some(0.5),
        d if d == 4.0 => Some(0.25),
        d if d == 8.0 => Some(0.125),
        _ => None,
    }
}

fn reduce_expr(expr: Expr, env: &TypeEnv) -> (Expr, Option<Expr>) {
    if let Expr::Binary { op, left, right } = &expr {
        match op {
            // Float division only; integer division truncates.
            BinOp::Div => {
                if let Some(divisor) = right.as_number() {
                    if let Some(reciprocal) = reciprocal(divisor) {
                        if is_float_expr(left, env) || matches!(**right, Expr::FloatConst(_)) {
                            let reduced =
                                Expr::binary(BinOp::Mul, (**left).clone(), Expr::FloatConst(reciprocal));
                            return (expr, Some(reduced));
                        }
                    }
                }
            }
            BinOp::Mul => {
                // Doubling duplicates the operand, so keep it to names and
                // literals.
                let doubled = if right.is_number(2.0) {
                    Some(left)
                } else if left.is_number(2.0) {
                    Some(right)
                } else {
                    None
                };
                if let Some(x) = doubled {
                    if matches!(**x, Expr::Ident(_)) || x.is_literal() {
                        let reduced = Expr::binary(BinOp::Add, (**x).clone(), (**x).clone());
                        return (expr, Some(reduced));
                    }
                }
            }
            _ => {}
        }
    }
    (expr, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hir::{map_expr, Function};

    fn reduce(expr: Expr) -> Expr {
        let module = Module::default();
        let func = Function {
            name: "f".into(),
            stage: None,
            entry_point: false,
            workgroup_size: None,
            params: vec![crate::hir::Param {
                name: "x".into(),
                ty: crate::ty::TypeDesc::F32,
                attrs: vec![],
            }],
            ret: None,
            ret_attrs: vec![],
            body: vec![],
            loc: None,
        };
        let env = TypeEnv::for_function(&module, &func);
        map_expr(expr, &mut |e| {
            let (orig, reduced) = reduce_expr(e, &env);
            reduced.unwrap_or(orig)
        })
    }

    #[test]
    fn divisions_become_multiplications() {
        let x = Expr::ident("x");
        for (divisor, reciprocal) in [(2.0, 0.5), (4.0, 0.25), (8.0, 0.125)] {
            assert_eq!(
                reduce(Expr::binary(BinOp::Div, x.clone(), Expr::FloatConst(divisor))),
                Expr::binary(BinOp::Mul, x.clone(), Expr::FloatConst(reciprocal))
            );
        }
    }

    #[test]
    fn integer_division_is_left_alone() {
        let i = Expr::ident("i");
        let div = Expr::binary(BinOp::Div, i, Expr::IntConst(2));
        assert_eq!(reduce(div.clone()), div);
    }

    #[test]
    fn doubling_becomes_addition() {
        let x = Expr::ident("x");
        assert_eq!(
            reduce(Expr::binary(BinOp::Mul, x.clone(), Expr::FloatConst(2.0))),
            Expr::binary(BinOp::Add, x.clone(), x)
        );
    }

    #[test]
    fn doubling_does_not_duplicate_calls() {
        let call = Expr::call("sin", vec![Expr::ident("x")]);
        let mul = Expr::binary(BinOp::Mul, call, Expr::FloatConst(2.0));
        assert_eq!(reduce(mul.clone()), mul);
    }
}
