//! Algebraic simplification: identity and annihilator rewrites.
use crate::{
    hir::{has_side_effects, map_stmt_exprs, Expr, Module},
    opt::{is_float_expr, OptStats, Pass, TypeEnv},
    syntax::ast::{BinOp, UnaryOp},
};

pub(crate) struct AlgebraicSimplification;

impl Pass for AlgebraicSimplification {
    fn name(&self) -> &'static str {
        "algebraic-simplification"
    }

    fn min_level(&self) -> u8 {
        1
    }

    fn run(&self, module: &mut Module, stats: &mut OptStats) -> bool {
        let mut changed = false;
        let envs: Vec<TypeEnv> = module
            .functions
            .iter()
            .map(|func| TypeEnv::for_function(module, func))
            .collect();
        for (func, env) in module.functions.iter_mut().zip(&envs) {
            let mut simplify = |expr: Expr| match simplify_expr(expr, env) {
                (_, Some(simplified)) => {
                    stats.algebraic_simplified += 1;
                    changed = true;
                    simplified
                }
                (original, None) => original,
            };
            for stmt in func.body.iter_mut() {
                map_stmt_exprs(stmt, &mut simplify);
            }
        }
        changed
    }
}

/// A zero or one literal matching the (conservatively inferred) class of `x`.
fn unit_like(x: &Expr, env: &TypeEnv, value: f64) -> Expr {
    if is_float_expr(x, env) {
        Expr::FloatConst(value)
    } else {
        Expr::IntConst(value as i64)
    }
}

fn simplify_expr(expr: Expr, env: &TypeEnv) -> (Expr, Option<Expr>) {
    match &expr {
        Expr::Binary { op, left, right } => {
            let rewrite = match op {
                BinOp::Add => {
                    if right.is_number(0.0) {
                        Some((**left).clone())
                    } else if left.is_number(0.0) {
                        Some((**right).clone())
                    } else {
                        None
                    }
                }
                BinOp::Sub => {
                    if right.is_number(0.0) {
                        Some((**left).clone())
                    } else if left == right && !has_side_effects(left) {
                        Some(unit_like(left, env, 0.0))
                    } else {
                        None
                    }
                }
                BinOp::Mul => {
                    if right.is_number(1.0) {
                        Some((**left).clone())
                    } else if left.is_number(1.0) {
                        Some((**right).clone())
                    } else if right.is_number(0.0) && !has_side_effects(left) {
                        // The zero operand already has the right literal kind.
                        Some((**right).clone())
                    } else if left.is_number(0.0) && !has_side_effects(right) {
                        Some((**left).clone())
                    } else {
                        None
                    }
                }
                BinOp::Div => {
                    if right.is_number(1.0) {
                        Some((**left).clone())
                    } else if left == right && !has_side_effects(left) && !left.is_number(0.0) {
                        Some(unit_like(left, env, 1.0))
                    } else {
                        None
                    }
                }
                _ => None,
            };
            if let Some(rewrite) = rewrite {
                return (expr, Some(rewrite));
            }
        }
        Expr::Unary {
            op: UnaryOp::Neg,
            expr: inner,
        } => {
            if let Expr::Unary {
                op: UnaryOp::Neg,
                expr: innermost,
            } = &**inner
            {
                return (expr.clone(), Some((**innermost).clone()));
            }
        }
        Expr::Call { func, args } if func == "clamp" && args.len() == 3 => {
            let float_bounds = matches!(args[1], Expr::FloatConst(_)) || matches!(args[2], Expr::FloatConst(_));
            if args[1].is_number(0.0)
                && args[2].is_number(1.0)
                && (float_bounds || is_float_expr(&args[0], env))
            {
                return (expr.clone(), Some(Expr::call("saturate", vec![args[0].clone()])));
            }
        }
        _ => {}
    }
    (expr, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hir::{map_expr, Function, Module};

    fn simplify(expr: Expr) -> Expr {
        let module = Module::default();
        let func = Function {
            name: "f".into(),
            stage: None,
            entry_point: false,
            workgroup_size: None,
            params: vec![],
            ret: None,
            ret_attrs: vec![],
            body: vec![],
            loc: None,
        };
        let env = TypeEnv::for_function(&module, &func);
        map_expr(expr, &mut |e| {
            let (orig, rewritten) = simplify_expr(e, &env);
            rewritten.unwrap_or(orig)
        })
    }

    #[test]
    fn additive_identities() {
        let x = Expr::ident("x");
        assert_eq!(simplify(Expr::binary(BinOp::Add, x.clone(), Expr::FloatConst(0.0))), x);
        assert_eq!(simplify(Expr::binary(BinOp::Add, Expr::IntConst(0), x.clone())), x);
        assert_eq!(simplify(Expr::binary(BinOp::Sub, x.clone(), Expr::FloatConst(0.0))), x);
    }

    #[test]
    fn multiplicative_identities() {
        let x = Expr::ident("x");
        assert_eq!(simplify(Expr::binary(BinOp::Mul, x.clone(), Expr::FloatConst(1.0))), x);
        assert_eq!(simplify(Expr::binary(BinOp::Div, x.clone(), Expr::IntConst(1))), x);
        assert_eq!(
            simplify(Expr::binary(BinOp::Mul, x.clone(), Expr::FloatConst(0.0))),
            Expr::FloatConst(0.0)
        );
    }

    #[test]
    fn self_cancellation() {
        let x = Expr::ident("x");
        assert_eq!(
            simplify(Expr::binary(BinOp::Sub, x.clone(), x.clone())),
            Expr::IntConst(0)
        );
        assert_eq!(
            simplify(Expr::binary(BinOp::Div, x.clone(), x.clone())),
            Expr::IntConst(1)
        );
    }

    #[test]
    fn double_negation() {
        let x = Expr::ident("x");
        let neg2 = Expr::Unary {
            op: UnaryOp::Neg,
            expr: Box::new(Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(x.clone()),
            }),
        };
        assert_eq!(simplify(neg2), x);
    }

    #[test]
    fn clamp_to_saturate() {
        let x = Expr::ident("x");
        let clamp = Expr::call(
            "clamp",
            vec![x.clone(), Expr::FloatConst(0.0), Expr::FloatConst(1.0)],
        );
        assert_eq!(simplify(clamp), Expr::call("saturate", vec![x]));
    }
}
