//! Peephole rewrites over small expression shapes.
use crate::{
    hir::{map_stmt_exprs, Expr, Module},
    opt::{is_float_expr, OptStats, Pass, TypeEnv},
    syntax::ast::BinOp,
};

pub(crate) struct Peephole;

impl Pass for Peephole {
    fn name(&self) -> &'static str {
        "peephole"
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
            let mut rewrite = |expr: Expr| match rewrite_expr(expr, env) {
                (_, Some(rewritten)) => {
                    stats.peephole_rewritten += 1;
                    changed = true;
                    rewritten
                }
                (original, None) => original,
            };
            for stmt in func.body.iter_mut() {
                map_stmt_exprs(stmt, &mut rewrite);
            }
        }
        changed
    }
}

/// Matches `min(x, 1)` / `max(x, 0)` style calls and returns the non-bound
/// operand.
fn clamp_arm<'e>(expr: &'e Expr, func: &str, bound: f64) -> Option<&'e Expr> {
    match expr {
        Expr::Call { func: f, args } if f == func && args.len() == 2 => {
            if args[1].is_number(bound) {
                Some(&args[0])
            } else if args[0].is_number(bound) {
                Some(&args[1])
            } else {
                None
            }
        }
        _ => None,
    }
}

fn rewrite_expr(expr: Expr, env: &TypeEnv) -> (Expr, Option<Expr>) {
    match &expr {
        // (a * b) + c and c + (a * b) fuse into fma for float operands.
        Expr::Binary {
            op: BinOp::Add,
            left,
            right,
        } => {
            let (product, addend) = if matches!(**left, Expr::Binary { op: BinOp::Mul, .. }) {
                (left, right)
            } else if matches!(**right, Expr::Binary { op: BinOp::Mul, .. }) {
                (right, left)
            } else {
                return (expr, None);
            };
            if let Expr::Binary {
                op: BinOp::Mul,
                left: a,
                right: b,
            } = &**product
            {
                if is_float_expr(a, env) || is_float_expr(b, env) || is_float_expr(addend, env) {
                    // x + x produced by strength reduction stays an addition.
                    let fused = Expr::call("fma", vec![(**a).clone(), (**b).clone(), (**addend).clone()]);
                    return (expr, Some(fused));
                }
            }
            (expr, None)
        }
        // max(min(x, 1), 0) and min(max(x, 0), 1) are saturate(x).
        Expr::Call { func, args } if func == "max" && args.len() == 2 => {
            let inner = if args[1].is_number(0.0) {
                clamp_arm(&args[0], "min", 1.0)
            } else if args[0].is_number(0.0) {
                clamp_arm(&args[1], "min", 1.0)
            } else {
                None
            };
            match inner {
                Some(x) => {
                    let saturated = Expr::call("saturate", vec![x.clone()]);
                    (expr.clone(), Some(saturated))
                }
                None => (expr, None),
            }
        }
        Expr::Call { func, args } if func == "min" && args.len() == 2 => {
            let inner = if args[1].is_number(1.0) {
                clamp_arm(&args[0], "max", 0.0)
            } else if args[0].is_number(1.0) {
                clamp_arm(&args[1], "max", 0.0)
            } else {
                None
            };
            match inner {
                Some(x) => {
                    let saturated = Expr::call("saturate", vec![x.clone()]);
                    (expr.clone(), Some(saturated))
                }
                None => (expr, None),
            }
        }
        // length(a - b) is distance(a, b).
        Expr::Call { func, args } if func == "length" && args.len() == 1 => {
            if let Expr::Binary {
                op: BinOp::Sub,
                left,
                right,
            } = &args[0]
            {
                let distance = Expr::call("distance", vec![(**left).clone(), (**right).clone()]);
                return (expr.clone(), Some(distance));
            }
            (expr, None)
        }
        // x / length(x) is normalize(x).
        Expr::Binary {
            op: BinOp::Div,
            left,
            right,
        } => {
            if let Expr::Call { func, args } = &**right {
                if func == "length" && args.len() == 1 && args[0] == **left {
                    let normalized = Expr::call("normalize", vec![(**left).clone()]);
                    return (expr.clone(), Some(normalized));
                }
            }
            (expr, None)
        }
        _ => (expr, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hir::{map_expr, Function, Param};
    use crate::ty::TypeDesc;

    fn rewrite(expr: Expr) -> Expr {
        let module = Module::default();
        let func = Function {
            name: "f".into(),
            stage: None,
            entry_point: false,
            workgroup_size: None,
            params: vec![
                Param {
                    name: "a".into(),
                    ty: TypeDesc::F32,
                    attrs: vec![],
                },
                Param {
                    name: "b".into(),
                    ty: TypeDesc::VEC3F,
                    attrs: vec![],
                },
            ],
            ret: None,
            ret_attrs: vec![],
            body: vec![],
            loc: None,
        };
        let env = TypeEnv::for_function(&module, &func);
        map_expr(expr, &mut |e| {
            let (orig, rewritten) = rewrite_expr(e, &env);
            rewritten.unwrap_or(orig)
        })
    }

    #[test]
    fn fma_fusion() {
        let fused = rewrite(Expr::binary(
            BinOp::Add,
            Expr::binary(BinOp::Mul, Expr::ident("a"), Expr::ident("a")),
            Expr::FloatConst(1.0),
        ));
        assert_eq!(
            fused,
            Expr::call(
                "fma",
                vec![Expr::ident("a"), Expr::ident("a"), Expr::FloatConst(1.0)]
            )
        );
    }

    #[test]
    fn integer_multiply_add_is_not_fused() {
        let expr = Expr::binary(
            BinOp::Add,
            Expr::binary(BinOp::Mul, Expr::ident("i"), Expr::IntConst(4)),
            Expr::IntConst(1),
        );
        assert_eq!(rewrite(expr.clone()), expr);
    }

    #[test]
    fn saturate_patterns() {
        let x = Expr::ident("a");
        let outer_max = Expr::call(
            "max",
            vec![
                Expr::call("min", vec![x.clone(), Expr::FloatConst(1.0)]),
                Expr::FloatConst(0.0),
            ],
        );
        assert_eq!(rewrite(outer_max), Expr::call("saturate", vec![x.clone()]));

        let outer_min = Expr::call(
            "min",
            vec![
                Expr::call("max", vec![x.clone(), Expr::FloatConst(0.0)]),
                Expr::FloatConst(1.0),
            ],
        );
        assert_eq!(rewrite(outer_min), Expr::call("saturate", vec![x]));
    }

    #[test]
    fn length_of_difference_is_distance() {
        let expr = Expr::call(
            "length",
            vec![Expr::binary(BinOp::Sub, Expr::ident("a"), Expr::ident("b"))],
        );
        assert_eq!(
            rewrite(expr),
            Expr::call("distance", vec![Expr::ident("a"), Expr::ident("b")])
        );
    }

    #[test]
    fn self_division_by_length_is_normalize() {
        let b = Expr::ident("b");
        let expr = Expr::binary(
            BinOp::Div,
            b.clone(),
            Expr::call("length", vec![b.clone()]),
        );
        assert_eq!(rewrite(expr), Expr::call("normalize", vec![b]));
    }
}
