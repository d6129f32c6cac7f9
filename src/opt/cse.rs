//! Common-subexpression elimination.
//!
//! Pure initializer expressions are hashed by structural identity within a
//! block; a `let` that would bind an already-available expression reuses the
//! earlier binding instead. First-written wins on identical hashes. Purity
//! excludes texture accesses and atomics.
use crate::{
    hir::{is_cse_pure, vars_written, walk_expr, Expr, Module, Stmt},
    opt::{OptStats, Pass},
};
use smol_str::SmolStr;
use std::collections::HashMap;

pub(crate) struct CommonSubexpressionElimination;

impl Pass for CommonSubexpressionElimination {
    fn name(&self) -> &'static str {
        "common-subexpression-elimination"
    }

    fn min_level(&self) -> u8 {
        2
    }

    fn run(&self, module: &mut Module, stats: &mut OptStats) -> bool {
        let mut changed = false;
        for func in module.functions.iter_mut() {
            let mut available = HashMap::new();
            process_block(&mut func.body, &mut available, stats, &mut changed);
        }
        changed
    }
}

/// Drops every available expression that mentions `name` or is bound to it.
fn invalidate(available: &mut HashMap<Expr, SmolStr>, name: &SmolStr) {
    available.retain(|expr, bound| {
        if bound == name {
            return false;
        }
        let mut mentions = false;
        walk_expr(expr, &mut |e| {
            if matches!(e, Expr::Ident(n) if n == name) {
                mentions = true;
            }
        });
        !mentions
    });
}

/// Non-trivial candidates only; reusing a binding for a literal or a bare
/// identifier would not save anything.
fn is_candidate(expr: &Expr) -> bool {
    !expr.is_literal() && !matches!(expr, Expr::Ident(_)) && is_cse_pure(expr)
}

fn process_block(
    stmts: &mut Vec<Stmt>,
    available: &mut HashMap<Expr, SmolStr>,
    stats: &mut OptStats,
    changed: &mut bool,
) {
    for stmt in stmts.iter_mut() {
        match stmt {
            Stmt::Let { name, init, .. } => {
                if is_candidate(init) {
                    if let Some(prev) = available.get(init) {
                        *init = Expr::Ident(prev.clone());
                        stats.cse_replaced += 1;
                        *changed = true;
                    } else {
                        invalidate(available, name);
                        available.insert(init.clone(), name.clone());
                        continue;
                    }
                }
                invalidate(available, name);
            }
            Stmt::Var { name, .. } => invalidate(available, name),
            Stmt::Assign { target, .. } => {
                if let Some(name) = crate::hir::root_ident(target).cloned() {
                    invalidate(available, &name);
                }
            }
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                // Branch-local values are not available afterwards.
                let mut then_avail = available.clone();
                process_block(then_branch, &mut then_avail, stats, changed);
                let mut written = vars_written(then_branch);
                if let Some(else_branch) = else_branch {
                    let mut else_avail = available.clone();
                    process_block(else_branch, &mut else_avail, stats, changed);
                    written.extend(vars_written(else_branch));
                }
                for name in written {
                    invalidate(available, &name);
                }
            }
            Stmt::For {
                init, step, body, ..
            } => {
                // Loop bodies re-execute; start from nothing and poison every
                // name the loop writes.
                let mut written = vars_written(body);
                if let Some(init) = init {
                    written.extend(vars_written(std::slice::from_ref(&**init)));
                }
                if let Some(step) = step {
                    written.extend(vars_written(std::slice::from_ref(&**step)));
                }
                let mut loop_avail = HashMap::new();
                process_block(body, &mut loop_avail, stats, changed);
                for name in written {
                    invalidate(available, &name);
                }
            }
            Stmt::While { body, .. } => {
                let written = vars_written(body);
                let mut loop_avail = HashMap::new();
                process_block(body, &mut loop_avail, stats, changed);
                for name in written {
                    invalidate(available, &name);
                }
            }
            Stmt::Block(block) => {
                let mut block_avail = available.clone();
                process_block(block, &mut block_avail, stats, changed);
                for name in vars_written(block) {
                    invalidate(available, &name);
                }
            }
            Stmt::Return { .. } | Stmt::Expr { .. } => {
                // Increment/decrement in expression statements writes.
                for name in vars_written(std::slice::from_ref(stmt)) {
                    invalidate(available, &name);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::ast::BinOp;

    fn let_stmt(name: &str, init: Expr) -> Stmt {
        Stmt::Let {
            name: name.into(),
            ty: None,
            init,
            loc: None,
        }
    }

    fn run(body: Vec<Stmt>) -> (Vec<Stmt>, OptStats) {
        let mut module = Module::default();
        module.functions.push(crate::hir::Function {
            name: "f".into(),
            stage: None,
            entry_point: false,
            workgroup_size: None,
            params: vec![],
            ret: None,
            ret_attrs: vec![],
            body,
            loc: None,
        });
        let mut stats = OptStats::default();
        CommonSubexpressionElimination.run(&mut module, &mut stats);
        (module.functions.remove(0).body, stats)
    }

    #[test]
    fn repeated_pure_expression_reuses_first_binding() {
        let sum = Expr::binary(BinOp::Add, Expr::ident("a"), Expr::ident("b"));
        let (body, stats) = run(vec![let_stmt("x", sum.clone()), let_stmt("y", sum)]);
        assert_eq!(stats.cse_replaced, 1);
        match &body[1] {
            Stmt::Let { init, .. } => assert_eq!(*init, Expr::ident("x")),
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn assignment_invalidates() {
        let sum = Expr::binary(BinOp::Add, Expr::ident("a"), Expr::ident("b"));
        let (body, stats) = run(vec![
            let_stmt("x", sum.clone()),
            Stmt::Assign {
                target: Expr::ident("a"),
                op: None,
                value: Expr::FloatConst(1.0),
                loc: None,
            },
            let_stmt("y", sum.clone()),
        ]);
        assert_eq!(stats.cse_replaced, 0);
        match &body[2] {
            Stmt::Let { init, .. } => assert_eq!(*init, sum),
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn texture_samples_are_not_merged() {
        let sample = Expr::call(
            "textureSample",
            vec![Expr::ident("tex"), Expr::ident("samp"), Expr::ident("uv")],
        );
        let (_, stats) = run(vec![let_stmt("x", sample.clone()), let_stmt("y", sample)]);
        assert_eq!(stats.cse_replaced, 0);
    }
}
