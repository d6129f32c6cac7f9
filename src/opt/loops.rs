//! Loop passes: invariant code motion and full unrolling.
use crate::{
    hir::{has_side_effects, is_cse_pure, vars_written, walk_expr, Expr, Module, Stmt},
    opt::{OptStats, Pass},
    syntax::ast::{BinOp, UnaryOp},
};
use smol_str::SmolStr;
use std::collections::{HashMap, HashSet};

// ----------------------------------------------------------------------
// Loop-invariant code motion
// ----------------------------------------------------------------------

pub(crate) struct LoopInvariantCodeMotion;

impl Pass for LoopInvariantCodeMotion {
    fn name(&self) -> &'static str {
        "loop-invariant-code-motion"
    }

    fn min_level(&self) -> u8 {
        3
    }

    fn run(&self, module: &mut Module, stats: &mut OptStats) -> bool {
        let mut changed = false;
        for func in module.functions.iter_mut() {
            let mut decl_counts = HashMap::new();
            count_decls(&func.body, &mut decl_counts);
            hoist_in_block(&mut func.body, &decl_counts, stats, &mut changed);
        }
        changed
    }
}

fn count_decls(stmts: &[Stmt], counts: &mut HashMap<SmolStr, u32>) {
    for stmt in stmts {
        match stmt {
            Stmt::Let { name, .. } | Stmt::Var { name, .. } => {
                *counts.entry(name.clone()).or_insert(0) += 1;
            }
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                count_decls(then_branch, counts);
                if let Some(else_branch) = else_branch {
                    count_decls(else_branch, counts);
                }
            }
            Stmt::For { init, body, .. } => {
                if let Some(init) = init {
                    count_decls(std::slice::from_ref(&**init), counts);
                }
                count_decls(body, counts);
            }
            Stmt::While { body, .. } => count_decls(body, counts),
            Stmt::Block(block) => count_decls(block, counts),
            _ => {}
        }
    }
}

fn references_any(expr: &Expr, names: &HashSet<SmolStr>) -> bool {
    let mut found = false;
    walk_expr(expr, &mut |e| {
        if matches!(e, Expr::Ident(n) if names.contains(n)) {
            found = true;
        }
    });
    found
}

fn hoist_in_block(
    stmts: &mut Vec<Stmt>,
    decl_counts: &HashMap<SmolStr, u32>,
    stats: &mut OptStats,
    changed: &mut bool,
) {
    let mut i = 0;
    while i < stmts.len() {
        // Recurse first so inner loops hoist into their own pre-headers
        // before the outer loop is considered.
        match &mut stmts[i] {
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                hoist_in_block(then_branch, decl_counts, stats, changed);
                if let Some(else_branch) = else_branch {
                    hoist_in_block(else_branch, decl_counts, stats, changed);
                }
            }
            Stmt::Block(block) => hoist_in_block(block, decl_counts, stats, changed),
            Stmt::For { body, .. } | Stmt::While { body, .. } => {
                hoist_in_block(body, decl_counts, stats, changed);
            }
            _ => {}
        }

        let hoisted = match &mut stmts[i] {
            Stmt::For {
                init, step, body, ..
            } => {
                let mut written = vars_written(body);
                if let Some(init) = init {
                    written.extend(vars_written(std::slice::from_ref(&**init)));
                }
                if let Some(step) = step {
                    written.extend(vars_written(std::slice::from_ref(&**step)));
                }
                extract_invariants(body, &written, decl_counts)
            }
            Stmt::While { body, .. } => {
                let written = vars_written(body);
                extract_invariants(body, &written, decl_counts)
            }
            _ => vec![],
        };

        if !hoisted.is_empty() {
            stats.stmts_hoisted += hoisted.len() as u32;
            *changed = true;
            let count = hoisted.len();
            for (offset, stmt) in hoisted.into_iter().enumerate() {
                stmts.insert(i + offset, stmt);
            }
            i += count;
        }
        i += 1;
    }
}

/// Removes and returns top-level `let` statements whose pure initializer
/// references nothing the loop writes. Only names declared exactly once in
/// the function move, so the hoist cannot collide with an outer declaration.
fn extract_invariants(
    body: &mut Vec<Stmt>,
    written: &HashSet<SmolStr>,
    decl_counts: &HashMap<SmolStr, u32>,
) -> Vec<Stmt> {
    let mut hoisted = Vec::new();
    let mut i = 0;
    while i < body.len() {
        let invariant = match &body[i] {
            Stmt::Let { name, init, .. } => {
                decl_counts.get(name).copied() == Some(1)
                    && is_cse_pure(init)
                    && !has_side_effects(init)
                    && !references_any(init, written)
            }
            _ => false,
        };
        if invariant {
            hoisted.push(body.remove(i));
        } else {
            i += 1;
        }
    }
    hoisted
}

// ----------------------------------------------------------------------
// Loop unrolling
// ----------------------------------------------------------------------

pub(crate) struct LoopUnrolling {
    pub threshold: u32,
}

impl Pass for LoopUnrolling {
    fn name(&self) -> &'static str {
        "loop-unrolling"
    }

    fn min_level(&self) -> u8 {
        3
    }

    fn run(&self, module: &mut Module, stats: &mut OptStats) -> bool {
        let mut changed = false;
        for func in module.functions.iter_mut() {
            unroll_in_block(&mut func.body, self.threshold, stats, &mut changed);
        }
        changed
    }
}

fn unroll_in_block(stmts: &mut Vec<Stmt>, threshold: u32, stats: &mut OptStats, changed: &mut bool) {
    let mut i = 0;
    while i < stmts.len() {
        match &mut stmts[i] {
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                unroll_in_block(then_branch, threshold, stats, changed);
                if let Some(else_branch) = else_branch {
                    unroll_in_block(else_branch, threshold, stats, changed);
                }
            }
            Stmt::Block(block) => unroll_in_block(block, threshold, stats, changed),
            Stmt::For { body, .. } | Stmt::While { body, .. } => {
                unroll_in_block(body, threshold, stats, changed);
            }
            _ => {}
        }

        if let Stmt::For { .. } = &stmts[i] {
            if let Some(expanded) = try_unroll(&stmts[i], threshold) {
                stats.loops_unrolled += 1;
                *changed = true;
                stmts.splice(i..=i, expanded);
                // Skip over the expansion; its statements contain no loops.
            }
        }
        i += 1;
    }
}

/// The trip values of a counted loop: literal init, `i CMP literal` test and
/// constant additive step. `None` when the shape or trip count disqualifies
/// the loop.
fn trip_values(init: &Stmt, cond: &Expr, step: &Stmt, threshold: u32) -> Option<(SmolStr, Vec<i64>)> {
    let (var, start) = match init {
        Stmt::Let { name, init, .. } => (name.clone(), as_int(init)?),
        Stmt::Var {
            name,
            init: Some(init),
            ..
        } => (name.clone(), as_int(init)?),
        _ => return None,
    };

    let (op, limit) = match cond {
        Expr::Binary { op, left, right } => match (&**left, as_int(right)) {
            (Expr::Ident(name), Some(limit)) if *name == var => (*op, limit),
            _ => return None,
        },
        _ => return None,
    };

    let delta = step_delta(step, &var)?;
    if delta == 0 {
        return None;
    }

    let mut values = Vec::new();
    let mut value = start;
    loop {
        let keep_going = match op {
            BinOp::Lt => value < limit,
            BinOp::Le => value <= limit,
            BinOp::Gt => value > limit,
            BinOp::Ge => value >= limit,
            BinOp::Ne => value != limit,
            _ => return None,
        };
        if !keep_going {
            break;
        }
        values.push(value);
        if values.len() as u32 > threshold {
            return None;
        }
        value = value.checked_add(delta)?;
    }
    Some((var, values))
}

fn as_int(expr: &Expr) -> Option<i64> {
    match *expr {
        Expr::IntConst(v) => Some(v),
        Expr::UintConst(v) => Some(v as i64),
        _ => None,
    }
}

/// The additive step applied to `var`, from `i++`, `i--`, `i += c` or
/// `i -= c`.
fn step_delta(step: &Stmt, var: &SmolStr) -> Option<i64> {
    match step {
        Stmt::Expr {
            expr:
                Expr::Unary {
                    op,
                    expr: target,
                },
            ..
        } => match (&**target, *op) {
            (Expr::Ident(name), UnaryOp::PostIncrement | UnaryOp::PreIncrement) if name == var => Some(1),
            (Expr::Ident(name), UnaryOp::PostDecrement | UnaryOp::PreDecrement) if name == var => Some(-1),
            _ => None,
        },
        Stmt::Assign {
            target: Expr::Ident(name),
            op: Some(op),
            value,
            ..
        } if name == var => match op {
            BinOp::Add => as_int(value),
            BinOp::Sub => as_int(value).map(|v| -v),
            _ => None,
        },
        _ => None,
    }
}

fn try_unroll(stmt: &Stmt, threshold: u32) -> Option<Vec<Stmt>> {
    let (init, cond, step, body) = match stmt {
        Stmt::For {
            init: Some(init),
            cond: Some(cond),
            step: Some(step),
            body,
            ..
        } => (init, cond, step, body),
        _ => return None,
    };
    let (var, values) = trip_values(init, cond, step, threshold)?;

    // The body must leave the induction variable alone.
    if vars_written(body).contains(&var) {
        return None;
    }

    let mut expanded = Vec::with_capacity(values.len());
    for value in values {
        let iteration: Vec<Stmt> = body
            .iter()
            .map(|stmt| subst_stmt(stmt.clone(), &var, &Expr::IntConst(value)))
            .collect();
        // Each iteration keeps its own scope so local names stay distinct.
        expanded.push(Stmt::Block(iteration));
    }
    Some(expanded)
}

/// Replaces the induction variable in every expression of the statement.
fn subst_stmt(mut stmt: Stmt, name: &str, replacement: &Expr) -> Stmt {
    crate::hir::map_stmt_exprs(&mut stmt, &mut |expr| match expr {
        Expr::Ident(ref n) if n == name => replacement.clone(),
        other => other,
    });
    stmt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hir::Function;

    fn function(body: Vec<Stmt>) -> Function {
        Function {
            name: "f".into(),
            stage: None,
            entry_point: false,
            workgroup_size: None,
            params: vec![],
            ret: None,
            ret_attrs: vec![],
            body,
            loc: None,
        }
    }

    fn counted_loop(limit: i64, body: Vec<Stmt>) -> Stmt {
        Stmt::For {
            init: Some(Box::new(Stmt::Let {
                name: "i".into(),
                ty: Some(crate::ty::TypeDesc::I32),
                init: Expr::IntConst(0),
                loc: None,
            })),
            cond: Some(Expr::binary(BinOp::Lt, Expr::ident("i"), Expr::IntConst(limit))),
            step: Some(Box::new(Stmt::Expr {
                expr: Expr::Unary {
                    op: UnaryOp::PostIncrement,
                    expr: Box::new(Expr::ident("i")),
                },
                loc: None,
            })),
            body,
            loc: None,
        }
    }

    #[test]
    fn small_constant_loop_unrolls_fully() {
        let mut module = Module::default();
        module.functions.push(function(vec![counted_loop(
            3,
            vec![Stmt::Assign {
                target: Expr::ident("acc"),
                op: Some(BinOp::Add),
                value: Expr::ident("i"),
                loc: None,
            }],
        )]));
        let mut stats = OptStats::default();
        assert!(LoopUnrolling { threshold: 8 }.run(&mut module, &mut stats));
        assert_eq!(stats.loops_unrolled, 1);
        let body = &module.functions[0].body;
        assert_eq!(body.len(), 3);
        match &body[2] {
            Stmt::Block(stmts) => match &stmts[0] {
                Stmt::Assign { value, .. } => assert_eq!(*value, Expr::IntConst(2)),
                other => panic!("unexpected stmt: {other:?}"),
            },
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn loop_above_threshold_is_kept() {
        let mut module = Module::default();
        module.functions.push(function(vec![counted_loop(100, vec![])]));
        let mut stats = OptStats::default();
        assert!(!LoopUnrolling { threshold: 8 }.run(&mut module, &mut stats));
        assert!(matches!(module.functions[0].body[0], Stmt::For { .. }));
    }

    #[test]
    fn invariant_let_is_hoisted() {
        let mut module = Module::default();
        module.functions.push(function(vec![counted_loop(
            4,
            vec![
                Stmt::Let {
                    name: "k".into(),
                    ty: None,
                    init: Expr::binary(BinOp::Mul, Expr::ident("scale"), Expr::FloatConst(2.0)),
                    loc: None,
                },
                Stmt::Assign {
                    target: Expr::ident("acc"),
                    op: Some(BinOp::Add),
                    value: Expr::binary(BinOp::Mul, Expr::ident("k"), Expr::ident("i")),
                    loc: None,
                },
            ],
        )]));
        let mut stats = OptStats::default();
        assert!(LoopInvariantCodeMotion.run(&mut module, &mut stats));
        assert_eq!(stats.stmts_hoisted, 1);
        assert!(matches!(module.functions[0].body[0], Stmt::Let { .. }));
        assert!(matches!(module.functions[0].body[1], Stmt::For { .. }));
    }

    #[test]
    fn variant_let_stays_in_the_loop() {
        let mut module = Module::default();
        module.functions.push(function(vec![counted_loop(
            4,
            vec![Stmt::Let {
                name: "k".into(),
                ty: None,
                init: Expr::binary(BinOp::Mul, Expr::ident("i"), Expr::FloatConst(2.0)),
                loc: None,
            }],
        )]));
        let mut stats = OptStats::default();
        assert!(!LoopInvariantCodeMotion.run(&mut module, &mut stats));
        assert_eq!(stats.stmts_hoisted, 0);
    }
}
