//! Dead-code elimination.
//!
//! Three rewrites: statements after a `return` in the same block, variable
//! declarations whose name is never read, and functions unreachable from any
//! entry point.
use crate::{
    hir::{has_side_effects, walk_expr, Expr, Module, Stmt},
    opt::{OptStats, Pass},
};
use smol_str::SmolStr;
use std::collections::{HashMap, HashSet, VecDeque};

pub(crate) struct DeadCodeElimination;

impl Pass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "dead-code-elimination"
    }

    fn min_level(&self) -> u8 {
        1
    }

    fn run(&self, module: &mut Module, stats: &mut OptStats) -> bool {
        let mut changed = false;

        for func in module.functions.iter_mut() {
            changed |= drop_after_return(&mut func.body, stats);
            changed |= drop_unused_decls(&mut func.body, stats);
        }

        changed |= drop_unreachable_functions(module, stats);
        changed
    }
}

/// Truncates every block after its first `return`.
fn drop_after_return(stmts: &mut Vec<Stmt>, stats: &mut OptStats) -> bool {
    let mut changed = false;
    if let Some(pos) = stmts.iter().position(|s| matches!(s, Stmt::Return { .. })) {
        if pos + 1 < stmts.len() {
            stats.dead_stmts_removed += (stmts.len() - pos - 1) as u32;
            stmts.truncate(pos + 1);
            changed = true;
        }
    }
    for stmt in stmts.iter_mut() {
        match stmt {
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                changed |= drop_after_return(then_branch, stats);
                if let Some(else_branch) = else_branch {
                    changed |= drop_after_return(else_branch, stats);
                }
            }
            Stmt::For { body, .. } | Stmt::While { body, .. } => {
                changed |= drop_after_return(body, stats);
            }
            Stmt::Block(block) => changed |= drop_after_return(block, stats),
            _ => {}
        }
    }
    changed
}

/// Occurrences of each name that keep its declaration alive: any read, plus
/// any use other than being the root of an assignment target.
fn count_uses(stmts: &[Stmt], uses: &mut HashMap<SmolStr, u32>) {
    let mut count_expr = |expr: &Expr, uses: &mut HashMap<SmolStr, u32>| {
        walk_expr(expr, &mut |e| {
            if let Expr::Ident(name) = e {
                *uses.entry(name.clone()).or_insert(0) += 1;
            }
        });
    };
    for stmt in stmts {
        match stmt {
            Stmt::Let { init, .. } => count_expr(init, uses),
            Stmt::Var { init, .. } => {
                if let Some(init) = init {
                    count_expr(init, uses);
                }
            }
            Stmt::Assign { target, value, .. } => {
                // A bare identifier target is a pure write and does not keep
                // the declaration alive; member/index targets read the base.
                match target {
                    Expr::Ident(_) => {}
                    other => count_expr(other, uses),
                }
                count_expr(value, uses);
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                count_expr(cond, uses);
                count_uses(then_branch, uses);
                if let Some(else_branch) = else_branch {
                    count_uses(else_branch, uses);
                }
            }
            Stmt::For {
                init, cond, step, body, ..
            } => {
                if let Some(init) = init {
                    count_uses(std::slice::from_ref(&**init), uses);
                }
                if let Some(cond) = cond {
                    count_expr(cond, uses);
                }
                if let Some(step) = step {
                    count_uses(std::slice::from_ref(&**step), uses);
                }
                count_uses(body, uses);
            }
            Stmt::While { cond, body, .. } => {
                count_expr(cond, uses);
                count_uses(body, uses);
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    count_expr(value, uses);
                }
            }
            Stmt::Block(block) => count_uses(block, uses),
            Stmt::Expr { expr, .. } => count_expr(expr, uses),
        }
    }
}

/// Removes declarations whose name is never used, along with plain
/// assignments to them.
fn drop_unused_decls(body: &mut Vec<Stmt>, stats: &mut OptStats) -> bool {
    let mut uses = HashMap::new();
    count_uses(body, &mut uses);

    let dead = |name: &SmolStr| uses.get(name).copied().unwrap_or(0) == 0;
    let mut changed = false;
    retain_stmts(body, &mut |stmt| {
        let removable = match stmt {
            Stmt::Let { name, init, .. } => dead(name) && !has_side_effects(init),
            Stmt::Var { name, init, .. } => {
                dead(name) && init.as_ref().map_or(true, |init| !has_side_effects(init))
            }
            Stmt::Assign { target, value, .. } => match target {
                Expr::Ident(name) => dead(name) && !has_side_effects(value),
                _ => false,
            },
            _ => false,
        };
        if removable {
            stats.dead_stmts_removed += 1;
        }
        removable
    }, &mut changed);
    changed
}

/// Removes statements matching `remove` from every nested block.
fn retain_stmts(stmts: &mut Vec<Stmt>, remove: &mut impl FnMut(&Stmt) -> bool, changed: &mut bool) {
    stmts.retain(|stmt| {
        let removable = remove(stmt);
        if removable {
            *changed = true;
        }
        !removable
    });
    for stmt in stmts.iter_mut() {
        match stmt {
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                retain_stmts(then_branch, remove, changed);
                if let Some(else_branch) = else_branch {
                    retain_stmts(else_branch, remove, changed);
                }
            }
            Stmt::For { body, .. } | Stmt::While { body, .. } => retain_stmts(body, remove, changed),
            Stmt::Block(block) => retain_stmts(block, remove, changed),
            _ => {}
        }
    }
}

/// Call-graph reachability from the entry points; unreachable helpers are
/// dropped. A module with no entry points keeps everything.
fn drop_unreachable_functions(module: &mut Module, stats: &mut OptStats) -> bool {
    if !module.functions.iter().any(|f| f.entry_point) {
        return false;
    }
    let names: HashSet<SmolStr> = module.functions.iter().map(|f| f.name.clone()).collect();
    let mut edges: HashMap<SmolStr, HashSet<SmolStr>> = HashMap::new();
    for func in &module.functions {
        let mut callees = HashSet::new();
        crate::hir::walk_stmts(&func.body, &mut |expr| {
            if let Expr::Call { func: callee, .. } = expr {
                if names.contains(callee) {
                    callees.insert(callee.clone());
                }
            }
        });
        edges.insert(func.name.clone(), callees);
    }

    let mut reachable: HashSet<SmolStr> = HashSet::new();
    let mut queue: VecDeque<SmolStr> = module
        .functions
        .iter()
        .filter(|f| f.entry_point)
        .map(|f| f.name.clone())
        .collect();
    while let Some(name) = queue.pop_front() {
        if !reachable.insert(name.clone()) {
            continue;
        }
        if let Some(callees) = edges.get(&name) {
            queue.extend(callees.iter().cloned());
        }
    }

    let before = module.functions.len();
    module.functions.retain(|f| f.entry_point || reachable.contains(&f.name));
    let removed = before - module.functions.len();
    stats.dead_functions_removed += removed as u32;
    removed > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hir::Function;

    fn function(name: &str, entry_point: bool, body: Vec<Stmt>) -> Function {
        Function {
            name: name.into(),
            stage: if entry_point {
                Some(crate::syntax::ast::ShaderStage::Fragment)
            } else {
                None
            },
            entry_point,
            workgroup_size: None,
            params: vec![],
            ret: None,
            ret_attrs: vec![],
            body,
            loc: None,
        }
    }

    #[test]
    fn statements_after_return_are_dropped() {
        let mut module = Module::default();
        module.functions.push(function(
            "main",
            true,
            vec![
                Stmt::Return { value: None, loc: None },
                Stmt::Expr {
                    expr: Expr::ident("x"),
                    loc: None,
                },
            ],
        ));
        let mut stats = OptStats::default();
        assert!(DeadCodeElimination.run(&mut module, &mut stats));
        assert_eq!(module.functions[0].body.len(), 1);
        assert_eq!(stats.dead_stmts_removed, 1);
    }

    #[test]
    fn unused_let_is_dropped() {
        let mut module = Module::default();
        module.functions.push(function(
            "main",
            true,
            vec![
                Stmt::Let {
                    name: "unused".into(),
                    ty: None,
                    init: Expr::FloatConst(1.0),
                    loc: None,
                },
                Stmt::Return {
                    value: Some(Expr::FloatConst(0.0)),
                    loc: None,
                },
            ],
        ));
        let mut stats = OptStats::default();
        assert!(DeadCodeElimination.run(&mut module, &mut stats));
        assert_eq!(module.functions[0].body.len(), 1);
    }

    #[test]
    fn unreachable_function_is_dropped_reachable_kept() {
        let mut module = Module::default();
        module.functions.push(function(
            "main",
            true,
            vec![Stmt::Return {
                value: Some(Expr::call("helper", vec![])),
                loc: None,
            }],
        ));
        module.functions.push(function("helper", false, vec![]));
        module.functions.push(function("orphan", false, vec![]));
        let mut stats = OptStats::default();
        DeadCodeElimination.run(&mut module, &mut stats);
        let names: Vec<_> = module.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["main", "helper"]);
        assert_eq!(stats.dead_functions_removed, 1);
    }

    #[test]
    fn no_entry_points_keeps_all_functions() {
        let mut module = Module::default();
        module.functions.push(function("a", false, vec![]));
        module.functions.push(function("b", false, vec![]));
        let mut stats = OptStats::default();
        DeadCodeElimination.run(&mut module, &mut stats);
        assert_eq!(module.functions.len(), 2);
    }
}
