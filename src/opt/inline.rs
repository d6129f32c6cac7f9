//! Function inlining.
//!
//! Calls to small non-recursive functions whose body is a single `return`
//! are replaced by the returned expression with parameters substituted by
//! the call arguments. Recursion (direct or mutual) is detected on the call
//! graph and excluded.
use crate::{
    hir::{map_stmt_exprs, subst_ident, walk_expr, walk_stmts, Expr, Function, Module, Stmt},
    opt::{OptStats, Pass},
};
use smol_str::SmolStr;
use std::collections::{HashMap, HashSet};

pub(crate) struct FunctionInlining {
    pub threshold: usize,
}

impl Pass for FunctionInlining {
    fn name(&self) -> &'static str {
        "function-inlining"
    }

    fn min_level(&self) -> u8 {
        3
    }

    fn run(&self, module: &mut Module, stats: &mut OptStats) -> bool {
        let recursive = recursive_names(module);
        let mut candidates: HashMap<SmolStr, (Vec<SmolStr>, Expr)> = HashMap::new();
        for func in &module.functions {
            if func.entry_point || recursive.contains(&func.name) {
                continue;
            }
            if let [Stmt::Return { value: Some(value), .. }] = func.body.as_slice() {
                if value.size() <= self.threshold {
                    let params = func.params.iter().map(|p| p.name.clone()).collect();
                    candidates.insert(func.name.clone(), (params, value.clone()));
                }
            }
        }
        if candidates.is_empty() {
            return false;
        }

        let mut changed = false;
        for func in module.functions.iter_mut() {
            let current = func.name.clone();
            let mut inline = |expr: Expr| match &expr {
                Expr::Call { func: callee, args } if *callee != current => {
                    match candidates.get(callee) {
                        Some((params, body)) if params.len() == args.len() && substitutable(params, body, args) => {
                            let mut inlined = body.clone();
                            for (param, arg) in params.iter().zip(args) {
                                inlined = subst_ident(inlined, param, arg);
                            }
                            stats.functions_inlined += 1;
                            changed = true;
                            inlined
                        }
                        _ => expr,
                    }
                }
                _ => expr,
            };
            for stmt in func.body.iter_mut() {
                map_stmt_exprs(stmt, &mut inline);
            }
        }
        changed
    }
}

/// An argument may be substituted more than once only when duplicating it is
/// free and observationally safe.
fn substitutable(params: &[SmolStr], body: &Expr, args: &[Expr]) -> bool {
    let mut uses: HashMap<&SmolStr, u32> = HashMap::new();
    walk_expr(body, &mut |e| {
        if let Expr::Ident(name) = e {
            if let Some(param) = params.iter().find(|p| *p == name) {
                *uses.entry(param).or_insert(0) += 1;
            }
        }
    });
    params.iter().zip(args).all(|(param, arg)| {
        uses.get(param).copied().unwrap_or(0) <= 1 || arg.is_literal() || matches!(arg, Expr::Ident(_))
    })
}

/// Names on a call-graph cycle, found by coloring DFS.
fn recursive_names(module: &Module) -> HashSet<SmolStr> {
    let mut edges: HashMap<SmolStr, Vec<SmolStr>> = HashMap::new();
    let names: HashSet<SmolStr> = module.functions.iter().map(|f| f.name.clone()).collect();
    for func in &module.functions {
        let mut callees = Vec::new();
        walk_stmts(&func.body, &mut |expr| {
            if let Expr::Call { func: callee, .. } = expr {
                if names.contains(callee) {
                    callees.push(callee.clone());
                }
            }
        });
        edges.insert(func.name.clone(), callees);
    }

    #[derive(Copy, Clone, PartialEq)]
    enum Color {
        White,
        Grey,
        Black,
    }
    fn visit(
        name: &SmolStr,
        edges: &HashMap<SmolStr, Vec<SmolStr>>,
        colors: &mut HashMap<SmolStr, Color>,
        stack: &mut Vec<SmolStr>,
        recursive: &mut HashSet<SmolStr>,
    ) {
        colors.insert(name.clone(), Color::Grey);
        stack.push(name.clone());
        for callee in edges.get(name).into_iter().flatten() {
            match colors.get(callee).copied().unwrap_or(Color::White) {
                Color::White => visit(callee, edges, colors, stack, recursive),
                Color::Grey => {
                    // Everything from the first occurrence of `callee` on the
                    // stack is part of the cycle.
                    if let Some(pos) = stack.iter().position(|n| n == callee) {
                        for name in &stack[pos..] {
                            recursive.insert(name.clone());
                        }
                    }
                }
                Color::Black => {}
            }
        }
        stack.pop();
        colors.insert(name.clone(), Color::Black);
    }

    let mut colors = HashMap::new();
    let mut recursive = HashSet::new();
    for func in &module.functions {
        if colors.get(&func.name).copied().unwrap_or(Color::White) == Color::White {
            visit(&func.name, &edges, &mut colors, &mut Vec::new(), &mut recursive);
        }
    }
    recursive
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::ast::BinOp;
    use crate::ty::TypeDesc;

    fn function(name: &str, params: &[&str], body: Vec<Stmt>, entry_point: bool) -> Function {
        Function {
            name: name.into(),
            stage: None,
            entry_point,
            workgroup_size: None,
            params: params
                .iter()
                .map(|p| crate::hir::Param {
                    name: (*p).into(),
                    ty: TypeDesc::F32,
                    attrs: vec![],
                })
                .collect(),
            ret: Some(TypeDesc::F32),
            ret_attrs: vec![],
            body,
            loc: None,
        }
    }

    #[test]
    fn single_return_callee_is_substituted() {
        let mut module = Module::default();
        module.functions.push(function(
            "sq",
            &["x"],
            vec![Stmt::Return {
                value: Some(Expr::binary(BinOp::Mul, Expr::ident("x"), Expr::ident("x"))),
                loc: None,
            }],
            false,
        ));
        module.functions.push(function(
            "main",
            &[],
            vec![Stmt::Return {
                value: Some(Expr::call("sq", vec![Expr::ident("v")])),
                loc: None,
            }],
            true,
        ));
        let mut stats = OptStats::default();
        assert!(FunctionInlining { threshold: 16 }.run(&mut module, &mut stats));
        assert_eq!(stats.functions_inlined, 1);
        match &module.functions[1].body[0] {
            Stmt::Return { value: Some(value), .. } => {
                assert_eq!(*value, Expr::binary(BinOp::Mul, Expr::ident("v"), Expr::ident("v")));
            }
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn recursive_callee_is_refused() {
        let mut module = Module::default();
        module.functions.push(function(
            "rec",
            &["x"],
            vec![Stmt::Return {
                value: Some(Expr::call("rec", vec![Expr::ident("x")])),
                loc: None,
            }],
            false,
        ));
        module.functions.push(function(
            "main",
            &[],
            vec![Stmt::Return {
                value: Some(Expr::call("rec", vec![Expr::FloatConst(1.0)])),
                loc: None,
            }],
            true,
        ));
        let mut stats = OptStats::default();
        assert!(!FunctionInlining { threshold: 16 }.run(&mut module, &mut stats));
        assert_eq!(stats.functions_inlined, 0);
    }

    #[test]
    fn duplicating_a_call_argument_is_refused() {
        let mut module = Module::default();
        module.functions.push(function(
            "sq",
            &["x"],
            vec![Stmt::Return {
                value: Some(Expr::binary(BinOp::Mul, Expr::ident("x"), Expr::ident("x"))),
                loc: None,
            }],
            false,
        ));
        module.functions.push(function(
            "main",
            &[],
            vec![Stmt::Return {
                value: Some(Expr::call("sq", vec![Expr::call("expensive", vec![])])),
                loc: None,
            }],
            true,
        ));
        let mut stats = OptStats::default();
        assert!(!FunctionInlining { threshold: 16 }.run(&mut module, &mut stats));
    }
}
