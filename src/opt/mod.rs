//! IR optimizer.
//!
//! A level-gated fixpoint driver over an ordered pass list. Each iteration
//! runs every enabled pass once, in registration order; the driver stops
//! when a full iteration reports no change or the iteration cap is hit.
mod algebraic;
mod cse;
mod dce;
mod fold;
mod inline;
mod loops;
mod peephole;
mod strength;

use crate::{
    hir::{Expr, Function, Module},
    ty::{ScalarType, TypeDesc},
};
use serde::Serialize;
use smol_str::SmolStr;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// Aggregated statistics across all iterations.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptStats {
    pub iterations: u32,
    /// Iterations in which at least one pass mutated the IR.
    pub changed_iterations: u32,
    pub constants_folded: u32,
    pub algebraic_simplified: u32,
    pub dead_stmts_removed: u32,
    pub dead_functions_removed: u32,
    pub cse_replaced: u32,
    pub strength_reduced: u32,
    pub peephole_rewritten: u32,
    pub functions_inlined: u32,
    pub loops_unrolled: u32,
    pub stmts_hoisted: u32,
}

pub(crate) trait Pass {
    fn name(&self) -> &'static str;
    fn min_level(&self) -> u8;
    fn run(&self, module: &mut Module, stats: &mut OptStats) -> bool;
}

pub struct Optimizer {
    passes: Vec<Box<dyn Pass>>,
    level: u8,
    max_iterations: u32,
}

impl Optimizer {
    /// Builds the pass pipeline for an optimization level (0 to 3).
    pub fn new(level: u8, max_iterations: u32, inline_threshold: usize, unroll_threshold: u32) -> Optimizer {
        let passes: Vec<Box<dyn Pass>> = vec![
            Box::new(fold::ConstantFolding),
            Box::new(algebraic::AlgebraicSimplification),
            Box::new(dce::DeadCodeElimination),
            Box::new(cse::CommonSubexpressionElimination),
            Box::new(strength::StrengthReduction),
            Box::new(peephole::Peephole),
            Box::new(inline::FunctionInlining {
                threshold: inline_threshold,
            }),
            Box::new(loops::LoopInvariantCodeMotion),
            Box::new(loops::LoopUnrolling {
                threshold: unroll_threshold,
            }),
        ];
        Optimizer {
            passes,
            level: level.min(3),
            max_iterations,
        }
    }

    /// Runs the pipeline to a fixpoint (or the iteration cap).
    pub fn run(&self, module: &mut Module) -> OptStats {
        let mut stats = OptStats::default();
        if self.level == 0 {
            return stats;
        }
        for _ in 0..self.max_iterations {
            let mut changed = false;
            for pass in &self.passes {
                if pass.min_level() > self.level {
                    continue;
                }
                let pass_changed = pass.run(module, &mut stats);
                trace!(pass = pass.name(), changed = pass_changed, "optimizer pass");
                changed |= pass_changed;
            }
            stats.iterations += 1;
            if changed {
                stats.changed_iterations += 1;
            } else {
                break;
            }
        }
        debug!(
            iterations = stats.iterations,
            folded = stats.constants_folded,
            "optimizer finished"
        );
        stats
    }
}

// ----------------------------------------------------------------------
// Conservative type environment
// ----------------------------------------------------------------------

/// Declared types visible inside one function, for float-gated rewrites.
/// A name declared twice with different types becomes unknown.
pub(crate) struct TypeEnv {
    vars: HashMap<SmolStr, TypeDesc>,
    ambiguous: HashSet<SmolStr>,
}

impl TypeEnv {
    pub fn for_function(module: &Module, func: &Function) -> TypeEnv {
        let mut env = TypeEnv {
            vars: HashMap::new(),
            ambiguous: HashSet::new(),
        };
        for uniform in &module.uniforms {
            env.insert(uniform.name.clone(), uniform.ty.clone());
        }
        for constant in &module.consts {
            if let Some(ty) = &constant.ty {
                env.insert(constant.name.clone(), ty.clone());
            }
        }
        for param in &func.params {
            env.insert(param.name.clone(), param.ty.clone());
        }
        collect_decl_types(&func.body, &mut env);
        env
    }

    fn insert(&mut self, name: SmolStr, ty: TypeDesc) {
        if self.ambiguous.contains(&name) {
            return;
        }
        match self.vars.get(&name) {
            Some(existing) if *existing != ty => {
                self.vars.remove(&name);
                self.ambiguous.insert(name);
            }
            _ => {
                self.vars.insert(name, ty);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&TypeDesc> {
        self.vars.get(name)
    }
}

fn collect_decl_types(stmts: &[crate::hir::Stmt], env: &mut TypeEnv) {
    use crate::hir::Stmt;
    for stmt in stmts {
        match stmt {
            Stmt::Let { name, ty: Some(ty), .. } | Stmt::Var { name, ty: Some(ty), .. } => {
                env.insert(name.clone(), ty.clone());
            }
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                collect_decl_types(then_branch, env);
                if let Some(else_branch) = else_branch {
                    collect_decl_types(else_branch, env);
                }
            }
            Stmt::For { init, body, .. } => {
                if let Some(init) = init {
                    collect_decl_types(std::slice::from_ref(&**init), env);
                }
                collect_decl_types(body, env);
            }
            Stmt::While { body, .. } => collect_decl_types(body, env),
            Stmt::Block(stmts) => collect_decl_types(stmts, env),
            _ => {}
        }
    }
}

/// Builtins that always produce float results.
const FLOAT_BUILTINS: &[&str] = &[
    "sin", "cos", "tan", "floor", "ceil", "round", "trunc", "fract", "saturate", "exp", "log", "sqrt",
    "inverseSqrt", "radians", "degrees", "normalize", "pow", "atan2", "step", "mix", "smoothstep", "fma",
    "clamp", "dot", "cross", "length", "distance", "reflect", "refract", "dpdx", "dpdy", "fwidth",
];

/// Whether an expression provably produces a float scalar or vector; unknown
/// shapes answer `false` so float-only rewrites stay off.
pub(crate) fn is_float_expr(expr: &Expr, env: &TypeEnv) -> bool {
    match expr {
        Expr::FloatConst(_) => true,
        Expr::IntConst(_) | Expr::UintConst(_) | Expr::BoolConst(_) => false,
        Expr::Ident(name) => env
            .get(name)
            .map_or(false, |ty| ty.scalar_elem().map_or(false, ScalarType::is_float)),
        Expr::Unary { op, expr } => {
            matches!(op, crate::syntax::ast::UnaryOp::Neg) && is_float_expr(expr, env)
        }
        Expr::Binary { left, right, .. } => is_float_expr(left, env) || is_float_expr(right, env),
        Expr::Call { func, .. } => FLOAT_BUILTINS.contains(&func.as_str()),
        Expr::Construct { ty, .. } => ty.scalar_elem().map_or(false, ScalarType::is_float),
        Expr::Member { base, .. } => is_float_expr(base, env),
        Expr::Index { base, .. } => is_float_expr(base, env),
    }
}

