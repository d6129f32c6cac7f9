//! AST to IR lowering.
//!
//! Two passes. The first scans every function body for references to the
//! builtin uniforms (`time`, `deltaTime`, `frame`, `resolution`, `mouse`)
//! and synthesizes one uniform per used name at group 0, bindings assigned
//! in first-use order. The second lowers each declaration, rewriting along
//! the way: `const` locals become `let`, `Math.*` becomes target builtins,
//! type spellings become the canonical long form, and integer literals in
//! float positions become float constants.
use crate::{
    hir::{Attr, ConstDef, FieldDef, Function, Module, Param, Stmt, StructDef, UniformDef},
    sema::{builtins, CheckResult},
    syntax::{ast, SourceFile},
    ty::{registry::TypeRegistry, AddressSpace, TypeDesc},
};
use indexmap::IndexSet;
use smol_str::SmolStr;
use std::collections::HashSet;
use tracing::debug;

struct LowerCtx<'a> {
    check: &'a CheckResult,
    registry: &'a TypeRegistry,
    file: &'a SourceFile,
}

/// Lowers a checked program into an IR module.
pub fn lower(
    program: &ast::Program,
    check: &CheckResult,
    registry: &TypeRegistry,
    file: &SourceFile,
) -> Module {
    let ctx = LowerCtx { check, registry, file };
    let mut module = Module::default();

    for decl in &program.structs {
        if let Some(def) = ctx.lower_struct(decl) {
            module.structs.push(def);
        }
    }

    // Builtin-uniform scan.
    let user_names: HashSet<&SmolStr> = program
        .globals
        .iter()
        .map(|g| &g.name)
        .chain(program.functions.iter().map(|f| &f.name))
        .collect();
    let mut used: IndexSet<SmolStr> = IndexSet::new();
    for func in &program.functions {
        let mut declared: HashSet<SmolStr> = func.params.iter().map(|p| p.name.clone()).collect();
        collect_declared(&func.body.stmts, &mut declared);
        walk_ast_stmts(&func.body.stmts, &mut |expr| {
            if let ast::Expr::Ident { name, .. } = expr {
                if builtins::builtin_uniform(name).is_some()
                    && !declared.contains(name)
                    && !user_names.contains(name)
                {
                    used.insert(name.clone());
                }
            }
        });
    }
    for (binding, name) in used.iter().enumerate() {
        let ty = builtins::builtin_uniform(name).cloned().unwrap_or(TypeDesc::Error);
        module.uniforms.push(UniformDef {
            name: name.clone(),
            ty,
            group: 0,
            binding: binding as u32,
            space: Some(AddressSpace::Uniform),
        });
    }

    // User globals: explicit bindings become resources, the rest become
    // module constants.
    for global in &program.globals {
        let ty = global.ty.as_ref().and_then(|t| ctx.registry.parse_type(&t.text));
        match (global.group, global.binding) {
            (Some(group), Some(binding)) => {
                let ty = ty.unwrap_or(TypeDesc::Error);
                let space = ty.layout().map(|_| AddressSpace::Uniform);
                module.uniforms.push(UniformDef {
                    name: global.name.clone(),
                    ty,
                    group,
                    binding,
                    space,
                });
            }
            _ => {
                if let Some(init) = &global.init {
                    module.consts.push(ConstDef {
                        name: global.name.clone(),
                        ty,
                        init: ctx.lower_expr(init),
                    });
                }
            }
        }
    }

    for decl in &program.functions {
        module.functions.push(ctx.lower_function(decl));
    }

    debug!(
        uniforms = module.uniforms.len(),
        functions = module.functions.len(),
        "lowered program"
    );
    module
}

impl<'a> LowerCtx<'a> {
    fn lower_struct(&self, decl: &ast::StructDecl) -> Option<StructDef> {
        // Structs that failed registration stay out of the IR.
        self.registry.struct_layout(&decl.name)?;
        let fields = decl
            .fields
            .iter()
            .map(|field| FieldDef {
                name: field.name.clone(),
                ty: self.registry.parse_type(&field.ty.text).unwrap_or(TypeDesc::Error),
                attrs: field.attrs.iter().map(lower_attr).collect(),
            })
            .collect();
        Some(StructDef {
            name: decl.name.clone(),
            fields,
        })
    }

    fn lower_function(&self, decl: &ast::FunctionDecl) -> Function {
        let sig = self.check.functions.get(&decl.name);
        let params = decl
            .params
            .iter()
            .enumerate()
            .map(|(i, param)| {
                let ty = sig
                    .and_then(|sig| sig.params.get(i))
                    .map(|(_, ty)| ty.clone())
                    .unwrap_or(TypeDesc::Error);
                Param {
                    name: param.name.clone(),
                    ty,
                    attrs: param.attrs.iter().map(lower_attr).collect(),
                }
            })
            .collect();
        let ret = decl.ret.as_ref().map(|_| {
            sig.map(|sig| sig.ret.clone()).unwrap_or(TypeDesc::Error)
        });
        let workgroup_size = decl
            .workgroup_size
            .map(|(x, y, z)| [x, y.unwrap_or(1), z.unwrap_or(1)]);

        // Bare entry-point returns pick up their implied IO attribute.
        let mut ret_attrs: Vec<Attr> = decl.ret_attrs.iter().map(lower_attr).collect();
        if ret_attrs.is_empty() {
            match (decl.stage, &ret) {
                (Some(ast::ShaderStage::Fragment), Some(TypeDesc::Vector { .. })) => {
                    ret_attrs.push(Attr::with_value("location", "0"));
                }
                (Some(ast::ShaderStage::Vertex), Some(TypeDesc::Vector { len: 4, .. })) => {
                    ret_attrs.push(Attr::with_value("builtin", "position"));
                }
                _ => {}
            }
        }

        Function {
            name: decl.name.clone(),
            stage: decl.stage,
            entry_point: decl.stage.is_some(),
            workgroup_size,
            params,
            ret,
            ret_attrs,
            body: self.lower_stmts(&decl.body.stmts),
            loc: Some(self.file.location(decl.span.start)),
        }
    }

    fn lower_stmts(&self, stmts: &[ast::Stmt]) -> Vec<Stmt> {
        stmts.iter().map(|stmt| self.lower_stmt(stmt)).collect()
    }

    fn lower_stmt(&self, stmt: &ast::Stmt) -> Stmt {
        let loc = Some(self.file.location(stmt.span().start));
        match stmt {
            ast::Stmt::Var {
                kind, name, ty, init, span, ..
            } => {
                let annotated = ty.as_ref().and_then(|t| self.registry.parse_type(&t.text));
                // Fall back to the inferred initializer type so every
                // declaration carries a type into codegen.
                let inferred = init
                    .as_ref()
                    .and_then(|e| self.check.types.get(&e.span()).cloned())
                    .filter(|t| !t.is_error());
                let var_ty = annotated.or(inferred);
                let loc = Some(self.file.location(span.start));
                match (kind, init) {
                    (ast::VarKind::Var, init) => Stmt::Var {
                        name: name.clone(),
                        ty: var_ty,
                        init: init.as_ref().map(|e| self.lower_expr(e)),
                        loc,
                    },
                    (_, Some(init)) => Stmt::Let {
                        name: name.clone(),
                        ty: var_ty,
                        init: self.lower_expr(init),
                        loc,
                    },
                    // `let` without an initializer has to stay mutable.
                    (_, None) => Stmt::Var {
                        name: name.clone(),
                        ty: var_ty,
                        init: None,
                        loc,
                    },
                }
            }
            ast::Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => Stmt::If {
                cond: self.lower_expr(cond),
                then_branch: self.lower_stmts(&then_branch.stmts),
                else_branch: else_branch.as_ref().map(|b| self.lower_stmts(&b.stmts)),
                loc,
            },
            ast::Stmt::For {
                init, cond, step, body, ..
            } => Stmt::For {
                init: init.as_ref().map(|s| {
                    // The step mutates the induction variable, so the
                    // initializer binding has to be mutable.
                    let lowered = match self.lower_stmt(s) {
                        Stmt::Let { name, ty, init, loc } => Stmt::Var {
                            name,
                            ty,
                            init: Some(init),
                            loc,
                        },
                        other => other,
                    };
                    Box::new(lowered)
                }),
                cond: cond.as_ref().map(|e| self.lower_expr(e)),
                step: step.as_ref().map(|s| Box::new(self.lower_stmt(s))),
                body: self.lower_stmts(&body.stmts),
                loc,
            },
            ast::Stmt::While { cond, body, .. } => Stmt::While {
                cond: self.lower_expr(cond),
                body: self.lower_stmts(&body.stmts),
                loc,
            },
            ast::Stmt::Return { value, .. } => Stmt::Return {
                value: value.as_ref().map(|e| self.lower_expr(e)),
                loc,
            },
            ast::Stmt::Block(block) => Stmt::Block(self.lower_stmts(&block.stmts)),
            ast::Stmt::Expr { expr, .. } => match expr {
                ast::Expr::Assign { op, target, value, .. } => Stmt::Assign {
                    target: self.lower_expr(target),
                    op: *op,
                    value: self.lower_expr(value),
                    loc,
                },
                other => Stmt::Expr {
                    expr: self.lower_expr(other),
                    loc,
                },
            },
        }
    }

    fn lower_expr(&self, expr: &ast::Expr) -> crate::hir::Expr {
        use crate::hir::Expr as H;
        match expr {
            ast::Expr::IntLit { value, span, .. } => match self.check.types.get(span) {
                Some(TypeDesc::Scalar(s)) if s.is_float() => H::FloatConst(*value as f64),
                Some(TypeDesc::Scalar(crate::ty::ScalarType::U32)) => H::UintConst(*value as u32),
                _ => H::IntConst(*value),
            },
            ast::Expr::FloatLit { value, .. } => H::FloatConst(*value),
            ast::Expr::BoolLit { value, .. } => H::BoolConst(*value),
            // Strings never reach a shader body; a placeholder keeps the
            // lowering total.
            ast::Expr::StrLit { .. } => H::IntConst(0),
            ast::Expr::Ident { name, .. } => H::Ident(name.clone()),
            ast::Expr::Unary { op, expr, .. } => H::Unary {
                op: *op,
                expr: Box::new(self.lower_expr(expr)),
            },
            ast::Expr::Binary { op, left, right, .. } => H::Binary {
                op: *op,
                left: Box::new(self.lower_expr(left)),
                right: Box::new(self.lower_expr(right)),
            },
            // A nested assignment used as a value lowers to its value.
            ast::Expr::Assign { value, .. } => self.lower_expr(value),
            ast::Expr::Call { callee, args, span } => self.lower_call(callee, args, *span),
            ast::Expr::Member { base, member, .. } => {
                if let Some(name) = base.ident_name() {
                    if name == "Math" {
                        if let Some(value) = builtins::math_constant(member) {
                            return H::FloatConst(value);
                        }
                    }
                }
                H::Member {
                    base: Box::new(self.lower_expr(base)),
                    member: member.clone(),
                }
            }
            ast::Expr::Index { base, index, .. } => H::Index {
                base: Box::new(self.lower_expr(base)),
                index: Box::new(self.lower_expr(index)),
            },
            ast::Expr::ArrayLit { elements, span } => {
                let ty = self
                    .check
                    .types
                    .get(span)
                    .cloned()
                    .unwrap_or(TypeDesc::Error);
                H::Construct {
                    ty,
                    args: elements.iter().map(|e| self.lower_expr(e)).collect(),
                }
            }
        }
    }

    fn lower_call(&self, callee: &ast::Expr, args: &[ast::Expr], _span: crate::syntax::Span) -> crate::hir::Expr {
        use crate::hir::Expr as H;
        let lowered: Vec<H> = args.iter().map(|a| self.lower_expr(a)).collect();

        if let ast::Expr::Member { base, member, .. } = callee {
            if matches!(base.ident_name(), Some(name) if name == "Math") {
                let func = builtins::math_builtin(member).unwrap_or(member.as_str());
                return H::Call {
                    func: func.into(),
                    args: lowered,
                };
            }
        }

        if let Some(name) = callee.ident_name() {
            // Vector/matrix constructor spellings collapse into typed
            // constructor nodes; codegen prints the long form.
            if let Some(ty) = self.registry.parse_type(name) {
                if matches!(ty, TypeDesc::Vector { .. } | TypeDesc::Matrix { .. } | TypeDesc::Scalar(_)) {
                    return H::Construct {
                        ty,
                        args: lowered.into_iter().collect(),
                    };
                }
            }
            return H::Call {
                func: name.clone(),
                args: lowered,
            };
        }

        // Unresolvable callee; already diagnosed by the checker.
        H::Call {
            func: "".into(),
            args: lowered,
        }
    }
}

/// Lowers a surface attribute to its canonical target form.
fn lower_attr(attr: &ast::Attribute) -> Attr {
    Attr {
        name: attr.name.clone(),
        value: attr.value.as_ref().map(|v| SmolStr::new(v.trim())),
    }
}

fn collect_declared(stmts: &[ast::Stmt], declared: &mut HashSet<SmolStr>) {
    for stmt in stmts {
        match stmt {
            ast::Stmt::Var { name, .. } => {
                declared.insert(name.clone());
            }
            ast::Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                collect_declared(&then_branch.stmts, declared);
                if let Some(else_branch) = else_branch {
                    collect_declared(&else_branch.stmts, declared);
                }
            }
            ast::Stmt::For { init, body, .. } => {
                if let Some(init) = init {
                    collect_declared(std::slice::from_ref(&**init), declared);
                }
                collect_declared(&body.stmts, declared);
            }
            ast::Stmt::While { body, .. } => collect_declared(&body.stmts, declared),
            ast::Stmt::Block(block) => collect_declared(&block.stmts, declared),
            _ => {}
        }
    }
}

/// Visits every expression in a surface statement list.
fn walk_ast_stmts(stmts: &[ast::Stmt], on_expr: &mut impl FnMut(&ast::Expr)) {
    for stmt in stmts {
        match stmt {
            ast::Stmt::Var { init, .. } => {
                if let Some(init) = init {
                    walk_ast_expr(init, on_expr);
                }
            }
            ast::Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                walk_ast_expr(cond, on_expr);
                walk_ast_stmts(&then_branch.stmts, on_expr);
                if let Some(else_branch) = else_branch {
                    walk_ast_stmts(&else_branch.stmts, on_expr);
                }
            }
            ast::Stmt::For {
                init, cond, step, body, ..
            } => {
                if let Some(init) = init {
                    walk_ast_stmts(std::slice::from_ref(&**init), on_expr);
                }
                if let Some(cond) = cond {
                    walk_ast_expr(cond, on_expr);
                }
                if let Some(step) = step {
                    walk_ast_stmts(std::slice::from_ref(&**step), on_expr);
                }
                walk_ast_stmts(&body.stmts, on_expr);
            }
            ast::Stmt::While { cond, body, .. } => {
                walk_ast_expr(cond, on_expr);
                walk_ast_stmts(&body.stmts, on_expr);
            }
            ast::Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    walk_ast_expr(value, on_expr);
                }
            }
            ast::Stmt::Block(block) => walk_ast_stmts(&block.stmts, on_expr),
            ast::Stmt::Expr { expr, .. } => walk_ast_expr(expr, on_expr),
        }
    }
}

fn walk_ast_expr(expr: &ast::Expr, on_expr: &mut impl FnMut(&ast::Expr)) {
    on_expr(expr);
    match expr {
        ast::Expr::Unary { expr, .. } => walk_ast_expr(expr, on_expr),
        ast::Expr::Binary { left, right, .. } => {
            walk_ast_expr(left, on_expr);
            walk_ast_expr(right, on_expr);
        }
        ast::Expr::Assign { target, value, .. } => {
            walk_ast_expr(target, on_expr);
            walk_ast_expr(value, on_expr);
        }
        ast::Expr::Call { callee, args, .. } => {
            // The callee of a `Math.sin(..)` call is not a value reference;
            // plain identifier callees are function names, not uniforms.
            if let ast::Expr::Member { base, .. } = &**callee {
                walk_ast_expr(base, on_expr);
            }
            for arg in args {
                walk_ast_expr(arg, on_expr);
            }
        }
        ast::Expr::Member { base, .. } => walk_ast_expr(base, on_expr),
        ast::Expr::Index { base, index, .. } => {
            walk_ast_expr(base, on_expr);
            walk_ast_expr(index, on_expr);
        }
        ast::Expr::ArrayLit { elements, .. } => {
            for element in elements {
                walk_ast_expr(element, on_expr);
            }
        }
        _ => {}
    }
}
