//! GLSL ES 3.00 code generation.
//!
//! Each stage gets its own translation unit: header, structs, uniforms,
//! stage inputs/outputs, reachable helper functions, then the entry point
//! rewritten into `void main()`. Entry returns become `gl_Position` /
//! fragment-output assignments.
use crate::{
    hir::{Expr, Function, Module, Stmt, StructDef},
    syntax::ast::{BinOp, ShaderStage, UnaryOp},
    ty::TypeDesc,
};
use smol_str::SmolStr;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Write;

const FRAGMENT_OUTPUT: &str = "fragColor";

/// Emits the translation unit for one stage; `None` when the module has no
/// entry point for it.
pub fn emit(module: &Module, stage: ShaderStage) -> Option<String> {
    let entry = module.functions.iter().find(|f| f.stage == Some(stage))?;

    let mut out = String::new();
    out.push_str("#version 300 es\n");
    out.push_str("precision highp float;\n");

    for st in &module.structs {
        out.push('\n');
        emit_struct(&mut out, st);
    }

    if !module.uniforms.is_empty() {
        out.push('\n');
    }
    for uniform in &module.uniforms {
        let _ = writeln!(out, "uniform {} {};", uniform.ty.display_glsl(), uniform.name);
    }
    for constant in &module.consts {
        let ty = constant.ty.clone().unwrap_or_else(|| literal_type(&constant.init));
        let _ = writeln!(
            out,
            "const {} {} = {};",
            ty.display_glsl(),
            constant.name,
            emit_expr(&constant.init, 0, &HashMap::new())
        );
    }

    // Stage interface.
    let mut renames: HashMap<SmolStr, String> = HashMap::new();
    out.push('\n');
    for param in &entry.params {
        if let Some(attr) = param.attrs.iter().find(|a| a.name == "location") {
            let location = attr.value.as_deref().unwrap_or("0");
            let _ = writeln!(
                out,
                "layout(location = {}) in {} {};",
                location,
                param.ty.display_glsl(),
                param.name
            );
        } else if let Some(attr) = param.attrs.iter().find(|a| a.name == "builtin") {
            if let Some(gl_name) = builtin_input(stage, attr.value.as_deref().unwrap_or("")) {
                renames.insert(param.name.clone(), gl_name.to_string());
            }
        }
    }

    let ret_struct = entry
        .ret
        .as_ref()
        .and_then(|ret| match ret {
            TypeDesc::Struct(st) => module.structs.iter().find(|s| s.name == st.name),
            _ => None,
        });

    match stage {
        ShaderStage::Fragment => {
            let location = entry
                .ret_attrs
                .iter()
                .find(|a| a.name == "location")
                .and_then(|a| a.value.as_deref().map(str::to_string))
                .unwrap_or_else(|| "0".to_string());
            let _ = writeln!(out, "layout(location = {}) out vec4 {};", location, FRAGMENT_OUTPUT);
        }
        ShaderStage::Vertex => {
            if let Some(st) = ret_struct {
                for field in &st.fields {
                    if let Some(attr) = field.attrs.iter().find(|a| a.name == "location") {
                        let location = attr.value.as_deref().unwrap_or("0");
                        let _ = writeln!(
                            out,
                            "layout(location = {}) out {} {};",
                            location,
                            field.ty.display_glsl(),
                            field.name
                        );
                    }
                }
            }
        }
        ShaderStage::Compute => {}
    }

    // Helper functions reachable from the entry point, in module order.
    for name in reachable_helpers(module, entry) {
        if let Some(func) = module.function(&name) {
            out.push('\n');
            emit_helper(&mut out, func);
        }
    }

    out.push('\n');
    out.push_str("void main() {\n");
    let ctx = EntryCtx {
        stage,
        ret_struct,
        renames: &renames,
    };
    for stmt in &entry.body {
        emit_stmt(&mut out, stmt, 1, &ctx);
    }
    out.push_str("}\n");

    Some(out)
}

fn literal_type(expr: &Expr) -> TypeDesc {
    match expr {
        Expr::IntConst(_) => TypeDesc::I32,
        Expr::UintConst(_) => TypeDesc::U32,
        Expr::BoolConst(_) => TypeDesc::BOOL,
        _ => TypeDesc::F32,
    }
}

fn builtin_input(stage: ShaderStage, builtin: &str) -> Option<&'static str> {
    match (stage, builtin) {
        (ShaderStage::Vertex, "vertex_index") => Some("gl_VertexID"),
        (ShaderStage::Vertex, "instance_index") => Some("gl_InstanceID"),
        (ShaderStage::Fragment, "position") => Some("gl_FragCoord"),
        (ShaderStage::Fragment, "front_facing") => Some("gl_FrontFacing"),
        _ => None,
    }
}

/// Helpers transitively called from the entry, in declaration order.
fn reachable_helpers(module: &Module, entry: &Function) -> Vec<SmolStr> {
    let helper_names: HashSet<SmolStr> = module
        .functions
        .iter()
        .filter(|f| !f.entry_point)
        .map(|f| f.name.clone())
        .collect();
    let scan = |func: &Function, queue: &mut VecDeque<SmolStr>| {
        crate::hir::walk_stmts(&func.body, &mut |expr| {
            if let Expr::Call { func: callee, .. } = expr {
                if helper_names.contains(callee) {
                    queue.push_back(callee.clone());
                }
            }
        });
    };

    let mut reachable: HashSet<SmolStr> = HashSet::new();
    let mut queue = VecDeque::new();
    scan(entry, &mut queue);
    while let Some(name) = queue.pop_front() {
        if !reachable.insert(name.clone()) {
            continue;
        }
        if let Some(func) = func_by_name(module, &name) {
            scan(func, &mut queue);
        }
    }

    module
        .functions
        .iter()
        .filter(|f| reachable.contains(&f.name))
        .map(|f| f.name.clone())
        .collect()
}

fn func_by_name<'m>(module: &'m Module, name: &str) -> Option<&'m Function> {
    module.functions.iter().find(|f| f.name == name)
}

fn emit_struct(out: &mut String, st: &StructDef) {
    let _ = writeln!(out, "struct {} {{", st.name);
    for field in &st.fields {
        let _ = writeln!(out, "    {} {};", field.ty.display_glsl(), field.name);
    }
    out.push_str("};\n");
}

fn emit_helper(out: &mut String, func: &Function) {
    let ret = func
        .ret
        .as_ref()
        .map(|t| t.display_glsl().to_string())
        .unwrap_or_else(|| "void".to_string());
    let params: Vec<String> = func
        .params
        .iter()
        .map(|p| format!("{} {}", p.ty.display_glsl(), p.name))
        .collect();
    let _ = writeln!(out, "{} {}({}) {{", ret, func.name, params.join(", "));
    let ctx = EntryCtx {
        stage: ShaderStage::Compute,
        ret_struct: None,
        renames: &HashMap::new(),
    };
    for stmt in &func.body {
        emit_helper_stmt(out, stmt, 1, &ctx);
    }
    out.push_str("}\n");
}

struct EntryCtx<'a> {
    stage: ShaderStage,
    ret_struct: Option<&'a StructDef>,
    renames: &'a HashMap<SmolStr, String>,
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("    ");
    }
}

/// Statement emission for helper bodies: returns stay returns.
fn emit_helper_stmt(out: &mut String, stmt: &Stmt, depth: usize, ctx: &EntryCtx) {
    if let Stmt::Return { value, .. } = stmt {
        indent(out, depth);
        match value {
            Some(value) => {
                let _ = writeln!(out, "return {};", emit_expr(value, 0, ctx.renames));
            }
            None => out.push_str("return;\n"),
        }
        return;
    }
    emit_stmt_common(out, stmt, depth, ctx, &emit_helper_stmt);
}

/// Statement emission for the entry body: returns write the stage outputs.
fn emit_stmt(out: &mut String, stmt: &Stmt, depth: usize, ctx: &EntryCtx) {
    if let Stmt::Return { value, .. } = stmt {
        let value = match value {
            Some(value) => value,
            None => {
                indent(out, depth);
                out.push_str("return;\n");
                return;
            }
        };
        match (ctx.stage, ctx.ret_struct) {
            (_, Some(st)) => {
                // Struct results expand into one assignment per field.
                indent(out, depth);
                let _ = writeln!(
                    out,
                    "{} _out = {};",
                    st.name,
                    emit_expr(value, 0, ctx.renames)
                );
                for field in &st.fields {
                    indent(out, depth);
                    if field.attrs.iter().any(|a| a.name == "builtin" && a.value.as_deref() == Some("position")) {
                        let _ = writeln!(out, "gl_Position = _out.{};", field.name);
                    } else if field.attrs.iter().any(|a| a.name == "location") {
                        let _ = writeln!(out, "{} = _out.{};", field.name, field.name);
                    } else {
                        let _ = writeln!(out, "// {} has no output slot", field.name);
                    }
                }
                indent(out, depth);
                out.push_str("return;\n");
            }
            (ShaderStage::Vertex, None) => {
                indent(out, depth);
                let _ = writeln!(out, "gl_Position = {};", emit_expr(value, 0, ctx.renames));
                indent(out, depth);
                out.push_str("return;\n");
            }
            (ShaderStage::Fragment, None) => {
                indent(out, depth);
                let _ = writeln!(out, "{} = {};", FRAGMENT_OUTPUT, emit_expr(value, 0, ctx.renames));
                indent(out, depth);
                out.push_str("return;\n");
            }
            (ShaderStage::Compute, None) => {
                indent(out, depth);
                out.push_str("return;\n");
            }
        }
        return;
    }
    emit_stmt_common(out, stmt, depth, ctx, &emit_stmt);
}

fn emit_stmt_common(
    out: &mut String,
    stmt: &Stmt,
    depth: usize,
    ctx: &EntryCtx,
    recurse: &dyn Fn(&mut String, &Stmt, usize, &EntryCtx),
) {
    match stmt {
        Stmt::Let { .. } | Stmt::Var { .. } | Stmt::Assign { .. } | Stmt::Expr { .. } => {
            indent(out, depth);
            let _ = writeln!(out, "{};", emit_simple_stmt(stmt, ctx.renames));
        }
        Stmt::If {
            cond,
            then_branch,
            else_branch,
            ..
        } => {
            indent(out, depth);
            let _ = writeln!(out, "if ({}) {{", emit_expr(cond, 0, ctx.renames));
            for stmt in then_branch {
                recurse(out, stmt, depth + 1, ctx);
            }
            if let Some(else_branch) = else_branch {
                indent(out, depth);
                out.push_str("} else {\n");
                for stmt in else_branch {
                    recurse(out, stmt, depth + 1, ctx);
                }
            }
            indent(out, depth);
            out.push_str("}\n");
        }
        Stmt::For {
            init, cond, step, body, ..
        } => {
            indent(out, depth);
            let init = init.as_deref().map(|s| emit_simple_stmt(s, ctx.renames)).unwrap_or_default();
            let cond = cond.as_ref().map(|e| emit_expr(e, 0, ctx.renames)).unwrap_or_default();
            let step = step.as_deref().map(|s| emit_simple_stmt(s, ctx.renames)).unwrap_or_default();
            let _ = writeln!(out, "for ({}; {}; {}) {{", init, cond, step);
            for stmt in body {
                recurse(out, stmt, depth + 1, ctx);
            }
            indent(out, depth);
            out.push_str("}\n");
        }
        Stmt::While { cond, body, .. } => {
            indent(out, depth);
            let _ = writeln!(out, "while ({}) {{", emit_expr(cond, 0, ctx.renames));
            for stmt in body {
                recurse(out, stmt, depth + 1, ctx);
            }
            indent(out, depth);
            out.push_str("}\n");
        }
        Stmt::Block(stmts) => {
            indent(out, depth);
            out.push_str("{\n");
            for stmt in stmts {
                recurse(out, stmt, depth + 1, ctx);
            }
            indent(out, depth);
            out.push_str("}\n");
        }
        Stmt::Return { .. } => unreachable!("returns are handled by the callers"),
    }
}

/// `let` becomes `const`, `var` drops its qualifier; both need a spelled
/// type in GLSL.
fn emit_simple_stmt(stmt: &Stmt, renames: &HashMap<SmolStr, String>) -> String {
    match stmt {
        Stmt::Let { name, ty, init, .. } => {
            let ty = ty.clone().unwrap_or_else(|| literal_type(init));
            format!("const {} {} = {}", ty.display_glsl(), name, emit_expr(init, 0, renames))
        }
        Stmt::Var { name, ty, init, .. } => {
            let ty = ty
                .clone()
                .or_else(|| init.as_ref().map(literal_type))
                .unwrap_or(TypeDesc::F32);
            match init {
                Some(init) => format!("{} {} = {}", ty.display_glsl(), name, emit_expr(init, 0, renames)),
                None => format!("{} {}", ty.display_glsl(), name),
            }
        }
        Stmt::Assign { target, op, value, .. } => {
            let op_text = match op {
                Some(op) => format!("{}=", op.symbol()),
                None => "=".to_string(),
            };
            format!(
                "{} {} {}",
                emit_expr(target, 0, renames),
                op_text,
                emit_expr(value, 0, renames)
            )
        }
        Stmt::Expr { expr, .. } => emit_expr(expr, 0, renames),
        _ => String::new(),
    }
}

fn bin_prec(op: BinOp) -> u8 {
    match op {
        BinOp::Or => 1,
        BinOp::And => 2,
        BinOp::BitOr => 3,
        BinOp::BitXor => 4,
        BinOp::BitAnd => 5,
        BinOp::Eq | BinOp::Ne => 6,
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => 7,
        BinOp::Shl | BinOp::Shr => 8,
        BinOp::Add | BinOp::Sub => 9,
        BinOp::Mul | BinOp::Div | BinOp::Mod => 10,
    }
}

/// Function spellings that differ from the WGSL-side names.
fn glsl_function(name: &str) -> &str {
    match name {
        "inverseSqrt" => "inversesqrt",
        "atan2" => "atan",
        "dpdx" => "dFdx",
        "dpdy" => "dFdy",
        _ => name,
    }
}

fn emit_expr(expr: &Expr, parent_prec: u8, renames: &HashMap<SmolStr, String>) -> String {
    match expr {
        Expr::FloatConst(value) => super::wgsl::format_float(*value),
        Expr::IntConst(value) => value.to_string(),
        Expr::UintConst(value) => format!("{}u", value),
        Expr::BoolConst(value) => value.to_string(),
        Expr::Ident(name) => renames.get(name).cloned().unwrap_or_else(|| name.to_string()),
        Expr::Unary { op, expr } => {
            let inner = emit_expr(expr, 11, renames);
            let text = match op {
                UnaryOp::Neg => format!("-{}", inner),
                UnaryOp::Not => format!("!{}", inner),
                UnaryOp::BitNot => format!("~{}", inner),
                // GLSL has no address-of; pointers only reach this backend
                // through `arrayLength`, handled at the call site.
                UnaryOp::AddressOf => inner,
                UnaryOp::PreIncrement => format!("++{}", inner),
                UnaryOp::PreDecrement => format!("--{}", inner),
                UnaryOp::PostIncrement => format!("{}++", inner),
                UnaryOp::PostDecrement => format!("{}--", inner),
            };
            if parent_prec > 11 {
                format!("({})", text)
            } else {
                text
            }
        }
        Expr::Binary { op, left, right } => {
            let prec = bin_prec(*op);
            let text = format!(
                "{} {} {}",
                emit_expr(left, prec, renames),
                op.symbol(),
                emit_expr(right, prec + 1, renames)
            );
            if prec < parent_prec {
                format!("({})", text)
            } else {
                text
            }
        }
        Expr::Call { func, args } => emit_call(func, args, renames),
        Expr::Construct { ty, args } => {
            let args: Vec<String> = args.iter().map(|a| emit_expr(a, 0, renames)).collect();
            format!("{}({})", ty.display_glsl(), args.join(", "))
        }
        Expr::Member { base, member } => format!("{}.{}", emit_expr(base, 12, renames), member),
        Expr::Index { base, index } => format!(
            "{}[{}]",
            emit_expr(base, 12, renames),
            emit_expr(index, 0, renames)
        ),
    }
}

fn emit_call(func: &str, args: &[Expr], renames: &HashMap<SmolStr, String>) -> String {
    let arg = |i: usize| emit_expr(&args[i], 0, renames);
    match (func, args.len()) {
        // select(a, b, c) picks b when c holds.
        ("select", 3) => format!("({} ? {} : {})", arg(2), arg(1), arg(0)),
        ("arrayLength", 1) => {
            let inner = match &args[0] {
                Expr::Unary {
                    op: UnaryOp::AddressOf,
                    expr,
                } => emit_expr(expr, 12, renames),
                other => emit_expr(other, 12, renames),
            };
            format!("{}.length()", inner)
        }
        // The sampler argument disappears; GLSL samples combined textures.
        ("textureSample", 3) => format!("texture({}, {})", arg(0), arg(2)),
        ("textureLoad", 3) => format!("texelFetch({}, {}, {})", arg(0), arg(1), arg(2)),
        ("textureLoad", 2) => format!("texelFetch({}, {}, 0)", arg(0), arg(1)),
        ("saturate", 1) => format!("clamp({}, 0.0, 1.0)", arg(0)),
        ("fma", 3) => format!("({} * {} + {})", arg(0), arg(1), arg(2)),
        _ => {
            let args: Vec<String> = args.iter().map(|a| emit_expr(a, 0, renames)).collect();
            format!("{}({})", glsl_function(func), args.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_rewrites() {
        let none = HashMap::new();
        assert_eq!(
            emit_call(
                "select",
                &[Expr::ident("a"), Expr::ident("b"), Expr::ident("c")],
                &none
            ),
            "(c ? b : a)"
        );
        assert_eq!(
            emit_call(
                "arrayLength",
                &[Expr::Unary {
                    op: UnaryOp::AddressOf,
                    expr: Box::new(Expr::ident("points")),
                }],
                &none
            ),
            "points.length()"
        );
        assert_eq!(
            emit_call("saturate", &[Expr::ident("x")], &none),
            "clamp(x, 0.0, 1.0)"
        );
        assert_eq!(
            emit_call(
                "textureSample",
                &[Expr::ident("tex"), Expr::ident("samp"), Expr::ident("uv")],
                &none
            ),
            "texture(tex, uv)"
        );
    }

    #[test]
    fn construct_drops_element_type() {
        let none = HashMap::new();
        let v = Expr::Construct {
            ty: TypeDesc::VEC3F,
            args: [Expr::FloatConst(1.0)].into_iter().collect(),
        };
        assert_eq!(emit_expr(&v, 0, &none), "vec3(1.0)");
    }
}
