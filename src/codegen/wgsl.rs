//! WGSL code generation.
//!
//! Emits struct declarations, one binding per uniform, then every function.
//! Type spellings always use the canonical long form from the type model.
use crate::{
    codegen::sourcemap::MappingSegment,
    hir::{Expr, Function, Module, Stmt},
    syntax::ast::{BinOp, UnaryOp},
};
use smol_str::SmolStr;
use std::fmt::Write;

pub struct WgslOutput {
    pub text: String,
    /// Generated-to-source mappings collected while writing.
    pub segments: Vec<MappingSegment>,
    /// Name table referenced by the mapping segments.
    pub names: Vec<SmolStr>,
}

/// Emits the whole module.
pub fn emit(module: &Module, file_name: &str, debug: bool) -> WgslOutput {
    let mut w = Writer {
        out: String::new(),
        line: 0,
        indent: 0,
        segments: Vec::new(),
        names: Vec::new(),
        debug,
        file_name: file_name.to_string(),
    };

    for (i, st) in module.structs.iter().enumerate() {
        if i > 0 {
            w.blank_line();
        }
        w.emit_struct(st);
    }

    if !module.structs.is_empty() && (!module.uniforms.is_empty() || !module.consts.is_empty()) {
        w.blank_line();
    }
    for uniform in &module.uniforms {
        let qualifier = match uniform.space {
            Some(space) => format!("var<{}>", space.name()),
            None => "var".to_string(),
        };
        w.push_line(&format!(
            "@group({}) @binding({}) {} {}: {};",
            uniform.group, uniform.binding, qualifier, uniform.name, uniform.ty
        ));
    }
    for constant in &module.consts {
        let mut line = String::from("const ");
        line.push_str(&constant.name);
        if let Some(ty) = &constant.ty {
            let _ = write!(line, ": {}", ty);
        }
        line.push_str(" = ");
        line.push_str(&emit_expr(&constant.init, 0));
        line.push(';');
        w.push_line(&line);
    }

    for func in &module.functions {
        w.blank_line();
        w.emit_function(func);
    }

    WgslOutput {
        text: w.out,
        segments: w.segments,
        names: w.names,
    }
}

struct Writer {
    out: String,
    line: u32,
    indent: usize,
    segments: Vec<MappingSegment>,
    names: Vec<SmolStr>,
    debug: bool,
    file_name: String,
}

impl Writer {
    fn push_line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
        self.line += 1;
    }

    fn blank_line(&mut self) {
        self.out.push('\n');
        self.line += 1;
    }

    fn name_index(&mut self, name: &SmolStr) -> u32 {
        if let Some(pos) = self.names.iter().position(|n| n == name) {
            return pos as u32;
        }
        self.names.push(name.clone());
        (self.names.len() - 1) as u32
    }

    fn record(&mut self, loc: Option<crate::syntax::Loc>, name: Option<u32>) {
        if let Some(loc) = loc {
            self.segments.push(MappingSegment {
                gen_line: self.line,
                gen_col: (self.indent * 4) as u32,
                src_line: loc.line,
                src_col: loc.column,
                name,
            });
        }
    }

    fn origin_comment(&mut self, loc: Option<crate::syntax::Loc>) {
        if self.debug {
            if let Some(loc) = loc {
                let comment = format!("// {}:{}", self.file_name, loc.line + 1);
                self.push_line(&comment);
            }
        }
    }

    fn emit_struct(&mut self, st: &crate::hir::StructDef) {
        self.push_line(&format!("struct {} {{", st.name));
        self.indent += 1;
        for field in &st.fields {
            let mut line = String::new();
            for attr in &field.attrs {
                let _ = write!(line, "{} ", attr);
            }
            let _ = write!(line, "{}: {},", field.name, field.ty);
            self.push_line(&line);
        }
        self.indent -= 1;
        self.push_line("}");
    }

    fn emit_function(&mut self, func: &Function) {
        self.origin_comment(func.loc);
        if let Some(stage) = func.stage {
            let mut line = format!("@{}", stage);
            if let (crate::syntax::ast::ShaderStage::Compute, Some([x, y, z])) = (stage, func.workgroup_size) {
                let _ = write!(line, " @workgroup_size({}, {}, {})", x, y, z);
            }
            self.push_line(&line);
        }

        let name_index = self.name_index(&func.name);
        self.record(func.loc, Some(name_index));

        let mut signature = format!("fn {}(", func.name);
        for (i, param) in func.params.iter().enumerate() {
            if i > 0 {
                signature.push_str(", ");
            }
            for attr in &param.attrs {
                let _ = write!(signature, "{} ", attr);
            }
            let _ = write!(signature, "{}: {}", param.name, param.ty);
        }
        signature.push(')');
        if let Some(ret) = &func.ret {
            signature.push_str(" -> ");
            for attr in &func.ret_attrs {
                let _ = write!(signature, "{} ", attr);
            }
            let _ = write!(signature, "{}", ret);
        }
        signature.push_str(" {");
        self.push_line(&signature);

        self.indent += 1;
        for stmt in &func.body {
            self.emit_stmt(stmt);
        }
        self.indent -= 1;
        self.push_line("}");
    }

    fn emit_stmt(&mut self, stmt: &Stmt) {
        self.origin_comment(stmt.loc());
        self.record(stmt.loc(), None);
        match stmt {
            Stmt::Let { .. } | Stmt::Var { .. } | Stmt::Assign { .. } | Stmt::Expr { .. } => {
                let mut line = emit_simple_stmt(stmt);
                line.push(';');
                self.push_line(&line);
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                self.push_line(&format!("if ({}) {{", emit_expr(cond, 0)));
                self.indent += 1;
                for stmt in then_branch {
                    self.emit_stmt(stmt);
                }
                self.indent -= 1;
                match else_branch {
                    Some(else_branch) => {
                        self.push_line("} else {");
                        self.indent += 1;
                        for stmt in else_branch {
                            self.emit_stmt(stmt);
                        }
                        self.indent -= 1;
                        self.push_line("}");
                    }
                    None => self.push_line("}"),
                }
            }
            Stmt::For {
                init, cond, step, body, ..
            } => {
                let init = init.as_deref().map(|s| emit_simple_stmt(s)).unwrap_or_default();
                let cond = cond.as_ref().map(|e| emit_expr(e, 0)).unwrap_or_default();
                let step = step.as_deref().map(|s| emit_simple_stmt(s)).unwrap_or_default();
                self.push_line(&format!("for ({}; {}; {}) {{", init, cond, step));
                self.indent += 1;
                for stmt in body {
                    self.emit_stmt(stmt);
                }
                self.indent -= 1;
                self.push_line("}");
            }
            Stmt::While { cond, body, .. } => {
                self.push_line(&format!("while ({}) {{", emit_expr(cond, 0)));
                self.indent += 1;
                for stmt in body {
                    self.emit_stmt(stmt);
                }
                self.indent -= 1;
                self.push_line("}");
            }
            Stmt::Return { value, .. } => match value {
                Some(value) => self.push_line(&format!("return {};", emit_expr(value, 0))),
                None => self.push_line("return;"),
            },
            Stmt::Block(stmts) => {
                self.push_line("{");
                self.indent += 1;
                for stmt in stmts {
                    self.emit_stmt(stmt);
                }
                self.indent -= 1;
                self.push_line("}");
            }
        }
    }
}

/// Renders a declaration, assignment or expression statement without its
/// terminating semicolon (also used inside `for` headers).
fn emit_simple_stmt(stmt: &Stmt) -> String {
    match stmt {
        Stmt::Let { name, ty, init, .. } => match ty {
            Some(ty) => format!("let {}: {} = {}", name, ty, emit_expr(init, 0)),
            None => format!("let {} = {}", name, emit_expr(init, 0)),
        },
        Stmt::Var { name, ty, init, .. } => {
            let mut out = format!("var {}", name);
            if let Some(ty) = ty {
                let _ = write!(out, ": {}", ty);
            }
            if let Some(init) = init {
                let _ = write!(out, " = {}", emit_expr(init, 0));
            }
            out
        }
        Stmt::Assign { target, op, value, .. } => {
            let op_text = match op {
                Some(op) => format!("{}=", op.symbol()),
                None => "=".to_string(),
            };
            format!("{} {} {}", emit_expr(target, 0), op_text, emit_expr(value, 0))
        }
        Stmt::Expr { expr, .. } => emit_expr(expr, 0),
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

/// Formats a float so it always reads as a float (a bare mantissa gets a
/// trailing `.0`).
pub(crate) fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// Renders an expression, parenthesizing when the parent binds tighter.
pub(crate) fn emit_expr(expr: &Expr, parent_prec: u8) -> String {
    match expr {
        Expr::FloatConst(value) => format_float(*value),
        Expr::IntConst(value) => value.to_string(),
        Expr::UintConst(value) => format!("{}u", value),
        Expr::BoolConst(value) => value.to_string(),
        Expr::Ident(name) => name.to_string(),
        Expr::Unary { op, expr } => {
            let inner = emit_expr(expr, 11);
            let text = match op {
                UnaryOp::Neg => format!("-{}", inner),
                UnaryOp::Not => format!("!{}", inner),
                UnaryOp::BitNot => format!("~{}", inner),
                UnaryOp::AddressOf => format!("&{}", inner),
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
                emit_expr(left, prec),
                op.symbol(),
                emit_expr(right, prec + 1)
            );
            if prec < parent_prec {
                format!("({})", text)
            } else {
                text
            }
        }
        Expr::Call { func, args } => {
            let args: Vec<String> = args.iter().map(|a| emit_expr(a, 0)).collect();
            format!("{}({})", func, args.join(", "))
        }
        Expr::Construct { ty, args } => {
            let args: Vec<String> = args.iter().map(|a| emit_expr(a, 0)).collect();
            format!("{}({})", ty, args.join(", "))
        }
        Expr::Member { base, member } => format!("{}.{}", emit_expr(base, 12), member),
        Expr::Index { base, index } => format!("{}[{}]", emit_expr(base, 12), emit_expr(index, 0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::TypeDesc;

    #[test]
    fn float_formatting() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.5), "0.5");
        assert_eq!(format_float(-2.0), "-2.0");
    }

    #[test]
    fn precedence_parenthesization() {
        // (a + b) * c keeps its parentheses, a + b * c does not gain any.
        let sum = Expr::binary(BinOp::Add, Expr::ident("a"), Expr::ident("b"));
        let product = Expr::binary(BinOp::Mul, sum.clone(), Expr::ident("c"));
        assert_eq!(emit_expr(&product, 0), "(a + b) * c");
        let loose = Expr::binary(
            BinOp::Add,
            Expr::ident("a"),
            Expr::binary(BinOp::Mul, Expr::ident("b"), Expr::ident("c")),
        );
        assert_eq!(emit_expr(&loose, 0), "a + b * c");
    }

    #[test]
    fn construct_uses_long_form() {
        let v = Expr::Construct {
            ty: TypeDesc::VEC3F,
            args: [Expr::FloatConst(1.0), Expr::FloatConst(0.0), Expr::FloatConst(0.0)]
                .into_iter()
                .collect(),
        };
        assert_eq!(emit_expr(&v, 0), "vec3<f32>(1.0, 0.0, 0.0)");
    }
}
