//! Program-level checking: declaration resolution, per-function inference,
//! entry-point contracts and strict findings.
use crate::{
    diag::{codes, DiagnosticSink},
    options::ValidationFlags,
    sema::{
        infer::{always_returns, FunctionSig, InferCtx, TypeMap},
    },
    syntax::ast::{Attribute, FieldDecl, FunctionDecl, Program, ShaderStage},
    ty::{registry::TypeRegistry, Field, ScalarType, TypeDesc},
};
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::collections::HashMap;
use tracing::debug;

/// Everything the transformer needs from the checker.
pub struct CheckResult {
    pub types: TypeMap,
    pub functions: IndexMap<SmolStr, FunctionSig>,
    /// Field attribute lists per struct, for entry-point validation and
    /// attribute-preserving codegen.
    pub struct_fields: HashMap<SmolStr, Vec<FieldDecl>>,
}

/// Runs semantic analysis over the whole program.
///
/// Always runs to completion: parse errors leave partial declarations behind
/// and type errors taint only the expressions they touch.
pub fn check(
    program: &Program,
    registry: &mut TypeRegistry,
    diag: &mut DiagnosticSink,
    flags: ValidationFlags,
) -> CheckResult {
    // Struct declarations first; later declarations may name them.
    let mut struct_fields = HashMap::new();
    for decl in &program.structs {
        let mut fields = Vec::with_capacity(decl.fields.len());
        for field in &decl.fields {
            let ty = match registry.parse_type(&field.ty.text) {
                Some(ty) => ty,
                None => {
                    diag.error(codes::UNKNOWN_TYPE, format!("unknown type `{}`", field.ty.text))
                        .span(field.ty.span)
                        .emit();
                    TypeDesc::Error
                }
            };
            if flags.contains(ValidationFlags::STRICT_ALIGNMENT) {
                if let TypeDesc::Vector { len: 3, .. } = ty {
                    diag.hint(
                        codes::ALIGNMENT_PADDING,
                        format!("field `{}` is a vec3 and pads to a 16-byte slot", field.name),
                    )
                    .span(field.span)
                    .emit();
                }
            }
            fields.push(Field {
                name: field.name.clone(),
                ty,
            });
        }
        if fields.iter().any(|f| f.ty.is_error()) {
            // Already reported; an unresolved field leaves the struct out of
            // the registry.
        } else if let Err(err) = registry.register_struct(decl.name.clone(), fields) {
            diag.error(codes::TYPE_MISMATCH, err.to_string()).span(decl.span).emit();
        }
        struct_fields.insert(decl.name.clone(), decl.fields.clone());
    }

    // Globals: explicit bindings must not collide.
    let mut globals = HashMap::new();
    let mut bindings_seen: HashMap<(u32, u32), SmolStr> = HashMap::new();
    let mut binding_indices: Vec<u32> = Vec::new();
    for global in &program.globals {
        let ty = match &global.ty {
            Some(ty) => registry.parse_type(&ty.text).unwrap_or_else(|| {
                diag.error(codes::UNKNOWN_TYPE, format!("unknown type `{}`", ty.text))
                    .span(ty.span)
                    .emit();
                TypeDesc::Error
            }),
            // Unannotated module constants are only inferred from literal
            // initializers.
            None => match &global.init {
                Some(crate::syntax::ast::Expr::IntLit { suffix, .. }) => match suffix {
                    Some(crate::syntax::ast::NumSuffix::U) => TypeDesc::U32,
                    Some(crate::syntax::ast::NumSuffix::F) => TypeDesc::F32,
                    Some(crate::syntax::ast::NumSuffix::H) => TypeDesc::F16,
                    _ => TypeDesc::I32,
                },
                Some(crate::syntax::ast::Expr::FloatLit { suffix, .. }) => match suffix {
                    Some(crate::syntax::ast::NumSuffix::H) => TypeDesc::F16,
                    _ => TypeDesc::F32,
                },
                Some(crate::syntax::ast::Expr::BoolLit { .. }) => TypeDesc::BOOL,
                _ => TypeDesc::Error,
            },
        };
        if let (Some(group), Some(binding)) = (global.group, global.binding) {
            if let Some(previous) = bindings_seen.insert((group, binding), global.name.clone()) {
                diag.error(
                    codes::DUPLICATE_BINDING,
                    format!(
                        "binding (group={}, binding={}) of `{}` is already used by `{}`",
                        group, binding, global.name, previous
                    ),
                )
                .span(global.span)
                .emit();
            }
            binding_indices.push(binding);
        }
        globals.insert(global.name.clone(), ty);
    }
    if flags.contains(ValidationFlags::STRICT_BINDINGS) && !binding_indices.is_empty() {
        binding_indices.sort_unstable();
        binding_indices.dedup();
        let contiguous = binding_indices
            .iter()
            .enumerate()
            .all(|(i, &b)| b == i as u32);
        if !contiguous {
            diag.hint(
                codes::NONCONTIGUOUS_BINDINGS,
                "explicit binding indices leave gaps; renumber them from 0",
            )
            .emit();
        }
    }

    // Function signatures before bodies so calls resolve in any order.
    let mut functions = IndexMap::new();
    for decl in &program.functions {
        let mut params = Vec::with_capacity(decl.params.len());
        for param in &decl.params {
            let ty = match &param.ty {
                Some(ty) => registry.parse_type(&ty.text).unwrap_or_else(|| {
                    diag.error(codes::UNKNOWN_TYPE, format!("unknown type `{}`", ty.text))
                        .span(ty.span)
                        .emit();
                    TypeDesc::Error
                }),
                None => {
                    if flags.contains(ValidationFlags::NO_IMPLICIT_ANY) {
                        diag.warning(
                            codes::IMPLICIT_ANY,
                            format!("parameter `{}` has no type annotation", param.name),
                        )
                        .span(param.span)
                        .emit();
                    }
                    TypeDesc::Error
                }
            };
            params.push((param.name.clone(), ty));
        }
        let ret = match &decl.ret {
            Some(ret) => registry.parse_type(&ret.text).unwrap_or_else(|| {
                diag.error(codes::UNKNOWN_TYPE, format!("unknown type `{}`", ret.text))
                    .span(ret.span)
                    .emit();
                TypeDesc::Error
            }),
            None => TypeDesc::Void,
        };
        functions.insert(
            decl.name.clone(),
            FunctionSig {
                name: decl.name.clone(),
                params,
                ret,
            },
        );
    }

    // Bodies.
    let mut types = TypeMap::new();
    for decl in &program.functions {
        let sig = functions.get(&decl.name).cloned().expect("signature registered above");
        let mut ctx = InferCtx::new(registry, diag, &functions, &globals, flags);
        ctx.current_ret = decl.ret.as_ref().map(|_| sig.ret.clone());
        ctx.push_scope();
        for (param, (name, ty)) in decl.params.iter().zip(&sig.params) {
            ctx.declare_param(name.clone(), ty.clone(), param.span);
        }
        ctx.infer_stmts(&decl.body.stmts);
        ctx.pop_scope();
        types.extend(ctx.types);

        check_entry_point(decl, &sig.ret, &struct_fields, diag, flags);

        if flags.contains(ValidationFlags::NO_IMPLICIT_RETURNS)
            && decl.ret.is_some()
            && !sig.ret.is_error()
            && sig.ret != TypeDesc::Void
            && !always_returns(&decl.body.stmts)
        {
            diag.warning(
                codes::MISSING_RETURN,
                format!("not all paths through `{}` return a value", decl.name),
            )
            .span(decl.span)
            .emit();
        }
    }

    debug!(
        functions = functions.len(),
        typed_exprs = types.len(),
        errors = diag.error_count(),
        "checked program"
    );

    CheckResult {
        types,
        functions,
        struct_fields,
    }
}

fn has_attr(attrs: &[Attribute], name: &str, value: Option<&str>) -> bool {
    attrs.iter().any(|attr| {
        attr.name == name && value.map_or(true, |v| attr.value.as_deref().map(str::trim) == Some(v))
    })
}

/// Validates the stage contract of an entry point.
fn check_entry_point(
    decl: &FunctionDecl,
    ret: &TypeDesc,
    struct_fields: &HashMap<SmolStr, Vec<FieldDecl>>,
    diag: &mut DiagnosticSink,
    flags: ValidationFlags,
) {
    let stage = match decl.stage {
        Some(stage) => stage,
        None => return,
    };
    match stage {
        ShaderStage::Vertex => {
            let ok = match ret {
                TypeDesc::Vector {
                    len: 4,
                    elem: ScalarType::F32,
                } => true,
                TypeDesc::Struct(st) => struct_fields
                    .get(&st.name)
                    .map_or(false, |fields| {
                        fields.iter().any(|f| has_attr(&f.attrs, "builtin", Some("position")))
                    }),
                TypeDesc::Error => true,
                _ => false,
            };
            if !ok || decl.ret.is_none() {
                diag.error(
                    codes::INVALID_VERTEX_SIGNATURE,
                    format!(
                        "vertex entry point `{}` must return `vec4<f32>` or a struct with a `@builtin(position)` member",
                        decl.name
                    ),
                )
                .span(decl.span)
                .emit();
            }
        }
        ShaderStage::Fragment => {
            let ok = match ret {
                TypeDesc::Vector { len: 4, .. } => true,
                TypeDesc::Struct(st) => struct_fields
                    .get(&st.name)
                    .map_or(false, |fields| fields.iter().any(|f| has_attr(&f.attrs, "location", None))),
                TypeDesc::Error => true,
                _ => false,
            };
            if !ok || decl.ret.is_none() {
                diag.error(
                    codes::INVALID_FRAGMENT_SIGNATURE,
                    format!(
                        "fragment entry point `{}` must return a `vec4` or a struct with `@location` members",
                        decl.name
                    ),
                )
                .span(decl.span)
                .emit();
            }
        }
        ShaderStage::Compute => match decl.workgroup_size {
            None => {
                let code = if flags.contains(ValidationFlags::STRICT_WORKGROUP_SIZE) {
                    codes::STRICT_WORKGROUP_SIZE
                } else {
                    codes::MISSING_WORKGROUP_SIZE
                };
                diag.error(
                    code,
                    format!(
                        "compute entry point `{}` must declare `@workgroup_size(x[, y[, z]])`",
                        decl.name
                    ),
                )
                .span(decl.span)
                .emit();
            }
            Some((x, y, z)) => {
                let product = x.saturating_mul(y.unwrap_or(1)).saturating_mul(z.unwrap_or(1));
                if product > 1024 {
                    diag.error(
                        codes::WORKGROUP_TOO_LARGE,
                        format!("workgroup size product {} exceeds the limit of 1024", product),
                    )
                    .span(decl.span)
                    .emit();
                } else if product > 0 && !product.is_power_of_two() {
                    diag.warning(
                        codes::WORKGROUP_NOT_POW2,
                        format!("workgroup size product {} is not a power of two", product),
                    )
                    .span(decl.span)
                    .emit();
                }
                if flags.contains(ValidationFlags::STRICT_WORKGROUP_SIZE) && ![64, 128, 256].contains(&product) {
                    diag.hint(
                        codes::WORKGROUP_SIZE_HINT,
                        format!("workgroup size product {} is not one of the recommended 64/128/256", product),
                    )
                    .span(decl.span)
                    .emit();
                }
            }
        },
    }
}
