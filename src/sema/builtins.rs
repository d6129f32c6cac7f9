//! Builtin functions, builtin uniforms and the `Math.*` mapping.
use crate::ty::{SampleType, ScalarType, TypeDesc};

/// Uniforms injected automatically when a shader references their name.
/// Bindings are assigned at group 0 in first-use order.
pub const BUILTIN_UNIFORMS: &[(&str, TypeDesc)] = &[
    ("time", TypeDesc::F32),
    ("deltaTime", TypeDesc::F32),
    ("frame", TypeDesc::U32),
    ("resolution", TypeDesc::vec(2, ScalarType::F32)),
    ("mouse", TypeDesc::vec(4, ScalarType::F32)),
];

pub fn builtin_uniform(name: &str) -> Option<&'static TypeDesc> {
    BUILTIN_UNIFORMS.iter().find(|(n, _)| *n == name).map(|(_, ty)| ty)
}

/// `Math.*` methods with a direct target builtin.
pub const MATH_FUNCTIONS: &[(&str, &str)] = &[
    ("sin", "sin"),
    ("cos", "cos"),
    ("tan", "tan"),
    ("abs", "abs"),
    ("floor", "floor"),
    ("ceil", "ceil"),
    ("round", "round"),
    ("sqrt", "sqrt"),
    ("pow", "pow"),
    ("min", "min"),
    ("max", "max"),
    ("exp", "exp"),
    ("log", "log"),
    ("atan2", "atan2"),
];

pub fn math_builtin(name: &str) -> Option<&'static str> {
    MATH_FUNCTIONS.iter().find(|(n, _)| *n == name).map(|(_, t)| *t)
}

/// `Math.*` constants, rewritten to decimal literals.
pub fn math_constant(name: &str) -> Option<f64> {
    match name {
        "PI" => Some(std::f64::consts::PI),
        "E" => Some(std::f64::consts::E),
        _ => None,
    }
}

/// Component-wise unary builtins over float scalars and vectors.
const UNARY_FLOAT: &[&str] = &[
    "sin",
    "cos",
    "tan",
    "floor",
    "ceil",
    "round",
    "trunc",
    "fract",
    "saturate",
    "exp",
    "log",
    "sqrt",
    "inverseSqrt",
    "radians",
    "degrees",
    "normalize",
    "dpdx",
    "dpdy",
    "fwidth",
];

/// Component-wise binary builtins; operands follow the arithmetic broadcast
/// rules.
const BINARY_FLOAT: &[&str] = &["min", "max", "pow", "atan2", "step"];

/// Component-wise ternary builtins.
const TERNARY_FLOAT: &[&str] = &["clamp", "mix", "smoothstep", "fma"];

/// Whether a builtin operates on float operands (so integer literal
/// arguments convert implicitly).
pub fn expects_float(name: &str) -> bool {
    UNARY_FLOAT.contains(&name)
        || BINARY_FLOAT.contains(&name)
        || TERNARY_FLOAT.contains(&name)
        || matches!(
            name,
            "dot" | "cross" | "length" | "distance" | "reflect" | "refract"
        )
}

pub fn is_builtin_function(name: &str) -> bool {
    UNARY_FLOAT.contains(&name)
        || BINARY_FLOAT.contains(&name)
        || TERNARY_FLOAT.contains(&name)
        || matches!(
            name,
            "abs"
                | "dot"
                | "cross"
                | "length"
                | "distance"
                | "reflect"
                | "refract"
                | "select"
                | "arrayLength"
                | "textureSample"
                | "textureLoad"
                | "textureStore"
        )
}

fn expect_args(name: &str, args: &[TypeDesc], count: usize) -> Result<(), String> {
    if args.len() == count {
        Ok(())
    } else {
        Err(format!("`{}` expects {} argument(s), found {}", name, count, args.len()))
    }
}

fn float_operand(name: &str, ty: &TypeDesc) -> Result<(), String> {
    if ty.is_error() || ty.is_float_scalar_or_vector() {
        Ok(())
    } else {
        Err(format!("`{}` expects a float scalar or vector, found `{}`", name, ty))
    }
}

/// The broadcast-common type of two operands, scalars widening onto vectors.
fn common_operand(name: &str, a: &TypeDesc, b: &TypeDesc) -> Result<TypeDesc, String> {
    if a.is_error() {
        return Ok(b.clone());
    }
    if b.is_error() || a == b {
        return Ok(a.clone());
    }
    match (a, b) {
        (TypeDesc::Vector { elem, .. }, TypeDesc::Scalar(s)) if elem == s => Ok(a.clone()),
        (TypeDesc::Scalar(s), TypeDesc::Vector { elem, .. }) if elem == s => Ok(b.clone()),
        // An integer scalar argument converts implicitly onto a float vector.
        (TypeDesc::Vector { elem, .. }, TypeDesc::Scalar(s)) if elem.is_float() && s.is_integer() => Ok(a.clone()),
        (TypeDesc::Scalar(s), TypeDesc::Vector { elem, .. }) if elem.is_float() && s.is_integer() => Ok(b.clone()),
        (TypeDesc::Scalar(a_s), TypeDesc::Scalar(b_s))
            if (a_s.is_float() && b_s.is_integer()) || (a_s.is_integer() && b_s.is_float()) =>
        {
            Ok(TypeDesc::F32)
        }
        _ => Err(format!(
            "`{}` operands have incompatible types `{}` and `{}`",
            name, a, b
        )),
    }
}

/// Types a call to a builtin. `None` means the name is not a builtin;
/// `Some(Err(..))` is a builtin applied to bad arguments.
pub fn builtin_call_type(name: &str, args: &[TypeDesc]) -> Option<Result<TypeDesc, String>> {
    if UNARY_FLOAT.contains(&name) {
        return Some(expect_args(name, args, 1).and_then(|_| {
            float_operand(name, &args[0])?;
            Ok(args[0].clone())
        }));
    }
    if BINARY_FLOAT.contains(&name) {
        return Some(expect_args(name, args, 2).and_then(|_| common_operand(name, &args[0], &args[1])));
    }
    if TERNARY_FLOAT.contains(&name) {
        return Some(expect_args(name, args, 3).and_then(|_| {
            let ab = common_operand(name, &args[0], &args[1])?;
            common_operand(name, &ab, &args[2])
        }));
    }

    let result = match name {
        // `abs` also applies to integers.
        "abs" => expect_args(name, args, 1).map(|_| args[0].clone()),
        "dot" => expect_args(name, args, 2).and_then(|_| {
            let common = common_operand(name, &args[0], &args[1])?;
            match common.scalar_elem() {
                Some(elem) => Ok(TypeDesc::Scalar(elem)),
                None => Err(format!("`dot` expects vectors, found `{}`", args[0])),
            }
        }),
        "cross" => expect_args(name, args, 2).and_then(|_| {
            let common = common_operand(name, &args[0], &args[1])?;
            match common {
                TypeDesc::Vector { len: 3, .. } | TypeDesc::Error => Ok(common),
                _ => Err(format!("`cross` expects vec3 operands, found `{}`", args[0])),
            }
        }),
        "length" => expect_args(name, args, 1).and_then(|_| {
            float_operand(name, &args[0])?;
            Ok(TypeDesc::Scalar(args[0].scalar_elem().unwrap_or(ScalarType::F32)))
        }),
        "distance" => expect_args(name, args, 2).and_then(|_| {
            let common = common_operand(name, &args[0], &args[1])?;
            Ok(TypeDesc::Scalar(common.scalar_elem().unwrap_or(ScalarType::F32)))
        }),
        "reflect" => expect_args(name, args, 2).and_then(|_| common_operand(name, &args[0], &args[1])),
        "refract" => expect_args(name, args, 3).and_then(|_| common_operand(name, &args[0], &args[1])),
        "select" => expect_args(name, args, 3).and_then(|_| common_operand(name, &args[0], &args[1])),
        "arrayLength" => expect_args(name, args, 1).map(|_| TypeDesc::U32),
        "textureSample" => expect_args(name, args, 3).and_then(|_| match &args[0] {
            TypeDesc::Texture {
                sampled: SampleType::Depth,
                ..
            } => Ok(TypeDesc::F32),
            TypeDesc::Texture { .. } | TypeDesc::Error => Ok(TypeDesc::VEC4F),
            other => Err(format!("`textureSample` expects a texture, found `{}`", other)),
        }),
        "textureLoad" => {
            if args.len() != 2 && args.len() != 3 {
                Err(format!("`textureLoad` expects 2 or 3 arguments, found {}", args.len()))
            } else {
                match &args[0] {
                    TypeDesc::Texture { sampled, .. } => Ok(TypeDesc::vec(4, sampled.scalar())),
                    TypeDesc::Error => Ok(TypeDesc::VEC4F),
                    other => Err(format!("`textureLoad` expects a texture, found `{}`", other)),
                }
            }
        }
        "textureStore" => expect_args(name, args, 3).map(|_| TypeDesc::Void),
        _ => return None,
    };
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unary_preserves_shape() {
        assert_eq!(builtin_call_type("sin", &[TypeDesc::F32]), Some(Ok(TypeDesc::F32)));
        assert_eq!(builtin_call_type("sin", &[TypeDesc::VEC3F]), Some(Ok(TypeDesc::VEC3F)));
        assert!(matches!(builtin_call_type("sin", &[TypeDesc::I32]), Some(Err(_))));
    }

    #[test]
    fn reductions() {
        assert_eq!(
            builtin_call_type("dot", &[TypeDesc::VEC3F, TypeDesc::VEC3F]),
            Some(Ok(TypeDesc::F32))
        );
        assert_eq!(
            builtin_call_type("length", &[TypeDesc::VEC2F]),
            Some(Ok(TypeDesc::F32))
        );
        assert!(matches!(
            builtin_call_type("cross", &[TypeDesc::VEC2F, TypeDesc::VEC2F]),
            Some(Err(_))
        ));
    }

    #[test]
    fn unknown_name_is_not_a_builtin() {
        assert_eq!(builtin_call_type("frobnicate", &[]), None);
    }

    #[test]
    fn math_table() {
        assert_eq!(math_builtin("atan2"), Some("atan2"));
        assert_eq!(math_builtin("hypot"), None);
        assert!(math_constant("PI").unwrap() > 3.14);
    }
}
