//! Type registry.
//!
//! One registry lives per compilation. Construction clones the process-wide
//! builtin table (scalars, vectors, matrices, textures, samplers); user
//! structs are registered on top as the checker encounters them.
use crate::ty::{
    Field, Layout, SampleType, ScalarType, StructType, TextureDimension, TypeDesc,
};
use bitflags::bitflags;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use smol_str::SmolStr;
use std::sync::Arc;
use thiserror::Error;

bitflags! {
    /// Category flags attached to registered types.
    pub struct TypeFlags: u32 {
        const SCALAR  = 1 << 0;
        const VECTOR  = 1 << 1;
        const MATRIX  = 1 << 2;
        const TEXTURE = 1 << 3;
        const SAMPLER = 1 << 4;
        const STRUCT  = 1 << 5;
        /// The type has a uniform-buffer layout (a size and an alignment).
        const HOST_SHAREABLE = 1 << 6;
    }
}

/// A registered type with its computed layout.
#[derive(Clone, Debug)]
pub struct TypeInfo {
    pub ty: TypeDesc,
    pub size: u32,
    pub align: u32,
    pub flags: TypeFlags,
}

impl TypeInfo {
    fn new(ty: TypeDesc, flags: TypeFlags) -> TypeInfo {
        let (size, align, flags) = match ty.layout() {
            Some(Layout { size, align }) => (size, align, flags | TypeFlags::HOST_SHAREABLE),
            None => (0, 0, flags),
        };
        TypeInfo { ty, size, align, flags }
    }
}

/// Field of a registered struct with its resolved offset.
#[derive(Clone, Debug)]
pub struct FieldLayout {
    pub name: SmolStr,
    pub ty: TypeDesc,
    pub offset: u32,
    pub size: u32,
    pub align: u32,
}

/// Computed layout of a registered struct.
#[derive(Clone, Debug)]
pub struct StructLayout {
    pub ty: Arc<StructType>,
    pub fields: Vec<FieldLayout>,
    pub size: u32,
    pub align: u32,
}

#[derive(Clone, Debug, Error)]
pub enum LayoutError {
    #[error("field `{field}` of struct `{name}` has no uniform-buffer layout")]
    Unsizable { name: SmolStr, field: SmolStr },
    #[error("struct `{0}` has no fields")]
    Empty(SmolStr),
}

static SCALARS: &[ScalarType] = &[
    ScalarType::F32,
    ScalarType::F16,
    ScalarType::I32,
    ScalarType::U32,
    ScalarType::Bool,
];

/// Element types of the pre-registered vector and matrix variants.
static VECTOR_ELEMS: &[ScalarType] = &[ScalarType::F32, ScalarType::F16, ScalarType::I32, ScalarType::U32];
static MATRIX_ELEMS: &[ScalarType] = &[ScalarType::F32, ScalarType::F16];

static TEXTURE_DIMS: &[TextureDimension] = &[
    TextureDimension::D1,
    TextureDimension::D2,
    TextureDimension::D3,
    TextureDimension::Cube,
    TextureDimension::D2Array,
];

/// The builtin table, built once per process and shared read-only by every
/// registry.
static BUILTIN_TYPES: Lazy<Vec<(SmolStr, TypeInfo)>> = Lazy::new(|| {
    let mut table = Vec::new();
    let mut add = |ty: TypeDesc, flags: TypeFlags| {
        table.push((SmolStr::new(ty.to_string()), TypeInfo::new(ty, flags)));
    };

    for &s in SCALARS {
        add(TypeDesc::Scalar(s), TypeFlags::SCALAR);
    }
    for &elem in VECTOR_ELEMS {
        for len in 2..=4u8 {
            add(TypeDesc::vec(len, elem), TypeFlags::VECTOR);
        }
    }
    for &elem in MATRIX_ELEMS {
        for columns in 2..=4u8 {
            for rows in 2..=4u8 {
                add(TypeDesc::mat(columns, rows, elem), TypeFlags::MATRIX);
            }
        }
    }
    for &dim in TEXTURE_DIMS {
        for sampled in [SampleType::Float, SampleType::Sint, SampleType::Uint] {
            add(TypeDesc::Texture { dim, sampled }, TypeFlags::TEXTURE);
        }
        // Depth textures only exist for the shadow-capable dimensions.
        if matches!(dim, TextureDimension::D2 | TextureDimension::Cube | TextureDimension::D2Array) {
            add(
                TypeDesc::Texture {
                    dim,
                    sampled: SampleType::Depth,
                },
                TypeFlags::TEXTURE,
            );
        }
    }
    add(TypeDesc::Sampler { comparison: false }, TypeFlags::SAMPLER);
    add(TypeDesc::Sampler { comparison: true }, TypeFlags::SAMPLER);
    table
});

/// Canonical name to type mapping plus struct layouts for one compilation.
#[derive(Debug)]
pub struct TypeRegistry {
    types: IndexMap<SmolStr, TypeInfo>,
    structs: IndexMap<SmolStr, StructLayout>,
}

impl TypeRegistry {
    pub fn new() -> TypeRegistry {
        TypeRegistry {
            types: BUILTIN_TYPES.iter().cloned().collect(),
            structs: IndexMap::new(),
        }
    }

    /// Looks up a registered type by its canonical name.
    pub fn info(&self, name: &str) -> Option<&TypeInfo> {
        self.types.get(name)
    }

    pub fn struct_layout(&self, name: &str) -> Option<&StructLayout> {
        self.structs.get(name)
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Registers a struct and computes its layout: fields are placed in
    /// declaration order, each offset bumped to the field alignment, and the
    /// total size rounded up to the largest field alignment.
    ///
    /// Re-registering a name replaces the previous entry (last write wins).
    pub fn register_struct(
        &mut self,
        name: impl Into<SmolStr>,
        fields: Vec<Field>,
    ) -> Result<TypeDesc, LayoutError> {
        let name = name.into();
        if fields.is_empty() {
            return Err(LayoutError::Empty(name));
        }

        let mut field_layouts = Vec::with_capacity(fields.len());
        let mut offset = 0u32;
        let mut max_align = 1u32;
        for field in &fields {
            let layout = field.ty.layout().ok_or_else(|| LayoutError::Unsizable {
                name: name.clone(),
                field: field.name.clone(),
            })?;
            offset = (offset + layout.align - 1) / layout.align * layout.align;
            field_layouts.push(FieldLayout {
                name: field.name.clone(),
                ty: field.ty.clone(),
                offset,
                size: layout.size,
                align: layout.align,
            });
            offset += layout.size;
            max_align = max_align.max(layout.align);
        }
        let size = (offset + max_align - 1) / max_align * max_align;

        let st = Arc::new(StructType {
            name: name.clone(),
            fields,
        });
        let ty = TypeDesc::Struct(st.clone());
        self.structs.insert(
            name.clone(),
            StructLayout {
                ty: st,
                fields: field_layouts,
                size,
                align: max_align,
            },
        );
        self.types.insert(name, TypeInfo::new(ty.clone(), TypeFlags::STRUCT));
        Ok(ty)
    }

    /// Canonical spelling of a type; the inverse of [`parse_type`] for every
    /// registered type.
    ///
    /// [`parse_type`]: TypeRegistry::parse_type
    pub fn type_to_string(&self, ty: &TypeDesc) -> String {
        ty.to_string()
    }

    /// Recognizes both short (`vec3f`, `mat4x4h`) and long (`vec3<f32>`,
    /// `mat4x4<f32>`) spellings, arrays, textures, samplers, pointers and
    /// registered struct names. Returns `None` for anything else.
    pub fn parse_type(&self, text: &str) -> Option<TypeDesc> {
        let text = text.trim();
        match text {
            "void" => return Some(TypeDesc::Void),
            "f32" | "float" => return Some(TypeDesc::F32),
            "f16" | "half" => return Some(TypeDesc::F16),
            "i32" | "int" => return Some(TypeDesc::I32),
            "u32" | "uint" => return Some(TypeDesc::U32),
            "bool" | "boolean" => return Some(TypeDesc::BOOL),
            "number" => return Some(TypeDesc::F32),
            "sampler" => return Some(TypeDesc::Sampler { comparison: false }),
            "sampler_comparison" => return Some(TypeDesc::Sampler { comparison: true }),
            _ => {}
        }

        // Prefix matches fall through so a struct named e.g. `vecData` still
        // resolves below.
        if let Some(ty) = text.strip_prefix("vec").and_then(parse_vector) {
            return Some(ty);
        }
        if let Some(ty) = text.strip_prefix("mat").and_then(parse_matrix) {
            return Some(ty);
        }
        if let Some(rest) = text.strip_prefix("array<") {
            let inner = rest.strip_suffix('>')?;
            let (elem, len) = match split_top_level(inner) {
                Some((elem, len)) => (elem, Some(len.trim().parse::<u32>().ok()?)),
                None => (inner, None),
            };
            return Some(TypeDesc::Array {
                elem: Arc::new(self.parse_type(elem)?),
                len,
            });
        }
        if let Some(rest) = text.strip_prefix("texture_depth_") {
            let dim = parse_dimension(rest)?;
            return Some(TypeDesc::Texture {
                dim,
                sampled: SampleType::Depth,
            });
        }
        if let Some(rest) = text.strip_prefix("texture_") {
            let (dim_text, elem) = match rest.find('<') {
                Some(pos) => (&rest[..pos], rest[pos + 1..].strip_suffix('>')?),
                None => (rest, "f32"),
            };
            let dim = parse_dimension(dim_text)?;
            let sampled = match elem.trim() {
                "f32" => SampleType::Float,
                "i32" => SampleType::Sint,
                "u32" => SampleType::Uint,
                _ => return None,
            };
            return Some(TypeDesc::Texture { dim, sampled });
        }
        if let Some(rest) = text.strip_prefix("ptr<") {
            let inner = rest.strip_suffix('>')?;
            let (space, elem) = split_top_level(inner)?;
            let space = match space.trim() {
                "function" => crate::ty::AddressSpace::Function,
                "private" => crate::ty::AddressSpace::Private,
                "workgroup" => crate::ty::AddressSpace::Workgroup,
                "uniform" => crate::ty::AddressSpace::Uniform,
                "storage" => crate::ty::AddressSpace::Storage,
                _ => return None,
            };
            return Some(TypeDesc::Pointer {
                space,
                elem: Arc::new(self.parse_type(elem)?),
                access: crate::ty::AccessMode::Read,
            });
        }

        self.structs.get(text).map(|layout| TypeDesc::Struct(layout.ty.clone()))
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        TypeRegistry::new()
    }
}

fn parse_scalar(text: &str) -> Option<ScalarType> {
    match text.trim() {
        "f32" => Some(ScalarType::F32),
        "f16" => Some(ScalarType::F16),
        "i32" => Some(ScalarType::I32),
        "u32" => Some(ScalarType::U32),
        "bool" => Some(ScalarType::Bool),
        _ => None,
    }
}

fn parse_suffix(text: &str) -> Option<ScalarType> {
    match text {
        "" => Some(ScalarType::F32),
        "f" => Some(ScalarType::F32),
        "h" => Some(ScalarType::F16),
        "i" => Some(ScalarType::I32),
        "u" => Some(ScalarType::U32),
        _ => None,
    }
}

/// Parses everything after the `vec` prefix.
fn parse_vector(rest: &str) -> Option<TypeDesc> {
    let mut chars = rest.chars();
    let len = chars.next()?.to_digit(10)? as u8;
    if !(2..=4).contains(&len) {
        return None;
    }
    let tail = chars.as_str();
    let elem = if let Some(inner) = tail.strip_prefix('<') {
        parse_scalar(inner.strip_suffix('>')?)?
    } else {
        parse_suffix(tail)?
    };
    Some(TypeDesc::vec(len, elem))
}

/// Parses everything after the `mat` prefix (`4x4`, `4x4h`, `4x4<f32>`).
fn parse_matrix(rest: &str) -> Option<TypeDesc> {
    let mut chars = rest.chars();
    let columns = chars.next()?.to_digit(10)? as u8;
    if chars.next()? != 'x' {
        return None;
    }
    let rows = chars.next()?.to_digit(10)? as u8;
    if !(2..=4).contains(&columns) || !(2..=4).contains(&rows) {
        return None;
    }
    let tail = chars.as_str();
    let elem = if let Some(inner) = tail.strip_prefix('<') {
        parse_scalar(inner.strip_suffix('>')?)?
    } else {
        parse_suffix(tail)?
    };
    if !elem.is_float() {
        return None;
    }
    Some(TypeDesc::mat(columns, rows, elem))
}

fn parse_dimension(text: &str) -> Option<TextureDimension> {
    match text {
        "1d" => Some(TextureDimension::D1),
        "2d" => Some(TextureDimension::D2),
        "3d" => Some(TextureDimension::D3),
        "cube" => Some(TextureDimension::Cube),
        "2d_array" => Some(TextureDimension::D2Array),
        _ => None,
    }
}

/// Splits `inner` at the first comma that is not nested inside `<...>`.
fn split_top_level(inner: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    for (i, c) in inner.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => return Some((&inner[..i], &inner[i + 1..])),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_shape() {
        let registry = TypeRegistry::new();
        // 5 scalars + 12 vectors + 18 matrices + 18 textures + 2 samplers.
        assert_eq!(registry.type_count(), 55);
        assert!(registry.info("vec3<f32>").is_some());
        assert!(registry.info("mat4x4<f16>").is_some());
        assert!(registry.info("texture_depth_cube").is_some());
        assert!(registry.info("texture_depth_1d").is_none());
    }

    #[test]
    fn short_and_long_forms() {
        let registry = TypeRegistry::new();
        assert_eq!(registry.parse_type("vec3f"), Some(TypeDesc::VEC3F));
        assert_eq!(registry.parse_type("vec3"), Some(TypeDesc::VEC3F));
        assert_eq!(registry.parse_type("vec3<f32>"), Some(TypeDesc::VEC3F));
        assert_eq!(registry.parse_type("vec2h"), Some(TypeDesc::vec(2, ScalarType::F16)));
        assert_eq!(registry.parse_type("mat4x4h"), Some(TypeDesc::mat(4, 4, ScalarType::F16)));
        assert_eq!(registry.parse_type("mat2x3<f32>"), Some(TypeDesc::mat(2, 3, ScalarType::F32)));
        assert_eq!(registry.parse_type("vec5f"), None);
        assert_eq!(registry.parse_type("mat4x4<i32>"), None);
        assert_eq!(registry.parse_type("gibberish"), None);
    }

    #[test]
    fn roundtrip_over_builtin_table() {
        let registry = TypeRegistry::new();
        for (name, info) in BUILTIN_TYPES.iter() {
            let parsed = registry.parse_type(name).unwrap_or_else(|| panic!("unparsed: {name}"));
            assert_eq!(&parsed, &info.ty);
            assert_eq!(registry.type_to_string(&parsed), name.as_str());
        }
    }

    #[test]
    fn struct_layout_walk() {
        let mut registry = TypeRegistry::new();
        let ty = registry
            .register_struct(
                "Material",
                vec![
                    Field {
                        name: "albedo".into(),
                        ty: TypeDesc::VEC3F,
                    },
                    Field {
                        name: "roughness".into(),
                        ty: TypeDesc::F32,
                    },
                    Field {
                        name: "ior".into(),
                        ty: TypeDesc::F32,
                    },
                ],
            )
            .unwrap();
        let layout = registry.struct_layout("Material").unwrap();
        assert_eq!(layout.fields[0].offset, 0);
        assert_eq!(layout.fields[1].offset, 12);
        assert_eq!(layout.fields[2].offset, 16);
        assert_eq!(layout.size, 32);
        assert_eq!(layout.align, 16);
        assert_eq!(registry.parse_type("Material"), Some(ty));
    }

    #[test]
    fn struct_reregistration_is_last_write_wins() {
        let mut registry = TypeRegistry::new();
        registry
            .register_struct(
                "Params",
                vec![Field {
                    name: "a".into(),
                    ty: TypeDesc::F32,
                }],
            )
            .unwrap();
        registry
            .register_struct(
                "Params",
                vec![Field {
                    name: "b".into(),
                    ty: TypeDesc::VEC4F,
                }],
            )
            .unwrap();
        let layout = registry.struct_layout("Params").unwrap();
        assert_eq!(layout.fields.len(), 1);
        assert_eq!(layout.fields[0].name, "b");
        assert_eq!(layout.size, 16);
    }

    #[test]
    fn unsizable_struct_field_is_rejected() {
        let mut registry = TypeRegistry::new();
        let err = registry.register_struct(
            "Bad",
            vec![Field {
                name: "tex".into(),
                ty: TypeDesc::Texture {
                    dim: TextureDimension::D2,
                    sampled: SampleType::Float,
                },
            }],
        );
        assert!(err.is_err());
    }
}
