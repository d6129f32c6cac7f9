//! Type descriptions.
//!
//! The type model is structural: two `TypeDesc` values describing the same
//! shape compare equal regardless of where they were spelled. Nested element
//! types are shared through `Arc` so cloning a descriptor is cheap.
pub mod registry;
pub mod swizzle;

pub use registry::{TypeInfo, TypeRegistry};

use smol_str::SmolStr;
use std::{fmt, sync::Arc};

/// Scalar value types.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ScalarType {
    F32,
    F16,
    I32,
    U32,
    Bool,
}

impl ScalarType {
    /// Byte size (bools are stored as 32-bit values).
    pub fn size(self) -> u32 {
        match self {
            ScalarType::F16 => 2,
            _ => 4,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, ScalarType::F32 | ScalarType::F16)
    }

    pub fn is_integer(self) -> bool {
        matches!(self, ScalarType::I32 | ScalarType::U32)
    }

    /// The canonical spelling, also the short vector suffix key (`f`, `h`,
    /// `i`, `u`).
    pub fn name(self) -> &'static str {
        match self {
            ScalarType::F32 => "f32",
            ScalarType::F16 => "f16",
            ScalarType::I32 => "i32",
            ScalarType::U32 => "u32",
            ScalarType::Bool => "bool",
        }
    }

    pub fn display_glsl(self) -> &'static str {
        match self {
            // GLSL ES 3.00 has no half scalar type; f16 degrades to float.
            ScalarType::F32 | ScalarType::F16 => "float",
            ScalarType::I32 => "int",
            ScalarType::U32 => "uint",
            ScalarType::Bool => "bool",
        }
    }

    /// GLSL vector name prefix (`vec`, `ivec`, `uvec`, `bvec`).
    pub fn glsl_vec_prefix(self) -> &'static str {
        match self {
            ScalarType::F32 | ScalarType::F16 => "",
            ScalarType::I32 => "i",
            ScalarType::U32 => "u",
            ScalarType::Bool => "b",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TextureDimension {
    D1,
    D2,
    D3,
    Cube,
    D2Array,
}

impl TextureDimension {
    pub fn suffix(self) -> &'static str {
        match self {
            TextureDimension::D1 => "1d",
            TextureDimension::D2 => "2d",
            TextureDimension::D3 => "3d",
            TextureDimension::Cube => "cube",
            TextureDimension::D2Array => "2d_array",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SampleType {
    Float,
    Sint,
    Uint,
    Depth,
}

impl SampleType {
    pub fn scalar(self) -> ScalarType {
        match self {
            SampleType::Float | SampleType::Depth => ScalarType::F32,
            SampleType::Sint => ScalarType::I32,
            SampleType::Uint => ScalarType::U32,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum AddressSpace {
    Function,
    Private,
    Workgroup,
    Uniform,
    Storage,
}

impl AddressSpace {
    pub fn name(self) -> &'static str {
        match self {
            AddressSpace::Function => "function",
            AddressSpace::Private => "private",
            AddressSpace::Workgroup => "workgroup",
            AddressSpace::Uniform => "uniform",
            AddressSpace::Storage => "storage",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Field {
    pub name: SmolStr,
    pub ty: TypeDesc,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct StructType {
    pub name: SmolStr,
    pub fields: Vec<Field>,
}

/// Describes the data type of a value.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum TypeDesc {
    Void,
    Scalar(ScalarType),
    /// Vector type; `len` is 2, 3 or 4.
    Vector {
        elem: ScalarType,
        len: u8,
    },
    /// Matrix type; `rows` and `columns` are 2, 3 or 4, element type is a
    /// float.
    Matrix {
        elem: ScalarType,
        rows: u8,
        columns: u8,
    },
    /// Array type; `len: None` is a runtime-sized array.
    Array {
        elem: Arc<TypeDesc>,
        len: Option<u32>,
    },
    Struct(Arc<StructType>),
    Texture {
        dim: TextureDimension,
        sampled: SampleType,
    },
    Sampler {
        comparison: bool,
    },
    Pointer {
        space: AddressSpace,
        elem: Arc<TypeDesc>,
        access: AccessMode,
    },
    /// Recovery type produced after a reported error; compatible with
    /// everything and never printed into a target.
    Error,
}

/// Computed size and alignment of a host-shareable type.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Layout {
    pub size: u32,
    pub align: u32,
}

fn round_up(value: u32, align: u32) -> u32 {
    (value + align - 1) / align * align
}

impl TypeDesc {
    pub const F32: TypeDesc = TypeDesc::Scalar(ScalarType::F32);
    pub const F16: TypeDesc = TypeDesc::Scalar(ScalarType::F16);
    pub const I32: TypeDesc = TypeDesc::Scalar(ScalarType::I32);
    pub const U32: TypeDesc = TypeDesc::Scalar(ScalarType::U32);
    pub const BOOL: TypeDesc = TypeDesc::Scalar(ScalarType::Bool);

    pub const fn vec(len: u8, elem: ScalarType) -> TypeDesc {
        TypeDesc::Vector { elem, len }
    }

    pub const VEC2F: TypeDesc = TypeDesc::vec(2, ScalarType::F32);
    pub const VEC3F: TypeDesc = TypeDesc::vec(3, ScalarType::F32);
    pub const VEC4F: TypeDesc = TypeDesc::vec(4, ScalarType::F32);

    pub const fn mat(columns: u8, rows: u8, elem: ScalarType) -> TypeDesc {
        TypeDesc::Matrix { elem, rows, columns }
    }

    pub const MAT4X4F: TypeDesc = TypeDesc::mat(4, 4, ScalarType::F32);

    pub fn is_scalar(&self) -> bool {
        matches!(self, TypeDesc::Scalar(_))
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, TypeDesc::Vector { .. })
    }

    pub fn is_matrix(&self) -> bool {
        matches!(self, TypeDesc::Matrix { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, TypeDesc::Error)
    }

    /// The scalar element of a scalar or vector type.
    pub fn scalar_elem(&self) -> Option<ScalarType> {
        match *self {
            TypeDesc::Scalar(s) => Some(s),
            TypeDesc::Vector { elem, .. } => Some(elem),
            TypeDesc::Matrix { elem, .. } => Some(elem),
            _ => None,
        }
    }

    pub fn is_float_scalar_or_vector(&self) -> bool {
        match self.scalar_elem() {
            Some(s) => !self.is_matrix() && s.is_float(),
            None => false,
        }
    }

    pub fn is_numeric(&self) -> bool {
        match *self {
            TypeDesc::Scalar(s) => s != ScalarType::Bool,
            TypeDesc::Vector { elem, .. } => elem != ScalarType::Bool,
            TypeDesc::Matrix { .. } => true,
            _ => false,
        }
    }

    /// Size and alignment per the uniform layout rules: vec3 pads to a vec4
    /// slot, matrix columns are stride-aligned vectors, struct sizes round up
    /// to their largest member alignment.
    pub fn layout(&self) -> Option<Layout> {
        match *self {
            TypeDesc::Scalar(s) => Some(Layout {
                size: s.size(),
                align: s.size(),
            }),
            TypeDesc::Vector { elem, len } => {
                let s = elem.size();
                let align = match len {
                    2 => 2 * s,
                    _ => 4 * s,
                };
                Some(Layout { size: len as u32 * s, align })
            }
            TypeDesc::Matrix { elem, rows, columns } => {
                let col = TypeDesc::vec(rows, elem).layout()?;
                let stride = round_up(col.size, col.align);
                Some(Layout {
                    size: columns as u32 * stride,
                    align: col.align,
                })
            }
            TypeDesc::Array { ref elem, len } => {
                let elem = elem.layout()?;
                let stride = round_up(elem.size, elem.align);
                len.map(|n| Layout {
                    size: n * stride,
                    align: elem.align,
                })
            }
            TypeDesc::Struct(ref st) => {
                let mut offset = 0;
                let mut max_align = 1;
                for field in &st.fields {
                    let f = field.ty.layout()?;
                    offset = round_up(offset, f.align) + f.size;
                    max_align = max_align.max(f.align);
                }
                Some(Layout {
                    size: round_up(offset, max_align),
                    align: max_align,
                })
            }
            _ => None,
        }
    }

    /// GLSL spelling of the type (`vec3<f32>` becomes `vec3`, matrices drop
    /// their element type, textures map to combined samplers).
    pub fn display_glsl(&self) -> impl fmt::Display + '_ {
        TypeDescDisplayGlsl(self)
    }
}

/// Canonical form: always the long spelling (`vec3<f32>`, `mat4x4<f32>`).
impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            TypeDesc::Void => write!(f, "void"),
            TypeDesc::Scalar(s) => write!(f, "{}", s),
            TypeDesc::Vector { elem, len } => write!(f, "vec{}<{}>", len, elem),
            TypeDesc::Matrix { elem, rows, columns } => write!(f, "mat{}x{}<{}>", columns, rows, elem),
            TypeDesc::Array { ref elem, len } => match len {
                Some(len) => write!(f, "array<{}, {}>", elem, len),
                None => write!(f, "array<{}>", elem),
            },
            TypeDesc::Struct(ref st) => write!(f, "{}", st.name),
            TypeDesc::Texture { dim, sampled } => match sampled {
                SampleType::Depth => write!(f, "texture_depth_{}", dim.suffix()),
                other => write!(f, "texture_{}<{}>", dim.suffix(), other.scalar()),
            },
            TypeDesc::Sampler { comparison } => {
                if comparison {
                    write!(f, "sampler_comparison")
                } else {
                    write!(f, "sampler")
                }
            }
            TypeDesc::Pointer { space, ref elem, .. } => write!(f, "ptr<{}, {}>", space.name(), elem),
            TypeDesc::Error => write!(f, "unknown"),
        }
    }
}

struct TypeDescDisplayGlsl<'a>(&'a TypeDesc);

impl<'a> fmt::Display for TypeDescDisplayGlsl<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self.0 {
            TypeDesc::Void => write!(f, "void"),
            TypeDesc::Scalar(s) => write!(f, "{}", s.display_glsl()),
            TypeDesc::Vector { elem, len } => write!(f, "{}vec{}", elem.glsl_vec_prefix(), len),
            TypeDesc::Matrix { rows, columns, .. } => {
                if rows == columns {
                    write!(f, "mat{}", columns)
                } else {
                    write!(f, "mat{}x{}", columns, rows)
                }
            }
            TypeDesc::Array { ref elem, len } => match len {
                Some(len) => write!(f, "{}[{}]", elem.display_glsl(), len),
                None => write!(f, "{}[]", elem.display_glsl()),
            },
            TypeDesc::Struct(ref st) => write!(f, "{}", st.name),
            TypeDesc::Texture { dim, .. } => match dim {
                TextureDimension::D1 => write!(f, "sampler2D"),
                TextureDimension::D2 => write!(f, "sampler2D"),
                TextureDimension::D3 => write!(f, "sampler3D"),
                TextureDimension::Cube => write!(f, "samplerCube"),
                TextureDimension::D2Array => write!(f, "sampler2DArray"),
            },
            TypeDesc::Sampler { .. } => write!(f, "sampler"),
            TypeDesc::Pointer { ref elem, .. } => write!(f, "{}", elem.display_glsl()),
            TypeDesc::Error => write!(f, "unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_spellings() {
        assert_eq!(TypeDesc::VEC3F.to_string(), "vec3<f32>");
        assert_eq!(TypeDesc::mat(4, 3, ScalarType::F32).to_string(), "mat4x3<f32>");
        assert_eq!(
            TypeDesc::Texture {
                dim: TextureDimension::D2,
                sampled: SampleType::Float
            }
            .to_string(),
            "texture_2d<f32>"
        );
        assert_eq!(
            TypeDesc::Texture {
                dim: TextureDimension::Cube,
                sampled: SampleType::Depth
            }
            .to_string(),
            "texture_depth_cube"
        );
    }

    #[test]
    fn vec3_pads_to_vec4_slot() {
        let layout = TypeDesc::VEC3F.layout().unwrap();
        assert_eq!(layout.size, 12);
        assert_eq!(layout.align, 16);
        // An array of vec3 strides at 16 bytes.
        let arr = TypeDesc::Array {
            elem: Arc::new(TypeDesc::VEC3F),
            len: Some(4),
        };
        assert_eq!(arr.layout().unwrap().size, 64);
    }

    #[test]
    fn matrix_column_stride() {
        // mat2x3<f32>: 2 columns of vec3, each padded to 16 bytes.
        let m = TypeDesc::mat(2, 3, ScalarType::F32);
        let layout = m.layout().unwrap();
        assert_eq!(layout.size, 32);
        assert_eq!(layout.align, 16);
    }

    #[test]
    fn struct_size_rounds_to_max_alignment() {
        let st = TypeDesc::Struct(Arc::new(StructType {
            name: "Light".into(),
            fields: vec![
                Field {
                    name: "position".into(),
                    ty: TypeDesc::VEC3F,
                },
                Field {
                    name: "intensity".into(),
                    ty: TypeDesc::F32,
                },
            ],
        }));
        let layout = st.layout().unwrap();
        // vec3 at 0..12, f32 at 12..16, rounded to align 16.
        assert_eq!(layout.size, 16);
        assert_eq!(layout.align, 16);
    }
}
