//! Swizzle selectors over vector types.
//!
//! A selector projects a vector into a scalar or another vector by component
//! reordering or duplication. Components come from one of three canonical
//! sets (`xyzw`, `rgba`, `stpq`); a selector may not mix sets.
use crate::ty::TypeDesc;
use smallvec::SmallVec;
use thiserror::Error;

const COMPONENT_SETS: [&str; 3] = ["xyzw", "rgba", "stpq"];

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SwizzleError {
    #[error("swizzle selector is empty")]
    Empty,
    #[error("swizzle selector `{0}` has more than 4 components")]
    TooLong(String),
    #[error("`{0}` is not a swizzle component")]
    UnknownComponent(char),
    #[error("swizzle selector `{selector}` mixes component sets (`{first}` and `{second}`)")]
    MixedSets { selector: String, first: char, second: char },
    #[error("component `{component}` is out of range for `{ty}`")]
    OutOfRange { component: char, ty: TypeDesc },
    #[error("`{0}` is not a vector type")]
    NotAVector(TypeDesc),
}

/// A validated swizzle.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Swizzle {
    /// Source component index for each selector character.
    pub indices: SmallVec<[u8; 4]>,
    /// Scalar for single-component selectors, a vector of the selector length
    /// otherwise.
    pub result: TypeDesc,
    /// A swizzle can be assigned through only when every component is
    /// distinct.
    pub writable: bool,
}

/// Validates and types `selector` against a vector type.
pub fn check(ty: &TypeDesc, selector: &str) -> Result<Swizzle, SwizzleError> {
    let (elem, len) = match *ty {
        TypeDesc::Vector { elem, len } => (elem, len),
        _ => return Err(SwizzleError::NotAVector(ty.clone())),
    };

    if selector.is_empty() {
        return Err(SwizzleError::Empty);
    }
    if selector.len() > 4 {
        return Err(SwizzleError::TooLong(selector.to_string()));
    }

    let first = selector.chars().next().unwrap();
    let set = COMPONENT_SETS
        .iter()
        .find(|set| set.contains(first))
        .ok_or(SwizzleError::UnknownComponent(first))?;

    let mut indices = SmallVec::new();
    for c in selector.chars() {
        let index = match set.find(c) {
            Some(index) => index as u8,
            None => {
                if COMPONENT_SETS.iter().any(|other| other.contains(c)) {
                    return Err(SwizzleError::MixedSets {
                        selector: selector.to_string(),
                        first,
                        second: c,
                    });
                }
                return Err(SwizzleError::UnknownComponent(c));
            }
        };
        if index >= len {
            return Err(SwizzleError::OutOfRange {
                component: c,
                ty: ty.clone(),
            });
        }
        indices.push(index);
    }

    let result = if indices.len() == 1 {
        TypeDesc::Scalar(elem)
    } else {
        TypeDesc::vec(indices.len() as u8, elem)
    };
    let writable = {
        let mut seen = [false; 4];
        indices.iter().all(|&i| !std::mem::replace(&mut seen[i as usize], true))
    };

    Ok(Swizzle {
        indices,
        result,
        writable,
    })
}

/// Enumerates every valid selector over the `xyzw` set for a vector of the
/// given size, lengths 1 through 4.
pub fn enumerate(len: u8) -> Vec<String> {
    let components: Vec<char> = "xyzw".chars().take(len as usize).collect();
    let mut out = Vec::new();
    let mut current = String::new();
    fn walk(components: &[char], current: &mut String, out: &mut Vec<String>) {
        if current.len() >= 4 {
            return;
        }
        for &c in components {
            current.push(c);
            out.push(current.clone());
            walk(components, current, out);
            current.pop();
        }
    }
    walk(&components, &mut current, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::ScalarType;

    #[test]
    fn xyz_on_vec3() {
        let swizzle = check(&TypeDesc::VEC3F, "xyz").unwrap();
        assert_eq!(swizzle.result, TypeDesc::VEC3F);
        assert_eq!(swizzle.indices.as_slice(), &[0, 1, 2]);
        assert!(swizzle.writable);
    }

    #[test]
    fn w_is_out_of_range_for_vec3() {
        let err = check(&TypeDesc::VEC3F, "xyzw").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("vec3"), "{message}");
        assert!(message.contains('w'), "{message}");
    }

    #[test]
    fn single_component_yields_scalar() {
        let swizzle = check(&TypeDesc::vec(2, ScalarType::I32), "y").unwrap();
        assert_eq!(swizzle.result, TypeDesc::I32);
        assert_eq!(swizzle.indices.as_slice(), &[1]);
    }

    #[test]
    fn duplication_widens_and_is_not_writable() {
        let swizzle = check(&TypeDesc::vec(2, ScalarType::F32), "xxyy").unwrap();
        assert_eq!(swizzle.result, TypeDesc::VEC4F);
        assert!(!swizzle.writable);
    }

    #[test]
    fn color_and_texcoord_sets() {
        assert_eq!(check(&TypeDesc::VEC4F, "rgb").unwrap().result, TypeDesc::VEC3F);
        assert_eq!(check(&TypeDesc::VEC2F, "st").unwrap().result, TypeDesc::VEC2F);
        assert!(matches!(
            check(&TypeDesc::VEC4F, "xg").unwrap_err(),
            SwizzleError::MixedSets { .. }
        ));
    }

    #[test]
    fn length_limits() {
        assert_eq!(check(&TypeDesc::VEC4F, "").unwrap_err(), SwizzleError::Empty);
        assert!(matches!(
            check(&TypeDesc::VEC4F, "xxxxx").unwrap_err(),
            SwizzleError::TooLong(_)
        ));
    }

    #[test]
    fn enumeration_counts() {
        // n + n^2 + n^3 + n^4 selectors over one component set.
        assert_eq!(enumerate(2).len(), 2 + 4 + 8 + 16);
        assert_eq!(enumerate(3).len(), 3 + 9 + 27 + 81);
        assert_eq!(enumerate(4).len(), 4 + 16 + 64 + 256);
    }

    #[test]
    fn indices_stay_in_range() {
        for len in 2..=4u8 {
            let ty = TypeDesc::vec(len, ScalarType::F32);
            for selector in enumerate(len) {
                let swizzle = check(&ty, &selector).unwrap();
                assert!(swizzle.indices.iter().all(|&i| i < len));
            }
        }
    }
}
