//! Compilation options.
use bitflags::bitflags;
use strum::{Display, EnumString};

/// Validation strictness. Levels expand to individual [`ValidationFlags`];
/// explicit flags can be OR'ed on top via [`CompileOptions::extra_flags`] or
/// the `// @shader3d-strict` pragma.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ValidationLevel {
    Off,
    Basic,
    Standard,
    Strict,
    Pedantic,
}

impl Default for ValidationLevel {
    fn default() -> Self {
        ValidationLevel::Standard
    }
}

bitflags! {
    /// Individual validation checks.
    pub struct ValidationFlags: u32 {
        const NO_IMPLICIT_ANY        = 1 << 0;
        const STRICT_NULL_CHECKS     = 1 << 1;
        const NO_UNUSED_LOCALS       = 1 << 2;
        const NO_UNUSED_PARAMETERS   = 1 << 3;
        const NO_IMPLICIT_RETURNS    = 1 << 4;
        const STRICT_ALIGNMENT       = 1 << 5;
        const STRICT_BINDINGS        = 1 << 6;
        const STRICT_WORKGROUP_SIZE  = 1 << 7;
        const NO_IMPLICIT_FLOAT      = 1 << 8;
    }
}

impl ValidationLevel {
    /// The set of checks a level turns on.
    pub fn flags(self) -> ValidationFlags {
        match self {
            ValidationLevel::Off | ValidationLevel::Basic => ValidationFlags::empty(),
            ValidationLevel::Standard => ValidationFlags::NO_IMPLICIT_RETURNS,
            ValidationLevel::Strict => {
                ValidationFlags::NO_IMPLICIT_RETURNS
                    | ValidationFlags::NO_IMPLICIT_ANY
                    | ValidationFlags::STRICT_NULL_CHECKS
                    | ValidationFlags::NO_UNUSED_LOCALS
                    | ValidationFlags::NO_UNUSED_PARAMETERS
                    | ValidationFlags::STRICT_BINDINGS
                    | ValidationFlags::STRICT_WORKGROUP_SIZE
            }
            ValidationLevel::Pedantic => ValidationFlags::all(),
        }
    }
}

/// Parses one camelCase flag name as used by the strict pragma
/// (`// @shader3d-strict noImplicitAny strictBindings`).
pub fn parse_flag_name(name: &str) -> Option<ValidationFlags> {
    match name {
        "noImplicitAny" => Some(ValidationFlags::NO_IMPLICIT_ANY),
        "strictNullChecks" => Some(ValidationFlags::STRICT_NULL_CHECKS),
        "noUnusedLocals" => Some(ValidationFlags::NO_UNUSED_LOCALS),
        "noUnusedParameters" => Some(ValidationFlags::NO_UNUSED_PARAMETERS),
        "noImplicitReturns" => Some(ValidationFlags::NO_IMPLICIT_RETURNS),
        "strictAlignment" => Some(ValidationFlags::STRICT_ALIGNMENT),
        "strictBindings" => Some(ValidationFlags::STRICT_BINDINGS),
        "strictWorkgroupSize" => Some(ValidationFlags::STRICT_WORKGROUP_SIZE),
        "noImplicitFloat" => Some(ValidationFlags::NO_IMPLICIT_FLOAT),
        _ => None,
    }
}

bitflags! {
    /// Which target dialects to emit.
    pub struct TargetSet: u32 {
        const WGSL = 1 << 0;
        const GLSL = 1 << 1;
        const JS   = 1 << 2;
    }
}

impl Default for TargetSet {
    fn default() -> Self {
        TargetSet::all()
    }
}

/// Options for one compilation.
///
/// The compiler is a pure function of `(source, options)`; every knob lives
/// here and nothing is read from the environment.
#[derive(Clone, Debug)]
pub struct CompileOptions {
    pub validate: ValidationLevel,
    /// Checks enabled on top of what the level implies.
    pub extra_flags: ValidationFlags,
    /// Optimization level, 0 to 3.
    pub optimize: u8,
    pub targets: TargetSet,
    pub source_map: bool,
    /// Emit `// file:line` origin comments in the targets.
    pub debug: bool,
    /// Collapse whitespace and strip comments from the emitted artifacts.
    pub minify: bool,
    /// Fixpoint cap for the optimizer driver.
    pub max_iterations: u32,
    /// Maximum callee body size (expression nodes) eligible for inlining.
    pub inline_threshold: usize,
    /// Maximum constant trip count eligible for full loop unrolling.
    pub unroll_threshold: u32,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            validate: ValidationLevel::Standard,
            extra_flags: ValidationFlags::empty(),
            optimize: 1,
            targets: TargetSet::all(),
            source_map: false,
            debug: false,
            minify: false,
            max_iterations: 10,
            inline_threshold: 16,
            unroll_threshold: 8,
        }
    }
}

impl CompileOptions {
    /// The effective check set for this compilation.
    pub fn validation_flags(&self) -> ValidationFlags {
        self.validate.flags() | self.extra_flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_cumulative() {
        assert!(ValidationLevel::Off.flags().is_empty());
        assert!(ValidationLevel::Strict.flags().contains(ValidationFlags::NO_IMPLICIT_ANY));
        assert!(ValidationLevel::Pedantic.flags().contains(ValidationFlags::STRICT_ALIGNMENT));
        assert!(ValidationLevel::Strict
            .flags()
            .contains(ValidationLevel::Standard.flags()));
    }

    #[test]
    fn pragma_flag_names() {
        assert_eq!(parse_flag_name("noImplicitAny"), Some(ValidationFlags::NO_IMPLICIT_ANY));
        assert_eq!(parse_flag_name("bogus"), None);
    }
}
