//! JS wrapper generation.
//!
//! The wrapper is a plain ES module carrying the compiled WGSL text plus the
//! metadata a runtime needs to bind it: entry points with their stages and
//! the uniform list with binding coordinates. It never executes anything.
use crate::hir::Module;
use std::fmt::Write;

/// Escapes text for embedding in a JS template literal.
fn escape_template(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '`' => out.push_str("\\`"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            other => out.push(other),
        }
    }
    out
}

/// Emits the wrapper module around the WGSL text.
pub fn emit(module: &Module, wgsl: &str) -> String {
    let mut out = String::new();
    out.push_str("export const SHADER_SOURCE = `");
    out.push_str(&escape_template(wgsl));
    out.push_str("`;\n\n");

    out.push_str("export const ENTRY_POINTS = [\n");
    for func in module.entry_points() {
        let stage = func.stage.map(|s| s.to_string()).unwrap_or_default();
        let mut line = format!("  {{ name: \"{}\", stage: \"{}\"", func.name, stage);
        if let Some([x, y, z]) = func.workgroup_size {
            let _ = write!(line, ", workgroupSize: [{}, {}, {}]", x, y, z);
        }
        line.push_str(" },\n");
        out.push_str(&line);
    }
    out.push_str("];\n\n");

    out.push_str("export const UNIFORMS = [\n");
    for uniform in &module.uniforms {
        let _ = writeln!(
            out,
            "  {{ name: \"{}\", type: \"{}\", group: {}, binding: {} }},",
            uniform.name, uniform.ty, uniform.group, uniform.binding
        );
    }
    out.push_str("];\n\n");

    out.push_str("export default { source: SHADER_SOURCE, entryPoints: ENTRY_POINTS, uniforms: UNIFORMS };\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_escaping() {
        assert_eq!(escape_template("a`b"), "a\\`b");
        assert_eq!(escape_template("${x}"), "\\${x}");
        assert_eq!(escape_template("a\\nb"), "a\\\\nb");
        assert_eq!(escape_template("$x"), "$x");
    }

    #[test]
    fn wrapper_carries_source_and_metadata() {
        let module = Module::default();
        let out = emit(&module, "fn main() { }");
        assert!(out.contains("export const SHADER_SOURCE"));
        assert!(out.contains("fn main() { }"));
        assert!(out.contains("export const ENTRY_POINTS"));
        assert!(out.contains("export default"));
    }
}
