//! End-to-end scenarios over the public `compile` entry point.
use lueur::{compile, CompileOptions, CompileOutput, Severity, TargetSet, ValidationLevel};

fn compile_default(source: &str) -> CompileOutput {
    compile(source, "test.3d.ts", &CompileOptions::default())
}

fn compile_with(source: &str, options: &CompileOptions) -> CompileOutput {
    compile(source, "test.3d.ts", options)
}

fn assert_balanced(text: &str) {
    let braces = (
        text.matches('{').count(),
        text.matches('}').count(),
    );
    assert_eq!(braces.0, braces.1, "unbalanced braces in:\n{text}");
    let parens = (
        text.matches('(').count(),
        text.matches(')').count(),
    );
    assert_eq!(parens.0, parens.1, "unbalanced parentheses in:\n{text}");
}

fn has_code(output: &CompileOutput, code: &str) -> bool {
    output.diagnostics.iter().any(|d| d.code == code)
}

const GLOW: &str = r#"
@fragment
function main(): vec4f {
  return vec4f(sin(time), 0.0, 0.0, 1.0);
}
"#;

#[test]
fn auto_uniform_is_injected_at_group_zero() {
    let output = compile_default(GLOW);
    assert!(!output.has_errors(), "{:?}", output.diagnostics);
    assert!(output.wgsl.contains("@group(0) @binding(0) var<uniform> time: f32;"), "{}", output.wgsl);
    assert!(output.wgsl.contains("@fragment"));
    assert!(output.wgsl.contains("-> @location(0) vec4<f32>"), "{}", output.wgsl);
    // Exactly one uniform declaration.
    assert_eq!(output.wgsl.matches("var<uniform>").count(), 1);
}

#[test]
fn auto_uniform_bindings_follow_first_use_order() {
    let output = compile_default(
        r#"
        @fragment
        function main(): vec4f {
          let r = resolution;
          return vec4f(r.x, deltaTime, sin(time), 1.0);
        }
        "#,
    );
    assert!(!output.has_errors(), "{:?}", output.diagnostics);
    assert!(output.wgsl.contains("@binding(0) var<uniform> resolution: vec2<f32>;"), "{}", output.wgsl);
    assert!(output.wgsl.contains("@binding(1) var<uniform> deltaTime: f32;"));
    assert!(output.wgsl.contains("@binding(2) var<uniform> time: f32;"));
}

#[test]
fn compute_without_workgroup_size_is_an_error() {
    let output = compile_default(
        r#"
        @compute
        function tick() {
          let x = 1;
        }
        "#,
    );
    assert!(has_code(&output, "E003"), "{:?}", output.diagnostics);
    let diag = output.diagnostics.iter().find(|d| d.code == "E003").unwrap();
    assert!(diag.message.contains("@workgroup_size"));
    assert!(output.wgsl.is_empty());
}

#[test]
fn compute_without_workgroup_size_in_strict_mode_uses_the_strict_code() {
    let options = CompileOptions {
        validate: ValidationLevel::Strict,
        ..CompileOptions::default()
    };
    let output = compile_with("@compute\nfunction tick() { }", &options);
    assert!(has_code(&output, "S005"), "{:?}", output.diagnostics);
}

#[test]
fn oversized_workgroup_is_rejected() {
    let output = compile_default(
        r#"
        @compute @workgroup_size(64, 64, 2)
        function tick() { }
        "#,
    );
    assert!(has_code(&output, "E011"), "{:?}", output.diagnostics);
}

#[test]
fn non_power_of_two_workgroup_warns() {
    let output = compile_default(
        r#"
        @compute @workgroup_size(6, 5)
        function tick() { }
        "#,
    );
    assert!(has_code(&output, "W002"), "{:?}", output.diagnostics);
    assert!(!output.has_errors());
}

#[test]
fn matrix_vector_multiplication_types_correctly() {
    let output = compile_default(
        r#"
        function transform(m: mat4x4<f32>, v: vec4<f32>): vec4<f32> {
          return m * v;
        }
        "#,
    );
    assert!(!output.has_errors(), "{:?}", output.diagnostics);
}

#[test]
fn vector_times_matrix_advises_reversing_the_operands() {
    let output = compile_default(
        r#"
        function transform(m: mat4x4<f32>, v: vec4<f32>): vec4<f32> {
          return v * m;
        }
        "#,
    );
    assert!(has_code(&output, "E008"), "{:?}", output.diagnostics);
    let diag = output.diagnostics.iter().find(|d| d.code == "E008").unwrap();
    assert!(diag.suggestion.is_some());
}

#[test]
fn invalid_swizzle_names_the_component_and_the_type() {
    let output = compile_default(
        r#"
        function f(v: vec3<f32>): f32 {
          let q = v.xyzw;
          return q.x;
        }
        "#,
    );
    assert!(has_code(&output, "E007"), "{:?}", output.diagnostics);
    let diag = output.diagnostics.iter().find(|d| d.code == "E007").unwrap();
    assert!(diag.message.contains("vec3"), "{}", diag.message);
    assert!(diag.message.contains('w'), "{}", diag.message);
}

#[test]
fn vertex_entry_must_produce_a_position() {
    let output = compile_default(
        r#"
        @vertex
        function v(): f32 {
          return 1.0;
        }
        "#,
    );
    assert!(has_code(&output, "E004"), "{:?}", output.diagnostics);
    let diag = output.diagnostics.iter().find(|d| d.code == "E004").unwrap();
    assert!(diag.message.contains("vec4") || diag.message.contains("position"));
}

#[test]
fn fragment_entry_must_produce_a_color_output() {
    let output = compile_default(
        r#"
        @fragment
        function f(): f32 {
          return 1.0;
        }
        "#,
    );
    assert!(has_code(&output, "E005"), "{:?}", output.diagnostics);
    let diag = output.diagnostics.iter().find(|d| d.code == "E005").unwrap();
    assert!(diag.message.contains("vec4") || diag.message.contains("location"));
}

const VARYINGS: &str = r#"
interface Varyings {
  @builtin(position) position: vec4f;
  @location(0) color: vec3f;
}

@vertex
function vert(@location(0) pos: vec3f, @location(1) tint: vec3f): Varyings {
  var result: Varyings;
  result.position = vec4f(pos, 1.0);
  result.color = tint;
  return result;
}

@fragment
function frag(@location(0) color: vec3f): vec4f {
  return vec4f(color, 1.0);
}
"#;

#[test]
fn struct_varyings_compile_across_all_targets() {
    let output = compile_default(VARYINGS);
    assert!(!output.has_errors(), "{:?}", output.diagnostics);
    assert!(output.wgsl.contains("struct Varyings {"));
    assert!(output.wgsl.contains("@builtin(position) position: vec4<f32>,"));
    assert!(output.wgsl.contains("-> Varyings"));

    let vertex = output.glsl_vertex.as_deref().expect("vertex target");
    assert!(vertex.starts_with("#version 300 es"));
    assert!(vertex.contains("precision highp float;"));
    assert!(vertex.contains("layout(location = 0) in vec3 pos;"));
    assert!(vertex.contains("gl_Position"));
    assert!(vertex.contains("layout(location = 0) out vec3 color;"));

    let fragment = output.glsl_fragment.as_deref().expect("fragment target");
    assert!(fragment.contains("layout(location = 0) out vec4 fragColor;"));
    assert!(fragment.contains("fragColor ="));
}

#[test]
fn emitted_targets_are_brace_balanced() {
    for source in [GLOW, VARYINGS] {
        let output = compile_default(source);
        assert!(!output.has_errors(), "{:?}", output.diagnostics);
        assert_balanced(&output.wgsl);
        assert_balanced(&output.js);
        if let Some(vertex) = &output.glsl_vertex {
            assert_balanced(vertex);
        }
        if let Some(fragment) = &output.glsl_fragment {
            assert_balanced(fragment);
        }
    }
}

#[test]
fn compilation_is_deterministic() {
    let options = CompileOptions {
        optimize: 3,
        source_map: true,
        ..CompileOptions::default()
    };
    let a = compile_with(VARYINGS, &options);
    let b = compile_with(VARYINGS, &options);
    assert_eq!(a.wgsl, b.wgsl);
    assert_eq!(a.js, b.js);
    assert_eq!(a.glsl_vertex, b.glsl_vertex);
    assert_eq!(a.glsl_fragment, b.glsl_fragment);
    assert_eq!(
        a.source_map.as_ref().map(|m| &m.mappings),
        b.source_map.as_ref().map(|m| &m.mappings)
    );
}

#[test]
fn errors_empty_the_artifacts_but_keep_the_ast() {
    let output = compile_default(
        r#"
        @fragment
        function main(): vec4f {
          return vec4f(missing, 0.0, 0.0, 1.0);
        }
        "#,
    );
    assert!(has_code(&output, "E002"));
    assert!(output.wgsl.is_empty());
    assert!(output.js.is_empty());
    assert!(output.glsl_fragment.is_none());
    assert_eq!(output.ast.functions.len(), 1);
    assert_eq!(output.ast.functions[0].name, "main");
}

#[test]
fn duplicate_bindings_are_reported() {
    let output = compile_default(
        r#"
        @group(0) @binding(0) var a: vec4f;
        @group(0) @binding(0) var b: vec4f;
        "#,
    );
    assert!(has_code(&output, "E010"), "{:?}", output.diagnostics);
}

#[test]
fn strict_pragma_enables_strict_findings() {
    let output = compile_default(
        r#"
        // @shader3d-strict noUnusedLocals
        @fragment
        function main(): vec4f {
          let unused = 1.0;
          return vec4f(0.0, 0.0, 0.0, 1.0);
        }
        "#,
    );
    assert!(has_code(&output, "S002"), "{:?}", output.diagnostics);
    assert!(!output.has_errors());
}

#[test]
fn narrowing_return_warns() {
    let output = compile_default(
        r#"
        function f(x: f32): i32 {
          return x;
        }
        "#,
    );
    assert!(has_code(&output, "W001"), "{:?}", output.diagnostics);
    assert!(!output.has_errors());
}

#[test]
fn unknown_type_and_function_are_reported() {
    let output = compile_default(
        r#"
        function f(x: flot32): f32 {
          return frobnicate(x);
        }
        "#,
    );
    assert!(has_code(&output, "E001"), "{:?}", output.diagnostics);
    assert!(has_code(&output, "E012"), "{:?}", output.diagnostics);
}

#[test]
fn stage_detection_from_magic_comment() {
    let output = compile_default(
        r#"
        /* @3d-shader fragment */
        function main(): vec4f {
          return vec4f(1.0, 0.0, 0.0, 1.0);
        }
        "#,
    );
    assert!(!output.has_errors(), "{:?}", output.diagnostics);
    assert!(output.wgsl.contains("@fragment"));
}

#[test]
fn js_wrapper_carries_source_and_metadata() {
    let output = compile_default(GLOW);
    assert!(output.js.contains("export const SHADER_SOURCE = `"));
    assert!(output.js.contains("var<uniform> time: f32;"));
    assert!(output.js.contains("{ name: \"main\", stage: \"fragment\" }"));
    assert!(output.js.contains("{ name: \"time\", type: \"f32\", group: 0, binding: 0 }"));
}

#[test]
fn source_map_is_attached_when_requested() {
    let options = CompileOptions {
        source_map: true,
        ..CompileOptions::default()
    };
    let output = compile_with(GLOW, &options);
    let map = output.source_map.as_ref().expect("source map");
    assert_eq!(map.version, 3);
    assert_eq!(map.sources, vec!["test.3d.ts".to_string()]);
    assert!(!map.mappings.is_empty());
    let segments = lueur::codegen::sourcemap::decode_mappings(&map.mappings).expect("decodable mappings");
    assert!(!segments.is_empty());
    assert!(output.js.contains("//# sourceMappingURL=data:application/json;base64,"));
}

#[test]
fn minified_output_stays_balanced_and_loses_comments() {
    let options = CompileOptions {
        minify: true,
        debug: true,
        ..CompileOptions::default()
    };
    let output = compile_with(GLOW, &options);
    assert!(!output.wgsl.contains("//"));
    assert!(!output.wgsl.contains('\n'));
    assert_balanced(&output.wgsl);
}

#[test]
fn target_subset_is_honored() {
    let options = CompileOptions {
        targets: TargetSet::GLSL,
        ..CompileOptions::default()
    };
    let output = compile_with(GLOW, &options);
    assert!(output.wgsl.is_empty());
    assert!(output.js.is_empty());
    assert!(output.glsl_fragment.is_some());
}

#[test]
fn classes_are_carried_through_without_compilation() {
    let output = compile_default(
        r#"
        class Renderer {
          width: f32;
          height: f32;
          resize(w: f32, h: f32): f32 { return w * h; }
        }

        @fragment
        function main(): vec4f {
          return vec4f(0.0, 0.0, 0.0, 1.0);
        }
        "#,
    );
    assert!(!output.has_errors(), "{:?}", output.diagnostics);
    assert_eq!(output.ast.classes.len(), 1);
    assert!(!output.wgsl.contains("Renderer"));
}

#[test]
fn unreachable_code_is_flagged_as_info() {
    let output = compile_default(
        r#"
        function f(): f32 {
          return 1.0;
          let after = 2.0;
        }
        "#,
    );
    assert!(output
        .diagnostics
        .iter()
        .any(|d| d.code == "I001" && d.severity == Severity::Info));
}

#[test]
fn glsl_rewrites_select_and_texture_calls() {
    let output = compile_default(
        r#"
        @fragment
        function main(): vec4f {
          let picked = select(0.0, 1.0, time > 1.0);
          return vec4f(picked, 0.0, 0.0, 1.0);
        }
        "#,
    );
    assert!(!output.has_errors(), "{:?}", output.diagnostics);
    let fragment = output.glsl_fragment.as_deref().expect("fragment target");
    assert!(fragment.contains("? 1.0 : 0.0"), "{fragment}");
    assert!(output.wgsl.contains("select(0.0, 1.0,"));
}
