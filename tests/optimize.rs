//! Optimizer pipeline scenarios through the public API.
use lueur::{compile, CompileOptions, CompileOutput};

fn compile_at(source: &str, optimize: u8) -> CompileOutput {
    let options = CompileOptions {
        optimize,
        ..CompileOptions::default()
    };
    let output = compile(source, "opt.3d.ts", &options);
    assert!(!output.has_errors(), "{:?}", output.diagnostics);
    output
}

#[test]
fn constant_expression_folds_to_a_literal() {
    let output = compile_at("function f(): i32 { return (2 + 3) * 4; }", 1);
    assert!(output.wgsl.contains("return 20;"), "{}", output.wgsl);
    assert!(output.stats.optimizer.constants_folded >= 1);
}

#[test]
fn level_zero_leaves_the_expression_alone() {
    let output = compile_at("function f(): i32 { return (2 + 3) * 4; }", 0);
    assert!(output.wgsl.contains("(2 + 3) * 4"), "{}", output.wgsl);
    assert_eq!(output.stats.optimizer.constants_folded, 0);
    assert_eq!(output.stats.optimizer.iterations, 0);
}

#[test]
fn algebraic_identities_collapse() {
    let output = compile_at(
        r#"
        function f(x: f32): f32 {
          return x + 0.0;
        }
        "#,
        1,
    );
    assert!(output.wgsl.contains("return x;"), "{}", output.wgsl);

    let output = compile_at("function g(x: f32): f32 { return x - x; }", 1);
    assert!(output.wgsl.contains("return 0.0;"), "{}", output.wgsl);

    let output = compile_at("function h(x: f32): f32 { return x * 0.0; }", 1);
    assert!(output.wgsl.contains("return 0.0;"), "{}", output.wgsl);
}

#[test]
fn unused_local_is_eliminated() {
    let output = compile_at(
        r#"
        @fragment
        function main(): vec4f {
          let unused = sin(0.25);
          return vec4f(0.0, 0.0, 0.0, 1.0);
        }
        "#,
        1,
    );
    assert!(!output.wgsl.contains("unused"), "{}", output.wgsl);
    assert!(output.stats.optimizer.dead_stmts_removed >= 1);
}

#[test]
fn uncalled_helper_is_dropped_at_level_one() {
    let output = compile_at(
        r#"
        function orphan(x: f32): f32 { return x * 3.0; }

        @fragment
        function main(): vec4f {
          return vec4f(0.0, 0.0, 0.0, 1.0);
        }
        "#,
        1,
    );
    assert!(!output.wgsl.contains("orphan"), "{}", output.wgsl);
    assert_eq!(output.stats.optimizer.dead_functions_removed, 1);
}

#[test]
fn repeated_subexpressions_are_shared_at_level_two() {
    let output = compile_at(
        r#"
        function f(a: f32, b: f32): f32 {
          let x = a * b + a;
          let y = a * b + a;
          return x + y;
        }
        "#,
        2,
    );
    assert!(output.stats.optimizer.cse_replaced >= 1, "{:?}", output.stats.optimizer);
    assert!(output.wgsl.contains("let y = x;"), "{}", output.wgsl);
}

#[test]
fn division_by_power_of_two_is_reduced_at_level_two() {
    let output = compile_at("function f(x: f32): f32 { return x / 2.0; }", 2);
    assert!(output.wgsl.contains("x * 0.5"), "{}", output.wgsl);
    assert!(output.stats.optimizer.strength_reduced >= 1);
}

#[test]
fn multiply_add_fuses_at_level_two() {
    let output = compile_at(
        r#"
        function f(a: f32, b: f32, c: f32): f32 {
          return a * b + c;
        }
        "#,
        2,
    );
    assert!(output.wgsl.contains("fma(a, b, c)"), "{}", output.wgsl);
    assert!(output.stats.optimizer.peephole_rewritten >= 1);
}

#[test]
fn clamp_zero_one_becomes_saturate() {
    let output = compile_at(
        r#"
        function f(x: f32): f32 {
          return clamp(x, 0.0, 1.0);
        }
        "#,
        1,
    );
    assert!(output.wgsl.contains("saturate(x)"), "{}", output.wgsl);
}

#[test]
fn small_helper_is_inlined_at_level_three() {
    let output = compile_at(
        r#"
        function sq(x: f32): f32 { return x * x; }

        @fragment
        function main(): vec4f {
          let s = sq(0.5);
          return vec4f(s, s, s, 1.0);
        }
        "#,
        3,
    );
    assert!(output.stats.optimizer.functions_inlined >= 1, "{:?}", output.stats.optimizer);
    // Once inlined and folded, the helper itself is unreachable.
    assert!(!output.wgsl.contains("fn sq"), "{}", output.wgsl);
    assert!(output.wgsl.contains("0.25"), "{}", output.wgsl);
}

#[test]
fn counted_loop_unrolls_at_level_three() {
    let output = compile_at(
        r#"
        function f(): f32 {
          var total: f32 = 0.0;
          for (let i = 0; i < 3; i++) {
            total += f32(i);
          }
          return total;
        }
        "#,
        3,
    );
    assert!(output.stats.optimizer.loops_unrolled >= 1, "{:?}", output.stats.optimizer);
    assert!(!output.wgsl.contains("for ("), "{}", output.wgsl);
}

#[test]
fn loop_invariant_initializer_is_hoisted_at_level_three() {
    let output = compile_at(
        r#"
        function f(scale: f32): f32 {
          var total: f32 = 0.0;
          for (let i = 0; i < 100; i++) {
            let k = scale * 0.125;
            total += k;
          }
          return total;
        }
        "#,
        3,
    );
    assert!(output.stats.optimizer.stmts_hoisted >= 1, "{:?}", output.stats.optimizer);
    let for_pos = output.wgsl.find("for (").expect("loop stays");
    let k_pos = output.wgsl.find("let k =").expect("hoisted binding");
    assert!(k_pos < for_pos, "{}", output.wgsl);
}

#[test]
fn driver_terminates_within_the_iteration_cap() {
    let source = r#"
        function f(x: f32): f32 {
          let a = x * 2.0 / 2.0 + 0.0;
          return pow(a, 2.0) + (3.0 - 3.0);
        }
    "#;
    let options = CompileOptions {
        optimize: 3,
        max_iterations: 10,
        ..CompileOptions::default()
    };
    let output = compile(source, "opt.3d.ts", &options);
    assert!(!output.has_errors(), "{:?}", output.diagnostics);
    let stats = &output.stats.optimizer;
    assert!(stats.iterations <= 10);
    // The last iteration reports no change, every earlier one changed
    // something.
    assert!(stats.changed_iterations < stats.iterations || stats.iterations == 10);
}
