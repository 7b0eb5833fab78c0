//! Variables, mixins, and control directives through the public entry.

use sassafras::{compile_string, CompileError, CompileOptions, OutputStyle};

fn compile_compressed(source: &str) -> String {
    let options = CompileOptions {
        output_style: OutputStyle::Compressed,
        ..Default::default()
    };
    compile_string(source, &options).unwrap()
}

fn compile_err(source: &str) -> CompileError {
    compile_string(source, &CompileOptions::default()).unwrap_err()
}

#[test]
fn test_variable_reference() {
    let css = compile_compressed("$main: #336699;\na { color: $main; }");
    assert_eq!(css, "a{color:#336699}\n");
}

#[test]
fn test_lexical_scoping_inner_shadow_discarded() {
    let css = compile_compressed("$x: 1px;\na { $x: 2px; w: $x; }\nb { w: $x; }");
    assert_eq!(css, "a{w:2px}b{w:1px}\n");
}

#[test]
fn test_undefined_variable_is_fatal() {
    let err = compile_err("a { color: $nope; }");
    let CompileError::UndefinedVariable { name, .. } = &err else {
        panic!("expected UndefinedVariable, got {err:?}");
    };
    assert_eq!(name, "nope");
}

#[test]
fn test_undefined_mixin_is_fatal() {
    let err = compile_err("a { @include nothing; }");
    let CompileError::UndefinedMixin { name, .. } = &err else {
        panic!("expected UndefinedMixin, got {err:?}");
    };
    assert_eq!(name, "nothing");
}

#[test]
fn test_mixin_with_arguments_and_default() {
    let css = compile_compressed(
        "@mixin pad($x, $y: 2px) { padding: $x $y; }\na { @include pad(1px); }\nb { @include pad(3px, 4px); }",
    );
    assert_eq!(css, "a{padding:1px 2px}b{padding:3px 4px}\n");
}

#[test]
fn test_mixin_body_nests_rules() {
    let css = compile_compressed(
        "@mixin hoverable { &:hover { text-decoration: underline; } }\na { @include hoverable; }",
    );
    assert_eq!(css, "a:hover{text-decoration:underline}\n");
}

#[test]
fn test_mixin_default_can_reference_earlier_param() {
    let css = compile_compressed("@mixin m($a, $b: $a) { margin: $a $b; }\nx { @include m(5px); }");
    assert_eq!(css, "x{margin:5px 5px}\n");
}

#[test]
fn test_arithmetic_and_precision() {
    let options = CompileOptions {
        output_style: OutputStyle::Compressed,
        precision: 3,
        ..Default::default()
    };
    let css = compile_string("$w: 10px;\na { width: $w / 3; }", &options).unwrap();
    assert_eq!(css, "a{width:3.333px}\n");
}

#[test]
fn test_if_else() {
    let css = compile_compressed(
        "$mode: dark;\nbody { @if $mode == dark { background: black; } @else { background: white; } }",
    );
    assert_eq!(css, "body{background:black}\n");
}

#[test]
fn test_for_generates_rules() {
    let css = compile_compressed("@for $i from 1 through 3 { .w-#{$i} { width: $i * 25%; } }");
    assert_eq!(css, ".w-1{width:25%}.w-2{width:50%}.w-3{width:75%}\n");
}

#[test]
fn test_interpolation_in_property_and_selector() {
    let css = compile_compressed("$side: top;\n.m-#{$side} { margin-#{$side}: 1px; }");
    assert_eq!(css, ".m-top{margin-top:1px}\n");
}

#[test]
fn test_media_bubbling() {
    let css = compile_compressed("nav { @media (max-width: 40em) { display: none; } }");
    assert_eq!(css, "@media (max-width: 40em){nav{display:none}}\n");
}

#[test]
fn test_color_functions() {
    let css = compile_compressed("a { c: rgb(51, 102, 153); d: rgba(0, 0, 0, 0.25); }");
    assert_eq!(css, "a{c:#336699;d:rgba(0, 0, 0, 0.25)}\n");
}

#[test]
fn test_image_url_uses_image_path() {
    let options = CompileOptions {
        output_style: OutputStyle::Compressed,
        image_path: "static/img".into(),
        ..Default::default()
    };
    let css = compile_string("a { background: image-url(\"dot.png\"); }", &options).unwrap();
    assert_eq!(css, "a{background:url(\"static/img/dot.png\")}\n");
}

#[test]
fn test_font_shorthand_slash_survives() {
    let css = compile_compressed("a { font: 12px/1.5 sans-serif; }");
    assert_eq!(css, "a{font:12px/1.5 sans-serif}\n");
}
