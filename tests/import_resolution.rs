//! `@import` resolution: search order, partials, splicing, cycles.
//!
//! These tests build real stylesheet trees in temporary directories and
//! compile through the public file-mode entry, since resolution is defined
//! relative to the importing file's directory.

use std::fs;
use std::path::Path;

use sassafras::{compile_file, compile_string, CompileError, CompileOptions};

fn write(dir: &Path, name: &str, contents: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

#[test]
fn test_import_splices_in_place() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "vars.scss", "$c: red;\n");
    write(dir.path(), "main.scss", "@import \"vars\";\na { color: $c; }");

    let (css, _) = compile_file(dir.path().join("main.scss"), &CompileOptions::default()).unwrap();
    assert_eq!(css, "a {\n  color: red; }\n");
}

#[test]
fn test_import_emits_rules_in_document_order() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "base.scss", "b { x: 1; }\n");
    write(dir.path(), "main.scss", "@import \"base\";\na { y: 2; }");

    let (css, _) = compile_file(dir.path().join("main.scss"), &CompileOptions::default()).unwrap();
    assert_eq!(css, "b {\n  x: 1; }\na {\n  y: 2; }\n");
}

#[test]
fn test_partial_underscore_resolution() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "_helpers.scss", "$pad: 4px;\n");
    write(dir.path(), "main.scss", "@import \"helpers\";\na { padding: $pad; }");

    let (css, _) = compile_file(dir.path().join("main.scss"), &CompileOptions::default()).unwrap();
    assert!(css.contains("padding: 4px"));
}

#[test]
fn test_own_directory_wins_over_include_paths() {
    let dir = tempfile::tempdir().unwrap();
    let lib = tempfile::tempdir().unwrap();
    write(dir.path(), "shared.scss", "$who: local;\n");
    write(lib.path(), "shared.scss", "$who: library;\n");
    write(dir.path(), "main.scss", "@import \"shared\";\na { src: $who; }");

    let options = CompileOptions {
        include_paths: vec![lib.path().to_path_buf()],
        ..Default::default()
    };
    let (css, _) = compile_file(dir.path().join("main.scss"), &options).unwrap();
    assert!(css.contains("src: local"));
}

#[test]
fn test_include_paths_searched_in_order() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    write(first.path(), "theme.scss", "$t: first;\n");
    write(second.path(), "theme.scss", "$t: second;\n");

    let options = CompileOptions {
        include_paths: vec![first.path().to_path_buf(), second.path().to_path_buf()],
        ..Default::default()
    };
    let css = compile_string("@import \"theme\";\na { t: $t; }", &options).unwrap();
    assert!(css.contains("t: first"));
}

#[test]
fn test_import_not_found_names_path_and_search_list() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "main.scss", "@import \"missing\";");

    let err = compile_file(dir.path().join("main.scss"), &CompileOptions::default()).unwrap_err();
    let CompileError::ImportNotFound { path, searched } = &err else {
        panic!("expected ImportNotFound, got {err:?}");
    };
    assert_eq!(path, "missing");
    assert!(searched.iter().any(|p| p.starts_with(dir.path())));
}

#[test]
fn test_import_cycle_fails_with_chain() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.scss", "@import \"b\";\n");
    write(dir.path(), "b.scss", "@import \"a\";\n");

    let err = compile_file(dir.path().join("a.scss"), &CompileOptions::default()).unwrap_err();
    let CompileError::ImportCycle { chain } = &err else {
        panic!("expected ImportCycle, got {err:?}");
    };
    // a -> b -> a: the chain names both files, endpoints matching.
    assert_eq!(chain.len(), 3);
    assert!(chain[0].ends_with("a.scss"));
    assert!(chain[1].ends_with("b.scss"));
    assert!(chain[2].ends_with("a.scss"));
}

#[test]
fn test_self_import_cycle_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "loop.scss", "@import \"loop\";\n");

    let err = compile_file(dir.path().join("loop.scss"), &CompileOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::ImportCycle { .. }), "{err:?}");
}

#[test]
fn test_diamond_import_is_not_a_cycle() {
    // a imports b and c; both import d. Legal: d is parsed twice, not
    // cyclically.
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "d.scss", "$shared: 1px;\n");
    write(dir.path(), "b.scss", "@import \"d\";\nb { w: $shared; }\n");
    write(dir.path(), "c.scss", "@import \"d\";\nc { w: $shared; }\n");
    write(dir.path(), "a.scss", "@import \"b\";\n@import \"c\";\n");

    let (css, _) = compile_file(dir.path().join("a.scss"), &CompileOptions::default()).unwrap();
    assert!(css.contains("b {"));
    assert!(css.contains("c {"));
}

#[test]
fn test_css_imports_pass_through() {
    let css = compile_string(
        "@import \"theme.css\";\n@import url(print.css);\na { x: 1; }",
        &CompileOptions::default(),
    )
    .unwrap();
    assert!(css.contains("@import \"theme.css\";"));
    assert!(css.contains("@import url(print.css);"));
}

#[test]
fn test_imported_file_in_subdirectory() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "sub/inner.scss", "$x: 3px;\n");
    write(dir.path(), "main.scss", "@import \"sub/inner\";\na { w: $x; }");

    let (css, _) = compile_file(dir.path().join("main.scss"), &CompileOptions::default()).unwrap();
    assert!(css.contains("w: 3px"));
}

#[test]
fn test_nested_import_resolves_relative_to_importer() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "sub/_leaf.scss", "$deep: 9px;\n");
    write(dir.path(), "sub/mid.scss", "@import \"leaf\";\n");
    write(dir.path(), "main.scss", "@import \"sub/mid\";\na { w: $deep; }");

    let (css, _) = compile_file(dir.path().join("main.scss"), &CompileOptions::default()).unwrap();
    assert!(css.contains("w: 9px"));
}
