use std::{env, fs, path::PathBuf, process::Command};

use rand::distr::{Alphanumeric, SampleString};
use tora::{
    compile::{codegen::cc, compile_to_c},
    infra::{ExitCode, ToraError},
};

const CLEANUP: &str = r#"
    extern fn printf(fmt: *byte, ...) i32;
    error Oops;

    fn work(fail: bool) !i32 {
        defer { printf("A\n"); }
        errdefer { printf("B\n"); }
        if fail { return error.Oops; }
        return 42;
    }

    fn main() i32 {
        const ok: i32 = work(false) catch |e| { 0 };
        const bad: i32 = work(true) catch |e| { 0 };
        printf("%d %d\n", ok, bad);
        return 0;
    }
"#;

const PROPAGATION: &str = r#"
    extern fn printf(fmt: *byte, ...) i32;
    error Oops;

    fn inner(fail: bool) !i32 {
        if fail { return error.Oops; }
        return 7;
    }

    fn middle(fail: bool) !i32 {
        defer { printf("first\n"); }
        defer { printf("second\n"); }
        var v: i32 = try inner(fail);
        return v * 2;
    }

    fn main() i32 {
        const good: i32 = middle(false) catch { -1 };
        const bad: i32 = middle(true) catch |e| { -1 };
        printf("${good:d} ${bad:d}\n");
        return 0;
    }
"#;

/// Builds and runs a program with the system C compiler. `None` when there is none.
fn run(src: &str) -> Option<String> {
    let available = Command::new("cc")
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success());
    if !available {
        return None;
    }

    let c = compile_to_c("main.tora", src).expect("compile to C");
    let slug = Alphanumeric.sample_string(&mut rand::rng(), 8);
    let bin: PathBuf = env::temp_dir().join(format!("tora_test_{slug}"));

    cc::compile(&c, "cc", &bin).unwrap_or_else(|err| panic!("cc failed: {err}\n{c}"));
    let output = Command::new(&bin).output().expect("run binary");
    let _ = fs::remove_file(&bin);

    assert!(output.status.success(), "program failed:\n{c}");
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[test]
fn pipeline_emits_one_struct_per_error_union() {
    let c = compile_to_c("main.tora", PROPAGATION).expect("compile");

    assert_eq!(c.matches("struct error_union_i32 {").count(), 1);
    assert_eq!(c.matches("struct slice {").count(), 1);
    assert_eq!(c.matches("struct interface {").count(), 1);
    assert!(c.contains("#define ERROR_Oops "));
    assert!(!c.contains("int32_t printf("), "printf comes from stdio.h:\n{c}");
}

#[test]
fn pipeline_lowers_error_returns_to_gotos() {
    let c = compile_to_c("main.tora", CLEANUP).expect("compile");

    assert!(c.contains("_return_work.error_id = ERROR_Oops;\n        goto _error_return_work;"), "{c}");
    assert!(c.contains("_return_work.value = 42;"), "{c}");
    assert!(c.contains("_error_return_work:;"));
    assert!(c.contains("_normal_return_work:;"));
    assert!(c.contains("/* errdefer block (collected) */"));
}

#[test]
fn pipeline_renders_enums_and_match() {
    let src = r#"
        enum Color { Red, Green = 4 }

        fn code(c: Color) i32 {
            return match c { Color.Red => 1, else => 2 };
        }
    "#;
    let c = compile_to_c("main.tora", src).expect("compile");

    assert!(c.contains("enum Color { Color_Red, Color_Green = 4 };"), "{c}");
    assert!(c.contains("== Color_Red) ? 1 : 2; })"), "{c}");
    assert!(c.contains("int32_t code(enum Color c);"), "{c}");
}

#[test]
fn pipeline_stops_on_semantic_errors() {
    let err = compile_to_c("main.tora", "fn f() i32 { return 1 / 0; }").unwrap_err();

    let ToraError::SemanticError(diagnostics) = &err else {
        panic!("expected semantic error, got {err:?}");
    };
    assert_eq!(diagnostics.messages(), vec!["division by zero"]);
    assert_eq!(u8_code(err), 7);
}

#[test]
fn pipeline_reports_syntax_errors() {
    let err = compile_to_c("main.tora", "fn f( {").unwrap_err();

    assert!(matches!(err, ToraError::ParsingError(_)));
    assert_eq!(u8_code(err), 42);
}

#[test]
fn program_runs_defer_on_success_and_both_on_error() {
    let Some(stdout) = run(CLEANUP) else {
        return;
    };

    assert_eq!(stdout, "A\nB\nA\n42 0\n");
}

#[test]
fn program_propagates_try_through_deferred_cleanup() {
    let Some(stdout) = run(PROPAGATION) else {
        return;
    };

    assert_eq!(stdout, "second\nfirst\nsecond\nfirst\n14 -1\n");
}

#[test]
fn program_wraps_values_stored_as_fallible() {
    let src = r#"
        extern fn printf(fmt: *byte, ...) i32;
        error Oops;

        fn unwrap_or(r: !i32, fallback: i32) i32 {
            return r catch |e| { fallback };
        }

        fn main() i32 {
            var r: !i32 = 5;
            var s: !i32 = error.Oops;
            const a: i32 = r catch |e| { 0 };
            const b: i32 = s catch |e| { 0 };
            r = error.Oops;
            s = 9;
            printf("%d %d %d %d %d\n", a, b, unwrap_or(r, 1), unwrap_or(s, 1), unwrap_or(3, 1));
            return 0;
        }
    "#;

    let c = compile_to_c("main.tora", src).expect("compile");
    assert!(c.contains("struct error_union_i32 r = (struct error_union_i32){ .error_id = 0, .value = 5 };"), "{c}");

    let Some(stdout) = run(src) else {
        return;
    };
    assert_eq!(stdout, "5 0 1 9 3\n");
}

#[test]
fn program_resolves_shadowed_locals_per_block() {
    let src = r#"
        extern fn printf(fmt: *byte, ...) i32;
        error Oops;

        fn inner() !i32 { return 4; }

        fn outer() !i32 {
            var r: !i32 = inner();
            {
                var r: i32 = 5;
                printf("%d\n", r);
            }
            return r;
        }

        fn main() i32 {
            const v: i32 = outer() catch |e| { -1 };
            printf("%d\n", v);
            return 0;
        }
    "#;

    let Some(stdout) = run(src) else {
        return;
    };
    assert_eq!(stdout, "5\n4\n");
}

#[test]
fn program_defines_tuple_fields_before_their_struct() {
    let src = r#"
        extern fn printf(fmt: *byte, ...) i32;

        struct P { t: (i32, i32) }

        fn main() i32 {
            const p: P = P { t: (3, 4) };
            printf("%d\n", p.t.0 + p.t.1);
            return 0;
        }
    "#;

    let c = compile_to_c("main.tora", src).expect("compile");
    let tuple = c.find("struct tuple_i32_i32 {").expect("tuple struct");
    let outer = c.find("struct P {").expect("struct P");
    assert!(tuple < outer, "{c}");

    let Some(stdout) = run(src) else {
        return;
    };
    assert_eq!(stdout, "7\n");
}

fn u8_code(err: ToraError) -> u8 {
    let code: ExitCode = err.into();
    code.code()
}
