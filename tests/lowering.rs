use tora::compile::{
    codegen::defer::lower_function,
    ir::{FuncDef, Inst},
    lower,
    parser::parse_program,
};

fn function(src: &str, name: &str) -> FuncDef {
    let program = parse_program(src).expect("parse");
    lower(&program)
        .expect("lower")
        .into_iter()
        .find_map(|inst| match inst {
            Inst::FuncDef(def) if def.name == name => Some(def),
            _ => None,
        })
        .expect("function not found")
}

fn called(insts: &[Inst]) -> Vec<String> {
    let mut calls = Vec::new();
    for inst in insts.iter() {
        if let Inst::Call { name, .. } = inst {
            calls.push(name.clone());
        }
        for child in inst.children() {
            calls.extend(called(std::slice::from_ref(child)));
        }
    }

    calls
}

/// Calls made by the cleanup code between `label` and the next `return`.
fn cleanup_after(body: &[Inst], label: &str) -> Vec<String> {
    let start = body
        .iter()
        .position(|inst| *inst == Inst::Label(label.to_string()))
        .unwrap_or_else(|| panic!("label `{label}` missing in {body:#?}"));
    let end = body[start..]
        .iter()
        .position(|inst| matches!(inst, Inst::Return { .. }))
        .expect("exit without return");

    called(&body[start + 1..start + end])
}

const CLEANUP: &str = r#"
    extern fn a() void;
    extern fn b() void;
    error Oops;

    fn work(fail: bool) !i32 {
        defer { a(); }
        errdefer { b(); }
        if fail { return error.Oops; }
        return 42;
    }
"#;

#[test]
fn lowering_runs_errdefer_only_on_the_error_exit() {
    let lowered = lower_function(function(CLEANUP, "work")).expect("lowering");

    assert_eq!(cleanup_after(&lowered.body, "_error_return_work"), vec!["b", "a"]);
    assert_eq!(cleanup_after(&lowered.body, "_normal_return_work"), vec!["a"]);
}

#[test]
fn lowering_replaces_deferred_blocks_with_markers() {
    let lowered = lower_function(function(CLEANUP, "work")).expect("lowering");

    assert!(lowered.body.contains(&Inst::Comment("defer block (collected)".to_string())));
    assert!(lowered.body.contains(&Inst::Comment("errdefer block (collected)".to_string())));
    assert!(
        !lowered
            .body
            .iter()
            .any(|inst| matches!(inst, Inst::Defer(_) | Inst::ErrDefer(_)))
    );
}

#[test]
fn lowering_without_error_returns_has_a_single_exit() {
    let src = r#"
        extern fn first() void;
        extern fn second() void;

        fn work() i32 {
            defer { first(); }
            defer { second(); }
            return 1;
        }
    "#;
    let lowered = lower_function(function(src, "work")).expect("lowering");

    assert!(!lowered.body.contains(&Inst::Label("_error_return_work".to_string())));
    assert_eq!(
        cleanup_after(&lowered.body, "_normal_return_work"),
        vec!["second", "first"]
    );
}

#[test]
fn lowering_routes_try_through_the_error_exit() {
    let src = r#"
        extern fn close() void;
        error Oops;

        fn inner() !i32 { return error.Oops; }

        fn outer() !i32 {
            defer { close(); }
            var value: i32 = try inner();
            return value + 1;
        }
    "#;
    let lowered = lower_function(function(src, "outer")).expect("lowering");

    assert!(lowered.body.contains(&Inst::Label("_error_return_outer".to_string())));
    assert_eq!(cleanup_after(&lowered.body, "_error_return_outer"), vec!["close"]);
}

#[test]
fn lowering_forwards_fallible_results() {
    let src = r#"
        fn inner() !i32 { return 1; }
        fn outer() !i32 { return inner(); }
    "#;
    let outer = function(src, "outer");
    assert!(matches!(outer.body[0], Inst::Return { forward: true, .. }));

    let lowered = lower_function(outer).expect("lowering");
    assert!(lowered.body.contains(&Inst::Label("_error_return_outer".to_string())));
}

#[test]
fn lowering_rejects_try_outside_fallible_functions() {
    let src = "fn inner() !i32 { return 1; }\nfn outer() i32 { return try inner(); }";
    let program = parse_program(src).expect("parse");

    assert!(lower(&program).is_err());
}
