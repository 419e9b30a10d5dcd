//! Front-end integration tests: parse then type-check, asserting on the
//! produced diagnostics or the typed program.

use wabbit_ast::{check_program, Diagnostic, DiagnosticKind, Type, TypedProgram};
use wabbit_parser::parse_program;

fn check(source: &str) -> Result<TypedProgram, Vec<Diagnostic>> {
    let program = parse_program(source).expect("program parses");
    check_program(&program)
}

fn checked(source: &str) -> TypedProgram {
    check(source).expect("program checks")
}

/// The diagnostics of a program expected to be rejected.
fn diagnostics(source: &str) -> Vec<Diagnostic> {
    check(source).expect_err("program is rejected")
}

/// A program expected to produce exactly one diagnostic of `kind`.
fn one_diagnostic(source: &str, kind: DiagnosticKind) -> Diagnostic {
    let diags = diagnostics(source);
    assert_eq!(diags.len(), 1, "expected one diagnostic, got {diags:?}");
    let diag = diags.into_iter().next().unwrap();
    assert_eq!(diag.kind, kind, "unexpected kind in {diag}");
    diag
}

// -- Negative cases --

#[test]
fn test_mixed_arithmetic_is_type_error() {
    let diag = one_diagnostic("print 2 + 3.0;", DiagnosticKind::Type);
    assert!(diag.message.contains("int"));
    assert!(diag.message.contains("float"));
}

#[test]
fn test_const_reassignment() {
    let diag = one_diagnostic("const k int = 1; k = 2;", DiagnosticKind::Name);
    assert!(diag.message.contains("const"));
}

#[test]
fn test_missing_return() {
    one_diagnostic("func f() int { }", DiagnosticKind::Return);
}

#[test]
fn test_undeclared_name() {
    one_diagnostic("print x;", DiagnosticKind::Name);
}

#[test]
fn test_call_arity_mismatch() {
    one_diagnostic(
        "func f(x int) int { return x; } print f(1, 2);",
        DiagnosticKind::Type,
    );
}

#[test]
fn test_call_argument_type_mismatch() {
    one_diagnostic(
        "func f(x int) int { return x; } print f(1.5);",
        DiagnosticKind::Type,
    );
}

#[test]
fn test_duplicate_declarations() {
    one_diagnostic("var x int; var x float;", DiagnosticKind::Name);
    one_diagnostic("func f() int { return 1; } func f() int { return 2; }", DiagnosticKind::Name);
    one_diagnostic("func g(a int, a int) int { return a; }", DiagnosticKind::Name);
}

#[test]
fn test_shadowing_param_in_function_scope() {
    one_diagnostic(
        "func f(x int) int { var x int = 1; return x; }",
        DiagnosticKind::Name,
    );
}

#[test]
fn test_nested_block_may_shadow() {
    checked("func f(x int) int { if x > 0 { var x int = 1; print x; } return x; }");
}

#[test]
fn test_condition_must_be_bool() {
    one_diagnostic("if 1 { print 1; }", DiagnosticKind::Type);
    one_diagnostic("while 1.5 { print 1; }", DiagnosticKind::Type);
}

#[test]
fn test_return_type_mismatch() {
    one_diagnostic("func f() int { return 1.5; }", DiagnosticKind::Return);
    one_diagnostic("func f() { return 1; }", DiagnosticKind::Return);
    one_diagnostic("func f() int { return; }", DiagnosticKind::Return);
}

#[test]
fn test_break_outside_loop() {
    one_diagnostic("break;", DiagnosticKind::Type);
    one_diagnostic("continue;", DiagnosticKind::Type);
}

#[test]
fn test_assignment_type_mismatch() {
    one_diagnostic("var x int; x = 1.5;", DiagnosticKind::Type);
}

#[test]
fn test_memory_operands_must_be_int() {
    one_diagnostic("print `1.5;", DiagnosticKind::Type);
    one_diagnostic("`100 = 2.5;", DiagnosticKind::Type);
    one_diagnostic("print ^true;", DiagnosticKind::Type);
}

#[test]
fn test_bad_cast() {
    one_diagnostic("print int(true);", DiagnosticKind::Type);
}

#[test]
fn test_nonvoid_expression_statement() {
    one_diagnostic("func g() int { return 1; } g();", DiagnosticKind::Type);
}

#[test]
fn test_function_used_as_variable() {
    one_diagnostic("func f() int { return 1; } print f + 1;", DiagnosticKind::Type);
}

#[test]
fn test_variable_called_as_function() {
    one_diagnostic("var x int; print x();", DiagnosticKind::Type);
}

#[test]
fn test_explicit_main_conflicts_with_top_level_code() {
    one_diagnostic(
        "func main() int { return 0; } print 1;",
        DiagnosticKind::Name,
    );
}

#[test]
fn test_checker_reports_across_declarations() {
    // One error per broken function: checking continues with the next
    // top-level declaration.
    let diags = diagnostics(
        "func f() int { return 1.5; }\n\
         func g() int { return true; }",
    );
    assert_eq!(diags.len(), 2);
    assert!(diags.iter().all(|d| d.kind == DiagnosticKind::Return));
}

#[test]
fn test_diagnostic_rendering() {
    let diag = one_diagnostic("print 2 + 3.0;", DiagnosticKind::Type);
    let rendered = diag.render("bad.wb");
    assert!(rendered.starts_with("bad.wb:1:"), "got {rendered}");
    assert!(rendered.contains("TypeError:"), "got {rendered}");
}

// -- Positive shape checks --

#[test]
fn test_const_type_inference() {
    let typed = checked("const k = 2; print k + 1;");
    assert_eq!(typed.globals.len(), 1);
    assert_eq!(typed.globals[0].ty, Type::Int);
}

#[test]
fn test_top_level_statements_form_entry() {
    let typed = checked("print 1; print 2;");
    let entry = typed.entry_func();
    assert_eq!(entry.name, "main");
    assert_eq!(entry.ret, Type::Int);
    assert_eq!(entry.body.len(), 2);
}

#[test]
fn test_explicit_main_is_entry() {
    let typed = checked("const k int = 3; func main() int { print k; return 0; }");
    assert_eq!(typed.entry_func().name, "main");
    assert_eq!(typed.funcs.len(), 1);
}

#[test]
fn test_literal_global_initializers_are_const_inits() {
    let typed = checked("const pi float = 3.14159; var n int = -5; var tau float; tau = 2.0 * pi;");
    assert!(typed.globals[0].init.is_some());
    assert!(typed.globals[1].init.is_some());
    assert!(typed.globals[2].init.is_none());
}

#[test]
fn test_functions_may_refer_in_any_order() {
    checked(
        "func even(n int) bool { if n == 0 { return true; } return odd(n - 1); }\n\
         func odd(n int) bool { if n == 0 { return false; } return even(n - 1); }\n\
         print even(10);",
    );
}

#[test]
fn test_param_slots_before_locals() {
    let typed = checked("func f(a int, b float) int { var c int = 1; return a + c; }");
    let func = &typed.funcs[0];
    assert_eq!(func.params.len(), 2);
    assert_eq!(func.locals.len(), 1);
    assert_eq!(func.locals[0].0, "c");
}

#[test]
fn test_checking_is_deterministic() {
    // Re-running the checker on the same AST yields identical
    // annotations and no new diagnostics.
    let source = "func fib(n int) int { if n>1 { return fib(n-1)+fib(n-2); } else { return 1; } return 0; } print fib(10);";
    let program = parse_program(source).expect("program parses");
    let first = check_program(&program).expect("program checks");
    let second = check_program(&program).expect("program checks");
    assert_eq!(first, second);
}

#[test]
fn test_import_signature_recorded() {
    let typed = checked("import func put(x int); put(1);");
    assert_eq!(typed.imports.len(), 1);
    assert_eq!(typed.imports[0].ret, Type::Void);
    assert_eq!(typed.imports[0].params, [Type::Int]);
}
