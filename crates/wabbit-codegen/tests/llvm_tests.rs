//! Integration tests for the LLVM IR text back-end.
//!
//! These assert on the emitted text: declared runtime functions, alloca'd
//! slots, block structure, and the per-construct instruction shapes.

use wabbit_codegen::compile_to_llvm;

fn compile(source: &str) -> String {
    compile_to_llvm(source).expect("program compiles")
}

#[test]
fn test_module_header_declares_runtime() {
    let text = compile("print 1;");
    assert!(text.contains("declare void @_printi(i32)"));
    assert!(text.contains("declare void @_printf(double)"));
    assert!(text.contains("define i32 @main()"));
}

#[test]
fn test_print_calls() {
    let text = compile("print 42; print 2.5;");
    assert!(text.contains("call void @_printi(i32 42)"));
    // 2.5 in exact hexadecimal double form.
    assert!(text.contains("call void @_printf(double 0x4004000000000000)"));
}

#[test]
fn test_main_returns_zero_by_default() {
    let text = compile("print 1;");
    assert!(text.contains("ret i32 0"));
}

#[test]
fn test_parameters_get_alloca_slots() {
    let text = compile("func square(x int) int { return x*x; } print square(4);");
    assert!(text.contains("define i32 @square(i32 %p0)"));
    assert!(text.contains("%v0_x = alloca i32"));
    assert!(text.contains("store i32 %p0, i32* %v0_x"));
    assert!(text.contains("load i32, i32* %v0_x"));
    assert!(text.contains("= mul i32 "));
    assert!(text.contains("call i32 @square(i32 4)"));
}

#[test]
fn test_locals_get_alloca_slots() {
    let text = compile("func f() float { var y float = 1.5; return y; } print f();");
    assert!(text.contains("%v0_y = alloca double"));
    assert!(text.contains("store double 0x3FF8000000000000, double* %v0_y"));
}

#[test]
fn test_globals() {
    let text = compile("const pi float = 3.14159; var tau float; tau = 2.0 * pi; print tau;");
    assert!(text.contains("@g.pi = global double 0x"));
    assert!(text.contains("@g.tau = global double 0x0000000000000000"));
    assert!(text.contains("load double, double* @g.pi"));
    assert!(text.contains("store double "));
}

#[test]
fn test_if_blocks() {
    let text = compile("if 1 < 2 { print 1; } else { print 2; }");
    assert!(text.contains("br i1 "));
    assert!(text.contains("then0:"));
    assert!(text.contains("else0:"));
    assert!(text.contains("endif0:"));
}

#[test]
fn test_loop_blocks() {
    let text = compile("var i int = 0; while i < 3 { i = i + 1; }");
    assert!(text.contains("loop_hdr0:"));
    assert!(text.contains("loop_body0:"));
    assert!(text.contains("loop_end0:"));
    assert!(text.contains("br label %loop_hdr0"));
}

#[test]
fn test_comparison_widens_to_i32() {
    let text = compile("print 1 < 2;");
    assert!(text.contains("icmp slt i32 1, 2"));
    assert!(text.contains("zext i1 "));
}

#[test]
fn test_float_comparison_is_ordered() {
    let text = compile("print 1.5 < 2.5;");
    assert!(text.contains("fcmp olt double "));
}

#[test]
fn test_casts() {
    let text = compile("print int(3.9); print float(2) + 0.5;");
    assert!(text.contains("fptosi double "));
    assert!(text.contains("sitofp i32 "));
}

#[test]
fn test_memory_arena() {
    let text = compile("var memsize int = ^1000; const addr int = 500; `addr = 1234; print `addr;");
    assert!(text.contains("@wabbit.memory = global [1048576 x i8] zeroinitializer"));
    assert!(text.contains("@wabbit.memsize = global i32 65536"));
    assert!(text.contains("getelementptr [1048576 x i8], [1048576 x i8]* @wabbit.memory"));
    assert!(text.contains("bitcast i8* "));
    assert!(text.contains("store i32 1234, i32* "));
}

#[test]
fn test_no_arena_without_memory_ops() {
    let text = compile("print 1;");
    assert!(!text.contains("@wabbit.memory"));
}

#[test]
fn test_imports_become_declares() {
    let text = compile("import func getchar() int; print getchar();");
    assert!(text.contains("declare i32 @getchar()"));
    assert!(text.contains("call i32 @getchar()"));
}

#[test]
fn test_void_functions() {
    let text = compile("func tick() { print 1; } tick();");
    assert!(text.contains("define void @tick()"));
    assert!(text.contains("ret void"));
    assert!(text.contains("call void @tick()"));
}

#[test]
fn test_call_arguments_in_order() {
    let text = compile(
        "func sub3(a int, b int, c int) int { return a - b - c; } print sub3(10, 3, 2);",
    );
    assert!(text.contains("call i32 @sub3(i32 10, i32 3, i32 2)"));
}

#[test]
fn test_every_block_terminates() {
    // A return in both arms of an if leaves the join block dead but
    // still structurally terminated.
    let text = compile(
        "func pick(f bool) int { if f { return 1; } else { return 2; } return 0; } print pick(true);",
    );
    for (prev, line) in text.lines().zip(text.lines().skip(1)) {
        if line.ends_with(':') {
            let prev = prev.trim();
            assert!(
                prev.starts_with("br ")
                    || prev.starts_with("ret ")
                    || prev.starts_with("br i1")
                    || prev.ends_with(':')
                    || prev == "entry:"
                    || prev.starts_with("define"),
                "block opened after non-terminator: {prev:?} -> {line:?}"
            );
        }
    }
    // Three returns in `pick` plus the entry's default return.
    assert_eq!(run_count(&text, "ret i32"), 4);
}

fn run_count(text: &str, needle: &str) -> usize {
    text.matches(needle).count()
}

#[test]
fn test_determinism() {
    let source = "func fib(n int) int { if n>1 { return fib(n-1)+fib(n-2); } else { return 1; } return 0; } print fib(10);";
    assert_eq!(compile(source), compile(source));
}
