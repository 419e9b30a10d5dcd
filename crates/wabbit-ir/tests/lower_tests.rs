//! IR generation tests: golden instruction listings for small programs.

use wabbit_ast::check_program;
use wabbit_ir::{lower_program, IrModule};
use wabbit_parser::parse_program;

fn lower(source: &str) -> IrModule {
    let program = parse_program(source).expect("program parses");
    let typed = check_program(&program).expect("program checks");
    lower_program(&typed)
}

/// Entry-function code as display mnemonics.
fn entry_code(source: &str) -> Vec<String> {
    let module = lower(source);
    module
        .entry_func()
        .code
        .iter()
        .map(|instr| instr.to_string())
        .collect()
}

#[test]
fn test_arithmetic_is_left_to_right() {
    assert_eq!(
        entry_code("print 2 + 3 * -4;"),
        [
            "CONSTI 2", "CONSTI 3", "CONSTI 0", "CONSTI 4", "SUBI", "MULI", "ADDI", "PRINTI",
            "CONSTI 0", "RET",
        ]
    );
}

#[test]
fn test_float_operators() {
    assert_eq!(
        entry_code("print 2.0 - 3.0 / -4.0;"),
        [
            "CONSTF 2", "CONSTF 3", "CONSTF 0", "CONSTF 4", "SUBF", "DIVF", "SUBF", "PRINTF",
            "CONSTI 0", "RET",
        ]
    );
}

#[test]
fn test_not_lowers_to_xor() {
    assert_eq!(
        entry_code("print !true;"),
        ["CONSTI 1", "CONSTI 1", "XORI", "PRINTI", "CONSTI 0", "RET"]
    );
}

#[test]
fn test_globals_and_stores() {
    let module = lower("const pi float = 3.14159; var tau float; tau = 2.0 * pi; print tau;");
    assert_eq!(module.globals.len(), 2);
    assert_eq!(module.globals[0].name, "pi");
    assert!(module.globals[0].init.is_some());
    assert!(module.globals[1].init.is_none());
    assert_eq!(
        module
            .entry_func()
            .code
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>(),
        [
            "CONSTF 2",
            "LOAD global 0",
            "MULF",
            "STORE global 1",
            "LOAD global 1",
            "PRINTF",
            "CONSTI 0",
            "RET",
        ]
    );
}

#[test]
fn test_while_shape() {
    assert_eq!(
        entry_code("var i int = 0; while i < 3 { i = i + 1; }"),
        [
            "LOOP",
            "LOAD global 0",
            "CONSTI 3",
            "LTI",
            "CBREAK",
            "LOAD global 0",
            "CONSTI 1",
            "ADDI",
            "STORE global 0",
            "ENDLOOP",
            "CONSTI 0",
            "RET",
        ]
    );
}

#[test]
fn test_if_else_shape() {
    assert_eq!(
        entry_code("if 1 < 2 { print 1; } else { print 2; }"),
        [
            "CONSTI 1", "CONSTI 2", "LTI", "IF", "CONSTI 1", "PRINTI", "ELSE", "CONSTI 2",
            "PRINTI", "ENDIF", "CONSTI 0", "RET",
        ]
    );
}

#[test]
fn test_break_and_continue() {
    assert_eq!(
        entry_code("while true { break; continue; }"),
        [
            "LOOP", "CONSTI 1", "CBREAK", "CONSTI 0", "CBREAK", "CONTINUE", "ENDLOOP", "CONSTI 0",
            "RET",
        ]
    );
}

#[test]
fn test_function_body_and_call() {
    let module = lower("func square(x int) int { return x*x; } print square(4);");
    assert_eq!(module.funcs.len(), 2);
    let square = &module.funcs[0];
    assert_eq!(square.name, "square");
    assert_eq!(
        square.code.iter().map(|i| i.to_string()).collect::<Vec<_>>(),
        ["LOAD local 0", "LOAD local 0", "MULI", "RET", "CONSTI 0", "RET"]
    );
    assert_eq!(
        module
            .entry_func()
            .code
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>(),
        ["CONSTI 4", "CALL func 0", "PRINTI", "CONSTI 0", "RET"]
    );
}

#[test]
fn test_memory_operations() {
    let module = lower("var memsize int = ^1000; const addr int = 500; `addr = 1234; print `addr + 10000;");
    assert!(module.uses_memory);
    assert_eq!(
        module
            .entry_func()
            .code
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>(),
        [
            "CONSTI 1000",
            "GROWM",
            "STORE global 0",
            "LOAD global 1",
            "CONSTI 1234",
            "POKEI",
            "LOAD global 1",
            "PEEKI",
            "CONSTI 10000",
            "ADDI",
            "PRINTI",
            "CONSTI 0",
            "RET",
        ]
    );
}

#[test]
fn test_casts() {
    assert_eq!(
        entry_code("print float(2) + 0.5; print int(3.9);"),
        [
            "CONSTI 2", "ITOF", "CONSTF 0.5", "ADDF", "PRINTF", "CONSTF 3.9", "FTOI", "PRINTI",
            "CONSTI 0", "RET",
        ]
    );
}

#[test]
fn test_void_function_gets_bare_ret() {
    let module = lower("func tick() { print 1; } tick();");
    let tick = &module.funcs[0];
    assert_eq!(tick.ret, None);
    assert_eq!(
        tick.code.iter().map(|i| i.to_string()).collect::<Vec<_>>(),
        ["CONSTI 1", "PRINTI", "RET"]
    );
}

#[test]
fn test_imports_are_separate_index_space() {
    let module = lower("import func put(x int); put(7);");
    assert_eq!(module.imports.len(), 1);
    assert_eq!(
        module
            .entry_func()
            .code
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>(),
        ["CONSTI 7", "CALL import 0", "CONSTI 0", "RET"]
    );
}

#[test]
fn test_call_depth_of_memory_flag() {
    assert!(!lower("print 1;").uses_memory);
}

#[test]
fn test_locals_table_keeps_names_and_slots() {
    let module = lower("func f(a int) float { var b float = 1.5; return b; }");
    let func = &module.funcs[0];
    assert_eq!(func.params.len(), 1);
    assert_eq!(func.locals.len(), 1);
    assert_eq!(func.locals[0].0, "b");
    assert_eq!(
        func.code.iter().map(|i| i.to_string()).collect::<Vec<_>>(),
        ["CONSTF 1.5", "STORE local 1", "LOAD local 1", "RET", "CONSTF 0", "RET"]
    );
}
