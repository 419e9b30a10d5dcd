//! Integration tests for the wabbit-wasm crate.
//!
//! Every emitted module is decoded and validated with `wasmparser`;
//! shape tests assert on sections and on decoded operator sequences.

use wabbit_wasm::compile_to_wasm;
use wasmparser::{ExternalKind, Operator, Parser, Payload, TypeRef, ValType};

fn compile(source: &str) -> Vec<u8> {
    compile_to_wasm(source).expect("program compiles")
}

/// Decoded operator sequences of the code section, in function order.
fn code_bodies(bytes: &[u8]) -> Vec<Vec<Operator<'_>>> {
    let mut bodies = Vec::new();
    for payload in Parser::new(0).parse_all(bytes) {
        if let Payload::CodeSectionEntry(body) = payload.expect("well-formed module") {
            let ops = body
                .get_operators_reader()
                .expect("operators decode")
                .into_iter()
                .collect::<Result<Vec<_>, _>>()
                .expect("operators decode");
            bodies.push(ops);
        }
    }
    bodies
}

fn exports(bytes: &[u8]) -> Vec<(String, ExternalKind, u32)> {
    let mut out = Vec::new();
    for payload in Parser::new(0).parse_all(bytes) {
        if let Payload::ExportSection(reader) = payload.expect("well-formed module") {
            for export in reader {
                let export = export.expect("export decodes");
                out.push((export.name.to_string(), export.kind, export.index));
            }
        }
    }
    out
}

fn imports(bytes: &[u8]) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for payload in Parser::new(0).parse_all(bytes) {
        if let Payload::ImportSection(reader) = payload.expect("well-formed module") {
            for import in reader {
                let import = import.expect("import decodes");
                assert!(matches!(import.ty, TypeRef::Func(_)));
                out.push((import.module.to_string(), import.name.to_string()));
            }
        }
    }
    out
}

#[test]
fn test_magic_and_version() {
    let bytes = compile("print 1;");
    assert_eq!(&bytes[..8], b"\0asm\x01\x00\x00\x00");
}

#[test]
fn test_modules_validate() {
    let sources = [
        "print 2 + 3 * -4;",
        "print 2.0 - 3.0 / -4.0;",
        "const pi float = 3.14159; var tau float; tau = 2.0 * pi; print tau;",
        "func square(x int) int { return x*x; } print square(4); print square(10);",
        "func fib(n int) int { if n>1 { return fib(n-1)+fib(n-2); } else { return 1; } return 0; } print fib(10);",
        "var memsize int = ^1000; const addr int = 500; `addr = 1234; print `addr + 10000;",
        "var i int = 0; while i < 10 { if i == 3 { continue; } if i > 5 { break; } i = i + 1; }",
        "func tick() { print 1; } tick();",
        "import func getchar() int; print getchar();",
        "print int(3.9); print float(2) + 0.5;",
    ];
    for source in sources {
        let bytes = compile(source);
        wasmparser::validate(&bytes).unwrap_or_else(|err| {
            panic!("emitted module fails validation for {source:?}: {err}")
        });
    }
}

#[test]
fn test_print_imports_come_first() {
    let bytes = compile("import func getchar() int; print getchar();");
    assert_eq!(
        imports(&bytes),
        [
            ("env".to_string(), "_printi".to_string()),
            ("env".to_string(), "_printf".to_string()),
            ("env".to_string(), "getchar".to_string()),
        ]
    );
}

#[test]
fn test_main_is_exported() {
    let bytes = compile("print 1;");
    let exports = exports(&bytes);
    // Two imports, no user imports, one defined function: index 2.
    assert!(exports
        .iter()
        .any(|(name, kind, index)| name == "main" && *kind == ExternalKind::Func && *index == 2));
}

#[test]
fn test_memory_exported_when_used() {
    let bytes = compile("var m int = ^1000; print m;");
    assert!(exports(&bytes)
        .iter()
        .any(|(name, kind, _)| name == "memory" && *kind == ExternalKind::Memory));

    let bytes = compile("print 1;");
    assert!(!exports(&bytes).iter().any(|(name, _, _)| name == "memory"));
}

#[test]
fn test_print_lowers_to_import_calls() {
    let bytes = compile("print 42; print 2.5;");
    let bodies = code_bodies(&bytes);
    assert_eq!(bodies.len(), 1);
    let ops = &bodies[0];
    assert!(matches!(ops[0], Operator::I32Const { value: 42 }));
    assert!(matches!(ops[1], Operator::Call { function_index: 0 }));
    assert!(matches!(ops[2], Operator::F64Const { .. }));
    assert!(matches!(ops[3], Operator::Call { function_index: 1 }));
    // Synthetic default return.
    assert!(matches!(ops[4], Operator::I32Const { value: 0 }));
    assert!(matches!(ops[5], Operator::Return));
    assert!(matches!(ops[6], Operator::End));
}

#[test]
fn test_function_body_uses_locals() {
    let bytes = compile("func add(x int, y int) int { return x + y; } print add(1, 2);");
    let bodies = code_bodies(&bytes);
    assert_eq!(bodies.len(), 2);
    let add = &bodies[0];
    assert!(matches!(add[0], Operator::LocalGet { local_index: 0 }));
    assert!(matches!(add[1], Operator::LocalGet { local_index: 1 }));
    assert!(matches!(add[2], Operator::I32Add));
    assert!(matches!(add[3], Operator::Return));

    // The entry calls the defined function at index 2 (after the two
    // print imports).
    let main = &bodies[1];
    assert!(matches!(main[0], Operator::I32Const { value: 1 }));
    assert!(matches!(main[1], Operator::I32Const { value: 2 }));
    assert!(matches!(main[2], Operator::Call { function_index: 2 }));
}

#[test]
fn test_while_lowers_to_block_loop() {
    let bytes = compile("var i int = 0; while i < 3 { i = i + 1; }");
    let bodies = code_bodies(&bytes);
    let ops = &bodies[0];
    assert!(matches!(ops[0], Operator::Block { .. }));
    assert!(matches!(ops[1], Operator::Loop { .. }));
    assert!(matches!(ops[2], Operator::GlobalGet { global_index: 0 }));
    assert!(matches!(ops[3], Operator::I32Const { value: 3 }));
    assert!(matches!(ops[4], Operator::I32LtS));
    // CBREAK: invert, then branch out of the wrapping block.
    assert!(matches!(ops[5], Operator::I32Eqz));
    assert!(matches!(ops[6], Operator::BrIf { relative_depth: 1 }));
    // Body, then the back edge.
    let tail: Vec<&Operator> = ops[7..].iter().collect();
    assert!(tail
        .iter()
        .any(|op| matches!(op, Operator::Br { relative_depth: 0 })));
}

#[test]
fn test_if_else_lowers_structurally() {
    let bytes = compile("if 1 < 2 { print 1; } else { print 2; }");
    let bodies = code_bodies(&bytes);
    let ops = &bodies[0];
    assert!(ops.iter().any(|op| matches!(op, Operator::If { .. })));
    assert!(ops.iter().any(|op| matches!(op, Operator::Else)));
}

#[test]
fn test_globals_have_initializers() {
    let bytes = compile("const k int = 7; const pi float = 3.14159; print k;");
    let mut globals = Vec::new();
    for payload in Parser::new(0).parse_all(&bytes) {
        if let Payload::GlobalSection(reader) = payload.expect("well-formed module") {
            for global in reader {
                globals.push(global.expect("global decodes"));
            }
        }
    }
    assert_eq!(globals.len(), 2);
    assert_eq!(globals[0].ty.content_type, ValType::I32);
    assert_eq!(globals[1].ty.content_type, ValType::F64);
}

#[test]
fn test_memory_section_present_when_used() {
    let bytes = compile("var m int = ^1000; print m;");
    let mut memory_count = 0;
    for payload in Parser::new(0).parse_all(&bytes) {
        if let Payload::MemorySection(reader) = payload.expect("well-formed module") {
            memory_count = reader.count();
        }
    }
    assert_eq!(memory_count, 1);
}

#[test]
fn test_peek_poke_lower_to_loads_and_stores() {
    let bytes = compile("const addr int = 500; `addr = 1234; print `addr;");
    let bodies = code_bodies(&bytes);
    let ops = &bodies[0];
    assert!(ops.iter().any(|op| matches!(op, Operator::I32Store { .. })));
    assert!(ops.iter().any(|op| matches!(op, Operator::I32Load { .. })));
}

#[test]
fn test_grow_uses_memory_instructions() {
    let bytes = compile("print ^1000;");
    let bodies = code_bodies(&bytes);
    let ops = &bodies[0];
    assert!(ops.iter().any(|op| matches!(op, Operator::MemoryGrow { .. })));
    assert!(ops.iter().any(|op| matches!(op, Operator::MemorySize { .. })));
}

#[test]
fn test_casts_lower_to_conversions() {
    let bytes = compile("print int(3.9); print float(2) + 0.5;");
    let bodies = code_bodies(&bytes);
    let ops = &bodies[0];
    assert!(ops.iter().any(|op| matches!(op, Operator::I32TruncF64S)));
    assert!(ops.iter().any(|op| matches!(op, Operator::F64ConvertI32S)));
}

#[test]
fn test_void_function_signature() {
    let bytes = compile("func tick() { print 1; } tick();");
    wasmparser::validate(&bytes).expect("void signature validates");
    let bodies = code_bodies(&bytes);
    // tick ends with a bare return.
    let tick = &bodies[0];
    assert!(tick.iter().any(|op| matches!(op, Operator::Return)));
}

#[test]
fn test_determinism() {
    let source = "func fib(n int) int { if n>1 { return fib(n-1)+fib(n-2); } else { return 1; } return 0; } print fib(10);";
    assert_eq!(compile(source), compile(source));
}
