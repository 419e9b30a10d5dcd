//! Round-trip property for the lexer: joining the lexemes of a token
//! stream with single spaces and re-lexing yields the same tag sequence.

use wabbit_parser::{tokenize, TokenKind};

const FIXTURES: &[&str] = &[
    "print 2 + 3 * -4;",
    "print 2.0 - 3.0 / -4.0;",
    "const pi float = 3.14159; var tau float; tau = 2.0 * pi; print tau;",
    "func square(x int) int { return x*x; } print square(4); print square(10);",
    "func fib(n int) int { if n>1 { return fib(n-1)+fib(n-2); } else { return 1; } return 0; } print fib(10);",
    "var memsize int = ^1000; const addr int = 500; `addr = 1234; print `addr + 10000;",
    "var i = 0; while i < 10 { if i == 5 { break; } i = i + 1; continue; }",
    "import func getchar() int; print getchar() != -1 && true || !false;",
    "print int(3.5) <= 3; print float(2) >= 1.0; print .5; print 6.;",
];

fn tags(source: &str) -> Vec<TokenKind> {
    tokenize(source)
        .expect("fixture lexes")
        .iter()
        .map(|t| t.kind)
        .collect()
}

#[test]
fn test_roundtrip_fixtures() {
    for source in FIXTURES {
        let tokens = tokenize(source).expect("fixture lexes");
        let rejoined = tokens
            .iter()
            .map(|t| t.lexeme.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(
            tags(source),
            tags(&rejoined),
            "round-trip changed tags for {source:?}"
        );
    }
}

#[test]
fn test_lexemes_preserve_text() {
    let tokens = tokenize("tau = 2.0 * pi;").expect("lexes");
    let lexemes: Vec<&str> = tokens.iter().map(|t| t.lexeme.as_str()).collect();
    assert_eq!(lexemes, ["tau", "=", "2.0", "*", "pi", ";", ""]);
}
