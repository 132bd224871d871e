//! Parser failure modes, recovery, and tree-shape properties.

use tusk::{ExprKind, FatalError, Interpreter, StmtKind, parse};

/// Debug rendering with source positions blanked out, so trees built from
/// different surface syntax can be compared structurally.
fn shape(program: &tusk::Program) -> String {
    let debug = format!("{program:?}");
    let mut out = String::new();
    let mut rest = debug.as_str();
    while let Some(at) = rest.find("Pos {") {
        out.push_str(&rest[..at]);
        let tail = &rest[at..];
        let end = tail.find('}').map_or(tail.len(), |i| i + 1);
        out.push_str("Pos");
        rest = &tail[end..];
    }
    out.push_str(rest);
    out
}

#[test]
fn malformed_source_reports_and_recovers() {
    let (program, errors) = parse("<?php $a = ; echo 1;");
    assert!(!errors.is_empty());
    // The parser resynchronized: the echo after the bad statement is intact.
    assert!(program
        .stmts
        .iter()
        .any(|s| matches!(&s.kind, StmtKind::Echo(_))));
}

#[test]
fn eval_surfaces_parse_errors() {
    let mut interp = Interpreter::new();
    let result = interp.eval("<?php function { }");
    assert!(matches!(result, Err(FatalError::Parse(_))));
    let output = interp.take_output_string();
    assert!(output.contains("Parse error"), "output: {output}");
}

#[test]
fn unclosed_brace_is_an_error() {
    let (_, errors) = parse("<?php if ($a) { echo 1;");
    assert!(!errors.is_empty());
}

#[test]
fn precedence_tree_shapes() {
    let (program, errors) = parse("<?php 1 + 2 * 3;");
    assert!(errors.is_empty());
    let StmtKind::Expr(expr) = &program.stmts[0].kind else { panic!("expected expr") };
    let ExprKind::Binary { op, rhs, .. } = &expr.kind else { panic!("expected binary") };
    assert_eq!(format!("{op}"), "+");
    assert!(matches!(&rhs.kind, ExprKind::Binary { op, .. } if format!("{op}") == "*"));

    // Power is right-associative; concatenation groups left.
    let (program, _) = parse("<?php 2 ** 3 ** 2;");
    let StmtKind::Expr(expr) = &program.stmts[0].kind else { panic!() };
    let ExprKind::Binary { lhs, rhs, .. } = &expr.kind else { panic!() };
    assert!(matches!(lhs.kind, ExprKind::Int(2)));
    assert!(matches!(rhs.kind, ExprKind::Binary { .. }));

    // Assignment binds looser than arithmetic and associates right.
    let (program, _) = parse("<?php $a = $b = 1 + 2;");
    let StmtKind::Expr(expr) = &program.stmts[0].kind else { panic!() };
    let ExprKind::Assign { value, .. } = &expr.kind else { panic!("expected assignment") };
    assert!(matches!(value.kind, ExprKind::Assign { .. }));

    // Coalesce binds tighter than ternary.
    let (program, _) = parse("<?php $a ?? $b ? 1 : 2;");
    let StmtKind::Expr(expr) = &program.stmts[0].kind else { panic!() };
    let ExprKind::Ternary { cond, .. } = &expr.kind else { panic!("expected ternary") };
    assert!(matches!(cond.kind, ExprKind::Coalesce { .. }));
}

#[test]
fn alternative_syntax_matches_braced_form() {
    let cases = [
        (
            "<?php if ($a): echo 1; elseif ($b): echo 2; else: echo 3; endif;",
            "<?php if ($a) { echo 1; } elseif ($b) { echo 2; } else { echo 3; }",
        ),
        (
            "<?php while ($a): echo 1; endwhile;",
            "<?php while ($a) { echo 1; }",
        ),
        (
            "<?php foreach ($a as $k => $v): echo $v; endforeach;",
            "<?php foreach ($a as $k => $v) { echo $v; }",
        ),
        (
            "<?php for ($i = 0; $i < 3; $i++): echo $i; endfor;",
            "<?php for ($i = 0; $i < 3; $i++) { echo $i; }",
        ),
        (
            "<?php switch ($a): case 1: echo 1; break; default: echo 2; endswitch;",
            "<?php switch ($a) { case 1: echo 1; break; default: echo 2; }",
        ),
    ];
    for (alt, braced) in cases {
        let (alt_tree, alt_errors) = parse(alt);
        let (braced_tree, braced_errors) = parse(braced);
        assert!(alt_errors.is_empty(), "{alt}: {alt_errors:?}");
        assert!(braced_errors.is_empty(), "{braced}: {braced_errors:?}");
        assert_eq!(shape(&alt_tree), shape(&braced_tree), "mismatch for {alt}");
    }
}

#[test]
fn cast_versus_grouping() {
    let (program, _) = parse("<?php (int) $x;");
    let StmtKind::Expr(expr) = &program.stmts[0].kind else { panic!() };
    assert!(matches!(expr.kind, ExprKind::Cast { .. }));

    let (program, _) = parse("<?php ($x);");
    let StmtKind::Expr(expr) = &program.stmts[0].kind else { panic!() };
    assert!(matches!(expr.kind, ExprKind::Variable(_)));
}

#[test]
fn short_array_versus_destructuring() {
    let (program, _) = parse("<?php [$a, $b] = f();");
    let StmtKind::Expr(expr) = &program.stmts[0].kind else { panic!() };
    let ExprKind::Assign { target, .. } = &expr.kind else { panic!("expected assignment") };
    assert!(matches!(target.kind, ExprKind::List(_)));

    let (program, _) = parse("<?php $x = [$a, $b];");
    let StmtKind::Expr(expr) = &program.stmts[0].kind else { panic!() };
    let ExprKind::Assign { value, .. } = &expr.kind else { panic!() };
    assert!(matches!(value.kind, ExprKind::Array(_)));
}

#[test]
fn yield_without_operand() {
    let (program, errors) = parse("<?php function g() { yield; };");
    assert!(errors.is_empty());
    let StmtKind::Decl(_) = &program.stmts[0].kind else { panic!("expected declaration") };
}

#[test]
fn strict_types_flag_detected() {
    let (program, _) = parse("<?php declare(strict_types=1); echo 1;");
    assert!(program.strict_types);
    let (program, _) = parse("<?php declare(strict_types=0); echo 1;");
    assert!(!program.strict_types);
    let (program, _) = parse("<?php echo 1;");
    assert!(!program.strict_types);
}

#[test]
fn attributes_parse_on_declarations() {
    let (_, errors) = parse(
        "<?php #[Route('/home'), Cached] class Controller { #[Inject] public $service; \
         #[Deprecated(reason: 'old')] public function handle(#[Sensitive] $input) {} }",
    );
    assert!(errors.is_empty(), "{errors:?}");
}

#[test]
fn union_and_intersection_types() {
    let (_, errors) = parse(
        "<?php function f(int|string $a, ?array $b, Countable&Stringable $c): static|null {}",
    );
    assert!(errors.is_empty(), "{errors:?}");
}

#[test]
fn heredoc_and_nowdoc_parse() {
    let (_, errors) = parse("<?php $a = <<<EOT\nhello $name\nEOT;\n$b = <<<'RAW'\nas-is\nRAW;");
    assert!(errors.is_empty(), "{errors:?}");
}

#[test]
fn first_class_callable_forms() {
    let (_, errors) = parse("<?php $a = strlen(...); $b = $obj->m(...); $c = Foo::bar(...);");
    assert!(errors.is_empty(), "{errors:?}");
}

#[test]
fn bad_expression_never_panics() {
    // A grab-bag of malformed inputs; the parser must produce trees and
    // errors, not panic.
    let sources = [
        "<?php $",
        "<?php foreach () {}",
        "<?php class {}",
        "<?php match (1) { => 2 };",
        "<?php function f(",
        "<?php \"unterminated",
        "<?php $a->;",
        "<?php 1 +",
    ];
    for source in sources {
        let (_, errors) = parse(source);
        assert!(!errors.is_empty(), "expected errors for {source:?}");
    }
}
