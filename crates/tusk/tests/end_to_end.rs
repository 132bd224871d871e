//! Whole-program scenarios: source text in, flushed output out.

use tusk::{FatalError, Interpreter};

fn run(source: &str) -> String {
    let mut interp = Interpreter::new();
    interp.eval(source).unwrap_or_else(|err| panic!("eval failed: {err}\nsource: {source}"));
    interp.take_output_string()
}

#[test]
fn arithmetic_precedence() {
    assert_eq!(run("<?php echo 1 + 2 * 3;"), "7");
}

#[test]
fn foreach_with_interpolation() {
    assert_eq!(
        run("<?php $a = [1,2,3]; foreach ($a as $k => $v) echo \"$k:$v \";"),
        "0:1 1:2 2:3 "
    );
}

#[test]
fn parent_method_call() {
    let source = "<?php class A { function f(){return 1;} } \
                  class B extends A { function f(){return 2 + parent::f();} } \
                  echo (new B)->f();";
    assert_eq!(run(source), "3");
}

#[test]
fn generator_iteration() {
    assert_eq!(
        run("<?php function g(){ yield 1; yield 2; } foreach (g() as $v) echo $v;"),
        "12"
    );
}

#[test]
fn try_catch_finally() {
    let source = "<?php try { throw new Exception(\"x\"); } \
                  catch (Exception $e) { echo $e->getMessage(); } \
                  finally { echo \"!\"; }";
    assert_eq!(run(source), "x!");
}

#[test]
fn strict_types_rejects_coercion() {
    let source = "<?php declare(strict_types=1); \
                  function f(int $x): int { return $x+1; } echo f(\"3\");";
    let mut interp = Interpreter::new();
    let result = interp.eval(source);
    match result {
        Err(FatalError::UncaughtThrow { class_name, .. }) => {
            assert_eq!(class_name, "TypeError");
        }
        other => panic!("expected uncaught TypeError, got {other:?}"),
    }
    let output = interp.take_output_string();
    assert!(output.contains("Fatal error: Uncaught TypeError"), "output: {output}");
}

#[test]
fn weak_mode_coerces_scalars() {
    assert_eq!(run("<?php function f(int $x): int { return $x+1; } echo f(\"3\");"), "4");
}

#[test]
fn inline_html_passthrough() {
    assert_eq!(run("a<?php echo 'b'; ?>c"), "abc");
    // A dangling open tag with no code is legal.
    assert_eq!(run("text<?php "), "text");
}

#[test]
fn short_echo_tag() {
    assert_eq!(run("<?= 1 + 1 ?>!"), "2!");
}

#[test]
fn division_semantics() {
    assert_eq!(run("<?php echo 7 / 2;"), "3.5");
    assert_eq!(run("<?php echo 6 / 2;"), "3");
    assert_eq!(run("<?php echo 7 % 3;"), "1");
    assert_eq!(run("<?php try { echo 1 / 0; } catch (DivisionByZeroError $e) { echo $e->getMessage(); }"), "Division by zero");
    assert_eq!(run("<?php echo intdiv(7, 2);"), "3");
}

#[test]
fn integer_overflow_promotes_to_float() {
    assert_eq!(run("<?php echo PHP_INT_MAX + 1;"), "9.2233720368548E+18");
}

#[test]
fn int_min_division_by_minus_one_is_float() {
    assert_eq!(run("<?php echo PHP_INT_MIN / -1;"), "9.2233720368548E+18");
    assert_eq!(run("<?php echo PHP_INT_MIN % -1;"), "0");
}

#[test]
fn unsupported_operand_messages_name_both_types() {
    assert_eq!(
        run("<?php try { echo 1 + \"abc\"; } catch (TypeError $e) { echo $e->getMessage(); }"),
        "Unsupported operand types: int + string"
    );
    assert_eq!(
        run("<?php try { echo \"abc\" * [1]; } catch (TypeError $e) { echo $e->getMessage(); }"),
        "Unsupported operand types: string * array"
    );
    assert_eq!(
        run("<?php try { echo [1] - 1; } catch (TypeError $e) { echo $e->getMessage(); }"),
        "Unsupported operand types: array - int"
    );
}

#[test]
fn float_output_formatting() {
    assert_eq!(run("<?php echo 0.1 + 0.2;"), "0.3");
    assert_eq!(run("<?php echo 10.0;"), "10");
    assert_eq!(run("<?php echo 1/3;"), "0.33333333333333");
}

#[test]
fn loose_and_strict_comparison() {
    assert_eq!(run("<?php var_dump(\"10\" == \"1e1\");"), "bool(true)\n");
    assert_eq!(run("<?php var_dump(100 == \"100\");"), "bool(true)\n");
    assert_eq!(run("<?php var_dump(0 == \"foo\");"), "bool(false)\n");
    assert_eq!(run("<?php var_dump(1 === 1.0);"), "bool(false)\n");
    assert_eq!(run("<?php echo 1 <=> 2, 2 <=> 2, 3 <=> 2;"), "-101");
}

#[test]
fn null_handling_operators() {
    assert_eq!(run("<?php echo $x ?? 'fallback';"), "fallback");
    assert_eq!(run("<?php $a = ['k' => null]; echo $a['k'] ?? 'd';"), "d");
    assert_eq!(run("<?php $x ??= 5; echo $x;"), "5");
    assert_eq!(run("<?php $o = null; var_dump($o?->prop);"), "NULL\n");
}

#[test]
fn loops_break_continue_levels() {
    assert_eq!(
        run("<?php for ($i = 0; $i < 5; $i++) { if ($i == 2) continue; if ($i == 4) break; echo $i; }"),
        "013"
    );
    assert_eq!(
        run("<?php foreach ([1,2] as $i) { foreach ([3,4] as $j) { if ($j == 4) break 2; echo \"$i$j\"; } }"),
        "13"
    );
    assert_eq!(run("<?php $i = 0; do { $i++; } while ($i < 3); echo $i;"), "3");
    assert_eq!(run("<?php $i = 5; while ($i-- > 3) echo $i;"), "43");
}

#[test]
fn switch_fallthrough_and_default() {
    let source = "<?php function s($x) { switch ($x) { case 1: return 'one'; case 2: case 3: return 'few'; default: return 'many'; } } \
                  echo s(1), ' ', s(3), ' ', s(9);";
    assert_eq!(run(source), "one few many");
}

#[test]
fn goto_jumps_within_statement_list() {
    assert_eq!(run("<?php $i = 0; loop: $i++; if ($i < 3) goto loop; echo $i;"), "3");
}

#[test]
fn references_alias_variables() {
    assert_eq!(run("<?php $a = 1; $b = &$a; $b = 7; echo $a;"), "7");
    assert_eq!(
        run("<?php $arr = [1,2,3]; foreach ($arr as &$v) { $v *= 2; } unset($v); echo implode(',', $arr);"),
        "2,4,6"
    );
    assert_eq!(
        run("<?php function bump(&$n) { $n++; } $x = 41; bump($x); echo $x;"),
        "42"
    );
}

#[test]
fn static_and_global_variables() {
    assert_eq!(
        run("<?php function counter() { static $n = 0; $n++; return $n; } echo counter(), counter(), counter();"),
        "123"
    );
    assert_eq!(run("<?php $g = 5; function f() { global $g; return $g + 1; } echo f();"), "6");
}

#[test]
fn list_destructuring() {
    assert_eq!(run("<?php [$a, [$b, $c]] = [1, [2, 3]]; echo \"$a$b$c\";"), "123");
    assert_eq!(run("<?php ['x' => $x] = ['x' => 9]; echo $x;"), "9");
    assert_eq!(run("<?php list(, $second) = [1, 2]; echo $second;"), "2");
    assert_eq!(
        run("<?php foreach ([[1, 'a'], [2, 'b']] as [$n, $l]) echo \"$n$l\";"),
        "1a2b"
    );
}

#[test]
fn closures_and_arrow_functions() {
    assert_eq!(run("<?php $mul = 3; $f = fn($x) => $x * $mul; echo $f(7);"), "21");
    assert_eq!(
        run("<?php $mul = 3; $c = function($x) use ($mul) { return $x + $mul; }; echo $c(1);"),
        "4"
    );
    assert_eq!(
        run("<?php $n = 0; $inc = function() use (&$n) { $n++; }; $inc(); $inc(); echo $n;"),
        "2"
    );
    assert_eq!(run("<?php $f = 'strtoupper'; echo $f('abc');"), "ABC");
    assert_eq!(run("<?php $f = strlen(...); echo $f('four');"), "4");
}

#[test]
fn named_and_variadic_arguments() {
    assert_eq!(
        run("<?php function f($a, $b = 2, $c = 3) { return \"$a $b $c\"; } echo f(1, c: 10);"),
        "1 2 10"
    );
    assert_eq!(
        run("<?php function sum(...$nums) { return array_sum($nums); } echo sum(1, 2, 3, 4);"),
        "10"
    );
    assert_eq!(run("<?php function f($a, $b) { return $a - $b; } echo f(...[10, 4]);"), "6");
}

#[test]
fn match_expression() {
    assert_eq!(run("<?php echo match(2) { 1, 2 => 'a', default => 'b' };"), "a");
    assert_eq!(run("<?php echo match(true) { 1 > 2 => 'no', 2 > 1 => 'yes' };"), "yes");
    assert_eq!(
        run("<?php try { echo match(9) { 1 => 'x' }; } catch (\\UnhandledMatchError $e) { echo 'unhandled'; }"),
        "unhandled"
    );
    // match uses identity, not loose equality.
    assert_eq!(run("<?php echo match('1') { 1 => 'int', '1' => 'string' };"), "string");
}

#[test]
fn output_buffering_stack() {
    assert_eq!(run("<?php ob_start(); echo 'inner'; $s = ob_get_clean(); echo \"[$s]\";"), "[inner]");
    assert_eq!(
        run("<?php echo 'a'; ob_start(); echo 'b'; ob_start(); echo 'c'; ob_end_clean(); ob_end_flush(); echo 'd';"),
        "abd"
    );
    // Unclosed buffers flush at the end.
    assert_eq!(run("<?php echo 'x'; ob_start(); echo 'y'; echo ob_get_level();"), "xy1");
}

#[test]
fn exit_runs_finally_and_sets_status() {
    let mut interp = Interpreter::new();
    interp
        .eval("<?php function f() { exit(3); } try { f(); } finally { echo 'F'; }")
        .unwrap();
    assert_eq!(interp.exit_status(), Some(3));
    assert_eq!(interp.take_output_string(), "F");
}

#[test]
fn exit_with_message_prints_it() {
    let mut interp = Interpreter::new();
    interp.eval("<?php echo 'a'; exit('bye'); echo 'never';").unwrap();
    assert_eq!(interp.exit_status(), Some(0));
    assert_eq!(interp.take_output_string(), "abye");
}

#[test]
fn error_suppression_silences_warnings() {
    let loud = run("<?php echo @$undefined ?? 'ok';");
    assert_eq!(loud, "ok");
    let source = "<?php echo $nope; echo 'x';";
    let output = run(source);
    assert!(output.contains("Warning: Undefined variable $nope"), "output: {output}");
    assert!(output.ends_with('x'));
    let suppressed = run("<?php echo @$nope; echo 'x';");
    assert_eq!(suppressed, "x");
}

#[test]
fn include_shares_scope_and_once_runs_once() {
    let dir = std::env::temp_dir().join(format!("tusk_e2e_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let inc = dir.join("inc.php");
    std::fs::write(&inc, "<?php $count = ($count ?? 0) + 1; echo 'i';").unwrap();
    let path = inc.display().to_string();

    let source =
        format!("<?php include '{path}'; include '{path}'; include_once '{path}'; echo $count;");
    assert_eq!(run(&source), "ii2");

    let missing = dir.join("missing.php").display().to_string();
    let source = format!("<?php $r = @include '{missing}'; var_dump($r);");
    assert_eq!(run(&source), "bool(false)\n");

    let source = format!("<?php try {{ require '{missing}'; }} catch (Error $e) {{ echo 'fatal'; }}");
    assert_eq!(run(&source), "fatal");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn evaluation_is_deterministic() {
    let source = "<?php $a = []; for ($i = 0; $i < 10; $i++) { $a[] = $i * $i; } \
                  echo implode('-', $a); echo json_encode(['k' => [1, 2.5, 'x']]);";
    assert_eq!(run(source), run(source));
}

#[test]
fn builtins_are_first_class() {
    assert_eq!(run("<?php echo call_user_func('strtoupper', 'hi');"), "HI");
    assert_eq!(
        run("<?php $fns = ['strlen', 'strrev']; echo $fns[1]('abc'), $fns[0]('abc');"),
        "cba3"
    );
    assert_eq!(
        run("<?php echo implode(',', array_map(fn($x) => $x * $x, [1, 2, 3]));"),
        "1,4,9"
    );
}

#[test]
fn host_registered_builtin() {
    let mut interp = Interpreter::new();
    interp.register_builtin("host_add", |_, args| {
        let sum = args.iter().map(|v| v.clone().deref().to_int_lossy()).sum::<i64>();
        Ok(tusk::Value::Int(sum))
    });
    interp.eval("<?php echo host_add(20, 22);").unwrap();
    assert_eq!(interp.take_output_string(), "42");
}

#[test]
fn superglobals_from_request_context() {
    let mut interp = Interpreter::new();
    interp.set_request_context(tusk::RequestContext {
        method: "GET".to_owned(),
        query_string: "a=1&b=two".to_owned(),
        ..tusk::RequestContext::default()
    });
    interp
        .eval("<?php echo $_SERVER['REQUEST_METHOD'], ':', $_GET['a'], ':', $_GET['b'];")
        .unwrap();
    assert_eq!(interp.take_output_string(), "GET:1:two");
}

#[test]
fn array_union_and_key_laws() {
    assert_eq!(run("<?php $a = [1, 2] + [9, 8, 7]; echo implode(',', $a);"), "1,2,7");
    assert_eq!(run("<?php $a = []; $a['10'] = 'x'; $a[] = 'y'; echo array_key_last($a);"), "11");
    assert_eq!(run("<?php $a = [true => 'b', null => 'n', 1.7 => 'f']; echo $a[1], $a[''], count($a);"), "fn2");
}

#[test]
fn uncaught_exception_exit_code_semantics() {
    let mut interp = Interpreter::new();
    let result = interp.eval("<?php throw new RuntimeException('boom');");
    assert!(matches!(result, Err(FatalError::UncaughtThrow { .. })));
    let output = interp.take_output_string();
    assert!(output.contains("Uncaught RuntimeException: boom"), "output: {output}");
}
