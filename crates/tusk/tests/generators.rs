//! Generator materialization: yields, keys, `yield from`, return values.

use tusk::Interpreter;

fn run(source: &str) -> String {
    let mut interp = Interpreter::new();
    interp.eval(source).unwrap_or_else(|err| panic!("eval failed: {err}\nsource: {source}"));
    interp.take_output_string()
}

#[test]
fn values_iterate_in_yield_order() {
    assert_eq!(
        run("<?php function g() { yield 'a'; yield 'b'; yield 'c'; } foreach (g() as $v) echo $v;"),
        "abc"
    );
}

#[test]
fn auto_keys_count_from_zero() {
    assert_eq!(
        run("<?php function g() { yield 10; yield 20; } foreach (g() as $k => $v) echo \"$k=$v;\";"),
        "0=10;1=20;"
    );
}

#[test]
fn explicit_keys_and_auto_keys_mix() {
    // Auto keys continue past the highest integer key, like array appends.
    assert_eq!(
        run("<?php function g() { yield 'x' => 1; yield 2; yield 5 => 3; yield 4; } \
             foreach (g() as $k => $v) echo \"$k:$v \";"),
        "x:1 0:2 5:3 6:4 "
    );
}

#[test]
fn yield_from_splices_pairs() {
    assert_eq!(
        run("<?php function inner() { yield 1; yield 2; } \
             function outer() { yield 0; yield from inner(); yield 9; } \
             foreach (outer() as $v) echo $v;"),
        "0129"
    );
}

#[test]
fn yield_from_array() {
    assert_eq!(
        run("<?php function g() { yield from ['a' => 1, 'b' => 2]; } \
             foreach (g() as $k => $v) echo \"$k$v\";"),
        "a1b2"
    );
}

#[test]
fn yield_from_propagates_return_value() {
    assert_eq!(
        run("<?php function inner() { yield 1; return 99; } \
             function outer() { $r = yield from inner(); yield $r; } \
             foreach (outer() as $v) echo \"$v,\";"),
        "1,99,"
    );
}

#[test]
fn get_return_after_iteration() {
    assert_eq!(
        run("<?php function g() { yield 1; return 'done'; } \
             $g = g(); foreach ($g as $v) echo $v; echo $g->getReturn();"),
        "1done"
    );
}

#[test]
fn manual_cursor_methods() {
    let source = "<?php function g() { yield 'a' => 1; yield 'b' => 2; } \
                  $g = g(); \
                  echo $g->valid() ? 'v' : '-'; \
                  echo $g->key(), $g->current(); \
                  $g->next(); \
                  echo $g->key(), $g->current(); \
                  $g->next(); \
                  echo $g->valid() ? 'v' : '-'; \
                  $g->rewind(); \
                  echo $g->current();";
    assert_eq!(run(source), "va1b2-1");
}

#[test]
fn generator_methods_in_expressions() {
    assert_eq!(
        run("<?php function g() { yield 5; yield 6; } \
             echo implode('+', iterator_to_array(g(), false));"),
        "5+6"
    );
}

#[test]
fn generators_from_closures_and_methods() {
    assert_eq!(
        run("<?php $g = function() { yield 1; yield 2; }; foreach ($g() as $v) echo $v;"),
        "12"
    );
    assert_eq!(
        run("<?php class Seq { public function items() { yield 'i'; yield 'j'; } } \
             foreach ((new Seq)->items() as $v) echo $v;"),
        "ij"
    );
}

#[test]
fn nested_generator_invocations_do_not_mix() {
    // Calling a generator while another materializes must not leak yields
    // between the two collectors.
    assert_eq!(
        run("<?php function inner() { yield 'x'; } \
             function outer() { \
                foreach (inner() as $v) { yield strtoupper($v); } \
                yield 'z'; \
             } \
             foreach (outer() as $v) echo $v;"),
        "Xz"
    );
}

#[test]
fn yield_outside_generator_is_an_error() {
    let mut interp = Interpreter::new();
    let result = interp.eval("<?php $x = yield 1;");
    assert!(result.is_err());
}

#[test]
fn generator_argument_unpacking() {
    assert_eq!(
        run("<?php function g() { yield 1; yield 2; } \
             function add($a, $b) { return $a + $b; } \
             echo add(...g());"),
        "3"
    );
}
