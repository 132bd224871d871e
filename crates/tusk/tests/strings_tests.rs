//! String literals: interpolation forms, heredoc/nowdoc, escapes, offsets,
//! and the string builtin family.

use tusk::Interpreter;

fn run(source: &str) -> String {
    let mut interp = Interpreter::new();
    interp.eval(source).unwrap_or_else(|err| panic!("eval failed: {err}\nsource: {source}"));
    interp.take_output_string()
}

#[test]
fn simple_variable_interpolation() {
    assert_eq!(run("<?php $n = 'World'; echo \"Hello $n!\";"), "Hello World!");
    assert_eq!(run("<?php $a = 1; $b = 2; echo \"$a$b\";"), "12");
}

#[test]
fn property_and_offset_interpolation() {
    assert_eq!(
        run("<?php class P { public $name = 'ana'; } $p = new P; echo \"hi $p->name.\";"),
        "hi ana."
    );
    assert_eq!(run("<?php $a = [9, 8]; echo \"first: $a[0], second: $a[1]\";"), "first: 9, second: 8");
    assert_eq!(run("<?php $a = ['k' => 'v']; echo \"got $a[k]\";"), "got v");
    assert_eq!(run("<?php $a = [5]; $i = 0; echo \"at $a[$i]\";"), "at 5");
}

#[test]
fn braced_interpolation() {
    assert_eq!(run("<?php $a = ['x' => ['y' => 7]]; echo \"{$a['x']['y']}\";"), "7");
    assert_eq!(run("<?php $x = 3; echo \"{$x}rd\";"), "3rd");
    assert_eq!(run("<?php $name = 'n'; echo \"${name}\";"), "n");
    assert_eq!(
        run("<?php class C { public function v() { return 'm'; } } $c = new C; echo \"call {$c->v()}\";"),
        "call m"
    );
}

#[test]
fn escapes_decode_in_double_quotes_only() {
    assert_eq!(run(r#"<?php echo "a\tb\nc";"#), "a\tb\nc");
    assert_eq!(run(r#"<?php echo 'a\tb\nc';"#), "a\\tb\\nc");
    assert_eq!(run(r#"<?php echo "\x41\102";"#), "AB");
    assert_eq!(run(r#"<?php echo "\u{1F600}" === "\xF0\x9F\x98\x80" ? 'same' : 'diff';"#), "same");
    assert_eq!(run(r#"<?php echo "cost: \$5";"#), "cost: $5");
    assert_eq!(run(r#"<?php echo 'it\'s';"#), "it's");
    // Unknown escapes keep the backslash.
    assert_eq!(run(r#"<?php echo "a\qb";"#), "a\\qb");
}

#[test]
fn heredoc_interpolates_and_strips_indent() {
    let source = "<?php $who = 'dev';\n$t = <<<EOT\n    Hello $who\n    Bye\n    EOT;\necho $t;";
    assert_eq!(run(source), "Hello dev\nBye");
}

#[test]
fn nowdoc_is_literal() {
    let source = "<?php $t = <<<'RAW'\nno $interp here\nRAW;\necho $t;";
    assert_eq!(run(source), "no $interp here");
}

#[test]
fn empty_heredoc() {
    let source = "<?php $t = <<<EOT\nEOT;\nvar_dump($t);";
    assert_eq!(run(source), "string(0) \"\"\n");
}

#[test]
fn string_offsets_read_and_write() {
    assert_eq!(run("<?php $s = 'abcdef'; echo $s[0], $s[-1];"), "af");
    assert_eq!(run("<?php $s = 'abc'; $s[1] = 'X'; echo $s;"), "aXc");
    // Writing past the end pads with spaces.
    assert_eq!(run("<?php $s = 'ab'; $s[4] = 'z'; var_dump($s);"), "string(5) \"ab  z\"\n");
}

#[test]
fn concatenation_and_coercion() {
    assert_eq!(run("<?php echo 'n=' . 5 . '|' . 1.5 . '|' . true . '|' . null . '|';"), "n=5|1.5|1||");
    assert_eq!(run("<?php $s = 'a'; $s .= 'b'; $s .= 3; echo $s;"), "ab3");
}

#[test]
fn string_builtins() {
    assert_eq!(run("<?php echo strlen('héllo');"), "6");
    assert_eq!(run("<?php echo strtoupper('abc'), strtolower('ABC');"), "ABCabc");
    assert_eq!(run("<?php echo substr('abcdef', 1, 3), substr('abcdef', -2);"), "bcdef");
    assert_eq!(run("<?php var_dump(strpos('hello', 'll'), strpos('hello', 'z'));"), "int(2)\nbool(false)\n");
    assert_eq!(run("<?php echo str_replace('l', 'L', 'hello');"), "heLLo");
    assert_eq!(run("<?php echo str_repeat('ab', 3);"), "ababab");
    assert_eq!(run("<?php echo trim('  x  '), '|', ltrim('  x  '), '|', rtrim('  x  ');"), "x|x  |  x");
    assert_eq!(run("<?php var_dump(str_contains('haystack', 'stack'), str_starts_with('abc', 'a'), str_ends_with('abc', 'b'));"), "bool(true)\nbool(true)\nbool(false)\n");
    assert_eq!(run("<?php echo ucfirst('abc'), lcfirst('ABC');"), "AbcaBC");
    assert_eq!(run("<?php echo implode('-', explode(',', 'a,b,c'));"), "a-b-c");
    assert_eq!(run("<?php echo str_pad('7', 3, '0', STR_PAD_LEFT);"), "007");
    assert_eq!(run("<?php echo number_format(1234567.891, 2);"), "1,234,567.89");
    assert_eq!(run("<?php echo chr(65), ord('A');"), "A65");
}

#[test]
fn sprintf_formatting() {
    assert_eq!(run("<?php echo sprintf('%s is %d years', 'ana', 30);"), "ana is 30 years");
    assert_eq!(run("<?php echo sprintf('%05d', 42);"), "00042");
    assert_eq!(run("<?php echo sprintf('%.2f', 3.14159);"), "3.14");
    assert_eq!(run("<?php echo sprintf('%x|%o|%b', 255, 8, 5);"), "ff|10|101");
    assert_eq!(run("<?php echo sprintf('%-4d|', 7);"), "7   |");
    assert_eq!(run("<?php echo sprintf('%2$s %1$s', 'world', 'hello');"), "hello world");
    assert_eq!(run("<?php echo sprintf('100%%');"), "100%");
}

#[test]
fn numeric_string_behavior() {
    assert_eq!(run("<?php var_dump(is_numeric('12'), is_numeric(' 12 '), is_numeric('12abc'), is_numeric('1e3'));"),
        "bool(true)\nbool(true)\nbool(false)\nbool(true)\n");
    assert_eq!(run("<?php echo (int)'12abc', (int)'abc', (float)'3.5x';"), "1203.5");
    assert_eq!(run("<?php echo '5' + '10';"), "15");
}

#[test]
fn backtick_shell_exec_routes_to_builtin() {
    let mut interp = Interpreter::new();
    interp.register_builtin("shell_exec", |_, args| {
        let cmd = args.first().cloned().unwrap_or(tusk::Value::Null).deref();
        Ok(tusk::Value::string(format!("ran:{}", cmd.display_lossy())))
    });
    interp.eval("<?php echo `ls -l`;").unwrap();
    assert_eq!(interp.take_output_string(), "ran:ls -l");
}

#[test]
fn binary_string_prefix() {
    assert_eq!(run("<?php echo b'raw', b\"dq\";"), "rawdq");
}

#[test]
fn bitwise_ops_on_strings_are_bytewise() {
    assert_eq!(run("<?php echo 'ab' | '  ';"), "ab");
    assert_eq!(run("<?php var_dump(('a' & 'b') === '`');"), "bool(true)\n");
}
