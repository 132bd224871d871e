//! Classes, interfaces, traits, enums, visibility and magic methods.

use tusk::Interpreter;

fn run(source: &str) -> String {
    let mut interp = Interpreter::new();
    interp.eval(source).unwrap_or_else(|err| panic!("eval failed: {err}\nsource: {source}"));
    interp.take_output_string()
}

#[test]
fn constructor_promotion_and_defaults() {
    let source = "<?php class Point { \
                    public $tag = 'p'; \
                    public function __construct(public int $x, public int $y = 0) {} \
                  } \
                  $p = new Point(3); echo $p->x, $p->y, $p->tag;";
    assert_eq!(run(source), "30p");
}

#[test]
fn property_defaults_are_per_instance() {
    let source = "<?php class Bag { public $items = []; } \
                  $a = new Bag; $b = new Bag; \
                  $a->items[] = 1; \
                  echo count($a->items), count($b->items);";
    assert_eq!(run(source), "10");
}

#[test]
fn visibility_enforcement() {
    let source = "<?php class V { \
                    private $secret = 1; \
                    protected $guarded = 2; \
                    public function reveal() { return $this->secret + $this->guarded; } \
                  } \
                  $v = new V; echo $v->reveal(); \
                  try { $v->secret; } catch (Error $e) { echo '|denied'; } \
                  try { $v->secret = 9; } catch (Error $e) { echo '|ro'; }";
    assert_eq!(run(source), "3|denied|ro");
}

#[test]
fn subclass_sees_protected_but_not_private() {
    let source = "<?php class Base { protected $p = 'ok'; private $q = 'no'; } \
                  class Child extends Base { function read() { return $this->p; } } \
                  echo (new Child)->read();";
    assert_eq!(run(source), "ok");
}

#[test]
fn readonly_property_rejects_rewrites() {
    let source = "<?php class P { public function __construct(public readonly int $x) {} } \
                  $p = new P(5); echo $p->x; \
                  try { $p->x = 6; } catch (Error $e) { echo '|', $e->getMessage(); }";
    assert_eq!(run(source), "5|Cannot modify readonly property P::$x");
}

#[test]
fn interfaces_and_instanceof() {
    let source = "<?php interface Shape { public function area(): float; } \
                  class Sq implements Shape { \
                    public function __construct(private float $s) {} \
                    public function area(): float { return $this->s * $this->s; } \
                  } \
                  $sq = new Sq(3); \
                  echo $sq->area(); \
                  echo $sq instanceof Shape ? '|yes' : '|no'; \
                  echo $sq instanceof Sq ? '|own' : '|not';";
    assert_eq!(run(source), "9|yes|own");
}

#[test]
fn instanceof_walks_ancestors() {
    let source = "<?php class A {} class B extends A {} class C extends B {} \
                  $c = new C; \
                  var_dump($c instanceof A, $c instanceof B, (new A) instanceof C);";
    assert_eq!(run(source), "bool(true)\nbool(true)\nbool(false)\n");
}

#[test]
fn traits_flatten_with_insteadof_and_as() {
    let source = "<?php trait A { public function who() { return 'A'; } } \
                  trait B { public function who() { return 'B'; } } \
                  class C { use A, B { A::who insteadof B; B::who as whoB; } } \
                  $c = new C; echo $c->who(), $c->whoB();";
    assert_eq!(run(source), "AB");
}

#[test]
fn trait_methods_bind_to_using_class() {
    let source = "<?php trait Named { public function describe() { return static::class; } } \
                  class Widget { use Named; } \
                  echo (new Widget)->describe();";
    assert_eq!(run(source), "Widget");
}

#[test]
fn abstract_classes() {
    let source = "<?php abstract class Base { \
                    abstract public function impl(); \
                    public function run() { return 'go ' . $this->impl(); } \
                  } \
                  class Impl extends Base { public function impl() { return 'x'; } } \
                  echo (new Impl)->run(); \
                  try { new Base; } catch (Error $e) { echo '|abstract'; }";
    assert_eq!(run(source), "go x|abstract");
}

#[test]
fn static_properties_and_methods() {
    let source = "<?php class S { \
                    public static $count = 0; \
                    public static function bump() { static::$count++; return self::$count; } \
                  } \
                  S::bump(); S::bump(); echo S::$count;";
    assert_eq!(run(source), "2");
}

#[test]
fn class_constants_and_self() {
    let source = "<?php class K { const BASE = 10; const NEXT = self::BASE + 1; } \
                  class L extends K {} \
                  echo K::NEXT, L::BASE, K::class;";
    assert_eq!(run(source), "1110K");
}

#[test]
fn late_static_binding() {
    let source = "<?php class Model { \
                    public static function make(): static { return new static(); } \
                    public function name() { return static::class; } \
                  } \
                  class User extends Model {} \
                  echo get_class(User::make()), '|', (new User)->name(), '|', get_class(Model::make());";
    assert_eq!(run(source), "User|User|Model");
}

#[test]
fn magic_get_set_isset_unset() {
    let source = "<?php class Magic { \
                    private $data = []; \
                    public function __get($name) { return $this->data[$name] ?? 'missing'; } \
                    public function __set($name, $value) { $this->data[$name] = $value; } \
                    public function __isset($name) { return isset($this->data[$name]); } \
                    public function __unset($name) { unset($this->data[$name]); } \
                  } \
                  $m = new Magic; \
                  echo $m->ghost; \
                  $m->ghost = 'boo'; echo '|', $m->ghost; \
                  echo isset($m->ghost) ? '|set' : '|unset'; \
                  unset($m->ghost); \
                  echo isset($m->ghost) ? '|set' : '|unset';";
    assert_eq!(run(source), "missing|boo|set|unset");
}

#[test]
fn magic_call_and_call_static() {
    let source = "<?php class Api { \
                    public function __call($name, $args) { return \"i:$name:\" . count($args); } \
                    public static function __callStatic($name, $args) { return \"s:$name\"; } \
                  } \
                  echo (new Api)->fetch(1, 2), '|', Api::missing();";
    assert_eq!(run(source), "i:fetch:2|s:missing");
}

#[test]
fn to_string_and_invoke() {
    let source = "<?php class Money { \
                    public function __construct(private int $cents) {} \
                    public function __toString(): string { return ($this->cents / 100) . ' EUR'; } \
                    public function __invoke($factor) { return $this->cents * $factor; } \
                  } \
                  $m = new Money(250); \
                  echo $m, '|', $m(2), '|', \"price: $m\";";
    assert_eq!(run(source), "2.5 EUR|500|price: 2.5 EUR");
}

#[test]
fn clone_with_magic_clone() {
    let source = "<?php class Node { \
                    public $tag = 'n'; \
                    public $copies = 0; \
                    public function __clone() { $this->copies++; } \
                  } \
                  $a = new Node; $b = clone $a; $b->tag = 'm'; \
                  echo $a->tag, $b->tag, $a->copies, $b->copies; \
                  var_dump($a === $b, $a == new Node);";
    assert_eq!(run(source), "nm01bool(false)\nbool(true)\n");
}

#[test]
fn pure_enum_cases() {
    let source = "<?php enum Status { \
                    case Active; \
                    case Archived; \
                    public function label(): string { return $this->name; } \
                  } \
                  echo Status::Active->label(), '|', count(Status::cases()); \
                  var_dump(Status::Active === Status::Active, Status::Active === Status::Archived);";
    assert_eq!(run(source), "Active|2bool(true)\nbool(false)\n");
}

#[test]
fn backed_enum_from_and_try_from() {
    let source = "<?php enum Suit: string { \
                    case Hearts = 'H'; \
                    case Spades = 'S'; \
                  } \
                  echo Suit::Hearts->value, Suit::from('S')->name; \
                  var_dump(Suit::tryFrom('Z')); \
                  try { Suit::from('Z'); } catch (ValueError $e) { echo 'invalid'; }";
    assert_eq!(run(source), "HSpadesNULL\ninvalid");
}

#[test]
fn enum_implements_interface() {
    let source = "<?php interface HasCode { public function code(): int; } \
                  enum Level: int implements HasCode { \
                    case Low = 1; \
                    case High = 10; \
                    public function code(): int { return $this->value; } \
                  } \
                  echo Level::High->code(); \
                  var_dump(Level::Low instanceof HasCode);";
    assert_eq!(run(source), "10bool(true)\n");
}

#[test]
fn closures_bind_this_and_scope() {
    let source = "<?php class Counter { \
                    private $n = 0; \
                    public function incrementer() { return function() { return ++$this->n; }; } \
                  } \
                  $c = new Counter; $inc = $c->incrementer(); \
                  echo $inc(), $inc(), $inc();";
    assert_eq!(run(source), "123");
}

#[test]
fn first_class_callable_from_method() {
    let source = "<?php class Greeter { \
                    public function __construct(private string $name) {} \
                    public function hello(): string { return \"hi {$this->name}\"; } \
                  } \
                  $g = new Greeter('ana'); $f = $g->hello(...); echo $f();";
    assert_eq!(run(source), "hi ana");
}

#[test]
fn null_safe_method_chain() {
    let source = "<?php class Box { public $inner = null; } \
                  $b = new Box; \
                  var_dump($b->inner?->whatever()); \
                  var_dump($b?->inner);";
    assert_eq!(run(source), "NULL\nNULL\n");
}

#[test]
fn namespaces_and_use_aliases() {
    let source = "<?php namespace App\\Models; \
                  class User { public static function table(): string { return 'users'; } } \
                  namespace Main; \
                  use App\\Models\\User as Account; \
                  echo Account::table(), '|', \\App\\Models\\User::table();";
    assert_eq!(run(source), "users|users");
}

#[test]
fn exception_hierarchy_and_previous() {
    let source = "<?php try { \
                    try { throw new InvalidArgumentException('inner'); } \
                    catch (LogicException $e) { throw new RuntimeException('outer', 0, $e); } \
                  } catch (Exception $e) { \
                    echo $e->getMessage(), '<', $e->getPrevious()->getMessage(); \
                  }";
    assert_eq!(run(source), "outer<inner");
}

#[test]
fn catch_union_types() {
    let source = "<?php function boom($k) { \
                    if ($k) { throw new TypeError('t'); } \
                    throw new ValueError('v'); \
                  } \
                  foreach ([0, 1] as $k) { \
                    try { boom($k); } catch (TypeError|ValueError $e) { echo $e->getMessage(); } \
                  }";
    assert_eq!(run(source), "vt");
}

#[test]
fn finally_runs_on_return_path() {
    let source = "<?php function f() { try { return 'r'; } finally { echo 'f'; } } echo f();";
    assert_eq!(run(source), "fr");
}

#[test]
fn rethrow_from_finally_supersedes() {
    let source = "<?php try { \
                    try { throw new Exception('first'); } finally { throw new Exception('second'); } \
                  } catch (Exception $e) { echo $e->getMessage(); }";
    assert_eq!(run(source), "second");
}

#[test]
fn destructors_run_at_shutdown() {
    let mut interp = Interpreter::new();
    interp
        .eval("<?php class D { public function __destruct() { echo 'bye'; } } $d = new D; echo 'live|';")
        .unwrap();
    interp.shutdown();
    assert_eq!(interp.take_output_string(), "live|bye");
}
