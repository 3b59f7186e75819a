//! End-to-end tests: source text in, program output or error out.

use origami::config::Config;
use origami::error::{Error, ErrorKind};
use origami::interp::{Control, OutputBuffer, Value, Vm};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;
use tempfile::TempDir;

fn vm_with_output() -> (Arc<Vm>, OutputBuffer) {
    let out = OutputBuffer::new();
    (Vm::with_output(Box::new(out.clone())), out)
}

/// Run a program and return everything it echoed.
fn run(source: &str) -> String {
    let (vm, out) = vm_with_output();
    let ctx = vm.create_context();
    if let Err(control) = vm.run_source(source, None, &ctx) {
        panic!("program failed: {:?}\n--- output ---\n{}", control.into_error(), out.contents());
    }
    out.contents()
}

/// Run a program that must fail and return its error.
fn run_err(source: &str) -> Error {
    let (vm, _) = vm_with_output();
    let ctx = vm.create_context();
    match vm.run_source(source, None, &ctx) {
        Ok(_) => panic!("program unexpectedly succeeded"),
        Err(control) => control.into_error().expect("expected a thrown error"),
    }
}

// ============================================
// Expressions and variables
// ============================================

#[test]
fn test_arithmetic_and_concat() {
    assert_eq!(run("echo 1 + 2 * 3, \" \", \"a\" . \"b\";"), "7 ab");
}

#[test]
fn test_typed_variable_rejects_wrong_type() {
    let err = run_err("int $n = 5; $n = \"five\";");
    assert_eq!(err.kind, ErrorKind::Type);
    assert!(err.message.contains("expected int"), "{}", err.message);
}

#[test]
fn test_closure_captures_outer_variable() {
    assert_eq!(run("$base = 10; $add = fn($n) => $n + $base; echo $add(5);"), "15");
}

#[test]
fn test_destructuring_assignment() {
    assert_eq!(run("$a, $b = [1, 2]; echo $b, $a;"), "21");
}

// ============================================
// Control flow
// ============================================

#[test]
fn test_if_elseif_else() {
    let source = r#"
        $x = -1;
        if ($x > 0) {
            echo "a";
        } elseif ($x < 0) {
            echo "b";
        } else {
            echo "c";
        }
    "#;
    assert_eq!(run(source), "b");
}

#[test]
fn test_for_in_matches_foreach() {
    let source = r#"
        $xs = [1, 2, 3];
        for ($v in $xs) { echo $v; }
        foreach ($xs as $v) { echo $v; }
    "#;
    assert_eq!(run(source), "123123");
}

#[test]
fn test_foreach_with_keys() {
    assert_eq!(
        run("foreach ([10, 20] as $i => $v) { echo $i . \":\" . $v . \",\"; }"),
        "0:10,1:20,"
    );
}

#[test]
fn test_classic_for_with_break_and_continue() {
    let source = r#"
        for ($i = 0; $i < 10; $i++) {
            if ($i == 1) { continue; }
            if ($i == 4) { break; }
            echo $i;
        }
    "#;
    assert_eq!(run(source), "023");
}

#[test]
fn test_switch_falls_through_until_break() {
    let source = r#"
        switch (2) {
            case 1: echo "one";
            case 2: echo "two";
            case 3: echo "three"; break;
            default: echo "other";
        }
    "#;
    assert_eq!(run(source), "twothree");
}

#[test]
fn test_match_arms_and_default() {
    let source = r#"
        $n = 2;
        echo match ($n) { 1, 2 => "low", 3 => "mid", default => "high" };
    "#;
    assert_eq!(run(source), "low");
}

#[test]
fn test_match_is_strict() {
    assert_eq!(run("echo match (\"1\") { 1 => \"int\", default => \"other\" };"), "other");
}

#[test]
fn test_exit_stops_the_program() {
    let (vm, out) = vm_with_output();
    let ctx = vm.create_context();
    let result = vm.run_source("echo \"a\"; exit(2); echo \"b\";", None, &ctx);
    assert!(matches!(result, Err(Control::Exit(2))));
    assert_eq!(out.contents(), "a");
}

#[test]
fn test_call_depth_limit() {
    let (vm, _) = vm_with_output();
    vm.set_max_call_depth(50);
    let ctx = vm.create_context();
    let result = vm.run_source("function down($n) { return down($n + 1); } down(0);", None, &ctx);
    let err = result.unwrap_err().into_error().unwrap();
    assert!(err.message.contains("maximum call depth"), "{}", err.message);
}

// ============================================
// Exceptions
// ============================================

#[test]
fn test_try_catch_finally() {
    let source = r#"
        try {
            throw new Exception("bad", 7);
        } catch (Exception $e) {
            echo $e->getMessage() . $e->getCode();
        } finally {
            echo "!";
        }
    "#;
    assert_eq!(run(source), "bad7!");
}

#[test]
fn test_catch_by_subclass() {
    let source = r#"
        class NotFound extends Exception {}
        try {
            throw new NotFound("missing");
        } catch (NotFound $e) {
            echo "nf:" . $e->getMessage();
        }
    "#;
    assert_eq!(run(source), "nf:missing");
}

#[test]
fn test_uncaught_throw_is_an_error() {
    let err = run_err("throw new Exception(\"boom\");");
    assert!(err.to_string().contains("boom"), "{err}");
}

// ============================================
// Classes
// ============================================

#[test]
fn test_private_property_is_invisible_outside() {
    let source = r#"
        class Account {
            private $balance = 10;
            public function total() { return $this->balance; }
        }
        $a = new Account();
        echo $a->total();
        try {
            echo $a->balance;
        } catch (Exception $e) {
            echo "|" . $e->getMessage();
        }
    "#;
    let out = run(source);
    assert!(out.starts_with("10|"), "{out}");
    assert!(out.contains("cannot access private property"), "{out}");
}

#[test]
fn test_parent_call() {
    let source = r#"
        class A { public function hi() { return "A"; } }
        class B extends A { public function hi() { return "B" . parent::hi(); } }
        $b = new B();
        echo $b->hi();
    "#;
    assert_eq!(run(source), "BA");
}

#[test]
fn test_static_property_and_method() {
    let source = r#"
        class Counter {
            public static $count = 0;
            public static function inc() {
                Counter::$count++;
                return Counter::$count;
            }
        }
        Counter::inc();
        echo Counter::inc();
    "#;
    assert_eq!(run(source), "2");
}

#[test]
fn test_generic_list_checks_elements() {
    let source = r#"
        $xs = new List<int>();
        $xs->add(1);
        try {
            $xs->add("two");
        } catch (Exception $e) {
            echo $e->getMessage();
        }
        echo "|", $xs->count();
    "#;
    let out = run(source);
    assert!(out.contains("expected int, got string"), "{out}");
    assert!(out.ends_with("|1"), "{out}");
}

#[test]
fn test_generic_map() {
    let source = r#"
        $m = new Map<string, int>();
        $m->set("a", 1);
        $m->set("b", 2);
        echo $m->get("b"), $m->count();
        try {
            $m->set("c", "three");
        } catch (Exception $e) {
            echo "|rejected";
        }
    "#;
    assert_eq!(run(source), "22|rejected");
}

// ============================================
// Annotations
// ============================================

#[test]
fn test_call_annotations_run_in_reverse_order() {
    let source = r#"
        class Tag implements CallAnnotation {
            public $label;
            public function __construct($label) { $this->label = $label; }
            public function call($target) { echo "[" . $this->label . "]"; }
        }

        @Tag("outer")
        @Tag("inner")
        function hello() { echo "hello"; }

        hello();
    "#;
    assert_eq!(run(source), "[inner][outer]hello");
}

#[test]
fn test_unknown_annotation_fails_to_parse() {
    let err = run_err("@Nope\nfunction f() {}");
    assert!(err.has_kind(ErrorKind::Annotation), "{err}");
}

// ============================================
// Channels and spawn
// ============================================

#[test]
fn test_rendezvous_channel_with_spawn() {
    let source = r#"
        $ch = new Channel();
        spawn function () use ($ch) { $ch->send(42); };
        $r = $ch->receive();
        echo $r[0], $r[1];
    "#;
    assert_eq!(run(source), "42true");
}

#[test]
fn test_closed_channel_drains_then_reports_closed() {
    let source = r#"
        $ch = new Channel(1);
        $ch->send(1);
        $ch->close();
        $a = $ch->receive();
        $b = $ch->receive();
        echo $a[0], $a[1], "|", $b[1];
    "#;
    assert_eq!(run(source), "1true|false");
}

#[test]
fn test_throw_in_spawned_unit_reaches_throw_handler() {
    let (vm, _) = vm_with_output();
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    vm.set_throw_control(Arc::new(move |control: &Control| {
        let message = control.clone().into_error().map(|err| err.message);
        let _ = tx.lock().unwrap().send(message);
    }));
    let ctx = vm.create_context();
    vm.run_source("spawn function () { throw new Exception(\"x\"); };", None, &ctx)
        .unwrap();
    let received = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(received.as_deref(), Some("x"));
}

#[test]
fn test_array_assignment_past_end_is_rejected() {
    let err = run_err("$a = []; $a[9223372036854775807] = 1;");
    assert!(err.message.contains("out of range"), "{}", err.message);
    assert_eq!(run("$a = [1]; $a[1] = 2; $a[0] = 0; echo $a[0], $a[1];"), "02");
}

#[test]
fn test_min_int_divided_by_minus_one() {
    assert_eq!(run("$m = -9223372036854775807 - 1; echo $m % -1;"), "0");
    let (vm, out) = vm_with_output();
    let ctx = vm.create_context();
    vm.run_source("$m = -9223372036854775807 - 1; $q = $m / -1; echo $q > 0;", None, &ctx)
        .unwrap();
    assert_eq!(out.contents(), "true");
}

#[test]
fn test_classic_for_body_may_start_with_for_in() {
    assert_eq!(run("for ;; { for $x in [7] { echo $x; } break; } echo \"|end\";"), "7|end");
}

// ============================================
// Class path loading
// ============================================

fn write_user_class(root: &Path) {
    let dir = root.join("App").join("Models");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("User.zy"),
        r#"<?php
namespace App\Models;

class User {
    public $name;
    public function __construct($name) { $this->name = $name; }
    public function greet() { return "hi " . $this->name; }
}
"#,
    )
    .unwrap();
}

#[test]
fn test_class_loaded_from_namespace_root() {
    let dir = TempDir::new().unwrap();
    write_user_class(dir.path());

    let (vm, out) = vm_with_output();
    vm.class_path().add_namespace("App", dir.path().join("App"));
    let ctx = vm.create_context();
    vm.run_source(
        "use App\\Models\\User;\n$u = new User(\"ann\");\necho $u->greet();",
        None,
        &ctx,
    )
    .unwrap();
    assert_eq!(out.contents(), "hi ann");
    assert!(vm.get_class("App\\Models\\User").is_some());
}

#[test]
fn test_config_registers_namespaces() {
    let dir = TempDir::new().unwrap();
    write_user_class(dir.path());
    let config = Config::parse("[namespaces]\nApp = \"App\"", dir.path().to_path_buf()).unwrap();

    let (vm, out) = vm_with_output();
    config.apply(&vm);
    let ctx = vm.create_context();
    vm.run_source("$u = new App\\Models\\User(\"bo\"); echo $u->name;", None, &ctx)
        .unwrap();
    assert_eq!(out.contents(), "bo");
}

#[test]
fn test_missing_class_is_an_error() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("App")).unwrap();
    let (vm, _) = vm_with_output();
    vm.class_path().add_namespace("App", dir.path().join("App"));
    let ctx = vm.create_context();
    assert!(vm.run_source("new App\\Missing();", None, &ctx).is_err());
}

#[test]
fn test_load_file_returns_top_level_value() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("settings.zy");
    fs::write(&file, "<?php return [\"debug\" => true];").unwrap();
    let vm = Vm::new();
    let Value::Return(inner) = vm.load_file(&file).unwrap() else {
        panic!("expected a returned value");
    };
    assert!(matches!(*inner, Value::Object(_)));
}
