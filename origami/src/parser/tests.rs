//! Parser tests: statement dispatch, precedence, scoping and declarations

use super::Parser;
use crate::ast::{AssignOp, Ast, BinOp, Capture, Node, ParamKind, Program};
use crate::error::ErrorKind;
use crate::interp::{Modifier, OutputBuffer, Vm};
use crate::lexer::TokenKind;
use crate::types::Type;
use pretty_assertions::assert_eq;

fn parser() -> Parser {
    Parser::new(Vm::with_output(Box::new(OutputBuffer::new())))
}

fn parse_ok(source: &str) -> Program {
    parser().parse_program(source).expect("parse should succeed")
}

fn parse_fails(source: &str) -> bool {
    parser().parse_program(source).is_err()
}

/// The single statement of a one-statement program.
fn single(source: &str) -> Ast {
    let mut program = parse_ok(source);
    assert_eq!(program.statements.len(), 1, "expected one statement in {source:?}");
    program.statements.remove(0)
}

/// Right-hand side of an assignment statement.
fn assigned_value(stmt: &Ast) -> &Ast {
    match &stmt.node {
        Node::Assign { value, .. } => value,
        other => panic!("expected an assignment, got {other:?}"),
    }
}

// ============================================
// Expressions
// ============================================

#[test]
fn test_multiplication_binds_tighter_than_addition() {
    let stmt = single("1 + 2 * 3;");
    let Node::Binary { op, lhs, rhs } = &stmt.node else {
        panic!("expected a binary expression");
    };
    assert_eq!(*op, BinOp::Add);
    assert!(matches!(lhs.node, Node::Int(1)));
    assert!(matches!(rhs.node, Node::Binary { op: BinOp::Mul, .. }));
}

#[test]
fn test_comparison_binds_tighter_than_logical_and() {
    let stmt = single("$a < 1 && $b > 2;");
    let Node::Binary { op, lhs, rhs } = &stmt.node else {
        panic!("expected a binary expression");
    };
    assert_eq!(*op, BinOp::And);
    assert!(matches!(lhs.node, Node::Binary { op: BinOp::Lt, .. }));
    assert!(matches!(rhs.node, Node::Binary { op: BinOp::Gt, .. }));
}

#[test]
fn test_assignment_is_right_associative() {
    let stmt = single("$a = $b = 3;");
    let value = assigned_value(&stmt);
    assert!(matches!(value.node, Node::Assign { .. }));
}

#[test]
fn test_compound_assignment() {
    let stmt = single("$s .= \"x\";");
    assert!(matches!(
        stmt.node,
        Node::Assign {
            op: AssignOp::Concat,
            ..
        }
    ));
}

#[test]
fn test_invalid_assignment_target() {
    assert!(parse_fails("1 = 2;"));
}

#[test]
fn test_call_requires_adjacent_paren() {
    let stmt = single("foo(1);");
    let Node::Call { name, args, .. } = &stmt.node else {
        panic!("expected a call, got {:?}", stmt.node);
    };
    assert_eq!(name, "foo");
    assert_eq!(args.len(), 1);

    let program = parse_ok("foo (1);");
    assert_eq!(program.statements.len(), 2);
    assert!(matches!(&program.statements[0].node, Node::Ident(name) if name == "foo"));
    assert!(matches!(program.statements[1].node, Node::Int(1)));
}

#[test]
fn test_named_arguments() {
    let stmt = single("render(limit: 3, 4);");
    let Node::Call { args, .. } = &stmt.node else {
        panic!("expected a call");
    };
    assert_eq!(args[0].name.as_deref(), Some("limit"));
    assert_eq!(args[1].name, None);
}

#[test]
fn test_dot_is_member_access_only_when_tight() {
    let program = parse_ok("$a = {b: 1}; $a.b; $a . b;");
    assert!(matches!(
        &program.statements[1].node,
        Node::Property { name, .. } if name == "b"
    ));
    assert!(matches!(
        program.statements[2].node,
        Node::Binary {
            op: BinOp::Concat,
            ..
        }
    ));
}

#[test]
fn test_method_call_chain() {
    let stmt = single("$user->profile()->name;");
    let Node::Property { object, name } = &stmt.node else {
        panic!("expected a property access");
    };
    assert_eq!(name, "name");
    assert!(matches!(&object.node, Node::MethodCall { method, .. } if method == "profile"));
}

#[test]
fn test_index_and_slices() {
    let program = parse_ok("$a[0]; $a[1..3]; $a[..2]; $a[];");
    assert!(matches!(program.statements[0].node, Node::Index { index: Some(_), .. }));
    assert!(matches!(
        program.statements[1].node,
        Node::Slice {
            start: Some(_),
            end: Some(_),
            ..
        }
    ));
    assert!(matches!(
        program.statements[2].node,
        Node::Slice {
            start: None,
            end: Some(_),
            ..
        }
    ));
    assert!(matches!(program.statements[3].node, Node::Index { index: None, .. }));
}

#[test]
fn test_keyed_array_becomes_object() {
    let stmt = single("[\"a\" => 1, 2];");
    let Node::Object(pairs) = &stmt.node else {
        panic!("expected an object literal");
    };
    assert_eq!(pairs.len(), 2);
    assert!(matches!(pairs[1].0.node, Node::Int(0)));
}

#[test]
fn test_ternary_and_null_coalesce() {
    let program = parse_ok("$a ? 1 : 2; $a ?: 3; $a ?? 4;");
    assert!(matches!(program.statements[0].node, Node::Ternary { then: Some(_), .. }));
    assert!(matches!(program.statements[1].node, Node::Ternary { then: None, .. }));
    assert!(matches!(program.statements[2].node, Node::NullCoalesce { .. }));
}

#[test]
fn test_cast() {
    let stmt = single("(int) \"42\";");
    assert!(matches!(stmt.node, Node::Cast { ty: Type::Int, .. }));
}

#[test]
fn test_static_access() {
    let program = parse_ok("Config::get(1); Config::$count; Config::class;");
    assert!(matches!(
        &program.statements[0].node,
        Node::StaticCall { class, method, .. } if class == "Config" && method == "get"
    ));
    assert!(matches!(
        &program.statements[1].node,
        Node::StaticProperty { name, .. } if name == "count"
    ));
    assert!(matches!(&program.statements[2].node, Node::Str(s) if s == "Config"));
}

// ============================================
// Declarations and scope
// ============================================

#[test]
fn test_variables_get_dense_slots() {
    let program = parse_ok("$a = 1; $b = 2; $a = 3;");
    let slots: Vec<usize> = program
        .statements
        .iter()
        .map(|s| match &s.node {
            Node::Assign { target, .. } => match &target.node {
                Node::Variable(var) => var.index,
                other => panic!("unexpected target {other:?}"),
            },
            other => panic!("unexpected statement {other:?}"),
        })
        .collect();
    assert_eq!(slots, vec![0, 1, 0]);
}

#[test]
fn test_typed_declaration() {
    let stmt = single("int $n = 5;");
    let Node::Assign { target, .. } = &stmt.node else {
        panic!("expected an assignment");
    };
    let Node::Variable(var) = &target.node else {
        panic!("expected a variable target");
    };
    assert_eq!(var.name, "n");
    assert_eq!(var.ty, Some(Type::Int));
}

#[test]
fn test_nullable_declaration_is_not_a_ternary() {
    let stmt = single("?string $s = null;");
    let Node::Assign { target, .. } = &stmt.node else {
        panic!("expected an assignment");
    };
    let Node::Variable(var) = &target.node else {
        panic!("expected a variable target");
    };
    assert_eq!(var.ty, Some(Type::Nullable(Box::new(Type::String))));
}

#[test]
fn test_colon_declaration() {
    let stmt = single("count: int = 3;");
    let Node::Assign { target, .. } = &stmt.node else {
        panic!("expected an assignment");
    };
    assert!(matches!(&target.node, Node::Variable(var) if var.ty == Some(Type::Int)));
}

#[test]
fn test_generic_declaration() {
    let stmt = single("List<int> $xs = new List<int>();");
    let Node::Assign { target, value, .. } = &stmt.node else {
        panic!("expected an assignment");
    };
    let Node::Variable(var) = &target.node else {
        panic!("expected a variable target");
    };
    assert_eq!(
        var.ty,
        Some(Type::Generic {
            name: "List".into(),
            args: vec![Type::Int],
        })
    );
    assert!(matches!(&value.node, Node::New { type_args, .. } if type_args == &vec![Type::Int]));
}

#[test]
fn test_variable_list_assignment() {
    let stmt = single("$a, $b = [1, 2];");
    let Node::Assign { target, .. } = &stmt.node else {
        panic!("expected an assignment");
    };
    assert!(matches!(&target.node, Node::VariableList(vars) if vars.len() == 2));
}

#[test]
fn test_lambda_captures_outer_slot() {
    let program = parse_ok("$x = 1; $f = fn() => $x;");
    let Node::Lambda(lambda) = &assigned_value(&program.statements[1]).node else {
        panic!("expected a lambda");
    };
    assert_eq!(lambda.captures, vec![Capture { child: 0, parent: 0 }]);
}

#[test]
fn test_lambda_params_precede_captures() {
    let program = parse_ok("$base = 10; $add = ($n) => $n + $base;");
    let Node::Lambda(lambda) = &assigned_value(&program.statements[1]).node else {
        panic!("expected a lambda");
    };
    assert_eq!(lambda.func.params.len(), 1);
    assert_eq!(lambda.func.params[0].var.index, 0);
    assert_eq!(lambda.captures, vec![Capture { child: 1, parent: 0 }]);
}

#[test]
fn test_function_scope_does_not_capture() {
    // A named function gets a fresh frame: `$x` inside is its own slot 0.
    let mut p = parser();
    let program = p.parse_program("$y = 1; $x = 2; function g() { return $x; }").unwrap();
    let Node::FunctionDecl(decl) = &program.statements[2].node else {
        panic!("expected a function declaration");
    };
    let Node::Return(Some(value)) = &decl.body[0].node else {
        panic!("expected a return");
    };
    assert!(matches!(&value.node, Node::Variable(var) if var.index == 0));
}

#[test]
fn test_function_registered_at_parse_time() {
    let mut p = parser();
    p.parse_program("function greet($name, $greeting = \"hi\") { return $greeting; }")
        .unwrap();
    let callable = p.vm().get_func("greet").expect("function registered");
    assert_eq!(callable.name(), "greet");
}

#[test]
fn test_parameter_kinds() {
    let stmt = single("function f(int $a, &$b, ...$rest) {}");
    let Node::FunctionDecl(decl) = &stmt.node else {
        panic!("expected a function declaration");
    };
    let kinds: Vec<ParamKind> = decl.params.iter().map(|p| p.kind).collect();
    assert_eq!(kinds, vec![ParamKind::Single, ParamKind::Reference, ParamKind::Variadic]);
    assert_eq!(decl.params[0].var.ty, Some(Type::Int));
}

#[test]
fn test_multiple_return_type() {
    let stmt = single("function pair(): (int, string) { return 1, \"a\"; }");
    let Node::FunctionDecl(decl) = &stmt.node else {
        panic!("expected a function declaration");
    };
    assert_eq!(decl.ret, Some(Type::MultipleReturn(vec![Type::Int, Type::String])));
    assert!(matches!(&decl.body[0].node, Node::Returns(values) if values.len() == 2));
}

// ============================================
// Control flow
// ============================================

#[test]
fn test_if_elseif_else() {
    let stmt = single(
        r#"if ($x > 0) { echo "a"; } elseif ($x < 0) { echo "b"; } else if ($x == 0) { echo "c"; } else { echo "d"; }"#,
    );
    let Node::If { elifs, otherwise, .. } = &stmt.node else {
        panic!("expected an if");
    };
    assert_eq!(elifs.len(), 2);
    assert!(otherwise.is_some());
}

#[test]
fn test_for_in_and_foreach_agree() {
    let for_in = single("for $v in $items { echo $v; }");
    let foreach = single("foreach ($items as $v) { echo $v; }");
    for stmt in [&for_in, &foreach] {
        let Node::Foreach { key, value, .. } = &stmt.node else {
            panic!("expected a foreach, got {:?}", stmt.node);
        };
        assert!(key.is_none());
        assert_eq!(value.name, "v");
    }
}

#[test]
fn test_for_in_with_key() {
    let stmt = single("for ($k, $v in $map) {}");
    let Node::Foreach { key, value, .. } = &stmt.node else {
        panic!("expected a foreach");
    };
    assert_eq!(key.as_ref().map(|k| k.name.as_str()), Some("k"));
    assert_eq!(value.name, "v");
}

#[test]
fn test_classic_for_whose_body_starts_with_for_in() {
    let stmt = single("for ;; { for $x in $a { } break; }");
    let Node::For { init, cond, step, body } = &stmt.node else {
        panic!("expected a classic for, got {:?}", stmt.node);
    };
    assert!(init.is_empty() && cond.is_none() && step.is_empty());
    let Node::Block(inner) = &body.node else {
        panic!("expected a block body");
    };
    assert_eq!(inner.len(), 2);
    assert!(matches!(inner[0].node, Node::Foreach { .. }));
    assert!(matches!(inner[1].node, Node::Break));
}

#[test]
fn test_classic_for() {
    let stmt = single("for ($i = 0; $i < 3; $i++) { echo $i; }");
    let Node::For { init, cond, step, .. } = &stmt.node else {
        panic!("expected a for loop");
    };
    assert_eq!(init.len(), 1);
    assert!(cond.is_some());
    assert!(matches!(step[0].node, Node::IncDec { prefix: false, .. }));
}

#[test]
fn test_switch_cases() {
    let stmt = single(r#"switch ($x) { case 1: echo "a"; break; case 2: default: echo "b"; }"#);
    let Node::Switch { cases, .. } = &stmt.node else {
        panic!("expected a switch");
    };
    assert_eq!(cases.len(), 3);
    assert_eq!(cases[0].body.len(), 2);
    assert!(cases[1].body.is_empty());
    assert!(cases[2].pattern.is_none());
}

#[test]
fn test_match_arms() {
    let stmt = single(r#"$r = match ($x) { 1, 2 => "low"; 3 => "mid", default => "high" };"#);
    let Node::Match { arms, default, .. } = &assigned_value(&stmt).node else {
        panic!("expected a match");
    };
    assert_eq!(arms.len(), 2);
    assert_eq!(arms[0].patterns.len(), 2);
    assert!(default.is_some());
}

#[test]
fn test_try_requires_catch_or_finally() {
    assert!(parse_fails("try { $a = 1; }"));
    let stmt = single("try { $a = 1; } catch (Exception $e) { } finally { }");
    let Node::Try { catches, finally, .. } = &stmt.node else {
        panic!("expected a try");
    };
    assert_eq!(catches[0].class, "Exception");
    assert!(finally.is_some());
}

#[test]
fn test_class_init_not_parsed_in_conditions() {
    let mut p = parser();
    let program = p
        .parse_program("class Flag {} if Flag { echo 1; } $f = Flag { };")
        .unwrap();
    assert!(matches!(&program.statements[1].node, Node::If { cond, .. } if matches!(cond.node, Node::Ident(_))));
    assert!(matches!(
        assigned_value(&program.statements[2]).node,
        Node::InitClass { .. }
    ));
}

// ============================================
// Classes, interfaces, namespaces
// ============================================

#[test]
fn test_class_registered_with_members() {
    let mut p = parser();
    p.parse_program(
        r#"
        class Point {
            public $x = 0;
            private int $y;
            const ORIGIN = 0;
            public function __construct($x) { $this->x = $x; }
            public static function zero() { return new Point(0); }
        }
        "#,
    )
    .unwrap();
    let class = p.vm().get_class("Point").expect("class registered");
    assert_eq!(class.properties.len(), 3);
    assert_eq!(class.properties[1].modifier, Modifier::Private);
    assert_eq!(class.properties[1].ty, Some(Type::Int));
    assert!(class.properties[2].is_const && class.properties[2].is_static);
    assert!(class.construct.is_some());
    assert!(class.methods["zero"].is_static);
}

#[test]
fn test_constructor_is_inherited() {
    let mut p = parser();
    p.parse_program(
        r#"
        class Base { function __construct() {} }
        class Middle extends Base {}
        class Leaf extends Middle {}
        "#,
    )
    .unwrap();
    let leaf = p.vm().get_class("Leaf").unwrap();
    let construct = leaf.construct.as_ref().expect("inherited constructor");
    assert_eq!(construct.class, "Base");
}

#[test]
fn test_generic_class_parameters() {
    let mut p = parser();
    p.parse_program("class Box<T> { public T $value; }").unwrap();
    let class = p.vm().get_class("Box").unwrap();
    assert_eq!(class.generics, vec!["T".to_string()]);
    assert_eq!(class.properties[0].ty, Some(Type::param("T")));
}

#[test]
fn test_interface_declaration() {
    let mut p = parser();
    p.parse_program("interface Shape { public function area(): float; function name(); }")
        .unwrap();
    let iface = p.vm().get_interface("Shape").expect("interface registered");
    let names: Vec<&str> = iface.methods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["area", "name"]);
    assert_eq!(iface.methods[0].ret, Some(Type::Float));
}

#[test]
fn test_namespace_qualifies_declarations() {
    let mut p = parser();
    p.parse_program("namespace App\\Models; class User {} function helper() {}")
        .unwrap();
    assert!(p.vm().get_class("App\\Models\\User").is_some());
    assert!(p.vm().get_func("App\\Models\\helper").is_some());
    assert_eq!(p.namespace(), "App\\Models");
}

#[test]
fn test_use_alias_resolution() {
    let mut p = parser();
    p.parse_program("namespace App\\Models; class User {}").unwrap();
    let program = p
        .parse_program("namespace Main; use App\\Models\\User; use App\\Models\\User as Account; new User(); new Account();")
        .unwrap();
    let classes: Vec<&str> = program
        .statements
        .iter()
        .filter_map(|s| match &s.node {
            Node::New { class, .. } => Some(class.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(classes, vec!["App\\Models\\User", "App\\Models\\User"]);
}

#[test]
fn test_use_requires_semicolon() {
    assert!(parse_fails("use App\\Models\\User new User();"));
}

#[test]
fn test_braced_namespace_restores_outer() {
    let mut p = parser();
    let program = p.parse_program("namespace Lib { class Tool {} } class Free {}").unwrap();
    assert!(matches!(&program.statements[0].node, Node::Namespace { body: Some(_), .. }));
    assert!(p.vm().get_class("Lib\\Tool").is_some());
    assert!(p.vm().get_class("Free").is_some());
}

#[test]
fn test_annotation_attached_to_class() {
    let mut p = parser();
    p.parse_program(
        r#"
        class Route { public $path; function __construct($path) { $this->path = $path; } }
        @Route("/home")
        class Home {}
        "#,
    )
    .unwrap();
    let home = p.vm().get_class("Home").unwrap();
    assert_eq!(home.annotations().len(), 1);
}

#[test]
fn test_unknown_annotation_is_an_annotation_error() {
    let err = parser().parse_program("@Missing class Thing {}").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Annotation);
}

// ============================================
// Errors and extension
// ============================================

#[test]
fn test_errors_are_collected_per_statement() {
    let mut p = parser();
    let err = p.parse_program("$a = ; $b = 2; $c = );").unwrap_err();
    assert_eq!(p.errors().len(), 2);
    assert_eq!(err.children.len(), 2);
    assert_eq!(err.kind, ErrorKind::Syntax);
}

#[test]
fn test_syntax_error_names_position_and_context() {
    let err = parser().parse_program("$a = 1;\n$b = ;").unwrap_err();
    assert!(err.message.contains("2:6"), "message: {}", err.message);
    assert!(err.message.contains("near"), "message: {}", err.message);
}

#[test]
fn test_register_statement_extends_the_router() {
    let mut p = parser();
    p.register_statement(TokenKind::Echo, |p| {
        while !p.at_end() && !p.eat(TokenKind::Semicolon) {
            p.advance();
        }
        Ok(None)
    });
    let program = p.parse_program("echo 1, 2; $x = 1;").unwrap();
    assert_eq!(program.statements.len(), 1);
}

#[test]
fn test_parser_state_persists_between_units() {
    let mut p = parser();
    p.parse_program("$a = 1;").unwrap();
    let program = p.parse_program("$b = 2; $a;").unwrap();
    assert!(matches!(&program.statements[1].node, Node::Variable(var) if var.index == 0));
}
